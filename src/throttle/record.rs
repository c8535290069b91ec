//! Per-identity hit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::ClientRequest;
use super::window::ResetWindow;

/// Hit counter for one `(operation, method)` pair of a single identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSignature {
    /// Logical name of the protected operation
    pub operation_name: String,
    /// Request method, part of the signature identity
    pub method: String,
    /// Path of the first request, diagnostics only
    pub path: String,
    /// Query of the first request, diagnostics only
    pub query: Option<String>,
    /// Number of checks since the signature was created
    pub hit_count: u64,
    /// Time of the most recent check
    pub last_hit: DateTime<Utc>,
}

impl RequestSignature {
    fn new(operation_name: &str, request: &ClientRequest, now: DateTime<Utc>) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            hit_count: 1,
            last_hit: now,
        }
    }

    /// Whether this signature tracks `operation_name` called with `method`.
    pub fn matches(&self, operation_name: &str, method: &str) -> bool {
        self.operation_name == operation_name && self.method == method
    }
}

/// Everything tracked for one client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Raw client identity, diagnostics only
    pub identity: String,
    /// At most one signature per `(operation, method)`
    #[serde(default)]
    pub signatures: Vec<RequestSignature>,
}

impl IdentityRecord {
    /// Create an empty record.
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            signatures: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Drop every signature whose age has reached the window.
    ///
    /// Returns the number of signatures removed.
    pub fn prune_expired(&mut self, window: &ResetWindow, now: DateTime<Utc>) -> usize {
        let before = self.signatures.len();
        self.signatures
            .retain(|signature| !window.is_expired(signature.last_hit, now));
        before - self.signatures.len()
    }

    /// Look up the signature for `(operation_name, method)`.
    pub fn find(&self, operation_name: &str, method: &str) -> Option<&RequestSignature> {
        self.signatures
            .iter()
            .find(|signature| signature.matches(operation_name, method))
    }

    /// Count a hit: bump the matching signature or create it with one hit.
    pub fn record_hit(
        &mut self,
        operation_name: &str,
        request: &ClientRequest,
        now: DateTime<Utc>,
    ) -> &RequestSignature {
        let position = self
            .signatures
            .iter()
            .position(|signature| signature.matches(operation_name, &request.method));

        match position {
            Some(index) => {
                let signature = &mut self.signatures[index];
                signature.hit_count = signature.hit_count.saturating_add(1);
                signature.last_hit = now;
                signature
            }
            None => {
                self.signatures
                    .push(RequestSignature::new(operation_name, request, now));
                &self.signatures[self.signatures.len() - 1]
            }
        }
    }

    /// Remove and return the signature for `(operation_name, method)`.
    pub fn remove(&mut self, operation_name: &str, method: &str) -> Option<RequestSignature> {
        let index = self
            .signatures
            .iter()
            .position(|signature| signature.matches(operation_name, method))?;
        Some(self.signatures.remove(index))
    }
}
