//! Identity key derivation.

use sha2::{Digest, Sha512};

/// Storage key derived from a raw client identity.
///
/// The key is the lowercase hex SHA-512 digest of the identity, so the raw
/// value (usually a remote address) never appears in cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Derive the key for a raw identity.
    pub fn derive(identity: &str) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(identity.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pick one of `stripes` lock slots for this key.
    pub(crate) fn stripe(&self, stripes: usize) -> usize {
        let prefix = self.0.get(..16).unwrap_or_default();
        let value = u64::from_str_radix(prefix, 16).unwrap_or(0);
        (value % stripes.max(1) as u64) as usize
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every character of an identity with `*` for log output.
pub fn mask_identity(identity: &str) -> String {
    identity.chars().map(|_| '*').collect()
}
