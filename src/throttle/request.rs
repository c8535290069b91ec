//! Caller-supplied request context.

/// The parts of an incoming request the throttle needs.
///
/// Built by the integration layer from its own request type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    /// Client identity, usually the remote address
    pub identity: String,
    /// Request method, e.g. `GET` or `POST`
    pub method: String,
    /// Request path
    pub path: String,
    /// Raw query string, if any
    pub query: Option<String>,
}

impl ClientRequest {
    pub fn new(
        identity: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            method: method.into(),
            path: path.into(),
            query: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.is_empty() { None } else { Some(query) };
        self
    }

    /// Resolve the operation name: an explicit name wins, otherwise the path.
    pub fn operation_name<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit.unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_name_defaults_to_path() {
        let request = ClientRequest::new("127.0.0.1", "POST", "/account/login");

        assert_eq!(request.operation_name(None), "/account/login");
        assert_eq!(request.operation_name(Some("login")), "login");
    }

    #[test]
    fn test_empty_query_is_dropped() {
        let request = ClientRequest::new("::1", "GET", "/").with_query("");
        assert_eq!(request.query, None);

        let request = ClientRequest::new("::1", "GET", "/").with_query("?a=1");
        assert_eq!(request.query.as_deref(), Some("?a=1"));
    }
}
