use bytes::Bytes;
use http::StatusCode;
use serde_json::json;

/// A failure already shaped for the client: status plus a JSON error body.
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    pub fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        let body = json!({
            "error": {
                "message": message.into(),
                "type": kind,
            }
        });
        Self {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", message)
    }

    pub fn upstream_unreachable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_unreachable", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_failure_body_names_its_type() {
        let err = ProxyError::upstream_unreachable("connection refused");
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        let value: serde_json::Value = serde_json::from_slice(&err.body).unwrap();
        assert_eq!(value["error"]["type"], "upstream_unreachable");
        assert_eq!(value["error"]["message"], "connection refused");
    }
}
