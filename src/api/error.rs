use thiserror::Error;

/// Failures surfaced by the exchange gateway.
///
/// Transient and rate-limit conditions are retried inside the client;
/// what escapes here is final for the current cycle. Auth failures are
/// never retried.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transient gateway error: {0}")]
    Transient(String),

    #[error("authentication rejected (code {code}): {message}")]
    Auth { code: i64, message: String },

    #[error("exchange rejected request (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("malformed exchange response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether the caller may reasonably retry the whole cycle step later.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Transient("timeout".to_string()).is_transient());
        assert!(!GatewayError::Auth {
            code: -2015,
            message: "invalid key".to_string()
        }
        .is_transient());
        assert!(!GatewayError::Api {
            code: -1121,
            message: "invalid symbol".to_string()
        }
        .is_transient());
    }
}
