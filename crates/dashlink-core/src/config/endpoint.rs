//! Dashboard event-stream endpoint and URI assembly.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// Location of the server-pushed dashboard stream.
#[derive(Debug, Clone, PartialEq, Eq, Validate, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// `host[:port]` of the backend.
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,
    /// Use `wss` instead of `ws`.
    #[serde(default)]
    pub secure: bool,
    /// Path of the dashboard stream.
    #[serde(default = "default_path")]
    pub path: String,
    /// Query parameter carrying the bearer credential.
    #[serde(default = "default_token_param")]
    #[validate(length(min = 1))]
    pub token_param: String,
}

impl EndpointConfig {
    /// URI scheme for the configured security mode.
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// Assemble the stream URI with `token` as a query parameter.
    pub fn build_url(&self, token: &str) -> Result<String, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::authentication("Bearer token is empty"));
        }
        if self.host.trim().is_empty() {
            return Err(AppError::configuration("Endpoint host is empty"));
        }

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        Ok(format!(
            "{}://{}{}?{}={}",
            self.scheme(),
            self.host.trim_end_matches('/'),
            path,
            self.token_param,
            urlencoding::encode(token)
        ))
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            secure: false,
            path: default_path(),
            token_param: default_token_param(),
        }
    }
}

fn default_host() -> String {
    "localhost:8080".to_string()
}

fn default_path() -> String {
    "/api/ws/dashboard".to_string()
}

fn default_token_param() -> String {
    "token".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_plain() {
        let endpoint = EndpointConfig::default();
        let url = endpoint.build_url("abc123").expect("url");
        assert_eq!(url, "ws://localhost:8080/api/ws/dashboard?token=abc123");
    }

    #[test]
    fn test_build_url_secure_and_encoded() {
        let endpoint = EndpointConfig {
            host: "crm.example.com/".to_string(),
            secure: true,
            path: "stream".to_string(),
            ..Default::default()
        };
        let url = endpoint.build_url("a b+c").expect("url");
        assert_eq!(url, "wss://crm.example.com/stream?token=a%20b%2Bc");
    }

    #[test]
    fn test_empty_token_rejected() {
        let endpoint = EndpointConfig::default();
        let err = endpoint.build_url("  ").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Authentication);
    }
}
