//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    #[must_use]
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.password, "hunter2");
        Ok(())
    }

    #[test]
    fn token_response_is_bearer() -> Result<()> {
        let response = TokenResponse::bearer("token".to_string());
        let value = serde_json::to_value(&response)?;
        assert_eq!(
            value.get("token_type").and_then(serde_json::Value::as_str),
            Some("bearer")
        );
        assert_eq!(
            value
                .get("access_token")
                .and_then(serde_json::Value::as_str),
            Some("token")
        );
        Ok(())
    }
}
