use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};

use crate::config;

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    token_from_headers(req.headers())
}

// Get the auth token from request headers: Authorization header first, cookie fallback
pub fn token_from_headers(headers: &HeaderMap) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = headers
            .get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header) {
            if let Ok(c) = cookie {
                if c.name() == "auth_token" {
                    return Ok(c.value().to_string());
                }
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

/// Verify an identity assertion and return the stable subject id.
///
/// Malformed, signature-invalid and expired tokens all collapse into the same
/// failure; callers must not distinguish them to the client.
pub fn verify_subject(token: &str) -> Result<String, String> {
    let config = config::get_config();
    let secret = config
        .auth_jwt_secret
        .as_ref()
        .ok_or_else(|| "No JWT secret configured!".to_string())?;

    let token_data = validate_jwt(token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;

    match token_data.claims.get("sub").and_then(|v| v.as_str()) {
        Some(sub) => Ok(sub.to_string()),
        None => Err("Can't extract a subject from the JWT token".to_string()),
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{init_config, Config};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn init_test_config() {
        init_config(Config {
            auth_jwt_secret: Some(SECRET.to_string()),
            ..Config::default()
        });
    }

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 900
    }

    #[test]
    fn valid_token_yields_subject() {
        init_test_config();
        let token = sign(json!({"sub": "user-1", "exp": future_exp()}), SECRET);
        assert_eq!(verify_subject(&token).unwrap(), "user-1");
    }

    #[test]
    fn expired_token_is_rejected() {
        init_test_config();
        let expired = chrono::Utc::now().timestamp() - 3600;
        let token = sign(json!({"sub": "user-1", "exp": expired}), SECRET);
        assert!(verify_subject(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        init_test_config();
        let token = sign(json!({"sub": "user-1", "exp": future_exp()}), "other-secret");
        assert!(verify_subject(&token).is_err());
    }

    #[test]
    fn token_without_subject_is_rejected() {
        init_test_config();
        let token = sign(json!({"exp": future_exp()}), SECRET);
        assert!(verify_subject(&token).is_err());
    }
}
