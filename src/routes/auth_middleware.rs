use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::info;

use crate::services::auth_service::{get_auth_token, verify_subject};

/// Authenticated caller, injected into request extensions by the middleware
#[derive(Clone, Debug)]
pub struct AuthSubject(pub String);

pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Verify the identity assertion. Malformed, expired and forged tokens
    //    are all the same generic rejection.
    let subject = match verify_subject(&token) {
        Ok(subject) => subject,
        Err(e) => {
            info!("Identity assertion rejected: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Expose the subject to downstream handlers
    req.extensions_mut().insert(AuthSubject(subject));

    // Token is valid, proceed to next middleware/handler
    Ok(next.run(req).await)
}
