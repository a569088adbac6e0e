use crate::AppState;
use crate::api::error::AppError;
use crate::entities::User;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// The authenticated caller, inserted into request extensions.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// The raw token the caller authenticated with.
#[derive(Clone, Debug)]
pub struct SessionToken(pub String);

#[derive(Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Token from the `Authorization: Bearer` header, the session cookie, or a
/// `token` query parameter (download links), in that order.
pub fn extract_token(req: &Request) -> Option<String> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string());

    bearer
        .or_else(|| cookie_token(req.headers()))
        .or_else(|| {
            let query = req.uri().query().unwrap_or_default();
            serde_urlencoded::from_str::<AuthQuery>(query)
                .ok()
                .and_then(|q| q.token)
        })
        .filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&req).ok_or(AppError::Unauthorized("Unauthorized".to_string()))?;

    let user = state.sessions.validate(&token).await?;

    req.extensions_mut().insert(CurrentUser(user));
    req.extensions_mut().insert(SessionToken(token));
    Ok(next.run(req).await)
}

/// Must run after [`auth_middleware`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<CurrentUser>() {
        Some(CurrentUser(user)) if user.is_admin() => Ok(next.run(req).await),
        Some(CurrentUser(user)) => {
            tracing::warn!("User {} denied access to {}", user.id, req.uri().path());
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
        None => Err(AppError::Unauthorized("Unauthorized".to_string())),
    }
}
