//! Request guards

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::AppError;
use crate::app::AppState;

/// Reject login attempts beyond the server-wide quota
pub async fn login_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.login_limiter.check().is_err() {
        warn!("Login rate limit exceeded");
        return AppError::TooManyRequests.into_response();
    }
    next.run(request).await
}
