use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    api::state::AppState,
    auth::{Claims, Role},
    error::AppError,
};

#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub claims: Claims,
}

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.claims.sub
    }

    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.claims.has_role(role) || self.claims.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

fn bearer_claims(state: &AppState, request: &Request) -> Result<Claims, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    state.jwt.decode(token.trim())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_claims(&state, &request)?;

    request.extensions_mut().insert(CurrentUser { claims });

    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_claims(&state, &request)?;

    if !claims.is_admin() {
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(CurrentUser { claims });

    Ok(next.run(request).await)
}
