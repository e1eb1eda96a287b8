use axum::Json;
use serde::Serialize;

use crate::extractors::AuthContext;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub uid: String,
    pub authenticated: bool,
}

/// GET /api/auth/user
pub async fn user_handler(auth: AuthContext) -> Json<UserResponse> {
    Json(UserResponse {
        uid: auth.uid,
        authenticated: true,
    })
}
