use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, Method, StatusCode,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::error::AppError;
use crate::state::AppState;
use crate::waitlist::{RegistrantDetail, Registration};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub data: Registration,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub total: usize,
    pub emails: Vec<RegistrantDetail>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let public_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    let admin_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let public = Router::new()
        .route(
            "/api/waitlist",
            post(register_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .layer(public_cors);

    let admin = Router::new()
        .route(
            "/api/admin/waitlist",
            get(admin_list_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .layer(admin_cors);

    public.merge(admin).with_state(state)
}

/// The rate limit is consumed before the payload is looked at, so a
/// malformed body still counts against the caller.
async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let source = source_address(&headers);
    let email = match &payload {
        Ok(Json(body)) => body.email.as_deref(),
        Err(_) => None,
    };

    let data = state.waitlist.register(email, &source).await?;

    Ok((
        StatusCode::OK,
        Json(RegisterResponse {
            success: true,
            message: "Email registered successfully".to_string(),
            data,
        }),
    ))
}

async fn admin_list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let auth = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    let page = state.waitlist.list(auth).await?;

    Ok((
        StatusCode::OK,
        Json(ListResponse {
            success: true,
            total: page.total,
            emails: page.registrants,
        }),
    ))
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed_handler() -> AppError {
    AppError::MethodNotAllowed
}

/// First `x-forwarded-for` value, set by the fronting reverse proxy.
fn source_address(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
