use axum::{
    Json, Router,
    extract::{FromRef, State},
    routing::{get, post},
};
use axum_helpers::{AuthUser, ErrorResponse, TokenIssuer, ValidatedJson};
use utoipa::OpenApi;

use crate::error::MerchantResult;
use crate::models::{
    ChainStatus, LoginRequest, LoginResponse, MeResponse, MerchantStatus, MerchantView,
    RegisterRequest, RegisterResponse, Role, UserView,
};
use crate::service::OnboardingService;

pub const TAG: &str = "auth";

#[derive(OpenApi)]
#[openapi(
    paths(register, login, me),
    components(schemas(
        RegisterRequest,
        RegisterResponse,
        MerchantView,
        MerchantStatus,
        ChainStatus,
        LoginRequest,
        LoginResponse,
        UserView,
        Role,
        MeResponse,
        ErrorResponse,
    )),
    tags((name = TAG, description = "Merchant onboarding and sessions"))
)]
pub struct ApiDoc;

impl FromRef<OnboardingService> for TokenIssuer {
    fn from_ref(service: &OnboardingService) -> Self {
        service.tokens().clone()
    }
}

/// Routes relative to the API version prefix.
pub fn router(service: OnboardingService) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .with_state(service)
}

/// Register a merchant and its owner
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = TAG,
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Merchant persisted; chain outcome reported separately", body = RegisterResponse),
        (status = 400, description = "Validation failure or duplicate email, wallet or name", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
async fn register(
    State(service): State<OnboardingService>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> MerchantResult<Json<RegisterResponse>> {
    Ok(Json(service.register(request).await?))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = TAG,
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token issued", body = LoginResponse),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "invalid credentials", body = ErrorResponse)
    )
)]
async fn login(
    State(service): State<OnboardingService>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> MerchantResult<Json<LoginResponse>> {
    Ok(Json(service.login(request).await?))
}

/// Claims of the bearer token
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = TAG,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Verified claims", body = MeResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    )
)]
async fn me(
    State(service): State<OnboardingService>,
    AuthUser(claims): AuthUser,
) -> MerchantResult<Json<MeResponse>> {
    Ok(Json(service.me(&claims)?))
}
