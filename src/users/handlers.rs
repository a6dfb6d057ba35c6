use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    Dashboard, DonationResponse, PublicProfile, UserResponse, WishRequest, WishlistItem,
    USER_FIELDS,
};
use super::repo::{self, NewProfile};
use super::services::{self, Registration};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
    toys::dto::ToyResponse,
    validation::validate_patch,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/me", get(get_me).patch(update_me))
        .route("/users/me/dashboard", get(get_dashboard))
        .route("/users/me/donations", get(list_donations))
        .route("/users/me/wishlist", get(list_wishlist).post(add_wish))
        .route("/users/me/wishlist/:toy_id", delete(remove_wish))
        .route("/users/:id", get(get_profile))
}

/// An absent or blank body means "no profile fields"; anything else must be
/// a JSON object.
fn profile_body(raw: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    serde_json::from_slice(raw)
        .map_err(|e| ApiError::BadRequest(format!("request body must be a JSON object: {}", e)))
}

/// Creates the caller's row. Safe to call on every sign-in.
#[instrument(skip(state, body), fields(uid = %identity.uid))]
pub async fn register(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body = profile_body(&body)?;
    let fields = validate_patch(USER_FIELDS, &body).map_err(ApiError::Validation)?;
    let profile = NewProfile::from_validated(&fields);

    let res = match services::register(&state, &identity, &profile).await? {
        Registration::Created(user) => (
            StatusCode::CREATED,
            [(header::LOCATION, "/api/v1/users/me".to_string())],
            Json(UserResponse::from(user)),
        )
            .into_response(),
        Registration::Existing(user) => Json(UserResponse::from(user)).into_response(),
    };
    Ok(res)
}

#[instrument(skip(state), fields(uid = %identity.uid))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = services::me(&state, &identity.uid).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, body), fields(uid = %identity.uid))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = services::update_profile(&state, &identity.uid, &body).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    let user = repo::find(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state), fields(uid = %identity.uid))]
pub async fn list_wishlist(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<WishlistItem>>, ApiError> {
    let rows = repo::list_wishlist(&state.db, &identity.uid).await?;
    Ok(Json(rows.into_iter().map(WishlistItem::from).collect()))
}

#[instrument(skip(state), fields(uid = %identity.uid))]
pub async fn add_wish(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiJson(body): ApiJson<WishRequest>,
) -> Result<(StatusCode, Json<ToyResponse>), ApiError> {
    let toy = services::add_wish(&state, &identity, body.toy_id).await?;
    Ok((StatusCode::CREATED, Json(toy.into())))
}

#[instrument(skip(state), fields(uid = %identity.uid))]
pub async fn remove_wish(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(toy_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    repo::remove_wish(&state.db, &identity.uid, toy_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state), fields(uid = %identity.uid))]
pub async fn list_donations(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<DonationResponse>>, ApiError> {
    let rows = repo::list_donations(&state.db, &identity.uid).await?;
    Ok(Json(rows.into_iter().map(DonationResponse::from).collect()))
}

#[instrument(skip(state), fields(uid = %identity.uid))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(services::dashboard(&state, &identity.uid).await?))
}
