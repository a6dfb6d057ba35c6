use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{ToyQuery, ToyResponse, TOY_CREATE_FIELDS, TOY_PATCH_FIELDS};
use super::repo::{self, NewToy};
use super::repo_types::TOY_COLUMNS;
use super::services;
use crate::{
    auth::AuthUser,
    errors::ApiError,
    extract::{ApiJson, ApiMultipart, ApiPath, ApiQuery},
    images::services::{self as images, ImageUpload},
    sql::UpdateBuilder,
    state::AppState,
    validation::validate_create,
};

/// Multipart framing on top of the raw image bytes.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn toy_routes(max_image_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/toys", get(list_toys).post(create_toy))
        .route(
            "/toys/:id",
            get(get_toy).patch(update_toy).delete(delete_toy),
        )
        .route(
            "/toys/:id/image",
            get(get_image)
                .post(upload_image)
                .layer(DefaultBodyLimit::max(max_image_bytes + MULTIPART_OVERHEAD)),
        )
}

#[instrument(skip(state))]
pub async fn list_toys(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ToyQuery>,
) -> Result<Json<Vec<ToyResponse>>, ApiError> {
    let toys = repo::browse(&state.db, &q).await?;
    Ok(Json(toys.into_iter().map(ToyResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_toy(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ToyResponse>, ApiError> {
    let toy = services::load(&state, id).await?;
    Ok(Json(toy.into()))
}

#[instrument(skip(state, body), fields(uid = %identity.uid))]
pub async fn create_toy(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = validate_create(TOY_CREATE_FIELDS, &body).map_err(|errors| {
        warn!(?errors, "invalid toy listing");
        ApiError::Validation(errors)
    })?;
    let new = NewToy::from_validated(&fields)?;

    let toy = services::create_toy(&state, &identity, new).await?;
    let location = format!("/api/v1/toys/{}", toy.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ToyResponse::from(toy)),
    ))
}

#[instrument(skip(state, body), fields(uid = %identity.uid))]
pub async fn update_toy(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> Result<Json<ToyResponse>, ApiError> {
    let plan = UpdateBuilder::new("toys", TOY_PATCH_FIELDS)
        .returning(TOY_COLUMNS)
        .build(&body, vec![("id", id.into()), ("owner_id", identity.uid.clone().into())])?;

    let toy = services::update_toy(&state, &identity.uid, id, plan).await?;
    Ok(Json(toy.into()))
}

#[instrument(skip(state), fields(uid = %identity.uid))]
pub async fn delete_toy(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    services::delete_toy(&state, &identity.uid, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /toys/:id/image, multipart with a single `image` field.
#[instrument(skip(state, mp), fields(uid = %identity.uid))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiMultipart(mut mp): ApiMultipart,
) -> Result<Json<ToyResponse>, ApiError> {
    let max = state.config.max_image_bytes;
    let mut upload = None;
    while let Some(field) = mp.next_field().await.map_err(|e| multipart_error(e, max))? {
        if field.name() == Some("image") {
            let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;
            upload = Some(ImageUpload::check(data, max)?);
            break;
        }
    }
    let upload = upload.ok_or_else(|| ApiError::BadRequest("multipart field `image` is required".into()))?;

    let toy = services::load_owned(&state, &identity.uid, id).await?;
    let toy = images::replace_toy_image(&state, &toy, upload).await?;
    Ok(Json(toy.into()))
}

/// 302 to a short-lived presigned URL of the toy's photo.
#[instrument(skip(state))]
pub async fn get_image(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, ApiError> {
    let toy = services::load(&state, id).await?;
    let key = toy.image_key.ok_or_else(|| ApiError::not_found("image"))?;
    let url = images::presign(&state, &key).await?;
    info!(toy_id = %id, "image link issued");
    Ok(found(url))
}

/// Plain `302 Found`; axum's `Redirect` only offers 303, 307 and 308.
fn found(url: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

fn multipart_error(e: MultipartError, limit: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_links_redirect_with_302() {
        let res = found("https://fake.local/toys/a.png?expires=600".into());
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "https://fake.local/toys/a.png?expires=600");
    }
}
