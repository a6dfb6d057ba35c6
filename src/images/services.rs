use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::ImageKind;
use crate::{errors::ApiError, state::AppState, toys::repo as toy_repo, toys::Toy};

/// Presigned links are handed out through a redirect, so keep them short.
pub const PRESIGN_TTL_SECS: u64 = 10 * 60;

/// An uploaded file that passed the size and format checks.
#[derive(Debug)]
pub struct ImageUpload {
    pub body: Bytes,
    pub kind: ImageKind,
}

impl ImageUpload {
    pub fn check(body: Bytes, max_bytes: usize) -> Result<Self, ApiError> {
        if body.is_empty() {
            return Err(ApiError::BadRequest("image is empty".into()));
        }
        if body.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge { limit: max_bytes });
        }
        let kind = ImageKind::sniff(&body).ok_or_else(|| {
            ApiError::UnsupportedMediaType("image must be a JPEG, PNG, GIF or WebP file".into())
        })?;
        Ok(Self { body, kind })
    }
}

pub fn object_key(owner_id: &str, toy_id: Uuid, kind: ImageKind) -> String {
    format!(
        "toys/{}/{}-{}.{}",
        key_segment(owner_id),
        toy_id,
        Uuid::new_v4(),
        kind.ext()
    )
}

/// Provider ids can contain `|` or `:`; keep object keys boring.
fn key_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Stores the image, points the toy at it and drops the previous object.
pub async fn replace_toy_image(
    st: &AppState,
    toy: &Toy,
    upload: ImageUpload,
) -> anyhow::Result<Toy> {
    let key = object_key(&toy.owner_id, toy.id, upload.kind);
    st.storage
        .put_object(&key, upload.body, upload.kind.mime())
        .await
        .with_context(|| format!("store image for toy {}", toy.id))?;

    let updated = match toy_repo::set_image_key(&st.db, toy.id, &toy.owner_id, Some(key.as_str())).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            discard(st, &key).await;
            anyhow::bail!("toy {} disappeared during upload", toy.id);
        }
        Err(e) => {
            discard(st, &key).await;
            return Err(e);
        }
    };

    if let Some(old) = toy.image_key.as_deref() {
        discard(st, old).await;
    }
    info!(toy_id = %toy.id, %key, kind = ?upload.kind, "toy image replaced");
    Ok(updated)
}

pub async fn presign(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))
}

/// Best-effort delete; a leftover object is not worth failing a request.
pub async fn discard(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, %key, "failed to delete stored image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageClient;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn check_enforces_size_and_format() {
        let ok = ImageUpload::check(Bytes::from_static(PNG), 1024).unwrap();
        assert_eq!(ok.kind, ImageKind::Png);

        assert!(matches!(
            ImageUpload::check(Bytes::from_static(PNG), 4),
            Err(ApiError::PayloadTooLarge { limit: 4 })
        ));
        assert!(matches!(
            ImageUpload::check(Bytes::from_static(b"hello world"), 1024),
            Err(ApiError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            ImageUpload::check(Bytes::new(), 1024),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn object_keys_are_scoped_and_sanitized() {
        let toy_id = Uuid::new_v4();
        let key = object_key("google-oauth2|1234", toy_id, ImageKind::Webp);
        assert!(key.starts_with(&format!("toys/google-oauth2_1234/{}-", toy_id)));
        assert!(key.ends_with(".webp"));
        assert_ne!(key, object_key("google-oauth2|1234", toy_id, ImageKind::Webp));
    }

    #[tokio::test]
    async fn presign_and_discard_go_through_storage() {
        let (state, storage) = AppState::fake_with_storage();
        storage
            .put_object("toys/u/x.png", Bytes::from_static(PNG), "image/png")
            .await
            .unwrap();
        assert_eq!(storage.content_type("toys/u/x.png").as_deref(), Some("image/png"));

        let url = presign(&state, "toys/u/x.png").await.unwrap();
        assert!(url.contains("toys/u/x.png"));
        assert!(url.contains(&PRESIGN_TTL_SECS.to_string()));

        discard(&state, "toys/u/x.png").await;
        assert_eq!(storage.len(), 0);
    }
}
