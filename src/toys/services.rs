use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use super::dto::{STATUS_AVAILABLE, STATUS_DONATED};
use super::repo::{self, NewToy};
use super::repo_types::Toy;
use crate::{
    auth::Identity,
    errors::{ApiError, FieldErrors},
    images::services as images,
    sql::UpdatePlan,
    state::AppState,
    users::repo as user_repo,
    validation::Validated,
};

/// Points credited to a donor once a listing is marked donated.
pub const DONATION_POINTS: i64 = 10;

pub fn ensure_owner(toy: &Toy, uid: &str) -> Result<(), ApiError> {
    if toy.owner_id != uid {
        return Err(ApiError::Forbidden("only the owner can modify this toy".into()));
    }
    Ok(())
}

/// Only the move into `donated` earns points; re-saving a donated toy does not.
pub fn became_donated(before: &str, after: &str) -> bool {
    before != STATUS_DONATED && after == STATUS_DONATED
}

pub async fn load(st: &AppState, id: Uuid) -> Result<Toy, ApiError> {
    repo::find(&st.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("toy"))
}

pub async fn load_owned(st: &AppState, uid: &str, id: Uuid) -> Result<Toy, ApiError> {
    let toy = load(st, id).await?;
    ensure_owner(&toy, uid)?;
    Ok(toy)
}

impl NewToy {
    pub fn from_validated(v: &Validated) -> Result<Self, ApiError> {
        let required = |name: &str| {
            v.text(name).ok_or_else(|| {
                let mut errors = FieldErrors::new();
                errors.insert(name.to_string(), "is required".into());
                ApiError::Validation(errors)
            })
        };
        Ok(Self {
            name: required("name")?,
            description: v.text("description"),
            category: required("category")?,
            condition: required("condition")?,
            age_range: required("age_range")?,
            location: v.text("location"),
        })
    }
}

/// Inserts a listing, creating the donor's user row on first use.
pub async fn create_toy(st: &AppState, identity: &Identity, new: NewToy) -> anyhow::Result<Toy> {
    let mut tx = st.db.begin().await.context("begin tx")?;
    user_repo::ensure_tx(&mut tx, identity).await?;
    let toy = repo::insert_tx(&mut tx, Uuid::new_v4(), &identity.uid, &new, STATUS_AVAILABLE).await?;
    tx.commit().await.context("commit tx")?;

    info!(toy_id = %toy.id, owner = %toy.owner_id, category = %toy.category, "toy listed");
    Ok(toy)
}

/// Applies a checked PATCH. The first transition into `donated` credits the
/// owner and records the donation in the same transaction.
pub async fn update_toy(
    st: &AppState,
    uid: &str,
    id: Uuid,
    plan: UpdatePlan,
) -> Result<Toy, ApiError> {
    let mut tx = st.db.begin().await.context("begin tx")?;

    let current = repo::find_for_update_tx(&mut tx, id)
        .await?
        .ok_or_else(|| ApiError::not_found("toy"))?;
    ensure_owner(&current, uid)?;

    let updated = plan
        .statement
        .query_as::<Toy>()
        .fetch_optional(&mut *tx)
        .await
        .context("update toy")?
        .ok_or_else(|| ApiError::not_found("toy"))?;

    if became_donated(&current.status, &updated.status) {
        let credited =
            user_repo::record_donation_tx(&mut tx, uid, &updated, DONATION_POINTS).await?;
        if credited {
            info!(toy_id = %id, owner = %uid, points = DONATION_POINTS, "donation credited");
        }
    }

    tx.commit().await.context("commit tx")?;
    info!(toy_id = %id, owner = %uid, status = %updated.status, "toy updated");
    Ok(updated)
}

pub async fn delete_toy(st: &AppState, uid: &str, id: Uuid) -> Result<(), ApiError> {
    let toy = load_owned(st, uid, id).await?;
    if !repo::delete(&st.db, id, uid).await? {
        return Err(ApiError::not_found("toy"));
    }
    if let Some(key) = toy.image_key.as_deref() {
        images::discard(st, key).await;
    }
    info!(toy_id = %id, owner = %uid, "toy deleted");
    Ok(())
}
