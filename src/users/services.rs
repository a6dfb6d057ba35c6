use anyhow::Context;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use super::dto::{Dashboard, USER_FIELDS};
use super::repo::{self, NewProfile};
use super::repo_types::{User, USER_COLUMNS};
use crate::{
    auth::Identity,
    errors::ApiError,
    sql::UpdateBuilder,
    state::AppState,
    toys::{self, repo as toy_repo, Toy},
    validation::Validated,
};

impl NewProfile {
    pub fn from_validated(v: &Validated) -> Self {
        Self {
            display_name: v.text("display_name"),
            bio: v.text("bio"),
            location: v.text("location"),
            avatar_url: v.text("avatar_url"),
        }
    }
}

/// Outcome of `POST /users`.
pub enum Registration {
    Created(User),
    Existing(User),
}

pub async fn register(
    st: &AppState,
    identity: &Identity,
    profile: &NewProfile,
) -> Result<Registration, ApiError> {
    if let Some(user) = repo::create(&st.db, identity, profile).await? {
        info!(uid = %user.id, "user registered");
        return Ok(Registration::Created(user));
    }
    let user = repo::find(&st.db, &identity.uid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user {} vanished after conflict", identity.uid))?;
    Ok(Registration::Existing(user))
}

pub async fn me(st: &AppState, uid: &str) -> Result<User, ApiError> {
    repo::find(&st.db, uid)
        .await?
        .ok_or_else(|| ApiError::not_found("profile"))
}

/// Whitelisted PATCH of the caller's own profile.
pub async fn update_profile(
    st: &AppState,
    uid: &str,
    body: &Map<String, Value>,
) -> Result<User, ApiError> {
    let plan = UpdateBuilder::new("users", USER_FIELDS)
        .returning(USER_COLUMNS)
        .build(body, vec![("id", uid.into())])?;

    let user = plan
        .statement
        .query_as::<User>()
        .fetch_optional(&st.db)
        .await
        .context("update profile")?
        .ok_or_else(|| ApiError::not_found("profile"))?;

    let changed: Vec<&str> = plan.changes.iter().map(|(name, _)| *name).collect();
    info!(uid = %uid, ?changed, "profile updated");
    Ok(user)
}

pub async fn add_wish(st: &AppState, identity: &Identity, toy_id: Uuid) -> Result<Toy, ApiError> {
    let toy = toys::services::load(st, toy_id).await?;
    if toy.owner_id == identity.uid {
        return Err(ApiError::BadRequest("cannot wish for your own toy".into()));
    }

    let mut tx = st.db.begin().await.context("begin tx")?;
    repo::ensure_tx(&mut tx, identity).await?;
    repo::add_wish_tx(&mut tx, &identity.uid, toy_id).await?;
    tx.commit().await.context("commit tx")?;

    info!(uid = %identity.uid, toy_id = %toy_id, "toy wished for");
    Ok(toy)
}

pub async fn dashboard(st: &AppState, uid: &str) -> Result<Dashboard, ApiError> {
    let user = me(st, uid).await?;
    let (listings, wishlist_count, donation_count) = tokio::try_join!(
        toy_repo::status_counts(&st.db, uid),
        repo::count_wishlist(&st.db, uid),
        repo::count_donations(&st.db, uid),
    )?;
    Ok(Dashboard {
        points: user.points,
        profile: user.into(),
        listings: listings.into(),
        wishlist_count,
        donation_count,
    })
}
