use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{Donation, User, WishlistRow, USER_COLUMNS};
use crate::{auth::Identity, toys::Toy};

/// Optional profile values given at registration.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
}

pub async fn find(db: &PgPool, id: &str) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user")
}

/// Inserts the row unless it already exists; `None` means it did.
pub async fn create(
    db: &PgPool,
    identity: &Identity,
    profile: &NewProfile,
) -> anyhow::Result<Option<User>> {
    let sql = format!(
        r#"
        INSERT INTO users (id, email, display_name, bio, location, avatar_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        RETURNING {}
        "#,
        USER_COLUMNS
    );
    let display_name = profile
        .display_name
        .clone()
        .unwrap_or_else(|| identity.default_display_name());
    sqlx::query_as::<_, User>(&sql)
        .bind(&identity.uid)
        .bind(&identity.email)
        .bind(display_name)
        .bind(&profile.bio)
        .bind(&profile.location)
        .bind(&profile.avatar_url)
        .fetch_optional(db)
        .await
        .context("create user")
}

/// Makes sure the caller has a row before something references it.
pub async fn ensure_tx(tx: &mut Transaction<'_, Postgres>, identity: &Identity) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, display_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&identity.uid)
    .bind(&identity.email)
    .bind(identity.default_display_name())
    .execute(&mut **tx)
    .await
    .context("ensure user")?;
    Ok(())
}

/// Writes the donation history row and credits the donor. A toy is only
/// ever credited once; returns whether this call did it.
pub async fn record_donation_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    toy: &Toy,
    points: i64,
) -> anyhow::Result<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO donations (id, user_id, toy_id, toy_name, points)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (toy_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(toy.id)
    .bind(&toy.name)
    .bind(points)
    .execute(&mut **tx)
    .await
    .context("insert donation")?
    .rows_affected();

    if inserted == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE users SET points = points + $1, updated_at = now() WHERE id = $2")
        .bind(points)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("credit points")?;
    Ok(true)
}

pub async fn list_donations(db: &PgPool, user_id: &str) -> anyhow::Result<Vec<Donation>> {
    sqlx::query_as::<_, Donation>(
        r#"
        SELECT d.id, d.toy_id, d.toy_name, d.points, d.donated_at,
               t.id AS t_id, t.owner_id AS t_owner_id, t.name AS t_name,
               t.description AS t_description, t.category AS t_category,
               t.condition AS t_condition, t.age_range AS t_age_range,
               t.location AS t_location, t.status AS t_status, t.image_key AS t_image_key,
               t.created_at AS t_created_at, t.updated_at AS t_updated_at
          FROM donations d
          LEFT JOIN toys t ON t.id = d.toy_id
         WHERE d.user_id = $1
         ORDER BY d.donated_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list donations")
}

pub async fn count_donations(db: &PgPool, user_id: &str) -> anyhow::Result<i64> {
    let (n,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM donations WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("count donations")?;
    Ok(n)
}

pub async fn list_wishlist(db: &PgPool, user_id: &str) -> anyhow::Result<Vec<WishlistRow>> {
    sqlx::query_as::<_, WishlistRow>(
        r#"
        SELECT t.id, t.owner_id, t.name, t.description, t.category, t.condition, t.age_range,
               t.location, t.status, t.image_key, t.created_at, t.updated_at,
               w.created_at AS wished_at
          FROM wishlist w
          JOIN toys t ON t.id = w.toy_id
         WHERE w.user_id = $1
         ORDER BY w.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list wishlist")
}

pub async fn add_wish_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    toy_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO wishlist (user_id, toy_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, toy_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(toy_id)
    .execute(&mut **tx)
    .await
    .context("add wish")?;
    Ok(())
}

pub async fn remove_wish(db: &PgPool, user_id: &str, toy_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND toy_id = $2")
        .bind(user_id)
        .bind(toy_id)
        .execute(db)
        .await
        .context("remove wish")?;
    Ok(())
}

pub async fn count_wishlist(db: &PgPool, user_id: &str) -> anyhow::Result<i64> {
    let (n,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM wishlist WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("count wishlist")?;
    Ok(n)
}
