use sqlx::{postgres::PgRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::toys::Toy;

pub const USER_COLUMNS: &str =
    "id, email, display_name, bio, location, avatar_url, points, created_at, updated_at";

/// Per-identity user row. `id` is the identity provider's subject.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub points: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A wished-for toy and when it was added.
#[derive(Debug, Clone, FromRow)]
pub struct WishlistRow {
    #[sqlx(flatten)]
    pub toy: Toy,
    pub wished_at: OffsetDateTime,
}

/// One entry of a user's donation history. `toy_id` goes NULL when the
/// listing is deleted later; the name is kept as it was at donation time.
#[derive(Debug, Clone)]
pub struct Donation {
    pub id: Uuid,
    pub toy_id: Option<Uuid>,
    pub toy_name: String,
    pub points: i64,
    pub donated_at: OffsetDateTime,
    /// The listing as it is now, if it still exists.
    pub toy: Option<Toy>,
}

/// Reads a `donations d LEFT JOIN toys t` row; toy columns carry a `t_` prefix.
impl<'r> FromRow<'r, PgRow> for Donation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let toy = match row.try_get::<Option<Uuid>, _>("t_id")? {
            Some(id) => Some(Toy {
                id,
                owner_id: row.try_get("t_owner_id")?,
                name: row.try_get("t_name")?,
                description: row.try_get("t_description")?,
                category: row.try_get("t_category")?,
                condition: row.try_get("t_condition")?,
                age_range: row.try_get("t_age_range")?,
                location: row.try_get("t_location")?,
                status: row.try_get("t_status")?,
                image_key: row.try_get("t_image_key")?,
                created_at: row.try_get("t_created_at")?,
                updated_at: row.try_get("t_updated_at")?,
            }),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            toy_id: row.try_get("toy_id")?,
            toy_name: row.try_get("toy_name")?,
            points: row.try_get("points")?,
            donated_at: row.try_get("donated_at")?,
            toy,
        })
    }
}
