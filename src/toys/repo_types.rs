use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const TOY_COLUMNS: &str = "id, owner_id, name, description, category, condition, age_range, \
                               location, status, image_key, created_at, updated_at";

/// Toy listing row.
#[derive(Debug, Clone, FromRow)]
pub struct Toy {
    pub id: Uuid,
    pub owner_id: String,               // identity provider uid of the donor
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub condition: String,
    pub age_range: String,
    pub location: Option<String>,
    pub status: String,
    pub image_key: Option<String>,      // object storage key, never exposed
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Listing counts per status for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub available: i64,
    pub pending: i64,
    pub donated: i64,
}

impl StatusCounts {
    pub fn from_rows(rows: Vec<(String, i64)>) -> Self {
        let mut counts = Self::default();
        for (status, n) in rows {
            match status.as_str() {
                "available" => counts.available += n,
                "pending" => counts.pending += n,
                "donated" => counts.donated += n,
                _ => {}
            }
        }
        counts
    }

    pub fn total(&self) -> i64 {
        self.available + self.pending + self.donated
    }
}
