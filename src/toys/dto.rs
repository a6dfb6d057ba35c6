use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::Toy;
use crate::validation::{Field, Rule};

pub const CATEGORIES: &[&str] = &[
    "action_figures",
    "board_games",
    "books",
    "building",
    "dolls",
    "educational",
    "electronics",
    "outdoor",
    "plush",
    "puzzles",
    "vehicles",
    "other",
];
pub const CONDITIONS: &[&str] = &["new", "like_new", "good", "fair"];
pub const AGE_RANGES: &[&str] = &["0-2", "3-5", "6-8", "9-12", "13+"];
pub const STATUSES: &[&str] = &["available", "pending", "donated"];

pub const STATUS_AVAILABLE: &str = "available";
pub const STATUS_DONATED: &str = "donated";

const NAME: Field = Field::new("name", Rule::Text { min: 1, max: 100, nullable: false }).required();
const DESCRIPTION: Field = Field::new("description", Rule::Text { min: 0, max: 2000, nullable: true });
const CATEGORY: Field = Field::new("category", Rule::OneOf(CATEGORIES)).required();
const CONDITION: Field = Field::new("condition", Rule::OneOf(CONDITIONS)).required();
const AGE_RANGE: Field = Field::new("age_range", Rule::OneOf(AGE_RANGES)).required();
const LOCATION: Field = Field::new("location", Rule::Text { min: 0, max: 100, nullable: true });
const STATUS: Field = Field::new("status", Rule::OneOf(STATUSES));

/// Fields accepted by `POST /toys`. New listings always start out available.
pub const TOY_CREATE_FIELDS: &[Field] = &[NAME, DESCRIPTION, CATEGORY, CONDITION, AGE_RANGE, LOCATION];

/// Fields accepted by `PATCH /toys/:id`.
pub const TOY_PATCH_FIELDS: &[Field] = &[NAME, DESCRIPTION, CATEGORY, CONDITION, AGE_RANGE, LOCATION, STATUS];

/// Toy as returned to clients.
#[derive(Debug, Serialize)]
pub struct ToyResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub condition: String,
    pub age_range: String,
    pub location: Option<String>,
    pub status: String,
    pub owner_id: String,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Toy> for ToyResponse {
    fn from(t: Toy) -> Self {
        let image_url = t
            .image_key
            .as_ref()
            .map(|_| format!("/api/v1/toys/{}/image", t.id));
        Self {
            id: t.id,
            name: t.name,
            description: t.description,
            category: t.category,
            condition: t.condition,
            age_range: t.age_range,
            location: t.location,
            status: t.status,
            owner_id: t.owner_id,
            image_url,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

/// Query string of `GET /toys`.
#[derive(Debug, Default, Deserialize)]
pub struct ToyQuery {
    pub category: Option<String>,
    pub condition: Option<String>,
    pub age_range: Option<String>,
    pub status: Option<String>,
    pub owner: Option<String>,
    pub q: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

pub const MAX_LIMIT: i64 = 100;

impl ToyQuery {
    /// Clamped `(limit, offset)`.
    pub fn page(&self) -> (i64, i64) {
        (self.limit.clamp(1, MAX_LIMIT), self.offset.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn toy(image_key: Option<&str>) -> Toy {
        Toy {
            id: Uuid::nil(),
            owner_id: "u1".into(),
            name: "Wooden train".into(),
            description: None,
            category: "vehicles".into(),
            condition: "good".into(),
            age_range: "3-5".into(),
            location: Some("Leeds".into()),
            status: "available".into(),
            image_key: image_key.map(String::from),
            created_at: datetime!(2024-12-01 10:00 UTC),
            updated_at: datetime!(2024-12-02 10:00 UTC),
        }
    }

    #[test]
    fn response_hides_storage_key() {
        let json = serde_json::to_value(ToyResponse::from(toy(Some("toys/u1/secret.png")))).unwrap();
        assert_eq!(
            json["image_url"],
            "/api/v1/toys/00000000-0000-0000-0000-000000000000/image"
        );
        assert!(!json.to_string().contains("secret.png"));
        assert_eq!(json["created_at"], "2024-12-01T10:00:00Z");
    }

    #[test]
    fn response_without_image_has_null_url() {
        let json = serde_json::to_value(ToyResponse::from(toy(None))).unwrap();
        assert!(json["image_url"].is_null());
    }

    #[test]
    fn page_is_clamped() {
        let q = ToyQuery { limit: 1000, offset: -5, ..Default::default() };
        assert_eq!(q.page(), (MAX_LIMIT, 0));
        let q = ToyQuery { limit: 0, offset: 40, ..Default::default() };
        assert_eq!(q.page(), (1, 40));
    }

    #[test]
    fn status_is_patchable_but_not_creatable() {
        assert!(TOY_PATCH_FIELDS.iter().any(|f| f.name == "status"));
        assert!(!TOY_CREATE_FIELDS.iter().any(|f| f.name == "status"));
        assert!(!TOY_PATCH_FIELDS.iter().any(|f| f.name == "owner_id" || f.name == "image_key"));
    }
}
