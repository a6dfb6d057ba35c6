use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Donation, User, WishlistRow};
use crate::toys::{dto::ToyResponse, StatusCounts};
use crate::validation::{Field, Rule};

/// Profile fields a user may set on themselves.
pub const USER_FIELDS: &[Field] = &[
    Field::new("display_name", Rule::Text { min: 1, max: 50, nullable: false }),
    Field::new("bio", Rule::Text { min: 0, max: 500, nullable: true }),
    Field::new("location", Rule::Text { min: 0, max: 100, nullable: true }),
    Field::new("avatar_url", Rule::HttpsUrl { max: 500 }),
];

/// The caller's own profile.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub points: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            display_name: u.display_name,
            bio: u.bio,
            location: u.location,
            avatar_url: u.avatar_url,
            points: u.points,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// What other people see; no email.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub points: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub member_since: OffsetDateTime,
}

impl From<User> for PublicProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            display_name: u.display_name,
            bio: u.bio,
            location: u.location,
            avatar_url: u.avatar_url,
            points: u.points,
            member_since: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WishRequest {
    pub toy_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WishlistItem {
    pub toy: ToyResponse,
    #[serde(with = "time::serde::rfc3339")]
    pub wished_at: OffsetDateTime,
}

impl From<WishlistRow> for WishlistItem {
    fn from(r: WishlistRow) -> Self {
        Self {
            toy: r.toy.into(),
            wished_at: r.wished_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DonationResponse {
    pub id: Uuid,
    pub toy_id: Option<Uuid>,
    pub toy_name: String,
    pub points: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub donated_at: OffsetDateTime,
    /// `null` once the listing has been deleted.
    pub toy: Option<ToyResponse>,
}

impl From<Donation> for DonationResponse {
    fn from(d: Donation) -> Self {
        Self {
            id: d.id,
            toy_id: d.toy_id,
            toy_name: d.toy_name,
            points: d.points,
            donated_at: d.donated_at,
            toy: d.toy.map(ToyResponse::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListingSummary {
    pub available: i64,
    pub pending: i64,
    pub donated: i64,
    pub total: i64,
}

impl From<StatusCounts> for ListingSummary {
    fn from(c: StatusCounts) -> Self {
        Self {
            total: c.total(),
            available: c.available,
            pending: c.pending,
            donated: c.donated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub profile: UserResponse,
    pub points: i64,
    pub listings: ListingSummary,
    pub wishlist_count: i64,
    pub donation_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toys::Toy;
    use time::macros::datetime;

    fn user() -> User {
        User {
            id: "auth0|42".into(),
            email: Some("kim@example.org".into()),
            display_name: "Kim".into(),
            bio: None,
            location: Some("Porto".into()),
            avatar_url: None,
            points: 30,
            created_at: datetime!(2025-01-05 08:30 UTC),
            updated_at: datetime!(2025-01-06 08:30 UTC),
        }
    }

    #[test]
    fn public_profile_omits_email() {
        let json = serde_json::to_value(PublicProfile::from(user())).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["points"], 30);
        assert_eq!(json["member_since"], "2025-01-05T08:30:00Z");
    }

    #[test]
    fn own_profile_includes_email() {
        let json = serde_json::to_value(UserResponse::from(user())).unwrap();
        assert_eq!(json["email"], "kim@example.org");
    }

    #[test]
    fn listing_summary_totals() {
        let summary = ListingSummary::from(StatusCounts::from_rows(vec![
            ("available".into(), 3),
            ("donated".into(), 2),
            ("archived".into(), 7),
        ]));
        assert_eq!(summary.available, 3);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.total, 5);
    }

    fn donation(toy: Option<Toy>) -> Donation {
        Donation {
            id: Uuid::nil(),
            toy_id: toy.as_ref().map(|t| t.id),
            toy_name: "Rocking horse".into(),
            points: 10,
            donated_at: datetime!(2025-02-01 12:00 UTC),
            toy,
        }
    }

    #[test]
    fn donation_embeds_the_current_listing() {
        let horse = Toy {
            id: Uuid::from_u128(7),
            owner_id: "auth0|42".into(),
            name: "Rocking horse (wooden)".into(),
            description: None,
            category: "outdoor".into(),
            condition: "good".into(),
            age_range: "3-5".into(),
            location: None,
            status: "donated".into(),
            image_key: Some("toys/auth0_42/horse.jpg".into()),
            created_at: datetime!(2025-01-10 09:00 UTC),
            updated_at: datetime!(2025-02-01 12:00 UTC),
        };
        let json = serde_json::to_value(DonationResponse::from(donation(Some(horse)))).unwrap();
        assert_eq!(json["toy_name"], "Rocking horse");
        assert_eq!(json["toy"]["name"], "Rocking horse (wooden)");
        assert_eq!(json["toy"]["status"], "donated");
        assert_eq!(
            json["toy"]["image_url"],
            format!("/api/v1/toys/{}/image", Uuid::from_u128(7))
        );
    }

    #[test]
    fn donation_of_a_deleted_listing_keeps_the_snapshot() {
        let json = serde_json::to_value(DonationResponse::from(donation(None))).unwrap();
        assert!(json["toy"].is_null());
        assert!(json["toy_id"].is_null());
        assert_eq!(json["points"], 10);
    }

    #[test]
    fn points_and_email_are_not_user_editable() {
        for name in ["id", "email", "points"] {
            assert!(!USER_FIELDS.iter().any(|f| f.name == name));
        }
    }
}
