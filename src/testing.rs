//! Seed data for the database-backed tests.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::Identity,
    toys::{
        repo::{self as toy_repo, NewToy},
        Toy,
    },
    users::repo as user_repo,
};

pub fn identity(uid: &str) -> Identity {
    Identity {
        uid: uid.to_string(),
        email: Some(format!("{}@example.org", uid)),
    }
}

pub async fn seed_user(db: &PgPool, uid: &str) {
    let mut tx = db.begin().await.unwrap();
    user_repo::ensure_tx(&mut tx, &identity(uid)).await.unwrap();
    tx.commit().await.unwrap();
}

/// An `available` listing owned by `owner`, creating the owner on the way.
pub async fn seed_toy(db: &PgPool, owner: &str, name: &str) -> Toy {
    let new = NewToy {
        name: name.to_string(),
        description: None,
        category: "outdoor".into(),
        condition: "good".into(),
        age_range: "6-8".into(),
        location: None,
    };
    let mut tx = db.begin().await.unwrap();
    user_repo::ensure_tx(&mut tx, &identity(owner)).await.unwrap();
    let toy = toy_repo::insert_tx(&mut tx, Uuid::new_v4(), owner, &new, "available")
        .await
        .unwrap();
    tx.commit().await.unwrap();
    toy
}
