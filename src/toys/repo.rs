use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::dto::ToyQuery;
use super::repo_types::{StatusCounts, Toy, TOY_COLUMNS};
use crate::sql::{SelectBuilder, SqlStatement};

/// Values of a new listing after validation.
#[derive(Debug, Clone)]
pub struct NewToy {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub condition: String,
    pub age_range: String,
    pub location: Option<String>,
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Toy>> {
    let sql = format!("SELECT {} FROM toys WHERE id = $1", TOY_COLUMNS);
    sqlx::query_as::<_, Toy>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find toy")
}

/// Locks the row for the rest of the transaction.
pub async fn find_for_update_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> anyhow::Result<Option<Toy>> {
    let sql = format!("SELECT {} FROM toys WHERE id = $1 FOR UPDATE", TOY_COLUMNS);
    sqlx::query_as::<_, Toy>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .context("lock toy")
}

pub fn browse_statement(q: &ToyQuery) -> SqlStatement {
    let (limit, offset) = q.page();
    SelectBuilder::new(format!("SELECT {} FROM toys", TOY_COLUMNS))
        .eq("category", q.category.as_deref())
        .eq("condition", q.condition.as_deref())
        .eq("age_range", q.age_range.as_deref())
        .eq("status", q.status.as_deref())
        .eq("owner_id", q.owner.as_deref())
        .search(&["name", "description"], q.q.as_deref())
        .order_by("created_at DESC, id")
        .page(limit, offset)
        .build()
}

pub async fn browse(db: &PgPool, q: &ToyQuery) -> anyhow::Result<Vec<Toy>> {
    let stmt = browse_statement(q);
    stmt.query_as::<Toy>()
        .fetch_all(db)
        .await
        .context("browse toys")
}

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    owner_id: &str,
    toy: &NewToy,
    status: &str,
) -> anyhow::Result<Toy> {
    let sql = format!(
        r#"
        INSERT INTO toys (id, owner_id, name, description, category, condition, age_range, location, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        TOY_COLUMNS
    );
    sqlx::query_as::<_, Toy>(&sql)
        .bind(id)
        .bind(owner_id)
        .bind(&toy.name)
        .bind(&toy.description)
        .bind(&toy.category)
        .bind(&toy.condition)
        .bind(&toy.age_range)
        .bind(&toy.location)
        .bind(status)
        .fetch_one(&mut **tx)
        .await
        .context("insert toy")
}

pub async fn set_image_key(
    db: &PgPool,
    id: Uuid,
    owner_id: &str,
    key: Option<&str>,
) -> anyhow::Result<Option<Toy>> {
    let sql = format!(
        "UPDATE toys SET image_key = $1, updated_at = now() WHERE id = $2 AND owner_id = $3 RETURNING {}",
        TOY_COLUMNS
    );
    sqlx::query_as::<_, Toy>(&sql)
        .bind(key)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(db)
        .await
        .context("set toy image key")
}

/// Returns whether a row was removed.
pub async fn delete(db: &PgPool, id: Uuid, owner_id: &str) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM toys WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(db)
        .await
        .context("delete toy")?;
    Ok(res.rows_affected() > 0)
}

pub async fn status_counts(db: &PgPool, owner_id: &str) -> anyhow::Result<StatusCounts> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT status, COUNT(*)
          FROM toys
         WHERE owner_id = $1
         GROUP BY status
        "#,
    )
    .bind(owner_id)
    .fetch_all(db)
    .await
    .context("count toys by status")?;
    Ok(StatusCounts::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Param;
    use crate::testing::seed_toy;

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_is_scoped_to_the_owner(pool: PgPool) {
        let toy = seed_toy(&pool, "donor", "Robot").await;

        assert!(!delete(&pool, toy.id, "stranger").await.unwrap());
        assert!(find(&pool, toy.id).await.unwrap().is_some());

        assert!(delete(&pool, toy.id, "donor").await.unwrap());
        assert!(find(&pool, toy.id).await.unwrap().is_none());
        assert!(!delete(&pool, toy.id, "donor").await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn browse_filters_and_counts(pool: PgPool) {
        let kite = seed_toy(&pool, "donor", "Red kite").await;
        seed_toy(&pool, "donor", "Ball").await;
        seed_toy(&pool, "other", "Kite string").await;

        let q = ToyQuery { q: Some("KITE".into()), owner: Some("donor".into()), limit: 20, ..Default::default() };
        let found = browse(&pool, &q).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, kite.id);

        let counts = status_counts(&pool, "donor").await.unwrap();
        assert_eq!(counts.available, 2);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn browse_statement_binds_filters_in_order() {
        let q = ToyQuery {
            category: Some("plush".into()),
            status: Some("available".into()),
            q: Some("bear".into()),
            limit: 10,
            offset: 20,
            ..Default::default()
        };
        let stmt = browse_statement(&q);
        assert!(stmt.sql.contains("WHERE category = $1 AND status = $2 AND (name ILIKE $3"));
        assert!(stmt.sql.ends_with("ORDER BY created_at DESC, id LIMIT $4 OFFSET $5"));
        assert_eq!(
            stmt.params,
            vec![
                Param::Text("plush".into()),
                Param::Text("available".into()),
                Param::Text("%bear%".into()),
                Param::Int(10),
                Param::Int(20),
            ]
        );
    }

    #[test]
    fn browse_statement_without_filters() {
        let stmt = browse_statement(&ToyQuery { limit: 20, ..Default::default() });
        assert!(!stmt.sql.contains("WHERE"));
        assert_eq!(stmt.params, vec![Param::Int(20), Param::Int(0)]);
    }
}
