//! Parameterized statements assembled at runtime.
//!
//! Column names only ever come from `&'static str` whitelists; user input
//! travels exclusively through bound parameters.

use serde_json::{Map, Value};
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::QueryAs,
    FromRow, Postgres,
};
use uuid::Uuid;

use crate::{
    errors::ApiError,
    validation::{validate_patch, Clean, Field, Validated},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Text(String),
    Int(i64),
    Uuid(Uuid),
}

impl From<Clean> for Param {
    fn from(c: Clean) -> Self {
        match c {
            Clean::Null => Param::Null,
            Clean::Text(s) => Param::Text(s),
        }
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Text(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Text(s)
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Int(n)
    }
}

impl From<Uuid> for Param {
    fn from(id: Uuid) -> Self {
        Param::Uuid(id)
    }
}

#[derive(Debug, Clone)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl SqlStatement {
    pub fn query_as<O>(&self) -> QueryAs<'_, Postgres, O, PgArguments>
    where
        O: for<'r> FromRow<'r, PgRow>,
    {
        let mut q = sqlx::query_as::<_, O>(&self.sql);
        for p in &self.params {
            q = match p {
                Param::Null => q.bind(None::<String>),
                Param::Text(s) => q.bind(s.as_str()),
                Param::Int(n) => q.bind(*n),
                Param::Uuid(id) => q.bind(*id),
            };
        }
        q
    }
}

/// Builds `UPDATE <table> SET col = $n, ..., updated_at = now() WHERE ... RETURNING ...`
/// from a free-form JSON body checked against a field whitelist.
pub struct UpdateBuilder<'a> {
    table: &'static str,
    fields: &'a [Field],
    returning: &'static str,
}

/// A checked update: the statement plus the values that went into it.
#[derive(Debug)]
pub struct UpdatePlan {
    pub changes: Validated,
    pub statement: SqlStatement,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(table: &'static str, fields: &'a [Field]) -> Self {
        Self { table, fields, returning: "*" }
    }

    pub fn returning(mut self, columns: &'static str) -> Self {
        self.returning = columns;
        self
    }

    /// `key` is `AND`-joined into the `WHERE` clause.
    pub fn build(
        &self,
        body: &Map<String, Value>,
        key: Vec<(&'static str, Param)>,
    ) -> Result<UpdatePlan, ApiError> {
        if body.is_empty() {
            return Err(ApiError::BadRequest("no updatable fields".into()));
        }
        let changes = validate_patch(self.fields, body).map_err(ApiError::Validation)?;
        if changes.is_empty() {
            return Err(ApiError::BadRequest("no updatable fields".into()));
        }

        let mut params: Vec<Param> = Vec::new();
        let mut sets: Vec<String> = Vec::new();
        for (col, value) in changes.iter() {
            params.push(value.clone().into());
            sets.push(format!("{} = ${}", col, params.len()));
        }
        sets.push("updated_at = now()".into());

        let mut preds: Vec<String> = Vec::with_capacity(key.len());
        for (col, value) in key {
            params.push(value);
            preds.push(format!("{} = ${}", col, params.len()));
        }

        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        if !preds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&preds.join(" AND "));
        }
        sql.push_str(" RETURNING ");
        sql.push_str(self.returning);

        Ok(UpdatePlan {
            changes,
            statement: SqlStatement { sql, params },
        })
    }
}

/// `SELECT` with optional filters and pagination.
pub struct SelectBuilder {
    head: String,
    preds: Vec<String>,
    params: Vec<Param>,
    order_by: Option<&'static str>,
    page: Option<(i64, i64)>,
}

impl SelectBuilder {
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            preds: Vec::new(),
            params: Vec::new(),
            order_by: None,
            page: None,
        }
    }

    fn bind(&mut self, p: Param) -> usize {
        self.params.push(p);
        self.params.len()
    }

    /// Adds `col = $n` when a value is given.
    pub fn eq<P: Into<Param>>(mut self, col: &'static str, value: Option<P>) -> Self {
        if let Some(v) = value {
            let n = self.bind(v.into());
            self.preds.push(format!("{} = ${}", col, n));
        }
        self
    }

    /// Case-insensitive substring match over any of `cols`.
    pub fn search(mut self, cols: &[&'static str], needle: Option<&str>) -> Self {
        let Some(needle) = needle.map(str::trim).filter(|s| !s.is_empty()) else {
            return self;
        };
        let n = self.bind(Param::Text(format!("%{}%", escape_like(needle))));
        let ors: Vec<String> = cols
            .iter()
            .map(|c| format!("{} ILIKE ${} ESCAPE '\\'", c, n))
            .collect();
        self.preds.push(format!("({})", ors.join(" OR ")));
        self
    }

    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order_by = Some(clause);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.page = Some((limit, offset));
        self
    }

    pub fn build(mut self) -> SqlStatement {
        let mut sql = self.head.clone();
        if !self.preds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.preds.join(" AND "));
        }
        if let Some(order) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some((limit, offset)) = self.page {
            let l = self.bind(Param::Int(limit));
            let o = self.bind(Param::Int(offset));
            sql.push_str(&format!(" LIMIT ${} OFFSET ${}", l, o));
        }
        SqlStatement { sql, params: self.params }
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Rule;
    use serde_json::json;

    const FIELDS: &[Field] = &[
        Field::new("name", Rule::Text { min: 1, max: 20, nullable: false }),
        Field::new("notes", Rule::Text { min: 0, max: 20, nullable: true }),
        Field::new("status", Rule::OneOf(&["open", "closed"])),
    ];

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn update_numbers_placeholders_in_order() {
        let id = Uuid::new_v4();
        let plan = UpdateBuilder::new("things", FIELDS)
            .returning("id, name")
            .build(
                &obj(json!({ "name": " Kite ", "notes": null })),
                vec![("id", id.into()), ("owner_id", "u1".into())],
            )
            .unwrap();

        assert_eq!(
            plan.statement.sql,
            "UPDATE things SET name = $1, notes = $2, updated_at = now() \
             WHERE id = $3 AND owner_id = $4 RETURNING id, name"
        );
        assert_eq!(
            plan.statement.params,
            vec![
                Param::Text("Kite".into()),
                Param::Null,
                Param::Uuid(id),
                Param::Text("u1".into()),
            ]
        );
        assert_eq!(plan.changes.text("name").as_deref(), Some("Kite"));
    }

    #[test]
    fn update_rejects_non_whitelisted_columns() {
        let err = UpdateBuilder::new("things", FIELDS)
            .build(&obj(json!({ "owner_id": "me", "name": "x" })), vec![])
            .unwrap_err();
        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert!(fields.contains_key("owner_id"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn update_requires_at_least_one_field() {
        let err = UpdateBuilder::new("things", FIELDS)
            .build(&Map::new(), vec![("id", Param::Int(1))])
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "no updatable fields"));
    }

    #[test]
    fn select_without_filters_only_pages() {
        let stmt = SelectBuilder::new("SELECT * FROM things")
            .eq::<&str>("status", None)
            .search(&["name"], Some("   "))
            .order_by("created_at DESC")
            .page(20, 0)
            .build();
        assert_eq!(stmt.sql, "SELECT * FROM things ORDER BY created_at DESC LIMIT $1 OFFSET $2");
        assert_eq!(stmt.params, vec![Param::Int(20), Param::Int(0)]);
    }

    #[test]
    fn select_filters_share_one_search_placeholder() {
        let stmt = SelectBuilder::new("SELECT * FROM things")
            .eq("status", Some("open"))
            .search(&["name", "notes"], Some("50%_off"))
            .page(5, 10)
            .build();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM things WHERE status = $1 AND \
             (name ILIKE $2 ESCAPE '\\' OR notes ILIKE $2 ESCAPE '\\') LIMIT $3 OFFSET $4"
        );
        assert_eq!(stmt.params[1], Param::Text("%50\\%\\_off%".into()));
    }
}
