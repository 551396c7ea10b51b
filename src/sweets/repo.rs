use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::sweets::dto::{SearchQuery, UpdateSweetRequest};

const SWEET_COLUMNS: &str =
    "id, name, category, price, quantity, description, image_url, created_by, created_at, updated_at";

/// Product record. `quantity` never goes negative: the schema carries a CHECK
/// constraint and purchase decrements are conditional.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sweet {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub async fn create(
    db: &PgPool,
    name: &str,
    category: &str,
    price: f64,
    quantity: i32,
    description: Option<&str>,
    image_url: Option<&str>,
    created_by: i64,
) -> sqlx::Result<Sweet> {
    sqlx::query_as::<_, Sweet>(&format!(
        r#"
        INSERT INTO sweets (name, category, price, quantity, description, image_url, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {SWEET_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(category)
    .bind(price)
    .bind(quantity)
    .bind(description)
    .bind(image_url)
    .bind(created_by)
    .fetch_one(db)
    .await
}

pub async fn find_all(db: &PgPool) -> sqlx::Result<Vec<Sweet>> {
    sqlx::query_as::<_, Sweet>(&format!(
        "SELECT {SWEET_COLUMNS} FROM sweets ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await
}

pub async fn find_by_id(db: &PgPool, id: i64) -> sqlx::Result<Option<Sweet>> {
    sqlx::query_as::<_, Sweet>(&format!(
        "SELECT {SWEET_COLUMNS} FROM sweets WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Optional AND-combined filters; name/category are case-insensitive
/// substring matches, price bounds inclusive.
pub async fn search(db: &PgPool, filters: &SearchQuery) -> sqlx::Result<Vec<Sweet>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {SWEET_COLUMNS} FROM sweets WHERE 1=1"
    ));
    if let Some(name) = &filters.name {
        qb.push(" AND name ILIKE ");
        qb.push_bind(format!("%{name}%"));
    }
    if let Some(category) = &filters.category {
        qb.push(" AND category ILIKE ");
        qb.push_bind(format!("%{category}%"));
    }
    if let Some(min) = filters.min_price {
        qb.push(" AND price >= ");
        qb.push_bind(min);
    }
    if let Some(max) = filters.max_price {
        qb.push(" AND price <= ");
        qb.push_bind(max);
    }
    qb.push(" ORDER BY created_at DESC");
    qb.build_query_as::<Sweet>().fetch_all(db).await
}

/// Partial update; an empty patch is a plain read.
pub async fn update(
    db: &PgPool,
    id: i64,
    patch: &UpdateSweetRequest,
) -> sqlx::Result<Option<Sweet>> {
    if patch.is_empty() {
        return find_by_id(db, id).await;
    }

    let mut qb = QueryBuilder::<Postgres>::new("UPDATE sweets SET ");
    let mut fields = qb.separated(", ");
    if let Some(name) = &patch.name {
        fields.push("name = ");
        fields.push_bind_unseparated(name);
    }
    if let Some(category) = &patch.category {
        fields.push("category = ");
        fields.push_bind_unseparated(category);
    }
    if let Some(price) = patch.price {
        fields.push("price = ");
        fields.push_bind_unseparated(price);
    }
    if let Some(quantity) = patch.quantity {
        fields.push("quantity = ");
        fields.push_bind_unseparated(quantity);
    }
    if let Some(description) = &patch.description {
        fields.push("description = ");
        fields.push_bind_unseparated(description);
    }
    if let Some(image_url) = &patch.image_url {
        fields.push("image_url = ");
        fields.push_bind_unseparated(image_url);
    }
    qb.push(", updated_at = now() WHERE id = ");
    qb.push_bind(id);
    qb.push(format!(" RETURNING {SWEET_COLUMNS}"));

    qb.build_query_as::<Sweet>().fetch_optional(db).await
}

/// Returns whether a row was actually removed.
pub async fn delete(db: &PgPool, id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM sweets WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Sufficiency check and decrement in one statement, evaluated atomically by
/// Postgres. `None` means either the sweet is absent or stock is short; the
/// caller disambiguates with a point read on the failure path only.
pub async fn purchase(db: &PgPool, id: i64, quantity: i32) -> sqlx::Result<Option<Sweet>> {
    sqlx::query_as::<_, Sweet>(&format!(
        r#"
        UPDATE sweets
        SET quantity = quantity - $1, updated_at = now()
        WHERE id = $2 AND quantity >= $1
        RETURNING {SWEET_COLUMNS}
        "#
    ))
    .bind(quantity)
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Unconditional increment; increments commute so there is no race to close.
pub async fn restock(db: &PgPool, id: i64, quantity: i32) -> sqlx::Result<Option<Sweet>> {
    sqlx::query_as::<_, Sweet>(&format!(
        r#"
        UPDATE sweets
        SET quantity = quantity + $1, updated_at = now()
        WHERE id = $2
        RETURNING {SWEET_COLUMNS}
        "#
    ))
    .bind(quantity)
    .bind(id)
    .fetch_optional(db)
    .await
}
