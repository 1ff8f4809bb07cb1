//! Database operations for payment records.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::shared::payment::Payment;

const PAYMENT_COLUMNS: &str = "id, client_name, client_phone, user_id, source, amount, tx_id, \
     method, image_url, created_by_role, created_at, updated_at";

/// Fields for a new payment row
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub client_name: String,
    pub client_phone: Option<String>,
    pub user_id: Uuid,
    pub source: String,
    pub amount: f64,
    pub tx_id: String,
    pub method: String,
    pub image_url: String,
    pub created_by_role: String,
}

/// Partial update applied by an admin; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub source: Option<String>,
    pub amount: Option<f64>,
    pub tx_id: Option<String>,
    pub method: Option<String>,
    pub image_url: Option<String>,
}

/// Listing filters. `user_id` limits to one creator (non-admin callers).
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<Uuid>,
    pub method: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Create a payment record.
pub async fn create_payment(pool: &PgPool, new: NewPayment) -> Result<Payment, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO payments (id, client_name, client_phone, user_id, source, amount, tx_id,
                              method, image_url, created_by_role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        RETURNING {PAYMENT_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Payment>(&query)
        .bind(Uuid::new_v4())
        .bind(&new.client_name)
        .bind(&new.client_phone)
        .bind(new.user_id)
        .bind(&new.source)
        .bind(new.amount)
        .bind(&new.tx_id)
        .bind(&new.method)
        .bind(&new.image_url)
        .bind(&new.created_by_role)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
}

/// Look up a payment by id.
pub async fn get_payment(pool: &PgPool, id: Uuid) -> Result<Option<Payment>, sqlx::Error> {
    let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
    sqlx::query_as::<_, Payment>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Filtered listing, newest first.
pub async fn list_payments(
    pool: &PgPool,
    filter: PaymentFilter,
) -> Result<Vec<Payment>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {PAYMENT_COLUMNS} FROM payments
        WHERE ($1::uuid IS NULL OR user_id = $1)
          AND ($2::text IS NULL OR method = $2)
          AND ($3::timestamptz IS NULL OR created_at >= $3)
          AND ($4::timestamptz IS NULL OR created_at <= $4)
        ORDER BY created_at DESC
        "#
    );
    sqlx::query_as::<_, Payment>(&query)
        .bind(filter.user_id)
        .bind(filter.method)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(pool)
        .await
}

/// Apply a partial update; untouched columns keep their value.
pub async fn update_payment(
    pool: &PgPool,
    id: Uuid,
    update: PaymentUpdate,
) -> Result<Option<Payment>, sqlx::Error> {
    let query = format!(
        r#"
        UPDATE payments SET
            client_name = COALESCE($2, client_name),
            client_phone = COALESCE($3, client_phone),
            source = COALESCE($4, source),
            amount = COALESCE($5, amount),
            tx_id = COALESCE($6, tx_id),
            method = COALESCE($7, method),
            image_url = COALESCE($8, image_url),
            updated_at = $9
        WHERE id = $1
        RETURNING {PAYMENT_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Payment>(&query)
        .bind(id)
        .bind(update.client_name)
        .bind(update.client_phone)
        .bind(update.source)
        .bind(update.amount)
        .bind(update.tx_id)
        .bind(update.method)
        .bind(update.image_url)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
}

/// Delete a payment row. Returns whether it existed.
pub async fn delete_payment(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM payments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
