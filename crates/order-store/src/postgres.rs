use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderStatus};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AccountKey, CatalogId, DecisionEmail, OrderId, OrderQuery, OrderRecord, Payment, Result,
    StoreError,
    catalog::{CatalogStore, FoodItem, PaymentQr},
    store::{ClaimPolicy, Decision, EmailOutcome, OrderStore, UploadOutcome},
};

const ORDER_COLUMNS: &str = "id, account_key, transaction_id_normalized, status, rejection_reason, \
     team, items, subtotal, total_items, \
     payment_transaction_id, payment_screenshot_url, payment_storage_id, payment_screenshot_name, \
     payment_upload_status, payment_upload_error, \
     decision_email_type, decision_email_status, decision_email_attempts, decision_email_last_error, \
     decision_email_queued_at, decision_email_last_attempt_at, decision_email_sent_at, \
     created_at, updated_at";

/// Predicate matching orders whose decision email may be claimed.
///
/// `cutoff` is the placeholder number bound to the reclaim cutoff.
fn claimable(cutoff: usize) -> String {
    format!(
        "status <> 'Placed' AND (decision_email_status = 'queued' \
         OR (decision_email_status = 'sending' \
             AND (decision_email_last_attempt_at IS NULL OR decision_email_last_attempt_at < ${cutoff})))"
    )
}

/// PostgreSQL-backed order store.
///
/// Each conditional mutation is a single `UPDATE ... WHERE <predicate>
/// RETURNING`, so concurrent callers serialize on the row lock and exactly
/// one of them observes the predicate as true.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        let account_key: String = row.try_get("account_key")?;
        let account_key = AccountKey::parse(&account_key)
            .ok_or_else(|| StoreError::Corrupt("empty account key".to_string()))?;

        Ok(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            account_key,
            transaction_id_normalized: row.try_get("transaction_id_normalized")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            rejection_reason: row.try_get("rejection_reason")?,
            team: serde_json::from_value(row.try_get("team")?)?,
            items: serde_json::from_value(row.try_get("items")?)?,
            subtotal: Money::from_minor(row.try_get("subtotal")?),
            total_items: to_u32(row.try_get("total_items")?)?,
            payment: Payment {
                transaction_id: row.try_get("payment_transaction_id")?,
                screenshot_url: row.try_get("payment_screenshot_url")?,
                storage_id: row.try_get("payment_storage_id")?,
                screenshot_name: row.try_get("payment_screenshot_name")?,
                upload_status: row.try_get::<String, _>("payment_upload_status")?.parse()?,
                upload_error: row.try_get("payment_upload_error")?,
            },
            decision_email: DecisionEmail {
                kind: row.try_get::<String, _>("decision_email_type")?.parse()?,
                status: row.try_get::<String, _>("decision_email_status")?.parse()?,
                attempts: to_u32(row.try_get("decision_email_attempts")?)?,
                last_error: row.try_get("decision_email_last_error")?,
                queued_at: row.try_get("decision_email_queued_at")?,
                last_attempt_at: row.try_get("decision_email_last_attempt_at")?,
                sent_at: row.try_get("decision_email_sent_at")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_order(
        &self,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<OrderRecord>> {
        query
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }
}

fn to_u32(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative counter: {value}")))
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_order(&self, order: OrderRecord) -> Result<OrderRecord> {
        let sql = format!(
            r#"
            INSERT INTO orders (
                id, account_key, transaction_id_normalized, status, rejection_reason,
                team, items, subtotal, total_items,
                payment_transaction_id, payment_screenshot_url, payment_storage_id,
                payment_screenshot_name, payment_upload_status, payment_upload_error,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let normalized = order.transaction_id_normalized.clone();

        let row = sqlx::query(&sql)
            .bind(order.id.as_uuid())
            .bind(order.account_key.as_str())
            .bind(&order.transaction_id_normalized)
            .bind(order.status.as_str())
            .bind(&order.rejection_reason)
            .bind(serde_json::to_value(&order.team)?)
            .bind(serde_json::to_value(&order.items)?)
            .bind(order.subtotal.minor())
            .bind(order.total_items as i32)
            .bind(&order.payment.transaction_id)
            .bind(&order.payment.screenshot_url)
            .bind(&order.payment.storage_id)
            .bind(&order.payment.screenshot_name)
            .bind(order.payment.upload_status.as_str())
            .bind(&order.payment.upload_error)
            .bind(order.created_at)
            .bind(order.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_transaction_id_normalized")
                {
                    return StoreError::DuplicateTransactionId(normalized.clone());
                }
                StoreError::Database(e)
            })?;

        Self::row_to_order(row)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        self.fetch_order(sqlx::query(&sql).bind(id.as_uuid()))
            .await
    }

    async fn transaction_id_exists(&self, normalized: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE transaction_id_normalized = $1)",
        )
        .bind(normalized)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn record_upload(
        &self,
        id: OrderId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        match outcome {
            UploadOutcome::Uploaded { url, storage_id } => {
                let sql = format!(
                    r#"
                    UPDATE orders
                    SET payment_screenshot_url = $2, payment_storage_id = $3,
                        payment_upload_status = 'uploaded', payment_upload_error = '',
                        updated_at = $4
                    WHERE id = $1 AND payment_upload_status = 'pending'
                    RETURNING {ORDER_COLUMNS}
                    "#
                );
                self.fetch_order(
                    sqlx::query(&sql)
                        .bind(id.as_uuid())
                        .bind(url)
                        .bind(storage_id)
                        .bind(now),
                )
                .await
            }
            UploadOutcome::Failed { error } => {
                let sql = format!(
                    r#"
                    UPDATE orders
                    SET payment_upload_status = 'failed', payment_upload_error = $2, updated_at = $3
                    WHERE id = $1 AND payment_upload_status = 'pending'
                    RETURNING {ORDER_COLUMNS}
                    "#
                );
                self.fetch_order(sqlx::query(&sql).bind(id.as_uuid()).bind(error).bind(now))
                    .await
            }
        }
    }

    async fn apply_decision(
        &self,
        id: OrderId,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = $2, rejection_reason = $3,
                decision_email_type = $2, decision_email_status = 'queued',
                decision_email_attempts = 0, decision_email_last_error = '',
                decision_email_queued_at = $4, decision_email_last_attempt_at = NULL,
                decision_email_sent_at = NULL, updated_at = $4
            WHERE id = $1 AND status = 'Placed'
            RETURNING {ORDER_COLUMNS}
            "#
        );
        self.fetch_order(
            sqlx::query(&sql)
                .bind(id.as_uuid())
                .bind(decision.status().as_str())
                .bind(decision.reason())
                .bind(now),
        )
        .await
    }

    async fn mark_delivered(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        let sql = format!(
            r#"
            UPDATE orders SET status = 'Delivered', updated_at = $2
            WHERE id = $1 AND status = 'Verified'
            RETURNING {ORDER_COLUMNS}
            "#
        );
        self.fetch_order(sqlx::query(&sql).bind(id.as_uuid()).bind(now))
            .await
    }

    async fn list_claimable_decision_emails(
        &self,
        policy: &ClaimPolicy,
        limit: usize,
    ) -> Result<Vec<OrderId>> {
        let sql = format!(
            "SELECT id FROM orders WHERE {} ORDER BY updated_at ASC, id ASC LIMIT $2",
            claimable(1)
        );
        let ids: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(policy.reclaim_sending_before)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }

    async fn claim_decision_email(
        &self,
        id: OrderId,
        policy: &ClaimPolicy,
    ) -> Result<Option<OrderRecord>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET decision_email_status = 'sending',
                decision_email_attempts = decision_email_attempts + 1,
                decision_email_last_attempt_at = $3, updated_at = $3
            WHERE id = $1 AND {predicate}
            RETURNING {ORDER_COLUMNS}
            "#,
            predicate = claimable(2)
        );
        self.fetch_order(
            sqlx::query(&sql)
                .bind(id.as_uuid())
                .bind(policy.reclaim_sending_before)
                .bind(policy.now),
        )
        .await
    }

    async fn finish_decision_email(
        &self,
        id: OrderId,
        outcome: EmailOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        let (status, error, sent_at) = match outcome {
            EmailOutcome::Sent => ("sent", String::new(), Some(now)),
            EmailOutcome::Retry { error } => ("queued", error, None),
            EmailOutcome::Failed { error } => ("failed", error, None),
        };
        let sql = format!(
            r#"
            UPDATE orders
            SET decision_email_status = $2, decision_email_last_error = $3,
                decision_email_sent_at = COALESCE($4, decision_email_sent_at), updated_at = $5
            WHERE id = $1 AND decision_email_status = 'sending'
            RETURNING {ORDER_COLUMNS}
            "#
        );
        self.fetch_order(
            sqlx::query(&sql)
                .bind(id.as_uuid())
                .bind(status)
                .bind(error)
                .bind(sent_at)
                .bind(now),
        )
        .await
    }

    async fn requeue_failed_decision_email(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderRecord>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET decision_email_status = 'queued', decision_email_attempts = 0,
                decision_email_queued_at = $2, updated_at = $2
            WHERE id = $1 AND decision_email_status = 'failed'
            RETURNING {ORDER_COLUMNS}
            "#
        );
        self.fetch_order(sqlx::query(&sql).bind(id.as_uuid()).bind(now))
            .await
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<OrderRecord>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if query.account_key.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND account_key = ${param_count}"));
        }
        if let Some(cursor) = query.before {
            param_count += 1;
            match cursor.id {
                Some(_) => {
                    sql.push_str(&format!(
                        " AND (created_at, id) < (${param_count}, ${})",
                        param_count + 1
                    ));
                    param_count += 1;
                }
                None => sql.push_str(&format!(" AND created_at < ${param_count}")),
            }
        }
        param_count += 1;
        sql.push_str(&format!(
            " ORDER BY created_at DESC, id DESC LIMIT ${param_count}"
        ));

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(ref key) = query.account_key {
            sqlx_query = sqlx_query.bind(key.as_str());
        }
        if let Some(cursor) = query.before {
            sqlx_query = sqlx_query.bind(cursor.created_at);
            if let Some(id) = cursor.id {
                sqlx_query = sqlx_query.bind(id.as_uuid());
            }
        }
        sqlx_query = sqlx_query.bind(query.limit as i64);

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_orders_with_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<OrderRecord>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE status = ANY($1)");
        let rows = sqlx::query(&sql)
            .bind(statuses)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn fail_stale_uploads(
        &self,
        pending_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET payment_upload_status = 'failed', payment_upload_error = $2, updated_at = $3
            WHERE payment_upload_status = 'pending' AND created_at < $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(pending_before)
            .bind(error)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

const FOOD_COLUMNS: &str = "id, client_id, name, description, is_veg, price, image_url, storage_id, \
     is_active, upload_status, upload_error, created_at, updated_at";

const QR_COLUMNS: &str =
    "id, image_url, storage_id, is_active, upload_status, upload_error, created_at, updated_at";

/// PostgreSQL-backed catalog store.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_food(row: PgRow) -> Result<FoodItem> {
        Ok(FoodItem {
            id: CatalogId::from_uuid(row.try_get::<Uuid, _>("id")?),
            client_id: row.try_get("client_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_veg: row.try_get("is_veg")?,
            price: Money::from_minor(row.try_get("price")?),
            image_url: row.try_get("image_url")?,
            storage_id: row.try_get("storage_id")?,
            is_active: row.try_get("is_active")?,
            upload_status: row.try_get::<String, _>("upload_status")?.parse()?,
            upload_error: row.try_get("upload_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_qr(row: PgRow) -> Result<PaymentQr> {
        Ok(PaymentQr {
            id: CatalogId::from_uuid(row.try_get::<Uuid, _>("id")?),
            image_url: row.try_get("image_url")?,
            storage_id: row.try_get("storage_id")?,
            is_active: row.try_get("is_active")?,
            upload_status: row.try_get::<String, _>("upload_status")?.parse()?,
            upload_error: row.try_get("upload_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn record_upload(
        &self,
        table: &str,
        columns: &str,
        id: CatalogId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<PgRow>> {
        let row = match outcome {
            UploadOutcome::Uploaded { url, storage_id } => {
                let sql = format!(
                    "UPDATE {table} SET image_url = $2, storage_id = $3, upload_status = 'uploaded', \
                     upload_error = '', updated_at = $4 \
                     WHERE id = $1 AND upload_status = 'pending' RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(id.as_uuid())
                    .bind(url)
                    .bind(storage_id)
                    .bind(now)
                    .fetch_optional(&self.pool)
                    .await?
            }
            UploadOutcome::Failed { error } => {
                let sql = format!(
                    "UPDATE {table} SET upload_status = 'failed', upload_error = $2, updated_at = $3 \
                     WHERE id = $1 AND upload_status = 'pending' RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(id.as_uuid())
                    .bind(error)
                    .bind(now)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row)
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn insert_food(&self, food: FoodItem) -> Result<FoodItem> {
        let sql = format!(
            r#"
            INSERT INTO food_items ({FOOD_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {FOOD_COLUMNS}
            "#
        );
        let client_id = food.client_id.clone();
        let row = sqlx::query(&sql)
            .bind(food.id.as_uuid())
            .bind(&food.client_id)
            .bind(&food.name)
            .bind(&food.description)
            .bind(food.is_veg)
            .bind(food.price.minor())
            .bind(&food.image_url)
            .bind(&food.storage_id)
            .bind(food.is_active)
            .bind(food.upload_status.as_str())
            .bind(&food.upload_error)
            .bind(food.created_at)
            .bind(food.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_food_client_id")
                {
                    return StoreError::DuplicateCatalogItem(client_id.clone());
                }
                StoreError::Database(e)
            })?;
        Self::row_to_food(row)
    }

    async fn list_foods(&self) -> Result<Vec<FoodItem>> {
        let sql = format!("SELECT {FOOD_COLUMNS} FROM food_items ORDER BY name ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_food).collect()
    }

    async fn record_food_upload(
        &self,
        id: CatalogId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<FoodItem>> {
        self.record_upload("food_items", FOOD_COLUMNS, id, outcome, now)
            .await?
            .map(Self::row_to_food)
            .transpose()
    }

    async fn insert_payment_qr(&self, qr: PaymentQr, max: usize) -> Result<PaymentQr> {
        let mut tx = self.pool.begin().await?;
        // Serializes concurrent creators so the count below stays true until commit.
        sqlx::query("LOCK TABLE payment_qrs IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            r#"
            INSERT INTO payment_qrs ({QR_COLUMNS})
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE (SELECT COUNT(*) FROM payment_qrs) < $9
            RETURNING {QR_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(qr.id.as_uuid())
            .bind(&qr.image_url)
            .bind(&qr.storage_id)
            .bind(qr.is_active)
            .bind(qr.upload_status.as_str())
            .bind(&qr.upload_error)
            .bind(qr.created_at)
            .bind(qr.updated_at)
            .bind(max as i64)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(StoreError::PaymentQrLimit(max));
        };
        tx.commit().await?;
        Self::row_to_qr(row)
    }

    async fn list_payment_qrs(&self) -> Result<Vec<PaymentQr>> {
        let sql = format!("SELECT {QR_COLUMNS} FROM payment_qrs ORDER BY created_at DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_qr).collect()
    }

    async fn record_payment_qr_upload(
        &self,
        id: CatalogId,
        outcome: UploadOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentQr>> {
        self.record_upload("payment_qrs", QR_COLUMNS, id, outcome, now)
            .await?
            .map(Self::row_to_qr)
            .transpose()
    }

    async fn fail_stale_uploads(
        &self,
        pending_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut changed = 0;
        for table in ["food_items", "payment_qrs"] {
            let sql = format!(
                "UPDATE {table} SET upload_status = 'failed', upload_error = $2, updated_at = $3 \
                 WHERE upload_status = 'pending' AND created_at < $1"
            );
            changed += sqlx::query(&sql)
                .bind(pending_before)
                .bind(error)
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(changed)
    }
}
