use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::RecordId;
use domain::{
    Customer, DigitalIdentity, IdentityStatus, LineItemMirror, OrderMirror, OrderRecord,
    OrderStatus, PlatformUser, ProductVariant, RawEvent,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{Inserted, PipelineStore};

/// PostgreSQL-backed pipeline store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL pipeline store.
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

    fn row_to_raw_event(row: PgRow) -> Result<RawEvent> {
        Ok(RawEvent {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            dedup_key: row.try_get("dedup_key")?,
            shop: row.try_get("shop")?,
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            processed: row.try_get("processed")?,
            process_note: row.try_get("process_note")?,
            error_count: row.try_get("error_count")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_customer(row: PgRow) -> Result<Customer> {
        Ok(Customer {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            shop: row.try_get("shop")?,
            external_id: row.try_get("external_id")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_user(row: PgRow) -> Result<PlatformUser> {
        Ok(PlatformUser {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            phone: row.try_get("phone")?,
            customer_id: row
                .try_get::<Option<Uuid>, _>("customer_id")?
                .map(RecordId::from_uuid),
            display_name: row.try_get("display_name")?,
            wallet_address: row.try_get("wallet_address")?,
            wallet_did: row.try_get("wallet_did")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        let status: String = row.try_get("status")?;
        Ok(OrderRecord {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: RecordId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            external_order_id: row.try_get("external_order_id")?,
            status: OrderStatus::parse(&status).ok_or(StoreError::InvalidStatus(status))?,
            total_items: row.try_get("total_items")?,
            notification_sent_at: row.try_get("notification_sent_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_mirror(row: PgRow) -> Result<OrderMirror> {
        Ok(OrderMirror {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            shop: row.try_get("shop")?,
            external_id: row.try_get("external_id")?,
            order_number: row.try_get("order_number")?,
            financial_status: row.try_get("financial_status")?,
            fulfillment_status: row.try_get("fulfillment_status")?,
            currency: row.try_get("currency")?,
            total_price: row.try_get("total_price")?,
            placed_at: row.try_get("placed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_line_item(row: PgRow) -> Result<LineItemMirror> {
        Ok(LineItemMirror {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_mirror_id: RecordId::from_uuid(row.try_get::<Uuid, _>("order_mirror_id")?),
            external_id: row.try_get("external_id")?,
            title: row.try_get("title")?,
            sku: row.try_get("sku")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
            product_external_id: row.try_get("product_external_id")?,
            variant_external_id: row.try_get("variant_external_id")?,
        })
    }

    fn row_to_variant(row: PgRow) -> Result<ProductVariant> {
        Ok(ProductVariant {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            shop: row.try_get("shop")?,
            external_id: row.try_get("external_id")?,
            sku: row.try_get("sku")?,
            title: row.try_get("title")?,
            brand_id: row
                .try_get::<Option<Uuid>, _>("brand_id")?
                .map(RecordId::from_uuid),
            contract_address: row.try_get("contract_address")?,
        })
    }

    fn row_to_identity(row: PgRow) -> Result<DigitalIdentity> {
        let status: String = row.try_get("status")?;
        Ok(DigitalIdentity {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            variant_id: RecordId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            user_id: RecordId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            order_id: RecordId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            shop: row.try_get("shop")?,
            line_item_external_id: row.try_get("line_item_external_id")?,
            unit_key: row.try_get("unit_key")?,
            status: IdentityStatus::parse(&status).ok_or(StoreError::InvalidStatus(status))?,
            contract_address: row.try_get("contract_address")?,
            token_id: row.try_get("token_id")?,
            transaction_hash: row.try_get("transaction_hash")?,
            minted_at: row.try_get("minted_at")?,
            owner_address: row.try_get("owner_address")?,
            owner_did: row.try_get("owner_did")?,
            mint_error: row.try_get("mint_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PipelineStore for PostgresStore {
    async fn insert_raw_event(&self, event: RawEvent) -> Result<Inserted<RawEvent>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO raw_events
                (id, dedup_key, shop, topic, payload, processed, process_note,
                 error_count, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (dedup_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.dedup_key)
        .bind(&event.shop)
        .bind(&event.topic)
        .bind(&event.payload)
        .bind(event.processed)
        .bind(&event.process_note)
        .bind(event.error_count)
        .bind(&event.last_error)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Inserted::Created(Self::row_to_raw_event(row)?));
        }

        let existing = sqlx::query("SELECT * FROM raw_events WHERE dedup_key = $1")
            .bind(&event.dedup_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(Inserted::Existing(Self::row_to_raw_event(existing)?))
    }

    async fn get_raw_event(&self, id: RecordId) -> Result<Option<RawEvent>> {
        let row = sqlx::query("SELECT * FROM raw_events WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_raw_event).transpose()
    }

    async fn mark_raw_event_processed(&self, id: RecordId, note: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE raw_events
            SET processed = TRUE, process_note = $2, error_count = 0,
                last_error = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_raw_event_error(&self, id: RecordId, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE raw_events
            SET error_count = error_count + 1, last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_customer(&self, customer: Customer) -> Result<Customer> {
        let row = sqlx::query(
            r#"
            INSERT INTO customers
                (id, shop, external_id, email, phone, first_name, last_name,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (shop, external_id) DO UPDATE
            SET email = EXCLUDED.email, phone = EXCLUDED.phone,
                first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.shop)
        .bind(customer.external_id)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_customer(row)
    }

    async fn find_or_create_user(&self, user: PlatformUser) -> Result<Inserted<PlatformUser>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO platform_users
                (id, phone, customer_id, display_name, wallet_address, wallet_did, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (phone) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.phone)
        .bind(user.customer_id.map(RecordId::as_uuid))
        .bind(&user.display_name)
        .bind(&user.wallet_address)
        .bind(&user.wallet_did)
        .bind(user.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Inserted::Created(Self::row_to_user(row)?));
        }

        let existing = sqlx::query("SELECT * FROM platform_users WHERE phone = $1")
            .bind(&user.phone)
            .fetch_one(&self.pool)
            .await?;
        Ok(Inserted::Existing(Self::row_to_user(existing)?))
    }

    async fn get_user(&self, id: RecordId) -> Result<Option<PlatformUser>> {
        let row = sqlx::query("SELECT * FROM platform_users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_user).transpose()
    }

    async fn set_user_wallet(&self, user_id: RecordId, address: &str, did: &str) -> Result<()> {
        sqlx::query(
            "UPDATE platform_users SET wallet_address = $2, wallet_did = $3 WHERE id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(address)
        .bind(did)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_or_create_order(&self, order: OrderRecord) -> Result<Inserted<OrderRecord>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO order_records
                (id, user_id, external_order_id, status, total_items,
                 notification_sent_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, external_order_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.external_order_id)
        .bind(order.status.as_str())
        .bind(order.total_items)
        .bind(order.notification_sent_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Inserted::Created(Self::row_to_order(row)?));
        }

        let existing = sqlx::query(
            "SELECT * FROM order_records WHERE user_id = $1 AND external_order_id = $2",
        )
        .bind(order.user_id.as_uuid())
        .bind(order.external_order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Inserted::Existing(Self::row_to_order(existing)?))
    }

    async fn get_order(&self, id: RecordId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query("SELECT * FROM order_records WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn update_order_status(
        &self,
        order_id: RecordId,
        status: OrderStatus,
    ) -> Result<OrderRecord> {
        let current = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;

        if !current.status.can_advance_to(status) {
            tracing::warn!(
                %order_id,
                current = %current.status,
                refused = %status,
                "refusing order status regression"
            );
            return Ok(current);
        }

        // Optimistic write: a concurrent worker that advanced the row first wins.
        let updated = sqlx::query(
            r#"
            UPDATE order_records SET status = $2, updated_at = now()
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(status.as_str())
        .bind(current.status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Self::row_to_order(row),
            None => self
                .get_order(order_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("order {order_id}"))),
        }
    }

    async fn stamp_notification_sent(&self, order_id: RecordId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_records
            SET notification_sent_at = COALESCE(notification_sent_at, $2), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_order_mirror(&self, mirror: OrderMirror) -> Result<OrderMirror> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_mirrors
                (id, shop, external_id, order_number, financial_status,
                 fulfillment_status, currency, total_price, placed_at,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (shop, external_id) DO UPDATE
            SET order_number = EXCLUDED.order_number,
                financial_status = EXCLUDED.financial_status,
                fulfillment_status = EXCLUDED.fulfillment_status,
                currency = EXCLUDED.currency,
                total_price = EXCLUDED.total_price,
                placed_at = EXCLUDED.placed_at,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(mirror.id.as_uuid())
        .bind(&mirror.shop)
        .bind(mirror.external_id)
        .bind(&mirror.order_number)
        .bind(&mirror.financial_status)
        .bind(&mirror.fulfillment_status)
        .bind(&mirror.currency)
        .bind(&mirror.total_price)
        .bind(mirror.placed_at)
        .bind(mirror.created_at)
        .bind(mirror.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_mirror(row)
    }

    async fn replace_line_items(
        &self,
        order_mirror_id: RecordId,
        items: Vec<LineItemMirror>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM line_item_mirrors WHERE order_mirror_id = $1")
            .bind(order_mirror_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO line_item_mirrors
                    (id, order_mirror_id, external_id, title, sku, quantity,
                     price, product_external_id, variant_external_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order_mirror_id.as_uuid())
            .bind(item.external_id)
            .bind(&item.title)
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(&item.price)
            .bind(item.product_external_id)
            .bind(item.variant_external_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_line_items(&self, order_mirror_id: RecordId) -> Result<Vec<LineItemMirror>> {
        let rows = sqlx::query(
            "SELECT * FROM line_item_mirrors WHERE order_mirror_id = $1 ORDER BY external_id",
        )
        .bind(order_mirror_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_line_item).collect()
    }

    async fn upsert_variant(&self, variant: ProductVariant) -> Result<ProductVariant> {
        let row = sqlx::query(
            r#"
            INSERT INTO product_variants
                (id, shop, external_id, sku, title, brand_id, contract_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (shop, external_id) DO UPDATE
            SET sku = EXCLUDED.sku, title = EXCLUDED.title,
                brand_id = EXCLUDED.brand_id,
                contract_address = EXCLUDED.contract_address
            RETURNING *
            "#,
        )
        .bind(variant.id.as_uuid())
        .bind(&variant.shop)
        .bind(variant.external_id)
        .bind(&variant.sku)
        .bind(&variant.title)
        .bind(variant.brand_id.map(RecordId::as_uuid))
        .bind(&variant.contract_address)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_variant(row)
    }

    async fn find_variant(&self, shop: &str, external_id: i64) -> Result<Option<ProductVariant>> {
        let row =
            sqlx::query("SELECT * FROM product_variants WHERE shop = $1 AND external_id = $2")
                .bind(shop)
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Self::row_to_variant).transpose()
    }

    async fn insert_identity(
        &self,
        identity: DigitalIdentity,
    ) -> Result<Inserted<DigitalIdentity>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO digital_identities
                (id, variant_id, user_id, order_id, shop, line_item_external_id,
                 unit_key, status, contract_address, token_id, transaction_hash,
                 minted_at, owner_address, owner_did, mint_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (shop, line_item_external_id, unit_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(identity.id.as_uuid())
        .bind(identity.variant_id.as_uuid())
        .bind(identity.user_id.as_uuid())
        .bind(identity.order_id.as_uuid())
        .bind(&identity.shop)
        .bind(identity.line_item_external_id)
        .bind(&identity.unit_key)
        .bind(identity.status.as_str())
        .bind(&identity.contract_address)
        .bind(&identity.token_id)
        .bind(&identity.transaction_hash)
        .bind(identity.minted_at)
        .bind(&identity.owner_address)
        .bind(&identity.owner_did)
        .bind(&identity.mint_error)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Inserted::Created(Self::row_to_identity(row)?));
        }

        let existing = sqlx::query(
            r#"
            SELECT * FROM digital_identities
            WHERE shop = $1 AND line_item_external_id = $2 AND unit_key = $3
            "#,
        )
        .bind(&identity.shop)
        .bind(identity.line_item_external_id)
        .bind(&identity.unit_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(Inserted::Existing(Self::row_to_identity(existing)?))
    }

    async fn get_identity(&self, id: RecordId) -> Result<Option<DigitalIdentity>> {
        let row = sqlx::query("SELECT * FROM digital_identities WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_identity).transpose()
    }

    async fn identities_for_order(&self, order_id: RecordId) -> Result<Vec<DigitalIdentity>> {
        let rows = sqlx::query(
            "SELECT * FROM digital_identities WHERE order_id = $1 ORDER BY unit_key",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_identity).collect()
    }

    async fn set_identity_status(&self, id: RecordId, status: IdentityStatus) -> Result<()> {
        sqlx::query("UPDATE digital_identities SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_mint_success(
        &self,
        id: RecordId,
        token_id: &str,
        transaction_hash: &str,
        contract_address: &str,
        minted_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE digital_identities
            SET status = 'MINTED', token_id = $2, transaction_hash = $3,
                contract_address = $4, minted_at = $5, mint_error = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(token_id)
        .bind(transaction_hash)
        .bind(contract_address)
        .bind(minted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_mint_failure(&self, id: RecordId, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE digital_identities
            SET status = 'MINT_FAILED', mint_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
