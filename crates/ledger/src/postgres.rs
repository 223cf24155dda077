use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use common::{BookId, Money, OrderId, UserId};
use domain::{
    Book, Order, OrderItem, OrderStatus, PaymentStatus, PaymentTransaction, Refund, RefundReason,
    RefundStatus, ShippingAddress,
};

use crate::error::{LedgerError, Result};
use crate::store::{Ledger, OrderUpdate};

/// PostgreSQL-backed ledger implementation.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
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

    fn row_to_book(row: PgRow) -> Result<Book> {
        Ok(Book {
            id: BookId::from_uuid(row.try_get::<Uuid, _>("id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            title: row.try_get("title")?,
            price: Money::from_cents(row.try_get("price")?),
            sold: row.try_get("sold")?,
            reserved_until: row.try_get("reserved_until")?,
            reserved_by: row
                .try_get::<Option<Uuid>, _>("reserved_by")?
                .map(UserId::from_uuid),
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let items: Vec<OrderItem> = serde_json::from_value(row.try_get("items")?)?;
        let shipping_address: ShippingAddress =
            serde_json::from_value(row.try_get("shipping_address")?)?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            buyer_email: row.try_get("buyer_email")?,
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            seller_email: row.try_get("seller_email")?,
            status: parse_status(row.try_get("status")?)?,
            items,
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            payment_reference: row.try_get("payment_reference")?,
            shipping_address,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            reminder_sent_at: row.try_get("reminder_sent_at")?,
            collected_at: row.try_get("collected_at")?,
            collected_by: row.try_get("collected_by")?,
            delivered_at: row.try_get("delivered_at")?,
            declined_at: row.try_get("declined_at")?,
            decline_reason: row.try_get("decline_reason")?,
            courier_provider: row.try_get("courier_provider")?,
            courier_tracking_number: row.try_get("courier_tracking_number")?,
            shipping_label_url: row.try_get("shipping_label_url")?,
        })
    }
}

fn parse_status(s: &str) -> Result<OrderStatus> {
    OrderStatus::parse(s)
        .ok_or_else(|| LedgerError::Database(sqlx::Error::Decode(
            format!("unknown order status: {s}").into(),
        )))
}

fn decode_err(msg: String) -> LedgerError {
    LedgerError::Database(sqlx::Error::Decode(msg.into()))
}

const ORDER_COLUMNS: &str = "id, buyer_id, buyer_email, seller_id, seller_email, status, items, \
     total_amount, payment_reference, shipping_address, created_at, expires_at, \
     reminder_sent_at, collected_at, collected_by, delivered_at, declined_at, \
     decline_reason, courier_provider, courier_tracking_number, shipping_label_url";

#[async_trait]
impl Ledger for PostgresLedger {
    async fn insert_book(&self, book: Book) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, seller_id, title, price, sold, reserved_until, reserved_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(book.id.as_uuid())
        .bind(book.seller_id.as_uuid())
        .bind(&book.title)
        .bind(book.price.cents())
        .bind(book.sold)
        .bind(book.reserved_until)
        .bind(book.reserved_by.map(|u| u.as_uuid()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_book(&self, id: BookId) -> Result<Option<Book>> {
        let row = sqlx::query("SELECT * FROM books WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_book).transpose()
    }

    async fn reserve_books(
        &self,
        ids: &[BookId],
        buyer: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE books
            SET sold = TRUE, reserved_until = NULL, reserved_by = NULL
            WHERE id = ANY($1)
              AND sold = FALSE
              AND (reserved_until IS NULL OR reserved_until <= $2 OR reserved_by = $3)
            "#,
        )
        .bind(&uuids)
        .bind(now)
        .bind(buyer.as_uuid())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() as usize == ids.len() {
            tx.commit().await?;
            return Ok(());
        }

        // Conditional batch lost on at least one book; roll everything back
        // and report exactly which ones were unavailable.
        tx.rollback().await?;

        let rows = sqlx::query("SELECT * FROM books WHERE id = ANY($1)")
            .bind(&uuids)
            .fetch_all(&self.pool)
            .await?;
        let found: HashMap<BookId, Book> = rows
            .into_iter()
            .map(|r| Self::row_to_book(r).map(|b| (b.id, b)))
            .collect::<Result<_>>()?;

        let unavailable: Vec<BookId> = ids
            .iter()
            .filter(|id| !found.get(id).is_some_and(|b| b.is_sellable(buyer, now)))
            .copied()
            .collect();
        Err(LedgerError::BooksUnavailable(unavailable))
    }

    async fn release_books(&self, ids: &[BookId]) -> Result<()> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        sqlx::query(
            r#"
            UPDATE books
            SET sold = FALSE, reserved_until = NULL, reserved_by = NULL
            WHERE id = ANY($1)
            "#,
        )
        .bind(&uuids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_orders(&self, orders: &[Order]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO orders (
                    id, buyer_id, buyer_email, seller_id, seller_email, status, items,
                    total_amount, payment_reference, shipping_address, created_at, expires_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.buyer_id.as_uuid())
            .bind(&order.buyer_email)
            .bind(order.seller_id.as_uuid())
            .bind(&order.seller_email)
            .bind(order.status.as_str())
            .bind(serde_json::to_value(&order.items)?)
            .bind(order.total_amount.cents())
            .bind(&order.payment_reference)
            .bind(serde_json::to_value(&order.shipping_address)?)
            .bind(order.created_at)
            .bind(order.expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn orders_for_payment(&self, reference: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = $1 ORDER BY created_at"
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        update: OrderUpdate,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET
                status = $3,
                expires_at = CASE WHEN $4 THEN NULL ELSE expires_at END,
                courier_provider = COALESCE($5, courier_provider),
                courier_tracking_number = COALESCE($6, courier_tracking_number),
                shipping_label_url = COALESCE($7, shipping_label_url),
                collected_at = COALESCE($8, collected_at),
                collected_by = COALESCE($9, collected_by),
                delivered_at = COALESCE($10, delivered_at),
                declined_at = COALESCE($11, declined_at),
                decline_reason = COALESCE($12, decline_reason)
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(new.as_str())
        .bind(update.clear_expires_at)
        .bind(&update.courier_provider)
        .bind(&update.courier_tracking_number)
        .bind(&update.shipping_label_url)
        .bind(update.collected_at)
        .bind(&update.collected_by)
        .bind(update.delivered_at)
        .bind(update.declined_at)
        .bind(&update.decline_reason)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_order(row);
        }

        // No row matched: either the order is missing or the guard failed.
        let actual: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        match actual {
            Some(status) => {
                let actual = parse_status(&status)?;
                tracing::warn!(
                    order_id = %id,
                    expected = %expected,
                    actual = %actual,
                    "conditional status update lost the race"
                );
                Err(LedgerError::StatusConflict {
                    order_id: id,
                    expected,
                    actual,
                })
            }
            None => Err(LedgerError::OrderNotFound(id)),
        }
    }

    async fn overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status = 'pending_commit' AND expires_at < $1
            ORDER BY expires_at
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn reminder_due_orders(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status = 'pending_commit'
              AND created_at < $1
              AND expires_at > $2
              AND reminder_sent_at IS NULL
            ORDER BY created_at
            "#
        ))
        .bind(created_before)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn stamp_reminder_sent(&self, id: OrderId, at: DateTime<Utc>) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET reminder_sent_at = $2
            WHERE id = $1 AND status = 'pending_commit' AND reminder_sent_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(LedgerError::OrderNotFound(id))
        }
    }

    async fn claim_payment(&self, payment: PaymentTransaction) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (reference, amount, status, verified_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(&payment.reference)
        .bind(payment.amount.cents())
        .bind(payment.status.as_str())
        .bind(payment.verified_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_payment(&self, reference: &str) -> Result<()> {
        sqlx::query("DELETE FROM payments WHERE reference = $1")
            .bind(reference)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query("SELECT * FROM payments WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let status: String = row.try_get("status")?;
            Ok(PaymentTransaction {
                reference: row.try_get("reference")?,
                amount: Money::from_cents(row.try_get("amount")?),
                status: PaymentStatus::parse(&status)
                    .ok_or_else(|| decode_err(format!("unknown payment status: {status}")))?,
                verified_at: row.try_get("verified_at")?,
            })
        })
        .transpose()
    }

    async fn insert_refund(&self, refund: Refund) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refunds (order_id, amount, reason, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(refund.order_id.as_uuid())
        .bind(refund.amount.cents())
        .bind(refund.reason.as_str())
        .bind(refund.status.as_str())
        .bind(refund.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn refunds_for_order(&self, id: OrderId) -> Result<Vec<Refund>> {
        let rows = sqlx::query("SELECT * FROM refunds WHERE order_id = $1 ORDER BY id")
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let reason: String = row.try_get("reason")?;
                let status: String = row.try_get("status")?;
                Ok(Refund {
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                    amount: Money::from_cents(row.try_get("amount")?),
                    reason: RefundReason::parse(&reason)
                        .ok_or_else(|| decode_err(format!("unknown refund reason: {reason}")))?,
                    status: RefundStatus::parse(&status)
                        .ok_or_else(|| decode_err(format!("unknown refund status: {status}")))?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
