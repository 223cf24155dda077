//! The order lifecycle orchestrator.

use chrono::{DateTime, Utc};

use common::{Money, OrderId, UserId};
use domain::{
    CartItem, Order, OrderStatus, Parcel, PaymentStatus, PaymentTransaction, Refund, RefundReason,
    RefundStatus, ShippingAddress, commit_deadline, compute_splits, delivery_check_after,
};
use ledger::{Ledger, LedgerError, OrderUpdate};

use crate::error::{FulfillmentError, Result};
use crate::services::courier::{BookingRequest, CourierDispatcher};
use crate::services::labels::LabelStore;
use crate::services::notify::{Notice, NotificationGateway};
use crate::services::payment::{ChargeInit, PaymentGateway};

/// A checkout submission: the buyer, their cart, and the charge they
/// completed at the payment gateway.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub buyer_id: UserId,
    pub buyer_email: String,
    pub items: Vec<CartItem>,
    pub payment_reference: String,
    pub shipping_address: ShippingAddress,
}

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    /// One order per distinct seller in the cart, in cart order.
    pub orders: Vec<Order>,
    /// The gross amount verified against the payment gateway.
    pub total_charged: Money,
}

/// Result of recording a courier collection.
#[derive(Debug, Clone)]
pub struct CollectReceipt {
    pub order: Order,
    /// Advisory time for a delivery-completion follow-up check.
    pub delivery_check_at: DateTime<Utc>,
}

/// Drives orders through their lifecycle.
///
/// Every transition is a conditional status update against the ledger;
/// the orchestrator itself holds no state, so any number of workers can
/// share one store. Notification and label-archival failures are logged
/// and never block a transition; refund failures are additionally
/// recorded as failed refund rows for reconciliation.
pub struct OrderOrchestrator<L, P, N, S>
where
    L: Ledger,
    P: PaymentGateway,
    N: NotificationGateway,
    S: LabelStore,
{
    ledger: L,
    payment: P,
    courier: CourierDispatcher,
    notifier: N,
    labels: S,
}

impl<L, P, N, S> OrderOrchestrator<L, P, N, S>
where
    L: Ledger,
    P: PaymentGateway,
    N: NotificationGateway,
    S: LabelStore,
{
    /// Creates a new orchestrator over the given ledger and gateways.
    pub fn new(ledger: L, payment: P, courier: CourierDispatcher, notifier: N, labels: S) -> Self {
        Self {
            ledger,
            payment,
            courier,
            notifier,
            labels,
        }
    }

    /// The underlying ledger, for sweeps and read paths.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Initializes a charge for a cart's gross total.
    ///
    /// The buyer completes payment at the returned URL, then the caller
    /// submits [`checkout`](Self::checkout) with the reference.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(&self, buyer_email: &str, amount: Money) -> Result<ChargeInit> {
        self.payment.charge(buyer_email, amount).await
    }

    /// Turns a verified payment into per-seller orders.
    ///
    /// Validates the cart, verifies the charge, conditionally reserves
    /// every book, then creates one `pending_commit` order per seller with
    /// a 48-hour commitment deadline. All-or-nothing: any failure before
    /// the orders are durable leaves no reservation behind.
    #[tracing::instrument(skip(self, request), fields(payment_reference = %request.payment_reference))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkouts_total").increment(1);

        // 1. Validate the cart shape before touching anything.
        validate_checkout(&request)?;

        // 2. Verify the charge against the gateway and the cart total.
        let verification = self.payment.verify(&request.payment_reference).await?;
        if verification.status != PaymentStatus::Success {
            return Err(FulfillmentError::PaymentFailed {
                reference: request.payment_reference,
                reason: format!("payment status is {}", verification.status.as_str()),
            });
        }
        // The charge may exceed the cart total (delivery fees ride on the
        // payment, not on orders) but must never fall short of it.
        let cart_total: Money = request.items.iter().map(|i| i.line_total()).sum();
        if verification.amount < cart_total {
            return Err(FulfillmentError::PaymentFailed {
                reference: request.payment_reference,
                reason: format!(
                    "charged {} but cart totals {}",
                    verification.amount, cart_total
                ),
            });
        }

        // 3. Claim the payment reference. The conditional insert is the
        //    guard: of two concurrent checkouts sharing a reference,
        //    exactly one claims it and funds orders from the charge.
        let now = Utc::now();
        let claimed = self
            .ledger
            .claim_payment(PaymentTransaction::verified(
                &request.payment_reference,
                verification.amount,
                now,
            ))
            .await?;
        if !claimed {
            return Err(FulfillmentError::PaymentFailed {
                reference: request.payment_reference,
                reason: "payment reference already consumed".to_string(),
            });
        }

        // 4. Conditionally mark every book sold. This is the race point:
        //    a concurrent checkout for any shared book loses here, whole.
        let book_ids: Vec<_> = request.items.iter().map(|i| i.book_id).collect();
        if let Err(err) = self.ledger.reserve_books(&book_ids, request.buyer_id, now).await {
            self.abandon_payment_claim(&request.payment_reference).await;
            return Err(match err {
                LedgerError::BooksUnavailable(ids) => FulfillmentError::InventoryConflict(ids),
                other => other.into(),
            });
        }

        // 5. Split the cart per seller and create the sibling orders.
        let expires_at = now + commit_deadline();
        let orders: Vec<Order> = compute_splits(&request.items)
            .into_iter()
            .map(|split| {
                Order::pending(
                    request.buyer_id,
                    request.buyer_email.clone(),
                    split.seller_id,
                    split.seller_email.clone(),
                    split.items,
                    split.subtotal,
                    request.payment_reference.clone(),
                    request.shipping_address.clone(),
                    now,
                    expires_at,
                )
            })
            .collect();

        if let Err(err) = self.ledger.insert_orders(&orders).await {
            // Undo the reservation and the claim so a retry can succeed.
            if let Err(release_err) = self.ledger.release_books(&book_ids).await {
                tracing::error!(
                    error = %release_err,
                    "failed to release books after aborted checkout"
                );
            }
            self.abandon_payment_claim(&request.payment_reference).await;
            return Err(err.into());
        }

        // 6. Notify everyone involved.
        self.notify(
            &request.buyer_email,
            Notice::OrderPlaced {
                payment_reference: request.payment_reference.clone(),
                total: verification.amount,
            },
        )
        .await;
        for order in &orders {
            self.notify(
                &order.seller_email,
                Notice::NewOrder {
                    order_id: order.id,
                    expires_at,
                },
            )
            .await;
        }

        metrics::counter!("orders_created_total").increment(orders.len() as u64);
        tracing::info!(
            orders = orders.len(),
            total = %verification.amount,
            "checkout completed"
        );

        Ok(CheckoutReceipt {
            orders,
            total_charged: verification.amount,
        })
    }

    /// Records a seller's commitment and books the courier pickup.
    ///
    /// The commitment is durable first: a booking failure returns
    /// `CourierBookingFailed` with the order left `committed`, so booking
    /// can be redriven without asking the seller again.
    #[tracing::instrument(skip(self, pickup_address))]
    pub async fn commit(
        &self,
        order_id: OrderId,
        seller_id: UserId,
        pickup_address: ShippingAddress,
    ) -> Result<Order> {
        let order = self.require_order(order_id).await?;
        if order.seller_id != seller_id {
            return Err(FulfillmentError::NotOrderSeller(order_id));
        }
        if !order.status.can_commit() {
            return Err(FulfillmentError::InvalidTransition {
                order_id,
                actual: order.status,
                action: "commit",
            });
        }

        let order = self
            .ledger
            .update_order_status(
                order_id,
                OrderStatus::PendingCommit,
                OrderStatus::Committed,
                OrderUpdate::committed(),
            )
            .await
            .map_err(|err| invalid_transition(err, "commit"))?;
        metrics::counter!("orders_committed_total").increment(1);

        self.notify(&order.buyer_email, Notice::OrderCommitted { order_id })
            .await;

        // Book the pickup now that the commitment is durable.
        let booking = self
            .courier
            .book_pickup(&BookingRequest {
                order_id,
                pickup: pickup_address,
                delivery: order.shipping_address.clone(),
                parcel: Parcel::textbook(order.total_amount),
            })
            .await?;

        // Archive the label; fall back to the provider's own URL if the
        // copy fails, since that link works for at least a few days.
        let label_url = match booking.label_url {
            Some(source) => match self.labels.store(order_id, &source).await {
                Ok(stable) => Some(stable),
                Err(err) => {
                    tracing::warn!(%order_id, error = %err, "label archival failed");
                    Some(source)
                }
            },
            None => None,
        };

        let order = self
            .ledger
            .update_order_status(
                order_id,
                OrderStatus::Committed,
                OrderStatus::CourierScheduled,
                OrderUpdate::courier_scheduled(
                    booking.provider.clone(),
                    booking.tracking_number.clone(),
                    label_url,
                ),
            )
            .await
            .map_err(|err| invalid_transition(err, "schedule courier for"))?;
        metrics::counter!("courier_bookings_total").increment(1);

        self.notify(
            &order.buyer_email,
            Notice::CourierBooked {
                order_id,
                tracking_number: booking.tracking_number,
            },
        )
        .await;

        tracing::info!(%order_id, provider = %booking.provider, "order committed and courier booked");
        Ok(order)
    }

    /// Declines an order on the seller's behalf and compensates the buyer.
    #[tracing::instrument(skip(self, note))]
    pub async fn decline(
        &self,
        order_id: OrderId,
        seller_id: UserId,
        note: Option<String>,
    ) -> Result<Order> {
        let order = self.require_order(order_id).await?;
        if order.seller_id != seller_id {
            return Err(FulfillmentError::NotOrderSeller(order_id));
        }
        if !order.status.can_commit() {
            return Err(FulfillmentError::InvalidTransition {
                order_id,
                actual: order.status,
                action: "decline",
            });
        }

        let reason = RefundReason::DeclinedBySeller;
        let note = note.unwrap_or_else(|| reason.as_str().to_string());
        let order = self
            .compensate(order, OrderStatus::Declined, reason, note)
            .await
            .map_err(|err| match err {
                FulfillmentError::Ledger(e) => invalid_transition(e, "decline"),
                other => other,
            })?;
        metrics::counter!("orders_declined_total").increment(1);
        Ok(order)
    }

    /// Expires an overdue order, compensating the buyer.
    ///
    /// Idempotent: returns `Ok(false)` without side effects when the order
    /// has already left `pending_commit`, so concurrent sweeps and a
    /// last-second seller commit resolve to exactly one outcome.
    #[tracing::instrument(skip(self))]
    pub async fn expire(&self, order_id: OrderId) -> Result<bool> {
        let order = self.require_order(order_id).await?;

        let reason = RefundReason::OverdueCommit;
        match self
            .compensate(order, OrderStatus::Expired, reason, reason.as_str())
            .await
        {
            Ok(_) => {
                metrics::counter!("orders_expired_total").increment(1);
                Ok(true)
            }
            Err(FulfillmentError::Ledger(LedgerError::StatusConflict { actual, .. })) => {
                tracing::debug!(%order_id, %actual, "order no longer pending, skipping expiry");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Records the courier collecting the parcel from the seller.
    ///
    /// Accepts orders in `courier_scheduled`, or in `committed` when the
    /// seller arranged a drop-off before any booking landed.
    #[tracing::instrument(skip(self, collected_by, tracking_number))]
    pub async fn collect(
        &self,
        order_id: OrderId,
        collected_by: &str,
        tracking_number: Option<String>,
    ) -> Result<CollectReceipt> {
        let now = Utc::now();
        let current = self.require_order(order_id).await?;
        if !current.status.can_collect() {
            return Err(FulfillmentError::InvalidTransition {
                order_id,
                actual: current.status,
                action: "collect",
            });
        }

        let order = self
            .ledger
            .update_order_status(
                order_id,
                current.status,
                OrderStatus::Collected,
                OrderUpdate::collected(now, collected_by, tracking_number),
            )
            .await
            .map_err(|err| invalid_transition(err, "collect"))?;
        metrics::counter!("orders_collected_total").increment(1);

        self.notify(&order.buyer_email, Notice::OrderCollected { order_id })
            .await;

        Ok(CollectReceipt {
            order,
            delivery_check_at: now + delivery_check_after(),
        })
    }

    /// Marks a collected order as delivered to the buyer.
    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .ledger
            .update_order_status(
                order_id,
                OrderStatus::Collected,
                OrderStatus::Delivered,
                OrderUpdate::delivered(Utc::now()),
            )
            .await
            .map_err(|err| invalid_transition(err, "deliver"))?;
        metrics::counter!("orders_delivered_total").increment(1);
        tracing::info!(%order_id, "order delivered");
        Ok(order)
    }

    /// The shared decline/expire compensation path.
    ///
    /// Order of operations matters: the terminal transition is the
    /// linearization point, then books are released, then the refund is
    /// attempted once. A refund failure is recorded as a failed row and
    /// logged; it never undoes the transition.
    async fn compensate(
        &self,
        order: Order,
        terminal: OrderStatus,
        reason: RefundReason,
        note: impl Into<String>,
    ) -> Result<Order> {
        let now = Utc::now();
        let order_id = order.id;

        let order = self
            .ledger
            .update_order_status(
                order_id,
                OrderStatus::PendingCommit,
                terminal,
                OrderUpdate::declined(now, note),
            )
            .await?;

        // A stuck reservation can be reconciled later; a terminal order with
        // no refund row cannot. Log the release failure and keep going.
        if let Err(err) = self.ledger.release_books(&order.book_ids()).await {
            metrics::counter!("book_releases_failed_total").increment(1);
            tracing::error!(
                %order_id,
                error = %err,
                "failed to release books for compensated order"
            );
        }

        let refund_status = match self
            .payment
            .refund(&order.payment_reference, order.total_amount, reason.as_str())
            .await
        {
            Ok(()) => RefundStatus::Completed,
            Err(err) => {
                metrics::counter!("refunds_failed_total").increment(1);
                tracing::error!(
                    %order_id,
                    reference = %order.payment_reference,
                    error = %err,
                    "refund attempt failed, recording for reconciliation"
                );
                RefundStatus::Failed
            }
        };
        self.ledger
            .insert_refund(Refund::new(
                order_id,
                order.total_amount,
                reason,
                refund_status,
                now,
            ))
            .await?;

        let notice = match terminal {
            OrderStatus::Expired => Notice::OrderExpired { order_id },
            _ => Notice::OrderDeclined {
                order_id,
                reason: order.decline_reason.clone().unwrap_or_default(),
            },
        };
        self.notify(&order.buyer_email, notice.clone()).await;
        self.notify(&order.seller_email, notice).await;

        tracing::info!(
            %order_id,
            status = %order.status,
            refund = refund_status.as_str(),
            "order compensated"
        );
        Ok(order)
    }

    /// Best-effort release of a claimed payment reference after an
    /// aborted checkout, so the buyer can retry with the same charge.
    async fn abandon_payment_claim(&self, reference: &str) {
        if let Err(err) = self.ledger.release_payment(reference).await {
            tracing::error!(
                reference,
                error = %err,
                "failed to release payment claim after aborted checkout"
            );
        }
    }

    async fn require_order(&self, order_id: OrderId) -> Result<Order> {
        self.ledger
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// Best-effort send; failures are logged and swallowed.
    pub(crate) async fn notify(&self, to: &str, notice: Notice) {
        let template = notice.template();
        if let Err(err) = self.notifier.send(to, notice).await {
            tracing::warn!(to, template, error = %err, "notification failed");
        }
    }
}

fn validate_checkout(request: &CheckoutRequest) -> Result<()> {
    if request.items.is_empty() {
        return Err(FulfillmentError::Validation("cart is empty".to_string()));
    }
    if request.buyer_email.trim().is_empty() {
        return Err(FulfillmentError::Validation(
            "buyer email is required".to_string(),
        ));
    }
    if request.payment_reference.trim().is_empty() {
        return Err(FulfillmentError::Validation(
            "payment reference is required".to_string(),
        ));
    }
    for item in &request.items {
        if item.quantity == 0 {
            return Err(FulfillmentError::Validation(format!(
                "zero quantity for book {}",
                item.book_id
            )));
        }
        if !item.price.is_positive() {
            return Err(FulfillmentError::Validation(format!(
                "non-positive price for book {}",
                item.book_id
            )));
        }
        if item.seller_id == request.buyer_id {
            return Err(FulfillmentError::SelfPurchase {
                buyer_id: request.buyer_id,
            });
        }
    }
    let mut seen = std::collections::HashSet::new();
    for item in &request.items {
        if !seen.insert(item.book_id) {
            return Err(FulfillmentError::Validation(format!(
                "book {} appears twice in cart",
                item.book_id
            )));
        }
    }
    Ok(())
}

/// Maps a status conflict to the caller-facing transition error; other
/// ledger errors pass through.
fn invalid_transition(err: LedgerError, action: &'static str) -> FulfillmentError {
    match err {
        LedgerError::StatusConflict {
            order_id, actual, ..
        } => FulfillmentError::InvalidTransition {
            order_id,
            actual,
            action,
        },
        LedgerError::OrderNotFound(id) => FulfillmentError::OrderNotFound(id),
        other => other.into(),
    }
}
