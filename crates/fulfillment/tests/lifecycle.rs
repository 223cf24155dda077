//! End-to-end lifecycle tests over the in-memory ledger and gateways.

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::{BookId, Money, UserId};
use domain::{
    Book, CartItem, OrderStatus, RefundReason, RefundStatus, ShippingAddress, commit_deadline,
};
use fulfillment::{
    CheckoutRequest, CourierDispatcher, FulfillmentError, InMemoryCourierProvider,
    InMemoryLabelStore, InMemoryNotifier, InMemoryPaymentGateway, OrderOrchestrator,
};
use ledger::{InMemoryLedger, Ledger};

type TestOrchestrator = OrderOrchestrator<
    InMemoryLedger,
    InMemoryPaymentGateway,
    InMemoryNotifier,
    InMemoryLabelStore,
>;

struct World {
    orchestrator: Arc<TestOrchestrator>,
    gateway: InMemoryPaymentGateway,
    notifier: InMemoryNotifier,
    primary: InMemoryCourierProvider,
    secondary: InMemoryCourierProvider,
}

fn world() -> World {
    let gateway = InMemoryPaymentGateway::new();
    let notifier = InMemoryNotifier::new();
    let primary = InMemoryCourierProvider::new("courier-guy", Money::from_rands(85));
    let secondary = InMemoryCourierProvider::new("fastway", Money::from_rands(95));
    let courier = CourierDispatcher::new(vec![
        Arc::new(primary.clone()),
        Arc::new(secondary.clone()),
    ]);
    World {
        orchestrator: Arc::new(OrderOrchestrator::new(
            InMemoryLedger::new(),
            gateway.clone(),
            courier,
            notifier.clone(),
            InMemoryLabelStore::new(),
        )),
        gateway,
        notifier,
        primary,
        secondary,
    }
}

fn address(recipient: &str) -> ShippingAddress {
    ShippingAddress::new(
        recipient,
        "12 Rondebosch Main Rd",
        "Rondebosch",
        "Cape Town",
        "7700",
        "+27 82 555 0100",
    )
}

async fn seed_book(w: &World, seller_id: UserId, title: &str, price: Money) -> BookId {
    let book = Book::new(seller_id, title, price);
    let id = book.id;
    w.orchestrator.ledger().insert_book(book).await.unwrap();
    id
}

fn line(book_id: BookId, seller_id: UserId, seller_email: &str, title: &str, price: Money) -> CartItem {
    CartItem::new(book_id, seller_id, seller_email, title, price, 1)
}

#[tokio::test]
async fn two_seller_checkout_splits_into_sibling_orders() {
    let w = world();
    let buyer_id = UserId::new();
    let seller_a = UserId::new();
    let seller_b = UserId::new();
    let book_a = seed_book(&w, seller_a, "Discrete Mathematics", Money::from_rands(100)).await;
    let book_b = seed_book(&w, seller_b, "Intro to Statistics", Money::from_rands(50)).await;
    w.gateway.seed_success("PAY_split", Money::from_rands(150));

    let receipt = w
        .orchestrator
        .checkout(CheckoutRequest {
            buyer_id,
            buyer_email: "buyer@uct.ac.za".to_string(),
            items: vec![
                line(book_a, seller_a, "a@uct.ac.za", "Discrete Mathematics", Money::from_rands(100)),
                line(book_b, seller_b, "b@uct.ac.za", "Intro to Statistics", Money::from_rands(50)),
            ],
            payment_reference: "PAY_split".to_string(),
            shipping_address: address("Buyer"),
        })
        .await
        .unwrap();

    assert_eq!(receipt.total_charged.cents(), 15000);
    assert_eq!(receipt.orders.len(), 2);
    assert_eq!(receipt.orders[0].seller_id, seller_a);
    assert_eq!(receipt.orders[0].total_amount.cents(), 10000);
    assert_eq!(receipt.orders[1].seller_id, seller_b);
    assert_eq!(receipt.orders[1].total_amount.cents(), 5000);

    // Siblings share the reference and the 48h deadline.
    for order in &receipt.orders {
        assert_eq!(order.status, OrderStatus::PendingCommit);
        assert_eq!(order.payment_reference, "PAY_split");
        assert_eq!(order.expires_at, Some(order.created_at + commit_deadline()));
    }

    // Both books left the market.
    for id in [book_a, book_b] {
        let book = w.orchestrator.ledger().get_book(id).await.unwrap().unwrap();
        assert!(book.sold);
    }

    // One buyer confirmation, one alert per seller.
    assert_eq!(w.notifier.sent_to("buyer@uct.ac.za"), vec!["order_placed"]);
    assert_eq!(w.notifier.sent_to("a@uct.ac.za"), vec!["new_order"]);
    assert_eq!(w.notifier.sent_to("b@uct.ac.za"), vec!["new_order"]);
}

#[tokio::test]
async fn concurrent_checkouts_for_one_book_have_one_winner() {
    let w = world();
    let seller_id = UserId::new();
    let price = Money::from_rands(200);
    let book_id = seed_book(&w, seller_id, "Anatomy & Physiology", price).await;
    w.gateway.seed_success("PAY_first", price);
    w.gateway.seed_success("PAY_second", price);

    let request = |buyer: &str, reference: &str| CheckoutRequest {
        buyer_id: UserId::new(),
        buyer_email: buyer.to_string(),
        items: vec![line(book_id, seller_id, "s@uct.ac.za", "Anatomy & Physiology", price)],
        payment_reference: reference.to_string(),
        shipping_address: address(buyer),
    };

    let (first, second) = tokio::join!(
        w.orchestrator.checkout(request("one@uct.ac.za", "PAY_first")),
        w.orchestrator.checkout(request("two@uct.ac.za", "PAY_second")),
    );

    let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = if first.is_err() { first } else { second };
    match loser {
        Err(FulfillmentError::InventoryConflict(ids)) => assert_eq!(ids, vec![book_id]),
        other => panic!("expected inventory conflict, got {other:?}"),
    }

    assert_eq!(w.orchestrator.ledger().order_count().await, 1);
}

#[tokio::test]
async fn commit_and_expire_race_resolves_to_one_outcome() {
    let w = world();
    let seller_id = UserId::new();
    let price = Money::from_rands(150);
    let book_id = seed_book(&w, seller_id, "Financial Accounting", price).await;
    w.gateway.seed_success("PAY_race", price);

    let receipt = w
        .orchestrator
        .checkout(CheckoutRequest {
            buyer_id: UserId::new(),
            buyer_email: "buyer@uct.ac.za".to_string(),
            items: vec![line(book_id, seller_id, "s@uct.ac.za", "Financial Accounting", price)],
            payment_reference: "PAY_race".to_string(),
            shipping_address: address("Buyer"),
        })
        .await
        .unwrap();
    let order_id = receipt.orders[0].id;

    // Put the order right on the deadline and fire both actors.
    w.orchestrator
        .ledger()
        .set_expires_at(order_id, Utc::now() - Duration::seconds(1))
        .await;
    let (committed, expired) = tokio::join!(
        w.orchestrator.commit(order_id, seller_id, address("Seller")),
        w.orchestrator.expire(order_id),
    );

    let order = w.orchestrator.ledger().get_order(order_id).await.unwrap().unwrap();
    match order.status {
        OrderStatus::Expired => {
            // Sweeper won: the commit saw a conflict and the buyer was
            // refunded exactly once.
            assert!(matches!(
                committed,
                Err(FulfillmentError::InvalidTransition { .. })
            ));
            assert_eq!(expired.unwrap(), true);
            assert_eq!(w.gateway.refund_count(), 1);
            let book = w.orchestrator.ledger().get_book(book_id).await.unwrap().unwrap();
            assert!(!book.sold);
        }
        OrderStatus::Committed | OrderStatus::CourierScheduled => {
            // Seller won: no refund, book stays sold.
            assert!(committed.is_ok() || matches!(
                committed,
                Err(FulfillmentError::CourierBookingFailed { .. })
            ));
            assert_eq!(expired.unwrap(), false);
            assert_eq!(w.gateway.refund_count(), 0);
            let book = w.orchestrator.ledger().get_book(book_id).await.unwrap().unwrap();
            assert!(book.sold);
        }
        other => panic!("unexpected terminal status {other}"),
    }
}

#[tokio::test]
async fn courier_fallback_books_with_second_provider() {
    let w = world();
    let seller_id = UserId::new();
    let price = Money::from_rands(300);
    let book_id = seed_book(&w, seller_id, "Organic Chemistry", price).await;
    w.gateway.seed_success("PAY_fb", price);
    w.primary.set_fail_on_book(true);

    let receipt = w
        .orchestrator
        .checkout(CheckoutRequest {
            buyer_id: UserId::new(),
            buyer_email: "buyer@uct.ac.za".to_string(),
            items: vec![line(book_id, seller_id, "s@uct.ac.za", "Organic Chemistry", price)],
            payment_reference: "PAY_fb".to_string(),
            shipping_address: address("Buyer"),
        })
        .await
        .unwrap();

    let order = w
        .orchestrator
        .commit(receipt.orders[0].id, seller_id, address("Seller"))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::CourierScheduled);
    assert_eq!(order.courier_provider.as_deref(), Some("fastway"));
    assert_eq!(w.secondary.booking_count(), 1);
}

#[tokio::test]
async fn total_courier_failure_leaves_order_committed_without_refund() {
    let w = world();
    let seller_id = UserId::new();
    let price = Money::from_rands(220);
    let book_id = seed_book(&w, seller_id, "Constitutional Law", price).await;
    w.gateway.seed_success("PAY_cf", price);
    w.primary.set_fail_on_book(true);
    w.secondary.set_fail_on_book(true);

    let receipt = w
        .orchestrator
        .checkout(CheckoutRequest {
            buyer_id: UserId::new(),
            buyer_email: "buyer@uct.ac.za".to_string(),
            items: vec![line(book_id, seller_id, "s@uct.ac.za", "Constitutional Law", price)],
            payment_reference: "PAY_cf".to_string(),
            shipping_address: address("Buyer"),
        })
        .await
        .unwrap();
    let order_id = receipt.orders[0].id;

    let err = w
        .orchestrator
        .commit(order_id, seller_id, address("Seller"))
        .await
        .unwrap_err();
    match err {
        FulfillmentError::CourierBookingFailed { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].starts_with("courier-guy"));
            assert!(attempts[1].starts_with("fastway"));
        }
        other => panic!("expected booking failure, got {other}"),
    }

    // The sale survives the booking failure untouched.
    let order = w.orchestrator.ledger().get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Committed);
    assert_eq!(w.gateway.refund_count(), 0);
    let book = w.orchestrator.ledger().get_book(book_id).await.unwrap().unwrap();
    assert!(book.sold);
}

#[tokio::test]
async fn full_happy_path_reaches_delivered() {
    let w = world();
    let seller_id = UserId::new();
    let price = Money::from_rands(175);
    let book_id = seed_book(&w, seller_id, "Microbiology Fundamentals", price).await;
    w.gateway.seed_success("PAY_hp", price);

    let receipt = w
        .orchestrator
        .checkout(CheckoutRequest {
            buyer_id: UserId::new(),
            buyer_email: "buyer@uct.ac.za".to_string(),
            items: vec![line(book_id, seller_id, "s@uct.ac.za", "Microbiology Fundamentals", price)],
            payment_reference: "PAY_hp".to_string(),
            shipping_address: address("Buyer"),
        })
        .await
        .unwrap();
    let order_id = receipt.orders[0].id;

    w.orchestrator
        .commit(order_id, seller_id, address("Seller"))
        .await
        .unwrap();
    let collected = w
        .orchestrator
        .collect(order_id, "courier-guy driver", None)
        .await
        .unwrap();
    assert_eq!(collected.order.status, OrderStatus::Collected);
    assert!(collected.delivery_check_at > collected.order.collected_at.unwrap());

    let delivered = w.orchestrator.deliver(order_id).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.delivered_at.is_some());
    assert_eq!(
        w.notifier.sent_to("buyer@uct.ac.za"),
        vec!["order_placed", "order_committed", "courier_booked", "order_collected"]
    );
}

#[tokio::test]
async fn expiry_refunds_full_order_amount_and_is_idempotent() {
    let w = world();
    let seller_id = UserId::new();
    let price = Money::from_rands(260);
    let book_id = seed_book(&w, seller_id, "Human Resource Management", price).await;
    w.gateway.seed_success("PAY_exp", price);

    let receipt = w
        .orchestrator
        .checkout(CheckoutRequest {
            buyer_id: UserId::new(),
            buyer_email: "buyer@uct.ac.za".to_string(),
            items: vec![line(book_id, seller_id, "s@uct.ac.za", "Human Resource Management", price)],
            payment_reference: "PAY_exp".to_string(),
            shipping_address: address("Buyer"),
        })
        .await
        .unwrap();
    let order_id = receipt.orders[0].id;
    w.orchestrator
        .ledger()
        .set_expires_at(order_id, Utc::now() - Duration::minutes(1))
        .await;

    assert!(w.orchestrator.expire(order_id).await.unwrap());
    assert!(!w.orchestrator.expire(order_id).await.unwrap());

    let order = w.orchestrator.ledger().get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert_eq!(order.decline_reason.as_deref(), Some("overdue_commit"));

    // The buyer gets the gross subtotal back, not the post-fee amount.
    assert_eq!(w.gateway.refund_count(), 1);
    assert_eq!(w.gateway.refunded_amount("PAY_exp").cents(), 26000);

    let refunds = w.orchestrator.ledger().refunds_for_order(order_id).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].reason, RefundReason::OverdueCommit);
    assert_eq!(refunds[0].status, RefundStatus::Completed);

    let book = w.orchestrator.ledger().get_book(book_id).await.unwrap().unwrap();
    assert!(!book.sold);

    // Commit after expiry must be rejected.
    let late = w
        .orchestrator
        .commit(order_id, seller_id, address("Seller"))
        .await;
    assert!(matches!(
        late,
        Err(FulfillmentError::InvalidTransition {
            actual: OrderStatus::Expired,
            ..
        })
    ));
}

#[tokio::test]
async fn decline_of_one_sibling_leaves_the_other_alive() {
    let w = world();
    let buyer_id = UserId::new();
    let seller_a = UserId::new();
    let seller_b = UserId::new();
    let book_a = seed_book(&w, seller_a, "Linear Algebra", Money::from_rands(100)).await;
    let book_b = seed_book(&w, seller_b, "Real Analysis", Money::from_rands(50)).await;
    w.gateway.seed_success("PAY_sib", Money::from_rands(150));

    let receipt = w
        .orchestrator
        .checkout(CheckoutRequest {
            buyer_id,
            buyer_email: "buyer@uct.ac.za".to_string(),
            items: vec![
                line(book_a, seller_a, "a@uct.ac.za", "Linear Algebra", Money::from_rands(100)),
                line(book_b, seller_b, "b@uct.ac.za", "Real Analysis", Money::from_rands(50)),
            ],
            payment_reference: "PAY_sib".to_string(),
            shipping_address: address("Buyer"),
        })
        .await
        .unwrap();

    let declined = w
        .orchestrator
        .decline(receipt.orders[0].id, seller_a, None)
        .await
        .unwrap();
    assert_eq!(declined.status, OrderStatus::Declined);

    // Partial refund: only seller A's subtotal goes back.
    assert_eq!(w.gateway.refunded_amount("PAY_sib").cents(), 10000);

    // Seller B's order and book are untouched.
    let sibling = w
        .orchestrator
        .ledger()
        .get_order(receipt.orders[1].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sibling.status, OrderStatus::PendingCommit);
    let book = w.orchestrator.ledger().get_book(book_b).await.unwrap().unwrap();
    assert!(book.sold);
    let released = w.orchestrator.ledger().get_book(book_a).await.unwrap().unwrap();
    assert!(!released.sold);
}
