//! Order lifecycle orchestration for the textbook marketplace.
//!
//! The orchestrator drives a purchase from payment verification through
//! multi-seller order creation, seller commitment, courier booking with
//! provider fallback, collection, and delivery — or through the
//! decline/expire compensation path (refund + inventory release).
//!
//! Every status transition is a conditional update against the ledger, so
//! concurrent actors (a committing seller and the deadline sweeper, two
//! buyers racing for one book) resolve to exactly one winner.

pub mod error;
pub mod orchestrator;
pub mod reminder;
pub mod services;
pub mod sweeper;

pub use error::FulfillmentError;
pub use orchestrator::{CheckoutReceipt, CheckoutRequest, CollectReceipt, OrderOrchestrator};
pub use reminder::ReminderSweep;
pub use services::{
    Booking, BookingRequest, ChargeInit, CourierDispatcher, CourierError, CourierProvider,
    InMemoryCourierProvider, InMemoryLabelStore, InMemoryNotifier, InMemoryPaymentGateway,
    LabelError, LabelStore, Notice, NotificationGateway, NotifyError, PaymentGateway, Quote,
    Verification,
};
pub use sweeper::{DeadlineSweeper, SweepReport};
