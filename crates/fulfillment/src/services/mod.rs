//! Leaf gateway interfaces consumed by the orchestrator.
//!
//! Each gateway is a trait at the boundary of an excluded collaborator
//! (payment processor, courier providers, email, object storage), with an
//! in-memory implementation used by tests and the worker's default wiring.

pub mod courier;
pub mod labels;
pub mod notify;
pub mod payment;

pub use courier::{
    Booking, BookingRequest, CourierDispatcher, CourierError, CourierProvider,
    InMemoryCourierProvider, Quote,
};
pub use labels::{InMemoryLabelStore, LabelError, LabelStore};
pub use notify::{InMemoryNotifier, Notice, NotificationGateway, NotifyError};
pub use payment::{ChargeInit, InMemoryPaymentGateway, PaymentGateway, Verification};
