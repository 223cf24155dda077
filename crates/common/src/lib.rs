//! Shared types for the textbook marketplace.
//!
//! Provides the UUID-backed identifier newtypes used across crates and the
//! integer-cents [`Money`] type all amounts are expressed in.

pub mod ids;
pub mod money;

pub use ids::{BookId, OrderId, UserId};
pub use money::Money;
