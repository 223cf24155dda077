//! Courier provider trait, provider fallback dispatch, and quoting.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use thiserror::Error;

use common::{Money, OrderId};
use domain::{Parcel, ShippingAddress};

use crate::error::FulfillmentError;

/// Flat-rate delivery estimate used only when no provider can quote.
const FLAT_RATE_QUOTE_CENTS: i64 = 8500;

/// Errors from an individual courier provider.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Provider unreachable or HTTP-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// Provider answered but refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Provider answered with a payload we could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A pickup booking request handed to a provider.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    /// The order this shipment fulfils; doubles as the provider reference.
    pub order_id: OrderId,
    pub pickup: ShippingAddress,
    pub delivery: ShippingAddress,
    pub parcel: Parcel,
}

/// A confirmed booking, normalized across providers.
#[derive(Debug, Clone)]
pub struct Booking {
    pub provider: String,
    pub tracking_number: String,
    pub pickup_date: NaiveDate,
    pub pickup_window: String,
    pub label_url: Option<String>,
}

/// A delivery cost estimate.
#[derive(Debug, Clone)]
pub struct Quote {
    pub provider: String,
    pub amount: Money,
    pub collection_days: u32,
}

/// Trait for a single courier provider integration.
#[async_trait]
pub trait CourierProvider: Send + Sync {
    /// Stable provider name recorded on orders and in error messages.
    fn name(&self) -> &str;

    /// Books a pickup, returning normalized tracking info.
    async fn book_pickup(&self, request: &BookingRequest) -> Result<Booking, CourierError>;

    /// Estimates the delivery cost for a parcel between two addresses.
    async fn quote(
        &self,
        parcel: &Parcel,
        pickup: &ShippingAddress,
        delivery: &ShippingAddress,
    ) -> Result<Quote, CourierError>;
}

/// Ordered fallback dispatch over courier providers.
///
/// Booking tries each provider in turn and aggregates every failure into
/// one error; it never fabricates a booking. Quoting degrades to a logged
/// flat-rate estimate instead, because a stale estimate is harmless where
/// a fake tracking number is not.
#[derive(Clone)]
pub struct CourierDispatcher {
    providers: Vec<Arc<dyn CourierProvider>>,
}

impl CourierDispatcher {
    /// Creates a dispatcher over an ordered provider list.
    pub fn new(providers: Vec<Arc<dyn CourierProvider>>) -> Self {
        Self { providers }
    }

    /// Books a pickup with the first provider that accepts it.
    pub async fn book_pickup(&self, request: &BookingRequest) -> Result<Booking, FulfillmentError> {
        let mut attempts = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.book_pickup(request).await {
                Ok(booking) => {
                    tracing::info!(
                        order_id = %request.order_id,
                        provider = provider.name(),
                        tracking = %booking.tracking_number,
                        "courier pickup booked"
                    );
                    return Ok(booking);
                }
                Err(e) => {
                    tracing::warn!(
                        order_id = %request.order_id,
                        provider = provider.name(),
                        error = %e,
                        "courier booking attempt failed"
                    );
                    attempts.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        metrics::counter!("courier_bookings_failed_total").increment(1);
        Err(FulfillmentError::CourierBookingFailed { attempts })
    }

    /// Quotes delivery cost, falling back to a flat-rate estimate when no
    /// provider is reachable.
    pub async fn quote(
        &self,
        parcel: &Parcel,
        pickup: &ShippingAddress,
        delivery: &ShippingAddress,
    ) -> Quote {
        for provider in &self.providers {
            match provider.quote(parcel, pickup, delivery).await {
                Ok(quote) => return quote,
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "quote attempt failed");
                }
            }
        }
        tracing::warn!("no courier provider reachable for quoting, using flat-rate estimate");
        Quote {
            provider: "flat-rate".to_string(),
            amount: Money::from_cents(FLAT_RATE_QUOTE_CENTS),
            collection_days: 5,
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryCourierState {
    bookings: Vec<(OrderId, String)>,
    next_id: u32,
    fail_on_book: bool,
    fail_on_quote: bool,
}

/// In-memory courier provider for testing.
#[derive(Clone)]
pub struct InMemoryCourierProvider {
    name: String,
    rate: Money,
    state: Arc<RwLock<InMemoryCourierState>>,
}

impl InMemoryCourierProvider {
    /// Creates a provider that books under the given name at a fixed rate.
    pub fn new(name: impl Into<String>, rate: Money) -> Self {
        Self {
            name: name.into(),
            rate,
            state: Arc::new(RwLock::new(InMemoryCourierState::default())),
        }
    }

    /// Configures the provider to refuse bookings.
    pub fn set_fail_on_book(&self, fail: bool) {
        self.state.write().unwrap().fail_on_book = fail;
    }

    /// Configures the provider to refuse quotes.
    pub fn set_fail_on_quote(&self, fail: bool) {
        self.state.write().unwrap().fail_on_quote = fail;
    }

    /// Returns the number of bookings this provider accepted.
    pub fn booking_count(&self) -> usize {
        self.state.read().unwrap().bookings.len()
    }
}

#[async_trait]
impl CourierProvider for InMemoryCourierProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn book_pickup(&self, request: &BookingRequest) -> Result<Booking, CourierError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_book {
            return Err(CourierError::Network("connection refused".to_string()));
        }

        state.next_id += 1;
        let tracking_number = format!("{}-{:04}", self.name.to_uppercase(), state.next_id);
        state
            .bookings
            .push((request.order_id, tracking_number.clone()));

        Ok(Booking {
            provider: self.name.clone(),
            tracking_number: tracking_number.clone(),
            pickup_date: Utc::now().date_naive() + Days::new(1),
            pickup_window: "08:00-17:00".to_string(),
            label_url: Some(format!(
                "https://{}.example/labels/{tracking_number}.pdf",
                self.name
            )),
        })
    }

    async fn quote(
        &self,
        _parcel: &Parcel,
        _pickup: &ShippingAddress,
        _delivery: &ShippingAddress,
    ) -> Result<Quote, CourierError> {
        let state = self.state.read().unwrap();
        if state.fail_on_quote {
            return Err(CourierError::Network("connection refused".to_string()));
        }
        Ok(Quote {
            provider: self.name.clone(),
            amount: self.rate,
            collection_days: 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest {
            order_id: OrderId::new(),
            pickup: ShippingAddress::new("S", "1 Rissik St", "CBD", "Johannesburg", "2000", "+27"),
            delivery: ShippingAddress::new("B", "9 Main Rd", "Rondebosch", "Cape Town", "7700", "+27"),
            parcel: Parcel::textbook(Money::from_rands(400)),
        }
    }

    fn dispatcher(
        a: &InMemoryCourierProvider,
        b: &InMemoryCourierProvider,
    ) -> CourierDispatcher {
        CourierDispatcher::new(vec![Arc::new(a.clone()), Arc::new(b.clone())])
    }

    #[tokio::test]
    async fn first_provider_wins_when_healthy() {
        let a = InMemoryCourierProvider::new("courier-guy", Money::from_rands(90));
        let b = InMemoryCourierProvider::new("fastway", Money::from_rands(75));
        let booking = dispatcher(&a, &b).book_pickup(&request()).await.unwrap();

        assert_eq!(booking.provider, "courier-guy");
        assert!(booking.tracking_number.starts_with("COURIER-GUY-"));
        assert_eq!(a.booking_count(), 1);
        assert_eq!(b.booking_count(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let a = InMemoryCourierProvider::new("courier-guy", Money::from_rands(90));
        let b = InMemoryCourierProvider::new("fastway", Money::from_rands(75));
        a.set_fail_on_book(true);

        let booking = dispatcher(&a, &b).book_pickup(&request()).await.unwrap();
        assert_eq!(booking.provider, "fastway");
        assert_eq!(a.booking_count(), 0);
        assert_eq!(b.booking_count(), 1);
    }

    #[tokio::test]
    async fn total_failure_aggregates_both_errors() {
        let a = InMemoryCourierProvider::new("courier-guy", Money::from_rands(90));
        let b = InMemoryCourierProvider::new("fastway", Money::from_rands(75));
        a.set_fail_on_book(true);
        b.set_fail_on_book(true);

        let err = dispatcher(&a, &b).book_pickup(&request()).await.unwrap_err();
        match err {
            FulfillmentError::CourierBookingFailed { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("courier-guy:"));
                assert!(attempts[1].starts_with("fastway:"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn quote_prefers_first_reachable_provider() {
        let a = InMemoryCourierProvider::new("courier-guy", Money::from_rands(90));
        let b = InMemoryCourierProvider::new("fastway", Money::from_rands(75));
        a.set_fail_on_quote(true);

        let req = request();
        let quote = dispatcher(&a, &b)
            .quote(&req.parcel, &req.pickup, &req.delivery)
            .await;
        assert_eq!(quote.provider, "fastway");
        assert_eq!(quote.amount.cents(), 7500);
    }

    #[tokio::test]
    async fn quote_falls_back_to_flat_rate() {
        let a = InMemoryCourierProvider::new("courier-guy", Money::from_rands(90));
        let b = InMemoryCourierProvider::new("fastway", Money::from_rands(75));
        a.set_fail_on_quote(true);
        b.set_fail_on_quote(true);

        let req = request();
        let quote = dispatcher(&a, &b)
            .quote(&req.parcel, &req.pickup, &req.delivery)
            .await;
        assert_eq!(quote.provider, "flat-rate");
        assert_eq!(quote.amount.cents(), FLAT_RATE_QUOTE_CENTS);
    }

    #[tokio::test]
    async fn empty_provider_list_fails_booking() {
        let dispatcher = CourierDispatcher::new(vec![]);
        let err = dispatcher.book_pickup(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::CourierBookingFailed { attempts } if attempts.is_empty()
        ));
    }
}
