//! Shipping address and parcel descriptors passed to courier providers.

use serde::{Deserialize, Serialize};

use common::Money;

/// A delivery or pickup street address.
///
/// Stored alongside the order; encryption of addresses at rest belongs to
/// the persistence plumbing outside this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub street: String,
    pub suburb: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
}

impl ShippingAddress {
    pub fn new(
        recipient: impl Into<String>,
        street: impl Into<String>,
        suburb: impl Into<String>,
        city: impl Into<String>,
        postal_code: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            street: street.into(),
            suburb: suburb.into(),
            city: city.into(),
            postal_code: postal_code.into(),
            phone: phone.into(),
        }
    }
}

/// Physical description of a shipment handed to a courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    /// Weight in grams.
    pub weight_grams: u32,
    /// Length x width x height in centimetres.
    pub dimensions_cm: (u32, u32, u32),
    /// Declared value for insurance purposes.
    pub declared_value: Money,
}

impl Parcel {
    /// A default-sized textbook parcel with the given declared value.
    pub fn textbook(declared_value: Money) -> Self {
        Self {
            weight_grams: 1500,
            dimensions_cm: (30, 25, 10),
            declared_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textbook_parcel_defaults() {
        let parcel = Parcel::textbook(Money::from_rands(250));
        assert_eq!(parcel.weight_grams, 1500);
        assert_eq!(parcel.declared_value.cents(), 25000);
    }

    #[test]
    fn address_serialization_roundtrip() {
        let addr = ShippingAddress::new(
            "T. Mokoena",
            "12 Jorissen St",
            "Braamfontein",
            "Johannesburg",
            "2001",
            "+27821234567",
        );
        let json = serde_json::to_string(&addr).unwrap();
        let back: ShippingAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
