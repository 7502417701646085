//! Strongly-typed identifiers.
//!
//! Booking, user and ledger rows all use integer surrogate keys issued by
//! PostgreSQL. Wrapping them keeps a kitchen id from being passed where a
//! chef id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

int_id!(
    /// Surrogate key of a kitchen, storage or equipment booking row.
    BookingId
);
int_id!(
    /// Platform user: a chef (payer) or a location manager (payee).
    UserId
);
int_id!(
    /// Bookable resource: a kitchen, a storage listing or a piece of equipment.
    ResourceId
);
int_id!(
    /// Surrogate key of a ledger row.
    TransactionId
);
int_id!(
    /// Surrogate key of a pending storage extension.
    ExtensionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metadata_strings() {
        assert_eq!("7".parse::<ResourceId>().unwrap(), ResourceId::new(7));
        assert_eq!(" 42 ".parse::<UserId>().unwrap().as_i64(), 42);
        assert!("abc".parse::<BookingId>().is_err());
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&BookingId::new(12)).unwrap();
        assert_eq!(json, "12");
    }
}
