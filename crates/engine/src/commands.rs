//! Command structs for engine operations.
//!
//! These types group parameters for the ride write operations, keeping call
//! sites readable and avoiding long argument lists.

use uuid::Uuid;

/// Book a ride for `user_id`.
#[derive(Clone, Debug)]
pub struct BookRideCmd {
    pub user_id: String,
    pub origin: String,
    pub destination: String,
    pub fare_minor: i64,
}

impl BookRideCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        fare_minor: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            origin: origin.into(),
            destination: destination.into(),
            fare_minor,
        }
    }
}

/// Rate a completed ride, optionally tipping from the rider's wallet.
#[derive(Clone, Debug)]
pub struct RateRideCmd {
    pub ride_id: Uuid,
    pub rating: u8,
    pub tip_minor: Option<i64>,
}

impl RateRideCmd {
    #[must_use]
    pub fn new(ride_id: Uuid, rating: u8) -> Self {
        Self {
            ride_id,
            rating,
            tip_minor: None,
        }
    }

    #[must_use]
    pub fn tip(mut self, tip_minor: i64) -> Self {
        self.tip_minor = Some(tip_minor);
        self
    }
}
