//! Ride primitives.
//!
//! A ride moves `Booked -> Completed` or `Booked -> Cancelled`. While Booked
//! it can carry a verified pickup (`pickup_verified_at`), which is required
//! before completion but is not a separate status.

use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Booked,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for RideStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "booked" => Ok(Self::Booked),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::InvalidInput(format!(
                "invalid ride status: {other}"
            ))),
        }
    }
}

/// Draw a 4-digit pickup code.
///
/// Codes are scoped to one ride, two concurrent rides may share one.
pub fn generate_verification_code() -> String {
    let code: u16 = rand::rng().random_range(0..10_000);
    format!("{code:04}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub user_id: String,
    pub origin: String,
    pub destination: String,
    pub fare_minor: i64,
    pub status: RideStatus,
    pub verification_code: String,
    pub pickup_verified_at: Option<DateTime<Utc>>,
    pub rating: Option<u8>,
    pub tip_minor: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ride {
    pub fn new(
        user_id: String,
        origin: String,
        destination: String,
        fare_minor: i64,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if fare_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "fare_minor must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            origin,
            destination,
            fare_minor,
            status: RideStatus::Booked,
            verification_code: generate_verification_code(),
            pickup_verified_at: None,
            rating: None,
            tip_minor: None,
            created_at,
            completed_at: None,
            cancelled_at: None,
        })
    }

    pub fn pickup_verified(&self) -> bool {
        self.pickup_verified_at.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rides")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub origin: String,
    pub destination: String,
    pub fare_minor: i64,
    pub status: String,
    pub verification_code: String,
    pub pickup_verified_at: Option<DateTimeUtc>,
    pub rating: Option<i32>,
    pub tip_minor: Option<i64>,
    pub created_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
    pub cancelled_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Ride> for ActiveModel {
    fn from(ride: &Ride) -> Self {
        Self {
            id: ActiveValue::Set(ride.id.to_string()),
            user_id: ActiveValue::Set(ride.user_id.clone()),
            origin: ActiveValue::Set(ride.origin.clone()),
            destination: ActiveValue::Set(ride.destination.clone()),
            fare_minor: ActiveValue::Set(ride.fare_minor),
            status: ActiveValue::Set(ride.status.as_str().to_string()),
            verification_code: ActiveValue::Set(ride.verification_code.clone()),
            pickup_verified_at: ActiveValue::Set(ride.pickup_verified_at),
            rating: ActiveValue::Set(ride.rating.map(i32::from)),
            tip_minor: ActiveValue::Set(ride.tip_minor),
            created_at: ActiveValue::Set(ride.created_at),
            completed_at: ActiveValue::Set(ride.completed_at),
            cancelled_at: ActiveValue::Set(ride.cancelled_at),
        }
    }
}

impl TryFrom<Model> for Ride {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::RideNotFound(model.id.clone()))?,
            status: RideStatus::try_from(model.status.as_str())?,
            rating: model
                .rating
                .map(u8::try_from)
                .transpose()
                .map_err(|_| EngineError::InvalidRating("stored rating out of range".to_string()))?,
            user_id: model.user_id,
            origin: model.origin,
            destination: model.destination,
            fare_minor: model.fare_minor,
            verification_code: model.verification_code,
            pickup_verified_at: model.pickup_verified_at,
            tip_minor: model.tip_minor,
            created_at: model.created_at,
            completed_at: model.completed_at,
            cancelled_at: model.cancelled_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_code_has_four_digits() {
        for _ in 0..200 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn new_ride_is_booked_and_unverified() {
        let ride = Ride::new(
            "u1".to_string(),
            "Library".to_string(),
            "Hostel B".to_string(),
            200,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ride.status, RideStatus::Booked);
        assert!(!ride.pickup_verified());
        assert!(ride.rating.is_none());
    }

    #[test]
    fn zero_fare_is_rejected() {
        let err = Ride::new(
            "u1".to_string(),
            "A".to_string(),
            "B".to_string(),
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidAmount("fare_minor must be > 0".to_string())
        );
    }
}
