//! Ride state machine.
//!
//! `Booked -> Completed` and `Booked -> Cancelled` are the only transitions.
//! Completion needs a verified pickup and settles the fare exactly once:
//! the wallet debit, the payment row, the ride count, the reward tier and
//! the status flip commit together or not at all.

use chrono::Utc;
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    BookRideCmd, EngineError, Notification, RateRideCmd, ResultEngine, RewardTier, Ride,
    RideStatus, Transaction, TransactionKind, TransactionStatus, User, rides, users,
};

use super::{Engine, display_amount, normalize_required_text, require_positive, with_tx};

impl Engine {
    /// Book a ride.
    ///
    /// The balance must cover the fare, but nothing is reserved: the fare is
    /// only debited by [`Engine::complete_ride`].
    pub async fn book_ride(&self, cmd: BookRideCmd) -> ResultEngine<Ride> {
        let origin = normalize_required_text(&cmd.origin, "origin")?;
        let destination = normalize_required_text(&cmd.destination, "destination")?;
        require_positive(cmd.fare_minor, "fare_minor")?;

        let (ride, notification) = with_tx!(self, |db_tx| {
            let user = self.require_user(&db_tx, &cmd.user_id).await?;
            if user.wallet_balance_minor < cmd.fare_minor {
                return Err(EngineError::InsufficientFunds(format!(
                    "balance {} does not cover fare {}",
                    display_amount(user.wallet_balance_minor),
                    display_amount(cmd.fare_minor)
                )));
            }

            let ride = Ride::new(
                user.id.clone(),
                origin,
                destination,
                cmd.fare_minor,
                Utc::now(),
            )?;
            rides::ActiveModel::from(&ride).insert(&db_tx).await?;
            let notification = self
                .record_notification(
                    &db_tx,
                    &user.id,
                    "Ride Booked",
                    &format!(
                        "Your ride from {} to {} is booked. Give code {} to your driver at pickup.",
                        ride.origin, ride.destination, ride.verification_code
                    ),
                )
                .await?;
            Ok::<_, EngineError>((ride, notification))
        })?;

        tracing::info!(ride_id = %ride.id, user_id = %ride.user_id, fare_minor = ride.fare_minor, "ride booked");
        self.dispatcher.push(&notification);
        Ok(ride)
    }

    /// Check the pickup code entered by the driver.
    ///
    /// A wrong code leaves the ride untouched and can be retried. The right
    /// code is accepted once; after that the ride no longer checks codes.
    pub async fn verify_pickup(&self, ride_id: Uuid, code: &str) -> ResultEngine<Ride> {
        let (ride, notification) = with_tx!(self, |db_tx| {
            let mut ride = self.require_ride(&db_tx, ride_id).await?;
            if ride.status != RideStatus::Booked {
                return Err(EngineError::InvalidTransition(format!(
                    "ride is {}",
                    ride.status.as_str()
                )));
            }
            if ride.pickup_verified() {
                return Err(EngineError::InvalidTransition(
                    "pickup already verified".to_string(),
                ));
            }
            if ride.verification_code != code.trim() {
                tracing::info!(%ride_id, "pickup code mismatch");
                return Err(EngineError::CodeMismatch);
            }

            let now = Utc::now();
            let result = rides::Entity::update_many()
                .col_expr(rides::Column::PickupVerifiedAt, Expr::value(now))
                .filter(rides::Column::Id.eq(ride_id.to_string()))
                .filter(rides::Column::Status.eq(RideStatus::Booked.as_str()))
                .filter(rides::Column::PickupVerifiedAt.is_null())
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::InvalidTransition(
                    "pickup already verified".to_string(),
                ));
            }
            ride.pickup_verified_at = Some(now);

            let notification = self
                .record_notification(
                    &db_tx,
                    &ride.user_id,
                    "Pickup Verified",
                    "Your driver confirmed the pickup. Enjoy the ride!",
                )
                .await?;
            Ok::<_, EngineError>((ride, notification))
        })?;

        tracing::info!(%ride_id, "pickup verified");
        self.dispatcher.push(&notification);
        Ok(ride)
    }

    /// Settle and complete a ride.
    ///
    /// Completing an already completed ride is a successful no-op and never
    /// charges twice. Fails with [`EngineError::InsufficientFunds`] when the
    /// balance dropped below the fare after booking; the ride stays Booked.
    pub async fn complete_ride(&self, ride_id: Uuid) -> ResultEngine<Ride> {
        let ride = self.require_ride(&self.database, ride_id).await?;
        match ride.status {
            RideStatus::Completed => return Ok(ride),
            RideStatus::Cancelled => {
                return Err(EngineError::InvalidTransition(
                    "ride was cancelled".to_string(),
                ));
            }
            RideStatus::Booked => {}
        }

        let guard = self.locks.acquire(&ride.user_id).await;
        let (ride, notifications) = with_tx!(self, |db_tx| {
            // Re-read under the lock: a concurrent call may have settled it.
            let mut ride = self.require_ride(&db_tx, ride_id).await?;
            match ride.status {
                RideStatus::Completed => return Ok(ride),
                RideStatus::Cancelled => {
                    return Err(EngineError::InvalidTransition(
                        "ride was cancelled".to_string(),
                    ));
                }
                RideStatus::Booked => {}
            }
            if !ride.pickup_verified() {
                return Err(EngineError::InvalidTransition(
                    "pickup has not been verified".to_string(),
                ));
            }

            let user = self.require_user(&db_tx, &ride.user_id).await?;
            if user.wallet_balance_minor < ride.fare_minor {
                return Err(EngineError::InsufficientFunds(format!(
                    "balance {} does not cover fare {}",
                    display_amount(user.wallet_balance_minor),
                    display_amount(ride.fare_minor)
                )));
            }
            self.apply_debit(&db_tx, &user.id, ride.fare_minor).await?;

            let now = Utc::now();
            let payment = Transaction::new(
                user.id.clone(),
                TransactionKind::Payment,
                ride.fare_minor,
                TransactionStatus::Success,
                now,
            )?
            .ride(ride.id)
            .description("ride fare");
            self.insert_transaction(&db_tx, &payment).await?;

            let result = rides::Entity::update_many()
                .col_expr(
                    rides::Column::Status,
                    Expr::value(RideStatus::Completed.as_str()),
                )
                .col_expr(rides::Column::CompletedAt, Expr::value(now))
                .filter(rides::Column::Id.eq(ride_id.to_string()))
                .filter(rides::Column::Status.eq(RideStatus::Booked.as_str()))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::InvalidTransition(
                    "ride changed while completing".to_string(),
                ));
            }
            ride.status = RideStatus::Completed;
            ride.completed_at = Some(now);

            users::Entity::update_many()
                .col_expr(
                    users::Column::RideCount,
                    Expr::col(users::Column::RideCount).add(1),
                )
                .filter(users::Column::Id.eq(user.id.clone()))
                .exec(&db_tx)
                .await?;

            let mut notifications = vec![
                self.record_notification(
                    &db_tx,
                    &user.id,
                    "Ride Completed",
                    &format!(
                        "Your ride to {} is complete. {} was paid from your wallet.",
                        ride.destination,
                        display_amount(ride.fare_minor)
                    ),
                )
                .await?,
            ];
            if let Some((_, promotion)) = self
                .maybe_promote(&db_tx, &user, user.ride_count + 1)
                .await?
            {
                notifications.push(promotion);
            }
            Ok::<_, EngineError>((ride, notifications))
        })?;
        drop(guard);

        tracing::info!(%ride_id, user_id = %ride.user_id, fare_minor = ride.fare_minor, "ride completed");
        self.dispatcher.push_all(&notifications);
        Ok(ride)
    }

    /// Cancel a booked ride. Cancelling twice is a no-op; a completed ride
    /// cannot be cancelled. There is no wallet effect.
    pub async fn cancel_ride(&self, ride_id: Uuid) -> ResultEngine<Ride> {
        let ride = self.require_ride(&self.database, ride_id).await?;
        let guard = self.locks.acquire(&ride.user_id).await;
        let (ride, notification) = with_tx!(self, |db_tx| {
            let mut ride = self.require_ride(&db_tx, ride_id).await?;
            match ride.status {
                RideStatus::Cancelled => return Ok(ride),
                RideStatus::Completed => {
                    return Err(EngineError::InvalidTransition(
                        "ride already completed".to_string(),
                    ));
                }
                RideStatus::Booked => {}
            }

            let now = Utc::now();
            let result = rides::Entity::update_many()
                .col_expr(
                    rides::Column::Status,
                    Expr::value(RideStatus::Cancelled.as_str()),
                )
                .col_expr(rides::Column::CancelledAt, Expr::value(now))
                .filter(rides::Column::Id.eq(ride_id.to_string()))
                .filter(rides::Column::Status.eq(RideStatus::Booked.as_str()))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::InvalidTransition(
                    "ride changed while cancelling".to_string(),
                ));
            }
            ride.status = RideStatus::Cancelled;
            ride.cancelled_at = Some(now);

            let notification = self
                .record_notification(
                    &db_tx,
                    &ride.user_id,
                    "Ride Cancelled",
                    &format!("Your ride to {} was cancelled.", ride.destination),
                )
                .await?;
            Ok::<_, EngineError>((ride, notification))
        })?;
        drop(guard);

        tracing::info!(%ride_id, "ride cancelled");
        self.dispatcher.push(&notification);
        Ok(ride)
    }

    /// Rate a completed ride once, with an optional tip.
    ///
    /// The tip goes through the same conditional debit as fares. When the
    /// wallet cannot cover it nothing is written, the rating included.
    pub async fn rate_ride(&self, cmd: RateRideCmd) -> ResultEngine<Ride> {
        if !(1..=5).contains(&cmd.rating) {
            return Err(EngineError::InvalidRating(format!(
                "rating must be between 1 and 5, got {}",
                cmd.rating
            )));
        }
        let tip_minor = match cmd.tip_minor {
            Some(tip) if tip < 0 => {
                return Err(EngineError::InvalidAmount(
                    "tip_minor must be >= 0".to_string(),
                ));
            }
            Some(0) | None => None,
            Some(tip) => Some(tip),
        };

        let ride = self.require_ride(&self.database, cmd.ride_id).await?;
        let guard = self.locks.acquire(&ride.user_id).await;
        let (ride, notification) = with_tx!(self, |db_tx| {
            let mut ride = self.require_ride(&db_tx, cmd.ride_id).await?;
            if ride.status != RideStatus::Completed {
                return Err(EngineError::InvalidTransition(
                    "only completed rides can be rated".to_string(),
                ));
            }
            if ride.rating.is_some() {
                return Err(EngineError::InvalidTransition(
                    "ride already rated".to_string(),
                ));
            }

            let mut notification = None;
            if let Some(tip) = tip_minor {
                self.apply_debit(&db_tx, &ride.user_id, tip).await?;
                let payment = Transaction::new(
                    ride.user_id.clone(),
                    TransactionKind::Payment,
                    tip,
                    TransactionStatus::Success,
                    Utc::now(),
                )?
                .ride(ride.id)
                .description("ride tip");
                self.insert_transaction(&db_tx, &payment).await?;
                notification = Some(
                    self.record_notification(
                        &db_tx,
                        &ride.user_id,
                        "Tip Sent",
                        &format!(
                            "You tipped {} for your ride to {}. Thank you!",
                            display_amount(tip),
                            ride.destination
                        ),
                    )
                    .await?,
                );
            }

            let result = rides::Entity::update_many()
                .col_expr(rides::Column::Rating, Expr::value(i32::from(cmd.rating)))
                .col_expr(rides::Column::TipMinor, Expr::value(tip_minor))
                .filter(rides::Column::Id.eq(cmd.ride_id.to_string()))
                .filter(rides::Column::Rating.is_null())
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::InvalidTransition(
                    "ride already rated".to_string(),
                ));
            }
            ride.rating = Some(cmd.rating);
            ride.tip_minor = tip_minor;
            Ok::<_, EngineError>((ride, notification))
        })?;
        drop(guard);

        tracing::info!(ride_id = %ride.id, rating = cmd.rating, tip_minor = ?ride.tip_minor, "ride rated");
        if let Some(notification) = notification {
            self.dispatcher.push(&notification);
        }
        Ok(ride)
    }

    pub async fn ride(&self, ride_id: Uuid) -> ResultEngine<Ride> {
        self.require_ride(&self.database, ride_id).await
    }

    /// Rides of `user_id`, newest first.
    pub async fn rides_for_user(&self, user_id: &str) -> ResultEngine<Vec<Ride>> {
        self.require_user(&self.database, user_id).await?;
        rides::Entity::find()
            .filter(rides::Column::UserId.eq(user_id.to_string()))
            .order_by_desc(rides::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Ride::try_from)
            .collect()
    }

    async fn require_ride(&self, db: &impl ConnectionTrait, ride_id: Uuid) -> ResultEngine<Ride> {
        let model = rides::Entity::find_by_id(ride_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::RideNotFound(ride_id.to_string()))?;
        Ride::try_from(model)
    }

    /// Persist the tier derived from `ride_count` if it beats the stored one,
    /// and record the congratulation.
    pub(super) async fn maybe_promote(
        &self,
        db_tx: &DatabaseTransaction,
        user: &User,
        ride_count: i64,
    ) -> ResultEngine<Option<(RewardTier, Notification)>> {
        let Some(tier) = RewardTier::promote(user.reward_tier, ride_count) else {
            return Ok(None);
        };

        users::Entity::update_many()
            .col_expr(users::Column::RewardTier, Expr::value(tier.as_str()))
            .filter(users::Column::Id.eq(user.id.clone()))
            .exec(db_tx)
            .await?;
        let notification = self
            .record_notification(
                db_tx,
                &user.id,
                "Congratulations!",
                &format!(
                    "You reached the {} tier after {ride_count} rides.",
                    tier.label()
                ),
            )
            .await?;

        tracing::info!(user_id = %user.id, tier = tier.as_str(), ride_count, "reward tier promoted");
        Ok(Some((tier, notification)))
    }
}
