//! Ride lifecycle endpoints.
//!
//! Every ride route except pickup verification is restricted to the rider.
//! Verification is performed by the driver, who proves presence with the
//! code the rider shows them.

use api_types::ride::{PickupVerify, RideListResponse, RideNew, RideRate, RideStatus, RideView};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{BookRideCmd, EngineError, RateRideCmd, Ride, User};
use uuid::Uuid;

use crate::{ServerError, ensure_same_user, server::ServerState};

fn ride_view(ride: Ride) -> RideView {
    let pickup_verified = ride.pickup_verified();
    RideView {
        id: ride.id,
        user_id: ride.user_id,
        origin: ride.origin,
        destination: ride.destination,
        fare_minor: ride.fare_minor,
        status: match ride.status {
            engine::RideStatus::Booked => RideStatus::Booked,
            engine::RideStatus::Completed => RideStatus::Completed,
            engine::RideStatus::Cancelled => RideStatus::Cancelled,
        },
        verification_code: ride.verification_code,
        pickup_verified,
        rating: ride.rating,
        tip_minor: ride.tip_minor,
        created_at: ride.created_at,
        completed_at: ride.completed_at,
        cancelled_at: ride.cancelled_at,
    }
}

/// Load a ride and check it belongs to `user`.
async fn owned_ride(state: &ServerState, user: &User, ride_id: Uuid) -> Result<Ride, ServerError> {
    let ride = state.engine.ride(ride_id).await?;
    if ride.user_id != user.id {
        return Err(EngineError::Forbidden("ride belongs to another user".to_string()).into());
    }
    Ok(ride)
}

pub async fn book(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Json(payload): Json<RideNew>,
) -> Result<(StatusCode, Json<RideView>), ServerError> {
    ensure_same_user(&user.id, payload.user_id.as_deref())?;
    let ride = state
        .engine
        .book_ride(BookRideCmd::new(
            user.id,
            payload.origin,
            payload.destination,
            payload.fare_minor,
        ))
        .await?;
    Ok((StatusCode::CREATED, Json(ride_view(ride))))
}

pub async fn list(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
) -> Result<Json<RideListResponse>, ServerError> {
    let rides = state.engine.rides_for_user(&user.id).await?;
    Ok(Json(RideListResponse {
        rides: rides.into_iter().map(ride_view).collect(),
    }))
}

pub async fn get(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideView>, ServerError> {
    let ride = owned_ride(&state, &user, ride_id).await?;
    Ok(Json(ride_view(ride)))
}

pub async fn verify(
    Extension(_user): Extension<User>,
    State(state): State<ServerState>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<PickupVerify>,
) -> Result<Json<RideView>, ServerError> {
    let ride = state.engine.verify_pickup(ride_id, &payload.code).await?;
    Ok(Json(ride_view(ride)))
}

pub async fn complete(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideView>, ServerError> {
    owned_ride(&state, &user, ride_id).await?;
    let ride = state.engine.complete_ride(ride_id).await?;
    Ok(Json(ride_view(ride)))
}

pub async fn cancel(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideView>, ServerError> {
    owned_ride(&state, &user, ride_id).await?;
    let ride = state.engine.cancel_ride(ride_id).await?;
    Ok(Json(ride_view(ride)))
}

pub async fn rate(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<RideRate>,
) -> Result<Json<RideView>, ServerError> {
    owned_ride(&state, &user, ride_id).await?;
    let mut cmd = RateRideCmd::new(ride_id, payload.rating);
    if let Some(tip_minor) = payload.tip_minor {
        cmd = cmd.tip(tip_minor);
    }
    let ride = state.engine.rate_ride(cmd).await?;
    Ok(Json(ride_view(ride)))
}
