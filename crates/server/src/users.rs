//! Registration and profile endpoints.

use api_types::user::{RewardTier, UserNew, UserView};
use axum::{Extension, Json, extract::State, http::StatusCode};
use engine::User;

use crate::{ServerError, server::ServerState};

fn user_view(user: User) -> UserView {
    UserView {
        id: user.id,
        username: user.username,
        wallet_balance_minor: user.wallet_balance_minor,
        ride_count: user.ride_count,
        reward_tier: match user.reward_tier {
            engine::RewardTier::Bronze => RewardTier::Bronze,
            engine::RewardTier::Silver => RewardTier::Silver,
            engine::RewardTier::Gold => RewardTier::Gold,
            engine::RewardTier::Platinum => RewardTier::Platinum,
        },
        created_at: user.created_at,
    }
}

/// Create an account. The only user endpoint without authentication.
pub async fn register(
    State(state): State<ServerState>,
    Json(payload): Json<UserNew>,
) -> Result<(StatusCode, Json<UserView>), ServerError> {
    let user = state
        .engine
        .register_user(&payload.username, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user_view(user))))
}

/// Profile with the current balance and tier.
pub async fn me(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
) -> Result<Json<UserView>, ServerError> {
    // The extension is a snapshot from the auth lookup; reload for fresh numbers.
    let user = state.engine.user(&user.id).await?;
    Ok(Json(user_view(user)))
}

pub async fn delete_me(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_user(&user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
