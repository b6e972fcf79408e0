use chrono::Utc;
use sea_orm::{QueryFilter, TransactionTrait, prelude::*};

use crate::{
    EngineError, ResultEngine, RewardTier, User, notifications, rides, transactions, users,
};

use super::{Engine, normalize_required_text, with_tx};

impl Engine {
    /// Create a user with an empty wallet at the Bronze tier.
    pub async fn register_user(&self, username: &str, password: &str) -> ResultEngine<User> {
        let username = normalize_required_text(username, "username")?;
        if password.is_empty() {
            return Err(EngineError::InvalidInput(
                "password must not be empty".to_string(),
            ));
        }

        let user = with_tx!(self, |db_tx| {
            self.require_username_free(&db_tx, &username).await?;
            let model = users::ActiveModel::new_user(&username, password, Utc::now())
                .insert(&db_tx)
                .await?;
            User::try_from(model)
        })?;

        tracing::info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Resolve Basic credentials to a user, `None` when they do not match.
    pub async fn authenticate(&self, username: &str, password: &str) -> ResultEngine<Option<User>> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username.to_string()))
            .filter(users::Column::PasswordHash.eq(users::hash_password(password)))
            .one(&self.database)
            .await?;
        model.map(User::try_from).transpose()
    }

    pub async fn user(&self, user_id: &str) -> ResultEngine<User> {
        self.require_user(&self.database, user_id).await
    }

    /// Recompute the reward tier of `user_id` from its ride count.
    ///
    /// Persists and announces the tier only when it is higher than the
    /// stored one; the returned tier is never lower than before.
    pub async fn evaluate_reward_tier(&self, user_id: &str) -> ResultEngine<RewardTier> {
        let guard = self.locks.acquire(user_id).await;
        let (tier, notification) = with_tx!(self, |db_tx| {
            let user = self.require_user(&db_tx, user_id).await?;
            let promoted = self.maybe_promote(&db_tx, &user, user.ride_count).await?;
            let tier = promoted
                .as_ref()
                .map_or(user.reward_tier, |(tier, _)| *tier);
            Ok::<_, EngineError>((tier, promoted.map(|(_, notification)| notification)))
        })?;
        drop(guard);

        if let Some(notification) = notification {
            self.dispatcher.push(&notification);
        }
        Ok(tier)
    }

    /// Delete a user together with its rides, ledger and notifications.
    pub async fn delete_user(&self, user_id: &str) -> ResultEngine<()> {
        let guard = self.locks.acquire(user_id).await;
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            notifications::Entity::delete_many()
                .filter(notifications::Column::UserId.eq(user_id.to_string()))
                .exec(&db_tx)
                .await?;
            transactions::Entity::delete_many()
                .filter(transactions::Column::UserId.eq(user_id.to_string()))
                .exec(&db_tx)
                .await?;
            rides::Entity::delete_many()
                .filter(rides::Column::UserId.eq(user_id.to_string()))
                .exec(&db_tx)
                .await?;
            users::Entity::delete_by_id(user_id.to_string())
                .exec(&db_tx)
                .await?;
            Ok::<_, EngineError>(())
        })?;
        drop(guard);

        self.dispatcher.unregister(user_id);
        self.locks.forget(user_id);
        tracing::info!(user_id, "user deleted");
        Ok(())
    }
}
