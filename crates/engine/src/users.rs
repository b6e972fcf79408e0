//! Users table and the `User` domain type.
//!
//! A user owns exactly one wallet: the running balance lives on the user row
//! and is only ever changed through the ledger operations in
//! [`crate::Engine`].

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{EngineError, RewardTier};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub wallet_balance_minor: i64,
    pub ride_count: i64,
    pub reward_tier: RewardTier,
    pub created_at: DateTime<Utc>,
}

/// Hash used to store passwords.
pub(crate) fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    pub password_hash: String,
    pub wallet_balance_minor: i64,
    pub ride_count: i64,
    pub reward_tier: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn new_user(username: &str, password: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            username: ActiveValue::Set(username.to_string()),
            password_hash: ActiveValue::Set(hash_password(password)),
            wallet_balance_minor: ActiveValue::Set(0),
            ride_count: ActiveValue::Set(0),
            reward_tier: ActiveValue::Set(RewardTier::Bronze.as_str().to_string()),
            created_at: ActiveValue::Set(now),
        }
    }
}

impl TryFrom<Model> for User {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            reward_tier: RewardTier::try_from(model.reward_tier.as_str())?,
            id: model.id,
            username: model.username,
            wallet_balance_minor: model.wallet_balance_minor,
            ride_count: model.ride_count,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_stable_hex() {
        let hash = hash_password("secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_password("secret"));
        assert_ne!(hash, hash_password("Secret"));
    }
}
