use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Whether the same request may succeed later.
    pub retryable: bool,
}

pub mod user {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum RewardTier {
        Bronze,
        Silver,
        Gold,
        Platinum,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UserNew {
        pub username: String,
        pub password: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UserView {
        pub id: String,
        pub username: String,
        pub wallet_balance_minor: i64,
        pub ride_count: i64,
        pub reward_tier: RewardTier,
        pub created_at: DateTime<Utc>,
    }
}

pub mod ride {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum RideStatus {
        Booked,
        Completed,
        Cancelled,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RideNew {
        /// Must match the authenticated user when present.
        pub user_id: Option<String>,
        pub origin: String,
        pub destination: String,
        /// Must be > 0.
        pub fare_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PickupVerify {
        pub code: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RideRate {
        /// 1 to 5.
        pub rating: u8,
        /// Optional tip; 0 or absent means no tip.
        pub tip_minor: Option<i64>,
    }

    /// A ride as seen by its rider.
    ///
    /// `verification_code` is included: the rider shows it to the driver.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct RideView {
        pub id: Uuid,
        pub user_id: String,
        pub origin: String,
        pub destination: String,
        pub fare_minor: i64,
        pub status: RideStatus,
        pub verification_code: String,
        pub pickup_verified: bool,
        pub rating: Option<u8>,
        pub tip_minor: Option<i64>,
        pub created_at: DateTime<Utc>,
        pub completed_at: Option<DateTime<Utc>>,
        pub cancelled_at: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RideListResponse {
        pub rides: Vec<RideView>,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionKind {
        Deposit,
        Payment,
        Withdrawal,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionStatus {
        Pending,
        Success,
        Failed,
    }

    /// Request body for `POST /transactions`.
    ///
    /// A deposit is recorded as pending until the payment gateway confirms
    /// it; payments and withdrawals are debited immediately.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub kind: TransactionKind,
        pub amount_minor: i64,
        /// External reference, deposits only.
        pub reference: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Withdraw {
        pub user_id: Option<String>,
        pub amount_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionView {
        pub id: Uuid,
        pub kind: TransactionKind,
        pub amount_minor: i64,
        pub status: TransactionStatus,
        pub reference: Option<String>,
        pub ride_id: Option<Uuid>,
        pub description: Option<String>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionListResponse {
        pub balance_minor: i64,
        pub transactions: Vec<TransactionView>,
    }
}

pub mod notification {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct NotificationView {
        pub id: Uuid,
        pub title: String,
        pub message: String,
        pub is_read: bool,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct NotificationListResponse {
        pub notifications: Vec<NotificationView>,
        pub unread: usize,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MarkedRead {
        pub updated: u64,
    }
}

pub mod webhook {
    use super::*;

    /// Acknowledgement returned to the payment gateway.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct WebhookAck {
        /// `credited`, `already_processed`, `failed` or `ignored`.
        pub status: String,
        pub reference: Option<String>,
    }
}
