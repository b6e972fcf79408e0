//! Ride lifecycle and wallet ledger core.
//!
//! The [`Engine`] owns the database connection, the per-user wallet locks
//! and the notification [`Dispatcher`]. Every mutation goes through it:
//!
//! - wallet ledger: credit, debit, pending deposits;
//! - ride state machine: book, verify pickup, complete, cancel, rate;
//! - reward tiers, evaluated after each completed ride;
//! - notifications: persisted first, pushed live second.
//!
//! Payment-gateway confirmations enter through the [`WebhookReconciler`].

pub use commands::{BookRideCmd, RateRideCmd};
pub use dispatcher::{ChannelId, Dispatcher, PushEvent};
pub use error::EngineError;
pub use gateway::{GatewayFuture, HttpGateway, PaymentGateway, VerifiedPayment};
pub use locks::UserLocks;
pub use notifications::Notification;
pub use ops::{Engine, EngineBuilder};
pub use rewards::RewardTier;
pub use rides::{Ride, RideStatus};
pub use transactions::{Transaction, TransactionKind, TransactionStatus};
pub use users::User;
pub use webhook::{SIGNATURE_HEADER, WebhookOutcome, WebhookReconciler, sign_payload};

mod commands;
mod dispatcher;
mod error;
mod gateway;
mod locks;
mod notifications;
mod ops;
mod rewards;
mod rides;
mod transactions;
mod users;
mod webhook;

type ResultEngine<T> = Result<T, EngineError>;
