use api_types::ErrorResponse;
use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

pub use server::{ServerState, router, run_with_listener};

mod notifications;
mod push;
mod rides;
mod server;
mod transactions;
mod users;
mod webhook;

pub mod types {
    pub mod user {
        pub use api_types::user::{RewardTier, UserNew, UserView};
    }

    pub mod ride {
        pub use api_types::ride::{
            PickupVerify, RideListResponse, RideNew, RideRate, RideStatus, RideView,
        };
    }

    pub mod transaction {
        pub use api_types::transaction::{
            TransactionKind, TransactionListResponse, TransactionNew, TransactionStatus,
            TransactionView, Withdraw,
        };
    }

    pub mod notification {
        pub use api_types::notification::{MarkedRead, NotificationListResponse, NotificationView};
        pub use engine::PushEvent;
    }

    pub mod webhook {
        pub use api_types::webhook::WebhookAck;
    }
}

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        EngineError::UserNotFound(_)
        | EngineError::RideNotFound(_)
        | EngineError::NotificationNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_)
        | EngineError::DuplicateReference(_)
        | EngineError::InvalidTransition(_) => StatusCode::CONFLICT,
        EngineError::AmountMismatch(_) | EngineError::InvalidPayload(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::GatewayTimeout | EngineError::Gateway(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::InsufficientFunds(_)
        | EngineError::CodeMismatch
        | EngineError::InvalidAmount(_)
        | EngineError::InvalidRating(_)
        | EngineError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        EngineError::Gateway(detail) => {
            tracing::warn!("payment gateway error: {detail}");
            "payment gateway unavailable".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error, retryable) = match self {
            ServerError::Engine(err) => {
                let retryable = err.is_retryable();
                (
                    status_for_engine_error(&err),
                    message_for_engine_error(err),
                    retryable,
                )
            }
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err, false),
        };

        (status, Json(ErrorResponse { error, retryable })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

/// Reject requests whose body or path names another user.
fn ensure_same_user(authenticated: &str, claimed: Option<&str>) -> Result<(), ServerError> {
    match claimed {
        Some(claimed) if claimed != authenticated => Err(EngineError::Forbidden(
            "cannot act on behalf of another user".to_string(),
        )
        .into()),
        _ => Ok(()),
    }
}
