//! Wallet endpoints.

use api_types::transaction::{
    TransactionKind, TransactionListResponse, TransactionNew, TransactionStatus, TransactionView,
    Withdraw,
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use engine::{Transaction, User};

use crate::{ServerError, ensure_same_user, server::ServerState};

fn transaction_view(tx: Transaction) -> TransactionView {
    TransactionView {
        id: tx.id,
        kind: match tx.kind {
            engine::TransactionKind::Deposit => TransactionKind::Deposit,
            engine::TransactionKind::Payment => TransactionKind::Payment,
            engine::TransactionKind::Withdrawal => TransactionKind::Withdrawal,
        },
        amount_minor: tx.amount_minor,
        status: match tx.status {
            engine::TransactionStatus::Pending => TransactionStatus::Pending,
            engine::TransactionStatus::Success => TransactionStatus::Success,
            engine::TransactionStatus::Failed => TransactionStatus::Failed,
        },
        reference: tx.reference,
        ride_id: tx.ride_id,
        description: tx.description,
        created_at: tx.created_at,
        updated_at: tx.updated_at,
    }
}

/// Deposits are opened as pending and wait for the gateway webhook;
/// payments and withdrawals are debited right away.
pub async fn create(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Json(payload): Json<TransactionNew>,
) -> Result<(StatusCode, Json<TransactionView>), ServerError> {
    let tx = match payload.kind {
        TransactionKind::Deposit => {
            state
                .engine
                .open_deposit(&user.id, payload.amount_minor, payload.reference.as_deref())
                .await?
        }
        TransactionKind::Payment | TransactionKind::Withdrawal => {
            if payload.reference.is_some() {
                return Err(ServerError::Generic(
                    "reference is only accepted for deposits".to_string(),
                ));
            }
            let kind = if payload.kind == TransactionKind::Payment {
                engine::TransactionKind::Payment
            } else {
                engine::TransactionKind::Withdrawal
            };
            state
                .engine
                .debit(&user.id, payload.amount_minor, kind)
                .await?
        }
    };
    Ok((StatusCode::CREATED, Json(transaction_view(tx))))
}

pub async fn withdraw(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Json(payload): Json<Withdraw>,
) -> Result<(StatusCode, Json<TransactionView>), ServerError> {
    ensure_same_user(&user.id, payload.user_id.as_deref())?;
    let tx = state
        .engine
        .withdraw(&user.id, payload.amount_minor)
        .await?;
    Ok((StatusCode::CREATED, Json(transaction_view(tx))))
}

pub async fn list(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
) -> Result<Json<TransactionListResponse>, ServerError> {
    let transactions = state.engine.transactions_for_user(&user.id).await?;
    let balance_minor = state.engine.balance(&user.id).await?;
    Ok(Json(TransactionListResponse {
        balance_minor,
        transactions: transactions.into_iter().map(transaction_view).collect(),
    }))
}
