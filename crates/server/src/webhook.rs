//! Payment-gateway callback endpoint.

use api_types::webhook::WebhookAck;
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use engine::{SIGNATURE_HEADER, WebhookOutcome};

use crate::{ServerError, server::ServerState};

/// Any 2xx tells the gateway to stop redelivering; errors make it retry.
pub async fn paystack(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServerError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let outcome = state.reconciler.handle_callback(signature, &body).await?;

    let ack = match outcome {
        WebhookOutcome::Credited {
            reference,
            user_id,
            amount_minor,
        } => {
            tracing::info!(reference = %reference, user_id = %user_id, amount_minor, "webhook credited wallet");
            WebhookAck {
                status: "credited".to_string(),
                reference: Some(reference),
            }
        }
        WebhookOutcome::AlreadyProcessed { reference } => WebhookAck {
            status: "already_processed".to_string(),
            reference: Some(reference),
        },
        WebhookOutcome::Failed { reference } => WebhookAck {
            status: "failed".to_string(),
            reference: Some(reference),
        },
        WebhookOutcome::Ignored { .. } => WebhookAck {
            status: "ignored".to_string(),
            reference: None,
        },
    };
    Ok(Json(ack))
}
