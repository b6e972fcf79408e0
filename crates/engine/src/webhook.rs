//! Payment-gateway webhook reconciliation.
//!
//! A callback credits a wallet only when all of these hold: the HMAC
//! signature matches the raw body, the gateway confirms the reference, the
//! confirmed amount and currency match the pending deposit, and the deposit
//! is still Pending. Redeliveries of a settled reference are acknowledged
//! without touching the ledger.

use std::{sync::Arc, time::Duration};

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use crate::{Engine, EngineError, PaymentGateway, ResultEngine};

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the hex HMAC-SHA512 of the body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

const CHARGE_SUCCESS: &str = "charge.success";

fn keyed_mac(secret: &str) -> ResultEngine<HmacSha512> {
    HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|err| EngineError::InvalidInput(format!("webhook secret: {err}")))
}

/// Hex HMAC-SHA512 of `body` keyed with `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> ResultEngine<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, signature: Option<&str>, body: &[u8]) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = keyed_mac(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    amount: i64,
    currency: String,
}

/// How a callback was handled. Every variant is acknowledged to the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited {
        reference: String,
        user_id: String,
        amount_minor: i64,
    },
    AlreadyProcessed {
        reference: String,
    },
    Failed {
        reference: String,
    },
    Ignored {
        event: String,
    },
}

pub struct WebhookReconciler {
    engine: Arc<Engine>,
    gateway: Arc<dyn PaymentGateway>,
    secret: String,
    currency: String,
    verify_timeout: Duration,
}

impl WebhookReconciler {
    pub fn new(
        engine: Arc<Engine>,
        gateway: Arc<dyn PaymentGateway>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            gateway,
            secret: secret.into(),
            currency: "NGN".to_string(),
            verify_timeout: Duration::from_secs(10),
        }
    }

    /// Currency every confirmed charge must be in.
    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Upper bound for the gateway re-verification call.
    #[must_use]
    pub fn verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Process one gateway callback.
    ///
    /// `signature` is the raw value of [`SIGNATURE_HEADER`], `body` the raw
    /// request body exactly as received.
    pub async fn handle_callback(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> ResultEngine<WebhookOutcome> {
        if !verify_signature(&self.secret, signature, body) {
            tracing::warn!("webhook rejected: bad signature");
            return Err(EngineError::SignatureInvalid);
        }

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|err| EngineError::InvalidPayload(err.to_string()))?;
        if payload.event != CHARGE_SUCCESS {
            tracing::debug!(event = %payload.event, "webhook event ignored");
            return Ok(WebhookOutcome::Ignored {
                event: payload.event,
            });
        }
        let data: ChargeData = serde_json::from_value(payload.data)
            .map_err(|err| EngineError::InvalidPayload(err.to_string()))?;
        let reference = data.reference.trim().to_string();
        if reference.is_empty() {
            return Err(EngineError::InvalidPayload(
                "missing reference".to_string(),
            ));
        }

        let verified =
            match tokio::time::timeout(self.verify_timeout, self.gateway.verify(&reference)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(reference = %reference, "gateway verification timed out");
                    return Err(EngineError::GatewayTimeout);
                }
            };

        let Some(deposit) = self.engine.pending_deposit(&reference).await? else {
            tracing::info!(reference = %reference, "webhook for a reference that is not pending");
            return Ok(WebhookOutcome::AlreadyProcessed { reference });
        };

        if !verified.is_successful() {
            tracing::warn!(reference = %reference, status = %verified.status, "gateway did not confirm the charge");
            return Ok(if self.engine.fail_deposit(&deposit).await? {
                WebhookOutcome::Failed { reference }
            } else {
                WebhookOutcome::AlreadyProcessed { reference }
            });
        }

        let amount_ok =
            verified.amount_minor == deposit.amount_minor && data.amount == deposit.amount_minor;
        let currency_ok = verified.currency.eq_ignore_ascii_case(&self.currency)
            && data.currency.eq_ignore_ascii_case(&self.currency);
        if !amount_ok || !currency_ok {
            tracing::warn!(
                reference = %reference,
                expected = deposit.amount_minor,
                confirmed = verified.amount_minor,
                currency = %verified.currency,
                "webhook amount mismatch"
            );
            self.engine.fail_deposit(&deposit).await?;
            return Err(EngineError::AmountMismatch(format!(
                "expected {} {}, confirmed {} {}",
                deposit.amount_minor, self.currency, verified.amount_minor, verified.currency
            )));
        }

        match self
            .engine
            .settle_deposit(&deposit, verified.amount_minor)
            .await?
        {
            Some(settled) => Ok(WebhookOutcome::Credited {
                reference,
                user_id: settled.user_id,
                amount_minor: settled.amount_minor,
            }),
            None => Ok(WebhookOutcome::AlreadyProcessed { reference }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign_payload("secret", body).unwrap();
        assert_eq!(signature.len(), 128);
        assert!(verify_signature("secret", Some(&signature), body));
    }

    #[test]
    fn signature_rejects_tampering() {
        let body = br#"{"event":"charge.success","data":{"amount":100}}"#;
        let signature = sign_payload("secret", body).unwrap();

        assert!(!verify_signature("other", Some(&signature), body));
        assert!(!verify_signature(
            "secret",
            Some(&signature),
            br#"{"event":"charge.success","data":{"amount":900}}"#
        ));
        assert!(!verify_signature("secret", None, body));
        assert!(!verify_signature("secret", Some("not-hex"), body));
        assert!(!verify_signature("secret", Some(""), body));
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let body = b"{}";
        let signature = sign_payload("secret", body).unwrap().to_uppercase();
        assert!(verify_signature("secret", Some(&signature), body));
    }
}
