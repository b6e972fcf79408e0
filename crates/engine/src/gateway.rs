//! Payment-gateway client used to re-verify webhook claims.
//!
//! A webhook body is only a claim. Before any credit the reconciler asks the
//! gateway directly what it knows about the reference.

use std::{future::Future, pin::Pin, time::Duration};

use reqwest::StatusCode;
use serde::Deserialize;

use crate::{EngineError, ResultEngine};

/// What the gateway reports for a reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub reference: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
}

impl VerifiedPayment {
    pub fn is_successful(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

pub type GatewayFuture<'a> = Pin<Box<dyn Future<Output = ResultEngine<VerifiedPayment>> + Send + 'a>>;

/// Remote source of truth for payment references.
pub trait PaymentGateway: Send + Sync {
    fn verify<'a>(&'a self, reference: &'a str) -> GatewayFuture<'a>;
}

/// Paystack-style HTTP client: `GET {base_url}/transaction/verify/{reference}`
/// with the secret key as bearer token.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct VerifyEnvelope {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<VerifyData>,
}

#[derive(Deserialize)]
struct VerifyData {
    reference: String,
    status: String,
    amount: i64,
    currency: String,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> ResultEngine<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EngineError::Gateway(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn fetch(&self, reference: &str) -> ResultEngine<VerifiedPayment> {
        let url = format!("{}/transaction/verify/{reference}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        interpret_verify_response(reference, status, &body)
    }
}

/// Turn a verify answer into a [`VerifiedPayment`].
///
/// Only two answers are conclusive: a 2xx envelope carrying the charge, and a
/// 400/404 envelope with `status: false` (the gateway does not know the
/// reference). Anything else is gateway trouble and leaves the deposit alone.
fn interpret_verify_response(
    reference: &str,
    status: StatusCode,
    body: &[u8],
) -> ResultEngine<VerifiedPayment> {
    let envelope = serde_json::from_slice::<VerifyEnvelope>(body);

    if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
        return match envelope {
            Ok(envelope) if !envelope.status => {
                tracing::warn!(reference, message = %envelope.message, "gateway does not know the reference");
                Ok(VerifiedPayment {
                    reference: reference.to_string(),
                    status: "failed".to_string(),
                    amount_minor: 0,
                    currency: String::new(),
                })
            }
            _ => Err(EngineError::Gateway(format!("gateway answered {status}"))),
        };
    }
    if !status.is_success() {
        return Err(EngineError::Gateway(format!("gateway answered {status}")));
    }

    let envelope =
        envelope.map_err(|err| EngineError::Gateway(format!("unreadable answer: {err}")))?;
    let data = match (envelope.status, envelope.data) {
        (true, Some(data)) => data,
        _ => {
            return Err(EngineError::Gateway(format!(
                "verification not confirmed: {}",
                envelope.message
            )));
        }
    };
    if data.reference != reference {
        return Err(EngineError::Gateway(format!(
            "asked for {reference}, gateway answered for {}",
            data.reference
        )));
    }

    Ok(VerifiedPayment {
        reference: data.reference,
        status: data.status,
        amount_minor: data.amount,
        currency: data.currency,
    })
}

impl PaymentGateway for HttpGateway {
    fn verify<'a>(&'a self, reference: &'a str) -> GatewayFuture<'a> {
        Box::pin(self.fetch(reference))
    }
}

fn map_transport_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::GatewayTimeout
    } else {
        EngineError::Gateway(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_status_is_case_insensitive() {
        let payment = VerifiedPayment {
            reference: "ref".to_string(),
            status: "SUCCESS".to_string(),
            amount_minor: 100,
            currency: "NGN".to_string(),
        };
        assert!(payment.is_successful());

        let abandoned = VerifiedPayment {
            status: "abandoned".to_string(),
            ..payment
        };
        assert!(!abandoned.is_successful());
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let gateway =
            HttpGateway::new("https://api.paystack.co/", "sk", Duration::from_secs(1)).unwrap();
        assert_eq!(gateway.base_url, "https://api.paystack.co");
    }

    #[test]
    fn confirmed_charge_is_returned() {
        let body = br#"{"status":true,"message":"ok","data":{"reference":"PSK-1","status":"success","amount":5000,"currency":"NGN"}}"#;
        let payment = interpret_verify_response("PSK-1", StatusCode::OK, body).unwrap();
        assert_eq!(payment.amount_minor, 5000);
        assert!(payment.is_successful());

        let abandoned = br#"{"status":true,"message":"ok","data":{"reference":"PSK-1","status":"abandoned","amount":5000,"currency":"NGN"}}"#;
        let payment = interpret_verify_response("PSK-1", StatusCode::OK, abandoned).unwrap();
        assert!(!payment.is_successful());
    }

    #[test]
    fn unknown_reference_is_a_failed_payment() {
        let body = br#"{"status":false,"message":"Transaction reference not found"}"#;
        for status in [StatusCode::NOT_FOUND, StatusCode::BAD_REQUEST] {
            let payment = interpret_verify_response("PSK-1", status, body).unwrap();
            assert!(!payment.is_successful());
            assert_eq!(payment.reference, "PSK-1");
        }
    }

    #[test]
    fn gateway_trouble_is_retryable() {
        let rejected = br#"{"status":false,"message":"Invalid key"}"#;
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::OK,
        ] {
            let err = interpret_verify_response("PSK-1", status, rejected).unwrap_err();
            assert!(matches!(err, EngineError::Gateway(_)), "{status}: {err:?}");
            assert!(err.is_retryable());
        }

        let err = interpret_verify_response("PSK-1", StatusCode::NOT_FOUND, b"<html>").unwrap_err();
        assert!(matches!(err, EngineError::Gateway(_)));
        let err = interpret_verify_response("PSK-1", StatusCode::OK, b"").unwrap_err();
        assert!(matches!(err, EngineError::Gateway(_)));
    }

    #[test]
    fn answer_for_another_reference_is_rejected() {
        let body = br#"{"status":true,"message":"ok","data":{"reference":"PSK-2","status":"success","amount":5000,"currency":"NGN"}}"#;
        let err = interpret_verify_response("PSK-1", StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, EngineError::Gateway(_)));
    }
}
