use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};

use std::{sync::Arc, time::Duration};

use crate::{notifications, push, rides, transactions, users, webhook};
use engine::{Engine, WebhookReconciler};

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub reconciler: Arc<WebhookReconciler>,
}

impl ServerState {
    pub fn new(engine: Arc<Engine>, reconciler: WebhookReconciler) -> Self {
        Self {
            engine,
            reconciler: Arc::new(reconciler),
        }
    }
}

/// Resolve HTTP Basic credentials to an [`engine::User`] stored in the
/// request extensions.
async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(auth_header)) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user = state
        .engine
        .authenticate(auth_header.username(), auth_header.password())
        .await
        .map_err(|err| {
            tracing::error!("authentication failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub fn router(state: ServerState) -> Router {
    let authenticated = Router::new()
        .route("/users/me", get(users::me).delete(users::delete_me))
        .route("/rides", post(rides::book).get(rides::list))
        .route("/rides/{id}", get(rides::get))
        .route("/rides/{id}/verify", post(rides::verify))
        .route("/rides/{id}/complete", patch(rides::complete))
        .route("/rides/{id}/cancel", patch(rides::cancel))
        .route("/rides/{id}/rate", post(rides::rate))
        .route(
            "/transactions",
            post(transactions::create).get(transactions::list),
        )
        .route("/transactions/withdraw", post(transactions::withdraw))
        .route("/notifications/user/{id}", get(notifications::list))
        .route("/notifications/{id}/read", patch(notifications::mark_read))
        .route(
            "/notifications/user/{id}/read-all",
            patch(notifications::mark_all_read),
        )
        .route("/ws", get(push::connect))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .route("/users", post(users::register))
        .route("/webhooks/paystack", post(webhook::paystack))
        .merge(authenticated)
        .with_state(state)
}

/// Serve on `listener` and keep the push-channel liveness probe running
/// alongside.
pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
    probe_interval: Duration,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let probe = push::spawn_liveness_probe(state.engine.dispatcher().clone(), probe_interval);
    let result = axum::serve(listener, router(state)).await;
    probe.abort();
    result
}
