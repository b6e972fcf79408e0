use api_types::notification::{MarkedRead, NotificationListResponse, NotificationView};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use engine::{EngineError, Notification, User};
use uuid::Uuid;

use crate::{ServerError, ensure_same_user, server::ServerState};

fn notification_view(notification: Notification) -> NotificationView {
    NotificationView {
        id: notification.id,
        title: notification.title,
        message: notification.message,
        is_read: notification.is_read,
        created_at: notification.created_at,
    }
}

pub async fn list(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Result<Json<NotificationListResponse>, ServerError> {
    ensure_same_user(&user.id, Some(&user_id))?;
    let notifications = state.engine.notifications_for_user(&user.id).await?;
    let unread = notifications.iter().filter(|n| !n.is_read).count();
    Ok(Json(NotificationListResponse {
        notifications: notifications.into_iter().map(notification_view).collect(),
        unread,
    }))
}

pub async fn mark_read(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<NotificationView>, ServerError> {
    let notification = state.engine.notification(notification_id).await?;
    if notification.user_id != user.id {
        return Err(
            EngineError::Forbidden("notification belongs to another user".to_string()).into(),
        );
    }
    let notification = state.engine.mark_read(notification_id).await?;
    Ok(Json(notification_view(notification)))
}

pub async fn mark_all_read(
    Extension(user): Extension<User>,
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Result<Json<MarkedRead>, ServerError> {
    ensure_same_user(&user.id, Some(&user_id))?;
    let updated = state.engine.mark_all_read(&user.id).await?;
    Ok(Json(MarkedRead { updated }))
}
