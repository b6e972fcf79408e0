use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{EngineError, Notification, ResultEngine, notifications};

use super::{Engine, normalize_required_text};

impl Engine {
    /// Persist a notification for `user_id`, then try to push it live.
    ///
    /// The row is written first and is the source of truth; a missing or
    /// dead push channel does not make this fail.
    pub async fn publish(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
    ) -> ResultEngine<Notification> {
        let title = normalize_required_text(title, "title")?;
        self.require_user(&self.database, user_id).await?;
        let notification = self
            .record_notification(&self.database, user_id, &title, message)
            .await?;
        if !self.dispatcher.push(&notification) {
            tracing::debug!(user_id, notification_id = %notification.id, "no live channel, stored only");
        }
        Ok(notification)
    }

    /// Notifications of `user_id`, newest first.
    pub async fn notifications_for_user(&self, user_id: &str) -> ResultEngine<Vec<Notification>> {
        self.require_user(&self.database, user_id).await?;
        notifications::Entity::find()
            .filter(notifications::Column::UserId.eq(user_id.to_string()))
            .order_by_desc(notifications::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Notification::try_from)
            .collect()
    }

    pub async fn notification(&self, notification_id: Uuid) -> ResultEngine<Notification> {
        let model = notifications::Entity::find_by_id(notification_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotificationNotFound(notification_id.to_string()))?;
        Notification::try_from(model)
    }

    pub async fn mark_read(&self, notification_id: Uuid) -> ResultEngine<Notification> {
        let mut notification = self.notification(notification_id).await?;
        if !notification.is_read {
            let active = notifications::ActiveModel {
                id: ActiveValue::Set(notification_id.to_string()),
                is_read: ActiveValue::Set(true),
                ..Default::default()
            };
            active.update(&self.database).await?;
            notification.is_read = true;
        }
        Ok(notification)
    }

    /// Mark every unread notification of `user_id` as read.
    ///
    /// Returns how many rows changed.
    pub async fn mark_all_read(&self, user_id: &str) -> ResultEngine<u64> {
        self.require_user(&self.database, user_id).await?;
        let result = notifications::Entity::update_many()
            .col_expr(notifications::Column::IsRead, Expr::value(true))
            .filter(notifications::Column::UserId.eq(user_id.to_string()))
            .filter(notifications::Column::IsRead.eq(false))
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected)
    }

    /// Insert a notification row on `db`, usually the caller's DB transaction.
    pub(super) async fn record_notification(
        &self,
        db: &impl ConnectionTrait,
        user_id: &str,
        title: &str,
        message: &str,
    ) -> ResultEngine<Notification> {
        let notification = Notification::new(user_id, title, message, Utc::now());
        notifications::ActiveModel::from(&notification)
            .insert(db)
            .await?;
        Ok(notification)
    }
}
