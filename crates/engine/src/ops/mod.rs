use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, QueryFilter, prelude::*};

use crate::{Dispatcher, EngineError, ResultEngine, User, UserLocks, users};

mod accounts;
mod deposits;
mod notifications;
mod rides;
mod wallet;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    locks: UserLocks,
    dispatcher: Arc<Dispatcher>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The live-push registry shared with the connection handlers.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    async fn require_user(&self, db: &impl ConnectionTrait, user_id: &str) -> ResultEngine<User> {
        let model = users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))?;
        User::try_from(model)
    }

    async fn require_username_free(
        &self,
        db_tx: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<()> {
        let exists = users::Entity::find()
            .filter(users::Column::Username.eq(username.to_string()))
            .one(db_tx)
            .await?
            .is_some();
        if exists {
            return Err(EngineError::ExistingKey(username.to_string()));
        }
        Ok(())
    }
}

fn normalize_required_text(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Render minor units as a decimal amount for notification texts.
fn display_amount(amount_minor: i64) -> String {
    format!("{}.{:02}", amount_minor / 100, (amount_minor % 100).abs())
}

fn require_positive(amount_minor: i64, label: &str) -> ResultEngine<()> {
    if amount_minor <= 0 {
        return Err(EngineError::InvalidAmount(format!("{label} must be > 0")));
    }
    Ok(())
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Share an existing push registry instead of creating a new one.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> EngineBuilder {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            locks: UserLocks::new(),
            dispatcher: self.dispatcher.unwrap_or_default(),
        })
    }
}
