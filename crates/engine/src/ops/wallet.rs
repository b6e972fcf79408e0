use chrono::Utc;
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, SqlErr, TransactionTrait, prelude::*,
    sea_query::Expr,
};

use crate::{
    EngineError, ResultEngine, Transaction, TransactionKind, TransactionStatus, transactions,
    users,
};

use super::{Engine, display_amount, require_positive, with_tx};

impl Engine {
    /// Current wallet balance of `user_id`, in minor units.
    pub async fn balance(&self, user_id: &str) -> ResultEngine<i64> {
        let user = self.require_user(&self.database, user_id).await?;
        Ok(user.wallet_balance_minor)
    }

    /// Credit `user_id` immediately and record a successful deposit.
    ///
    /// `reference` must be unused; a reused reference fails with
    /// [`EngineError::DuplicateReference`] and changes nothing.
    pub async fn credit(
        &self,
        user_id: &str,
        amount_minor: i64,
        reference: Option<&str>,
    ) -> ResultEngine<Transaction> {
        require_positive(amount_minor, "amount_minor")?;
        let guard = self.locks.acquire(user_id).await;
        let (tx, notification) = with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let tx = Transaction::new(
                user_id.to_string(),
                TransactionKind::Deposit,
                amount_minor,
                TransactionStatus::Success,
                Utc::now(),
            )?
            .reference(reference.map(ToString::to_string))
            .description("wallet credit");
            self.insert_transaction(&db_tx, &tx).await?;
            self.apply_credit(&db_tx, user_id, amount_minor).await?;
            let notification = self
                .record_notification(
                    &db_tx,
                    user_id,
                    "Deposit Successful",
                    &format!(
                        "Your wallet was credited with {}.",
                        display_amount(amount_minor)
                    ),
                )
                .await?;
            Ok::<_, EngineError>((tx, notification))
        })?;
        drop(guard);

        tracing::info!(user_id, amount_minor, transaction_id = %tx.id, "wallet credited");
        self.dispatcher.push(&notification);
        Ok(tx)
    }

    /// Debit `user_id` and record a successful `Payment` or `Withdrawal`.
    ///
    /// Fails with [`EngineError::InsufficientFunds`] without any mutation if
    /// the balance is below `amount_minor`.
    pub async fn debit(
        &self,
        user_id: &str,
        amount_minor: i64,
        kind: TransactionKind,
    ) -> ResultEngine<Transaction> {
        require_positive(amount_minor, "amount_minor")?;
        let (title, description) = match kind {
            TransactionKind::Payment => ("Payment Successful", "wallet payment"),
            TransactionKind::Withdrawal => ("Withdrawal Successful", "wallet withdrawal"),
            TransactionKind::Deposit => {
                return Err(EngineError::InvalidInput(
                    "a debit must be a payment or a withdrawal".to_string(),
                ));
            }
        };

        let guard = self.locks.acquire(user_id).await;
        let (tx, notification) = with_tx!(self, |db_tx| {
            self.apply_debit(&db_tx, user_id, amount_minor).await?;
            let tx = Transaction::new(
                user_id.to_string(),
                kind,
                amount_minor,
                TransactionStatus::Success,
                Utc::now(),
            )?
            .description(description);
            self.insert_transaction(&db_tx, &tx).await?;
            let notification = self
                .record_notification(
                    &db_tx,
                    user_id,
                    title,
                    &format!("{} was debited from your wallet.", display_amount(amount_minor)),
                )
                .await?;
            Ok::<_, EngineError>((tx, notification))
        })?;
        drop(guard);

        tracing::info!(user_id, amount_minor, kind = kind.as_str(), transaction_id = %tx.id, "wallet debited");
        self.dispatcher.push(&notification);
        Ok(tx)
    }

    /// Shorthand for a withdrawal debit.
    pub async fn withdraw(&self, user_id: &str, amount_minor: i64) -> ResultEngine<Transaction> {
        self.debit(user_id, amount_minor, TransactionKind::Withdrawal)
            .await
    }

    /// The ledger of `user_id`, newest first.
    pub async fn transactions_for_user(&self, user_id: &str) -> ResultEngine<Vec<Transaction>> {
        self.require_user(&self.database, user_id).await?;
        transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id.to_string()))
            .order_by_desc(transactions::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    pub async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> ResultEngine<Option<Transaction>> {
        transactions::Entity::find()
            .filter(transactions::Column::Reference.eq(reference.to_string()))
            .one(&self.database)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    /// Decrease the balance only if it covers `amount_minor`.
    ///
    /// The check and the write are one conditional `UPDATE`, so two debits can
    /// never both pass against a stale balance.
    pub(super) async fn apply_debit(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        amount_minor: i64,
    ) -> ResultEngine<()> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::WalletBalanceMinor,
                Expr::col(users::Column::WalletBalanceMinor).sub(amount_minor),
            )
            .filter(users::Column::Id.eq(user_id.to_string()))
            .filter(users::Column::WalletBalanceMinor.gte(amount_minor))
            .exec(db_tx)
            .await?;
        if result.rows_affected == 0 {
            // Either the user is gone or the balance is short.
            let user = self.require_user(db_tx, user_id).await?;
            return Err(EngineError::InsufficientFunds(format!(
                "balance {} does not cover {}",
                display_amount(user.wallet_balance_minor),
                display_amount(amount_minor)
            )));
        }
        Ok(())
    }

    pub(super) async fn apply_credit(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        amount_minor: i64,
    ) -> ResultEngine<()> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::WalletBalanceMinor,
                Expr::col(users::Column::WalletBalanceMinor).add(amount_minor),
            )
            .filter(users::Column::Id.eq(user_id.to_string()))
            .exec(db_tx)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    /// Append `tx` to the ledger, enforcing reference uniqueness.
    pub(super) async fn insert_transaction(
        &self,
        db_tx: &DatabaseTransaction,
        tx: &Transaction,
    ) -> ResultEngine<()> {
        if let Some(reference) = tx.reference.as_deref() {
            let existing = transactions::Entity::find()
                .filter(transactions::Column::Reference.eq(reference.to_string()))
                .one(db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::DuplicateReference(reference.to_string()));
            }
        }

        // The unique index is the real guard when two inserts race.
        match transactions::ActiveModel::from(tx).insert(db_tx).await {
            Ok(_) => Ok(()),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(EngineError::DuplicateReference(
                    tx.reference.clone().unwrap_or_default(),
                )),
                _ => Err(err.into()),
            },
        }
    }
}
