use chrono::Utc;
use sea_orm::{QueryFilter, TransactionTrait, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    EngineError, Notification, ResultEngine, Transaction, TransactionKind, TransactionStatus,
    transactions,
};

use super::{Engine, display_amount, require_positive, with_tx};

impl Engine {
    /// Record a pending top-up the payment gateway will confirm later.
    ///
    /// The balance is untouched until the webhook settles the deposit. A
    /// `dep_<uuid>` reference is generated when none is given.
    pub async fn open_deposit(
        &self,
        user_id: &str,
        amount_minor: i64,
        reference: Option<&str>,
    ) -> ResultEngine<Transaction> {
        require_positive(amount_minor, "amount_minor")?;
        let reference = match reference.map(str::trim) {
            Some("") => {
                return Err(EngineError::InvalidInput(
                    "reference must not be empty".to_string(),
                ));
            }
            Some(reference) => reference.to_string(),
            None => format!("dep_{}", Uuid::new_v4().simple()),
        };

        let tx = with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            let tx = Transaction::new(
                user_id.to_string(),
                TransactionKind::Deposit,
                amount_minor,
                TransactionStatus::Pending,
                Utc::now(),
            )?
            .reference(Some(reference.clone()))
            .description("wallet top-up");
            self.insert_transaction(&db_tx, &tx).await?;
            Ok::<_, EngineError>(tx)
        })?;

        tracing::info!(user_id, amount_minor, reference = %reference, "deposit opened");
        Ok(tx)
    }

    /// The deposit still waiting for `reference`, if any.
    pub(crate) async fn pending_deposit(
        &self,
        reference: &str,
    ) -> ResultEngine<Option<Transaction>> {
        transactions::Entity::find()
            .filter(transactions::Column::Reference.eq(reference.to_string()))
            .filter(transactions::Column::Kind.eq(TransactionKind::Deposit.as_str()))
            .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
            .one(&self.database)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    /// Move `deposit` to Success and credit `amount_minor`.
    ///
    /// Returns `None` when another delivery already settled or failed it;
    /// in that case nothing is written.
    pub(crate) async fn settle_deposit(
        &self,
        deposit: &Transaction,
        amount_minor: i64,
    ) -> ResultEngine<Option<Transaction>> {
        let reference = deposit.reference.clone().unwrap_or_default();
        let guard = self.locks.acquire(&deposit.user_id).await;
        let settled = with_tx!(self, |db_tx| {
            let now = Utc::now();
            let result = transactions::Entity::update_many()
                .col_expr(
                    transactions::Column::Status,
                    Expr::value(TransactionStatus::Success.as_str()),
                )
                .col_expr(transactions::Column::UpdatedAt, Expr::value(now))
                .filter(transactions::Column::Id.eq(deposit.id.to_string()))
                .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                Ok::<_, EngineError>(None)
            } else {
                self.apply_credit(&db_tx, &deposit.user_id, amount_minor)
                    .await?;
                let notification = self
                    .record_notification(
                        &db_tx,
                        &deposit.user_id,
                        "Deposit Successful",
                        &format!(
                            "Your wallet was topped up with {}.",
                            display_amount(amount_minor)
                        ),
                    )
                    .await?;
                let mut settled = deposit.clone();
                settled.status = TransactionStatus::Success;
                settled.updated_at = now;
                Ok(Some((settled, notification)))
            }
        })?;
        drop(guard);

        let Some((settled, notification)) = settled else {
            tracing::info!(reference = %reference, "deposit already settled");
            return Ok(None);
        };
        tracing::info!(
            user_id = %settled.user_id,
            reference = %reference,
            amount_minor,
            "deposit settled"
        );
        self.dispatcher.push(&notification);
        Ok(Some(settled))
    }

    /// Move `deposit` to Failed. Returns `false` when it was no longer pending.
    pub(crate) async fn fail_deposit(&self, deposit: &Transaction) -> ResultEngine<bool> {
        let failed: Option<Notification> = with_tx!(self, |db_tx| {
            let result = transactions::Entity::update_many()
                .col_expr(
                    transactions::Column::Status,
                    Expr::value(TransactionStatus::Failed.as_str()),
                )
                .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(transactions::Column::Id.eq(deposit.id.to_string()))
                .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                Ok::<_, EngineError>(None)
            } else {
                let notification = self
                    .record_notification(
                        &db_tx,
                        &deposit.user_id,
                        "Deposit Failed",
                        &format!(
                            "Your top-up of {} could not be confirmed.",
                            display_amount(deposit.amount_minor)
                        ),
                    )
                    .await?;
                Ok(Some(notification))
            }
        })?;

        match failed {
            Some(notification) => {
                tracing::warn!(reference = ?deposit.reference, "deposit failed");
                self.dispatcher.push(&notification);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
