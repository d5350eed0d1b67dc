//! Persistence for goals, their entries and subscriptions.
//!
//! Functions take any [`ConnectionTrait`] so the engine can run several of
//! them inside one transaction. Nothing here enforces the step invariant;
//! that belongs to [`crate::app::App`].

use sea_orm::DatabaseTransaction;
use tracing::error;

use crate::error::AppError;

pub mod entries;
pub mod goals;
pub mod subscriptions;

pub(crate) async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                error!(error = %rollback_err, cause = %err, "rollback failed");
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}
