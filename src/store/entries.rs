use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::warn;
use uuid::Uuid;

use super::finalize_transaction;
use crate::entities::goal_entry;
use crate::error::AppError;
use crate::model::TRACK_LENGTH;

fn not_found(goal_id: &str, step: i32) -> AppError {
    AppError::NotFound(format!("entry step {step} of goal id {goal_id}"))
}

/// Inserts entries `1..=count`, all incomplete, or none of them.
///
/// Runs in its own transaction; when `db` is already a transaction this
/// becomes a savepoint.
pub async fn create_entries<C>(db: &C, goal_id: &str, count: i32) -> Result<(), AppError>
where
    C: ConnectionTrait + TransactionTrait,
{
    if count <= 0 || count > TRACK_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "invalid entry count: {count} (expected 1..={TRACK_LENGTH})"
        )));
    }

    let txn = db.begin().await?;
    let result: Result<(), AppError> = async {
        let now = Utc::now();
        for step in 1..=count {
            let active = goal_entry::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                goal_id: Set(goal_id.to_string()),
                step: Set(step),
                completed: Set(false),
                note: Set(String::new()),
                completed_at: Set(None),
                created_at: Set(now),
            };
            goal_entry::Entity::insert(active)
                .exec_without_returning(&txn)
                .await
                .inspect_err(|err| warn!(goal_id, step, error = %err, "entry insert failed"))?;
        }
        Ok(())
    }
    .await;

    finalize_transaction(txn, result).await
}

pub async fn entries<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
) -> Result<Vec<goal_entry::Model>, AppError> {
    Ok(goal_entry::Entity::find()
        .filter(goal_entry::Column::GoalId.eq(goal_id))
        .order_by_asc(goal_entry::Column::Step)
        .all(db)
        .await?)
}

pub async fn entry<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
    step: i32,
) -> Result<goal_entry::Model, AppError> {
    goal_entry::Entity::find()
        .filter(goal_entry::Column::GoalId.eq(goal_id))
        .filter(goal_entry::Column::Step.eq(step))
        .one(db)
        .await?
        .ok_or_else(|| not_found(goal_id, step))
}

pub async fn count_completed<C: ConnectionTrait>(db: &C, goal_id: &str) -> Result<u64, AppError> {
    Ok(goal_entry::Entity::find()
        .filter(goal_entry::Column::GoalId.eq(goal_id))
        .filter(goal_entry::Column::Completed.eq(true))
        .count(db)
        .await?)
}

pub async fn complete_entry<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
    step: i32,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let result = goal_entry::Entity::update_many()
        .col_expr(goal_entry::Column::Completed, Expr::value(true))
        .col_expr(goal_entry::Column::CompletedAt, Expr::value(Some(now)))
        .filter(goal_entry::Column::GoalId.eq(goal_id))
        .filter(goal_entry::Column::Step.eq(step))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(not_found(goal_id, step));
    }
    Ok(())
}

/// Overwrites the note and completion time; the completed flag is untouched.
pub async fn update_entry<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
    step: i32,
    note: &str,
    completed_at: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    let result = goal_entry::Entity::update_many()
        .col_expr(goal_entry::Column::Note, Expr::value(note))
        .col_expr(goal_entry::Column::CompletedAt, Expr::value(completed_at))
        .filter(goal_entry::Column::GoalId.eq(goal_id))
        .filter(goal_entry::Column::Step.eq(step))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(not_found(goal_id, step));
    }
    Ok(())
}

pub async fn uncomplete_entry<C: ConnectionTrait>(
    db: &C,
    goal_id: &str,
    step: i32,
) -> Result<(), AppError> {
    let result = goal_entry::Entity::update_many()
        .col_expr(goal_entry::Column::Completed, Expr::value(false))
        .col_expr(goal_entry::Column::Note, Expr::value(""))
        .col_expr(
            goal_entry::Column::CompletedAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(goal_entry::Column::GoalId.eq(goal_id))
        .filter(goal_entry::Column::Step.eq(step))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(not_found(goal_id, step));
    }
    Ok(())
}
