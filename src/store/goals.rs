use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{goal, goal_entry};
use crate::error::AppError;
use crate::model::{GoalSort, GoalStatus};

pub(crate) fn not_found(goal_id: &str) -> AppError {
    AppError::NotFound(format!("goal id {goal_id}"))
}

pub async fn create<C: ConnectionTrait>(db: &C, model: &goal::Model) -> Result<(), AppError> {
    let active = goal::ActiveModel {
        id: Set(model.id.clone()),
        user_id: Set(model.user_id.clone()),
        title: Set(model.title.clone()),
        description: Set(model.description.clone()),
        status: Set(model.status.clone()),
        current_step: Set(model.current_step),
        created_at: Set(model.created_at),
        updated_at: Set(model.updated_at),
    };
    goal::Entity::insert(active).exec_without_returning(db).await?;
    Ok(())
}

pub async fn by_id<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    goal_id: &str,
) -> Result<goal::Model, AppError> {
    goal::Entity::find()
        .filter(goal::Column::Id.eq(goal_id))
        .filter(goal::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| not_found(goal_id))
}

pub async fn list<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    sort: GoalSort,
) -> Result<Vec<goal::Model>, AppError> {
    let mut select = goal::Entity::find().filter(goal::Column::UserId.eq(user_id));
    match sort {
        GoalSort::Recent => select = select.order_by_desc(goal::Column::UpdatedAt),
        GoalSort::Progress => {
            select = select
                .order_by_desc(goal::Column::CurrentStep)
                .order_by_desc(goal::Column::UpdatedAt)
        }
        GoalSort::Title => {
            let lowered = SimpleExpr::from(Func::lower(Expr::col(goal::Column::Title)));
            select = select.order_by(lowered, Order::Asc)
        }
    }
    Ok(select.order_by_asc(goal::Column::Id).all(db).await?)
}

pub async fn count_active<C: ConnectionTrait>(db: &C, user_id: &str) -> Result<u64, AppError> {
    Ok(goal::Entity::find()
        .filter(goal::Column::UserId.eq(user_id))
        .filter(goal::Column::Status.eq(GoalStatus::Active.as_str()))
        .count(db)
        .await?)
}

/// Writes the title, description and `updated_at` of `model`, matched on
/// `(user_id, id)`. Status and `current_step` only move through
/// [`advance_step`] and [`retreat_step`].
pub async fn update<C: ConnectionTrait>(db: &C, model: &goal::Model) -> Result<(), AppError> {
    let result = goal::Entity::update_many()
        .col_expr(goal::Column::Title, Expr::value(model.title.clone()))
        .col_expr(goal::Column::Description, Expr::value(model.description.clone()))
        .col_expr(goal::Column::UpdatedAt, Expr::value(model.updated_at))
        .filter(goal::Column::Id.eq(model.id.as_str()))
        .filter(goal::Column::UserId.eq(model.user_id.as_str()))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(not_found(&model.id));
    }
    Ok(())
}

/// Moves `current_step` from `step - 1` to `step` on an active goal.
///
/// Returns `false` when no row matched, which means the goal is missing,
/// already completed, or no longer at `step - 1`.
pub async fn advance_step<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    goal_id: &str,
    step: i32,
    track_length: i32,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let status = if step == track_length {
        GoalStatus::Completed
    } else {
        GoalStatus::Active
    };
    let result = goal::Entity::update_many()
        .col_expr(goal::Column::CurrentStep, Expr::value(step))
        .col_expr(goal::Column::Status, Expr::value(status.as_str()))
        .col_expr(goal::Column::UpdatedAt, Expr::value(now))
        .filter(goal::Column::Id.eq(goal_id))
        .filter(goal::Column::UserId.eq(user_id))
        .filter(goal::Column::Status.eq(GoalStatus::Active.as_str()))
        .filter(goal::Column::CurrentStep.eq(step - 1))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Moves `current_step` from `step` back to `step - 1` and reactivates the goal.
pub async fn retreat_step<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    goal_id: &str,
    step: i32,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let result = goal::Entity::update_many()
        .col_expr(goal::Column::CurrentStep, Expr::value(step - 1))
        .col_expr(goal::Column::Status, Expr::value(GoalStatus::Active.as_str()))
        .col_expr(goal::Column::UpdatedAt, Expr::value(now))
        .filter(goal::Column::Id.eq(goal_id))
        .filter(goal::Column::UserId.eq(user_id))
        .filter(goal::Column::CurrentStep.eq(step))
        .filter(goal::Column::CurrentStep.gt(0))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Deletes the goal and its entries.
pub async fn delete<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    goal_id: &str,
) -> Result<(), AppError> {
    let owned = goal::Entity::find()
        .filter(goal::Column::Id.eq(goal_id))
        .filter(goal::Column::UserId.eq(user_id))
        .count(db)
        .await?;
    if owned == 0 {
        return Err(not_found(goal_id));
    }
    goal_entry::Entity::delete_many()
        .filter(goal_entry::Column::GoalId.eq(goal_id))
        .exec(db)
        .await?;
    let result = goal::Entity::delete_many()
        .filter(goal::Column::Id.eq(goal_id))
        .filter(goal::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(not_found(goal_id));
    }
    Ok(())
}
