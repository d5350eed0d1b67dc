use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::entities::subscription;
use crate::error::AppError;

pub async fn create<C: ConnectionTrait>(
    db: &C,
    model: &subscription::Model,
) -> Result<(), AppError> {
    let active = subscription::ActiveModel {
        id: Set(model.id.clone()),
        user_id: Set(model.user_id.clone()),
        plan_id: Set(model.plan_id.clone()),
        status: Set(model.status.clone()),
        provider: Set(model.provider.clone()),
        provider_customer_id: Set(model.provider_customer_id.clone()),
        provider_subscription_id: Set(model.provider_subscription_id.clone()),
        current_period_end: Set(model.current_period_end),
        amount: Set(model.amount),
        currency: Set(model.currency.clone()),
        interval: Set(model.interval.clone()),
        created_at: Set(model.created_at),
        updated_at: Set(model.updated_at),
    };
    subscription::Entity::insert(active)
        .exec_without_returning(db)
        .await?;
    Ok(())
}

pub async fn by_user_id<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> Result<subscription::Model, AppError> {
    subscription::Entity::find()
        .filter(subscription::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("subscription for user {user_id}")))
}

pub async fn by_provider_subscription_id<C: ConnectionTrait>(
    db: &C,
    provider_subscription_id: &str,
) -> Result<subscription::Model, AppError> {
    subscription::Entity::find()
        .filter(subscription::Column::ProviderSubscriptionId.eq(provider_subscription_id))
        .one(db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "subscription with provider id {provider_subscription_id}"
            ))
        })
}

pub async fn update<C: ConnectionTrait>(
    db: &C,
    model: &subscription::Model,
) -> Result<(), AppError> {
    let result = subscription::Entity::update_many()
        .col_expr(subscription::Column::PlanId, Expr::value(model.plan_id.clone()))
        .col_expr(subscription::Column::Status, Expr::value(model.status.clone()))
        .col_expr(subscription::Column::Provider, Expr::value(model.provider.clone()))
        .col_expr(
            subscription::Column::ProviderCustomerId,
            Expr::value(model.provider_customer_id.clone()),
        )
        .col_expr(
            subscription::Column::ProviderSubscriptionId,
            Expr::value(model.provider_subscription_id.clone()),
        )
        .col_expr(
            subscription::Column::CurrentPeriodEnd,
            Expr::value(model.current_period_end),
        )
        .col_expr(subscription::Column::Amount, Expr::value(model.amount))
        .col_expr(subscription::Column::Currency, Expr::value(model.currency.clone()))
        .col_expr(subscription::Column::Interval, Expr::value(model.interval.clone()))
        .col_expr(subscription::Column::UpdatedAt, Expr::value(model.updated_at))
        .filter(subscription::Column::Id.eq(model.id.as_str()))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound(format!("subscription id {}", model.id)));
    }
    Ok(())
}
