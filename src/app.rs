use chrono::{DateTime, Duration, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{goal, goal_entry, subscription};
use crate::error::AppError;
use crate::limits::{self, GoalLimit};
use crate::model::{
    BillingInterval, Feature, GoalChanges, GoalInput, GoalSort, GoalStatus, PlanChange, PlanId,
    SubscriptionStatus, TRACK_LENGTH,
};
use crate::store::{entries, finalize_transaction, goals, subscriptions};
use crate::util::format_goal_markdown;

/// The goal progress engine.
///
/// Owns the step invariant: for a goal at `current_step = k`, entries
/// `1..=k` are completed and the rest are not, and the goal is completed
/// exactly when `k` equals the track length. Every call is scoped by the
/// acting user's id.
#[derive(Clone)]
pub struct App {
    db: DatabaseConnection,
    track_length: i32,
}

pub struct GoalDetail {
    pub goal: goal::Model,
    pub entries: Vec<goal_entry::Model>,
}

impl App {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_track_length(db, TRACK_LENGTH)
    }

    pub fn with_track_length(db: DatabaseConnection, track_length: i32) -> Self {
        Self { db, track_length }
    }

    pub fn track_length(&self) -> i32 {
        self.track_length
    }

    pub async fn create(&self, user_id: &str, input: GoalInput) -> Result<goal::Model, AppError> {
        ensure_non_empty("goal title", &input.title)?;
        let subscription = subscriptions::by_user_id(&self.db, user_id).await?;
        let limit = limits::goal_limit(&subscription);

        let txn = self.db.begin().await?;
        let result: Result<goal::Model, AppError> = async {
            if let GoalLimit::Limited(max) = limit {
                let active = goals::count_active(&txn, user_id).await?;
                if !limit.allows(active) {
                    warn!(user_id, active, limit = max, "goal limit reached");
                    return Err(AppError::GoalLimitReached { limit: max });
                }
            }

            let now = Utc::now();
            let model = goal::Model {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                title: input.title.trim().to_string(),
                description: input.description,
                status: GoalStatus::Active.as_str().to_string(),
                current_step: 0,
                created_at: now,
                updated_at: now,
            };
            goals::create(&txn, &model).await?;
            entries::create_entries(&txn, &model.id, self.track_length).await?;
            Ok(model)
        }
        .await;

        let model = finalize_transaction(txn, result).await?;
        info!(user_id, goal_id = %model.id, "goal created");
        Ok(model)
    }

    pub async fn by_id(&self, user_id: &str, goal_id: &str) -> Result<goal::Model, AppError> {
        goals::by_id(&self.db, user_id, goal_id).await
    }

    pub async fn goals(&self, user_id: &str, sort: GoalSort) -> Result<Vec<goal::Model>, AppError> {
        goals::list(&self.db, user_id, sort).await
    }

    pub async fn goal_with_entries(
        &self,
        user_id: &str,
        goal_id: &str,
    ) -> Result<GoalDetail, AppError> {
        let goal = goals::by_id(&self.db, user_id, goal_id).await?;
        let entries = entries::entries(&self.db, &goal.id).await?;
        Ok(GoalDetail { goal, entries })
    }

    /// Number of active goals, the figure the plan limit is checked against.
    pub async fn count_user_goals(&self, user_id: &str) -> Result<u64, AppError> {
        goals::count_active(&self.db, user_id).await
    }

    /// Title and description only; status and progress move through entries.
    pub async fn update(
        &self,
        user_id: &str,
        goal_id: &str,
        changes: GoalChanges,
    ) -> Result<goal::Model, AppError> {
        if let Some(title) = changes.title.as_deref() {
            ensure_non_empty("goal title", title)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<goal::Model, AppError> = async {
            let mut goal = goals::by_id(&txn, user_id, goal_id).await?;
            if let Some(title) = changes.title {
                goal.title = title.trim().to_string();
            }
            if let Some(description) = changes.description {
                goal.description = description;
            }
            goal.updated_at = Utc::now();
            goals::update(&txn, &goal).await?;
            Ok(goal)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn delete(&self, user_id: &str, goal_id: &str) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result = goals::delete(&txn, user_id, goal_id).await;
        finalize_transaction(txn, result).await?;
        info!(user_id, goal_id, "goal deleted");
        Ok(())
    }

    /// Completes `step`, which must be exactly `current_step + 1`.
    ///
    /// The goal row is advanced with a conditional update before the entry is
    /// touched, so of several concurrent calls for the same step at most one
    /// succeeds. A step that cannot be next, including one off the track, is
    /// classified against the stored goal: `NotFound`, then
    /// `GoalAlreadyCompleted`, then `InvalidStep`.
    pub async fn complete_entry(
        &self,
        user_id: &str,
        goal_id: &str,
        step: i32,
    ) -> Result<goal::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<goal::Model, AppError> = async {
            let now = Utc::now();
            let advanced =
                goals::advance_step(&txn, user_id, goal_id, step, self.track_length, now).await?;
            if !advanced {
                let goal = goals::by_id(&txn, user_id, goal_id).await?;
                if goal.status == GoalStatus::Completed.as_str() {
                    return Err(AppError::GoalAlreadyCompleted);
                }
                return Err(AppError::InvalidStep {
                    expected: goal.current_step + 1,
                    requested: step,
                });
            }
            entries::complete_entry(&txn, goal_id, step, now).await?;
            goals::by_id(&txn, user_id, goal_id).await
        }
        .await;

        match finalize_transaction(txn, result).await {
            Ok(goal) => {
                info!(user_id, goal_id, step, status = %goal.status, "entry completed");
                Ok(goal)
            }
            Err(err) => {
                if err.is_user_error() {
                    warn!(user_id, goal_id, step, error = %err, "entry completion rejected");
                }
                Err(err)
            }
        }
    }

    /// Undoes the last completed step. Only `step == current_step` is accepted.
    pub async fn uncomplete_entry(
        &self,
        user_id: &str,
        goal_id: &str,
        step: i32,
    ) -> Result<goal::Model, AppError> {
        self.ensure_step(step)?;
        let txn = self.db.begin().await?;
        let result: Result<goal::Model, AppError> = async {
            let retreated = goals::retreat_step(&txn, user_id, goal_id, step, Utc::now()).await?;
            if !retreated {
                let goal = goals::by_id(&txn, user_id, goal_id).await?;
                if goal.current_step == 0 {
                    return Err(AppError::InvalidInput("no completed step to undo".to_string()));
                }
                return Err(AppError::NotLastCompletedStep {
                    current: goal.current_step,
                    requested: step,
                });
            }
            entries::uncomplete_entry(&txn, goal_id, step).await?;
            goals::by_id(&txn, user_id, goal_id).await
        }
        .await;

        match finalize_transaction(txn, result).await {
            Ok(goal) => {
                info!(user_id, goal_id, step, "entry uncompleted");
                Ok(goal)
            }
            Err(err) => {
                if err.is_user_error() {
                    warn!(user_id, goal_id, step, error = %err, "entry undo rejected");
                }
                Err(err)
            }
        }
    }

    /// Annotates an already completed entry.
    pub async fn update_entry(
        &self,
        user_id: &str,
        goal_id: &str,
        step: i32,
        note: &str,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<goal_entry::Model, AppError> {
        self.ensure_step(step)?;
        let txn = self.db.begin().await?;
        let result: Result<goal_entry::Model, AppError> = async {
            goals::by_id(&txn, user_id, goal_id).await?;
            let entry = entries::entry(&txn, goal_id, step).await?;
            if !entry.completed {
                return Err(AppError::EntryNotCompleted { step });
            }
            entries::update_entry(&txn, goal_id, step, note, completed_at).await?;
            entries::entry(&txn, goal_id, step).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn entry_by_goal_and_step(
        &self,
        user_id: &str,
        goal_id: &str,
        step: i32,
    ) -> Result<goal_entry::Model, AppError> {
        self.ensure_step(step)?;
        goals::by_id(&self.db, user_id, goal_id).await?;
        entries::entry(&self.db, goal_id, step).await
    }

    /// Markdown rendering of a goal and its entries; requires the export feature.
    pub async fn export_markdown(&self, user_id: &str, goal_id: &str) -> Result<String, AppError> {
        let subscription = subscriptions::by_user_id(&self.db, user_id).await?;
        if !limits::has_feature(&subscription, Feature::Export) {
            return Err(AppError::FeatureUnavailable(Feature::Export));
        }
        let detail = self.goal_with_entries(user_id, goal_id).await?;
        Ok(format_goal_markdown(&detail.goal, &detail.entries))
    }
}

impl App {
    pub async fn subscription(&self, user_id: &str) -> Result<subscription::Model, AppError> {
        subscriptions::by_user_id(&self.db, user_id).await
    }

    pub async fn subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<subscription::Model, AppError> {
        subscriptions::by_provider_subscription_id(&self.db, provider_subscription_id).await
    }

    pub async fn create_free_subscription(
        &self,
        user_id: &str,
    ) -> Result<subscription::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<subscription::Model, AppError> = async {
            match subscriptions::by_user_id(&txn, user_id).await {
                Ok(_) => {
                    return Err(AppError::InvalidInput(format!(
                        "user {user_id} already has a subscription"
                    )))
                }
                Err(AppError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
            let now = Utc::now();
            let model = subscription::Model {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                plan_id: PlanId::Free.as_str().to_string(),
                status: SubscriptionStatus::Active.as_str().to_string(),
                provider: String::new(),
                provider_customer_id: None,
                provider_subscription_id: None,
                current_period_end: None,
                amount: None,
                currency: String::new(),
                interval: None,
                created_at: now,
                updated_at: now,
            };
            subscriptions::create(&txn, &model).await?;
            Ok(model)
        }
        .await;

        let model = finalize_transaction(txn, result).await?;
        info!(user_id, "free subscription created");
        Ok(model)
    }

    /// Records a plan change confirmed by a payment provider.
    pub async fn change_plan(
        &self,
        user_id: &str,
        change: PlanChange,
    ) -> Result<subscription::Model, AppError> {
        let mut sub = subscriptions::by_user_id(&self.db, user_id).await?;
        let now = Utc::now();
        let period = match change.interval {
            Some(BillingInterval::Yearly) => Duration::days(365),
            _ => Duration::days(30),
        };
        sub.plan_id = change.plan.as_str().to_string();
        sub.status = SubscriptionStatus::Active.as_str().to_string();
        sub.provider = change.provider.as_str().to_string();
        sub.provider_subscription_id = change.provider_subscription_id;
        sub.interval = change.interval.map(|interval| interval.as_str().to_string());
        sub.amount = change.amount;
        sub.currency = change.currency.to_lowercase();
        sub.current_period_end = Some(now + period);
        sub.updated_at = now;
        subscriptions::update(&self.db, &sub).await?;
        info!(user_id, plan = %sub.plan_id, "subscription plan changed");
        Ok(sub)
    }

    pub async fn cancel_subscription(
        &self,
        user_id: &str,
    ) -> Result<subscription::Model, AppError> {
        let mut sub = subscriptions::by_user_id(&self.db, user_id).await?;
        sub.status = SubscriptionStatus::Cancelled.as_str().to_string();
        sub.updated_at = Utc::now();
        subscriptions::update(&self.db, &sub).await?;
        info!(user_id, plan = %sub.plan_id, "subscription cancelled");
        Ok(sub)
    }

    pub async fn downgrade_to_free(&self, user_id: &str) -> Result<subscription::Model, AppError> {
        let mut sub = subscriptions::by_user_id(&self.db, user_id).await?;
        sub.plan_id = PlanId::Free.as_str().to_string();
        sub.status = SubscriptionStatus::Active.as_str().to_string();
        sub.provider_subscription_id = None;
        sub.current_period_end = None;
        sub.amount = None;
        sub.currency = String::new();
        sub.interval = None;
        sub.updated_at = Utc::now();
        subscriptions::update(&self.db, &sub).await?;
        info!(user_id, "subscription downgraded to free");
        Ok(sub)
    }
}

impl App {
    fn ensure_step(&self, step: i32) -> Result<(), AppError> {
        if !(1..=self.track_length).contains(&step) {
            return Err(AppError::InvalidInput(format!(
                "step must be between 1 and {}, got {step}",
                self.track_length
            )));
        }
        Ok(())
    }
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::Provider;
    use crate::store::entries::count_completed;
    use tempfile::TempDir;

    const USER: &str = "user-1";
    const OTHER_USER: &str = "user-2";

    async fn setup_db() -> (TempDir, DatabaseConnection) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = db::resolve_db_path(dir.path());
        db::ensure_parent_dir(&db_path).expect("ensure parent");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        (dir, db)
    }

    async fn setup_app() -> (TempDir, App) {
        let (dir, db) = setup_db().await;
        let app = App::new(db);
        app.create_free_subscription(USER)
            .await
            .expect("free subscription");
        (dir, app)
    }

    async fn setup_short_track(track_length: i32) -> (TempDir, App) {
        let (dir, db) = setup_db().await;
        let app = App::with_track_length(db, track_length);
        app.create_free_subscription(USER)
            .await
            .expect("free subscription");
        (dir, app)
    }

    async fn create_goal(app: &App, user_id: &str, title: &str) -> goal::Model {
        app.create(
            user_id,
            GoalInput {
                title: title.to_string(),
                description: String::new(),
            },
        )
        .await
        .expect("create goal")
    }

    async fn complete_through(app: &App, goal_id: &str, last: i32) -> goal::Model {
        let mut goal = app.by_id(USER, goal_id).await.expect("goal");
        for step in goal.current_step + 1..=last {
            goal = app
                .complete_entry(USER, goal_id, step)
                .await
                .expect("complete step");
        }
        goal
    }

    async fn upgrade(app: &App, user_id: &str, plan: PlanId) {
        app.change_plan(
            user_id,
            PlanChange {
                plan,
                provider: Provider::Stripe,
                provider_subscription_id: Some(format!("sub_{user_id}")),
                interval: Some(BillingInterval::Monthly),
                amount: Some(900),
                currency: "USD".to_string(),
            },
        )
        .await
        .expect("change plan");
    }

    #[tokio::test]
    async fn create_builds_full_track_of_incomplete_entries() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Read 100 books").await;
        assert_eq!(goal.status, GoalStatus::Active.as_str());
        assert_eq!(goal.current_step, 0);

        let detail = app
            .goal_with_entries(USER, &goal.id)
            .await
            .expect("goal with entries");
        assert_eq!(detail.entries.len(), TRACK_LENGTH as usize);
        for (idx, entry) in detail.entries.iter().enumerate() {
            assert_eq!(entry.step, idx as i32 + 1);
            assert!(!entry.completed);
            assert!(entry.completed_at.is_none());
        }
    }

    #[tokio::test]
    async fn create_rejects_empty_title() {
        let (_dir, app) = setup_app().await;
        let err = app
            .create(
                USER,
                GoalInput {
                    title: "   ".to_string(),
                    description: "desc".to_string(),
                },
            )
            .await
            .unwrap_err();
        match err {
            AppError::InvalidInput(message) => {
                assert!(message.contains("goal title cannot be empty"));
            }
            _ => panic!("unexpected error type"),
        }
        assert_eq!(app.count_user_goals(USER).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn create_without_subscription_is_not_found() {
        let (_dir, db) = setup_db().await;
        let app = App::new(db);
        let err = app
            .create(
                USER,
                GoalInput {
                    title: "Goal".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_entry_creation_leaves_no_goal() {
        let (_dir, app) = setup_short_track(TRACK_LENGTH + 1).await;
        let err = app
            .create(
                USER,
                GoalInput {
                    title: "Too long".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let goals = app.goals(USER, GoalSort::Recent).await.expect("goals");
        assert!(goals.is_empty());
    }

    #[tokio::test]
    async fn free_plan_limit_blocks_fourth_goal() {
        let (_dir, app) = setup_app().await;
        for idx in 0..3 {
            create_goal(&app, USER, &format!("Goal {idx}")).await;
        }
        let err = app
            .create(
                USER,
                GoalInput {
                    title: "Goal 4".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GoalLimitReached { limit: 3 }));
        assert_eq!(app.count_user_goals(USER).await.expect("count"), 3);
    }

    #[tokio::test]
    async fn paid_plans_raise_or_remove_the_limit() {
        let (_dir, app) = setup_app().await;
        upgrade(&app, USER, PlanId::Pro).await;
        for idx in 0..4 {
            create_goal(&app, USER, &format!("Goal {idx}")).await;
        }

        app.create_free_subscription(OTHER_USER)
            .await
            .expect("free subscription");
        upgrade(&app, OTHER_USER, PlanId::Enterprise).await;
        for idx in 0..5 {
            create_goal(&app, OTHER_USER, &format!("Goal {idx}")).await;
        }
        assert_eq!(app.count_user_goals(OTHER_USER).await.expect("count"), 5);
    }

    #[tokio::test]
    async fn cancelled_paid_plan_falls_back_to_free_limit() {
        let (_dir, app) = setup_app().await;
        upgrade(&app, USER, PlanId::Pro).await;
        for idx in 0..3 {
            create_goal(&app, USER, &format!("Goal {idx}")).await;
        }
        app.cancel_subscription(USER).await.expect("cancel");
        let err = app
            .create(
                USER,
                GoalInput {
                    title: "One more".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GoalLimitReached { limit: 3 }));
    }

    #[tokio::test]
    async fn completed_goals_free_up_the_limit() {
        let (_dir, app) = setup_short_track(2).await;
        let first = create_goal(&app, USER, "First").await;
        create_goal(&app, USER, "Second").await;
        create_goal(&app, USER, "Third").await;

        let done = complete_through(&app, &first.id, 2).await;
        assert_eq!(done.status, GoalStatus::Completed.as_str());
        assert_eq!(app.count_user_goals(USER).await.expect("count"), 2);
        create_goal(&app, USER, "Fourth").await;
    }

    #[tokio::test]
    async fn completing_first_step_records_timestamp() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        let before = Utc::now();

        let updated = app
            .complete_entry(USER, &goal.id, 1)
            .await
            .expect("complete step 1");
        assert_eq!(updated.current_step, 1);
        assert_eq!(updated.status, GoalStatus::Active.as_str());

        let entry = app
            .entry_by_goal_and_step(USER, &goal.id, 1)
            .await
            .expect("entry");
        assert!(entry.completed);
        let completed_at = entry.completed_at.expect("completed_at");
        assert!(completed_at >= before - Duration::seconds(1));
    }

    #[tokio::test]
    async fn skipping_ahead_is_invalid_and_changes_nothing() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        complete_through(&app, &goal.id, 5).await;

        let err = app.complete_entry(USER, &goal.id, 7).await.unwrap_err();
        match err {
            AppError::InvalidStep {
                expected,
                requested,
            } => {
                assert_eq!(expected, 6);
                assert_eq!(requested, 7);
            }
            other => panic!("unexpected error: {other}"),
        }

        let after = app.by_id(USER, &goal.id).await.expect("goal");
        assert_eq!(after.current_step, 5);
        let entry = app
            .entry_by_goal_and_step(USER, &goal.id, 7)
            .await
            .expect("entry");
        assert!(!entry.completed);
        assert_eq!(count_completed(&app.db, &goal.id).await.expect("count"), 5);
    }

    #[tokio::test]
    async fn repeating_a_step_is_invalid() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        complete_through(&app, &goal.id, 2).await;

        for step in [1, 2] {
            let err = app.complete_entry(USER, &goal.id, step).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidStep { .. }), "step {step}");
        }
        assert_eq!(
            app.by_id(USER, &goal.id).await.expect("goal").current_step,
            2
        );
    }

    #[tokio::test]
    async fn finishing_the_track_completes_and_undo_reopens() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        let done = complete_through(&app, &goal.id, TRACK_LENGTH).await;
        assert_eq!(done.current_step, TRACK_LENGTH);
        assert_eq!(done.status, GoalStatus::Completed.as_str());

        for step in [1, TRACK_LENGTH] {
            let err = app.complete_entry(USER, &goal.id, step).await.unwrap_err();
            assert!(matches!(err, AppError::GoalAlreadyCompleted), "step {step}");
        }

        let reopened = app
            .uncomplete_entry(USER, &goal.id, TRACK_LENGTH)
            .await
            .expect("uncomplete last");
        assert_eq!(reopened.current_step, TRACK_LENGTH - 1);
        assert_eq!(reopened.status, GoalStatus::Active.as_str());
        let entry = app
            .entry_by_goal_and_step(USER, &goal.id, TRACK_LENGTH)
            .await
            .expect("entry");
        assert!(!entry.completed);
    }

    #[tokio::test]
    async fn uncompleting_other_than_last_step_is_rejected() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        complete_through(&app, &goal.id, 3).await;

        for step in [1, 2, 4] {
            let err = app
                .uncomplete_entry(USER, &goal.id, step)
                .await
                .unwrap_err();
            match err {
                AppError::NotLastCompletedStep { current, requested } => {
                    assert_eq!(current, 3);
                    assert_eq!(requested, step);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(
            app.by_id(USER, &goal.id).await.expect("goal").current_step,
            3
        );
        assert_eq!(count_completed(&app.db, &goal.id).await.expect("count"), 3);
    }

    #[tokio::test]
    async fn completing_off_track_steps_is_an_invalid_step() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        complete_through(&app, &goal.id, 5).await;

        for step in [0, -3, TRACK_LENGTH + 1] {
            match app.complete_entry(USER, &goal.id, step).await.unwrap_err() {
                AppError::InvalidStep {
                    expected,
                    requested,
                } => {
                    assert_eq!(expected, 6);
                    assert_eq!(requested, step);
                }
                other => panic!("unexpected error for step {step}: {other}"),
            }
            assert!(matches!(
                app.complete_entry(OTHER_USER, &goal.id, step)
                    .await
                    .unwrap_err(),
                AppError::NotFound(_)
            ));
        }
        assert_eq!(
            app.by_id(USER, &goal.id).await.expect("goal").current_step,
            5
        );
        assert_eq!(count_completed(&app.db, &goal.id).await.expect("count"), 5);
    }

    #[tokio::test]
    async fn completing_off_track_steps_on_a_finished_goal_reports_completion() {
        let (_dir, app) = setup_short_track(2).await;
        let goal = create_goal(&app, USER, "Short").await;
        complete_through(&app, &goal.id, 2).await;

        for step in [0, 3, TRACK_LENGTH + 1] {
            assert!(
                matches!(
                    app.complete_entry(USER, &goal.id, step).await.unwrap_err(),
                    AppError::GoalAlreadyCompleted
                ),
                "step {step}"
            );
        }
    }

    #[tokio::test]
    async fn undo_and_lookup_reject_steps_outside_the_track() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        for step in [0, -3, TRACK_LENGTH + 1] {
            assert!(matches!(
                app.uncomplete_entry(USER, &goal.id, step).await.unwrap_err(),
                AppError::InvalidInput(_)
            ));
            assert!(matches!(
                app.entry_by_goal_and_step(USER, &goal.id, step)
                    .await
                    .unwrap_err(),
                AppError::InvalidInput(_)
            ));
        }
        assert_eq!(
            app.by_id(USER, &goal.id).await.expect("goal").current_step,
            0
        );
    }

    #[tokio::test]
    async fn uncompleting_with_nothing_done_is_rejected() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        let err = app.uncomplete_entry(USER, &goal.id, 1).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(
            app.by_id(USER, &goal.id).await.expect("goal").current_step,
            0
        );
    }

    #[tokio::test]
    async fn undo_clears_the_entry_note() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        complete_through(&app, &goal.id, 1).await;
        app.update_entry(USER, &goal.id, 1, "first run", None)
            .await
            .expect("update entry");

        app.uncomplete_entry(USER, &goal.id, 1)
            .await
            .expect("uncomplete");
        let entry = app
            .entry_by_goal_and_step(USER, &goal.id, 1)
            .await
            .expect("entry");
        assert!(entry.note.is_empty());
        assert!(entry.completed_at.is_none());
    }

    #[tokio::test]
    async fn step_invariant_holds_across_a_walk() {
        let (_dir, app) = setup_short_track(4).await;
        let goal = create_goal(&app, USER, "Walk").await;
        let moves: [(bool, i32); 9] = [
            (true, 1),
            (true, 2),
            (false, 2),
            (true, 2),
            (true, 3),
            (true, 4),
            (false, 4),
            (true, 4),
            (false, 4),
        ];
        for (complete, step) in moves {
            let before = app.by_id(USER, &goal.id).await.expect("goal").current_step;
            let goal_after = if complete {
                app.complete_entry(USER, &goal.id, step).await
            } else {
                app.uncomplete_entry(USER, &goal.id, step).await
            }
            .expect("move");
            let delta = goal_after.current_step - before;
            assert_eq!(delta, if complete { 1 } else { -1 });
            assert_eq!(
                goal_after.status == GoalStatus::Completed.as_str(),
                goal_after.current_step == 4
            );

            let detail = app
                .goal_with_entries(USER, &goal.id)
                .await
                .expect("detail");
            for entry in &detail.entries {
                assert_eq!(entry.completed, entry.step <= goal_after.current_step);
            }
        }
    }

    #[tokio::test]
    async fn update_entry_requires_completed_entry() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        let err = app
            .update_entry(USER, &goal.id, 1, "note", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EntryNotCompleted { step: 1 }));

        complete_through(&app, &goal.id, 1).await;
        let date = DateTime::parse_from_rfc3339("2026-01-02T00:00:00Z")
            .expect("date")
            .with_timezone(&Utc);
        let entry = app
            .update_entry(USER, &goal.id, 1, "felt great", Some(date))
            .await
            .expect("update entry");
        assert_eq!(entry.note, "felt great");
        assert_eq!(entry.completed_at, Some(date));
        assert!(entry.completed);
    }

    #[tokio::test]
    async fn other_users_cannot_reach_a_goal() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Private").await;
        complete_through(&app, &goal.id, 1).await;

        assert!(matches!(
            app.by_id(OTHER_USER, &goal.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            app.goal_with_entries(OTHER_USER, &goal.id)
                .await
                .err()
                .expect("error"),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            app.complete_entry(OTHER_USER, &goal.id, 2)
                .await
                .unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            app.uncomplete_entry(OTHER_USER, &goal.id, 1)
                .await
                .unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            app.update_entry(OTHER_USER, &goal.id, 1, "x", None)
                .await
                .unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            app.entry_by_goal_and_step(OTHER_USER, &goal.id, 1)
                .await
                .unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            app.update(
                OTHER_USER,
                &goal.id,
                GoalChanges {
                    title: Some("Mine now".to_string()),
                    ..Default::default()
                }
            )
            .await
            .unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            app.delete(OTHER_USER, &goal.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(app
            .goals(OTHER_USER, GoalSort::Recent)
            .await
            .expect("goals")
            .is_empty());

        let untouched = app.by_id(USER, &goal.id).await.expect("goal");
        assert_eq!(untouched.current_step, 1);
        assert_eq!(untouched.title, "Private");
    }

    #[tokio::test]
    async fn update_changes_text_but_not_progress() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        complete_through(&app, &goal.id, 2).await;

        let updated = app
            .update(
                USER,
                &goal.id,
                GoalChanges {
                    title: Some("Renamed".to_string()),
                    description: Some("New description".to_string()),
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.description, "New description");
        assert_eq!(updated.current_step, 2);
        assert_eq!(updated.status, GoalStatus::Active.as_str());

        let err = app
            .update(
                USER,
                &goal.id,
                GoalChanges {
                    title: Some("  ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(app.by_id(USER, &goal.id).await.expect("goal").title, "Renamed");
    }

    #[tokio::test]
    async fn delete_cascades_entries() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Goal").await;
        app.delete(USER, &goal.id).await.expect("delete");

        assert!(matches!(
            app.by_id(USER, &goal.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        let remaining = entries::entries(&app.db, &goal.id).await.expect("entries");
        assert!(remaining.is_empty());
        assert!(matches!(
            app.delete(USER, &goal.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn goals_sort_orders() {
        let (_dir, app) = setup_app().await;
        upgrade(&app, USER, PlanId::Pro).await;
        let banana = create_goal(&app, USER, "banana").await;
        let apple = create_goal(&app, USER, "Apple").await;
        let cherry = create_goal(&app, USER, "cherry").await;
        complete_through(&app, &banana.id, 3).await;
        complete_through(&app, &cherry.id, 1).await;

        let titles = |goals: Vec<goal::Model>| -> Vec<String> {
            goals.into_iter().map(|goal| goal.title).collect()
        };

        let by_title = app.goals(USER, GoalSort::Title).await.expect("goals");
        assert_eq!(titles(by_title), vec!["Apple", "banana", "cherry"]);

        let by_progress = app.goals(USER, GoalSort::Progress).await.expect("goals");
        assert_eq!(titles(by_progress), vec!["banana", "cherry", "Apple"]);

        let recent = app.goals(USER, GoalSort::Recent).await.expect("goals");
        assert_eq!(recent[0].id, cherry.id);
        assert_eq!(recent.len(), 3);
        assert!(recent.iter().any(|goal| goal.id == apple.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_completions_advance_once() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Race").await;
        complete_through(&app, &goal.id, 3).await;

        let first = {
            let app = app.clone();
            let goal_id = goal.id.clone();
            tokio::spawn(async move { app.complete_entry(USER, &goal_id, 4).await })
        };
        let second = {
            let app = app.clone();
            let goal_id = goal.id.clone();
            tokio::spawn(async move { app.complete_entry(USER, &goal_id, 4).await })
        };
        let results = [
            first.await.expect("join first"),
            second.await.expect("join second"),
        ];

        let successes = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(successes, 1);
        for result in &results {
            if let Err(err) = result {
                assert!(
                    matches!(err, AppError::InvalidStep { .. } | AppError::Db(_)),
                    "unexpected error: {err}"
                );
            }
        }

        let after = app.by_id(USER, &goal.id).await.expect("goal");
        assert_eq!(after.current_step, 4);
        assert_eq!(count_completed(&app.db, &goal.id).await.expect("count"), 4);
    }

    #[tokio::test]
    async fn export_requires_export_feature() {
        let (_dir, app) = setup_app().await;
        let goal = create_goal(&app, USER, "Export me").await;
        let err = app.export_markdown(USER, &goal.id).await.unwrap_err();
        assert!(matches!(err, AppError::FeatureUnavailable(Feature::Export)));

        upgrade(&app, USER, PlanId::Pro).await;
        let markdown = app
            .export_markdown(USER, &goal.id)
            .await
            .expect("export");
        assert!(markdown.contains("## Goal: Export me"));
    }

    #[tokio::test]
    async fn downgrade_clears_provider_fields() {
        let (_dir, app) = setup_app().await;
        upgrade(&app, USER, PlanId::Pro).await;
        let upgraded = app.subscription(USER).await.expect("subscription");
        assert_eq!(upgraded.plan_id, "pro");
        assert_eq!(upgraded.currency, "usd");
        assert!(upgraded.current_period_end.is_some());
        let by_provider = app
            .subscription_by_provider_id("sub_user-1")
            .await
            .expect("by provider id");
        assert_eq!(by_provider.user_id, USER);

        let free = app.downgrade_to_free(USER).await.expect("downgrade");
        assert_eq!(free.plan_id, "free");
        assert_eq!(free.status, "active");
        assert!(free.provider_subscription_id.is_none());
        assert!(free.current_period_end.is_none());
        assert!(free.amount.is_none());
        assert!(free.interval.is_none());
        assert!(free.currency.is_empty());
    }

    #[tokio::test]
    async fn duplicate_free_subscription_is_rejected() {
        let (_dir, app) = setup_app().await;
        let err = app.create_free_subscription(USER).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
