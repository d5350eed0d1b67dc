use thiserror::Error;

use crate::model::Feature;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("goal limit reached ({limit} active goals); upgrade your plan to add more")]
    GoalLimitReached { limit: u64 },
    #[error("invalid step {requested}: complete step {expected} first")]
    InvalidStep { expected: i32, requested: i32 },
    #[error("goal already completed")]
    GoalAlreadyCompleted,
    #[error("can only uncomplete the last completed step ({current}), not {requested}")]
    NotLastCompletedStep { current: i32, requested: i32 },
    #[error("cannot update incomplete entry (step {step})")]
    EntryNotCompleted { step: i32 },
    #[error("feature `{}` is not available on the current plan", .0.as_str())]
    FeatureUnavailable(Feature),
    #[error("{}", multiline("Invalid input", .0))]
    InvalidInput(String),
}

fn multiline(label: &str, message: &str) -> String {
    if message.contains('\n') {
        format!("{label}:\n{message}")
    } else {
        format!("{label}: {message}")
    }
}

impl AppError {
    /// Rejections caused by the caller rather than by storage.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Db(_) | Self::Json(_))
    }
}
