use std::env;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::AppError;

pub const HOME_FLAG: &str = "--home";
pub const USER_FLAG: &str = "--user";
pub const HOME_ENV: &str = "GOALTRACK_HOME";
pub const USER_ENV: &str = "GOALTRACK_USER";
pub const LOG_ENV: &str = "GOALTRACK_LOG";
pub const LOG_JSON_ENV: &str = "GOALTRACK_LOG_JSON";

/// Settings resolved once per invocation.
#[derive(Clone, Debug)]
pub struct Config {
    pub home: PathBuf,
    pub user_id: String,
}

impl Config {
    /// Flags win over environment variables; the data home falls back to
    /// `$HOME/.goaltrack`.
    pub fn resolve(home: Option<PathBuf>, user: Option<String>) -> Result<Self, AppError> {
        Ok(Self {
            home: resolve_home(home)?,
            user_id: resolve_user(user)?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            debug!("{key} not set");
            None
        }
    }
}

pub fn resolve_home(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(path) = flag {
        if path.as_os_str().is_empty() {
            return Err(AppError::InvalidInput(format!("{HOME_FLAG} is empty")));
        }
        return Ok(path);
    }
    if let Some(path) = var(HOME_ENV) {
        return Ok(PathBuf::from(path.trim()));
    }
    if let Some(home) = var("HOME") {
        let candidate = PathBuf::from(home).join(".goaltrack");
        info!("{HOME_ENV} not set, using default: {}", candidate.display());
        return Ok(candidate);
    }
    Err(AppError::InvalidInput(format!(
        "unable to resolve data home; pass {HOME_FLAG} or set {HOME_ENV}"
    )))
}

pub fn resolve_user(flag: Option<String>) -> Result<String, AppError> {
    let value = flag.or_else(|| var(USER_ENV)).ok_or_else(|| {
        AppError::InvalidInput(format!("{USER_FLAG} is required (or set {USER_ENV})"))
    })?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{USER_FLAG} is empty")));
    }
    Ok(trimmed.to_string())
}

pub fn log_json_enabled() -> bool {
    matches!(
        var(LOG_JSON_ENV).as_deref().map(str::trim),
        Some("1" | "true" | "yes")
    )
}
