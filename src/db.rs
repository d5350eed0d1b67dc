use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{goal, goal_entry, subscription};
use crate::error::AppError;

pub fn resolve_db_path(home: &Path) -> PathBuf {
    home.join("goaltrack.db")
}

pub fn resolve_export_dir(home: &Path) -> PathBuf {
    home.join("exports")
}

pub fn resolve_export_path(home: &Path, goal_id: &str) -> PathBuf {
    resolve_export_dir(home).join(format!("goal_{goal_id}.md"))
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut goal_stmt = schema.create_table_from_entity(goal::Entity);
    goal_stmt.if_not_exists();
    db.execute(builder.build(&goal_stmt)).await?;

    let mut entry_stmt = schema.create_table_from_entity(goal_entry::Entity);
    entry_stmt.if_not_exists();
    db.execute(builder.build(&entry_stmt)).await?;

    let mut sub_stmt = schema.create_table_from_entity(subscription::Entity);
    sub_stmt.if_not_exists();
    db.execute(builder.build(&sub_stmt)).await?;

    let mut goal_index = Index::create()
        .name("idx_goals_user")
        .table(goal::Entity)
        .col(goal::Column::UserId)
        .to_owned();
    goal_index.if_not_exists();
    db.execute(builder.build(&goal_index)).await?;

    let mut entry_index = Index::create()
        .name("idx_goal_entries_goal_step")
        .table(goal_entry::Entity)
        .col(goal_entry::Column::GoalId)
        .col(goal_entry::Column::Step)
        .unique()
        .to_owned();
    entry_index.if_not_exists();
    db.execute(builder.build(&entry_index)).await?;

    let mut sub_index = Index::create()
        .name("idx_subscriptions_user")
        .table(subscription::Entity)
        .col(subscription::Column::UserId)
        .unique()
        .to_owned();
    sub_index.if_not_exists();
    db.execute(builder.build(&sub_index)).await?;

    Ok(())
}
