use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::entities::{goal, goal_entry, subscription};
use crate::error::AppError;
use crate::limits;

const PROGRESS_WIDTH: usize = 20;

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// Parses `YYYY-MM-DD` as midnight UTC.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, AppError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::InvalidInput(format!("invalid date '{value}', expected YYYY-MM-DD"))
    })?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::InvalidInput(format!("invalid date '{value}'")))?
        .and_utc())
}

pub fn progress_percent(current_step: i32, track_length: i32) -> u32 {
    if track_length <= 0 {
        return 0;
    }
    let clamped = current_step.clamp(0, track_length);
    (clamped as u32 * 100) / track_length as u32
}

/// `[#####---------------]  25/100`
pub fn format_progress(current_step: i32, track_length: i32) -> String {
    let filled = progress_percent(current_step, track_length) as usize * PROGRESS_WIDTH / 100;
    format!(
        "[{}{}] {:>3}/{}",
        "#".repeat(filled),
        "-".repeat(PROGRESS_WIDTH - filled),
        current_step,
        track_length
    )
}

pub fn format_goal_detail(
    goal: &goal::Model,
    entries: Option<&[goal_entry::Model]>,
    track_length: i32,
) -> String {
    let mut output = String::new();
    output.push_str(&format!("Goal ID: {}\n", goal.id));
    output.push_str(&format!("Title: {}\n", goal.title));
    output.push_str(&format!("Status: {}\n", goal.status));
    output.push_str(&format!(
        "Progress: {}\n",
        format_progress(goal.current_step, track_length)
    ));
    if has_text(&goal.description) {
        output.push_str(&format!("Description: {}\n", goal.description));
    }
    output.push_str(&format!("Created: {}\n", format_datetime(goal.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(goal.updated_at)));

    let Some(entries) = entries else {
        return output.trim_end().to_string();
    };
    output.push('\n');
    let completed: Vec<&goal_entry::Model> =
        entries.iter().filter(|entry| entry.completed).collect();
    if completed.is_empty() {
        output.push_str("Completed entries: (none)");
        return output;
    }
    output.push_str("Completed entries:\n");
    for entry in completed {
        let when = entry
            .completed_at
            .map(format_date)
            .unwrap_or_else(|| "-".to_string());
        if has_text(&entry.note) {
            output.push_str(&format!("- #{} {} {}\n", entry.step, when, entry.note));
        } else {
            output.push_str(&format!("- #{} {}\n", entry.step, when));
        }
    }
    output.trim_end().to_string()
}

pub fn format_entry_detail(goal: &goal::Model, entry: &goal_entry::Model) -> String {
    let mut output = String::new();
    output.push_str(&format!("Goal ID: {}\n", goal.id));
    output.push_str(&format!("Goal: {}\n", goal.title));
    output.push_str(&format!("Step: {}\n", entry.step));
    output.push_str(&format!(
        "Completed: {}\n",
        if entry.completed { "yes" } else { "no" }
    ));
    if let Some(completed_at) = entry.completed_at {
        output.push_str(&format!("Completed At: {}\n", format_datetime(completed_at)));
    }
    if has_text(&entry.note) {
        output.push_str(&format!("Note: {}\n", entry.note));
    }
    output.trim_end().to_string()
}

pub fn format_subscription_detail(sub: &subscription::Model, active_goals: u64) -> String {
    let limit = limits::goal_limit(sub);
    let mut output = String::new();
    output.push_str(&format!("Plan: {}\n", sub.plan_id));
    output.push_str(&format!("Status: {}\n", sub.status));
    output.push_str(&format!(
        "Billing: {}\n",
        if limits::is_paid(sub) { "paid" } else { "free" }
    ));
    match limit {
        limits::GoalLimit::Limited(max) => {
            output.push_str(&format!("Active goals: {active_goals}/{max}\n"))
        }
        limits::GoalLimit::Unlimited => {
            output.push_str(&format!("Active goals: {active_goals} (unlimited)\n"))
        }
    }
    let price = limits::format_price(sub);
    if !price.is_empty() {
        output.push_str(&format!("Price: {price}\n"));
    }
    if has_text(&sub.provider) {
        output.push_str(&format!("Provider: {}\n", sub.provider));
    }
    if let Some(period_end) = sub.current_period_end {
        output.push_str(&format!("Renews: {}\n", format_date(period_end)));
    }
    output.trim_end().to_string()
}

pub fn format_goal_markdown(goal: &goal::Model, entries: &[goal_entry::Model]) -> String {
    fn checkbox(completed: bool) -> &'static str {
        if completed {
            "x"
        } else {
            " "
        }
    }

    fn collapse_heading(text: &str) -> String {
        let parts: Vec<&str> = text
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect();
        if parts.is_empty() {
            "(untitled)".to_string()
        } else {
            parts.join(" / ")
        }
    }

    fn push_line(lines: &mut Vec<String>, text: &str) {
        lines.push(text.to_string());
    }

    fn push_blank(lines: &mut Vec<String>) {
        lines.push(String::new());
    }

    let mut lines = Vec::new();
    push_line(&mut lines, "# Goal Progress");
    push_blank(&mut lines);
    push_line(
        &mut lines,
        &format!("## Goal: {}", collapse_heading(&goal.title)),
    );
    push_blank(&mut lines);
    push_line(&mut lines, &format!("- **Goal ID:** `{}`", goal.id));
    push_line(&mut lines, &format!("- **Status:** `{}`", goal.status));
    push_line(
        &mut lines,
        &format!("- **Progress:** {}/{}", goal.current_step, entries.len()),
    );
    push_line(
        &mut lines,
        &format!("- **Created:** {}", format_datetime(goal.created_at)),
    );
    push_line(
        &mut lines,
        &format!("- **Updated:** {}", format_datetime(goal.updated_at)),
    );
    push_blank(&mut lines);

    push_line(&mut lines, "### Description");
    push_blank(&mut lines);
    if goal.description.trim().is_empty() {
        push_line(&mut lines, "*No description*");
    } else {
        let normalized = goal.description.replace("\r\n", "\n");
        for line in normalized.lines() {
            if line.is_empty() {
                push_line(&mut lines, ">");
            } else {
                push_line(&mut lines, &format!("> {line}"));
            }
        }
    }
    push_blank(&mut lines);

    push_line(&mut lines, "### Entries");
    push_blank(&mut lines);
    for entry in entries {
        let mut line = format!("- [{}] Step {}", checkbox(entry.completed), entry.step);
        if let Some(completed_at) = entry.completed_at {
            line.push_str(&format!(" *({})*", format_date(completed_at)));
        }
        if has_text(&entry.note) {
            line.push_str(&format!(": {}", entry.note.replace('\n', " ")));
        }
        push_line(&mut lines, &line);
    }

    lines.join("\n").trim_end().to_string()
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    pub step: i32,
    pub completed: bool,
    pub note: String,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&goal_entry::Model> for EntryView {
    fn from(entry: &goal_entry::Model) -> Self {
        Self {
            step: entry.step,
            completed: entry.completed,
            note: entry.note.clone(),
            completed_at: entry.completed_at,
        }
    }
}

/// JSON shape of a goal for `--json` output.
#[derive(Debug, Serialize)]
pub struct GoalView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub current_step: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<EntryView>>,
}

impl GoalView {
    pub fn new(goal: &goal::Model, entries: Option<&[goal_entry::Model]>) -> Self {
        Self {
            id: goal.id.clone(),
            title: goal.title.clone(),
            description: goal.description.clone(),
            status: goal.status.clone(),
            current_step: goal.current_step,
            created_at: goal.created_at,
            updated_at: goal.updated_at,
            entries: entries.map(|items| items.iter().map(EntryView::from).collect()),
        }
    }
}
