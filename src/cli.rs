use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "goaltrack",
    version,
    about = "Track progress on 100-step goals with SQLite"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Data directory (defaults to $GOALTRACK_HOME or ~/.goaltrack)"
    )]
    pub home: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "ID",
        help = "Acting user id (defaults to $GOALTRACK_USER)"
    )]
    pub user: Option<String>,
    #[arg(long, global = true, help = "Print goals as JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Goal(GoalCommand),
    #[command(subcommand)]
    Entry(EntryCommand),
    #[command(subcommand, name = "sub")]
    Subscription(SubscriptionCommand),
}

#[derive(Subcommand, Debug)]
pub enum GoalCommand {
    Add(GoalAdd),
    List(GoalList),
    Show(GoalShow),
    Update(GoalUpdate),
    Remove(GoalRemove),
    Export(GoalExport),
}

#[derive(Subcommand, Debug)]
pub enum EntryCommand {
    Done(EntryStep),
    Undo(EntryStep),
    Note(EntryNote),
    Show(EntryStep),
}

#[derive(Subcommand, Debug)]
pub enum SubscriptionCommand {
    Show,
    Init,
    Upgrade(SubscriptionUpgrade),
    Cancel,
    Downgrade,
}

#[derive(Args, Debug)]
pub struct GoalAdd {
    pub title: String,
    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Args, Debug)]
pub struct GoalList {
    #[arg(long, value_enum, default_value = "recent")]
    pub sort: GoalSortArg,
    #[arg(long, help = "Print the number of active goals only")]
    pub count: bool,
}

#[derive(Args, Debug)]
pub struct GoalShow {
    pub id: String,
    #[arg(long)]
    pub entries: bool,
}

#[derive(Args, Debug)]
pub struct GoalUpdate {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct GoalRemove {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct GoalExport {
    pub id: String,
    #[arg(help = "Output file (defaults to <home>/exports/goal_<id>.md)")]
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EntryStep {
    pub goal_id: String,
    pub step: i32,
}

#[derive(Args, Debug)]
pub struct EntryNote {
    pub goal_id: String,
    pub step: i32,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<String>,
}

#[derive(Args, Debug)]
pub struct SubscriptionUpgrade {
    #[arg(value_enum)]
    pub plan: PaidPlanArg,
    #[arg(long, value_enum, default_value = "stripe")]
    pub provider: ProviderArg,
    #[arg(long, value_name = "ID")]
    pub provider_id: Option<String>,
    #[arg(long, value_enum, default_value = "monthly")]
    pub interval: IntervalArg,
    #[arg(long, help = "Price in minor units (cents)")]
    pub amount: Option<i32>,
    #[arg(long, default_value = "usd")]
    pub currency: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum GoalSortArg {
    Recent,
    Progress,
    Title,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PaidPlanArg {
    Pro,
    Enterprise,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ProviderArg {
    Polar,
    Stripe,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum IntervalArg {
    Monthly,
    Yearly,
}
