use std::fs;
use std::path::Path;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use goaltrack::app::App;
use goaltrack::cli::{
    Cli, Command, EntryCommand, EntryNote, EntryStep, GoalAdd, GoalCommand, GoalExport, GoalList,
    GoalShow, GoalSortArg, GoalUpdate, IntervalArg, PaidPlanArg, ProviderArg,
    SubscriptionCommand, SubscriptionUpgrade,
};
use goaltrack::config::{self, Config};
use goaltrack::db;
use goaltrack::entities::goal;
use goaltrack::error::AppError;
use goaltrack::model::{
    BillingInterval, GoalChanges, GoalInput, GoalSort, GoalStatus, PlanChange, PlanId, Provider,
};
use goaltrack::util::{
    format_entry_detail, format_goal_detail, format_progress, format_subscription_detail,
    parse_date, EntryView, GoalView,
};

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        if matches!(err, AppError::GoalLimitReached { .. }) {
            eprintln!("Run `goaltrack sub upgrade pro` to track more goals at once.");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(config::LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    if config::log_json_enabled() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run() -> Result<(), AppError> {
    let Cli {
        home,
        user,
        json,
        command,
    } = Cli::parse();
    let config = Config::resolve(home, user)?;

    let db_path = db::resolve_db_path(&config.home);
    db::ensure_parent_dir(&db_path)?;
    let mut lock = db::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let db = db::connect(&db_path).await?;
    db::ensure_schema(&db).await?;
    let app = App::new(db);
    let output = Output { json };

    match command {
        Command::Goal(command) => handle_goal(&app, &config, output, command).await,
        Command::Entry(command) => handle_entry(&app, &config, output, command).await,
        Command::Subscription(command) => handle_subscription(&app, &config, command).await,
    }
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

async fn handle_goal(
    app: &App,
    config: &Config,
    output: Output,
    command: GoalCommand,
) -> Result<(), AppError> {
    let user_id = config.user_id.as_str();
    match command {
        GoalCommand::Add(args) => handle_goal_add(app, user_id, args).await,
        GoalCommand::List(args) => handle_goal_list(app, user_id, output, args).await,
        GoalCommand::Show(args) => handle_goal_show(app, user_id, output, args).await,
        GoalCommand::Update(args) => handle_goal_update(app, user_id, args).await,
        GoalCommand::Remove(args) => {
            app.delete(user_id, &args.id).await?;
            println!("Goal ID: {} removed.", args.id);
            Ok(())
        }
        GoalCommand::Export(args) => handle_goal_export(app, config, args).await,
    }
}

async fn handle_goal_add(app: &App, user_id: &str, args: GoalAdd) -> Result<(), AppError> {
    ensure_subscription(app, user_id).await?;
    let goal = app
        .create(
            user_id,
            GoalInput {
                title: args.title,
                description: args.description,
            },
        )
        .await?;
    println!("Created goal ID: {}: {}", goal.id, goal.title);
    Ok(())
}

async fn handle_goal_list(
    app: &App,
    user_id: &str,
    output: Output,
    args: GoalList,
) -> Result<(), AppError> {
    if args.count {
        println!("Active: {}", app.count_user_goals(user_id).await?);
        return Ok(());
    }
    let goals = app.goals(user_id, sort_from_arg(args.sort)).await?;
    if output.json {
        let views: Vec<GoalView> = goals.iter().map(|goal| GoalView::new(goal, None)).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    if goals.is_empty() {
        println!("No goals found.");
        return Ok(());
    }
    print_goal_list(&goals, app.track_length());
    Ok(())
}

async fn handle_goal_show(
    app: &App,
    user_id: &str,
    output: Output,
    args: GoalShow,
) -> Result<(), AppError> {
    let detail = app.goal_with_entries(user_id, &args.id).await?;
    let entries = args.entries.then_some(detail.entries.as_slice());
    if output.json {
        let view = GoalView::new(&detail.goal, entries);
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!(
            "{}",
            format_goal_detail(&detail.goal, entries, app.track_length())
        );
    }
    Ok(())
}

async fn handle_goal_update(app: &App, user_id: &str, args: GoalUpdate) -> Result<(), AppError> {
    if args.title.is_none() && args.description.is_none() {
        return Err(AppError::InvalidInput(
            "nothing to update; pass --title or --description".to_string(),
        ));
    }
    let goal = app
        .update(
            user_id,
            &args.id,
            GoalChanges {
                title: args.title,
                description: args.description,
            },
        )
        .await?;
    println!("Updated goal ID: {}: {}", goal.id, goal.title);
    Ok(())
}

async fn handle_goal_export(app: &App, config: &Config, args: GoalExport) -> Result<(), AppError> {
    let markdown = app.export_markdown(&config.user_id, &args.id).await?;
    let path = args
        .path
        .unwrap_or_else(|| db::resolve_export_path(&config.home, &args.id));
    write_export(&path, &markdown)?;
    println!("Exported goal ID: {} to {}", args.id, path.display());
    Ok(())
}

fn write_export(path: &Path, markdown: &str) -> Result<(), AppError> {
    db::ensure_parent_dir(path)?;
    fs::write(path, format!("{markdown}\n"))?;
    Ok(())
}

async fn handle_entry(
    app: &App,
    config: &Config,
    output: Output,
    command: EntryCommand,
) -> Result<(), AppError> {
    let user_id = config.user_id.as_str();
    match command {
        EntryCommand::Done(args) => {
            let EntryStep { goal_id, step } = args;
            let goal = app.complete_entry(user_id, &goal_id, step).await?;
            println!(
                "Completed step {step} of goal ID: {}. {}",
                goal.id,
                format_progress(goal.current_step, app.track_length())
            );
            if goal.status == GoalStatus::Completed.as_str() {
                println!("Goal ID: {} completed: {}", goal.id, goal.title);
            }
            Ok(())
        }
        EntryCommand::Undo(args) => {
            let EntryStep { goal_id, step } = args;
            let goal = app.uncomplete_entry(user_id, &goal_id, step).await?;
            println!(
                "Undid step {step} of goal ID: {}. {}",
                goal.id,
                format_progress(goal.current_step, app.track_length())
            );
            Ok(())
        }
        EntryCommand::Note(args) => handle_entry_note(app, user_id, args).await,
        EntryCommand::Show(args) => {
            let EntryStep { goal_id, step } = args;
            let goal = app.by_id(user_id, &goal_id).await?;
            let entry = app.entry_by_goal_and_step(user_id, &goal_id, step).await?;
            if output.json {
                println!("{}", serde_json::to_string_pretty(&EntryView::from(&entry))?);
            } else {
                println!("{}", format_entry_detail(&goal, &entry));
            }
            Ok(())
        }
    }
}

async fn handle_entry_note(app: &App, user_id: &str, args: EntryNote) -> Result<(), AppError> {
    let EntryNote {
        goal_id,
        step,
        note,
        date,
    } = args;
    let current = app.entry_by_goal_and_step(user_id, &goal_id, step).await?;
    let completed_at = match date.as_deref() {
        Some(value) => Some(parse_date(value)?),
        None => current.completed_at,
    };
    let note = note.unwrap_or(current.note);
    let entry = app
        .update_entry(user_id, &goal_id, step, &note, completed_at)
        .await?;
    println!("Updated step {} of goal ID: {}.", entry.step, goal_id);
    Ok(())
}

async fn handle_subscription(
    app: &App,
    config: &Config,
    command: SubscriptionCommand,
) -> Result<(), AppError> {
    let user_id = config.user_id.as_str();
    match command {
        SubscriptionCommand::Show => {
            let sub = app.subscription(user_id).await?;
            let active = app.count_user_goals(user_id).await?;
            println!("{}", format_subscription_detail(&sub, active));
        }
        SubscriptionCommand::Init => {
            let sub = app.create_free_subscription(user_id).await?;
            println!("Created {} subscription for user {}.", sub.plan_id, user_id);
        }
        SubscriptionCommand::Upgrade(args) => {
            let sub = app.change_plan(user_id, plan_change_from_args(args)).await?;
            println!("Subscription plan set to {}.", sub.plan_id);
        }
        SubscriptionCommand::Cancel => {
            let sub = app.cancel_subscription(user_id).await?;
            println!("Subscription {} cancelled.", sub.plan_id);
        }
        SubscriptionCommand::Downgrade => {
            app.downgrade_to_free(user_id).await?;
            println!("Subscription downgraded to free.");
        }
    }
    Ok(())
}

async fn ensure_subscription(app: &App, user_id: &str) -> Result<(), AppError> {
    match app.subscription(user_id).await {
        Ok(_) => Ok(()),
        Err(AppError::NotFound(_)) => {
            app.create_free_subscription(user_id).await?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn sort_from_arg(arg: GoalSortArg) -> GoalSort {
    match arg {
        GoalSortArg::Recent => GoalSort::Recent,
        GoalSortArg::Progress => GoalSort::Progress,
        GoalSortArg::Title => GoalSort::Title,
    }
}

fn plan_change_from_args(args: SubscriptionUpgrade) -> PlanChange {
    PlanChange {
        plan: match args.plan {
            PaidPlanArg::Pro => PlanId::Pro,
            PaidPlanArg::Enterprise => PlanId::Enterprise,
        },
        provider: match args.provider {
            ProviderArg::Polar => Provider::Polar,
            ProviderArg::Stripe => Provider::Stripe,
        },
        provider_subscription_id: args.provider_id,
        interval: Some(match args.interval {
            IntervalArg::Monthly => BillingInterval::Monthly,
            IntervalArg::Yearly => BillingInterval::Yearly,
        }),
        amount: args.amount,
        currency: args.currency,
    }
}

fn print_goal_list(goals: &[goal::Model], track_length: i32) {
    println!("{:<36} {:<9} {:<8} {}", "ID", "STAT", "STEPS", "TITLE");
    for goal in goals {
        println!(
            "{:<36} {:<9} {:<8} {}",
            goal.id,
            goal.status,
            format!("{}/{}", goal.current_step, track_length),
            goal.title
        );
    }
}
