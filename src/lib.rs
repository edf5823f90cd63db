//! Tidelog: keep intent, execution truth, and derived meaning apart.
//!
//! **Tidelog is a local-first goal engine for a single user.**
//!
//! Plans change; history doesn't. Tidelog enforces that split: changing
//! what you intend to do tomorrow never rewrites what happened yesterday.
//!
//! # Core Principles
//!
//! - **Local-first**: all state is a SQLite bin plus append-only JSONL
//!   logs under `.tidelog/data/`
//! - **Facts are immutable**: activity is recorded once and never edited
//! - **Meaning is derived, not declared**: progress, streaks, and trends
//!   are computed by consumers, never typed in by hand
//! - **Execution truth closes**: a closed day is permanent
//!
//! # Architecture
//!
//! ## The Thin Waist
//!
//! All state mutations route through `DbBroker` for:
//! - Serialization (in-process lock)
//! - Audit logging (`broker.events.jsonl`)
//!
//! ## The Fact Bus
//!
//! Collaborators (user, goal, task, plan subsystems) commit a mutation,
//! then publish a fact. The bus fans each fact out synchronously to the
//! consumers (goal evaluation, streaks, snapshots, audit), each of which
//! self-guards against redelivery through the processing-receipt ledger.
//!
//! # Crate Structure
//!
//! - [`core`]: persistence, broker, clock, config, errors
//! - [`interp`]: the interpretation core (facts, bus, consumers)
//! - [`plugins`]: collaborator subsystems (users, goals, tasks, plans)

pub mod core;
pub mod interp;
pub mod plugins;

use crate::core::config::{self, Config};
use crate::core::store::Store;
use crate::core::time::{self, Clock};
use crate::core::{db, error, schemas};
use crate::interp::InterpContext;
use crate::interp::bus::PublishReport;
use crate::plugins::goal::{GoalStatus, Horizon, KeyResultKind};
use crate::plugins::task::TaskStatus;
use crate::plugins::{goal, plan, task, user};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(
    name = "tidelog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Tidelog is a local-first goal engine that keeps plans, execution truth, and derived meaning apart."
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bootstrap a tidelog workspace
    #[clap(name = "init")]
    Init(InitCli),

    /// Manage users
    #[clap(name = "user", visible_alias = "u")]
    User(UserCli),

    /// Manage goals and key results
    #[clap(name = "goal", visible_alias = "g")]
    Goal(GoalCli),

    /// Track tasks
    #[clap(name = "task", visible_alias = "t")]
    Task(TaskCli),

    /// Daily execution plans
    #[clap(name = "plan", visible_alias = "p")]
    Plan(PlanCli),

    /// Show a user's current streak
    #[clap(name = "streak")]
    Streak {
        #[clap(long)]
        user: String,
    },

    /// Show the audit log
    #[clap(name = "audit")]
    Audit {
        #[clap(long)]
        user: Option<String>,
        #[clap(long, default_value = "50")]
        limit: usize,
    },

    /// Show version information
    #[clap(name = "version")]
    Version,
}

#[derive(clap::Args, Debug)]
struct InitCli {
    /// Directory to initialize (defaults to current working directory).
    #[clap(short, long)]
    dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct UserCli {
    #[clap(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Add a new user
    Add {
        #[clap(value_name = "NAME")]
        name: String,
    },
    /// List users
    List,
}

#[derive(clap::Args, Debug)]
struct GoalCli {
    #[clap(subcommand)]
    command: GoalCommand,
}

#[derive(Subcommand, Debug)]
enum GoalCommand {
    /// Add a new goal
    Add {
        #[clap(value_name = "TITLE")]
        title: String,
        #[clap(long)]
        user: String,
        #[clap(long, value_enum)]
        horizon: Horizon,
        #[clap(long, value_parser = time::parse_day)]
        start: NaiveDate,
        #[clap(long, value_parser = time::parse_day)]
        end: NaiveDate,
    },
    /// Add a key result to a goal
    KrAdd {
        #[clap(value_name = "TITLE")]
        title: String,
        #[clap(long)]
        goal: String,
        #[clap(long, value_enum)]
        kind: KeyResultKind,
        #[clap(long, default_value = "0")]
        start_value: f64,
        #[clap(long)]
        target_value: f64,
        #[clap(long, default_value = "1")]
        weight: f64,
    },
    /// Edit a key result's declared fields (never its current value)
    KrEdit {
        #[clap(long)]
        id: String,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        target_value: Option<f64>,
        #[clap(long)]
        weight: Option<f64>,
    },
    /// Manually complete a milestone key result
    KrComplete {
        #[clap(long)]
        id: String,
    },
    /// List a user's goals
    List {
        #[clap(long)]
        user: String,
    },
    /// Show one goal with key results, progress, and trend
    Get {
        #[clap(long)]
        id: String,
    },
    /// Change a goal's status
    Status {
        #[clap(long)]
        id: String,
        #[clap(long, value_enum)]
        status: GoalStatus,
    },
    /// Show a goal's snapshot history (most recent first)
    Snapshots {
        #[clap(long)]
        id: String,
    },
}

#[derive(clap::Args, Debug)]
struct TaskCli {
    #[clap(subcommand)]
    command: TaskCommand,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Add a new task
    Add {
        #[clap(value_name = "TITLE")]
        title: String,
        #[clap(long)]
        user: String,
        #[clap(long)]
        goal: Option<String>,
        #[clap(long)]
        kr: Option<String>,
        #[clap(long, default_value = "0")]
        contribution: f64,
    },
    /// Mark a task completed (single-shot)
    Complete {
        #[clap(long)]
        id: String,
    },
    /// List a user's tasks
    List {
        #[clap(long)]
        user: String,
        #[clap(long, value_enum)]
        status: Option<TaskStatus>,
    },
}

#[derive(clap::Args, Debug)]
struct PlanCli {
    #[clap(subcommand)]
    command: PlanCommand,
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    /// Create the open plan for a day
    Day {
        #[clap(long)]
        user: String,
        #[clap(long, value_parser = time::parse_day)]
        day: NaiveDate,
        /// Task id(s) to plan for the day.
        #[clap(long = "task")]
        tasks: Vec<String>,
    },
    /// Add an entry to an open plan
    AddEntry {
        #[clap(long)]
        user: String,
        #[clap(long, value_parser = time::parse_day)]
        day: NaiveDate,
        #[clap(long)]
        task: String,
    },
    /// Resolve an entry as completed
    CompleteEntry {
        #[clap(long)]
        user: String,
        #[clap(long, value_parser = time::parse_day)]
        day: NaiveDate,
        #[clap(long)]
        task: String,
    },
    /// Resolve an entry as missed
    MissEntry {
        #[clap(long)]
        user: String,
        #[clap(long, value_parser = time::parse_day)]
        day: NaiveDate,
        #[clap(long)]
        task: String,
    },
    /// Close the day: execution truth becomes permanent
    Close {
        #[clap(long)]
        user: String,
        #[clap(long, value_parser = time::parse_day)]
        day: NaiveDate,
    },
    /// Show the plan for a day
    Show {
        #[clap(long)]
        user: String,
        #[clap(long, value_parser = time::parse_day)]
        day: NaiveDate,
    },
    /// Record a weekly plan reshuffle
    WeekUpdate {
        #[clap(long)]
        user: String,
        #[clap(long, value_parser = time::parse_day)]
        week_start: NaiveDate,
    },
}

fn find_project_root(start_dir: &Path) -> Result<PathBuf, error::TidelogError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(".tidelog").exists() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(error::TidelogError::NotFound(
                "'.tidelog' directory not found in current or parent directories. Run `tidelog init` first.".to_string(),
            ));
        }
    }
}

fn run_init(init_cli: InitCli, current_dir: &Path) -> Result<(), error::TidelogError> {
    let target_dir = match init_cli.dir {
        Some(d) => d,
        None => current_dir.to_path_buf(),
    };
    let target_dir = std::fs::canonicalize(&target_dir).map_err(error::TidelogError::IoError)?;

    let data_root = target_dir.join(".tidelog").join("data");
    std::fs::create_dir_all(&data_root).map_err(error::TidelogError::IoError)?;

    let db_path = db::tidelog_db_path(&data_root);
    if db_path.exists() {
        println!(
            "    {} {} {}",
            "✓".bright_green(),
            schemas::TIDELOG_DB_NAME.bright_white(),
            "(preserved - existing data kept)".bright_black()
        );
    } else {
        db::initialize_db(&data_root)?;
        println!(
            "    {} {}",
            "●".bright_green(),
            schemas::TIDELOG_DB_NAME.bright_white()
        );
    }

    let events_path = data_root.join(schemas::AUDIT_EVENTS_NAME);
    if events_path.exists() {
        println!(
            "    {} {} {}",
            "✓".bright_green(),
            schemas::AUDIT_EVENTS_NAME.bright_white(),
            "(preserved - event history kept)".bright_black()
        );
    } else {
        std::fs::write(&events_path, "").map_err(error::TidelogError::IoError)?;
        println!(
            "    {} {}",
            "●".bright_green(),
            schemas::AUDIT_EVENTS_NAME.bright_white()
        );
    }

    println!();
    println!(
        "{} tidelog workspace ready at {}",
        "✓".bright_green(),
        target_dir.display()
    );
    Ok(())
}

fn print_envelope(cmd: &str, extra: JsonValue) {
    println!(
        "{}",
        serde_json::to_string_pretty(&time::command_envelope(cmd, "ok", extra)).unwrap()
    );
}

fn delivery_json(report: &PublishReport) -> JsonValue {
    serde_json::to_value(report).unwrap_or(JsonValue::Null)
}

pub fn run() -> Result<(), error::TidelogError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init(init_cli) => run_init(init_cli, &current_dir),
        command => {
            let project_root = find_project_root(&current_dir)?;
            let store = Store::open(&project_root.join(".tidelog").join("data"))?;
            let config: Config = config::load_config(&project_root)?;
            let cx = InterpContext::new(store, Clock::system(), config);
            dispatch(command, &cx)
        }
    }
}

fn dispatch(command: Command, cx: &InterpContext) -> Result<(), error::TidelogError> {
    match command {
        Command::User(user_cli) => match user_cli.command {
            UserCommand::Add { name } => {
                let (u, report) = user::add_user(cx, &name)?;
                print_envelope(
                    "user.add",
                    serde_json::json!({ "id": u.id, "deliveries": delivery_json(&report) }),
                );
            }
            UserCommand::List => {
                let users = user::list_users(cx)?;
                println!("{}", serde_json::to_string_pretty(&users).unwrap());
            }
        },
        Command::Goal(goal_cli) => match goal_cli.command {
            GoalCommand::Add {
                title,
                user,
                horizon,
                start,
                end,
            } => {
                let g = goal::add_goal(cx, &user, &title, horizon, start, end)?;
                print_envelope("goal.add", serde_json::json!({ "id": g.id }));
            }
            GoalCommand::KrAdd {
                title,
                goal,
                kind,
                start_value,
                target_value,
                weight,
            } => {
                let kr = goal::add_key_result(
                    cx,
                    &goal,
                    &title,
                    kind,
                    start_value,
                    target_value,
                    weight,
                )?;
                print_envelope("goal.kr.add", serde_json::json!({ "id": kr.id }));
            }
            GoalCommand::KrEdit {
                id,
                title,
                target_value,
                weight,
            } => {
                let kr = goal::edit_key_result(cx, &id, title, target_value, weight)?;
                print_envelope(
                    "goal.kr.edit",
                    serde_json::json!({ "id": kr.id, "target_value": kr.target_value }),
                );
            }
            GoalCommand::KrComplete { id } => {
                let kr = interp::evaluate::complete_milestone(cx, &id)?;
                print_envelope(
                    "goal.kr.complete",
                    serde_json::json!({ "id": kr.id, "current_value": kr.current_value }),
                );
            }
            GoalCommand::List { user } => {
                let goals = goal::list_goals(cx, &user)?;
                println!("{}", serde_json::to_string_pretty(&goals).unwrap());
            }
            GoalCommand::Get { id } => {
                let report = goal::goal_report(cx, &id)?;
                println!("{}", serde_json::to_string_pretty(&report).unwrap());
            }
            GoalCommand::Status { id, status } => {
                let g = goal::set_goal_status(cx, &id, status)?;
                print_envelope(
                    "goal.status",
                    serde_json::json!({ "id": g.id, "status": g.status }),
                );
            }
            GoalCommand::Snapshots { id } => {
                let history = goal::snapshots(cx, &id)?;
                println!("{}", serde_json::to_string_pretty(&history).unwrap());
            }
        },
        Command::Task(task_cli) => match task_cli.command {
            TaskCommand::Add {
                title,
                user,
                goal,
                kr,
                contribution,
            } => {
                let (t, report) = task::add_task(
                    cx,
                    &user,
                    &title,
                    goal.as_deref(),
                    kr.as_deref(),
                    contribution,
                )?;
                print_envelope(
                    "task.add",
                    serde_json::json!({ "id": t.id, "deliveries": delivery_json(&report) }),
                );
            }
            TaskCommand::Complete { id } => {
                let (t, report) = task::complete_task(cx, &id)?;
                print_envelope(
                    "task.complete",
                    serde_json::json!({ "id": t.id, "deliveries": delivery_json(&report) }),
                );
            }
            TaskCommand::List { user, status } => {
                let tasks = task::list_tasks(cx, &user, status)?;
                println!("{}", serde_json::to_string_pretty(&tasks).unwrap());
            }
        },
        Command::Plan(plan_cli) => match plan_cli.command {
            PlanCommand::Day { user, day, tasks } => {
                let p = plan::plan_day(cx, &user, day, &tasks)?;
                print_envelope(
                    "plan.day",
                    serde_json::json!({ "id": p.id, "entries": p.entries.len() }),
                );
            }
            PlanCommand::AddEntry { user, day, task } => {
                let p = plan::add_entry(cx, &user, day, &task)?;
                print_envelope(
                    "plan.entry.add",
                    serde_json::json!({ "id": p.id, "entries": p.entries.len() }),
                );
            }
            PlanCommand::CompleteEntry { user, day, task } => {
                plan::complete_entry(cx, &user, day, &task)?;
                print_envelope("plan.entry.complete", serde_json::json!({ "task": task }));
            }
            PlanCommand::MissEntry { user, day, task } => {
                plan::miss_entry(cx, &user, day, &task)?;
                print_envelope("plan.entry.miss", serde_json::json!({ "task": task }));
            }
            PlanCommand::Close { user, day } => {
                let (p, report) = plan::close_day(cx, &user, day)?;
                print_envelope(
                    "plan.close",
                    serde_json::json!({ "id": p.id, "deliveries": delivery_json(&report) }),
                );
            }
            PlanCommand::Show { user, day } => {
                let p = plan::get_plan(cx, &user, day)?;
                println!("{}", serde_json::to_string_pretty(&p).unwrap());
            }
            PlanCommand::WeekUpdate { user, week_start } => {
                let report = plan::update_week(cx, &user, week_start)?;
                print_envelope(
                    "plan.week.update",
                    serde_json::json!({ "deliveries": delivery_json(&report) }),
                );
            }
        },
        Command::Streak { user } => {
            let broker = core::broker::DbBroker::new(&cx.store.root);
            let state = broker.with_conn(
                &cx.store.db_path(),
                &cx.config.actor,
                "streak.show",
                |conn| {
                    user::require_user(conn, &user)?;
                    interp::streak::get_streak(conn, &user)
                },
            )?;
            match state {
                Some(s) => println!("{}", serde_json::to_string_pretty(&s).unwrap()),
                None => println!(
                    "{}",
                    serde_json::json!({ "user_id": user, "current_streak": 0 })
                ),
            }
        }
        Command::Audit { user, limit } => {
            let broker = core::broker::DbBroker::new(&cx.store.root);
            let records = broker.with_conn(
                &cx.store.db_path(),
                &cx.config.actor,
                "audit.show",
                |conn| interp::audit::audit_records(conn, user.as_deref(), limit),
            )?;
            println!("{}", serde_json::to_string_pretty(&records).unwrap());
        }
        Command::Init(_) | Command::Version => unreachable!(),
    }
    Ok(())
}
