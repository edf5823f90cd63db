//! Centralized database schema definitions for the tidelog state bin.
//!
//! Tidelog keeps all state in one consolidated SQLite database:
//! 1. Mutable intent: users, goals, key results, tasks, daily plans.
//! 2. Interpretation state: processing receipts, snapshots, streaks.
//! 3. Historical truth: the append-only audit log (mirrored to JSONL).

pub const TIDELOG_DB_NAME: &str = "tidelog.db";
pub const AUDIT_EVENTS_NAME: &str = "audit.events.jsonl";
pub const BROKER_EVENTS_NAME: &str = "broker.events.jsonl";

pub const DB_SCHEMA_USERS: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

pub const DB_SCHEMA_GOALS: &str = "
    CREATE TABLE IF NOT EXISTS goals (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        horizon TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'ACTIVE',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(user_id) REFERENCES users(id)
    )
";

pub const DB_SCHEMA_KEY_RESULTS: &str = "
    CREATE TABLE IF NOT EXISTS key_results (
        id TEXT PRIMARY KEY,
        goal_id TEXT NOT NULL,
        title TEXT NOT NULL,
        kind TEXT NOT NULL,
        start_value REAL NOT NULL DEFAULT 0,
        target_value REAL NOT NULL,
        current_value REAL NOT NULL DEFAULT 0,
        weight REAL NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(goal_id) REFERENCES goals(id)
    )
";

pub const DB_SCHEMA_TASKS: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        goal_id TEXT,
        key_result_id TEXT,
        contribution REAL NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'OPEN',
        created_at TEXT NOT NULL,
        completed_at TEXT,
        FOREIGN KEY(user_id) REFERENCES users(id)
    )
";

pub const DB_SCHEMA_DAILY_PLANS: &str = "
    CREATE TABLE IF NOT EXISTS daily_plans (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        day TEXT NOT NULL,
        closed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(user_id, day),
        FOREIGN KEY(user_id) REFERENCES users(id)
    )
";

pub const DB_SCHEMA_PLAN_ENTRIES: &str = "
    CREATE TABLE IF NOT EXISTS plan_entries (
        id TEXT PRIMARY KEY,
        plan_id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        UNIQUE(plan_id, task_id),
        FOREIGN KEY(plan_id) REFERENCES daily_plans(id),
        FOREIGN KEY(task_id) REFERENCES tasks(id)
    )
";

// The composite primary key makes INSERT OR IGNORE the atomic
// insert-if-absent primitive the idempotency ledger is built on.
pub const DB_SCHEMA_PROCESSING_RECEIPTS: &str = "
    CREATE TABLE IF NOT EXISTS processing_receipts (
        fact_id TEXT NOT NULL,
        consumer TEXT NOT NULL,
        processed_at TEXT NOT NULL,
        PRIMARY KEY(fact_id, consumer)
    )
";

pub const DB_SCHEMA_GOAL_SNAPSHOTS: &str = "
    CREATE TABLE IF NOT EXISTS goal_snapshots (
        id TEXT PRIMARY KEY,
        goal_id TEXT NOT NULL,
        snap_date TEXT NOT NULL,
        actual REAL NOT NULL,
        expected REAL NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(goal_id) REFERENCES goals(id)
    )
";

pub const DB_SCHEMA_STREAKS: &str = "
    CREATE TABLE IF NOT EXISTS streaks (
        user_id TEXT PRIMARY KEY,
        current_streak INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(user_id) REFERENCES users(id)
    )
";

pub const DB_SCHEMA_AUDIT_LOG: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        fact_id TEXT NOT NULL,
        record_kind TEXT NOT NULL,
        user_id TEXT NOT NULL,
        ts TEXT NOT NULL,
        payload TEXT NOT NULL
    )
";

/// Every table in the tidelog bin, in creation order.
pub const ALL_TABLES: &[&str] = &[
    DB_SCHEMA_USERS,
    DB_SCHEMA_GOALS,
    DB_SCHEMA_KEY_RESULTS,
    DB_SCHEMA_TASKS,
    DB_SCHEMA_DAILY_PLANS,
    DB_SCHEMA_PLAN_ENTRIES,
    DB_SCHEMA_PROCESSING_RECEIPTS,
    DB_SCHEMA_GOAL_SNAPSHOTS,
    DB_SCHEMA_STREAKS,
    DB_SCHEMA_AUDIT_LOG,
];
