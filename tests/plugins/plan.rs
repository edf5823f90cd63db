use chrono::NaiveDate;
use tempfile::tempdir;
use tidelog::core::config::Config;
use tidelog::core::db::initialize_db;
use tidelog::core::error::TidelogError;
use tidelog::core::store::Store;
use tidelog::core::time::Clock;
use tidelog::interp::InterpContext;
use tidelog::plugins::plan::EntryStatus;
use tidelog::plugins::{plan, task, user};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

fn context(root: &std::path::Path) -> InterpContext {
    initialize_db(root).unwrap();
    let store = Store::open(root).unwrap();
    let clock = Clock::fixed(1_750_000_000, day(15));
    InterpContext::new(store, clock, Config::default())
}

#[test]
fn test_plan_lifecycle() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    // 1. Add tasks
    let (t1, _) = task::add_task(&cx, &u.id, "Write report", None, None, 0.0).unwrap();
    let (t2, _) = task::add_task(&cx, &u.id, "Review PRs", None, None, 0.0).unwrap();

    // 2. Plan the day
    let p = plan::plan_day(&cx, &u.id, day(15), &[t1.id.clone()]).unwrap();
    assert_eq!(p.entries.len(), 1);
    assert!(!p.closed);
    assert_eq!(p.entries[0].status, EntryStatus::Pending);

    // 3. Grow the plan while open
    let p = plan::add_entry(&cx, &u.id, day(15), &t2.id).unwrap();
    assert_eq!(p.entries.len(), 2);

    // 4. Resolve entries
    plan::complete_entry(&cx, &u.id, day(15), &t1.id).unwrap();
    let p = plan::miss_entry(&cx, &u.id, day(15), &t2.id).unwrap();
    assert_eq!(p.entries[0].status, EntryStatus::Completed);
    assert_eq!(p.entries[1].status, EntryStatus::Missed);

    // 5. Close
    let (p, report) = plan::close_day(&cx, &u.id, day(15)).unwrap();
    assert!(p.closed);
    assert!(!report.has_failures());
}

#[test]
fn test_closed_plan_rejects_every_mutation() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    let (t1, _) = task::add_task(&cx, &u.id, "Write report", None, None, 0.0).unwrap();
    let (t2, _) = task::add_task(&cx, &u.id, "Review PRs", None, None, 0.0).unwrap();
    plan::plan_day(&cx, &u.id, day(15), &[t1.id.clone()]).unwrap();
    plan::close_day(&cx, &u.id, day(15)).unwrap();

    assert!(matches!(
        plan::add_entry(&cx, &u.id, day(15), &t2.id),
        Err(TidelogError::DomainViolation(_))
    ));
    assert!(matches!(
        plan::complete_entry(&cx, &u.id, day(15), &t1.id),
        Err(TidelogError::DomainViolation(_))
    ));
    assert!(matches!(
        plan::miss_entry(&cx, &u.id, day(15), &t1.id),
        Err(TidelogError::DomainViolation(_))
    ));

    // The record is byte-for-byte what it was at closing time.
    let p = plan::get_plan(&cx, &u.id, day(15)).unwrap();
    assert!(p.closed);
    assert_eq!(p.entries.len(), 1);
    assert_eq!(p.entries[0].status, EntryStatus::Pending);
}

#[test]
fn test_closing_is_one_way() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    plan::plan_day(&cx, &u.id, day(15), &[]).unwrap();
    plan::close_day(&cx, &u.id, day(15)).unwrap();

    assert!(matches!(
        plan::close_day(&cx, &u.id, day(15)),
        Err(TidelogError::DomainViolation(_))
    ));
}

#[test]
fn test_one_plan_per_user_and_day() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    plan::plan_day(&cx, &u.id, day(15), &[]).unwrap();
    assert!(matches!(
        plan::plan_day(&cx, &u.id, day(15), &[]),
        Err(TidelogError::ValidationError(_))
    ));
}

#[test]
fn test_entries_resolve_exactly_once() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    let (t, _) = task::add_task(&cx, &u.id, "Write report", None, None, 0.0).unwrap();
    plan::plan_day(&cx, &u.id, day(15), &[t.id.clone()]).unwrap();
    plan::complete_entry(&cx, &u.id, day(15), &t.id).unwrap();

    assert!(matches!(
        plan::miss_entry(&cx, &u.id, day(15), &t.id),
        Err(TidelogError::ValidationError(_))
    ));
}

#[test]
fn test_missing_plan_is_not_found() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    assert!(matches!(
        plan::close_day(&cx, &u.id, day(15)),
        Err(TidelogError::NotFound(_))
    ));
    assert!(matches!(
        plan::get_plan(&cx, &u.id, day(15)),
        Err(TidelogError::NotFound(_))
    ));
}

#[test]
fn test_cannot_plan_someone_elses_task() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (alice, _) = user::add_user(&cx, "alice").unwrap();
    let (bob, _) = user::add_user(&cx, "bob").unwrap();

    let (t, _) = task::add_task(&cx, &bob.id, "Bob's chore", None, None, 0.0).unwrap();
    assert!(matches!(
        plan::plan_day(&cx, &alice.id, day(15), &[t.id]),
        Err(TidelogError::ValidationError(_))
    ));
}

#[test]
fn test_week_updates_start_on_monday() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    // 2025-06-16 is a Monday, 2025-06-15 is not.
    assert!(matches!(
        plan::update_week(&cx, &u.id, day(15)),
        Err(TidelogError::ValidationError(_))
    ));
    let report = plan::update_week(&cx, &u.id, day(16)).unwrap();
    assert!(!report.has_failures());
}
