use chrono::NaiveDate;
use tempfile::tempdir;
use tidelog::core::config::Config;
use tidelog::core::db::initialize_db;
use tidelog::core::error::TidelogError;
use tidelog::core::store::Store;
use tidelog::core::time::Clock;
use tidelog::interp::bus::publish_fact;
use tidelog::interp::evaluate::complete_milestone;
use tidelog::interp::fact::{Fact, FactKind};
use tidelog::interp::InterpContext;
use tidelog::plugins::goal::{Goal, Horizon, KeyResult, KeyResultKind};
use tidelog::plugins::{goal, plan, task, user};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

fn context(root: &std::path::Path) -> InterpContext {
    initialize_db(root).unwrap();
    let store = Store::open(root).unwrap();
    let clock = Clock::fixed(1_750_000_000, day(15));
    InterpContext::new(store, clock, Config::default())
}

fn goal_with_kr(
    cx: &InterpContext,
    user_id: &str,
    kind: KeyResultKind,
    start_value: f64,
    target_value: f64,
) -> (Goal, KeyResult) {
    let g = goal::add_goal(cx, user_id, "Test goal", Horizon::Quarter, day(1), day(30)).unwrap();
    let kr = goal::add_key_result(cx, &g.id, "Test KR", kind, start_value, target_value, 1.0)
        .unwrap();
    (g, kr)
}

fn current_value(cx: &InterpContext, goal_id: &str, kr_id: &str) -> f64 {
    goal::goal_report(cx, goal_id)
        .unwrap()
        .key_results
        .into_iter()
        .find(|kr| kr.id == kr_id)
        .unwrap()
        .current_value
}

#[test]
fn test_accumulative_adds_the_contribution() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (g, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Accumulative, 10.0, 100.0);

    let (t, _) = task::add_task(&cx, &u.id, "Log 5 km", None, Some(&kr.id), 5.0).unwrap();
    let (_, report) = task::complete_task(&cx, &t.id).unwrap();
    assert!(!report.has_failures());

    assert_eq!(current_value(&cx, &g.id, &kr.id), 15.0);
}

#[test]
fn test_accumulative_ignores_unlinked_completions() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (g, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Accumulative, 0.0, 100.0);

    let (t, _) = task::add_task(&cx, &u.id, "Unrelated chore", None, None, 7.0).unwrap();
    task::complete_task(&cx, &t.id).unwrap();

    assert_eq!(current_value(&cx, &g.id, &kr.id), 0.0);
}

#[test]
fn test_habit_increments_once_per_closed_day() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (g, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Habit, 2.0, 30.0);

    // Two qualifying completions on the same day still move the habit by
    // exactly one.
    let (t1, _) = task::add_task(&cx, &u.id, "Morning run", None, Some(&kr.id), 0.0).unwrap();
    let (t2, _) = task::add_task(&cx, &u.id, "Evening run", None, Some(&kr.id), 0.0).unwrap();
    plan::plan_day(&cx, &u.id, day(15), &[t1.id.clone(), t2.id.clone()]).unwrap();
    plan::complete_entry(&cx, &u.id, day(15), &t1.id).unwrap();
    plan::complete_entry(&cx, &u.id, day(15), &t2.id).unwrap();

    let fact = Fact::new(&u.id, &cx.clock, FactKind::DayClosed { day: day(15) });
    publish_fact(&cx, &fact);
    assert_eq!(current_value(&cx, &g.id, &kr.id), 3.0);

    // Redelivery of the same closure fact is bounded by the ledger.
    publish_fact(&cx, &fact);
    assert_eq!(current_value(&cx, &g.id, &kr.id), 3.0);
}

#[test]
fn test_habit_needs_a_qualifying_completion() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (g, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Habit, 2.0, 30.0);

    let (t, _) = task::add_task(&cx, &u.id, "Morning run", None, Some(&kr.id), 0.0).unwrap();
    plan::plan_day(&cx, &u.id, day(15), &[t.id.clone()]).unwrap();
    plan::miss_entry(&cx, &u.id, day(15), &t.id).unwrap();
    plan::close_day(&cx, &u.id, day(15)).unwrap();

    assert_eq!(current_value(&cx, &g.id, &kr.id), 2.0);
}

#[test]
fn test_milestone_snaps_to_target() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (g, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Milestone, 0.0, 1.0);

    let (t, _) = task::add_task(&cx, &u.id, "Submit application", None, Some(&kr.id), 0.0).unwrap();
    task::complete_task(&cx, &t.id).unwrap();

    assert_eq!(current_value(&cx, &g.id, &kr.id), 1.0);
}

#[test]
fn test_manual_milestone_completion() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (_, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Milestone, 0.0, 1.0);

    let done = complete_milestone(&cx, &kr.id).unwrap();
    assert_eq!(done.current_value, 1.0);

    // Converges: completing twice lands on the same value.
    let again = complete_milestone(&cx, &kr.id).unwrap();
    assert_eq!(again.current_value, 1.0);
}

#[test]
fn test_manual_completion_rejects_non_milestones() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (_, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Habit, 0.0, 30.0);

    assert!(matches!(
        complete_milestone(&cx, &kr.id),
        Err(TidelogError::ValidationError(_))
    ));
}

#[test]
fn test_completion_is_single_shot_at_the_source() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let (g, kr) = goal_with_kr(&cx, &u.id, KeyResultKind::Accumulative, 0.0, 100.0);

    let (t, _) = task::add_task(&cx, &u.id, "Log 5 km", None, Some(&kr.id), 5.0).unwrap();
    task::complete_task(&cx, &t.id).unwrap();
    assert!(matches!(
        task::complete_task(&cx, &t.id),
        Err(TidelogError::ValidationError(_))
    ));

    assert_eq!(current_value(&cx, &g.id, &kr.id), 5.0);
}
