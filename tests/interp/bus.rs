use chrono::NaiveDate;
use tempfile::tempdir;
use tidelog::core::config::Config;
use tidelog::core::db::{db_connect, initialize_db};
use tidelog::core::error::TidelogError;
use tidelog::core::store::Store;
use tidelog::core::time::Clock;
use tidelog::interp::bus::{
    ConsumerOutcome, DeliveryStatus, FactBus, FactConsumer, publish_fact,
};
use tidelog::interp::fact::{Fact, FactKind};
use tidelog::interp::{InterpContext, audit, evaluate, ledger, snapshot, streak};
use tidelog::plugins::goal::{Horizon, KeyResultKind};
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

fn status_of<'r>(
    report: &'r tidelog::interp::bus::PublishReport,
    consumer: &str,
) -> &'r DeliveryStatus {
    &report
        .deliveries
        .iter()
        .find(|d| d.consumer == consumer)
        .expect("consumer missing from report")
        .status
}

#[test]
fn test_same_fact_twice_is_a_noop_for_every_consumer() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());

    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let g = goal::add_goal(&cx, &u.id, "Ship the boat", Horizon::Quarter, day(1), day(30)).unwrap();
    let kr = goal::add_key_result(
        &cx,
        &g.id,
        "Install 100 planks",
        KeyResultKind::Accumulative,
        0.0,
        100.0,
        1.0,
    )
    .unwrap();

    // Redelivery of the exact same fact: the ledger, not the payload,
    // decides whether anything happens.
    let fact = Fact::new(
        &u.id,
        &cx.clock,
        FactKind::TaskCompleted {
            task_id: "T_SYNTHETIC".to_string(),
            goal_id: Some(g.id.clone()),
            key_result_id: Some(kr.id.clone()),
            contribution: 5.0,
        },
    );

    let first = publish_fact(&cx, &fact);
    assert_eq!(*status_of(&first, "GOAL"), DeliveryStatus::Applied);
    assert_eq!(*status_of(&first, "AUDIT"), DeliveryStatus::Applied);
    assert_eq!(*status_of(&first, "STREAK"), DeliveryStatus::NotApplicable);
    assert_eq!(*status_of(&first, "SNAPSHOT"), DeliveryStatus::NotApplicable);

    let second = publish_fact(&cx, &fact);
    assert_eq!(*status_of(&second, "GOAL"), DeliveryStatus::AlreadyProcessed);
    assert_eq!(*status_of(&second, "AUDIT"), DeliveryStatus::AlreadyProcessed);

    let report = goal::goal_report(&cx, &g.id).unwrap();
    assert_eq!(report.key_results[0].current_value, 5.0);

    let conn = db_connect(&cx.store.db_path().to_string_lossy()).unwrap();
    let records = audit::audit_records(&conn, Some(&u.id), 100).unwrap();
    let completions: Vec<_> = records
        .iter()
        .filter(|r| r.record_kind == "audit.task.completed")
        .collect();
    assert_eq!(completions.len(), 1);
}

#[test]
fn test_day_closure_redelivery_keeps_derived_state_stable() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());

    let (u, _) = user::add_user(&cx, "arx").unwrap();
    let g = goal::add_goal(&cx, &u.id, "Morning pages", Horizon::Month, day(1), day(30)).unwrap();
    goal::add_key_result(&cx, &g.id, "Write daily", KeyResultKind::Habit, 0.0, 30.0, 1.0).unwrap();

    let (t, _) = task::add_task(&cx, &u.id, "Write 3 pages", None, None, 0.0).unwrap();
    plan::plan_day(&cx, &u.id, day(15), &[t.id.clone()]).unwrap();
    plan::complete_entry(&cx, &u.id, day(15), &t.id).unwrap();

    let fact = Fact::new(&u.id, &cx.clock, FactKind::DayClosed { day: day(15) });
    publish_fact(&cx, &fact);
    publish_fact(&cx, &fact);

    let conn = db_connect(&cx.store.db_path().to_string_lossy()).unwrap();
    assert_eq!(streak::current_streak(&conn, &u.id).unwrap(), 1);
    assert_eq!(snapshot::snapshot_history(&conn, &g.id).unwrap().len(), 1);
    let records = audit::audit_records(&conn, Some(&u.id), 100).unwrap();
    let closures: Vec<_> = records
        .iter()
        .filter(|r| r.record_kind == "audit.day.closed")
        .collect();
    assert_eq!(closures.len(), 1);
}

#[test]
fn test_one_consumer_failing_never_stops_the_rest() {
    struct Exploder;

    impl FactConsumer for Exploder {
        fn name(&self) -> &'static str {
            "EXPLODER"
        }

        fn apply(&self, _cx: &InterpContext, _fact: &Fact) -> Result<ConsumerOutcome, TidelogError> {
            Err(TidelogError::ValidationError("boom".to_string()))
        }
    }

    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    let mut bus = FactBus::new();
    bus.register(Box::new(Exploder));
    bus.register(Box::new(audit::AuditConsumer));

    let fact = Fact::new(
        &u.id,
        &cx.clock,
        FactKind::TaskCreated {
            task_id: "T_SYNTHETIC".to_string(),
        },
    );
    let report = bus.publish(&cx, &fact);

    assert!(matches!(
        status_of(&report, "EXPLODER"),
        DeliveryStatus::Failed { kind, .. } if kind == "validation"
    ));
    assert_eq!(*status_of(&report, "AUDIT"), DeliveryStatus::Applied);
}

#[test]
fn test_failed_consumer_retries_while_succeeded_ones_skip() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());

    let (u, _) = user::add_user(&cx, "arx").unwrap();
    goal::add_goal(&cx, &u.id, "Read more", Horizon::Month, day(1), day(30)).unwrap();

    // No plan exists for the day: the streak consumer fails, snapshots
    // and audit succeed.
    let fact = Fact::new(&u.id, &cx.clock, FactKind::DayClosed { day: day(15) });
    let first = publish_fact(&cx, &fact);
    assert!(matches!(
        status_of(&first, "STREAK"),
        DeliveryStatus::Failed { kind, .. } if kind == "not_found"
    ));
    assert_eq!(*status_of(&first, "SNAPSHOT"), DeliveryStatus::Applied);
    assert_eq!(*status_of(&first, "AUDIT"), DeliveryStatus::Applied);

    // A failed consumer leaves no receipt, so redelivery reaches it again
    // once the plan exists; the others skip on their receipts.
    plan::plan_day(&cx, &u.id, day(15), &[]).unwrap();
    let second = publish_fact(&cx, &fact);
    assert_eq!(*status_of(&second, "STREAK"), DeliveryStatus::Applied);
    assert_eq!(
        *status_of(&second, "SNAPSHOT"),
        DeliveryStatus::AlreadyProcessed
    );
    assert_eq!(
        *status_of(&second, "AUDIT"),
        DeliveryStatus::AlreadyProcessed
    );
}

#[test]
fn test_unmapped_fact_kind_is_receipted_without_a_record() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());
    let (u, _) = user::add_user(&cx, "arx").unwrap();

    let fact = Fact::new(
        &u.id,
        &cx.clock,
        FactKind::WeeklyPlanUpdated { week_start: day(16) },
    );
    let first = publish_fact(&cx, &fact);
    assert_eq!(*status_of(&first, "AUDIT"), DeliveryStatus::Applied);

    let conn = db_connect(&cx.store.db_path().to_string_lossy()).unwrap();
    let records = audit::audit_records(&conn, Some(&u.id), 100).unwrap();
    assert!(records.iter().all(|r| r.fact_id != fact.fact_id));
    assert!(ledger::has_processed(&conn, &fact.fact_id, audit::CONSUMER_NAME).unwrap());

    // Receipted means never retried: the second delivery is a skip, not
    // another warning.
    let second = publish_fact(&cx, &fact);
    assert_eq!(*status_of(&second, "AUDIT"), DeliveryStatus::AlreadyProcessed);
}

#[test]
fn test_duplicate_ledger_marks_are_benign() {
    let tmp = tempdir().unwrap();
    let cx = context(tmp.path());

    let conn = db_connect(&cx.store.db_path().to_string_lossy()).unwrap();
    assert!(ledger::mark_processed(&conn, "F1", evaluate::CONSUMER_NAME, "1Z").unwrap());
    assert!(!ledger::mark_processed(&conn, "F1", evaluate::CONSUMER_NAME, "2Z").unwrap());
    assert!(ledger::has_processed(&conn, "F1", evaluate::CONSUMER_NAME).unwrap());

    let receipts = ledger::receipts_for_fact(&conn, "F1").unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].processed_at, "1Z");
}
