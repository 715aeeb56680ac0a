use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use booking::manager::BookingManager;
use booking::model::{MemberBookingPreference, MemberTier, Slot};
use booking::notify::NotificationIntent;
use scheduler::engine::AutoReserveEngine;
use scheduler::types::{AutoReserveOutcome, SkipReason};

mod mock_store;
use mock_store::InMemoryBookingStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// 20h out with a 24h window: inside the priority phase, both automation
/// flags on.
fn auto_slot(capacity: u32, category: &str) -> Slot {
    let start = now() + Duration::hours(20);
    Slot {
        id: Uuid::new_v4(),
        start,
        end: start + Duration::hours(1),
        capacity,
        access_opens_hours: 24,
        priority_enabled: true,
        auto_reserve_enabled: true,
        auto_reserve_executed: false,
        category: category.into(),
    }
}

fn pref(tier: MemberTier, enabled: bool, category: Option<&str>) -> MemberBookingPreference {
    MemberBookingPreference {
        member_id: Uuid::new_v4(),
        tier,
        auto_reserve_enabled: enabled,
        preferred_category: category.map(Into::into),
    }
}

type Manager = Arc<BookingManager<InMemoryBookingStore>>;

async fn make_engine() -> (
    Arc<AutoReserveEngine<InMemoryBookingStore>>,
    Manager,
    mpsc::Receiver<NotificationIntent>,
) {
    common::logger::init("scheduler-tests", false);

    let store = Arc::new(InMemoryBookingStore::default());
    let (tx, rx) = mpsc::channel(32);
    let manager = Arc::new(BookingManager::new(store, tx).await.unwrap());
    let engine = Arc::new(AutoReserveEngine::new(manager.clone()));

    (engine, manager, rx)
}

#[tokio::test]
async fn scenario_c_books_matching_members_and_flips_flag() {
    let (engine, mgr, mut rx) = make_engine().await;

    let slot = auto_slot(2, "early");
    mgr.upsert_slot(slot.clone()).await.unwrap();

    let wildcard_a = pref(MemberTier::Priority, true, None);
    let wildcard_b = pref(MemberTier::Priority, true, None);
    let late_only = pref(MemberTier::Priority, true, Some("late"));

    for p in [&wildcard_a, &wildcard_b, &late_only] {
        mgr.upsert_preference(p.clone()).await.unwrap();
    }

    let out = engine.check_and_run(slot.id, now()).await.unwrap();

    let mut reserved = match out {
        AutoReserveOutcome::Executed { reserved } => reserved,
        other => panic!("expected an executed batch, got {other:?}"),
    };
    reserved.sort_unstable();

    let mut expected = vec![wildcard_a.member_id, wildcard_b.member_id];
    expected.sort_unstable();

    assert_eq!(reserved, expected);
    assert!(
        !reserved.contains(&late_only.member_id),
        "category-mismatched member must not be booked"
    );
    assert!(mgr.get_slot(slot.id).await.unwrap().auto_reserve_executed);
    assert_eq!(mgr.available(slot.id).await.unwrap(), 0);

    match rx.try_recv().unwrap() {
        NotificationIntent::AutoReserved { slot_id, mut member_ids } => {
            member_ids.sort_unstable();
            assert_eq!(slot_id, slot.id);
            assert_eq!(member_ids, expected);
        }
        other => panic!("expected auto_reserved intent, got {other:?}"),
    }
}

#[tokio::test]
async fn second_run_performs_no_insertions() {
    let (engine, mgr, _rx) = make_engine().await;

    let slot = auto_slot(3, "early");
    mgr.upsert_slot(slot.clone()).await.unwrap();
    mgr.upsert_preference(pref(MemberTier::Priority, true, None))
        .await
        .unwrap();

    let first = engine.check_and_run(slot.id, now()).await.unwrap();
    assert!(matches!(first, AutoReserveOutcome::Executed { .. }));

    let booked_after_first = mgr.reservations_for(slot.id).await.len();

    let second = engine.check_and_run(slot.id, now()).await.unwrap();
    assert_eq!(
        second,
        AutoReserveOutcome::Skipped(SkipReason::AlreadyExecuted)
    );
    assert_eq!(mgr.reservations_for(slot.id).await.len(), booked_after_first);
    assert!(mgr.get_slot(slot.id).await.unwrap().auto_reserve_executed);
}

#[tokio::test]
async fn flag_flips_even_when_nobody_is_eligible() {
    let (engine, mgr, mut rx) = make_engine().await;

    let slot = auto_slot(2, "early");
    mgr.upsert_slot(slot.clone()).await.unwrap();

    // Opted-out and wrong-tier members only.
    mgr.upsert_preference(pref(MemberTier::Priority, false, None))
        .await
        .unwrap();
    mgr.upsert_preference(pref(MemberTier::Ordinary, true, None))
        .await
        .unwrap();

    let out = engine.check_and_run(slot.id, now()).await.unwrap();
    assert_eq!(out, AutoReserveOutcome::Executed { reserved: vec![] });
    assert!(mgr.get_slot(slot.id).await.unwrap().auto_reserve_executed);

    // The empty emission is still sent.
    assert_eq!(
        rx.try_recv().unwrap(),
        NotificationIntent::AutoReserved {
            slot_id: slot.id,
            member_ids: vec![],
        }
    );
}

#[tokio::test]
async fn batch_is_capped_by_availability_deterministically() {
    let (engine, mgr, _rx) = make_engine().await;

    let slot = auto_slot(1, "early");
    mgr.upsert_slot(slot.clone()).await.unwrap();

    let prefs = [
        pref(MemberTier::Priority, true, None),
        pref(MemberTier::Priority, true, None),
        pref(MemberTier::Priority, true, None),
    ];
    for p in &prefs {
        mgr.upsert_preference(p.clone()).await.unwrap();
    }

    let out = engine.check_and_run(slot.id, now()).await.unwrap();

    // The single spot goes to the smallest member id.
    let mut ids: Vec<_> = prefs.iter().map(|p| p.member_id).collect();
    ids.sort_unstable();

    assert_eq!(
        out,
        AutoReserveOutcome::Executed {
            reserved: vec![ids[0]],
        }
    );
}

#[tokio::test]
async fn members_already_holding_a_spot_are_excluded() {
    let (engine, mgr, _rx) = make_engine().await;

    let slot = auto_slot(2, "early");
    mgr.upsert_slot(slot.clone()).await.unwrap();

    let booked = pref(MemberTier::Priority, true, None);
    let fresh = pref(MemberTier::Priority, true, None);
    mgr.upsert_preference(booked.clone()).await.unwrap();
    mgr.upsert_preference(fresh.clone()).await.unwrap();

    // The first member booked themselves during the priority phase.
    mgr.reserve(booked.member_id, MemberTier::Priority, slot.id, now())
        .await
        .unwrap();

    let out = engine.check_and_run(slot.id, now()).await.unwrap();
    assert_eq!(
        out,
        AutoReserveOutcome::Executed {
            reserved: vec![fresh.member_id],
        }
    );

    let active = mgr
        .reservations_for(slot.id)
        .await
        .iter()
        .filter(|r| r.active)
        .count();
    assert_eq!(active, 2);
}

#[tokio::test]
async fn preconditions_gate_the_run() {
    let (engine, mgr, _rx) = make_engine().await;

    let unknown = Uuid::new_v4();
    assert_eq!(
        engine.check_and_run(unknown, now()).await.unwrap(),
        AutoReserveOutcome::Skipped(SkipReason::UnknownSlot)
    );

    let mut no_priority = auto_slot(2, "early");
    no_priority.priority_enabled = false;
    mgr.upsert_slot(no_priority.clone()).await.unwrap();
    assert_eq!(
        engine.check_and_run(no_priority.id, now()).await.unwrap(),
        AutoReserveOutcome::Skipped(SkipReason::PriorityDisabled)
    );

    let mut opted_out = auto_slot(2, "early");
    opted_out.auto_reserve_enabled = false;
    mgr.upsert_slot(opted_out.clone()).await.unwrap();
    assert_eq!(
        engine.check_and_run(opted_out.id, now()).await.unwrap(),
        AutoReserveOutcome::Skipped(SkipReason::AutoReserveDisabled)
    );
}

#[tokio::test]
async fn runs_only_inside_the_priority_window() {
    let (engine, mgr, _rx) = make_engine().await;

    // 30h out: the window has not opened.
    let mut slot = auto_slot(2, "early");
    slot.start = now() + Duration::hours(30);
    slot.end = slot.start + Duration::hours(1);
    mgr.upsert_slot(slot.clone()).await.unwrap();
    assert_eq!(
        engine.check_and_run(slot.id, now()).await.unwrap(),
        AutoReserveOutcome::Skipped(SkipReason::OutsidePriorityWindow)
    );

    // 6h out: general booking is open, the priority phase is over.
    let mut slot = auto_slot(2, "early");
    slot.start = now() + Duration::hours(6);
    slot.end = slot.start + Duration::hours(1);
    mgr.upsert_slot(slot.clone()).await.unwrap();
    assert_eq!(
        engine.check_and_run(slot.id, now()).await.unwrap(),
        AutoReserveOutcome::Skipped(SkipReason::OutsidePriorityWindow)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_run_the_batch_once() {
    let (engine, mgr, _rx) = make_engine().await;

    let slot = auto_slot(2, "early");
    mgr.upsert_slot(slot.clone()).await.unwrap();
    mgr.upsert_preference(pref(MemberTier::Priority, true, None))
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = engine.clone();
            let slot_id = slot.id;
            tokio::spawn(async move { engine.check_and_run(slot_id, now()).await })
        })
        .collect();

    let outcomes: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|h| h.unwrap().unwrap())
        .collect();

    let executed = outcomes
        .iter()
        .filter(|o| matches!(o, AutoReserveOutcome::Executed { .. }))
        .count();
    assert_eq!(executed, 1, "exactly one trigger may perform the batch");

    let active = mgr
        .reservations_for(slot.id)
        .await
        .iter()
        .filter(|r| r.active)
        .count();
    assert_eq!(active, 1);
    assert!(mgr.get_slot(slot.id).await.unwrap().auto_reserve_executed);
}
