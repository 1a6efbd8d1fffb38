//! Monthly checkpoint creation on rollover and checkpoint-resumed walks.

use std::sync::Arc;
use std::time::Duration;

use tideline::clock::ManualClock;
use tideline::engine::{author_root, checkpoint_key, Chain, Draft, FeedEngine};
use tideline::id::Id;
use tideline::lock::KeyLocks;
use tideline::store::MemStore;
use tideline::task::InlineDispatcher;

const BUDGET: Duration = Duration::from_secs(5);

const JAN: i64 = 1_610_668_800; // 2021-01-15
const FEB: i64 = 1_612_915_200; // 2021-02-10
const MAR: i64 = 1_614_902_400; // 2021-03-05

fn engine_at(now: i64) -> (Arc<FeedEngine<MemStore>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let engine = FeedEngine::with_parts(
        MemStore::new(),
        clock.clone(),
        Arc::new(InlineDispatcher),
        KeyLocks::default(),
    );
    (engine, clock)
}

#[test]
fn rollover_checkpoints_the_superseded_head() {
    let (engine, clock) = engine_at(JAN);
    engine.post(Draft::new("alice", "jan-1")).unwrap();
    clock.advance(3600);
    let jan_head = engine.post(Draft::new("alice", "jan-2")).unwrap();

    // Nothing yet: no rollover has happened.
    assert!(engine.find_checkpoint("alice", 2021, 1).unwrap().is_none());

    clock.set(FEB);
    engine.post(Draft::new("alice", "feb-1")).unwrap();

    let ck = engine.find_checkpoint("alice", 2021, 1).unwrap().unwrap();
    assert_eq!(ck.id, checkpoint_key("alice", 2021, 1));
    assert_eq!(ck.refer_id, jan_head.id);
    assert_eq!(
        engine.resume_from_checkpoint("alice", 2021, 1).unwrap(),
        Some(Id::parse(&jan_head.id))
    );
}

#[test]
fn checkpoint_walk_matches_the_full_walk_suffix() {
    let (engine, clock) = engine_at(JAN);
    for i in 0..3 {
        engine.post(Draft::new("alice", format!("jan-{i}"))).unwrap();
        clock.advance(60);
    }
    clock.set(FEB);
    for i in 0..2 {
        engine.post(Draft::new("alice", format!("feb-{i}"))).unwrap();
        clock.advance(60);
    }

    let (full, _) = engine
        .walk_root(&author_root("alice"), Chain::Timeline, 100, BUDGET)
        .unwrap();
    assert_eq!(full.len(), 5);

    let ck = engine.find_checkpoint("alice", 2021, 1).unwrap().unwrap();
    let (from_ck, _) = engine.walk(Chain::Timeline, &ck.refer_id, 100, BUDGET);
    assert_eq!(from_ck, full[2..].to_vec());
}

#[test]
fn same_month_posts_never_checkpoint() {
    let (engine, clock) = engine_at(FEB);
    for i in 0..4 {
        engine.post(Draft::new("alice", format!("feb-{i}"))).unwrap();
        clock.advance(3600);
    }
    assert!(engine.find_checkpoint("alice", 2021, 2).unwrap().is_none());
}

#[test]
fn each_rollover_gets_its_own_month() {
    let (engine, clock) = engine_at(JAN);
    let jan = engine.post(Draft::new("alice", "jan")).unwrap();
    clock.set(FEB);
    let feb = engine.post(Draft::new("alice", "feb")).unwrap();
    clock.set(MAR);
    engine.post(Draft::new("alice", "mar")).unwrap();

    let jan_ck = engine.find_checkpoint("alice", 2021, 1).unwrap().unwrap();
    let feb_ck = engine.find_checkpoint("alice", 2021, 2).unwrap().unwrap();
    assert_eq!(jan_ck.refer_id, jan.id);
    assert_eq!(feb_ck.refer_id, feb.id);
    assert!(engine.find_checkpoint("alice", 2021, 3).unwrap().is_none());
}

#[test]
fn missing_checkpoints_resume_to_nothing() {
    let (engine, _) = engine_at(JAN);
    engine.post(Draft::new("alice", "only")).unwrap();
    assert_eq!(engine.resume_from_checkpoint("alice", 2020, 12).unwrap(), None);
}
