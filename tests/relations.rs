//! Relationship sets: follow/follower mirroring, blocks, likes and
//! bucket-cursor enumeration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tideline::clock::ManualClock;
use tideline::engine::{inbox_root, Actor, Chain, Draft, FeedEngine, RelationKind};
use tideline::entry::Cmd;
use tideline::error::FeedError;
use tideline::lock::KeyLocks;
use tideline::store::MemStore;
use tideline::task::InlineDispatcher;

const BUDGET: Duration = Duration::from_secs(5);

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
fn follow_mirrors_the_follower_edge() {
    let (engine, _) = engine_at(1_600_000_000);
    assert!(engine.follow("alice", "bob", true).unwrap());

    assert!(engine.is_active(RelationKind::Follow, "alice", "bob"));
    assert!(engine.is_active(RelationKind::Follower, "bob", "alice"));
    assert!(!engine.is_active(RelationKind::Follow, "bob", "alice"));

    // Bob's inbox got the notice.
    let (inbox, _) = engine
        .walk_root(&inbox_root("bob"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].cmd, Cmd::Follow);
    assert_eq!(inbox[0].extras.get("from").map(String::as_str), Some("alice"));
}

#[test]
fn repeated_writes_are_not_changes() {
    let (engine, clock) = engine_at(1_600_000_000);
    assert!(engine.follow("alice", "bob", true).unwrap());
    assert!(!engine.follow("alice", "bob", true).unwrap());

    clock.advance(10);
    assert!(engine.follow("alice", "bob", false).unwrap());
    assert!(!engine.follow("alice", "bob", false).unwrap());

    // Inactive state is kept, not erased.
    let state = engine
        .state_of(RelationKind::Follow, "alice", "bob")
        .unwrap()
        .unwrap();
    assert!(!state.active);
    assert_eq!(state.since, 1_600_000_010);
}

#[test]
fn self_edges_are_rejected() {
    let (engine, _) = engine_at(1_600_000_000);
    assert!(matches!(
        engine.follow("alice", "alice", true),
        Err(FeedError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.block("alice", "alice", true),
        Err(FeedError::InvalidArgument(_))
    ));
}

#[test]
fn block_severs_and_prevents_follows() {
    let (engine, _) = engine_at(1_600_000_000);
    assert!(engine.follow("alice", "bob", true).unwrap());
    assert!(engine.block("bob", "alice", true).unwrap());

    assert!(!engine.is_active(RelationKind::Follow, "alice", "bob"));
    assert!(!engine.is_active(RelationKind::Follower, "bob", "alice"));
    assert!(matches!(
        engine.follow("alice", "bob", true),
        Err(FeedError::Blocked)
    ));

    // Lifting the block allows following again.
    assert!(engine.block("bob", "alice", false).unwrap());
    assert!(engine.follow("alice", "bob", true).unwrap());
}

#[test]
fn enumeration_pages_cover_the_whole_set() {
    let (engine, clock) = engine_at(1_600_000_000);
    let targets: Vec<String> = (0..40).map(|i| format!("user{i:02}")).collect();
    for t in &targets {
        assert!(engine.set_state(RelationKind::Follow, "alice", t, true).unwrap());
        clock.advance(1);
    }

    // One big page: everything, most recent first.
    let (all, cursor) = engine
        .enumerate(RelationKind::Follow, "alice", "", 1000, BUDGET)
        .unwrap();
    assert!(cursor.is_empty());
    assert_eq!(all.len(), targets.len());
    assert!(all.windows(2).all(|w| w[0].since >= w[1].since));
    assert_eq!(all[0].id, "user39");

    // Small pages with cursor resumption cover the same set exactly once.
    let mut seen = BTreeSet::new();
    let mut cursor = String::new();
    loop {
        let (page, next) = engine
            .enumerate(RelationKind::Follow, "alice", &cursor, 8, BUDGET)
            .unwrap();
        for state in page {
            assert!(seen.insert(state.id), "duplicate across pages");
        }
        if next.is_empty() {
            break;
        }
        cursor = next;
    }
    let expected: BTreeSet<String> = targets.into_iter().collect();
    assert_eq!(seen, expected);
}

#[test]
fn enumerating_an_empty_set_is_empty() {
    let (engine, _) = engine_at(1_600_000_000);
    let (page, cursor) = engine
        .enumerate(RelationKind::Follow, "nobody", "", 10, BUDGET)
        .unwrap();
    assert!(page.is_empty());
    assert!(cursor.is_empty());
}

#[test]
fn likes_drive_counter_and_inbox_notice() {
    let (engine, clock) = engine_at(1_600_000_000);
    let post = engine.post(Draft::new("alice", "hello")).unwrap();
    clock.advance(1);
    // Only likes from someone the author follows produce a notice.
    engine.follow("alice", "bob", true).unwrap();

    assert!(engine.like("bob", &post.id, true).unwrap());
    assert!(!engine.like("bob", &post.id, true).unwrap());
    assert_eq!(engine.get_entry_raw(&post.id).unwrap().likes, 1);
    assert!(engine.is_active(RelationKind::Like, "bob", &post.id));

    let (inbox, _) = engine
        .walk_root(&inbox_root("alice"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].cmd, Cmd::InboxLike);
    assert_eq!(inbox[0].extras.get("about"), Some(&post.id));

    assert!(engine.like("bob", &post.id, false).unwrap());
    assert_eq!(engine.get_entry_raw(&post.id).unwrap().likes, 0);
}

#[test]
fn likes_from_strangers_stay_out_of_the_inbox() {
    let (engine, _) = engine_at(1_600_000_000);
    let post = engine.post(Draft::new("alice", "hello")).unwrap();

    assert!(engine.like("stranger", &post.id, true).unwrap());
    assert_eq!(engine.get_entry_raw(&post.id).unwrap().likes, 1);

    let (inbox, _) = engine
        .walk_root(&inbox_root("alice"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert!(inbox.is_empty());
}

#[test]
fn liking_a_deleted_entry_fails() {
    let (engine, _) = engine_at(1_600_000_000);
    let post = engine.post(Draft::new("alice", "hello")).unwrap();
    engine.delete(Actor::user("alice"), &post.id).unwrap();
    assert!(matches!(
        engine.like("bob", &post.id, true),
        Err(FeedError::NotFound)
    ));
}
