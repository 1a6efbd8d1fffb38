//! Full publish-to-read scenarios across several users and feeds.

use std::sync::Arc;
use std::time::Duration;

use tideline::clock::ManualClock;
use tideline::engine::{
    announce_root, author_root, inbox_root, tag_root, Actor, Chain, Draft, FeedEngine,
};
use tideline::entry::{Cmd, ReplyLock};
use tideline::error::FeedError;
use tideline::id::Id;
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

fn contents(entries: &[tideline::Entry]) -> Vec<&str> {
    entries.iter().map(|e| e.content.as_str()).collect()
}

#[test]
fn two_users_one_thread_one_home_feed() {
    let (engine, clock) = engine_at(1_600_000_000);

    let p1 = engine.post(Draft::new("alice", "p1")).unwrap();
    clock.advance(1);
    engine.post(Draft::new("alice", "p2")).unwrap();
    clock.advance(1);
    engine.post(Draft::new("bob", "q1")).unwrap();
    clock.advance(1);
    engine.post(Draft::new("alice", "p3")).unwrap();
    clock.advance(1);
    engine.post(Draft::new("bob", "q2")).unwrap();
    clock.advance(1);
    let reply = engine.post_reply(Draft::reply("bob", "r1", &p1.id)).unwrap();

    // The reply threads under p1 and sits in bob's own timeline.
    let (thread, _) = engine.walk_replies(&p1.id, 10, BUDGET).unwrap();
    assert_eq!(contents(&thread), ["r1"]);
    let (bob_tl, _) = engine
        .walk_root(&author_root("bob"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert_eq!(contents(&bob_tl), ["r1", "q2", "q1"]);

    // Alice was notified.
    let (inbox, _) = engine
        .walk_root(&inbox_root("alice"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].cmd, Cmd::InboxReply);
    assert_eq!(inbox[0].extras.get("from").map(String::as_str), Some("bob"));
    assert_eq!(inbox[0].extras.get("about"), Some(&reply.id));

    // Home feed: newest first across both users. p1 itself is elided
    // because its thread already surfaced through the reply.
    let cursors = [
        Id::parse(&author_root("alice")),
        Id::parse(&author_root("bob")),
    ];
    let (home, _) = engine.walk_multi(&cursors, 10, false, BUDGET);
    assert_eq!(contents(&home), ["r1", "q2", "p3", "q1", "p2"]);
}

#[test]
fn announce_feed_resolves_copies_to_content() {
    let (engine, clock) = engine_at(1_600_000_000);
    let a = engine.post(Draft::new("alice", "hello")).unwrap();
    clock.advance(1);
    let b = engine.post(Draft::new("bob", "world")).unwrap();
    clock.advance(1);
    // Replies never reach the announce feed.
    engine.post_reply(Draft::reply("carol", "psst", &a.id)).unwrap();

    let (feed, _) = engine
        .walk_root(&announce_root(), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert_eq!(contents(&feed), ["world", "hello"]);
    assert_eq!(feed[0].id, b.id);
    assert_eq!(feed[1].id, a.id);
}

#[test]
fn tag_feeds_carry_the_tagged_posts() {
    let (engine, clock) = engine_at(1_600_000_000);
    engine
        .post(Draft {
            tags: vec!["rust".into()],
            ..Draft::new("alice", "tagged")
        })
        .unwrap();
    clock.advance(1);
    engine.post(Draft::new("alice", "untagged")).unwrap();

    let (feed, _) = engine
        .walk_root(&tag_root("rust"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert_eq!(contents(&feed), ["tagged"]);
}

#[test]
fn mentions_reach_the_named_inboxes() {
    let (engine, _) = engine_at(1_600_000_000);
    let post = engine
        .post(Draft {
            mentions: vec!["bob".into(), "alice".into()],
            ..Draft::new("alice", "hey @bob")
        })
        .unwrap();

    let (bob_inbox, _) = engine
        .walk_root(&inbox_root("bob"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert_eq!(bob_inbox.len(), 1);
    assert_eq!(bob_inbox[0].cmd, Cmd::InboxMention);
    assert_eq!(bob_inbox[0].extras.get("about"), Some(&post.id));

    // Self-mentions are dropped.
    let (alice_inbox, _) = engine
        .walk_root(&inbox_root("alice"), Chain::Timeline, 10, BUDGET)
        .unwrap();
    assert!(alice_inbox.is_empty());
}

#[test]
fn reply_locks_gate_strangers() {
    let (engine, clock) = engine_at(1_600_000_000);
    let post = engine
        .post(Draft {
            reply_lock: ReplyLock::FollowedOnly,
            ..Draft::new("alice", "close friends only")
        })
        .unwrap();
    clock.advance(1);

    assert!(matches!(
        engine.post_reply(Draft::reply("bob", "hi", &post.id)),
        Err(FeedError::LockedParent)
    ));

    engine.follow("alice", "bob", true).unwrap();
    engine.post_reply(Draft::reply("bob", "hi again", &post.id)).unwrap();

    // The author always may reply, even under Nobody.
    engine
        .set_reply_lock(Actor::user("alice"), &post.id, ReplyLock::Nobody)
        .unwrap();
    assert!(matches!(
        engine.post_reply(Draft::reply("bob", "third", &post.id)),
        Err(FeedError::LockedParent)
    ));
    engine.post_reply(Draft::reply("alice", "mine", &post.id)).unwrap();
}

#[test]
fn blocked_users_cannot_reply() {
    let (engine, _) = engine_at(1_600_000_000);
    let post = engine.post(Draft::new("alice", "open")).unwrap();
    engine.block("alice", "troll", true).unwrap();
    assert!(matches!(
        engine.post_reply(Draft::reply("troll", "bait", &post.id)),
        Err(FeedError::Blocked)
    ));
}

#[test]
fn only_the_author_or_a_moderator_deletes() {
    let (engine, _) = engine_at(1_600_000_000);
    let post = engine.post(Draft::new("alice", "mine")).unwrap();

    assert!(matches!(
        engine.delete(Actor::user("bob"), &post.id),
        Err(FeedError::PermissionDenied)
    ));
    assert!(matches!(
        engine.set_nsfw(Actor::user("bob"), &post.id, true),
        Err(FeedError::PermissionDenied)
    ));

    let flagged = engine.set_nsfw(Actor::user("alice"), &post.id, true).unwrap();
    assert!(flagged.nsfw);
    assert!(flagged.history.contains("alice:nsfw=true"));

    // Moderators act on entries they do not own, leaving an audit trail.
    let gone = engine.delete(Actor::moderator("mod"), &post.id).unwrap();
    assert!(gone.is_deleted());
    assert!(gone.history.contains("mod:delete"));
}

#[test]
fn deleting_a_reply_decrements_the_advisory_count() {
    let (engine, clock) = engine_at(1_600_000_000);
    let post = engine.post(Draft::new("alice", "root")).unwrap();
    clock.advance(1);
    let reply = engine.post_reply(Draft::reply("bob", "r", &post.id)).unwrap();
    assert_eq!(engine.get_entry_raw(&post.id).unwrap().replies, 1);

    engine.delete(Actor::user("bob"), &reply.id).unwrap();
    assert_eq!(engine.get_entry_raw(&post.id).unwrap().replies, 0);
}

#[test]
fn thread_addresses_nest_by_prefix() {
    let (engine, clock) = engine_at(1_600_000_000);
    let post = engine.post(Draft::new("alice", "root")).unwrap();
    clock.advance(1);
    let reply = engine.post_reply(Draft::reply("bob", "r", &post.id)).unwrap();
    clock.advance(1);
    let nested = engine
        .post_reply(Draft::reply("carol", "rr", &reply.id))
        .unwrap();

    let post_id = Id::parse(&post.id);
    let reply_addr = Id::parse(reply.extras.get("thread").unwrap());
    let nested_addr = Id::parse(nested.extras.get("thread").unwrap());
    assert!(reply_addr.is_descendant_of(&post_id));
    assert!(nested_addr.is_descendant_of(&reply_addr));
    assert!(nested_addr.is_descendant_of(&post_id));
}
