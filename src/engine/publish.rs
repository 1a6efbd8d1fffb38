//! The publish layer: user-facing mutations composed from engine inserts.
//!
//! Each operation performs exactly one synchronous critical section per root
//! it touches, sequentially, never nested. Everything that targets a root
//! other than the caller's — inbox notices, announce and tag copies, reverse
//! relationship edges, advisory counters — is dispatched as a fire-and-forget
//! background job after the primary write has committed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::entry::{Cmd, Entry, ReplyLock};
use crate::error::{FeedError, Result};
use crate::id::{Id, IdKind};
use crate::store::KvStore;

use super::{FeedEngine, InsertRequest, RelationKind};

/// Namespace of the site-wide announce root.
const ANNOUNCE_NS: &str = "master";

/// Who is performing a moderation action. Moderator status is asserted by
/// the embedder; the engine has no user records to consult.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    /// Acting user.
    pub name: &'a str,
    /// Moderators may act on entries they do not own.
    pub moderator: bool,
}

impl<'a> Actor<'a> {
    /// An ordinary user.
    pub fn user(name: &'a str) -> Actor<'a> {
        Actor {
            name,
            moderator: false,
        }
    }

    /// A moderator.
    pub fn moderator(name: &'a str) -> Actor<'a> {
        Actor {
            name,
            moderator: true,
        }
    }

    fn may_edit(&self, entry: &Entry) -> bool {
        self.moderator || self.name == entry.author
    }
}

/// A post or reply before publication. Tag and mention extraction belongs to
/// the caller; the engine only fans out what the draft names.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    /// Publishing user.
    pub author: String,
    /// Body text.
    pub content: String,
    /// Attached media reference; empty when none.
    pub media: String,
    /// Id of the entry being replied to; empty for a top-level post.
    pub parent: String,
    /// Marked not-safe-for-work.
    pub nsfw: bool,
    /// Who may reply.
    pub reply_lock: ReplyLock,
    /// Pin this entry on the author's timeline root.
    pub stick_on_top: bool,
    /// Skip the announce-feed copy.
    pub no_announce: bool,
    /// Tag feeds to copy into.
    pub tags: Vec<String>,
    /// Users to notify with a mention notice.
    pub mentions: Vec<String>,
}

impl Draft {
    /// A plain top-level draft.
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Draft {
        Draft {
            author: author.into(),
            content: content.into(),
            ..Draft::default()
        }
    }

    /// A reply draft targeting `parent`.
    pub fn reply(
        author: impl Into<String>,
        content: impl Into<String>,
        parent: impl Into<String>,
    ) -> Draft {
        Draft {
            parent: parent.into(),
            ..Draft::new(author, content)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.author.is_empty() {
            return Err(FeedError::InvalidArgument("draft without author".into()));
        }
        if self.content.is_empty() && self.media.is_empty() {
            return Err(FeedError::InvalidArgument("draft without content".into()));
        }
        Ok(())
    }

    fn into_entry(self) -> Entry {
        Entry {
            author: self.author,
            content: self.content,
            media: self.media,
            parent: self.parent,
            nsfw: self.nsfw,
            reply_lock: self.reply_lock,
            stick_on_top: self.stick_on_top,
            ..Entry::default()
        }
    }
}

/// Root key of a user's timeline.
pub fn author_root(user: &str) -> String {
    Id::new(IdKind::Author, user).to_string()
}

/// Root key of a user's inbox.
pub fn inbox_root(user: &str) -> String {
    Id::new(IdKind::Inbox, user).to_string()
}

/// Root key of a tag feed.
pub fn tag_root(tag: &str) -> String {
    Id::new(IdKind::Tag, tag).to_string()
}

/// Root key of the site-wide announce feed.
pub fn announce_root() -> String {
    Id::new(IdKind::Announce, ANNOUNCE_NS).to_string()
}

impl<S: KvStore> FeedEngine<S> {
    /// Publishes a top-level post onto the author's timeline.
    ///
    /// Announce and tag-feed copies and mention notices run in the
    /// background; the returned entry is already durable and linked.
    pub fn post(self: &Arc<Self>, draft: Draft) -> Result<Entry> {
        draft.validate()?;
        if !draft.parent.is_empty() {
            return Err(FeedError::InvalidArgument(
                "top-level post with a parent".into(),
            ));
        }

        let no_announce = draft.no_announce;
        let tags = draft.tags.clone();
        let mentions = draft.mentions.clone();
        let root = author_root(&draft.author);
        let (entry, _) = self.insert(InsertRequest::post(root, draft.into_entry()))?;
        info!(id = %entry.id, author = %entry.author, "post published");

        self.fan_out(&entry, no_announce, tags, mentions);
        Ok(entry)
    }

    /// Publishes a reply under `draft.parent`.
    ///
    /// The reply is first spliced into the parent's thread chain, then into
    /// the author's own timeline; each splice is its own critical section.
    /// Reply-lock and block checks happen before any write.
    pub fn post_reply(self: &Arc<Self>, draft: Draft) -> Result<Entry> {
        draft.validate()?;
        if draft.parent.is_empty() {
            return Err(FeedError::InvalidArgument("reply without parent".into()));
        }

        let parent = self.get_entry_raw(&draft.parent)?;
        if parent.is_deleted() {
            return Err(FeedError::NotFound);
        }
        self.check_reply_allowed(&parent, &draft.author)?;

        let no_announce = draft.no_announce;
        let tags = draft.tags.clone();
        let mentions = draft.mentions.clone();
        let author = draft.author.clone();

        let (entry, _) = self.insert(InsertRequest::reply(parent.id.clone(), draft.into_entry()))?;
        // Second splice reuses the stored entry so both chains point at one
        // record.
        let (entry, _) = self.insert(InsertRequest::post(author_root(&author), entry))?;
        info!(id = %entry.id, author = %author, parent = %parent.id, "reply published");

        if parent.author != author && !parent.author.is_empty() {
            self.notify(&parent.author, Cmd::InboxReply, &author, &entry.id);
        }
        self.fan_out(&entry, no_announce, tags, mentions);
        Ok(entry)
    }

    fn check_reply_allowed(&self, parent: &Entry, replier: &str) -> Result<()> {
        if parent.author == replier {
            return Ok(());
        }
        if self.is_active(RelationKind::Block, &parent.author, replier) {
            return Err(FeedError::Blocked);
        }
        match parent.reply_lock {
            ReplyLock::Anyone => Ok(()),
            ReplyLock::Nobody => Err(FeedError::LockedParent),
            ReplyLock::FollowedOnly => {
                if self.is_active(RelationKind::Follow, &parent.author, replier) {
                    Ok(())
                } else {
                    Err(FeedError::LockedParent)
                }
            }
        }
    }

    fn fan_out(
        self: &Arc<Self>,
        entry: &Entry,
        no_announce: bool,
        tags: Vec<String>,
        mentions: Vec<String>,
    ) {
        let announce = !no_announce && entry.parent.is_empty();
        if !announce && tags.is_empty() && mentions.is_empty() {
            return;
        }
        let engine = Arc::clone(self);
        let id = entry.id.clone();
        let author = entry.author.clone();
        let create_time = entry.create_time;
        self.dispatch(Box::new(move || {
            if announce {
                engine.copy_into(&announce_root(), &id, create_time);
            }
            for tag in &tags {
                engine.copy_into(&tag_root(tag), &id, create_time);
            }
            for user in &mentions {
                if user != &author {
                    engine.notify_now(user, Cmd::InboxMention, &author, &id);
                }
            }
        }));
    }

    /// Pushes a refer stub for `target` onto `root`: the stub keeps its own
    /// chain position while reads resolve to the real content.
    fn copy_into(&self, root: &str, target: &str, create_time: i64) {
        let stub = Entry {
            refer_id: target.to_owned(),
            create_time,
            ..Entry::default()
        };
        if let Err(e) = self.insert(InsertRequest::post(root, stub)) {
            warn!(root, target, "feed copy not inserted: {e}");
        }
    }

    /// Schedules an inbox notice in the background.
    fn notify(self: &Arc<Self>, recipient: &str, cmd: Cmd, from: &str, about: &str) {
        let engine = Arc::clone(self);
        let recipient = recipient.to_owned();
        let from = from.to_owned();
        let about = about.to_owned();
        self.dispatch(Box::new(move || {
            engine.notify_now(&recipient, cmd, &from, &about);
        }));
    }

    // Notices carry their target in extras instead of `refer_id` so walks
    // surface the notice itself rather than resolving it away.
    fn notify_now(&self, recipient: &str, cmd: Cmd, from: &str, about: &str) {
        let notice = Entry {
            cmd,
            extras: Self::extras_map(&[("from", from), ("about", about)]),
            ..Entry::default()
        };
        if let Err(e) = self.insert(InsertRequest::post(inbox_root(recipient), notice)) {
            warn!(recipient, from, "inbox notice not inserted: {e}");
        }
    }

    /// Tombstones an entry. Only its author or a moderator may delete it;
    /// the record stays linked and every walk filters it from now on. The
    /// parent's advisory reply count is decremented in the background.
    pub fn delete(self: &Arc<Self>, actor: Actor<'_>, id: &str) -> Result<Entry> {
        let now = self.now();
        let mut parent = String::new();
        let entry = self.update_entry(id, |entry| {
            if !actor.may_edit(entry) {
                return Err(FeedError::PermissionDenied);
            }
            parent = entry.parent.clone();
            entry.tombstone();
            entry.history.push_str(&format!("{}:delete:{now};", actor.name));
            Ok(())
        })?;
        info!(id, operator = actor.name, "entry deleted");
        self.neighbors.remove(id);

        if !parent.is_empty() {
            let engine = Arc::clone(self);
            self.dispatch(Box::new(move || {
                let r = engine.update_entry(&parent, |p| {
                    p.replies = p.replies.saturating_sub(1);
                    Ok(())
                });
                if let Err(e) = r {
                    debug!("reply count not decremented: {e}");
                }
            }));
        }
        Ok(entry)
    }

    /// Flips the not-safe-for-work flag, recording the action in the entry's
    /// moderation history.
    pub fn set_nsfw(&self, actor: Actor<'_>, id: &str, nsfw: bool) -> Result<Entry> {
        let now = self.now();
        self.update_entry(id, |entry| {
            if !actor.may_edit(entry) {
                return Err(FeedError::PermissionDenied);
            }
            entry.nsfw = nsfw;
            entry
                .history
                .push_str(&format!("{}:nsfw={nsfw}:{now};", actor.name));
            Ok(())
        })
    }

    /// Changes who may reply to an entry. Existing replies stay linked.
    pub fn set_reply_lock(&self, actor: Actor<'_>, id: &str, lock: ReplyLock) -> Result<Entry> {
        let now = self.now();
        self.update_entry(id, |entry| {
            if !actor.may_edit(entry) {
                return Err(FeedError::PermissionDenied);
            }
            entry.reply_lock = lock;
            entry
                .history
                .push_str(&format!("{}:lock={lock:?}:{now};", actor.name));
            Ok(())
        })
    }

    /// Sets `user`'s like state on `target`. Returns whether the state
    /// changed; the advisory like counter and the author's inbox notice
    /// follow in the background.
    pub fn like(self: &Arc<Self>, user: &str, target: &str, active: bool) -> Result<bool> {
        let liked = self.get_entry_raw(target)?;
        if liked.is_deleted() {
            return Err(FeedError::NotFound);
        }
        let changed = self.set_state(RelationKind::Like, user, target, active)?;
        if !changed {
            return Ok(false);
        }

        let engine = Arc::clone(self);
        let target = target.to_owned();
        let user = user.to_owned();
        let author = liked.author.clone();
        self.dispatch(Box::new(move || {
            let r = engine.update_entry(&target, |e| {
                e.likes = if active {
                    e.likes.saturating_add(1)
                } else {
                    e.likes.saturating_sub(1)
                };
                Ok(())
            });
            if let Err(e) = r {
                debug!(target, "like count not updated: {e}");
            }
            // Only likes from people the author follows reach the inbox;
            // anything else would be a spam channel.
            if active
                && !author.is_empty()
                && author != user
                && engine.is_active(RelationKind::Follow, &author, &user)
            {
                engine.notify_now(&author, Cmd::InboxLike, &user, &target);
            }
        }));
        Ok(true)
    }

    /// Sets `subject`'s follow state on `target`. The reverse follower edge
    /// and the notice land in the background; the two sets may disagree
    /// briefly, never permanently under a live dispatcher.
    pub fn follow(self: &Arc<Self>, subject: &str, target: &str, active: bool) -> Result<bool> {
        if subject == target {
            return Err(FeedError::InvalidArgument("self-follow".into()));
        }
        if active && self.is_active(RelationKind::Block, target, subject) {
            return Err(FeedError::Blocked);
        }
        let changed = self.set_state(RelationKind::Follow, subject, target, active)?;
        if !changed {
            return Ok(false);
        }

        let engine = Arc::clone(self);
        let subject = subject.to_owned();
        let target = target.to_owned();
        self.dispatch(Box::new(move || {
            if let Err(e) = engine.set_state(RelationKind::Follower, &target, &subject, active) {
                warn!(subject, target, "follower edge not mirrored: {e}");
            }
            if active {
                engine.notify_now(&target, Cmd::Follow, &subject, "");
            }
        }));
        Ok(true)
    }

    /// Sets `subject`'s block state on `target`. An active block severs the
    /// target's follow edge onto the subject in the background.
    pub fn block(self: &Arc<Self>, subject: &str, target: &str, active: bool) -> Result<bool> {
        if subject == target {
            return Err(FeedError::InvalidArgument("self-block".into()));
        }
        let changed = self.set_state(RelationKind::Block, subject, target, active)?;
        if !(changed && active) {
            return Ok(changed);
        }

        let engine = Arc::clone(self);
        let subject = subject.to_owned();
        let target = target.to_owned();
        self.dispatch(Box::new(move || {
            if let Err(e) = engine.set_state(RelationKind::Follow, &target, &subject, false) {
                warn!(subject, target, "follow edge not severed: {e}");
            }
            if let Err(e) = engine.set_state(RelationKind::Follower, &subject, &target, false) {
                warn!(subject, target, "follower edge not severed: {e}");
            }
        }));
        Ok(true)
    }
}
