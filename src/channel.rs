//! Channel membership entity model.
//!
//! [`ChannelCollection`] is the set of channels the local user currently
//! occupies, owned by exactly one session. Names are case-sensitive
//! identity with case-insensitive lookup under the RFC 1459 mapping;
//! integer indexing follows insertion order.
//!
//! [`IrcChannel`] operations (`invite`, `kick`, `part`, `send_message`,
//! `change_mode`, `set_topic`) are thin pass-throughs: they format one
//! outbound line and submit it through the owning session's queue without
//! waiting for server acknowledgment.
//!
//! A channel's member list is a live projection over the externally-owned
//! [`UserPool`], evaluated on each access — never a copied set.

use std::sync::Arc;

use crate::casemap::irc_eq;
use crate::error::{EngineError, Result};
use crate::queue::OutboundHandle;

/// Read-only view into the shared user pool.
///
/// The pool is an external collaborator: it owns user identity and the
/// membership relation, and is responsible for its own thread-safety.
pub trait UserPool: Send + Sync {
    /// Nicks currently in `channel`, per the pool's current state.
    fn members(&self, channel: &str) -> Vec<String>;

    /// Whether `nick` is currently in `channel`.
    fn is_member(&self, channel: &str, nick: &str) -> bool {
        self.members(channel).iter().any(|n| irc_eq(n, nick))
    }
}

/// A pool with no users. Placeholder for sessions that do not track
/// membership.
pub struct NullUserPool;

impl UserPool for NullUserPool {
    fn members(&self, _channel: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Per-channel mutable state bound to one session.
pub struct IrcChannel {
    name: String,
    topic: Option<String>,
    mode: Option<String>,
    outbound: OutboundHandle,
    pool: Arc<dyn UserPool>,
    message_prefix: Option<String>,
}

impl IrcChannel {
    fn new(
        name: String,
        outbound: OutboundHandle,
        pool: Arc<dyn UserPool>,
        message_prefix: Option<String>,
    ) -> Self {
        Self {
            name,
            topic: None,
            mode: None,
            outbound,
            pool,
            message_prefix,
        }
    }

    /// Channel name with its original casing.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current topic, if any has been set or reported.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Mode string as last reported by the server, if any.
    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    /// Members of this channel, queried live from the shared pool.
    pub fn users(&self) -> Vec<String> {
        self.pool.members(&self.name)
    }

    /// Whether `nick` is currently a member, per the shared pool.
    pub fn has_member(&self, nick: &str) -> bool {
        self.pool.is_member(&self.name, nick)
    }

    /// Change the topic: issues `TOPIC` and updates local state in the
    /// same call.
    ///
    /// The local value is optimistic and unconfirmed — the server's
    /// authoritative topic arrives later through normal dispatch (see
    /// [`update_topic`](Self::update_topic)) and may overwrite it.
    pub fn set_topic(&mut self, topic: impl Into<String>) -> Result<()> {
        let topic = topic.into();
        self.outbound
            .send_line(format!("TOPIC {} :{}", self.name, topic))?;
        self.topic = Some(topic);
        Ok(())
    }

    /// Record the server-reported topic. Local state only; nothing is
    /// sent. Handlers call this on TOPIC/RPL_TOPIC.
    pub fn update_topic(&mut self, topic: Option<String>) {
        self.topic = topic;
    }

    /// Record the server-reported mode string. Local state only.
    pub fn update_mode(&mut self, mode: Option<String>) {
        self.mode = mode;
    }

    /// Request a mode change. Local state is not touched; the server's
    /// MODE reply is authoritative.
    pub fn change_mode(&self, modes: &str) -> Result<()> {
        self.outbound.send_line(format!("MODE {} {}", self.name, modes))
    }

    /// Invite a user to this channel.
    pub fn invite(&self, nick: &str) -> Result<()> {
        self.outbound.send_line(format!("INVITE {} {}", nick, self.name))
    }

    /// Kick a user from this channel, with an optional reason.
    pub fn kick(&self, nick: &str, reason: Option<&str>) -> Result<()> {
        let line = match reason {
            Some(r) => format!("KICK {} {} :{}", self.name, nick, r),
            None => format!("KICK {} {}", self.name, nick),
        };
        self.outbound.send_line(line)
    }

    /// Leave this channel. The entry stays in the collection until a
    /// handler observes the server's PART and removes it.
    pub fn part(&self, reason: Option<&str>) -> Result<()> {
        let line = match reason {
            Some(r) => format!("PART {} :{}", self.name, r),
            None => format!("PART {}", self.name),
        };
        self.outbound.send_line(line)
    }

    /// Send a chat message to this channel, prepending the configured
    /// outbound message prefix when one is set.
    pub fn send_message(&self, text: &str) -> Result<()> {
        let line = match &self.message_prefix {
            Some(prefix) => format!("PRIVMSG {} :{}{}", self.name, prefix, text),
            None => format!("PRIVMSG {} :{}", self.name, text),
        };
        self.outbound.send_line(line)
    }
}

/// The set of channels one session occupies.
pub struct ChannelCollection {
    channels: Vec<IrcChannel>,
    outbound: OutboundHandle,
    pool: Arc<dyn UserPool>,
    message_prefix: Option<String>,
    local: bool,
}

impl ChannelCollection {
    pub(crate) fn new(
        outbound: OutboundHandle,
        pool: Arc<dyn UserPool>,
        message_prefix: Option<String>,
        local: bool,
    ) -> Self {
        Self {
            channels: Vec::new(),
            outbound,
            pool,
            message_prefix,
            local,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Case-insensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<&IrcChannel> {
        self.position(name).map(|i| &self.channels[i])
    }

    /// Case-insensitive mutable lookup by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut IrcChannel> {
        self.position(name).map(move |i| &mut self.channels[i])
    }

    /// Insertion-order lookup by position.
    pub fn by_index(&self, index: usize) -> Option<&IrcChannel> {
        self.channels.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IrcChannel> {
        self.channels.iter()
    }

    /// Register a new channel. Fails when a channel with the same
    /// (case-insensitive) name already exists; the collection is left
    /// unchanged.
    pub fn add(&mut self, name: &str) -> Result<&mut IrcChannel> {
        if self.contains(name) {
            return Err(EngineError::DuplicateChannel(name.to_string()));
        }
        let idx = self.push_new(name);
        Ok(&mut self.channels[idx])
    }

    /// Return the existing channel or construct, register, and return a
    /// new one bound to the owning session.
    pub fn get_or_add(&mut self, name: &str) -> &mut IrcChannel {
        let idx = match self.position(name) {
            Some(i) => i,
            None => self.push_new(name),
        };
        &mut self.channels[idx]
    }

    /// Drop a channel from the collection, returning it. Called by
    /// handlers when the local user parts or is removed.
    pub fn remove(&mut self, name: &str) -> Option<IrcChannel> {
        self.position(name).map(|i| self.channels.remove(i))
    }

    /// Issue a JOIN for `name` and register the channel locally.
    ///
    /// Only meaningful on the collection owned by the local session; any
    /// other instance fails with [`EngineError::ForeignCollection`].
    pub fn join(&mut self, name: &str) -> Result<&mut IrcChannel> {
        if !self.local {
            return Err(EngineError::ForeignCollection);
        }
        self.outbound.send_line(format!("JOIN {name}"))?;
        Ok(self.get_or_add(name))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| irc_eq(&c.name, name))
    }

    fn push_new(&mut self, name: &str) -> usize {
        self.channels.push(IrcChannel::new(
            name.to_string(),
            self.outbound.clone(),
            self.pool.clone(),
            self.message_prefix.clone(),
        ));
        self.channels.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;

    struct StaticPool(HashMap<String, HashSet<String>>);

    impl UserPool for StaticPool {
        fn members(&self, channel: &str) -> Vec<String> {
            self.0
                .get(channel)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default()
        }
    }

    fn attached_handle() -> OutboundHandle {
        let handle = OutboundHandle::new();
        handle.attach();
        handle
    }

    fn drain(handle: &OutboundHandle) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = handle.queue().try_begin() {
            lines.push(line);
            handle.queue().complete();
        }
        lines
    }

    fn local_collection(handle: &OutboundHandle) -> ChannelCollection {
        ChannelCollection::new(handle.clone(), Arc::new(NullUserPool), None, true)
    }

    #[test]
    fn test_get_or_add_idempotent() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);

        let first = channels.get_or_add("#rust") as *const IrcChannel;
        let second = channels.get_or_add("#rust") as *const IrcChannel;

        assert_eq!(first, second);
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        channels.add("#Foo").unwrap();

        assert!(channels.contains("#foo"));
        let chan = channels.get("#foo").unwrap();
        // Identity keeps the original casing.
        assert_eq!(chan.name(), "#Foo");
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        channels.add("#dup").unwrap();

        match channels.add("#DUP") {
            Err(EngineError::DuplicateChannel(name)) => assert_eq!(name, "#DUP"),
            Err(other) => panic!("expected DuplicateChannel, got {other:?}"),
            Ok(_) => panic!("duplicate add succeeded"),
        }
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn test_index_is_insertion_order() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        channels.add("#one").unwrap();
        channels.add("#two").unwrap();

        assert_eq!(channels.by_index(0).unwrap().name(), "#one");
        assert_eq!(channels.by_index(1).unwrap().name(), "#two");
        assert!(channels.by_index(2).is_none());
    }

    #[test]
    fn test_join_emits_and_registers() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        channels.join("#rust").unwrap();

        assert!(channels.contains("#rust"));
        assert_eq!(drain(&handle), vec!["JOIN #rust"]);
    }

    #[test]
    fn test_join_fails_on_foreign_collection() {
        let handle = attached_handle();
        let mut channels =
            ChannelCollection::new(handle.clone(), Arc::new(NullUserPool), None, false);

        match channels.join("#rust") {
            Err(EngineError::ForeignCollection) => {}
            Err(other) => panic!("expected ForeignCollection, got {other:?}"),
            Ok(_) => panic!("join succeeded on a foreign collection"),
        }
        assert!(channels.is_empty());
    }

    #[test]
    fn test_set_topic_is_optimistic() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        let chan = channels.get_or_add("#rust");

        chan.set_topic("all things rustlang").unwrap();
        // Local state updated in the same call as the send; unconfirmed.
        assert_eq!(chan.topic(), Some("all things rustlang"));
        assert_eq!(drain(&handle), vec!["TOPIC #rust :all things rustlang"]);
    }

    #[test]
    fn test_authoritative_topic_overwrites_optimistic() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        let chan = channels.get_or_add("#rust");

        chan.set_topic("my guess").unwrap();
        chan.update_topic(Some("server says otherwise".to_string()));
        assert_eq!(chan.topic(), Some("server says otherwise"));
        // The authoritative update emits nothing.
        assert_eq!(drain(&handle).len(), 1);
    }

    #[test]
    fn test_channel_operations_format_lines() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        let chan = channels.get_or_add("#ops");

        chan.invite("friend").unwrap();
        chan.kick("troll", Some("spam")).unwrap();
        chan.change_mode("+m").unwrap();
        chan.send_message("hello").unwrap();
        chan.part(Some("bye")).unwrap();

        assert_eq!(
            drain(&handle),
            vec![
                "INVITE friend #ops",
                "KICK #ops troll :spam",
                "MODE #ops +m",
                "PRIVMSG #ops :hello",
                "PART #ops :bye",
            ]
        );
    }

    #[test]
    fn test_message_prefix_prepended() {
        let handle = attached_handle();
        let mut channels = ChannelCollection::new(
            handle.clone(),
            Arc::new(NullUserPool),
            Some("[bot] ".to_string()),
            true,
        );
        let chan = channels.get_or_add("#rust");
        chan.send_message("hi").unwrap();

        assert_eq!(drain(&handle), vec!["PRIVMSG #rust :[bot] hi"]);
    }

    #[test]
    fn test_membership_is_live_projection() {
        let members: HashSet<String> = ["alice".to_string(), "bob".to_string()].into();
        let pool = Arc::new(StaticPool(HashMap::from([("#rust".to_string(), members)])));

        let handle = attached_handle();
        let mut channels = ChannelCollection::new(handle.clone(), pool, None, true);
        let chan = channels.get_or_add("#rust");

        let mut users = chan.users();
        users.sort();
        assert_eq!(users, vec!["alice", "bob"]);
        assert!(chan.has_member("Alice"));
        assert!(!chan.has_member("mallory"));
    }

    #[test]
    fn test_remove_drops_channel() {
        let handle = attached_handle();
        let mut channels = local_collection(&handle);
        channels.add("#gone").unwrap();

        let removed = channels.remove("#GONE").unwrap();
        assert_eq!(removed.name(), "#gone");
        assert!(channels.is_empty());
    }
}
