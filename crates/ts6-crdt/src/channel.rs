//! CRDT wrapper for Channel state.
//!
//! This module provides `ChannelCrdt`, a CRDT-enabled wrapper around channel
//! state that supports distributed synchronization across linked servers.

use crate::clock::HybridTimestamp;
use crate::traits::{AwSet, Crdt, LwwRegister};
use std::collections::HashMap;

/// CRDT-enabled channel state for distributed synchronization.
///
/// Uses different CRDT strategies for different fields:
/// - **LWW (Last-Writer-Wins)**: topic, key, limit, modes
/// - **`AWSet` (Add-Wins Set)**: bans, invites, excepts
///
/// Channel membership uses a specialized `MembershipCrdt` that tracks
/// both presence and per-member modes (op, voice, etc.).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelCrdt {
    /// Channel name (normalized to lowercase).
    pub name: String,

    /// Channel topic.
    pub topic: LwwRegister<Option<TopicCrdt>>,

    /// Channel modes (each mode is independent).
    pub modes: ChannelModesCrdt,

    /// Channel key (+k password).
    pub key: LwwRegister<Option<String>>,

    /// User limit (+l).
    pub limit: LwwRegister<Option<u32>>,

    /// Channel members with their modes.
    pub members: MembershipCrdt,

    /// Ban list (+b).
    pub bans: AwSet<ListEntryCrdt>,

    /// Invite exceptions (+I).
    pub invites: AwSet<ListEntryCrdt>,

    /// Ban exceptions (+e).
    pub excepts: AwSet<ListEntryCrdt>,

    /// Timestamp the channel was created (the TS6 channel TS).
    pub created_at: HybridTimestamp,
}

/// CRDT-enabled topic with setter and timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
pub struct TopicCrdt {
    /// The topic text.
    pub text: String,
    /// Who set the topic.
    pub set_by: String,
    /// Unix timestamp when topic was set.
    pub set_at: i64,
}

/// A list entry (ban, invite, except) as a CRDT-compatible type.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
pub struct ListEntryCrdt {
    /// The ban/invite/except mask (e.g., *!*@host).
    pub mask: String,
    /// Who set the entry.
    pub set_by: String,
    /// Unix timestamp when entry was set.
    pub set_at: i64,
}

/// CRDT-enabled channel modes.
///
/// Each boolean mode is an independent LWW register.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelModesCrdt {
    /// +n: No external messages.
    pub no_external: LwwRegister<bool>,
    /// +t: Only ops can set topic.
    pub topic_ops_only: LwwRegister<bool>,
    /// +m: Moderated (only voiced users can speak).
    pub moderated: LwwRegister<bool>,
    /// +i: Invite-only.
    pub invite_only: LwwRegister<bool>,
    /// +s: Secret (not shown in LIST).
    pub secret: LwwRegister<bool>,
    /// +p: Private (not shown in WHOIS channel list).
    pub private: LwwRegister<bool>,
    /// +r: Registered users only.
    pub registered_only: LwwRegister<bool>,
    /// +c: No colors allowed.
    pub no_colors: LwwRegister<bool>,
    /// +C: No CTCP allowed.
    pub no_ctcp: LwwRegister<bool>,
    /// +z: TLS/SSL users only.
    pub ssl_only: LwwRegister<bool>,
}

impl ChannelModesCrdt {
    /// Create default channel modes (+nt, matching `ChannelActor::spawn_with_capacity`).
    #[must_use]
    pub fn new(timestamp: HybridTimestamp) -> Self {
        Self {
            no_external: LwwRegister::new(true, timestamp),
            topic_ops_only: LwwRegister::new(true, timestamp),
            moderated: LwwRegister::new(false, timestamp),
            invite_only: LwwRegister::new(false, timestamp),
            secret: LwwRegister::new(false, timestamp),
            private: LwwRegister::new(false, timestamp),
            registered_only: LwwRegister::new(false, timestamp),
            no_colors: LwwRegister::new(false, timestamp),
            no_ctcp: LwwRegister::new(false, timestamp),
            ssl_only: LwwRegister::new(false, timestamp),
        }
    }

    /// OR each flag together at the given timestamp (TS-equal merge rule:
    /// a mode set by either side of the burst applies).
    fn or_merge(&mut self, other: &Self, timestamp: HybridTimestamp) {
        macro_rules! or_field {
            ($f:ident) => {
                if *other.$f.value() && !*self.$f.value() {
                    self.$f = LwwRegister::new(true, timestamp);
                }
            };
        }
        or_field!(no_external);
        or_field!(topic_ops_only);
        or_field!(moderated);
        or_field!(invite_only);
        or_field!(secret);
        or_field!(private);
        or_field!(registered_only);
        or_field!(no_colors);
        or_field!(no_ctcp);
        or_field!(ssl_only);
    }
}

impl Crdt for ChannelModesCrdt {
    fn merge(&mut self, other: &Self) {
        self.no_external.merge(&other.no_external);
        self.topic_ops_only.merge(&other.topic_ops_only);
        self.moderated.merge(&other.moderated);
        self.invite_only.merge(&other.invite_only);
        self.secret.merge(&other.secret);
        self.private.merge(&other.private);
        self.registered_only.merge(&other.registered_only);
        self.no_colors.merge(&other.no_colors);
        self.no_ctcp.merge(&other.no_ctcp);
        self.ssl_only.merge(&other.ssl_only);
    }

    fn dominates(&self, other: &Self) -> bool {
        self.no_external.dominates(&other.no_external)
            && self.topic_ops_only.dominates(&other.topic_ops_only)
            && self.moderated.dominates(&other.moderated)
            && self.invite_only.dominates(&other.invite_only)
            && self.secret.dominates(&other.secret)
            && self.private.dominates(&other.private)
            && self.registered_only.dominates(&other.registered_only)
            && self.no_colors.dominates(&other.no_colors)
            && self.no_ctcp.dominates(&other.no_ctcp)
            && self.ssl_only.dominates(&other.ssl_only)
    }
}

/// CRDT for channel membership with per-member modes.
///
/// Presence uses `AWSet` semantics (JOIN adds, PART/KICK removes); each
/// present member additionally carries a `MemberModesCrdt`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MembershipCrdt {
    presence: AwSet<String>,
    modes: HashMap<String, MemberModesCrdt>,
}

/// Per-member modes (op, voice, etc.) as CRDT.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemberModesCrdt {
    /// Channel owner mode (+q).
    pub owner: LwwRegister<bool>,
    /// Channel admin mode (+a).
    pub admin: LwwRegister<bool>,
    /// Channel operator mode (+o).
    pub op: LwwRegister<bool>,
    /// Half-operator mode (+h).
    pub halfop: LwwRegister<bool>,
    /// Voice mode (+v).
    pub voice: LwwRegister<bool>,
    /// Unix timestamp when the user joined the channel.
    pub join_time: i64,
}

impl MemberModesCrdt {
    /// Create default member modes (no privileges).
    #[must_use]
    pub fn new(join_time: i64, timestamp: HybridTimestamp) -> Self {
        Self {
            owner: LwwRegister::new(false, timestamp),
            admin: LwwRegister::new(false, timestamp),
            op: LwwRegister::new(false, timestamp),
            halfop: LwwRegister::new(false, timestamp),
            voice: LwwRegister::new(false, timestamp),
            join_time,
        }
    }

    /// Strip every privilege flag to peon, unconditionally, at `timestamp`.
    ///
    /// Used on the losing side of SJOIN TS arbitration: incoming members
    /// from a channel that loses the timestamp comparison ride in as
    /// ordinary members regardless of the prefixes the burst carried.
    fn demote(&mut self, timestamp: HybridTimestamp) {
        self.owner = LwwRegister::new(false, timestamp);
        self.admin = LwwRegister::new(false, timestamp);
        self.op = LwwRegister::new(false, timestamp);
        self.halfop = LwwRegister::new(false, timestamp);
        self.voice = LwwRegister::new(false, timestamp);
    }
}

impl Crdt for MemberModesCrdt {
    fn merge(&mut self, other: &Self) {
        self.owner.merge(&other.owner);
        self.admin.merge(&other.admin);
        self.op.merge(&other.op);
        self.halfop.merge(&other.halfop);
        self.voice.merge(&other.voice);
        if other.join_time < self.join_time {
            self.join_time = other.join_time;
        }
    }

    fn dominates(&self, other: &Self) -> bool {
        self.owner.dominates(&other.owner)
            && self.admin.dominates(&other.admin)
            && self.op.dominates(&other.op)
            && self.halfop.dominates(&other.halfop)
            && self.voice.dominates(&other.voice)
    }
}

impl MembershipCrdt {
    /// Create an empty membership.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to the channel.
    pub fn join(&mut self, uid: String, timestamp: HybridTimestamp) {
        self.presence.add(uid.clone(), timestamp);
        let join_time = chrono::Utc::now().timestamp();
        self.modes
            .entry(uid)
            .or_insert_with(|| MemberModesCrdt::new(join_time, timestamp));
    }

    /// Remove a member from the channel.
    pub fn part(&mut self, uid: &str, timestamp: HybridTimestamp) {
        self.presence.remove(&uid.to_string(), timestamp);
        // Modes are kept around so a rejoin during the same burst restores them.
    }

    /// Check if a user is a member.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.presence.contains(&uid.to_string())
    }

    /// Get a member's modes.
    #[must_use]
    pub fn get_modes(&self, uid: &str) -> Option<&MemberModesCrdt> {
        if self.presence.contains(&uid.to_string()) {
            self.modes.get(uid)
        } else {
            None
        }
    }

    /// Get mutable member modes.
    pub fn get_modes_mut(&mut self, uid: &str) -> Option<&mut MemberModesCrdt> {
        if self.presence.contains(&uid.to_string()) {
            self.modes.get_mut(uid)
        } else {
            None
        }
    }

    /// Iterate over present members.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.presence.iter()
    }

    /// Number of present members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.presence.len()
    }

    /// `true` if the channel has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.presence.is_empty()
    }

    /// Strip privilege flags from every present member, unconditionally.
    fn demote_all(&mut self, timestamp: HybridTimestamp) {
        for modes in self.modes.values_mut() {
            modes.demote(timestamp);
        }
    }
}

impl Crdt for MembershipCrdt {
    fn merge(&mut self, other: &Self) {
        self.presence.merge(&other.presence);

        for (uid, other_modes) in &other.modes {
            match self.modes.get_mut(uid) {
                Some(self_modes) => self_modes.merge(other_modes),
                None => {
                    self.modes.insert(uid.clone(), other_modes.clone());
                }
            }
        }
    }

    fn dominates(&self, other: &Self) -> bool {
        if !self.presence.dominates(&other.presence) {
            return false;
        }
        for (uid, other_modes) in &other.modes {
            match self.modes.get(uid) {
                Some(self_modes) if self_modes.dominates(other_modes) => {}
                _ => return false,
            }
        }
        true
    }
}

impl ChannelCrdt {
    /// Create a new channel.
    #[must_use]
    pub fn new(name: String, timestamp: HybridTimestamp) -> Self {
        Self {
            name,
            topic: LwwRegister::new(None, timestamp),
            modes: ChannelModesCrdt::new(timestamp),
            key: LwwRegister::new(None, timestamp),
            limit: LwwRegister::new(None, timestamp),
            members: MembershipCrdt::new(),
            bans: AwSet::new(),
            invites: AwSet::new(),
            excepts: AwSet::new(),
            created_at: timestamp,
        }
    }

    /// Set the channel topic.
    pub fn set_topic(&mut self, text: String, set_by: String, timestamp: HybridTimestamp) {
        let topic = TopicCrdt {
            text,
            set_by,
            set_at: chrono::Utc::now().timestamp(),
        };
        self.topic.update(Some(topic), timestamp);
    }

    /// Clear the channel topic.
    pub fn clear_topic(&mut self, timestamp: HybridTimestamp) {
        self.topic.update(None, timestamp);
    }

    /// Add a user to the channel.
    pub fn join(&mut self, uid: String, timestamp: HybridTimestamp) {
        self.members.join(uid, timestamp);
    }

    /// Remove a user from the channel.
    pub fn part(&mut self, uid: &str, timestamp: HybridTimestamp) {
        self.members.part(uid, timestamp);
    }

    /// Add a ban.
    pub fn add_ban(&mut self, mask: String, set_by: String, timestamp: HybridTimestamp) {
        let entry = ListEntryCrdt {
            mask,
            set_by,
            set_at: chrono::Utc::now().timestamp(),
        };
        self.bans.add(entry, timestamp);
    }

    /// Remove a ban.
    pub fn remove_ban(&mut self, mask: &str, timestamp: HybridTimestamp) {
        let to_remove: Vec<_> = self
            .bans
            .iter()
            .filter(|e| e.mask == mask)
            .cloned()
            .collect();
        for entry in to_remove {
            self.bans.remove(&entry, timestamp);
        }
    }

}

impl Crdt for ChannelCrdt {
    /// Merge another channel's burst state into this one.
    ///
    /// Implements ratbox/solanum SJOIN TS arbitration rather than a naive
    /// per-field LWW merge:
    ///
    /// - If one side's `created_at` is strictly older, it wins outright:
    ///   the newer side's mode lock, key, limit, and mask lists are
    ///   dropped, its existing members are demoted to peon, and the
    ///   channel TS collapses to the winner's.
    /// - A TS of zero is a standing merge exception (legacy/"special"
    ///   channel): it is never treated as older, so two TS-0 bursts (or a
    ///   TS-0 side merging with anything) always take the non-destructive
    ///   equal-TS path below.
    /// - Equal TS (or either side at TS 0) merges non-destructively: flag
    ///   modes OR together, key/limit/topic resolve via LWW, and mask
    ///   lists / membership union via their `AwSet`/per-member merges.
    fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.name, other.name);

        if self.created_at.millis == 0 || other.created_at.millis == 0 {
            self.merge_equal(other);
            return;
        }

        match self.created_at.millis.cmp(&other.created_at.millis) {
            std::cmp::Ordering::Less => {
                // We are older: we win. Absorb the other side's members as
                // peons; our own modes/lists/key/limit are untouched.
                let winning_ts = self.created_at;
                let mut incoming_members = other.members.clone();
                incoming_members.demote_all(winning_ts);
                self.members.merge(&incoming_members);
                self.topic.merge(&other.topic);
            }
            std::cmp::Ordering::Greater => {
                // We are newer: we lose. Collapse to the other side's
                // state, then union in our own members as peons.
                let losing_members = self.members.clone();
                let winning_ts = other.created_at;
                *self = other.clone();
                let mut demoted = losing_members;
                demoted.demote_all(winning_ts);
                self.members.merge(&demoted);
            }
            std::cmp::Ordering::Equal => self.merge_equal(other),
        }
    }

    fn dominates(&self, other: &Self) -> bool {
        self.topic.dominates(&other.topic)
            && self.modes.dominates(&other.modes)
            && self.key.dominates(&other.key)
            && self.limit.dominates(&other.limit)
            && self.members.dominates(&other.members)
            && self.bans.dominates(&other.bans)
            && self.invites.dominates(&other.invites)
            && self.excepts.dominates(&other.excepts)
    }
}

impl ChannelCrdt {
    /// Non-destructive merge path used for equal TS and the TS-0 exception:
    /// every field unions or OR-merges, nothing is dropped.
    fn merge_equal(&mut self, other: &Self) {
        let merge_ts = self.created_at.max(other.created_at);
        self.topic.merge(&other.topic);
        self.modes.or_merge(&other.modes, merge_ts);
        self.key.merge(&other.key);
        self.limit.merge(&other.limit);
        self.members.merge(&other.members);
        self.bans.merge(&other.bans);
        self.invites.merge(&other.invites);
        self.excepts.merge(&other.excepts);
        if other.created_at.millis == 0 {
            self.created_at = other.created_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ServerId;

    fn make_channel(name: &str, server: &ServerId, millis: i64) -> ChannelCrdt {
        let ts = HybridTimestamp::new(millis, 0, server);
        ChannelCrdt::new(name.to_string(), ts)
    }

    #[test]
    fn test_channel_crdt_new_defaults() {
        let server = ServerId::new("001");
        let chan = make_channel("#test", &server, 100);

        assert_eq!(chan.name, "#test");
        assert!(chan.topic.value().is_none());
        assert!(chan.members.is_empty());
        assert!(*chan.modes.no_external.value());
        assert!(*chan.modes.topic_ops_only.value());
    }

    #[test]
    fn test_equal_ts_merge_unions_members_and_ors_modes() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");
        let ts_create = HybridTimestamp::new(100, 0, &server1);

        let mut chan1 = ChannelCrdt::new("#test".to_string(), ts_create);
        chan1.join(
            "001AAA".to_string(),
            HybridTimestamp::new(200, 0, &server1),
        );
        chan1.modes.moderated.update(true, HybridTimestamp::new(200, 0, &server1));

        let mut chan2 = ChannelCrdt::new("#test".to_string(), ts_create);
        chan2.join(
            "002BBB".to_string(),
            HybridTimestamp::new(200, 0, &server2),
        );
        chan2.modes.secret.update(true, HybridTimestamp::new(200, 0, &server2));

        chan1.merge(&chan2);

        assert!(chan1.members.contains("001AAA"));
        assert!(chan1.members.contains("002BBB"));
        assert!(*chan1.modes.moderated.value());
        assert!(*chan1.modes.secret.value());
        assert_eq!(chan1.created_at, ts_create);
    }

    #[test]
    fn test_older_ts_wins_and_strips_loser_member_flags() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        // chan1 is the older (winning) side.
        let mut chan1 = make_channel("#test", &server1, 100);
        chan1.modes.secret.update(true, HybridTimestamp::new(100, 0, &server1));
        chan1.key.update(Some("oldkey".to_string()), HybridTimestamp::new(100, 0, &server1));

        // chan2 is newer (losing side) and has an op'd member.
        let mut chan2 = make_channel("#test", &server2, 500);
        chan2.join("002BBB".to_string(), HybridTimestamp::new(500, 0, &server2));
        if let Some(m) = chan2.members.get_modes_mut("002BBB") {
            m.op.update(true, HybridTimestamp::new(500, 0, &server2));
        }
        chan2.modes.moderated.update(true, HybridTimestamp::new(500, 0, &server2));

        chan1.merge(&chan2);

        // Winner's own lock survives.
        assert!(*chan1.modes.secret.value());
        assert_eq!(chan1.key.value(), &Some("oldkey".to_string()));
        // Loser's mode lock is discarded entirely.
        assert!(!*chan1.modes.moderated.value());
        // Loser's member rides in, but stripped to peon.
        assert!(chan1.members.contains("002BBB"));
        assert!(!*chan1.members.get_modes("002BBB").unwrap().op.value());
        assert_eq!(chan1.created_at.millis, 100);
    }

    #[test]
    fn test_newer_ts_loses_and_collapses_to_winner() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        // chan1 is newer (losing side), has an op'd member and a ban.
        let mut chan1 = make_channel("#test", &server1, 500);
        chan1.join("001AAA".to_string(), HybridTimestamp::new(500, 0, &server1));
        if let Some(m) = chan1.members.get_modes_mut("001AAA") {
            m.op.update(true, HybridTimestamp::new(500, 0, &server1));
        }
        chan1.add_ban(
            "*!*@old.host".to_string(),
            "oper1".to_string(),
            HybridTimestamp::new(500, 0, &server1),
        );

        // chan2 is older (winning side).
        let chan2 = make_channel("#test", &server2, 100);

        chan1.merge(&chan2);

        assert_eq!(chan1.created_at.millis, 100);
        assert!(chan1.bans.is_empty());
        assert!(chan1.members.contains("001AAA"));
        assert!(!*chan1.members.get_modes("001AAA").unwrap().op.value());
    }

    #[test]
    fn test_ts_zero_never_collapses() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let mut chan1 = make_channel("#test", &server1, 0);
        chan1.modes.moderated.update(true, HybridTimestamp::new(0, 0, &server1));

        let mut chan2 = make_channel("#test", &server2, 99999);
        chan2.modes.secret.update(true, HybridTimestamp::new(99999, 0, &server2));

        chan1.merge(&chan2);

        // Neither side's lock is wiped; both survive.
        assert!(*chan1.modes.moderated.value());
        assert!(*chan1.modes.secret.value());
    }

    #[test]
    fn test_topic_merge_picks_latest() {
        let server1 = ServerId::new("001");
        let server2 = ServerId::new("002");

        let ts_create = HybridTimestamp::new(100, 0, &server1);
        let mut chan1 = ChannelCrdt::new("#test".to_string(), ts_create);
        chan1.set_topic(
            "Old topic".to_string(),
            "user1".to_string(),
            HybridTimestamp::new(200, 0, &server1),
        );

        let mut chan2 = chan1.clone();
        chan2.set_topic(
            "New topic".to_string(),
            "user2".to_string(),
            HybridTimestamp::new(300, 0, &server2),
        );

        chan1.merge(&chan2);
        assert_eq!(chan1.topic.value().as_ref().unwrap().text, "New topic");
    }

    #[test]
    fn test_channel_crdt_dominates() {
        let server = ServerId::new("001");
        let ts1 = HybridTimestamp::new(100, 0, &server);
        let ts2 = HybridTimestamp::new(200, 0, &server);

        let chan1 = ChannelCrdt::new("#test".to_string(), ts1);
        let mut chan2 = chan1.clone();
        chan2.set_topic("New topic".to_string(), "user".to_string(), ts2);

        assert!(!chan1.dominates(&chan2));
        assert!(chan2.dominates(&chan1));
    }

    #[test]
    fn test_list_entry_crdt_equality() {
        let entry1 = ListEntryCrdt {
            mask: "*!*@host".to_string(),
            set_by: "user".to_string(),
            set_at: 100,
        };
        let entry2 = entry1.clone();
        assert_eq!(entry1, entry2);
    }
}
