//! Hook bus for cross-cutting policy points in the dispatch/lifecycle path.
//!
//! Each hook point is modeled as `fn(&mut HookData)`, with [`HookData`] a
//! tagged union carrying one variant per named hook. Subscribers are held in
//! a priority-sorted vector; fan-out iterates a *snapshot* of that vector so
//! a subscriber registering or unregistering mid-fan-out can't invalidate
//! the in-flight iteration. Subscribers must not destroy the client/channel
//! they are observing — they may only mark it dead; the caller finalizes
//! cleanup after fan-out completes.

use std::sync::Arc;

use parking_lot::RwLock;

/// Decision returned by a `message_tag` subscriber for a single tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDecision {
    /// Leave the tag as-is.
    Allow,
    /// Strip the tag before the message reaches its handler.
    Remove,
    /// Drop the entire message.
    Drop,
}

/// Data carried through `client_exit`.
#[derive(Debug, Clone)]
pub struct ClientExitData {
    pub uid: String,
    pub nick: String,
    pub user: String,
    pub host: String,
    pub account: Option<String>,
    pub channels: Vec<String>,
    pub reason: String,
}

/// Data carried through `can_create_channel`. Subscribers set `allow = false`
/// to veto creation (e.g. RESV/forward/split restrictions).
#[derive(Debug, Clone)]
pub struct CanCreateChannelData {
    pub uid: String,
    pub channel: String,
    pub allow: bool,
}

/// Data carried through `can_forward`, the up-to-16-hop forward-on-join walk.
#[derive(Debug, Clone)]
pub struct CanForwardData {
    pub uid: String,
    pub from_channel: String,
    pub to_channel: String,
    pub hop: u8,
    pub allow: bool,
}

/// Data carried through `cap_change`, fired after a successful CAP REQ.
#[derive(Debug, Clone)]
pub struct CapChangeData {
    pub uid: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Data carried through `bannickchange`, fired per-channel on NICK change to
/// check ban evasion via nick change.
#[derive(Debug, Clone)]
pub struct BanNickChangeData {
    pub uid: String,
    pub channel: String,
    pub old_nick: String,
    pub new_nick: String,
    /// Subscribers set this to request the nick change be rejected.
    pub deny: bool,
}

/// Data carried through `message_tag`, fired once per non-empty client tag
/// during dispatch, in reverse order (last occurrence wins).
#[derive(Debug, Clone)]
pub struct MessageTagData {
    pub uid: String,
    pub key: String,
    pub value: Option<String>,
    pub decision: TagDecision,
}

/// Data carried through `message_handler`, fired with the currently-selected
/// dispatch entry so a policy (e.g. the batch engine) can rebind it.
#[derive(Debug, Clone)]
pub struct MessageHandlerData {
    pub uid: String,
    pub command: String,
    /// Set by a subscriber to redirect dispatch to a different command name.
    pub rebind: Option<String>,
}

/// Tagged union of all hook payloads.
#[derive(Debug, Clone)]
pub enum HookData {
    MessageTag(MessageTagData),
    MessageHandler(MessageHandlerData),
    ClientExit(ClientExitData),
    CanCreateChannel(CanCreateChannelData),
    CanForward(CanForwardData),
    CapChange(CapChangeData),
    BanNickChange(BanNickChangeData),
}

/// A hook subscriber: a name (for diagnostics/removal) and a priority
/// (lower runs first), plus the callback itself.
pub struct HookSubscriber {
    pub name: &'static str,
    pub priority: i32,
    callback: Box<dyn Fn(&mut HookData) + Send + Sync>,
}

impl std::fmt::Debug for HookSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSubscriber")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Named hook points the bus dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    MessageTag,
    MessageHandler,
    ClientExit,
    CanCreateChannel,
    CanForward,
    CapChange,
    BanNickChange,
}

#[derive(Default)]
struct HookTable {
    message_tag: Vec<Arc<HookSubscriber>>,
    message_handler: Vec<Arc<HookSubscriber>>,
    client_exit: Vec<Arc<HookSubscriber>>,
    can_create_channel: Vec<Arc<HookSubscriber>>,
    can_forward: Vec<Arc<HookSubscriber>>,
    cap_change: Vec<Arc<HookSubscriber>>,
    bannickchange: Vec<Arc<HookSubscriber>>,
}

impl HookTable {
    fn list_mut(&mut self, point: HookPoint) -> &mut Vec<Arc<HookSubscriber>> {
        match point {
            HookPoint::MessageTag => &mut self.message_tag,
            HookPoint::MessageHandler => &mut self.message_handler,
            HookPoint::ClientExit => &mut self.client_exit,
            HookPoint::CanCreateChannel => &mut self.can_create_channel,
            HookPoint::CanForward => &mut self.can_forward,
            HookPoint::CapChange => &mut self.cap_change,
            HookPoint::BanNickChange => &mut self.bannickchange,
        }
    }

    fn list(&self, point: HookPoint) -> &[Arc<HookSubscriber>] {
        match point {
            HookPoint::MessageTag => &self.message_tag,
            HookPoint::MessageHandler => &self.message_handler,
            HookPoint::ClientExit => &self.client_exit,
            HookPoint::CanCreateChannel => &self.can_create_channel,
            HookPoint::CanForward => &self.can_forward,
            HookPoint::CapChange => &self.cap_change,
            HookPoint::BanNickChange => &self.bannickchange,
        }
    }
}

/// The hook bus. Cheaply cloneable; interior state is shared.
#[derive(Clone, Default)]
pub struct HookBus {
    table: Arc<RwLock<HookTable>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber at a hook point. Subscribers with a lower
    /// `priority` run first; ties keep registration order (stable sort).
    pub fn subscribe(
        &self,
        point: HookPoint,
        name: &'static str,
        priority: i32,
        callback: impl Fn(&mut HookData) + Send + Sync + 'static,
    ) {
        let mut table = self.table.write();
        let list = table.list_mut(point);
        list.push(Arc::new(HookSubscriber {
            name,
            priority,
            callback: Box::new(callback),
        }));
        list.sort_by_key(|s| s.priority);
    }

    /// Remove every subscriber registered under `name` at a hook point.
    pub fn unsubscribe(&self, point: HookPoint, name: &str) {
        let mut table = self.table.write();
        table.list_mut(point).retain(|s| s.name != name);
    }

    /// Fire a hook point, feeding `data` through every subscriber in
    /// priority order. Takes a snapshot of the subscriber list (an `Arc`
    /// clone per entry) so registration changes made by a subscriber
    /// mid-fan-out don't affect this iteration.
    pub fn fire(&self, point: HookPoint, data: &mut HookData) {
        let snapshot: Vec<Arc<HookSubscriber>> = {
            let table = self.table.read();
            table.list(point).to_vec()
        };

        for subscriber in &snapshot {
            (subscriber.callback)(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn subscribers_run_in_priority_order() {
        let bus = HookBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe(HookPoint::ClientExit, "second", 10, move |_| {
            o1.write().push(2);
        });
        let o2 = order.clone();
        bus.subscribe(HookPoint::ClientExit, "first", 0, move |_| {
            o2.write().push(1);
        });

        let mut data = HookData::ClientExit(ClientExitData {
            uid: "1".into(),
            nick: "nick".into(),
            user: "user".into(),
            host: "host".into(),
            account: None,
            channels: vec![],
            reason: "quit".into(),
        });
        bus.fire(HookPoint::ClientExit, &mut data);

        assert_eq!(*order.read(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_removes_only_named_subscriber() {
        let bus = HookBus::new();
        let hits = Arc::new(AtomicI32::new(0));

        let h = hits.clone();
        bus.subscribe(HookPoint::CapChange, "counter", 0, move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        bus.unsubscribe(HookPoint::CapChange, "counter");

        let mut data = HookData::CapChange(CapChangeData {
            uid: "1".into(),
            added: vec![],
            removed: vec![],
        });
        bus.fire(HookPoint::CapChange, &mut data);

        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn can_create_channel_veto_is_observed_by_caller() {
        let bus = HookBus::new();
        bus.subscribe(HookPoint::CanCreateChannel, "resv", 0, |data| {
            if let HookData::CanCreateChannel(d) = data {
                if d.channel == "#resv" {
                    d.allow = false;
                }
            }
        });

        let mut data = HookData::CanCreateChannel(CanCreateChannelData {
            uid: "1".into(),
            channel: "#resv".into(),
            allow: true,
        });
        bus.fire(HookPoint::CanCreateChannel, &mut data);

        match data {
            HookData::CanCreateChannel(d) => assert!(!d.allow),
            _ => unreachable!(),
        }
    }
}
