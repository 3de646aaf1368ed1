//! Capability bitmasks: client capability slots and the server-peer
//! capability mask negotiated over `CAPAB`.
//!
//! Mirrors `cap.c`'s bitfield capability table: each capability occupies
//! one bit of a 32-bit mask, so per-recipient gating (the "per-tag
//! capability-mask gating" of spec §4.7) is a single AND rather than a
//! string compare.

use std::collections::HashMap;

/// Behavioral flags on a registered capability slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapFlags {
    /// Cannot be removed via `CAP REQ -name` once granted.
    pub sticky: bool,
    /// Listed first in `CAP LS`, ahead of non-priority capabilities.
    pub priority: bool,
}

/// One bit position (0-31) in a 32-bit capability mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapSlot(u8);

impl CapSlot {
    #[must_use]
    fn bit(self) -> u32 {
        1u32 << self.0
    }
}

/// A 32-bit mask of granted capability slots, for one client or peer link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapMask(u32);

impl CapMask {
    /// The empty mask.
    pub const EMPTY: Self = Self(0);

    /// Grant `slot`.
    pub fn set(&mut self, slot: CapSlot) {
        self.0 |= slot.bit();
    }

    /// Revoke `slot`.
    pub fn clear(&mut self, slot: CapSlot) {
        self.0 &= !slot.bit();
    }

    /// `true` if `slot` is granted.
    #[must_use]
    pub fn has(&self, slot: CapSlot) -> bool {
        self.0 & slot.bit() != 0
    }

    /// `true` if every slot granted in `other` is also granted here.
    #[must_use]
    pub fn contains_all(&self, other: CapMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw 32-bit value, for wire/log representation.
    #[must_use]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for CapMask {
    type Output = CapMask;
    fn bitor(self, rhs: Self) -> CapMask {
        CapMask(self.0 | rhs.0)
    }
}

struct CapEntry {
    name: &'static str,
    slot: CapSlot,
    flags: CapFlags,
}

/// Registry assigning client capability names to bit slots, up to 32.
///
/// Mirrors the client capability index from spec §4.7: each capability
/// carries a name, a slot, and `{STICKY, PRIORITY}` flags. Unlike the C
/// original's per-capability owner-data pointer, `visible`/`data`
/// extensions are left to the caller (`src/handlers/cap`) to look up by
/// name, since every capability this daemon ships is statically known.
pub struct CapRegistry {
    entries: Vec<CapEntry>,
    by_name: HashMap<&'static str, CapSlot>,
}

impl Default for CapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a capability, assigning it the next free bit.
    ///
    /// # Panics
    ///
    /// Panics if more than 32 capabilities are registered, or if `name`
    /// is already registered. The mask is fixed at 32 bits; a daemon
    /// shipping more capabilities than that needs a wider mask type, not
    /// a silently-wrapping one.
    pub fn register(&mut self, name: &'static str, flags: CapFlags) -> CapSlot {
        assert!(
            self.entries.len() < 32,
            "capability bitmask exhausted (max 32 slots)"
        );
        assert!(
            !self.by_name.contains_key(name),
            "capability {name} already registered"
        );
        let slot = CapSlot(self.entries.len() as u8);
        self.entries.push(CapEntry { name, slot, flags });
        self.by_name.insert(name, slot);
        slot
    }

    /// Look up the slot for a registered capability name.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<CapSlot> {
        self.by_name.get(name).copied()
    }

    /// Flags for a slot produced by this registry.
    #[must_use]
    pub fn flags(&self, slot: CapSlot) -> CapFlags {
        self.entries[slot.0 as usize].flags
    }

    /// Name for a slot produced by this registry.
    #[must_use]
    pub fn name(&self, slot: CapSlot) -> &'static str {
        self.entries[slot.0 as usize].name
    }

    /// Mask of every sticky capability, for `CAP REQ -name` validation:
    /// a removal request touching any of these bits must be rejected.
    #[must_use]
    pub fn sticky_mask(&self) -> CapMask {
        let mut mask = CapMask::EMPTY;
        for entry in &self.entries {
            if entry.flags.sticky {
                mask.set(entry.slot);
            }
        }
        mask
    }
}

/// Known server-peer capabilities negotiated via `CAPAB` at link time.
/// Unlike client capabilities these are a fixed, compile-time set, so
/// each gets a hardcoded slot rather than a runtime-registered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PeerCap {
    /// TS6 protocol support.
    Ts6,
    /// Extended output mode delivery.
    EOpMod,
    /// SAVE command support for nick collisions.
    Save,
    /// Extended ban masks.
    EbMask,
    /// Channel wallop relay.
    Chw,
    /// Ban exceptions (`+e`).
    Ex,
    /// Invite exceptions (`+I`).
    Ie,
}

impl PeerCap {
    /// The `CAPAB` wire token for this capability.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ts6 => "TS6",
            Self::EOpMod => "EOPMOD",
            Self::Save => "SAVE",
            Self::EbMask => "EBMASK",
            Self::Chw => "CHW",
            Self::Ex => "EX",
            Self::Ie => "IE",
        }
    }

    #[must_use]
    fn slot(self) -> CapSlot {
        CapSlot(match self {
            Self::Ts6 => 0,
            Self::EOpMod => 1,
            Self::Save => 2,
            Self::EbMask => 3,
            Self::Chw => 4,
            Self::Ex => 5,
            Self::Ie => 6,
        })
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "TS6" => Some(Self::Ts6),
            "EOPMOD" => Some(Self::EOpMod),
            "SAVE" => Some(Self::Save),
            "EBMASK" => Some(Self::EbMask),
            "CHW" => Some(Self::Chw),
            "EX" => Some(Self::Ex),
            "IE" => Some(Self::Ie),
            _ => None,
        }
    }
}

/// Parse a space-separated `CAPAB` token list into a peer capability mask.
/// Unrecognized tokens are ignored, matching the original's behavior of
/// tolerating capabilities it doesn't know about.
#[must_use]
pub fn parse_peer_caps(tokens: &str) -> CapMask {
    let mut mask = CapMask::EMPTY;
    for token in tokens.split_whitespace() {
        if let Some(cap) = PeerCap::from_token(token) {
            mask.set(cap.slot());
        }
    }
    mask
}

/// `true` if `mask` grants `cap`.
#[must_use]
pub fn peer_has(mask: CapMask, cap: PeerCap) -> bool {
    mask.has(cap.slot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup_slot() {
        let mut reg = CapRegistry::new();
        let slot = reg.register("cap-notify", CapFlags { sticky: true, priority: true });
        assert_eq!(reg.slot("cap-notify"), Some(slot));
        assert_eq!(reg.name(slot), "cap-notify");
        assert!(reg.flags(slot).sticky);
    }

    #[test]
    fn test_mask_set_clear_has() {
        let mut reg = CapRegistry::new();
        let a = reg.register("a", CapFlags::default());
        let b = reg.register("b", CapFlags::default());

        let mut mask = CapMask::EMPTY;
        mask.set(a);
        assert!(mask.has(a));
        assert!(!mask.has(b));

        mask.clear(a);
        assert!(!mask.has(a));
    }

    #[test]
    fn test_sticky_mask_collects_only_sticky_caps() {
        let mut reg = CapRegistry::new();
        let sticky = reg.register("cap-notify", CapFlags { sticky: true, priority: false });
        let plain = reg.register("batch", CapFlags::default());

        let sticky_mask = reg.sticky_mask();
        assert!(sticky_mask.has(sticky));
        assert!(!sticky_mask.has(plain));
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_registry_panics_past_32_slots() {
        let mut reg = CapRegistry::new();
        for i in 0..33 {
            let name: &'static str = Box::leak(format!("cap{i}").into_boxed_str());
            reg.register(name, CapFlags::default());
        }
    }

    #[test]
    fn test_parse_peer_caps_known_and_unknown_tokens() {
        let mask = parse_peer_caps("TS6 EOPMOD SAVE BOGUS");
        assert!(peer_has(mask, PeerCap::Ts6));
        assert!(peer_has(mask, PeerCap::EOpMod));
        assert!(peer_has(mask, PeerCap::Save));
        assert!(!peer_has(mask, PeerCap::EbMask));
    }

    #[test]
    fn test_contains_all() {
        let mut reg = CapRegistry::new();
        let a = reg.register("a", CapFlags::default());
        let b = reg.register("b", CapFlags::default());

        let mut have = CapMask::EMPTY;
        have.set(a);
        have.set(b);

        let mut want = CapMask::EMPTY;
        want.set(a);

        assert!(have.contains_all(want));
        want.set(b);
        assert!(have.contains_all(want));

        let mut missing = CapMask::EMPTY;
        missing.set(a);
        let mut extra_want = CapMask::EMPTY;
        extra_want.set(a);
        extra_want.set(b);
        assert!(!missing.contains_all(extra_want));
    }
}
