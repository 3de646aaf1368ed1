//! In-memory host-mask/CIDR index, grounded on the original ircd's
//! `hostmask.c` `atable`.
//!
//! This is the precedence-ordered lookup structure the spec calls for; it is
//! distinct from, and sits in front of, [`crate::db`]'s SQLite-backed ban
//! persistence — that's the ambient store this index is fed from, not the
//! lookup structure itself.
//!
//! Three hash regimes key the bucket table, matching the three mask types:
//! IPv4 prefixes, IPv6 prefixes, and wildcard hostnames. Every inserted
//! record gets a strictly decreasing `precedence`, assigned in insertion
//! order, starting from `u32::MAX`. Lookups scan from the most specific
//! possible bit-length down to zero and keep the *highest-precedence* (i.e.
//! earliest-inserted) match seen, not the most specific one — insertion
//! order is the tiebreaker, by design, matching `find_conf_by_address`.

use crate::error::HostmaskError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// Number of hash buckets. Matches `ATABLE_SIZE` in the original source.
pub const ATABLE_SIZE: usize = 0x1000;

const ATABLE_MASK: usize = ATABLE_SIZE - 1;

/// The kind of mask an [`AddressRec`] matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskType {
    Ipv4,
    Ipv6,
    Host,
}

/// A single indexed record: an address or hostname mask plus the caller's
/// associated data (a kline/dline/I-line, or whatever else the bandb/config
/// loader wants to index by host mask).
#[derive(Debug, Clone)]
pub struct AddressRec<T> {
    pub masktype: MaskType,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub host_pattern: Option<String>,
    pub bits: u8,
    pub username: Option<String>,
    pub auth_user: Option<String>,
    pub precedence: u32,
    pub data: T,
}

impl<T> AddressRec<T> {
    fn matches_address(&self, addr: IpAddr) -> bool {
        match (self.masktype, addr) {
            (MaskType::Ipv4, IpAddr::V4(ip)) => {
                let rec = u32::from(self.ipv4.expect("ipv4 rec has ipv4 addr"));
                let query = u32::from(ip);
                mask_eq_u32(rec, query, self.bits)
            }
            (MaskType::Ipv6, IpAddr::V6(ip)) => {
                let rec = self.ipv6.expect("ipv6 rec has ipv6 addr").octets();
                let query = ip.octets();
                mask_eq_bytes(&rec, &query, self.bits)
            }
            _ => false,
        }
    }

    fn matches_username(&self, username: Option<&str>, auth_user: Option<&str>) -> bool {
        let user_ok = match (&self.username, username) {
            (None, _) => true,
            (Some(pat), Some(u)) => ts6_proto::wildcard_match(pat, u),
            (Some(_), None) => false,
        };
        let auth_ok = match (&self.auth_user, auth_user) {
            (None, _) => true,
            (Some(pat), Some(u)) => ts6_proto::wildcard_match(pat, u),
            (Some(_), None) => false,
        };
        user_ok && auth_ok
    }
}

fn mask_eq_u32(a: u32, b: u32, bits: u8) -> bool {
    if bits == 0 {
        return true;
    }
    if bits >= 32 {
        return a == b;
    }
    let mask = !0u32 << (32 - bits);
    (a & mask) == (b & mask)
}

fn mask_eq_bytes(a: &[u8; 16], b: &[u8; 16], bits: u8) -> bool {
    let full_bytes = (bits / 8) as usize;
    if a[..full_bytes] != b[..full_bytes] {
        return false;
    }
    let remaining_bits = bits % 8;
    if remaining_bits == 0 {
        return true;
    }
    let shift = 8 - remaining_bits;
    (a[full_bytes] >> shift) == (b[full_bytes] >> shift)
}

/// Hash an IPv4 address truncated to `bits` prefix bits into a bucket index.
pub fn hash_ipv4(addr: Ipv4Addr, bits: u8) -> usize {
    let full = u32::from(addr);
    let masked = if bits == 0 {
        0
    } else if bits >= 32 {
        full
    } else {
        full & (!0u32 << (32 - bits))
    };
    ((masked ^ (masked >> 12) ^ (masked >> 24)) as usize) & ATABLE_MASK
}

/// Hash an IPv6 address truncated to `bits` prefix bits into a bucket index,
/// folding the masked bytes via XOR.
pub fn hash_ipv6(addr: Ipv6Addr, bits: u8) -> usize {
    let octets = addr.octets();
    let full_bytes = (bits / 8) as usize;
    let remaining_bits = bits % 8;

    let mut h: u32 = 0;
    for (i, &byte) in octets.iter().enumerate() {
        let b = if i < full_bytes {
            byte
        } else if i == full_bytes && remaining_bits > 0 {
            byte & (0xFFu8 << (8 - remaining_bits))
        } else {
            break;
        };
        h = h.rotate_left(5) ^ (b as u32);
    }
    (h as usize) & ATABLE_MASK
}

/// Hash a hostname/wildcard pattern, case-insensitively.
pub fn hash_text(text: &str) -> usize {
    let mut h: u32 = 0;
    for c in text.chars() {
        let lower = c.to_ascii_lowercase() as u32;
        h = (h << 4).wrapping_sub(h.wrapping_add(lower));
    }
    (h as usize) & ATABLE_MASK
}

/// Hash the part of a host mask that is actually significant for bucketing:
/// the substring after the last literal dot preceding any wildcard
/// (`*`/`?`), or the whole string if there's no wildcard.
pub fn get_mask_hash(text: &str) -> usize {
    if let Some(wildcard_pos) = text.find(['*', '?']) {
        let prefix = &text[..wildcard_pos];
        if let Some(dot_pos) = prefix.rfind('.') {
            return hash_text(&text[dot_pos + 1..]);
        }
    }
    hash_text(text)
}

fn round_down_ipv4_bits(bits: u8) -> u8 {
    (bits / 8) * 8
}

fn round_down_ipv6_bits(bits: u8) -> u8 {
    (bits / 16) * 16
}

/// A precedence-ordered, hash-bucketed index of address/hostname masks.
///
/// Generic over `T`, the caller's associated data (a kline, dline, I-line,
/// or any other conf entry the bandb/config loader wants addressed by
/// host mask).
pub struct HostmaskIndex<T> {
    buckets: Vec<Vec<Arc<AddressRec<T>>>>,
    next_precedence: u32,
}

impl<T> Default for HostmaskIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HostmaskIndex<T> {
    pub fn new() -> Self {
        Self {
            buckets: (0..ATABLE_SIZE).map(|_| Vec::new()).collect(),
            next_precedence: u32::MAX,
        }
    }

    /// Insert an IPv4 CIDR mask. Returns the assigned precedence.
    pub fn add_ipv4(
        &mut self,
        addr: Ipv4Addr,
        bits: u8,
        username: Option<String>,
        auth_user: Option<String>,
        data: T,
    ) -> Result<u32, HostmaskError> {
        if bits > 32 {
            return Err(HostmaskError::InvalidIpv4Bits(bits));
        }
        let precedence = self.next_precedence()?;
        let bucket = hash_ipv4(addr, round_down_ipv4_bits(bits));
        self.buckets[bucket].push(Arc::new(AddressRec {
            masktype: MaskType::Ipv4,
            ipv4: Some(addr),
            ipv6: None,
            host_pattern: None,
            bits,
            username,
            auth_user,
            precedence,
            data,
        }));
        Ok(precedence)
    }

    /// Insert an IPv6 CIDR mask. Returns the assigned precedence.
    pub fn add_ipv6(
        &mut self,
        addr: Ipv6Addr,
        bits: u8,
        username: Option<String>,
        auth_user: Option<String>,
        data: T,
    ) -> Result<u32, HostmaskError> {
        if bits > 128 {
            return Err(HostmaskError::InvalidIpv6Bits(bits));
        }
        let precedence = self.next_precedence()?;
        let bucket = hash_ipv6(addr, round_down_ipv6_bits(bits));
        self.buckets[bucket].push(Arc::new(AddressRec {
            masktype: MaskType::Ipv6,
            ipv4: None,
            ipv6: Some(addr),
            host_pattern: None,
            bits,
            username,
            auth_user,
            precedence,
            data,
        }));
        Ok(precedence)
    }

    /// Insert a wildcard hostname mask. Returns the assigned precedence.
    pub fn add_host(
        &mut self,
        pattern: &str,
        username: Option<String>,
        auth_user: Option<String>,
        data: T,
    ) -> Result<u32, HostmaskError> {
        if pattern.is_empty() {
            return Err(HostmaskError::EmptyMask);
        }
        let precedence = self.next_precedence()?;
        let bucket = get_mask_hash(pattern);
        self.buckets[bucket].push(Arc::new(AddressRec {
            masktype: MaskType::Host,
            ipv4: None,
            ipv6: None,
            host_pattern: Some(pattern.to_ascii_lowercase()),
            bits: 0,
            username,
            auth_user,
            precedence,
            data,
        }));
        Ok(precedence)
    }

    fn next_precedence(&mut self) -> Result<u32, HostmaskError> {
        if self.next_precedence == 0 {
            return Err(HostmaskError::PrecedenceExhausted);
        }
        let p = self.next_precedence;
        self.next_precedence -= 1;
        Ok(p)
    }

    /// Remove every record with the given precedence. Precedences are
    /// unique per insert, so this removes at most one record; it scans all
    /// buckets since precedence isn't itself a hash key.
    pub fn remove_by_precedence(&mut self, precedence: u32) -> bool {
        let mut removed = false;
        for bucket in &mut self.buckets {
            let before = bucket.len();
            bucket.retain(|rec| rec.precedence != precedence);
            removed |= bucket.len() != before;
        }
        removed
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    /// Address-keyed lookup. Scans from the most specific possible prefix
    /// length down to zero, then falls back to host-mask buckets if `host`
    /// is given. Among matches, keeps the one with the highest precedence
    /// (earliest insertion), not the most specific prefix.
    pub fn find_conf_by_address(
        &self,
        host: Option<&str>,
        addr: Option<IpAddr>,
        username: Option<&str>,
        auth_user: Option<&str>,
    ) -> Option<Arc<AddressRec<T>>> {
        let mut best: Option<Arc<AddressRec<T>>> = None;

        if let Some(IpAddr::V6(ip)) = addr {
            for bits in (0..=128).rev().step_by(16) {
                let bucket = hash_ipv6(ip, bits);
                self.scan_bucket(bucket, IpAddr::V6(ip), username, auth_user, &mut best);
            }
        }

        if let Some(IpAddr::V4(ip)) = addr {
            for bits in (0..=32).rev().step_by(8) {
                let bucket = hash_ipv4(ip, bits);
                self.scan_bucket(bucket, IpAddr::V4(ip), username, auth_user, &mut best);
            }
        }

        if let Some(host) = host {
            self.scan_host_suffixes(host, username, auth_user, &mut best);
        }

        best
    }

    fn scan_bucket(
        &self,
        bucket: usize,
        addr: IpAddr,
        username: Option<&str>,
        auth_user: Option<&str>,
        best: &mut Option<Arc<AddressRec<T>>>,
    ) {
        for rec in &self.buckets[bucket] {
            if !rec.matches_address(addr) {
                continue;
            }
            if !rec.matches_username(username, auth_user) {
                continue;
            }
            if best.as_ref().is_none_or(|b| rec.precedence > b.precedence) {
                *best = Some(rec.clone());
            }
        }
    }

    /// Walk each dot-suffix of `host` (so `a.b.example.com`, `b.example.com`,
    /// `example.com`, `com`), plus the bucket-0 fallback for patterns with no
    /// dot before their first wildcard, matching each bucket's records with
    /// a full wildcard compare against the complete host string.
    fn scan_host_suffixes(
        &self,
        host: &str,
        username: Option<&str>,
        auth_user: Option<&str>,
        best: &mut Option<Arc<AddressRec<T>>>,
    ) {
        let lower = host.to_ascii_lowercase();
        let mut rest = lower.as_str();
        loop {
            let bucket = hash_text(rest);
            self.scan_host_bucket(bucket, &lower, username, auth_user, best);
            match rest.find('.') {
                Some(pos) => rest = &rest[pos + 1..],
                None => break,
            }
        }
        // Fallback bucket for masks whose wildcard precedes any literal dot
        // (e.g. `*.evil.example`), which hash on an empty suffix.
        self.scan_host_bucket(hash_text(""), &lower, username, auth_user, best);
    }

    fn scan_host_bucket(
        &self,
        bucket: usize,
        host: &str,
        username: Option<&str>,
        auth_user: Option<&str>,
        best: &mut Option<Arc<AddressRec<T>>>,
    ) {
        for rec in &self.buckets[bucket] {
            let Some(pattern) = &rec.host_pattern else {
                continue;
            };
            if !ts6_proto::wildcard_match(pattern, host) {
                continue;
            }
            if !rec.matches_username(username, auth_user) {
                continue;
            }
            if best.as_ref().is_none_or(|b| rec.precedence > b.precedence) {
                *best = Some(rec.clone());
            }
        }
    }

    /// Exact, non-precedence lookup keyed by the parsed netmask. Used for
    /// config reload diffing (find the exact record a directive names,
    /// rather than the best match for a live connection).
    pub fn find_exact_ipv4(&self, addr: Ipv4Addr, bits: u8) -> Option<Arc<AddressRec<T>>> {
        let bucket = hash_ipv4(addr, round_down_ipv4_bits(bits));
        self.buckets[bucket]
            .iter()
            .find(|rec| rec.masktype == MaskType::Ipv4 && rec.ipv4 == Some(addr) && rec.bits == bits)
            .cloned()
    }

    pub fn find_exact_ipv6(&self, addr: Ipv6Addr, bits: u8) -> Option<Arc<AddressRec<T>>> {
        let bucket = hash_ipv6(addr, round_down_ipv6_bits(bits));
        self.buckets[bucket]
            .iter()
            .find(|rec| rec.masktype == MaskType::Ipv6 && rec.ipv6 == Some(addr) && rec.bits == bits)
            .cloned()
    }

    pub fn find_exact_host(&self, pattern: &str) -> Option<Arc<AddressRec<T>>> {
        let lower = pattern.to_ascii_lowercase();
        let bucket = get_mask_hash(&lower);
        self.buckets[bucket]
            .iter()
            .find(|rec| rec.masktype == MaskType::Host && rec.host_pattern.as_deref() == Some(lower.as_str()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_16_beats_slash_8_by_insertion() {
        let mut index: HostmaskIndex<&'static str> = HostmaskIndex::new();
        index
            .add_ipv4(Ipv4Addr::new(10, 1, 0, 0), 16, None, None, "specific")
            .unwrap();
        index
            .add_ipv4(Ipv4Addr::new(10, 0, 0, 0), 8, None, None, "broad")
            .unwrap();

        let found = index
            .find_conf_by_address(None, Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))), None, None)
            .unwrap();
        assert_eq!(found.data, "specific");
    }

    #[test]
    fn insertion_order_beats_specificity_when_reversed() {
        // Same two masks, inserted in the opposite order: the broader /8,
        // inserted first, wins despite being less specific than the /16.
        // This is the behavior the "beats by insertion" wording names:
        // precedence tracks insertion order, not prefix length.
        let mut index: HostmaskIndex<&'static str> = HostmaskIndex::new();
        index
            .add_ipv4(Ipv4Addr::new(10, 0, 0, 0), 8, None, None, "broad")
            .unwrap();
        index
            .add_ipv4(Ipv4Addr::new(10, 1, 0, 0), 16, None, None, "specific")
            .unwrap();

        let found = index
            .find_conf_by_address(None, Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))), None, None)
            .unwrap();
        assert_eq!(found.data, "broad");
    }

    #[test]
    fn no_match_returns_none() {
        let mut index: HostmaskIndex<&'static str> = HostmaskIndex::new();
        index
            .add_ipv4(Ipv4Addr::new(192, 168, 0, 0), 16, None, None, "x")
            .unwrap();

        let found = index.find_conf_by_address(
            None,
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            None,
            None,
        );
        assert!(found.is_none());
    }

    #[test]
    fn host_mask_matches_by_wildcard_suffix() {
        let mut index: HostmaskIndex<&'static str> = HostmaskIndex::new();
        index
            .add_host("*.evil.example.com", None, None, "hostban")
            .unwrap();

        let found = index
            .find_conf_by_address(Some("cnc.evil.example.com"), None, None, None)
            .unwrap();
        assert_eq!(found.data, "hostban");
    }

    #[test]
    fn username_filter_rejects_mismatched_user() {
        let mut index: HostmaskIndex<&'static str> = HostmaskIndex::new();
        index
            .add_ipv4(
                Ipv4Addr::new(1, 2, 3, 0),
                24,
                Some("root".to_string()),
                None,
                "root-only",
            )
            .unwrap();

        let found = index.find_conf_by_address(
            None,
            Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))),
            Some("someone"),
            None,
        );
        assert!(found.is_none());

        let found = index.find_conf_by_address(
            None,
            Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))),
            Some("root"),
            None,
        );
        assert!(found.is_some());
    }

    #[test]
    fn ipv6_prefix_match() {
        let mut index: HostmaskIndex<&'static str> = HostmaskIndex::new();
        let net: Ipv6Addr = "2001:db8::".parse().unwrap();
        index.add_ipv6(net, 32, None, None, "v6").unwrap();

        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let found = index
            .find_conf_by_address(None, Some(IpAddr::V6(addr)), None, None)
            .unwrap();
        assert_eq!(found.data, "v6");

        let other: Ipv6Addr = "2001:db9::1".parse().unwrap();
        let found = index.find_conf_by_address(None, Some(IpAddr::V6(other)), None, None);
        assert!(found.is_none());
    }

    #[test]
    fn remove_by_precedence_drops_the_record() {
        let mut index: HostmaskIndex<&'static str> = HostmaskIndex::new();
        let prec = index
            .add_ipv4(Ipv4Addr::new(10, 0, 0, 0), 8, None, None, "x")
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.remove_by_precedence(prec));
        assert_eq!(index.len(), 0);
    }
}
