//! Pre-serialized per-capability message variant cache.
//!
//! Ports `MsgBuf_cache` from `msgbuf.c`: a message's formatted body (with
//! `local_source`/`remote_source` prefix substitution already applied) is
//! computed once at `_init` time, and only the capability-gated tag prefix
//! varies per recipient. `MsgBufCache::get_or_insert` is the Rust analogue
//! of `MsgBuf_cache_get(caps, is_remote)`.

/// Capability mask plus local/remote origin: the key `MsgBuf_cache_get` is
/// indexed by.
pub type CacheKey = (u32, bool);

const CACHE_CAPACITY: usize = 32;

struct Entry {
    key: CacheKey,
    tag_prefix: String,
}

/// LRU cache of up to 32 pre-rendered tag-prefix variants for one message.
///
/// Built once per outbound message from its formatted body; each lookup
/// supplies only the capability mask and locality that select the variant.
pub struct MsgBufCache {
    body: String,
    // Most-recently-used entry first.
    order: Vec<Entry>,
}

impl MsgBufCache {
    /// Create a cache for one message body. `body` already has the
    /// `local_source`/`remote_source` substitutions baked in.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            order: Vec::with_capacity(CACHE_CAPACITY),
        }
    }

    /// The message body this cache was built for.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Fetch the cached tag-prefix rendering for `key`, computing and
    /// inserting it via `render` on a miss. A hit moves the entry to the
    /// head; a miss evicts the tail once the cache is at capacity.
    pub fn get_or_insert(&mut self, key: CacheKey, render: impl FnOnce() -> String) -> &str {
        if let Some(pos) = self.order.iter().position(|e| e.key == key) {
            if pos != 0 {
                let entry = self.order.remove(pos);
                self.order.insert(0, entry);
            }
            return &self.order[0].tag_prefix;
        }

        if self.order.len() >= CACHE_CAPACITY {
            self.order.pop();
        }
        self.order.insert(
            0,
            Entry {
                key,
                tag_prefix: render(),
            },
        );
        &self.order[0].tag_prefix
    }

    /// Number of cached variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` if no variant has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_cache_miss_inserts_and_hit_reuses() {
        let mut cache = MsgBufCache::new("PRIVMSG #ch :hi\r\n");
        let calls = Cell::new(0);
        let render = || {
            calls.set(calls.get() + 1);
            "@time=1 ".to_string()
        };

        let first = cache.get_or_insert((1, false), render).to_string();
        assert_eq!(first, "@time=1 ");
        assert_eq!(calls.get(), 1);

        let second = cache.get_or_insert((1, false), render).to_string();
        assert_eq!(second, "@time=1 ");
        assert_eq!(calls.get(), 1, "hit must not re-render");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys_cache_independently() {
        let mut cache = MsgBufCache::new("PRIVMSG #ch :hi\r\n");
        cache.get_or_insert((1, false), || "local".to_string());
        cache.get_or_insert((1, true), || "remote".to_string());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_or_insert((1, false), || panic!("should hit")), "local");
        assert_eq!(cache.get_or_insert((1, true), || panic!("should hit")), "remote");
    }

    #[test]
    fn test_evicts_tail_at_capacity() {
        let mut cache = MsgBufCache::new("PING :x\r\n");
        for mask in 0..CACHE_CAPACITY as u32 {
            cache.get_or_insert((mask, false), || format!("@m={mask} "));
        }
        assert_eq!(cache.len(), CACHE_CAPACITY);

        // One more insertion evicts the least-recently-used (mask 0).
        cache.get_or_insert((CACHE_CAPACITY as u32, false), || "@m=new ".to_string());
        assert_eq!(cache.len(), CACHE_CAPACITY);

        let mut saw_render = false;
        cache.get_or_insert((0, false), || {
            saw_render = true;
            "@m=0-again ".to_string()
        });
        assert!(saw_render, "evicted key must be a miss again");
    }

    #[test]
    fn test_hit_moves_entry_to_head_ahead_of_eviction() {
        let mut cache = MsgBufCache::new("PING :x\r\n");
        for mask in 0..CACHE_CAPACITY as u32 {
            cache.get_or_insert((mask, false), || format!("@m={mask} "));
        }

        // Touch mask 0 so it's no longer the least-recently-used entry.
        cache.get_or_insert((0, false), || panic!("should hit"));

        // Inserting one new key now must evict mask 1, not mask 0.
        cache.get_or_insert((CACHE_CAPACITY as u32, false), || "@m=new ".to_string());

        let mut saw_render = false;
        cache.get_or_insert((0, false), || {
            saw_render = true;
            "@m=0-again ".to_string()
        });
        assert!(!saw_render, "recently touched key must survive eviction");
    }
}
