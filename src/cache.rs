//! Bounded-byte cache of decoded device buffers.
//!
//! Eviction is by size, not recency: making room always removes the largest
//! cached buffer first, repeatedly, until the new buffer fits.

use crate::config::SoundResource;
use crate::device::BufferHandle;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One cached buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub resource: Arc<SoundResource>,
    pub buffer: BufferHandle,
    pub bytes: usize,
}

/// Result of offering a buffer to the cache.
#[derive(Debug, PartialEq)]
pub enum CacheInsert {
    /// The buffer is now cached; `evicted` entries must be released by the caller.
    Cached { evicted: Vec<CacheEntry> },
    /// The resource was already cached; the cache is unchanged.
    AlreadyCached,
    /// The buffer alone exceeds the budget and was not cached; the caller keeps it.
    TooLarge,
}

pub struct BufferCache {
    max_bytes: i64,
    current_bytes: usize,
    by_resource: HashMap<Arc<SoundResource>, CacheEntry>,
    // (bytes, insertion sequence) ordered so the last element is the largest,
    // ties going to the most recently inserted.
    by_size: BTreeSet<(usize, u64)>,
    sequence: HashMap<u64, Arc<SoundResource>>,
    next_sequence: u64,
}

impl BufferCache {
    /// Creates a cache holding at most `max_bytes` (0 or less means unlimited).
    pub fn new(max_bytes: i64) -> Self {
        Self {
            max_bytes,
            current_bytes: 0,
            by_resource: HashMap::new(),
            by_size: BTreeSet::new(),
            sequence: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn len(&self) -> usize {
        self.by_resource.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty()
    }

    fn budget(&self) -> Option<usize> {
        (self.max_bytes > 0).then_some(self.max_bytes as usize)
    }

    /// Caches `buffer` for `resource`, evicting the largest entries until it fits.
    pub fn add_buffer(
        &mut self,
        resource: Arc<SoundResource>,
        buffer: BufferHandle,
        bytes: usize,
    ) -> CacheInsert {
        if self.by_resource.contains_key(&resource) {
            return CacheInsert::AlreadyCached;
        }

        let mut evicted = Vec::new();
        if let Some(budget) = self.budget() {
            if bytes > budget {
                log::warn!(
                    "Buffer for {} ({} bytes) exceeds the cache budget of {} bytes, not caching",
                    resource,
                    bytes,
                    budget
                );
                return CacheInsert::TooLarge;
            }
            while self.current_bytes + bytes > budget {
                match self.remove_largest_buffer() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
        }

        let seq = self.next_sequence;
        self.next_sequence += 1;
        self.by_size.insert((bytes, seq));
        self.sequence.insert(seq, resource.clone());
        self.current_bytes += bytes;
        self.by_resource.insert(
            resource.clone(),
            CacheEntry {
                resource,
                buffer,
                bytes,
            },
        );

        CacheInsert::Cached { evicted }
    }

    pub fn get_buffer(&self, resource: &SoundResource) -> Option<BufferHandle> {
        self.by_resource.get(resource).map(|entry| entry.buffer)
    }

    pub fn contains(&self, resource: &SoundResource) -> bool {
        self.by_resource.contains_key(resource)
    }

    /// Evicts the single largest entry and hands it back for release.
    pub fn remove_largest_buffer(&mut self) -> Option<CacheEntry> {
        let (bytes, seq) = self.by_size.pop_last()?;
        let resource = self.sequence.remove(&seq)?;
        self.current_bytes -= bytes;
        self.by_resource.remove(&resource)
    }

    /// Evicts everything. Safe to call repeatedly; later calls return nothing.
    pub fn destroy(&mut self) -> Vec<CacheEntry> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(entry) = self.remove_largest_buffer() {
            drained.push(entry);
        }
        self.by_resource.clear();
        self.sequence.clear();
        self.current_bytes = 0;
        drained
    }
}
