use crate::{hash::Hash, limits::DESCRIPTOR_RING_SIZE};
use foldhash::HashMap;
use std::{collections::hash_map::Entry, mem};

/// A cache of objects keyed by content hash, where entries expire after `N` frames without use.
///
/// Every entry belongs to the ring of the frame it was last requested in. When a frame begins,
/// the ring that is about to be reused is emptied and its entries become vacant objects, ready to
/// be handed out again under a different hash. Objects are never destroyed by the cache, they
/// only move between the map and the vacant list.
#[derive(Debug)]
pub(crate) struct RingCache<T, const N: usize = DESCRIPTOR_RING_SIZE> {
    entries: HashMap<Hash, RingEntry<T>>,
    rings: [Vec<Hash>; N],
    vacants: Vec<T>,
    index: usize,
}

#[derive(Debug)]
struct RingEntry<T> {
    value: T,
    ring: usize,
}

impl<T: Copy, const N: usize> RingCache<T, N> {
    pub(crate) fn new() -> Self {
        const { assert!(N.is_power_of_two()) };

        RingCache {
            entries: HashMap::default(),
            rings: std::array::from_fn(|_| Vec::new()),
            vacants: Vec::new(),
            index: 0,
        }
    }

    /// Advances to the next frame, evicting the entries that were last used `N` frames ago.
    pub(crate) fn begin_frame(&mut self) {
        self.index = (self.index + 1) & (N - 1);

        let mut ring = mem::take(&mut self.rings[self.index]);

        for hash in ring.drain(..) {
            // Entries that were requested again since are listed in a newer ring too.
            if let Entry::Occupied(entry) = self.entries.entry(hash) {
                if entry.get().ring == self.index {
                    self.vacants.push(entry.remove().value);
                }
            }
        }

        self.rings[self.index] = ring;
    }

    /// Looks up `hash`, refreshing the entry so that it survives another `N` frames.
    pub(crate) fn request(&mut self, hash: Hash) -> Option<T> {
        let entry = self.entries.get_mut(&hash)?;

        if entry.ring != self.index {
            entry.ring = self.index;
            self.rings[self.index].push(hash);
        }

        Some(entry.value)
    }

    /// Hands out a vacant object under `hash`, if there is one.
    pub(crate) fn request_vacant(&mut self, hash: Hash) -> Option<T> {
        let value = self.vacants.pop()?;

        let previous = self.entries.insert(
            hash,
            RingEntry {
                value,
                ring: self.index,
            },
        );
        debug_assert!(previous.is_none());
        self.rings[self.index].push(hash);

        Some(value)
    }

    /// Adds a fresh object to the vacant list.
    pub(crate) fn make_vacant(&mut self, value: T) {
        self.vacants.push(value);
    }

    /// Forgets every object, cached or vacant.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.rings.iter_mut().for_each(Vec::clear);
        self.vacants.clear();
        self.index = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn vacant_len(&self) -> usize {
        self.vacants.len()
    }
}
