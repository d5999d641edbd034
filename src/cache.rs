//! Generation tokens for lazily recomputed report lists.
//!
//! Every setting that affects a derived list bumps a [`GenerationCounter`].
//! A [`Cached`] value remembers the generation it was computed at and is
//! stale once the counter has moved past it.
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(usize);

#[derive(Debug, Default, Clone)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn current(&self) -> Generation {
        self.current
    }

    /// Invalidate everything computed so far
    pub fn bump(&mut self) -> Generation {
        self.current = Generation(self.current.0 + 1);
        self.current
    }
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    value: Option<T>,
    generation: Generation,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            value: None,
            generation: Generation::default(),
        }
    }
}

impl<T> Cached<T> {
    pub fn is_stale(&self, current: Generation) -> bool {
        self.value.is_none() || self.generation < current
    }

    /// The cached value if it is still current
    pub fn get(&self, current: Generation) -> Option<&T> {
        if self.is_stale(current) {
            None
        } else {
            self.value.as_ref()
        }
    }

    /// The cached value regardless of its generation
    pub fn peek(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: T, current: Generation) -> &mut T {
        self.generation = current;
        self.value.insert(value)
    }

    pub fn get_or_update(&mut self, current: Generation, f: impl FnOnce() -> T) -> &mut T {
        if self.is_stale(current) {
            log::trace!("recomputing a cached value for generation {}", current.0);
            self.value = None;
            self.generation = current;
        }
        self.value.get_or_insert_with(f)
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    pub fn invalidate(&mut self) {
        self.value = None;
    }
}

/// Which keyed values were last refreshed at which generation
#[derive(Debug, Clone)]
pub struct GenerationTracker<K: Ord + Hash + Clone> {
    generation_to_keys: BTreeMap<Generation, BTreeSet<K>>,
    key_to_generation: HashMap<K, Generation>,
}

impl<K: Ord + Hash + Clone> Default for GenerationTracker<K> {
    fn default() -> Self {
        Self {
            generation_to_keys: BTreeMap::new(),
            key_to_generation: HashMap::new(),
        }
    }
}

impl<K: Ord + Hash + Clone> GenerationTracker<K> {
    /// Forget `key`, it is stale under any generation afterwards
    pub fn remove(&mut self, key: &K) -> Option<Generation> {
        let generation = self.key_to_generation.remove(key)?;
        if let Some(keys) = self.generation_to_keys.get_mut(&generation) {
            keys.remove(key);
            if keys.is_empty() {
                self.generation_to_keys.remove(&generation);
            }
        }
        Some(generation)
    }

    pub fn add(&mut self, key: K, generation: Generation) {
        match self.key_to_generation.entry(key.clone()) {
            Entry::Occupied(mut e) => {
                let old = e.insert(generation);
                if let Some(keys) = self.generation_to_keys.get_mut(&old) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        self.generation_to_keys.remove(&old);
                    }
                }
            }
            Entry::Vacant(e) => {
                e.insert(generation);
            }
        }
        self.generation_to_keys.entry(generation).or_default().insert(key);
    }

    pub fn generation_of(&self, key: &K) -> Option<Generation> {
        self.key_to_generation.get(key).copied()
    }

    pub fn is_stale(&self, key: &K, current: Generation) -> bool {
        self.generation_of(key).map_or(true, |g| g < current)
    }

    /// The keys last refreshed before `generation`, in key order
    pub fn older_than(&self, generation: Generation) -> Vec<K> {
        self.generation_to_keys
            .range(..generation)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect::<BTreeSet<K>>()
            .into_iter()
            .collect()
    }
}
