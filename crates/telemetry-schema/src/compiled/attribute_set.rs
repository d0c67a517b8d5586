//! Small-map/large-map hybrid used for conflict-safe renaming.
//!
//! Attribute lists are short in practice, so up to [`FAST_MAP_THRESHOLD`]
//! entries are kept inline and searched linearly. Past that the set promotes
//! itself to a hashed index. Both representations keep insertion order, so
//! [`AttributeSet::copy_to`] is deterministic.

use std::collections::HashMap;

use smallvec::SmallVec;

/// Largest set kept as an inline, linearly scanned array.
pub const FAST_MAP_THRESHOLD: usize = 20;

#[derive(Debug, Clone)]
enum Repr<'a, V> {
    Inline(SmallVec<[(&'a str, V); FAST_MAP_THRESHOLD]>),
    Hashed {
        entries: Vec<(&'a str, V)>,
        index: HashMap<&'a str, usize>,
    },
}

/// A key/value set borrowing its keys from the entity being rewritten.
#[derive(Debug, Clone)]
pub struct AttributeSet<'a, V> {
    repr: Repr<'a, V>,
}

impl<'a, V> AttributeSet<'a, V> {
    /// Create a set sized for roughly `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let repr = if capacity > FAST_MAP_THRESHOLD {
            Repr::Hashed {
                entries: Vec::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
            }
        } else {
            Repr::Inline(SmallVec::new())
        };
        Self { repr }
    }

    /// Insert `key`, overwriting the value of an existing entry in place.
    pub fn set(&mut self, key: &'a str, value: V) {
        match &mut self.repr {
            Repr::Inline(entries) => {
                if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = value;
                    return;
                }
                if entries.len() < FAST_MAP_THRESHOLD {
                    entries.push((key, value));
                    return;
                }
            }
            Repr::Hashed { entries, index } => {
                if let Some(&i) = index.get(key) {
                    entries[i].1 = value;
                } else {
                    index.insert(key, entries.len());
                    entries.push((key, value));
                }
                return;
            }
        }

        self.promote();
        self.set(key, value);
    }

    fn promote(&mut self) {
        if let Repr::Inline(inline) = &mut self.repr {
            let entries: Vec<_> = inline.drain(..).collect();
            let index = entries
                .iter()
                .enumerate()
                .map(|(i, (k, _))| (*k, i))
                .collect();
            self.repr = Repr::Hashed { entries, index };
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        match &self.repr {
            Repr::Inline(entries) => entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v),
            Repr::Hashed { entries, index } => index.get(key).map(|&i| &entries[i].1),
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Inline(entries) => entries.len(),
            Repr::Hashed { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the set still uses the inline representation.
    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline(_))
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &V)> + '_ {
        let entries: &[(&'a str, V)] = match &self.repr {
            Repr::Inline(entries) => entries,
            Repr::Hashed { entries, .. } => entries,
        };
        entries.iter().map(|(k, v)| (*k, v))
    }

    /// Write the contents into `target` in insertion order.
    ///
    /// `target` must hold at least [`len`](Self::len) entries; slots past
    /// the set's length are left untouched.
    pub fn copy_to(&self, target: &mut [(&'a str, V)])
    where
        V: Clone,
    {
        for (slot, (k, v)) in target.iter_mut().zip(self.iter()) {
            *slot = (k, v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_existing_key() {
        let mut set = AttributeSet::with_capacity(4);
        set.set("a", 1);
        set.set("b", 2);
        set.set("a", 3);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a"), Some(&3));
        assert!(set.exists("b"));
        assert!(!set.exists("c"));
        assert!(set.is_inline());
    }

    #[test]
    fn large_capacity_starts_hashed() {
        let set: AttributeSet<'_, u8> = AttributeSet::with_capacity(FAST_MAP_THRESHOLD + 1);
        assert!(!set.is_inline());
        assert!(set.is_empty());
    }

    #[test]
    fn promotes_past_threshold_without_losing_entries() {
        let keys: Vec<String> = (0..FAST_MAP_THRESHOLD + 5).map(|i| format!("k{i}")).collect();
        let mut set = AttributeSet::with_capacity(2);
        for (i, key) in keys.iter().enumerate() {
            set.set(key.as_str(), i);
        }

        assert!(!set.is_inline());
        assert_eq!(set.len(), keys.len());
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(set.get(key), Some(&i));
        }
    }

    #[test]
    fn copy_to_preserves_insertion_order_in_both_representations() {
        let keys: Vec<String> = (0..30).map(|i| format!("key{i}")).collect();

        for size in [5, 30] {
            let mut set = AttributeSet::with_capacity(size);
            for key in &keys[..size] {
                set.set(key.as_str(), key.len());
            }
            let mut out = vec![("", 0); size];
            set.copy_to(&mut out);

            let written: Vec<&str> = out.iter().map(|(k, _)| *k).collect();
            let expected: Vec<&str> = keys[..size].iter().map(String::as_str).collect();
            assert_eq!(written, expected, "size {size}");
        }
    }
}
