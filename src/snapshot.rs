use std::collections::HashMap;

/// Last-observed message count per store key.
///
/// Counts only ever move up. A smaller count reported by the store is kept
/// out of the map and surfaces as [`Observation::Shrunk`] instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    counts: HashMap<String, usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// First sighting of the key.
    New,
    Grew { from: usize },
    Unchanged,
    Shrunk { expected: usize },
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.counts.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Record `count` for `key` and classify it against the previous value.
    pub fn observe(&mut self, key: &str, count: usize) -> Observation {
        match self.counts.get_mut(key) {
            None => {
                self.counts.insert(key.to_string(), count);
                Observation::New
            }
            Some(seen) if count > *seen => {
                let from = *seen;
                *seen = count;
                Observation::Grew { from }
            }
            Some(seen) if count == *seen => Observation::Unchanged,
            Some(seen) => Observation::Shrunk { expected: *seen },
        }
    }
}

impl<K: Into<String>> FromIterator<(K, usize)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, usize)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn observe_classifies_and_never_lowers() {
        let mut snap = Snapshot::new();
        assert_eq!(snap.observe("a", 3), Observation::New);
        assert_eq!(snap.observe("a", 3), Observation::Unchanged);
        assert_eq!(snap.observe("a", 5), Observation::Grew { from: 3 });
        assert_eq!(snap.observe("a", 1), Observation::Shrunk { expected: 5 });
        assert_eq!(snap.get("a"), Some(5));
    }

    #[test]
    fn empty_conversations_are_tracked() {
        let mut snap = Snapshot::new();
        assert_eq!(snap.observe("a", 0), Observation::New);
        assert_eq!(snap.get("a"), Some(0));
        assert_eq!(snap.observe("a", 2), Observation::Grew { from: 0 });
    }

    #[test]
    fn collects_from_pairs() {
        let snap: Snapshot = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("b"), Some(2));
        assert_eq!(snap.get("c"), None);
    }
}
