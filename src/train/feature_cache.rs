use super::dictionary::IdRemap;
use crate::dictionary::{FeatureId, NO_FEATURE};

/// Feature ids touched at every lattice position of every sentence.
///
/// A sentence of length L owns `2L - 1` consecutive entries: the unigram ids
/// of positions `0..L` followed by the bigram ids of positions `1..L`. Each
/// entry is stored as a `NO_FEATURE` terminated run in one flat buffer.
#[derive(Debug, Clone, Default)]
pub struct FeatureCache {
    ids: Vec<FeatureId>,
    starts: Vec<usize>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its index
    pub fn add(&mut self, features: &[FeatureId]) -> usize {
        let entry = self.starts.len();
        self.starts.push(self.ids.len());
        self.ids.extend_from_slice(features);
        self.ids.push(NO_FEATURE);
        entry
    }

    /// Feature ids of `entry`, without the terminator
    pub fn get(&self, entry: usize) -> &[FeatureId] {
        let start = self.starts[entry];
        let end = match self.starts.get(entry + 1) {
            Some(&next) => next - 1,
            None => self.ids.len() - 1,
        };
        &self.ids[start..end]
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.starts.clear();
    }

    /// Rewrite every entry through `remap`, dropping pruned ids.
    pub fn shrink(&mut self, remap: &IdRemap) {
        let mut write = 0;
        for entry in 0..self.starts.len() {
            let start = self.starts[entry];
            self.starts[entry] = write;
            let mut read = start;
            while self.ids[read] != NO_FEATURE {
                if let Some(id) = remap.get(self.ids[read]) {
                    self.ids[write] = id;
                    write += 1;
                }
                read += 1;
            }
            self.ids[write] = NO_FEATURE;
            write += 1;
        }
        self.ids.truncate(write);
    }
}

#[cfg(test)]
mod tests {
    use super::super::dictionary::DictionaryBuilder;
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut cache = FeatureCache::new();
        assert_eq!(cache.add(&[0, 2]), 0);
        assert_eq!(cache.add(&[]), 1);
        assert_eq!(cache.add(&[4]), 2);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(0), [0, 2]);
        assert!(cache.get(1).is_empty());
        assert_eq!(cache.get(2), [4]);
    }

    #[test]
    fn test_shrink_drops_pruned_ids() {
        let mut dict = DictionaryBuilder::new(2);
        let mut cache = FeatureCache::new();
        let a = dict.insert_or_lookup("U00:a");
        let rare = dict.insert_or_lookup("U00:rare");
        let a2 = dict.insert_or_lookup("U00:a");
        let b = dict.insert_or_lookup("B");
        let b2 = dict.insert_or_lookup("B");
        cache.add(&[a, rare]);
        cache.add(&[rare]);
        cache.add(&[a2]);
        cache.add(&[b, b2]);

        let remap = dict.prune(2).unwrap();
        cache.shrink(&remap);

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(0), [0]);
        assert!(cache.get(1).is_empty());
        assert_eq!(cache.get(2), [0]);
        assert_eq!(cache.get(3), [2, 2]);
        for entry in 0..cache.len() {
            assert!(cache.get(entry).iter().all(|&id| id < dict.max_id()));
        }
    }
}
