use std::collections::HashMap;
use std::io::Cursor;

use cqdb::{CQDBWriter, Flag};

use crate::dictionary::{FeatureId, FeatureLookup};
use crate::error::Result;
use crate::template::TemplateKind;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: FeatureId,
    count: u32,
}

/// Mapping from pre-pruning base ids to post-pruning base ids
#[derive(Debug, Clone)]
pub struct IdRemap {
    map: Vec<Option<FeatureId>>,
}

impl IdRemap {
    /// New id of `old`, `None` if the feature was pruned
    pub fn get(&self, old: FeatureId) -> Option<FeatureId> {
        self.map.get(old as usize).copied().flatten()
    }
}

/// Feature dictionary used while reading the training data.
///
/// Every distinct feature instance reserves a contiguous range of weight ids:
/// one per label for unigram features, one per label pair for bigram
/// features. Ids are handed out in first-discovery order.
#[derive(Debug, Clone)]
pub struct DictionaryBuilder {
    entries: HashMap<String, Entry>,
    /// Keys in ascending id order
    keys: Vec<String>,
    num_labels: usize,
    max_id: FeatureId,
}

impl DictionaryBuilder {
    pub fn new(num_labels: usize) -> Self {
        Self {
            entries: HashMap::new(),
            keys: Vec::new(),
            num_labels,
            max_id: 0,
        }
    }

    /// Number of distinct feature instances
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Size of the weight vector the dictionary addresses
    pub fn max_id(&self) -> FeatureId {
        self.max_id
    }

    /// Return the base id of `key`, allocating a new range on first sight.
    pub fn insert_or_lookup(&mut self, key: &str) -> FeatureId {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.count += 1;
            return entry.id;
        }
        let id = self.max_id;
        self.max_id += id_range(key, self.num_labels);
        self.entries.insert(key.to_string(), Entry { id, count: 1 });
        self.keys.push(key.to_string());
        id
    }

    pub fn id(&self, key: &str) -> Option<FeatureId> {
        self.entries.get(key).map(|e| e.id)
    }

    /// How many times `key` has been inserted
    pub fn count(&self, key: &str) -> Option<u32> {
        self.entries.get(key).map(|e| e.count)
    }

    /// Drop features seen fewer than `min_freq` times and renumber the rest.
    ///
    /// Survivors keep their relative order. Returns `None` when nothing can be
    /// pruned (`min_freq <= 1`).
    pub fn prune(&mut self, min_freq: u32) -> Option<IdRemap> {
        if min_freq <= 1 {
            return None;
        }

        let mut map = vec![None; self.max_id as usize];
        let mut keys = Vec::with_capacity(self.keys.len());
        let mut new_max_id = 0;
        for key in self.keys.drain(..) {
            let range = id_range(&key, self.num_labels);
            let entry = match self.entries.get_mut(&key) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.count >= min_freq {
                map[entry.id as usize] = Some(new_max_id);
                entry.id = new_max_id;
                new_max_id += range;
                keys.push(key);
            } else {
                self.entries.remove(&key);
            }
        }

        self.keys = keys;
        self.max_id = new_max_id;
        Some(IdRemap { map })
    }

    /// Iterate over `(key, base id)` in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureId)> + '_ {
        self.keys
            .iter()
            .map(move |key| (key.as_str(), self.entries[key].id))
    }

    /// Serialize the key set into an exact-match database readable by
    /// [`FrozenDictionary`](crate::dictionary::FrozenDictionary).
    pub fn freeze(&self) -> Result<Vec<u8>> {
        freeze(self.iter())
    }
}

fn id_range(key: &str, num_labels: usize) -> FeatureId {
    let kind = TemplateKind::of(key).unwrap_or(TemplateKind::Bigram);
    kind.id_range(num_labels) as FeatureId
}

/// Write `(key, id)` pairs as a CQDB image
pub(crate) fn freeze<'k, I>(features: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'k str, FeatureId)>,
{
    let mut buf = Cursor::new(Vec::new());
    {
        // The database is flushed when the writer is dropped.
        let mut writer = CQDBWriter::with_flag(&mut buf, Flag::ONEWAY)?;
        for (key, id) in features {
            writer.put(key, id)?;
        }
    }
    Ok(buf.into_inner())
}

impl FeatureLookup for DictionaryBuilder {
    fn feature_id(&mut self, key: &str) -> Option<FeatureId> {
        Some(self.insert_or_lookup(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{try_add_feature, FrozenDictionary};

    #[test]
    fn test_lookup_is_idempotent() {
        let mut dict = DictionaryBuilder::new(3);
        let id = dict.insert_or_lookup("U00:walk");
        for _ in 0..4 {
            assert_eq!(dict.insert_or_lookup("U00:walk"), id);
        }
        assert_eq!(dict.count("U00:walk"), Some(5));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_ranges_do_not_overlap() {
        let mut dict = DictionaryBuilder::new(3);
        for key in &["U00:a", "B", "U00:b", "B01:x", "U01:a", "U00:a", "B"] {
            dict.insert_or_lookup(key);
        }
        let mut ranges: Vec<(u32, u32)> = dict
            .iter()
            .map(|(key, id)| {
                let range = if key.starts_with('U') { 3 } else { 9 };
                (id, id + range)
            })
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "{:?} overlaps", pair);
        }
        assert_eq!(dict.max_id(), 3 + 9 + 3 + 9 + 3);
        assert_eq!(ranges.last().unwrap().1, dict.max_id());
    }

    #[test]
    fn test_prune() {
        let mut dict = DictionaryBuilder::new(2);
        let a = dict.insert_or_lookup("U00:a");
        let rare = dict.insert_or_lookup("U00:rare");
        let b = dict.insert_or_lookup("B");
        dict.insert_or_lookup("U00:a");
        dict.insert_or_lookup("B");
        assert_eq!((a, rare, b), (0, 2, 4));

        let remap = dict.prune(2).unwrap();
        assert_eq!(remap.get(a), Some(0));
        assert_eq!(remap.get(rare), None);
        assert_eq!(remap.get(b), Some(2));
        assert_eq!(dict.max_id(), 2 + 4);
        assert_eq!(dict.id("U00:rare"), None);
        assert_eq!(dict.id("B"), Some(2));
        let keys: Vec<_> = dict.iter().collect();
        assert_eq!(keys, [("U00:a", 0), ("B", 2)]);
        for (key, _) in dict.iter() {
            assert!(dict.count(key).unwrap() >= 2);
        }
    }

    #[test]
    fn test_prune_min_freq_one_is_noop() {
        let mut dict = DictionaryBuilder::new(2);
        dict.insert_or_lookup("U00:a");
        assert!(dict.prune(1).is_none());
        assert!(dict.prune(0).is_none());
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_freeze() {
        let mut dict = DictionaryBuilder::new(2);
        dict.insert_or_lookup("U00:a");
        dict.insert_or_lookup("U00:b");
        dict.insert_or_lookup("B");

        let bytes = dict.freeze().unwrap();
        let mut frozen = FrozenDictionary::new(&bytes).unwrap();
        assert_eq!(frozen.get("U00:a"), Some(0));
        assert_eq!(frozen.get("U00:b"), Some(2));
        assert_eq!(frozen.get("B"), Some(4));
        assert_eq!(frozen.get("U00:c"), None);

        let mut features = Vec::new();
        assert_eq!(try_add_feature(&mut frozen, "U00:b", &mut features), Some(2));
        assert_eq!(try_add_feature(&mut frozen, "U00:zzz", &mut features), None);
        assert_eq!(features, [2]);
    }

    #[test]
    fn test_freeze_omits_reverse_table() {
        let mut dict = DictionaryBuilder::new(3);
        for key in ["U00:a", "U00:b", "U01:a/b", "B"] {
            dict.insert_or_lookup(key);
        }
        let bytes = dict.freeze().unwrap();
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        // header: chunk id, size, flag, byte order, bwd size, bwd offset
        assert_eq!(u32_at(8), 1);
        assert_eq!(u32_at(16), 0);
        assert_eq!(u32_at(20), 0);
        assert_eq!(u32_at(4) as usize, bytes.len());

        let db = cqdb::CQDB::new(&bytes).unwrap();
        assert_eq!(db.to_id("U01:a/b"), Some(6));
        assert!(db.to_str(6).is_none());
    }
}
