use cqdb::CQDB;

use crate::error::{Error, Result};

/// Base id of a feature instance in the weight vector
pub type FeatureId = u32;

/// Terminates feature id lists and stands for "no such feature"
pub const NO_FEATURE: FeatureId = u32::MAX;

/// Resolve feature instance strings to base ids
pub trait FeatureLookup {
    fn feature_id(&mut self, key: &str) -> Option<FeatureId>;
}

/// Resolve `instance` and append its id to `features` when it is known.
pub fn try_add_feature<D: FeatureLookup + ?Sized>(
    dict: &mut D,
    instance: &str,
    features: &mut Vec<FeatureId>,
) -> Option<FeatureId> {
    let id = dict.feature_id(instance)?;
    features.push(id);
    Some(id)
}

/// Immutable feature dictionary backed by a constant exact-match database.
///
/// This is the form the dictionary takes once training has finished; it can
/// be shared freely between threads.
#[derive(Debug, Clone)]
pub struct FrozenDictionary<'a> {
    db: CQDB<'a>,
}

impl<'a> FrozenDictionary<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let db = CQDB::new(buf)
            .map_err(|e| Error::format(format!("broken feature dictionary: {}", e)))?;
        Ok(Self { db })
    }

    /// Base id of `key`, `None` for features the model never saw
    pub fn get(&self, key: &str) -> Option<FeatureId> {
        self.db.to_id(key)
    }
}

impl FeatureLookup for FrozenDictionary<'_> {
    fn feature_id(&mut self, key: &str) -> Option<FeatureId> {
        self.get(key)
    }
}
