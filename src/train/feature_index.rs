use log::debug;

use super::dictionary::DictionaryBuilder;
use super::feature_cache::FeatureCache;
use super::lattice::FeatureSpace;
use super::model_writer::ModelData;
use crate::dataset::Sentence;
use crate::dictionary::{try_add_feature, FeatureId};
use crate::error::{Error, Result};
use crate::template::{TemplateEngine, Templates};

/// Compiles templates against the training sentences into feature ids.
#[derive(Debug)]
pub struct FeatureIndex {
    templates: Templates,
    labels: Vec<String>,
    xsize: usize,
    engine: TemplateEngine,
    dictionary: DictionaryBuilder,
    /// Scratch buffers reused across positions
    instance: String,
    features: Vec<FeatureId>,
}

impl FeatureIndex {
    pub fn new(templates: Templates, labels: Vec<String>, xsize: usize) -> Self {
        let dictionary = DictionaryBuilder::new(labels.len());
        Self {
            templates,
            labels,
            xsize,
            engine: TemplateEngine::new(),
            dictionary,
            instance: String::new(),
            features: Vec::new(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn xsize(&self) -> usize {
        self.xsize
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    pub fn dictionary(&self) -> &DictionaryBuilder {
        &self.dictionary
    }

    /// Length of the weight vector
    pub fn max_id(&self) -> usize {
        self.dictionary.max_id() as usize
    }

    /// Label index of every token of `sentence`
    pub fn answers(&self, sentence: &Sentence) -> Result<Vec<usize>> {
        (0..sentence.len())
            .map(|pos| {
                let label = sentence.label(pos);
                self.labels
                    .binary_search_by(|l| l.as_str().cmp(label))
                    .map_err(|_| Error::format(format!("unknown label: {}", label)))
            })
            .collect()
    }

    /// Expand every template at every position of `sentence` and append the
    /// resulting id lists to `cache`.
    ///
    /// Returns the index of the sentence's first cache entry.
    pub fn build_features(&mut self, sentence: &Sentence, cache: &mut FeatureCache) -> Result<usize> {
        let rows = sentence.rows();
        let first = cache.len();

        for cur in 0..rows.len() {
            self.features.clear();
            for template in self.templates.unigram() {
                self.engine
                    .apply(&mut self.instance, template, cur, rows, self.xsize)?;
                try_add_feature(&mut self.dictionary, &self.instance, &mut self.features);
            }
            cache.add(&self.features);
        }

        for cur in 1..rows.len() {
            self.features.clear();
            for template in self.templates.bigram() {
                self.engine
                    .apply(&mut self.instance, template, cur, rows, self.xsize)?;
                try_add_feature(&mut self.dictionary, &self.instance, &mut self.features);
            }
            cache.add(&self.features);
        }

        Ok(first)
    }

    /// Drop features seen fewer than `freq` times, rewriting the cache.
    pub fn shrink(&mut self, freq: u32, cache: &mut FeatureCache) {
        let before = self.max_id();
        if let Some(remap) = self.dictionary.prune(freq) {
            cache.shrink(&remap);
            debug!("shrink: {} -> {} weights", before, self.max_id());
        }
    }

    /// Shared lattice state for the given cache
    pub fn feature_space<'a>(&self, cache: &'a FeatureCache) -> FeatureSpace<'a> {
        FeatureSpace::new(cache, self.num_labels())
    }

    /// Package the trained weights with everything needed to apply them.
    ///
    /// The stored column count is narrowed to the widest column any template
    /// referenced. Training never rescales weights, so the cost factor is 1.
    pub fn into_model(self, weights: Vec<f64>) -> ModelData {
        let max_xsize = self.engine.max_xsize();
        let xsize = if max_xsize > 0 {
            self.xsize.min(max_xsize)
        } else {
            self.xsize
        };
        let features = self
            .dictionary
            .iter()
            .map(|(key, id)| (key.to_string(), id))
            .collect();
        ModelData::new(
            1.0,
            xsize,
            self.labels,
            self.templates,
            features,
            weights,
        )
    }
}
