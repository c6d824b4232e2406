use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::thread;

use log::{info, warn};

use super::allocator::Allocator;
use super::feature_index::FeatureIndex;
use super::model_writer::{ModelData, ModelWriter};
use super::tagger::TrainingSentence;
use crate::dataset::Corpus;
use crate::error::{Error, Result};
use crate::template::Templates;

mod crf;
mod mira;

/// Training algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// L2-regularized CRF optimized with L-BFGS
    #[default]
    CrfL2,
    /// L1-regularized CRF optimized with OWL-QN
    CrfL1,
    /// 1-best MIRA
    Mira,
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "crf" | "crf-l2" => Ok(Algorithm::CrfL2),
            "crf-l1" => Ok(Algorithm::CrfL1),
            "mira" => Ok(Algorithm::Mira),
            _ => Err(Error::config(format!("unknown algorithm: {}", s))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::CrfL2 => "crf-l2",
            Algorithm::CrfL1 => "crf-l1",
            Algorithm::Mira => "mira",
        };
        f.write_str(name)
    }
}

/// Training parameters.
#[derive(Debug, Clone)]
pub struct TrainerParams {
    freq: u32,
    max_iterations: usize,
    cost: f64,
    eta: f64,
    threads: usize,
    shrinking_size: usize,
    algorithm: Algorithm,
    text_model: bool,
}

impl Default for TrainerParams {
    fn default() -> Self {
        Self {
            freq: 1,
            max_iterations: 100_000,
            cost: 1.0,
            eta: 0.0001,
            threads: 0,
            shrinking_size: 20,
            algorithm: Algorithm::default(),
            text_model: false,
        }
    }
}

impl TrainerParams {
    /// Minimum number of occurrences for a feature to be kept
    pub fn freq(&self) -> u32 {
        self.freq
    }

    pub fn set_freq(&mut self, freq: u32) {
        self.freq = freq;
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        if max_iterations < 1 {
            return Err(Error::config("maxiter must be at least 1"));
        }
        self.max_iterations = max_iterations;
        Ok(())
    }

    /// Hyper-parameter C trading data fit against regularization
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn set_cost(&mut self, cost: f64) -> Result<()> {
        if !(cost > 0.0) {
            return Err(Error::config("cost must be > 0.0"));
        }
        self.cost = cost;
        Ok(())
    }

    /// Stopping tolerance on the relative objective change
    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn set_eta(&mut self, eta: f64) -> Result<()> {
        if !(eta > 0.0) {
            return Err(Error::config("eta must be > 0.0"));
        }
        self.eta = eta;
        Ok(())
    }

    /// Worker threads, 0 means one per available CPU
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads;
    }

    /// Epochs a correctly tagged sentence may stay correct before MIRA
    /// stops visiting it
    pub fn shrinking_size(&self) -> usize {
        self.shrinking_size
    }

    pub fn set_shrinking_size(&mut self, shrinking_size: usize) -> Result<()> {
        if shrinking_size < 1 {
            return Err(Error::config("shrinking-size must be >= 1"));
        }
        self.shrinking_size = shrinking_size;
        Ok(())
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = algorithm;
    }

    /// Also write `<model>.txt`
    pub fn text_model(&self) -> bool {
        self.text_model
    }

    pub fn set_text_model(&mut self, text_model: bool) {
        self.text_model = text_model;
    }

    /// Number of workers the run will use
    fn resolve_threads(&self) -> usize {
        let auto = || thread::available_parallelism().map_or(1, |n| n.get());
        match self.algorithm {
            Algorithm::Mira => {
                if self.threads > 1 {
                    warn!("MIRA does not support multi-threading, using 1 thread");
                }
                1
            }
            _ if self.threads == 0 => auto(),
            _ => self.threads,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid value for {}: {}", name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::config(format!("invalid value for {}: {}", name, value))),
    }
}

/// CRF trainer
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    params: TrainerParams,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(algorithm: Algorithm) -> Self {
        let mut params = TrainerParams::default();
        params.set_algorithm(algorithm);
        Self { params }
    }

    /// Get training parameters
    pub fn params(&self) -> &TrainerParams {
        &self.params
    }

    /// Get training parameters for mutation
    pub fn params_mut(&mut self) -> &mut TrainerParams {
        &mut self.params
    }

    /// Set a parameter by name
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "freq" => self.params.set_freq(parse(name, value)?),
            "maxiter" => self.params.set_max_iterations(parse(name, value)?)?,
            "cost" => self.params.set_cost(parse(name, value)?)?,
            "eta" => self.params.set_eta(parse(name, value)?)?,
            "thread" => self.params.set_threads(parse(name, value)?),
            "shrinking-size" => self.params.set_shrinking_size(parse(name, value)?)?,
            "algorithm" => self.params.set_algorithm(value.trim().parse()?),
            "textmodel" => self.params.set_text_model(parse_bool(name, value)?),
            _ => return Err(Error::config(format!("unknown parameter: {}", name))),
        }
        Ok(())
    }

    /// Get a parameter by name
    pub fn get(&self, name: &str) -> Result<String> {
        let value = match name {
            "freq" => self.params.freq.to_string(),
            "maxiter" => self.params.max_iterations.to_string(),
            "cost" => self.params.cost.to_string(),
            "eta" => self.params.eta.to_string(),
            "thread" => self.params.threads.to_string(),
            "shrinking-size" => self.params.shrinking_size.to_string(),
            "algorithm" => self.params.algorithm.to_string(),
            "textmodel" => self.params.text_model.to_string(),
            _ => return Err(Error::config(format!("unknown parameter: {}", name))),
        };
        Ok(value)
    }

    /// Set minimum feature frequency (builder pattern)
    pub fn with_freq(mut self, freq: u32) -> Self {
        self.params.set_freq(freq);
        self
    }

    /// Set maximum iterations (builder pattern)
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        self.params.set_max_iterations(max_iterations)?;
        Ok(self)
    }

    /// Set the hyper-parameter C (builder pattern)
    pub fn with_cost(mut self, cost: f64) -> Result<Self> {
        self.params.set_cost(cost)?;
        Ok(self)
    }

    /// Set the stopping tolerance (builder pattern)
    pub fn with_eta(mut self, eta: f64) -> Result<Self> {
        self.params.set_eta(eta)?;
        Ok(self)
    }

    /// Set the number of worker threads (builder pattern)
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.params.set_threads(threads);
        self
    }

    /// Set the MIRA shrinking window (builder pattern)
    pub fn with_shrinking_size(mut self, shrinking_size: usize) -> Result<Self> {
        self.params.set_shrinking_size(shrinking_size)?;
        Ok(self)
    }

    /// Also write a text model next to the binary one (builder pattern)
    pub fn with_text_model(mut self, text_model: bool) -> Self {
        self.params.set_text_model(text_model);
        self
    }

    /// Train from a template file and training text, writing the model to
    /// `model_path` only once training has succeeded.
    pub fn learn<P, Q, R>(&self, template_path: P, train_path: Q, model_path: R) -> Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
    {
        let templates = BufReader::new(File::open(template_path.as_ref())?);
        let data = BufReader::new(File::open(train_path.as_ref())?);
        let model = self.train(templates, data)?;
        ModelWriter::save(&model, model_path, self.params.text_model)
    }

    /// Train from readers over a template file and training text
    pub fn train<T: BufRead, D: BufRead>(&self, templates: T, data: D) -> Result<ModelData> {
        let templates = Templates::read(templates)?;
        let corpus = Corpus::read(data)?;
        self.train_corpus(templates, corpus)
    }

    /// Train on an already parsed corpus
    pub fn train_corpus(&self, templates: Templates, corpus: Corpus) -> Result<ModelData> {
        let thread_num = self.params.resolve_threads();
        let (sentences, labels, xsize) = corpus.into_parts();
        if sentences.is_empty() {
            warn!("training data is empty");
        }

        let mut index = FeatureIndex::new(templates, labels, xsize);
        let mut allocator = Allocator::new(thread_num);
        let mut samples = Vec::with_capacity(sentences.len());
        for (i, sentence) in sentences.iter().enumerate() {
            let feature_id = index.build_features(sentence, allocator.feature_cache_mut())?;
            let answers = index.answers(sentence)?;
            samples.push(TrainingSentence::new(answers, feature_id, i % thread_num));
        }
        drop(sentences);
        index.shrink(self.params.freq, allocator.feature_cache_mut());

        info!("Number of sentences: {}", samples.len());
        info!("Number of features:  {}", index.max_id());
        info!("Number of thread(s): {}", thread_num);
        info!("Freq:                {}", self.params.freq);
        info!("eta:                 {}", self.params.eta);
        info!("C:                   {}", self.params.cost);
        info!("shrinking size:      {}", self.params.shrinking_size);

        let mut weights = vec![0.0; index.max_id()];
        match self.params.algorithm {
            Algorithm::CrfL2 => {
                crf::run(&samples, &index, &mut allocator, &mut weights, &self.params, false)?
            }
            Algorithm::CrfL1 => {
                crf::run(&samples, &index, &mut allocator, &mut weights, &self.params, true)?
            }
            Algorithm::Mira => {
                mira::run(&samples, &index, &mut allocator, &mut weights, &self.params)?
            }
        }

        allocator.clear();
        Ok(index.into_model(weights))
    }
}
