//! Training module for CRF models
//!
//! Templates are expanded over the training text into a feature dictionary
//! and a per-position feature cache. Every gradient evaluation rebuilds each
//! sentence's lattice from that cache inside a per-thread arena.

mod allocator;
mod dictionary;
mod feature_cache;
mod feature_index;
mod lattice;
mod model_writer;
mod tagger;
mod trainer;

pub use self::allocator::{Allocator, Arena};
pub use self::dictionary::{DictionaryBuilder, IdRemap};
pub use self::feature_cache::FeatureCache;
pub use self::feature_index::FeatureIndex;
pub use self::lattice::{FeatureSpace, Lattice, Node, NodeId, Path, PathId};
pub use self::model_writer::{ModelData, ModelWriter, MODEL_VERSION};
pub use self::tagger::{SentenceProcessor, TrainingSentence};
pub use self::trainer::{Algorithm, Trainer, TrainerParams};
