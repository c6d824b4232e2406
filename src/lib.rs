//! Linear-chain Conditional Random Field training in the style of CRF++
//!
//! Feature templates such as `U00:%x[-1,0]/%x[0,0]` are expanded over
//! column-formatted training text, weights are fitted with L-BFGS (L2),
//! OWL-QN (L1) or 1-best MIRA, and the result is written as a compact binary
//! model, optionally mirrored as text.
//!
//! # Examples
//!
//! ## Training
//!
//! ```no_run
//! use crfpp::{Algorithm, Trainer};
//!
//! let trainer = Trainer::new(Algorithm::CrfL2)
//!     .with_cost(4.0)?
//!     .with_threads(4)
//!     .with_text_model(true);
//! trainer.learn("template", "train.data", "model")?;
//! # Ok::<(), crfpp::Error>(())
//! ```
//!
//! ## Inspecting a model
//!
//! ```no_run
//! use crfpp::Model;
//!
//! let buf = std::fs::read("model")?;
//! let model = Model::new(&buf)?;
//! println!("labels: {:?}", model.labels());
//! if let Some(id) = model.feature_id("U00:He") {
//!     println!("weights: {:?}", &model.weights()[id as usize..][..model.labels().len()]);
//! }
//! # Ok::<(), crfpp::Error>(())
//! ```

mod dataset;
mod dictionary;
mod error;
mod model;
mod template;

/// Training module containing all components for training CRF models
pub mod train;

pub use self::dataset::{Corpus, Sentence};
pub use self::dictionary::{try_add_feature, FeatureId, FeatureLookup, FrozenDictionary, NO_FEATURE};
pub use self::error::{Error, Result};
pub use self::model::Model;
pub use self::template::{TemplateEngine, TemplateKind, Templates, MAX_CONTEXT_SIZE};

// Re-export training types for convenience
pub use self::train::{Algorithm, ModelData, ModelWriter, Trainer, TrainerParams};
