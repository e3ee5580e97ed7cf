//! VeloPredict - Cyclocross race outcome prediction
//!
//! This library provides:
//! - Leakage-safe feature engineering over historical race results
//! - Top-10 and Top-3 probability prediction using ONNX classifiers
//! - Startlist scoring with new-rider and doubtful-starter handling
//! - Post-race validation of saved predictions
//!
//! # Example
//!
//! ```no_run
//! use velopredict::data::{load_observations, FeatureBuilder, FeatureConfig};
//!
//! let observations = load_observations("data/results.csv").unwrap();
//! let builder = FeatureBuilder::new(FeatureConfig::default());
//! let features = builder.build(&observations);
//! println!("derived {} feature rows", features.len());
//! ```

pub mod assembler;
pub mod bundle;
pub mod data;
pub mod error;
pub mod models;
pub mod names;
pub mod predictor;
pub mod validation;

// Re-export commonly used types
pub use bundle::{ModelBundle, ModelMetadata};
pub use data::{
    split_by_date, FeatureBuilder, FeatureConfig, FeatureRecord, Observation, RiderHistoryIndex,
};
pub use error::{Error, Result};
pub use models::{Decision, PredictionRecord, RiderStatus};
pub use predictor::Predictor;
pub use validation::{validate, ValidationReport};

pub use data::csv_loader::{load_feature_table, load_observations, load_startlist, write_feature_table};
