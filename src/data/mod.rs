//! Data loading, history indexing and feature engineering.

pub mod csv_loader;
pub mod features;
pub mod history;
pub mod split;
pub mod window;

pub use csv_loader::{load_observations, load_startlist, Observation};
pub use features::{FeatureBuilder, FeatureConfig, FeatureRecord};
pub use history::RiderHistoryIndex;
pub use split::split_by_date;
