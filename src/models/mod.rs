//! Mixture model, scoring and threshold components

pub mod mixture;
pub mod scoring;
pub mod threshold;

pub use mixture::{FittedMixture, MixtureFitter, Posteriors};
pub use scoring::max_probability;
pub use threshold::ThresholdSelector;
