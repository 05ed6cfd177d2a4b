//! Torch statistical distributions
//!
//! These types are all capable of representing a batch of distributions, with arbitrary batch
//! shape. The return values of statistics methods are tensors with the same batch shape.
mod categorical;
mod diag_gaussian;

pub use categorical::Categorical;
pub use diag_gaussian::DiagGaussian;

use crate::BmamlError;
use std::collections::BTreeMap;
use tch::{Kind, Tensor};

/// Named tensors describing a batch of action distributions.
///
/// Recorded by the sampler alongside each trajectory batch so that the sampling-time
/// distribution can be reconstructed later (for likelihood ratios and KL constraints).
#[derive(Debug, Default)]
pub struct DistInfo(BTreeMap<&'static str, Tensor>);

impl DistInfo {
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add an entry, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: Tensor) -> Self {
        self.0.insert(key, value);
        self
    }

    /// Get the tensor for a key.
    pub fn get(&self, key: &'static str) -> Result<&Tensor, BmamlError> {
        self.0.get(key).ok_or(BmamlError::MissingDistInfo(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    /// Check that every one of `keys` is present.
    pub fn check_keys(&self, keys: &[&'static str]) -> Result<(), BmamlError> {
        match keys.iter().find(|key| !self.0.contains_key(*key)) {
            Some(key) => Err(BmamlError::MissingDistInfo(*key)),
            None => Ok(()),
        }
    }

    /// Copy detached from the computation graph.
    pub fn detach(&self) -> Self {
        Self(self.0.iter().map(|(k, v)| (*k, v.detach())).collect())
    }
}

/// A batch of action distributions produced by a policy.
pub trait PolicyDistribution: Sized {
    /// Keys of the [`DistInfo`] tensors that define the distribution.
    const DIST_INFO_KEYS: &'static [&'static str];

    /// Reconstruct a distribution from recorded info.
    fn from_dist_info(info: &DistInfo) -> Result<Self, BmamlError>;

    /// Describe the distribution as a set of named tensors.
    fn dist_info(&self) -> DistInfo;

    /// Sample one action from each distribution in the batch.
    fn sample(&self) -> Tensor;

    /// Log probabilities of the given actions.
    ///
    /// # Returns
    /// A tensor with shape `[BATCH_SHAPE...]`.
    fn log_probs(&self, actions: &Tensor) -> Tensor;

    /// Distribution entropies with shape `[BATCH_SHAPE...]`.
    fn entropy(&self) -> Tensor;

    /// The KL divergence `KL(self || other)` with shape `[BATCH_SHAPE...]`.
    fn kl_divergence_from(&self, other: &Self) -> Tensor;

    /// Ratio of action likelihoods under `self` relative to `old`.
    fn likelihood_ratio(&self, old: &Self, actions: &Tensor) -> Tensor {
        (self.log_probs(actions) - old.log_probs(actions)).exp()
    }
}

/// Clamp float values to be >= the smallest finite float value. (private helper)
fn clamp_float_min(x: &Tensor) -> Result<Tensor, Kind> {
    match x.kind() {
        Kind::Float => Ok(x.clamp_min(f64::from(f32::MIN))),
        Kind::Double => Ok(x.clamp_min(f64::MIN)),
        kind => Err(kind),
    }
}
