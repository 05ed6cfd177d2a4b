//! Policies with explicitly supplied parameters
mod categorical_mlp;
mod gaussian_mlp;

pub use categorical_mlp::{CategoricalMlpPolicy, CategoricalMlpPolicyConfig};
pub use gaussian_mlp::{GaussianMlpPolicy, GaussianMlpPolicyConfig};

use super::distributions::PolicyDistribution;
use super::params::ParamDict;
use tch::{nn::VarStore, Tensor};

/// A stochastic policy that can be evaluated with arbitrary parameter values.
///
/// The policy owns a set of trainable variables but [`Policy::distribution`] may be called with
/// any [`ParamDict`] of the same structure. This is what allows policies to be evaluated at
/// parameters obtained by differentiable inner-loop gradient steps.
pub trait Policy {
    type Distribution: PolicyDistribution;

    /// The variable store holding the trainable policy variables.
    fn var_store(&self) -> &VarStore;

    /// The trainable policy variables.
    ///
    /// The tensors share storage (and gradients) with the variables in [`Policy::var_store`].
    fn params(&self) -> ParamDict;

    /// Action distributions for a batch of observations.
    ///
    /// # Args
    /// * `observations` - Observations with shape `[BATCH_SIZE, OBS_DIM]`.
    /// * `params` - Policy parameters with the same structure as [`Policy::params`].
    fn distribution(&self, observations: &Tensor, params: &ParamDict) -> Self::Distribution;

    /// Whether the policy carries hidden state across steps.
    fn is_recurrent(&self) -> bool {
        false
    }
}

/// Build a [`Policy`].
pub trait BuildPolicy {
    type Policy: Policy;

    /// Build a policy for the given observation and action dimensions.
    ///
    /// Every call creates a new variable store with freshly initialized variables.
    fn build_policy(&self, observation_dim: usize, action_dim: usize) -> Self::Policy;
}
