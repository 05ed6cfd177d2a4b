//! Constrained policy optimizers
mod conjugate_gradient;

pub use conjugate_gradient::{ConjugateGradientOptimizer, ConjugateGradientOptimizerConfig};

use crate::logging::StatsLogger;
use std::error::Error;
use tch::{nn::VarStore, Tensor};
use thiserror::Error;

/// Minimizes a loss subject to an upper bound on a constraint value for each step.
pub trait TrustRegionOptimizer {
    /// Clear the accumulated gradients of every optimized tensor.
    fn zero_grad(&self);

    /// Take one step in place.
    ///
    /// # Args
    /// * `loss_constraint_fn` - Evaluates the scalar loss and the scalar constraint value at
    ///     the current parameters. The constraint must be zero at the start of the step and
    ///     is typically a divergence from the pre-step policy.
    /// * `max_constraint` - Upper bound on the constraint after the step.
    /// * `logger` - Receives per-step statistics.
    ///
    /// # Returns
    /// The loss before the step.
    /// On error the parameters are left at their pre-step values.
    fn trust_region_step(
        &self,
        loss_constraint_fn: &dyn Fn() -> (Tensor, Tensor),
        max_constraint: f64,
        logger: &mut dyn StatsLogger,
    ) -> Result<f64, OptimizerStepError>;
}

/// Why a trust region step was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum OptimizerStepError {
    #[error("no step improved the loss {loss_before} (last tried {loss})")]
    LossNotImproving { loss: f64, loss_before: f64 },
    #[error("constraint {constraint_val} exceeds the bound {max_constraint_value}")]
    ConstraintViolated {
        constraint_val: f64,
        max_constraint_value: f64,
    },
    #[error("loss is NaN")]
    NaNLoss,
    #[error("constraint is NaN")]
    NaNConstraint,
}

/// Configuration that builds an optimizer over a variable store.
pub trait BuildOptimizer {
    type Optimizer;
    type Error: Error;

    fn build_optimizer(&self, vs: &VarStore) -> Result<Self::Optimizer, Self::Error>;
}
