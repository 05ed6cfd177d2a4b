//! Conjugate gradient optimizer
//!
//! Based on the [Python CGD implementation][garage_cgo] of the
//! [Garage Toolkit](https://github.com/rlworkgroup/garage).
//!
//! [garage_cgo]: https://github.com/rlworkgroup/garage/blob/90b60905b29cea8f8373c6732ced0cadf8489b0c/src/garage/torch/optimizers/conjugate_gradient_optimizer.py

// == MIT License For This File Only ==
//
// Copyright (c) 2019 Reinforcement Learning Working Group
// Copyright (c) 2021 Eric Langlois
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use super::super::utils;
use super::{BuildOptimizer, OptimizerStepError, TrustRegionOptimizer};
use crate::logging::StatsLogger;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tch::{nn::VarStore, Tensor};

/// [`ConjugateGradientOptimizer`] settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConjugateGradientOptimizerConfig {
    /// Iterations spent solving for the search direction.
    pub cg_iters: u64,
    /// Line search attempts before the step is rejected.
    pub max_backtracks: u64,
    /// Factor by which each line search attempt shrinks the step.
    pub backtrack_ratio: f64,
    /// Damping added to the constraint Hessian diagonal.
    pub hvp_reg_coeff: f64,
    /// Keep a step that improves the loss but exceeds the constraint bound.
    pub accept_violation: bool,
}

impl Default for ConjugateGradientOptimizerConfig {
    fn default() -> Self {
        Self {
            cg_iters: 10,
            max_backtracks: 15,
            backtrack_ratio: 0.8,
            hvp_reg_coeff: 1e-5,
            accept_violation: false,
        }
    }
}

impl BuildOptimizer for ConjugateGradientOptimizerConfig {
    type Optimizer = ConjugateGradientOptimizer;
    type Error = Infallible;

    fn build_optimizer(&self, vs: &VarStore) -> Result<ConjugateGradientOptimizer, Infallible> {
        Ok(ConjugateGradientOptimizer::new(vs, self.clone()))
    }
}

/// Trust region optimizer with a conjugate gradient search direction.
///
/// Each step solves `H x = g` approximately by conjugate gradient, where `g` is the loss
/// gradient and `H` is the Hessian of the constraint at the current parameters.
/// The direction is scaled to the edge of the trust region, `sqrt(2 δ / xᵀHx)`,
/// then shrunk geometrically until the loss improves and the constraint bound holds.
#[derive(Debug)]
pub struct ConjugateGradientOptimizer {
    /// Leaf tensors updated in place.
    params: Vec<Tensor>,
    config: ConjugateGradientOptimizerConfig,
}

impl ConjugateGradientOptimizer {
    /// Optimizer over all trainable variables of a variable store.
    pub fn new(vs: &VarStore, config: ConjugateGradientOptimizerConfig) -> Self {
        Self {
            params: vs.trainable_variables(),
            config,
        }
    }

    pub const fn config(&self) -> &ConjugateGradientOptimizerConfig {
        &self.config
    }
}

impl TrustRegionOptimizer for ConjugateGradientOptimizer {
    fn zero_grad(&self) {
        self.params.iter().for_each(utils::zero_grad);
    }

    fn trust_region_step(
        &self,
        loss_constraint_fn: &dyn Fn() -> (Tensor, Tensor),
        max_constraint: f64,
        logger: &mut dyn StatsLogger,
    ) -> Result<f64, OptimizerStepError> {
        let (loss, constraint) = loss_constraint_fn();
        let initial_loss = loss.double_value(&[]);
        logger.log_scalar("initial_loss", initial_loss);
        if initial_loss.is_nan() {
            return Err(OptimizerStepError::NaNLoss);
        }

        // Keep the graph: the constraint may share nodes with the loss.
        self.zero_grad();
        let loss_grad =
            utils::flatten_tensors(Tensor::run_backward(&[&loss], &self.params, true, false));

        let hessian = HessianVectorProduct::new(&constraint, &self.params, self.config.hvp_reg_coeff);

        let mut direction = conjugate_gradient(&hessian, &loss_grad, self.config.cg_iters, 1e-10);
        let _ = direction.nan_to_num_(0.0, None, None);

        let curvature = utils::flat_dot(&direction, &hessian.mat_vec_mul(&direction)).double_value(&[]);
        let step_size = (2.0 * max_constraint / (curvature + 1e-8)).sqrt();
        let step_size = if step_size.is_nan() { 1.0 } else { step_size };
        logger.log_scalar("initial_step_size", step_size);

        self.backtracking_line_search(
            &(direction * step_size),
            loss_constraint_fn,
            max_constraint,
            initial_loss,
            logger,
        )?;
        Ok(initial_loss)
    }
}

impl ConjugateGradientOptimizer {
    /// Search along `-full_step` for parameters satisfying the trust region conditions.
    ///
    /// Restores the initial parameters if no acceptable point is found.
    fn backtracking_line_search<F>(
        &self,
        full_step: &Tensor,
        loss_constraint_fn: &F,
        max_constraint: f64,
        initial_loss: f64,
        logger: &mut dyn StatsLogger,
    ) -> Result<(), OptimizerStepError>
    where
        F: Fn() -> (Tensor, Tensor) + ?Sized,
    {
        // Detached views share storage, so in-place updates are not recorded in the graph.
        let mut params: Vec<_> = self.params.iter().map(Tensor::detach).collect();
        let initial_params: Vec<_> = params.iter().map(Tensor::copy).collect();
        let shapes: Vec<_> = self.params.iter().map(Tensor::size).collect();
        let steps = utils::unflatten_tensors(full_step, &shapes);

        let mut loss = initial_loss;
        let mut constraint = f64::INFINITY;
        let mut backtracks = 0;
        let mut ratio = 1.0;
        while backtracks < self.config.max_backtracks {
            for ((param, initial), step) in params.iter_mut().zip(&initial_params).zip(&steps) {
                param.copy_(&(initial - step * ratio));
            }

            let (loss_tensor, constraint_tensor) = loss_constraint_fn();
            loss = loss_tensor.double_value(&[]);
            constraint = constraint_tensor.double_value(&[]);
            if loss < initial_loss && constraint <= max_constraint {
                break;
            }
            backtracks += 1;
            ratio *= self.config.backtrack_ratio;
        }

        logger.log_scalar("backtracks", backtracks as f64);
        logger.log_scalar("final_loss", loss);
        logger.log_scalar("final_constraint", constraint);

        let result = if loss.is_nan() {
            Err(OptimizerStepError::NaNLoss)
        } else if constraint.is_nan() {
            Err(OptimizerStepError::NaNConstraint)
        } else if loss >= initial_loss {
            Err(OptimizerStepError::LossNotImproving {
                loss,
                loss_before: initial_loss,
            })
        } else if constraint > max_constraint && !self.config.accept_violation {
            Err(OptimizerStepError::ConstraintViolated {
                constraint_val: constraint,
                max_constraint_value: max_constraint,
            })
        } else {
            Ok(())
        };

        if result.is_err() {
            for (param, initial) in params.iter_mut().zip(&initial_params) {
                param.copy_(initial);
            }
        }
        result
    }
}

/// Hessian-vector products of a scalar function by double backpropagation.
///
/// # Reference
/// Pearlmutter, Barak A. "Fast exact multiplication by the Hessian."
/// Neural computation 6.1 (1994): 147-160.
struct HessianVectorProduct<'a> {
    params: &'a [Tensor],
    /// Multiple of the identity added to the Hessian.
    reg_coeff: f64,
    shapes: Vec<Vec<i64>>,
    /// Differentiable gradient of the function with respect to each parameter.
    grads: Vec<Tensor>,
}

impl<'a> HessianVectorProduct<'a> {
    /// Prepare products with the Hessian of `output` with respect to `params`.
    pub fn new(output: &Tensor, params: &'a [Tensor], reg_coeff: f64) -> Self {
        for param in params {
            utils::zero_grad(param);
        }
        Self {
            params,
            reg_coeff,
            shapes: params.iter().map(Tensor::size).collect(),
            grads: Tensor::run_backward(&[output], params, true, true),
        }
    }
}

impl MatrixVectorProduct for HessianVectorProduct<'_> {
    type Vector = Tensor;

    fn mat_vec_mul(&self, vector: &Tensor) -> Tensor {
        let parts = utils::unflatten_tensors(vector, &self.shapes);
        assert_eq!(self.grads.len(), parts.len());
        let grad_dot_vector = self
            .grads
            .iter()
            .zip(&parts)
            .map(|(grad, part)| utils::flat_dot(grad, part))
            .fold(Tensor::zeros(&[], (vector.kind(), vector.device())), |acc, x| acc + x);

        let product = Tensor::run_backward(&[grad_dot_vector], self.params, true, false);
        utils::flatten_tensors(&product).g_add(&vector.g_mul_scalar(self.reg_coeff))
    }
}

/// A linear operator applied to vectors.
pub trait MatrixVectorProduct {
    type Vector;

    fn mat_vec_mul(&self, vector: &Self::Vector) -> Self::Vector;
}

impl MatrixVectorProduct for Tensor {
    type Vector = Self;

    fn mat_vec_mul(&self, vector: &Self) -> Self {
        self.mv(vector)
    }
}

/// Approximately solve `A x = b` for symmetric positive definite `A`.
///
/// Stops after `max_iters` iterations or once the squared residual norm drops below
/// `residual_tol`.
///
/// # Reference
/// <https://en.wikipedia.org/wiki/Conjugate_gradient_method>
fn conjugate_gradient<A>(a: &A, b: &Tensor, max_iters: u64, residual_tol: f64) -> Tensor
where
    A: MatrixVectorProduct<Vector = Tensor> + ?Sized,
{
    let mut x = b.zeros_like();
    let mut residual = b.copy();
    let mut direction = b.copy();
    let mut residual_sq = residual.dot(&residual);

    for _ in 0..max_iters {
        let a_direction = a.mat_vec_mul(&direction);
        let alpha = &residual_sq / direction.dot(&a_direction);
        let _ = x.addcmul_(&alpha, &direction);
        let _ = residual.addcmul_(&(-alpha), &a_direction);

        let next_residual_sq = residual.dot(&residual);
        if next_residual_sq.double_value(&[]) < residual_tol {
            break;
        }
        let beta = &next_residual_sq / &residual_sq;
        direction = &residual + direction * beta;
        residual_sq = next_residual_sq;
    }
    x
}

#[cfg(test)]
mod cg_optimizer {
    use super::super::testing;
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn reaches_target() {
        testing::check_reaches_target(&ConjugateGradientOptimizerConfig::default(), 500);
    }

    #[test]
    fn flat_loss_rejected_and_restored() {
        let vs = VarStore::new(Device::Cpu);
        let x = vs.root().ones("x", &[2]);
        let optimizer = ConjugateGradientOptimizerConfig::default()
            .build_optimizer(&vs)
            .unwrap();

        let x_start = x.detach().copy();
        let loss_constraint_fn = || {
            let loss = x.sum(Kind::Float) * 0.0 + 1.0;
            let constraint = (&x - &x_start).square().sum(Kind::Float);
            (loss, constraint)
        };
        let result = optimizer.trust_region_step(&loss_constraint_fn, 0.01, &mut ());
        assert!(matches!(
            result,
            Err(OptimizerStepError::LossNotImproving { .. })
        ));
        assert_eq!(x, x_start);
    }

    #[test]
    fn nan_loss() {
        let vs = VarStore::new(Device::Cpu);
        let x = vs.root().ones("x", &[2]);
        let optimizer = ConjugateGradientOptimizerConfig::default()
            .build_optimizer(&vs)
            .unwrap();

        let loss_constraint_fn = || {
            let loss = x.sum(Kind::Float) * f64::NAN;
            let constraint = x.square().sum(Kind::Float);
            (loss, constraint)
        };
        let result = optimizer.trust_region_step(&loss_constraint_fn, 0.01, &mut ());
        assert_eq!(result, Err(OptimizerStepError::NaNLoss));
    }

    #[test]
    fn config_fills_missing_fields() {
        let config: ConjugateGradientOptimizerConfig =
            serde_json::from_str(r#"{"cg_iters": 4}"#).unwrap();
        assert_eq!(config.cg_iters, 4);
        assert_eq!(config.max_backtracks, 15);
    }
}
