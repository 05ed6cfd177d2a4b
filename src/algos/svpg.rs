//! Stein variational coupling of particle gradients
//!
//! # Reference
//! Liu, Yang, et al. "Stein variational policy gradient."
//! Conference on Uncertainty in Artificial Intelligence, 2017.
//! <https://arxiv.org/abs/1704.02399>
use serde::{Deserialize, Serialize};
use tch::Tensor;

/// Euclidean distances between all pairs of particles.
///
/// # Args
/// * `particles` - Flattened particle parameters with shape `[NUM_PARTICLES, NUM_PARAMS]`.
///
/// # Returns
/// The condensed distance vector: `‖xᵢ - xⱼ‖` for every `i < j` in row-major order,
/// with shape `[NUM_PARTICLES * (NUM_PARTICLES - 1) / 2]`.
pub fn pairwise_distances(particles: &Tensor) -> Tensor {
    let n = particles.size()[0];
    let distances: Vec<_> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| (particles.get(i) - particles.get(j)).norm())
        .collect();
    if distances.is_empty() {
        return Tensor::zeros(&[0], (particles.kind(), particles.device()));
    }
    Tensor::stack(&distances, 0)
}

/// An RBF kernel evaluated on a set of particles.
#[derive(Debug)]
pub struct RbfKernel {
    /// Kernel matrix `K[i, j] = k(xᵢ, xⱼ)` with shape `[NUM_PARTICLES, NUM_PARTICLES]`.
    pub matrix: Tensor,
    /// Summed kernel gradients with shape `[NUM_PARTICLES, NUM_PARAMS]`.
    ///
    /// Row `i` is `Σⱼ ∇ₓⱼ k(xⱼ, xᵢ)`, the repulsive term of the Stein update.
    pub grad: Tensor,
    /// Scalar kernel bandwidth `h`.
    pub bandwidth: Tensor,
}

/// Evaluate an RBF kernel on a set of particles.
///
/// The bandwidth is chosen from the particles themselves:
/// `h = sqrt(0.5 * mean(‖xᵢ - xⱼ‖)² / ln(n + 1))`.
/// The kernel is `k(x, y) = exp(-‖x - y‖² / (2 h²))`.
///
/// All outputs are differentiable with respect to `particles`.
/// The bandwidth is zero (and the outputs NaN) if all particles are identical
/// and undefined for fewer than two particles.
///
/// # Args
/// * `particles` - Flattened particle parameters with shape `[NUM_PARTICLES, NUM_PARAMS]`.
pub fn rbf_kernel(particles: &Tensor) -> RbfKernel {
    let n = particles.size()[0];
    let mean_distance = pairwise_distances(particles).mean(particles.kind());
    let bandwidth = (mean_distance.square() * 0.5 / ((n + 1) as f64).ln()).sqrt();

    let h_squared = bandwidth.square();
    let squared_distances = (particles.unsqueeze(1) - particles.unsqueeze(0))
        .square()
        .sum_dim_intlist(&[-1], false, particles.kind());
    let matrix = (-squared_distances / &h_squared / 2.0).exp();

    let kernel_sum = matrix.sum_dim_intlist(&[1], true, particles.kind());
    let grad = (particles * kernel_sum - matrix.matmul(particles)) / &h_squared;
    RbfKernel {
        matrix,
        grad,
        bandwidth,
    }
}

/// How the inner-loop gradients of the particles interact.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParticleCoupling {
    /// Stein variational policy gradient with temperature `alpha`.
    Svpg { alpha: f64 },
    /// Every particle follows its own policy gradient.
    Independent,
}

impl Default for ParticleCoupling {
    fn default() -> Self {
        Self::Svpg { alpha: 1.0 }
    }
}

/// Combine the gradients of all particles.
///
/// # Args
/// * `params` - Flattened particle parameters with shape `[NUM_PARTICLES, NUM_PARAMS]`.
/// * `grads` - Flattened loss gradients of each particle, with the same shape.
/// * `coupling` - The gradient interaction.
///
/// # Returns
/// The descent direction of each particle (shape `[NUM_PARTICLES, NUM_PARAMS]`)
/// and the kernel bandwidth if there is more than one particle.
/// For `Independent` coupling the bandwidth is still evaluated so that it can be reported.
pub fn couple_gradients(
    params: &Tensor,
    grads: &Tensor,
    coupling: ParticleCoupling,
) -> (Tensor, Option<Tensor>) {
    let n = params.size()[0];
    if n <= 1 {
        return (grads.shallow_clone(), None);
    }
    let kernel = rbf_kernel(params);
    let directions = match coupling {
        ParticleCoupling::Svpg { alpha } => {
            (kernel.matrix.matmul(&(grads / alpha)) - &kernel.grad) / n as f64
        }
        ParticleCoupling::Independent => grads.shallow_clone(),
    };
    (directions, Some(kernel.bandwidth))
}
