//! Differentiable inner-loop adaptation of a particle ensemble
use super::samples::{SamplesData, TaskBatch};
use super::svpg::{couple_gradients, ParticleCoupling};
use crate::torch::distributions::PolicyDistribution;
use crate::torch::params::ParamDict;
use crate::torch::policies::Policy;
use crate::torch::utils;
use crate::BmamlError;
use tch::{Kind, Tensor};

/// Parameters of every particle after inner-loop adaptation to every task.
#[derive(Debug)]
pub struct Adaptation {
    /// Adapted parameters indexed by `[task][particle]`.
    ///
    /// Differentiable with respect to the initial particle parameters.
    pub params: Vec<Vec<ParamDict>>,
    /// Surrogate losses of the first inner step indexed by `[particle][task]`.
    pub init_surrogate_losses: Vec<Vec<Tensor>>,
    /// Kernel bandwidth of the first inner step averaged over tasks.
    ///
    /// Only present with more than one particle and at least one step.
    pub global_bandwidth: Option<Tensor>,
}

/// Policy gradient surrogate loss `-mean(log π(a|s) A)` of a batch.
pub fn surrogate_loss<P: Policy>(policy: &P, params: &ParamDict, batch: &TaskBatch) -> Tensor {
    let distribution = policy.distribution(batch.observations(), params);
    -(distribution.log_probs(batch.actions()) * batch.advantages()).mean(Kind::Float)
}

/// Check that a set of particle policies can be adapted together.
///
/// There must be at least one policy, none may be recurrent,
/// and all must have the same parameter names and shapes.
pub fn check_policies<P: Policy>(policies: &[P]) -> Result<(), BmamlError> {
    let first = policies
        .first()
        .ok_or_else(|| BmamlError::InvalidConfig("at least one particle is required".into()))?;
    let first_params = first.params();
    for (index, policy) in policies.iter().enumerate() {
        if policy.is_recurrent() {
            return Err(BmamlError::RecurrentPolicy);
        }
        let params = policy.params();
        if !params.same_structure(&first_params) {
            return Err(BmamlError::ParamStructure {
                index,
                expected: first_params.names().to_vec(),
                actual: params.names().to_vec(),
            });
        }
    }
    Ok(())
}

/// Adapt every particle to every task with `num_steps` inner gradient steps.
///
/// Step `j` uses the samples of step `j`, which must have been collected with the parameters
/// obtained after `j` steps. Within each task the gradients of all particles are coupled
/// before the update `θ ← θ - inner_step_size * ĝ`.
///
/// Every gradient is computed with `create_graph` so the adapted parameters can be
/// differentiated (to second order) with respect to the initial parameters.
pub fn adapt<P: Policy>(
    policies: &[P],
    samples: &SamplesData,
    num_steps: usize,
    inner_step_size: f64,
    coupling: ParticleCoupling,
) -> Result<Adaptation, BmamlError> {
    check_policies(policies)?;
    let num_particles = policies.len();
    if samples.num_particles() != num_particles {
        return Err(BmamlError::NumParticles {
            expected: num_particles,
            actual: samples.num_particles(),
        });
    }
    if samples.num_steps() < num_steps {
        return Err(BmamlError::NumSteps {
            expected: num_steps,
            actual: samples.num_steps(),
        });
    }
    let num_tasks = samples.num_tasks();

    let initial_params: Vec<_> = policies.iter().map(Policy::params).collect();
    let mut params: Vec<Vec<ParamDict>> = (0..num_tasks)
        .map(|_| initial_params.iter().map(ParamDict::shallow_clone).collect())
        .collect();
    let mut init_surrogate_losses: Vec<Vec<Tensor>> = (0..num_particles)
        .map(|_| Vec::with_capacity(num_tasks))
        .collect();
    let mut bandwidths = Vec::new();

    for step in 0..num_steps {
        for (task, task_params) in params.iter_mut().enumerate() {
            let mut grads = Vec::with_capacity(num_particles);
            for (particle, (policy, particle_params)) in
                policies.iter().zip(task_params.iter()).enumerate()
            {
                let loss = surrogate_loss(policy, particle_params, samples.get(particle, step, task));
                grads.push(particle_params.f_gradients(&loss, true)?);
                if step == 0 {
                    init_surrogate_losses[particle].push(loss);
                }
            }

            let params_flat = utils::f_stack_flat(task_params.iter().map(ParamDict::tensors))?;
            let grads_flat = utils::f_stack_flat(grads.iter().map(ParamDict::tensors))?;
            let (directions, bandwidth) = couple_gradients(&params_flat, &grads_flat, coupling);
            if let (0, Some(h)) = (step, bandwidth) {
                bandwidths.push(h);
            }

            *task_params = task_params
                .iter()
                .enumerate()
                .map(|(particle, particle_params)| -> Result<ParamDict, BmamlError> {
                    let direction = particle_params.f_unflatten_like(&directions.get(particle as i64))?;
                    Ok(particle_params.sgd_step(&direction, inner_step_size))
                })
                .collect::<Result<_, _>>()?;
        }
    }

    let global_bandwidth = if bandwidths.is_empty() {
        None
    } else {
        Some(Tensor::f_stack(&bandwidths, 0)?.sum(Kind::Float) / num_tasks as f64)
    };
    Ok(Adaptation {
        params,
        init_surrogate_losses,
        global_bandwidth,
    })
}
