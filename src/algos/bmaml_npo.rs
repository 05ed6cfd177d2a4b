//! Bayesian MAML with a natural policy optimization outer step
//!
//! An ensemble of policy particles is adapted to each task with SVPG-coupled inner gradient
//! steps. Each particle is then updated in a trust region so that its adapted policies improve
//! on the samples they collected.
//!
//! # References
//! Yoon, Jaesik, et al. "Bayesian model-agnostic meta-learning."
//! Advances in Neural Information Processing Systems, 2018.
//! <https://arxiv.org/abs/1806.03836>
//!
//! Finn, Chelsea, Pieter Abbeel, and Sergey Levine.
//! "Model-agnostic meta-learning for fast adaptation of deep networks."
//! International Conference on Machine Learning. PMLR, 2017.
//! <https://arxiv.org/abs/1703.03400>
use super::adaptation::{self, surrogate_loss, Adaptation};
use super::samples::SamplesData;
use super::svpg::ParticleCoupling;
use crate::logging::{ScopedLogger, StatsLogger};
use crate::torch::distributions::PolicyDistribution;
use crate::torch::optimizers::{
    BuildOptimizer, ConjugateGradientOptimizer, ConjugateGradientOptimizerConfig,
    OptimizerStepError, TrustRegionOptimizer,
};
use crate::torch::policies::Policy;
use crate::BmamlError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tch::{Device, Kind, Tensor};

/// Configuration for [`BmamlNpo`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmamlNpoConfig {
    /// Number of tasks sampled per iteration.
    pub meta_batch_size: usize,
    /// Number of inner adaptation steps.
    pub num_grad_updates: usize,
    /// Step size of the inner gradient updates.
    pub inner_step_size: f64,
    /// Interaction between particle gradients in the inner updates.
    pub coupling: ParticleCoupling,
    /// Maximum mean KL divergence of the adapted policies in one outer step.
    pub max_policy_step_kl: f64,
    /// Outer trust region optimizer.
    pub optimizer: ConjugateGradientOptimizerConfig,
}

impl Default for BmamlNpoConfig {
    fn default() -> Self {
        Self {
            meta_batch_size: 20,
            num_grad_updates: 1,
            inner_step_size: 0.1,
            coupling: ParticleCoupling::default(),
            max_policy_step_kl: 0.01,
            optimizer: ConjugateGradientOptimizerConfig::default(),
        }
    }
}

impl BmamlNpoConfig {
    fn validate(&self) -> Result<(), BmamlError> {
        if self.meta_batch_size == 0 {
            return Err(BmamlError::InvalidConfig(
                "meta_batch_size must be positive".into(),
            ));
        }
        if !self.inner_step_size.is_finite() {
            return Err(BmamlError::InvalidConfig(format!(
                "inner_step_size must be finite, got {}",
                self.inner_step_size
            )));
        }
        if !(self.max_policy_step_kl > 0.0) {
            return Err(BmamlError::InvalidConfig(format!(
                "max_policy_step_kl must be positive, got {}",
                self.max_policy_step_kl
            )));
        }
        if let ParticleCoupling::Svpg { alpha } = self.coupling {
            if !(alpha > 0.0) {
                return Err(BmamlError::InvalidConfig(format!(
                    "svpg alpha must be positive, got {}",
                    alpha
                )));
            }
        }
        Ok(())
    }
}

/// Outer objective of one particle.
#[derive(Debug)]
pub struct MetaObjective {
    /// Likelihood ratio surrogate loss averaged over tasks.
    pub loss: Tensor,
    /// Mean `KL(sampling ‖ adapted)` over all samples of all tasks.
    pub mean_kl: Tensor,
    /// Maximum `KL(sampling ‖ adapted)` over all samples of all tasks.
    pub max_kl: Tensor,
    /// Kernel bandwidth of the first inner step averaged over tasks.
    ///
    /// Present with more than one particle and at least one inner step.
    pub bandwidth: Option<Tensor>,
}

/// Statistics of one outer policy step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyStepStats {
    pub loss_before: f64,
    pub loss_after: f64,
    pub mean_kl: f64,
    pub max_kl: f64,
    /// The reason the step was rejected, if it was.
    pub step_error: Option<OptimizerStepError>,
}

/// Bayesian MAML meta-learner with trust region outer updates.
pub struct BmamlNpo<P> {
    policies: Vec<P>,
    optimizers: Vec<ConjugateGradientOptimizer>,
    config: BmamlNpoConfig,
}

impl<P: Policy> BmamlNpo<P> {
    /// Create a meta-learner for a set of policy particles.
    ///
    /// The particles must have identical parameter structure and none may be recurrent.
    pub fn new(policies: Vec<P>, config: BmamlNpoConfig) -> Result<Self, BmamlError> {
        config.validate()?;
        adaptation::check_policies(&policies)?;
        let optimizers = policies
            .iter()
            .map(
                |policy| match config.optimizer.build_optimizer(policy.var_store()) {
                    Ok(optimizer) => optimizer,
                    Err(never) => match never {},
                },
            )
            .collect();
        Ok(Self {
            policies,
            optimizers,
            config,
        })
    }

    pub fn policies(&self) -> &[P] {
        &self.policies
    }

    pub const fn config(&self) -> &BmamlNpoConfig {
        &self.config
    }

    pub fn num_particles(&self) -> usize {
        self.policies.len()
    }

    /// Adapt all particles with the first `num_steps` steps of `samples`.
    ///
    /// Samplers use this to obtain the policies for collecting step `num_steps`.
    pub fn adapt(&self, samples: &SamplesData, num_steps: usize) -> Result<Adaptation, BmamlError> {
        if samples.num_tasks() != self.config.meta_batch_size && num_steps > 0 {
            return Err(BmamlError::NumTasks {
                expected: self.config.meta_batch_size,
                actual: samples.num_tasks(),
            });
        }
        adaptation::adapt(
            &self.policies,
            samples,
            num_steps,
            self.config.inner_step_size,
            self.config.coupling,
        )
    }

    /// Surrogate loss of each particle's unadapted policy on its step 0 samples.
    ///
    /// # Returns
    /// Loss values indexed by `[particle][task]`.
    pub fn init_surrogate_losses(&self, samples: &SamplesData) -> Result<Vec<Vec<f64>>, BmamlError> {
        self.check_samples(samples, 1)?;
        Ok(tch::no_grad(|| {
            self.policies
                .iter()
                .enumerate()
                .map(|(particle, policy)| {
                    let params = policy.params();
                    samples
                        .step(particle, 0)
                        .iter()
                        .map(|batch| surrogate_loss(policy, &params, batch).double_value(&[]))
                        .collect()
                })
                .collect()
        }))
    }

    /// Kernel bandwidth of the first inner step averaged over tasks.
    ///
    /// `None` if there is only one particle.
    pub fn global_bandwidth(&self, samples: &SamplesData) -> Result<Option<f64>, BmamlError> {
        self.check_samples(samples, 1)?;
        let adaptation = self.adapt(samples, 1)?;
        Ok(adaptation.global_bandwidth.map(|h| h.double_value(&[])))
    }

    /// Outer objective of one particle.
    ///
    /// The policies are adapted with the first `num_grad_updates` steps of all particles.
    /// The adapted policies of `particle` are evaluated against the distributions that
    /// collected its final step of samples.
    pub fn meta_objective(
        &self,
        samples: &SamplesData,
        particle: usize,
    ) -> Result<MetaObjective, BmamlError> {
        self.check_particle(particle)?;
        self.check_outer_samples(samples)?;

        let adaptation = self.adapt(samples, self.config.num_grad_updates)?;
        let policy = &self.policies[particle];
        let last_step = self.config.num_grad_updates;

        let mut losses = Vec::with_capacity(samples.num_tasks());
        let mut kls = Vec::with_capacity(samples.num_tasks());
        for (task, batch) in samples.step(particle, last_step).iter().enumerate() {
            let old_distribution = P::Distribution::from_dist_info(batch.dist_info())?;
            let distribution =
                policy.distribution(batch.observations(), &adaptation.params[task][particle]);

            let likelihood_ratio =
                distribution.likelihood_ratio(&old_distribution, batch.actions());
            losses.push(-(likelihood_ratio * batch.advantages()).mean(Kind::Float));
            kls.push(old_distribution.kl_divergence_from(&distribution));
        }

        let kls = Tensor::f_cat(&kls, 0)?;
        Ok(MetaObjective {
            loss: Tensor::f_stack(&losses, 0)?.mean(Kind::Float),
            mean_kl: kls.mean(Kind::Float),
            max_kl: kls.max(),
            bandwidth: adaptation.global_bandwidth,
        })
    }

    /// Take a trust region step on the parameters of one particle.
    ///
    /// # Args
    /// * `itr` - Training iteration number.
    /// * `samples` - Samples with `num_grad_updates + 1` steps of `meta_batch_size` tasks.
    /// * `particle` - Index of the particle to update.
    /// * `logger` - Logger for step statistics.
    ///
    /// A step that fails the trust region conditions leaves the parameters unchanged
    /// and is reported as a warning. NaN values are errors.
    pub fn optimize_policy(
        &self,
        itr: u64,
        samples: &SamplesData,
        particle: usize,
        logger: &mut dyn StatsLogger,
    ) -> Result<PolicyStepStats, BmamlError> {
        debug!("iteration {}: optimizing particle {}", itr, particle);
        self.check_particle(particle)?;
        self.check_outer_samples(samples)?;

        let before = self.meta_objective(samples, particle)?;
        let loss_before = before.loss.double_value(&[]);
        if particle == 0 {
            if let Some(global_h) = &before.bandwidth {
                logger.log_scalar("global_h", global_h.double_value(&[]));
            }
        }

        // An evaluation error is stashed and reported as a NaN loss so that the optimizer
        // rejects the step and restores the parameters.
        let eval_error = RefCell::new(None);
        let loss_kl_fn = || match self.meta_objective(samples, particle) {
            Ok(objective) => (objective.loss, objective.mean_kl),
            Err(err) => {
                eval_error.borrow_mut().get_or_insert(err);
                let nan = Tensor::full(&[], f64::NAN, (Kind::Float, Device::Cpu));
                (nan.shallow_clone(), nan)
            }
        };
        let result = self.optimizers[particle].trust_region_step(
            &loss_kl_fn,
            self.config.max_policy_step_kl,
            &mut ScopedLogger::new(logger, "optimizer"),
        );
        if let Some(err) = eval_error.into_inner() {
            return Err(err);
        }

        let step_error = match result {
            Ok(_) => None,
            Err(OptimizerStepError::NaNLoss) => return Err(BmamlError::NaNLoss),
            Err(OptimizerStepError::NaNConstraint) => return Err(BmamlError::NaNConstraint),
            Err(err) => {
                warn!("error in policy step of particle {}: {}", particle, err);
                logger.log_message("step_rejected", err.to_string());
                Some(err)
            }
        };

        let after = self.meta_objective(samples, particle)?;
        let stats = PolicyStepStats {
            loss_before,
            loss_after: after.loss.double_value(&[]),
            mean_kl: after.mean_kl.double_value(&[]),
            max_kl: after.max_kl.double_value(&[]),
            step_error,
        };

        logger.group_start();
        for (name, value) in [
            ("loss_before", stats.loss_before),
            ("loss_after", stats.loss_after),
            ("dloss", stats.loss_before - stats.loss_after),
            ("mean_kl_before", before.mean_kl.double_value(&[])),
            ("mean_kl", stats.mean_kl),
            ("max_kl", stats.max_kl),
        ] {
            if let Err(err) = logger.group_log(name.into(), value.into()) {
                warn!("{}", err);
            }
        }
        logger.group_end();
        Ok(stats)
    }

    /// Take a trust region step on every particle in index order.
    ///
    /// Later particles see the already updated parameters of earlier particles.
    pub fn optimize_all(
        &self,
        itr: u64,
        samples: &SamplesData,
        logger: &mut dyn StatsLogger,
    ) -> Result<Vec<PolicyStepStats>, BmamlError> {
        (0..self.num_particles())
            .map(|particle| self.optimize_policy(itr, samples, particle, logger))
            .collect()
    }

    fn check_particle(&self, particle: usize) -> Result<(), BmamlError> {
        if particle >= self.num_particles() {
            return Err(BmamlError::ParticleIndex {
                index: particle,
                num_particles: self.num_particles(),
            });
        }
        Ok(())
    }

    /// Check the sample dimensions, requiring at least `min_steps` steps.
    fn check_samples(&self, samples: &SamplesData, min_steps: usize) -> Result<(), BmamlError> {
        samples.check_shape(
            self.num_particles(),
            samples.num_steps().max(min_steps),
            self.config.meta_batch_size,
        )
    }

    /// Check the sample dimensions of an outer step and that the final step recorded the
    /// distribution info of the policy distribution.
    fn check_outer_samples(&self, samples: &SamplesData) -> Result<(), BmamlError> {
        samples.check_shape(
            self.num_particles(),
            self.config.num_grad_updates + 1,
            self.config.meta_batch_size,
        )?;
        for particle in 0..self.num_particles() {
            for batch in samples.step(particle, self.config.num_grad_updates) {
                batch
                    .dist_info()
                    .check_keys(P::Distribution::DIST_INFO_KEYS)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::adaptation::tests::policies;
    use super::super::samples::{tests::random_samples, TaskBatch};
    use super::*;
    use crate::logging::{Id, LogError, LogValue};
    use crate::torch::policies::{
        BuildPolicy, CategoricalMlpPolicy, GaussianMlpPolicy, GaussianMlpPolicyConfig,
    };
    use rstest::{fixture, rstest};
    use tch::{Device, Kind};

    fn config(meta_batch_size: usize) -> BmamlNpoConfig {
        BmamlNpoConfig {
            meta_batch_size,
            ..BmamlNpoConfig::default()
        }
    }

    /// Collect samples the way a sampler would: each step with the policies adapted so far.
    ///
    /// Advantages are rewards minus their mean.
    fn collect_samples<P: Policy>(
        algo: &BmamlNpo<P>,
        batch_size: i64,
        reward: fn(&Tensor) -> Tensor,
    ) -> SamplesData {
        let num_tasks = algo.config().meta_batch_size;
        let mut samples = SamplesData::empty(algo.num_particles());
        for step in 0..=algo.config().num_grad_updates {
            let adaptation = algo.adapt(&samples, step).unwrap();
            let initial: Vec<_> = algo.policies().iter().map(Policy::params).collect();
            let batches = (0..algo.num_particles())
                .map(|particle| {
                    (0..num_tasks)
                        .map(|task| {
                            let params = if step == 0 {
                                &initial[particle]
                            } else {
                                &adaptation.params[task][particle]
                            };
                            let observations =
                                Tensor::rand(&[batch_size, 3], (Kind::Float, Device::Cpu));
                            let distribution = algo.policies()[particle]
                                .distribution(&observations, params);
                            let actions = distribution.sample().detach();
                            let rewards = reward(&actions);
                            let advantages = &rewards - rewards.mean(Kind::Float);
                            TaskBatch::new(
                                observations,
                                actions,
                                advantages,
                                distribution.dist_info().detach(),
                            )
                            .unwrap()
                        })
                        .collect()
                })
                .collect();
            samples.push_step(batches).unwrap();
        }
        samples
    }

    fn first_action_rewarded(actions: &Tensor) -> Tensor {
        actions.eq(0).to_kind(Kind::Float)
    }

    fn actions_near_one_rewarded(actions: &Tensor) -> Tensor {
        -(actions - 1.0).square().sum_dim_intlist(&[-1], false, Kind::Float)
    }

    fn gaussian_policies(num_particles: usize) -> Vec<GaussianMlpPolicy> {
        (0..num_particles)
            .map(|_| GaussianMlpPolicyConfig::default().build_policy(3, 1))
            .collect()
    }

    fn flat_params<P: Policy>(algo: &BmamlNpo<P>) -> Vec<Tensor> {
        algo.policies()
            .iter()
            .map(|policy| policy.params().flatten().detach().copy())
            .collect()
    }

    /// Records scalar values by id.
    #[derive(Default)]
    struct Scalars(Vec<(String, f64)>);

    impl Scalars {
        fn get(&self, id: &str) -> Option<f64> {
            self.0.iter().find(|(name, _)| name == id).map(|(_, v)| *v)
        }
    }

    impl StatsLogger for Scalars {
        fn group_start(&mut self) {}
        fn group_log(&mut self, id: Id, value: LogValue) -> Result<(), LogError> {
            if let LogValue::Scalar(v) = value {
                self.0.push((id.to_string(), v));
            }
            Ok(())
        }
        fn group_end(&mut self) {}
        fn flush(&mut self) {}
    }

    #[fixture]
    fn algo() -> BmamlNpo<CategoricalMlpPolicy> {
        BmamlNpo::new(policies(2), config(2)).unwrap()
    }

    #[test]
    fn config_default() {
        let config = BmamlNpoConfig::default();
        assert_eq!(config.max_policy_step_kl, 0.01);
        assert_eq!(config.coupling, ParticleCoupling::Svpg { alpha: 1.0 });
        assert_eq!(config.optimizer.cg_iters, 10);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = BmamlNpoConfig {
            num_grad_updates: 2,
            coupling: ParticleCoupling::Independent,
            ..BmamlNpoConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let recovered: BmamlNpoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, config);
    }

    #[rstest]
    #[case(BmamlNpoConfig { meta_batch_size: 0, ..BmamlNpoConfig::default() })]
    #[case(BmamlNpoConfig { max_policy_step_kl: 0.0, ..BmamlNpoConfig::default() })]
    #[case(BmamlNpoConfig { inner_step_size: f64::NAN, ..BmamlNpoConfig::default() })]
    #[case(BmamlNpoConfig { coupling: ParticleCoupling::Svpg { alpha: -1.0 }, ..BmamlNpoConfig::default() })]
    fn invalid_config_rejected(#[case] config: BmamlNpoConfig) {
        assert!(matches!(
            BmamlNpo::new(policies(1), config),
            Err(BmamlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn no_particles_rejected() {
        let result = BmamlNpo::<CategoricalMlpPolicy>::new(Vec::new(), BmamlNpoConfig::default());
        assert!(matches!(result, Err(BmamlError::InvalidConfig(_))));
    }

    #[rstest]
    fn kl_zero_at_sampling_policy(algo: BmamlNpo<CategoricalMlpPolicy>) {
        let samples = collect_samples(&algo, 16, first_action_rewarded);
        for particle in 0..2 {
            let objective = algo.meta_objective(&samples, particle).unwrap();
            assert!(objective.mean_kl.double_value(&[]).abs() < 1e-5);
            assert!(objective.max_kl.double_value(&[]).abs() < 1e-5);
            // Likelihood ratios are 1 so the loss is minus the mean advantage: zero.
            assert!(objective.loss.double_value(&[]).abs() < 1e-5);
        }
    }

    #[test]
    fn steps_improve_within_trust_region() {
        tch::manual_seed(7);
        let algo = BmamlNpo::new(policies(2), config(2)).unwrap();
        let max_kl = algo.config().max_policy_step_kl;
        let mut accepted = 0;
        for itr in 0..4 {
            let samples = collect_samples(&algo, 64, first_action_rewarded);
            let initial = flat_params(&algo);
            let stats = algo.optimize_all(itr, &samples, &mut ()).unwrap();
            for (particle, stats) in stats.iter().enumerate() {
                let params = algo.policies()[particle].params().flatten();
                if stats.step_error.is_none() {
                    accepted += 1;
                    assert!(stats.loss_after < stats.loss_before, "{:?}", stats);
                    assert!(stats.mean_kl <= max_kl + 1e-6, "{:?}", stats);
                    assert_ne!(params, initial[particle]);
                } else {
                    assert_eq!(params, initial[particle]);
                }
            }
        }
        assert!(accepted > 0);
    }

    #[rstest]
    fn optimize_policy_leaves_other_particles(algo: BmamlNpo<CategoricalMlpPolicy>) {
        let samples = collect_samples(&algo, 32, first_action_rewarded);
        let other = algo.policies()[1].params().flatten().detach().copy();
        algo.optimize_policy(0, &samples, 0, &mut ()).unwrap();
        assert_eq!(algo.policies()[1].params().flatten(), other);
    }

    #[test]
    fn later_particles_see_earlier_updates() {
        tch::manual_seed(11);
        let stepwise = BmamlNpo::new(policies(2), config(2)).unwrap();
        tch::manual_seed(11);
        let all_at_once = BmamlNpo::new(policies(2), config(2)).unwrap();
        let initial = flat_params(&all_at_once);
        assert_eq!(flat_params(&stepwise), initial);

        let samples = collect_samples(&stepwise, 64, first_action_rewarded);
        let untouched_loss = stepwise
            .meta_objective(&samples, 1)
            .unwrap()
            .loss
            .double_value(&[]);

        let stats = all_at_once.optimize_all(0, &samples, &mut ()).unwrap();
        assert!(stats[0].step_error.is_none(), "{:?}", stats[0]);

        stepwise.optimize_policy(0, &samples, 0, &mut ()).unwrap();
        let expected = stepwise
            .meta_objective(&samples, 1)
            .unwrap()
            .loss
            .double_value(&[]);
        assert!((stats[1].loss_before - expected).abs() < 1e-9);
        // Coupled adaptation: moving particle 0 changes the adapted policies of particle 1.
        assert!(expected != untouched_loss);

        for (particle, stats) in stats.iter().enumerate() {
            let changed = all_at_once.policies()[particle].params().flatten() != initial[particle];
            assert_eq!(changed, stats.step_error.is_none(), "particle {}", particle);
        }
    }

    #[test]
    fn identical_particles_give_nan_loss() {
        let algo = BmamlNpo::new(policies(2), config(2)).unwrap();
        tch::no_grad(|| {
            let source = algo.policies()[0].params();
            for (dst, src) in algo.policies()[1].params().tensors().iter().zip(source.tensors()) {
                dst.shallow_clone().copy_(src);
            }
        });
        let initial = flat_params(&algo);
        let samples = random_samples(2, 2, 2);

        let result = algo.optimize_policy(0, &samples, 0, &mut ());
        assert!(matches!(result, Err(BmamlError::NaNLoss)), "{:?}", result);
        assert_eq!(flat_params(&algo), initial);
    }

    #[test]
    fn gaussian_ensemble() {
        tch::manual_seed(3);
        let algo = BmamlNpo::new(gaussian_policies(2), config(2)).unwrap();
        let samples = collect_samples(&algo, 32, actions_near_one_rewarded);
        for particle in 0..2 {
            let objective = algo.meta_objective(&samples, particle).unwrap();
            assert!(objective.mean_kl.double_value(&[]).abs() < 1e-5);
            assert!(objective.loss.double_value(&[]).abs() < 1e-5);
        }

        let stats = algo.optimize_all(0, &samples, &mut ()).unwrap();
        assert_eq!(stats.len(), 2);
        for stats in &stats {
            assert!(stats.loss_after.is_finite() && stats.mean_kl.is_finite());
            assert!(stats.loss_after <= stats.loss_before);
        }
    }

    #[test]
    fn missing_dist_info_key() {
        let algo = BmamlNpo::new(gaussian_policies(2), config(2)).unwrap();
        // Recorded by a categorical policy: "prob" only.
        let samples = random_samples(2, 2, 2);
        assert!(matches!(
            algo.optimize_policy(0, &samples, 0, &mut ()),
            Err(BmamlError::MissingDistInfo("log_std"))
        ));
    }

    #[rstest]
    fn global_bandwidth_logged_for_first_particle(algo: BmamlNpo<CategoricalMlpPolicy>) {
        let samples = collect_samples(&algo, 32, first_action_rewarded);
        let expected = algo.global_bandwidth(&samples).unwrap().unwrap();

        let mut first = Scalars::default();
        algo.optimize_policy(0, &samples, 0, &mut first).unwrap();
        let logged = first.get("global_h").unwrap();
        assert!((logged - expected).abs() < 1e-6);
        assert!(first.get("optimizer/initial_loss").is_some());

        let mut second = Scalars::default();
        algo.optimize_policy(0, &samples, 1, &mut second).unwrap();
        assert!(second.get("global_h").is_none());
    }

    #[rstest]
    fn particle_index_checked(algo: BmamlNpo<CategoricalMlpPolicy>) {
        let samples = random_samples(2, 2, 2);
        assert!(matches!(
            algo.optimize_policy(0, &samples, 2, &mut ()),
            Err(BmamlError::ParticleIndex {
                index: 2,
                num_particles: 2
            })
        ));
    }

    #[rstest]
    fn num_steps_checked(algo: BmamlNpo<CategoricalMlpPolicy>) {
        let samples = random_samples(2, 1, 2);
        assert!(matches!(
            algo.optimize_policy(0, &samples, 0, &mut ()),
            Err(BmamlError::NumSteps {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[rstest]
    fn num_tasks_checked(algo: BmamlNpo<CategoricalMlpPolicy>) {
        let samples = random_samples(2, 2, 3);
        assert!(matches!(
            algo.meta_objective(&samples, 0),
            Err(BmamlError::NumTasks {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn global_bandwidth_requires_particles() {
        let single = BmamlNpo::new(policies(1), config(2)).unwrap();
        let samples = random_samples(1, 2, 2);
        assert_eq!(single.global_bandwidth(&samples).unwrap(), None);

        let pair = BmamlNpo::new(policies(2), config(2)).unwrap();
        let samples = random_samples(2, 2, 2);
        assert!(pair.global_bandwidth(&samples).unwrap().unwrap() > 0.0);
    }

    #[rstest]
    fn init_surrogate_losses_shape(algo: BmamlNpo<CategoricalMlpPolicy>) {
        let samples = random_samples(2, 2, 2);
        let losses = algo.init_surrogate_losses(&samples).unwrap();
        assert_eq!(losses.len(), 2);
        assert!(losses.iter().all(|l| l.len() == 2 && l.iter().all(|v| v.is_finite())));
    }
}
