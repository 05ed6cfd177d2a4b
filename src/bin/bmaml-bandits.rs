use bmaml::algos::{BmamlNpo, BmamlNpoConfig, ParticleCoupling, SamplesData, TaskBatch};
use bmaml::logging::{DisplayLogger, StatsLogger};
use bmaml::torch::distributions::PolicyDistribution;
use bmaml::torch::optimizers::ConjugateGradientOptimizerConfig;
use bmaml::torch::policies::{BuildPolicy, CategoricalMlpPolicy, CategoricalMlpPolicyConfig, Policy};
use bmaml::torch::{MlpConfig, ParamDict};
use bmaml::BmamlError;
use clap::{ArgEnum, Parser};
use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tch::{Device, Kind, Tensor};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(
    name = "bmaml-bandits",
    author,
    about = "Meta-learn Bernoulli multi-armed bandits with a Bayesian ensemble of policies"
)]
pub struct Args {
    /// Random seed
    #[clap(long, default_value_t = 1)]
    pub seed: u64,

    /// Number of meta-training iterations
    #[clap(short = 'i', long, default_value_t = 100)]
    pub iterations: u64,

    /// Number of bandit arms
    #[clap(short = 'k', long, default_value_t = 5)]
    pub num_arms: usize,

    /// Number of policy particles
    #[clap(short = 'p', long, default_value_t = 4)]
    pub num_particles: usize,

    /// Number of tasks per iteration
    #[clap(short = 't', long, default_value_t = 10)]
    pub meta_batch_size: usize,

    /// Number of inner adaptation steps
    #[clap(long, default_value_t = 1)]
    pub num_grad_updates: usize,

    /// Number of arm pulls per particle, task and step
    #[clap(short = 'b', long, default_value_t = 20)]
    pub batch_size: i64,

    /// Interaction between particle gradients
    #[clap(long, arg_enum, default_value_t = Coupling::Svpg)]
    pub coupling: Coupling,

    /// SVPG temperature
    #[clap(long, default_value_t = 1.0)]
    pub alpha: f64,

    /// Inner gradient step size
    #[clap(long, default_value_t = 0.1)]
    pub inner_step_size: f64,

    /// Maximum mean KL divergence of an outer step
    #[clap(long, default_value_t = 0.01)]
    pub max_kl: f64,

    /// Policy hidden layer size
    #[clap(long, default_value_t = 32)]
    pub hidden_size: usize,

    /// Log debug messages
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ArgEnum)]
pub enum Coupling {
    /// Stein variational policy gradient
    Svpg,
    /// Independent policy gradients
    Vpg,
}

impl Args {
    fn algo_config(&self) -> BmamlNpoConfig {
        BmamlNpoConfig {
            meta_batch_size: self.meta_batch_size,
            num_grad_updates: self.num_grad_updates,
            inner_step_size: self.inner_step_size,
            coupling: match self.coupling {
                Coupling::Svpg => ParticleCoupling::Svpg { alpha: self.alpha },
                Coupling::Vpg => ParticleCoupling::Independent,
            },
            max_policy_step_kl: self.max_kl,
            optimizer: ConjugateGradientOptimizerConfig::default(),
        }
    }

    fn policy_config(&self) -> CategoricalMlpPolicyConfig {
        CategoricalMlpPolicyConfig {
            mlp: MlpConfig {
                hidden_sizes: vec![self.hidden_size],
                ..MlpConfig::default()
            },
        }
    }
}

/// A Bernoulli bandit: the success probability of each arm.
struct BanditTask {
    arm_probs: Vec<f64>,
}

impl BanditTask {
    fn sample<R: Rng>(num_arms: usize, rng: &mut R) -> Self {
        Self {
            arm_probs: (0..num_arms).map(|_| rng.gen()).collect(),
        }
    }

    fn pull<R: Rng>(&self, arm: i64, rng: &mut R) -> f32 {
        if rng.gen::<f64>() < self.arm_probs[arm as usize] {
            1.0
        } else {
            0.0
        }
    }
}

/// Pull arms with a policy and return the batch with its mean reward.
///
/// Advantages are rewards minus the batch mean reward.
fn collect_batch<R: Rng>(
    policy: &CategoricalMlpPolicy,
    params: &ParamDict,
    task: &BanditTask,
    batch_size: i64,
    rng: &mut R,
) -> Result<(TaskBatch, f64), BmamlError> {
    let observations = Tensor::ones(&[batch_size, 1], (Kind::Float, Device::Cpu));
    let distribution = policy.distribution(&observations, params);
    let actions = distribution.sample();
    let rewards: Vec<f32> = Vec::<i64>::from(&actions)
        .into_iter()
        .map(|arm| task.pull(arm, rng))
        .collect();
    let rewards = Tensor::of_slice(&rewards);
    let mean_reward = rewards.mean(Kind::Float);
    let advantages = &rewards - &mean_reward;
    let batch = TaskBatch::new(
        observations,
        actions,
        advantages,
        distribution.dist_info().detach(),
    )?;
    Ok((batch, mean_reward.double_value(&[])))
}

/// Collect the samples of one iteration.
///
/// # Returns
/// The samples and the mean reward of each step.
fn collect_samples<R: Rng>(
    algo: &BmamlNpo<CategoricalMlpPolicy>,
    tasks: &[BanditTask],
    batch_size: i64,
    rng: &mut R,
) -> Result<(SamplesData, Vec<f64>), BmamlError> {
    let num_particles = algo.num_particles();
    let initial_params: Vec<_> = algo.policies().iter().map(Policy::params).collect();
    let mut samples = SamplesData::empty(num_particles);
    let mut step_rewards = Vec::new();
    for step in 0..=algo.config().num_grad_updates {
        let adaptation = algo.adapt(&samples, step)?;
        let mut total_reward = 0.0;
        let mut step_batches = Vec::with_capacity(num_particles);
        for (particle, policy) in algo.policies().iter().enumerate() {
            let mut task_batches = Vec::with_capacity(tasks.len());
            for (i, task) in tasks.iter().enumerate() {
                let params = if step == 0 {
                    &initial_params[particle]
                } else {
                    &adaptation.params[i][particle]
                };
                let (batch, reward) = collect_batch(policy, params, task, batch_size, rng)?;
                total_reward += reward;
                task_batches.push(batch);
            }
            step_batches.push(task_batches);
        }
        samples.push_step(step_batches)?;
        step_rewards.push(total_reward / (num_particles * tasks.len()) as f64);
    }
    Ok((samples, step_rewards))
}

fn run(args: &Args) -> Result<(), BmamlError> {
    tch::manual_seed(args.seed as i64);
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let policy_config = args.policy_config();
    let policies = (0..args.num_particles)
        .map(|_| policy_config.build_policy(1, args.num_arms))
        .collect();
    let algo = BmamlNpo::new(policies, args.algo_config())?;
    info!("config: {:?}", algo.config());

    let mut logger: DisplayLogger = DisplayLogger::default();
    for itr in 0..args.iterations {
        let tasks: Vec<_> = (0..args.meta_batch_size)
            .map(|_| BanditTask::sample(args.num_arms, &mut rng))
            .collect();
        let (samples, step_rewards) = collect_samples(&algo, &tasks, args.batch_size, &mut rng)?;

        let pre_update = step_rewards[0];
        let post_update = step_rewards[step_rewards.len() - 1];
        logger.log_scalar("pre_update_reward", pre_update);
        logger.log_scalar("post_update_reward", post_update);
        info!(
            "iteration {}: pre-update reward {:.3}, post-update reward {:.3}",
            itr, pre_update, post_update
        );

        algo.optimize_all(itr, &samples, &mut logger)?;
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let log_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();
    if let Err(err) = run(&args) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
