//! Gaussian MLP policy
use super::super::distributions::DiagGaussian;
use super::super::modules::{Mlp, MlpConfig};
use super::super::params::ParamDict;
use super::{BuildPolicy, Policy};
use serde::{Deserialize, Serialize};
use tch::{
    nn::{Init, VarStore},
    Device, Tensor,
};

/// Configuration for [`GaussianMlpPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianMlpPolicyConfig {
    /// Network producing the action mean.
    pub mean_network: MlpConfig,
    /// Initial standard deviation of every action dimension.
    pub init_std: f64,
}

impl Default for GaussianMlpPolicyConfig {
    fn default() -> Self {
        Self {
            mean_network: MlpConfig::default(),
            init_std: 1.0,
        }
    }
}

impl BuildPolicy for GaussianMlpPolicyConfig {
    type Policy = GaussianMlpPolicy;

    fn build_policy(&self, observation_dim: usize, action_dim: usize) -> Self::Policy {
        GaussianMlpPolicy::new(observation_dim, action_dim, self)
    }
}

/// Policy over real vectors: a diagonal Gaussian with MLP mean and learned log std.
///
/// The standard deviation does not depend on the observation.
pub struct GaussianMlpPolicy {
    vs: VarStore,
    mean_network: Mlp,
    log_std: Tensor,
}

/// Parameter name of the state-independent log standard deviation.
const LOG_STD: &str = "log_std";

impl GaussianMlpPolicy {
    pub fn new(observation_dim: usize, action_dim: usize, config: &GaussianMlpPolicyConfig) -> Self {
        let vs = VarStore::new(Device::Cpu);
        let root = vs.root();
        let mean_network = Mlp::new(
            &(&root / "mean_network"),
            observation_dim,
            action_dim,
            &config.mean_network,
        );
        let log_std = root.var(
            LOG_STD,
            &[action_dim as i64],
            Init::Const(config.init_std.ln()),
        );
        Self {
            vs,
            mean_network,
            log_std,
        }
    }
}

impl Policy for GaussianMlpPolicy {
    type Distribution = DiagGaussian;

    fn var_store(&self) -> &VarStore {
        &self.vs
    }

    fn params(&self) -> ParamDict {
        let mut params = self.mean_network.variables().shallow_clone();
        params.insert(LOG_STD, self.log_std.shallow_clone());
        params
    }

    fn distribution(&self, observations: &Tensor, params: &ParamDict) -> DiagGaussian {
        let mean = self.mean_network.forward(params, observations);
        let log_std = params
            .get(LOG_STD)
            .unwrap_or_else(|| panic!("missing parameter {:?}", LOG_STD));
        DiagGaussian::new(mean, log_std.shallow_clone())
    }
}
