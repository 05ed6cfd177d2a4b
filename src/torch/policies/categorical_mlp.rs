//! Categorical MLP policy
use super::super::distributions::Categorical;
use super::super::modules::{Mlp, MlpConfig};
use super::super::params::ParamDict;
use super::{BuildPolicy, Policy};
use serde::{Deserialize, Serialize};
use tch::{nn::VarStore, Device, Tensor};

/// Configuration for [`CategoricalMlpPolicy`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalMlpPolicyConfig {
    pub mlp: MlpConfig,
}

impl BuildPolicy for CategoricalMlpPolicyConfig {
    type Policy = CategoricalMlpPolicy;

    fn build_policy(&self, observation_dim: usize, action_dim: usize) -> Self::Policy {
        CategoricalMlpPolicy::new(observation_dim, action_dim, self)
    }
}

/// Policy over a finite set of actions with logits given by an MLP.
///
/// Actions are `i64` indices in `0..action_dim`.
pub struct CategoricalMlpPolicy {
    vs: VarStore,
    mlp: Mlp,
}

impl CategoricalMlpPolicy {
    pub fn new(observation_dim: usize, action_dim: usize, config: &CategoricalMlpPolicyConfig) -> Self {
        let vs = VarStore::new(Device::Cpu);
        let mlp = Mlp::new(&(&vs.root() / "logits"), observation_dim, action_dim, &config.mlp);
        Self { vs, mlp }
    }
}

impl Policy for CategoricalMlpPolicy {
    type Distribution = Categorical;

    fn var_store(&self) -> &VarStore {
        &self.vs
    }

    fn params(&self) -> ParamDict {
        self.mlp.variables().shallow_clone()
    }

    fn distribution(&self, observations: &Tensor, params: &ParamDict) -> Categorical {
        Categorical::new(&self.mlp.forward(params, observations))
    }
}
