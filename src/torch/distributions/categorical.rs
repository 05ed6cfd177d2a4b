//! Categorical distribution
use super::{clamp_float_min, DistInfo, PolicyDistribution};
use crate::BmamlError;
use tch::{Kind, Tensor};

/// Categorical distribution(s).
#[derive(Debug)]
pub struct Categorical {
    /// Log probability of each event.
    ///
    /// A float tensor of shape `[BATCH_SHAPE.., NUM_EVENTS]`.
    logits: Tensor,
}

impl Categorical {
    /// Initialze from possibly unnormalized log probabilities.
    ///
    /// The log probabilities are normalized by adding some value `C` to each
    /// such that `sum_i exp(log_prob[i] + C) = 1`.
    pub fn new(logits: &Tensor) -> Self {
        Self {
            logits: logits.log_softmax(-1, Kind::Float),
        }
    }

    /// Normalized log probabilities.
    pub const fn logits(&self) -> &Tensor {
        &self.logits
    }
}

impl PolicyDistribution for Categorical {
    const DIST_INFO_KEYS: &'static [&'static str] = &["prob"];

    fn from_dist_info(info: &DistInfo) -> Result<Self, BmamlError> {
        Ok(Self::new(&info.get("prob")?.log()))
    }

    fn dist_info(&self) -> DistInfo {
        DistInfo::new().with("prob", self.logits.exp())
    }

    /// Samples are i64 tensors of event indices.
    fn sample(&self) -> Tensor {
        let num_events = *self.logits.size().last().expect("logits have an event dim");
        let flat_probs = self.logits.exp().reshape(&[-1, num_events]);
        let mut batch_shape = self.logits.size();
        batch_shape.pop();
        flat_probs.multinomial(1, true).reshape(&batch_shape)
    }

    fn log_probs(&self, actions: &Tensor) -> Tensor {
        self.logits
            .gather(-1, &actions.to_kind(Kind::Int64).unsqueeze(-1), false)
            .squeeze_dim(-1)
    }

    fn entropy(&self) -> Tensor {
        let clamped_logits = clamp_float_min(&self.logits)
            .map_err(|kind| format!("logits must be f32 or f64, not {:?}", kind))
            .unwrap();
        -(clamped_logits * self.logits.exp()).sum_dim_intlist(&[-1], false, Kind::Float)
    }

    fn kl_divergence_from(&self, other: &Self) -> Tensor {
        let clamped_rel_logits = clamp_float_min(&(&self.logits - &other.logits))
            .map_err(|kind| format!("logits must be f32 or f64, not {:?}", kind))
            .unwrap();
        (clamped_rel_logits * self.logits.exp()).sum_dim_intlist(&[-1], false, Kind::Float)
    }
}
