//! Diagonal Gaussian distribution
use super::{DistInfo, PolicyDistribution};
use crate::BmamlError;
use std::f64::consts::PI;
use tch::{Kind, Tensor};

/// Multivariate Gaussian distribution(s) with diagonal covariance.
#[derive(Debug)]
pub struct DiagGaussian {
    /// Mean. A float tensor of shape `[BATCH_SHAPE.., DIM]`.
    mean: Tensor,
    /// Log standard deviation. Broadcastable to the shape of `mean`.
    log_std: Tensor,
}

impl DiagGaussian {
    pub fn new(mean: Tensor, log_std: Tensor) -> Self {
        let log_std = log_std.expand_as(&mean);
        Self { mean, log_std }
    }

    pub const fn mean(&self) -> &Tensor {
        &self.mean
    }

    pub const fn log_std(&self) -> &Tensor {
        &self.log_std
    }
}

impl PolicyDistribution for DiagGaussian {
    const DIST_INFO_KEYS: &'static [&'static str] = &["log_std", "mean"];

    fn from_dist_info(info: &DistInfo) -> Result<Self, BmamlError> {
        Ok(Self::new(
            info.get("mean")?.shallow_clone(),
            info.get("log_std")?.shallow_clone(),
        ))
    }

    fn dist_info(&self) -> DistInfo {
        DistInfo::new()
            .with("mean", self.mean.shallow_clone())
            .with("log_std", self.log_std.shallow_clone())
    }

    fn sample(&self) -> Tensor {
        &self.mean + self.log_std.exp() * self.mean.randn_like()
    }

    fn log_probs(&self, actions: &Tensor) -> Tensor {
        let dim = *self.mean.size().last().expect("mean has an event dim") as f64;
        let z = (actions - &self.mean) * (-&self.log_std).exp();
        -0.5 * z.square().sum_dim_intlist(&[-1], false, Kind::Float)
            - self.log_std.sum_dim_intlist(&[-1], false, Kind::Float)
            - 0.5 * dim * (2.0 * PI).ln()
    }

    fn entropy(&self) -> Tensor {
        (&self.log_std + 0.5 * (2.0 * PI * std::f64::consts::E).ln()).sum_dim_intlist(
            &[-1],
            false,
            Kind::Float,
        )
    }

    fn kl_divergence_from(&self, other: &Self) -> Tensor {
        // KL(p || q) = log(σq / σp) + (σp² + (μp - μq)²) / (2 σq²) - 1/2
        let numerator = (&self.log_std * 2.0).exp() + (&self.mean - &other.mean).square();
        let denominator = (&other.log_std * 2.0).exp() * 2.0 + 1e-8;
        (&other.log_std - &self.log_std + numerator / denominator - 0.5).sum_dim_intlist(
            &[-1],
            false,
            Kind::Float,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn assert_close(actual: &Tensor, expected: &Tensor) {
        assert!(
            bool::from(expected.isclose(actual, 1e-5, 1e-5, false).all()),
            "expected: {:?}\nactual: {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn standard_normal_log_probs() {
        let mean = Tensor::zeros(&[2, 2], (Kind::Float, Device::Cpu));
        let log_std = Tensor::zeros(&[2], (Kind::Float, Device::Cpu));
        let distribution = DiagGaussian::new(mean, log_std);

        let actions = Tensor::of_slice(&[0.0_f32, 0.0, 1.0, -2.0]).reshape(&[2, 2]);
        let log_norm = -(2.0 * PI).ln() as f32;
        let expected = Tensor::of_slice(&[log_norm, log_norm - 2.5]);
        assert_close(&distribution.log_probs(&actions), &expected);
    }

    #[test]
    fn scaled_log_probs() {
        let distribution = DiagGaussian::new(
            Tensor::of_slice(&[1.0_f32]).reshape(&[1, 1]),
            Tensor::of_slice(&[2.0_f32.ln()]),
        );
        let actions = Tensor::of_slice(&[3.0_f32]).reshape(&[1, 1]);
        // z = 1, log p = -1/2 - ln 2 - 1/2 ln(2π)
        let expected = Tensor::of_slice(&[-0.5 - 2.0_f32.ln() - 0.5 * (2.0 * PI as f32).ln()]);
        assert_close(&distribution.log_probs(&actions), &expected);
    }

    #[test]
    fn entropy() {
        let distribution = DiagGaussian::new(
            Tensor::zeros(&[1, 3], (Kind::Float, Device::Cpu)),
            Tensor::of_slice(&[0.0_f32, 1.0, -1.0]),
        );
        let expected = Tensor::of_slice(&[1.5 * (2.0 * PI as f32 * std::f32::consts::E).ln()]);
        assert_close(&distribution.entropy(), &expected);
    }

    #[test]
    fn kl_divergence_self_is_zero() {
        let distribution = DiagGaussian::new(
            Tensor::of_slice(&[0.3_f32, -1.2, 0.5, 2.0]).reshape(&[2, 2]),
            Tensor::of_slice(&[0.1_f32, -0.4]),
        );
        let kl = distribution.kl_divergence_from(&distribution);
        assert_close(&kl, &Tensor::zeros(&[2], (Kind::Float, Device::Cpu)));
    }

    #[test]
    fn kl_divergence_known_value() {
        // p = N(0, 1), q = N(1, 2^2)
        // KL = ln 2 + (1 + 1) / 8 - 1/2
        let p = DiagGaussian::new(
            Tensor::of_slice(&[0.0_f32]).reshape(&[1, 1]),
            Tensor::of_slice(&[0.0_f32]),
        );
        let q = DiagGaussian::new(
            Tensor::of_slice(&[1.0_f32]).reshape(&[1, 1]),
            Tensor::of_slice(&[2.0_f32.ln()]),
        );
        let expected = Tensor::of_slice(&[2.0_f32.ln() + 0.25 - 0.5]);
        assert_close(&p.kl_divergence_from(&q), &expected);
    }

    #[test]
    fn likelihood_ratio_matches_densities() {
        let old = DiagGaussian::new(
            Tensor::of_slice(&[0.0_f32]).reshape(&[1, 1]),
            Tensor::of_slice(&[0.0_f32]),
        );
        let new = DiagGaussian::new(
            Tensor::of_slice(&[1.0_f32]).reshape(&[1, 1]),
            Tensor::of_slice(&[0.0_f32]),
        );
        let actions = Tensor::of_slice(&[1.0_f32]).reshape(&[1, 1]);
        // p_new(1) / p_old(1) = exp(0) / exp(-1/2)
        let expected = Tensor::of_slice(&[0.5_f32.exp()]);
        assert_close(&new.likelihood_ratio(&old, &actions), &expected);
    }

    #[test]
    fn sample_shape() {
        let distribution = DiagGaussian::new(
            Tensor::zeros(&[5, 3], (Kind::Float, Device::Cpu)),
            Tensor::zeros(&[3], (Kind::Float, Device::Cpu)),
        );
        assert_eq!(distribution.sample().size(), vec![5, 3]);
    }
}
