//! Torch components
pub mod distributions;
pub mod modules;
pub mod optimizers;
pub mod params;
pub mod policies;
pub mod utils;

pub use distributions::{DistInfo, PolicyDistribution};
pub use modules::{Activation, Mlp, MlpConfig};
pub use optimizers::{ConjugateGradientOptimizer, ConjugateGradientOptimizerConfig};
pub use params::ParamDict;
pub use policies::{BuildPolicy, Policy};
