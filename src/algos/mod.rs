//! Meta-learning algorithms
pub mod adaptation;
pub mod bmaml_npo;
pub mod samples;
pub mod svpg;

pub use adaptation::{adapt, Adaptation};
pub use bmaml_npo::{BmamlNpo, BmamlNpoConfig, MetaObjective, PolicyStepStats};
pub use samples::{SamplesData, TaskBatch};
pub use svpg::{couple_gradients, rbf_kernel, ParticleCoupling, RbfKernel};
