//! Bayesian model-agnostic meta-reinforcement learning.
//!
//! An ensemble of policy particles is adapted to each task by SVPG-coupled gradient steps and
//! meta-trained with trust region updates through the adaptation.
#![warn(clippy::cast_lossless)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::missing_const_for_fn)] // has some false positives
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)]
pub mod algos;
mod error;
pub mod logging;
pub mod torch;

pub use algos::{BmamlNpo, BmamlNpoConfig, ParticleCoupling, SamplesData, TaskBatch};
pub use error::BmamlError;
