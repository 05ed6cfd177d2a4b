//! Error type
use tch::TchError;
use thiserror::Error;

/// Error from the `bmaml` crate.
#[derive(Error, Debug)]
pub enum BmamlError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("recurrent policies are not supported")]
    RecurrentPolicy,
    #[error("particle {index} has parameters {actual:?}, expected {expected:?}")]
    ParamStructure {
        index: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("expected samples for {expected} particles, got {actual}")]
    NumParticles { expected: usize, actual: usize },
    #[error("expected {expected} sample steps, got {actual}")]
    NumSteps { expected: usize, actual: usize },
    #[error("expected {expected} tasks, got {actual}")]
    NumTasks { expected: usize, actual: usize },
    #[error("ragged samples: particle {particle} step {step} has {actual} tasks, expected {expected}")]
    RaggedSamples {
        particle: usize,
        step: usize,
        expected: usize,
        actual: usize,
    },
    #[error("particle index {index} out of range for {num_particles} particles")]
    ParticleIndex { index: usize, num_particles: usize },
    #[error("batch has {observations} observations, {actions} actions and {advantages} advantages")]
    BatchLength {
        observations: i64,
        actions: i64,
        advantages: i64,
    },
    #[error("advantages must be 1-dimensional, got shape {0:?}")]
    AdvantageShape(Vec<i64>),
    #[error("missing distribution info key \"{0}\"")]
    MissingDistInfo(&'static str),
    #[error("NaN loss in policy optimization")]
    NaNLoss,
    #[error("NaN constraint in policy optimization")]
    NaNConstraint,
    #[error(transparent)]
    Torch(#[from] TchError),
}
