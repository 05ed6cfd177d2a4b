//! Activation functions
use serde::{Deserialize, Serialize};
use tch::Tensor;

/// Activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    /// No transformation
    Identity,
    /// Rectified linear
    Relu,
    /// Sigmoid function
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Tanh
    }
}

impl Activation {
    /// The function pointer for this activation function.
    #[inline]
    pub fn function(&self) -> fn(&Tensor) -> Tensor {
        use Activation::*;
        match self {
            Identity => Tensor::shallow_clone,
            Relu => Tensor::relu,
            Sigmoid => Tensor::sigmoid,
            Tanh => Tensor::tanh,
        }
    }

    /// The function pointer for this activation function if not the identity function.
    #[inline]
    pub fn maybe_function(&self) -> Option<fn(&Tensor) -> Tensor> {
        use Activation::*;
        match self {
            Identity => None,
            _ => Some(self.function()),
        }
    }

    /// Apply this activation function to a tensor.
    #[inline]
    pub fn apply(&self, input: Tensor) -> Tensor {
        if let Some(f) = self.maybe_function() {
            f(&input)
        } else {
            input
        }
    }
}
