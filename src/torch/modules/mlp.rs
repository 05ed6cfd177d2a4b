//! Multi-layer perceptron
use super::super::params::ParamDict;
use super::activation::Activation;
use serde::{Deserialize, Serialize};
use std::iter;
use tch::{
    nn::{Init, Path},
    Tensor,
};

/// Configuration for the [`Mlp`] module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Sizes of the hidden layers
    pub hidden_sizes: Vec<usize>,
    /// Activation function between hidden layers.
    pub activation: Activation,
    /// Activation function on the output.
    pub output_activation: Activation,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![32],
            activation: Activation::Tanh,
            output_activation: Activation::Identity,
        }
    }
}

/// Functional multi-layer perceptron.
///
/// The module only describes the network structure.
/// Parameters are created in a variable store on construction but `forward` evaluates the
/// network with any [`ParamDict`] holding the same names, such as a set of parameters adapted
/// by gradient steps.
#[derive(Debug)]
pub struct Mlp {
    /// Names of the `(weight, bias)` parameters of each layer
    layers: Vec<(String, String)>,
    activation: Option<fn(&Tensor) -> Tensor>,
    output_activation: Option<fn(&Tensor) -> Tensor>,
    /// The trainable variables created for this module
    variables: ParamDict,
}

impl Mlp {
    pub fn new(vs: &Path, in_dim: usize, out_dim: usize, config: &MlpConfig) -> Self {
        let in_dims = iter::once(&in_dim).chain(&config.hidden_sizes);
        let out_dims = config.hidden_sizes.iter().chain(iter::once(&out_dim));

        let mut variables = ParamDict::new();
        let layers = in_dims
            .zip(out_dims)
            .enumerate()
            .map(|(i, (in_, out_))| {
                let layer_path = vs / format!("layer_{}", i);
                let weight = layer_path.var("weight", &[*out_ as i64, *in_ as i64], Init::KaimingUniform);
                let bias = layer_path.var("bias", &[*out_ as i64], Init::Const(0.0));

                let weight_name = format!("layer_{}/weight", i);
                let bias_name = format!("layer_{}/bias", i);
                variables.insert(weight_name.clone(), weight);
                variables.insert(bias_name.clone(), bias);
                (weight_name, bias_name)
            })
            .collect();

        Self {
            layers,
            activation: config.activation.maybe_function(),
            output_activation: config.output_activation.maybe_function(),
            variables,
        }
    }

    /// The trainable variables of this module.
    pub const fn variables(&self) -> &ParamDict {
        &self.variables
    }

    /// Evaluate the network on a batch of inputs using the given parameters.
    ///
    /// # Args
    /// * `params` - Parameters with the same names as [`Mlp::variables`].
    ///     May contain additional entries, which are ignored.
    /// * `input` - Input tensor of shape `[BATCH_SHAPE.., in_dim]`.
    ///
    /// # Panics
    /// If a layer parameter is missing from `params`.
    pub fn forward(&self, params: &ParamDict, input: &Tensor) -> Tensor {
        let mut hidden: Option<Tensor> = None;
        for (weight_name, bias_name) in &self.layers {
            let weight = params
                .get(weight_name)
                .unwrap_or_else(|| panic!("missing parameter {:?}", weight_name));
            let bias = params
                .get(bias_name)
                .unwrap_or_else(|| panic!("missing parameter {:?}", bias_name));
            let layer_input = match (hidden.take(), self.activation) {
                (None, _) => input.shallow_clone(),
                (Some(h), Some(activation)) => activation(&h),
                (Some(h), None) => h,
            };
            hidden = Some(layer_input.matmul(&weight.transpose(0, 1)) + bias);
        }
        let output = hidden.expect("must have >= 1 layers by construction");
        match self.output_activation {
            Some(output_activation) => output_activation(&output),
            None => output,
        }
    }
}
