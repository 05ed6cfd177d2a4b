//! Named parameter sets.
use super::utils;
use std::fmt;
use tch::{TchError, Tensor};

/// An ordered mapping from parameter names to tensors.
///
/// Represents one complete set of policy parameters: either the live trainable variables of a
/// policy or a set derived from them, like the result of an inner-loop gradient step.
/// The insertion order is the canonical order used to flatten the parameters into a vector.
pub struct ParamDict {
    names: Vec<String>,
    tensors: Vec<Tensor>,
}

impl ParamDict {
    /// Create an empty parameter dictionary.
    pub const fn new() -> Self {
        Self {
            names: Vec::new(),
            tensors: Vec::new(),
        }
    }

    /// Insert a named parameter at the end of the canonical order.
    ///
    /// # Panics
    /// If a parameter with the same name already exists.
    pub fn insert<S: Into<String>>(&mut self, name: S, tensor: Tensor) {
        let name = name.into();
        assert!(
            !self.names.contains(&name),
            "duplicate parameter name {:?}",
            name
        );
        self.names.push(name);
        self.tensors.push(tensor);
    }

    /// Number of parameter tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Get a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.tensors[i])
    }

    /// Parameter names in canonical order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Parameter tensors in canonical order.
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Iterate over `(name, tensor)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.names.iter().map(String::as_str).zip(&self.tensors)
    }

    /// The shape of each parameter tensor.
    pub fn shapes(&self) -> Vec<Vec<i64>> {
        self.tensors.iter().map(Tensor::size).collect()
    }

    /// Total number of scalar parameters.
    pub fn num_elements(&self) -> i64 {
        self.tensors
            .iter()
            .map(|t| utils::shape_size(&t.size()))
            .sum()
    }

    /// Whether `other` has the same names and shapes in the same order.
    pub fn same_structure(&self, other: &Self) -> bool {
        self.names == other.names && self.shapes() == other.shapes()
    }

    /// Flatten all parameters into a single vector.
    pub fn flatten(&self) -> Tensor {
        utils::flatten_tensors(&self.tensors)
    }

    /// Build a dictionary with the same names and shapes from a flat vector.
    ///
    /// The inverse of [`ParamDict::flatten`]. Differentiable with respect to `flat`.
    pub fn f_unflatten_like(&self, flat: &Tensor) -> Result<Self, TchError> {
        let tensors = utils::f_unflatten_tensors(flat, &self.shapes())?;
        Ok(Self {
            names: self.names.clone(),
            tensors,
        })
    }

    /// Build a dictionary with the same names and shapes from a flat vector.
    ///
    /// # Panics
    /// If the number of elements in `flat` does not match.
    pub fn unflatten_like(&self, flat: &Tensor) -> Self {
        self.f_unflatten_like(flat).unwrap()
    }

    /// Gradient of a scalar with respect to each parameter.
    ///
    /// The graph of `output` is retained.
    /// If `create_graph` is set then the gradients are themselves differentiable, which is
    /// required for differentiating through gradient steps.
    pub fn f_gradients(&self, output: &Tensor, create_graph: bool) -> Result<Self, TchError> {
        let tensors = Tensor::f_run_backward(&[output], &self.tensors, true, create_graph)?;
        Ok(Self {
            names: self.names.clone(),
            tensors,
        })
    }

    /// Gradient of a scalar with respect to each parameter.
    ///
    /// # Panics
    /// If [`ParamDict::f_gradients`] fails.
    pub fn gradients(&self, output: &Tensor, create_graph: bool) -> Self {
        self.f_gradients(output, create_graph).unwrap()
    }

    /// Gradient descent step `θ - step_size * g` applied to every parameter.
    ///
    /// The result is a new (differentiable) set of parameters; the original tensors are not
    /// modified.
    ///
    /// # Panics
    /// If `grads` does not have the same structure.
    pub fn sgd_step(&self, grads: &Self, step_size: f64) -> Self {
        assert_eq!(self.names, grads.names, "gradient names do not match");
        let tensors = self
            .tensors
            .iter()
            .zip(&grads.tensors)
            .map(|(param, grad)| param - grad * step_size)
            .collect();
        Self {
            names: self.names.clone(),
            tensors,
        }
    }

    /// Copy that shares the same tensor storage.
    pub fn shallow_clone(&self) -> Self {
        Self {
            names: self.names.clone(),
            tensors: self.tensors.iter().map(Tensor::shallow_clone).collect(),
        }
    }

    /// Copy detached from the computation graph.
    pub fn detach(&self) -> Self {
        Self {
            names: self.names.clone(),
            tensors: self.tensors.iter().map(Tensor::detach).collect(),
        }
    }
}

impl Default for ParamDict {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParamDict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(self.names.iter().zip(self.shapes()))
            .finish()
    }
}

impl<S: Into<String>> FromIterator<(S, Tensor)> for ParamDict {
    fn from_iter<I: IntoIterator<Item = (S, Tensor)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, tensor) in iter {
            params.insert(name, tensor);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn example() -> ParamDict {
        [
            (
                "w",
                Tensor::of_slice(&[1.0_f32, 2.0, 3.0, 4.0]).reshape(&[2, 2]),
            ),
            ("b", Tensor::of_slice(&[5.0_f32, 6.0])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn get_by_name() {
        let params = example();
        assert_eq!(params.get("b"), Some(&Tensor::of_slice(&[5.0_f32, 6.0])));
        assert!(params.get("missing").is_none());
    }

    #[test]
    #[should_panic]
    fn duplicate_name_panics() {
        let mut params = example();
        params.insert("w", Tensor::zeros(&[1], (Kind::Float, Device::Cpu)));
    }

    #[test]
    fn flatten_canonical_order() {
        let params = example();
        assert_eq!(
            params.flatten(),
            Tensor::of_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0])
        );
        assert_eq!(params.num_elements(), 6);
    }

    #[test]
    fn unflatten_like_restores_shapes() {
        let params = example();
        let flat = Tensor::of_slice(&[6.0_f32, 5.0, 4.0, 3.0, 2.0, 1.0]);
        let other = params.unflatten_like(&flat);
        assert!(params.same_structure(&other));
        assert_eq!(
            other.get("w").unwrap(),
            &Tensor::of_slice(&[6.0_f32, 5.0, 4.0, 3.0]).reshape(&[2, 2])
        );
        assert_eq!(other.get("b").unwrap(), &Tensor::of_slice(&[2.0_f32, 1.0]));
    }

    #[test]
    fn unflatten_like_wrong_size_fails() {
        let params = example();
        assert!(params
            .f_unflatten_like(&Tensor::of_slice(&[1.0_f32, 2.0]))
            .is_err());
    }

    #[test]
    fn sgd_step_moves_against_gradient() {
        let params = example();
        let grads = params.unflatten_like(&Tensor::ones(&[6], (Kind::Float, Device::Cpu)));
        let updated = params.sgd_step(&grads, 0.5);
        assert_eq!(
            updated.flatten(),
            Tensor::of_slice(&[0.5_f32, 1.5, 2.5, 3.5, 4.5, 5.5])
        );
        // Original unchanged
        assert_eq!(params.get("b").unwrap(), &Tensor::of_slice(&[5.0_f32, 6.0]));
    }

    #[test]
    fn gradients_of_quadratic() {
        let params: ParamDict = [(
            "x",
            Tensor::of_slice(&[1.0_f32, -2.0]).set_requires_grad(true),
        )]
        .into_iter()
        .collect();
        let y = params.get("x").unwrap().square().sum(Kind::Float);
        let grads = params.gradients(&y, false);
        assert_eq!(grads.get("x").unwrap(), &Tensor::of_slice(&[2.0_f32, -4.0]));
    }

    #[test]
    fn gradients_through_sgd_step() {
        // θ' = θ - a * d/dθ (θ^2) = (1 - 2a) θ
        // d/dθ (θ')^2 = 2 (1 - 2a)^2 θ
        let params: ParamDict = [("x", Tensor::of_slice(&[1.0_f32]).set_requires_grad(true))]
            .into_iter()
            .collect();
        let inner_loss = params.get("x").unwrap().square().sum(Kind::Float);
        let inner_grads = params.gradients(&inner_loss, true);
        let adapted = params.sgd_step(&inner_grads, 0.25);

        let outer_loss = adapted.get("x").unwrap().square().sum(Kind::Float);
        let meta_grads = params.gradients(&outer_loss, false);
        let expected = 2.0 * (1.0 - 2.0 * 0.25_f64).powi(2);
        assert!((meta_grads.get("x").unwrap().double_value(&[0]) - expected).abs() < 1e-6);
    }
}
