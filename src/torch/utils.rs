//! Flat parameter vectors and gradient helpers.
use std::borrow::Borrow;
use tch::{TchError, Tensor};

/// Concatenate the elements of several tensors into one vector.
pub fn f_flatten_tensors<I>(tensors: I) -> Result<Tensor, TchError>
where
    I: IntoIterator,
    I::Item: Borrow<Tensor>,
{
    let mut parts = Vec::new();
    for tensor in tensors {
        parts.push(tensor.borrow().f_reshape(&[-1])?);
    }
    Tensor::f_cat(&parts, 0)
}

/// Concatenate the elements of several tensors into one vector.
///
/// # Panics
/// If the tensors have different kinds or devices.
pub fn flatten_tensors<I>(tensors: I) -> Tensor
where
    I: IntoIterator,
    I::Item: Borrow<Tensor>,
{
    f_flatten_tensors(tensors).unwrap()
}

/// Number of elements in a tensor of the given shape.
///
/// # Panics
/// If a dimension is negative.
pub fn shape_size(shape: &[i64]) -> i64 {
    shape
        .iter()
        .map(|&dim| {
            assert!(dim >= 0, "negative dimension in shape {:?}", shape);
            dim
        })
        .product()
}

/// Split a vector into consecutive tensors of the given shapes.
///
/// Fails if the vector length differs from the total size of the shapes.
pub fn f_unflatten_tensors(vector: &Tensor, shapes: &[Vec<i64>]) -> Result<Vec<Tensor>, TchError> {
    let sizes: Vec<i64> = shapes.iter().map(|shape| shape_size(shape)).collect();
    let parts = vector.f_split_with_sizes(&sizes, 0)?;
    parts
        .iter()
        .zip(shapes)
        .map(|(part, shape)| part.f_view(shape.as_slice()))
        .collect()
}

pub fn unflatten_tensors(vector: &Tensor, shapes: &[Vec<i64>]) -> Vec<Tensor> {
    f_unflatten_tensors(vector, shapes).unwrap()
}

/// Flatten each group of tensors into a row and stack the rows.
///
/// Every group must have the same total number of elements `N`.
/// The result has shape `[NUM_GROUPS, N]`.
pub fn f_stack_flat<R, I>(groups: R) -> Result<Tensor, TchError>
where
    R: IntoIterator<Item = I>,
    I: IntoIterator,
    I::Item: Borrow<Tensor>,
{
    let rows: Vec<Tensor> = groups
        .into_iter()
        .map(f_flatten_tensors)
        .collect::<Result<_, _>>()?;
    Tensor::f_stack(&rows, 0)
}

pub fn stack_flat<R, I>(groups: R) -> Tensor
where
    R: IntoIterator<Item = I>,
    I: IntoIterator,
    I::Item: Borrow<Tensor>,
{
    f_stack_flat(groups).unwrap()
}

/// Sum of the elementwise product of two tensors with the same number of elements.
///
/// # Panics
/// If the element counts differ.
pub fn flat_dot(a: &Tensor, b: &Tensor) -> Tensor {
    a.reshape(&[-1]).dot(&b.reshape(&[-1]))
}

/// Zero the accumulated gradient of a tensor, if it has one.
pub fn f_zero_grad(x: &Tensor) -> Result<(), TchError> {
    let mut grad = x.f_grad()?;
    if grad.defined() {
        grad.f_detach_()?.f_zero_()?;
    }
    Ok(())
}

pub fn zero_grad(x: &Tensor) {
    f_zero_grad(x).unwrap()
}
