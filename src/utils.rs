use burn_tensor::{backend::Backend, Shape, Tensor};
use std::ops::Range;

/// Slice `x` along a single axis, keeping every other axis whole.
pub fn narrow<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    dim: usize,
    range: Range<usize>,
) -> Tensor<B, D> {
    let mut ranges = x.dims().map(|d| 0..d);
    ranges[dim] = range;
    x.slice(ranges)
}

/// Prepend `count` rows filled with `value` along `dim`.
pub fn pad_front<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    dim: usize,
    count: usize,
    value: f32,
) -> Tensor<B, D> {
    let mut dims = x.dims();
    dims[dim] = count;
    let head = Tensor::full(Shape::new(dims), value, &x.device());
    Tensor::cat(vec![head, x], dim)
}

/// log(sigmoid(x)) without underflow for large negative x:
/// min(x, 0) - log1p(exp(-|x|)).
pub fn log_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let tail = x.clone().abs().neg().exp().log1p();
    x.clamp_max(0.0) - tail
}

/// Elementwise log(exp(a) + exp(b)).
///
/// The running maximum is taken out of the gradient path. It is picked from
/// operands clamped to the lowest finite float: masking blends its inputs
/// arithmetically on some backends, so no infinity may reach the mask. Where
/// both operands are -inf the sum underflows to 0 and the result is -inf.
pub fn logaddexp<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> Tensor<B, D> {
    let a_floor = a.clone().detach().clamp_min(f32::MIN);
    let b_floor = b.clone().detach().clamp_min(f32::MIN);
    let m = a_floor.clone().mask_where(b_floor.clone().greater(a_floor), b_floor);

    let sum = (a - m.clone()).exp() + (b - m.clone()).exp();
    m + sum.log()
}

/// Number of NaN or infinite entries in `x` (reads the tensor back to host).
pub fn count_non_finite<B: Backend, const D: usize>(x: Tensor<B, D>) -> usize {
    x.into_data()
        .convert::<f64>()
        .value
        .iter()
        .filter(|v| !v.is_finite())
        .count()
}
