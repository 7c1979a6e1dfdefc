//! Inclusive prefix scans over one tensor axis.
//!
//! The scan is the work-efficient up-sweep/down-sweep: neighbouring pairs are
//! combined, the half-length sequence of pair totals is scanned recursively,
//! and the results are spread back onto the even positions. Each level is a
//! few whole-tensor ops over all batch and channel entries at once, so the
//! total work is linear in the axis length and the depth is logarithmic.

use burn::tensor::{backend::Backend, Shape, Tensor};

use crate::utils::{logaddexp, narrow};

/// Generic inclusive scan for an associative `combine`.
///
/// `combine(earlier, later)` must be associative; it is always called with the
/// contribution from lower indices first. The scanned axis is moved to the
/// middle of a `[before, n, after]` view, so `combine` only ever sees rank 3.
pub fn associative_scan<B, const D: usize, F>(x: Tensor<B, D>, dim: usize, combine: F) -> Tensor<B, D>
where
    B: Backend,
    F: Fn(Tensor<B, 3>, Tensor<B, 3>) -> Tensor<B, 3>,
{
    let dims = x.dims();
    if dims[dim] <= 1 {
        return x;
    }
    let before: usize = dims[..dim].iter().product();
    let after: usize = dims[dim + 1..].iter().product();

    let x3 = x.reshape(Shape::new([before, dims[dim], after]));
    scan_rank3(x3, &combine).reshape(Shape::new(dims))
}

fn scan_rank3<B, F>(x: Tensor<B, 3>, combine: &F) -> Tensor<B, 3>
where
    B: Backend,
    F: Fn(Tensor<B, 3>, Tensor<B, 3>) -> Tensor<B, 3>,
{
    let [p, n, q] = x.dims();
    if n <= 1 {
        return x;
    }
    if n % 2 == 1 {
        let head = scan_rank3(narrow(x.clone(), 1, 0..n - 1), combine);
        let last = combine(narrow(head.clone(), 1, n - 2..n - 1), narrow(x, 1, n - 1..n));
        return Tensor::cat(vec![head, last], 1);
    }

    let m = n / 2;
    let pairs = x.reshape(Shape::new([p, m, 2, q]));
    let even = pairs.clone().slice([0..p, 0..m, 0..1, 0..q]).reshape(Shape::new([p, m, q]));
    let odd = pairs.slice([0..p, 0..m, 1..2, 0..q]).reshape(Shape::new([p, m, q]));

    // up-sweep: totals of each pair, scanned at half length
    let odd_out = scan_rank3(combine(even.clone(), odd), combine);

    // down-sweep: even slot k takes the running total up to pair k - 1
    let even_out = if m == 1 {
        even
    } else {
        let rest = combine(narrow(odd_out.clone(), 1, 0..m - 1), narrow(even.clone(), 1, 1..m));
        Tensor::cat(vec![narrow(even, 1, 0..1), rest], 1)
    };

    Tensor::cat(
        vec![
            even_out.reshape(Shape::new([p, m, 1, q])),
            odd_out.reshape(Shape::new([p, m, 1, q])),
        ],
        2,
    )
    .reshape(Shape::new([p, n, q]))
}

/// Running sum along `dim`.
pub fn cumsum<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    associative_scan(x, dim, |earlier, later| earlier + later)
}

/// Running log-sum-exp along `dim`. Every step goes through the max-subtracted
/// pairwise form, so no intermediate is ever exponentiated at full magnitude.
pub fn logcumsumexp<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    associative_scan(x, dim, logaddexp::<B, 3>)
}
