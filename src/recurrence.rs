use burn::tensor::{backend::Backend, Tensor};

use crate::error::{EmbedPositionError, Result};
use crate::scan::{cumsum, logcumsumexp};
use crate::utils::{narrow, pad_front};

/// Token axis of the (batch, n_tok, d_hid) layout used throughout the solver.
pub const TOKEN_DIM: usize = 1;

/// Solve `state_t = exp(log_coeffs_t) * state_{t-1} + exp(prepended_logits_t)`
/// for every channel, entirely in log space.
///
/// * `log_coeffs`: (batch, n_tok, d_hid), log of the per-step decay, each entry <= 0
/// * `prepended_logits`: (batch, 1 + n_tok, d_hid), row 0 is the boundary value
///
/// Returns the log-domain state for steps 1..=n_tok, shape (batch, n_tok, d_hid).
///
/// With `a*` the exclusive running sum of `log_coeffs` (zero at the boundary) and
/// `b*` the running log-sum-exp of `prepended_logits - a*`, the state is `a* + b*`.
pub fn log_linear_recurrence<B: Backend>(
    log_coeffs: Tensor<B, 3>,
    prepended_logits: Tensor<B, 3>,
) -> Result<Tensor<B, 3>> {
    let [batch, n_tok, d_hid] = log_coeffs.dims();
    let expected = [batch, n_tok + 1, d_hid];
    if prepended_logits.dims() != expected {
        return Err(EmbedPositionError::shape(
            "prepended update",
            &expected,
            &prepended_logits.dims(),
        ));
    }
    if n_tok == 0 {
        return Ok(log_coeffs);
    }

    // (batch, 1 + n_tok, d_hid)
    let a_star = cumsum(pad_front(log_coeffs, TOKEN_DIM, 1, 0.0), TOKEN_DIM);
    let logit0_plus_b_star = logcumsumexp(prepended_logits - a_star.clone(), TOKEN_DIM);
    let log_linear_recurrence = a_star + logit0_plus_b_star;

    Ok(narrow(log_linear_recurrence, TOKEN_DIM, 1..n_tok + 1))
}
