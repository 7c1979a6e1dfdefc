use burn::{
    module::{Module, Param, ParamId},
    nn::Linear,
    tensor::{backend::Backend, Shape, Tensor},
};

use crate::error::{EmbedPositionError, Result};
use crate::recurrence::{log_linear_recurrence, TOKEN_DIM};
use crate::state::StreamState;
use crate::utils::{count_non_finite, log_sigmoid, narrow, pad_front};
use crate::weights::{linear_bias, linear_rows, linear_weight, EmbedPositionWeights};

/// Position encoding by decaying and updating exponentiated states.
///
/// Each token is projected to a per-channel decay gate and update, a log-domain
/// linear recurrence runs over the token axis, and the resulting state is
/// projected back and added to the input.
#[derive(Module, Debug)]
pub struct EmbedPosition<B: Backend> {
    /// d_emb -> 2 * d_hid; first half gate logits, second half log-updates
    pub gate_update: Linear<B>,
    /// d_hid -> d_emb
    pub output: Linear<B>,
    pub d_emb: usize,
    pub d_hid: usize,
    pub check_finite: bool,
}

impl<B: Backend> EmbedPosition<B> {
    /// Layer widths for logs, e.g. `d_emb=64, d_hid=16`.
    pub fn extra_repr(&self) -> String {
        format!("d_emb={}, d_hid={}", self.d_emb, self.d_hid)
    }

    /// Gate and update signals for a (batch, n_tok, d_emb) input:
    /// (log_p, h), both (batch, n_tok, d_hid), every log_p entry <= 0.
    pub fn gate_and_update(&self, x: Tensor<B, 3>) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let [batch, n_tok, _] = x.dims();
        let hidden = self.gate_update.forward(x);
        let split = [batch, n_tok, 2 * self.d_hid];
        if hidden.dims() != split {
            return Err(EmbedPositionError::shape("gate/update split", &split, &hidden.dims()));
        }

        let gate = narrow(hidden.clone(), 2, 0..self.d_hid);
        let h = narrow(hidden, 2, self.d_hid..2 * self.d_hid);
        Ok((log_sigmoid(gate), h))
    }

    /// Stateless forward pass over `x` of shape (..., n_tok, d_emb).
    ///
    /// `boundary` is the carried (batch, 1, d_hid) state from a previous chunk, where
    /// batch is the product of the leading dims; `None` starts the recurrence fresh.
    /// Returns the output (same shape as `x`) and the boundary for the next chunk,
    /// which is the incoming one untouched when the chunk is empty.
    pub fn forward_with_boundary<const D: usize>(
        &self,
        x: Tensor<B, D>,
        boundary: Option<Tensor<B, 3>>,
    ) -> Result<(Tensor<B, D>, Option<Tensor<B, 3>>)> {
        let dims = x.dims();
        if D < 2 {
            return Err(EmbedPositionError::shape("input rank", &[2], &[D]));
        }
        if dims[D - 1] != self.d_emb {
            return Err(EmbedPositionError::shape(
                "input features",
                &[self.d_emb],
                &[dims[D - 1]],
            ));
        }
        let n_tok = dims[D.saturating_sub(2)];
        let batch: usize = dims[..D.saturating_sub(2)].iter().product();
        tracing::debug!(?dims, batch, n_tok, carried = boundary.is_some(), "forward");

        if let Some(prev) = &boundary {
            let expected = [batch, 1, self.d_hid];
            if prev.dims() != expected {
                return Err(EmbedPositionError::shape("prev_context", &expected, &prev.dims()));
            }
        }
        if n_tok == 0 {
            return Ok((x, boundary));
        }

        let x = x.reshape(Shape::new([batch, n_tok, self.d_emb]));
        let (log_p, h) = self.gate_and_update(x.clone())?;

        // (batch, 1 + n_tok, d_hid)
        let prepended_h = match boundary {
            Some(prev) => Tensor::cat(vec![prev, h], TOKEN_DIM),
            None => pad_front(h, TOKEN_DIM, 1, 0.0),
        };

        let s = log_linear_recurrence(log_p, prepended_h)?;
        if self.check_finite {
            let count = count_non_finite(s.clone());
            if count > 0 {
                return Err(EmbedPositionError::NonFiniteOutput { count });
            }
        }
        let last = narrow(s.clone(), TOKEN_DIM, n_tok - 1..n_tok);

        // residual connection
        let y = x + self.output.forward(s);
        Ok((y.reshape(Shape::new(dims)), Some(last)))
    }

    /// Fresh-start forward pass, no carried state.
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Result<Tensor<B, D>> {
        let (y, _) = self.forward_with_boundary(x, None)?;
        Ok(y)
    }

    /// Install externally supplied projection parameters as trainable params.
    pub fn load_weights(&mut self, weights: &EmbedPositionWeights) -> Result<()> {
        let (d_emb, d_hid) = (self.d_emb, self.d_hid);
        let device = self.output.weight.val().device();

        let gate_weight = linear_weight::<B>(
            "gate/update weight",
            &weights.gate_update_weight,
            2 * d_hid,
            d_emb,
            &device,
        )?;
        let gate_bias = weights
            .gate_update_bias
            .as_deref()
            .map(|b| linear_bias::<B>("gate/update bias", b, 2 * d_hid, &device))
            .transpose()?;
        let output_weight =
            linear_weight::<B>("output weight", &weights.output_weight, d_emb, d_hid, &device)?;
        let output_bias = weights
            .output_bias
            .as_deref()
            .map(|b| linear_bias::<B>("output bias", b, d_emb, &device))
            .transpose()?;

        self.gate_update.weight = Param::initialized(ParamId::new(), gate_weight.require_grad());
        self.gate_update.bias = gate_bias.map(|b| Param::initialized(ParamId::new(), b.require_grad()));
        self.output.weight = Param::initialized(ParamId::new(), output_weight.require_grad());
        self.output.bias = output_bias.map(|b| Param::initialized(ParamId::new(), b.require_grad()));
        Ok(())
    }

    /// Current projection parameters in (out, in) layout.
    pub fn weights(&self) -> EmbedPositionWeights {
        let bias_values = |bias: &Option<Param<Tensor<B, 1>>>| {
            bias.as_ref()
                .map(|b| b.val().into_data().convert::<f32>().value)
        };
        EmbedPositionWeights {
            gate_update_weight: linear_rows(self.gate_update.weight.val()),
            gate_update_bias: bias_values(&self.gate_update.bias),
            output_weight: linear_rows(self.output.weight.val()),
            output_bias: bias_values(&self.output.bias),
        }
    }
}

/// `EmbedPosition` plus the carried boundary state, for processing one long
/// sequence as consecutive chunks.
///
/// Dereferences to the wrapped module, so parameters stay reachable for training.
/// Not meant to be shared between concurrent callers: every call reads and then
/// overwrites the cache.
#[derive(Debug, Shrinkwrap)]
#[shrinkwrap(mutable)]
pub struct StreamingEmbedPosition<B: Backend> {
    #[shrinkwrap(main_field)]
    pub module: EmbedPosition<B>,
    pub state: StreamState<B>,
}

impl<B: Backend> StreamingEmbedPosition<B> {
    pub fn new(module: EmbedPosition<B>) -> Self {
        Self {
            module,
            state: StreamState::new(),
        }
    }

    /// Process the next chunk. With `using_prev_context` the recurrence resumes from
    /// the state left by the previous call; chunk order is the caller's business.
    ///
    /// A failed call leaves the cache as it was.
    pub fn forward<const D: usize>(
        &mut self,
        x: Tensor<B, D>,
        using_prev_context: bool,
    ) -> Result<Tensor<B, D>> {
        let boundary = if using_prev_context {
            Some(self.state.boundary()?)
        } else {
            None
        };

        let (y, last) = self.module.forward_with_boundary(x, boundary)?;
        if let Some(last) = last {
            self.state.store(last);
        }
        Ok(y)
    }

    pub fn reset(&mut self) {
        tracing::debug!("reset prev_context");
        self.state.reset();
    }

    pub fn into_module(self) -> EmbedPosition<B> {
        self.module
    }
}
