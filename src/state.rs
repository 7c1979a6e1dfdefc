use burn::tensor::{backend::Backend, Tensor};

use crate::error::{EmbedPositionError, Result};

/// Carried boundary between consecutive chunks of one stream.
#[derive(Debug, Clone)]
pub struct StreamState<B: Backend> {
    /// log-domain recurrent state after the last processed token (batch, 1, d_hid),
    /// `None` until the first non-empty chunk has gone through
    prev_context: Option<Tensor<B, 3>>,
}

impl<B: Backend> Default for StreamState<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> StreamState<B> {
    pub fn new() -> Self {
        Self { prev_context: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.prev_context.is_some()
    }

    pub fn prev_context(&self) -> Option<&Tensor<B, 3>> {
        self.prev_context.as_ref()
    }

    /// Boundary for the next chunk; fails if nothing has been stored yet.
    pub fn boundary(&self) -> Result<Tensor<B, 3>> {
        self.prev_context
            .clone()
            .ok_or(EmbedPositionError::UninitializedStreamState)
    }

    /// Overwrite the boundary. The value is detached so the cache never keeps
    /// earlier chunks' graphs alive.
    pub fn store(&mut self, last_state: Tensor<B, 3>) {
        tracing::trace!(dims = ?last_state.dims(), "store prev_context");
        self.prev_context = Some(last_state.detach());
    }

    pub fn reset(&mut self) {
        self.prev_context = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Shape;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type B = NdArray;

    #[test]
    fn starts_absent() {
        let state = StreamState::<B>::new();
        assert!(!state.is_initialized());
        assert!(state.prev_context().is_none());
        assert!(matches!(
            state.boundary(),
            Err(EmbedPositionError::UninitializedStreamState)
        ));
    }

    #[test]
    fn store_then_reset() {
        let device = NdArrayDevice::Cpu;
        let mut state = StreamState::<B>::default();
        state.store(Tensor::ones(Shape::new([2, 1, 3]), &device));
        assert!(state.is_initialized());
        assert_eq!(state.boundary().unwrap().dims(), [2, 1, 3]);

        state.reset();
        assert!(!state.is_initialized());
    }
}
