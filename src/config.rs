use burn::{
    config::Config,
    nn::LinearConfig,
    tensor::backend::Backend,
};

use crate::embed_position::{EmbedPosition, StreamingEmbedPosition};
use crate::error::{self, EmbedPositionError};
use crate::weights::EmbedPositionWeights;

pub type DefaultBackend = burn::backend::NdArray;
pub type DefaultDevice = burn_ndarray::NdArrayDevice;

#[derive(Debug, Config)]
pub struct EmbedPositionConfig {
    /// token feature width
    pub d_emb: usize,
    /// hidden recurrence width
    pub d_hid: usize,
    /// learn a bias on both projections
    #[config(default = true)]
    pub bias: bool,
    /// scan every recurrent state for NaN/inf and fail the call if one shows up
    #[config(default = false)]
    pub check_finite: bool,
}

impl EmbedPositionConfig {
    pub fn validate(&self) -> error::Result<()> {
        if self.d_emb == 0 || self.d_hid == 0 {
            return Err(EmbedPositionError::InvalidConfig(format!(
                "d_emb and d_hid must be positive, got d_emb={}, d_hid={}",
                self.d_emb, self.d_hid
            )));
        }
        Ok(())
    }

    /// Randomly initialised projections (burn's default Kaiming-uniform init).
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<EmbedPosition<B>> {
        self.validate()?;

        let gate_update = LinearConfig::new(self.d_emb, 2 * self.d_hid)
            .with_bias(self.bias)
            .init::<B>(device);
        let output = LinearConfig::new(self.d_hid, self.d_emb)
            .with_bias(self.bias)
            .init::<B>(device);

        tracing::debug!(d_emb = self.d_emb, d_hid = self.d_hid, bias = self.bias, "init");

        Ok(EmbedPosition {
            gate_update,
            output,
            d_emb: self.d_emb,
            d_hid: self.d_hid,
            check_finite: self.check_finite,
        })
    }

    /// Widths implied by an exported weights file, every other field at its default.
    pub fn from_weights(weights: &EmbedPositionWeights) -> error::Result<Self> {
        let (d_emb, d_hid) = weights.dims()?;
        let config = Self::new(d_emb, d_hid);
        config.validate()?;
        Ok(config)
    }

    /// NOTE, the weights must agree with `d_emb`/`d_hid`; `bias` is ignored in favour
    /// of whatever biases the weights carry.
    pub fn init_with_weights<B: Backend>(
        &self,
        weights: &EmbedPositionWeights,
        device: &B::Device,
    ) -> error::Result<EmbedPosition<B>> {
        let mut module = self.init::<B>(device)?;
        module.load_weights(weights)?;
        Ok(module)
    }

    pub fn init_streaming<B: Backend>(&self, device: &B::Device) -> error::Result<StreamingEmbedPosition<B>> {
        Ok(StreamingEmbedPosition::new(self.init::<B>(device)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EmbedPositionConfig::new(16, 4);
        assert!(config.bias);
        assert!(!config.check_finite);

        let config = config.with_bias(false).with_check_finite(true);
        assert!(!config.bias);
        assert!(config.check_finite);
    }

    #[test]
    fn rejects_zero_widths() {
        let device = DefaultDevice::Cpu;
        for (d_emb, d_hid) in [(0, 4), (4, 0)] {
            let err = EmbedPositionConfig::new(d_emb, d_hid)
                .init::<DefaultBackend>(&device)
                .unwrap_err();
            assert!(matches!(err, EmbedPositionError::InvalidConfig(_)));
        }
    }

    #[test]
    fn init_shapes() {
        let device = DefaultDevice::Cpu;
        let module = EmbedPositionConfig::new(6, 3)
            .init::<DefaultBackend>(&device)
            .unwrap();
        assert_eq!(module.gate_update.weight.val().dims(), [6, 6]);
        assert_eq!(module.output.weight.val().dims(), [3, 6]);
        assert_eq!(module.extra_repr(), "d_emb=6, d_hid=3");
    }

    #[test]
    fn widths_come_from_weights() {
        let device = DefaultDevice::Cpu;
        let weights = EmbedPositionConfig::new(7, 3)
            .init::<DefaultBackend>(&device)
            .unwrap()
            .weights();
        let config = EmbedPositionConfig::from_weights(&weights).unwrap();
        assert_eq!((config.d_emb, config.d_hid), (7, 3));

        let module = config.init_with_weights::<DefaultBackend>(&weights, &device).unwrap();
        assert_eq!(module.extra_repr(), "d_emb=7, d_hid=3");
        assert_eq!(module.weights(), weights);
    }

    #[test]
    fn json_round_trip() {
        let path = std::env::temp_dir().join(format!("embed_position_config_{}.json", std::process::id()));
        let config = EmbedPositionConfig::new(8, 2).with_check_finite(true);
        config.save(&path).unwrap();
        let loaded = EmbedPositionConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.d_emb, 8);
        assert_eq!(loaded.d_hid, 2);
        assert!(loaded.bias);
        assert!(loaded.check_finite);
    }
}
