use burn_tensor::{backend::Backend, Data, Shape, Tensor};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{EmbedPositionError, Result};

/// Projection parameters in row-major (out_features, in_features) layout.
///
/// This is the layout training code usually exports; `EmbedPosition` stores
/// the transposed (in, out) matrices that `burn::nn::Linear` multiplies with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedPositionWeights {
    /// (2 * d_hid, d_emb); rows [0, d_hid) produce gate logits, the rest updates
    pub gate_update_weight: Vec<Vec<f32>>,
    /// (2 * d_hid,)
    #[serde(default)]
    pub gate_update_bias: Option<Vec<f32>>,
    /// (d_emb, d_hid)
    pub output_weight: Vec<Vec<f32>>,
    /// (d_emb,)
    #[serde(default)]
    pub output_bias: Option<Vec<f32>>,
}

impl EmbedPositionWeights {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// `(d_emb, d_hid)` implied by the gate/update matrix.
    pub fn dims(&self) -> Result<(usize, usize)> {
        let rows = self.gate_update_weight.len();
        if rows == 0 || rows % 2 != 0 {
            return Err(EmbedPositionError::InvalidConfig(format!(
                "gate/update weight needs an even, non-zero row count, got {rows}"
            )));
        }
        let d_emb = self.gate_update_weight[0].len();
        Ok((d_emb, rows / 2))
    }
}

/// Build a burn linear weight (in, out) from an (out, in) row-major matrix.
pub(crate) fn linear_weight<B: Backend>(
    what: &'static str,
    rows: &[Vec<f32>],
    d_out: usize,
    d_in: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    if rows.len() != d_out {
        return Err(EmbedPositionError::shape(what, &[d_out, d_in], &[rows.len(), d_in]));
    }
    if let Some(row) = rows.iter().find(|row| row.len() != d_in) {
        return Err(EmbedPositionError::shape(what, &[d_out, d_in], &[d_out, row.len()]));
    }

    let values: Vec<f32> = rows.iter().flatten().copied().collect();
    let weight = Tensor::<B, 2>::from_floats(Data::new(values, Shape::new([d_out, d_in])), device);
    Ok(weight.transpose())
}

pub(crate) fn linear_bias<B: Backend>(
    what: &'static str,
    values: &[f32],
    d_out: usize,
    device: &B::Device,
) -> Result<Tensor<B, 1>> {
    if values.len() != d_out {
        return Err(EmbedPositionError::shape(what, &[d_out], &[values.len()]));
    }
    Ok(Tensor::from_floats(
        Data::new(values.to_vec(), Shape::new([d_out])),
        device,
    ))
}

/// Inverse of `linear_weight`: (in, out) tensor back to (out, in) rows.
pub(crate) fn linear_rows<B: Backend>(weight: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [d_in, _] = weight.dims();
    let values = weight.transpose().into_data().convert::<f32>().value;
    values.chunks(d_in.max(1)).map(|row| row.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type B = NdArray;

    fn sample() -> EmbedPositionWeights {
        EmbedPositionWeights {
            gate_update_weight: vec![
                vec![0.1, 0.2, 0.3],
                vec![0.4, 0.5, 0.6],
                vec![0.7, 0.8, 0.9],
                vec![1.0, 1.1, 1.2],
            ],
            gate_update_bias: Some(vec![0.0, -1.0, 1.0, 0.5]),
            output_weight: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
            output_bias: None,
        }
    }

    #[test]
    fn infers_dims() {
        assert_eq!(sample().dims().unwrap(), (3, 2));

        let mut odd = sample();
        odd.gate_update_weight.pop();
        assert!(matches!(odd.dims(), Err(EmbedPositionError::InvalidConfig(_))));
    }

    #[test]
    fn linear_weight_is_transposed() {
        let device = NdArrayDevice::Cpu;
        let w = linear_weight::<B>("gate/update weight", &sample().gate_update_weight, 4, 3, &device)
            .unwrap();
        assert_eq!(w.dims(), [3, 4]);
        assert_eq!(linear_rows(w), sample().gate_update_weight);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let device = NdArrayDevice::Cpu;
        let mut weights = sample();
        weights.output_weight[1].push(2.0);
        let err = linear_weight::<B>("output weight", &weights.output_weight, 3, 2, &device)
            .unwrap_err();
        assert!(matches!(err, EmbedPositionError::ShapeMismatch { .. }));

        let err = linear_bias::<B>("output bias", &[1.0, 2.0], 3, &device).unwrap_err();
        assert!(matches!(err, EmbedPositionError::ShapeMismatch { .. }));
    }

    #[test]
    fn json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("embed_position_weights_{}.json", std::process::id()));
        let weights = sample();
        weights.to_file(&path).unwrap();
        let loaded = EmbedPositionWeights::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, weights);
    }

    #[test]
    fn missing_biases_default_to_none() {
        let json = r#"{"gate_update_weight": [[1.0], [2.0]], "output_weight": [[3.0]]}"#;
        let weights: EmbedPositionWeights = serde_json::from_str(json).unwrap();
        assert_eq!(weights.gate_update_bias, None);
        assert_eq!(weights.output_bias, None);
        assert_eq!(weights.dims().unwrap(), (1, 1));
    }
}
