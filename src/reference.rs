use burn_tensor::{backend::Backend, Data, Shape, Tensor};
use ndarray::prelude::*;

/// Plain-domain sequential recurrence, one row per step and one column per channel.
///
/// `log_decay` is (n_tok, d_hid); `prepended_update` is (1 + n_tok, d_hid) with
/// row 0 holding the boundary value. Returns (n_tok, d_hid) states
/// `state_t = exp(log_decay_t) * state_{t-1} + exp(update_t)`, `state_0 = exp(update_0)`.
pub fn sequential_recurrence(log_decay: &Array2<f64>, prepended_update: &Array2<f64>) -> Array2<f64> {
    let (n_tok, d_hid) = log_decay.dim();
    assert_eq!(prepended_update.dim(), (n_tok + 1, d_hid));

    let mut states = Array2::<f64>::zeros((n_tok, d_hid));
    let mut state = prepended_update.row(0).mapv(f64::exp);
    for t in 0..n_tok {
        let decay = log_decay.row(t).mapv(f64::exp);
        let update = prepended_update.row(t + 1).mapv(f64::exp);
        state = &decay * &state + &update;
        states.row_mut(t).assign(&state);
    }
    states
}

/// Copy a rank-2 tensor into an `f64` array.
pub fn to_array2<B: Backend>(x: Tensor<B, 2>) -> Array2<f64> {
    let [rows, cols] = x.dims();
    let values = x.into_data().convert::<f64>().value;
    Array::from_shape_vec((rows, cols), values).expect("tensor data matches its own shape")
}

/// Build a rank-2 tensor from an `f64` array in the backend's float element type.
pub fn from_array2<B: Backend>(x: &Array2<f64>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = x.dim();
    let values: Vec<f64> = x.iter().copied().collect();
    let data = Data::new(values, Shape::new([rows, cols])).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometric_decay() {
        let p: f64 = 0.8;
        let log_decay = Array2::from_elem((5, 1), p.ln());
        let mut update = Array2::from_elem((6, 1), f64::NEG_INFINITY);
        update[[0, 0]] = 0.0;

        let states = sequential_recurrence(&log_decay, &update);
        for t in 0..5 {
            assert!((states[[t, 0]] - p.powi(t as i32 + 1)).abs() < 1e-12);
        }
    }

    #[test]
    fn accumulates_updates() {
        let log_decay = array![[0.5f64.ln()], [0.5f64.ln()]];
        let update = array![[0.0], [0.0], [2.0f64.ln()]];
        let states = sequential_recurrence(&log_decay, &update);
        // 0.5 * 1 + 1 = 1.5, then 0.5 * 1.5 + 2 = 2.75
        assert!((states[[0, 0]] - 1.5).abs() < 1e-12);
        assert!((states[[1, 0]] - 2.75).abs() < 1e-12);
    }
}
