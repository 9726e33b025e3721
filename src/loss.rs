//! Squared-error loss.
//!
//! Backpropagation uses the shortcut `d_pred = pred - target`, which is the gradient of
//! `0.5 * sum((pred - target)^2)`. It is not scaled by the batch size, so larger
//! batches take proportionally larger steps.

use crate::{Error, Matrix, Result};

/// Mean squared error over every element: `mean((pred - target)^2)`.
pub fn mse(pred: &Matrix, target: &Matrix) -> Result<f64> {
    let diff = mse_gradient(pred, target)?;
    let n = diff.as_slice().len();
    if n == 0 {
        return Ok(0.0);
    }
    let sum_sq: f64 = diff.as_slice().iter().map(|d| d * d).sum();
    Ok(sum_sq / n as f64)
}

/// Output-layer error signal: `pred - target`.
pub fn mse_gradient(pred: &Matrix, target: &Matrix) -> Result<Matrix> {
    pred.subtract(target).map_err(|_| {
        Error::DimensionMismatch(format!(
            "predictions are {}x{}, targets are {}x{}",
            pred.rows(),
            pred.cols(),
            target.rows(),
            target.cols()
        ))
    })
}
