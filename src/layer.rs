use rand::Rng;

use crate::activation::DEFAULT_ACTIVATION;
use crate::{Activation, ActivationCatalog, Error, Matrix, Result};

/// A dense layer without bias.
///
/// `weights` has shape `(in_dim, out_dim)`, so a `(batch, in_dim)` input maps to a
/// `(batch, out_dim)` output with a single multiply.
#[derive(Debug, Clone)]
pub struct Layer {
    weights: Matrix,
    /// Input of the most recent `forward` call.
    inputs: Matrix,
    /// Post-activation output of the most recent `forward` call.
    outputs: Matrix,
    activation_name: String,
    activation: Activation,
}

impl Layer {
    /// New layer with weights drawn uniformly from `[-1, 1]`.
    ///
    /// An `activation_name` the catalog does not know is replaced by `sigmoid` and a
    /// warning is logged.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        activation_name: &str,
        catalog: &ActivationCatalog,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let mut weights = Matrix::new(in_dim, out_dim);
        weights.randomize(-1.0, 1.0, rng)?;
        Self::from_weights(weights, activation_name, catalog)
    }

    /// Layer with the given weights installed as-is.
    pub fn from_weights(
        weights: Matrix,
        activation_name: &str,
        catalog: &ActivationCatalog,
    ) -> Result<Self> {
        if weights.rows() == 0 || weights.cols() == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got {}x{}",
                weights.rows(),
                weights.cols()
            )));
        }

        let (activation_name, activation) = resolve_activation(activation_name, catalog)?;
        let (in_dim, out_dim) = weights.shape();
        Ok(Self {
            weights,
            inputs: Matrix::new(1, in_dim),
            outputs: Matrix::new(1, out_dim),
            activation_name,
            activation,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.weights.rows()
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.weights.cols()
    }

    #[inline]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[inline]
    pub fn inputs(&self) -> &Matrix {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &Matrix {
        &self.outputs
    }

    #[inline]
    pub fn activation_name(&self) -> &str {
        &self.activation_name
    }

    #[inline]
    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    /// Replace the weights. The new matrix must have the same shape.
    pub fn set_weights(&mut self, weights: Matrix) -> Result<()> {
        if weights.shape() != self.weights.shape() {
            return Err(Error::DimensionMismatch(format!(
                "new weights are {}x{}, layer weights are {}x{}",
                weights.rows(),
                weights.cols(),
                self.weights.rows(),
                self.weights.cols()
            )));
        }
        self.weights = weights;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn weights_mut(&mut self) -> &mut Matrix {
        &mut self.weights
    }

    /// Forward pass for a batch of rows.
    ///
    /// Computes `outputs = activation(input * weights)` and caches both `input` and
    /// `outputs` for the following `backward` call.
    ///
    /// Shape contract: `input.cols() == self.in_dim()`.
    pub fn forward(&mut self, input: &Matrix) -> Result<&Matrix> {
        let mut net = input.multiply(&self.weights)?;
        self.activation.activate(&mut net);
        self.inputs = input.clone();
        self.outputs = net;
        Ok(&self.outputs)
    }

    /// Backward pass: apply one gradient-descent step to the weights.
    ///
    /// `error` is dL/d(outputs) for the cached batch. The local gradient is
    /// `g = activation'(outputs) * error` (element-wise) and the update is
    /// `weights -= learning_rate * inputs^T g`.
    ///
    /// Nothing is returned; the caller derives the error for the upstream layer from
    /// `weights()`.
    pub fn backward(&mut self, error: &Matrix, learning_rate: f64) -> Result<()> {
        let grad = self.activation.derivative(&self.outputs).hadamard(error)?;
        let delta = self.inputs.transpose().multiply(&grad)?;

        for (w, d) in self
            .weights
            .as_mut_slice()
            .iter_mut()
            .zip(delta.as_slice())
        {
            *w -= learning_rate * d;
        }
        Ok(())
    }
}

fn resolve_activation(name: &str, catalog: &ActivationCatalog) -> Result<(String, Activation)> {
    match catalog.lookup(name) {
        Ok(act) => Ok((name.to_owned(), act)),
        Err(Error::ActivationNotFound(_)) => {
            tracing::warn!(
                activation = name,
                "invalid activation function, defaulting to {DEFAULT_ACTIVATION}"
            );
            let act = catalog.lookup(DEFAULT_ACTIVATION)?;
            Ok((DEFAULT_ACTIVATION.to_owned(), act))
        }
        Err(e) => Err(e),
    }
}
