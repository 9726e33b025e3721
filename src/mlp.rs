use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::activation::DEFAULT_ACTIVATION;
use crate::{ActivationCatalog, Error, Layer, Matrix, Result, loss};

/// Which weights carry the error signal from layer `i + 1` back to layer `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPropagation {
    /// Read `W[i + 1]` after it has already been updated in the current pass.
    #[default]
    PostUpdate,
    /// Read a copy of `W[i + 1]` taken before its update.
    PreUpdate,
}

/// A feed-forward network: an ordered chain of dense layers.
///
/// Invariant: `layers[i].out_dim() == layers[i + 1].in_dim()` and there is at least one
/// layer.
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
    catalog: ActivationCatalog,
    propagation: ErrorPropagation,
}

impl Mlp {
    /// Sigmoid network with seeded weights. `sizes` includes the input dimension.
    pub fn new_with_seed(sizes: &[usize], seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(sizes, &mut rng)
    }

    pub fn new_with_rng<R: Rng + ?Sized>(sizes: &[usize], rng: &mut R) -> Result<Self> {
        let activations = vec![DEFAULT_ACTIVATION; sizes.len().saturating_sub(1)];
        Self::with_activations(sizes, &activations, ActivationCatalog::new(), rng)
    }

    /// Network with one activation name per layer.
    ///
    /// `activations.len()` must be `sizes.len() - 1`.
    pub fn with_activations<S, R>(
        sizes: &[usize],
        activations: &[S],
        catalog: ActivationCatalog,
        rng: &mut R,
    ) -> Result<Self>
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        if sizes.len() < 2 {
            return Err(Error::InvalidConfig(
                "sizes must include input and output dims".to_owned(),
            ));
        }
        if sizes.contains(&0) {
            return Err(Error::InvalidConfig(
                "all layer sizes must be > 0".to_owned(),
            ));
        }
        if activations.len() != sizes.len() - 1 {
            return Err(Error::InvalidConfig(format!(
                "activations length {} does not match sizes.len() - 1 ({})",
                activations.len(),
                sizes.len() - 1
            )));
        }

        let mut layers = Vec::with_capacity(sizes.len() - 1);
        for (w, act) in sizes.windows(2).zip(activations) {
            layers.push(Layer::new_with_rng(
                w[0],
                w[1],
                act.as_ref(),
                &catalog,
                rng,
            )?);
        }
        Self::from_layers(layers, catalog)
    }

    /// Assemble a network from existing layers, checking that their shapes chain and
    /// that every layer's activation is registered in `catalog`.
    pub fn from_layers(layers: Vec<Layer>, catalog: ActivationCatalog) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }
        for (i, layer) in layers.iter().enumerate() {
            // Every layer must be representable in model files written with `catalog`.
            if !catalog.contains(layer.activation_name()) {
                return Err(Error::ActivationNotFound(format!(
                    "layer {i} activation {:?} is not in the model catalog",
                    layer.activation_name()
                )));
            }
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].out_dim() != pair[1].in_dim() {
                return Err(Error::DimensionMismatch(format!(
                    "layer {} in_dim {} does not match layer {i} out_dim {}",
                    i + 1,
                    pair[1].in_dim(),
                    pair[0].out_dim()
                )));
            }
        }
        Ok(Self {
            layers,
            catalog,
            propagation: ErrorPropagation::default(),
        })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers
            .first()
            .expect("mlp must have at least one layer")
            .in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers
            .last()
            .expect("mlp must have at least one layer")
            .out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn catalog(&self) -> &ActivationCatalog {
        &self.catalog
    }

    #[inline]
    pub fn error_propagation(&self) -> ErrorPropagation {
        self.propagation
    }

    pub fn set_error_propagation(&mut self, mode: ErrorPropagation) {
        self.propagation = mode;
    }

    #[cfg(test)]
    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Output of the most recent forward pass.
    #[inline]
    pub fn output(&self) -> &Matrix {
        self.layers
            .last()
            .expect("mlp must have at least one layer")
            .outputs()
    }

    /// Forward pass over a `(batch, input_dim)` matrix.
    ///
    /// Every layer processes the whole batch with one multiply. Each layer caches its
    /// inputs and outputs for `backpropagate`.
    pub fn forward(&mut self, input: &Matrix) -> Result<&Matrix> {
        if input.cols() != self.input_dim() {
            return Err(Error::DimensionMismatch(format!(
                "input has {} columns, model input_dim is {}",
                input.cols(),
                self.input_dim()
            )));
        }

        self.layers[0].forward(input)?;
        for idx in 1..self.layers.len() {
            // Borrow the previous layer immutably and the current one mutably.
            let (left, right) = self.layers.split_at_mut(idx);
            right[0].forward(left[idx - 1].outputs())?;
        }
        Ok(self.output())
    }

    /// One gradient-descent step for the batch seen by the last `forward` call.
    ///
    /// The output error is `outputs - targets`. Walking back from the output layer,
    /// each hidden layer `i` receives `error * W[i + 1]^T`, and that product becomes
    /// `error` for the next layer up. The propagated signal is the raw error, not the
    /// activation-scaled gradient of the layer below.
    ///
    /// With [`ErrorPropagation::PostUpdate`] (the default) `W[i + 1]` has already been
    /// updated when it is read.
    pub fn backpropagate(&mut self, targets: &Matrix, learning_rate: f64) -> Result<()> {
        let last = self.layers.len() - 1;
        let mut error = loss::mse_gradient(self.layers[last].outputs(), targets)?;

        let mut snapshot = self.propagation_snapshot(last);
        self.layers[last].backward(&error, learning_rate)?;

        for idx in (0..last).rev() {
            let downstream = match snapshot.take() {
                Some(w_t) => w_t,
                None => self.layers[idx + 1].weights().transpose(),
            };
            let hidden_error = error.multiply(&downstream)?;

            snapshot = self.propagation_snapshot(idx);
            self.layers[idx].backward(&hidden_error, learning_rate)?;
            error = hidden_error;
        }
        Ok(())
    }

    /// Transposed weights of `idx` as they stand before its update, when needed.
    fn propagation_snapshot(&self, idx: usize) -> Option<Matrix> {
        match self.propagation {
            ErrorPropagation::PreUpdate if idx > 0 => Some(self.layers[idx].weights().transpose()),
            _ => None,
        }
    }

    /// Run a forward pass and return a copy of the final outputs.
    pub fn predict(&mut self, input: &Matrix) -> Result<Matrix> {
        self.forward(input).cloned()
    }

    /// Predict a single row of `inputs` as a `1 x output_dim` matrix.
    pub fn predict_row(&mut self, inputs: &Matrix, row: usize) -> Result<Matrix> {
        let x = inputs.row_matrix(row)?;
        self.predict(&x)
    }
}

impl fmt::Display for Mlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(f, "Layer {i} Activation: {}", layer.activation_name())?;
            write!(f, "{}", layer.weights())?;
            writeln!(f, "=============")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(v: f64) -> Matrix {
        Matrix::from_vec(1, 1, vec![v]).unwrap()
    }

    fn identity_chain(weights: &[f64]) -> Mlp {
        let catalog = ActivationCatalog::new();
        let layers = weights
            .iter()
            .map(|&w| Layer::from_weights(scalar(w), "identity", &catalog).unwrap())
            .collect();
        Mlp::from_layers(layers, catalog).unwrap()
    }

    fn chain_1_1_1() -> Mlp {
        identity_chain(&[0.5, 2.0])
    }

    fn scalar_weights(mlp: &Mlp) -> Vec<f64> {
        mlp.layers().iter().map(|l| l.weights()[(0, 0)]).collect()
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let mut a = Mlp::new_with_seed(&[2, 3, 1], 123).unwrap();
        let mut b = Mlp::new_with_seed(&[2, 3, 1], 123).unwrap();
        let x = Matrix::from_vec(1, 2, vec![0.3, -0.7]).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn from_layers_checks_chaining() {
        let catalog = ActivationCatalog::new();
        let l0 = Layer::from_weights(Matrix::new(2, 3), "relu", &catalog).unwrap();
        let l1 = Layer::from_weights(Matrix::new(4, 1), "relu", &catalog).unwrap();
        let err = Mlp::from_layers(vec![l0, l1], catalog.clone()).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
        assert!(Mlp::from_layers(vec![], catalog).is_err());
    }

    #[test]
    fn from_layers_rejects_activation_missing_from_catalog() {
        let mut custom = ActivationCatalog::new();
        custom
            .register(
                "cube",
                |m: &mut Matrix| m.map_in_place(|x| x * x * x),
                |y: &Matrix| y.map(|v| 3.0 * v.cbrt() * v.cbrt()),
            )
            .unwrap();
        let layer = Layer::from_weights(scalar(1.0), "cube", &custom).unwrap();

        let err = Mlp::from_layers(vec![layer.clone()], ActivationCatalog::new()).unwrap_err();
        assert!(matches!(err, Error::ActivationNotFound(_)));

        let mlp = Mlp::from_layers(vec![layer], custom).unwrap();
        assert_eq!(mlp.layers()[0].activation_name(), "cube");
    }

    #[test]
    fn constructor_validates_sizes_and_activations() {
        let mut rng = StdRng::seed_from_u64(0);
        let catalog = ActivationCatalog::new();
        assert!(Mlp::new_with_seed(&[3], 0).is_err());
        assert!(Mlp::new_with_seed(&[3, 0, 1], 0).is_err());
        assert!(Mlp::with_activations(&[2, 3, 1], &["relu"], catalog.clone(), &mut rng).is_err());

        let mlp = Mlp::with_activations(&[2, 3, 1], &["relu", "tanh"], catalog, &mut rng).unwrap();
        assert_eq!(mlp.layers()[0].activation_name(), "relu");
        assert_eq!(mlp.layers()[1].activation_name(), "tanh");
        assert_eq!((mlp.input_dim(), mlp.output_dim()), (2, 1));
    }

    #[test]
    fn forward_batch_matches_row_by_row() {
        let mut mlp = Mlp::new_with_seed(&[3, 5, 2], 9).unwrap();
        let x = Matrix::from_vec(
            3,
            3,
            vec![0.1, 0.2, 0.3, -1.0, 0.5, 0.0, 0.9, -0.4, 0.7],
        )
        .unwrap();
        let batch = mlp.predict(&x).unwrap();
        assert_eq!(batch.shape(), (3, 2));

        for r in 0..3 {
            let single = mlp.predict_row(&x, r).unwrap();
            for c in 0..2 {
                assert!((single[(0, c)] - batch[(r, c)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn forward_rejects_wrong_input_width() {
        let mut mlp = Mlp::new_with_seed(&[2, 3, 1], 0).unwrap();
        let err = mlp.forward(&Matrix::new(1, 3)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
    }

    #[test]
    fn predict_is_idempotent() {
        let mut mlp = Mlp::new_with_seed(&[2, 4, 1], 1).unwrap();
        let x = Matrix::from_vec(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let a = mlp.predict(&x).unwrap();
        let b = mlp.predict(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn backpropagate_reads_updated_downstream_weights() {
        let mut mlp = chain_1_1_1();
        mlp.forward(&scalar(1.0)).unwrap();
        mlp.backpropagate(&scalar(0.0), 0.1).unwrap();

        // Output error 1.0; W1 = 2.0 - 0.1 * 0.5 = 1.95; hidden error 1.95.
        let w1 = mlp.layers()[1].weights()[(0, 0)];
        let w0 = mlp.layers()[0].weights()[(0, 0)];
        assert!((w1 - 1.95).abs() < 1e-12);
        assert!((w0 - (0.5 - 0.1 * 1.95)).abs() < 1e-12);
    }

    #[test]
    fn pre_update_mode_reads_original_downstream_weights() {
        let mut mlp = chain_1_1_1();
        mlp.set_error_propagation(ErrorPropagation::PreUpdate);
        mlp.forward(&scalar(1.0)).unwrap();
        mlp.backpropagate(&scalar(0.0), 0.1).unwrap();

        let w1 = mlp.layers()[1].weights()[(0, 0)];
        let w0 = mlp.layers()[0].weights()[(0, 0)];
        assert!((w1 - 1.95).abs() < 1e-12);
        assert!((w0 - (0.5 - 0.1 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn hidden_error_chains_through_every_layer() {
        let mut mlp = identity_chain(&[0.5, 2.0, 3.0]);
        mlp.forward(&scalar(1.0)).unwrap();
        mlp.backpropagate(&scalar(0.0), 0.1).unwrap();

        // Output error 3.0; W2 -> 2.7, error 3.0 * 2.7 = 8.1;
        // W1 -> 2.0 - 0.1 * 0.5 * 8.1 = 1.595, error 8.1 * 1.595 = 12.9195;
        // W0 -> 0.5 - 0.1 * 12.9195.
        let expected = [-0.79195, 1.595, 2.7];
        for (got, want) in scalar_weights(&mlp).into_iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }

    #[test]
    fn pre_update_mode_chains_snapshots_through_every_layer() {
        let mut mlp = identity_chain(&[0.5, 2.0, 3.0]);
        mlp.set_error_propagation(ErrorPropagation::PreUpdate);
        mlp.forward(&scalar(1.0)).unwrap();
        mlp.backpropagate(&scalar(0.0), 0.1).unwrap();

        // Error 3.0 * 3.0 = 9.0 into layer 1, then 9.0 * 2.0 = 18.0 into layer 0.
        let expected = [0.5 - 0.1 * 18.0, 2.0 - 0.1 * 0.5 * 9.0, 2.7];
        for (got, want) in scalar_weights(&mlp).into_iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }

    #[test]
    fn backpropagate_rejects_target_shape_mismatch() {
        let mut mlp = Mlp::new_with_seed(&[2, 3, 1], 0).unwrap();
        mlp.forward(&Matrix::new(4, 2)).unwrap();
        let err = mlp.backpropagate(&Matrix::new(3, 1), 0.1).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
    }

    fn half_sse(mlp: &mut Mlp, x: &Matrix, t: &Matrix) -> f64 {
        let y = mlp.predict(x).unwrap();
        let d = y.subtract(t).unwrap();
        0.5 * d.as_slice().iter().map(|v| v * v).sum::<f64>()
    }

    fn assert_close(analytic: f64, numeric: f64, abs_tol: f64, rel_tol: f64) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn pre_update_step_with_linear_output_follows_numeric_gradient() {
        // With an identity output layer the raw propagated error equals dL/d(hidden),
        // so the pre-update step is exactly `lr * gradient` of 0.5 * SSE.
        let mut rng = StdRng::seed_from_u64(3);
        let mut mlp = Mlp::with_activations(
            &[2, 3, 1],
            &["tanh", "identity"],
            ActivationCatalog::new(),
            &mut rng,
        )
        .unwrap();
        mlp.set_error_propagation(ErrorPropagation::PreUpdate);

        let x = Matrix::from_vec(2, 2, vec![0.3, -0.7, 0.8, 0.1]).unwrap();
        let t = Matrix::from_vec(2, 1, vec![0.2, -0.4]).unwrap();
        let lr = 1e-3;
        let eps = 1e-5;

        let before: Vec<Matrix> = mlp.layers().iter().map(|l| l.weights().clone()).collect();

        let mut numeric = Vec::new();
        for (layer_idx, w) in before.iter().enumerate() {
            let mut grads = Vec::with_capacity(w.as_slice().len());
            for p in 0..w.as_slice().len() {
                let orig = w.as_slice()[p];

                mlp.layers_mut()[layer_idx].weights_mut().as_mut_slice()[p] = orig + eps;
                let plus = half_sse(&mut mlp, &x, &t);
                mlp.layers_mut()[layer_idx].weights_mut().as_mut_slice()[p] = orig - eps;
                let minus = half_sse(&mut mlp, &x, &t);
                mlp.layers_mut()[layer_idx].weights_mut().as_mut_slice()[p] = orig;

                grads.push((plus - minus) / (2.0 * eps));
            }
            numeric.push(grads);
        }

        mlp.forward(&x).unwrap();
        mlp.backpropagate(&t, lr).unwrap();

        for (layer_idx, w) in before.iter().enumerate() {
            let after = mlp.layers()[layer_idx].weights().as_slice();
            for p in 0..w.as_slice().len() {
                let analytic = (w.as_slice()[p] - after[p]) / lr;
                assert_close(analytic, numeric[layer_idx][p], 1e-6, 1e-4);
            }
        }
    }

    #[test]
    fn display_lists_each_layer() {
        let mlp = chain_1_1_1();
        let s = mlp.to_string();
        assert!(s.starts_with("Layer 0 Activation: identity\n0.5\n"));
        assert!(s.contains("Layer 1 Activation: identity\n2\n"));
    }
}
