//! Model builder.
//!
//! `MlpBuilder` makes model structure explicit: an input dimension followed by one
//! `(out_dim, activation name)` entry per layer. Activation names are resolved against
//! the builder's catalog when the model is built; unknown names fall back to `sigmoid`
//! with a warning, exactly like [`Layer::new_with_rng`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::mlp::ErrorPropagation;
use crate::{ActivationCatalog, Error, Layer, Mlp, Result};

#[derive(Debug, Clone)]
struct LayerSpec {
    out_dim: usize,
    activation: String,
}

/// Builder for an `Mlp`.
///
/// ```rust
/// use ffnet::MlpBuilder;
///
/// # fn main() -> ffnet::Result<()> {
/// let mlp = MlpBuilder::new(2)?
///     .add_layer(10, "sigmoid")?
///     .add_layer(1, "sigmoid")?
///     .build_with_seed(0)?;
/// assert_eq!(mlp.num_layers(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MlpBuilder {
    input_dim: usize,
    layers: Vec<LayerSpec>,
    catalog: ActivationCatalog,
    propagation: ErrorPropagation,
}

impl MlpBuilder {
    /// Start building an MLP that accepts rows of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
            catalog: ActivationCatalog::new(),
            propagation: ErrorPropagation::default(),
        })
    }

    /// Convenience constructor from a sizes list + activation names.
    ///
    /// `sizes` includes input and output dimensions, so its length must be at least 2.
    /// `activations` must have length `sizes.len() - 1`.
    pub fn from_sizes<S: AsRef<str>>(sizes: &[usize], activations: &[S]) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(Error::InvalidConfig(
                "sizes must include input and output dims".to_owned(),
            ));
        }
        if activations.len() != sizes.len() - 1 {
            return Err(Error::InvalidConfig(format!(
                "activations length {} does not match sizes.len() - 1 ({})",
                activations.len(),
                sizes.len() - 1
            )));
        }

        let mut b = Self::new(sizes[0])?;
        for (out_dim, act) in sizes[1..].iter().zip(activations) {
            b = b.add_layer(*out_dim, act.as_ref())?;
        }
        Ok(b)
    }

    /// Add a dense layer with `out_dim` outputs.
    pub fn add_layer(mut self, out_dim: usize, activation: &str) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        self.layers.push(LayerSpec {
            out_dim,
            activation: activation.to_owned(),
        });
        Ok(self)
    }

    /// Use `catalog` (for example one with custom activations registered).
    pub fn catalog(mut self, catalog: ActivationCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn error_propagation(mut self, mode: ErrorPropagation) -> Self {
        self.propagation = mode;
        self
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Mlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Mlp> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for spec in &self.layers {
            let layer =
                Layer::new_with_rng(in_dim, spec.out_dim, &spec.activation, &self.catalog, rng)?;
            layers.push(layer);
            in_dim = spec.out_dim;
        }

        let mut mlp = Mlp::from_layers(layers, self.catalog)?;
        mlp.set_error_propagation(self.propagation);
        Ok(mlp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_zero_sized_specs() {
        assert!(MlpBuilder::new(0).is_err());
        assert!(MlpBuilder::new(2).unwrap().add_layer(0, "relu").is_err());
        assert!(MlpBuilder::new(2).unwrap().build_with_seed(0).is_err());
        assert!(MlpBuilder::from_sizes(&[2, 3], &["relu", "relu"]).is_err());
    }

    #[test]
    fn from_sizes_matches_manual_builder() {
        let a = MlpBuilder::from_sizes(&[2, 4, 1], &["tanh", "sigmoid"])
            .unwrap()
            .build_with_seed(5)
            .unwrap();
        let b = MlpBuilder::new(2)
            .unwrap()
            .add_layer(4, "tanh")
            .unwrap()
            .add_layer(1, "sigmoid")
            .unwrap()
            .build_with_seed(5)
            .unwrap();
        for (la, lb) in a.layers().iter().zip(b.layers()) {
            assert_eq!(la.weights(), lb.weights());
            assert_eq!(la.activation_name(), lb.activation_name());
        }
    }

    #[test]
    fn custom_catalog_and_mode_are_carried_into_the_model() {
        let mut catalog = ActivationCatalog::new();
        catalog
            .register(
                "softsign",
                |m: &mut crate::Matrix| m.map_in_place(|x| x / (1.0 + x.abs())),
                |y: &crate::Matrix| y.map(|v| (1.0 - v.abs()) * (1.0 - v.abs())),
            )
            .unwrap();

        let mlp = MlpBuilder::new(3)
            .unwrap()
            .add_layer(2, "softsign")
            .unwrap()
            .catalog(catalog)
            .error_propagation(ErrorPropagation::PreUpdate)
            .build_with_seed(0)
            .unwrap();

        assert_eq!(mlp.layers()[0].activation_name(), "softsign");
        assert_eq!(mlp.catalog().index_of("softsign").unwrap(), 5);
        assert_eq!(mlp.error_propagation(), ErrorPropagation::PreUpdate);
    }
}
