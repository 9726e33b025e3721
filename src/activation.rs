//! Activation functions and the catalog that names them.
//!
//! A layer computes a pre-activation `net = inputs * weights` and then applies an
//! activation function element-wise. Only the *post-activation* outputs are cached,
//! so every derivative here is expressed in terms of the activation output `y`.
//!
//! Model files refer to activations by a small integer. That integer is the entry's
//! position in an [`ActivationCatalog`], which is an ordered list: the built-ins are
//! always registered first and in a fixed order, and custom functions are appended.
//! Saving and loading with catalogs configured the same way therefore agrees on every
//! index.

use std::fmt;
use std::sync::Arc;

use crate::{Error, Matrix, Result};

/// Name used when an activation cannot be resolved.
pub const DEFAULT_ACTIVATION: &str = "sigmoid";

/// Slope used by the built-in `leaky_relu` entry.
pub const LEAKY_RELU_ALPHA: f64 = 0.01;

/// In-place activation over a whole matrix.
pub type ActivateFn = Arc<dyn Fn(&mut Matrix) + Send + Sync>;

/// Derivative from post-activation outputs; returns a matrix of the same shape.
pub type DerivativeFn = Arc<dyn Fn(&Matrix) -> Matrix + Send + Sync>;

/// Element-wise activation function.
#[derive(Clone)]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Identity,
    LeakyRelu {
        alpha: f64,
    },
    /// User-supplied function pair.
    Custom {
        activate: ActivateFn,
        derivative: DerivativeFn,
    },
}

impl Activation {
    /// Apply the activation to every element of `m`.
    pub fn activate(&self, m: &mut Matrix) {
        match self {
            Activation::Custom { activate, .. } => activate(m),
            builtin => m.map_in_place(|x| builtin.forward(x)),
        }
    }

    /// Derivative with respect to the pre-activation, given the cached outputs.
    pub fn derivative(&self, output: &Matrix) -> Matrix {
        match self {
            Activation::Custom { derivative, .. } => derivative(output),
            builtin => output.map(|y| builtin.grad_from_output(y)),
        }
    }

    #[inline]
    pub(crate) fn forward(&self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Identity => x,
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Custom { .. } => unreachable!("custom activations work on whole matrices"),
        }
    }

    #[inline]
    pub(crate) fn grad_from_output(&self, y: f64) -> f64 {
        match self {
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::Identity => 1.0,
            Activation::LeakyRelu { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    *alpha
                }
            }
            Activation::Custom { .. } => unreachable!("custom activations work on whole matrices"),
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Relu => f.write_str("Relu"),
            Activation::Sigmoid => f.write_str("Sigmoid"),
            Activation::Tanh => f.write_str("Tanh"),
            Activation::Identity => f.write_str("Identity"),
            Activation::LeakyRelu { alpha } => {
                f.debug_struct("LeakyRelu").field("alpha", alpha).finish()
            }
            Activation::Custom { .. } => f.write_str("Custom"),
        }
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// Ordered mapping between activation names, functions, and persisted indices.
#[derive(Debug, Clone)]
pub struct ActivationCatalog {
    entries: Vec<(String, Activation)>,
}

impl Default for ActivationCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationCatalog {
    /// Catalog holding the built-ins.
    ///
    /// Indices: `relu` = 0, `sigmoid` = 1, `tanh` = 2, `identity` = 3, `leaky_relu` = 4.
    pub fn new() -> Self {
        let entries = vec![
            ("relu".to_owned(), Activation::Relu),
            ("sigmoid".to_owned(), Activation::Sigmoid),
            ("tanh".to_owned(), Activation::Tanh),
            ("identity".to_owned(), Activation::Identity),
            (
                "leaky_relu".to_owned(),
                Activation::LeakyRelu {
                    alpha: LEAKY_RELU_ALPHA,
                },
            ),
        ];
        Self { entries }
    }

    pub fn lookup(&self, name: &str) -> Result<Activation> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, act)| act.clone())
            .ok_or_else(|| Error::ActivationNotFound(name.to_owned()))
    }

    pub fn index_of(&self, name: &str) -> Result<u8> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| Error::ActivationNotFound(name.to_owned()))?;
        // `register` caps the catalog at 256 entries.
        Ok(idx as u8)
    }

    /// Name stored at `index`.
    ///
    /// Indices past the end of the catalog resolve to [`DEFAULT_ACTIVATION`].
    pub fn name_of(&self, index: u8) -> &str {
        match self.entries.get(usize::from(index)) {
            Some((name, _)) => name,
            None => {
                tracing::warn!(
                    index,
                    known = self.entries.len(),
                    "unknown activation index, defaulting to {DEFAULT_ACTIVATION}"
                );
                DEFAULT_ACTIVATION
            }
        }
    }

    /// Append a custom activation and return its index.
    pub fn register<A, D>(&mut self, name: impl Into<String>, activate: A, derivative: D) -> Result<u8>
    where
        A: Fn(&mut Matrix) + Send + Sync + 'static,
        D: Fn(&Matrix) -> Matrix + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(Error::ActivationExists(name));
        }
        if self.entries.len() > usize::from(u8::MAX) {
            return Err(Error::InvalidConfig(format!(
                "activation catalog is full ({} entries)",
                self.entries.len()
            )));
        }

        self.entries.push((
            name,
            Activation::Custom {
                activate: Arc::new(activate),
                derivative: Arc::new(derivative),
            },
        ));
        Ok((self.entries.len() - 1) as u8)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::capture_warnings;

    #[test]
    fn builtin_indices_are_fixed() {
        let catalog = ActivationCatalog::new();
        assert_eq!(catalog.index_of("relu").unwrap(), 0);
        assert_eq!(catalog.index_of("sigmoid").unwrap(), 1);
        assert_eq!(catalog.index_of("tanh").unwrap(), 2);
        assert_eq!(catalog.index_of("identity").unwrap(), 3);
        assert_eq!(catalog.index_of("leaky_relu").unwrap(), 4);

        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(
            names,
            ["relu", "sigmoid", "tanh", "identity", "leaky_relu"]
        );
    }

    #[test]
    fn indices_agree_across_instances() {
        let a = ActivationCatalog::new();
        let b = ActivationCatalog::default();
        for name in a.names() {
            let idx = a.index_of(name).unwrap();
            assert_eq!(b.name_of(idx), name);
        }
    }

    #[test]
    fn unknown_names_fail_and_unknown_indices_fall_back() {
        let catalog = ActivationCatalog::new();
        assert!(matches!(
            catalog.lookup("softplus"),
            Err(Error::ActivationNotFound(_))
        ));
        assert!(catalog.index_of("softplus").is_err());
        assert_eq!(catalog.name_of(200), DEFAULT_ACTIVATION);
    }

    #[test]
    fn unknown_index_fallback_is_logged() {
        let catalog = ActivationCatalog::new();
        let (name, logged) = capture_warnings(|| catalog.name_of(200).to_owned());
        assert_eq!(name, DEFAULT_ACTIVATION);
        assert!(logged.contains("WARN"), "{logged}");
        assert!(logged.contains("index=200"), "{logged}");

        let (_, quiet) = capture_warnings(|| catalog.name_of(2).to_owned());
        assert!(quiet.is_empty(), "{quiet}");
    }

    #[test]
    fn register_appends_and_rejects_duplicates() {
        let mut catalog = ActivationCatalog::new();
        let idx = catalog
            .register(
                "square",
                |m: &mut Matrix| m.map_in_place(|x| x * x),
                |y: &Matrix| y.map(|v| 2.0 * v.sqrt()),
            )
            .unwrap();
        assert_eq!(idx, 5);
        assert_eq!(catalog.name_of(5), "square");

        let act = catalog.lookup("square").unwrap();
        let mut m = Matrix::from_vec(1, 2, vec![3.0, -2.0]).unwrap();
        act.activate(&mut m);
        assert_eq!(m.as_slice(), &[9.0, 4.0]);

        let err = catalog
            .register("relu", |_: &mut Matrix| {}, |y: &Matrix| y.clone())
            .unwrap_err();
        assert!(matches!(err, Error::ActivationExists(_)));
    }

    #[test]
    fn sigmoid_basic_values() {
        let y0 = Activation::Sigmoid.forward(0.0);
        assert!((y0 - 0.5).abs() < 1e-12);
        assert!(Activation::Sigmoid.forward(10.0) > 0.999);
        assert!(Activation::Sigmoid.forward(-10.0) < 0.001);
        assert!((Activation::Sigmoid.grad_from_output(y0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn relu_and_leaky_relu_shapes() {
        assert_eq!(Activation::Relu.forward(-2.0), 0.0);
        assert_eq!(Activation::Relu.forward(3.0), 3.0);
        assert_eq!(Activation::Relu.grad_from_output(0.0), 0.0);
        assert_eq!(Activation::Relu.grad_from_output(1.0), 1.0);

        let act = Activation::LeakyRelu { alpha: 0.1 };
        assert_eq!(act.forward(-2.0), -0.2);
        assert_eq!(act.grad_from_output(-0.2), 0.1);
        assert_eq!(act.grad_from_output(3.0), 1.0);
    }

    #[test]
    fn matrix_derivative_keeps_shape() {
        let mut m = Matrix::from_vec(2, 2, vec![0.3, -0.1, 0.0, 2.0]).unwrap();
        Activation::Tanh.activate(&mut m);
        let d = Activation::Tanh.derivative(&m);
        assert_eq!(d.shape(), (2, 2));
        for (y, g) in m.as_slice().iter().zip(d.as_slice()) {
            assert!((g - (1.0 - y * y)).abs() < 1e-12);
        }
    }
}
