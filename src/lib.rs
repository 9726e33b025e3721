//! A small feed-forward network crate.
//!
//! `ffnet` is a from-scratch implementation of a dense multilayer perceptron trained with
//! plain gradient descent. It has three layers of abstraction:
//!
//! - [`Matrix`]: dense row-major `f64` matrices with the handful of operations training
//!   needs (`multiply`, `subtract`, `hadamard`, `transpose`, `subrange`, `randomize`).
//! - [`Layer`]: one weight matrix plus a named activation; `forward` caches its inputs
//!   and outputs, `backward` applies a gradient step in place.
//! - [`Mlp`]: an ordered chain of layers with batched `forward`, `backpropagate`,
//!   full-batch and mini-batch training, and model files.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - Samples are rows: inputs are `(batch_size, input_dim)`, outputs are
//!   `(batch_size, output_dim)`.
//! - Layer weights have shape `(in_dim, out_dim)`; layers have no bias term.
//!
//! # Activations
//!
//! Activations are looked up by name in an [`ActivationCatalog`] owned by the network.
//! The catalog is ordered, and the position of a name is what model files store, so
//! a file must be loaded with a catalog configured the same way it was saved.
//!
//! # Model files
//!
//! See [`persist`] for the plain (`f64`) and quantized (`i8`) binary layouts. With the
//! `serde` feature, `serde_model` adds a versioned JSON format.
//!
//! # Quick start
//!
//! ```rust
//! use ffnet::{Matrix, MlpBuilder};
//!
//! # fn main() -> ffnet::Result<()> {
//! let xs = Matrix::from_rows(&[
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ])?;
//! let ys = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]])?;
//!
//! let mut mlp = MlpBuilder::from_sizes(&[2, 10, 1], &["sigmoid", "sigmoid"])?
//!     .build_with_seed(0)?;
//! mlp.train(&xs, &ys, 0.5, 200)?;
//!
//! let pred = mlp.predict(&xs)?;
//! assert_eq!(pred.shape(), (4, 1));
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod matrix;
pub mod mlp;
pub mod persist;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

#[cfg(test)]
mod testutil;

pub use activation::{Activation, ActivationCatalog};
pub use builder::MlpBuilder;
pub use data::{Dataset, Split};
pub use error::{Error, Result};
pub use layer::Layer;
pub use matrix::Matrix;
pub use mlp::{ErrorPropagation, Mlp};
pub use persist::Dequantize;
pub use train::{FitConfig, FitReport};
