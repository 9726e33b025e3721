//! JSON model export (feature: `serde`).
//!
//! A versioned, human-readable alternative to the binary formats in `persist`.
//! Activations are stored by name rather than by catalog index, so a JSON model does
//! not depend on catalog ordering; custom activations still have to be registered in
//! the catalog handed to the loader.
//!
//! Design notes:
//! - We do NOT directly serialize internal `Mlp`/`Layer` structs, to keep the
//!   file format stable even if internal representation changes.
//! - Deserialization validates shapes, weight counts, chaining, and finiteness.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ActivationCatalog, Error, Layer, Matrix, Mlp, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedMlp {
    pub format_version: u32,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub rows: usize,
    pub cols: usize,
    pub activation: String,
    /// Row-major (rows, cols).
    pub weights: Vec<f64>,
}

impl SerializedMlp {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate()?;

            if i > 0 {
                let prev_out = self.layers[i - 1].cols;
                if layer.rows != prev_out {
                    return Err(Error::InvalidData(format!(
                        "layer {i} rows {} does not match previous cols {}",
                        layer.rows, prev_out
                    )));
                }
            }
        }
        Ok(())
    }

    fn into_mlp(self, catalog: ActivationCatalog) -> Result<Mlp> {
        self.validate()?;

        let mut layers = Vec::with_capacity(self.layers.len());
        for layer in self.layers {
            let weights = Matrix::from_vec(layer.rows, layer.cols, layer.weights)?;
            layers.push(Layer::from_weights(weights, &layer.activation, &catalog)?);
        }
        Mlp::from_layers(layers, catalog)
    }
}

impl SerializedLayer {
    fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidData(format!(
                "layer dims must be > 0, got rows={} cols={}",
                self.rows, self.cols
            )));
        }

        let expected = self
            .rows
            .checked_mul(self.cols)
            .ok_or_else(|| Error::InvalidData("layer weight shape overflow".to_owned()))?;
        if self.weights.len() != expected {
            return Err(Error::InvalidData(format!(
                "weights length {} does not match rows * cols ({} * {})",
                self.weights.len(),
                self.rows,
                self.cols
            )));
        }
        if self.weights.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "weights must contain only finite values".to_owned(),
            ));
        }
        Ok(())
    }
}

impl From<&Mlp> for SerializedMlp {
    fn from(model: &Mlp) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers: model.layers().iter().map(SerializedLayer::from).collect(),
        }
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            rows: layer.in_dim(),
            cols: layer.out_dim(),
            activation: layer.activation_name().to_owned(),
            weights: layer.weights().as_slice().to_vec(),
        }
    }
}

impl Mlp {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedMlp::from(self);
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Serialize the model to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = SerializedMlp::from(self);
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str, catalog: ActivationCatalog) -> Result<Self> {
        let ser: SerializedMlp = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.into_mlp(catalog)
    }

    /// Save the model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        std::fs::write(path.as_ref(), s)?;
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P, catalog: ActivationCatalog) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&s, catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Mlp {
        let catalog = ActivationCatalog::new();
        let l1 = Layer::from_weights(
            Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
            "tanh",
            &catalog,
        )
        .unwrap();
        let l2 = Layer::from_weights(
            Matrix::from_vec(3, 1, vec![7.0, 8.0, 9.0]).unwrap(),
            "identity",
            &catalog,
        )
        .unwrap();
        Mlp::from_layers(vec![l1, l2], catalog).unwrap()
    }

    #[test]
    fn json_roundtrips() {
        let mlp = small();
        let json = mlp.to_json_string_pretty().unwrap();
        assert!(json.contains("\"activation\": \"tanh\""));

        let loaded = Mlp::from_json_str(&json, ActivationCatalog::new()).unwrap();
        assert_eq!(loaded.to_json_string_pretty().unwrap(), json);
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"layers":[]}"#;
        let err = Mlp::from_json_str(bad, ActivationCatalog::new()).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_broken_chaining() {
        let bad = r#"{"format_version":1,"layers":[
            {"rows":1,"cols":2,"activation":"relu","weights":[0.0,0.0]},
            {"rows":3,"cols":1,"activation":"relu","weights":[0.0,0.0,0.0]}
        ]}"#;
        assert!(Mlp::from_json_str(bad, ActivationCatalog::new()).is_err());
    }
}
