//! Binary model files.
//!
//! Two headerless, little-endian layouts are supported.
//!
//! Plain (`f64` weights):
//!
//! ```text
//! i32 layer_count
//! per layer: i32 rows, i32 cols, rows * cols x f64 (row-major), u8 activation_index
//! ```
//!
//! Quantized (`i8` weights sharing one exponent):
//!
//! ```text
//! i32 layer_count, u8 exponent
//! per layer: i32 rows, i32 cols, rows * cols x i8 (row-major), u8 activation_index
//! ```
//!
//! `exponent` is the number of integer bits needed by the largest absolute weight
//! across all layers: `0` when that weight is below 1, else `floor(log2(floor(max))) + 1`.
//! A weight `v` is stored as `round(v * 2^(7 - exponent))`.
//!
//! Activation indices are positions in the [`ActivationCatalog`] passed to the
//! loader, so files must be read with a catalog configured like the one that wrote
//! them.
//!
//! Loading checks that the byte stream holds exactly the declared layers and that
//! their shapes chain; anything else is reported as [`Error::CorruptModel`].

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::{ActivationCatalog, Error, Layer, Matrix, Mlp, Result};

/// Fractional + integer bits available in an `i8` weight.
const QUANT_BITS: u32 = 7;

/// Upper bound on elements reserved ahead of reading, so a corrupt header cannot
/// trigger a huge allocation before the data runs out.
const MAX_PREALLOC: usize = 1 << 16;

/// How quantized weights are turned back into `f64` on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dequantize {
    /// Store the raw `i8` value as the weight (`q as f64`), without rescaling.
    ///
    /// This reproduces the reference loader, which stores the raw integer without
    /// rescaling. It is useful for inspecting the stored integers; the resulting
    /// network does not reproduce the saved model's outputs.
    Raw,
    /// Rescale: `q / 2^(7 - exponent)`.
    #[default]
    Scaled,
}

/// Integer bits needed to represent `max_abs`.
pub fn weight_exponent(max_abs: f64) -> u32 {
    // Saturating cast: non-finite or huge values map to u64::MAX.
    let integer_part = max_abs.abs().trunc() as u64;
    if integer_part == 0 {
        0
    } else {
        u64::BITS - integer_part.leading_zeros()
    }
}

#[inline]
fn scale(exponent: u8) -> f64 {
    debug_assert!(u32::from(exponent) <= QUANT_BITS);
    f64::from(1_u32 << (QUANT_BITS - u32::from(exponent)))
}

/// `round(value * 2^(7 - exponent))`, saturated to the `i8` range.
///
/// Panics if `exponent > 7`.
#[inline]
pub fn quantize(value: f64, exponent: u8) -> i8 {
    assert!(u32::from(exponent) <= QUANT_BITS, "exponent {exponent} > 7");
    // `as` saturates at i8::MIN / i8::MAX.
    (value * scale(exponent)).round() as i8
}

/// `q / 2^(7 - exponent)`.
///
/// Panics if `exponent > 7`.
#[inline]
pub fn dequantize(q: i8, exponent: u8) -> f64 {
    assert!(u32::from(exponent) <= QUANT_BITS, "exponent {exponent} > 7");
    f64::from(q) / scale(exponent)
}

impl Mlp {
    /// Largest absolute weight across every layer.
    ///
    /// `NaN` weights are skipped; [`Mlp::write_quantized`] rejects them separately.
    pub fn max_abs_weight(&self) -> f64 {
        self.layers()
            .iter()
            .map(|l| l.weights().max_abs())
            .fold(0.0, f64::max)
    }

    /// Shared exponent the quantized format would use for this model.
    pub fn quantization_exponent(&self) -> u32 {
        weight_exponent(self.max_abs_weight())
    }

    /// Write the plain format.
    pub fn write_binary<W: Write>(&self, w: &mut W) -> Result<()> {
        write_i32(w, self.num_layers(), "layer count")?;
        for layer in self.layers() {
            let weights = layer.weights();
            write_i32(w, weights.rows(), "rows")?;
            write_i32(w, weights.cols(), "cols")?;
            for v in weights.as_slice() {
                w.write_all(&v.to_le_bytes())?;
            }
            w.write_all(&[self.activation_index(layer)?])?;
        }
        Ok(())
    }

    pub fn to_binary_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_binary(&mut buf)?;
        Ok(buf)
    }

    /// Save the plain format to `path`.
    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        let mut w = BufWriter::new(File::create(p)?);
        self.write_binary(&mut w)?;
        w.flush()?;
        tracing::debug!(path = %p.display(), layers = self.num_layers(), "saved model");
        Ok(())
    }

    /// Read the plain format.
    pub fn read_binary<R: Read>(r: &mut R, catalog: ActivationCatalog) -> Result<Mlp> {
        let num_layers = read_count(r, "layer count")?;
        let mut layers = Vec::with_capacity(num_layers.min(MAX_PREALLOC));
        for l in 0..num_layers {
            let (rows, cols) = read_shape(r, l)?;
            let mut data = Vec::with_capacity((rows * cols).min(MAX_PREALLOC));
            for _ in 0..rows * cols {
                data.push(f64::from_le_bytes(read_array(r, "weights")?));
            }
            layers.push(read_layer_tail(r, Matrix::from_vec(rows, cols, data)?, &catalog)?);
        }
        finish(r, layers, catalog)
    }

    /// Load the plain format from `path`.
    pub fn load_binary<P: AsRef<Path>>(path: P, catalog: ActivationCatalog) -> Result<Mlp> {
        let p = path.as_ref();
        let mut r = BufReader::new(File::open(p)?);
        let mlp = Self::read_binary(&mut r, catalog)?;
        tracing::debug!(path = %p.display(), layers = mlp.num_layers(), "loaded model");
        Ok(mlp)
    }

    /// Write the quantized format.
    ///
    /// Fails with [`Error::QuantizationOverflow`] when the largest weight is 128 or
    /// more. A weight that rounds one step past the `i8` range (only possible right
    /// below a power of two, e.g. `0.999` with exponent 0) is clamped, and a warning
    /// reports how many were clamped.
    ///
    /// Fails with [`Error::InvalidData`] if any weight is `NaN` or infinite.
    pub fn write_quantized<W: Write>(&self, w: &mut W) -> Result<()> {
        for (i, layer) in self.layers().iter().enumerate() {
            if layer.weights().as_slice().iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidData(format!(
                    "layer {i} has non-finite weights and cannot be quantized"
                )));
            }
        }
        let max_abs = self.max_abs_weight();
        let exponent = weight_exponent(max_abs);
        if exponent > QUANT_BITS {
            return Err(Error::QuantizationOverflow { max_abs, exponent });
        }
        // Checked above: exponent <= 7.
        let exponent = exponent as u8;

        write_i32(w, self.num_layers(), "layer count")?;
        w.write_all(&[exponent])?;

        let limit = (f64::from(i8::MIN), f64::from(i8::MAX));
        let mut clamped = 0_usize;
        for layer in self.layers() {
            let weights = layer.weights();
            write_i32(w, weights.rows(), "rows")?;
            write_i32(w, weights.cols(), "cols")?;

            let mut bytes = Vec::with_capacity(weights.as_slice().len());
            for &v in weights.as_slice() {
                let scaled = (v * scale(exponent)).round();
                if scaled < limit.0 || scaled > limit.1 {
                    clamped += 1;
                }
                bytes.extend_from_slice(&quantize(v, exponent).to_le_bytes());
            }
            w.write_all(&bytes)?;
            w.write_all(&[self.activation_index(layer)?])?;
        }

        if clamped > 0 {
            tracing::warn!(
                clamped,
                exponent,
                max_abs,
                "quantized weights exceeded the i8 range and were clamped"
            );
        }
        Ok(())
    }

    pub fn to_quantized_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_quantized(&mut buf)?;
        Ok(buf)
    }

    /// Save the quantized format to `path`.
    pub fn save_quantized<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        let mut w = BufWriter::new(File::create(p)?);
        self.write_quantized(&mut w)?;
        w.flush()?;
        tracing::debug!(
            path = %p.display(),
            layers = self.num_layers(),
            "saved quantized model"
        );
        Ok(())
    }

    /// Read the quantized format.
    pub fn read_quantized<R: Read>(
        r: &mut R,
        catalog: ActivationCatalog,
        mode: Dequantize,
    ) -> Result<Mlp> {
        let num_layers = read_count(r, "layer count")?;
        let [exponent] = read_array::<_, 1>(r, "exponent")?;
        if u32::from(exponent) > QUANT_BITS {
            return Err(Error::CorruptModel(format!(
                "quantization exponent {exponent} is larger than {QUANT_BITS}"
            )));
        }

        let mut layers = Vec::with_capacity(num_layers.min(MAX_PREALLOC));
        for l in 0..num_layers {
            let (rows, cols) = read_shape(r, l)?;
            let mut data = Vec::with_capacity((rows * cols).min(MAX_PREALLOC));
            for _ in 0..rows * cols {
                let q = i8::from_le_bytes(read_array(r, "weights")?);
                data.push(match mode {
                    Dequantize::Raw => f64::from(q),
                    Dequantize::Scaled => dequantize(q, exponent),
                });
            }
            layers.push(read_layer_tail(r, Matrix::from_vec(rows, cols, data)?, &catalog)?);
        }
        finish(r, layers, catalog)
    }

    /// Load the quantized format from `path`.
    pub fn load_quantized<P: AsRef<Path>>(
        path: P,
        catalog: ActivationCatalog,
        mode: Dequantize,
    ) -> Result<Mlp> {
        let p = path.as_ref();
        let mut r = BufReader::new(File::open(p)?);
        let mlp = Self::read_quantized(&mut r, catalog, mode)?;
        tracing::debug!(
            path = %p.display(),
            layers = mlp.num_layers(),
            ?mode,
            "loaded quantized model"
        );
        Ok(mlp)
    }

    fn activation_index(&self, layer: &Layer) -> Result<u8> {
        self.catalog().index_of(layer.activation_name())
    }
}

fn write_i32<W: Write>(w: &mut W, value: usize, what: &str) -> Result<()> {
    let v = i32::try_from(value)
        .map_err(|_| Error::InvalidData(format!("{what} {value} does not fit in an i32")))?;
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_array<R: Read, const N: usize>(r: &mut R, what: &str) -> Result<[u8; N]> {
    let mut buf = [0_u8; N];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::CorruptModel(format!("unexpected end of data while reading {what}"))
        }
        _ => Error::Io(e),
    })?;
    Ok(buf)
}

/// A positive `i32` count or dimension.
fn read_count<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let v = i32::from_le_bytes(read_array(r, what)?);
    if v <= 0 {
        return Err(Error::CorruptModel(format!("{what} must be > 0, got {v}")));
    }
    // Positive i32 always fits in usize on supported targets.
    Ok(v as usize)
}

fn read_shape<R: Read>(r: &mut R, layer: usize) -> Result<(usize, usize)> {
    let rows = read_count(r, &format!("layer {layer} rows"))?;
    let cols = read_count(r, &format!("layer {layer} cols"))?;
    if rows.checked_mul(cols).is_none() {
        return Err(Error::CorruptModel(format!(
            "layer {layer} shape {rows}x{cols} overflows"
        )));
    }
    Ok((rows, cols))
}

fn read_layer_tail<R: Read>(
    r: &mut R,
    weights: Matrix,
    catalog: &ActivationCatalog,
) -> Result<Layer> {
    let [index] = read_array::<_, 1>(r, "activation index")?;
    let name = catalog.name_of(index).to_owned();
    Layer::from_weights(weights, &name, catalog)
}

fn finish<R: Read>(r: &mut R, layers: Vec<Layer>, catalog: ActivationCatalog) -> Result<Mlp> {
    let mut probe = [0_u8; 1];
    if r.read(&mut probe)? != 0 {
        return Err(Error::CorruptModel(
            "trailing bytes after the last layer".to_owned(),
        ));
    }
    Mlp::from_layers(layers, catalog).map_err(|e| Error::CorruptModel(e.to_string()))
}
