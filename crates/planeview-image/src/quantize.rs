//! Maps floating-point planes to fixed-width display levels.

use std::fmt;

use planeview_frame::NdArray;
use tracing::warn;

use crate::error::{QuantizeError, Result};
use crate::plane::Plane;

/// Default base for the `log` and `power` transfers.
pub const DEFAULT_EXPONENT_BASE: f64 = 1000.0;

/// Monotonic transfer `f: [0, 1] → [0, 1]` applied to window-normalized pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Transfer {
    #[default]
    Linear,
    /// `ln(a·u + 1) / ln(a + 1)`.
    Log { a: f64 },
    Sqrt,
    Square,
    /// `u^γ`.
    Gamma { gamma: f64 },
    /// `(a^u - 1) / (a - 1)`.
    Power { a: f64 },
}

impl Transfer {
    /// Parse a transfer by name, with optional numeric arguments.
    ///
    /// `log` and `power` take the base `a` (default 1000); `gamma` takes γ
    /// (default 1).
    pub fn from_name(name: &str, args: &[f64]) -> std::result::Result<Self, QuantizeError> {
        let arg = |default: f64| args.first().copied().unwrap_or(default);
        let transfer = match name.to_ascii_lowercase().as_str() {
            "linear" => Transfer::Linear,
            "log" => Transfer::Log {
                a: arg(DEFAULT_EXPONENT_BASE),
            },
            "sqrt" => Transfer::Sqrt,
            "square" => Transfer::Square,
            "gamma" => Transfer::Gamma { gamma: arg(1.0) },
            "power" => Transfer::Power {
                a: arg(DEFAULT_EXPONENT_BASE),
            },
            _ => return Err(QuantizeError::UnknownTransfer(name.to_string())),
        };
        transfer.validate()?;
        Ok(transfer)
    }

    /// Like [`Transfer::from_name`], but logs and falls back to
    /// [`Transfer::Linear`] instead of failing.
    pub fn from_name_lenient(name: &str, args: &[f64]) -> Self {
        Self::from_name(name, args).unwrap_or_else(|err| {
            warn!(transfer = name, error = %err, "falling back to linear transfer");
            Transfer::Linear
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transfer::Linear => "linear",
            Transfer::Log { .. } => "log",
            Transfer::Sqrt => "sqrt",
            Transfer::Square => "square",
            Transfer::Gamma { .. } => "gamma",
            Transfer::Power { .. } => "power",
        }
    }

    fn validate(&self) -> std::result::Result<(), QuantizeError> {
        let invalid = |reason: &str| QuantizeError::InvalidArgument {
            transfer: self.name(),
            reason: reason.to_string(),
        };
        let positive = |v: f64| v.is_finite() && v > 0.0;
        match *self {
            Transfer::Log { a } if !positive(a) => Err(invalid("base must be positive")),
            Transfer::Power { a } if !positive(a) || a == 1.0 => {
                Err(invalid("base must be positive and not 1"))
            }
            Transfer::Gamma { gamma } if !positive(gamma) => Err(invalid("gamma must be positive")),
            _ => Ok(()),
        }
    }

    /// Apply the transfer to `u ∈ [0, 1]`.
    pub fn apply(&self, u: f64) -> f64 {
        match *self {
            Transfer::Linear => u,
            Transfer::Log { a } => (a * u + 1.0).ln() / (a + 1.0).ln(),
            Transfer::Sqrt => u.sqrt(),
            Transfer::Square => u * u,
            Transfer::Gamma { gamma } => u.powf(gamma),
            Transfer::Power { a } => (a.powf(u) - 1.0) / (a - 1.0),
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output level width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelWidth {
    #[default]
    W8,
    W16,
    W32,
}

impl PixelWidth {
    pub fn from_bits(bits: u32) -> std::result::Result<Self, QuantizeError> {
        match bits {
            8 => Ok(PixelWidth::W8),
            16 => Ok(PixelWidth::W16),
            32 => Ok(PixelWidth::W32),
            other => Err(QuantizeError::UnsupportedWidth(other)),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            PixelWidth::W8 => 8,
            PixelWidth::W16 => 16,
            PixelWidth::W32 => 32,
        }
    }

    /// Highest level, `2^bits - 1`.
    pub fn max_level(self) -> u32 {
        match self {
            PixelWidth::W8 => u32::from(u8::MAX),
            PixelWidth::W16 => u32::from(u16::MAX),
            PixelWidth::W32 => u32::MAX,
        }
    }
}

/// Quantized plane, row-major like its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantized {
    width: usize,
    height: usize,
    pixel_width: PixelWidth,
    levels: Vec<u32>,
}

impl Quantized {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_width(&self) -> PixelWidth {
        self.pixel_width
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    /// `[height, width]` array of the narrowest matching unsigned dtype.
    pub fn to_array(&self) -> Result<NdArray> {
        let shape = vec![self.height, self.width];
        // Levels never exceed `max_level`, so the narrowing casts are lossless.
        let array = match self.pixel_width {
            PixelWidth::W8 => {
                let narrow: Vec<u8> = self.levels.iter().map(|&l| l as u8).collect();
                NdArray::from_u8(shape, &narrow)?
            }
            PixelWidth::W16 => {
                let narrow: Vec<u16> = self.levels.iter().map(|&l| l as u16).collect();
                NdArray::from_u16(shape, &narrow)?
            }
            PixelWidth::W32 => NdArray::from_u32(shape, &self.levels)?,
        };
        Ok(array)
    }
}

/// Quantize `plane` to `pixel_width` levels.
///
/// `bounds` is `(low, high)`; a non-finite bound falls back to the plane's
/// finite minimum or maximum. For 8-bit output with at least one finite
/// bound, pixels outside the window clip to 0 or 255 and the in-range pixels
/// are stretched over the full range. Otherwise the plane's own range is
/// stretched. NaN pixels and degenerate ranges map to 0.
pub fn quantize(
    plane: &Plane,
    pixel_width: PixelWidth,
    bounds: (f64, f64),
    transfer: Transfer,
) -> Quantized {
    let finite_range = plane
        .finite_range()
        .map(|(lo, hi)| (f64::from(lo), f64::from(hi)));
    let clip = pixel_width == PixelWidth::W8 && (bounds.0.is_finite() || bounds.1.is_finite());

    let levels = match finite_range {
        None => vec![0; plane.pixels().len()],
        Some((min, max)) if clip => {
            let lo = if bounds.0.is_finite() { bounds.0 } else { min };
            let hi = if bounds.1.is_finite() { bounds.1 } else { max };
            clipped_levels(plane, lo, hi, transfer, pixel_width.max_level())
        }
        Some((min, max)) => stretched_levels(plane, min, max, transfer, pixel_width.max_level()),
    };

    Quantized {
        width: plane.width(),
        height: plane.height(),
        pixel_width,
        levels,
    }
}

fn normalize(value: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn to_level(t: f64, t_min: f64, t_max: f64, max_level: u32) -> u32 {
    if t_max <= t_min || !t.is_finite() {
        return 0;
    }
    let scaled = ((t - t_min) / (t_max - t_min) * f64::from(max_level)).round();
    scaled.clamp(0.0, f64::from(max_level)) as u32
}

fn stretched_levels(plane: &Plane, min: f64, max: f64, transfer: Transfer, max_level: u32) -> Vec<u32> {
    let t_min = transfer.apply(0.0);
    let t_max = transfer.apply(1.0);
    plane
        .pixels()
        .iter()
        .map(|&pixel| {
            if !pixel.is_finite() {
                return 0;
            }
            let t = transfer.apply(normalize(f64::from(pixel), min, max));
            to_level(t, t_min, t_max, max_level)
        })
        .collect()
}

fn clipped_levels(plane: &Plane, lo: f64, hi: f64, transfer: Transfer, max_level: u32) -> Vec<u32> {
    let transformed: Vec<Option<f64>> = plane
        .pixels()
        .iter()
        .map(|&pixel| {
            let v = f64::from(pixel);
            (lo..=hi).contains(&v).then(|| transfer.apply(normalize(v, lo, hi)))
        })
        .collect();

    let (t_min, t_max) = transformed
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &t| (a.min(t), b.max(t)));

    plane
        .pixels()
        .iter()
        .zip(&transformed)
        .map(|(&pixel, t)| match t {
            Some(t) => to_level(*t, t_min, t_max, max_level),
            None if f64::from(pixel) > hi => max_level,
            None => 0,
        })
        .collect()
}
