use planeview_frame::NdArray;

use crate::error::{BackendError, Result};

/// Element type used when a plane is shipped as an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelType {
    #[default]
    Float32,
    Float64,
}

impl PixelType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float32" | "f32" => Some(PixelType::Float32),
            "float64" | "f64" => Some(PixelType::Float64),
            _ => None,
        }
    }
}

/// A 2-D slab of pixels, row-major with x varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        let expected = width * height;
        if pixels.len() != expected {
            return Err(BackendError::PlaneSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Minimum and maximum over finite pixels.
    pub fn finite_range(&self) -> Option<(f32, f32)> {
        self.pixels
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Array of shape `[height, width]`.
    pub fn to_array(&self, pixel_type: PixelType) -> Result<NdArray> {
        let shape = vec![self.height, self.width];
        let array = match pixel_type {
            PixelType::Float32 => NdArray::from_f32(shape, &self.pixels)?,
            PixelType::Float64 => {
                let wide: Vec<f64> = self.pixels.iter().map(|&v| f64::from(v)).collect();
                NdArray::from_f64(shape, &wide)?
            }
        };
        Ok(array)
    }
}

/// Pixel selection derived from a mask plane: finite non-zero values select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    selected: Vec<bool>,
}

impl Mask {
    pub fn from_plane(plane: &Plane) -> Self {
        Self {
            width: plane.width,
            height: plane.height,
            selected: plane
                .pixels
                .iter()
                .map(|&v| v.is_finite() && v != 0.0)
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_selected(&self, offset: usize) -> bool {
        self.selected.get(offset).copied().unwrap_or(false)
    }

    /// Number of selected pixels.
    pub fn count(&self) -> usize {
        self.selected.iter().filter(|&&s| s).count()
    }

    pub fn to_array(&self) -> Result<NdArray> {
        Ok(NdArray::from_bool(
            vec![self.height, self.width],
            &self.selected,
        )?)
    }
}
