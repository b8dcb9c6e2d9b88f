use std::fmt;
use std::time::SystemTime;

use crate::error::{BackendError, Result};
use crate::plane::{Mask, Plane};
use crate::stats::Statistics;

/// `(stokes, spectral)` plane coordinates as requested by callers.
///
/// Signed so out-of-range input (including negative) can be clamped rather
/// than rejected.
pub type PlaneIndex = (i64, i64);

/// Extents of a four-axis image cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubeShape {
    pub x: usize,
    pub y: usize,
    pub stokes: usize,
    pub spectral: usize,
}

impl CubeShape {
    pub fn new(x: usize, y: usize, stokes: usize, spectral: usize) -> Self {
        Self {
            x,
            y,
            stokes,
            spectral,
        }
    }

    /// Pixels in one 2-D plane.
    pub fn plane_len(&self) -> usize {
        self.x * self.y
    }

    /// Pixels in the whole cube, or `None` if the count overflows `u64`.
    pub fn pixel_count(&self) -> Option<u64> {
        [self.x, self.y, self.stokes, self.spectral]
            .into_iter()
            .try_fold(1u64, |count, extent| count.checked_mul(u64::try_from(extent).ok()?))
    }

    /// Clamp each index component into `[0, extent - 1]`.
    pub fn clamp(&self, index: PlaneIndex) -> (usize, usize) {
        (
            clamp_axis(index.0, self.stokes),
            clamp_axis(index.1, self.spectral),
        )
    }
}

impl fmt::Display for CubeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x, self.y, self.stokes, self.spectral)
    }
}

fn clamp_axis(index: i64, extent: usize) -> usize {
    let last = extent.saturating_sub(1);
    usize::try_from(index.max(0)).map_or(last, |i| i.min(last))
}

/// Inclusive bottom-left and top-right corners, ordered `[x, y, stokes, spectral]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub blc: [usize; 4],
    pub trc: [usize; 4],
}

impl Region {
    /// The full 2-D plane at `(stokes, spectral)`.
    pub fn plane(shape: CubeShape, (stokes, spectral): (usize, usize)) -> Self {
        Self {
            blc: [0, 0, stokes, spectral],
            trc: [
                shape.x.saturating_sub(1),
                shape.y.saturating_sub(1),
                stokes,
                spectral,
            ],
        }
    }

    pub fn width(&self) -> usize {
        self.trc[0] + 1 - self.blc[0]
    }

    pub fn height(&self) -> usize {
        self.trc[1] + 1 - self.blc[1]
    }

    /// Check the region is a single plane lying inside `shape`.
    pub fn validate(&self, shape: CubeShape) -> Result<()> {
        let extents = [shape.x, shape.y, shape.stokes, shape.spectral];
        for axis in 0..4 {
            if self.blc[axis] > self.trc[axis] || self.trc[axis] >= extents[axis] {
                return Err(BackendError::OutOfBounds(format!(
                    "region {:?}..={:?} does not fit cube {shape}",
                    self.blc, self.trc
                )));
            }
        }
        if self.blc[2] != self.trc[2] || self.blc[3] != self.trc[3] {
            return Err(BackendError::OutOfBounds(format!(
                "region {:?}..={:?} spans more than one plane",
                self.blc, self.trc
            )));
        }
        Ok(())
    }
}

/// Source of image planes.
///
/// Implementations own an open handle to the underlying resource. The cache
/// serializes access, so methods take `&mut self` and need not be `Sync`.
pub trait ImageBackend: Send {
    fn shape(&self) -> CubeShape;

    /// Extract the 2-D plane covered by `region`.
    fn get_plane(&mut self, region: &Region) -> Result<Plane>;

    /// Write `plane` with its bottom-left corner at `blc`.
    fn put_plane(&mut self, blc: [usize; 4], plane: &Plane) -> Result<()>;

    /// Last modification time of the backing resource.
    fn modified(&self) -> Result<SystemTime>;

    /// Summary statistics over `region`, restricted to `mask` when given.
    fn statistics(&mut self, region: &Region, mask: Option<&Mask>) -> Result<Statistics> {
        let plane = self.get_plane(region)?;
        Statistics::compute(&plane, mask)
    }
}
