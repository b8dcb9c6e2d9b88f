use crate::error::{BackendError, Result};
use crate::plane::{Mask, Plane};

/// Summary statistics over the finite (and, with a mask, selected) pixels.
///
/// With no contributing pixels `npts` is 0 and every other field is NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub npts: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sumsq: f64,
    pub mean: f64,
    pub rms: f64,
    /// Sample standard deviation (`n - 1` denominator).
    pub sigma: f64,
}

impl Statistics {
    fn empty() -> Self {
        Self {
            npts: 0,
            min: f64::NAN,
            max: f64::NAN,
            sum: f64::NAN,
            sumsq: f64::NAN,
            mean: f64::NAN,
            rms: f64::NAN,
            sigma: f64::NAN,
        }
    }

    pub fn compute(plane: &Plane, mask: Option<&Mask>) -> Result<Self> {
        if let Some(mask) = mask {
            if (mask.width(), mask.height()) != (plane.width(), plane.height()) {
                return Err(BackendError::OutOfBounds(format!(
                    "mask plane {}x{} does not cover image plane {}x{}",
                    mask.width(),
                    mask.height(),
                    plane.width(),
                    plane.height()
                )));
            }
        }

        let mut npts = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sumsq = 0.0;

        for (offset, &pixel) in plane.pixels().iter().enumerate() {
            if !pixel.is_finite() || mask.is_some_and(|m| !m.is_selected(offset)) {
                continue;
            }
            let v = f64::from(pixel);
            npts += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            sumsq += v * v;
        }

        if npts == 0 {
            return Ok(Self::empty());
        }

        let n = npts as f64;
        let mean = sum / n;
        let sigma = if npts > 1 {
            ((sumsq - sum * sum / n) / (n - 1.0)).max(0.0).sqrt()
        } else {
            0.0
        };
        Ok(Self {
            npts,
            min,
            max,
            sum,
            sumsq,
            mean,
            rms: (sumsq / n).sqrt(),
            sigma,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_non_finite_pixels() {
        let plane = Plane::new(2, 2, vec![1.0, 3.0, f32::NAN, f32::NEG_INFINITY]).unwrap();
        let stats = Statistics::compute(&plane, None).unwrap();
        assert_eq!(stats.npts, 2);
        assert_eq!((stats.min, stats.max), (1.0, 3.0));
        assert_eq!(stats.sum, 4.0);
        assert_eq!(stats.sumsq, 10.0);
        assert_eq!(stats.mean, 2.0);
        assert!((stats.rms - 5.0f64.sqrt()).abs() < 1e-12);
        assert!((stats.sigma - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn mask_restricts_selection() {
        let plane = Plane::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mask = Mask::from_plane(&Plane::new(2, 2, vec![0.0, 1.0, 0.0, 1.0]).unwrap());
        let stats = Statistics::compute(&plane, Some(&mask)).unwrap();
        assert_eq!(stats.npts, 2);
        assert_eq!((stats.min, stats.max), (2.0, 4.0));
    }

    #[test]
    fn empty_selection_is_nan() {
        let plane = Plane::filled(2, 2, f32::NAN);
        let stats = Statistics::compute(&plane, None).unwrap();
        assert_eq!(stats.npts, 0);
        assert!(stats.mean.is_nan() && stats.min.is_nan());
    }

    #[test]
    fn single_pixel_has_zero_sigma() {
        let plane = Plane::new(1, 1, vec![7.0]).unwrap();
        assert_eq!(Statistics::compute(&plane, None).unwrap().sigma, 0.0);
    }
}
