use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use planeview_frame::NdArray;
use tracing::{debug, info};

use crate::backend::{CubeShape, ImageBackend, PlaneIndex, Region};
use crate::error::{BackendError, Result};
use crate::plane::{Mask, PixelType, Plane};
use crate::raw::RawCube;
use crate::stats::Statistics;

struct CachedPlane {
    index: (usize, usize),
    source_mtime: SystemTime,
    data: Arc<Plane>,
}

struct ImageState {
    backend: Box<dyn ImageBackend>,
    slot: Option<CachedPlane>,
}

/// Single-slot cache of the most recently extracted plane.
///
/// A cached plane is reused only while the requested (clamped) index is
/// unchanged and the backing resource has not been modified since the
/// plane was read. The modification time is sampled before extraction, so a
/// write racing with a read makes the next request refetch.
pub struct ChannelPlaneCache {
    shape: CubeShape,
    image: Mutex<ImageState>,
    mask: Mutex<Option<Box<dyn ImageBackend>>>,
}

impl ChannelPlaneCache {
    /// Open a [`RawCube`] at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_backend(Box::new(RawCube::open(path)?)))
    }

    pub fn with_backend(backend: Box<dyn ImageBackend>) -> Self {
        Self {
            shape: backend.shape(),
            image: Mutex::new(ImageState {
                backend,
                slot: None,
            }),
            mask: Mutex::new(None),
        }
    }

    fn lock_image(&self) -> MutexGuard<'_, ImageState> {
        self.image.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mask(&self) -> MutexGuard<'_, Option<Box<dyn ImageBackend>>> {
        self.mask.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shape(&self) -> CubeShape {
        self.shape
    }

    /// The plane at `index`, clamped into range.
    pub fn plane(&self, index: PlaneIndex) -> Result<Arc<Plane>> {
        let index = self.shape.clamp(index);
        let mut state = self.lock_image();
        let mtime = state.backend.modified()?;

        if let Some(cached) = &state.slot {
            if cached.index == index && mtime <= cached.source_mtime {
                debug!(?index, "plane cache hit");
                return Ok(Arc::clone(&cached.data));
            }
        }

        let plane = Arc::new(state.backend.get_plane(&Region::plane(self.shape, index))?);
        debug!(?index, "plane extracted");
        state.slot = Some(CachedPlane {
            index,
            source_mtime: mtime,
            data: Arc::clone(&plane),
        });
        Ok(plane)
    }

    /// The plane at `index` as a `[y, x]` array of `pixel_type`.
    pub fn plane_array(&self, index: PlaneIndex, pixel_type: PixelType) -> Result<NdArray> {
        self.plane(index)?.to_array(pixel_type)
    }

    /// Write `plane` over the plane at `index`, dropping any cached copy.
    pub fn put_plane(&self, index: PlaneIndex, plane: &Plane) -> Result<()> {
        let (stokes, spectral) = self.shape.clamp(index);
        let mut state = self.lock_image();
        state.slot = None;
        state.backend.put_plane([0, 0, stokes, spectral], plane)
    }

    /// Open a mask cube at `path`, replacing any current mask.
    pub fn set_mask(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.set_mask_backend(Box::new(RawCube::open(path)?))?;
        info!(path = %path.display(), "mask attached");
        Ok(())
    }

    /// Install a mask backend; its shape must match the image exactly.
    pub fn set_mask_backend(&self, mask: Box<dyn ImageBackend>) -> Result<()> {
        if mask.shape() != self.shape {
            return Err(BackendError::MaskShape {
                image: self.shape,
                mask: mask.shape(),
            });
        }
        *self.lock_mask() = Some(mask);
        Ok(())
    }

    pub fn clear_mask(&self) {
        self.lock_mask().take();
    }

    pub fn has_mask(&self) -> bool {
        self.lock_mask().is_some()
    }

    /// The mask selection for `index`, if a mask is attached.
    pub fn mask(&self, index: PlaneIndex) -> Result<Option<Mask>> {
        let index = self.shape.clamp(index);
        let mut guard = self.lock_mask();
        let Some(mask) = guard.as_mut() else {
            return Ok(None);
        };
        let plane = mask.get_plane(&Region::plane(self.shape, index))?;
        Ok(Some(Mask::from_plane(&plane)))
    }

    /// Statistics for the plane at `index`. Never cached.
    pub fn statistics(&self, index: PlaneIndex) -> Result<Statistics> {
        let mask = self.mask(index)?;
        let region = Region::plane(self.shape, self.shape.clamp(index));
        self.lock_image()
            .backend
            .statistics(&region, mask.as_ref())
    }
}

impl std::fmt::Debug for ChannelPlaneCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPlaneCache")
            .field("shape", &self.shape)
            .field("cached", &self.lock_image().slot.as_ref().map(|s| s.index))
            .field("has_mask", &self.has_mask())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::time::Duration;

    use planeview_frame::DType;
    use tempfile::TempDir;

    use super::*;

    fn cube(dir: &TempDir, name: &str, shape: CubeShape) -> PathBuf {
        let path = dir.path().join(name);
        let mut cube = RawCube::create(&path, shape).unwrap();
        for spectral in 0..shape.spectral {
            for stokes in 0..shape.stokes {
                let value = (stokes * 10 + spectral) as f32;
                cube.put_plane(
                    [0, 0, stokes, spectral],
                    &Plane::filled(shape.x, shape.y, value),
                )
                .unwrap();
            }
        }
        path
    }

    fn touch_forward(path: &Path, secs: u64) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn same_index_reuses_cached_plane() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChannelPlaneCache::open(cube(&dir, "img.pv", CubeShape::new(3, 2, 2, 3))).unwrap();

        let first = cache.plane((1, 2)).unwrap();
        let second = cache.plane((1, 2)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.get(0, 0), Some(12.0));

        let other = cache.plane((0, 1)).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(other.get(0, 0), Some(1.0));
    }

    #[test]
    fn external_modification_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let shape = CubeShape::new(3, 2, 1, 2);
        let path = cube(&dir, "img.pv", shape);
        let cache = ChannelPlaneCache::open(&path).unwrap();

        let before = cache.plane((0, 1)).unwrap();
        assert_eq!(before.get(0, 0), Some(1.0));

        let mut writer = RawCube::open(&path).unwrap();
        writer
            .put_plane([0, 0, 0, 1], &Plane::filled(3, 2, 42.0))
            .unwrap();
        touch_forward(&path, 60);

        let after = cache.plane((0, 1)).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.get(2, 1), Some(42.0));
        assert!(Arc::ptr_eq(&after, &cache.plane((0, 1)).unwrap()));
    }

    #[test]
    fn out_of_range_index_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChannelPlaneCache::open(cube(&dir, "img.pv", CubeShape::new(2, 2, 2, 3))).unwrap();

        assert_eq!(cache.plane((-5, -1)).unwrap().get(0, 0), Some(0.0));
        assert_eq!(cache.plane((9, 9)).unwrap().get(0, 0), Some(12.0));
        assert!(Arc::ptr_eq(
            &cache.plane((1, 2)).unwrap(),
            &cache.plane((100, 100)).unwrap()
        ));
    }

    #[test]
    fn put_plane_drops_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChannelPlaneCache::open(cube(&dir, "img.pv", CubeShape::new(2, 2, 1, 1))).unwrap();
        assert_eq!(cache.plane((0, 0)).unwrap().get(1, 1), Some(0.0));

        cache.put_plane((0, 0), &Plane::filled(2, 2, 5.0)).unwrap();
        assert_eq!(cache.plane((0, 0)).unwrap().get(1, 1), Some(5.0));
    }

    #[test]
    fn plane_array_has_requested_type() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChannelPlaneCache::open(cube(&dir, "img.pv", CubeShape::new(4, 3, 1, 1))).unwrap();
        let array = cache.plane_array((0, 0), PixelType::Float32).unwrap();
        assert_eq!(array.dtype(), DType::F32);
        assert_eq!(array.shape(), &[3, 4]);
    }

    #[test]
    fn mask_shape_mismatch_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChannelPlaneCache::open(cube(&dir, "img.pv", CubeShape::new(3, 2, 1, 1))).unwrap();
        let mask_path = cube(&dir, "mask.pv", CubeShape::new(2, 3, 1, 1));

        let err = cache.set_mask(&mask_path).unwrap_err();
        assert!(matches!(err, BackendError::MaskShape { .. }));
        assert!(!cache.has_mask());
    }

    #[test]
    fn statistics_respect_mask_and_mask_swaps_keep_cache() {
        let dir = tempfile::tempdir().unwrap();
        let shape = CubeShape::new(2, 2, 1, 1);
        let image = dir.path().join("img.pv");
        RawCube::create(&image, shape)
            .unwrap()
            .put_plane([0, 0, 0, 0], &Plane::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap())
            .unwrap();
        let mask_path = dir.path().join("mask.pv");
        RawCube::create(&mask_path, shape)
            .unwrap()
            .put_plane([0, 0, 0, 0], &Plane::new(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap())
            .unwrap();

        let cache = ChannelPlaneCache::open(&image).unwrap();
        let cached = cache.plane((0, 0)).unwrap();
        assert_eq!(cache.statistics((0, 0)).unwrap().npts, 4);

        cache.set_mask(&mask_path).unwrap();
        assert!(cache.has_mask());
        assert_eq!(cache.mask((0, 0)).unwrap().map(|m| m.count()), Some(2));
        let stats = cache.statistics((0, 0)).unwrap();
        assert_eq!(stats.npts, 2);
        assert_eq!((stats.min, stats.max), (1.0, 4.0));
        assert!(Arc::ptr_eq(&cached, &cache.plane((0, 0)).unwrap()));

        cache.clear_mask();
        assert!(cache.mask((0, 0)).unwrap().is_none());
        assert_eq!(cache.statistics((0, 0)).unwrap().npts, 4);
    }
}
