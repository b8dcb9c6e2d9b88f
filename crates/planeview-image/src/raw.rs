//! `RawCube`: a flat little-endian `f32` cube file.
//!
//! ```text
//! "PVCUBE01" | x: u32 | y: u32 | stokes: u32 | spectral: u32 | pixels: f32...
//! ```
//!
//! Pixels are stored with x varying fastest, then y, stokes and spectral.
//! Planes are read and written in place by seeking.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::backend::{CubeShape, ImageBackend, Region};
use crate::error::{BackendError, Result};
use crate::plane::Plane;

const MAGIC: &[u8; 8] = b"PVCUBE01";
const HEADER_LEN: u64 = 24;
const PIXEL_SIZE: u64 = 4;

/// File-backed cube.
#[derive(Debug)]
pub struct RawCube {
    file: File,
    path: PathBuf,
    shape: CubeShape,
}

impl RawCube {
    /// Create (or truncate) a zero-filled cube at `path`.
    pub fn create(path: impl AsRef<Path>, shape: CubeShape) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| BackendError::Open {
                path: path.clone(),
                source,
            })?;

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.extend_from_slice(MAGIC);
        for extent in [shape.x, shape.y, shape.stokes, shape.spectral] {
            let extent = u32::try_from(extent).map_err(|_| BackendError::InvalidFormat {
                path: path.clone(),
                reason: format!("extent {extent} exceeds u32"),
            })?;
            header.extend_from_slice(&extent.to_le_bytes());
        }
        let len = file_len(shape).ok_or_else(|| BackendError::InvalidFormat {
            path: path.clone(),
            reason: format!("shape {shape} is too large"),
        })?;
        file.write_all(&header)?;
        file.set_len(len)?;

        debug!(path = %path.display(), %shape, "created cube");
        Ok(Self { file, path, shape })
    }

    /// Open an existing cube for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| BackendError::Open {
                path: path.clone(),
                source,
            })?;

        let invalid = |reason: String| BackendError::InvalidFormat {
            path: path.clone(),
            reason,
        };

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)
            .map_err(|err| invalid(format!("short header: {err}")))?;
        if &header[..8] != MAGIC {
            return Err(invalid("bad magic".to_string()));
        }
        let extent = |i: usize| {
            let start = 8 + i * 4;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&header[start..start + 4]);
            u32::from_le_bytes(raw) as usize
        };
        let shape = CubeShape::new(extent(0), extent(1), extent(2), extent(3));

        let expected =
            file_len(shape).ok_or_else(|| invalid(format!("shape {shape} is too large")))?;
        let actual = file.metadata()?.len();
        if actual != expected {
            return Err(invalid(format!(
                "shape {shape} needs {expected} bytes, file has {actual}"
            )));
        }

        debug!(path = %path.display(), %shape, "opened cube");
        Ok(Self { file, path, shape })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset(&self, x: usize, y: usize, stokes: usize, spectral: usize) -> u64 {
        let shape = self.shape;
        let index = ((spectral * shape.stokes + stokes) * shape.y + y) * shape.x + x;
        HEADER_LEN + index as u64 * PIXEL_SIZE
    }
}

/// Header plus pixel bytes for `shape`, or `None` on overflow.
fn file_len(shape: CubeShape) -> Option<u64> {
    shape
        .pixel_count()?
        .checked_mul(PIXEL_SIZE)?
        .checked_add(HEADER_LEN)
}

impl ImageBackend for RawCube {
    fn shape(&self) -> CubeShape {
        self.shape
    }

    fn get_plane(&mut self, region: &Region) -> Result<Plane> {
        region.validate(self.shape)?;
        let (width, height) = (region.width(), region.height());
        let [x0, y0, stokes, spectral] = region.blc;

        let mut row = vec![0u8; width * PIXEL_SIZE as usize];
        let mut pixels = Vec::with_capacity(width * height);
        for y in y0..y0 + height {
            self.file
                .seek(SeekFrom::Start(self.offset(x0, y, stokes, spectral)))?;
            self.file.read_exact(&mut row)?;
            pixels.extend(row.chunks_exact(4).map(|chunk| {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(chunk);
                f32::from_le_bytes(raw)
            }));
        }
        Plane::new(width, height, pixels)
    }

    fn put_plane(&mut self, blc: [usize; 4], plane: &Plane) -> Result<()> {
        if plane.width() == 0 || plane.height() == 0 {
            return Ok(());
        }
        let region = Region {
            blc,
            trc: [
                blc[0] + plane.width() - 1,
                blc[1] + plane.height() - 1,
                blc[2],
                blc[3],
            ],
        };
        region.validate(self.shape)?;

        let [x0, y0, stokes, spectral] = blc;
        let mut row = Vec::with_capacity(plane.width() * PIXEL_SIZE as usize);
        for (dy, pixels) in plane.pixels().chunks_exact(plane.width()).enumerate() {
            row.clear();
            for value in pixels {
                row.extend_from_slice(&value.to_le_bytes());
            }
            self.file
                .seek(SeekFrom::Start(self.offset(x0, y0 + dy, stokes, spectral)))?;
            self.file.write_all(&row)?;
        }
        self.file.flush()?;
        Ok(())
    }

    fn modified(&self) -> Result<SystemTime> {
        Ok(self.file.metadata()?.modified()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, base: f32) -> Plane {
        let pixels = (0..width * height).map(|i| base + i as f32).collect();
        Plane::new(width, height, pixels).unwrap()
    }

    #[test]
    fn create_write_reopen_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.pv");
        let shape = CubeShape::new(3, 2, 2, 4);

        let mut cube = RawCube::create(&path, shape).unwrap();
        cube.put_plane([0, 0, 1, 2], &ramp(3, 2, 100.0)).unwrap();
        drop(cube);

        let mut cube = RawCube::open(&path).unwrap();
        assert_eq!(cube.shape(), shape);
        let plane = cube.get_plane(&Region::plane(shape, (1, 2))).unwrap();
        assert_eq!(plane, ramp(3, 2, 100.0));

        let untouched = cube.get_plane(&Region::plane(shape, (0, 2))).unwrap();
        assert!(untouched.pixels().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sub_region_read() {
        let dir = tempfile::tempdir().unwrap();
        let shape = CubeShape::new(4, 3, 1, 1);
        let mut cube = RawCube::create(dir.path().join("cube.pv"), shape).unwrap();
        cube.put_plane([0, 0, 0, 0], &ramp(4, 3, 0.0)).unwrap();

        let region = Region {
            blc: [1, 1, 0, 0],
            trc: [2, 2, 0, 0],
        };
        let plane = cube.get_plane(&region).unwrap();
        assert_eq!(plane.pixels(), &[5.0, 6.0, 9.0, 10.0]);
    }

    #[test]
    fn put_outside_cube_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shape = CubeShape::new(2, 2, 1, 1);
        let mut cube = RawCube::create(dir.path().join("cube.pv"), shape).unwrap();
        assert!(matches!(
            cube.put_plane([1, 0, 0, 0], &ramp(2, 2, 0.0)),
            Err(BackendError::OutOfBounds(_))
        ));
    }

    #[test]
    fn open_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.pv");
        std::fs::write(&path, b"NOTACUBE0000000000000000").unwrap();
        assert!(matches!(
            RawCube::open(&path),
            Err(BackendError::InvalidFormat { .. })
        ));

        let truncated = dir.path().join("short.pv");
        RawCube::create(&truncated, CubeShape::new(2, 2, 1, 1)).unwrap();
        let file = OpenOptions::new().write(true).open(&truncated).unwrap();
        file.set_len(HEADER_LEN + 4).unwrap();
        assert!(matches!(
            RawCube::open(&truncated),
            Err(BackendError::InvalidFormat { .. })
        ));

        assert!(matches!(
            RawCube::open(dir.path().join("missing.pv")),
            Err(BackendError::Open { .. })
        ));
    }

    #[test]
    fn open_rejects_overflowing_extents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.pv");
        let mut header = MAGIC.to_vec();
        for _ in 0..4 {
            header.extend_from_slice(&u32::MAX.to_le_bytes());
        }
        std::fs::write(&path, header).unwrap();

        match RawCube::open(&path) {
            Err(BackendError::InvalidFormat { reason, .. }) => {
                assert!(reason.contains("too large"), "unexpected reason: {reason}")
            }
            other => panic!("expected invalid format, got {other:?}"),
        }
    }

    #[test]
    fn create_rejects_overflowing_shape() {
        let dir = tempfile::tempdir().unwrap();
        let extent = u32::MAX as usize;
        let result = RawCube::create(
            dir.path().join("huge.pv"),
            CubeShape::new(extent, extent, extent, extent),
        );
        assert!(matches!(result, Err(BackendError::InvalidFormat { .. })));
    }
}
