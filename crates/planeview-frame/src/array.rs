use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Element type of an [`NdArray`]. Wire names follow numpy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    /// Wire name (`"float32"`, `"uint8"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Parse a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => DType::Bool,
            "uint8" => DType::U8,
            "uint16" => DType::U16,
            "uint32" => DType::U32,
            "int8" => DType::I8,
            "int16" => DType::I16,
            "int32" => DType::I32,
            "int64" => DType::I64,
            "float32" => DType::F32,
            "float64" => DType::F64,
            _ => return None,
        })
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DType::Bool | DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dense numeric array: element type, shape, and little-endian C-order bytes.
#[derive(Clone, PartialEq)]
pub struct NdArray {
    dtype: DType,
    shape: Vec<usize>,
    data: Bytes,
}

impl NdArray {
    /// Build an array from raw little-endian bytes, checking the byte count
    /// against `shape`.
    pub fn new(dtype: DType, shape: Vec<usize>, data: Bytes) -> Result<Self> {
        let expected = element_count(&shape)?
            .checked_mul(dtype.size())
            .ok_or_else(|| FrameError::InvalidArray(format!("shape {shape:?} overflows")))?;
        if data.len() != expected {
            return Err(FrameError::InvalidArray(format!(
                "{dtype} array of shape {shape:?} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * 4);
        values.iter().for_each(|v| buf.put_f32_le(*v));
        Self::new(DType::F32, shape, buf.freeze())
    }

    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * 8);
        values.iter().for_each(|v| buf.put_f64_le(*v));
        Self::new(DType::F64, shape, buf.freeze())
    }

    pub fn from_u8(shape: Vec<usize>, values: &[u8]) -> Result<Self> {
        Self::new(DType::U8, shape, Bytes::copy_from_slice(values))
    }

    pub fn from_u16(shape: Vec<usize>, values: &[u16]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * 2);
        values.iter().for_each(|v| buf.put_u16_le(*v));
        Self::new(DType::U16, shape, buf.freeze())
    }

    pub fn from_u32(shape: Vec<usize>, values: &[u32]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * 4);
        values.iter().for_each(|v| buf.put_u32_le(*v));
        Self::new(DType::U32, shape, buf.freeze())
    }

    pub fn from_bool(shape: Vec<usize>, values: &[bool]) -> Result<Self> {
        let bytes: Vec<u8> = values.iter().map(|v| u8::from(*v)).collect();
        Self::new(DType::Bool, shape, Bytes::from(bytes))
    }

    /// Build an array from decoded JSON numbers, converting each to `dtype`.
    pub(crate) fn from_numbers(dtype: DType, shape: Vec<usize>, values: &[f64]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * dtype.size());
        for &v in values {
            match dtype {
                DType::Bool => buf.put_u8(u8::from(v != 0.0)),
                DType::U8 => buf.put_u8(v as u8),
                DType::U16 => buf.put_u16_le(v as u16),
                DType::U32 => buf.put_u32_le(v as u32),
                DType::I8 => buf.put_i8(v as i8),
                DType::I16 => buf.put_i16_le(v as i16),
                DType::I32 => buf.put_i32_le(v as i32),
                DType::I64 => buf.put_i64_le(v as i64),
                DType::F32 => buf.put_f32_le(v as f32),
                DType::F64 => buf.put_f64_le(v),
            }
        }
        Self::new(dtype, shape, buf.freeze())
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Raw little-endian element bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every element widened to `f64`, in storage order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let mut buf = self.data.clone();
        let mut out = Vec::with_capacity(self.len());
        while buf.has_remaining() {
            let v = match self.dtype {
                DType::Bool => f64::from(u8::from(buf.get_u8() != 0)),
                DType::U8 => f64::from(buf.get_u8()),
                DType::U16 => f64::from(buf.get_u16_le()),
                DType::U32 => f64::from(buf.get_u32_le()),
                DType::I8 => f64::from(buf.get_i8()),
                DType::I16 => f64::from(buf.get_i16_le()),
                DType::I32 => f64::from(buf.get_i32_le()),
                DType::I64 => buf.get_i64_le() as f64,
                DType::F32 => f64::from(buf.get_f32_le()),
                DType::F64 => buf.get_f64_le(),
            };
            out.push(v);
        }
        out
    }

    /// Elements as `f32`; `None` unless the dtype is `float32`.
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        if self.dtype != DType::F32 {
            return None;
        }
        let mut buf = self.data.clone();
        let mut out = Vec::with_capacity(self.len());
        while buf.has_remaining() {
            out.push(buf.get_f32_le());
        }
        Some(out)
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Number of elements `shape` describes; an empty shape is a scalar.
pub(crate) fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |count, &dim| count.checked_mul(dim))
        .ok_or_else(|| FrameError::InvalidArray(format!("shape {shape:?} overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_names_roundtrip() {
        for dtype in [
            DType::Bool,
            DType::U8,
            DType::U16,
            DType::U32,
            DType::I8,
            DType::I16,
            DType::I32,
            DType::I64,
            DType::F32,
            DType::F64,
        ] {
            assert_eq!(DType::from_name(dtype.name()), Some(dtype));
        }
        assert_eq!(DType::from_name("complex64"), None);
    }

    #[test]
    fn rejects_byte_count_mismatch() {
        let err = NdArray::new(DType::F32, vec![2, 2], Bytes::from(vec![0u8; 12])).unwrap_err();
        assert!(matches!(err, FrameError::InvalidArray(_)));
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let shape = vec![usize::MAX / 2, 3];
        assert!(matches!(element_count(&shape), Err(FrameError::InvalidArray(_))));
        let err = NdArray::new(DType::U8, shape, Bytes::new()).unwrap_err();
        assert!(matches!(err, FrameError::InvalidArray(_)));
        assert_eq!(element_count(&[2, 0, 3]).unwrap(), 0);
    }

    #[test]
    fn scalar_shape_holds_one_element() {
        let array = NdArray::from_f64(vec![], &[2.5]).unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array.to_f64_vec(), vec![2.5]);
    }

    #[test]
    fn f32_values_are_little_endian() {
        let array = NdArray::from_f32(vec![2], &[1.0, -2.0]).unwrap();
        assert_eq!(&array.data()[0..4], &1.0f32.to_le_bytes());
        assert_eq!(array.to_f32_vec(), Some(vec![1.0, -2.0]));
        assert_eq!(array.to_f64_vec(), vec![1.0, -2.0]);
    }

    #[test]
    fn numbers_convert_to_integer_dtype() {
        let array = NdArray::from_numbers(DType::U16, vec![3], &[0.0, 7.0, 65535.0]).unwrap();
        assert_eq!(array.to_f64_vec(), vec![0.0, 7.0, 65535.0]);
        assert_eq!(array.to_f32_vec(), None);
    }
}
