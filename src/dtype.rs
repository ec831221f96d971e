//! Array element types.
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a stored array.
///
/// Serialized with numpy-style names so that manifests are readable by other tools.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Uint8,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl Dtype {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar type that can be stored in a trace.
///
/// Arrays are stored as little-endian bytes in C order.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + 'static {
    /// The stored element type.
    const DTYPE: Dtype;

    /// Encode `src` into `dst`.
    ///
    /// # Panics
    /// If `dst.len() != src.len() * Self::DTYPE.size()`.
    fn write_le(src: &[Self], dst: &mut [u8]);

    /// Decode `src` into `dst`.
    ///
    /// # Panics
    /// If `src.len() != dst.len() * Self::DTYPE.size()`.
    fn read_le(src: &[u8], dst: &mut [Self]);
}

impl Element for u8 {
    const DTYPE: Dtype = Dtype::Uint8;

    #[inline]
    fn write_le(src: &[Self], dst: &mut [u8]) {
        dst.copy_from_slice(src);
    }

    #[inline]
    fn read_le(src: &[u8], dst: &mut [Self]) {
        dst.copy_from_slice(src);
    }
}

macro_rules! impl_element {
    ($type:ty, $dtype:expr, $write:ident, $read:ident) => {
        impl Element for $type {
            const DTYPE: Dtype = $dtype;

            #[inline]
            fn write_le(src: &[Self], dst: &mut [u8]) {
                LittleEndian::$write(src, dst);
            }

            #[inline]
            fn read_le(src: &[u8], dst: &mut [Self]) {
                LittleEndian::$read(src, dst);
            }
        }
    };
}

impl_element!(i32, Dtype::Int32, write_i32_into, read_i32_into);
impl_element!(i64, Dtype::Int64, write_i64_into, read_i64_into);
impl_element!(f32, Dtype::Float32, write_f32_into, read_f32_into);
impl_element!(f64, Dtype::Float64, write_f64_into, read_f64_into);

/// Encode a slice of elements as a new byte vector.
#[must_use]
pub fn to_le_bytes<T: Element>(src: &[T]) -> Vec<u8> {
    let mut bytes = vec![0; src.len() * T::DTYPE.size()];
    T::write_le(src, &mut bytes);
    bytes
}

/// Decode a byte slice into elements.
///
/// Returns `None` if the number of bytes is not a multiple of the element size.
#[must_use]
pub fn from_le_bytes<T: Element>(src: &[u8]) -> Option<Vec<T>> {
    let size = T::DTYPE.size();
    if src.len() % size != 0 {
        return None;
    }
    let mut data = vec![T::default(); src.len() / size];
    T::read_le(src, &mut data);
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Dtype::Uint8, "\"uint8\"")]
    #[case(Dtype::Int64, "\"int64\"")]
    #[case(Dtype::Float32, "\"float32\"")]
    fn dtype_serializes_numpy_name(#[case] dtype: Dtype, #[case] json: &str) {
        assert_eq!(serde_json::to_string(&dtype).unwrap(), json);
        assert_eq!(serde_json::from_str::<Dtype>(json).unwrap(), dtype);
        assert_eq!(format!("\"{}\"", dtype), json);
    }

    #[test]
    fn f64_little_endian() {
        let bytes = to_le_bytes(&[1.0_f64]);
        assert_eq!(bytes, 1.0_f64.to_le_bytes());
    }

    #[test]
    fn i32_decode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-3_i32).to_le_bytes());
        bytes.extend_from_slice(&7_i32.to_le_bytes());
        assert_eq!(from_le_bytes::<i32>(&bytes), Some(vec![-3, 7]));
    }

    #[test]
    fn decode_rejects_partial_element() {
        assert_eq!(from_le_bytes::<f32>(&[0, 0, 0]), None);
    }
}
