//! Feature vectors and their stored byte encodings.

use std::io;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{ImgsimError, Result};
use crate::util::varint;

/// Largest dimension count a stored sparse feature may declare.
pub const MAX_SPARSE_DIMENSIONS: usize = 1 << 20;

/// A global feature of an image: one numeric histogram.
///
/// Short vectors keep their quantized `i16` values so that encoding and
/// decoding never round through floating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureVector {
    Double(Vec<f64>),
    Short(Vec<i16>),
}

impl FeatureVector {
    /// Number of dimensions.
    pub fn len(&self) -> usize {
        match self {
            FeatureVector::Double(values) => values.len(),
            FeatureVector::Short(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of dimension `index` as f64, `None` past the end.
    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            FeatureVector::Double(values) => values.get(index).copied(),
            FeatureVector::Short(values) => values.get(index).map(|&v| v as f64),
        }
    }

    /// Iterate the dimensions as f64.
    pub fn iter(&self) -> FeatureIter<'_> {
        match self {
            FeatureVector::Double(values) => FeatureIter::Double(values.iter()),
            FeatureVector::Short(values) => FeatureIter::Short(values.iter()),
        }
    }

    /// The backing slice when the vector already holds f64 values.
    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match self {
            FeatureVector::Double(values) => Some(values),
            FeatureVector::Short(_) => None,
        }
    }

    /// Copy of the dimensions as f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    /// Number of dimensions that are not exactly zero.
    pub fn non_zero_count(&self) -> usize {
        self.iter().filter(|v| *v != 0.0).count()
    }
}

/// Iterator over the dimensions of a [`FeatureVector`] as f64.
pub enum FeatureIter<'a> {
    Double(std::slice::Iter<'a, f64>),
    Short(std::slice::Iter<'a, i16>),
}

impl Iterator for FeatureIter<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        match self {
            FeatureIter::Double(iter) => iter.next().copied(),
            FeatureIter::Short(iter) => iter.next().map(|&v| v as f64),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            FeatureIter::Double(iter) => iter.size_hint(),
            FeatureIter::Short(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for FeatureIter<'_> {}

/// Stored layout of a feature vector.
///
/// Dense layouts are the raw little-endian values. Sparse layouts are a
/// varint dimension count, a varint count of non-zero entries and then one
/// (varint index delta, little-endian value) pair per non-zero entry, in
/// increasing index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    DenseDouble,
    DenseShort,
    SparseDouble,
    SparseShort,
}

impl VectorKind {
    /// Whether vectors of this kind hold `i16` values.
    pub fn is_short(&self) -> bool {
        matches!(self, VectorKind::DenseShort | VectorKind::SparseShort)
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, VectorKind::SparseDouble | VectorKind::SparseShort)
    }

    pub fn name(&self) -> &'static str {
        match self {
            VectorKind::DenseDouble => "dense_double",
            VectorKind::DenseShort => "dense_short",
            VectorKind::SparseDouble => "sparse_double",
            VectorKind::SparseShort => "sparse_short",
        }
    }

    /// An empty vector of the matching element type, usable as decode scratch.
    pub fn empty_vector(&self) -> FeatureVector {
        if self.is_short() {
            FeatureVector::Short(Vec::new())
        } else {
            FeatureVector::Double(Vec::new())
        }
    }

    /// Serialize a vector in this layout.
    pub fn encode(&self, vector: &FeatureVector) -> Result<Vec<u8>> {
        match (self, vector) {
            (VectorKind::DenseDouble, FeatureVector::Double(values)) => {
                let mut out = Vec::with_capacity(values.len() * 8);
                for &v in values {
                    out.write_f64::<LittleEndian>(v)?;
                }
                Ok(out)
            }
            (VectorKind::DenseShort, FeatureVector::Short(values)) => {
                let mut out = Vec::with_capacity(values.len() * 2);
                for &v in values {
                    out.write_i16::<LittleEndian>(v)?;
                }
                Ok(out)
            }
            (VectorKind::SparseDouble, FeatureVector::Double(values)) => {
                encode_sparse(values, |out, v| out.write_f64::<LittleEndian>(*v))
            }
            (VectorKind::SparseShort, FeatureVector::Short(values)) => {
                encode_sparse(values, |out, v| out.write_i16::<LittleEndian>(*v))
            }
            _ => Err(ImgsimError::serialization(format!(
                "cannot encode a {} vector as {}",
                element_name(vector),
                self.name()
            ))),
        }
    }

    /// Deserialize a vector stored in this layout.
    pub fn decode(&self, bytes: &[u8]) -> Result<FeatureVector> {
        let mut vector = self.empty_vector();
        self.decode_into(bytes, &mut vector)?;
        Ok(vector)
    }

    /// Deserialize into `out`, reusing its allocation when the element type
    /// already matches.
    ///
    /// On error `out` holds unspecified contents.
    pub fn decode_into(&self, bytes: &[u8], out: &mut FeatureVector) -> Result<()> {
        if self.is_short() != matches!(out, FeatureVector::Short(_)) {
            *out = self.empty_vector();
        }

        match (self, out) {
            (VectorKind::DenseDouble, FeatureVector::Double(values)) => {
                if bytes.len() % 8 != 0 {
                    return Err(ImgsimError::serialization(format!(
                        "dense double feature of {} bytes is not a multiple of 8",
                        bytes.len()
                    )));
                }
                values.clear();
                values.extend(bytes.chunks_exact(8).map(LittleEndian::read_f64));
                Ok(())
            }
            (VectorKind::DenseShort, FeatureVector::Short(values)) => {
                if bytes.len() % 2 != 0 {
                    return Err(ImgsimError::serialization(format!(
                        "dense short feature of {} bytes is not a multiple of 2",
                        bytes.len()
                    )));
                }
                values.clear();
                values.extend(bytes.chunks_exact(2).map(LittleEndian::read_i16));
                Ok(())
            }
            (VectorKind::SparseDouble, FeatureVector::Double(values)) => {
                decode_sparse(bytes, values, |r| r.read_f64::<LittleEndian>())
            }
            (VectorKind::SparseShort, FeatureVector::Short(values)) => {
                decode_sparse(bytes, values, |r| r.read_i16::<LittleEndian>())
            }
            _ => Err(ImgsimError::other("decode scratch has the wrong element type")),
        }
    }
}

fn element_name(vector: &FeatureVector) -> &'static str {
    match vector {
        FeatureVector::Double(_) => "double",
        FeatureVector::Short(_) => "short",
    }
}

fn encode_sparse<T, F>(values: &[T], mut write_value: F) -> Result<Vec<u8>>
where
    T: Copy + Default + PartialEq,
    F: FnMut(&mut Vec<u8>, &T) -> io::Result<()>,
{
    let zero = T::default();
    let dimensions = u32::try_from(values.len())
        .map_err(|_| ImgsimError::serialization("feature has too many dimensions"))?;
    let non_zero = values.iter().filter(|v| **v != zero).count() as u32;

    let mut out = Vec::new();
    varint::encode_u32_into(&mut out, dimensions);
    varint::encode_u32_into(&mut out, non_zero);

    let mut previous = 0u32;
    for (index, value) in values.iter().enumerate() {
        if *value == zero {
            continue;
        }
        let index = index as u32;
        varint::encode_u32_into(&mut out, index - previous);
        write_value(&mut out, value)?;
        previous = index;
    }
    Ok(out)
}

fn decode_sparse<T, F>(bytes: &[u8], values: &mut Vec<T>, mut read_value: F) -> Result<()>
where
    T: Copy + Default,
    F: FnMut(&mut &[u8]) -> io::Result<T>,
{
    let mut reader = bytes;
    let dimensions = varint::read_u32(&mut reader).map_err(truncated)? as usize;
    let non_zero = varint::read_u32(&mut reader).map_err(truncated)? as usize;
    if dimensions > MAX_SPARSE_DIMENSIONS {
        return Err(ImgsimError::serialization(format!(
            "sparse feature claims {dimensions} dimensions, at most {MAX_SPARSE_DIMENSIONS} allowed"
        )));
    }
    if non_zero > dimensions {
        return Err(ImgsimError::serialization(format!(
            "sparse feature claims {non_zero} entries in {dimensions} dimensions"
        )));
    }
    // Each entry is at least a one byte delta and a value.
    let entry_size = 1 + std::mem::size_of::<T>();
    if reader.len() < non_zero * entry_size {
        return Err(ImgsimError::serialization(format!(
            "sparse feature of {} bytes cannot hold {non_zero} entries",
            bytes.len()
        )));
    }

    values.clear();
    values.resize(dimensions, T::default());

    let mut index = 0usize;
    for entry in 0..non_zero {
        let delta = varint::read_u32(&mut reader).map_err(truncated)? as usize;
        if entry > 0 && delta == 0 {
            return Err(ImgsimError::serialization(
                "sparse feature indices are not strictly increasing",
            ));
        }
        index += delta;
        if index >= dimensions {
            return Err(ImgsimError::serialization(format!(
                "sparse feature index {index} out of range for {dimensions} dimensions"
            )));
        }
        values[index] = read_value(&mut reader).map_err(|e| truncated(e.into()))?;
    }

    if !reader.is_empty() {
        return Err(ImgsimError::serialization(format!(
            "{} trailing bytes after sparse feature",
            reader.len()
        )));
    }
    Ok(())
}

fn truncated(error: ImgsimError) -> ImgsimError {
    match error {
        ImgsimError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            ImgsimError::serialization("truncated sparse feature")
        }
        other => other,
    }
}
