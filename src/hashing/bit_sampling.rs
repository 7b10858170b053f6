//! BitSampling: locality sensitive hashing with precomputed random hyperplanes.
//!
//! The hyperplanes are grouped into `bundles` of `bits` planes each. A vector
//! yields one [`HashToken`] per bundle whose bit `i` records on which side of
//! plane `i` the vector lies. The table is generated once, persisted, and
//! must be the very same at index time and at query time.
//!
//! # Resource layout
//!
//! All integers little endian:
//!
//! ```text
//! "BSLH" | u32 version | u32 dimensions | u32 bits | u32 bundles
//!        | f64 × (bundles · bits · dimensions) | u32 crc32(all previous bytes)
//! ```

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::{ImgsimError, Result};
use crate::feature::descriptor::FeatureDescriptor;
use crate::feature::vector::FeatureVector;
use crate::hashing::HashingScheme;
use crate::hashing::token::{HashToken, tokens_to_string};
use crate::util::simd;

const MAGIC: &[u8; 4] = b"BSLH";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 * 4;

/// Largest table accepted from a resource file (in weights).
const MAX_WEIGHTS: usize = 1 << 28;

/// A loaded, immutable BitSampling hyperplane table.
#[derive(Debug, Clone, PartialEq)]
pub struct BitSampling {
    dimensions: usize,
    bits: usize,
    bundles: usize,
    planes: Vec<f64>,
}

impl BitSampling {
    /// Build a table from explicit weights laid out bundle-major, then plane,
    /// then dimension.
    pub fn new(dimensions: usize, bits: usize, bundles: usize, planes: Vec<f64>) -> Result<Self> {
        validate_shape(dimensions, bits, bundles)?;
        if planes.len() != dimensions * bits * bundles {
            return Err(ImgsimError::resource(format!(
                "expected {} hyperplane weights, got {}",
                dimensions * bits * bundles,
                planes.len()
            )));
        }
        if planes.iter().any(|w| !w.is_finite()) {
            return Err(ImgsimError::resource("hyperplane weights must be finite"));
        }

        Ok(Self {
            dimensions,
            bits,
            bundles,
            planes,
        })
    }

    /// Draw a reproducible table with weights uniform in [-1, 1].
    pub fn generate_random(dimensions: usize, bits: usize, bundles: usize, seed: u64) -> Result<Self> {
        validate_shape(dimensions, bits, bundles)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let planes = (0..dimensions * bits * bundles)
            .map(|_| rng.random_range(-1.0..=1.0))
            .collect();
        Self::new(dimensions, bits, bundles, planes)
    }

    /// Load a persisted table from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ImgsimError::resource(format!("cannot open BitSampling table {}: {e}", path.display()))
        })?;
        let table = Self::read_from(BufReader::new(file))?;
        info!(
            path = %path.display(),
            dimensions = table.dimensions,
            bits = table.bits,
            bundles = table.bundles,
            "loaded BitSampling table"
        );
        Ok(table)
    }

    /// Read a persisted table. Any deviation from the layout is a resource error.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| ImgsimError::resource(format!("cannot read BitSampling table: {e}")))?;

        if bytes.len() < HEADER_LEN + 4 || &bytes[..4] != MAGIC {
            return Err(ImgsimError::resource("not a BitSampling table"));
        }

        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let stored_crc = LittleEndian::read_u32(trailer);
        if crc32fast::hash(body) != stored_crc {
            return Err(ImgsimError::resource("BitSampling table checksum mismatch"));
        }

        let mut header = &body[4..HEADER_LEN];
        let version = header.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(ImgsimError::resource(format!(
                "unsupported BitSampling table version {version}"
            )));
        }
        let dimensions = header.read_u32::<LittleEndian>()? as usize;
        let bits = header.read_u32::<LittleEndian>()? as usize;
        let bundles = header.read_u32::<LittleEndian>()? as usize;
        validate_shape(dimensions, bits, bundles)?;

        let weights = dimensions
            .checked_mul(bits)
            .and_then(|n| n.checked_mul(bundles))
            .filter(|&n| n <= MAX_WEIGHTS)
            .ok_or_else(|| ImgsimError::resource("BitSampling table is too large"))?;
        let mut payload = &body[HEADER_LEN..];
        if payload.len() != weights * 8 {
            return Err(ImgsimError::resource(format!(
                "BitSampling table holds {} weight bytes, header announces {}",
                payload.len(),
                weights * 8
            )));
        }

        let mut planes = Vec::with_capacity(weights);
        for _ in 0..weights {
            planes.push(payload.read_f64::<LittleEndian>()?);
        }
        Self::new(dimensions, bits, bundles, planes)
    }

    /// Persist the table.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut body = Vec::with_capacity(HEADER_LEN + self.planes.len() * 8);
        body.extend_from_slice(MAGIC);
        body.write_u32::<LittleEndian>(VERSION)?;
        body.write_u32::<LittleEndian>(self.dimensions as u32)?;
        body.write_u32::<LittleEndian>(self.bits as u32)?;
        body.write_u32::<LittleEndian>(self.bundles as u32)?;
        for &weight in &self.planes {
            body.write_f64::<LittleEndian>(weight)?;
        }
        let crc = crc32fast::hash(&body);

        writer.write_all(&body)?;
        writer.write_u32::<LittleEndian>(crc)?;
        writer.flush()?;
        Ok(())
    }

    /// Persist the table to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Number of tokens produced per vector.
    pub fn bundles(&self) -> usize {
        self.bundles
    }

    /// Hash a vector into exactly [`bundles`](Self::bundles) tokens.
    ///
    /// Vectors shorter than the table are treated as zero padded; longer
    /// vectors mean the table does not belong to this feature.
    pub fn generate(&self, vector: &FeatureVector) -> Result<Vec<HashToken>> {
        if vector.len() > self.dimensions {
            return Err(ImgsimError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        let values: Cow<'_, [f64]> = match vector.as_f64_slice() {
            Some(values) => Cow::Borrowed(values),
            None => Cow::Owned(vector.to_f64_vec()),
        };

        let tokens = self
            .planes
            .chunks_exact(self.bits * self.dimensions)
            .map(|bundle| {
                let hash = bundle
                    .chunks_exact(self.dimensions)
                    .enumerate()
                    .fold(0u32, |hash, (bit, plane)| {
                        if simd::dot_product(plane, &values) > 0.0 {
                            hash | (1 << bit)
                        } else {
                            hash
                        }
                    });
                HashToken(hash as i32)
            })
            .collect();

        Ok(tokens)
    }
}

impl HashingScheme for BitSampling {
    fn name(&self) -> &'static str {
        "bit_sampling"
    }

    fn supports(&self, _descriptor: &FeatureDescriptor) -> bool {
        true
    }

    fn field_name(&self, descriptor: &FeatureDescriptor) -> String {
        descriptor.hash_field()
    }

    fn index_terms(&self, _descriptor: &FeatureDescriptor, vector: &FeatureVector) -> Result<String> {
        Ok(tokens_to_string(&self.generate(vector)?))
    }
}

fn validate_shape(dimensions: usize, bits: usize, bundles: usize) -> Result<()> {
    if dimensions == 0 || bundles == 0 {
        return Err(ImgsimError::resource(
            "BitSampling needs at least one dimension and one bundle",
        ));
    }
    if bits == 0 || bits > 32 {
        return Err(ImgsimError::resource(format!(
            "BitSampling bits per token must be in 1..=32, got {bits}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vector(seed: f64, len: usize) -> FeatureVector {
        FeatureVector::Double((0..len).map(|i| ((i as f64 + seed) * 0.7).sin()).collect())
    }

    #[test]
    fn test_generate_is_deterministic_and_sized() {
        let table = BitSampling::generate_random(32, 12, 20, 7).unwrap();
        let vector = sample_vector(1.0, 32);

        let first = table.generate(&vector).unwrap();
        let second = table.generate(&vector).unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first, second);
        assert!(first.iter().all(|t| (t.0 as u32) < (1 << 12)));
    }

    #[test]
    fn test_same_seed_same_table() {
        let a = BitSampling::generate_random(8, 4, 3, 99).unwrap();
        let b = BitSampling::generate_random(8, 4, 3, 99).unwrap();
        let c = BitSampling::generate_random(8, 4, 3, 100).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_explicit_planes() {
        // One bundle, two planes over two dimensions: x axis and y axis.
        let table = BitSampling::new(2, 2, 1, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let both = table.generate(&FeatureVector::Double(vec![1.0, 1.0])).unwrap();
        let only_y = table.generate(&FeatureVector::Double(vec![-1.0, 1.0])).unwrap();
        let neither = table.generate(&FeatureVector::Double(vec![-1.0, -1.0])).unwrap();
        assert_eq!(both, vec![HashToken(0b11)]);
        assert_eq!(only_y, vec![HashToken(0b10)]);
        assert_eq!(neither, vec![HashToken(0)]);
    }

    #[test]
    fn test_short_vectors_are_zero_padded_and_long_ones_rejected() {
        let table = BitSampling::generate_random(16, 8, 4, 1).unwrap();
        let short = FeatureVector::Double(vec![0.5; 10]);
        let mut padded_values = vec![0.5; 10];
        padded_values.resize(16, 0.0);
        let padded = FeatureVector::Double(padded_values);
        assert_eq!(table.generate(&short).unwrap(), table.generate(&padded).unwrap());

        let long = FeatureVector::Double(vec![0.5; 17]);
        assert!(matches!(
            table.generate(&long),
            Err(ImgsimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_short_feature_hashes_like_its_double_twin() {
        let table = BitSampling::generate_random(6, 10, 5, 3).unwrap();
        let shorts = FeatureVector::Short(vec![0, 0, 5, 0, -3, 0]);
        let doubles = FeatureVector::Double(vec![0.0, 0.0, 5.0, 0.0, -3.0, 0.0]);
        assert_eq!(table.generate(&shorts).unwrap(), table.generate(&doubles).unwrap());
    }

    #[test]
    fn test_write_read_round_trip() {
        let table = BitSampling::generate_random(12, 6, 5, 42).unwrap();
        let mut bytes = Vec::new();
        table.write_to(&mut bytes).unwrap();

        let loaded = BitSampling::read_from(&bytes[..]).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_corrupt_tables_are_fatal() {
        let table = BitSampling::generate_random(4, 4, 2, 5).unwrap();
        let mut bytes = Vec::new();
        table.write_to(&mut bytes).unwrap();

        let mut flipped = bytes.clone();
        flipped[HEADER_LEN + 3] ^= 0x40;
        let err = BitSampling::read_from(&flipped[..]).unwrap_err();
        assert!(err.is_fatal());

        let truncated = &bytes[..bytes.len() - 9];
        assert!(BitSampling::read_from(truncated).unwrap_err().is_fatal());

        assert!(BitSampling::read_from(&b"nope"[..]).unwrap_err().is_fatal());
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(BitSampling::generate_random(0, 4, 2, 1).is_err());
        assert!(BitSampling::generate_random(4, 33, 2, 1).is_err());
        assert!(BitSampling::new(2, 1, 1, vec![1.0]).is_err());
        assert!(BitSampling::new(1, 1, 1, vec![f64::NAN]).is_err());
    }
}
