//! MetricSpaces: hashing by proximity to a fixed set of reference points.
//!
//! For every supported feature type a table of reference points is loaded
//! at startup. A vector is represented by its posting list: the ids of the
//! `posting_list_length` closest reference points, closest first.
//!
//! # Resource layout
//!
//! One gzip stream per feature type containing (integers little endian):
//!
//! ```text
//! "MSRP" | u32 version | u8 vector kind | varint len + feature code
//!        | u32 point count | u32 posting list length
//!        | (varint len + encoded reference point) × point count
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ahash::AHashMap;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::error::{ImgsimError, Result};
use crate::feature::descriptor::FeatureDescriptor;
use crate::feature::registry::FeatureRegistry;
use crate::feature::vector::{FeatureVector, VectorKind};
use crate::hashing::HashingScheme;
use crate::hashing::token::ReferencePointId;
use crate::util::varint;

const MAGIC: &[u8; 4] = b"MSRP";
const VERSION: u32 = 1;

/// Reference points of one feature type.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoints {
    code: String,
    kind: VectorKind,
    posting_list_length: usize,
    points: Vec<FeatureVector>,
}

impl ReferencePoints {
    pub fn new(
        descriptor: &FeatureDescriptor,
        points: Vec<FeatureVector>,
        posting_list_length: usize,
    ) -> Result<Self> {
        if posting_list_length == 0 || posting_list_length > points.len() {
            return Err(ImgsimError::resource(format!(
                "posting list length {posting_list_length} must be in 1..={} for {}",
                points.len(),
                descriptor.code()
            )));
        }
        if let Some(first) = points.first() {
            let dimensions = first.len();
            if points.iter().any(|p| p.len() != dimensions) {
                return Err(ImgsimError::resource(format!(
                    "reference points of {} differ in dimensions",
                    descriptor.code()
                )));
            }
        }

        Ok(Self {
            code: descriptor.code().to_string(),
            kind: descriptor.kind(),
            posting_list_length,
            points,
        })
    }

    /// Pick `count` distinct vectors of a sample corpus as reference points.
    pub fn sample(
        descriptor: &FeatureDescriptor,
        corpus: &[FeatureVector],
        count: usize,
        posting_list_length: usize,
        seed: u64,
    ) -> Result<Self> {
        if count > corpus.len() {
            return Err(ImgsimError::invalid_argument(format!(
                "cannot pick {count} reference points from {} vectors",
                corpus.len()
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked = rand::seq::index::sample(&mut rng, corpus.len(), count).into_vec();
        picked.sort_unstable();
        let points = picked.into_iter().map(|i| corpus[i].clone()).collect();
        Self::new(descriptor, points, posting_list_length)
    }

    /// Load a persisted table from a file.
    pub fn load<P: AsRef<Path>>(path: P, registry: &FeatureRegistry) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ImgsimError::resource(format!(
                "cannot open reference points {}: {e}",
                path.display()
            ))
        })?;
        let table = Self::read_from(BufReader::new(file), registry)?;
        info!(
            path = %path.display(),
            code = %table.code,
            points = table.points.len(),
            posting_list_length = table.posting_list_length,
            "loaded MetricSpaces reference points"
        );
        Ok(table)
    }

    /// Read a persisted table; the feature code must be registered with the
    /// same vector kind.
    pub fn read_from<R: Read>(reader: R, registry: &FeatureRegistry) -> Result<Self> {
        let mut bytes = Vec::new();
        GzDecoder::new(reader)
            .read_to_end(&mut bytes)
            .map_err(|e| ImgsimError::resource(format!("cannot inflate reference points: {e}")))?;
        Self::parse(&bytes, registry).map_err(|e| match e {
            ImgsimError::Resource(_) => e,
            other => ImgsimError::resource(format!("malformed reference points: {other}")),
        })
    }

    fn parse(bytes: &[u8], registry: &FeatureRegistry) -> Result<Self> {
        let mut reader = bytes;
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ImgsimError::resource("not a reference point table"));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(ImgsimError::resource(format!(
                "unsupported reference point table version {version}"
            )));
        }
        let kind = kind_from_tag(reader.read_u8()?)?;
        let code = read_chunk(&mut reader)?;
        let code = String::from_utf8(code.to_vec())
            .map_err(|_| ImgsimError::resource("feature code is not UTF-8"))?;

        let descriptor = registry.by_code(&code).ok_or_else(|| {
            ImgsimError::resource(format!("reference points for unregistered feature {code}"))
        })?;
        if descriptor.kind() != kind {
            return Err(ImgsimError::resource(format!(
                "reference points of {code} are {} but the feature is {}",
                kind.name(),
                descriptor.kind().name()
            )));
        }

        let count = reader.read_u32::<LittleEndian>()? as usize;
        let posting_list_length = reader.read_u32::<LittleEndian>()? as usize;
        // Every point takes at least one byte, so this bounds the allocation.
        if count > reader.len() {
            return Err(ImgsimError::resource(format!(
                "reference point table of {code} announces {count} points in {} bytes",
                reader.len()
            )));
        }

        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            let chunk = read_chunk(&mut reader)?;
            points.push(descriptor.decode(chunk)?);
        }
        if !reader.is_empty() {
            return Err(ImgsimError::resource(format!(
                "{} trailing bytes in reference point table of {code}",
                reader.len()
            )));
        }

        Self::new(descriptor, points, posting_list_length)
    }

    /// Persist the table as a gzip stream.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(MAGIC);
        body.write_u32::<LittleEndian>(VERSION)?;
        body.write_u8(kind_tag(self.kind))?;
        varint::write_u32(&mut body, self.code.len() as u32)?;
        body.extend_from_slice(self.code.as_bytes());
        body.write_u32::<LittleEndian>(self.points.len() as u32)?;
        body.write_u32::<LittleEndian>(self.posting_list_length as u32)?;
        for point in &self.points {
            let encoded = self.kind.encode(point)?;
            varint::write_u32(&mut body, encoded.len() as u32)?;
            body.extend_from_slice(&encoded);
        }

        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(&body)?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    /// Persist the table to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn posting_list_length(&self) -> usize {
        self.posting_list_length
    }

    /// The `n` reference points closest to `vector`, closest first; ties
    /// keep the lower reference point id first.
    fn nearest(
        &self,
        descriptor: &FeatureDescriptor,
        vector: &FeatureVector,
        n: usize,
    ) -> Result<Vec<ReferencePointId>> {
        let mut ranked = self
            .points
            .iter()
            .enumerate()
            .map(|(id, point)| Ok((descriptor.distance(vector, point)?, id as u32)))
            .collect::<Result<Vec<(f64, u32)>>>()?;

        let n = n.min(ranked.len());
        let by_distance =
            |a: &(f64, u32), b: &(f64, u32)| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1));
        if n < ranked.len() && n > 0 {
            ranked.select_nth_unstable_by(n - 1, by_distance);
        }
        ranked.truncate(n);
        ranked.sort_unstable_by(by_distance);

        Ok(ranked.into_iter().map(|(_, id)| ReferencePointId(id)).collect())
    }
}

/// Reference point tables of every supported feature type.
#[derive(Debug, Clone, Default)]
pub struct MetricSpaces {
    tables: AHashMap<String, ReferencePoints>,
}

impl MetricSpaces {
    /// A scheme supporting no feature type.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_tables<I>(tables: I) -> Result<Self>
    where
        I: IntoIterator<Item = ReferencePoints>,
    {
        let mut by_code = AHashMap::new();
        for table in tables {
            if by_code.contains_key(&table.code) {
                return Err(ImgsimError::resource(format!(
                    "duplicate reference points for {}",
                    table.code
                )));
            }
            by_code.insert(table.code.clone(), table);
        }
        Ok(Self { tables: by_code })
    }

    /// Load one table per path.
    pub fn load_all<P: AsRef<Path>>(paths: &[P], registry: &FeatureRegistry) -> Result<Self> {
        let tables = paths
            .iter()
            .map(|path| ReferencePoints::load(path, registry))
            .collect::<Result<Vec<_>>>()?;
        Self::from_tables(tables)
    }

    /// Codes of the supported feature types, sorted.
    pub fn supported_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    pub fn supports(&self, descriptor: &FeatureDescriptor) -> bool {
        self.table(descriptor).is_ok()
    }

    fn table(&self, descriptor: &FeatureDescriptor) -> Result<&ReferencePoints> {
        self.tables
            .get(descriptor.code())
            .filter(|table| table.kind == descriptor.kind())
            .ok_or_else(|| {
                ImgsimError::unsupported_scheme(format!(
                    "MetricSpaces has no reference points for {} ({})",
                    descriptor.name(),
                    descriptor.code()
                ))
            })
    }

    pub fn posting_list_length(&self, descriptor: &FeatureDescriptor) -> Result<usize> {
        Ok(self.table(descriptor)?.posting_list_length)
    }

    /// The posting list of `vector`: the ids of the closest reference points,
    /// closest first, `posting_list_length` of them.
    pub fn generate(
        &self,
        descriptor: &FeatureDescriptor,
        vector: &FeatureVector,
    ) -> Result<Vec<ReferencePointId>> {
        let table = self.table(descriptor)?;
        table.nearest(descriptor, vector, table.posting_list_length)
    }

    /// The `length` closest reference points with boosts decreasing by rank:
    /// rank `r` gets `1 - r / length`.
    pub fn boosted_terms(
        &self,
        descriptor: &FeatureDescriptor,
        vector: &FeatureVector,
        length: usize,
    ) -> Result<Vec<(ReferencePointId, f32)>> {
        let table = self.table(descriptor)?;
        let length = length.min(table.posting_list_length);
        let nearest = table.nearest(descriptor, vector, length)?;
        Ok(nearest
            .into_iter()
            .enumerate()
            .map(|(rank, id)| (id, 1.0 - rank as f32 / length as f32))
            .collect())
    }
}

impl HashingScheme for MetricSpaces {
    fn name(&self) -> &'static str {
        "metric_spaces"
    }

    fn supports(&self, descriptor: &FeatureDescriptor) -> bool {
        MetricSpaces::supports(self, descriptor)
    }

    fn field_name(&self, descriptor: &FeatureDescriptor) -> String {
        descriptor.metric_spaces_field()
    }

    /// The posting list with the term of rank `r` repeated
    /// `posting_list_length - r` times, so term frequency encodes proximity.
    fn index_terms(&self, descriptor: &FeatureDescriptor, vector: &FeatureVector) -> Result<String> {
        let posting_list = self.generate(descriptor, vector)?;
        let length = posting_list.len();
        let mut terms = Vec::with_capacity(length * (length + 1) / 2);
        for (rank, id) in posting_list.iter().enumerate() {
            let term = id.term();
            for _ in 0..(length - rank) {
                terms.push(term.clone());
            }
        }
        Ok(terms.join(" "))
    }
}

fn read_chunk<'a>(reader: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = varint::read_u32(reader)? as usize;
    if len > reader.len() {
        return Err(ImgsimError::resource("truncated reference point table"));
    }
    let (chunk, rest) = reader.split_at(len);
    *reader = rest;
    Ok(chunk)
}

fn kind_tag(kind: VectorKind) -> u8 {
    match kind {
        VectorKind::DenseDouble => 0,
        VectorKind::DenseShort => 1,
        VectorKind::SparseDouble => 2,
        VectorKind::SparseShort => 3,
    }
}

fn kind_from_tag(tag: u8) -> Result<VectorKind> {
    match tag {
        0 => Ok(VectorKind::DenseDouble),
        1 => Ok(VectorKind::DenseShort),
        2 => Ok(VectorKind::SparseDouble),
        3 => Ok(VectorKind::SparseShort),
        other => Err(ImgsimError::resource(format!("unknown vector kind tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::distance::DistanceMetric;

    fn descriptor() -> FeatureDescriptor {
        FeatureDescriptor::new("cl", "ColorLayout", VectorKind::DenseDouble, DistanceMetric::Euclidean)
    }

    fn line_points(n: usize) -> Vec<FeatureVector> {
        (0..n).map(|i| FeatureVector::Double(vec![i as f64, 0.0])).collect()
    }

    fn scheme(posting_list_length: usize) -> MetricSpaces {
        let table = ReferencePoints::new(&descriptor(), line_points(10), posting_list_length).unwrap();
        MetricSpaces::from_tables([table]).unwrap()
    }

    #[test]
    fn test_generate_orders_by_proximity() {
        let ms = scheme(4);
        let posting_list = ms
            .generate(&descriptor(), &FeatureVector::Double(vec![6.2, 0.0]))
            .unwrap();
        let ids: Vec<u32> = posting_list.iter().map(|id| id.0).collect();
        assert_eq!(ids, vec![6, 7, 5, 8]);
        assert_eq!(ms.posting_list_length(&descriptor()).unwrap(), 4);
    }

    #[test]
    fn test_ties_prefer_lower_ids() {
        let ms = scheme(2);
        let posting_list = ms
            .generate(&descriptor(), &FeatureVector::Double(vec![4.5, 0.0]))
            .unwrap();
        assert_eq!(posting_list, vec![ReferencePointId(4), ReferencePointId(5)]);
    }

    #[test]
    fn test_boosts_decrease_with_rank() {
        let ms = scheme(5);
        let terms = ms
            .boosted_terms(&descriptor(), &FeatureVector::Double(vec![0.0, 0.0]), 4)
            .unwrap();
        assert_eq!(terms.len(), 4);
        assert_eq!(terms[0], (ReferencePointId(0), 1.0));
        assert!(terms.windows(2).all(|w| w[0].1 > w[1].1));
        assert!(terms.iter().all(|(_, boost)| *boost > 0.0));
    }

    #[test]
    fn test_index_terms_repeat_by_rank() {
        let ms = scheme(3);
        let text = ms
            .index_terms(&descriptor(), &FeatureVector::Double(vec![0.0, 0.0]))
            .unwrap();
        assert_eq!(
            text,
            "R000000 R000000 R000000 R000001 R000001 R000002"
        );
    }

    #[test]
    fn test_unsupported_feature_is_explicit() {
        let ms = scheme(3);
        let other = FeatureDescriptor::new("eh", "EdgeHistogram", VectorKind::DenseDouble, DistanceMetric::Manhattan);
        assert!(!ms.supports(&other));
        assert!(matches!(
            ms.posting_list_length(&other),
            Err(ImgsimError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ms.generate(&other, &FeatureVector::Double(vec![0.0, 0.0])),
            Err(ImgsimError::UnsupportedScheme(_))
        ));
        assert!(!MetricSpaces::empty().supports(&descriptor()));
    }

    #[test]
    fn test_write_read_round_trip() {
        let registry = FeatureRegistry::with_defaults();
        let table = ReferencePoints::new(&descriptor(), line_points(6), 3).unwrap();
        let mut bytes = Vec::new();
        table.write_to(&mut bytes).unwrap();

        let loaded = ReferencePoints::read_from(&bytes[..], &registry).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_corrupt_tables_are_fatal() {
        let registry = FeatureRegistry::with_defaults();
        assert!(ReferencePoints::read_from(&b"not gzip"[..], &registry).unwrap_err().is_fatal());

        let unregistered = FeatureDescriptor::new("zz", "Unknown", VectorKind::DenseDouble, DistanceMetric::Euclidean);
        let table = ReferencePoints::new(&unregistered, line_points(4), 2).unwrap();
        let mut bytes = Vec::new();
        table.write_to(&mut bytes).unwrap();
        assert!(ReferencePoints::read_from(&bytes[..], &registry).unwrap_err().is_fatal());
    }

    #[test]
    fn test_invalid_posting_list_length() {
        assert!(ReferencePoints::new(&descriptor(), line_points(3), 0).is_err());
        assert!(ReferencePoints::new(&descriptor(), line_points(3), 4).is_err());
    }

    #[test]
    fn test_sample_picks_distinct_points() {
        let corpus = line_points(20);
        let table = ReferencePoints::sample(&descriptor(), &corpus, 5, 3, 11).unwrap();
        assert_eq!(table.len(), 5);
        let again = ReferencePoints::sample(&descriptor(), &corpus, 5, 3, 11).unwrap();
        assert_eq!(table, again);
        assert!(ReferencePoints::sample(&descriptor(), &corpus, 21, 3, 11).is_err());
    }
}
