//! Sample tables: the flat (position, channels...) records a scan produces,
//! plus the grid metadata that lets them be folded back into 3-D arrays.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{MagError, MagResult};

/// Field channels written by a gaussmeter scan, in probe order.
pub const FIELD_CHANNELS: [&str; 3] = ["mag_x", "mag_y", "mag_z"];
/// Probe temperature channels, in probe order.
pub const TEMPERATURE_CHANNELS: [&str; 3] = ["temp_x", "temp_y", "temp_z"];

/// A spatial axis of the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Array dimension of this axis (x = 0, y = 1, z = 2)
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn name(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
        }
    }

    pub fn from_char(c: char) -> Option<Axis> {
        match c.to_ascii_lowercase() {
            'x' => Some(Axis::X),
            'y' => Some(Axis::Y),
            'z' => Some(Axis::Z),
            _ => None,
        }
    }

    /// Name of the field channel measured along this axis (`mag_x`, ...)
    pub fn field_channel(self) -> &'static str {
        FIELD_CHANNELS[self.index()]
    }

    /// The two remaining axes in x, y, z order
    pub fn others(self) -> [Axis; 2] {
        match self {
            Axis::X => [Axis::Y, Axis::Z],
            Axis::Y => [Axis::X, Axis::Z],
            Axis::Z => [Axis::X, Axis::Y],
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Axis {
    type Err = MagError;

    fn from_str(s: &str) -> MagResult<Self> {
        let mut chars = s.chars();
        match (chars.next().and_then(Axis::from_char), chars.next()) {
            (Some(axis), None) => Ok(axis),
            _ => Err(MagError::InvalidChannelSelection(s.to_string())),
        }
    }
}

/// Parse an axis selection such as `"xyz"`, `"xy"` or `"z"`.
///
/// Order is kept and duplicates are passed through untouched.
pub fn parse_axes(selection: &str) -> MagResult<Vec<Axis>> {
    if selection.is_empty() {
        return Err(MagError::InvalidChannelSelection(String::new()));
    }
    selection
        .chars()
        .map(|c| Axis::from_char(c).ok_or_else(|| MagError::InvalidChannelSelection(c.to_string())))
        .collect()
}

/// Sample counts along x, y and z
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridShape(pub [usize; 3]);

impl GridShape {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self([nx, ny, nz])
    }

    pub fn len(&self, axis: Axis) -> usize {
        self.0[axis.index()]
    }

    /// Number of samples the shape describes
    pub fn total(&self) -> usize {
        self.0.iter().product()
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.0[0], self.0[1], self.0[2])
    }
}

/// Signed grid spacing per axis, NaN for an axis with a single sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepSizes(#[serde(with = "nullable_triple")] pub [f64; 3]);

impl StepSizes {
    pub fn get(&self, axis: Axis) -> f64 {
        self.0[axis.index()]
    }
}

/// Out-of-band metadata attached to a scanned table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridMetadata {
    pub lengths: GridShape,
    pub step_sizes: StepSizes,
}

/// One record: stage position (mm) and the measured channel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(with = "nullable_vec")]
    pub values: Vec<f64>,
}

impl Sample {
    pub fn new(position: [f64; 3], values: Vec<f64>) -> Self {
        Self {
            x: position[0],
            y: position[1],
            z: position[2],
            values,
        }
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn coordinate(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// An ordered, immutable table of samples sharing one channel set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    channels: Vec<String>,
    samples: Vec<Sample>,
    #[serde(default)]
    metadata: Option<GridMetadata>,
    #[serde(default)]
    acquired: Option<DateTime<Utc>>,
}

impl SampleTable {
    /// Build a table, checking every record carries one value per channel
    pub fn new(channels: Vec<String>, samples: Vec<Sample>) -> MagResult<Self> {
        let table = Self {
            channels,
            samples,
            metadata: None,
            acquired: None,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn with_metadata(mut self, metadata: GridMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_acquired(mut self, acquired: DateTime<Utc>) -> Self {
        self.acquired = Some(acquired);
        self
    }

    fn validate(&self) -> MagResult<()> {
        let expected = self.channels.len();
        for (row, sample) in self.samples.iter().enumerate() {
            if sample.values.len() != expected {
                return Err(MagError::InvalidSample {
                    row,
                    expected,
                    actual: sample.values.len(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn metadata(&self) -> Option<&GridMetadata> {
        self.metadata.as_ref()
    }

    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        self.acquired
    }

    pub fn channel_index(&self, name: &str) -> MagResult<usize> {
        self.channels
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| MagError::InvalidChannelSelection(name.to_string()))
    }

    /// All values of one channel, in row order
    pub fn column(&self, name: &str) -> MagResult<Vec<f64>> {
        let idx = self.channel_index(name)?;
        Ok(self.samples.iter().map(|s| s.values[idx]).collect())
    }

    /// All coordinates along one axis, in row order
    pub fn axis_column(&self, axis: Axis) -> Vec<f64> {
        self.samples.iter().map(|s| s.coordinate(axis)).collect()
    }

    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.samples.iter().map(Sample::position).collect()
    }

    /// Component-wise min and max of all sample positions
    pub fn bounds(&self) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let first = self.samples.first()?;
        let start = Vector3::from(first.position());
        Some(self.samples.iter().fold((start, start), |(min, max), s| {
            let p = Vector3::from(s.position());
            (min.inf(&p), max.sup(&p))
        }))
    }

    /// Midpoint of the bounding box of all sample positions
    pub fn center(&self) -> Option<Vector3<f64>> {
        self.bounds().map(|(min, max)| (min + max) / 2.0)
    }

    /// True when both tables hold exactly the same positions in the same order
    pub fn same_positions(&self, other: &SampleTable) -> bool {
        self.len() == other.len()
            && self
                .samples
                .iter()
                .zip(&other.samples)
                .all(|(a, b)| a.position() == b.position())
    }

    /// A new table with the same positions and metadata but replaced values
    pub fn with_values(&self, channels: Vec<String>, values: Vec<Vec<f64>>) -> MagResult<Self> {
        if values.len() != self.len() {
            return Err(MagError::ShapeMismatch {
                shape: [self.len(), 1, 1],
                expected: self.len(),
                actual: values.len(),
            });
        }
        let samples = self
            .samples
            .iter()
            .zip(values)
            .map(|(s, v)| Sample::new(s.position(), v))
            .collect();
        let mut table = Self::new(channels, samples)?;
        table.metadata = self.metadata;
        table.acquired = self.acquired;
        Ok(table)
    }

    pub fn to_json(&self) -> MagResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> MagResult<Self> {
        let table: SampleTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> MagResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> MagResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

// JSON has no NaN; write it as null and read null back as NaN.
mod nullable_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| if v.is_nan() { None } else { Some(*v) }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let raw: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

mod nullable_triple {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64; 3], serializer: S) -> Result<S::Ok, S::Error> {
        super::nullable_vec::serialize(values, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 3], D::Error> {
        let raw: [Option<f64>; 3] = <[Option<f64>; 3]>::deserialize(deserializer)?;
        Ok(raw.map(|v| v.unwrap_or(f64::NAN)))
    }
}

#[cfg(test)]
pub(crate) fn field_table(points: &[([f64; 3], [f64; 3])]) -> SampleTable {
    let channels = FIELD_CHANNELS.iter().map(|c| c.to_string()).collect();
    let samples = points
        .iter()
        .map(|(p, v)| Sample::new(*p, v.to_vec()))
        .collect();
    SampleTable::new(channels, samples).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small_table() -> SampleTable {
        field_table(&[
            ([0.0, 0.0, 0.0], [1.0, 2.0, 3.0]),
            ([0.0, 5.0, 0.0], [4.0, 5.0, 6.0]),
        ])
        .with_metadata(GridMetadata {
            lengths: GridShape::new(1, 2, 1),
            step_sizes: StepSizes([f64::NAN, 5.0, f64::NAN]),
        })
    }

    #[test]
    fn test_parse_axes() {
        assert_eq!(parse_axes("xyz").unwrap(), vec![Axis::X, Axis::Y, Axis::Z]);
        assert_eq!(parse_axes("zx").unwrap(), vec![Axis::Z, Axis::X]);
        assert!(matches!(parse_axes("xw"), Err(MagError::InvalidChannelSelection(_))));
        assert!(parse_axes("").is_err());
        assert_eq!("Y".parse::<Axis>().unwrap(), Axis::Y);
    }

    #[test]
    fn test_rejects_ragged_sample() {
        let result = SampleTable::new(
            vec!["mag_x".into(), "mag_y".into()],
            vec![Sample::new([0.0; 3], vec![1.0])],
        );
        assert!(matches!(
            result,
            Err(MagError::InvalidSample { row: 0, expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_columns_and_bounds() {
        let table = small_table();
        assert_eq!(table.column("mag_y").unwrap(), vec![2.0, 5.0]);
        assert_eq!(table.axis_column(Axis::Y), vec![0.0, 5.0]);
        assert!(table.column("temp_x").is_err());

        let (min, max) = table.bounds().unwrap();
        assert_eq!(min, Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Vector3::new(0.0, 5.0, 0.0));
        assert_eq!(table.center().unwrap(), Vector3::new(0.0, 2.5, 0.0));
    }

    #[test]
    fn test_json_round_trip_keeps_metadata_and_nan() {
        let table = small_table();
        let json = table.to_json().unwrap();
        assert!(json.contains("null"));

        let back = SampleTable::from_json(&json).unwrap();
        let meta = back.metadata().unwrap();
        assert_eq!(meta.lengths, GridShape::new(1, 2, 1));
        assert!(meta.step_sizes.get(Axis::X).is_nan());
        assert_eq!(meta.step_sizes.get(Axis::Y), 5.0);
        assert_eq!(back.samples(), table.samples());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        let table = small_table().with_values(
            vec!["mag_x".into()],
            vec![vec![f64::NAN], vec![1.5]],
        ).unwrap();
        table.save(&path).unwrap();

        let back = SampleTable::load(&path).unwrap();
        assert_eq!(back.channels(), &["mag_x".to_string()]);
        assert!(back.samples()[0].values[0].is_nan());
        assert_eq!(back.samples()[1].values[0], 1.5);
        assert!(back.same_positions(&table));
    }
}
