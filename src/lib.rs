#![crate_name = "convexhull"]
use ndarray::{s, Array2};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod prelude;

pub mod geom;
pub mod hull;
pub mod tabular;

pub type SampleId = String;
pub type Hulls = Vec<HullRecord>;
pub type Diagnostics = Vec<Diagnostic>;

/// Dimension count used when the caller does not choose one.
pub const DEFAULT_N_DIMENSIONS: usize = 3;
/// Hull measures are supported for this closed range of dimensions.
pub const MIN_DIMENSIONS: usize = 2;
pub const MAX_DIMENSIONS: usize = 3;

pub const VOLUME_COLUMN: &str = "convexhull_volume";
pub const AREA_COLUMN: &str = "convexhull_area";

#[derive(Debug, Error)]
pub enum HullError {
    #[error("ordination sample id '{id}' not found in the metadata index")]
    IndexMismatch { id: SampleId },

    #[error("column '{column}' not found in metadata columns")]
    MissingColumn { column: String },

    #[error("ordination exposes {axes} axes but at least 2 are required")]
    InsufficientDimensions { axes: usize },

    #[error("convex hull failed for individual '{subject}'")]
    DegenerateGeometry {
        subject: String,
        #[source]
        source: geom::GeomError,
    },

    #[error("duplicate sample id '{id}'")]
    DuplicateId { id: SampleId },

    #[error("table shape mismatch: {0}")]
    Shape(String),

    #[error("malformed hulls table: {0}")]
    Format(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A non-fatal advisory recorded while a pipeline invocation corrects or
/// skips something. Advisories accompany the result; they never abort it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The requested dimension count fell outside the supported range.
    DimensionClamp { requested: usize, clamped_to: usize },
    /// The ordination carried more axes than the hull computation supports.
    AxisTruncation { original: usize, retained: usize },
    /// An individual had too few timepoints for the effective dimension.
    GroupSkipped {
        subject: String,
        timepoints: usize,
        dimensions: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionClamp {
                requested,
                clamped_to,
            } => write!(
                f,
                "number_of_dimensions {} is outside the supported range [{}, {}], clamped to {}",
                requested, MIN_DIMENSIONS, MAX_DIMENSIONS, clamped_to
            ),
            Self::AxisTruncation { original, retained } => write!(
                f,
                "ordination result has {} dimensions, truncating to {}",
                original, retained
            ),
            Self::GroupSkipped {
                subject,
                timepoints,
                dimensions,
            } => write!(
                f,
                "skipping individual '{}': {} timepoints for {} dimensions",
                subject, timepoints, dimensions
            ),
        }
    }
}

/// Sample metadata. Rows are keyed by a unique sample id; columns hold
/// string-valued attributes, one of which groups samples into subjects.
#[derive(Debug, Clone)]
pub struct Metadata {
    ids: Vec<SampleId>,
    index: HashMap<SampleId, usize>,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Metadata {
    pub fn new(
        ids: Vec<SampleId>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, HullError> {
        if ids.len() != rows.len() {
            return Err(HullError::Shape(format!(
                "{} sample ids for {} metadata rows",
                ids.len(),
                rows.len()
            )));
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(HullError::Shape(format!(
                    "metadata row has {} cells for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }
        let mut index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(HullError::DuplicateId { id: id.clone() });
            }
        }
        Ok(Self {
            ids,
            index,
            columns,
            rows,
        })
    }

    pub fn ids(&self) -> &[SampleId] {
        &self.ids
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn value(&self, row: usize, column: usize) -> &str {
        &self.rows[row][column]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Per-sample coordinates in a reduced-dimensionality space, with the
/// per-axis proportion of variance explained and eigenvalues carried along.
#[derive(Debug, Clone)]
pub struct OrdinationResults {
    ids: Vec<SampleId>,
    index: HashMap<SampleId, usize>,
    axes: Vec<String>,
    samples: Array2<f64>,
    proportion_explained: Vec<f64>,
    eigvals: Vec<f64>,
}

impl OrdinationResults {
    pub fn new(
        ids: Vec<SampleId>,
        axes: Vec<String>,
        samples: Array2<f64>,
        proportion_explained: Vec<f64>,
        eigvals: Vec<f64>,
    ) -> Result<Self, HullError> {
        if axes.is_empty() {
            return Err(HullError::Shape(
                "ordination requires at least one axis".into(),
            ));
        }
        if samples.nrows() != ids.len() {
            return Err(HullError::Shape(format!(
                "{} coordinate rows for {} sample ids",
                samples.nrows(),
                ids.len()
            )));
        }
        if samples.ncols() != axes.len()
            || proportion_explained.len() != axes.len()
            || eigvals.len() != axes.len()
        {
            return Err(HullError::Shape(format!(
                "{} coordinate columns, {} axis names, {} proportions, {} eigenvalues",
                samples.ncols(),
                axes.len(),
                proportion_explained.len(),
                eigvals.len()
            )));
        }
        let mut index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(HullError::DuplicateId { id: id.clone() });
            }
        }
        Ok(Self {
            ids,
            index,
            axes,
            samples,
            proportion_explained,
            eigvals,
        })
    }

    pub fn ids(&self) -> &[SampleId] {
        &self.ids
    }

    pub fn axes(&self) -> &[String] {
        &self.axes
    }

    pub fn n_axes(&self) -> usize {
        self.samples.ncols()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    pub fn proportion_explained(&self) -> &[f64] {
        &self.proportion_explained
    }

    pub fn eigvals(&self) -> &[f64] {
        &self.eigvals
    }

    /// A copy keeping only the first `k` axes, by declared axis order.
    /// Coordinates, proportion explained and eigenvalues are cut together
    /// so the three stay consistent.
    pub fn truncated(&self, k: usize) -> Self {
        let k = k.min(self.n_axes());
        Self {
            ids: self.ids.clone(),
            index: self.index.clone(),
            axes: self.axes[..k].to_vec(),
            samples: self.samples.slice(s![.., ..k]).to_owned(),
            proportion_explained: self.proportion_explained[..k].to_vec(),
            eigvals: self.eigvals[..k].to_vec(),
        }
    }
}

/// Metadata rows restricted and reordered to an ordination result's sample
/// order, with the subject column resolved once up front. Row `i` of the
/// subview describes row `i` of the ordination coordinates.
#[derive(Debug)]
pub struct AlignedSubview<'a> {
    meta: &'a Metadata,
    rows: Vec<usize>,
    subject_column: usize,
}

impl<'a> AlignedSubview<'a> {
    pub(crate) fn new(meta: &'a Metadata, rows: Vec<usize>, subject_column: usize) -> Self {
        Self {
            meta,
            rows,
            subject_column,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sample_id(&self, i: usize) -> &str {
        &self.meta.ids()[self.rows[i]]
    }

    pub fn subject(&self, i: usize) -> &str {
        self.meta.value(self.rows[i], self.subject_column)
    }
}

/// One output row: an individual and the measures of its hull.
#[derive(Debug, Clone, PartialEq)]
pub struct HullRecord {
    pub subject: String,
    pub volume: f64,
    pub area: f64,
}

/// The assembled result: one record per surviving individual under a fixed
/// three-column schema. A zero-row table is valid output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    subject_column: String,
    records: Hulls,
}

impl ResultTable {
    pub fn new(subject_column: impl Into<String>, records: Hulls) -> Self {
        Self {
            subject_column: subject_column.into(),
            records,
        }
    }

    /// Column names in output order.
    pub fn columns(&self) -> [&str; 3] {
        [&self.subject_column, VOLUME_COLUMN, AREA_COLUMN]
    }

    pub fn subject_column(&self) -> &str {
        &self.subject_column
    }

    pub fn records(&self) -> &[HullRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
