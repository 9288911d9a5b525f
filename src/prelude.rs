pub use crate::geom::GeomError;
pub use crate::hull::{aggregate, assemble, convex_hull, normalize, validate, ConvexHullSummary};
pub use crate::tabular::{read_hulls, read_metadata, write_hulls, MetadataReaderBuilder};
pub use crate::{
    AlignedSubview, Diagnostic, Diagnostics, HullError, HullRecord, Hulls, Metadata,
    OrdinationResults, ResultTable, SampleId,
};
pub use crate::{
    AREA_COLUMN, DEFAULT_N_DIMENSIONS, MAX_DIMENSIONS, MIN_DIMENSIONS, VOLUME_COLUMN,
};
