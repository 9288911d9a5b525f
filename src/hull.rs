use crate::geom;
use crate::prelude::*;
use ndarray::{s, Array2};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::warn;

/// Everything one invocation produces: the assembled table and the
/// advisories recorded along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHullSummary {
    pub hulls: ResultTable,
    pub diagnostics: Diagnostics,
}

/// Checks that the two tables can be aligned and that the subject column
/// exists, then restricts and reorders the metadata rows to the ordination
/// result's sample order. The ordering matters: downstream grouping pairs
/// metadata row `i` with coordinate row `i`.
pub fn validate<'a>(
    metadata: &'a Metadata,
    pcoa: &OrdinationResults,
    subject_column: &str,
) -> Result<AlignedSubview<'a>, HullError> {
    let mut rows = Vec::with_capacity(pcoa.len());
    for id in pcoa.ids() {
        match metadata.row_index(id) {
            Some(row) => rows.push(row),
            None => return Err(HullError::IndexMismatch { id: id.clone() }),
        }
    }
    let column = metadata
        .column_index(subject_column)
        .ok_or_else(|| HullError::MissingColumn {
            column: subject_column.to_string(),
        })?;
    if pcoa.n_axes() < MIN_DIMENSIONS {
        return Err(HullError::InsufficientDimensions {
            axes: pcoa.n_axes(),
        });
    }
    Ok(AlignedSubview::new(metadata, rows, column))
}

/// Corrects the requested dimension count and the ordination's axis count to
/// the supported range. Out-of-range requests clamp to the maximum and
/// ordinations with surplus axes are cut to the first three, each with an
/// advisory; an ordination already within range passes through untouched.
/// There is no failure path here.
pub fn normalize<'a>(
    pcoa: &'a OrdinationResults,
    requested_dimensions: usize,
    diagnostics: &mut Diagnostics,
) -> (Cow<'a, OrdinationResults>, usize) {
    let mut dimensions = requested_dimensions;
    if !(MIN_DIMENSIONS..=MAX_DIMENSIONS).contains(&dimensions) {
        dimensions = MAX_DIMENSIONS;
        let diagnostic = Diagnostic::DimensionClamp {
            requested: requested_dimensions,
            clamped_to: dimensions,
        };
        warn!("{}", diagnostic);
        diagnostics.push(diagnostic);
    }

    let pcoa = if pcoa.n_axes() > MAX_DIMENSIONS {
        let diagnostic = Diagnostic::AxisTruncation {
            original: pcoa.n_axes(),
            retained: MAX_DIMENSIONS,
        };
        warn!("{}", diagnostic);
        diagnostics.push(diagnostic);
        Cow::Owned(pcoa.truncated(MAX_DIMENSIONS))
    } else {
        Cow::Borrowed(pcoa)
    };

    // A two-axis ordination with a three-dimension request computes with
    // every axis it has; validation already guaranteed the floor.
    let dimensions = dimensions.min(pcoa.n_axes());
    debug_assert!(dimensions >= MIN_DIMENSIONS);
    (pcoa, dimensions)
}

/// Partitions the aligned rows by subject and measures the hull of each
/// group large enough to span the effective dimensions. Groups with
/// `n <= dimensions` timepoints are skipped with an advisory; a group whose
/// points collapse to a zero-measure hull aborts the invocation.
pub fn aggregate(
    meta: &AlignedSubview<'_>,
    pcoa: &OrdinationResults,
    dimensions: usize,
    diagnostics: &mut Diagnostics,
) -> Result<Hulls, HullError> {
    // First-occurrence order of subject values keeps the output stable with
    // respect to input row order.
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for i in 0..meta.len() {
        let subject = meta.subject(i);
        groups
            .entry(subject)
            .or_insert_with(|| {
                order.push(subject);
                Vec::new()
            })
            .push(i);
    }

    let mut hulls = Hulls::new();
    for subject in order {
        let rows = &groups[subject];
        let timepoints = rows.len();
        if timepoints <= dimensions {
            let diagnostic = Diagnostic::GroupSkipped {
                subject: subject.to_string(),
                timepoints,
                dimensions,
            };
            warn!("{}", diagnostic);
            diagnostics.push(diagnostic);
            continue;
        }

        let mut points = Array2::zeros((timepoints, dimensions));
        for (k, &row) in rows.iter().enumerate() {
            points
                .row_mut(k)
                .assign(&pcoa.samples().slice(s![row, ..dimensions]));
        }
        let (volume, area) =
            geom::hull_measures(points.view()).map_err(|source| HullError::DegenerateGeometry {
                subject: subject.to_string(),
                source,
            })?;
        hulls.push(HullRecord {
            subject: subject.to_string(),
            volume,
            area,
        });
    }
    Ok(hulls)
}

/// Collects the per-subject records into the fixed three-column table, in
/// aggregation order. Zero records is a valid, empty table.
pub fn assemble(records: Hulls, subject_column: &str) -> ResultTable {
    ResultTable::new(subject_column, records)
}

/// Computes the convex hull volume and area of each individual's samples
/// across its timepoints in `pcoa` space.
///
/// `individual_id_column` names the metadata column whose value is shared
/// by all sample rows of one individual. `number_of_dimensions` selects how
/// many ordination axes the hull is measured in; out-of-range values are
/// corrected, not rejected. In two dimensions the volume column holds the
/// enclosed area and the area column the perimeter, exactly as the hull
/// primitive reports them.
pub fn convex_hull(
    metadata: &Metadata,
    pcoa: &OrdinationResults,
    individual_id_column: &str,
    number_of_dimensions: usize,
) -> Result<ConvexHullSummary, HullError> {
    let meta = validate(metadata, pcoa, individual_id_column)?;
    let mut diagnostics = Diagnostics::new();
    let (pcoa, dimensions) = normalize(pcoa, number_of_dimensions, &mut diagnostics);
    let records = aggregate(&meta, &pcoa, dimensions, &mut diagnostics)?;
    Ok(ConvexHullSummary {
        hulls: assemble(records, individual_id_column),
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AREA_COLUMN, DEFAULT_N_DIMENSIONS, VOLUME_COLUMN};
    use approx::assert_relative_eq;
    use ndarray::arr2;

    const UNIQUE_ID: &str = "unique_id";

    fn metadata(ids: &[&str], subjects: &[&str]) -> Metadata {
        let rows = subjects
            .iter()
            .enumerate()
            .map(|(i, s)| vec![i.to_string(), s.to_string()])
            .collect();
        Metadata::new(
            ids.iter().map(|s| s.to_string()).collect(),
            vec!["random_values".to_string(), UNIQUE_ID.to_string()],
            rows,
        )
        .unwrap()
    }

    fn ordination(ids: &[&str], samples: ndarray::Array2<f64>) -> OrdinationResults {
        let n_axes = samples.ncols();
        let axes = (1..=n_axes).map(|i| format!("PC{}", i)).collect();
        let proportion = (0..n_axes).map(|i| 0.5 / (i + 1) as f64).collect();
        let eigvals = (0..n_axes).map(|i| 1.0 / (i + 1) as f64).collect();
        OrdinationResults::new(
            ids.iter().map(|s| s.to_string()).collect(),
            axes,
            samples,
            proportion,
            eigvals,
        )
        .unwrap()
    }

    fn two_squares() -> (Metadata, OrdinationResults) {
        let ids = ["i1", "i2", "i3", "i4", "i5", "i6", "i7", "i8"];
        let meta = metadata(&ids, &["a", "a", "a", "a", "b", "b", "b", "b"]);
        let samples = arr2(&[
            [1.0, 1.0],
            [1.0, 0.0],
            [0.0, 0.0],
            [0.0, 1.0],
            [4.0, 4.0],
            [4.0, 3.0],
            [3.0, 3.0],
            [3.0, 4.0],
        ]);
        (meta, ordination(&ids, samples))
    }

    fn cube_rows(offset: f64) -> Vec<[f64; 3]> {
        let mut rows = Vec::new();
        for x in [0.0, 1.0] {
            for y in [0.0, 1.0] {
                for z in [0.0, 1.0] {
                    rows.push([x + offset, y + offset, z + offset]);
                }
            }
        }
        rows
    }

    fn two_cubes() -> (Metadata, OrdinationResults) {
        let ids: Vec<String> = (1..=16).map(|i| format!("i{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let subjects: Vec<&str> = (0..16).map(|i| if i < 8 { "s1" } else { "s2" }).collect();
        let meta = metadata(&id_refs, &subjects);
        let mut flat = Vec::with_capacity(16 * 3);
        for row in cube_rows(0.0).into_iter().chain(cube_rows(3.0)) {
            flat.extend(row);
        }
        let samples = ndarray::Array2::from_shape_vec((16, 3), flat).unwrap();
        (meta, ordination(&id_refs, samples))
    }

    #[test]
    fn two_unit_squares_report_area_and_perimeter() {
        let (meta, pcoa) = two_squares();
        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 2).unwrap();

        assert!(summary.diagnostics.is_empty());
        let records = summary.hulls.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject, "a");
        assert_relative_eq!(records[0].volume, 1.0);
        assert_relative_eq!(records[0].area, 4.0);
        assert_eq!(records[1].subject, "b");
        assert_relative_eq!(records[1].volume, 1.0);
        assert_relative_eq!(records[1].area, 4.0);
    }

    #[test]
    fn two_unit_cubes_report_volume_and_surface() {
        let (meta, pcoa) = two_cubes();
        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 3).unwrap();

        assert!(summary.diagnostics.is_empty());
        let records = summary.hulls.records();
        assert_eq!(records.len(), 2);
        for (record, subject) in records.iter().zip(["s1", "s2"]) {
            assert_eq!(record.subject, subject);
            assert_relative_eq!(record.volume, 1.0, max_relative = 1e-12);
            assert_relative_eq!(record.area, 6.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn out_of_range_request_is_clamped_with_an_advisory() {
        let (meta, pcoa) = two_cubes();
        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 4).unwrap();

        assert_eq!(
            summary.diagnostics,
            vec![Diagnostic::DimensionClamp {
                requested: 4,
                clamped_to: 3,
            }]
        );
        assert_eq!(summary.hulls.len(), 2);
        assert_relative_eq!(summary.hulls.records()[0].volume, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn surplus_axes_are_truncated_with_an_advisory() {
        let ids: Vec<String> = (1..=16).map(|i| format!("i{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let subjects: Vec<&str> = (0..16).map(|i| if i < 8 { "s1" } else { "s2" }).collect();
        let meta = metadata(&id_refs, &subjects);
        // Cube coordinates with a fourth axis that truncation must discard.
        let mut flat = Vec::with_capacity(16 * 4);
        for row in cube_rows(0.0).into_iter().chain(cube_rows(3.0)) {
            flat.extend(row);
            flat.push(9.0);
        }
        let samples = ndarray::Array2::from_shape_vec((16, 4), flat).unwrap();
        let pcoa = ordination(&id_refs, samples);

        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 3).unwrap();
        assert_eq!(
            summary.diagnostics,
            vec![Diagnostic::AxisTruncation {
                original: 4,
                retained: 3,
            }]
        );
        let text = summary.diagnostics[0].to_string();
        assert!(text.contains("4 dimensions"));
        assert!(text.contains("truncating to 3"));
        for record in summary.hulls.records() {
            assert_relative_eq!(record.volume, 1.0, max_relative = 1e-12);
            assert_relative_eq!(record.area, 6.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn truncation_is_a_no_op_within_range() {
        let (_, pcoa) = two_cubes();
        let mut diagnostics = Diagnostics::new();
        let (normalized, dimensions) = normalize(&pcoa, 3, &mut diagnostics);

        assert!(diagnostics.is_empty());
        assert_eq!(dimensions, 3);
        assert!(matches!(normalized, Cow::Borrowed(_)));
        assert_eq!(normalized.samples(), pcoa.samples());
    }

    #[test]
    fn truncation_rewrites_axes_proportions_and_eigenvalues() {
        let ids = ["i1", "i2"];
        let samples = arr2(&[[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]]);
        let pcoa = ordination(&ids, samples);
        let mut diagnostics = Diagnostics::new();
        let (normalized, dimensions) = normalize(&pcoa, 3, &mut diagnostics);

        assert_eq!(dimensions, 3);
        assert_eq!(normalized.n_axes(), 3);
        assert_eq!(normalized.axes(), ["PC1", "PC2", "PC3"]);
        assert_eq!(normalized.proportion_explained().len(), 3);
        assert_eq!(normalized.eigvals().len(), 3);
        assert_eq!(normalized.samples(), &arr2(&[[1.0, 2.0, 3.0], [5.0, 6.0, 7.0]]));
    }

    #[test]
    fn request_above_available_axes_uses_what_is_there() {
        // Two axes with a three-dimension request computes in two
        // dimensions, silently.
        let (meta, pcoa) = two_squares();
        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, DEFAULT_N_DIMENSIONS).unwrap();

        assert!(summary.diagnostics.is_empty());
        assert_eq!(summary.hulls.len(), 2);
        assert_relative_eq!(summary.hulls.records()[0].volume, 1.0);
        assert_relative_eq!(summary.hulls.records()[0].area, 4.0);
    }

    #[test]
    fn small_groups_are_skipped_with_an_advisory() {
        let ids: Vec<String> = (1..=10).map(|i| format!("i{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut subjects = vec!["s1"; 8];
        subjects.extend(["s2", "s2"]);
        let meta = metadata(&id_refs, &subjects);
        let mut flat = Vec::with_capacity(10 * 3);
        for row in cube_rows(0.0) {
            flat.extend(row);
        }
        flat.extend([5.0, 5.0, 5.0, 6.0, 6.0, 6.0]);
        let samples = ndarray::Array2::from_shape_vec((10, 3), flat).unwrap();
        let pcoa = ordination(&id_refs, samples);

        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 3).unwrap();
        assert_eq!(summary.hulls.len(), 1);
        assert_eq!(summary.hulls.records()[0].subject, "s1");
        assert_eq!(
            summary.diagnostics,
            vec![Diagnostic::GroupSkipped {
                subject: "s2".to_string(),
                timepoints: 2,
                dimensions: 3,
            }]
        );
        assert!(summary.diagnostics[0]
            .to_string()
            .contains("skipping individual 's2'"));
    }

    #[test]
    fn group_matching_the_dimension_count_is_skipped() {
        // The filter is n <= d, so three points in two dimensions are out.
        let ids = ["i1", "i2", "i3", "i4", "i5", "i6", "i7"];
        let meta = metadata(&ids, &["a", "a", "a", "b", "b", "b", "b"]);
        let samples = arr2(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [4.0, 4.0],
            [4.0, 3.0],
            [3.0, 3.0],
            [3.0, 4.0],
        ]);
        let pcoa = ordination(&ids, samples);

        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 2).unwrap();
        assert_eq!(summary.hulls.len(), 1);
        assert_eq!(summary.hulls.records()[0].subject, "b");
        assert_eq!(summary.diagnostics.len(), 1);
    }

    #[test]
    fn missing_metadata_row_is_an_index_mismatch() {
        let (_, pcoa) = two_squares();
        let short_ids = ["i1", "i2", "i3", "i4", "i5", "i6", "i7"];
        let meta = metadata(&short_ids, &["a", "a", "a", "a", "b", "b", "b"]);

        let err = convex_hull(&meta, &pcoa, UNIQUE_ID, 2).unwrap_err();
        match err {
            HullError::IndexMismatch { id } => assert_eq!(id, "i8"),
            other => panic!("expected IndexMismatch, got {:?}", other),
        }
    }

    #[test]
    fn unknown_subject_column_is_rejected() {
        let (meta, pcoa) = two_squares();
        let err = convex_hull(&meta, &pcoa, "no_such_column", 2).unwrap_err();
        match err {
            HullError::MissingColumn { column } => assert_eq!(column, "no_such_column"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn single_axis_ordination_is_rejected() {
        let ids = ["i1", "i2", "i3"];
        let meta = metadata(&ids, &["a", "a", "a"]);
        let samples = arr2(&[[0.0], [1.0], [2.0]]);
        let pcoa = ordination(&ids, samples);

        let err = convex_hull(&meta, &pcoa, UNIQUE_ID, 2).unwrap_err();
        assert!(matches!(
            err,
            HullError::InsufficientDimensions { axes: 1 }
        ));
    }

    #[test]
    fn collinear_group_aborts_with_the_subject_named() {
        let ids = ["i1", "i2", "i3", "i4"];
        let meta = metadata(&ids, &["a", "a", "a", "a"]);
        let samples = arr2(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]);
        let pcoa = ordination(&ids, samples);

        let err = convex_hull(&meta, &pcoa, UNIQUE_ID, 2).unwrap_err();
        match err {
            HullError::DegenerateGeometry { subject, .. } => assert_eq!(subject, "a"),
            other => panic!("expected DegenerateGeometry, got {:?}", other),
        }
    }

    #[test]
    fn all_groups_skipped_yields_an_empty_table_with_the_schema() {
        let ids = ["i1", "i2", "i3", "i4"];
        let meta = metadata(&ids, &["a", "a", "b", "b"]);
        let samples = arr2(&[[0.0, 0.0], [1.0, 0.0], [4.0, 4.0], [5.0, 4.0]]);
        let pcoa = ordination(&ids, samples);

        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 2).unwrap();
        assert!(summary.hulls.is_empty());
        assert_eq!(
            summary.hulls.columns(),
            [UNIQUE_ID, VOLUME_COLUMN, AREA_COLUMN]
        );
        assert_eq!(summary.diagnostics.len(), 2);
    }

    #[test]
    fn group_order_follows_first_occurrence() {
        let ids = ["i1", "i2", "i3", "i4", "i5", "i6", "i7", "i8", "i9", "i10"];
        let meta = metadata(
            &ids,
            &["b", "a", "b", "a", "b", "a", "b", "a", "b", "a"],
        );
        let samples = arr2(&[
            [3.0, 3.0],
            [1.0, 1.0],
            [4.0, 3.0],
            [1.0, 0.0],
            [3.0, 4.0],
            [0.0, 0.0],
            [4.0, 4.0],
            [0.0, 1.0],
            [3.5, 3.5],
            [0.5, 0.5],
        ]);
        let pcoa = ordination(&ids, samples);

        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 2).unwrap();
        let subjects: Vec<&str> = summary
            .hulls
            .records()
            .iter()
            .map(|r| r.subject.as_str())
            .collect();
        assert_eq!(subjects, ["b", "a"]);
    }

    #[test]
    fn identical_inputs_produce_identical_output() {
        let (meta, pcoa) = two_cubes();
        let first = convex_hull(&meta, &pcoa, UNIQUE_ID, 3).unwrap();
        let second = convex_hull(&meta, &pcoa, UNIQUE_ID, 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn measures_are_non_negative() {
        let (meta, pcoa) = two_cubes();
        let summary = convex_hull(&meta, &pcoa, UNIQUE_ID, 3).unwrap();
        for record in summary.hulls.records() {
            assert!(record.volume >= 0.0);
            assert!(record.area >= 0.0);
        }
    }
}
