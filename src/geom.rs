//! Convex hull measures for point sets in two or three dimensions.
//!
//! Two dimensions: Andrew's monotone chain, shoelace area, boundary
//! perimeter. Three dimensions: incremental hull construction with
//! facet-visibility tests, surface area from the facet triangles and
//! volume from the divergence theorem over the oriented boundary.

use ndarray::ArrayView2;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeomError {
    #[error("points do not span two dimensions, hull has zero area")]
    Collinear,

    #[error("points do not span three dimensions, hull has zero volume")]
    Coplanar,

    #[error("hull measures are only defined for 2 or 3 dimensions, got {0}")]
    UnsupportedDimension(usize),
}

/// Volume and boundary measure of the convex hull of `points` (n rows, one
/// per point; 2 or 3 columns). In two dimensions the returned pair is the
/// degenerate mapping (enclosed area, perimeter); in three it is
/// (enclosed volume, surface area).
pub fn hull_measures(points: ArrayView2<'_, f64>) -> Result<(f64, f64), GeomError> {
    match points.ncols() {
        2 => hull_2d(points),
        3 => hull_3d(points),
        d => Err(GeomError::UnsupportedDimension(d)),
    }
}

fn hull_2d(points: ArrayView2<'_, f64>) -> Result<(f64, f64), GeomError> {
    let mut pts: Vec<[f64; 2]> = points.rows().into_iter().map(|r| [r[0], r[1]]).collect();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    pts.dedup();
    if pts.len() < 3 {
        return Err(GeomError::Collinear);
    }

    fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
        (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
    }

    // Monotone chain; collinear boundary points are dropped so only hull
    // vertices remain.
    let mut lower: Vec<[f64; 2]> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<[f64; 2]> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    let hull: Vec<[f64; 2]> = lower.into_iter().chain(upper).collect();
    if hull.len() < 3 {
        return Err(GeomError::Collinear);
    }

    let mut twice_area = 0.0;
    let mut perimeter = 0.0;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        twice_area += a[0] * b[1] - b[0] * a[1];
        perimeter += ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt();
    }
    let area = twice_area.abs() / 2.0;
    if area <= 0.0 {
        return Err(GeomError::Collinear);
    }
    Ok((area, perimeter))
}

type Vec3 = [f64; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross3(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// Unnormalized outward normal of an oriented facet.
fn facet_normal(pts: &[Vec3], f: [usize; 3]) -> Vec3 {
    cross3(sub(pts[f[1]], pts[f[0]]), sub(pts[f[2]], pts[f[0]]))
}

fn hull_3d(points: ArrayView2<'_, f64>) -> Result<(f64, f64), GeomError> {
    let pts: Vec<Vec3> = points
        .rows()
        .into_iter()
        .map(|r| [r[0], r[1], r[2]])
        .collect();
    let faces = incremental_hull(&pts)?;

    let mut six_volume = 0.0;
    let mut area = 0.0;
    for &f in &faces {
        let n = facet_normal(&pts, f);
        area += norm(n) / 2.0;
        six_volume += dot(pts[f[0]], n);
    }
    Ok(((six_volume / 6.0).abs(), area))
}

/// Builds the hull facets, each oriented with its normal pointing out of
/// the hull. Facets of a coplanar patch stay triangulated, which leaves
/// both measures exact.
fn incremental_hull(pts: &[Vec3]) -> Result<Vec<[usize; 3]>, GeomError> {
    let n = pts.len();
    let scale = pts
        .iter()
        .flat_map(|p| p.iter().map(|x| x.abs()))
        .fold(1.0_f64, f64::max);
    let eps = scale * 1e-9;

    // Initial simplex: a point pair with positive separation, the point
    // farthest from their line, then the point farthest from that plane.
    let i0 = 0;
    let i1 = (1..n)
        .find(|&i| norm(sub(pts[i], pts[i0])) > eps)
        .ok_or(GeomError::Collinear)?;
    let d01 = sub(pts[i1], pts[i0]);
    let len01 = norm(d01);

    let line_dist = |i: usize| norm(cross3(d01, sub(pts[i], pts[i0]))) / len01;
    let i2 = (0..n)
        .filter(|&i| i != i0 && i != i1)
        .max_by(|&a, &b| line_dist(a).total_cmp(&line_dist(b)))
        .ok_or(GeomError::Collinear)?;
    if line_dist(i2) <= eps {
        return Err(GeomError::Collinear);
    }

    let n012 = cross3(d01, sub(pts[i2], pts[i0]));
    let n012_len = norm(n012);
    let plane_dist = |i: usize| (dot(n012, sub(pts[i], pts[i0])) / n012_len).abs();
    let i3 = (0..n)
        .filter(|&i| i != i0 && i != i1 && i != i2)
        .max_by(|&a, &b| plane_dist(a).total_cmp(&plane_dist(b)))
        .ok_or(GeomError::Coplanar)?;
    if plane_dist(i3) <= eps {
        return Err(GeomError::Coplanar);
    }

    // Arrange (i0, b, c, i3) so i3 sits on the negative side of (i0, b, c);
    // the four facets below then all face outward.
    let (b, c) = if dot(n012, sub(pts[i3], pts[i0])) > 0.0 {
        (i2, i1)
    } else {
        (i1, i2)
    };
    let mut faces: Vec<[usize; 3]> = vec![[i0, b, c], [i0, c, i3], [i0, i3, b], [b, i3, c]];

    for p in 0..n {
        if p == i0 || p == i1 || p == i2 || p == i3 {
            continue;
        }

        let mut visible = vec![false; faces.len()];
        let mut any_visible = false;
        for (fi, f) in faces.iter().enumerate() {
            let nrm = facet_normal(pts, *f);
            if dot(nrm, sub(pts[p], pts[f[0]])) > eps * norm(nrm) {
                visible[fi] = true;
                any_visible = true;
            }
        }
        // Inside or on the current hull: contributes nothing.
        if !any_visible {
            continue;
        }

        // Directed edges of the visible region; an edge whose reverse is
        // not in the region lies on the horizon.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (fi, f) in faces.iter().enumerate() {
            if visible[fi] {
                edges.push((f[0], f[1]));
                edges.push((f[1], f[2]));
                edges.push((f[2], f[0]));
            }
        }
        let edge_set: HashSet<(usize, usize)> = edges.iter().copied().collect();

        let mut next: Vec<[usize; 3]> = faces
            .iter()
            .enumerate()
            .filter(|&(fi, _)| !visible[fi])
            .map(|(_, f)| *f)
            .collect();
        for &(u, v) in edges.iter().filter(|&&(u, v)| !edge_set.contains(&(v, u))) {
            // Keeping the horizon edge's direction keeps the new facet
            // oriented outward.
            next.push([u, v, p]);
        }
        faces = next;
    }

    Ok(faces)
}
