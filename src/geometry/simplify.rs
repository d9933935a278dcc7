//! Douglas-Peucker line simplification on flat coordinate runs.

/// Simplifies a run of `dimension`-tuples with the Douglas-Peucker algorithm.
///
/// Distances are measured in the plane of the first two axes. The first and last points are
/// always kept. With `min_points > 0`, lines with at most `min_points` points are returned
/// unchanged and longer lines are simplified in chunks of
/// `max(min_points - 1, points / min_points)` points whose endpoints are all kept, so a ring
/// never collapses below its minimum size. A tolerance of zero or less disables simplification.
#[must_use]
pub fn simplify(coordinates: &[f64], dimension: usize, tolerance: f64, min_points: usize) -> Vec<f64> {
    if dimension < 2 || tolerance <= 0.0 || tolerance.is_nan() {
        return coordinates.to_vec();
    }
    let count = coordinates.len() / dimension;
    if count < 3 || (min_points > 0 && count <= min_points) {
        return coordinates.to_vec();
    }

    let mut keep = vec![true; count];
    if min_points > 0 {
        let chunk = (min_points - 1).max(count / min_points);
        for start in (0..count).step_by(chunk) {
            simplify_section(
                coordinates,
                dimension,
                start,
                (start + chunk).min(count - 1),
                tolerance,
                &mut keep,
            );
        }
    } else {
        simplify_section(coordinates, dimension, 0, count - 1, tolerance, &mut keep);
    }

    coordinates
        .chunks_exact(dimension)
        .zip(&keep)
        .filter(|(_, keep)| **keep)
        .flat_map(|(point, _)| point.iter().copied())
        .collect()
}

fn simplify_section(
    coordinates: &[f64],
    dimension: usize,
    start: usize,
    end: usize,
    tolerance: f64,
    keep: &mut [bool],
) {
    let point = |index: usize| (coordinates[index * dimension], coordinates[index * dimension + 1]);
    let mut sections = vec![(start, end)];

    while let Some((start, end)) = sections.pop() {
        if start + 1 >= end {
            continue;
        }

        let (max_index, max_distance) = (start + 1..end)
            .map(|index| (index, segment_distance(point(start), point(end), point(index))))
            .fold((start, -1.0), |max, candidate| {
                if candidate.1 > max.1 {
                    candidate
                } else {
                    max
                }
            });

        if max_distance <= tolerance {
            keep[start + 1..end].fill(false);
        } else {
            sections.push((max_index, end));
            sections.push((start, max_index));
        }
    }
}

fn point_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Distance from `p` to the segment `a`-`b`; point distance when the segment is degenerate.
#[allow(clippy::float_cmp)]
fn segment_distance(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    if a == b {
        return point_distance(a, p);
    }

    let length_squared = (b.0 - a.0).powi(2) + (b.1 - a.1).powi(2);
    let r = ((p.0 - a.0) * (b.0 - a.0) + (p.1 - a.1) * (b.1 - a.1)) / length_squared;
    if r <= 0.0 {
        return point_distance(p, a);
    }
    if r >= 1.0 {
        return point_distance(p, b);
    }

    let s = ((a.1 - p.1) * (b.0 - a.0) - (a.0 - p.0) * (b.1 - a.1)) / length_squared;
    s.abs() * length_squared.sqrt()
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_colinear_points_collapse() {
        let line = [0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 4.0, 0.0];

        assert_eq!(simplify(&line, 2, 0.01, 0), vec![0.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let line = [0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 3.0, 1.0];

        assert_eq!(simplify(&line, 2, 0.0, 0), line.to_vec());
    }

    #[test]
    fn test_keeps_points_beyond_tolerance() {
        let line = [0.0, 0.0, 1.0, 1.4, 2.0, 3.0, 3.0, 1.4, 4.0, 0.0];

        assert_eq!(
            simplify(&line, 2, 0.5, 0),
            vec![0.0, 0.0, 2.0, 3.0, 4.0, 0.0]
        );
    }

    #[test]
    fn test_min_points_leaves_short_lines() {
        let ring = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0];

        assert_eq!(simplify(&ring, 2, 10.0, 4), ring.to_vec());
    }

    #[test]
    fn test_min_points_keeps_chunk_endpoints() {
        // 9 points, min 4: chunks of max(3, 2) = 3 points -> endpoints 0, 3, 6, 8 survive
        let line: Vec<f64> = (0..9).flat_map(|i| [f64::from(i), 0.0]).collect();

        let simplified = simplify(&line, 2, 1.0, 4);
        assert_eq!(
            simplified,
            vec![0.0, 0.0, 3.0, 0.0, 6.0, 0.0, 8.0, 0.0]
        );
    }

    #[test]
    fn test_third_axis_is_carried() {
        let line = [0.0, 0.0, 5.0, 1.0, 0.0, 6.0, 2.0, 0.0, 7.0];

        assert_eq!(simplify(&line, 3, 0.1, 0), vec![0.0, 0.0, 5.0, 2.0, 0.0, 7.0]);
    }

    #[test]
    fn test_degenerate_chord() {
        // closed ring: first and last point are equal
        let ring = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0];

        assert_eq!(simplify(&ring, 2, 0.5, 0), ring.to_vec());
        assert_relative_eq!(segment_distance((0.0, 0.0), (0.0, 0.0), (3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_monotonic_reduction() {
        let line: Vec<f64> = (0..50)
            .flat_map(|i| {
                let x = f64::from(i);
                [x, (x * 0.7).sin() * 3.0]
            })
            .collect();

        for tolerance in [0.0, 0.1, 0.5, 1.0, 5.0] {
            for min_points in [0, 2, 4, 10] {
                let simplified = simplify(&line, 2, tolerance, min_points);
                assert!(simplified.len() <= line.len());
                assert_eq!(simplified[..2], line[..2]);
                assert_eq!(simplified[simplified.len() - 2..], line[line.len() - 2..]);
            }
        }
    }
}
