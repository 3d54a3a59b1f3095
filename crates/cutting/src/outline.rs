//! Closed piece outlines assembled from the shared edge arena.

use geo::Area;
use geo_types::{LineString, Polygon};
use jigsaw_common::{GridSize, GridSpec};
use kurbo::{BezPath, CubicBez, PathEl, Point};
use serde::{Deserialize, Serialize};

use crate::edges::{EdgeId, EdgeSet};
use crate::error::{CutError, Result};

/// Flattening tolerance in pixels for polygon conversions
pub const FLATTEN_TOLERANCE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    Forward,
    Reversed,
}

/// One side of a piece. Corners are `(row, col)` grid corner indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundarySide {
    Straight { from: (u32, u32), to: (u32, u32) },
    Curve { edge: EdgeId, traversal: Traversal },
}

/// Sides in clockwise order (image coordinates): top, right, bottom, left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceOutline {
    pub row: u32,
    pub col: u32,
    pub sides: [BoundarySide; 4],
}

impl PieceOutline {
    pub fn new(size: GridSize, row: u32, col: u32) -> Self {
        let top = if row == 0 {
            BoundarySide::Straight {
                from: (row, col),
                to: (row, col + 1),
            }
        } else {
            BoundarySide::Curve {
                edge: EdgeId::horizontal(row - 1, col),
                traversal: Traversal::Reversed,
            }
        };
        let right = if col + 1 == size.columns {
            BoundarySide::Straight {
                from: (row, col + 1),
                to: (row + 1, col + 1),
            }
        } else {
            BoundarySide::Curve {
                edge: EdgeId::vertical(row, col),
                traversal: Traversal::Forward,
            }
        };
        let bottom = if row + 1 == size.rows {
            BoundarySide::Straight {
                from: (row + 1, col + 1),
                to: (row + 1, col),
            }
        } else {
            BoundarySide::Curve {
                edge: EdgeId::horizontal(row, col),
                traversal: Traversal::Forward,
            }
        };
        let left = if col == 0 {
            BoundarySide::Straight {
                from: (row + 1, col),
                to: (row, col),
            }
        } else {
            BoundarySide::Curve {
                edge: EdgeId::vertical(row, col - 1),
                traversal: Traversal::Reversed,
            }
        };

        Self {
            row,
            col,
            sides: [top, right, bottom, left],
        }
    }

    /// Shared edges referenced by this outline
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, Traversal)> + '_ {
        self.sides.iter().filter_map(|side| match side {
            BoundarySide::Curve { edge, traversal } => Some((*edge, *traversal)),
            BoundarySide::Straight { .. } => None,
        })
    }

    /// Segments of one side in grid units; straight sides yield none.
    fn side_segments(&self, side: &BoundarySide, edges: &EdgeSet) -> Result<Vec<CubicBez>> {
        match side {
            BoundarySide::Straight { .. } => Ok(Vec::new()),
            BoundarySide::Curve { edge, traversal } => {
                let edge = edges.get(*edge).ok_or_else(|| {
                    CutError::InvalidEdgeSet(format!(
                        "piece ({}, {}) references missing edge {:?}",
                        self.row, self.col, edge
                    ))
                })?;
                Ok(match traversal {
                    Traversal::Forward => edge.segments.to_vec(),
                    Traversal::Reversed => edge.reversed_segments().to_vec(),
                })
            }
        }
    }

    /// Closed path in pixel space.
    ///
    /// Curve points are scaled with the same expression [`GridSpec::corner`]
    /// uses, so every side ends exactly where the next one starts.
    pub fn to_bez_path(&self, edges: &EdgeSet, grid: &GridSpec) -> Result<BezPath> {
        edges.ensure_grid(grid.size)?;
        let cell_width = grid.cell_width();
        let cell_height = grid.cell_height();
        let to_pixels = |p: Point| Point::new(p.x * cell_width, p.y * cell_height);
        let corner = |(row, col): (u32, u32)| {
            let (x, y) = grid.corner(row, col);
            Point::new(x, y)
        };

        let start = corner((self.row, self.col));
        let mut path = BezPath::new();
        path.move_to(start);
        let mut cursor = start;

        for side in &self.sides {
            match side {
                BoundarySide::Straight { from, to } => {
                    assert_eq!(corner(*from), cursor, "outline side does not connect");
                    cursor = corner(*to);
                    path.line_to(cursor);
                }
                BoundarySide::Curve { .. } => {
                    for seg in self.side_segments(side, edges)? {
                        assert_eq!(to_pixels(seg.p0), cursor, "outline side does not connect");
                        cursor = to_pixels(seg.p3);
                        path.curve_to(to_pixels(seg.p1), to_pixels(seg.p2), cursor);
                    }
                }
            }
        }
        assert_eq!(cursor, start, "outline does not close");
        path.close_path();
        Ok(path)
    }

    /// Flattened outline as a polygon, for area and containment checks
    pub fn to_polygon(&self, edges: &EdgeSet, grid: &GridSpec, tolerance: f64) -> Result<Polygon<f64>> {
        let path = self.to_bez_path(edges, grid)?;
        let mut points: Vec<(f64, f64)> = Vec::new();
        kurbo::flatten(path.iter(), tolerance, |el| match el {
            PathEl::MoveTo(p) | PathEl::LineTo(p) => points.push((p.x, p.y)),
            _ => {}
        });
        Ok(Polygon::new(LineString::from(points), vec![]))
    }

    /// Enclosed area in square pixels
    pub fn area(&self, edges: &EdgeSet, grid: &GridSpec) -> Result<f64> {
        Ok(self.to_polygon(edges, grid, FLATTEN_TOLERANCE)?.unsigned_area())
    }
}

/// Outlines of every piece in id order
pub fn all_outlines(size: GridSize) -> Vec<PieceOutline> {
    (0..size.rows)
        .flat_map(|row| (0..size.columns).map(move |col| PieceOutline::new(size, row, col)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::ShapeConfig;
    use geo::Contains;
    use jigsaw_common::DEFAULT_MAX_PIECES;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn setup(rows: u32, columns: u32, seed: u64, width: u32, height: u32) -> (EdgeSet, GridSpec) {
        let size = GridSize::new(rows, columns);
        let edges = EdgeSet::generate(size, seed, &ShapeConfig::default(), DEFAULT_MAX_PIECES).unwrap();
        let grid = GridSpec::new(size, width, height).unwrap();
        (edges, grid)
    }

    #[test]
    fn test_every_edge_used_twice() {
        let size = GridSize::new(3, 3);
        let mut uses: HashMap<EdgeId, Vec<Traversal>> = HashMap::new();
        for outline in all_outlines(size) {
            for (edge, traversal) in outline.edges() {
                uses.entry(edge).or_default().push(traversal);
            }
        }
        assert_eq!(uses.len(), 12);
        for traversals in uses.values() {
            assert_eq!(traversals.len(), 2);
            assert!(traversals.contains(&Traversal::Forward));
            assert!(traversals.contains(&Traversal::Reversed));
        }
    }

    #[test]
    fn test_single_piece_is_rectangle() {
        let (edges, grid) = setup(1, 1, 0, 40, 30);
        let outline = PieceOutline::new(grid.size, 0, 0);
        assert_eq!(outline.edges().count(), 0);
        assert!((outline.area(&edges, &grid).unwrap() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_pieces_tile_the_image() {
        let (edges, grid) = setup(4, 5, 2024, 500, 400);
        let total: f64 = all_outlines(grid.size)
            .iter()
            .map(|outline| outline.to_polygon(&edges, &grid, 0.01).unwrap().unsigned_area())
            .sum();
        assert!((total - 200_000.0).abs() / 200_000.0 < 1e-3);
    }

    #[test]
    fn test_cell_center_inside_outline() {
        let (edges, grid) = setup(3, 4, 8, 400, 300);
        for outline in all_outlines(grid.size) {
            let polygon = outline.to_polygon(&edges, &grid, 0.05).unwrap();
            let x = (outline.col as f64 + 0.5) * grid.cell_width();
            let y = (outline.row as f64 + 0.5) * grid.cell_height();
            assert!(polygon.contains(&geo_types::Point::new(x, y)));
        }
    }

    #[test]
    fn test_neighbours_share_exact_points() {
        let (edges, grid) = setup(2, 2, 17, 333, 251);
        let left = PieceOutline::new(grid.size, 0, 0).to_bez_path(&edges, &grid).unwrap();
        let right = PieceOutline::new(grid.size, 0, 1).to_bez_path(&edges, &grid).unwrap();
        let points = |path: &BezPath| -> Vec<(u64, u64)> {
            path.elements()
                .iter()
                .filter_map(|el| el.end_point())
                .map(|p| (p.x.to_bits(), p.y.to_bits()))
                .collect()
        };
        let shared: Vec<_> = points(&left)
            .into_iter()
            .filter(|p| points(&right).contains(p))
            .collect();
        // two grid corners plus three inner joints of the shared edge
        assert_eq!(shared.len(), 5);
    }

    proptest! {
        #[test]
        fn prop_outlines_close(
            rows in 1u32..6,
            columns in 1u32..6,
            seed in any::<u64>(),
            width in 50u32..900,
            height in 50u32..900,
        ) {
            let (edges, grid) = setup(rows, columns, seed, width, height);
            for outline in all_outlines(grid.size) {
                let path = outline.to_bez_path(&edges, &grid).unwrap();
                let elements = path.elements();
                let first = elements.first().and_then(|el| el.end_point());
                let last = elements.iter().rev().find_map(|el| el.end_point());
                prop_assert_eq!(first, last);
                prop_assert_eq!(elements.last(), Some(&PathEl::ClosePath));
            }
        }

        #[test]
        fn prop_outlines_close_for_any_shape(
            shape in crate::edges::valid_shapes(),
            seed in any::<u64>(),
        ) {
            let size = GridSize::new(3, 4);
            let edges = EdgeSet::generate(size, seed, &shape, DEFAULT_MAX_PIECES).unwrap();
            let grid = GridSpec::new(size, 400, 300).unwrap();
            for outline in all_outlines(size) {
                let path = outline.to_bez_path(&edges, &grid).unwrap();
                let elements = path.elements();
                let first = elements.first().and_then(|el| el.end_point());
                let last = elements.iter().rev().find_map(|el| el.end_point());
                prop_assert_eq!(first, last);
                prop_assert_eq!(elements.last(), Some(&PathEl::ClosePath));
            }
        }

        #[test]
        fn prop_traversals_are_exact_reverses(
            rows in 2u32..6,
            columns in 2u32..6,
            seed in any::<u64>(),
        ) {
            let (edges, _) = setup(rows, columns, seed, 600, 600);
            for edge in edges.iter() {
                let forward: Vec<Point> = edge.segments.iter()
                    .flat_map(|s| [s.p0, s.p1, s.p2, s.p3]).collect();
                let mut reversed: Vec<Point> = edge.reversed_segments().iter()
                    .flat_map(|s| [s.p0, s.p1, s.p2, s.p3]).collect();
                reversed.reverse();
                prop_assert_eq!(forward, reversed);
            }
        }
    }
}
