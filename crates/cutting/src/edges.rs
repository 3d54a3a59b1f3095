//! Shared boundary curves between adjacent grid cells.
//!
//! Every internal boundary of a cut is generated once into an [`EdgeSet`]
//! arena and then only read. Curves live in grid units (x in
//! `0..=columns`, y in `0..=rows`) so one edge set can be replayed over any
//! image with the same grid, whatever its pixel size.

use jigsaw_common::GridSize;
use kurbo::{CubicBez, Point};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::debug;

use crate::error::{CutError, Result};

/// Hard ceiling for `amplitude_max`, as a fraction of the cell size.
pub const MAX_AMPLITUDE: f64 = 0.35;
/// Ceiling for `wobble_max`.
pub const MAX_WOBBLE: f64 = 0.05;

/// Length of the shoulder handles relative to the tab amplitude
const SHOULDER_REACH: f64 = 0.35;
/// Length of the neck handles relative to the tab amplitude
const NECK_REACH: f64 = 0.6;

/// Randomisation bounds for tab shapes.
///
/// Amplitude and wobble are fractions of the cell size across the edge;
/// neck, head and center jitter are fractions of the edge length. Outlines
/// are free of self-intersection only for configurations accepted by
/// [`ShapeConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ShapeConfig {
    pub amplitude_min: f64,
    pub amplitude_max: f64,
    pub neck_min: f64,
    pub neck_max: f64,
    pub head_min: f64,
    pub head_max: f64,
    pub center_jitter: f64,
    pub lean_max: f64,
    pub wobble_max: f64,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            amplitude_min: 0.16,
            amplitude_max: 0.22,
            neck_min: 0.06,
            neck_max: 0.08,
            head_min: 0.11,
            head_max: 0.14,
            center_jitter: 0.06,
            lean_max: 0.25,
            wobble_max: 0.015,
        }
    }
}

impl ShapeConfig {
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.amplitude_min,
            self.amplitude_max,
            self.neck_min,
            self.neck_max,
            self.head_min,
            self.head_max,
            self.center_jitter,
            self.lean_max,
            self.wobble_max,
        ];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(CutError::InvalidShape(
                "all bounds must be finite and non-negative".to_string(),
            ));
        }
        if self.amplitude_min <= 0.0
            || self.amplitude_min > self.amplitude_max
            || self.amplitude_max > MAX_AMPLITUDE
        {
            return Err(CutError::InvalidShape(format!(
                "amplitude must satisfy 0 < min <= max <= {}",
                MAX_AMPLITUDE
            )));
        }
        if self.neck_min <= 0.0
            || self.neck_min > self.neck_max
            || self.neck_max >= self.head_min
            || self.head_min > self.head_max
        {
            return Err(CutError::InvalidShape(
                "expected 0 < neck_min <= neck_max < head_min <= head_max".to_string(),
            ));
        }
        if self.center_jitter + self.head_max >= 0.45 {
            return Err(CutError::InvalidShape(
                "center_jitter + head_max must stay below 0.45".to_string(),
            ));
        }
        if self.lean_max * NECK_REACH * self.amplitude_max >= self.neck_min {
            return Err(CutError::InvalidShape(
                "lean_max is too large for the neck width".to_string(),
            ));
        }
        if self.wobble_max > MAX_WOBBLE {
            return Err(CutError::InvalidShape(format!(
                "wobble_max must be <= {}",
                MAX_WOBBLE
            )));
        }
        Ok(())
    }

    /// Largest distance any curve can reach past its grid line, as a
    /// fraction of the cell size across the edge.
    ///
    /// Every control point lies within this distance, so by the convex hull
    /// property the curves do too.
    pub fn max_overshoot(&self) -> f64 {
        self.amplitude_max + self.wobble_max
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeOrientation {
    /// Separates `(row, col)` from `(row, col + 1)`
    Vertical,
    /// Separates `(row, col)` from `(row + 1, col)`
    Horizontal,
}

/// One internal boundary, named after its upper/left cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId {
    pub orientation: EdgeOrientation,
    pub row: u32,
    pub col: u32,
}

impl EdgeId {
    pub fn vertical(row: u32, col: u32) -> Self {
        Self {
            orientation: EdgeOrientation::Vertical,
            row,
            col,
        }
    }

    pub fn horizontal(row: u32, col: u32) -> Self {
        Self {
            orientation: EdgeOrientation::Horizontal,
            row,
            col,
        }
    }

    pub fn is_valid(&self, size: GridSize) -> bool {
        match self.orientation {
            EdgeOrientation::Vertical => self.row < size.rows && self.col + 1 < size.columns,
            EdgeOrientation::Horizontal => self.row + 1 < size.rows && self.col < size.columns,
        }
    }

    /// Dense index: vertical edges row-major, then horizontal edges row-major.
    pub fn index(&self, size: GridSize) -> usize {
        let row = self.row as usize;
        let col = self.col as usize;
        let columns = size.columns as usize;
        match self.orientation {
            EdgeOrientation::Vertical => row * (columns - 1) + col,
            EdgeOrientation::Horizontal => size.vertical_edge_count() + row * columns + col,
        }
    }

    /// The piece that traverses this edge forward
    pub fn owner(&self) -> (u32, u32) {
        (self.row, self.col)
    }

    /// The piece that traverses this edge reversed
    pub fn partner(&self) -> (u32, u32) {
        match self.orientation {
            EdgeOrientation::Vertical => (self.row, self.col + 1),
            EdgeOrientation::Horizontal => (self.row + 1, self.col),
        }
    }
}

/// Which way the tab points, seen from the owning piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabSide {
    /// Protrudes into the lower/right cell
    Tab,
    /// Protrudes into the owning cell
    Blank,
}

impl TabSide {
    fn sign(self) -> f64 {
        match self {
            TabSide::Tab => 1.0,
            TabSide::Blank => -1.0,
        }
    }
}

/// Values drawn for one edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TabParams {
    pub side: TabSide,
    pub center: f64,
    pub neck: f64,
    pub head: f64,
    pub amplitude: f64,
    pub lean: f64,
    pub wobble_start: f64,
    pub wobble_end: f64,
}

impl TabParams {
    fn draw(rng: &mut Pcg32, shape: &ShapeConfig) -> Self {
        let side = if rng.random_bool(0.5) {
            TabSide::Tab
        } else {
            TabSide::Blank
        };
        Self {
            side,
            center: 0.5 + between(rng, -shape.center_jitter, shape.center_jitter),
            neck: between(rng, shape.neck_min, shape.neck_max),
            head: between(rng, shape.head_min, shape.head_max),
            amplitude: between(rng, shape.amplitude_min, shape.amplitude_max),
            lean: between(rng, 0.0, shape.lean_max),
            wobble_start: between(rng, -shape.wobble_max, shape.wobble_max),
            wobble_end: between(rng, -shape.wobble_max, shape.wobble_max),
        }
    }

    /// The four segments in the edge's local frame: u runs along the edge
    /// from 0 to 1, v points across it towards the lower/right cell.
    fn local_segments(&self) -> [[Point; 4]; 4] {
        let s = self.side.sign();
        let t = self.amplitude;
        let c = self.center;
        let n = self.neck;
        let h = self.head;
        let lean = self.lean;
        let q = SHOULDER_REACH * t;
        let q2 = NECK_REACH * t;
        let p = |u: f64, v: f64| Point::new(u, v * s);

        let j0 = p(0.0, 0.0);
        let j1 = p(c - n, self.wobble_start);
        let j2 = p(c, t);
        let j3 = p(c + n, self.wobble_end);
        let j4 = p(1.0, 0.0);

        [
            [
                j0,
                p(0.5 * (c - n), 0.0),
                p(c - n - lean * q, self.wobble_start - q),
                j1,
            ],
            [
                j1,
                p(c - n + lean * q2, self.wobble_start + q2),
                p(c - h, t),
                j2,
            ],
            [
                j2,
                p(c + h, t),
                p(c + n - lean * q2, self.wobble_end + q2),
                j3,
            ],
            [
                j3,
                p(c + n + lean * q, self.wobble_end - q),
                p(1.0 - 0.5 * (1.0 - c - n), 0.0),
                j4,
            ],
        ]
    }
}

fn between(rng: &mut Pcg32, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.random_range(lo..=hi) } else { lo }
}

fn splitmix64(mut value: u64) -> u64 {
    value = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = value;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of a single edge; depends only on the cut seed and the edge identity.
pub fn edge_seed(seed: u64, id: EdgeId) -> u64 {
    let orientation = match id.orientation {
        EdgeOrientation::Vertical => 1u64,
        EdgeOrientation::Horizontal => 2u64,
    };
    splitmix64(
        seed ^ orientation.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (id.row as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
            ^ (id.col as u64).wrapping_mul(0x1656_67B1_9E37_79F9),
    )
}

/// A shared boundary curve, stored in grid units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub seed: u64,
    pub params: TabParams,
    /// Forward traversal: top to bottom for vertical edges, right to left
    /// for horizontal ones (clockwise around the owning piece).
    pub segments: [CubicBez; 4],
}

impl Edge {
    pub fn generate(id: EdgeId, cut_seed: u64, shape: &ShapeConfig) -> Self {
        let seed = edge_seed(cut_seed, id);
        let mut rng = Pcg32::seed_from_u64(seed);
        let params = TabParams::draw(&mut rng, shape);
        let (start, end) = Self::endpoints(id);

        let row = id.row as f64;
        let col = id.col as f64;
        let map = |local: Point| match id.orientation {
            EdgeOrientation::Vertical => Point::new(col + 1.0 + local.y, row + local.x),
            EdgeOrientation::Horizontal => Point::new(col + 1.0 - local.x, row + 1.0 + local.y),
        };

        let local = params.local_segments();
        let mut segments = local.map(|[p0, p1, p2, p3]| {
            CubicBez::new(map(p0), map(p1), map(p2), map(p3))
        });
        // Pin the anchors to the exact grid corners.
        segments[0].p0 = start;
        segments[3].p3 = end;

        Self {
            id,
            seed,
            params,
            segments,
        }
    }

    /// Grid corners the forward traversal starts and ends on
    pub fn endpoints(id: EdgeId) -> (Point, Point) {
        let row = id.row as f64;
        let col = id.col as f64;
        match id.orientation {
            EdgeOrientation::Vertical => (
                Point::new(col + 1.0, row),
                Point::new(col + 1.0, row + 1.0),
            ),
            EdgeOrientation::Horizontal => (
                Point::new(col + 1.0, row + 1.0),
                Point::new(col, row + 1.0),
            ),
        }
    }

    pub fn start(&self) -> Point {
        self.segments[0].p0
    }

    pub fn end(&self) -> Point {
        self.segments[3].p3
    }

    /// Segments as the partner piece walks them
    pub fn reversed_segments(&self) -> [CubicBez; 4] {
        let mut out = self.segments.map(|seg| CubicBez::new(seg.p3, seg.p2, seg.p1, seg.p0));
        out.reverse();
        out
    }
}

/// Frozen arena of every internal edge of one cut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSet {
    pub size: GridSize,
    pub seed: u64,
    pub shape: ShapeConfig,
    edges: Vec<Edge>,
}

impl EdgeSet {
    /// Generate all internal edges for `size`.
    pub fn generate(size: GridSize, seed: u64, shape: &ShapeConfig, max_pieces: u32) -> Result<Self> {
        size.validate(max_pieces)?;
        shape.validate()?;

        let mut edges = Vec::with_capacity(size.internal_edge_count());
        for row in 0..size.rows {
            for col in 0..size.columns.saturating_sub(1) {
                edges.push(Edge::generate(EdgeId::vertical(row, col), seed, shape));
            }
        }
        for row in 0..size.rows.saturating_sub(1) {
            for col in 0..size.columns {
                edges.push(Edge::generate(EdgeId::horizontal(row, col), seed, shape));
            }
        }
        debug!(
            "Generated {} edges for {}x{} grid (seed {})",
            edges.len(),
            size.rows,
            size.columns,
            seed
        );

        Ok(Self {
            size,
            seed,
            shape: shape.clone(),
            edges,
        })
    }

    /// Identifier shared by every puzzle cut with this edge set
    pub fn cut_id(&self) -> String {
        format!("{}x{}-{:016x}", self.size.rows, self.size.columns, self.seed)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn get(&self, id: EdgeId) -> Option<&Edge> {
        if !id.is_valid(self.size) {
            return None;
        }
        self.edges.get(id.index(self.size))
    }

    pub fn by_index(&self, index: usize) -> Option<&Edge> {
        self.edges.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Fail unless this edge set was generated for `size`
    pub fn ensure_grid(&self, size: GridSize) -> Result<()> {
        if self.size != size {
            return Err(CutError::EdgeSetMismatch {
                edge_rows: self.size.rows,
                edge_columns: self.size.columns,
                rows: size.rows,
                columns: size.columns,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load a previously generated edge set, checking its grid, its shape
    /// bounds and that it is complete.
    ///
    /// The piece limit is not checked here; the cutter applies its own.
    pub fn from_json(content: &str) -> Result<Self> {
        let set: EdgeSet = serde_json::from_str(content)?;
        set.size.validate(u32::MAX)?;
        set.shape.validate()?;
        if set.edges.len() != set.size.internal_edge_count() {
            return Err(CutError::InvalidEdgeSet(format!(
                "expected {} edges, found {}",
                set.size.internal_edge_count(),
                set.edges.len()
            )));
        }
        for (index, edge) in set.edges.iter().enumerate() {
            if !edge.id.is_valid(set.size) || edge.id.index(set.size) != index {
                return Err(CutError::InvalidEdgeSet(format!(
                    "edge at position {} has id {:?}",
                    index, edge.id
                )));
            }
        }
        Ok(set)
    }
}

/// Shape configurations accepted by [`ShapeConfig::validate`]
#[cfg(test)]
pub(crate) fn valid_shapes() -> impl proptest::strategy::Strategy<Value = ShapeConfig> {
    use proptest::prelude::*;
    (
        (0.05f64..=MAX_AMPLITUDE, 0.1f64..=1.0, 0.0f64..=MAX_WOBBLE),
        (0.02f64..0.1, 0.0f64..0.05, 0.01f64..0.08, 0.0f64..0.08),
        (0.0f64..0.9, 0.0f64..0.9),
    )
        .prop_map(
            |((amp_max, amp_ratio, wobble), (neck_min, neck_spread, gap, head_spread), (jitter, lean))| {
                let neck_max = neck_min + neck_spread;
                let head_min = neck_max + gap;
                let head_max = head_min + head_spread;
                ShapeConfig {
                    amplitude_min: amp_max * amp_ratio,
                    amplitude_max: amp_max,
                    neck_min,
                    neck_max,
                    head_min,
                    head_max,
                    center_jitter: (0.45 - head_max) * jitter,
                    lean_max: neck_min / (NECK_REACH * amp_max) * lean,
                    wobble_max: wobble,
                }
            },
        )
}
