//! Block-partitioned spatial lookup shared by every sensor and by collision.
//!
//! Targets are binned into a uniform grid of `cell_stride`-sized cells keyed by
//! `(row, col)`. A target is registered in every cell its footprint touches, so a
//! range query never misses a large building whose centre sits in a far cell.
//! Queries over-include; callers re-filter by exact distance.

use std::collections::{HashMap, HashSet};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WorldError;
use crate::geometry::Aabb;
use crate::target::{ObjectId, Target};

/// Footprints wider than this many cells per axis go to the global list.
const MAX_CELL_SPAN: i64 = 64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    /// Edge length of one grid cell in metres; matches the world's block stride.
    pub cell_stride: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { cell_stride: 60.0 }
    }
}

/// Grid cell address. `row` follows world Z, `col` follows world X.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub row: i32,
    pub col: i32,
}

/// Anything the grid can bin.
pub(crate) trait Footprint {
    fn footprint(&self) -> Aabb;

    /// `false` routes the item to the global list instead of block cells.
    fn block_bound(&self) -> bool {
        true
    }
}

impl Footprint for Target {
    fn footprint(&self) -> Aabb {
        Target::footprint(self)
    }

    fn block_bound(&self) -> bool {
        self.class.is_block_bound()
    }
}

/// Uniform grid over items of type `T`. Read-only after construction.
#[derive(Debug)]
pub(crate) struct BlockGrid<T> {
    stride: f32,
    items: Vec<T>,
    cells: HashMap<BlockKey, Vec<usize>>,
    global: Vec<usize>,
}

impl<T: Footprint> BlockGrid<T> {
    pub(crate) fn build(items: Vec<T>, stride: f32) -> Self {
        let mut cells: HashMap<BlockKey, Vec<usize>> = HashMap::new();
        let mut global = Vec::new();

        for (i, item) in items.iter().enumerate() {
            if !item.block_bound() {
                global.push(i);
                continue;
            }
            let fp = item.footprint();
            let lo = key_for(stride, fp.min_x, fp.min_z);
            let hi = key_for(stride, fp.max_x, fp.max_z);
            let span_rows = hi.row as i64 - lo.row as i64 + 1;
            let span_cols = hi.col as i64 - lo.col as i64 + 1;
            if span_rows > MAX_CELL_SPAN || span_cols > MAX_CELL_SPAN {
                global.push(i);
                continue;
            }
            for row in lo.row..=hi.row {
                for col in lo.col..=hi.col {
                    cells.entry(BlockKey { row, col }).or_default().push(i);
                }
            }
        }

        Self {
            stride,
            items,
            cells,
            global,
        }
    }

    /// Every item registered in a cell within `ceil(radius / stride)` of the
    /// query cell, plus the global list. Each item appears once.
    pub(crate) fn query(&self, x: f32, z: f32, radius: f32) -> Vec<&T> {
        let center = key_for(self.stride, x, z);
        let reach = (radius.max(0.0) / self.stride).ceil().min(i32::MAX as f32 / 4.0) as i32;

        let rows = center.row.saturating_sub(reach)..=center.row.saturating_add(reach);
        let cols = center.col.saturating_sub(reach)..=center.col.saturating_add(reach);
        let window = (2 * reach as i64 + 1).pow(2);

        let mut hits: Vec<usize> = self.global.clone();
        if window > self.cells.len() as i64 {
            // Sparse grid: scanning occupied cells beats probing the window.
            for (key, bucket) in &self.cells {
                if rows.contains(&key.row) && cols.contains(&key.col) {
                    hits.extend_from_slice(bucket);
                }
            }
        } else {
            for row in rows {
                for col in cols.clone() {
                    if let Some(bucket) = self.cells.get(&BlockKey { row, col }) {
                        hits.extend_from_slice(bucket);
                    }
                }
            }
        }
        hits.sort_unstable();
        hits.dedup();
        hits.into_iter().map(|i| &self.items[i]).collect()
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn global_len(&self) -> usize {
        self.global.len()
    }
}

fn key_for(stride: f32, x: f32, z: f32) -> BlockKey {
    // `as` saturates, so far-off coordinates land in the outermost cells.
    BlockKey {
        row: (z / stride).floor() as i32,
        col: (x / stride).floor() as i32,
    }
}

/// Static target index, built once per world seed.
#[derive(Debug)]
pub struct SpatialIndex {
    grid: BlockGrid<Target>,
}

impl SpatialIndex {
    /// Validate and bin the static targets.
    ///
    /// Fails on the first malformed target, on duplicate ids, and on targets
    /// carrying a dynamic id.
    pub fn build(targets: Vec<Target>, config: &IndexConfig) -> Result<Self, WorldError> {
        if !(config.cell_stride.is_finite() && config.cell_stride > 0.0) {
            return Err(WorldError::InvalidConfig(format!(
                "index cell stride must be positive, got {}",
                config.cell_stride
            )));
        }
        let mut seen: HashSet<ObjectId> = HashSet::with_capacity(targets.len());
        for t in &targets {
            t.validate()?;
            if matches!(t.id, ObjectId::Dynamic(_)) {
                return Err(WorldError::invalid_target(t.id, "dynamic id in static index"));
            }
            if !seen.insert(t.id) {
                return Err(WorldError::DuplicateId(t.id));
            }
        }

        let grid = BlockGrid::build(targets, config.cell_stride);
        debug!(
            targets = grid.items().len(),
            cells = grid.cell_count(),
            global = grid.global_len(),
            "built spatial target index"
        );
        Ok(Self { grid })
    }

    /// Candidate static targets near `(x, z)`. Conservative: never misses a
    /// target whose footprint lies within `radius`.
    pub fn query_range(&self, x: f32, z: f32, radius: f32) -> Vec<&Target> {
        self.grid.query(x, z, radius)
    }

    /// Building footprints near `(x, z)`, for line-of-sight checks.
    pub fn occluders_within(&self, x: f32, z: f32, radius: f32) -> Vec<Aabb> {
        self.grid
            .query(x, z, radius)
            .into_iter()
            .filter(|t| t.class.is_occluder())
            .filter_map(|t| t.aabb)
            .collect()
    }

    pub fn targets(&self) -> &[Target] {
        self.grid.items()
    }

    pub fn len(&self) -> usize {
        self.grid.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One frame's view of the world: the static index merged with the actors the
/// behaviour collaborator rebuilt for this frame. Borrowing both keeps the
/// static index untouched.
#[derive(Clone, Copy, Debug)]
pub struct FrameTargets<'a> {
    pub index: &'a SpatialIndex,
    pub dynamic: &'a [Target],
}

impl<'a> FrameTargets<'a> {
    pub fn new(index: &'a SpatialIndex, dynamic: &'a [Target]) -> Self {
        Self { index, dynamic }
    }

    /// Static candidates plus visible dynamic targets near `center`.
    /// Invisible actors never leave this function.
    pub fn query_range(&self, center: Vec2, radius: f32) -> Vec<&'a Target> {
        let mut out = self.index.query_range(center.x, center.y, radius);
        out.extend(self.dynamic.iter().filter(|t| {
            let reach = radius + t.bounds.half_width.max(t.bounds.half_depth);
            t.visible && t.ground().distance(center) <= reach
        }));
        out
    }
}
