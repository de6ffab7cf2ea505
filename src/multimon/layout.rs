//! Layout Calculation Engine
//!
//! Walks the adjacency graph and assigns every display an integer logical
//! position so that neighbours touch without overlapping at their scaled
//! (logical) sizes.
//!
//! Same-axis placement offsets by the logical size: a left neighbour ends
//! where the anchor begins, a right neighbour begins where the anchor ends.
//! Cross-axis placement keeps snapped edges snapped (leading or trailing) and
//! otherwise re-spaces proportionally so the pair keeps its relative overlap
//! after resizing.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tracing::{debug, trace};

use super::graph::{AdjacencyGraph, Direction, Rect};

/// Layout error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// A full pass over the remaining edges placed nothing
    #[error("Display graph is disconnected: {unresolved} edges cannot be placed")]
    Disconnected {
        /// Edges left in the work list
        unresolved: usize,
    },

    /// A graph node has no logical size
    #[error("No logical size for display {0}")]
    MissingSize(String),
}

/// Logical (scaled) size of a display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogicalSize {
    pub width: u32,
    pub height: u32,
}

impl LogicalSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Assigned logical position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Positions keyed by connector name, all non-negative
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Layout {
    positions: BTreeMap<String, Position>,
}

impl Layout {
    /// Position of `name`, if it takes part in the layout
    pub fn position(&self, name: &str) -> Option<Position> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Position)> {
        self.positions.iter().map(|(n, p)| (n.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Bounding box of the layout given each display's logical size
    pub fn bounds(&self, sizes: &BTreeMap<String, LogicalSize>) -> (u32, u32) {
        self.positions
            .iter()
            .filter_map(|(name, pos)| sizes.get(name).map(|s| (pos, s)))
            .fold((0u32, 0u32), |(w, h), (pos, size)| {
                (
                    w.max(pos.x.unsigned_abs() + size.width),
                    h.max(pos.y.unsigned_abs() + size.height),
                )
            })
    }
}

/// Everything the calculator needs for one run
#[derive(Debug, Clone, Copy)]
pub struct LayoutInput<'a> {
    /// Adjacency between participating displays
    pub graph: &'a AdjacencyGraph,
    /// Recorded rectangles the graph was built from
    pub rects: &'a BTreeMap<String, Rect>,
    /// Logical size of each participating display
    pub sizes: &'a BTreeMap<String, LogicalSize>,
}

/// Layout calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutCalculator;

impl LayoutCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Calculate logical positions
    ///
    /// The first graph node in connector order is seeded at (0,0). With an
    /// empty graph every display in `rects` is placed at (0,0). Edges whose
    /// endpoints both lack a position are deferred; each pass over the
    /// deferred edges must place at least one, otherwise the graph is
    /// disconnected. Displays with no edge at all keep their recorded offset
    /// from the nearest placed display.
    pub fn calculate(&self, input: LayoutInput<'_>) -> Result<Layout, LayoutError> {
        let mut placed: BTreeMap<String, (i64, i64)> = BTreeMap::new();

        if input.graph.is_empty() {
            for name in input.rects.keys() {
                placed.insert(name.clone(), (0, 0));
            }
            return Ok(normalize(placed));
        }

        if let Some(seed) = input.graph.nodes().next() {
            trace!("Layout seed: {}", seed);
            placed.insert(seed.to_string(), (0, 0));
        }

        let mut pending: VecDeque<(&str, &str, Direction)> = input
            .graph
            .iter()
            .map(|(anchor, edge)| (anchor, edge.neighbor.as_str(), edge.direction))
            .collect();

        while !pending.is_empty() {
            let mut progressed = false;

            for _ in 0..pending.len() {
                let Some((anchor, neighbor, direction)) = pending.pop_front() else {
                    break;
                };

                let (anchor, neighbor, direction) =
                    match (placed.contains_key(anchor), placed.contains_key(neighbor)) {
                        (true, true) => {
                            progressed = true;
                            continue;
                        }
                        (true, false) => (anchor, neighbor, direction),
                        (false, true) => (neighbor, anchor, direction.inverse()),
                        (false, false) => {
                            pending.push_back((anchor, neighbor, direction));
                            continue;
                        }
                    };

                let position = place(&input, &placed, anchor, neighbor, direction)?;
                trace!(
                    "{} {} of {} at {:?}",
                    neighbor,
                    direction,
                    anchor,
                    position
                );
                placed.insert(neighbor.to_string(), position);
                progressed = true;
            }

            if !progressed {
                return Err(LayoutError::Disconnected {
                    unresolved: pending.len(),
                });
            }
        }

        let isolated: Vec<&String> = input
            .rects
            .keys()
            .filter(|name| !placed.contains_key(*name))
            .collect();
        for name in isolated {
            let position = place_isolated(&input, &placed, name)?;
            debug!("{} has no neighbours, placed at {:?}", name, position);
            placed.insert(name.clone(), position);
        }

        let layout = normalize(placed);
        debug!(
            "Layout for {} displays: {:?}",
            layout.len(),
            layout.positions
        );
        Ok(layout)
    }
}

fn size_of(input: &LayoutInput<'_>, name: &str) -> Result<(LogicalSize, Rect), LayoutError> {
    let size = input
        .sizes
        .get(name)
        .copied()
        .ok_or_else(|| LayoutError::MissingSize(name.to_string()))?;
    let rect = input
        .rects
        .get(name)
        .copied()
        .ok_or_else(|| LayoutError::MissingSize(name.to_string()))?;
    Ok((size, rect))
}

/// Position of `neighbor`, which sits on the `direction` side of `anchor`
fn place(
    input: &LayoutInput<'_>,
    placed: &BTreeMap<String, (i64, i64)>,
    anchor: &str,
    neighbor: &str,
    direction: Direction,
) -> Result<(i64, i64), LayoutError> {
    let (offset_x, offset_y) = placed[anchor];
    let (anchor_size, anchor_rect) = size_of(input, anchor)?;
    let (size, rect) = size_of(input, neighbor)?;

    let anchor_w = i64::from(anchor_size.width);
    let anchor_h = i64::from(anchor_size.height);
    let w = i64::from(size.width);
    let h = i64::from(size.height);

    let horizontal_span = |offset| {
        align(
            Span::new(rect.left(), rect.right()),
            Span::new(anchor_rect.left(), anchor_rect.right()),
            anchor_w,
            offset,
            w,
        )
    };
    let vertical_span = |offset| {
        align(
            Span::new(rect.top(), rect.bottom()),
            Span::new(anchor_rect.top(), anchor_rect.bottom()),
            anchor_h,
            offset,
            h,
        )
    };

    Ok(match direction {
        Direction::Left => (offset_x - w, vertical_span(offset_y)),
        Direction::Right => (offset_x + anchor_w, vertical_span(offset_y)),
        Direction::Top => (horizontal_span(offset_x), offset_y - h),
        Direction::Bottom => (horizontal_span(offset_x), offset_y + anchor_h),
    })
}

/// Position of a display that touches nothing
///
/// Keeps the recorded offset from the placed display whose rectangle centre
/// is closest. If that lands on a placed display, it moves right of the
/// whole placed set instead.
fn place_isolated(
    input: &LayoutInput<'_>,
    placed: &BTreeMap<String, (i64, i64)>,
    name: &str,
) -> Result<(i64, i64), LayoutError> {
    let (size, rect) = size_of(input, name)?;
    let (cx, cy) = center(&rect);

    let nearest = placed
        .iter()
        .filter_map(|(other, pos)| input.rects.get(other).map(|r| (r, *pos)))
        .min_by_key(|(r, _)| {
            let (ox, oy) = center(r);
            (ox - cx)
                .saturating_pow(2)
                .saturating_add((oy - cy).saturating_pow(2))
        });
    let Some((anchor_rect, (ax, ay))) = nearest else {
        return Ok((0, 0));
    };

    let x = ax + i64::from(rect.x) - i64::from(anchor_rect.x);
    let y = ay + i64::from(rect.y) - i64::from(anchor_rect.y);
    let (w, h) = (i64::from(size.width), i64::from(size.height));

    let footprints: Vec<(i64, i64, i64, i64)> = placed
        .iter()
        .filter_map(|(other, &(ox, oy))| {
            input.sizes.get(other).map(|s| {
                (ox, oy, ox + i64::from(s.width), oy + i64::from(s.height))
            })
        })
        .collect();

    let collides = footprints
        .iter()
        .any(|&(l, t, r, b)| l < x + w && r > x && t < y + h && b > y);
    if !collides {
        return Ok((x, y));
    }

    let right = footprints.iter().map(|f| f.2).max().unwrap_or(0);
    trace!("{} collides at {},{}, moving to x {}", name, x, y, right);
    Ok((right, y))
}

fn center(rect: &Rect) -> (i64, i64) {
    (
        i64::from(rect.x) + i64::from(rect.width) / 2,
        i64::from(rect.y) + i64::from(rect.height) / 2,
    )
}

#[derive(Debug, Clone, Copy)]
struct Span {
    lo: i64,
    hi: i64,
}

impl Span {
    fn new(lo: i32, hi: i32) -> Self {
        Self {
            lo: i64::from(lo),
            hi: i64::from(hi),
        }
    }
}

/// Cross-axis coordinate of a display relative to its anchor
///
/// `offset` is the anchor's new coordinate, `anchor_logical` and `logical`
/// the new sizes along this axis.
fn align(display: Span, anchor: Span, anchor_logical: i64, offset: i64, logical: i64) -> i64 {
    if anchor.lo == display.lo {
        return offset;
    }
    if anchor.hi == display.hi {
        return offset + anchor_logical - logical;
    }

    let span_range = (anchor.hi - anchor.lo) + (display.hi - display.lo);
    if span_range == 0 {
        return offset;
    }

    let span = (anchor.hi - display.lo) as f64;
    let new_span_range = (anchor_logical + logical) as f64;
    let new_span = span * (new_span_range / span_range as f64);

    let new_anchor_hi = (anchor.lo + offset + anchor_logical) as f64;
    (new_anchor_hi - new_span).trunc() as i64 - anchor.lo
}

fn normalize(placed: BTreeMap<String, (i64, i64)>) -> Layout {
    let min_x = placed.values().map(|p| p.0).min().unwrap_or(0);
    let min_y = placed.values().map(|p| p.1).min().unwrap_or(0);

    let positions = placed
        .into_iter()
        .map(|(name, (x, y))| {
            let x = i32::try_from(x - min_x).unwrap_or(i32::MAX);
            let y = i32::try_from(y - min_y).unwrap_or(i32::MAX);
            (name, Position { x, y })
        })
        .collect();

    Layout { positions }
}
