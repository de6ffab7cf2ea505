//! Adjacency Graph Builder
//!
//! Finds, for every display rectangle, which other rectangles touch it and
//! on which side. Edges come from exact edge-coordinate matches with a
//! strictly overlapping perpendicular span. A display with no touching
//! neighbour gets a single edge to the nearest display whose perpendicular
//! span overlaps (inclusively); horizontal distances are weighted by 9/16
//! so vertical neighbours win comparable ties, matching how the compositor
//! itself arranges monitors.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Side of the anchor display on which the neighbour sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Top,
    Bottom,
}

impl Direction {
    /// Opposite side
    pub fn inverse(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
        }
    }

    /// Left or right
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        };
        f.write_str(s)
    }
}

/// Display rectangle in the coordinate space it was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add_unsigned(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add_unsigned(self.height)
    }

    fn overlaps_vertically(&self, other: &Rect) -> bool {
        other.top() < self.bottom() && other.bottom() > self.top()
    }

    fn overlaps_horizontally(&self, other: &Rect) -> bool {
        other.left() < self.right() && other.right() > self.left()
    }
}

/// One adjacency: `neighbor` lies on `direction` side of the owning display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub neighbor: String,
    pub direction: Direction,
}

/// Directed adjacency lists keyed by connector name
///
/// Displays without any edge are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdjacencyGraph {
    edges: BTreeMap<String, Vec<Edge>>,
}

impl AdjacencyGraph {
    /// Edges leaving `name`
    pub fn edges(&self, name: &str) -> &[Edge] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Displays with at least one edge, in connector order
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// All edges as (anchor, edge), in connector order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Edge)> {
        self.edges
            .iter()
            .flat_map(|(anchor, edges)| edges.iter().map(move |e| (anchor.as_str(), e)))
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Add an edge from `anchor`
    pub fn insert(&mut self, anchor: &str, neighbor: &str, direction: Direction) {
        self.edges.entry(anchor.to_string()).or_default().push(Edge {
            neighbor: neighbor.to_string(),
            direction,
        });
    }

    /// Whether `anchor` has `neighbor` on `direction`
    pub fn has_edge(&self, anchor: &str, neighbor: &str, direction: Direction) -> bool {
        self.edges(anchor)
            .iter()
            .any(|e| e.neighbor == neighbor && e.direction == direction)
    }
}

/// Edge coordinate → displays having that coordinate
#[derive(Default)]
struct EdgeIndex<'a> {
    left: HashMap<i32, Vec<&'a str>>,
    right: HashMap<i32, Vec<&'a str>>,
    top: HashMap<i32, Vec<&'a str>>,
    bottom: HashMap<i32, Vec<&'a str>>,
}

impl<'a> EdgeIndex<'a> {
    fn new(rects: &'a BTreeMap<String, Rect>) -> Self {
        let mut index = Self::default();
        for (name, r) in rects {
            index.left.entry(r.left()).or_default().push(name);
            index.right.entry(r.right()).or_default().push(name);
            index.top.entry(r.top()).or_default().push(name);
            index.bottom.entry(r.bottom()).or_default().push(name);
        }
        index
    }
}

/// Build the adjacency graph over `rects`
///
/// Callers pass only the displays that take part in the layout; suppressed
/// panels must already be filtered out.
pub fn build_graph(rects: &BTreeMap<String, Rect>) -> AdjacencyGraph {
    let index = EdgeIndex::new(rects);
    let mut graph = AdjacencyGraph::default();

    for (name, rect) in rects {
        let mut edges = touching(name, rect, rects, &index);
        if edges.is_empty() {
            edges.extend(nearest(name, rect, rects));
        }
        if !edges.is_empty() {
            graph.edges.insert(name.clone(), edges);
        }
    }

    graph
}

fn touching(
    name: &str,
    rect: &Rect,
    rects: &BTreeMap<String, Rect>,
    index: &EdgeIndex<'_>,
) -> Vec<Edge> {
    let mut edges = Vec::new();

    let mut collect = |candidates: Option<&Vec<&str>>, direction: Direction| {
        for &other in candidates.into_iter().flatten() {
            if other == name {
                continue;
            }
            let other_rect = &rects[other];
            let overlaps = if direction.is_horizontal() {
                rect.overlaps_vertically(other_rect)
            } else {
                rect.overlaps_horizontally(other_rect)
            };
            if overlaps {
                edges.push(Edge {
                    neighbor: other.to_string(),
                    direction,
                });
            }
        }
    };

    collect(index.right.get(&rect.left()), Direction::Left);
    collect(index.left.get(&rect.right()), Direction::Right);
    collect(index.bottom.get(&rect.top()), Direction::Top);
    collect(index.top.get(&rect.bottom()), Direction::Bottom);

    edges
}

/// Signed distance with the smaller magnitude; ties go to `a`
fn closer(a: i64, b: i64) -> (i64, bool) {
    if a.abs() <= b.abs() {
        (a, true)
    } else {
        (b, false)
    }
}

fn nearest(name: &str, rect: &Rect, rects: &BTreeMap<String, Rect>) -> Option<Edge> {
    let mut best: Option<(i64, &str, Direction)> = None;

    for (other, near) in rects {
        if other == name {
            continue;
        }

        let candidate = if near.left() <= rect.right() && near.right() >= rect.left() {
            let below = i64::from(near.top()) - i64::from(rect.bottom());
            let above = i64::from(rect.top()) - i64::from(near.bottom());
            let (distance, is_below) = closer(below, above);
            let direction = if is_below {
                Direction::Bottom
            } else {
                Direction::Top
            };
            Some((distance, direction))
        } else if near.top() <= rect.bottom() && near.bottom() >= rect.top() {
            let right = i64::from(near.left()) - i64::from(rect.right());
            let left = i64::from(rect.left()) - i64::from(near.right());
            let (distance, is_right) = closer(right, left);
            let direction = if is_right {
                Direction::Right
            } else {
                Direction::Left
            };
            // Truncates toward zero
            Some((distance * 9 / 16, direction))
        } else {
            None
        };

        if let Some((distance, direction)) = candidate {
            let better = best.map_or(true, |(d, _, _)| distance.abs() < d.abs());
            if better {
                best = Some((distance, other.as_str(), direction));
            }
        }
    }

    best.map(|(_, neighbor, direction)| Edge {
        neighbor: neighbor.to_string(),
        direction,
    })
}
