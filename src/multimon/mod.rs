//! Multi-Monitor Layout
//!
//! Computes a non-overlapping logical arrangement for mixed-DPI displays.
//!
//! # Overview
//!
//! Displays are recorded at physical resolution (in the persisted layout
//! store, or by the X server). Once a high-density display is scaled 2x its
//! logical footprint halves, so positions recorded for the physical sizes
//! would leave gaps or overlaps. This module keeps the user's arrangement
//! (who is left of whom, which edges are aligned) and recomputes the
//! coordinates at logical sizes.
//!
//! # Pipeline
//!
//! ```text
//! rectangles ──> build_graph ──> AdjacencyGraph ──> LayoutCalculator ──> Layout
//!                                                     ^
//!                               logical sizes ────────┘
//! ```
//!
//! 1. [`build_graph`] finds touching neighbours per display, with a
//!    nearest-neighbour fallback for displays that touch nothing.
//! 2. [`LayoutCalculator`] seeds one display at the origin and places
//!    neighbours edge to edge, keeping aligned edges aligned. Displays
//!    with no neighbour at all keep their recorded offset from the nearest
//!    placed display.
//! 3. The result is shifted so all coordinates are non-negative.
//!
//! # Example
//!
//! ```text
//!  recorded (physical)                 logical (eDP-1 at 2x)
//! ┌────────────┬────────┐             ┌──────┬────────┐
//! │ eDP-1      │ HDMI-1 │             │eDP-1 │ HDMI-1 │
//! │ 3200x1800  │1920x   │     ──>     │1600x │1920x   │
//! │ (0,0)      │1080    │             │900   │1080    │
//! │            │(3200,0)│             └──────┤(1600,0)│
//! └────────────┴────────┘                    └────────┘
//! ```

mod graph;
mod layout;

pub use graph::{build_graph, AdjacencyGraph, Direction, Edge, Rect};
pub use layout::{Layout, LayoutCalculator, LayoutError, LayoutInput, LogicalSize, Position};
