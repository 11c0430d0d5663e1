//! Planar grid construction for the parlor puzzle collection.
//!
//! A [`Grid`] is a doubly linked mesh of dots, edges and faces on which
//! the loop puzzles play. This crate builds grids in seventeen tilings,
//! from the periodic lattices up through Penrose and hat aperiodic
//! tilings (which carry a coordinate description so a game seed can be
//! reconstructed), and provides a uniform random closed-loop generator
//! that works on any of them.

pub mod grid;
mod hats;
pub mod loopgen;
mod penrose;
pub mod tilings;

pub use grid::{Dot, Edge, Face, Grid, GridBuilder, GridError};
pub use loopgen::{FaceColour, LoopgenBias, generate_loop};
pub use tilings::{GridSize, GridType};
