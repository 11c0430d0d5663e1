//! The puzzle collection itself: one [`Backend`](parlor_engine::Backend)
//! implementation per game.
//!
//! Each module is self-contained. Shared machinery lives in
//! `parlor-engine` (session control, input, drawing) and `parlor-core`
//! (randomness, union-find, codecs); the only thing the games share
//! here is the default background colour their palettes are derived
//! from.

use parlor_engine::Rgb;

pub mod bridges;
pub mod dominosa;
pub mod guess;
pub mod loopy;
pub mod mosaic;
pub mod sokoban;
pub mod untangle;

/// The light grey every game's palette starts from, standing in for the
/// frontend-supplied window background.
pub(crate) const DEFAULT_BACKGROUND: Rgb = [0.8, 0.8, 0.8];
