//! Shared combinatorial primitives for the parlor puzzle collection.
//!
//! Everything in this crate is puzzle-agnostic: disjoint-set forests (plain
//! and parity-tracking), Tarjan-style bridge finding, a deterministic seeded
//! random stream, the keyless bitmap obfuscation used to hide solver oracles
//! inside game descriptions, and a hex codec for the save-file format.

pub mod dsf;
pub mod findloop;
pub mod hex;
pub mod obfuscate;
pub mod random;

pub use dsf::{Dsf, Edsf, EdsfContradiction};
pub use findloop::LoopFinder;
pub use hex::{HexError, bin_to_hex, hex_to_bin};
pub use obfuscate::obfuscate_bitmap;
pub use random::RandomState;
