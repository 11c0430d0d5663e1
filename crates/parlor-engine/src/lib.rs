//! The puzzle-independent session engine.
//!
//! A frontend constructs a [`Midend`] over any [`Backend`]
//! implementation and gets, for free: deterministic seeded game
//! generation, an undo/redo history of immutable states, input
//! normalisation, animation and completion-flash timing, a drawing
//! façade with a status-bar cache, and a replay-validated save-file
//! format ([`Midend::serialise`] / [`Midend::deserialise`]).
//!
//! Backends live elsewhere; this crate only defines the contract
//! between them and the controller.

pub mod backend;
pub mod buttons;
pub mod drawing;
pub mod midend;
pub mod serialise;
#[cfg(test)]
pub(crate) mod testgame;

pub use backend::{
    Backend, BackendFlags, ConfigItem, ConfigValue, DescError, GameKind, MoveIntent,
    MoveResult, ParamsError, SolveError, Status,
};
pub use buttons::{Button, MouseButton, move_cursor};
pub use drawing::{
    BlitterId, ColourIndex, Draw, DrawApi, FontType, HAlign, NullDraw, Rgb, VAlign,
    mkhighlight,
};
pub use midend::{Midend, MidendError, Preset};
pub use serialise::{SaveError, identify_game};
