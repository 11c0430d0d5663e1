//! The contract every puzzle implements.
//!
//! A backend is a stateless bundle of operations over four associated
//! types: the shape parameters, the playable state, the transient
//! interaction ui, and the renderer's scratch drawstate. The session
//! controller ([`Midend`](crate::midend::Midend)) drives any backend
//! purely through this trait.

use bitflags::bitflags;
use derive_more::{Display, Error};
use parlor_core::RandomState;

use crate::buttons::{Button, MouseButton};
use crate::drawing::{Draw, Rgb};

/// A parameter combination the backend rejects, with the message shown
/// to the player.
#[derive(Debug, Clone, Display, Error)]
#[display("{message}")]
pub struct ParamsError {
    /// Human-readable reason.
    #[error(not(source))]
    pub message: String,
}

impl ParamsError {
    /// Convenience constructor.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A game description the backend rejects.
#[derive(Debug, Clone, Display, Error)]
#[display("{message}")]
pub struct DescError {
    /// Human-readable reason.
    #[error(not(source))]
    pub message: String,
}

impl DescError {
    /// Convenience constructor.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a solve request produced no move.
#[derive(Debug, Clone, Display, Error)]
#[display("{message}")]
pub struct SolveError {
    /// Human-readable reason, e.g. "Solution not known for this puzzle".
    #[error(not(source))]
    pub message: String,
}

impl SolveError {
    /// Convenience constructor.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One field of a backend's configuration dialog schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigItem {
    /// Display label.
    pub name: String,
    /// The field's type and current value.
    pub value: ConfigValue,
}

/// The value half of a [`ConfigItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Free-form text.
    String(String),
    /// On/off.
    Boolean(bool),
    /// One choice from a fixed list.
    Choices {
        /// The display names of the options.
        options: Vec<String>,
        /// Index of the selected option.
        selected: usize,
    },
}

/// What a backend's move interpreter wants done with an input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveIntent {
    /// The event means nothing; drop it silently.
    Ignored,
    /// Only the ui changed; redraw without recording a move.
    Redraw,
    /// Commit this move string through the executor.
    Move(String),
}

/// Result of executing a move string against a state.
#[derive(Debug, Clone)]
pub enum MoveResult<S> {
    /// The move string was not valid in this state.
    Invalid,
    /// The move affected only presentation; the state is unchanged and
    /// nothing is recorded in the history.
    Unchanged,
    /// The move produced a new state.
    Changed(S),
}

/// Win/lose report for the status bar and frontends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The game has been lost and play is over.
    Lost,
    /// Play continues.
    Active,
    /// The game has been won.
    Solved,
}

bitflags! {
    /// Static behaviour flags a backend exposes to the session
    /// controller. The low nine bits form the mouse-button priority
    /// table (see [`BackendFlags::button_beats`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BackendFlags: u32 {
        /// The solve move should run the move animation rather than
        /// jumping straight to the solved position.
        const SOLVE_ANIMATES = 1 << 9;
        /// The puzzle is unplayable without a right-button equivalent.
        const REQUIRE_RBUTTON = 1 << 10;
    }
}

impl BackendFlags {
    /// The flag meaning "when `held` is already down and `pressed`
    /// arrives, keep `held` and swallow `pressed`".
    #[must_use]
    pub fn button_beats(held: MouseButton, pressed: MouseButton) -> Self {
        Self::from_bits_retain(1 << (held.index() * 3 + pressed.index()))
    }
}

/// The operations a puzzle supplies. All methods are associated
/// functions: a backend carries no instance data, exactly like a table
/// of per-game entry points.
///
/// `dup`/`free` pairs of the contract are subsumed by `Clone` and `Drop`
/// on the associated types.
pub trait Backend: 'static {
    /// Shape knobs: dimensions, difficulty, variants.
    type Params: Clone + std::fmt::Debug;
    /// The full playable position.
    type State: Clone;
    /// Transient interaction state (cursor, drag origin). Not rolled
    /// back by undo.
    type Ui;
    /// Renderer scratch, never consulted by game logic.
    type DrawState;

    /// The puzzle's display name; also keys save files and environment
    /// overrides.
    const NAME: &'static str;
    /// Whether the custom-parameters dialog is offered.
    const CAN_CONFIGURE: bool;
    /// Whether [`Backend::solve`] can ever produce a move.
    const CAN_SOLVE: bool;
    /// Whether any parameter set supports text formatting.
    const CAN_FORMAT_AS_TEXT: bool;
    /// Whether the frontend should show a status bar.
    const WANTS_STATUSBAR: bool;
    /// Whether play time is tracked and shown.
    const IS_TIMED: bool;
    /// Tile size the puzzle looks best at.
    const PREFERRED_TILESIZE: i32;

    /// Static behaviour flags.
    #[must_use]
    fn flags() -> BackendFlags {
        BackendFlags::empty()
    }

    /// The parameters used when nothing else is specified.
    fn default_params() -> Self::Params;

    /// The preset menu: finite list of (display name, params).
    fn presets() -> Vec<(String, Self::Params)>;

    /// Decodes an encoded parameter string over the top of `params`.
    /// Lenient: unrecognised trailing content is ignored so a desc or
    /// seed suffix can follow.
    fn decode_params(params: &mut Self::Params, string: &str);

    /// Encodes parameters as a printable string. With `full` set the
    /// encoding includes play-time-only knobs; without it only the
    /// fields that affect generated puzzles.
    fn encode_params(params: &Self::Params, full: bool) -> String;

    /// The configuration dialog schema for these parameters.
    fn configure(params: &Self::Params) -> Vec<ConfigItem>;

    /// Reads a parameter set back out of filled-in dialog fields.
    fn custom_params(cfg: &[ConfigItem]) -> Self::Params;

    /// Checks a parameter combination. `full`-mode validation also
    /// checks the play-time-only knobs.
    fn validate_params(params: &Self::Params, full: bool) -> Result<(), ParamsError>;

    /// Generates a fresh puzzle, returning its description and an
    /// optional solver hint (aux). Must terminate; may retry internally.
    /// `interactive` is false during bulk generation.
    fn new_desc(
        params: &Self::Params,
        rs: &mut RandomState,
        interactive: bool,
    ) -> (String, Option<String>);

    /// Checks a description against these parameters without building a
    /// state.
    fn validate_desc(params: &Self::Params, desc: &str) -> Result<(), DescError>;

    /// Builds the initial state from a validated description.
    fn new_game(params: &Self::Params, desc: &str) -> Self::State;

    /// Produces a move string leading from `currstate` to a solved
    /// position, using `aux` when clues alone are not enough.
    /// Implementations exist only when [`Backend::CAN_SOLVE`] is set.
    fn solve(
        origstate: &Self::State,
        currstate: &Self::State,
        aux: Option<&str>,
    ) -> Result<String, SolveError> {
        let _ = (origstate, currstate, aux);
        Err(SolveError::new("This game does not support the Solve operation"))
    }

    /// Whether these specific parameters can be text-formatted.
    #[must_use]
    fn can_format_as_text_now(params: &Self::Params) -> bool {
        let _ = params;
        Self::CAN_FORMAT_AS_TEXT
    }

    /// Renders a state as multi-line text.
    #[must_use]
    fn text_format(state: &Self::State) -> String {
        let _ = state;
        String::new()
    }

    /// Fresh interaction state for a new game.
    fn new_ui(state: &Self::State) -> Self::Ui;

    /// Encodes the ui for serialisation. Empty means nothing to save.
    #[must_use]
    fn encode_ui(ui: &Self::Ui) -> String {
        let _ = ui;
        String::new()
    }

    /// Restores ui fields from an encoding produced by
    /// [`Backend::encode_ui`]. Unknown content is ignored.
    fn decode_ui(ui: &mut Self::Ui, encoding: &str) {
        let _ = (ui, encoding);
    }

    /// Notifies the ui that the displayed state changed (move, undo,
    /// redo or restart).
    fn changed_state(ui: &mut Self::Ui, oldstate: &Self::State, newstate: &Self::State) {
        let _ = (ui, oldstate, newstate);
    }

    /// Translates one normalised input event into a move intent.
    fn interpret_move(
        state: &Self::State,
        ui: &mut Self::Ui,
        ds: &Self::DrawState,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent;

    /// Applies a move string. Rejecting it is a hard "this move is not
    /// valid here", not an error condition.
    fn execute_move(state: &Self::State, movestr: &str) -> MoveResult<Self::State>;

    /// Pixel extents of the playing area at a tile size.
    fn compute_size(params: &Self::Params, tilesize: i32) -> (i32, i32);

    /// Informs the drawstate of the tile size chosen by the frontend.
    fn set_size(ds: &mut Self::DrawState, params: &Self::Params, tilesize: i32);

    /// The palette, indexed by the colour constants the backend's
    /// redraw uses.
    fn colours() -> Vec<Rgb>;

    /// Fresh renderer scratch for a new game.
    fn new_drawstate(state: &Self::State) -> Self::DrawState;

    /// Redraws the current position. During an animated transition
    /// `oldstate` is the state being left and `anim_time` the progress
    /// through [`Backend::anim_length`]; `flash_time` likewise tracks a
    /// completion flash.
    #[allow(clippy::too_many_arguments)]
    fn redraw(
        draw: &mut Draw,
        ds: &mut Self::DrawState,
        oldstate: Option<&Self::State>,
        state: &Self::State,
        dir: i32,
        ui: &Self::Ui,
        anim_time: f32,
        flash_time: f32,
    );

    /// Seconds of animation for a transition; 0 for none.
    #[must_use]
    fn anim_length(
        oldstate: &Self::State,
        newstate: &Self::State,
        dir: i32,
        ui: &Self::Ui,
    ) -> f32 {
        let _ = (oldstate, newstate, dir, ui);
        0.0
    }

    /// Seconds of completion flash for a transition; 0 for none.
    #[must_use]
    fn flash_length(
        oldstate: &Self::State,
        newstate: &Self::State,
        dir: i32,
        ui: &Self::Ui,
    ) -> f32 {
        let _ = (oldstate, newstate, dir, ui);
        0.0
    }

    /// Win/lose report for this state.
    fn status(state: &Self::State) -> Status;

    /// Whether the clock should run in this state. Only consulted for
    /// timed backends.
    #[must_use]
    fn timing_state(state: &Self::State, ui: &Self::Ui) -> bool {
        let _ = (state, ui);
        true
    }
}

/// The closed set of puzzles in the collection, for frontends that
/// select a backend at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameKind {
    /// Island bridge-building.
    Bridges,
    /// Domino placement on a number grid.
    Dominosa,
    /// Mastermind.
    Guess,
    /// Loop-the-loop on arbitrary planar grids.
    Loopy,
    /// 3x3 neighbourhood counts.
    Mosaic,
    /// Planar graph untangling.
    Untangle,
    /// Barrel pushing.
    Sokoban,
}

impl GameKind {
    /// All puzzles, in menu order.
    pub const ALL: [Self; 7] = [
        Self::Bridges,
        Self::Dominosa,
        Self::Guess,
        Self::Loopy,
        Self::Mosaic,
        Self::Untangle,
        Self::Sokoban,
    ];

    /// The puzzle's display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bridges => "Bridges",
            Self::Dominosa => "Dominosa",
            Self::Guess => "Guess",
            Self::Loopy => "Loopy",
            Self::Mosaic => "Mosaic",
            Self::Untangle => "Untangle",
            Self::Sokoban => "Sokoban",
        }
    }

    /// Looks a puzzle up by its display name, as recorded in save
    /// files. Case-sensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_priority_flags_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for held in MouseButton::ALL {
            for pressed in MouseButton::ALL {
                assert!(seen.insert(BackendFlags::button_beats(held, pressed).bits()));
            }
        }
        assert!(
            !BackendFlags::SOLVE_ANIMATES
                .intersects(BackendFlags::button_beats(MouseButton::Right, MouseButton::Right))
        );
    }

    #[test]
    fn game_names_round_trip() {
        for kind in GameKind::ALL {
            assert_eq!(GameKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(GameKind::from_name("Mines"), None);
    }
}
