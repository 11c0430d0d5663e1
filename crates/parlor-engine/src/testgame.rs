//! A deliberately tiny backend for exercising the session controller.
//!
//! The "puzzle" is a counter: the description is the starting value,
//! `+` moves increment it, and the game is solved when it reaches the
//! target parameter. Every operation is deterministic, which makes
//! history, serialisation and input-normalisation behaviour easy to
//! assert on.

use parlor_core::RandomState;

use crate::backend::{
    Backend, ConfigItem, ConfigValue, DescError, MoveIntent, MoveResult, ParamsError,
    SolveError, Status,
};
use crate::buttons::Button;
use crate::drawing::{Draw, Rgb};

pub(crate) struct Tally;

#[derive(Debug, Clone)]
pub(crate) struct TallyParams {
    pub(crate) target: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct TallyState {
    pub(crate) count: i32,
    pub(crate) target: i32,
}

#[derive(Debug, Default)]
pub(crate) struct TallyUi {
    /// Bumped by every changed_state notification.
    pub(crate) changes: u32,
}

#[derive(Debug, Default)]
pub(crate) struct TallyDraw {
    pub(crate) tilesize: i32,
}

impl Backend for Tally {
    type Params = TallyParams;
    type State = TallyState;
    type Ui = TallyUi;
    type DrawState = TallyDraw;

    const NAME: &'static str = "Tally";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = true;
    const CAN_FORMAT_AS_TEXT: bool = true;
    const WANTS_STATUSBAR: bool = false;
    const IS_TIMED: bool = false;
    const PREFERRED_TILESIZE: i32 = 16;

    fn default_params() -> TallyParams {
        TallyParams { target: 5 }
    }

    fn presets() -> Vec<(String, TallyParams)> {
        vec![
            ("Short".to_owned(), TallyParams { target: 3 }),
            ("Long".to_owned(), TallyParams { target: 9 }),
        ]
    }

    fn decode_params(params: &mut TallyParams, string: &str) {
        let digits: String = string.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(target) = digits.parse() {
            params.target = target;
        }
    }

    fn encode_params(params: &TallyParams, _full: bool) -> String {
        format!("{}", params.target)
    }

    fn configure(params: &TallyParams) -> Vec<ConfigItem> {
        vec![ConfigItem {
            name: "Target".to_owned(),
            value: ConfigValue::String(format!("{}", params.target)),
        }]
    }

    fn custom_params(cfg: &[ConfigItem]) -> TallyParams {
        let target = match cfg.first().map(|item| &item.value) {
            Some(ConfigValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        TallyParams { target }
    }

    fn validate_params(params: &TallyParams, _full: bool) -> Result<(), ParamsError> {
        if (1..=99).contains(&params.target) {
            Ok(())
        } else {
            Err(ParamsError::new("Target must be between 1 and 99"))
        }
    }

    fn new_desc(
        params: &TallyParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start = rs.upto(params.target as usize) as i32;
        (format!("{start}"), Some(format!("{}", params.target)))
    }

    fn validate_desc(params: &TallyParams, desc: &str) -> Result<(), DescError> {
        match desc.parse::<i32>() {
            Ok(n) if (0..=params.target).contains(&n) => Ok(()),
            _ => Err(DescError::new("Expected a starting count")),
        }
    }

    fn new_game(params: &TallyParams, desc: &str) -> TallyState {
        TallyState {
            count: desc.parse().unwrap_or(0),
            target: params.target,
        }
    }

    fn solve(
        _origstate: &TallyState,
        currstate: &TallyState,
        aux: Option<&str>,
    ) -> Result<String, SolveError> {
        let target = match aux {
            Some(aux) => aux
                .parse()
                .map_err(|_| SolveError::new("Solution not known for this puzzle"))?,
            None => currstate.target,
        };
        Ok(format!("j{target}"))
    }

    fn text_format(state: &TallyState) -> String {
        format!("{}/{}", state.count, state.target)
    }

    fn new_ui(_state: &TallyState) -> TallyUi {
        TallyUi::default()
    }

    fn changed_state(ui: &mut TallyUi, _oldstate: &TallyState, _newstate: &TallyState) {
        ui.changes += 1;
    }

    fn interpret_move(
        _state: &TallyState,
        _ui: &mut TallyUi,
        _ds: &TallyDraw,
        _x: i32,
        _y: i32,
        button: Button,
    ) -> MoveIntent {
        match button {
            Button::Char('+') | Button::CursorSelect | Button::Release(_) => {
                MoveIntent::Move("+".to_owned())
            }
            Button::Char('\u{8}') => MoveIntent::Move("j0".to_owned()),
            Button::Char('z') | Button::Down(_) => MoveIntent::Redraw,
            _ => MoveIntent::Ignored,
        }
    }

    fn execute_move(state: &TallyState, movestr: &str) -> MoveResult<TallyState> {
        if movestr == "+" {
            if state.count >= state.target {
                return MoveResult::Unchanged;
            }
            return MoveResult::Changed(TallyState {
                count: state.count + 1,
                ..*state
            });
        }
        if let Some(rest) = movestr.strip_prefix('j') {
            if let Ok(n) = rest.parse::<i32>() {
                if (0..=state.target).contains(&n) {
                    return MoveResult::Changed(TallyState { count: n, ..*state });
                }
            }
        }
        MoveResult::Invalid
    }

    fn compute_size(_params: &TallyParams, tilesize: i32) -> (i32, i32) {
        (tilesize * 8, tilesize * 8)
    }

    fn set_size(ds: &mut TallyDraw, _params: &TallyParams, tilesize: i32) {
        ds.tilesize = tilesize;
    }

    fn colours() -> Vec<Rgb> {
        vec![[1.0, 1.0, 1.0], [0.0, 0.0, 0.0]]
    }

    fn new_drawstate(_state: &TallyState) -> TallyDraw {
        TallyDraw::default()
    }

    fn redraw(
        _draw: &mut Draw,
        _ds: &mut TallyDraw,
        _oldstate: Option<&TallyState>,
        _state: &TallyState,
        _dir: i32,
        _ui: &TallyUi,
        _anim_time: f32,
        _flash_time: f32,
    ) {
    }

    fn flash_length(
        oldstate: &TallyState,
        newstate: &TallyState,
        dir: i32,
        _ui: &TallyUi,
    ) -> f32 {
        if dir > 0 && oldstate.count < oldstate.target && newstate.count == newstate.target {
            0.1
        } else {
            0.0
        }
    }

    fn status(state: &TallyState) -> Status {
        if state.count == state.target {
            Status::Solved
        } else {
            Status::Active
        }
    }
}
