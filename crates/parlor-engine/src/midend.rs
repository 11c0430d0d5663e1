//! The session controller sitting between a frontend and one puzzle
//! backend.
//!
//! A [`Midend`] owns the move-history stack, generates new games from
//! seeded randomness, normalises input events, drives animation and
//! flash timing, and (in `serialise`) reads and writes save files. The
//! frontend never talks to a backend directly.

use derive_more::{Display, Error, From};
use log::warn;
use parlor_core::RandomState;

use crate::backend::{
    Backend, BackendFlags, ConfigItem, DescError, MoveIntent, MoveResult, ParamsError,
    SolveError, Status,
};
use crate::buttons::{Button, MouseButton};
use crate::drawing::{Draw, DrawApi, Rgb};

/// Everything a session-controller operation can fail with.
#[derive(Debug, Display, Error, From)]
pub enum MidendError {
    /// The backend rejected a parameter combination.
    #[from]
    Params(ParamsError),
    /// The backend rejected a game description.
    #[from]
    Desc(DescError),
    /// The backend's solver gave up.
    #[from]
    Solve(SolveError),
    /// Solve was requested of a backend that cannot solve.
    #[display("This game does not support the Solve operation")]
    SolveUnsupported,
    /// Solve was requested before any game existed.
    #[display("No game set up to solve")]
    NoGame,
    /// The solver produced a move the executor rejected.
    #[display("Solve operation failed")]
    SolveFailed,
    /// A freshly generated puzzle failed its own solve check.
    #[display("Puzzle generation self-test failed: {reason}")]
    SelfTest {
        /// What went wrong.
        #[error(not(source))]
        reason: String,
    },
}

/// How a history entry came to exist. Everything except a plain move is
/// "special": transitions into or out of special entries never flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MoveType {
    NewGame,
    Move,
    Solve,
    Restart,
}

impl MoveType {
    pub(crate) fn is_special(self) -> bool {
        !matches!(self, Self::Move)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StateEntry<S> {
    pub(crate) state: S,
    /// The move that produced this entry; `None` only for the initial
    /// new-game entry.
    pub(crate) movestr: Option<String>,
    pub(crate) movetype: MoveType,
}

/// Where the next new_game call gets its puzzle from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenMode {
    Nothing,
    GotSeed,
    GotDesc,
}

/// One entry of the preset menu.
#[derive(Debug, Clone)]
pub struct Preset<P> {
    /// Menu label.
    pub name: String,
    /// The parameters the entry selects.
    pub params: P,
    /// Canonical full encoding of `params`, used to match the current
    /// parameters back to a menu entry.
    pub encoding: String,
}

/// Environment overrides, read once at construction.
#[derive(Debug, Default)]
struct EnvOverrides {
    presets: Option<String>,
}

/// Builds the canonical environment variable name for a game: uppercased
/// with whitespace stripped, e.g. `Loopy` + `TILESIZE` gives
/// `LOOPY_TILESIZE`.
fn env_var(game: &str, suffix: &str) -> Option<String> {
    let key: String = format!("{game}_{suffix}")
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    std::env::var(key).ok()
}

/// The session controller for one backend.
pub struct Midend<B: Backend> {
    random: RandomState,
    presets: Vec<Preset<B::Params>>,

    pub(crate) desc: Option<String>,
    /// Alternative description used for serialisation when the public
    /// desc has been superseded mid-play.
    pub(crate) privdesc: Option<String>,
    pub(crate) seedstr: Option<String>,
    pub(crate) aux_info: Option<String>,
    pub(crate) genmode: GenMode,

    pub(crate) states: Vec<StateEntry<B::State>>,
    /// Number of live states; the displayed state is
    /// `states[statepos - 1]`. Zero only before the first game.
    pub(crate) statepos: usize,

    pub(crate) params: B::Params,
    pub(crate) curparams: Option<B::Params>,
    pub(crate) drawstate: Option<B::DrawState>,
    pub(crate) ui: Option<B::Ui>,

    pub(crate) oldstate: Option<B::State>,
    pub(crate) anim_time: f32,
    pub(crate) anim_pos: f32,
    pub(crate) flash_time: f32,
    pub(crate) flash_pos: f32,
    pub(crate) dir: i32,

    timing: bool,
    pub(crate) elapsed: f32,
    laststatus: Option<String>,

    pub(crate) drawing: Option<Draw>,
    pub(crate) pressed_mouse_button: Option<MouseButton>,

    preferred_tilesize: i32,
    tilesize: i32,
    winwidth: i32,
    winheight: i32,

    timer_hook: Option<Box<dyn FnMut(bool)>>,
    timer_active: bool,

    env: EnvOverrides,
    colours: Vec<Rgb>,
}

impl<B: Backend> Midend<B> {
    /// Creates a session controller seeded from system entropy. Pass a
    /// drawing implementation for interactive use, or `None` for a
    /// non-interactive controller (bulk generation, headless solving).
    #[must_use]
    pub fn new(drawing: Option<Box<dyn DrawApi>>) -> Self {
        Self::with_seed(drawing, &rand::random::<[u8; 32]>())
    }

    /// As [`Midend::new`], but with an explicit entropy seed so the
    /// whole session is reproducible.
    #[must_use]
    pub fn with_seed(drawing: Option<Box<dyn DrawApi>>, seed: &[u8]) -> Self {
        let mut params = B::default_params();
        if let Some(dflt) = env_var(B::NAME, "DEFAULT") {
            B::decode_params(&mut params, &dflt);
        }

        let mut preferred_tilesize = B::PREFERRED_TILESIZE;
        if let Some(ts) = env_var(B::NAME, "TILESIZE") {
            match ts.trim().parse::<i32>() {
                Ok(ts) if ts > 0 => preferred_tilesize = ts,
                _ => warn!("ignoring bad {} tile-size override {ts:?}", B::NAME),
            }
        }

        let mut colours = B::colours();
        for (i, colour) in colours.iter_mut().enumerate() {
            let Some(hex) = env_var(B::NAME, &format!("COLOUR_{i}")) else {
                continue;
            };
            if hex.len() == 6 {
                if let Ok(rgb) = u32::from_str_radix(&hex, 16) {
                    #[allow(clippy::cast_precision_loss)]
                    {
                        *colour = [
                            ((rgb >> 16) & 0xff) as f32 / 255.0,
                            ((rgb >> 8) & 0xff) as f32 / 255.0,
                            (rgb & 0xff) as f32 / 255.0,
                        ];
                    }
                    continue;
                }
            }
            warn!("ignoring bad {} colour override for entry {i}", B::NAME);
        }

        let env = EnvOverrides {
            presets: env_var(B::NAME, "PRESETS"),
        };

        let mut me = Self {
            random: RandomState::from_seed(seed),
            presets: Vec::new(),
            desc: None,
            privdesc: None,
            seedstr: None,
            aux_info: None,
            genmode: GenMode::Nothing,
            states: Vec::new(),
            statepos: 0,
            params,
            curparams: None,
            drawstate: None,
            ui: None,
            oldstate: None,
            anim_time: 0.0,
            anim_pos: 0.0,
            flash_time: 0.0,
            flash_pos: 0.0,
            dir: 0,
            timing: false,
            elapsed: 0.0,
            laststatus: None,
            drawing: drawing.map(Draw::new),
            pressed_mouse_button: None,
            preferred_tilesize,
            tilesize: 0,
            winwidth: 0,
            winheight: 0,
            timer_hook: None,
            timer_active: false,
            env,
            colours,
        };
        me.build_presets();
        me
    }

    /// Registers the frontend's timer callback: called with `true` to
    /// start delivering [`Midend::timer`] ticks and `false` to stop.
    pub fn set_timer_hook(&mut self, hook: Box<dyn FnMut(bool)>) {
        self.timer_hook = Some(hook);
    }

    // ------------------------------------------------------------------
    // Parameters and presets

    /// Replaces the long-term parameters used for the next new game.
    pub fn set_params(&mut self, params: B::Params) {
        self.params = params;
    }

    /// The current long-term parameters.
    #[must_use]
    pub fn get_params(&self) -> B::Params {
        self.params.clone()
    }

    fn build_presets(&mut self) {
        for (name, params) in B::presets() {
            let encoding = B::encode_params(&params, true);
            self.presets.push(Preset {
                name,
                params,
                encoding,
            });
        }

        // Colon-separated alternating titles and encoded parameter
        // strings, e.g. `LOOPY_PRESETS=Big:12x12t0:Huge:20x20t0`.
        let Some(extra) = self.env.presets.clone() else {
            return;
        };
        let mut fields = extra.split(':');
        while let Some(name) = fields.next() {
            let Some(val) = fields.next() else { break };
            let mut params = B::default_params();
            B::decode_params(&mut params, val);
            if let Err(err) = B::validate_params(&params, true) {
                warn!("dropping {} preset {name:?}: {err}", B::NAME);
                continue;
            }
            let encoding = B::encode_params(&params, true);
            self.presets.push(Preset {
                name: name.to_owned(),
                params,
                encoding,
            });
        }
    }

    /// The preset menu, including any environment-appended entries.
    #[must_use]
    pub fn presets(&self) -> &[Preset<B::Params>] {
        &self.presets
    }

    /// Which preset the current parameters correspond to, if any.
    #[must_use]
    pub fn which_preset(&self) -> Option<usize> {
        let encoding = B::encode_params(&self.params, true);
        self.presets.iter().position(|p| p.encoding == encoding)
    }

    /// The palette, with any environment overrides applied.
    #[must_use]
    pub fn colours(&self) -> &[Rgb] {
        &self.colours
    }

    /// Whether the frontend should show a status bar for this backend.
    #[must_use]
    pub fn wants_statusbar(&self) -> bool {
        B::WANTS_STATUSBAR
    }

    // ------------------------------------------------------------------
    // Game ids

    /// Accepts a game id: `params`, `params#seed` or `params:desc` (the
    /// params prefix may be empty). On success the next
    /// [`Midend::new_game`] uses it.
    pub fn set_game_id(&mut self, id: &str) -> Result<(), MidendError> {
        self.game_id_int(id, false)
    }

    /// Validates a game id without changing anything.
    pub fn validate_game_id(&mut self, id: &str) -> Result<(), MidendError> {
        self.game_id_int(id, true)
    }

    fn game_id_int(&mut self, id: &str, validate_only: bool) -> Result<(), MidendError> {
        let seedpos = id.find('#');
        let descpos = id.find(':');

        let (par, seed, desc) = match (seedpos, descpos) {
            (_, Some(d)) if seedpos.is_none_or(|s| d < s) => {
                (Some(&id[..d]), None, Some(&id[d + 1..]))
            }
            (Some(s), _) => (Some(&id[..s]), Some(&id[s + 1..]), None),
            // `(None, Some(_))` always matches the first arm's guard, so
            // this arm only ever sees `(None, None)`.
            (None, _) => (Some(id), None, None),
        };

        // Nothing in the midend changes until everything has validated.
        let new_params;
        let new_curparams;
        if let Some(par) = par {
            // A descriptive id may underspecify by design; fill the gaps
            // from the current params. A seed id (or a bare params
            // string) must always mean the same thing, so it decodes
            // over the built-in defaults.
            let mut curparams = if desc.is_some() {
                self.params.clone()
            } else {
                B::default_params()
            };
            B::decode_params(&mut curparams, par);
            B::validate_params(&curparams, desc.is_none())?;

            // Only the persistent fields flow into the long-term params,
            // unless the id was nothing but a params string.
            let params = if seed.is_some() || desc.is_some() {
                let mut p = self.params.clone();
                let persistent = B::encode_params(&curparams, false);
                B::decode_params(&mut p, &persistent);
                p
            } else {
                curparams.clone()
            };

            if let Some(d) = desc {
                B::validate_desc(&params, d)?;
            }
            new_params = Some(params);
            new_curparams = Some(curparams);
        } else {
            if let Some(d) = desc {
                B::validate_desc(&self.params, d)?;
            }
            new_params = None;
            new_curparams = None;
        }

        if validate_only {
            return Ok(());
        }

        if let Some(p) = new_params {
            self.params = p;
        }
        if let Some(p) = new_curparams {
            self.curparams = Some(p);
        }

        self.desc = None;
        self.privdesc = None;
        self.seedstr = None;
        if let Some(d) = desc {
            self.desc = Some(d.to_owned());
            self.genmode = GenMode::GotDesc;
            self.aux_info = None;
        }
        if let Some(s) = seed {
            self.seedstr = Some(s.to_owned());
            self.genmode = GenMode::GotSeed;
        }
        Ok(())
    }

    /// The current descriptive game id, `params:desc`.
    #[must_use]
    pub fn get_game_id(&self) -> Option<String> {
        let desc = self.desc.as_deref()?;
        let par = B::encode_params(self.curparams.as_ref().unwrap_or(&self.params), false);
        Some(format!("{par}:{desc}"))
    }

    /// The current seed game id, `params#seed`, if this game came from a
    /// seed.
    #[must_use]
    pub fn get_random_seed(&self) -> Option<String> {
        let seed = self.seedstr.as_deref()?;
        let par = B::encode_params(self.curparams.as_ref().unwrap_or(&self.params), true);
        Some(format!("{par}#{seed}"))
    }

    /// The current parameters, encoded.
    #[must_use]
    pub fn get_current_params(&self, full: bool) -> String {
        B::encode_params(self.curparams.as_ref().unwrap_or(&self.params), full)
    }

    // ------------------------------------------------------------------
    // Configuration dialog plumbing

    /// The configuration schema for the current parameters.
    #[must_use]
    pub fn configure(&self) -> Vec<ConfigItem> {
        B::configure(&self.params)
    }

    /// Applies filled-in configuration fields as the new parameters.
    pub fn set_config(&mut self, cfg: &[ConfigItem]) -> Result<(), MidendError> {
        let params = B::custom_params(cfg);
        B::validate_params(&params, true)?;
        self.params = params;
        Ok(())
    }

    // ------------------------------------------------------------------
    // New game

    /// Starts a new game: from the stored desc or seed if
    /// [`Midend::set_game_id`] supplied one, otherwise freshly generated
    /// under an invented 15-digit seed.
    ///
    /// Freshly generated games are self-tested: if the backend can
    /// solve and produced an aux string, the solver's move must be
    /// accepted by the executor.
    pub fn new_game(&mut self) -> Result<(), MidendError> {
        self.stop_anim();
        self.states.clear();
        self.statepos = 0;
        self.drawstate = None;

        if self.genmode == GenMode::GotDesc {
            self.genmode = GenMode::Nothing;
        } else {
            if self.genmode == GenMode::GotSeed {
                self.genmode = GenMode::Nothing;
            } else {
                self.seedstr = Some(self.random.fresh_seed_string());
                self.curparams = Some(self.params.clone());
            }

            self.desc = None;
            self.privdesc = None;
            self.aux_info = None;

            let seedstr = self.seedstr.clone().unwrap_or_default();
            let mut rs = RandomState::from_seed(seedstr.as_bytes());
            let gen_params = self.curparams.clone().unwrap_or_else(|| self.params.clone());
            // A midend without a drawing layer is doing bulk generation;
            // backends may generate differently (e.g. skip interactive
            // conveniences) when told so.
            let (desc, aux) = B::new_desc(&gen_params, &mut rs, self.drawing.is_some());
            self.desc = Some(desc);
            self.aux_info = aux;
        }

        // Deliberately the less specific of params/curparams: the two
        // must agree on everything that matters after generation, and
        // using the long-term set flushes out backends that fail to
        // encode a play-time parameter.
        let desc = self.desc.clone().unwrap_or_default();
        let state = B::new_game(&self.params, &desc);

        if B::CAN_SOLVE {
            if let Some(aux) = self.aux_info.as_deref() {
                let movestr = B::solve(&state, &state, Some(aux)).map_err(|err| {
                    MidendError::SelfTest {
                        reason: err.to_string(),
                    }
                })?;
                if matches!(B::execute_move(&state, &movestr), MoveResult::Invalid) {
                    return Err(MidendError::SelfTest {
                        reason: "the solver's move was rejected".to_owned(),
                    });
                }
            }
        }

        self.states.push(StateEntry {
            state,
            movestr: None,
            movetype: MoveType::NewGame,
        });
        self.statepos = 1;
        self.drawstate = Some(B::new_drawstate(&self.states[0].state));
        self.size_drawstate();
        self.elapsed = 0.0;
        self.flash_pos = 0.0;
        self.flash_time = 0.0;
        self.anim_pos = 0.0;
        self.anim_time = 0.0;
        self.ui = Some(B::new_ui(&self.states[0].state));
        self.set_timer();
        self.pressed_mouse_button = None;
        self.notify_frontend();
        Ok(())
    }

    /// Pushes a restart entry reconstructed from the game description.
    /// Does nothing when no moves have been made.
    pub fn restart_game(&mut self) {
        if self.statepos <= 1 {
            return;
        }
        let desc = self.desc.clone().unwrap_or_default();
        let state = B::new_game(&self.params, &desc);

        self.stop_anim();
        self.states.truncate(self.statepos);
        self.states.push(StateEntry {
            state,
            movestr: Some(desc),
            movetype: MoveType::Restart,
        });
        self.statepos = self.states.len();
        if let Some(ui) = self.ui.as_mut() {
            B::changed_state(
                ui,
                &self.states[self.statepos - 2].state,
                &self.states[self.statepos - 1].state,
            );
        }
        self.notify_frontend();
        self.flash_pos = 0.0;
        self.flash_time = 0.0;
        self.finish_move();
        self.redraw();
        self.set_timer();
    }

    /// Replaces the game description mid-play. `privdesc`, when given,
    /// is used instead of `desc` to rebuild the initial state on load.
    pub fn supersede_game_desc(&mut self, desc: &str, privdesc: Option<&str>) {
        self.desc = Some(desc.to_owned());
        self.privdesc = privdesc.map(str::to_owned);
    }

    // ------------------------------------------------------------------
    // History

    /// Whether an undo step is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.statepos > 1
    }

    /// Whether a redo step is available.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.statepos < self.states.len()
    }

    /// Steps the displayed state one move back. The ui is notified but
    /// not rolled back.
    pub fn undo(&mut self) -> bool {
        if self.statepos > 1 {
            if let Some(ui) = self.ui.as_mut() {
                B::changed_state(
                    ui,
                    &self.states[self.statepos - 1].state,
                    &self.states[self.statepos - 2].state,
                );
            }
            self.statepos -= 1;
            self.dir = -1;
            self.notify_frontend();
            true
        } else {
            false
        }
    }

    /// Steps the displayed state one move forward.
    pub fn redo(&mut self) -> bool {
        if self.statepos < self.states.len() {
            if let Some(ui) = self.ui.as_mut() {
                B::changed_state(
                    ui,
                    &self.states[self.statepos - 1].state,
                    &self.states[self.statepos].state,
                );
            }
            self.statepos += 1;
            self.dir = 1;
            self.notify_frontend();
            true
        } else {
            false
        }
    }

    /// The state currently displayed.
    #[must_use]
    pub fn current_state(&self) -> Option<&B::State> {
        self.statepos
            .checked_sub(1)
            .map(|i| &self.states[i].state)
    }

    /// Number of states on the history stack.
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Position of the displayed state, counted from 1.
    #[must_use]
    pub fn state_position(&self) -> usize {
        self.statepos
    }

    pub(crate) fn notify_frontend(&mut self) {
        let (can_undo, can_redo) = (self.statepos > 1, self.statepos < self.states.len());
        if let Some(drawing) = self.drawing.as_mut() {
            drawing.api().changed_state(can_undo, can_redo);
        }
    }

    // ------------------------------------------------------------------
    // Solve

    /// Commits a solve move produced by the backend, replacing any redo
    /// tail.
    pub fn solve(&mut self) -> Result<(), MidendError> {
        if !B::CAN_SOLVE {
            return Err(MidendError::SolveUnsupported);
        }
        if self.statepos < 1 {
            return Err(MidendError::NoGame);
        }

        let movestr = B::solve(
            &self.states[0].state,
            &self.states[self.statepos - 1].state,
            self.aux_info.as_deref(),
        )?;
        let state = match B::execute_move(&self.states[self.statepos - 1].state, &movestr) {
            MoveResult::Changed(s) => s,
            MoveResult::Unchanged | MoveResult::Invalid => {
                return Err(MidendError::SolveFailed);
            }
        };

        self.stop_anim();
        self.states.truncate(self.statepos);
        self.states.push(StateEntry {
            state,
            movestr: Some(movestr),
            movetype: MoveType::Solve,
        });
        self.statepos = self.states.len();
        if let Some(ui) = self.ui.as_mut() {
            B::changed_state(
                ui,
                &self.states[self.statepos - 2].state,
                &self.states[self.statepos - 1].state,
            );
        }
        self.notify_frontend();
        self.dir = 1;
        if B::flags().contains(BackendFlags::SOLVE_ANIMATES) {
            self.oldstate = Some(self.states[self.statepos - 2].state.clone());
            self.anim_time = match self.ui.as_ref() {
                Some(ui) => B::anim_length(
                    &self.states[self.statepos - 2].state,
                    &self.states[self.statepos - 1].state,
                    1,
                    ui,
                ),
                None => 0.0,
            };
            self.anim_pos = 0.0;
        } else {
            self.anim_time = 0.0;
            self.finish_move();
        }
        self.redraw();
        self.set_timer();
        Ok(())
    }

    /// Win/lose report for the displayed state. An empty midend counts
    /// as vacuously solved.
    #[must_use]
    pub fn status(&self) -> Status {
        match self.current_state() {
            Some(state) => B::status(state),
            None => Status::Solved,
        }
    }

    /// Whether the displayed state can be rendered as text.
    #[must_use]
    pub fn can_format_as_text_now(&self) -> bool {
        B::CAN_FORMAT_AS_TEXT && B::can_format_as_text_now(&self.params)
    }

    /// The displayed state as multi-line text, if supported.
    #[must_use]
    pub fn text_format(&self) -> Option<String> {
        if self.can_format_as_text_now() {
            self.current_state().map(|s| B::text_format(s))
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Input

    /// Feeds one input event through normalisation and the backend.
    /// Returns false when the event was a quit request.
    ///
    /// Normalisation guarantees backends a sane mouse stream: drags and
    /// releases are retargeted at the held button, a press while a
    /// button is held fabricates the missing release first (unless the
    /// backend's priority table says the held button wins), Return and
    /// Space become the cursor select buttons, and both backspace
    /// characters arrive as `\x08`.
    pub fn process_key(&mut self, x: i32, y: i32, button: Button) -> bool {
        let mut ret = true;
        let mut button = button;

        match button {
            Button::Drag(_) | Button::Release(_) => match self.pressed_mouse_button {
                Some(held) => {
                    button = if matches!(button, Button::Drag(_)) {
                        Button::Drag(held)
                    } else {
                        Button::Release(held)
                    };
                }
                None => return ret,
            },
            Button::Down(pressed) => {
                if let Some(held) = self.pressed_mouse_button {
                    if B::flags().contains(BackendFlags::button_beats(held, pressed)) {
                        return ret;
                    }
                    ret = ret && self.really_process_key(x, y, Button::Release(held));
                }
            }
            _ => {}
        }

        button = match button {
            Button::Char('\n' | '\r') => Button::CursorSelect,
            Button::Char(' ') => Button::CursorSelect2,
            Button::Char('\u{7f}') => Button::Char('\u{8}'),
            other => other,
        };

        ret = ret && self.really_process_key(x, y, button);

        match button {
            Button::Release(_) => self.pressed_mouse_button = None,
            Button::Down(b) => self.pressed_mouse_button = Some(b),
            _ => {}
        }
        ret
    }

    fn really_process_key(&mut self, x: i32, y: i32, button: Button) -> bool {
        if self.statepos == 0 {
            return true;
        }
        let oldstate = self.states[self.statepos - 1].state.clone();
        let mut movetype = MoveType::Move;
        let mut gottype = false;

        let button = match button {
            Button::Char('U' | '\u{1a}' | '\u{1f}') => Button::Char('u'),
            Button::Char('R' | '\u{12}' | '\u{19}') => Button::Char('r'),
            other => other,
        };

        let intent = if matches!(button, Button::Char('u' | 'r')) {
            MoveIntent::Ignored
        } else {
            match (self.ui.as_mut(), self.drawstate.as_ref()) {
                (Some(ui), Some(ds)) => B::interpret_move(
                    &self.states[self.statepos - 1].state,
                    ui,
                    ds,
                    x,
                    y,
                    button,
                ),
                _ => MoveIntent::Ignored,
            }
        };

        match intent {
            MoveIntent::Ignored => match button {
                Button::Char('n' | 'N' | '\u{0e}') => {
                    if let Err(err) = self.new_game() {
                        warn!("new game failed: {err}");
                    }
                    self.redraw();
                    return true; // never animate
                }
                Button::Char('u') => {
                    self.stop_anim();
                    movetype = self.states[self.statepos - 1].movetype;
                    gottype = true;
                    if !self.undo() {
                        return true;
                    }
                }
                Button::Char('r') => {
                    self.stop_anim();
                    if !self.redo() {
                        return true;
                    }
                }
                Button::Char('\u{13}') if B::CAN_SOLVE => {
                    // The solve path arms its own animation.
                    let _ = self.solve();
                    return true;
                }
                Button::Char('q' | 'Q' | '\u{11}') => {
                    return false;
                }
                _ => return true,
            },
            MoveIntent::Redraw => {
                self.redraw();
                self.set_timer();
                return true;
            }
            MoveIntent::Move(movestr) => {
                match B::execute_move(&self.states[self.statepos - 1].state, &movestr) {
                    MoveResult::Invalid => {
                        // The interpreter proposed a move its own
                        // executor rejects; drop it rather than panic.
                        warn!("{} move {movestr:?} was rejected", B::NAME);
                        return true;
                    }
                    MoveResult::Unchanged => {
                        self.redraw();
                        self.set_timer();
                        return true;
                    }
                    MoveResult::Changed(state) => {
                        self.stop_anim();
                        self.states.truncate(self.statepos);
                        self.states.push(StateEntry {
                            state,
                            movestr: Some(movestr),
                            movetype: MoveType::Move,
                        });
                        self.statepos = self.states.len();
                        self.dir = 1;
                        if let Some(ui) = self.ui.as_mut() {
                            B::changed_state(
                                ui,
                                &self.states[self.statepos - 2].state,
                                &self.states[self.statepos - 1].state,
                            );
                        }
                        self.notify_frontend();
                    }
                }
            }
        }

        if !gottype {
            movetype = self.states[self.statepos - 1].movetype;
        }

        let solve_animates = movetype == MoveType::Solve
            && B::flags().contains(BackendFlags::SOLVE_ANIMATES);
        let anim_time = if movetype.is_special() && !solve_animates {
            0.0
        } else {
            match self.ui.as_ref() {
                Some(ui) => B::anim_length(
                    &oldstate,
                    &self.states[self.statepos - 1].state,
                    self.dir,
                    ui,
                ),
                None => 0.0,
            }
        };

        self.oldstate = Some(oldstate);
        if anim_time > 0.0 {
            self.anim_time = anim_time;
        } else {
            self.anim_time = 0.0;
            self.finish_move();
        }
        self.anim_pos = 0.0;
        self.redraw();
        self.set_timer();
        true
    }

    // ------------------------------------------------------------------
    // Animation and timing

    fn finish_move(&mut self) {
        // No flash when the later of the two states is special: that
        // covers forward solve moves and undone restarts alike.
        let eligible = (self.oldstate.is_some() || self.statepos > 1)
            && ((self.dir > 0 && !self.states[self.statepos - 1].movetype.is_special())
                || (self.dir < 0
                    && self.statepos < self.states.len()
                    && !self.states[self.statepos].movetype.is_special()));
        if eligible {
            if let Some(ui) = self.ui.as_ref() {
                let old = self
                    .oldstate
                    .as_ref()
                    .unwrap_or(&self.states[self.statepos - 2].state);
                let dir = if self.oldstate.is_some() { self.dir } else { 1 };
                let flashtime =
                    B::flash_length(old, &self.states[self.statepos - 1].state, dir, ui);
                if flashtime > 0.0 {
                    self.flash_pos = 0.0;
                    self.flash_time = flashtime;
                }
            }
        }

        self.oldstate = None;
        self.anim_pos = 0.0;
        self.anim_time = 0.0;
        self.dir = 0;
        self.set_timer();
    }

    /// Abandons any in-flight animation, jumping to its end state.
    pub fn stop_anim(&mut self) {
        if self.oldstate.is_some() || self.anim_time != 0.0 {
            self.finish_move();
            self.redraw();
        }
    }

    pub(crate) fn set_timer(&mut self) {
        self.timing = B::IS_TIMED
            && match (self.current_state(), self.ui.as_ref()) {
                (Some(state), Some(ui)) => B::timing_state(state, ui),
                _ => false,
            };
        let want = self.timing || self.flash_time > 0.0 || self.anim_time > 0.0;
        if want != self.timer_active {
            self.timer_active = want;
            if let Some(hook) = self.timer_hook.as_mut() {
                hook(want);
            }
        }
    }

    /// Advances animation, flash and play-time clocks by `tplus`
    /// seconds. The frontend calls this while the timer is active.
    pub fn timer(&mut self, tplus: f32) {
        let need_redraw = self.anim_time > 0.0 || self.flash_time > 0.0;

        self.anim_pos += tplus;
        if (self.anim_pos >= self.anim_time || self.oldstate.is_none()) && self.anim_time > 0.0 {
            self.finish_move();
        }

        self.flash_pos += tplus;
        if self.flash_pos >= self.flash_time || self.flash_time == 0.0 {
            self.flash_pos = 0.0;
            self.flash_time = 0.0;
        }

        if need_redraw {
            self.redraw();
        }

        if self.timing {
            #[allow(clippy::cast_possible_truncation)]
            let crossed = {
                let old = self.elapsed;
                self.elapsed += tplus;
                old as i32 != self.elapsed as i32
            };
            if crossed {
                let text = self.laststatus.clone().unwrap_or_default();
                let line = self.rewrite_statusbar(&text);
                if let Some(drawing) = self.drawing.as_mut() {
                    drawing.status_bar(&line);
                }
            }
        }

        self.set_timer();
    }

    /// Prefixes status text with the play-time clock for timed
    /// backends, and remembers it for timer-driven refreshes.
    pub fn rewrite_statusbar(&mut self, text: &str) -> String {
        self.laststatus = Some(text.to_owned());
        if B::IS_TIMED {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let sec = self.elapsed as i32;
            format!("[{}:{:02}] {text}", sec / 60, sec % 60)
        } else {
            text.to_owned()
        }
    }

    // ------------------------------------------------------------------
    // Sizing and redraw

    /// Picks the largest tile size whose playing area fits in `w` x `h`
    /// (bounded by the preferred size unless `user_size` asks for the
    /// absolute largest) and returns the resulting pixel extents.
    pub fn size(&mut self, w: i32, h: i32, user_size: bool) -> (i32, i32) {
        // A drawstate can only be told its size once, so resizing means
        // a fresh one.
        if self.drawstate.is_some() && self.tilesize > 0 && !self.states.is_empty() {
            self.drawstate = Some(B::new_drawstate(&self.states[0].state));
        }

        let mut max = if user_size {
            let mut m = 1;
            loop {
                m *= 2;
                let (rx, ry) = B::compute_size(&self.params, m);
                if rx > w || ry > h {
                    break m;
                }
            }
        } else {
            self.preferred_tilesize + 1
        };
        let mut min = 1;

        // Binary-search for the boundary where tile sizes stop fitting.
        while max - min > 1 {
            let mid = (max + min) / 2;
            let (rx, ry) = B::compute_size(&self.params, mid);
            if rx <= w && ry <= h {
                min = mid;
            } else {
                max = mid;
            }
        }

        self.tilesize = min;
        if user_size {
            self.preferred_tilesize = self.tilesize;
        }
        self.size_drawstate();
        (self.winwidth, self.winheight)
    }

    /// The tile size last chosen by [`Midend::size`].
    #[must_use]
    pub fn tilesize(&self) -> i32 {
        self.tilesize
    }

    pub(crate) fn size_drawstate(&mut self) {
        if self.tilesize > 0 {
            let (w, h) = B::compute_size(&self.params, self.tilesize);
            self.winwidth = w;
            self.winheight = h;
            if let Some(ds) = self.drawstate.as_mut() {
                B::set_size(ds, &self.params, self.tilesize);
            }
        }
    }

    /// Discards the renderer scratch and redraws from nothing.
    pub fn force_redraw(&mut self) {
        if !self.states.is_empty() {
            self.drawstate = Some(B::new_drawstate(&self.states[0].state));
        }
        self.size_drawstate();
        self.redraw();
    }

    /// Redraws the displayed state through the drawing façade. A
    /// midend without a drawing layer ignores this.
    pub fn redraw(&mut self) {
        let Some(drawing) = self.drawing.as_mut() else {
            return;
        };
        if self.statepos == 0 {
            return;
        }
        let (Some(ds), Some(ui)) = (self.drawstate.as_mut(), self.ui.as_ref()) else {
            return;
        };
        drawing.api().start_draw();
        let animating =
            self.oldstate.is_some() && self.anim_time > 0.0 && self.anim_pos < self.anim_time;
        if animating {
            B::redraw(
                drawing,
                ds,
                self.oldstate.as_ref(),
                &self.states[self.statepos - 1].state,
                self.dir,
                ui,
                self.anim_pos,
                self.flash_pos,
            );
        } else {
            B::redraw(
                drawing,
                ds,
                None,
                &self.states[self.statepos - 1].state,
                1,
                ui,
                0.0,
                self.flash_pos,
            );
        }
        drawing.api().end_draw();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::testgame::Tally;

    fn game_at(id: &str) -> Midend<Tally> {
        let mut me = Midend::<Tally>::with_seed(None, b"midend tests");
        me.set_game_id(id).unwrap();
        me.new_game().unwrap();
        me
    }

    fn count(me: &Midend<Tally>) -> i32 {
        me.current_state().unwrap().count
    }

    #[test]
    fn new_game_starts_a_fresh_history() {
        let mut me = Midend::<Tally>::with_seed(None, b"midend tests");
        me.new_game().unwrap();
        assert_eq!(me.num_states(), 1);
        assert_eq!(me.state_position(), 1);
        assert!(!me.can_undo());
        assert!(!me.can_redo());
        // Fresh generation invents a seed id.
        assert!(me.get_random_seed().is_some());
    }

    #[test]
    fn moves_undo_redo_and_redo_truncation() {
        let mut me = game_at("9:0");
        for _ in 0..3 {
            assert!(me.process_key(0, 0, Button::Char('+')));
        }
        assert_eq!((me.num_states(), count(&me)), (4, 3));

        assert!(me.undo());
        assert!(me.undo());
        assert_eq!((me.state_position(), count(&me)), (2, 1));
        assert!(me.redo());
        assert_eq!(count(&me), 2);

        // A new move discards the remaining redo tail.
        assert!(me.process_key(0, 0, Button::Char('+')));
        assert_eq!((me.num_states(), count(&me)), (4, 3));
        assert!(!me.can_redo());
    }

    #[test]
    fn keyboard_aliases_reach_the_backend() {
        let mut me = game_at("9:4");
        // Return is the primary cursor select.
        assert!(me.process_key(0, 0, Button::Char('\n')));
        assert_eq!(count(&me), 5);
        // Either backspace character arrives as \x08.
        assert!(me.process_key(0, 0, Button::Char('\u{7f}')));
        assert_eq!(count(&me), 0);
        // Uppercase and ctrl forms of undo/redo.
        assert!(me.process_key(0, 0, Button::Char('U')));
        assert_eq!(count(&me), 5);
        assert!(me.process_key(0, 0, Button::Char('\u{12}')));
        assert_eq!(count(&me), 0);
    }

    #[test]
    fn quit_keys_report_termination() {
        let mut me = game_at("9:0");
        assert!(!me.process_key(0, 0, Button::Char('q')));
        assert!(!me.process_key(0, 0, Button::Char('\u{11}')));
        // Unknown keys are swallowed quietly.
        assert!(me.process_key(0, 0, Button::Char('x')));
    }

    #[test]
    fn mouse_stream_is_normalised() {
        let mut me = game_at("9:0");
        // A release with no button held is dropped before the backend
        // sees it.
        assert!(me.process_key(0, 0, Button::Release(MouseButton::Left)));
        assert_eq!(count(&me), 0);

        // Pressing a second button fabricates the missing release of
        // the first.
        assert!(me.process_key(0, 0, Button::Down(MouseButton::Left)));
        assert!(me.process_key(0, 0, Button::Down(MouseButton::Right)));
        assert_eq!(count(&me), 1);

        // Releases are retargeted at whichever button is actually held.
        assert!(me.process_key(0, 0, Button::Release(MouseButton::Middle)));
        assert_eq!(count(&me), 2);
        assert!(me.process_key(0, 0, Button::Release(MouseButton::Middle)));
        assert_eq!(count(&me), 2);
    }

    #[test]
    fn ui_only_events_record_no_move() {
        let mut me = game_at("9:0");
        assert!(me.process_key(0, 0, Button::Char('z')));
        assert_eq!(me.num_states(), 1);
    }

    #[test]
    fn input_before_any_game_is_harmless() {
        let mut me = Midend::<Tally>::with_seed(None, b"midend tests");
        assert!(me.process_key(0, 0, Button::Char('+')));
        assert!(me.current_state().is_none());
        assert_eq!(me.status(), Status::Solved);
    }

    #[test]
    fn solve_pushes_a_special_state() {
        let mut me = game_at("9:2");
        me.solve().unwrap();
        assert_eq!(me.status(), Status::Solved);
        assert_eq!(me.state_position(), 2);
        assert_eq!(me.states[1].movetype, MoveType::Solve);
        // Special transitions never flash.
        assert_eq!(me.flash_time, 0.0);
        // Solving is undoable like any other move.
        assert!(me.undo());
        assert_eq!(count(&me), 2);
    }

    #[test]
    fn restart_is_a_recorded_move() {
        let mut me = game_at("9:2");
        me.process_key(0, 0, Button::Char('+'));
        me.process_key(0, 0, Button::Char('+'));
        me.restart_game();
        assert_eq!(count(&me), 2);
        assert_eq!(me.num_states(), 4);
        assert!(me.can_undo());
        assert!(me.undo());
        assert_eq!(count(&me), 4);
    }

    #[test]
    fn game_id_round_trips() {
        let mut me = game_at("7:3");
        assert_eq!(count(&me), 3);
        assert_eq!(me.current_state().unwrap().target, 7);
        assert_eq!(me.get_game_id().as_deref(), Some("7:3"));
        // A descriptive id has no seed to report.
        assert_eq!(me.get_random_seed(), None);

        me.set_game_id("9#123456789012345").unwrap();
        me.new_game().unwrap();
        assert_eq!(
            me.get_random_seed().as_deref(),
            Some("9#123456789012345")
        );
        // The same seed id regenerates the same game.
        let desc = me.get_game_id();
        me.set_game_id("9#123456789012345").unwrap();
        me.new_game().unwrap();
        assert_eq!(me.get_game_id(), desc);
    }

    #[test]
    fn bad_game_ids_are_rejected_without_side_effects() {
        let mut me = game_at("7:3");
        assert!(me.set_game_id("200:1").is_err());
        assert!(me.set_game_id("7:banana").is_err());
        assert!(me.validate_game_id("7:4").is_ok());
        // Nothing above disturbed the current game.
        assert_eq!(me.get_game_id().as_deref(), Some("7:3"));
    }

    #[test]
    fn preset_menu_matches_parameters() {
        let mut me = Midend::<Tally>::with_seed(None, b"midend tests");
        assert_eq!(me.presets().len(), 2);
        assert_eq!(me.which_preset(), None);
        let params = me.presets()[1].params.clone();
        me.set_params(params);
        assert_eq!(me.which_preset(), Some(1));
    }

    #[test]
    fn size_is_the_largest_fitting_tile() {
        let mut me = game_at("9:0");
        // Bounded by what fits.
        assert_eq!(me.size(100, 100, false), (96, 96));
        assert_eq!(me.tilesize(), 12);
        // Bounded by the preferred tile size when space is ample.
        assert_eq!(me.size(1000, 1000, false), (128, 128));
        assert_eq!(me.tilesize(), 16);
        // user_size lifts the preferred-size cap.
        assert_eq!(me.size(1000, 1000, true), (1000, 1000));
        assert_eq!(me.tilesize(), 125);
    }

    #[test]
    fn completion_flash_drives_the_timer() {
        let log: Rc<RefCell<Vec<bool>>> = Rc::default();
        let mut me = game_at("3:0");
        let hook = Rc::clone(&log);
        me.set_timer_hook(Box::new(move |on| hook.borrow_mut().push(on)));

        me.process_key(0, 0, Button::Char('+'));
        me.process_key(0, 0, Button::Char('+'));
        assert_eq!(log.borrow().as_slice(), &[] as &[bool]);

        // The winning move arms the flash and starts the timer.
        me.process_key(0, 0, Button::Char('+'));
        assert_eq!(me.status(), Status::Solved);
        assert!(me.flash_time > 0.0);
        assert_eq!(log.borrow().as_slice(), &[true]);

        // Once the flash runs out the timer stops again.
        me.timer(0.2);
        assert_eq!(me.flash_time, 0.0);
        assert_eq!(log.borrow().as_slice(), &[true, false]);
    }

    #[test]
    fn set_config_applies_validated_parameters() {
        let mut me = Midend::<Tally>::with_seed(None, b"midend tests");
        let mut cfg = me.configure();
        cfg[0].value = crate::backend::ConfigValue::String("42".to_owned());
        me.set_config(&cfg).unwrap();
        assert_eq!(me.get_params().target, 42);
        cfg[0].value = crate::backend::ConfigValue::String("0".to_owned());
        assert!(me.set_config(&cfg).is_err());
        assert_eq!(me.get_params().target, 42);
    }

    #[test]
    fn text_format_shows_the_current_state() {
        let mut me = game_at("7:3");
        assert_eq!(me.text_format().as_deref(), Some("3/7"));
        me.process_key(0, 0, Button::Char('+'));
        assert_eq!(me.text_format().as_deref(), Some("4/7"));
    }
}

impl<B: Backend> std::fmt::Debug for Midend<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Midend")
            .field("game", &B::NAME)
            .field("nstates", &self.states.len())
            .field("statepos", &self.statepos)
            .field("genmode", &self.genmode)
            .finish_non_exhaustive()
    }
}
