//! Mastermind: deduce a hidden row of coloured pegs from placement
//! feedback.
//!
//! The description is the solution row itself, obfuscated and
//! hex-encoded so it cannot be read off the game id. Feedback uses the
//! Knuth identity: right-colour count is the per-colour minimum overlap
//! between guess and solution, minus the right-place count.

use log::debug;
use parlor_core::{RandomState, bin_to_hex, hex_to_bin, obfuscate_bitmap};
use parlor_engine::{
    Backend, BlitterId, Button, ConfigItem, ConfigValue, DescError, Draw, FontType, HAlign,
    MouseButton, MoveIntent, MoveResult, ParamsError, Rgb, SolveError, Status, VAlign,
    mkhighlight,
};

use crate::DEFAULT_BACKGROUND;

const COL_BACKGROUND: usize = 0;
const COL_FRAME: usize = 1;
const COL_CURSOR: usize = 2;
const COL_FLASH: usize = 3;
const COL_HOLD: usize = 4;
/// Peg colour c fills with `COL_EMPTY + c`; c = 0 is the empty socket.
const COL_EMPTY: usize = 5;
const COL_CORRECTPLACE: usize = 16;
const COL_CORRECTCOLOUR: usize = 17;
const NCOLOURS: usize = 18;

pub(crate) const FB_PLACE: u8 = 1;
pub(crate) const FB_COLOUR: u8 = 2;

/// Marker type implementing the Mastermind backend.
pub struct Guess;

/// Shape of a Guess game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessParams {
    /// Palette size, 2..=10.
    pub ncolours: usize,
    /// Pegs per row.
    pub npegs: usize,
    /// Rows before the game is lost.
    pub nguesses: usize,
    /// Whether a guess may leave sockets empty.
    pub allow_blank: bool,
    /// Whether a guess may repeat a colour.
    pub allow_multiple: bool,
}

/// One row of pegs with its feedback markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PegRow {
    /// Peg colours, 1-based; 0 is empty.
    pub(crate) pegs: Vec<usize>,
    /// Sorted feedback: place markers first, then colour markers.
    pub(crate) feedback: Vec<u8>,
}

impl PegRow {
    pub(crate) fn new(npegs: usize) -> Self {
        Self {
            pegs: vec![0; npegs],
            feedback: vec![0; npegs],
        }
    }
}

/// Full position: all guesses so far plus the hidden solution.
#[derive(Debug, Clone)]
pub struct GuessState {
    params: GuessParams,
    pub(crate) guesses: Vec<PegRow>,
    holds: Vec<bool>,
    pub(crate) solution: PegRow,
    /// Row index the player is working on; == nguesses means lost.
    pub(crate) next_go: usize,
    /// +1 won, -1 solution revealed (lost or gave up), 0 in play.
    solved: i8,
}

/// Transient interaction state: the half-built current guess, drag and
/// cursor positions, and the cached hint row.
#[derive(Debug)]
pub struct GuessUi {
    params: GuessParams,
    curr_pegs: PegRow,
    holds: Vec<bool>,
    colour_cur: usize,
    peg_cur: usize,
    display_cur: bool,
    markable: bool,
    drag_col: usize,
    drag_x: i32,
    drag_y: i32,
    /// Source peg of a drag out of the current guess, if any.
    drag_opeg: Option<usize>,
    show_labels: bool,
    /// Lexicographic hint search position, kept across calls so
    /// repeated hints resume instead of restarting.
    hint: Option<PegRow>,
}

/// Renderer cache: geometry plus the last-drawn contents of every row.
#[derive(Debug, Default)]
pub struct GuessDraw {
    started: bool,
    solved: i8,
    next_go: usize,
    guesses: Vec<CacheRow>,
    solution: CacheRow,
    colours: Vec<i32>,
    pegsz: i32,
    hintsz: i32,
    gapsz: i32,
    border: i32,
    pegrad: i32,
    hintrad: i32,
    colx: i32,
    coly: i32,
    guessx: i32,
    guessy: i32,
    solnx: i32,
    solny: i32,
    hintw: i32,
    w: i32,
    h: i32,
    blit_peg: Option<BlitterId>,
    drag_col: usize,
    blit_ox: i32,
    blit_oy: i32,
}

/// Last-drawn peg and feedback values, with cursor/hold/label bits
/// folded in so any visual change forces a repaint.
#[derive(Debug, Clone, Default)]
struct CacheRow {
    pegs: Vec<i32>,
    feedback: Vec<i32>,
}

impl CacheRow {
    fn invalid(n: usize) -> Self {
        Self {
            pegs: vec![-1; n],
            feedback: vec![-1; n],
        }
    }
}

const CUR_BIT: i32 = 0x1000;
const HOLD_BIT: i32 = 0x2000;
const LABEL_BIT: i32 = 0x4000;

/// Counts exact-place matches, fills in the sorted feedback markers and
/// returns the place count.
pub(crate) fn mark_pegs(guess: &mut PegRow, solution: &PegRow, ncolours: usize) -> usize {
    debug_assert_eq!(guess.pegs.len(), solution.pegs.len());
    let npegs = guess.pegs.len();

    let nc_place = guess
        .pegs
        .iter()
        .zip(&solution.pegs)
        .filter(|(g, s)| g == s)
        .count();

    // nc_colour = sum over colours of min(#guess, #solution), minus the
    // exact matches. Due to Knuth.
    let mut nc_colour = 0;
    for colour in 1..=ncolours {
        let n_guess = guess.pegs.iter().filter(|&&p| p == colour).count();
        let n_solution = solution.pegs.iter().filter(|&&p| p == colour).count();
        nc_colour += n_guess.min(n_solution);
    }
    nc_colour -= nc_place;

    debug!("mark_pegs: {npegs} pegs, {nc_place} right place, {nc_colour} right colour");
    debug_assert!(nc_colour + nc_place <= npegs);

    guess.feedback.fill(0);
    for slot in &mut guess.feedback[..nc_place] {
        *slot = FB_PLACE;
    }
    for slot in &mut guess.feedback[nc_place..nc_place + nc_colour] {
        *slot = FB_COLOUR;
    }
    nc_place
}

/// Whether the current guess is complete enough to submit.
fn is_markable(params: &GuessParams, pegs: &PegRow) -> bool {
    let nrequired = if params.allow_blank { 1 } else { params.npegs };
    let nset = pegs.pegs.iter().filter(|&&c| c > 0).count();
    if nset < nrequired {
        return false;
    }
    if !params.allow_multiple {
        let mut colcount = vec![0usize; params.ncolours];
        for &c in &pegs.pegs {
            if c > 0 {
                colcount[c - 1] += 1;
                if colcount[c - 1] > 1 {
                    return false;
                }
            }
        }
    }
    true
}

fn set_peg(params: &GuessParams, ui: &mut GuessUi, peg: usize, col: usize) {
    ui.curr_pegs.pegs[peg] = col;
    ui.markable = is_markable(params, &ui.curr_pegs);
}

/// The move string: `G` then the current pegs, comma-separated, each
/// with a `_` suffix when held for the next row.
fn encode_move(ui: &GuessUi) -> String {
    let mut buf = String::from("G");
    for (i, &peg) in ui.curr_pegs.pegs.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        buf.push_str(&format!("{peg}"));
        if ui.holds[i] {
            buf.push('_');
        }
    }
    buf
}

/// Installs the lexicographically first row consistent with all prior
/// feedback into the current guess. The search position persists in
/// `ui.hint` so each call resumes where the last stopped; undo clears it
/// (see `changed_state`).
fn compute_hint(state: &GuessState, ui: &mut GuessUi) {
    let npegs = state.params.npegs;

    let mut maxcolour = 0;
    for guess in &state.guesses[..state.next_go] {
        for &p in &guess.pegs {
            maxcolour = maxcolour.max(p);
        }
    }
    maxcolour = (maxcolour + 1).min(state.params.ncolours);

    // If an all-mincolour guess got zero feedback, no peg uses a colour
    // that low and the search can start higher.
    let mut mincolour = 1;
    'raise: loop {
        for guess in &state.guesses[..state.next_go] {
            if guess.feedback[0] != 0 {
                continue;
            }
            if guess.pegs.iter().all(|&p| p == mincolour) {
                mincolour += 1;
                continue 'raise;
            }
        }
        break;
    }

    let mut hint = ui.hint.take().unwrap_or_else(|| PegRow {
        pegs: vec![mincolour; npegs],
        feedback: vec![0; npegs],
    });

    while hint.pegs[0] <= state.params.ncolours {
        // Marking the candidate against a past guess gives the same
        // counts as marking that guess against the candidate, so the
        // recorded feedback can be compared directly.
        let consistent = state.guesses[..state.next_go].iter().all(|guess| {
            mark_pegs(&mut hint, guess, maxcolour);
            hint.feedback == guess.feedback
        });
        if consistent {
            ui.curr_pegs.pegs.copy_from_slice(&hint.pegs);
            ui.hint = Some(hint);
            ui.markable = true;
            ui.peg_cur = npegs;
            ui.display_cur = true;
            return;
        }

        // Odometer increment over mincolour..=maxcolour.
        let mut i = npegs;
        loop {
            i -= 1;
            hint.pegs[i] += 1;
            if i == 0 || hint.pegs[i] <= maxcolour {
                break;
            }
            hint.pegs[i] = mincolour;
        }
    }
    ui.hint = Some(hint);

    // No row is consistent, which means the solution itself was
    // inconsistent. Nudge the ui so the player can at least see the
    // search finished.
    if !ui.display_cur {
        ui.display_cur = true;
    } else if npegs == 1 {
        ui.display_cur = false;
    } else {
        ui.peg_cur = (ui.peg_cur + 1) % npegs;
    }
}

impl GuessDraw {
    fn peg_off(&self) -> i32 {
        self.pegsz + self.gapsz
    }
    fn hint_off(&self) -> i32 {
        self.hintsz + self.gapsz
    }
    fn cgap(&self) -> i32 {
        self.gapsz / 2
    }
    fn col_y(&self, c: i32) -> i32 {
        self.coly + c * self.peg_off()
    }
    fn col_w(&self) -> i32 {
        self.peg_off()
    }
    fn col_h(&self, ncolours: i32) -> i32 {
        ncolours * self.peg_off()
    }
    fn guess_x(&self, p: i32) -> i32 {
        self.guessx + p * self.peg_off()
    }
    fn guess_y(&self, g: i32) -> i32 {
        self.guessy + g * self.peg_off()
    }
    fn guess_w(&self, npegs: i32) -> i32 {
        npegs * self.peg_off()
    }
    fn guess_h(&self, nguesses: i32) -> i32 {
        nguesses * self.peg_off()
    }
    fn hint_x(&self, npegs: i32) -> i32 {
        self.guessx + self.guess_w(npegs) + self.gapsz
    }
    fn hint_y(&self, g: i32) -> i32 {
        self.guessy + (self.pegsz - self.hint_off() - self.hintsz) / 2 + g * self.peg_off()
    }
    fn hint_w(&self) -> i32 {
        self.hintw * self.hint_off() - self.gapsz
    }
    fn soln_y(&self, nguesses: i32) -> i32 {
        self.guessy + self.guess_h(nguesses) + self.gapsz + 2
    }
}

fn draw_peg(
    draw: &mut Draw,
    ds: &GuessDraw,
    cx: i32,
    cy: i32,
    moving: bool,
    labelled: bool,
    col: usize,
) {
    let cgap = ds.cgap();
    // A dragged peg alpha-blends over whatever is under it; everything
    // else erases its background first.
    if !moving {
        draw.api().draw_rect(
            cx - cgap,
            cy - cgap,
            ds.pegsz + cgap * 2,
            ds.pegsz + cgap * 2,
            COL_BACKGROUND,
        );
    }
    if ds.pegrad > 0 {
        draw.api().draw_circle(
            cx + ds.pegrad,
            cy + ds.pegrad,
            ds.pegrad,
            Some(COL_EMPTY + col),
            if col > 0 { COL_FRAME } else { COL_EMPTY },
        );
    } else {
        draw.api()
            .draw_rect(cx, cy, ds.pegsz, ds.pegsz, COL_EMPTY + col);
    }

    if labelled && col > 0 {
        let label = char::from_u32('a' as u32 - 1 + u32::try_from(col).unwrap_or(1));
        if let Some(label) = label {
            draw.api().draw_text(
                cx + ds.pegrad,
                cy + ds.pegrad,
                FontType::Variable,
                ds.pegrad,
                HAlign::Centre,
                VAlign::Centre,
                COL_FRAME,
                &label.to_string(),
            );
        }
    }

    draw.api().draw_update(
        cx - cgap,
        cy - cgap,
        ds.pegsz + cgap * 2,
        ds.pegsz + cgap * 2,
    );
}

fn draw_cursor(draw: &mut Draw, ds: &GuessDraw, x: i32, y: i32) {
    draw.api().draw_circle(
        x + ds.pegrad,
        y + ds.pegrad,
        ds.pegrad + ds.cgap(),
        None,
        COL_CURSOR,
    );
    draw.api().draw_update(
        x - ds.cgap(),
        y - ds.cgap(),
        ds.pegsz + ds.cgap() * 2,
        ds.pegsz + ds.cgap() * 2,
    );
}

#[allow(clippy::too_many_arguments)]
fn guess_redraw(
    draw: &mut Draw,
    ds: &mut GuessDraw,
    guess: Option<usize>,
    src: Option<&PegRow>,
    holds: Option<&[bool]>,
    cur_col: Option<usize>,
    force: bool,
    labelled: bool,
) {
    let (rowx, rowy, npegs) = match guess {
        None => (ds.solnx, ds.solny, ds.solution.pegs.len()),
        Some(g) => {
            #[allow(clippy::cast_possible_wrap)]
            let (x, y) = (ds.guess_x(0), ds.guess_y(g as i32));
            (x, y, ds.guesses[g].pegs.len())
        }
    };

    for i in 0..npegs {
        let mut scol = i32::try_from(src.map_or(0, |s| s.pegs[i])).unwrap_or(0);
        if cur_col == Some(i) {
            scol |= CUR_BIT;
        }
        if holds.is_some_and(|h| h[i]) {
            scol |= HOLD_BIT;
        }
        if labelled {
            scol |= LABEL_BIT;
        }
        let cached = match guess {
            None => &mut ds.solution.pegs[i],
            Some(g) => &mut ds.guesses[g].pegs[i],
        };
        let changed = *cached != scol;
        *cached = scol;
        if changed || force {
            #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
            let x = rowx + ds.peg_off() * i as i32;
            draw_peg(
                draw,
                ds,
                x,
                rowy,
                false,
                labelled,
                (scol & !(CUR_BIT | HOLD_BIT | LABEL_BIT)) as usize,
            );
            draw.api().draw_rect(
                x,
                rowy + ds.pegsz + ds.gapsz / 2,
                ds.pegsz,
                2,
                if scol & HOLD_BIT != 0 {
                    COL_HOLD
                } else {
                    COL_BACKGROUND
                },
            );
            draw.api()
                .draw_update(x, rowy + ds.pegsz + ds.gapsz / 2, ds.pegsz, 2);
            if scol & CUR_BIT != 0 {
                draw_cursor(draw, ds, x, rowy);
            }
        }
    }
}

fn hint_redraw(
    draw: &mut Draw,
    ds: &mut GuessDraw,
    guess: usize,
    src: Option<&PegRow>,
    force: bool,
    cursor: bool,
    markable: bool,
) {
    let npegs = ds.guesses[guess].feedback.len();
    let emptycol = if markable { COL_FLASH } else { COL_EMPTY };
    let hintlen = npegs.div_ceil(2);

    // The submit cursor surrounds this whole block, so it repaints all
    // or nothing.
    let mut need_redraw = force;
    for i in 0..npegs {
        let mut scol = i32::from(src.map_or(0, |s| s.feedback[i]));
        if i == 0 && cursor {
            scol |= CUR_BIT;
        }
        if i == 0 && markable {
            scol |= HOLD_BIT;
        }
        if scol != ds.guesses[guess].feedback[i] {
            need_redraw = true;
        }
        ds.guesses[guess].feedback[i] = scol;
    }

    if !need_redraw {
        return;
    }

    let gap = ds.gapsz;
    #[allow(clippy::cast_possible_wrap)]
    let g = guess as i32;
    let npegs_i = i32::try_from(ds.solution.pegs.len()).unwrap_or(0);
    let hinth = ds.hintsz + gap + ds.hintsz;
    let hx = ds.hint_x(npegs_i) - gap;
    let hy = ds.hint_y(g) - gap;
    let hw = ds.hint_w() + gap * 2;
    let hh = hinth + gap * 2;

    draw.api().draw_rect(hx, hy, hw, hh, COL_BACKGROUND);

    for i in 0..npegs {
        let scol = src.map_or(0, |s| s.feedback[i]);
        let col = match scol {
            FB_PLACE => COL_CORRECTPLACE,
            FB_COLOUR => COL_CORRECTCOLOUR,
            _ => emptycol,
        };
        #[allow(clippy::cast_possible_wrap)]
        let i = i as i32;
        let (rowx, rowy) = if i < i32::try_from(hintlen).unwrap_or(0) {
            (ds.hint_x(npegs_i) + ds.hint_off() * i, ds.hint_y(g))
        } else {
            (
                ds.hint_x(npegs_i) + ds.hint_off() * (i - i32::try_from(hintlen).unwrap_or(0)),
                ds.hint_y(g) + ds.hint_off(),
            )
        };
        if ds.hintrad > 0 {
            draw.api().draw_circle(
                rowx + ds.hintrad,
                rowy + ds.hintrad,
                ds.hintrad,
                Some(col),
                if col == emptycol { emptycol } else { COL_FRAME },
            );
        } else {
            draw.api().draw_rect(rowx, rowy, ds.hintsz, ds.hintsz, col);
        }
    }
    if cursor {
        let cgap = ds.cgap();
        draw.rect_outline(
            hx + cgap,
            hy + cgap,
            hw - cgap * 2,
            hh - cgap * 2,
            COL_CURSOR,
        );
    }
    draw.api().draw_update(hx, hy, hw, hh);
}

fn currmove_redraw(draw: &mut Draw, ds: &GuessDraw, guess: usize, col: usize) {
    #[allow(clippy::cast_possible_wrap)]
    let (ox, oy) = (ds.guess_x(0), ds.guess_y(guess as i32));
    let off = ds.pegsz / 4;
    draw.api().draw_rect(ox - off - 1, oy, 2, ds.pegsz, col);
    draw.api().draw_update(ox - off - 1, oy, 2, ds.pegsz);
}

const PEG_GAP: f64 = 0.10;
const PEG_HINT: f64 = 0.35;
const BORDER: f64 = 0.5;

impl Backend for Guess {
    type Params = GuessParams;
    type State = GuessState;
    type Ui = GuessUi;
    type DrawState = GuessDraw;

    const NAME: &'static str = "Guess";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = true;
    const CAN_FORMAT_AS_TEXT: bool = false;
    const WANTS_STATUSBAR: bool = false;
    const IS_TIMED: bool = false;
    const PREFERRED_TILESIZE: i32 = 32;

    fn default_params() -> GuessParams {
        // The canonical Mastermind ruleset.
        GuessParams {
            ncolours: 6,
            npegs: 4,
            nguesses: 10,
            allow_blank: false,
            allow_multiple: true,
        }
    }

    fn presets() -> Vec<(String, GuessParams)> {
        vec![
            (
                "Standard".to_owned(),
                GuessParams {
                    ncolours: 6,
                    npegs: 4,
                    nguesses: 10,
                    allow_blank: false,
                    allow_multiple: true,
                },
            ),
            (
                "Super".to_owned(),
                GuessParams {
                    ncolours: 8,
                    npegs: 5,
                    nguesses: 12,
                    allow_blank: false,
                    allow_multiple: true,
                },
            ),
        ]
    }

    fn decode_params(params: &mut GuessParams, string: &str) {
        *params = Self::default_params();
        let mut chars = string.chars().peekable();
        let mut number = |chars: &mut std::iter::Peekable<std::str::Chars<'_>>| {
            let mut n = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                n = n * 10 + d as usize;
                chars.next();
            }
            n
        };
        while let Some(c) = chars.next() {
            match c {
                'c' => params.ncolours = number(&mut chars),
                'p' => params.npegs = number(&mut chars),
                'g' => params.nguesses = number(&mut chars),
                'b' => params.allow_blank = true,
                'B' => params.allow_blank = false,
                'm' => params.allow_multiple = true,
                'M' => params.allow_multiple = false,
                _ => {}
            }
        }
    }

    fn encode_params(params: &GuessParams, _full: bool) -> String {
        format!(
            "c{}p{}g{}{}{}",
            params.ncolours,
            params.npegs,
            params.nguesses,
            if params.allow_blank { "b" } else { "B" },
            if params.allow_multiple { "m" } else { "M" },
        )
    }

    fn configure(params: &GuessParams) -> Vec<ConfigItem> {
        vec![
            ConfigItem {
                name: "Colours".to_owned(),
                value: ConfigValue::String(format!("{}", params.ncolours)),
            },
            ConfigItem {
                name: "Pegs per guess".to_owned(),
                value: ConfigValue::String(format!("{}", params.npegs)),
            },
            ConfigItem {
                name: "Guesses".to_owned(),
                value: ConfigValue::String(format!("{}", params.nguesses)),
            },
            ConfigItem {
                name: "Allow blanks".to_owned(),
                value: ConfigValue::Boolean(params.allow_blank),
            },
            ConfigItem {
                name: "Allow duplicates".to_owned(),
                value: ConfigValue::Boolean(params.allow_multiple),
            },
        ]
    }

    fn custom_params(cfg: &[ConfigItem]) -> GuessParams {
        let number = |i: usize| match cfg.get(i).map(|item| &item.value) {
            Some(ConfigValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let flag = |i: usize| matches!(cfg.get(i).map(|item| &item.value), Some(&ConfigValue::Boolean(b)) if b);
        GuessParams {
            ncolours: number(0),
            npegs: number(1),
            nguesses: number(2),
            allow_blank: flag(3),
            allow_multiple: flag(4),
        }
    }

    fn validate_params(params: &GuessParams, _full: bool) -> Result<(), ParamsError> {
        if params.ncolours < 2 || params.npegs < 2 {
            return Err(ParamsError::new("Trivial solutions are uninteresting"));
        }
        // The desc packs one colour per byte.
        if params.ncolours > 10 {
            return Err(ParamsError::new("Too many colours"));
        }
        if params.nguesses < 1 {
            return Err(ParamsError::new("Must have at least one guess"));
        }
        if !params.allow_multiple && params.ncolours < params.npegs {
            return Err(ParamsError::new(
                "Disallowing multiple colours requires at least as many colours as pegs",
            ));
        }
        Ok(())
    }

    fn new_desc(
        params: &GuessParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        let mut bmp = vec![0u8; params.npegs];
        let mut colcount = vec![0usize; params.ncolours];
        for slot in &mut bmp {
            let c = loop {
                let c = rs.upto(params.ncolours);
                if params.allow_multiple || colcount[c] == 0 {
                    break c;
                }
            };
            colcount[c] += 1;
            *slot = u8::try_from(c + 1).unwrap_or(1);
        }
        obfuscate_bitmap(&mut bmp, params.npegs * 8, false);
        (bin_to_hex(&bmp), None)
    }

    fn validate_desc(params: &GuessParams, desc: &str) -> Result<(), DescError> {
        if desc.len() != params.npegs * 2 {
            return Err(DescError::new("Game description is wrong length"));
        }
        let mut bmp = hex_to_bin(desc)
            .map_err(|_| DescError::new("Game description is corrupted"))?;
        obfuscate_bitmap(&mut bmp, params.npegs * 8, true);
        if bmp
            .iter()
            .any(|&b| b < 1 || usize::from(b) > params.ncolours)
        {
            return Err(DescError::new("Game description is corrupted"));
        }
        Ok(())
    }

    fn new_game(params: &GuessParams, desc: &str) -> GuessState {
        let mut bmp = hex_to_bin(desc).unwrap_or_default();
        bmp.resize(params.npegs, 0);
        obfuscate_bitmap(&mut bmp, params.npegs * 8, true);
        let mut solution = PegRow::new(params.npegs);
        for (slot, &b) in solution.pegs.iter_mut().zip(&bmp) {
            *slot = usize::from(b);
        }
        GuessState {
            params: params.clone(),
            guesses: vec![PegRow::new(params.npegs); params.nguesses],
            holds: vec![false; params.npegs],
            solution,
            next_go: 0,
            solved: 0,
        }
    }

    fn solve(
        _origstate: &GuessState,
        _currstate: &GuessState,
        _aux: Option<&str>,
    ) -> Result<String, SolveError> {
        Ok("S".to_owned())
    }

    fn new_ui(state: &GuessState) -> GuessUi {
        GuessUi {
            params: state.params.clone(),
            curr_pegs: PegRow::new(state.params.npegs),
            holds: vec![false; state.params.npegs],
            colour_cur: 0,
            peg_cur: 0,
            display_cur: false,
            markable: false,
            drag_col: 0,
            drag_x: 0,
            drag_y: 0,
            drag_opeg: None,
            show_labels: false,
            hint: None,
        }
    }

    fn encode_ui(ui: &GuessUi) -> String {
        // The half-built guess and the hold set are worth keeping
        // across a save.
        let mut out = String::new();
        for (i, &peg) in ui.curr_pegs.pegs.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&format!("{peg}"));
            if ui.holds[i] {
                out.push('_');
            }
        }
        out
    }

    fn decode_ui(ui: &mut GuessUi, encoding: &str) {
        let mut p = encoding;
        for i in 0..ui.curr_pegs.pegs.len() {
            let digits = p.len() - p.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            ui.curr_pegs.pegs[i] = p[..digits].parse().unwrap_or(0);
            p = &p[digits..];
            ui.holds[i] = p.starts_with('_');
            if ui.holds[i] {
                p = &p[1..];
            }
            if let Some(rest) = p.strip_prefix(',') {
                p = rest;
            }
        }
        ui.markable = is_markable(&ui.params, &ui.curr_pegs);
    }

    fn changed_state(ui: &mut GuessUi, oldstate: &GuessState, newstate: &GuessState) {
        // Moving backwards invalidates the hint search cache; a ruled-out
        // candidate may become viable again.
        if newstate.next_go < oldstate.next_go {
            ui.hint = None;
        }

        // Carry held pegs into the next row, clear the rest.
        for i in 0..newstate.solution.pegs.len() {
            ui.holds[i] = newstate.solved == 0 && newstate.holds[i];
            if newstate.solved != 0 || newstate.next_go == 0 || !ui.holds[i] {
                ui.curr_pegs.pegs[i] = 0;
            } else {
                ui.curr_pegs.pegs[i] = newstate.guesses[newstate.next_go - 1].pegs[i];
            }
        }
        ui.markable = is_markable(&newstate.params, &ui.curr_pegs);
        if !ui.markable && ui.peg_cur == newstate.solution.pegs.len() {
            ui.peg_cur -= 1;
        }
    }

    #[allow(clippy::too_many_lines)]
    fn interpret_move(
        state: &GuessState,
        ui: &mut GuessUi,
        ds: &GuessDraw,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent {
        if let Button::Char('l' | 'L') = button {
            ui.show_labels = !ui.show_labels;
            return MoveIntent::Redraw;
        }
        if state.solved != 0 {
            return MoveIntent::Ignored;
        }

        let npegs = i32::try_from(state.params.npegs).unwrap_or(0);
        let ncolours = i32::try_from(state.params.ncolours).unwrap_or(0);
        let nguesses = i32::try_from(state.params.nguesses).unwrap_or(0);
        #[allow(clippy::cast_possible_wrap)]
        let next_go = state.next_go as i32;
        let guess_ox = ds.guess_x(0);
        let guess_oy = ds.guess_y(next_go);

        // Hit-test the colour bar, the working row, the submit area and
        // the rows already played.
        let mut over_col = 0;
        let mut over_guess = None;
        let mut over_past = None;
        let mut over_hint = false;
        if x >= ds.colx
            && x < ds.colx + ds.col_w()
            && y >= ds.coly
            && y < ds.coly + ds.col_h(ncolours)
        {
            over_col = (y - ds.coly) / ds.peg_off() + 1;
        } else if x >= guess_ox && y >= guess_oy && y < guess_oy + ds.guess_h(nguesses) {
            if x < guess_ox + ds.guess_w(npegs) {
                let p = (x - guess_ox) / ds.peg_off();
                if (0..npegs).contains(&p) {
                    over_guess = Some(p.unsigned_abs() as usize);
                }
            } else {
                over_hint = true;
            }
        } else if x >= guess_ox
            && x < guess_ox + ds.guess_w(npegs)
            && y >= ds.guess_y(0)
            && y < guess_oy
        {
            let gy = (y - ds.guess_y(0)) / ds.peg_off();
            let gx = (x - guess_ox) / ds.peg_off();
            if (0..next_go).contains(&gy) && (0..npegs).contains(&gx) {
                over_past = Some((gy.unsigned_abs() as usize, gx.unsigned_abs() as usize));
            }
        }

        match button {
            Button::Down(MouseButton::Left) => {
                if over_col > 0 {
                    ui.drag_col = over_col.unsigned_abs() as usize;
                    ui.drag_opeg = None;
                } else if let Some(peg) = over_guess {
                    let col = ui.curr_pegs.pegs[peg];
                    if col > 0 {
                        ui.drag_col = col;
                        ui.drag_opeg = Some(peg);
                    }
                } else if let Some((gy, gx)) = over_past {
                    let col = state.guesses[gy].pegs[gx];
                    if col > 0 {
                        ui.drag_col = col;
                        ui.drag_opeg = None;
                    }
                }
                if ui.drag_col > 0 {
                    ui.drag_x = x;
                    ui.drag_y = y;
                    return MoveIntent::Redraw;
                }
            }
            Button::Drag(MouseButton::Left) if ui.drag_col > 0 => {
                ui.drag_x = x;
                ui.drag_y = y;
                return MoveIntent::Redraw;
            }
            Button::Release(MouseButton::Left) => {
                if ui.drag_col > 0 {
                    if let Some(peg) = over_guess {
                        set_peg(&state.params, ui, peg, ui.drag_col);
                    } else if let Some(opeg) = ui.drag_opeg {
                        set_peg(&state.params, ui, opeg, 0);
                    }
                    ui.drag_col = 0;
                    ui.drag_opeg = None;
                    ui.display_cur = false;
                    return MoveIntent::Redraw;
                }
                // Deliberately dead after a drag, so a misdrop does not
                // submit the row.
                if over_hint && ui.markable {
                    return MoveIntent::Move(encode_move(ui));
                }
            }
            Button::Down(MouseButton::Right) => {
                if let Some(peg) = over_guess {
                    // A hold carries this peg into the next row.
                    ui.holds[peg] = !ui.holds[peg];
                    return MoveIntent::Redraw;
                }
            }
            Button::CursorUp | Button::CursorDown => {
                ui.display_cur = true;
                if button == Button::CursorDown && ui.colour_cur + 1 < state.params.ncolours {
                    ui.colour_cur += 1;
                }
                if button == Button::CursorUp && ui.colour_cur > 0 {
                    ui.colour_cur -= 1;
                }
                return MoveIntent::Redraw;
            }
            Button::Char('h' | 'H' | '?') => {
                compute_hint(state, ui);
                return MoveIntent::Redraw;
            }
            Button::CursorLeft | Button::CursorRight => {
                let maxcur = state.params.npegs + usize::from(ui.markable);
                ui.display_cur = true;
                if button == Button::CursorRight && ui.peg_cur + 1 < maxcur {
                    ui.peg_cur += 1;
                }
                if button == Button::CursorLeft && ui.peg_cur > 0 {
                    ui.peg_cur -= 1;
                }
                return MoveIntent::Redraw;
            }
            Button::CursorSelect => {
                ui.display_cur = true;
                if ui.peg_cur == state.params.npegs {
                    return MoveIntent::Move(encode_move(ui));
                }
                set_peg(&state.params, ui, ui.peg_cur, ui.colour_cur + 1);
                return MoveIntent::Redraw;
            }
            Button::Char('D' | 'd' | '\u{8}') => {
                ui.display_cur = true;
                set_peg(&state.params, ui, ui.peg_cur, 0);
                return MoveIntent::Redraw;
            }
            Button::CursorSelect2 => {
                if ui.peg_cur == state.params.npegs {
                    return MoveIntent::Ignored;
                }
                ui.display_cur = true;
                ui.holds[ui.peg_cur] = !ui.holds[ui.peg_cur];
                return MoveIntent::Redraw;
            }
            _ => {}
        }
        MoveIntent::Ignored
    }

    fn execute_move(from: &GuessState, movestr: &str) -> MoveResult<GuessState> {
        if movestr == "S" {
            let mut ret = from.clone();
            ret.solved = -1;
            return MoveResult::Changed(ret);
        }
        let Some(mut p) = movestr.strip_prefix('G') else {
            return MoveResult::Invalid;
        };
        if from.next_go >= from.params.nguesses {
            return MoveResult::Invalid;
        }

        let mut ret = from.clone();
        let min_colour = usize::from(!from.params.allow_blank);
        for i in 0..from.solution.pegs.len() {
            let digits = p.len() - p.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            let Ok(val) = p[..digits].parse::<usize>() else {
                return MoveResult::Invalid;
            };
            if val < min_colour || val > from.params.ncolours {
                return MoveResult::Invalid;
            }
            ret.guesses[from.next_go].pegs[i] = val;
            p = &p[digits..];
            ret.holds[i] = p.starts_with('_');
            if ret.holds[i] {
                p = &p[1..];
            }
            if let Some(rest) = p.strip_prefix(',') {
                p = rest;
            }
        }

        if !p.is_empty() {
            return MoveResult::Invalid;
        }

        let mut marked = ret.guesses[from.next_go].clone();
        let nc_place = mark_pegs(&mut marked, &ret.solution, ret.params.ncolours);
        ret.guesses[from.next_go] = marked;

        if nc_place == ret.solution.pegs.len() {
            ret.solved = 1;
        } else {
            ret.next_go = from.next_go + 1;
            if ret.next_go >= ret.params.nguesses {
                ret.solved = -1;
            }
        }
        MoveResult::Changed(ret)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn compute_size(params: &GuessParams, tilesize: i32) -> (i32, i32) {
        let (npegs, ncolours, nguesses) = (
            params.npegs as f64,
            params.ncolours as f64,
            params.nguesses as f64,
        );
        let hintw = ((params.npegs + 1) / 2) as f64;

        let hmul = BORDER * 2.0
            + 1.0 * 2.0
            + 1.0 * npegs
            + PEG_GAP * npegs
            + PEG_HINT * hintw
            + PEG_GAP * (hintw - 1.0);
        let vmul_c = BORDER * 2.0 + ncolours + PEG_GAP * (ncolours - 1.0);
        let vmul_g = BORDER * 2.0 + (nguesses + 1.0) + PEG_GAP * (nguesses + 1.0);
        let vmul = vmul_c.max(vmul_g);

        (
            (f64::from(tilesize) * hmul).ceil() as i32,
            (f64::from(tilesize) * vmul).ceil() as i32,
        )
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_size(ds: &mut GuessDraw, params: &GuessParams, tilesize: i32) {
        let ncolours = i32::try_from(params.ncolours).unwrap_or(0);
        let nguesses = i32::try_from(params.nguesses).unwrap_or(0);

        ds.pegsz = tilesize;
        ds.hintsz = (f64::from(ds.pegsz) * PEG_HINT) as i32;
        ds.gapsz = (f64::from(ds.pegsz) * PEG_GAP) as i32;
        ds.border = (f64::from(ds.pegsz) * BORDER) as i32;
        ds.pegrad = (ds.pegsz - 1) / 2;
        ds.hintrad = (ds.hintsz - 1) / 2;

        let colh = (ds.pegsz + ds.gapsz) * ncolours - ds.gapsz;
        let guessh = (ds.pegsz + ds.gapsz) * nguesses + ds.gapsz + ds.pegsz;

        let (w, h) = Self::compute_size(params, tilesize);
        ds.w = w;
        ds.h = h;
        ds.colx = ds.border;
        ds.coly = (h - colh) / 2;
        ds.guessx = ds.border + ds.pegsz * 2;
        ds.solnx = ds.guessx;
        ds.guessy = (h - guessh) / 2;
        ds.solny = ds.guessy + (ds.pegsz + ds.gapsz) * nguesses + ds.gapsz;
    }

    fn colours() -> Vec<Rgb> {
        let (background, _, _) = mkhighlight(DEFAULT_BACKGROUND);
        let mut ret = vec![[0.0, 0.0, 0.0]; NCOLOURS];
        ret[COL_BACKGROUND] = background;
        ret[COL_FRAME] = [0.0, 0.0, 0.0];
        ret[COL_CURSOR] = [0.0, 0.0, 0.0];
        ret[COL_FLASH] = [0.5, 1.0, 1.0];
        ret[COL_HOLD] = [1.0, 0.5, 0.5];
        // Visibly distinct from the background so an empty socket reads
        // as a socket.
        ret[COL_EMPTY] = background.map(|c| c * 2.0 / 3.0);
        let pegs: [Rgb; 10] = [
            [1.0, 0.0, 0.0], // red
            [1.0, 1.0, 0.0], // yellow
            [0.0, 1.0, 0.0], // green
            [0.2, 0.3, 1.0], // blue
            [1.0, 0.5, 0.0], // orange
            [0.5, 0.0, 0.7], // purple
            [0.5, 0.3, 0.3], // brown
            [0.4, 0.8, 1.0], // light blue
            [0.7, 1.0, 0.7], // light green
            [1.0, 0.6, 1.0], // pink
        ];
        ret[COL_EMPTY + 1..COL_EMPTY + 11].copy_from_slice(&pegs);
        ret[COL_CORRECTPLACE] = [0.0, 0.0, 0.0];
        ret[COL_CORRECTCOLOUR] = [1.0, 1.0, 1.0];
        ret
    }

    fn new_drawstate(state: &GuessState) -> GuessDraw {
        let hintw = i32::try_from((state.params.npegs + 1) / 2).unwrap_or(1);
        GuessDraw {
            guesses: vec![CacheRow::invalid(state.params.npegs); state.params.nguesses],
            solution: CacheRow::invalid(state.params.npegs),
            colours: vec![-1; state.params.ncolours],
            hintw,
            ..GuessDraw::default()
        }
    }

    #[allow(clippy::too_many_lines)]
    fn redraw(
        draw: &mut Draw,
        ds: &mut GuessDraw,
        _oldstate: Option<&GuessState>,
        state: &GuessState,
        _dir: i32,
        ui: &GuessUi,
        _anim_time: f32,
        _flash_time: f32,
    ) {
        let npegs = i32::try_from(state.params.npegs).unwrap_or(0);
        let new_move = state.next_go != ds.next_go || !ds.started;

        if !ds.started {
            draw.api().draw_rect(0, 0, ds.w, ds.h, COL_BACKGROUND);
            draw.api().draw_rect(
                ds.solnx,
                ds.solny - ds.gapsz - 1,
                ds.guess_w(npegs),
                2,
                COL_FRAME,
            );
            draw.api().draw_update(0, 0, ds.w, ds.h);
        }

        if ds.drag_col != 0 {
            if let Some(blit) = ds.blit_peg {
                draw.api()
                    .blitter_load(blit, Some((ds.blit_ox, ds.blit_oy)));
                draw.api()
                    .draw_update(ds.blit_ox, ds.blit_oy, ds.pegsz, ds.pegsz);
            }
        }

        // Colour bar.
        for i in 0..state.params.ncolours {
            #[allow(clippy::cast_possible_wrap)]
            let mut val = (i + 1) as i32;
            if ui.display_cur && ui.colour_cur == i {
                val |= CUR_BIT;
            }
            if ui.show_labels {
                val |= LABEL_BIT;
            }
            if ds.colours[i] != val {
                #[allow(clippy::cast_possible_wrap)]
                let (cx, cy) = (ds.colx, ds.col_y(i as i32));
                draw_peg(draw, ds, cx, cy, false, ui.show_labels, i + 1);
                if val & CUR_BIT != 0 {
                    draw_cursor(draw, ds, cx, cy);
                }
                ds.colours[i] = val;
            }
        }

        // Rows already played and rows still blank, in reverse so hold
        // markers are not trampled.
        for i in (0..state.params.nguesses).rev() {
            if i < state.next_go || state.solved != 0 {
                guess_redraw(
                    draw,
                    ds,
                    Some(i),
                    Some(&state.guesses[i]),
                    None,
                    None,
                    false,
                    ui.show_labels,
                );
                hint_redraw(
                    draw,
                    ds,
                    i,
                    Some(&state.guesses[i]),
                    i + 1 == state.next_go,
                    false,
                    false,
                );
            } else if i > state.next_go {
                guess_redraw(draw, ds, Some(i), None, None, None, false, ui.show_labels);
                hint_redraw(draw, ds, i, None, false, false, false);
            }
        }
        if state.solved == 0 {
            // The working row lives in the ui, not the state.
            guess_redraw(
                draw,
                ds,
                Some(state.next_go),
                Some(&ui.curr_pegs),
                Some(&ui.holds),
                ui.display_cur.then_some(ui.peg_cur),
                false,
                ui.show_labels,
            );
            hint_redraw(
                draw,
                ds,
                state.next_go,
                None,
                true,
                ui.display_cur && ui.peg_cur == state.params.npegs,
                ui.markable,
            );
        }

        if new_move {
            currmove_redraw(draw, ds, ds.next_go, COL_BACKGROUND);
        }
        if state.solved == 0 {
            currmove_redraw(draw, ds, state.next_go, COL_HOLD);
        }

        // Solution panel: a blank slab until the game ends.
        if (state.solved != 0) != (ds.solved != 0) || !ds.started {
            draw.api().draw_rect(
                ds.solnx,
                ds.solny,
                ds.guess_w(npegs),
                ds.peg_off(),
                if state.solved != 0 {
                    COL_BACKGROUND
                } else {
                    COL_EMPTY
                },
            );
            draw.api()
                .draw_update(ds.solnx, ds.solny, ds.guess_w(npegs), ds.peg_off());
        }
        if state.solved != 0 {
            guess_redraw(
                draw,
                ds,
                None,
                Some(&state.solution),
                None,
                None,
                ds.solved == 0,
                ui.show_labels,
            );
        }
        ds.solved = state.solved;
        ds.next_go = state.next_go;

        // Dragged peg rides on a blitter so releasing it restores what
        // was underneath.
        if ui.drag_col != 0 {
            let blit = *ds
                .blit_peg
                .get_or_insert_with(|| draw.api().blitter_new(ds.pegsz + 2, ds.pegsz + 2));
            let ox = ui.drag_x - ds.pegsz / 2;
            let oy = ui.drag_y - ds.pegsz / 2;
            ds.blit_ox = ox - 1;
            ds.blit_oy = oy - 1;
            draw.api().blitter_save(blit, ds.blit_ox, ds.blit_oy);
            draw_peg(draw, ds, ox, oy, true, ui.show_labels, ui.drag_col);
        }
        ds.drag_col = ui.drag_col;
        ds.started = true;
    }

    fn flash_length(
        _oldstate: &GuessState,
        _newstate: &GuessState,
        _dir: i32,
        _ui: &GuessUi,
    ) -> f32 {
        // The solution reveal is the fanfare.
        0.0
    }

    fn status(state: &GuessState) -> Status {
        // Nonzero whenever the solution has been revealed, even when it
        // was never guessed.
        match state.solved {
            1 => Status::Solved,
            0 => Status::Active,
            _ => Status::Lost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pegs: &[usize]) -> PegRow {
        PegRow {
            feedback: vec![0; pegs.len()],
            pegs: pegs.to_vec(),
        }
    }

    fn feedback(guess: &[usize], solution: &[usize]) -> (usize, usize) {
        let mut g = row(guess);
        let s = row(solution);
        let place = mark_pegs(&mut g, &s, 6);
        let colour = g.feedback.iter().filter(|&&f| f == FB_COLOUR).count();
        (place, colour)
    }

    #[test]
    fn knuth_feedback_identity() {
        assert_eq!(feedback(&[1, 2, 4, 3], &[1, 2, 3, 4]), (2, 2));
        assert_eq!(feedback(&[1, 2, 1, 2], &[1, 1, 2, 2]), (2, 2));
        assert_eq!(feedback(&[1, 2, 3, 4], &[1, 2, 3, 4]), (4, 0));
        assert_eq!(feedback(&[5, 5, 5, 5], &[1, 2, 3, 4]), (0, 0));
        assert_eq!(feedback(&[4, 3, 2, 1], &[1, 2, 3, 4]), (0, 4));
    }

    #[test]
    fn desc_hides_and_round_trips_the_solution() {
        let params = Guess::default_params();
        let mut rs = RandomState::from_seed(b"guess desc");
        let (desc, aux) = Guess::new_desc(&params, &mut rs, false);
        assert!(aux.is_none());
        assert_eq!(desc.len(), params.npegs * 2);
        Guess::validate_desc(&params, &desc).unwrap();

        let state = Guess::new_game(&params, &desc);
        assert!(
            state
                .solution
                .pegs
                .iter()
                .all(|&p| (1..=params.ncolours).contains(&p))
        );
        // The hex text itself never exposes the raw colours.
        let raw: String = state.solution.pegs.iter().map(ToString::to_string).collect();
        assert_ne!(desc, raw);
    }

    #[test]
    fn no_duplicates_when_multiples_disallowed() {
        let params = GuessParams {
            allow_multiple: false,
            ncolours: 6,
            ..Guess::default_params()
        };
        let mut rs = RandomState::from_seed(b"guess nodup");
        for _ in 0..10 {
            let (desc, _) = Guess::new_desc(&params, &mut rs, false);
            let state = Guess::new_game(&params, &desc);
            let mut seen = vec![false; params.ncolours + 1];
            for &p in &state.solution.pegs {
                assert!(!seen[p], "duplicate colour in {:?}", state.solution.pegs);
                seen[p] = true;
            }
        }
    }

    #[test]
    fn guess_moves_advance_and_finish_the_game() {
        let params = GuessParams {
            nguesses: 2,
            ..Guess::default_params()
        };
        let mut rs = RandomState::from_seed(b"guess moves");
        let (desc, _) = Guess::new_desc(&params, &mut rs, false);
        let state = Guess::new_game(&params, &desc);
        let solution = state.solution.pegs.clone();

        // A winning guess.
        let movestr = format!(
            "G{}",
            solution
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        );
        let MoveResult::Changed(won) = Guess::execute_move(&state, &movestr) else {
            panic!("winning move rejected");
        };
        assert_eq!(Guess::status(&won), Status::Solved);

        // Wrong guesses run out the row budget.
        let wrong = format!(
            "G{}",
            std::iter::repeat_n(
                if solution[0] == 1 { "2" } else { "1" },
                params.npegs
            )
            .collect::<Vec<_>>()
            .join(",")
        );
        let MoveResult::Changed(after1) = Guess::execute_move(&state, &wrong) else {
            panic!("legal move rejected");
        };
        assert_eq!(Guess::status(&after1), Status::Active);
        let MoveResult::Changed(after2) = Guess::execute_move(&after1, &wrong) else {
            panic!("legal move rejected");
        };
        assert_eq!(Guess::status(&after2), Status::Lost);

        // Out-of-range colours are a hard reject.
        assert!(matches!(
            Guess::execute_move(&state, "G7,1,1,1"),
            MoveResult::Invalid
        ));
        assert!(matches!(
            Guess::execute_move(&state, "G0,1,1,1"),
            MoveResult::Invalid
        ));
    }

    #[test]
    fn hint_is_lexicographically_first_consistent_row() {
        let params = Guess::default_params();
        let mut rs = RandomState::from_seed(b"guess hint");
        let (desc, _) = Guess::new_desc(&params, &mut rs, false);
        let state = Guess::new_game(&params, &desc);
        let mut ui = Guess::new_ui(&state);

        // With no information, the first consistent row is all-1s.
        compute_hint(&state, &mut ui);
        assert_eq!(ui.curr_pegs.pegs, vec![1; params.npegs]);
        assert!(ui.markable);

        // After the first feedback the next hint must still be
        // consistent with it.
        let MoveResult::Changed(next) = Guess::execute_move(&state, "G1,1,1,1") else {
            panic!("legal move rejected");
        };
        if next.solved == 0 {
            let mut ui = Guess::new_ui(&next);
            compute_hint(&next, &mut ui);
            let mut trial = row(&ui.curr_pegs.pegs);
            mark_pegs(&mut trial, &next.guesses[0], params.ncolours);
            assert_eq!(trial.feedback, next.guesses[0].feedback);
        }
    }

    #[test]
    fn params_encoding_round_trips() {
        for enc in ["c6p4g10Bm", "c8p5g12Bm", "c10p3g5bM"] {
            let mut params = Guess::default_params();
            Guess::decode_params(&mut params, enc);
            Guess::validate_params(&params, true).unwrap();
            assert_eq!(Guess::encode_params(&params, true), enc);
        }
    }

    #[test]
    fn invalid_param_combinations_are_named() {
        let mut params = Guess::default_params();
        params.ncolours = 11;
        assert!(Guess::validate_params(&params, true).is_err());
        params.ncolours = 4;
        params.allow_multiple = false;
        params.npegs = 5;
        assert!(Guess::validate_params(&params, true).is_err());
    }

    #[test]
    fn ui_encoding_keeps_pegs_and_holds() {
        let params = Guess::default_params();
        let mut rs = RandomState::from_seed(b"guess ui");
        let (desc, _) = Guess::new_desc(&params, &mut rs, false);
        let state = Guess::new_game(&params, &desc);
        let mut ui = Guess::new_ui(&state);
        ui.curr_pegs.pegs = vec![3, 0, 5, 1];
        ui.holds = vec![false, true, false, true];
        let encoded = Guess::encode_ui(&ui);
        assert_eq!(encoded, "3,0_,5,1_");

        let mut restored = Guess::new_ui(&state);
        Guess::decode_ui(&mut restored, &encoded);
        assert_eq!(restored.curr_pegs.pegs, ui.curr_pegs.pegs);
        assert_eq!(restored.holds, ui.holds);
    }
}
