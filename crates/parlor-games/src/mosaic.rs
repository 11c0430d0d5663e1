//! Mosaic (Fill-a-Pix): every clue counts the black cells in its own
//! 3x3 neighbourhood, picture included.
//!
//! Generation draws a random bitmap, computes all clues, verifies the
//! full clue set solves by neighbourhood reasoning alone, then hides
//! every clue the solver never relied on (plus a level-dependent share
//! of the rest).

use std::fmt::Write as _;
use std::sync::Arc;

use log::debug;
use parlor_core::RandomState;
use parlor_engine::{
    Backend, Button, ConfigItem, ConfigValue, DescError, Draw, FontType, HAlign, MouseButton,
    MoveIntent, MoveResult, ParamsError, Rgb, SolveError, Status, VAlign, mkhighlight,
};

use crate::DEFAULT_BACKGROUND;

const DEFAULT_SIZE: usize = 10;
const DEFAULT_LEVEL: u32 = 3;
const SOLVE_MAX_ITERATIONS: usize = 250;
const MAX_TILES: usize = 10000;

const COL_BACKGROUND: usize = 0;
const COL_UNMARKED: usize = 1;
const COL_GRID: usize = 2;
const COL_MARKED: usize = 3;
const COL_BLANK: usize = 4;
const COL_TEXT_SOLVED: usize = 5;
const COL_ERROR: usize = 6;
const COL_LOWLIGHT: usize = 7;
const NCOLOURS: usize = 8;
const COL_TEXT_DARK: usize = COL_MARKED;
const COL_TEXT_LIGHT: usize = COL_BLANK;

/// Cell-state bits. The low two bits are the player's mark; the high
/// bits annotate clue cells after each move.
pub(crate) const STATE_MARKED: u8 = 1;
pub(crate) const STATE_BLANK: u8 = 2;
pub(crate) const STATE_SOLVED: u8 = 4;
pub(crate) const STATE_ERROR: u8 = 8;
/// Modulus for the unmarked/marked/blank toggle cycle.
pub(crate) const STATE_OK_NUM: u8 = STATE_MARKED | STATE_BLANK;

/// Marker type implementing the Mosaic backend.
pub struct Mosaic;

/// Shape of a Mosaic game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicParams {
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
    /// Clue-retention level; 0 strips every clue the solver can do
    /// without.
    pub level: u32,
    /// Reserved for clue sets needing more than neighbourhood
    /// reasoning; generation refuses it.
    pub advanced: bool,
}

/// The immutable clue grid, shared by every state in the history.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Board {
    width: usize,
    height: usize,
    /// Clue per cell, `None` where hidden.
    clues: Vec<Option<u8>>,
}

impl Board {
    fn clue(&self, x: i32, y: i32) -> Option<u8> {
        self.index(x, y).and_then(|i| self.clues[i])
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        in_grid(self.width, self.height, x, y)
    }
}

/// Full position: the player's marks over the shared clue board.
#[derive(Debug, Clone)]
pub struct MosaicState {
    cheating: bool,
    pub(crate) not_completed_clues: usize,
    width: usize,
    height: usize,
    pub(crate) cells: Vec<u8>,
    board: Arc<Board>,
}

/// Drag bookkeeping between press and release.
#[derive(Debug, Default)]
pub struct MosaicUi {
    last: Option<(i32, i32)>,
    /// The mark the whole drag paints, decided by the starting cell.
    last_state: u8,
}

/// Renderer scratch: just the tile size.
#[derive(Debug, Default)]
pub struct MosaicDraw {
    tilesize: i32,
}

/// A generated cell before clue hiding.
#[derive(Debug, Clone, Copy, Default)]
struct DescCell {
    clue: u8,
    shown: bool,
    /// Clue equals its neighbourhood size: everything around is black.
    full: bool,
    /// Clue is zero.
    empty: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct SolutionCell {
    cell: u8,
    solved: bool,
    /// The solver actually applied this clue, so hiding it would break
    /// solvability.
    needed: bool,
}

/// A clue source the solver can run against: either the full generated
/// grid (with full/empty annotations) or a played board.
#[derive(Clone, Copy)]
enum Clues<'a> {
    Generated(&'a [DescCell]),
    Board(&'a Board),
}

impl Clues<'_> {
    fn at(&self, width: usize, x: usize, y: usize) -> DescCell {
        match self {
            Clues::Generated(cells) => cells[y * width + x],
            Clues::Board(board) => {
                let clue = board.clues[y * width + x];
                DescCell {
                    clue: clue.unwrap_or(0),
                    shown: clue.is_some(),
                    full: false,
                    empty: false,
                }
            }
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn in_grid(width: usize, height: usize, x: i32, y: i32) -> Option<usize> {
    if x >= 0 && y >= 0 && x < width as i32 && y < height as i32 {
        Some(y.unsigned_abs() as usize * width + x.unsigned_abs() as usize)
    } else {
        None
    }
}

/// `(marked, blank, total)` over the 3x3 neighbourhood of `(x, y)`.
fn count_around(
    width: usize,
    height: usize,
    cell_of: impl Fn(usize) -> u8,
    x: i32,
    y: i32,
) -> (usize, usize, usize) {
    let (mut marked, mut blank, mut total) = (0, 0, 0);
    for dy in -1..=1 {
        for dx in -1..=1 {
            if let Some(i) = in_grid(width, height, x + dx, y + dy) {
                total += 1;
                let cell = cell_of(i);
                if cell & STATE_BLANK != 0 {
                    blank += 1;
                } else if cell & STATE_MARKED != 0 {
                    marked += 1;
                }
            }
        }
    }
    (marked, blank, total)
}

fn mark_around(width: usize, height: usize, sol: &mut [SolutionCell], x: i32, y: i32, mark: u8) {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if let Some(i) = in_grid(width, height, x + dx, y + dy) {
                if sol[i].cell == 0 {
                    sol[i].cell = mark;
                }
            }
        }
    }
}

/// One deduction step at a single cell. Returns 1 on progress, 0 on
/// none, -1 on contradiction.
fn solve_cell(
    width: usize,
    height: usize,
    clues: Clues<'_>,
    sol: &mut [SolutionCell],
    x: usize,
    y: usize,
) -> i32 {
    let curr = clues.at(width, x, y);
    let i = y * width + x;
    if sol[i].solved {
        return 0;
    }
    #[allow(clippy::cast_possible_wrap)]
    let (xi, yi) = (x as i32, y as i32);
    let (marked, blank, total) = count_around(width, height, |j| sol[j].cell, xi, yi);

    if curr.shown && (curr.full || curr.empty) {
        sol[i].solved = true;
        if marked + blank < total {
            sol[i].needed = true;
        }
        let mark = if curr.full { STATE_MARKED } else { STATE_BLANK };
        mark_around(width, height, sol, xi, yi, mark);
        return 1;
    }
    if curr.shown {
        if usize::from(curr.clue) == marked {
            sol[i].solved = true;
            if total != marked + blank {
                sol[i].needed = true;
            }
            mark_around(width, height, sol, xi, yi, STATE_BLANK);
        } else if usize::from(curr.clue) == total - blank {
            sol[i].solved = true;
            if total != marked + blank {
                sol[i].needed = true;
            }
            mark_around(width, height, sol, xi, yi, STATE_MARKED);
        } else if total == marked + blank {
            // Neighbourhood fully decided but the clue is off.
            return -1;
        } else {
            return 0;
        }
        1
    } else if total == marked + blank {
        sol[i].solved = true;
        1
    } else {
        0
    }
}

/// Runs the per-cell solver to a fixed point. With `rs` the probe order
/// is randomised, which varies which clues end up flagged as needed.
fn solve_check(
    width: usize,
    height: usize,
    clues: Clues<'_>,
    mut rs: Option<&mut RandomState>,
) -> (bool, Vec<SolutionCell>) {
    let size = width * height;
    let mut sol = vec![SolutionCell::default(); size];
    let mut solved = 0usize;
    let mut iter = 0;
    'outer: while solved < size && iter < SOLVE_MAX_ITERATIONS {
        for y in 0..height {
            for x in 0..width {
                let (px, py) = match rs.as_deref_mut() {
                    Some(rs) => (rs.upto(width), rs.upto(height)),
                    None => (x, y),
                };
                match solve_cell(width, height, clues, &mut sol, px, py) {
                    -1 => {
                        debug!("contradiction near ({px},{py})");
                        break 'outer;
                    }
                    n => solved += n.unsigned_abs() as usize,
                }
            }
        }
        iter += 1;
    }
    (solved == size, sol)
}

/// Hides every clue the reference solve never needed, keeping a
/// level-dependent fraction of them as slack. Level 0 takes the best of
/// three randomised solves and strips everything else.
fn hide_clues(
    width: usize,
    height: usize,
    desc: &mut [DescCell],
    rs: &mut RandomState,
    level: u32,
) {
    let (_, mut sol) = solve_check(width, height, Clues::Generated(desc), Some(rs));
    if level == 0 {
        let needed = |s: &[SolutionCell]| s.iter().filter(|c| c.needed).count();
        for _ in 0..2 {
            let (_, other) = solve_check(width, height, Clues::Generated(desc), Some(rs));
            if needed(&other) < needed(&sol) {
                sol = other;
            }
        }
    }
    for i in 0..width * height {
        if !sol[i].needed && (level == 0 || rs.upto(level as usize) <= 1) {
            desc[i].shown = false;
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn populate_cell(width: usize, height: usize, image: &[bool], x: usize, y: usize) -> DescCell {
    let mut clue = 0u8;
    let mut total = 0u8;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if let Some(i) = in_grid(width, height, x as i32 + dx, y as i32 + dy) {
                total += 1;
                clue += u8::from(image[i]);
            }
        }
    }
    DescCell {
        clue,
        shown: true,
        full: clue > 0 && clue == total,
        empty: clue == 0,
    }
}

/// Runs of hidden cells compress to `a`..`z` (1 to 26); clue cells are
/// their digit.
fn compress_desc(width: usize, height: usize, desc: &[DescCell]) -> String {
    let mut out = String::new();
    let mut gap = 0u32;
    for cell in &desc[..width * height] {
        if cell.shown {
            if gap > 0 {
                out.push(char::from(b'a' + u8::try_from(gap - 1).unwrap_or(25)));
                gap = 0;
            }
            out.push(char::from(b'0' + cell.clue));
        } else {
            gap += 1;
            if gap == 26 {
                out.push('z');
                gap = 0;
            }
        }
    }
    if gap > 0 {
        out.push(char::from(b'a' + u8::try_from(gap - 1).unwrap_or(25)));
    }
    out
}

impl MosaicState {
    fn count_state_around(&self, x: i32, y: i32) -> (usize, usize, usize) {
        count_around(self.width, self.height, |i| self.cells[i], x, y)
    }

    /// Refreshes the solved/error annotation of every shown clue around
    /// `(x, y)` after the cell there changed.
    fn update_board_around(&mut self, x: i32, y: i32) {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (cx, cy) = (x + dx, y + dy);
                let Some(i) = self.board.index(cx, cy) else {
                    continue;
                };
                let Some(clue) = self.board.clues[i] else {
                    continue;
                };
                let (marked, blank, total) = self.count_state_around(cx, cy);
                let clue = usize::from(clue);
                self.cells[i] &= STATE_MARKED | STATE_BLANK;
                if clue == marked && total - marked - blank == 0 {
                    self.cells[i] |= STATE_SOLVED;
                } else if clue < marked || clue > total - blank {
                    self.cells[i] |= STATE_ERROR;
                }
            }
        }
    }

    fn recount_clues(&mut self) {
        self.not_completed_clues = (0..self.width * self.height)
            .filter(|&i| self.board.clues[i].is_some() && self.cells[i] & STATE_SOLVED == 0)
            .count();
    }
}

fn parse_coords(body: &str, n: usize) -> Option<Vec<i32>> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != n {
        return None;
    }
    fields.iter().map(|f| f.parse().ok()).collect()
}

fn draw_cell(draw: &mut Draw, ds: &MosaicDraw, state: &MosaicState, x: i32, y: i32, flashing: bool) {
    let ts = ds.tilesize;
    let startx = x * ts + ts / 2 - 1;
    let starty = y * ts + ts / 2 - 1;
    let Some(i) = state.board.index(x, y) else {
        return;
    };
    let mut cell = state.cells[i];
    if flashing {
        cell ^= STATE_BLANK | STATE_MARKED;
    }

    draw.rect_outline(startx - 1, starty - 1, ts + 1, ts + 1, COL_GRID);

    let (colour, mut text_colour) = if cell & STATE_MARKED != 0 {
        (COL_MARKED, COL_TEXT_LIGHT)
    } else if cell & STATE_BLANK != 0 {
        (COL_BLANK, COL_TEXT_DARK)
    } else {
        (COL_UNMARKED, COL_TEXT_DARK)
    };
    if cell & STATE_ERROR != 0 {
        text_colour = COL_ERROR;
    } else if cell & STATE_SOLVED != 0 {
        text_colour = COL_TEXT_SOLVED;
    }

    draw.api().draw_rect(startx, starty, ts - 1, ts - 1, colour);
    if let Some(clue) = state.board.clues[i] {
        draw.api().draw_text(
            startx + ts / 2,
            starty + ts / 2,
            FontType::Variable,
            ts * 3 / 5,
            HAlign::Centre,
            VAlign::Centre,
            text_colour,
            &format!("{clue}"),
        );
    }
}

impl Backend for Mosaic {
    type Params = MosaicParams;
    type State = MosaicState;
    type Ui = MosaicUi;
    type DrawState = MosaicDraw;

    const NAME: &'static str = "Mosaic";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = true;
    const CAN_FORMAT_AS_TEXT: bool = true;
    const WANTS_STATUSBAR: bool = true;
    const IS_TIMED: bool = true;
    const PREFERRED_TILESIZE: i32 = 32;

    fn default_params() -> MosaicParams {
        MosaicParams {
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
            level: DEFAULT_LEVEL,
            advanced: false,
        }
    }

    fn presets() -> Vec<(String, MosaicParams)> {
        [(3, 3), (3, 1), (10, 3), (15, 2), (25, 3), (50, 4)]
            .into_iter()
            .map(|(size, level)| {
                (
                    format!("Size: {size}x{size}, level: {level}"),
                    MosaicParams {
                        width: size,
                        height: size,
                        level,
                        advanced: false,
                    },
                )
            })
            .collect()
    }

    fn decode_params(params: &mut MosaicParams, string: &str) {
        *params = Self::default_params();
        let mut rest = string;
        let mut number = |rest: &mut &str| {
            let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            let n = rest[..digits].parse().unwrap_or(0);
            *rest = &rest[digits..];
            n
        };
        params.width = number(&mut rest);
        if let Some(r) = rest.strip_prefix('x') {
            rest = r;
            params.height = number(&mut rest);
        }
        if let Some(r) = rest.strip_prefix('l') {
            rest = r;
            params.level = u32::try_from(number(&mut rest)).unwrap_or(0);
        }
        if let Some(r) = rest.strip_prefix('a') {
            rest = r;
            params.advanced = number(&mut rest) != 0;
        }
    }

    fn encode_params(params: &MosaicParams, full: bool) -> String {
        if full {
            format!(
                "{}x{}l{}a{}",
                params.width,
                params.height,
                params.level,
                u8::from(params.advanced)
            )
        } else {
            format!(
                "{}x{}a{}",
                params.width,
                params.height,
                u8::from(params.advanced)
            )
        }
    }

    fn configure(params: &MosaicParams) -> Vec<ConfigItem> {
        vec![
            ConfigItem {
                name: "Height".to_owned(),
                value: ConfigValue::String(format!("{}", params.height)),
            },
            ConfigItem {
                name: "Width".to_owned(),
                value: ConfigValue::String(format!("{}", params.width)),
            },
            ConfigItem {
                name: "Level".to_owned(),
                value: ConfigValue::String(format!("{}", params.level)),
            },
            ConfigItem {
                name: "Advanced (unsupported)".to_owned(),
                value: ConfigValue::Boolean(params.advanced),
            },
        ]
    }

    fn custom_params(cfg: &[ConfigItem]) -> MosaicParams {
        let number = |i: usize| match cfg.get(i).map(|item| &item.value) {
            Some(ConfigValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let advanced = matches!(
            cfg.get(3).map(|item| &item.value),
            Some(&ConfigValue::Boolean(b)) if b
        );
        MosaicParams {
            height: number(0),
            width: number(1),
            level: u32::try_from(number(2)).unwrap_or(0),
            advanced,
        }
    }

    fn validate_params(params: &MosaicParams, full: bool) -> Result<(), ParamsError> {
        if params.advanced && full {
            return Err(ParamsError::new("Cannot generate advanced puzzle"));
        }
        if params.height < 3 || params.width < 3 {
            return Err(ParamsError::new("Minimal size is 3x3"));
        }
        if params.height * params.width > MAX_TILES {
            return Err(ParamsError::new("Maximum size is 10000 tiles"));
        }
        Ok(())
    }

    fn new_desc(
        params: &MosaicParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        let (width, height) = (params.width, params.height);
        let size = width * height;
        let mut desc = vec![DescCell::default(); size];
        loop {
            let image: Vec<bool> = (0..size).map(|_| rs.bits(1) != 0).collect();
            for y in 0..height {
                for x in 0..width {
                    desc[y * width + x] = populate_cell(width, height, &image, x, y);
                }
            }
            // A solve must be able to start somewhere.
            if !desc.iter().any(|c| c.empty || c.full) {
                continue;
            }
            let (solvable, _) = solve_check(width, height, Clues::Generated(&desc), Some(rs));
            if solvable {
                break;
            }
        }
        hide_clues(width, height, &mut desc, rs, params.level);
        (compress_desc(width, height, &desc), None)
    }

    fn validate_desc(params: &MosaicParams, desc: &str) -> Result<(), DescError> {
        let mut length = 0usize;
        for c in desc.chars() {
            match c {
                'a'..='z' => length += c as usize - 'a' as usize + 1,
                '0'..='9' | ' ' => length += 1,
                _ => return Err(DescError::new("Desc size mismatch")),
            }
        }
        if length != params.width * params.height {
            return Err(DescError::new("Desc size mismatch"));
        }
        Ok(())
    }

    fn new_game(params: &MosaicParams, desc: &str) -> MosaicState {
        let size = params.width * params.height;
        let mut clues = Vec::with_capacity(size);
        let mut shown = 0;
        for c in desc.chars() {
            match c {
                '0'..='9' => {
                    clues.push(Some(c as u8 - b'0'));
                    shown += 1;
                }
                ' ' => clues.push(None),
                'a'..='z' => {
                    for _ in 0..(c as usize - 'a' as usize + 1) {
                        clues.push(None);
                    }
                }
                _ => {}
            }
        }
        clues.resize(size, None);
        MosaicState {
            cheating: false,
            not_completed_clues: shown,
            width: params.width,
            height: params.height,
            cells: vec![0; size],
            board: Arc::new(Board {
                width: params.width,
                height: params.height,
                clues,
            }),
        }
    }

    fn solve(
        state: &MosaicState,
        _currstate: &MosaicState,
        _aux: Option<&str>,
    ) -> Result<String, SolveError> {
        let (solved, sol) = solve_check(
            state.width,
            state.height,
            Clues::Board(&state.board),
            None,
        );
        if !solved {
            return Err(SolveError::new("Could not solve this board"));
        }
        // Pack the marked bitmap MSB-first, two hex digits per byte.
        let mut out = String::from("s");
        for chunk in sol.chunks(8) {
            let mut byte = 0u8;
            for (bit, cell) in chunk.iter().enumerate() {
                if cell.cell == STATE_MARKED {
                    byte |= 0x80 >> bit;
                }
            }
            let _ = write!(out, "{byte:02x}");
        }
        Ok(out)
    }

    fn can_format_as_text_now(_params: &MosaicParams) -> bool {
        true
    }

    #[allow(clippy::cast_possible_wrap)]
    fn text_format(state: &MosaicState) -> String {
        let mut out = String::new();
        for y in 0..state.height {
            for x in 0..state.width {
                match state.board.clue(x as i32, y as i32) {
                    Some(clue) => {
                        let _ = write!(out, "|{clue}|");
                    }
                    None => out.push_str("| |"),
                }
            }
            out.push('\n');
        }
        out
    }

    fn new_ui(_state: &MosaicState) -> MosaicUi {
        MosaicUi::default()
    }

    fn interpret_move(
        state: &MosaicState,
        ui: &mut MosaicUi,
        ds: &MosaicDraw,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent {
        if state.not_completed_clues == 0 {
            return MoveIntent::Ignored;
        }
        if ds.tilesize == 0 {
            return MoveIntent::Ignored;
        }
        let gx = (x - ds.tilesize / 2) / ds.tilesize;
        let gy = (y - ds.tilesize / 2) / ds.tilesize;
        let in_bounds = state.board.index(gx, gy).is_some();

        match button {
            Button::Down(b @ (MouseButton::Left | MouseButton::Right)) => {
                if let Some(i) = state.board.index(gx, gy) {
                    let steps = if b == MouseButton::Right { 2 } else { 1 };
                    ui.last_state = ((state.cells[i] & STATE_OK_NUM) + steps) % STATE_OK_NUM;
                }
                if in_bounds {
                    ui.last = Some((gx, gy));
                    let t = if b == MouseButton::Right { 'T' } else { 't' };
                    MoveIntent::Move(format!("{t}{gx},{gy}"))
                } else {
                    ui.last = None;
                    MoveIntent::Ignored
                }
            }
            Button::Drag(MouseButton::Left | MouseButton::Right) => {
                // Straight lines only.
                match ui.last {
                    Some((lx, ly)) if in_bounds && (gx == lx || gy == ly) => {
                        let m = format!("d{gx},{gy},{lx},{ly},{}", ui.last_state);
                        ui.last = Some((gx, gy));
                        MoveIntent::Move(m)
                    }
                    _ => {
                        ui.last = None;
                        MoveIntent::Ignored
                    }
                }
            }
            Button::Release(MouseButton::Left | MouseButton::Right) => match ui.last {
                Some((lx, ly)) if in_bounds && (gx == lx || gy == ly) => {
                    MoveIntent::Move(format!("e{gx},{gy},{lx},{ly},{}", ui.last_state))
                }
                _ => {
                    ui.last = None;
                    MoveIntent::Ignored
                }
            },
            _ => MoveIntent::Ignored,
        }
    }

    fn execute_move(from: &MosaicState, movestr: &str) -> MoveResult<MosaicState> {
        let mut state = from.clone();
        let Some(kind) = movestr.chars().next() else {
            return MoveResult::Invalid;
        };
        let body = &movestr[1..];
        match kind {
            't' | 'T' => {
                let Some(coords) = parse_coords(body, 2) else {
                    return MoveResult::Invalid;
                };
                let (x, y) = (coords[0], coords[1]);
                let Some(i) = state.board.index(x, y) else {
                    return MoveResult::Invalid;
                };
                let steps = if kind == 'T' { 2 } else { 1 };
                state.cells[i] = ((state.cells[i] & STATE_OK_NUM) + steps) % STATE_OK_NUM;
                state.update_board_around(x, y);
            }
            'd' | 'e' => {
                let Some(coords) = parse_coords(body, 5) else {
                    return MoveResult::Invalid;
                };
                let (x, y, sx, sy) = (coords[0], coords[1], coords[2], coords[3]);
                let Ok(paint) = u8::try_from(coords[4]) else {
                    return MoveResult::Invalid;
                };
                let (dx, dy, diff) = if sx == x && sy != y {
                    (0, if sy < y { -1 } else { 1 }, (sy - y).abs())
                } else {
                    (if sx < x { -1 } else { 1 }, 0, (sx - x).abs())
                };
                for step in 0..diff {
                    let (cx, cy) = (x + dx * step, y + dy * step);
                    let Some(i) = state.board.index(cx, cy) else {
                        return MoveResult::Invalid;
                    };
                    if state.cells[i] & STATE_OK_NUM == 0 {
                        state.cells[i] = paint & STATE_OK_NUM;
                        state.update_board_around(cx, cy);
                    }
                }
            }
            's' => {
                state.cheating = true;
                let mut loc = 0usize;
                let size = state.width * state.height;
                let mut digits = body.chars();
                'apply: loop {
                    let mut byte = 0u8;
                    for _ in 0..2 {
                        let Some(d) = digits.next().and_then(|c| c.to_digit(16)) else {
                            break 'apply;
                        };
                        byte = byte << 4 | u8::try_from(d).unwrap_or(0);
                    }
                    for bit in 0..8 {
                        if loc >= size {
                            break 'apply;
                        }
                        state.cells[loc] = if byte & (0x80 >> bit) != 0 {
                            STATE_MARKED | STATE_SOLVED
                        } else {
                            STATE_BLANK | STATE_SOLVED
                        };
                        loc += 1;
                    }
                }
                state.not_completed_clues = 0;
                return MoveResult::Changed(state);
            }
            _ => return MoveResult::Invalid,
        }
        state.recount_clues();
        MoveResult::Changed(state)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn compute_size(params: &MosaicParams, tilesize: i32) -> (i32, i32) {
        (
            (params.width as i32 + 1) * tilesize,
            (params.height as i32 + 1) * tilesize,
        )
    }

    fn set_size(ds: &mut MosaicDraw, _params: &MosaicParams, tilesize: i32) {
        ds.tilesize = tilesize;
    }

    fn colours() -> Vec<Rgb> {
        let (background, _, lowlight) = mkhighlight(DEFAULT_BACKGROUND);
        let mut ret = vec![[0.0, 0.0, 0.0]; NCOLOURS];
        ret[COL_BACKGROUND] = background;
        ret[COL_GRID] = [0.0, 102.0 / 255.0, 99.0 / 255.0];
        ret[COL_ERROR] = [1.0, 0.0, 0.0];
        ret[COL_BLANK] = [236.0 / 255.0; 3];
        ret[COL_MARKED] = [20.0 / 255.0; 3];
        ret[COL_UNMARKED] = [148.0 / 255.0, 196.0 / 255.0, 190.0 / 255.0];
        ret[COL_TEXT_SOLVED] = [100.0 / 255.0; 3];
        ret[COL_LOWLIGHT] = lowlight;
        ret
    }

    fn new_drawstate(_state: &MosaicState) -> MosaicDraw {
        MosaicDraw::default()
    }

    #[allow(clippy::cast_possible_wrap)]
    fn redraw(
        draw: &mut Draw,
        ds: &mut MosaicDraw,
        _oldstate: Option<&MosaicState>,
        state: &MosaicState,
        _dir: i32,
        _ui: &MosaicUi,
        _anim_time: f32,
        flash_time: f32,
    ) {
        let w = (state.width as i32 + 1) * ds.tilesize;
        let h = (state.height as i32 + 1) * ds.tilesize;
        let flashing = flash_time > 0.0;
        draw.api().draw_rect(
            0,
            0,
            w,
            h,
            if flashing { COL_BLANK } else { COL_BACKGROUND },
        );
        for y in 0..state.height as i32 {
            for x in 0..state.width as i32 {
                draw_cell(draw, ds, state, x, y, flashing);
            }
        }
        draw.api().draw_update(0, 0, w, h);

        let status = if state.not_completed_clues > 0 {
            format!("Clues left: {}", state.not_completed_clues)
        } else if state.cheating {
            "Auto solved".to_owned()
        } else {
            "COMPLETED!".to_owned()
        };
        draw.status_bar(&status);
    }

    fn flash_length(
        oldstate: &MosaicState,
        newstate: &MosaicState,
        _dir: i32,
        _ui: &MosaicUi,
    ) -> f32 {
        if !oldstate.cheating
            && oldstate.not_completed_clues > 0
            && newstate.not_completed_clues == 0
        {
            0.7
        } else {
            0.0
        }
    }

    fn status(state: &MosaicState) -> Status {
        if state.not_completed_clues == 0 {
            Status::Solved
        } else {
            Status::Active
        }
    }

    fn timing_state(state: &MosaicState, _ui: &MosaicUi) -> bool {
        state.not_completed_clues > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_engine::Midend;

    fn params(width: usize, height: usize) -> MosaicParams {
        MosaicParams {
            width,
            height,
            level: DEFAULT_LEVEL,
            advanced: false,
        }
    }

    #[test]
    fn generated_boards_validate_and_solve() {
        let mut rs = RandomState::from_seed(b"mosaic gen");
        for _ in 0..3 {
            let p = params(5, 5);
            let (desc, _) = Mosaic::new_desc(&p, &mut rs, false);
            Mosaic::validate_desc(&p, &desc).unwrap();
            let state = Mosaic::new_game(&p, &desc);
            let movestr = Mosaic::solve(&state, &state, None).unwrap();
            let MoveResult::Changed(done) = Mosaic::execute_move(&state, &movestr) else {
                panic!("solve move rejected");
            };
            assert_eq!(done.not_completed_clues, 0);
            assert!(done.cheating);
        }
    }

    #[test]
    fn desc_gaps_are_run_length_letters() {
        // 3x3, clues only in the corners: 4 at (0,0) means gap of 26
        // never occurs here, just a..z arithmetic.
        let p = params(3, 3);
        Mosaic::validate_desc(&p, "4g2").unwrap();
        Mosaic::validate_desc(&p, "444444444").unwrap();
        assert!(Mosaic::validate_desc(&p, "4g3").is_err());
        assert!(Mosaic::validate_desc(&p, "4z").is_err());

        let state = Mosaic::new_game(&p, "4g2");
        assert_eq!(state.board.clue(0, 0), Some(4));
        assert_eq!(state.board.clue(2, 2), Some(2));
        assert_eq!(state.not_completed_clues, 2);
        assert!((1..8).all(|i| state.board.clues[i].is_none()));
    }

    #[test]
    fn toggles_cycle_and_right_button_skips() {
        let p = params(3, 3);
        let state = Mosaic::new_game(&p, "i");
        let MoveResult::Changed(once) = Mosaic::execute_move(&state, "t1,1") else {
            panic!("toggle rejected");
        };
        assert_eq!(once.cells[4] & STATE_OK_NUM, STATE_MARKED);
        let MoveResult::Changed(twice) = Mosaic::execute_move(&once, "t1,1") else {
            panic!("toggle rejected");
        };
        assert_eq!(twice.cells[4] & STATE_OK_NUM, STATE_BLANK);
        let MoveResult::Changed(thrice) = Mosaic::execute_move(&twice, "t1,1") else {
            panic!("toggle rejected");
        };
        assert_eq!(thrice.cells[4] & STATE_OK_NUM, 0);

        let MoveResult::Changed(skip) = Mosaic::execute_move(&state, "T1,1") else {
            panic!("toggle rejected");
        };
        assert_eq!(skip.cells[4] & STATE_OK_NUM, STATE_BLANK);
    }

    #[test]
    fn drags_paint_only_undecided_cells() {
        let p = params(3, 3);
        let state = Mosaic::new_game(&p, "i");
        let MoveResult::Changed(seeded) = Mosaic::execute_move(&state, "t1,0") else {
            panic!("toggle rejected");
        };
        // Paint the whole top row blank; the seeded mark survives.
        let MoveResult::Changed(painted) =
            Mosaic::execute_move(&seeded, &format!("e2,0,0,0,{STATE_BLANK}"))
        else {
            panic!("drag rejected");
        };
        assert_eq!(painted.cells[0] & STATE_OK_NUM, STATE_BLANK);
        assert_eq!(painted.cells[1] & STATE_OK_NUM, STATE_MARKED);
        assert_eq!(painted.cells[2] & STATE_OK_NUM, STATE_BLANK);
    }

    #[test]
    fn clue_violations_are_flagged() {
        // Centre clue 0, so marking any neighbour is an error.
        let p = params(3, 3);
        let state = Mosaic::new_game(&p, "d0d");
        let MoveResult::Changed(bad) = Mosaic::execute_move(&state, "t0,0") else {
            panic!("toggle rejected");
        };
        assert_ne!(bad.cells[4] & STATE_ERROR, 0);
        let MoveResult::Changed(fixed) = Mosaic::execute_move(&bad, "T0,0") else {
            panic!("toggle rejected");
        };
        assert_eq!(fixed.cells[4] & STATE_ERROR, 0);
    }

    #[test]
    fn params_encoding_round_trips() {
        let mut p = Mosaic::default_params();
        Mosaic::decode_params(&mut p, "15x12l2a0");
        assert_eq!(
            p,
            MosaicParams {
                width: 15,
                height: 12,
                level: 2,
                advanced: false,
            }
        );
        assert_eq!(Mosaic::encode_params(&p, true), "15x12l2a0");
        assert_eq!(Mosaic::encode_params(&p, false), "15x12a0");
    }

    #[test]
    fn session_survives_save_and_load() {
        let mut me: Midend<Mosaic> = Midend::with_seed(None, b"mosaic session");
        me.set_game_id("5x5a0#123123123123123").unwrap();
        me.new_game().unwrap();
        let ts = Mosaic::PREFERRED_TILESIZE;
        me.size(6 * ts, 6 * ts, false);
        // Click three cells along the top row.
        let ts = me.tilesize();
        for i in 0..3 {
            let x = ts / 2 + i * ts + 1;
            assert!(me.process_key(x, ts / 2 + 1, Button::Down(MouseButton::Left)));
            assert!(me.process_key(x, ts / 2 + 1, Button::Release(MouseButton::Left)));
        }
        assert!(me.num_states() > 1);

        let saved = me.serialise();
        let mut restored: Midend<Mosaic> = Midend::with_seed(None, b"other");
        restored.deserialise(saved.as_bytes()).unwrap();
        assert_eq!(restored.get_game_id(), me.get_game_id());
        assert_eq!(restored.num_states(), me.num_states());
        assert_eq!(
            restored.current_state().unwrap().cells,
            me.current_state().unwrap().cells
        );
    }
}
