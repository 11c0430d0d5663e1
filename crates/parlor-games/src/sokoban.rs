//! Sokoban: push every barrel onto a target square.
//!
//! Generation plays the game in reverse. Starting from an all-goal
//! position on an unexplored grid, the player repeatedly *pulls* a
//! barrel (the inverse of a push), carving space through unexplored
//! cells only when needed; whatever is still unexplored at the end
//! becomes wall. The generator is simplistic and sometimes produces
//! easy levels, but hand-written descriptions play well.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Write as _;

use parlor_core::RandomState;
use parlor_engine::{
    Backend, Button, ConfigItem, ConfigValue, DescError, Draw, FontType, HAlign, MouseButton,
    MoveIntent, MoveResult, ParamsError, Rgb, Status, VAlign, mkhighlight,
};

use crate::DEFAULT_BACKGROUND;

const FLASH_LENGTH: f32 = 0.3;
const PREFERRED_TILESIZE: i32 = 32;

const COL_BACKGROUND: usize = 0;
const COL_TARGET: usize = 1;
const COL_PIT: usize = 2;
const COL_DEEP_PIT: usize = 3;
const COL_BARREL: usize = 4;
const COL_PLAYER: usize = 5;
const COL_TEXT: usize = 6;
const COL_GRID: usize = 7;
const COL_OUTLINE: usize = 8;
const COL_HIGHLIGHT: usize = 9;
const COL_LOWLIGHT: usize = 10;
const COL_WALL: usize = 11;
const NCOLOURS: usize = 12;

// Cell codes double as desc characters. INITIAL appears only during
// generation; a capital letter is a labelled barrel (handy for
// annotated level descriptions), stored as its control-character value
// when resting on a target.
const INITIAL: u8 = b'i';
const SPACE: u8 = b's';
const WALL: u8 = b'w';
const PIT: u8 = b'p';
const DEEP_PIT: u8 = b'd';
const TARGET: u8 = b't';
const BARREL: u8 = b'b';
const BARRELTARGET: u8 = b'f';
const PLAYER: u8 = b'u';
const PLAYERTARGET: u8 = b'v';

fn is_barrel(c: u8) -> bool {
    c == BARREL || c == BARRELTARGET || c.is_ascii_uppercase() || (1..=26).contains(&c)
}

fn is_on_target(c: u8) -> bool {
    c == TARGET || c == BARRELTARGET || c == PLAYERTARGET || (1..=26).contains(&c)
}

fn targetise(b: u8) -> u8 {
    if b == BARREL { BARRELTARGET } else { b - (b'A' - 1) }
}

fn detargetise(b: u8) -> u8 {
    if b == BARRELTARGET { BARREL } else { b + (b'A' - 1) }
}

fn barrel_label(b: u8) -> Option<char> {
    if b.is_ascii_uppercase() {
        Some(char::from(b))
    } else if (1..=26).contains(&b) {
        Some(char::from(b + (b'A' - 1)))
    } else {
        None
    }
}

const DIRS: [(i32, i32); 4] = [(-1, 0), (0, -1), (1, 0), (0, 1)];

/// Marker type implementing the Sokoban backend.
pub struct Sokoban;

/// Shape of a Sokoban game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SokobanParams {
    /// Grid width.
    pub w: usize,
    /// Grid height.
    pub h: usize,
}

/// Full position. The player's square holds SPACE or TARGET in `grid`;
/// the player itself is tracked separately.
#[derive(Debug, Clone)]
pub struct SokobanState {
    params: SokobanParams,
    grid: Vec<u8>,
    px: i32,
    py: i32,
    completed: bool,
}

/// Sokoban has no persistent ui state.
#[derive(Debug, Default)]
pub struct SokobanUi;

/// Per-square cache of the last-drawn cell, with the flash bit mixed
/// in.
#[derive(Debug, Default)]
pub struct SokobanDraw {
    w: usize,
    h: usize,
    tilesize: i32,
    started: bool,
    grid: Vec<u16>,
}

const FLASH_BIT: u16 = 0x100;

struct CandidatePull {
    ox: i32,
    oy: i32,
    nx: i32,
    ny: i32,
    score: i32,
}

/// Reverse-mode level generator. `moves` bounds the number of pulls
/// attempted; unexplored squares left at the end read as walls.
#[allow(clippy::cast_possible_wrap, clippy::too_many_lines)]
fn sokoban_generate(w: usize, h: usize, moves: usize, nethack: bool, rs: &mut RandomState) -> Vec<u8> {
    let (wi, hi) = (w as i32, h as i32);
    let wh = w * h;
    let at = |x: i32, y: i32| (y * wi + x).unsigned_abs() as usize;

    let mut grid = vec![INITIAL; wh];
    for y in 0..h {
        for x in 0..w {
            if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                grid[y * w + x] = WALL;
            }
        }
    }
    if nethack {
        grid[1] = DEEP_PIT;
    }

    let start = rs.upto((w - 2) * (h - 2));
    let mut px = (1 + start % (w - 2)) as i32;
    let mut py = (1 + start / (w - 2)) as i32;
    grid[at(px, py)] = SPACE;

    for _ in 0..=moves {
        // Enumerate every viable pull, including pulls that invent a
        // new barrel out of unexplored ground. The score records how
        // much unexplored terrain the pull itself would consume.
        let mut pulls = Vec::new();
        for y in 0..hi {
            for x in 0..wi {
                for (dx, dy) in DIRS {
                    let (nx, ny) = (x + dx, y + dy);
                    let (npx, npy) = (nx + dx, ny + dy);
                    if npx < 0 || npx >= wi || npy < 0 || npy >= hi {
                        continue;
                    }
                    let mut score = 0;

                    // The pulled square must hold a barrel or be
                    // convertible into one.
                    match grid[at(x, y)] {
                        BARREL | BARRELTARGET => {}
                        INITIAL if !nethack => score += 10,
                        DEEP_PIT if nethack => {}
                        _ => continue,
                    }
                    // Both player squares must be space or become it.
                    match grid[at(nx, ny)] {
                        SPACE | TARGET => {}
                        INITIAL => score += 3,
                        _ => continue,
                    }
                    match grid[at(npx, npy)] {
                        SPACE | TARGET => {}
                        INITIAL => score += 3,
                        _ => continue,
                    }

                    pulls.push(CandidatePull { ox: x, oy: y, nx, ny, score });
                }
            }
        }
        if pulls.is_empty() {
            break;
        }

        // Priority-queue BFS from the player: positive distance only
        // for squares that cost unexplored terrain to reach, so free
        // routes through existing space always win.
        let mut dist = vec![-1i32; wh];
        let mut prev = vec![-1i32; wh];
        let mut heap: BinaryHeap<Reverse<(i32, usize)>> = BinaryHeap::new();
        dist[at(px, py)] = 0;
        heap.push(Reverse((0, at(px, py))));
        while let Some(Reverse((_, i))) = heap.pop() {
            let (x, y) = ((i % w) as i32, (i / w) as i32);
            for (dx, dy) in DIRS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || nx >= wi || ny < 0 || ny >= hi {
                    continue;
                }
                let cell = grid[at(nx, ny)];
                if cell != SPACE && cell != TARGET && cell != INITIAL {
                    continue;
                }
                if dist[at(nx, ny)] == -1 {
                    dist[at(nx, ny)] = dist[i] + i32::from(cell == INITIAL);
                    prev[at(nx, ny)] = i as i32;
                    heap.push(Reverse((dist[at(nx, ny)], at(nx, ny))));
                }
            }
        }

        // Keep only the pulls whose player position is reachable, and
        // fold the cost of carving the route into the score. A pull
        // whose barrel sits on its own approach path is impossible: the
        // same unexplored square cannot become both barrel and space.
        pulls.retain_mut(|p| {
            let d = dist[at(p.nx, p.ny)];
            if d < 0 {
                return false;
            }
            if prev[at(p.nx, p.ny)] == p.oy * wi + p.ox {
                return false;
            }
            p.score += d * 3;
            true
        });
        if pulls.is_empty() {
            break;
        }

        // TODO: weight the choice by score; uniform keeps the levels
        // sparse.
        let pull = &pulls[rs.upto(pulls.len())];

        // Carve the route to the pull position.
        let (mut x, mut y) = (pull.nx, pull.ny);
        while prev[at(x, y)] >= 0 {
            if grid[at(x, y)] == INITIAL {
                grid[at(x, y)] = SPACE;
            }
            let p = prev[at(x, y)];
            y = p / wi;
            x = p % wi;
        }
        px = 2 * pull.nx - pull.ox;
        py = 2 * pull.ny - pull.oy;
        if grid[at(px, py)] == INITIAL {
            grid[at(px, py)] = SPACE;
        }
        grid[at(pull.nx, pull.ny)] = if grid[at(pull.nx, pull.ny)] == TARGET {
            BARRELTARGET
        } else {
            BARREL
        };
        let origin = at(pull.ox, pull.oy);
        if grid[origin] == BARREL {
            grid[origin] = SPACE;
        } else if grid[origin] != DEEP_PIT {
            grid[origin] = TARGET;
        }
    }

    grid[at(px, py)] = if grid[at(px, py)] == TARGET {
        PLAYERTARGET
    } else {
        PLAYER
    };
    grid
}

/// Iterates (cell, run length) pairs of a run-length desc.
fn desc_runs(desc: &str) -> impl Iterator<Item = (u8, usize)> + '_ {
    let bytes = desc.as_bytes();
    let mut i = 0;
    std::iter::from_fn(move || {
        if i >= bytes.len() {
            return None;
        }
        let c = bytes[i];
        i += 1;
        let digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
        let n = if digits == 0 {
            1
        } else {
            let parsed = std::str::from_utf8(&bytes[i..i + digits])
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            i += digits;
            parsed
        };
        Some((c, n))
    })
}

/// Movement analysis shared between interpret and execute: `None` for
/// an illegal move, otherwise whether a barrel gets pushed.
fn move_type(state: &SokobanState, dx: i32, dy: i32) -> Option<bool> {
    #[allow(clippy::cast_possible_wrap)]
    let (w, h) = (state.params.w as i32, state.params.h as i32);
    let at = |x: i32, y: i32| (y * w + x).unsigned_abs() as usize;
    let (nx, ny) = (state.px + dx, state.py + dy);

    if nx < 0 || nx >= w || ny < 0 || ny >= h {
        return None;
    }
    let target = state.grid[at(nx, ny)];
    if target == WALL || target == PIT || target == DEEP_PIT {
        return None;
    }

    if is_barrel(target) {
        // A push, which must be orthogonal, into a square that can
        // accept a barrel.
        if dx != 0 && dy != 0 {
            return None;
        }
        let (nbx, nby) = (nx + dx, ny + dy);
        if nbx < 0 || nbx >= w || nby < 0 || nby >= h {
            return None;
        }
        match state.grid[at(nbx, nby)] {
            SPACE | TARGET | PIT | DEEP_PIT => Some(true),
            _ => None,
        }
    } else {
        // Diagonal movement is a shorthand for two orthogonal moves,
        // so one of the two corner squares must be passable.
        if dx != 0 && dy != 0 {
            let side1 = state.grid[at(state.px, state.py + dy)];
            let side2 = state.grid[at(state.px + dx, state.py)];
            if side1 != SPACE && side1 != TARGET && side2 != SPACE && side2 != TARGET {
                return None;
            }
        }
        Some(false)
    }
}

impl Backend for Sokoban {
    type Params = SokobanParams;
    type State = SokobanState;
    type Ui = SokobanUi;
    type DrawState = SokobanDraw;

    const NAME: &'static str = "Sokoban";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = false;
    const CAN_FORMAT_AS_TEXT: bool = false;
    const WANTS_STATUSBAR: bool = false;
    const IS_TIMED: bool = false;
    const PREFERRED_TILESIZE: i32 = PREFERRED_TILESIZE;

    fn default_params() -> SokobanParams {
        SokobanParams { w: 12, h: 10 }
    }

    fn presets() -> Vec<(String, SokobanParams)> {
        [(12, 10), (16, 12), (20, 16)]
            .into_iter()
            .map(|(w, h)| (format!("{w}x{h}"), SokobanParams { w, h }))
            .collect()
    }

    fn decode_params(params: &mut SokobanParams, string: &str) {
        let mut parts = string.split('x');
        params.w = parts
            .next()
            .and_then(|s| {
                let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
                s[..digits].parse().ok()
            })
            .unwrap_or(0);
        params.h = match parts.next() {
            Some(s) => {
                let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
                s[..digits].parse().unwrap_or(0)
            }
            None => params.w,
        };
    }

    fn encode_params(params: &SokobanParams, _full: bool) -> String {
        format!("{}x{}", params.w, params.h)
    }

    fn configure(params: &SokobanParams) -> Vec<ConfigItem> {
        vec![
            ConfigItem {
                name: "Width".to_owned(),
                value: ConfigValue::String(format!("{}", params.w)),
            },
            ConfigItem {
                name: "Height".to_owned(),
                value: ConfigValue::String(format!("{}", params.h)),
            },
        ]
    }

    fn custom_params(cfg: &[ConfigItem]) -> SokobanParams {
        let field = |i: usize| match cfg.get(i).map(|item| &item.value) {
            Some(ConfigValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        SokobanParams { w: field(0), h: field(1) }
    }

    fn validate_params(params: &SokobanParams, _full: bool) -> Result<(), ParamsError> {
        if params.w < 4 || params.h < 4 {
            return Err(ParamsError::new("Width and height must both be at least 4"));
        }
        Ok(())
    }

    fn new_desc(
        params: &SokobanParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        let (w, h) = (params.w, params.h);
        let grid = sokoban_generate(w, h, w * h, false, rs);

        let mut desc = String::new();
        let mut run: Option<(u8, usize)> = None;
        for &cell in &grid {
            // Untouched squares become walls.
            let c = if cell == INITIAL { WALL } else { cell };
            run = Some(match run {
                Some((prev, n)) if prev == c => (prev, n + 1),
                other => {
                    if let Some((prev, n)) = other {
                        desc.push(char::from(prev));
                        if n > 1 {
                            let _ = write!(desc, "{n}");
                        }
                    }
                    (c, 1)
                }
            });
        }
        if let Some((prev, n)) = run {
            desc.push(char::from(prev));
            if n > 1 {
                let _ = write!(desc, "{n}");
            }
        }
        (desc, None)
    }

    fn validate_desc(params: &SokobanParams, desc: &str) -> Result<(), DescError> {
        let mut area = 0usize;
        let mut nplayers = 0usize;
        for (c, n) in desc_runs(desc) {
            area += n;
            if c == PLAYER || c == PLAYERTARGET {
                nplayers += n;
            } else if !(c == INITIAL
                || c == SPACE
                || c == WALL
                || c == TARGET
                || c == PIT
                || c == DEEP_PIT
                || is_barrel(c))
            {
                return Err(DescError::new("Invalid character in game description"));
            }
        }
        if area > params.w * params.h {
            return Err(DescError::new("Too much data in game description"));
        }
        if area < params.w * params.h {
            return Err(DescError::new("Too little data in game description"));
        }
        if nplayers < 1 {
            return Err(DescError::new("No starting player position specified"));
        }
        if nplayers > 1 {
            return Err(DescError::new(
                "More than one starting player position specified",
            ));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn new_game(params: &SokobanParams, desc: &str) -> SokobanState {
        let w = params.w;
        let mut grid = Vec::with_capacity(w * params.h);
        let (mut px, mut py) = (-1, -1);
        for (c, n) in desc_runs(desc) {
            let c = if c == PLAYER || c == PLAYERTARGET {
                px = (grid.len() % w) as i32;
                py = (grid.len() / w) as i32;
                if is_on_target(c) { TARGET } else { SPACE }
            } else {
                c
            };
            grid.extend(std::iter::repeat_n(c, n));
        }
        SokobanState {
            params: params.clone(),
            grid,
            px,
            py,
            completed: false,
        }
    }

    fn text_format(_state: &SokobanState) -> String {
        String::new()
    }

    fn new_ui(_state: &SokobanState) -> SokobanUi {
        SokobanUi
    }

    fn interpret_move(
        state: &SokobanState,
        _ui: &mut SokobanUi,
        ds: &SokobanDraw,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent {
        // Diagonal movement is NetHack style: movement only, never a
        // push, reachable via the numeric-keypad digits.
        let (dx, dy) = match button {
            Button::CursorUp | Button::Char('8') => (0, -1),
            Button::CursorDown | Button::Char('2') => (0, 1),
            Button::CursorLeft | Button::Char('4') => (-1, 0),
            Button::CursorRight | Button::Char('6') => (1, 0),
            Button::Char('7') => (-1, -1),
            Button::Char('9') => (1, -1),
            Button::Char('1') => (-1, 1),
            Button::Char('3') => (1, 1),
            Button::Down(MouseButton::Left) => {
                let ts = ds.tilesize;
                let border = ts;
                let coord = |c: i32| c * ts + border;
                let mut dx = 0;
                let mut dy = 0;
                if x < coord(state.px) {
                    dx = -1;
                } else if x > coord(state.px + 1) {
                    dx = 1;
                }
                if y < coord(state.py) {
                    dy = -1;
                } else if y > coord(state.py + 1) {
                    dy = 1;
                }
                (dx, dy)
            }
            _ => return MoveIntent::Ignored,
        };
        if dx == 0 && dy == 0 {
            return MoveIntent::Ignored;
        }
        if move_type(state, dx, dy).is_none() {
            return MoveIntent::Ignored;
        }
        // Phone-keypad encoding of the direction.
        let key = char::from_digit((5 - 3 * dy + dx).unsigned_abs(), 10).unwrap_or('5');
        MoveIntent::Move(key.to_string())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn execute_move(from: &SokobanState, movestr: &str) -> MoveResult<SokobanState> {
        let mut chars = movestr.chars();
        let m = match (chars.next(), chars.next()) {
            (Some(c @ '1'..='9'), None) if c != '5' => c as i32 - '0' as i32,
            _ => return MoveResult::Invalid,
        };
        let dx = (m + 2) % 3 - 1;
        let dy = 2 - (m + 2) / 3;
        let Some(push) = move_type(from, dx, dy) else {
            return MoveResult::Invalid;
        };

        let w = from.params.w as i32;
        let at = |x: i32, y: i32| (y * w + x).unsigned_abs() as usize;
        let mut state = from.clone();
        let (nx, ny) = (state.px + dx, state.py + dy);

        if push {
            let (nbx, nby) = (nx + dx, ny + dy);
            let mut b = state.grid[at(nx, ny)];
            if is_on_target(b) {
                state.grid[at(nx, ny)] = TARGET;
                b = detargetise(b);
            } else {
                state.grid[at(nx, ny)] = SPACE;
            }
            match state.grid[at(nbx, nby)] {
                // An ordinary pit fills up; a deep pit just eats the
                // barrel.
                PIT => state.grid[at(nbx, nby)] = SPACE,
                DEEP_PIT => {}
                TARGET => state.grid[at(nbx, nby)] = targetise(b),
                _ => state.grid[at(nbx, nby)] = b,
            }
        }
        state.px = nx;
        state.py = ny;

        // Complete when the position cannot become any more complete:
        // either no barrel is off target, or nothing is left that
        // could accept one.
        if !state.completed {
            let mut freebarrels = false;
            let mut freetargets = false;
            for &v in &state.grid {
                if is_barrel(v) && !is_on_target(v) {
                    freebarrels = true;
                }
                if v == DEEP_PIT || v == PIT || (!is_barrel(v) && is_on_target(v)) {
                    freetargets = true;
                }
            }
            if !freebarrels || !freetargets {
                state.completed = true;
            }
        }
        MoveResult::Changed(state)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn compute_size(params: &SokobanParams, tilesize: i32) -> (i32, i32) {
        let border = tilesize;
        (
            2 * border + 1 + params.w as i32 * tilesize,
            2 * border + 1 + params.h as i32 * tilesize,
        )
    }

    fn set_size(ds: &mut SokobanDraw, _params: &SokobanParams, tilesize: i32) {
        ds.tilesize = tilesize;
    }

    fn colours() -> Vec<Rgb> {
        let (background, highlight, lowlight) = mkhighlight(DEFAULT_BACKGROUND);
        let mut ret = vec![[0.0, 0.0, 0.0]; NCOLOURS];
        ret[COL_BACKGROUND] = background;
        ret[COL_HIGHLIGHT] = highlight;
        ret[COL_LOWLIGHT] = lowlight;
        ret[COL_OUTLINE] = [0.0, 0.0, 0.0];
        ret[COL_PLAYER] = [0.0, 1.0, 0.0];
        ret[COL_BARREL] = [0.6, 0.3, 0.0];
        ret[COL_TARGET] = lowlight;
        ret[COL_PIT] = lowlight.map(|c| c / 2.0);
        ret[COL_DEEP_PIT] = [0.0, 0.0, 0.0];
        ret[COL_TEXT] = [1.0, 1.0, 1.0];
        ret[COL_GRID] = lowlight;
        for i in 0..3 {
            ret[COL_WALL][i] = (3.0 * background[i] + highlight[i]) / 4.0;
        }
        ret
    }

    fn new_drawstate(state: &SokobanState) -> SokobanDraw {
        SokobanDraw {
            w: state.params.w,
            h: state.params.h,
            tilesize: 0,
            started: false,
            grid: vec![u16::MAX; state.params.w * state.params.h],
        }
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    fn redraw(
        draw: &mut Draw,
        ds: &mut SokobanDraw,
        _oldstate: Option<&SokobanState>,
        state: &SokobanState,
        _dir: i32,
        _ui: &SokobanUi,
        _anim_time: f32,
        flash_time: f32,
    ) {
        let (w, h) = (ds.w as i32, ds.h as i32);
        let ts = ds.tilesize;
        let border = ts;
        let coord = |c: i32| c * ts + border;
        let flashtype = if flash_time > 0.0 && (flash_time * 3.0 / FLASH_LENGTH) as i32 % 2 == 0 {
            FLASH_BIT
        } else {
            0
        };

        if !ds.started {
            for y in 0..=h {
                draw.api()
                    .draw_line(coord(0), coord(y), coord(w), coord(y), COL_LOWLIGHT);
            }
            for x in 0..=w {
                draw.api()
                    .draw_line(coord(x), coord(0), coord(x), coord(h), COL_LOWLIGHT);
            }
            ds.started = true;
        }

        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x).unsigned_abs() as usize;
                let mut v = state.grid[i];
                if x == state.px && y == state.py {
                    v = if v == TARGET { PLAYERTARGET } else { PLAYER };
                }
                let v = u16::from(v) | flashtype;
                if ds.grid[i] != v {
                    draw_tile(draw, ds, x, y, v);
                    ds.grid[i] = v;
                }
            }
        }
    }

    fn flash_length(
        oldstate: &SokobanState,
        newstate: &SokobanState,
        _dir: i32,
        _ui: &SokobanUi,
    ) -> f32 {
        if !oldstate.completed && newstate.completed {
            FLASH_LENGTH
        } else {
            0.0
        }
    }

    fn status(state: &SokobanState) -> Status {
        if state.completed {
            Status::Solved
        } else {
            Status::Active
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn draw_tile(draw: &mut Draw, ds: &SokobanDraw, x: i32, y: i32, v: u16) {
    let ts = ds.tilesize;
    let border = ts;
    let tx = x * ts + border;
    let ty = y * ts + border;
    let highlight_width = ts / 10;
    let bg = if v & FLASH_BIT != 0 {
        COL_HIGHLIGHT
    } else {
        COL_BACKGROUND
    };
    let v = (v & 0xFF) as u8;

    draw.api().clip(tx + 1, ty + 1, ts - 1, ts - 1);
    draw.api().draw_rect(tx + 1, ty + 1, ts - 1, ts - 1, bg);

    if v == WALL {
        // Bevelled block: two triangles, then the face.
        draw.api().draw_polygon(
            &[(tx + ts, ty + ts), (tx + ts, ty + 1), (tx + 1, ty + ts)],
            Some(COL_LOWLIGHT),
            COL_LOWLIGHT,
        );
        draw.api().draw_polygon(
            &[(tx + 1, ty + 1), (tx + ts, ty + 1), (tx + 1, ty + ts)],
            Some(COL_HIGHLIGHT),
            COL_HIGHLIGHT,
        );
        draw.api().draw_rect(
            tx + 1 + highlight_width,
            ty + 1 + highlight_width,
            ts - 2 * highlight_width,
            ts - 2 * highlight_width,
            COL_WALL,
        );
    } else if v == PIT {
        draw.api()
            .draw_circle(tx + ts / 2, ty + ts / 2, ts * 3 / 7, Some(COL_PIT), COL_OUTLINE);
    } else if v == DEEP_PIT {
        draw.api().draw_circle(
            tx + ts / 2,
            ty + ts / 2,
            ts * 3 / 7,
            Some(COL_DEEP_PIT),
            COL_OUTLINE,
        );
    } else {
        if is_on_target(v) {
            draw.api().draw_circle(
                tx + ts / 2,
                ty + ts / 2,
                ts * 3 / 7,
                Some(COL_TARGET),
                COL_OUTLINE,
            );
        }
        if v == PLAYER || v == PLAYERTARGET {
            draw.api()
                .draw_circle(tx + ts / 2, ty + ts / 2, ts / 3, Some(COL_PLAYER), COL_OUTLINE);
        } else if is_barrel(v) {
            draw.api()
                .draw_circle(tx + ts / 2, ty + ts / 2, ts / 3, Some(COL_BARREL), COL_OUTLINE);
            if let Some(label) = barrel_label(v) {
                draw.api().draw_text(
                    tx + ts / 2,
                    ty + ts / 2,
                    FontType::Variable,
                    ts / 2,
                    HAlign::Centre,
                    VAlign::Centre,
                    COL_TEXT,
                    &label.to_string(),
                );
            }
        }
    }

    draw.api().unclip();
    draw.api().draw_update(tx, ty, ts, ts);
}

#[cfg(test)]
mod tests {
    use super::*;

    // 5x4 level: the player at (1,1), a barrel at (2,1), the target
    // at (3,1), and a free row below to manoeuvre in.
    const SIMPLE: &str = "w6ubtw2s3w6";

    #[test]
    fn generated_levels_validate_and_balance() {
        let params = SokobanParams { w: 10, h: 8 };
        let mut rs = RandomState::from_seed(b"sokoban generate");
        for _ in 0..3 {
            let (desc, aux) = Sokoban::new_desc(&params, &mut rs, false);
            assert!(aux.is_none());
            Sokoban::validate_desc(&params, &desc).unwrap();

            // Reverse generation leaves one target per barrel.
            let state = Sokoban::new_game(&params, &desc);
            let barrels = state.grid.iter().filter(|&&c| is_barrel(c)).count();
            let targets = state.grid.iter().filter(|&&c| is_on_target(c)).count();
            assert_eq!(barrels, targets);
            assert!(state.px >= 0 && state.py >= 0);
        }
    }

    #[test]
    fn pushes_move_barrels_onto_targets() {
        let params = SokobanParams { w: 5, h: 4 };
        Sokoban::validate_desc(&params, SIMPLE).unwrap();
        let state = Sokoban::new_game(&params, SIMPLE);
        assert_eq!((state.px, state.py), (1, 1));
        assert_eq!(state.grid[1 * 5 + 2], BARREL);

        // Push right: barrel lands on the target and the level is done.
        let MoveResult::Changed(done) = Sokoban::execute_move(&state, "6") else {
            panic!("push rejected");
        };
        assert_eq!((done.px, done.py), (2, 1));
        assert_eq!(done.grid[1 * 5 + 2], SPACE);
        assert_eq!(done.grid[1 * 5 + 3], BARRELTARGET);
        assert!(done.completed);
        assert_eq!(Sokoban::status(&done), Status::Solved);
        assert!(Sokoban::flash_length(&state, &done, 1, &SokobanUi) > 0.0);
    }

    #[test]
    fn walls_and_bad_pushes_are_rejected() {
        let params = SokobanParams { w: 5, h: 4 };
        let state = Sokoban::new_game(&params, SIMPLE);
        // Up and left are walls.
        assert!(matches!(Sokoban::execute_move(&state, "8"), MoveResult::Invalid));
        assert!(matches!(Sokoban::execute_move(&state, "4"), MoveResult::Invalid));
        // '5' is not a direction and longer strings are malformed.
        assert!(matches!(Sokoban::execute_move(&state, "5"), MoveResult::Invalid));
        assert!(matches!(Sokoban::execute_move(&state, "66"), MoveResult::Invalid));
    }

    #[test]
    fn diagonal_moves_never_push() {
        let params = SokobanParams { w: 5, h: 4 };
        let state = Sokoban::new_game(&params, SIMPLE);
        // Down-right is a plain move into open space.
        let MoveResult::Changed(moved) = Sokoban::execute_move(&state, "3") else {
            panic!("diagonal rejected");
        };
        assert_eq!((moved.px, moved.py), (2, 2));
        assert!(!moved.completed);

        // From directly below the player's start, up-right aims at the
        // barrel: a diagonal can never push, so the square is simply
        // not passable.
        let MoveResult::Changed(below) = Sokoban::execute_move(&state, "2") else {
            panic!("move rejected");
        };
        assert_eq!((below.px, below.py), (1, 2));
        assert!(matches!(Sokoban::execute_move(&below, "9"), MoveResult::Invalid));
    }

    #[test]
    fn clicks_resolve_to_directions() {
        let params = SokobanParams { w: 5, h: 4 };
        let state = Sokoban::new_game(&params, SIMPLE);
        let mut ui = SokobanUi;
        let mut ds = Sokoban::new_drawstate(&state);
        Sokoban::set_size(&mut ds, &params, 32);

        // Click well to the right of the player, in line with them.
        let intent = Sokoban::interpret_move(&state, &mut ui, &ds, 32 + 3 * 32 + 16, 32 + 32 + 16, Button::Down(MouseButton::Left));
        assert!(matches!(intent, MoveIntent::Move(ref m) if m == "6"));
        // A click on the player's own square does nothing.
        let intent = Sokoban::interpret_move(&state, &mut ui, &ds, 32 + 32 + 16, 32 + 32 + 16, Button::Down(MouseButton::Left));
        assert!(matches!(intent, MoveIntent::Ignored));
    }

    #[test]
    fn desc_errors_are_specific() {
        let params = SokobanParams { w: 5, h: 4 };
        assert!(Sokoban::validate_desc(&params, "w6ubtw2s3w7").is_err());
        assert!(Sokoban::validate_desc(&params, "w6ubtw2s3w5").is_err());
        assert!(Sokoban::validate_desc(&params, "w6sbtw2s3w6").is_err());
        assert!(Sokoban::validate_desc(&params, "w6ubuw2s3w6").is_err());
        assert!(Sokoban::validate_desc(&params, "x6ubtw2s3w6").is_err());
    }

    #[test]
    fn labelled_barrels_round_trip_through_targets() {
        // A capital letter is a labelled barrel; on a target it is
        // stored as a control character.
        let params = SokobanParams { w: 5, h: 4 };
        let desc = "w6uAtw2s3w6";
        Sokoban::validate_desc(&params, desc).unwrap();
        let state = Sokoban::new_game(&params, desc);
        let MoveResult::Changed(done) = Sokoban::execute_move(&state, "6") else {
            panic!("push rejected");
        };
        assert_eq!(done.grid[1 * 5 + 3], 1);
        assert!(is_barrel(done.grid[1 * 5 + 3]));
        assert!(is_on_target(done.grid[1 * 5 + 3]));
        assert_eq!(barrel_label(done.grid[1 * 5 + 3]), Some('A'));
        assert!(done.completed);
    }

    #[test]
    fn params_encoding_round_trips() {
        let mut params = Sokoban::default_params();
        Sokoban::decode_params(&mut params, "16x12");
        assert_eq!(params, SokobanParams { w: 16, h: 12 });
        assert_eq!(Sokoban::encode_params(&params, true), "16x12");
        // A single number is a square grid.
        Sokoban::decode_params(&mut params, "9");
        assert_eq!(params, SokobanParams { w: 9, h: 9 });
    }
}
