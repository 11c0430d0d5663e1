//! Dominosa: place every domino up to double-n exactly once so the
//! numbers match the clue grid.
//!
//! The board is always (n+2) x (n+1). Generation lays a random perfect
//! domino tiling, deals the shuffled domino set onto it, and (for
//! unique puzzles) rejects any grid the placement-elimination solver
//! cannot pin down to a single solution.

use std::fmt::Write as _;
use std::sync::Arc;

use log::debug;
use parlor_core::RandomState;
use parlor_engine::{
    Backend, Button, ConfigItem, ConfigValue, DescError, Draw, FontType, HAlign, MouseButton,
    MoveIntent, MoveResult, ParamsError, Rgb, SolveError, Status, VAlign, mkhighlight,
    move_cursor,
};

use crate::DEFAULT_BACKGROUND;

const FLASH_TIME: f32 = 0.13;
const PREFERRED_TILESIZE: i32 = 32;

const COL_BACKGROUND: usize = 0;
const COL_TEXT: usize = 1;
const COL_DOMINO: usize = 2;
const COL_DOMINOCLASH: usize = 3;
const COL_DOMINOTEXT: usize = 4;
const COL_EDGE: usize = 5;
const COL_CURSOR: usize = 6;
const COL_DOMINOCURSOR: usize = 7;
const COL_HIGHLIGHT_1: usize = 8;
const COL_HIGHLIGHT_2: usize = 9;
const NCOLOURS: usize = 10;

const EDGE_L: u16 = 0x100;
const EDGE_R: u16 = 0x200;
const EDGE_T: u16 = 0x400;
const EDGE_B: u16 = 0x800;

/// nth triangular number.
const fn tri(n: usize) -> usize {
    n * (n + 1) / 2
}

/// Number of dominoes in a double-n set.
const fn dcount(n: usize) -> usize {
    tri(n + 1)
}

/// Maps an unordered pair of face values to a unique domino index.
fn dindex(n1: usize, n2: usize) -> usize {
    tri(n1.max(n2)) + n1.min(n2)
}

/// Marker type implementing the Dominosa backend.
pub struct Dominosa;

/// Shape of a Dominosa game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominosaParams {
    /// Highest face value in the domino set.
    pub n: usize,
    /// Whether generation insists on a unique solution.
    pub unique: bool,
}

impl DominosaParams {
    fn w(&self) -> usize {
        self.n + 2
    }
    fn h(&self) -> usize {
        self.n + 1
    }
}

/// Full position: domino pairings and marked edges over the shared
/// number grid.
#[derive(Debug, Clone)]
pub struct DominosaState {
    params: DominosaParams,
    w: usize,
    h: usize,
    numbers: Arc<Vec<usize>>,
    /// `grid[i] == j` pairs squares i and j into a domino; a square
    /// paired with itself is empty.
    pub(crate) grid: Vec<usize>,
    pub(crate) edges: Vec<u16>,
    pub(crate) completed: bool,
    cheated: bool,
}

/// Cursor and number-highlight state.
#[derive(Debug)]
pub struct DominosaUi {
    /// Cursor on the (2w-1) x (2h-1) lattice of squares and edges.
    cur_x: i32,
    cur_y: i32,
    cur_visible: bool,
    highlight_1: Option<usize>,
    highlight_2: Option<usize>,
}

/// Per-square cache of the last-drawn tile flags.
#[derive(Debug, Default)]
pub struct DominosaDraw {
    started: bool,
    w: usize,
    h: usize,
    tilesize: i32,
    visible: Vec<u32>,
}

// Tile type and annotation bits for the drawstate cache.
const TYPE_L: u32 = 0;
const TYPE_R: u32 = 1;
const TYPE_T: u32 = 2;
const TYPE_B: u32 = 3;
const TYPE_BLANK: u32 = 4;
const TYPE_MASK: u32 = 0x0F;
const DF_HIGHLIGHT_1: u32 = 0x10;
const DF_HIGHLIGHT_2: u32 = 0x20;
const DF_FLASH: u32 = 0x40;
const DF_CLASH: u32 = 0x80;
const DF_CURSOR: u32 = 0x1000;
const DF_CURSOR_USEFUL: u32 = 0x2000;
const DF_CURSOR_XBASE: u32 = 0x10000;
const DF_CURSOR_YBASE: u32 = 0x40000;

/// Lays a random perfect 2x1 tiling of a w x h rectangle. Returns the
/// pairing array; with odd area one square pairs with itself.
fn domino_layout(w: usize, h: usize, rs: &mut RandomState) -> Vec<usize> {
    let wh = w * h;
    let mut grid: Vec<usize> = (0..wh).collect();

    // Greedy pass over a shuffled list of all placements. Vertical
    // placement with top at i is 2i, horizontal with left at i is 2i+1.
    let mut list = Vec::with_capacity(2 * wh - h - w);
    for y in 0..h - 1 {
        for x in 0..w {
            list.push(2 * (y * w + x));
        }
    }
    for y in 0..h {
        for x in 0..w - 1 {
            list.push(2 * (y * w + x) + 1);
        }
    }
    rs.shuffle(&mut list);
    for &p in &list {
        let xy = p / 2;
        let xy2 = xy + if p % 2 == 1 { 1 } else { w };
        if grid[xy] == xy && grid[xy2] == xy2 {
            grid[xy] = xy2;
            grid[xy2] = xy;
        }
    }

    // Pair off the remaining singletons two at a time: breadth-first
    // search from one singleton to another, stepping through dominoes,
    // then re-lay every domino on the path shifted up by one. Parity
    // guarantees the endpoints have opposite chessboard colours.
    let mut dist = vec![-1i32; wh];
    let mut back = vec![0usize; wh];
    let mut queue = Vec::with_capacity(wh);
    loop {
        let singles = grid.iter().enumerate().filter(|&(i, &v)| i == v).count();
        if singles == wh % 2 {
            break;
        }
        let start = grid
            .iter()
            .enumerate()
            .rfind(|&(i, &v)| i == v)
            .map_or(0, |(i, _)| i);

        dist.fill(-1);
        dist[start] = 0;
        queue.clear();
        queue.push(start);
        let mut done = 0;
        let mut found = None;
        while done < queue.len() {
            let i = queue[done];
            done += 1;
            let (x, y) = (i % w, i / w);
            let mut neigh = [0usize; 4];
            let mut nd = 0;
            if x > 0 {
                neigh[nd] = i - 1;
                nd += 1;
            }
            if x + 1 < w {
                neigh[nd] = i + 1;
                nd += 1;
            }
            if y > 0 {
                neigh[nd] = i - w;
                nd += 1;
            }
            if y + 1 < h {
                neigh[nd] = i + w;
                nd += 1;
            }
            // Randomise to avoid directional bias in the final tiling.
            rs.shuffle(&mut neigh[..nd]);

            let mut hit = None;
            for &k in &neigh[..nd] {
                if grid[k] == k && k != start {
                    back[k] = i;
                    hit = Some(k);
                    break;
                }
                let m = grid[k];
                if m != k && (dist[m] < 0 || dist[m] > dist[i] + 1) {
                    dist[m] = dist[i] + 1;
                    back[k] = i;
                    queue.push(m);
                }
            }
            if let Some(k) = hit {
                found = Some(k);
                break;
            }
        }

        // The search always reaches a second singleton.
        let Some(mut i) = found else { break };
        loop {
            let j = back[i];
            let k = grid[j];
            grid[i] = j;
            grid[j] = i;
            if j == k {
                break;
            }
            i = k;
        }
    }
    grid
}

/// Every placement a given placement overlaps; at most six.
fn find_overlaps(w: usize, h: usize, placement: usize) -> Vec<usize> {
    let mut set = Vec::with_capacity(6);
    let cell = placement / 2;
    let (x, y) = (cell % w, cell / w);
    if placement % 2 == 1 {
        // Horizontal, indexed by its left end.
        if x > 0 {
            set.push(placement - 2);
        }
        if y > 0 {
            set.push(placement - 2 * w - 1);
            set.push(placement - 2 * w + 1);
        }
        if y + 1 < h {
            set.push(placement - 1);
            set.push(placement + 1);
        }
        if x + 2 < w {
            set.push(placement + 2);
        }
    } else {
        // Vertical, indexed by its top end.
        if y > 0 {
            set.push(placement - 2 * w);
        }
        if x > 0 {
            set.push(placement - 1);
            set.push(placement - 1 + 2 * w);
        }
        if x + 1 < w {
            set.push(placement + 1);
            set.push(placement + 1 + 2 * w);
        }
        if y + 2 < h {
            set.push(placement + 2 * w);
        }
    }
    set
}

/// Placement verdicts the solver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    RuledOut,
    Uncertain,
    Certain,
}

/// Placement-elimination solver. Returns the number of solutions it can
/// distinguish, capped at 2 ("could not prove uniqueness"), plus a
/// verdict for every plausible placement.
pub(crate) fn solver(
    w: usize,
    h: usize,
    n: usize,
    grid: &[usize],
) -> (usize, Vec<Option<Verdict>>) {
    let wh = w * h;
    let dc = dcount(n);

    // One slot per possible placement, linked into per-domino lists:
    // -3 not a plausible placement, -2 ruled out, -1 list end, else the
    // next list index.
    let mut placements = vec![-3i64; 2 * wh];
    let mut heads = vec![-1i64; dc];

    let domino_of = |p: usize| {
        let p1 = p / 2;
        let p2 = if p % 2 == 1 { p1 + 1 } else { p1 + w };
        dindex(grid[p1], grid[p2])
    };

    for y in 0..h - 1 {
        for x in 0..w {
            let p = (y * w + x) * 2;
            let di = domino_of(p);
            placements[p] = heads[di];
            heads[di] = i64::try_from(p).unwrap_or(-1);
        }
    }
    for y in 0..h {
        for x in 0..w - 1 {
            let p = (y * w + x) * 2 + 1;
            let di = domino_of(p);
            placements[p] = heads[di];
            heads[di] = i64::try_from(p).unwrap_or(-1);
        }
    }

    let mut impossible = false;
    loop {
        let mut done_something = false;

        // Any placement overlapped by every placement of some domino
        // cannot happen.
        for di in 0..dc {
            if heads[di] == -1 {
                debug!("domino {di} has no remaining placement");
                impossible = true;
                break;
            }
            let mut permset: Option<Vec<usize>> = None;
            let mut j = heads[di];
            while j >= 0 {
                let overlaps = find_overlaps(w, h, j.unsigned_abs() as usize);
                permset = Some(match permset {
                    None => overlaps,
                    Some(prev) => prev.into_iter().filter(|p| overlaps.contains(p)).collect(),
                });
                j = placements[j.unsigned_abs() as usize];
            }
            for p in permset.unwrap_or_default() {
                if placements[p] == -2 {
                    continue;
                }
                done_something = true;
                let target = domino_of(p);
                let p_i64 = i64::try_from(p).unwrap_or(-1);
                if heads[target] == p_i64 {
                    heads[target] = placements[p];
                } else {
                    let mut k = heads[target].unsigned_abs() as usize;
                    while placements[k] != -1 && placements[k] != p_i64 {
                        k = placements[k].unsigned_abs() as usize;
                    }
                    placements[k] = placements[p];
                }
                placements[p] = -2;
            }
        }
        if impossible {
            break;
        }

        // If every live placement through a square belongs to one
        // domino, that domino goes through this square: drop its other
        // placements.
        for i in 0..wh {
            let (x, y) = (i % w, i / w);
            let mut list = Vec::with_capacity(4);
            if x > 0 {
                list.push(2 * (i - 1) + 1);
            }
            if x + 1 < w {
                list.push(2 * i + 1);
            }
            if y > 0 {
                list.push(2 * (i - w));
            }
            if y + 1 < h {
                list.push(2 * i);
            }
            list.retain(|&p| placements[p] >= -1);

            let Some(&first) = list.first() else {
                continue;
            };
            let adi = domino_of(first);
            if !list.iter().all(|&p| domino_of(p) == adi) {
                continue;
            }

            let mut nn = 0;
            let mut k = heads[adi];
            while k >= 0 {
                nn += 1;
                k = placements[k.unsigned_abs() as usize];
            }
            if nn > list.len() {
                done_something = true;
                let mut k = heads[adi];
                while k >= 0 {
                    let next = placements[k.unsigned_abs() as usize];
                    placements[k.unsigned_abs() as usize] = -2;
                    k = next;
                }
                heads[adi] = i64::try_from(list[0]).unwrap_or(-1);
                for (pos, &p) in list.iter().enumerate() {
                    placements[p] = match list.get(pos + 1) {
                        Some(&next) => i64::try_from(next).unwrap_or(-1),
                        None => -1,
                    };
                }
            }
        }

        if !done_something {
            break;
        }
    }

    let mut output = vec![None; 2 * wh];
    if impossible {
        return (0, output);
    }
    let mut ret = 1;
    for p in 0..2 * wh {
        match placements[p] {
            -3 => {}
            -2 => output[p] = Some(Verdict::RuledOut),
            v => {
                let di = domino_of(p);
                if heads[di] == i64::try_from(p).unwrap_or(-1) && v == -1 {
                    output[p] = Some(Verdict::Certain);
                } else {
                    output[p] = Some(Verdict::Uncertain);
                    ret = 2;
                }
            }
        }
    }
    (ret, output)
}

fn parse_number_grid(n: usize, desc: &str) -> Result<Vec<usize>, DescError> {
    let wh = (n + 2) * (n + 1);
    let mut numbers = Vec::with_capacity(wh);
    let mut rest = desc;
    while numbers.len() < wh {
        let mut chars = rest.chars();
        match chars.next() {
            Some(d @ '0'..='9') => {
                numbers.push(d as usize - '0' as usize);
                rest = chars.as_str();
            }
            Some('[') => {
                let body = chars.as_str();
                let Some(close) = body.find(']') else {
                    return Err(DescError::new("Missing ']' in game description"));
                };
                let Ok(v) = body[..close].parse::<usize>() else {
                    return Err(DescError::new("Invalid syntax in game description"));
                };
                numbers.push(v);
                rest = &body[close + 1..];
            }
            Some(_) => return Err(DescError::new("Invalid syntax in game description")),
            None => return Err(DescError::new("Game description shorter than expected")),
        }
    }
    if !rest.is_empty() {
        return Err(DescError::new("Game description longer than expected"));
    }
    if numbers.iter().any(|&v| v > n) {
        return Err(DescError::new("Number out of range in game description"));
    }
    let mut occurrences = vec![0usize; n + 1];
    for &v in &numbers {
        occurrences[v] += 1;
    }
    // Each value pairs with every value including itself, so it appears
    // n+2 times.
    if occurrences.iter().any(|&c| c != n + 2) {
        return Err(DescError::new(
            "Incorrect number balance in game description",
        ));
    }
    Ok(numbers)
}

impl DominosaState {
    fn place(&mut self, d1: usize, d2: usize) {
        // Evict whatever overlaps the new domino, then its edges.
        for d in [d1, d2] {
            let other = self.grid[d];
            if other != d {
                self.grid[other] = other;
            }
        }
        self.grid[d1] = d2;
        self.grid[d2] = d1;
        for d in [d1, d2] {
            if self.edges[d] & EDGE_L != 0 {
                self.edges[d - 1] &= !EDGE_R;
            }
            if self.edges[d] & EDGE_R != 0 {
                self.edges[d + 1] &= !EDGE_L;
            }
            if self.edges[d] & EDGE_T != 0 {
                self.edges[d - self.w] &= !EDGE_B;
            }
            if self.edges[d] & EDGE_B != 0 {
                self.edges[d + self.w] &= !EDGE_T;
            }
            self.edges[d] = 0;
        }
    }

    fn check_completion(&mut self) {
        if self.completed {
            return;
        }
        let n = self.params.n;
        let mut used = vec![false; dcount(n)];
        let mut ok = 0;
        for i in 0..self.w * self.h {
            if self.grid[i] > i {
                let di = dindex(self.numbers[i], self.numbers[self.grid[i]]);
                if !used[di] {
                    used[di] = true;
                    ok += 1;
                }
            }
        }
        if ok == dcount(n) {
            self.completed = true;
        }
    }
}

/// Splits "D12,13" style commands into kind and the two square indices.
fn parse_pair(cmd: &str) -> Option<(char, usize, usize)> {
    let kind = cmd.chars().next()?;
    let (a, b) = cmd[1..].split_once(',')?;
    Some((kind, a.parse().ok()?, b.parse().ok()?))
}

impl Backend for Dominosa {
    type Params = DominosaParams;
    type State = DominosaState;
    type Ui = DominosaUi;
    type DrawState = DominosaDraw;

    const NAME: &'static str = "Dominosa";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = true;
    const CAN_FORMAT_AS_TEXT: bool = true;
    const WANTS_STATUSBAR: bool = false;
    const IS_TIMED: bool = false;
    const PREFERRED_TILESIZE: i32 = PREFERRED_TILESIZE;

    fn default_params() -> DominosaParams {
        DominosaParams { n: 6, unique: true }
    }

    fn presets() -> Vec<(String, DominosaParams)> {
        (3..=9)
            .map(|n| (format!("Up to double-{n}"), DominosaParams { n, unique: true }))
            .collect()
    }

    fn decode_params(params: &mut DominosaParams, string: &str) {
        *params = Self::default_params();
        let digits = string.len() - string.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        params.n = string[..digits].parse().unwrap_or(0);
        if string[digits..].starts_with('a') {
            params.unique = false;
        }
    }

    fn encode_params(params: &DominosaParams, full: bool) -> String {
        let mut ret = format!("{}", params.n);
        if full && !params.unique {
            ret.push('a');
        }
        ret
    }

    fn configure(params: &DominosaParams) -> Vec<ConfigItem> {
        vec![
            ConfigItem {
                name: "Maximum number on dominoes".to_owned(),
                value: ConfigValue::String(format!("{}", params.n)),
            },
            ConfigItem {
                name: "Ensure unique solution".to_owned(),
                value: ConfigValue::Boolean(params.unique),
            },
        ]
    }

    fn custom_params(cfg: &[ConfigItem]) -> DominosaParams {
        let n = match cfg.first().map(|item| &item.value) {
            Some(ConfigValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let unique = matches!(
            cfg.get(1).map(|item| &item.value),
            Some(&ConfigValue::Boolean(b)) if b
        );
        DominosaParams { n, unique }
    }

    fn validate_params(params: &DominosaParams, _full: bool) -> Result<(), ParamsError> {
        if params.n < 1 {
            return Err(ParamsError::new("Maximum face number must be at least one"));
        }
        if params.n > 9 {
            return Err(ParamsError::new("Maximum face number must be at most nine"));
        }
        Ok(())
    }

    fn new_desc(
        params: &DominosaParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        let n = params.n;
        let (w, h) = (params.w(), params.h());
        let wh = w * h;

        // Brute force: deal numbers onto random tilings until the
        // solver proves the result unique. The only cleverness is
        // avoiding the obvious 2x2 ambiguity when flipping a domino
        // into place next to a parallel one sharing a number.
        let mut layout;
        let mut numbers;
        loop {
            layout = domino_layout(w, h, rs);

            let mut deck = Vec::with_capacity(dcount(n));
            for i in 0..=n {
                for j in 0..=i {
                    deck.push((i, j));
                }
            }
            rs.shuffle(&mut deck);

            numbers = vec![0usize; wh];
            let mut next = deck.into_iter();
            for i in 0..wh {
                if layout[i] <= i {
                    continue;
                }
                let (a, b) = next.next().unwrap_or((0, 0));
                let t2 = layout[i];
                let mut flip = None;
                if params.unique {
                    let (prev1, prev2) = if t2 == i + w {
                        // Vertical; look at a vertical neighbour to the
                        // left.
                        if i % w > 0 && layout[i - 1] == t2 - 1 {
                            (Some(i - 1), Some(t2 - 1))
                        } else {
                            (None, None)
                        }
                    } else if i / w > 0 && layout[i - w] == t2 - w {
                        // Horizontal; look at one directly above.
                        (Some(i - w), Some(t2 - w))
                    } else {
                        (None, None)
                    };
                    if let (Some(p1), Some(p2)) = (prev1, prev2) {
                        let shares = numbers[p1] == a
                            || numbers[p1] == b
                            || numbers[p2] == a
                            || numbers[p2] == b;
                        if shares {
                            flip = Some(numbers[p1] == a || numbers[p2] == b);
                        }
                    }
                }
                let flip = flip.unwrap_or_else(|| rs.upto(2) == 1);
                let (va, vb) = if flip { (b, a) } else { (a, b) };
                numbers[i] = va;
                numbers[t2] = vb;
            }

            if !params.unique || solver(w, h, n, &numbers).0 <= 1 {
                break;
            }
        }

        let mut desc = String::new();
        for &v in &numbers {
            if v < 10 {
                desc.push(char::from(b'0' + u8::try_from(v).unwrap_or(0)));
            } else {
                let _ = write!(desc, "[{v}]");
            }
        }

        let aux: String = (0..wh)
            .map(|i| {
                let v = layout[i];
                if v == i + 1 {
                    'L'
                } else if v + 1 == i {
                    'R'
                } else if v == i + w {
                    'T'
                } else if v + w == i {
                    'B'
                } else {
                    '.'
                }
            })
            .collect();
        (desc, Some(aux))
    }

    fn validate_desc(params: &DominosaParams, desc: &str) -> Result<(), DescError> {
        parse_number_grid(params.n, desc).map(|_| ())
    }

    fn new_game(params: &DominosaParams, desc: &str) -> DominosaState {
        let numbers = parse_number_grid(params.n, desc).unwrap_or_default();
        let wh = params.w() * params.h();
        DominosaState {
            params: params.clone(),
            w: params.w(),
            h: params.h(),
            numbers: Arc::new(numbers),
            grid: (0..wh).collect(),
            edges: vec![0; wh],
            completed: false,
            cheated: false,
        }
    }

    fn solve(
        state: &DominosaState,
        _currstate: &DominosaState,
        aux: Option<&str>,
    ) -> Result<String, SolveError> {
        let (w, h) = (state.w, state.h);
        let mut ret = String::from("S");
        if let Some(aux) = aux {
            for (i, c) in aux.chars().enumerate() {
                match c {
                    'L' => {
                        let _ = write!(ret, ";D{},{}", i, i + 1);
                    }
                    'T' => {
                        let _ = write!(ret, ";D{},{}", i, i + w);
                    }
                    _ => {}
                }
            }
        } else {
            let (_, verdicts) = solver(w, h, state.params.n, &state.numbers);
            // Edges for ruled-out placements first, then the certain
            // dominoes.
            for wanted in [Verdict::RuledOut, Verdict::Certain] {
                for (p, v) in verdicts.iter().enumerate() {
                    if *v == Some(wanted) {
                        let p1 = p / 2;
                        let p2 = if p % 2 == 1 { p1 + 1 } else { p1 + w };
                        let cmd = if wanted == Verdict::RuledOut { 'E' } else { 'D' };
                        let _ = write!(ret, ";{cmd}{p1},{p2}");
                    }
                }
            }
        }
        Ok(ret)
    }

    fn can_format_as_text_now(params: &DominosaParams) -> bool {
        params.n < 1000
    }

    fn text_format(state: &DominosaState) -> String {
        let (w, h) = (state.w, state.h);
        let (cw, ch) = (4usize, 2usize);
        let gw = cw * w + 2;
        let gh = ch * h + 1;
        let mut board = vec![b' '; gw * gh];

        for r in 0..h {
            for c in 0..w {
                let cell = r * ch * gw + cw * c;
                let centre = cell + gw * ch / 2 + cw / 2;
                let i = r * w + c;
                let num = state.numbers[i];
                board[centre] = b'0' + u8::try_from(num % 10).unwrap_or(0);
                if num >= 10 {
                    board[centre - 1] = b'0' + u8::try_from(num / 10 % 10).unwrap_or(0);
                }

                if state.edges[i] & EDGE_L != 0 {
                    board[centre - cw / 2] = b'|';
                }
                if state.edges[i] & EDGE_R != 0 {
                    board[centre + cw / 2] = b'|';
                }
                if state.edges[i] & EDGE_T != 0 {
                    board[centre - gw] = b'-';
                }
                if state.edges[i] & EDGE_B != 0 {
                    board[centre + gw] = b'-';
                }

                if state.grid[i] <= i {
                    continue;
                }
                let horiz = state.grid[i] == i + 1;
                let (dshort, nshort, cshort, dlong, nlong, clong) = if horiz {
                    (gw, ch, b'|', 1, 2 * cw, b'-')
                } else {
                    (1, cw, b'-', gw, 2 * ch, b'|')
                };
                let go_short = nshort * dshort;
                let go_long = nlong * dlong;
                board[cell] = b'+';
                board[cell + go_short] = b'+';
                board[cell + go_long] = b'+';
                board[cell + go_short + go_long] = b'+';
                for s in 1..nshort {
                    for base in [cell + s * dshort, cell + s * dshort + go_long] {
                        if board[base] != b'+' {
                            board[base] = cshort;
                        }
                    }
                }
                for l in 1..nlong {
                    for base in [cell + l * dlong, cell + l * dlong + go_short] {
                        if board[base] != b'+' {
                            board[base] = clong;
                        }
                    }
                }
            }
            board[r * ch * gw + gw - 1] = b'\n';
            board[r * ch * gw + 2 * gw - 1] = b'\n';
        }
        let len = board.len();
        board[len - 1] = b'\n';
        String::from_utf8(board).unwrap_or_default()
    }

    fn new_ui(_state: &DominosaState) -> DominosaUi {
        DominosaUi {
            cur_x: 0,
            cur_y: 0,
            cur_visible: false,
            highlight_1: None,
            highlight_2: None,
        }
    }

    fn changed_state(ui: &mut DominosaUi, oldstate: &DominosaState, newstate: &DominosaState) {
        if !oldstate.completed && newstate.completed {
            ui.cur_visible = false;
            ui.highlight_1 = None;
            ui.highlight_2 = None;
        }
    }

    fn interpret_move(
        state: &DominosaState,
        ui: &mut DominosaUi,
        ds: &DominosaDraw,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent {
        #[allow(clippy::cast_possible_wrap)]
        let (w, h) = (state.w as i32, state.h as i32);

        match button {
            Button::Down(b @ (MouseButton::Left | MouseButton::Right)) => {
                if ds.tilesize == 0 {
                    return MoveIntent::Ignored;
                }
                let ts = ds.tilesize;
                let border = ts * 3 / 4;
                let tx = (x - border + ts) / ts - 1;
                let ty = (y - border + ts) / ts - 1;
                if tx < 0 || tx >= w || ty < 0 || ty >= h {
                    return MoveIntent::Ignored;
                }
                let t = ty * w + tx;
                // Pick the square edge nearest the click.
                let dx = 2 * (x - (tx * ts + border)) - ts;
                let dy = 2 * (y - (ty * ts + border)) - ts;
                let (d1, d2) = if dx.abs() > dy.abs() && dx < 0 && tx > 0 {
                    (t - 1, t)
                } else if dx.abs() > dy.abs() && dx > 0 && tx + 1 < w {
                    (t, t + 1)
                } else if dy.abs() > dx.abs() && dy < 0 && ty > 0 {
                    (t - w, t)
                } else if dy.abs() > dx.abs() && dy > 0 && ty + 1 < h {
                    (t, t + w)
                } else {
                    return MoveIntent::Ignored;
                };
                let (d1, d2) = (d1.unsigned_abs() as usize, d2.unsigned_abs() as usize);
                // An edge cannot sit against a placed domino.
                if b == MouseButton::Right && (state.grid[d1] != d1 || state.grid[d2] != d2) {
                    return MoveIntent::Ignored;
                }
                ui.cur_visible = false;
                let cmd = if b == MouseButton::Right { 'E' } else { 'D' };
                MoveIntent::Move(format!("{cmd}{d1},{d2}"))
            }
            Button::CursorUp | Button::CursorDown | Button::CursorLeft | Button::CursorRight => {
                ui.cur_visible = true;
                move_cursor(button, &mut ui.cur_x, &mut ui.cur_y, 2 * w - 1, 2 * h - 1, false);
                MoveIntent::Redraw
            }
            Button::CursorSelect | Button::CursorSelect2 => {
                // The cursor must be on an edge: exactly one odd
                // coordinate.
                if (ui.cur_x ^ ui.cur_y) & 1 == 0 {
                    return MoveIntent::Ignored;
                }
                let d1 = (ui.cur_y / 2) * w + ui.cur_x / 2;
                let d2 = ((ui.cur_y + 1) / 2) * w + (ui.cur_x + 1) / 2;
                let (d1, d2) = (d1.unsigned_abs() as usize, d2.unsigned_abs() as usize);
                if button == Button::CursorSelect2
                    && (state.grid[d1] != d1 || state.grid[d2] != d2)
                {
                    return MoveIntent::Ignored;
                }
                let cmd = if button == Button::CursorSelect2 { 'E' } else { 'D' };
                MoveIntent::Move(format!("{cmd}{d1},{d2}"))
            }
            Button::Char(c @ '0'..='9') => {
                let num = c as usize - '0' as usize;
                if num > state.params.n {
                    return MoveIntent::Ignored;
                }
                if ui.highlight_1 == Some(num) {
                    ui.highlight_1 = None;
                } else if ui.highlight_2 == Some(num) {
                    ui.highlight_2 = None;
                } else if ui.highlight_1.is_none() {
                    ui.highlight_1 = Some(num);
                } else if ui.highlight_2.is_none() {
                    ui.highlight_2 = Some(num);
                } else {
                    return MoveIntent::Ignored;
                }
                MoveIntent::Redraw
            }
            _ => MoveIntent::Ignored,
        }
    }

    fn execute_move(from: &DominosaState, movestr: &str) -> MoveResult<DominosaState> {
        let wh = from.w * from.h;
        let mut state = from.clone();
        for cmd in movestr.split(';') {
            if cmd == "S" {
                state.cheated = true;
                for i in 0..wh {
                    state.grid[i] = i;
                    state.edges[i] = 0;
                }
                continue;
            }
            let Some((kind, d1, d2)) = parse_pair(cmd) else {
                return MoveResult::Invalid;
            };
            if d1 >= d2 || d2 >= wh || !(d2 == d1 + 1 || d2 == d1 + from.w) {
                return MoveResult::Invalid;
            }
            // A "horizontal" pair must not wrap across a row boundary.
            if d2 == d1 + 1 && d2 % from.w == 0 {
                return MoveResult::Invalid;
            }
            match kind {
                'D' => {
                    if state.grid[d1] == d2 {
                        state.grid[d1] = d1;
                        state.grid[d2] = d2;
                    } else {
                        state.place(d1, d2);
                    }
                }
                'E' => {
                    if state.grid[d1] != d1 || state.grid[d2] != d2 {
                        return MoveResult::Invalid;
                    }
                    if d2 == d1 + 1 {
                        state.edges[d1] ^= EDGE_R;
                        state.edges[d2] ^= EDGE_L;
                    } else {
                        state.edges[d1] ^= EDGE_B;
                        state.edges[d2] ^= EDGE_T;
                    }
                }
                _ => return MoveResult::Invalid,
            }
        }
        state.check_completion();
        MoveResult::Changed(state)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn compute_size(params: &DominosaParams, tilesize: i32) -> (i32, i32) {
        let border = tilesize * 3 / 4;
        (
            params.w() as i32 * tilesize + 2 * border,
            params.h() as i32 * tilesize + 2 * border,
        )
    }

    fn set_size(ds: &mut DominosaDraw, _params: &DominosaParams, tilesize: i32) {
        ds.tilesize = tilesize;
    }

    fn colours() -> Vec<Rgb> {
        let (background, _, _) = mkhighlight(DEFAULT_BACKGROUND);
        let mut ret = vec![[0.0, 0.0, 0.0]; NCOLOURS];
        ret[COL_BACKGROUND] = background;
        ret[COL_TEXT] = [0.0, 0.0, 0.0];
        ret[COL_DOMINO] = [0.0, 0.0, 0.0];
        ret[COL_DOMINOCLASH] = [0.5, 0.0, 0.0];
        ret[COL_DOMINOTEXT] = [1.0, 1.0, 1.0];
        ret[COL_EDGE] = background.map(|c| c * 2.0 / 3.0);
        // Reddish is taken by the clash highlight, so the cursor goes
        // green.
        ret[COL_CURSOR] = [0.0, 0.5, 0.0];
        ret[COL_DOMINOCURSOR] = [0.25, 1.0, 0.25];
        ret[COL_HIGHLIGHT_1] = [0.85, 0.20, 0.20];
        ret[COL_HIGHLIGHT_2] = [0.30, 0.85, 0.20];
        ret
    }

    fn new_drawstate(state: &DominosaState) -> DominosaDraw {
        DominosaDraw {
            started: false,
            w: state.w,
            h: state.h,
            tilesize: 0,
            visible: vec![u32::MAX; state.w * state.h],
        }
    }

    #[allow(clippy::cast_possible_wrap, clippy::too_many_lines)]
    fn redraw(
        draw: &mut Draw,
        ds: &mut DominosaDraw,
        _oldstate: Option<&DominosaState>,
        state: &DominosaState,
        _dir: i32,
        ui: &DominosaUi,
        _anim_time: f32,
        flash_time: f32,
    ) {
        let (w, h) = (state.w, state.h);
        if !ds.started {
            let (pw, ph) = Self::compute_size(&state.params, ds.tilesize);
            draw.api().draw_rect(0, 0, pw, ph, COL_BACKGROUND);
            draw.api().draw_update(0, 0, pw, ph);
            ds.started = true;
        }

        // Count dominoes per type so duplicates show as clashes.
        let mut used = vec![0u8; dcount(state.params.n)];
        for i in 0..w * h {
            if state.grid[i] > i {
                let di = dindex(state.numbers[i], state.numbers[state.grid[i]]);
                used[di] = used[di].saturating_add(1);
            }
        }

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let mut c = if i > 0 && state.grid[i] == i - 1 {
                    TYPE_R
                } else if state.grid[i] == i + 1 {
                    TYPE_L
                } else if i >= w && state.grid[i] == i - w {
                    TYPE_B
                } else if state.grid[i] == i + w {
                    TYPE_T
                } else {
                    TYPE_BLANK
                };

                let n1 = state.numbers[i];
                if c == TYPE_BLANK {
                    c |= u32::from(state.edges[i]);
                } else {
                    let di = dindex(n1, state.numbers[state.grid[i]]);
                    if used[di] > 1 {
                        c |= DF_CLASH;
                    }
                }
                if ui.highlight_1 == Some(n1) {
                    c |= DF_HIGHLIGHT_1;
                }
                if ui.highlight_2 == Some(n1) {
                    c |= DF_HIGHLIGHT_2;
                }
                if flash_time > 0.0 {
                    c |= DF_FLASH;
                }
                if ui.cur_visible {
                    let curx = ui.cur_x - (2 * x as i32 - 1);
                    let cury = ui.cur_y - (2 * y as i32 - 1);
                    if (0..3).contains(&curx) && (0..3).contains(&cury) {
                        c |= DF_CURSOR
                            | (curx.unsigned_abs() * DF_CURSOR_XBASE)
                            | (cury.unsigned_abs() * DF_CURSOR_YBASE);
                        if (ui.cur_x ^ ui.cur_y) & 1 != 0 {
                            c |= DF_CURSOR_USEFUL;
                        }
                    }
                }

                if ds.visible[i] != c {
                    draw_tile(draw, ds, state, x, y, c);
                    ds.visible[i] = c;
                }
            }
        }
    }

    fn flash_length(
        oldstate: &DominosaState,
        newstate: &DominosaState,
        _dir: i32,
        _ui: &DominosaUi,
    ) -> f32 {
        if !oldstate.completed && newstate.completed && !oldstate.cheated && !newstate.cheated {
            FLASH_TIME
        } else {
            0.0
        }
    }

    fn status(state: &DominosaState) -> Status {
        if state.completed {
            Status::Solved
        } else {
            Status::Active
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn draw_tile(
    draw: &mut Draw,
    ds: &DominosaDraw,
    state: &DominosaState,
    x: usize,
    y: usize,
    c: u32,
) {
    let ts = ds.tilesize;
    let border = ts * 3 / 4;
    let gutter = ts / 16;
    let radius = ts / 8;
    let coffset = gutter + radius;
    let cx = x as i32 * ts + border;
    let cy = y as i32 * ts + border;

    draw.api().clip(cx, cy, ts, ts);
    draw.api().draw_rect(cx, cy, ts, ts, COL_BACKGROUND);

    let tile_type = c & TYPE_MASK;
    let mut nc;
    if tile_type == TYPE_BLANK {
        if c & u32::from(EDGE_T) != 0 {
            draw.api()
                .draw_rect(cx + gutter, cy, ts - 2 * gutter, 1, COL_EDGE);
        }
        if c & u32::from(EDGE_B) != 0 {
            draw.api()
                .draw_rect(cx + gutter, cy + ts - 1, ts - 2 * gutter, 1, COL_EDGE);
        }
        if c & u32::from(EDGE_L) != 0 {
            draw.api()
                .draw_rect(cx, cy + gutter, 1, ts - 2 * gutter, COL_EDGE);
        }
        if c & u32::from(EDGE_R) != 0 {
            draw.api()
                .draw_rect(cx + ts - 1, cy + gutter, 1, ts - 2 * gutter, COL_EDGE);
        }
        nc = COL_TEXT;
    } else {
        // One end of a domino: rounded corners plus two rectangles
        // bleeding into the partner square.
        let mut bg = if c & DF_CLASH != 0 {
            COL_DOMINOCLASH
        } else {
            COL_DOMINO
        };
        nc = COL_DOMINOTEXT;
        if c & DF_FLASH != 0 {
            std::mem::swap(&mut nc, &mut bg);
        }

        if tile_type == TYPE_L || tile_type == TYPE_T {
            draw.api()
                .draw_circle(cx + coffset, cy + coffset, radius, Some(bg), bg);
        }
        if tile_type == TYPE_R || tile_type == TYPE_T {
            draw.api()
                .draw_circle(cx + ts - 1 - coffset, cy + coffset, radius, Some(bg), bg);
        }
        if tile_type == TYPE_L || tile_type == TYPE_B {
            draw.api()
                .draw_circle(cx + coffset, cy + ts - 1 - coffset, radius, Some(bg), bg);
        }
        if tile_type == TYPE_R || tile_type == TYPE_B {
            draw.api().draw_circle(
                cx + ts - 1 - coffset,
                cy + ts - 1 - coffset,
                radius,
                Some(bg),
                bg,
            );
        }

        for i in 0..2 {
            let mut x1 = cx + if i == 1 { gutter } else { coffset };
            let mut y1 = cy + if i == 1 { coffset } else { gutter };
            let mut x2 = cx + ts - 1 - if i == 1 { gutter } else { coffset };
            let mut y2 = cy + ts - 1 - if i == 1 { coffset } else { gutter };
            match tile_type {
                TYPE_L => x2 = cx + ts + ts / 16,
                TYPE_R => x1 = cx - ts / 16,
                TYPE_T => y2 = cy + ts + ts / 16,
                _ => y1 = cy - ts / 16,
            }
            draw.api().draw_rect(x1, y1, x2 - x1 + 1, y2 - y1 + 1, bg);
        }
    }

    if c & DF_CURSOR != 0 {
        let curx = ((c / DF_CURSOR_XBASE) & 3) as i32;
        let cury = ((c / DF_CURSOR_YBASE) & 3) as i32;
        let ox = cx + curx * ts / 2;
        let oy = cy + cury * ts / 2;
        draw.rect_corners(ox, oy, ts / 4, nc);
        if c & DF_CURSOR_USEFUL != 0 {
            draw.rect_corners(ox, oy, ts / 4 + 1, nc);
        }
    }

    if c & DF_HIGHLIGHT_1 != 0 {
        nc = COL_HIGHLIGHT_1;
    } else if c & DF_HIGHLIGHT_2 != 0 {
        nc = COL_HIGHLIGHT_2;
    }

    draw.api().draw_text(
        cx + ts / 2,
        cy + ts / 2,
        FontType::Variable,
        ts / 2,
        HAlign::Centre,
        VAlign::Centre,
        nc,
        &format!("{}", state.numbers[y * state.w + x]),
    );

    draw.api().draw_update(cx, cy, ts, ts);
    draw.api().unclip();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_unique(seed: &[u8]) -> (DominosaParams, DominosaState, String) {
        let params = DominosaParams { n: 3, unique: true };
        let mut rs = RandomState::from_seed(seed);
        let (desc, aux) = Dominosa::new_desc(&params, &mut rs, false);
        Dominosa::validate_desc(&params, &desc).unwrap();
        let state = Dominosa::new_game(&params, &desc);
        (params, state, aux.unwrap())
    }

    #[test]
    fn layout_is_a_perfect_tiling() {
        let mut rs = RandomState::from_seed(b"dominosa layout");
        for (w, h) in [(5, 4), (8, 7), (3, 3)] {
            let grid = domino_layout(w, h, &mut rs);
            let singles = grid.iter().enumerate().filter(|&(i, &v)| i == v).count();
            assert_eq!(singles, (w * h) % 2);
            for (i, &v) in grid.iter().enumerate() {
                if v != i {
                    assert_eq!(grid[v], i);
                    assert!(v == i + 1 || v + 1 == i || v == i + w || v + w == i);
                }
            }
        }
    }

    #[test]
    fn generated_grids_have_balanced_numbers() {
        let (params, state, _) = new_unique(b"dominosa balance");
        let mut occurrences = vec![0usize; params.n + 1];
        for &v in state.numbers.iter() {
            occurrences[v] += 1;
        }
        assert!(occurrences.iter().all(|&c| c == params.n + 2));
    }

    #[test]
    fn solver_confirms_generated_uniqueness() {
        let (params, state, _) = new_unique(b"dominosa unique");
        let (count, _) = solver(state.w, state.h, params.n, &state.numbers);
        assert_eq!(count, 1);
    }

    #[test]
    fn aux_solution_completes_the_game() {
        let (_, state, aux) = new_unique(b"dominosa aux");
        let movestr = Dominosa::solve(&state, &state, Some(&aux)).unwrap();
        let MoveResult::Changed(done) = Dominosa::execute_move(&state, &movestr) else {
            panic!("solve move rejected");
        };
        assert!(done.completed);
        assert_eq!(Dominosa::status(&done), Status::Solved);
    }

    #[test]
    fn solver_solution_completes_the_game() {
        let (_, state, _) = new_unique(b"dominosa cold solve");
        let movestr = Dominosa::solve(&state, &state, None).unwrap();
        let MoveResult::Changed(done) = Dominosa::execute_move(&state, &movestr) else {
            panic!("solve move rejected");
        };
        assert!(done.completed);
    }

    #[test]
    fn placing_a_domino_evicts_overlaps_and_edges() {
        let (_, state, _) = new_unique(b"dominosa place");
        let w = state.w;

        // An edge between two empty squares toggles on and off.
        let MoveResult::Changed(edged) = Dominosa::execute_move(&state, "E0,1") else {
            panic!("edge rejected");
        };
        assert_eq!(edged.edges[0], EDGE_R);
        assert_eq!(edged.edges[1], EDGE_L);
        let MoveResult::Changed(cleared) = Dominosa::execute_move(&edged, "E0,1") else {
            panic!("edge rejected");
        };
        assert!(cleared.edges.iter().all(|&e| e == 0));

        // A domino placed across the edge destroys it.
        let MoveResult::Changed(placed) = Dominosa::execute_move(&edged, "D0,1") else {
            panic!("placement rejected");
        };
        assert_eq!(placed.grid[0], 1);
        assert_eq!(placed.grid[1], 0);
        assert!(placed.edges.iter().all(|&e| e == 0));

        // An overlapping placement evicts the first domino.
        let MoveResult::Changed(evicted) =
            Dominosa::execute_move(&placed, &format!("D1,{}", 1 + w))
        else {
            panic!("placement rejected");
        };
        assert_eq!(evicted.grid[0], 0);
        assert_eq!(evicted.grid[1], 1 + w);

        // Edges cannot be marked against a domino.
        assert!(matches!(
            Dominosa::execute_move(&placed, "E0,1"),
            MoveResult::Invalid
        ));
    }

    #[test]
    fn desc_errors_are_specific() {
        let params = DominosaParams { n: 3, unique: true };
        assert!(Dominosa::validate_desc(&params, "123").is_err());
        assert!(Dominosa::validate_desc(&params, &"9".repeat(20)).is_err());
        // Balanced but malformed bracket.
        assert!(Dominosa::validate_desc(&params, "[4").is_err());
    }

    #[test]
    fn params_encoding_round_trips() {
        let mut params = Dominosa::default_params();
        Dominosa::decode_params(&mut params, "7a");
        assert_eq!(params, DominosaParams { n: 7, unique: false });
        assert_eq!(Dominosa::encode_params(&params, true), "7a");
        assert_eq!(Dominosa::encode_params(&params, false), "7");
    }
}
