//! Bridges (Hashi): join every island to its neighbours with the
//! number of bridges its clue demands, using no more than `maxb`
//! parallel bridges per direction, until the whole archipelago is one
//! connected group.
//!
//! Generation grows islands outward from a random seed, joins each new
//! island to its parent with a random number of bridges, and keeps the
//! result only if the solver cracks it at the requested difficulty but
//! not the one below. Loop detection uses a Tarjan-style bridge finder
//! over the island graph, so only edges genuinely on a cycle are
//! flagged.

use std::fmt::Write as _;

use bitflags::bitflags;
use log::debug;
use parlor_core::{Dsf, LoopFinder, RandomState};
use parlor_engine::{
    Backend, BackendFlags, Button, ConfigItem, ConfigValue, DescError, Draw, DrawApi, FontType,
    HAlign, MouseButton, MoveIntent, MoveResult, ParamsError, Rgb, SolveError, Status, VAlign,
    mkhighlight, move_cursor,
};
use tinyvec::ArrayVec;

use crate::DEFAULT_BACKGROUND;

const MAX_BRIDGES: usize = 4;
const PREFERRED_TILESIZE: i32 = 24;
const FLASH_TIME: f32 = 0.50;

const MIN_SENSIBLE_ISLANDS: usize = 3;
const MAX_NEWISLAND_TRIES: usize = 50;

const COL_BACKGROUND: usize = 0;
const COL_FOREGROUND: usize = 1;
const COL_HIGHLIGHT: usize = 2;
const COL_LOWLIGHT: usize = 3;
const COL_SELECTED: usize = 4;
const COL_MARK: usize = 5;
const COL_HINT: usize = 6;
const COL_GRID: usize = 7;
const COL_WARNING: usize = 8;
const COL_CURSOR: usize = 9;
const NCOLOURS: usize = 10;

bitflags! {
    /// Per-square contents. A square holds either an island or (at
    /// most) one horizontal and one vertical annotation; `MARK` covers
    /// both direction bits so an island square toggles them together.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct GridFlags: u16 {
        const ISLAND = 0x0001;
        const LINEV = 0x0002;
        const LINEH = 0x0004;
        const MARKV = 0x0008;
        const MARKH = 0x0010;
        const NOLINEV = 0x0020;
        const NOLINEH = 0x0040;
        const WARN = 0x0080;
        const LINE = Self::LINEV.bits() | Self::LINEH.bits();
        const MARK = Self::MARKV.bits() | Self::MARKH.bits();
        const NOLINE = Self::NOLINEV.bits() | Self::NOLINEH.bits();
    }
}

fn line_flag(dx: isize) -> GridFlags {
    if dx != 0 { GridFlags::LINEH } else { GridFlags::LINEV }
}

fn mark_flag(dx: isize) -> GridFlags {
    if dx != 0 { GridFlags::MARKH } else { GridFlags::MARKV }
}

fn noline_flag(dx: isize) -> GridFlags {
    if dx != 0 { GridFlags::NOLINEH } else { GridFlags::NOLINEV }
}

/// Marker type implementing the Bridges backend.
pub struct Bridges;

/// Shape of a Bridges game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgesParams {
    /// Columns.
    pub w: usize,
    /// Rows.
    pub h: usize,
    /// Maximum parallel bridges per direction, 1..=4.
    pub maxb: usize,
    /// Percentage of squares that should hold islands.
    pub islands: usize,
    /// Percentage chance of expanding to the farthest legal spot.
    pub expansion: usize,
    /// Whether completed solutions may contain cycles.
    pub allowloops: bool,
    /// 0 = Easy, 1 = Medium, 2 = Hard.
    pub difficulty: usize,
}

/// One site an island could run a bridge towards: the first square in
/// that direction, plus the distance to the nearest island (0 = none).
#[derive(Debug, Clone, Copy, Default)]
struct AdjPoint {
    x: usize,
    y: usize,
    dx: isize,
    dy: isize,
    off: usize,
}

impl AdjPoint {
    fn orth(self) -> (usize, usize) {
        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        let x = (self.x as isize + (self.off as isize - 1) * self.dx) as usize;
        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        let y = (self.y as isize + (self.off as isize - 1) * self.dy) as usize;
        (x, y)
    }
}

#[derive(Debug, Clone, Default)]
struct Island {
    x: usize,
    y: usize,
    count: usize,
    adj: ArrayVec<[AdjPoint; 4]>,
}

/// Full position: flags per square plus the island list that the moves
/// and the solver index into.
#[derive(Debug, Clone)]
pub struct BridgesState {
    params: BridgesParams,
    w: usize,
    h: usize,
    completed: bool,
    solved: bool,
    grid: Vec<GridFlags>,
    /// Bridge multiplicity per line square.
    lines: Vec<u8>,
    /// How many more bridges could run vertically through each square.
    possv: Vec<u8>,
    possh: Vec<u8>,
    /// Per-square upper bounds, tightened by the stage-3 solver.
    maxv: Vec<u8>,
    maxh: Vec<u8>,
    islands: Vec<Island>,
    /// Island index by square, `None` off-island.
    gridi: Vec<Option<usize>>,
}

impl BridgesState {
    fn new(params: &BridgesParams) -> Self {
        let wh = params.w * params.h;
        #[allow(clippy::cast_possible_truncation)]
        let maxb = params.maxb as u8;
        Self {
            params: params.clone(),
            w: params.w,
            h: params.h,
            completed: false,
            solved: false,
            grid: vec![GridFlags::empty(); wh],
            lines: vec![0; wh],
            possv: vec![0; wh],
            possh: vec![0; wh],
            maxv: vec![maxb; wh],
            maxh: vec![maxb; wh],
            islands: Vec::new(),
            gridi: vec![None; wh],
        }
    }

    fn idx(&self, x: usize, y: usize) -> usize {
        y * self.w + x
    }

    #[allow(clippy::cast_possible_wrap)]
    fn in_grid(&self, x: isize, y: isize) -> bool {
        x >= 0 && x < self.w as isize && y >= 0 && y < self.h as isize
    }

    fn grid_at(&self, x: usize, y: usize) -> GridFlags {
        self.grid[y * self.w + x]
    }

    fn gridcount(&self, x: usize, y: usize, f: GridFlags) -> usize {
        if self.grid_at(x, y).intersects(f) {
            self.lines[self.idx(x, y)] as usize
        } else {
            0
        }
    }

    fn possibles(&self, dx: isize, x: usize, y: usize) -> usize {
        let i = self.idx(x, y);
        if dx != 0 { self.possh[i] as usize } else { self.possv[i] as usize }
    }

    fn maximum(&self, dx: isize, x: usize, y: usize) -> usize {
        let i = self.idx(x, y);
        if dx != 0 { self.maxh[i] as usize } else { self.maxv[i] as usize }
    }

    fn island_add(&mut self, x: usize, y: usize, count: usize) -> usize {
        let i = self.idx(x, y);
        self.grid[i] |= GridFlags::ISLAND;
        let mut adj = ArrayVec::new();
        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        for (dx, dy) in [(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            if self.in_grid(nx, ny) {
                adj.push(AdjPoint {
                    x: nx as usize,
                    y: ny as usize,
                    dx,
                    dy,
                    off: 0,
                });
            }
        }
        self.islands.push(Island { x, y, count, adj });
        let id = self.islands.len() - 1;
        self.gridi[i] = Some(id);
        id
    }

    /// Fills in each adjacency's distance to the nearest island,
    /// assuming all islands are now placed.
    fn island_find_orthogonal(&mut self, i: usize) {
        let mut adj = self.islands[i].adj;
        for p in &mut adj {
            p.off = 0;
            #[allow(clippy::cast_possible_wrap)]
            let (mut x, mut y) = (p.x as isize, p.y as isize);
            let mut off = 1;
            while self.in_grid(x, y) {
                #[allow(clippy::cast_sign_loss)]
                let here = self.grid_at(x as usize, y as usize);
                if here.contains(GridFlags::ISLAND) {
                    p.off = off;
                    break;
                }
                off += 1;
                x += p.dx;
                y += p.dy;
            }
        }
        self.islands[i].adj = adj;
    }

    fn island_hasbridge(&self, i: usize, d: usize) -> bool {
        let p = self.islands[i].adj[d];
        self.grid_at(p.x, p.y).intersects(line_flag(p.dx))
    }

    /// The island on the far end of an existing bridge in direction `d`.
    fn island_find_connection(&self, i: usize, d: usize) -> Option<usize> {
        let p = self.islands[i].adj[d];
        if p.off == 0 || !self.island_hasbridge(i, d) {
            return None;
        }
        let (ox, oy) = p.orth();
        self.gridi[self.idx(ox, oy)]
    }

    /// Joins two orthogonally-aligned islands: `n` bridges, or `n == 0`
    /// to clear, or `n == -1` to flip the no-line pencil marks. With
    /// `is_max` the squares' upper bound is written instead.
    fn island_join(&mut self, i1: usize, i2: usize, n: i32, is_max: bool) {
        let (x1, y1) = (self.islands[i1].x, self.islands[i1].y);
        let (x2, y2) = (self.islands[i2].x, self.islands[i2].y);
        let vertical = x1 == x2;
        let (s, e) = if vertical {
            (y1.min(y2) + 1, y1.max(y2).saturating_sub(1))
        } else {
            (x1.min(x2) + 1, x1.max(x2).saturating_sub(1))
        };
        for t in s..=e {
            let i = if vertical { self.idx(x1, t) } else { self.idx(t, y1) };
            if is_max {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let nb = n as u8;
                if vertical {
                    self.maxv[i] = nb;
                } else {
                    self.maxh[i] = nb;
                }
            } else if n < 0 {
                self.grid[i].toggle(noline_flag(isize::from(!vertical)));
            } else if n == 0 {
                self.grid[i] &= !line_flag(isize::from(!vertical));
            } else {
                self.grid[i] |= line_flag(isize::from(!vertical));
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    self.lines[i] = n as u8;
                }
            }
        }
    }

    fn island_countbridges(&self, i: usize) -> usize {
        self.islands[i]
            .adj
            .iter()
            .map(|p| self.gridcount(p.x, p.y, line_flag(p.dx)))
            .sum()
    }

    fn island_adjspace(&self, i: usize, marks: bool, missing: usize, d: usize) -> usize {
        let p = self.islands[i].adj[d];
        if marks && self.grid_at(p.x, p.y).intersects(mark_flag(p.dx)) {
            return 0;
        }
        let poss = self.possibles(p.dx, p.x, p.y).min(missing);
        let curr = self.gridcount(p.x, p.y, line_flag(p.dx));
        poss.min(self.maximum(p.dx, p.x, p.y).saturating_sub(curr))
    }

    /// Bridge spaces still usable around the island; expects the
    /// possibles to be up to date.
    fn island_countspaces(&self, i: usize, marks: bool) -> usize {
        let Some(missing) = self.islands[i]
            .count
            .checked_sub(self.island_countbridges(i))
        else {
            return 0;
        };
        (0..self.islands[i].adj.len())
            .map(|d| self.island_adjspace(i, marks, missing, d))
            .sum()
    }

    fn island_isadj(&self, i: usize, d: usize) -> usize {
        let p = self.islands[i].adj[d];
        if self.grid_at(p.x, p.y).intersects(mark_flag(p.dx)) {
            // The far island is finished; only count an existing link.
            self.gridcount(p.x, p.y, line_flag(p.dx))
        } else {
            self.possibles(p.dx, p.x, p.y)
        }
    }

    fn island_countadj(&self, i: usize) -> usize {
        (0..self.islands[i].adj.len())
            .filter(|&d| self.island_isadj(i, d) > 0)
            .count()
    }

    /// Toggles the finished mark on an island and rebuilds the derived
    /// marks on every square between pairs of marked islands.
    fn island_togglemark(&mut self, i: usize) {
        let (x, y) = (self.islands[i].x, self.islands[i].y);
        let id = self.idx(x, y);
        self.grid[id].toggle(GridFlags::MARK);

        for sq in 0..self.grid.len() {
            if !self.grid[sq].contains(GridFlags::ISLAND) {
                self.grid[sq] &= !GridFlags::MARK;
            }
        }

        for j in 0..self.islands.len() {
            let (jx, jy) = (self.islands[j].x, self.islands[j].y);
            if !self.grid_at(jx, jy).intersects(GridFlags::MARK) {
                continue;
            }
            let adj = self.islands[j].adj;
            for p in &adj {
                if p.off == 0 {
                    continue;
                }
                for o in 1..p.off {
                    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
                    let sq = self.idx(
                        (jx as isize + p.dx * o as isize) as usize,
                        (jy as isize + p.dy * o as isize) as usize,
                    );
                    self.grid[sq] |= if p.dy != 0 {
                        GridFlags::MARKV
                    } else {
                        GridFlags::MARKH
                    };
                }
            }
        }
    }

    /// Whether the island's clue can no longer be satisfied. With
    /// `strict`, an unfinished island also counts as impossible.
    fn island_impossible(&self, i: usize, strict: bool) -> bool {
        let is = &self.islands[i];
        let curr = self.island_countbridges(i);
        let Some(nspc) = is.count.checked_sub(curr) else {
            return true; // too many bridges
        };
        if curr + self.island_countspaces(i, false) < is.count {
            return true;
        }
        if strict && curr < is.count {
            return true;
        }

        let mut nsurrspc = 0;
        for p in &is.adj {
            if p.off == 0 || self.possibles(p.dx, p.x, p.y) == 0 {
                continue;
            }
            let (ox, oy) = p.orth();
            let Some(oi) = self.gridi[self.idx(ox, oy)] else {
                continue;
            };
            let ocurr = self.island_countbridges(oi);
            if let Some(ifree) = self.islands[oi].count.checked_sub(ocurr) {
                if ifree > 0 {
                    // Bounded both by the far island's remaining clue
                    // and by the capacity left on this specific line.
                    let bmax = self.maximum(p.dx, p.x, p.y);
                    let bcurr = self.gridcount(p.x, p.y, line_flag(p.dx));
                    nsurrspc += ifree.min(bmax.saturating_sub(bcurr));
                }
            }
        }
        nsurrspc < nspc
    }

    /// Recomputes `possv`/`possh`: for each between-islands stretch,
    /// how many further bridges could run through it.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn map_update_possibles(&mut self) {
        let (w, h) = (self.w, self.h);

        for x in 0..w {
            let mut s: isize = -1;
            let mut e: isize = -1;
            let mut blocked = false;
            let mut maxb = self.params.maxb;
            let mut y = 0;
            while y < h {
                if let Some(i) = self.gridi[y * w + x] {
                    maxb = self.islands[i].count;
                    break;
                }
                self.possv[y * w + x] = 0;
                y += 1;
            }
            while y < h {
                let idx = y * w + x;
                maxb = maxb.min(self.maxv[idx] as usize);
                if let Some(i) = self.gridi[idx] {
                    let np = maxb.min(self.islands[i].count);
                    if s != -1 {
                        #[allow(clippy::cast_possible_truncation)]
                        for t in s..=e {
                            self.possv[t as usize * w + x] = if blocked { 0 } else { np as u8 };
                        }
                    }
                    s = y as isize + 1;
                    blocked = false;
                    maxb = self.islands[i].count;
                } else {
                    e = y as isize;
                    if self.grid[idx].intersects(GridFlags::LINEH | GridFlags::NOLINEV) {
                        blocked = true;
                    }
                }
                y += 1;
            }
            if s != -1 {
                for t in s..=e {
                    self.possv[t as usize * w + x] = 0;
                }
            }
        }

        for y in 0..h {
            let mut s: isize = -1;
            let mut e: isize = -1;
            let mut blocked = false;
            let mut maxb = self.params.maxb;
            let mut x = 0;
            while x < w {
                if let Some(i) = self.gridi[y * w + x] {
                    maxb = self.islands[i].count;
                    break;
                }
                self.possh[y * w + x] = 0;
                x += 1;
            }
            while x < w {
                let idx = y * w + x;
                maxb = maxb.min(self.maxh[idx] as usize);
                if let Some(i) = self.gridi[idx] {
                    let np = maxb.min(self.islands[i].count);
                    if s != -1 {
                        #[allow(clippy::cast_possible_truncation)]
                        for t in s..=e {
                            self.possh[y * w + t as usize] = if blocked { 0 } else { np as u8 };
                        }
                    }
                    s = x as isize + 1;
                    blocked = false;
                    maxb = self.islands[i].count;
                } else {
                    e = x as isize;
                    if self.grid[idx].intersects(GridFlags::LINEV | GridFlags::NOLINEH) {
                        blocked = true;
                    }
                }
                x += 1;
            }
            if s != -1 {
                for t in s..=e {
                    self.possh[y * w + t as usize] = 0;
                }
            }
        }
    }

    /// Rewrites every clue from the bridges currently on the board.
    /// Generation uses this once the layout is final.
    fn map_count(&mut self) {
        for i in 0..self.islands.len() {
            self.islands[i].count = self.island_countbridges(i);
        }
    }

    fn map_find_orthogonal(&mut self) {
        for i in 0..self.islands.len() {
            self.island_find_orthogonal(i);
        }
    }

    /// Marks every bridge on a cycle with `WARN` and reports whether
    /// any cycle exists, via a Tarjan-style bridge finder over the
    /// island graph. Unlike a leaf-stripping scan this stays correct
    /// when two cycles are linked by a chain of bridges.
    fn mark_loops(&mut self) -> bool {
        let n = self.islands.len();
        let adj: Vec<Vec<usize>> = (0..n)
            .map(|i| {
                (0..self.islands[i].adj.len())
                    .filter_map(|d| self.island_find_connection(i, d))
                    .collect()
            })
            .collect();
        let finder = LoopFinder::run(n, |v| adj[v].iter().copied());

        for sq in 0..self.grid.len() {
            if !self.grid[sq].contains(GridFlags::ISLAND) {
                self.grid[sq] &= !GridFlags::WARN;
            }
        }
        for i in 0..n {
            let points = self.islands[i].adj;
            for d in 0..points.len() {
                let p = points[d];
                if p.dx < 0 || p.dy < 0 {
                    continue; // each edge once, from its left/top end
                }
                let Some(j) = self.island_find_connection(i, d) else {
                    continue;
                };
                if !finder.is_loop_edge(i, j) {
                    continue;
                }
                for o in 1..p.off {
                    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
                    let sq = self.idx(
                        (self.islands[i].x as isize + p.dx * o as isize) as usize,
                        (self.islands[i].y as isize + p.dy * o as isize) as usize,
                    );
                    self.grid[sq] |= GridFlags::WARN;
                }
            }
        }
        finder.has_loops()
    }

    /// Whether the current position is a completed puzzle, marking
    /// warning squares as a side effect.
    fn map_check(&mut self) -> bool {
        if !self.params.allowloops && self.mark_loops() {
            return false;
        }
        let mut dsf = Dsf::new(self.w * self.h);
        map_group(self, &mut dsf);
        let (anyfull, ngroups) = map_group_full(self, &mut dsf);
        anyfull && ngroups == 1
    }

    /// Strips everything but islands, ready for a fresh solve.
    fn map_clear(&mut self) {
        for sq in &mut self.grid {
            *sq &= GridFlags::ISLAND;
        }
    }
}

/// Re-derives the between-island marks after grouping changed; the dsf
/// covers squares, so islands and every square under a bridge share a
/// class.
fn map_group(state: &mut BridgesState, dsf: &mut Dsf) {
    dsf.reinit();
    for sq in 0..state.grid.len() {
        state.grid[sq] &= !GridFlags::WARN;
    }
    for i in 0..state.islands.len() {
        let (x, y) = (state.islands[i].x, state.islands[i].y);
        let d1 = state.idx(x, y);
        let points = state.islands[i].adj;
        for d in 0..points.len() {
            let p = points[d];
            if p.dx < 0 || p.dy < 0 {
                continue; // right/down only
            }
            let Some(j) = state.island_find_connection(i, d) else {
                continue;
            };
            let (jx, jy) = (state.islands[j].x, state.islands[j].y);
            for x2 in x..=jx {
                for y2 in y..=jy {
                    let d2 = state.idx(x2, y2);
                    if d1 != d2 {
                        dsf.merge(d1, d2);
                    }
                }
            }
        }
    }
}

/// Checks one island group: whether every island in it is satisfied,
/// and how many islands it holds. With `warn`, a satisfied group that
/// is not the whole puzzle gets its squares flagged.
fn map_group_check(
    state: &mut BridgesState,
    dsf: &mut Dsf,
    canon: usize,
    warn: bool,
) -> (bool, usize) {
    let mut nislands = 0;
    let mut allfull = true;
    for i in 0..state.islands.len() {
        let d = state.idx(state.islands[i].x, state.islands[i].y);
        if dsf.canonify(d) != canon {
            continue;
        }
        nislands += 1;
        if state.island_countbridges(i) != state.islands[i].count {
            allfull = false;
        }
    }
    if warn && allfull && nislands != state.islands.len() {
        for sq in 0..state.grid.len() {
            if dsf.canonify(sq) == canon {
                state.grid[sq] |= GridFlags::WARN;
            }
        }
    }
    (allfull, nislands)
}

fn map_group_full(state: &mut BridgesState, dsf: &mut Dsf) -> (bool, usize) {
    let mut canons: Vec<usize> = Vec::new();
    let mut anyfull = false;
    for i in 0..state.islands.len() {
        let canon = dsf.canonify(state.idx(state.islands[i].x, state.islands[i].y));
        if canons.contains(&canon) {
            continue;
        }
        canons.push(canon);
        if map_group_check(state, dsf, canon, true).0 {
            anyfull = true;
        }
    }
    (anyfull, canons.len())
}

/// `solve_join`: join in direction `d` and keep the solver's island
/// dsf in step. A direction with no island is a no-op.
fn solve_join(state: &mut BridgesState, dsf: &mut Dsf, i: usize, d: usize, n: i32, is_max: bool) {
    let p = state.islands[i].adj[d];
    if p.off == 0 {
        return;
    }
    let (ox, oy) = p.orth();
    let Some(j) = state.gridi[state.idx(ox, oy)] else {
        return;
    };
    state.island_join(i, j, n, is_max);
    if n > 0 && !is_max {
        let d1 = state.idx(state.islands[i].x, state.islands[i].y);
        let d2 = state.idx(ox, oy);
        dsf.merge(d1, d2);
    }
}

/// Every remaining possibility must be used: lay one bridge in each
/// still-possible direction.
fn solve_fillone(state: &mut BridgesState, dsf: &mut Dsf, i: usize) -> usize {
    let mut nadded = 0;
    for d in 0..state.islands[i].adj.len() {
        if state.island_isadj(i, d) > 0 && !state.island_hasbridge(i, d) {
            solve_join(state, dsf, i, d, 1, false);
            nadded += 1;
        }
    }
    nadded
}

/// The island's remaining clue equals its remaining capacity: convert
/// every possible bridge into a real one.
fn solve_fill(state: &mut BridgesState, dsf: &mut Dsf, i: usize) -> usize {
    let Some(missing) = state.islands[i]
        .count
        .checked_sub(state.island_countbridges(i))
    else {
        return 0;
    };
    let mut nadded = 0;
    for d in 0..state.islands[i].adj.len() {
        let nnew = state.island_adjspace(i, true, missing, d);
        if nnew > 0 {
            let p = state.islands[i].adj[d];
            let ncurr = state.gridcount(p.x, p.y, line_flag(p.dx));
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            solve_join(state, dsf, i, d, (nnew + ncurr) as i32, false);
            nadded += nnew;
        }
    }
    nadded
}

/// Stage 1: deductions from the island viewed on its own. Returns
/// false when the position is contradictory.
fn solve_island_stage1(state: &mut BridgesState, dsf: &mut Dsf, i: usize, didsth: &mut bool) -> bool {
    let bridges = state.island_countbridges(i);
    let nspaces = state.island_countspaces(i, true);
    let nadj = state.island_countadj(i);
    let count = state.islands[i].count;
    let (x, y) = (state.islands[i].x, state.islands[i].y);
    let mut did = false;

    if bridges > count {
        // Bridges are only ever added when they certainly fit; an
        // overfull island means the puzzle had no solution.
        debug!("island at ({x},{y}) is overpopulated");
        return false;
    } else if bridges == count {
        if !state.grid_at(x, y).intersects(GridFlags::MARK) {
            state.island_togglemark(i);
            did = true;
        }
    } else if state.grid_at(x, y).intersects(GridFlags::MARK) {
        debug!("island at ({x},{y}) is marked but unfinished");
        return false;
    } else if count == bridges + nspaces {
        if solve_fill(state, dsf, i) > 0 {
            did = true;
        }
    } else {
        #[allow(clippy::cast_possible_wrap)]
        let spare = (nadj as i64 - 1) * state.params.maxb as i64;
        #[allow(clippy::cast_possible_wrap)]
        let needed = count as i64;
        if needed > spare {
            // At least one bridge must run in every possible direction.
            if solve_fillone(state, dsf, i) > 0 {
                did = true;
            }
        }
    }
    if did {
        state.map_update_possibles();
        *didsth = true;
    }
    true
}

/// Whether a new bridge in direction `d` would close a loop.
fn solve_island_checkloop(state: &BridgesState, dsf: &mut Dsf, i: usize, d: usize) -> bool {
    if state.params.allowloops || state.island_hasbridge(i, d) || state.island_isadj(i, d) == 0 {
        return false;
    }
    let p = state.islands[i].adj[d];
    if p.off == 0 {
        return false;
    }
    let (ox, oy) = p.orth();
    if state.gridi[state.idx(ox, oy)].is_none() {
        return false;
    }
    let d1 = state.idx(state.islands[i].x, state.islands[i].y);
    let d2 = state.idx(ox, oy);
    dsf.canonify(d1) == dsf.canonify(d2)
}

/// Stage 2: per-connection deductions, including loop avoidance.
fn solve_island_stage2(state: &mut BridgesState, dsf: &mut Dsf, i: usize, didsth: &mut bool) {
    let npoints = state.islands[i].adj.len();
    let mut added = false;
    let mut removed = false;
    let mut navail: i64 = 0;

    for d in 0..npoints {
        if solve_island_checkloop(state, dsf, i, d) {
            solve_join(state, dsf, i, d, -1, false);
            state.map_update_possibles();
            removed = true;
        } else {
            #[allow(clippy::cast_possible_wrap)]
            {
                navail += state.island_isadj(i, d) as i64;
            }
        }
    }

    let count = state.islands[i].count;
    for d in 0..npoints {
        if state.island_hasbridge(i, d) {
            continue;
        }
        #[allow(clippy::cast_possible_wrap)]
        let nadj = state.island_isadj(i, d) as i64;
        #[allow(clippy::cast_possible_wrap)]
        let needed = count as i64;
        if nadj > 0 && navail - nadj < needed {
            // The island cannot be completed without at least one
            // bridge here.
            solve_join(state, dsf, i, d, 1, false);
            added = true;
        }
    }
    if added {
        state.map_update_possibles();
    }
    if added || removed {
        *didsth = true;
    }
}

/// Whether the group containing island `i` (and, for `Some(d)`, the
/// island in that direction) is satisfied yet smaller than the whole
/// puzzle.
fn solve_island_subgroup(
    state: &mut BridgesState,
    dsf: &mut Dsf,
    i: usize,
    direction: Option<usize>,
) -> bool {
    if state.island_countbridges(i) < state.islands[i].count {
        return false;
    }
    if let Some(d) = direction {
        let p = state.islands[i].adj[d];
        if p.off == 0 {
            return false;
        }
        let (ox, oy) = p.orth();
        let Some(j) = state.gridi[state.idx(ox, oy)] else {
            return false;
        };
        if state.island_countbridges(j) < state.islands[j].count {
            return false;
        }
    }
    let canon = dsf.canonify(state.idx(state.islands[i].x, state.islands[i].y));
    let (allfull, nislands) = map_group_check(state, dsf, canon, false);
    allfull && nislands < state.islands.len()
}

fn solve_island_impossible(state: &BridgesState) -> bool {
    (0..state.islands.len()).any(|i| state.island_impossible(i, false))
}

/// Stage 3: speculative deductions. Tentatively raise a bridge count
/// and reject any level that saturates a proper subgroup or renders an
/// island impossible; also force a bridge into a direction whose
/// omission would isolate a full subgroup.
fn solve_island_stage3(state: &mut BridgesState, dsf: &mut Dsf, i: usize, didsth: &mut bool) {
    let count = state.islands[i].count;
    let bridges = state.island_countbridges(i);
    let Some(missing) = count.checked_sub(bridges) else {
        return;
    };
    if missing == 0 {
        return;
    }
    let npoints = state.islands[i].adj.len();
    let mut did = false;

    for d in 0..npoints {
        let p = state.islands[i].adj[d];
        let spc = state.island_adjspace(i, true, missing, d);
        if spc == 0 {
            continue;
        }
        let curr = state.gridcount(p.x, p.y, line_flag(p.dx));

        // The dsf is additive only, so squirrel it away and restore.
        let saved = dsf.clone();
        let mut maxb: i32 = -1;
        for n in curr + 1..=curr + spc {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            solve_join(state, dsf, i, d, n as i32, false);
            state.map_update_possibles();
            if solve_island_subgroup(state, dsf, i, Some(d)) || solve_island_impossible(state) {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                {
                    maxb = n as i32 - 1;
                }
                break;
            }
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        solve_join(state, dsf, i, d, curr as i32, false);
        *dsf = saved;

        if maxb != -1 {
            if maxb == 0 {
                solve_join(state, dsf, i, d, -1, false);
            } else {
                solve_join(state, dsf, i, d, maxb, true);
            }
            did = true;
        }
        state.map_update_possibles();
    }

    // Second pass: imagine connecting maximally to every *other*
    // direction at once. If that isolates a full subgroup, direction
    // `d` must carry at least one bridge. This catches deductions the
    // single-target pass above cannot, and vice versa.
    for d in 0..npoints {
        let spc = state.island_adjspace(i, true, missing, d);
        if spc == 0 {
            continue;
        }
        let before: Vec<usize> = (0..npoints)
            .map(|j| {
                let p = state.islands[i].adj[j];
                state.gridcount(p.x, p.y, line_flag(p.dx))
            })
            .collect();
        if before[d] != 0 {
            continue;
        }
        let saved = dsf.clone();
        for j in 0..npoints {
            let spc_j = state.island_adjspace(i, true, missing, j);
            if spc_j == 0 || j == d {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            solve_join(state, dsf, i, j, (before[j] + spc_j) as i32, false);
        }
        state.map_update_possibles();
        let got = solve_island_subgroup(state, dsf, i, None);
        for j in 0..npoints {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            solve_join(state, dsf, i, j, before[j] as i32, false);
        }
        *dsf = saved;

        if got {
            solve_join(state, dsf, i, d, 1, false);
            did = true;
        }
        state.map_update_possibles();
    }

    if did {
        *didsth = true;
    }
}

fn solve_sub(state: &mut BridgesState, dsf: &mut Dsf, difficulty: usize) -> bool {
    loop {
        let mut didsth = false;

        for i in 0..state.islands.len() {
            if !solve_island_stage1(state, dsf, i, &mut didsth) {
                return false;
            }
        }
        if didsth {
            continue;
        }
        if difficulty < 1 {
            break;
        }

        for i in 0..state.islands.len() {
            let (x, y) = (state.islands[i].x, state.islands[i].y);
            if state.grid_at(x, y).intersects(GridFlags::MARK) {
                continue; // island full, don't try fixing it
            }
            solve_island_stage2(state, dsf, i, &mut didsth);
        }
        if didsth {
            continue;
        }
        if difficulty < 2 {
            break;
        }

        for i in 0..state.islands.len() {
            solve_island_stage3(state, dsf, i, &mut didsth);
        }
        if !didsth {
            break;
        }
    }
    state.map_check()
}

fn solve_from_scratch(state: &mut BridgesState, difficulty: usize) -> bool {
    state.map_clear();
    let mut dsf = Dsf::new(state.w * state.h);
    map_group(state, &mut dsf);
    state.map_update_possibles();
    solve_sub(state, &mut dsf, difficulty)
}

/// Runs the full-strength solver over the current position without
/// clearing it, for the hint key.
fn solve_for_hint(state: &mut BridgesState) {
    let mut dsf = Dsf::new(state.w * state.h);
    map_group(state, &mut dsf);
    solve_sub(state, &mut dsf, 10);
}

/// Encodes the island layout: digits and `A`..`G` for clues, letters
/// `a`..`z` for runs of empty squares.
fn encode_game(state: &BridgesState) -> String {
    let mut ret = String::new();
    let mut run = 0u8;
    for y in 0..state.h {
        for x in 0..state.w {
            if let Some(i) = state.gridi[state.idx(x, y)] {
                if run > 0 {
                    ret.push(char::from(b'a' - 1 + run));
                    run = 0;
                }
                let count = state.islands[i].count;
                #[allow(clippy::cast_possible_truncation)]
                let c = if count < 10 {
                    b'0' + count as u8
                } else {
                    b'A' + (count as u8 - 10)
                };
                ret.push(char::from(c));
            } else {
                if run == 26 {
                    ret.push(char::from(b'a' - 1 + run));
                    run = 0;
                }
                run += 1;
            }
        }
    }
    if run > 0 {
        ret.push(char::from(b'a' - 1 + run));
    }
    ret
}

/// The move string turning `src` into `dest`: bridge count changes,
/// no-line flips and mark toggles, prefixed with `S`.
fn game_state_diff(src: &BridgesState, dest: &BridgesState) -> String {
    let mut mv = String::from("S");
    debug_assert_eq!(src.islands.len(), dest.islands.len());

    for i in 0..src.islands.len() {
        let is = &src.islands[i];
        for p in &is.adj {
            if p.dx < 0 || p.dy < 0 {
                continue;
            }
            let gline = line_flag(p.dx);
            let nline = noline_flag(p.dx);
            let (ox, oy) = p.orth();
            let Some(oi) = dest.gridi.get(dest.idx(ox, oy)).copied().flatten() else {
                continue;
            };
            let (jx, jy) = (dest.islands[oi].x, dest.islands[oi].y);

            if src.gridcount(p.x, p.y, gline) != dest.gridcount(p.x, p.y, gline) {
                let _ = write!(
                    mv,
                    ";L{},{},{},{},{}",
                    is.x,
                    is.y,
                    jx,
                    jy,
                    dest.gridcount(p.x, p.y, gline)
                );
            }
            if src.grid_at(p.x, p.y).intersects(nline) != dest.grid_at(p.x, p.y).intersects(nline)
            {
                let _ = write!(mv, ";N{},{},{},{}", is.x, is.y, jx, jy);
            }
        }
        if src.grid_at(is.x, is.y).intersects(GridFlags::MARK)
            != dest.grid_at(is.x, is.y).intersects(GridFlags::MARK)
        {
            let _ = write!(mv, ";M{},{}", is.x, is.y);
        }
    }
    mv
}

enum Extend {
    NewIsland,
    Joined,
    Failed,
}

/// One attempt to grow the map: pick an island and a direction, then
/// either create a new island along it or (loops permitting) join up
/// to an existing one.
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
fn extend_map(state: &mut BridgesState, params: &BridgesParams, rs: &mut RandomState) -> Extend {
    let i = rs.upto(state.islands.len());
    let (ix, iy) = (state.islands[i].x, state.islands[i].y);
    let j = rs.upto(state.islands[i].adj.len());
    let p = state.islands[i].adj[j];
    let (dx, dy) = (p.dx, p.dy);

    // Closest legal spot for a new island is two squares out.
    let (minx, miny) = (ix as isize + 2 * dx, iy as isize + 2 * dy);
    let (mut x, mut y) = (ix as isize + dx, iy as isize + dy);
    if state.grid_at(x as usize, y as usize).intersects(GridFlags::LINE) {
        return Extend::Failed;
    }

    let mut join = None;
    let (maxx, maxy) = loop {
        if !state.in_grid(x, y) {
            break (x - dx, y - dy);
        }
        let here = state.grid_at(x as usize, y as usize);
        if here.contains(GridFlags::ISLAND) {
            // Could join to this island, or stop two squares short.
            join = Some((x as usize, y as usize));
            break (x - 2 * dx, y - 2 * dy);
        }
        if here.intersects(GridFlags::LINE) {
            break (x - dx, y - dy);
        }
        x += dx;
        y += dy;
    };

    let mut created = false;
    let joinable = match join {
        Some((jx, jy)) if params.allowloops => {
            if rs.upto(100) < params.expansion {
                state.gridi[state.idx(jx, jy)]
            } else {
                None
            }
        }
        _ => None,
    };
    let other = if let Some(oi) = joinable {
        oi
    } else {
        let diffx = (maxx - minx) * dx;
        let diffy = (maxy - miny) * dy;
        if diffx < 0 || diffy < 0 {
            return Extend::Failed;
        }
        let (newx, newy) = if rs.upto(100) < params.expansion {
            (maxx, maxy)
        } else {
            (
                minx + rs.upto(diffx as usize + 1) as isize * dx,
                miny + rs.upto(diffy as usize + 1) as isize * dy,
            )
        };
        // Reject spots orthogonally adjacent to an existing island.
        for (ax, ay) in [(newx + dy, newy + dx), (newx - dy, newy - dx)] {
            if state.in_grid(ax, ay)
                && state
                    .grid_at(ax as usize, ay as usize)
                    .contains(GridFlags::ISLAND)
            {
                return Extend::Failed;
            }
        }
        created = true;
        state.island_add(newx as usize, newy as usize, 0)
    };

    state.island_join(i, other, rs.upto(state.params.maxb) as i32 + 1, false);
    if created {
        Extend::NewIsland
    } else {
        Extend::Joined
    }
}

/// Generates a solved map meeting the parameters; retries internally
/// until the solver confirms the difficulty window.
fn generate_map(params: &BridgesParams, rs: &mut RandomState) -> BridgesState {
    let wh = params.w * params.h;
    let ni_req = ((params.islands * wh) / 100).max(MIN_SENSIBLE_ISLANDS);

    'generate: loop {
        let mut state = BridgesState::new(params);
        state.island_add(rs.upto(params.w), rs.upto(params.h), 0);
        let mut ni_curr = 1;
        let mut ni_bad = 0;

        while ni_curr < ni_req {
            match extend_map(&mut state, params, rs) {
                Extend::NewIsland => {
                    ni_curr += 1;
                    ni_bad = 0;
                }
                Extend::Joined => {}
                Extend::Failed => {
                    ni_bad += 1;
                    if ni_bad > MAX_NEWISLAND_TRIES {
                        debug!(
                            "unable to create new islands after {MAX_NEWISLAND_TRIES} tries; \
                             created {ni_curr} of {ni_req} requested"
                        );
                        break;
                    }
                }
            }
        }

        if ni_curr == 1 {
            continue 'generate;
        }
        // Every extremity of the grid must hold at least one island.
        let mut echeck = 0u8;
        for x in 0..params.w {
            if state.gridi[state.idx(x, 0)].is_some() {
                echeck |= 1;
            }
            if state.gridi[state.idx(x, params.h - 1)].is_some() {
                echeck |= 2;
            }
        }
        for y in 0..params.h {
            if state.gridi[state.idx(0, y)].is_some() {
                echeck |= 4;
            }
            if state.gridi[state.idx(params.w - 1, y)].is_some() {
                echeck |= 8;
            }
        }
        if echeck != 15 {
            continue 'generate;
        }

        state.map_count();
        state.map_find_orthogonal();

        if params.difficulty > 0
            && ni_curr > MIN_SENSIBLE_ISLANDS
            && solve_from_scratch(&mut state, params.difficulty - 1)
        {
            debug!("grid solvable at difficulty {}; too easy", params.difficulty - 1);
            continue 'generate;
        }
        if !solve_from_scratch(&mut state, params.difficulty) {
            debug!("grid not solvable at difficulty {}; too hard", params.difficulty);
            continue 'generate;
        }
        // The state is now solved; new_desc diffs it for the aux hint.
        return state;
    }
}

/// Drag bookkeeping, cursor and the hint overlay toggle.
#[derive(Debug, Default)]
pub struct BridgesUi {
    drag_src: Option<(usize, usize)>,
    drag_dst: Option<(usize, usize)>,
    dragging: bool,
    drag_is_noline: bool,
    nlines: usize,
    cur_x: usize,
    cur_y: usize,
    cur_visible: bool,
    show_hints: bool,
}

impl BridgesUi {
    fn cancel_drag(&mut self) {
        self.drag_src = None;
        self.drag_dst = None;
        self.dragging = false;
    }
}

/// Renderer scratch: one packed word per square, previous and next.
#[derive(Debug, Default)]
pub struct BridgesDraw {
    tilesize: i32,
    w: usize,
    h: usize,
    grid: Vec<u32>,
    newgrid: Vec<u32>,
    started: bool,
}

// Packed drawing words. A square holding an island stores one island
// nibble plus four 6-bit line fields (for bridges poking in from each
// side); a line square stores four island nibbles (for neighbouring
// islands poking in) plus two 6-bit line fields.
const DL_COUNTMASK: u32 = 0x07;
const DL_COUNT_CROSS: u32 = 0x06;
const DL_COUNT_HINT: u32 = 0x07;
const DL_COLMASK: u32 = 0x18;
const DL_COL_WARNING: u32 = 0x08;
const DL_COL_FLASH: u32 = 0x10;
const DL_COL_SELECTED: u32 = 0x18;
const DL_LOCK: u32 = 0x20;
const DL_MASK: u32 = 0x3F;

const DI_COLMASK: u32 = 0x03;
const DI_COL_FLASH: u32 = 0x01;
const DI_COL_WARNING: u32 = 0x02;
const DI_COL_SELECTED: u32 = 0x03;
const DI_BGMASK: u32 = 0x0C;
const DI_BG_NO_ISLAND: u32 = 0x00;
const DI_BG_NORMAL: u32 = 0x04;
const DI_BG_MARK: u32 = 0x08;
const DI_BG_CURSOR: u32 = 0x0C;
const DI_MASK: u32 = 0x0F;

const D_I_ISLAND_SHIFT: u32 = 0;
const D_I_LINE_SHIFT_L: u32 = 4;
const D_I_LINE_SHIFT_R: u32 = 10;
const D_I_LINE_SHIFT_U: u32 = 16;
const D_I_LINE_SHIFT_D: u32 = 24;
const D_L_ISLAND_SHIFT_L: u32 = 0;
const D_L_ISLAND_SHIFT_R: u32 = 4;
const D_L_ISLAND_SHIFT_U: u32 = 8;
const D_L_ISLAND_SHIFT_D: u32 = 12;
const D_L_LINE_SHIFT_H: u32 = 16;
const D_L_LINE_SHIFT_V: u32 = 22;

fn coord(ts: i32, v: i32) -> i32 {
    v * ts + ts / 2
}

fn fromcoord(ts: i32, v: i32) -> i32 {
    (v - ts / 2 + ts) / ts - 1
}

/// Whether the square sits on the straight line between two islands.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn between_island(state: &BridgesState, sx: usize, sy: usize, dx: isize, dy: isize) -> bool {
    let (mut x, mut y) = (sx as isize - dx, sy as isize - dy);
    let mut before = false;
    while state.in_grid(x, y) {
        if state.grid_at(x as usize, y as usize).contains(GridFlags::ISLAND) {
            before = true;
            break;
        }
        x -= dx;
        y -= dy;
    }
    if !before {
        return false;
    }
    let (mut x, mut y) = (sx as isize + dx, sy as isize + dy);
    while state.in_grid(x, y) {
        if state.grid_at(x as usize, y as usize).contains(GridFlags::ISLAND) {
            return true;
        }
        x += dx;
        y += dy;
    }
    false
}

fn lines_lvlh(
    state: &BridgesState,
    ui: &BridgesUi,
    x: usize,
    y: usize,
    v: GridFlags,
) -> (usize, usize) {
    let nl = state.lines[state.idx(x, y)] as usize;
    let mut lv = if v.contains(GridFlags::LINEV) { nl } else { 0 };
    let mut lh = if v.contains(GridFlags::LINEH) { nl } else { 0 };
    if ui.show_hints {
        if lv == 0 && between_island(state, x, y, 0, 1) {
            lv = 1;
        }
        if lh == 0 && between_island(state, x, y, 1, 0) {
            lh = 1;
        }
    }
    (lv, lh)
}

fn draw_cross(api: &mut dyn DrawApi, ts: i32, ox: i32, oy: i32, col: usize) {
    let off = ts * 2 / 8;
    api.draw_line(ox, oy, ox + off, oy + off, col);
    api.draw_line(ox + off, oy, ox, oy + off, col);
}

/// Draws one direction of lines in a square. `fx,fy` run along the
/// lines and `ax,ay` across them, so one body serves both
/// orientations. `which` selects the white lock background (1) and the
/// bridges themselves (2), letting two overlapping locked bridges
/// paint without erasing each other.
#[allow(clippy::too_many_arguments, clippy::cast_possible_wrap)]
fn draw_general_line(
    api: &mut dyn DrawApi,
    ts: i32,
    ox: i32,
    oy: i32,
    fx: i32,
    fy: i32,
    ax: i32,
    ay: i32,
    len: i32,
    ldata: u32,
    which: u32,
) {
    let ts8 = |v: i32| v * ts / 8;
    let fg = if ldata & DL_COUNTMASK == DL_COUNT_HINT {
        COL_HINT
    } else if ldata & DL_COLMASK == DL_COL_SELECTED {
        COL_SELECTED
    } else if ldata & DL_COLMASK == DL_COL_FLASH {
        COL_HIGHLIGHT
    } else if ldata & DL_COLMASK == DL_COL_WARNING {
        COL_WARNING
    } else {
        COL_FOREGROUND
    };

    if ldata & DL_COUNTMASK == DL_COUNT_CROSS {
        draw_cross(api, ts, ox + ts8(1) * fx + ts8(3) * ax, oy + ts8(1) * fy + ts8(3) * ay, fg);
        draw_cross(api, ts, ox + ts8(5) * fx + ts8(3) * ax, oy + ts8(5) * fy + ts8(3) * ay, fg);
    } else if ldata & DL_COUNTMASK != 0 {
        let mut lh = (ldata & DL_COUNTMASK) as i32;
        if lh == 7 {
            lh = 1; // hint lines draw singly
        }
        let lw = ts / 8;
        let mut gw = lw;
        while lw * lh + gw * (lh + 1) > ts {
            gw -= 1;
        }
        let bw = lw * lh + gw * (lh + 1);
        let mut loff = ts / 2 - bw / 2;

        if which & 1 != 0 && ldata & DL_LOCK != 0 && fg != COL_HINT {
            api.draw_rect(ox + loff * ax, oy + loff * ay, len * fx + bw * ax, len * fy + bw * ay, COL_MARK);
        }
        if which & 2 != 0 {
            for _ in 0..lh {
                api.draw_rect(
                    ox + (loff + gw) * ax,
                    oy + (loff + gw) * ay,
                    len * fx + lw * ax,
                    len * fy + lw * ay,
                    fg,
                );
                loff += lw + gw;
            }
        }
    }
}

fn draw_hline(api: &mut dyn DrawApi, ts: i32, ox: i32, oy: i32, w: i32, data: u32, which: u32) {
    draw_general_line(api, ts, ox, oy, 1, 0, 0, 1, w, data, which);
}

fn draw_vline(api: &mut dyn DrawApi, ts: i32, ox: i32, oy: i32, h: i32, data: u32, which: u32) {
    draw_general_line(api, ts, ox, oy, 0, 1, 1, 0, h, data, which);
}

/// The thick circle plus clue; `clue < 0` suppresses the number (used
/// for island edges intruding into neighbouring squares).
#[allow(clippy::cast_possible_wrap)]
fn draw_island_disc(api: &mut dyn DrawApi, ts: i32, ox: i32, oy: i32, clue: i32, idata: u32) {
    if idata & DI_BGMASK == DI_BG_NO_ISLAND {
        return;
    }
    let half = ts / 2;
    let orad = ts * 12 / 20;
    let irad = orad - ts / 8;
    let fg = if idata & DI_COLMASK == DI_COL_SELECTED {
        COL_SELECTED
    } else if idata & DI_COLMASK == DI_COL_WARNING {
        COL_WARNING
    } else if idata & DI_COLMASK == DI_COL_FLASH {
        COL_HIGHLIGHT
    } else {
        COL_FOREGROUND
    };
    let bg = if idata & DI_BGMASK == DI_BG_CURSOR {
        COL_CURSOR
    } else if idata & DI_BGMASK == DI_BG_MARK {
        COL_MARK
    } else {
        COL_BACKGROUND
    };

    api.draw_circle(ox + half, oy + half, orad, Some(fg), fg);
    api.draw_circle(ox + half, oy + half, irad, Some(bg), bg);

    if clue > 0 {
        let textcolour = if fg == COL_SELECTED { COL_FOREGROUND } else { fg };
        let size = if clue < 10 { ts * 7 / 10 } else { ts * 5 / 10 };
        api.draw_text(
            ox + half,
            oy + half,
            FontType::Variable,
            size,
            HAlign::Centre,
            VAlign::Centre,
            textcolour,
            &clue.to_string(),
        );
    }
}

fn draw_island_tile(api: &mut dyn DrawApi, ts: i32, x: i32, y: i32, clue: i32, data: u32) {
    let (ox, oy) = (coord(ts, x), coord(ts, y));
    api.clip(ox, oy, ts, ts);
    api.draw_rect(ox, oy, ts, ts, COL_BACKGROUND);

    // Incoming bridges can just about meet at a corner, so draw all
    // lock backgrounds before any bridge bodies.
    for which in [1, 2] {
        draw_hline(api, ts, ox, oy, ts / 2, (data >> D_I_LINE_SHIFT_L) & DL_MASK, which);
        draw_hline(
            api,
            ts,
            ox + ts - ts / 2,
            oy,
            ts / 2,
            (data >> D_I_LINE_SHIFT_R) & DL_MASK,
            which,
        );
        draw_vline(api, ts, ox, oy, ts / 2, (data >> D_I_LINE_SHIFT_U) & DL_MASK, which);
        draw_vline(
            api,
            ts,
            ox,
            oy + ts - ts / 2,
            ts / 2,
            (data >> D_I_LINE_SHIFT_D) & DL_MASK,
            which,
        );
    }
    draw_island_disc(api, ts, ox, oy, clue, (data >> D_I_ISLAND_SHIFT) & DI_MASK);

    api.unclip();
    api.draw_update(ox, oy, ts, ts);
}

fn draw_line_tile(api: &mut dyn DrawApi, ts: i32, x: i32, y: i32, data: u32) {
    let (ox, oy) = (coord(ts, x), coord(ts, y));
    api.clip(ox, oy, ts, ts);
    api.draw_rect(ox, oy, ts, ts, COL_BACKGROUND);

    // Hint lines at the bottom, then crosses, then bridges; the count
    // field enumeration makes that a plain comparison. Two crossing
    // entries here cannot both be real bridges, so `which` is trivial.
    let hdata = (data >> D_L_LINE_SHIFT_H) & DL_MASK;
    let vdata = (data >> D_L_LINE_SHIFT_V) & DL_MASK;
    if hdata & DL_COUNTMASK > vdata & DL_COUNTMASK {
        draw_hline(api, ts, ox, oy, ts, hdata, 3);
        draw_vline(api, ts, ox, oy, ts, vdata, 3);
    } else {
        draw_vline(api, ts, ox, oy, ts, vdata, 3);
        draw_hline(api, ts, ox, oy, ts, hdata, 3);
    }

    draw_island_disc(api, ts, ox - ts, oy, -1, (data >> D_L_ISLAND_SHIFT_L) & DI_MASK);
    draw_island_disc(api, ts, ox + ts, oy, -1, (data >> D_L_ISLAND_SHIFT_R) & DI_MASK);
    draw_island_disc(api, ts, ox, oy - ts, -1, (data >> D_L_ISLAND_SHIFT_U) & DI_MASK);
    draw_island_disc(api, ts, ox, oy + ts, -1, (data >> D_L_ISLAND_SHIFT_D) & DI_MASK);

    api.unclip();
    api.draw_update(ox, oy, ts, ts);
}

/// The sliver of an island that pokes clean off the playing area when
/// the island sits on the border.
#[allow(clippy::too_many_arguments)]
fn draw_edge_tile(api: &mut dyn DrawApi, ts: i32, x: i32, y: i32, dx: i32, dy: i32, data: u32) {
    let (ox, oy) = (coord(ts, x), coord(ts, y));
    let (mut cx, mut cy, mut cw, mut ch) = (ox, oy, ts, ts);
    if dy != 0 {
        if dy > 0 {
            cy += ts / 2;
        }
        ch -= ts / 2;
    } else {
        if dx > 0 {
            cx += ts / 2;
        }
        cw -= ts / 2;
    }
    api.clip(cx, cy, cw, ch);
    api.draw_rect(cx, cy, cw, ch, COL_BACKGROUND);
    draw_island_disc(api, ts, ox + ts * dx, oy + ts * dy, -1, (data >> D_I_ISLAND_SHIFT) & DI_MASK);
    api.unclip();
    api.draw_update(cx, cy, cw, ch);
}

/// Recomputes the drag destination from a pointer position, along with
/// the bridge count the drag would set.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn update_drag_dst(state: &BridgesState, ui: &mut BridgesUi, ts: i32, nx: i32, ny: i32) {
    let Some((sx, sy)) = ui.drag_src else {
        return;
    };
    ui.drag_dst = None;

    let ox = coord(ts, sx as i32) + ts / 2;
    let oy = coord(ts, sy as i32) + ts / 2;
    let (dx, dy): (isize, isize) = if (nx - ox).abs() < (ny - oy).abs() {
        (0, if ny - oy < 0 { -1 } else { 1 })
    } else {
        (if nx - ox < 0 { -1 } else { 1 }, 0)
    };
    let gtype = line_flag(dx);
    let ntype = noline_flag(dx);
    let mtype = mark_flag(dx);

    let (tx, ty) = (sx as isize + dx, sy as isize + dy);
    if !state.in_grid(tx, ty) {
        ui.nlines = 0;
        return;
    }
    let (tx, ty) = (tx as usize, ty as usize);
    let maxb = state.maximum(dx, tx, ty);

    if !ui.drag_is_noline {
        let here = state.grid_at(tx, ty);
        let currl = state.lines[state.idx(tx, ty)] as usize;
        ui.nlines = if here.intersects(gtype) {
            if currl == maxb { 0 } else { currl + 1 }
        } else {
            1
        };
    }

    let Some(i) = state.gridi[state.idx(sx, sy)] else {
        return;
    };
    for p in &state.islands[i].adj {
        if p.off == 0 {
            continue;
        }
        let here = state.grid_at(tx, ty);
        if here.intersects(mtype) {
            continue; // marked lines are immutable
        }
        if ui.drag_is_noline {
            if here.intersects(gtype) {
                continue;
            }
        } else {
            if state.possibles(dx, tx, ty) == 0 {
                continue;
            }
            if here.intersects(ntype) {
                continue;
            }
        }
        if p.dx == dx && p.dy == dy {
            ui.drag_dst = Some(p.orth());
        }
    }
}

fn finish_drag(ui: &mut BridgesUi) -> MoveIntent {
    let Some((sx, sy)) = ui.drag_src else {
        return MoveIntent::Ignored;
    };
    let Some((dx, dy)) = ui.drag_dst else {
        ui.cancel_drag();
        return MoveIntent::Redraw;
    };
    let mv = if ui.drag_is_noline {
        format!("N{sx},{sy},{dx},{dy}")
    } else {
        format!("L{sx},{sy},{dx},{dy},{}", ui.nlines)
    };
    ui.cancel_drag();
    MoveIntent::Move(mv)
}

/// Searches for an island roadly in the pressed direction: straight
/// ahead first, then in a widening cone, preferring `orthorder`'s side
/// so opposite keypresses retrace each other.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn cursor_find_island(
    state: &BridgesState,
    cx: usize,
    cy: usize,
    dx: isize,
    dy: isize,
    orthorder: isize,
) -> Option<(usize, usize)> {
    let dorthx = 1 - dx.abs();
    let dorthy = 1 - dy.abs();
    let mut orth: isize = 0;
    loop {
        let mut oingrid = false;
        let mut dir = orth.max(1);
        loop {
            let mut dingrid = false;
            for sign in [1isize, -1] {
                let nx = cx as isize + dir * dx + orth * dorthx * orthorder * sign;
                let ny = cy as isize + dir * dy + orth * dorthy * orthorder * sign;
                if state.in_grid(nx, ny) {
                    dingrid = true;
                    oingrid = true;
                    if state
                        .grid_at(nx as usize, ny as usize)
                        .contains(GridFlags::ISLAND)
                    {
                        return Some((nx as usize, ny as usize));
                    }
                }
            }
            if !dingrid {
                break;
            }
            dir += 1;
        }
        if !oingrid {
            return None;
        }
        orth += 1;
    }
}

fn parse_nums(s: &str, n: usize) -> Option<Vec<usize>> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != n {
        return None;
    }
    parts.iter().map(|p| p.parse().ok()).collect()
}

const DIFFICULTY_NAMES: [&str; 3] = ["Easy", "Medium", "Hard"];

fn eat_num(s: &mut &[u8]) -> Option<usize> {
    let digits = s.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let v = std::str::from_utf8(&s[..digits]).ok()?.parse().ok()?;
    *s = &s[digits..];
    Some(v)
}

fn eat_token(s: &mut &[u8], token: u8) -> bool {
    if s.first() == Some(&token) {
        *s = &s[1..];
        true
    } else {
        false
    }
}

impl Backend for Bridges {
    type Params = BridgesParams;
    type State = BridgesState;
    type Ui = BridgesUi;
    type DrawState = BridgesDraw;

    const NAME: &'static str = "Bridges";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = true;
    const CAN_FORMAT_AS_TEXT: bool = true;
    const WANTS_STATUSBAR: bool = false;
    const IS_TIMED: bool = false;
    const PREFERRED_TILESIZE: i32 = PREFERRED_TILESIZE;

    fn flags() -> BackendFlags {
        BackendFlags::REQUIRE_RBUTTON
    }

    fn default_params() -> BridgesParams {
        BridgesParams {
            w: 7,
            h: 7,
            maxb: 2,
            islands: 30,
            expansion: 10,
            allowloops: true,
            difficulty: 0,
        }
    }

    fn presets() -> Vec<(String, BridgesParams)> {
        let mut ret = Vec::new();
        for (w, h) in [(7, 7), (10, 10), (15, 15)] {
            for (difficulty, name) in DIFFICULTY_NAMES.iter().enumerate() {
                let params = BridgesParams {
                    w,
                    h,
                    difficulty,
                    ..Self::default_params()
                };
                ret.push((format!("{w}x{h} {name}"), params));
            }
        }
        ret
    }

    fn decode_params(params: &mut BridgesParams, string: &str) {
        let mut s = string.as_bytes();
        if let Some(w) = eat_num(&mut s) {
            params.w = w;
            params.h = w;
        }
        if eat_token(&mut s, b'x') {
            params.h = eat_num(&mut s).unwrap_or(0);
        }
        if eat_token(&mut s, b'i') {
            params.islands = eat_num(&mut s).unwrap_or(0);
        }
        if eat_token(&mut s, b'e') {
            params.expansion = eat_num(&mut s).unwrap_or(0);
        }
        if eat_token(&mut s, b'm') {
            params.maxb = eat_num(&mut s).unwrap_or(0);
        }
        params.allowloops = !eat_token(&mut s, b'L');
        if eat_token(&mut s, b'd') {
            params.difficulty = eat_num(&mut s).unwrap_or(0);
        }
    }

    fn encode_params(params: &BridgesParams, full: bool) -> String {
        let loops = if params.allowloops { "" } else { "L" };
        if full {
            format!(
                "{}x{}i{}e{}m{}{}d{}",
                params.w,
                params.h,
                params.islands,
                params.expansion,
                params.maxb,
                loops,
                params.difficulty
            )
        } else {
            format!("{}x{}m{}{}", params.w, params.h, params.maxb, loops)
        }
    }

    fn configure(params: &BridgesParams) -> Vec<ConfigItem> {
        vec![
            ConfigItem {
                name: "Width".to_owned(),
                value: ConfigValue::String(format!("{}", params.w)),
            },
            ConfigItem {
                name: "Height".to_owned(),
                value: ConfigValue::String(format!("{}", params.h)),
            },
            ConfigItem {
                name: "Difficulty".to_owned(),
                value: ConfigValue::Choices {
                    options: DIFFICULTY_NAMES.iter().map(ToString::to_string).collect(),
                    selected: params.difficulty.min(2),
                },
            },
            ConfigItem {
                name: "Allow loops".to_owned(),
                value: ConfigValue::Boolean(params.allowloops),
            },
            ConfigItem {
                name: "Max. bridges per direction".to_owned(),
                value: ConfigValue::Choices {
                    options: (1..=MAX_BRIDGES).map(|n| n.to_string()).collect(),
                    selected: params.maxb.saturating_sub(1),
                },
            },
            ConfigItem {
                name: "%age of island squares".to_owned(),
                value: ConfigValue::Choices {
                    options: (1..=6).map(|n| format!("{}%", n * 5)).collect(),
                    selected: (params.islands / 5).saturating_sub(1),
                },
            },
            ConfigItem {
                name: "Expansion factor (%age)".to_owned(),
                value: ConfigValue::Choices {
                    options: (0..=10).map(|n| format!("{}%", n * 10)).collect(),
                    selected: params.expansion / 10,
                },
            },
        ]
    }

    fn custom_params(cfg: &[ConfigItem]) -> BridgesParams {
        let text = |i: usize| match cfg.get(i).map(|item| &item.value) {
            Some(ConfigValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let choice = |i: usize| match cfg.get(i).map(|item| &item.value) {
            Some(&ConfigValue::Choices { selected, .. }) => selected,
            _ => 0,
        };
        let allowloops = matches!(
            cfg.get(3).map(|item| &item.value),
            Some(&ConfigValue::Boolean(b)) if b
        );
        BridgesParams {
            w: text(0),
            h: text(1),
            difficulty: choice(2),
            allowloops,
            maxb: choice(4) + 1,
            islands: (choice(5) + 1) * 5,
            expansion: choice(6) * 10,
        }
    }

    fn validate_params(params: &BridgesParams, full: bool) -> Result<(), ParamsError> {
        if params.w < 3 || params.h < 3 {
            return Err(ParamsError::new("Width and height must be at least 3"));
        }
        if params.maxb < 1 || params.maxb > MAX_BRIDGES {
            return Err(ParamsError::new("Too many bridges."));
        }
        if full {
            if params.islands == 0 || params.islands > 30 {
                return Err(ParamsError::new(
                    "%age of island squares must be between 1% and 30%",
                ));
            }
            if params.expansion > 100 {
                return Err(ParamsError::new(
                    "Expansion factor must be between 0 and 100",
                ));
            }
        }
        Ok(())
    }

    fn new_desc(
        params: &BridgesParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        let solved = generate_map(params, rs);
        let desc = encode_game(&solved);
        let mut clean = solved.clone();
        clean.map_clear();
        clean.map_update_possibles();
        let aux = game_state_diff(&clean, &solved);
        (desc, Some(aux))
    }

    fn validate_desc(params: &BridgesParams, desc: &str) -> Result<(), DescError> {
        let wh = params.w * params.h;
        let mut i = 0;
        let mut chars = desc.chars();
        while i < wh {
            match chars.next() {
                Some('1'..='9' | 'A'..='G') => {}
                Some(c @ 'a'..='z') => i += c as usize - 'a' as usize,
                Some('V' | 'W' | 'X' | 'Y' | 'H' | 'I' | 'J' | 'K') => {}
                None => return Err(DescError::new("Game description shorter than expected")),
                Some(_) => {
                    return Err(DescError::new(
                        "Game description contains unexpected character",
                    ));
                }
            }
            i += 1;
        }
        if chars.next().is_some() || i > wh {
            return Err(DescError::new("Game description longer than expected"));
        }
        Ok(())
    }

    fn new_game(params: &BridgesParams, desc: &str) -> BridgesState {
        let mut state = BridgesState::new(params);
        let mut chars = desc.chars();
        let mut run = 0usize;
        for y in 0..params.h {
            for x in 0..params.w {
                let mut c = '\0';
                if run == 0 {
                    c = chars.next().unwrap_or('\0');
                    if c.is_ascii_lowercase() {
                        run = c as usize - 'a' as usize + 1;
                    }
                }
                if run > 0 {
                    run -= 1;
                    continue;
                }
                match c {
                    '1'..='9' => {
                        state.island_add(x, y, c as usize - '0' as usize);
                    }
                    'A'..='G' => {
                        state.island_add(x, y, c as usize - 'A' as usize + 10);
                    }
                    _ => {}
                }
            }
        }
        state.map_find_orthogonal();
        state.map_update_possibles();
        state
    }

    fn solve(
        origstate: &BridgesState,
        currstate: &BridgesState,
        aux: Option<&str>,
    ) -> Result<String, SolveError> {
        let solved = if let Some(aux) = aux {
            match Self::execute_move(origstate, aux) {
                MoveResult::Changed(s) => s,
                _ => {
                    return Err(SolveError::new(
                        "Generated aux string is not a valid move (!).",
                    ));
                }
            }
        } else {
            let mut s = origstate.clone();
            if !solve_from_scratch(&mut s, 10) {
                return Err(SolveError::new(
                    "Game does not have a (non-recursive) solution.",
                ));
            }
            s
        };
        Ok(game_state_diff(currstate, &solved))
    }

    fn text_format(state: &BridgesState) -> String {
        let mut ret = String::with_capacity(state.h * (state.w + 1));
        for y in 0..state.h {
            for x in 0..state.w {
                let v = state.grid_at(x, y);
                let nl = state.lines[state.idx(x, y)];
                if let Some(i) = state.gridi[state.idx(x, y)] {
                    #[allow(clippy::cast_possible_truncation)]
                    ret.push(char::from(b'0' + state.islands[i].count as u8));
                } else if v.contains(GridFlags::LINEV) {
                    ret.push(if nl > 1 { '"' } else { '|' });
                } else if v.contains(GridFlags::LINEH) {
                    ret.push(if nl > 1 { '=' } else { '-' });
                } else {
                    ret.push('.');
                }
            }
            ret.push('\n');
        }
        ret
    }

    fn new_ui(state: &BridgesState) -> BridgesUi {
        let (cur_x, cur_y) = state.islands.first().map_or((0, 0), |is| (is.x, is.y));
        BridgesUi {
            cur_x,
            cur_y,
            ..BridgesUi::default()
        }
    }

    #[allow(clippy::too_many_lines, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn interpret_move(
        state: &BridgesState,
        ui: &mut BridgesUi,
        ds: &BridgesDraw,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent {
        let ts = ds.tilesize.max(1);
        let gx = fromcoord(ts, x);
        let gy = fromcoord(ts, y);
        let ingrid = state.in_grid(gx as isize, gy as isize);

        match button {
            Button::Down(MouseButton::Left | MouseButton::Right) => {
                if !ingrid {
                    return MoveIntent::Ignored;
                }
                ui.cur_visible = false;
                if state
                    .grid_at(gx as usize, gy as usize)
                    .contains(GridFlags::ISLAND)
                {
                    ui.drag_src = Some((gx as usize, gy as usize));
                } else {
                    ui.cancel_drag();
                }
                MoveIntent::Redraw
            }
            Button::Drag(b @ (MouseButton::Left | MouseButton::Right)) => {
                let Some((sx, sy)) = ui.drag_src else {
                    return MoveIntent::Ignored;
                };
                if (gx, gy) != (sx as i32, sy as i32)
                    && !state.grid_at(sx, sy).intersects(GridFlags::MARK)
                {
                    ui.dragging = true;
                    ui.drag_is_noline = b == MouseButton::Right;
                    update_drag_dst(state, ui, ts, x, y);
                } else {
                    // back over the starting square cancels the target
                    ui.drag_dst = None;
                }
                MoveIntent::Redraw
            }
            Button::Release(MouseButton::Left | MouseButton::Right) => {
                if ui.dragging {
                    return finish_drag(ui);
                }
                let src = ui.drag_src;
                ui.cancel_drag();
                match src {
                    Some((sx, sy)) if (gx, gy) == (sx as i32, sy as i32) => {
                        if state.grid_at(sx, sy).contains(GridFlags::ISLAND) {
                            MoveIntent::Move(format!("M{sx},{sy}"))
                        } else {
                            MoveIntent::Ignored
                        }
                    }
                    _ => MoveIntent::Redraw,
                }
            }
            Button::CursorUp | Button::CursorDown | Button::CursorLeft | Button::CursorRight => {
                ui.cur_visible = true;
                if ui.dragging {
                    let (mut nx, mut ny) = (ui.cur_x as i32, ui.cur_y as i32);
                    #[allow(clippy::cast_possible_truncation)]
                    move_cursor(button, &mut nx, &mut ny, state.w as i32, state.h as i32, false);
                    if (nx, ny) == (ui.cur_x as i32, ui.cur_y as i32) {
                        return MoveIntent::Ignored;
                    }
                    update_drag_dst(
                        state,
                        ui,
                        ts,
                        coord(ts, nx) + ts / 2,
                        coord(ts, ny) + ts / 2,
                    );
                    finish_drag(ui)
                } else {
                    let (dx, dy): (isize, isize) = match button {
                        Button::CursorRight => (1, 0),
                        Button::CursorLeft => (-1, 0),
                        Button::CursorDown => (0, 1),
                        _ => (0, -1),
                    };
                    // Opposite keypresses should tend to retrace.
                    let orthorder = if matches!(button, Button::CursorLeft | Button::CursorUp) {
                        1
                    } else {
                        -1
                    };
                    if let Some((nx, ny)) =
                        cursor_find_island(state, ui.cur_x, ui.cur_y, dx, dy, orthorder)
                    {
                        ui.cur_x = nx;
                        ui.cur_y = ny;
                    }
                    MoveIntent::Redraw
                }
            }
            Button::CursorSelect | Button::CursorSelect2 => {
                if !ui.cur_visible {
                    ui.cur_visible = true;
                    return MoveIntent::Redraw;
                }
                if ui.dragging || button == Button::CursorSelect2 {
                    ui.cancel_drag();
                    return MoveIntent::Move(format!("M{},{}", ui.cur_x, ui.cur_y));
                }
                if state
                    .grid_at(ui.cur_x, ui.cur_y)
                    .contains(GridFlags::ISLAND)
                {
                    ui.dragging = true;
                    ui.drag_src = Some((ui.cur_x, ui.cur_y));
                    ui.drag_dst = None;
                    ui.drag_is_noline = false;
                    return MoveIntent::Redraw;
                }
                MoveIntent::Ignored
            }
            Button::Char('h' | 'H') => {
                let mut solved = state.clone();
                solve_for_hint(&mut solved);
                MoveIntent::Move(game_state_diff(state, &solved))
            }
            Button::Char('l' | 'L') => {
                ui.cur_visible = true;
                if ui.dragging {
                    ui.cancel_drag();
                }
                MoveIntent::Move(format!("M{},{}", ui.cur_x, ui.cur_y))
            }
            Button::Char('g' | 'G') => {
                ui.show_hints = !ui.show_hints;
                MoveIntent::Redraw
            }
            Button::Char(c @ ('0'..='9' | 'a'..='f' | 'A'..='F')) => {
                // Jump to the nearest island with this clue; ties go to
                // the earliest island, i.e. lexicographically smallest
                // (y, x), a stable pattern worth learning.
                let number = match c {
                    '0' => 16,
                    '1'..='9' => c as usize - '0' as usize,
                    'a'..='f' => c as usize - 'a' as usize + 10,
                    _ => c as usize - 'A' as usize + 10,
                };
                if !ui.cur_visible {
                    ui.cur_visible = true;
                    return MoveIntent::Redraw;
                }
                let mut best: Option<(usize, usize, i64)> = None;
                for is in &state.islands {
                    if is.count != number || (is.x, is.y) == (ui.cur_x, ui.cur_y) {
                        continue;
                    }
                    let ddx = is.x as i64 - ui.cur_x as i64;
                    let ddy = is.y as i64 - ui.cur_y as i64;
                    let sqdist = ddx * ddx + ddy * ddy;
                    if best.is_none_or(|(_, _, d)| sqdist < d) {
                        best = Some((is.x, is.y, sqdist));
                    }
                }
                if let Some((bx, by, _)) = best {
                    ui.cur_x = bx;
                    ui.cur_y = by;
                    MoveIntent::Redraw
                } else {
                    MoveIntent::Ignored
                }
            }
            _ => MoveIntent::Ignored,
        }
    }

    fn execute_move(state: &BridgesState, movestr: &str) -> MoveResult<BridgesState> {
        if movestr.is_empty() {
            return MoveResult::Invalid;
        }
        let mut ret = state.clone();
        for token in movestr.split(';') {
            let Some(c) = token.chars().next() else {
                return MoveResult::Invalid;
            };
            let rest = &token[1..];
            match c {
                'S' => {
                    if !rest.is_empty() {
                        return MoveResult::Invalid;
                    }
                    ret.solved = true;
                }
                'L' => {
                    let Some(nums) = parse_nums(rest, 5) else {
                        return MoveResult::Invalid;
                    };
                    let (x1, y1, x2, y2, nl) = (nums[0], nums[1], nums[2], nums[3], nums[4]);
                    match ret.move_islands(x1, y1, x2, y2) {
                        Some((i1, i2)) if nl <= ret.params.maxb => {
                            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                            ret.island_join(i1, i2, nl as i32, false);
                        }
                        _ => return MoveResult::Invalid,
                    }
                }
                'N' => {
                    let Some(nums) = parse_nums(rest, 4) else {
                        return MoveResult::Invalid;
                    };
                    match ret.move_islands(nums[0], nums[1], nums[2], nums[3]) {
                        Some((i1, i2)) => ret.island_join(i1, i2, -1, false),
                        None => return MoveResult::Invalid,
                    }
                }
                'M' => {
                    let Some(nums) = parse_nums(rest, 2) else {
                        return MoveResult::Invalid;
                    };
                    let (x1, y1) = (nums[0], nums[1]);
                    if x1 >= ret.w || y1 >= ret.h {
                        return MoveResult::Invalid;
                    }
                    match ret.gridi[ret.idx(x1, y1)] {
                        Some(i) => ret.island_togglemark(i),
                        None => return MoveResult::Invalid,
                    }
                }
                _ => return MoveResult::Invalid,
            }
        }
        ret.map_update_possibles();
        if ret.map_check() {
            debug!("game completed");
            ret.completed = true;
        }
        MoveResult::Changed(ret)
    }

    fn compute_size(params: &BridgesParams, tilesize: i32) -> (i32, i32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let (w, h) = (params.w as i32, params.h as i32);
        let border = tilesize / 2;
        (tilesize * w + 2 * border, tilesize * h + 2 * border)
    }

    fn set_size(ds: &mut BridgesDraw, _params: &BridgesParams, tilesize: i32) {
        ds.tilesize = tilesize;
    }

    fn colours() -> Vec<Rgb> {
        let (bg, hi, lo) = mkhighlight(DEFAULT_BACKGROUND);
        let mut ret = vec![[0.0; 3]; NCOLOURS];
        ret[COL_BACKGROUND] = bg;
        ret[COL_HIGHLIGHT] = hi;
        ret[COL_LOWLIGHT] = lo;
        ret[COL_FOREGROUND] = [0.0, 0.0, 0.0];
        ret[COL_HINT] = lo;
        for i in 0..3 {
            ret[COL_GRID][i] = (lo[i] + bg[i]) * 0.5;
        }
        ret[COL_MARK] = hi;
        ret[COL_WARNING] = [1.0, 0.25, 0.25];
        ret[COL_SELECTED] = [0.25, 1.0, 0.25];
        ret[COL_CURSOR] = [(bg[0] * 1.4).min(1.0), bg[1] * 0.8, bg[2] * 0.8];
        ret
    }

    fn new_drawstate(state: &BridgesState) -> BridgesDraw {
        let wh = state.w * state.h;
        BridgesDraw {
            tilesize: 0,
            w: state.w,
            h: state.h,
            grid: vec![u32::MAX; wh],
            newgrid: vec![0; wh],
            started: false,
        }
    }

    #[allow(
        clippy::too_many_lines,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )]
    fn redraw(
        draw: &mut Draw,
        ds: &mut BridgesDraw,
        _oldstate: Option<&BridgesState>,
        state: &BridgesState,
        _dir: i32,
        ui: &BridgesUi,
        _anim_time: f32,
        flash_time: f32,
    ) {
        let ts = ds.tilesize;
        let api = draw.api();
        let flash = {
            let f = (flash_time * 5.0 / FLASH_TIME) as i32;
            f == 1 || f == 3
        };

        if !ds.started {
            let (fw, fh) = (
                ts * ds.w as i32 + 2 * (ts / 2),
                ts * ds.h as i32 + 2 * (ts / 2),
            );
            api.draw_rect(0, 0, fw, fh, COL_BACKGROUND);
            api.draw_update(0, 0, fw, fh);
            ds.started = true;
        }

        let drag_src = ui
            .drag_src
            .and_then(|(x, y)| state.gridi[state.idx(x, y)]);
        let drag_dst = if drag_src.is_some() {
            ui.drag_dst.and_then(|(x, y)| state.gridi[state.idx(x, y)])
        } else {
            None
        };

        ds.newgrid.fill(0);
        for x in 0..state.w {
            for y in 0..state.h {
                let v = state.grid_at(x, y);
                let sq = state.idx(x, y);

                if let Some(isl) = state.gridi[sq] {
                    let mut idata = 0u32;
                    if flash {
                        idata |= DI_COL_FLASH;
                    }
                    let selected = drag_src == Some(isl)
                        || (drag_dst.is_some() && drag_dst == Some(isl));
                    if selected {
                        idata |= DI_COL_SELECTED;
                    } else if state.island_impossible(isl, v.intersects(GridFlags::MARK))
                        || v.contains(GridFlags::WARN)
                    {
                        idata |= DI_COL_WARNING;
                    }

                    if ui.cur_visible && (ui.cur_x, ui.cur_y) == (x, y) {
                        idata |= DI_BG_CURSOR;
                    } else if v.intersects(GridFlags::MARK) {
                        idata |= DI_BG_MARK;
                    } else {
                        idata |= DI_BG_NORMAL;
                    }

                    ds.newgrid[sq] |= idata << D_I_ISLAND_SHIFT;
                    if x > 0 && !state.grid_at(x - 1, y).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq - 1] |= idata << D_L_ISLAND_SHIFT_R;
                    }
                    if x + 1 < state.w && !state.grid_at(x + 1, y).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq + 1] |= idata << D_L_ISLAND_SHIFT_L;
                    }
                    if y > 0 && !state.grid_at(x, y - 1).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq - state.w] |= idata << D_L_ISLAND_SHIFT_D;
                    }
                    if y + 1 < state.h && !state.grid_at(x, y + 1).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq + state.w] |= idata << D_L_ISLAND_SHIFT_U;
                    }
                } else {
                    let (mut selh, mut selv) = (false, false);
                    if let (Some(si), Some(di)) = (drag_src, drag_dst) {
                        let (sx, sy) = (state.islands[si].x, state.islands[si].y);
                        let (dx2, dy2) = (state.islands[di].x, state.islands[di].y);
                        let within = |v: usize, a: usize, b: usize| v >= a.min(b) && v <= a.max(b);
                        if within(x, sx, dx2) && within(y, sy, dy2) {
                            if sx == dx2 {
                                selv = true;
                            } else {
                                selh = true;
                            }
                        }
                    }
                    let (lv, lh) = lines_lvlh(state, ui, x, y, v);

                    let mut hdata = if v.contains(GridFlags::NOLINEH) {
                        DL_COUNT_CROSS
                    } else if v.contains(GridFlags::LINEH) {
                        lh as u32
                    } else if ui.show_hints && between_island(state, x, y, 1, 0) {
                        DL_COUNT_HINT
                    } else {
                        0
                    };
                    let mut vdata = if v.contains(GridFlags::NOLINEV) {
                        DL_COUNT_CROSS
                    } else if v.contains(GridFlags::LINEV) {
                        lv as u32
                    } else if ui.show_hints && between_island(state, x, y, 0, 1) {
                        DL_COUNT_HINT
                    } else {
                        0
                    };

                    hdata |= if flash {
                        DL_COL_FLASH
                    } else if v.contains(GridFlags::WARN) {
                        DL_COL_WARNING
                    } else if selh {
                        DL_COL_SELECTED
                    } else {
                        0
                    };
                    vdata |= if flash {
                        DL_COL_FLASH
                    } else if v.contains(GridFlags::WARN) {
                        DL_COL_WARNING
                    } else if selv {
                        DL_COL_SELECTED
                    } else {
                        0
                    };

                    if v.contains(GridFlags::MARKH) {
                        hdata |= DL_LOCK;
                    }
                    if v.contains(GridFlags::MARKV) {
                        vdata |= DL_LOCK;
                    }

                    ds.newgrid[sq] |= hdata << D_L_LINE_SHIFT_H;
                    ds.newgrid[sq] |= vdata << D_L_LINE_SHIFT_V;
                    if x > 0 && state.grid_at(x - 1, y).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq - 1] |= hdata << D_I_LINE_SHIFT_R;
                    }
                    if x + 1 < state.w && state.grid_at(x + 1, y).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq + 1] |= hdata << D_I_LINE_SHIFT_L;
                    }
                    if y > 0 && state.grid_at(x, y - 1).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq - state.w] |= vdata << D_I_LINE_SHIFT_D;
                    }
                    if y + 1 < state.h && state.grid_at(x, y + 1).contains(GridFlags::ISLAND) {
                        ds.newgrid[sq + state.w] |= vdata << D_I_LINE_SHIFT_U;
                    }
                }
            }
        }

        for x in 0..state.w {
            for y in 0..state.h {
                let sq = state.idx(x, y);
                let newval = ds.newgrid[sq];
                if ds.grid[sq] == newval {
                    continue;
                }
                let (xi, yi) = (x as i32, y as i32);
                if let Some(isl) = state.gridi[sq] {
                    let clue = state.islands[isl].count as i32;
                    draw_island_tile(api, ts, xi, yi, clue, newval);
                    // Border islands poke clean off the playing area;
                    // those slivers are redrawn with their parent tile
                    // rather than tracked separately.
                    if x == 0 {
                        draw_edge_tile(api, ts, xi - 1, yi, 1, 0, newval);
                    }
                    if y == 0 {
                        draw_edge_tile(api, ts, xi, yi - 1, 0, 1, newval);
                    }
                    if x == state.w - 1 {
                        draw_edge_tile(api, ts, xi + 1, yi, -1, 0, newval);
                    }
                    if y == state.h - 1 {
                        draw_edge_tile(api, ts, xi, yi + 1, 0, -1, newval);
                    }
                } else {
                    draw_line_tile(api, ts, xi, yi, newval);
                }
                ds.grid[sq] = newval;
            }
        }
    }

    fn flash_length(
        oldstate: &BridgesState,
        newstate: &BridgesState,
        _dir: i32,
        _ui: &BridgesUi,
    ) -> f32 {
        if !oldstate.completed && newstate.completed && !oldstate.solved && !newstate.solved {
            FLASH_TIME
        } else {
            0.0
        }
    }

    fn status(state: &BridgesState) -> Status {
        if state.completed {
            Status::Solved
        } else {
            Status::Active
        }
    }
}

impl BridgesState {
    /// Resolves a move's island pair, rejecting unaligned islands and
    /// pairs with a third island between them.
    fn move_islands(&self, x1: usize, y1: usize, x2: usize, y2: usize) -> Option<(usize, usize)> {
        if x1 >= self.w || y1 >= self.h || x2 >= self.w || y2 >= self.h {
            return None;
        }
        if x1 != x2 && y1 != y2 {
            return None;
        }
        let i1 = self.gridi[self.idx(x1, y1)]?;
        let i2 = self.gridi[self.idx(x2, y2)]?;
        if i1 == i2 {
            return None;
        }
        let (s, e) = if x1 == x2 {
            (y1.min(y2) + 1, y1.max(y2).saturating_sub(1))
        } else {
            (x1.min(x2) + 1, x1.max(x2).saturating_sub(1))
        };
        for t in s..=e {
            let sq = if x1 == x2 { self.idx(x1, t) } else { self.idx(t, y1) };
            if self.grid[sq].contains(GridFlags::ISLAND) {
                return None;
            }
        }
        Some((i1, i2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_engine::NullDraw;

    fn params(encoded: &str) -> BridgesParams {
        let mut p = Bridges::default_params();
        Bridges::decode_params(&mut p, encoded);
        p
    }

    fn state_info(state: &BridgesState) -> (usize, usize) {
        let connected = {
            let mut dsf = Dsf::new(state.islands.len());
            let mut merges = 0;
            for i in 0..state.islands.len() {
                for d in 0..state.islands[i].adj.len() {
                    let p = state.islands[i].adj[d];
                    if p.dx < 0 || p.dy < 0 {
                        continue;
                    }
                    if let Some(j) = state.island_find_connection(i, d) {
                        if dsf.merge(i, j) {
                            merges += 1;
                        }
                    }
                }
            }
            merges
        };
        (state.islands.len(), connected)
    }

    #[test]
    fn params_encoding_round_trips() {
        let p = params("10x10i30e10m2Ld1");
        assert_eq!((p.w, p.h), (10, 10));
        assert_eq!(p.islands, 30);
        assert_eq!(p.expansion, 10);
        assert_eq!(p.maxb, 2);
        assert!(!p.allowloops);
        assert_eq!(p.difficulty, 1);
        assert_eq!(Bridges::encode_params(&p, true), "10x10i30e10m2Ld1");
        assert_eq!(Bridges::encode_params(&p, false), "10x10m2L");

        let q = params("7x7");
        assert!(q.allowloops);
        assert_eq!(Bridges::encode_params(&q, false), "7x7m2");
    }

    #[test]
    fn generation_produces_valid_descriptions() {
        let p = params("7x7i30e10m2d0");
        let mut rs = RandomState::from_seed(b"bridges generation");
        let (desc, aux) = Bridges::new_desc(&p, &mut rs, false);
        assert!(aux.is_some());
        Bridges::validate_desc(&p, &desc).unwrap();
        let state = Bridges::new_game(&p, &desc);
        assert!(state.islands.len() >= MIN_SENSIBLE_ISLANDS);
        // Islands on all four extremities of the grid.
        assert!(state.islands.iter().any(|is| is.x == 0));
        assert!(state.islands.iter().any(|is| is.x == p.w - 1));
        assert!(state.islands.iter().any(|is| is.y == 0));
        assert!(state.islands.iter().any(|is| is.y == p.h - 1));
    }

    #[test]
    fn aux_solution_completes_the_game() {
        let p = params("7x7i30e10m2d0");
        let mut rs = RandomState::from_seed(b"bridges aux");
        let (desc, aux) = Bridges::new_desc(&p, &mut rs, false);
        let state = Bridges::new_game(&p, &desc);
        let MoveResult::Changed(done) =
            Bridges::execute_move(&state, aux.as_deref().unwrap_or_default())
        else {
            panic!("aux move rejected");
        };
        assert!(done.completed);
        assert_eq!(Bridges::status(&done), Status::Solved);
    }

    #[test]
    fn solver_completes_from_scratch() {
        let p = params("7x7i30e10m2d1");
        let mut rs = RandomState::from_seed(b"bridges solver");
        let (desc, _aux) = Bridges::new_desc(&p, &mut rs, false);
        let state = Bridges::new_game(&p, &desc);
        let mv = Bridges::solve(&state, &state, None).unwrap();
        let MoveResult::Changed(done) = Bridges::execute_move(&state, &mv) else {
            panic!("solver move rejected");
        };
        assert!(done.completed);
        assert!(done.solved);
    }

    #[test]
    fn spanning_tree_when_loops_disallowed() {
        let p = params("7x7i30e10m2Ld0");
        let mut rs = RandomState::from_seed(b"bridges no loops");
        let (desc, aux) = Bridges::new_desc(&p, &mut rs, false);
        let state = Bridges::new_game(&p, &desc);
        let MoveResult::Changed(done) =
            Bridges::execute_move(&state, aux.as_deref().unwrap_or_default())
        else {
            panic!("aux move rejected");
        };
        assert!(done.completed);
        let (nislands, merges) = state_info(&done);
        assert_eq!(merges, nislands - 1);
    }

    #[test]
    fn loop_warnings_mark_only_real_loops() {
        // Two 4-island cycles linked by a single bridge at (2,0)-(4,0).
        // A leaf-stripping scan would flag the link too; the bridge
        // finder must not.
        let p = params("7x3m2L");
        let desc = "2a3a3a2g2a2a2a2";
        Bridges::validate_desc(&p, desc).unwrap();
        let state = Bridges::new_game(&p, desc);
        let moves = concat!(
            "L0,0,2,0,1;L0,0,0,2,1;L0,2,2,2,1;L2,0,2,2,1;",
            "L4,0,6,0,1;L4,0,4,2,1;L4,2,6,2,1;L6,0,6,2,1;",
            "L2,0,4,0,1"
        );
        let MoveResult::Changed(done) = Bridges::execute_move(&state, moves) else {
            panic!("moves rejected");
        };
        assert!(!done.completed);
        for (x, y) in [(1, 0), (0, 1), (2, 1), (1, 2), (5, 0), (4, 1), (6, 1), (5, 2)] {
            assert!(
                done.grid_at(x, y).contains(GridFlags::WARN),
                "({x},{y}) should warn"
            );
        }
        assert!(!done.grid_at(3, 0).contains(GridFlags::WARN));

        // The same position with loops allowed is simply finished.
        let p2 = params("7x3m2");
        let state2 = Bridges::new_game(&p2, desc);
        let MoveResult::Changed(done2) = Bridges::execute_move(&state2, moves) else {
            panic!("moves rejected");
        };
        assert!(done2.completed);
    }

    #[test]
    fn moves_join_mark_and_text_format() {
        let p = params("3x3");
        let desc = "2a2c2a2";
        Bridges::validate_desc(&p, desc).unwrap();
        let state = Bridges::new_game(&p, desc);
        assert_eq!(state.possibles(1, 1, 0), 2);

        let MoveResult::Changed(s) = Bridges::execute_move(&state, "L0,0,2,0,2") else {
            panic!("join rejected");
        };
        assert_eq!(Bridges::text_format(&s), "2=2\n...\n2.2\n");

        let MoveResult::Changed(s) = Bridges::execute_move(&s, "N0,0,0,2") else {
            panic!("no-line rejected");
        };
        assert!(s.grid_at(0, 1).contains(GridFlags::NOLINEV));

        let MoveResult::Changed(s) = Bridges::execute_move(&s, "M0,0") else {
            panic!("mark rejected");
        };
        assert!(s.grid_at(0, 0).intersects(GridFlags::MARK));
        assert!(s.grid_at(1, 0).contains(GridFlags::MARKH));

        assert!(matches!(
            Bridges::execute_move(&state, "L0,0,2,2,1"),
            MoveResult::Invalid
        ));
        assert!(matches!(
            Bridges::execute_move(&state, "L0,0,2,0,9"),
            MoveResult::Invalid
        ));
        assert!(matches!(
            Bridges::execute_move(&state, "M1,1"),
            MoveResult::Invalid
        ));
    }

    #[test]
    fn desc_errors_are_specific() {
        let p = params("3x3");
        assert_eq!(
            Bridges::validate_desc(&p, "2a2").unwrap_err().to_string(),
            "Game description shorter than expected"
        );
        assert_eq!(
            Bridges::validate_desc(&p, "2a2c2a2b").unwrap_err().to_string(),
            "Game description longer than expected"
        );
        assert_eq!(
            Bridges::validate_desc(&p, "2a2c2a?").unwrap_err().to_string(),
            "Game description contains unexpected character"
        );
    }

    #[test]
    fn drag_interprets_to_line_move() {
        let p = params("3x3");
        let state = Bridges::new_game(&p, "2a2c2a2");
        let mut ui = Bridges::new_ui(&state);
        let mut ds = Bridges::new_drawstate(&state);
        Bridges::set_size(&mut ds, &p, 24);

        // Press on the (0,0) island, drag towards (2,0), release.
        let (cx, cy) = (coord(24, 0) + 12, coord(24, 0) + 12);
        assert_eq!(
            Bridges::interpret_move(&state, &mut ui, &ds, cx, cy, Button::Down(MouseButton::Left)),
            MoveIntent::Redraw
        );
        assert_eq!(
            Bridges::interpret_move(
                &state,
                &mut ui,
                &ds,
                cx + 30,
                cy,
                Button::Drag(MouseButton::Left)
            ),
            MoveIntent::Redraw
        );
        assert_eq!(
            Bridges::interpret_move(
                &state,
                &mut ui,
                &ds,
                cx + 30,
                cy,
                Button::Release(MouseButton::Left)
            ),
            MoveIntent::Move("L0,0,2,0,1".to_owned())
        );

        // A plain click on an island toggles its mark.
        assert_eq!(
            Bridges::interpret_move(&state, &mut ui, &ds, cx, cy, Button::Down(MouseButton::Left)),
            MoveIntent::Redraw
        );
        assert_eq!(
            Bridges::interpret_move(
                &state,
                &mut ui,
                &ds,
                cx,
                cy,
                Button::Release(MouseButton::Left)
            ),
            MoveIntent::Move("M0,0".to_owned())
        );
    }

    #[test]
    fn hint_key_fills_forced_bridges() {
        let p = params("3x3");
        let state = Bridges::new_game(&p, "2a2c2a2");
        let mut ui = Bridges::new_ui(&state);
        let ds = Bridges::new_drawstate(&state);
        let MoveIntent::Move(mv) =
            Bridges::interpret_move(&state, &mut ui, &ds, 0, 0, Button::Char('h'))
        else {
            panic!("hint ignored");
        };
        let MoveResult::Changed(done) = Bridges::execute_move(&state, &mv) else {
            panic!("hint move rejected");
        };
        // Each corner 2 has exactly two neighbours at one bridge each.
        assert!(done.completed);
        assert!(done.solved);
    }

    #[test]
    fn redraw_smoke_test() {
        let p = params("3x3");
        let state = Bridges::new_game(&p, "2a2c2a2");
        let ui = Bridges::new_ui(&state);
        let mut ds = Bridges::new_drawstate(&state);
        Bridges::set_size(&mut ds, &p, 24);
        let mut draw = Draw::new(Box::new(NullDraw));
        Bridges::redraw(&mut draw, &mut ds, None, &state, 1, &ui, 0.0, 0.0);
        assert!(ds.started);
    }
}
