//! Loopy (loop-the-loop): draw a single closed loop along the edges of a
//! planar grid so that every numbered face has exactly that many of its
//! edges on the loop.
//!
//! Plays on any of the seventeen tilings `parlor-grid` can build, from
//! plain squares up to Penrose and hat aperiodic patches. Generation
//! grows a random loop, reads off the full clue set, then deletes clues
//! one at a time while the puzzle stays uniquely solvable at the chosen
//! difficulty; whole boards solvable at the next difficulty down are
//! rejected. The solver is a tiered pipeline: trivial clue/degree
//! bounds, "dline" reasoning about adjacent edge pairs around a dot,
//! equivalence classes of identical-or-opposite edges, and finally loop
//! analysis over a dot union-find.

use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use log::debug;
use parlor_core::{Dsf, Edsf, RandomState};
use parlor_engine::{
    Backend, BackendFlags, Button, ConfigItem, ConfigValue, DescError, Draw, FontType, HAlign,
    MouseButton, MoveIntent, MoveResult, ParamsError, Rgb, SolveError, Status, VAlign,
};
use parlor_grid::{FaceColour, Grid, GridType, generate_loop};

use crate::DEFAULT_BACKGROUND;

const PREFERRED_TILESIZE: i32 = 32;
const FLASH_TIME: f32 = 0.5;
const GRID_DESC_SEP: char = '_';
const REDRAW_OBJECTS_LIMIT: usize = 16;

const COL_BACKGROUND: usize = 0;
const COL_FOREGROUND: usize = 1;
const COL_LINEUNKNOWN: usize = 2;
const COL_HIGHLIGHT: usize = 3;
const COL_MISTAKE: usize = 4;
const COL_SATISFIED: usize = 5;
const COL_CURSOR: usize = 6;
const COL_FAINT: usize = 7;
const NCOLOURS: usize = 8;

/// Display names for the tiling catalogue, aligned with
/// [`GridType::ALL`].
const GRID_NAMES: [&str; 17] = [
    "Squares",
    "Honeycomb",
    "Triangular",
    "Snub-Square",
    "Cairo",
    "Great-Hexagonal",
    "Kagome",
    "Octagonal",
    "Kites",
    "Floret",
    "Dodecagonal",
    "Great-Dodecagonal",
    "Great-Great-Dodecagonal",
    "Compass-Dodecagonal",
    "Penrose (kite/dart)",
    "Penrose (rhombs)",
    "Hats",
];

/// Per-tiling size floors, aligned with [`GridType::ALL`]. The first
/// number must be met by both dimensions, the second by at least one;
/// anything smaller degenerates or fails to generate.
const GRID_SIZE_LIMITS: [(i32, i32); 17] = [
    (3, 3), // Squares
    (3, 3), // Honeycomb
    (3, 3), // Triangular
    (3, 3), // Snub-Square
    (3, 4), // Cairo
    (3, 3), // Great-Hexagonal
    (3, 3), // Kagome
    (3, 3), // Octagonal
    (3, 3), // Kites
    (1, 2), // Floret
    (2, 2), // Dodecagonal
    (2, 2), // Great-Dodecagonal
    (2, 2), // Great-Great-Dodecagonal
    (2, 2), // Compass-Dodecagonal
    (3, 3), // Penrose (kite/dart)
    (3, 3), // Penrose (rhombs)
    (3, 3), // Hats
];

fn border(tilesize: i32) -> i32 {
    tilesize / 2
}

/// State of one edge from the player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    Yes,
    Unknown,
    No,
}

impl Line {
    fn opposite(self) -> Line {
        match self {
            Line::Yes => Line::No,
            Line::Unknown => Line::Unknown,
            Line::No => Line::Yes,
        }
    }
}

/// Solver tier. Each generated puzzle is solvable at its own tier but
/// not the one below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Difficulty {
    /// Clue and degree counting only.
    Easy,
    /// Adds adjacent-edge-pair (dline) reasoning.
    Normal,
    /// Adds diagonal dline propagation between faces.
    Tricky,
    /// Adds identical-or-opposite edge classes.
    Hard,
}

impl Difficulty {
    /// All tiers, easiest first.
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Normal,
        Difficulty::Tricky,
        Difficulty::Hard,
    ];

    fn title(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Tricky => "Tricky",
            Difficulty::Hard => "Hard",
        }
    }

    fn encode_char(self) -> char {
        match self {
            Difficulty::Easy => 'e',
            Difficulty::Normal => 'n',
            Difficulty::Tricky => 't',
            Difficulty::Hard => 'h',
        }
    }

    fn previous(self) -> Option<Difficulty> {
        match self {
            Difficulty::Easy => None,
            Difficulty::Normal => Some(Difficulty::Easy),
            Difficulty::Tricky => Some(Difficulty::Normal),
            Difficulty::Hard => Some(Difficulty::Tricky),
        }
    }
}

/// Marker type implementing the Loopy backend.
pub struct Loopy;

/// Shape of a Loopy game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopyParams {
    /// Grid width in tiles.
    pub width: i32,
    /// Grid height in tiles.
    pub height: i32,
    /// Solver tier puzzles are generated for.
    pub diff: Difficulty,
    /// Index into [`GridType::ALL`].
    pub grid_type: usize,
}

impl LoopyParams {
    fn tiling(&self) -> GridType {
        GridType::ALL
            .get(self.grid_type)
            .copied()
            .unwrap_or(GridType::Square)
    }
}

/// Full position: the shared grid, the clue set, and one [`Line`] per
/// edge.
#[derive(Debug, Clone)]
pub struct LoopyState {
    grid: Arc<Grid>,
    /// Clue per face, `-1` where absent.
    clues: Vec<i8>,
    lines: Vec<Line>,
    /// Recomputed by the completion check after every move.
    line_errors: Vec<bool>,
    solved: bool,
    cheated: bool,
    grid_type: usize,
}

impl LoopyState {
    fn dot_order(&self, dot: usize, line_type: Line) -> usize {
        self.grid.dots[dot]
            .edges
            .iter()
            .filter(|&&e| self.lines[e] == line_type)
            .count()
    }

    fn face_order(&self, face: usize, line_type: Line) -> usize {
        self.grid.faces[face]
            .edges
            .iter()
            .filter(|&&e| self.lines[e] == line_type)
            .count()
    }

    /// Recomputes `line_errors` and reports whether the position is a
    /// solution.
    ///
    /// A loop partitions the faces into regions separated by `Yes`
    /// edges, so a union-find over the non-`Yes` edges (with one extra
    /// element for the infinite exterior face) distinguishes no loop,
    /// one loop and several loops in two passes. A candidate single
    /// loop is a solution iff no drawn edge lies off it and every clue
    /// is met.
    fn check_completion(&mut self) -> bool {
        let g = Arc::clone(&self.grid);
        let num_faces = g.faces.len();
        let inf = num_faces;

        self.line_errors.fill(false);

        let mut dsf = Dsf::new(num_faces + 1);
        for (i, e) in g.edges.iter().enumerate() {
            if self.lines[i] != Line::Yes {
                dsf.merge(e.face1.unwrap_or(inf), e.face2.unwrap_or(inf));
            }
        }

        let infinite_area = dsf.canonify(inf);
        let mut finite_area: Option<usize> = None;
        let mut loops_found = 0;
        let mut found_edge_not_in_loop = false;

        for (i, e) in g.edges.iter().enumerate() {
            if self.lines[i] != Line::Yes {
                continue;
            }
            let can1 = dsf.canonify(e.face1.unwrap_or(inf));
            let can2 = dsf.canonify(e.face2.unwrap_or(inf));
            if can1 == can2 {
                found_edge_not_in_loop = true;
                continue;
            }
            self.line_errors[i] = true;
            if loops_found == 0 {
                loops_found = 1;
            }
            if loops_found == 2 {
                continue;
            }
            if finite_area.is_none() {
                finite_area = Some(if can1 == infinite_area { can2 } else { can1 });
            }
            if let Some(fa) = finite_area {
                if can1 != infinite_area && can1 != fa {
                    loops_found = 2;
                    continue;
                }
                if can2 != infinite_area && can2 != fa {
                    loops_found = 2;
                }
            }
        }

        if loops_found == 1 && !found_edge_not_in_loop {
            let violation = (0..num_faces).any(|i| {
                let c = self.clues[i];
                c >= 0 && self.face_order(i, Line::Yes) != usize::from(c.unsigned_abs())
            });
            if !violation {
                self.line_errors.fill(false);
                return true;
            }
        }

        // Not a solution; flag degree violations at dots as well.
        for (i, d) in g.dots.iter().enumerate() {
            let yes = self.dot_order(i, Line::Yes);
            let unknown = self.dot_order(i, Line::Unknown);
            if (yes == 1 && unknown == 0) || yes >= 3 {
                for &e in &d.edges {
                    if self.lines[e] == Line::Yes {
                        self.line_errors[e] = true;
                    }
                }
            }
        }
        false
    }
}

fn clue2char(c: i8) -> char {
    if c < 0 {
        ' '
    } else if c < 10 {
        char::from(b'0' + c.unsigned_abs())
    } else {
        char::from(b'A' + c.unsigned_abs() - 10)
    }
}

fn split_desc(desc: &str) -> (Option<&str>, &str) {
    match desc.split_once(GRID_DESC_SEP) {
        Some((gd, rest)) => (Some(gd), rest),
        None => (None, desc),
    }
}

/// Stand-in used when a description slips past validation; every
/// operation on it is a no-op.
fn empty_grid() -> Arc<Grid> {
    Arc::new(Grid {
        dots: Vec::new(),
        edges: Vec::new(),
        faces: Vec::new(),
        tilesize: 1,
        lowest_x: 0,
        lowest_y: 0,
        highest_x: 0,
        highest_y: 0,
    })
}

/// Clue set as a description string: clue characters interleaved with
/// `a`..`z` runs of 1 to 26 clueless faces.
fn encode_clues(state: &LoopyState) -> String {
    let mut out = String::new();
    let mut empty = 0u8;
    let flush = |out: &mut String, empty: &mut u8| {
        if *empty > 0 {
            out.push(char::from(b'a' - 1 + *empty));
            *empty = 0;
        }
    };
    for &c in &state.clues {
        if c < 0 {
            if empty == 26 {
                flush(&mut out, &mut empty);
            }
            empty += 1;
        } else {
            flush(&mut out, &mut empty);
            out.push(clue2char(c));
        }
    }
    flush(&mut out, &mut empty);
    out
}

/// Move string that sets every line to its state in `state`.
fn encode_solve_move(state: &LoopyState) -> String {
    let mut out = String::from("S");
    for (i, &line) in state.lines.iter().enumerate() {
        match line {
            Line::Yes => {
                let _ = write!(out, "{i}y");
            }
            Line::No => {
                let _ = write!(out, "{i}n");
            }
            Line::Unknown => {}
        }
    }
    out
}

fn eat_num(bytes: &[u8], k: &mut usize) -> i32 {
    let start = *k;
    while *k < bytes.len() && bytes[*k].is_ascii_digit() {
        *k += 1;
    }
    std::str::from_utf8(&bytes[start..*k])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

// ----------------------------------------------------------------------
// Solver
//
// Four deduction stages, cheapest first, each tagged with the tier
// whose puzzles need it. A stage reports the tier of the cheapest
// other stage its progress could feed, and the driver restarts from
// the top of the list whenever anything moves.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolverStatus {
    /// The deductions reached the unique solution.
    Solved,
    /// The clue set is self-contradictory.
    Mistake,
    /// A solution was found only by closing a speculative loop, so
    /// others may exist.
    Ambiguous,
    /// No further deductions available.
    Incomplete,
}

struct SolverState {
    state: LoopyState,
    status: SolverStatus,
    diff: Difficulty,
    dotdsf: Dsf,
    /// Dots joined into the open chain through each dsf class root; 1
    /// for an isolated dot.
    looplen: Vec<usize>,
    dot_solved: Vec<bool>,
    face_solved: Vec<bool>,
    dot_yes: Vec<u8>,
    dot_no: Vec<u8>,
    face_yes: Vec<u8>,
    face_no: Vec<u8>,
    /// Two flags per (edge, end-dot) pair: bit 0 "at least one of the
    /// pair is on", bit 1 "at most one". Allocated from Normal up.
    dlines: Option<Vec<u8>>,
    /// Identical-or-opposite edge classes. Allocated from Hard up.
    linedsf: Option<Edsf>,
}

impl SolverState {
    fn new(state: &LoopyState, diff: Difficulty) -> Self {
        let num_dots = state.grid.dots.len();
        let num_faces = state.grid.faces.len();
        let num_edges = state.grid.edges.len();
        SolverState {
            state: state.clone(),
            status: SolverStatus::Incomplete,
            diff,
            dotdsf: Dsf::new(num_dots),
            looplen: vec![1; num_dots],
            dot_solved: vec![false; num_dots],
            face_solved: vec![false; num_faces],
            dot_yes: vec![0; num_dots],
            dot_no: vec![0; num_dots],
            face_yes: vec![0; num_faces],
            face_no: vec![0; num_faces],
            dlines: (diff >= Difficulty::Normal).then(|| vec![0; 2 * num_edges]),
            linedsf: (diff >= Difficulty::Hard).then(|| Edsf::new(num_edges)),
        }
    }

    /// Sets line `i` and keeps the per-dot and per-face counts in step.
    /// Returns whether anything changed.
    fn set_line(&mut self, i: usize, new: Line) -> bool {
        debug_assert!(new != Line::Unknown);
        if self.state.lines[i] == new {
            return false;
        }
        self.state.lines[i] = new;
        let e = self.state.grid.edges[i].clone();
        if new == Line::Yes {
            self.dot_yes[e.dot1] += 1;
            self.dot_yes[e.dot2] += 1;
            if let Some(f) = e.face1 {
                self.face_yes[f] += 1;
            }
            if let Some(f) = e.face2 {
                self.face_yes[f] += 1;
            }
        } else {
            self.dot_no[e.dot1] += 1;
            self.dot_no[e.dot2] += 1;
            if let Some(f) = e.face1 {
                self.face_no[f] += 1;
            }
            if let Some(f) = e.face2 {
                self.face_no[f] += 1;
            }
        }
        true
    }

    fn dot_setall(&mut self, dot: usize, old: Line, new: Line) -> bool {
        if old == new {
            return false;
        }
        let edges = self.state.grid.dots[dot].edges.clone();
        let mut changed = false;
        for e in edges {
            if self.state.lines[e] == old {
                self.set_line(e, new);
                changed = true;
            }
        }
        changed
    }

    fn face_setall(&mut self, face: usize, old: Line, new: Line) -> bool {
        if old == new {
            return false;
        }
        let edges = self.state.grid.faces[face].edges.clone();
        let mut changed = false;
        for e in edges {
            if self.state.lines[e] == old {
                self.set_line(e, new);
                changed = true;
            }
        }
        changed
    }

    /// Records that an edge joins its two dots' chains. Returns `true`
    /// if they were already joined, ie the edge closes a loop.
    fn merge_dots(&mut self, edge: usize) -> bool {
        let e = self.state.grid.edges[edge].clone();
        let i = self.dotdsf.canonify(e.dot1);
        let j = self.dotdsf.canonify(e.dot2);
        if i == j {
            return true;
        }
        let len = self.looplen[i] + self.looplen[j];
        self.dotdsf.merge(i, j);
        let root = self.dotdsf.canonify(i);
        self.looplen[root] = len;
        false
    }
}

/// Unifies two lines as identical (`inverse` false) or opposite.
/// Returns whether this was new information. A parity clash means the
/// deductions so far are inconsistent, which can only come from a bad
/// clue set.
fn merge_lines(
    sstate: &mut SolverState,
    linedsf: &mut Edsf,
    i: usize,
    j: usize,
    inverse: bool,
) -> bool {
    match linedsf.merge(i, j, inverse) {
        Ok(changed) => changed,
        Err(_) => {
            sstate.status = SolverStatus::Mistake;
            false
        }
    }
}

// A "dline" is a pair of edges adjacent around a common dot, read
// clockwise; it is keyed by its first edge plus which end-dot of that
// edge the pair shares, giving exactly two dlines per edge.

fn dline_index_from_dot(g: &Grid, dot: usize, i: usize) -> usize {
    let e = g.dots[dot].edges[i];
    2 * e + usize::from(g.edges[e].dot1 == dot)
}

/// `i` names the second edge of the pair reading clockwise around the
/// face; the common dot is then `faces[face].dots[i]`.
fn dline_index_from_face(g: &Grid, face: usize, i: usize) -> usize {
    let e = g.faces[face].edges[i];
    let d = g.faces[face].dots[i];
    2 * e + usize::from(g.edges[e].dot1 == d)
}

fn is_atleastone(dlines: &[u8], index: usize) -> bool {
    dlines[index] & 1 != 0
}

fn set_atleastone(dlines: &mut [u8], index: usize) -> bool {
    let new = dlines[index] & 1 == 0;
    dlines[index] |= 1;
    new
}

fn is_atmostone(dlines: &[u8], index: usize) -> bool {
    dlines[index] & 2 != 0
}

fn set_atmostone(dlines: &mut [u8], index: usize) -> bool {
    let new = dlines[index] & 2 == 0;
    dlines[index] |= 2;
    new
}

fn note_progress(diff: &mut Option<Difficulty>, d: Difficulty) {
    *diff = Some(diff.map_or(d, |cur| cur.min(d)));
}

type SolverFn = fn(&mut SolverState) -> Option<Difficulty>;

const SOLVER_STAGES: [(SolverFn, Difficulty); 4] = [
    (trivial_deductions, Difficulty::Easy),
    (dline_deductions, Difficulty::Normal),
    (linedsf_deductions, Difficulty::Hard),
    (loop_deductions, Difficulty::Easy),
];

/// Runs stages until none of them can move. A stage is skipped when it
/// is above the solver's tier, or when it sits before the restart
/// point at a tier whose inputs haven't changed since it last ran.
fn run_solver(sstate: &mut SolverState, stages: &[(SolverFn, Difficulty)]) {
    let mut threshold_diff = 0;
    let mut threshold_index = 0;
    let mut i = 0;
    while i < stages.len() {
        if sstate.status == SolverStatus::Mistake {
            return;
        }
        if matches!(
            sstate.status,
            SolverStatus::Solved | SolverStatus::Ambiguous
        ) {
            break;
        }
        let (stage, stage_diff) = stages[i];
        if (stage_diff as usize >= threshold_diff || i >= threshold_index)
            && stage_diff <= sstate.diff
        {
            if let Some(progress) = stage(sstate) {
                threshold_diff = progress as usize;
                threshold_index = i;
                i = 0;
                continue;
            }
        }
        i += 1;
    }

    if matches!(
        sstate.status,
        SolverStatus::Solved | SolverStatus::Ambiguous
    ) {
        for line in &mut sstate.state.lines {
            if *line == Line::Unknown {
                *line = Line::No;
            }
        }
    }
}

/// Clue-count bounds per face and degree bounds per dot.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn trivial_deductions(sstate: &mut SolverState) -> Option<Difficulty> {
    let g = Arc::clone(&sstate.state.grid);
    let mut diff = None;

    for i in 0..g.faces.len() {
        if sstate.face_solved[i] {
            continue;
        }
        let order = g.faces[i].order() as i32;
        let yes = i32::from(sstate.face_yes[i]);
        let no = i32::from(sstate.face_no[i]);

        if yes + no == order {
            sstate.face_solved[i] = true;
            continue;
        }

        let clue = i32::from(sstate.state.clues[i]);
        if clue < 0 {
            continue;
        }

        if clue < yes {
            sstate.status = SolverStatus::Mistake;
            return Some(Difficulty::Easy);
        }
        if clue == yes {
            if sstate.face_setall(i, Line::Unknown, Line::No) {
                note_progress(&mut diff, Difficulty::Easy);
            }
            sstate.face_solved[i] = true;
            continue;
        }

        if order - clue < no {
            sstate.status = SolverStatus::Mistake;
            return Some(Difficulty::Easy);
        }
        if order - clue == no {
            if sstate.face_setall(i, Line::Unknown, Line::Yes) {
                note_progress(&mut diff, Difficulty::Easy);
            }
            sstate.face_solved[i] = true;
            continue;
        }

        if order - clue == no + 1 && order - yes - no > 2 {
            // One refinement: an adjacent unknown pair whose shared dot
            // already has a Yes from elsewhere cannot both be Yes, so
            // every other unknown edge of the face must be.
            let n = g.faces[i].order();
            let mut pair = None;
            for j in 0..n {
                let e1 = g.faces[i].edges[j];
                let e2 = g.faces[i].edges[(j + 1) % n];
                let (a, b) = (g.edges[e1].dot1, g.edges[e1].dot2);
                let d = if a == g.edges[e2].dot1 || a == g.edges[e2].dot2 {
                    a
                } else {
                    b
                };
                if sstate.state.lines[e1] == Line::Unknown
                    && sstate.state.lines[e2] == Line::Unknown
                    && g.dots[d]
                        .edges
                        .iter()
                        .any(|&e| sstate.state.lines[e] == Line::Yes)
                {
                    pair = Some((e1, e2));
                    break;
                }
            }
            if let Some((e1, e2)) = pair {
                for j in 0..n {
                    let e = g.faces[i].edges[j];
                    if sstate.state.lines[e] == Line::Unknown && e != e1 && e != e2 {
                        sstate.set_line(e, Line::Yes);
                        note_progress(&mut diff, Difficulty::Easy);
                    }
                }
            }
        }
    }

    for i in 0..g.dots.len() {
        if sstate.dot_solved[i] {
            continue;
        }
        let order = g.dots[i].edges.len();
        let yes = usize::from(sstate.dot_yes[i]);
        let no = usize::from(sstate.dot_no[i]);
        let unknown = order - yes - no;

        match yes {
            0 => {
                if unknown == 0 {
                    sstate.dot_solved[i] = true;
                } else if unknown == 1 {
                    sstate.dot_setall(i, Line::Unknown, Line::No);
                    note_progress(&mut diff, Difficulty::Easy);
                    sstate.dot_solved[i] = true;
                }
            }
            1 => {
                if unknown == 0 {
                    sstate.status = SolverStatus::Mistake;
                    return Some(Difficulty::Easy);
                }
                if unknown == 1 {
                    sstate.dot_setall(i, Line::Unknown, Line::Yes);
                    note_progress(&mut diff, Difficulty::Easy);
                }
            }
            2 => {
                if unknown > 0 {
                    sstate.dot_setall(i, Line::Unknown, Line::No);
                    note_progress(&mut diff, Difficulty::Easy);
                }
                sstate.dot_solved[i] = true;
            }
            _ => {
                sstate.status = SolverStatus::Mistake;
                return Some(Difficulty::Easy);
            }
        }
    }

    diff
}

fn dline_deductions(sstate: &mut SolverState) -> Option<Difficulty> {
    let Some(mut dlines) = sstate.dlines.take() else {
        return None;
    };
    let ret = dline_deductions_inner(sstate, &mut dlines);
    sstate.dlines = Some(dlines);
    ret
}

/// Dline reasoning. Per face, `mins[j][k]` and `maxs[j][k]` bound the
/// number of Yes edges strictly between dots `j` and `k` clockwise;
/// the two-step entries fold in the dline flags and longer spans
/// combine recursively. Comparing a span's complement with the clue
/// forces single edges and, from Tricky up, new dline flags. Per dot,
/// flags and line states are propagated into each other directly.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn dline_deductions_inner(sstate: &mut SolverState, dlines: &mut [u8]) -> Option<Difficulty> {
    let g = Arc::clone(&sstate.state.grid);
    let mut diff = None;

    for i in 0..g.faces.len() {
        if sstate.face_solved[i] {
            continue;
        }
        let clue = i32::from(sstate.state.clues[i]);
        if clue < 0 {
            continue;
        }
        let n = g.faces[i].order();

        let mut maxs = vec![vec![0_i32; n]; n];
        let mut mins = vec![vec![0_i32; n]; n];

        for j in 0..n {
            let line1 = sstate.state.lines[g.faces[i].edges[j]];
            let k = (j + 1) % n;
            maxs[j][k] = i32::from(line1 != Line::No);
            mins[j][k] = i32::from(line1 == Line::Yes);

            let dline_index = dline_index_from_face(&g, i, k);
            let line2 = sstate.state.lines[g.faces[i].edges[k]];
            let k2 = (k + 1) % n;

            let mut max = 2 - i32::from(line1 == Line::No) - i32::from(line2 == Line::No);
            if max == 2 && is_atmostone(dlines, dline_index) {
                max = 1;
            }
            maxs[j][k2] = max;

            let mut min = i32::from(line1 == Line::Yes) + i32::from(line2 == Line::Yes);
            if min == 0 && is_atleastone(dlines, dline_index) {
                min = 1;
            }
            mins[j][k2] = min;
        }

        for m in 3..n {
            for j in 0..n {
                let k = (j + m) % n;
                let u = (j + 1) % n;
                let v = (j + 2) % n;
                maxs[j][k] = (maxs[j][u] + maxs[u][k]).min(maxs[j][v] + maxs[v][k]);
                mins[j][k] = (mins[j][u] + mins[u][k]).max(mins[j][v] + mins[v][k]);
            }
        }

        for j in 0..n {
            let line_index = g.faces[i].edges[j];
            if sstate.state.lines[line_index] != Line::Unknown {
                continue;
            }
            let k = (j + 1) % n;

            // Bounds on the complement of this single edge.
            if mins[k][j] > clue {
                sstate.status = SolverStatus::Mistake;
                return Some(Difficulty::Easy);
            }
            if mins[k][j] == clue {
                sstate.set_line(line_index, Line::No);
                note_progress(&mut diff, Difficulty::Easy);
            }
            if maxs[k][j] < clue - 1 {
                sstate.status = SolverStatus::Mistake;
                return Some(Difficulty::Easy);
            }
            if maxs[k][j] == clue - 1 {
                sstate.set_line(line_index, Line::Yes);
                note_progress(&mut diff, Difficulty::Easy);
            }

            if sstate.diff >= Difficulty::Tricky {
                // Dline over edges {j, j+1}; only worth it when both are
                // unknown, the dot deductions handle the half-known case.
                if sstate.state.lines[g.faces[i].edges[k]] != Line::Unknown {
                    continue;
                }
                let dline_index = dline_index_from_face(&g, i, k);
                let k2 = (k + 1) % n;

                if mins[k2][j] > clue - 2 && set_atmostone(dlines, dline_index) {
                    note_progress(&mut diff, Difficulty::Normal);
                }
                if maxs[k2][j] < clue && set_atleastone(dlines, dline_index) {
                    note_progress(&mut diff, Difficulty::Normal);
                }
            }
        }
    }

    if diff == Some(Difficulty::Easy) {
        return diff;
    }

    for i in 0..g.dots.len() {
        if sstate.dot_solved[i] {
            continue;
        }
        let n = g.dots[i].edges.len();
        let yes = usize::from(sstate.dot_yes[i]);
        let no = usize::from(sstate.dot_no[i]);
        let unknown = n - yes - no;

        for j in 0..n {
            let k = (j + 1) % n;
            let dline_index = dline_index_from_dot(&g, i, j);
            let line1_index = g.dots[i].edges[j];
            let line2_index = g.dots[i].edges[k];
            let line1 = sstate.state.lines[line1_index];
            let line2 = sstate.state.lines[line2_index];

            // Dline flags from line states.
            if (line1 == Line::No || line2 == Line::No) && set_atmostone(dlines, dline_index) {
                note_progress(&mut diff, Difficulty::Normal);
            }
            if (line1 == Line::Yes || line2 == Line::Yes) && set_atleastone(dlines, dline_index)
            {
                note_progress(&mut diff, Difficulty::Normal);
            }
            // Line states from dline flags.
            if is_atmostone(dlines, dline_index) {
                if line1 == Line::Yes && line2 == Line::Unknown {
                    sstate.set_line(line2_index, Line::No);
                    note_progress(&mut diff, Difficulty::Easy);
                }
                if line2 == Line::Yes && line1 == Line::Unknown {
                    sstate.set_line(line1_index, Line::No);
                    note_progress(&mut diff, Difficulty::Easy);
                }
            }
            if is_atleastone(dlines, dline_index) {
                if line1 == Line::No && line2 == Line::Unknown {
                    sstate.set_line(line2_index, Line::Yes);
                    note_progress(&mut diff, Difficulty::Easy);
                }
                if line2 == Line::No && line1 == Line::Unknown {
                    sstate.set_line(line1_index, Line::Yes);
                    note_progress(&mut diff, Difficulty::Easy);
                }
            }

            if line1 != Line::Unknown || line2 != Line::Unknown {
                continue;
            }

            if yes == 0 && unknown == 2 {
                // The pair is all that's left, so its edges are equal.
                if is_atmostone(dlines, dline_index) {
                    sstate.set_line(line1_index, Line::No);
                    sstate.set_line(line2_index, Line::No);
                    note_progress(&mut diff, Difficulty::Easy);
                }
                if is_atleastone(dlines, dline_index) {
                    sstate.set_line(line1_index, Line::Yes);
                    sstate.set_line(line2_index, Line::Yes);
                    note_progress(&mut diff, Difficulty::Easy);
                }
            }
            if yes == 1 {
                if set_atmostone(dlines, dline_index) {
                    note_progress(&mut diff, Difficulty::Normal);
                }
                if unknown == 2 && set_atleastone(dlines, dline_index) {
                    note_progress(&mut diff, Difficulty::Normal);
                }
            }

            // Diagonal propagation between faces joined at this dot,
            // eg 3-2-...-2-3 chains on square grids.
            if sstate.diff >= Difficulty::Tricky && is_atleastone(dlines, dline_index) {
                let jj = j as i32;
                let nn = n as i32;
                for opp in 0..nn {
                    if opp == jj || opp == jj + 1 || opp == jj - 1 {
                        continue;
                    }
                    if jj == 0 && opp == nn - 1 {
                        continue;
                    }
                    if jj == nn - 1 && opp == 0 {
                        continue;
                    }
                    let opp_dline = dline_index_from_dot(&g, i, opp as usize);
                    if set_atmostone(dlines, opp_dline) {
                        note_progress(&mut diff, Difficulty::Normal);
                    }
                }
                if yes == 0 && is_atmostone(dlines, dline_index) {
                    // Exactly one Yes in the pair and none elsewhere.
                    if unknown == 3 {
                        for opp in 0..n {
                            if opp == j || opp == k {
                                continue;
                            }
                            let opp_index = g.dots[i].edges[opp];
                            if sstate.state.lines[opp_index] == Line::Unknown {
                                sstate.set_line(opp_index, Line::Yes);
                                note_progress(&mut diff, Difficulty::Easy);
                            }
                        }
                    } else if unknown == 4
                        && dline_set_opp_atleastone(&sstate.state, &g, dlines, i, jj)
                    {
                        note_progress(&mut diff, Difficulty::Normal);
                    }
                }
            }
        }
    }

    diff
}

/// With four unknowns at a dot and exactly one Yes split across one
/// adjacent pair, the opposite adjacent pair (if its edges are both
/// unknown) carries the other endpoint of the chain, so it gets
/// at-least-one.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn dline_set_opp_atleastone(
    state: &LoopyState,
    g: &Grid,
    dlines: &mut [u8],
    dot: usize,
    edge: i32,
) -> bool {
    let n = g.dots[dot].edges.len() as i32;
    for opp in 0..n {
        if opp == edge || opp == edge + 1 || opp == edge - 1 {
            continue;
        }
        if opp == 0 && edge == n - 1 {
            continue;
        }
        if opp == n - 1 && edge == 0 {
            continue;
        }
        let opp2 = (opp + 1) % n;
        if state.lines[g.dots[dot].edges[opp as usize]] != Line::Unknown {
            continue;
        }
        if state.lines[g.dots[dot].edges[opp2 as usize]] != Line::Unknown {
            continue;
        }
        let opp_dline_index = dline_index_from_dot(g, dot, opp as usize);
        return set_atleastone(dlines, opp_dline_index);
    }
    false
}

fn linedsf_deductions(sstate: &mut SolverState) -> Option<Difficulty> {
    let Some(mut linedsf) = sstate.linedsf.take() else {
        return None;
    };
    let Some(mut dlines) = sstate.dlines.take() else {
        sstate.linedsf = Some(linedsf);
        return None;
    };
    let ret = linedsf_deductions_inner(sstate, &mut dlines, &mut linedsf);
    sstate.dlines = Some(dlines);
    sstate.linedsf = Some(linedsf);
    ret
}

/// Sets identical line pairs around a face when setting both would
/// break the clue, runs parity deductions over small unknown sets, and
/// keeps each line consistent with its class representative.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn linedsf_deductions_inner(
    sstate: &mut SolverState,
    dlines: &mut [u8],
    linedsf: &mut Edsf,
) -> Option<Difficulty> {
    let g = Arc::clone(&sstate.state.grid);
    let mut diff = None;

    for i in 0..g.faces.len() {
        if sstate.face_solved[i] {
            continue;
        }
        let clue = i32::from(sstate.state.clues[i]);
        if clue < 0 {
            continue;
        }
        let n = g.faces[i].order() as i32;

        let yes = i32::from(sstate.face_yes[i]);
        if yes + 1 == clue && face_setall_identical(sstate, linedsf, i, Line::No) {
            note_progress(&mut diff, Difficulty::Easy);
        }
        let no = i32::from(sstate.face_no[i]);
        if no + 1 == n - clue && face_setall_identical(sstate, linedsf, i, Line::Yes) {
            note_progress(&mut diff, Difficulty::Easy);
        }

        // Reload, the identical-pair deduction may have moved it.
        let yes = i32::from(sstate.face_yes[i]);
        if let Some(d) = parity_deductions(
            sstate,
            linedsf,
            &g.faces[i].edges,
            (clue - yes) % 2 != 0,
        ) {
            note_progress(&mut diff, d);
        }
    }

    for i in 0..g.dots.len() {
        let n = g.dots[i].edges.len();
        for j in 0..n {
            let dline_index = dline_index_from_dot(&g, i, j);
            let line1_index = g.dots[i].edges[j];
            if sstate.state.lines[line1_index] != Line::Unknown {
                continue;
            }
            let j2 = (j + 1) % n;
            let line2_index = g.dots[i].edges[j2];
            if sstate.state.lines[line2_index] != Line::Unknown {
                continue;
            }
            let (can1, inv1) = linedsf.canonify(line1_index);
            let (can2, inv2) = linedsf.canonify(line2_index);
            if can1 == can2 && inv1 != inv2 {
                // Opposites: exactly one of the pair is on.
                if set_atmostone(dlines, dline_index) {
                    note_progress(&mut diff, Difficulty::Normal);
                }
                if set_atleastone(dlines, dline_index) {
                    note_progress(&mut diff, Difficulty::Normal);
                }
                continue;
            }
            if is_atmostone(dlines, dline_index)
                && is_atleastone(dlines, dline_index)
                && merge_lines(sstate, linedsf, line1_index, line2_index, true)
            {
                note_progress(&mut diff, Difficulty::Hard);
            }
        }

        let yes = usize::from(sstate.dot_yes[i]);
        if let Some(d) = parity_deductions(sstate, linedsf, &g.dots[i].edges, yes % 2 != 0) {
            note_progress(&mut diff, d);
        }
    }

    for i in 0..g.edges.len() {
        let (can, inv) = linedsf.canonify(i);
        if can == i {
            continue;
        }
        let s = sstate.state.lines[can];
        if s != Line::Unknown {
            if sstate.set_line(i, if inv { s.opposite() } else { s }) {
                note_progress(&mut diff, Difficulty::Easy);
            }
        } else {
            let s = sstate.state.lines[i];
            if s != Line::Unknown && sstate.set_line(can, if inv { s.opposite() } else { s }) {
                note_progress(&mut diff, Difficulty::Easy);
            }
        }
    }

    diff
}

/// Sets every pair of unknown lines around a face that are known
/// identical to the given state.
fn face_setall_identical(
    sstate: &mut SolverState,
    linedsf: &mut Edsf,
    face: usize,
    line_new: Line,
) -> bool {
    let g = Arc::clone(&sstate.state.grid);
    let n = g.faces[face].order();
    let mut changed = false;

    for i in 0..n {
        let line1_index = g.faces[face].edges[i];
        if sstate.state.lines[line1_index] != Line::Unknown {
            continue;
        }
        for j in (i + 1)..n {
            let line2_index = g.faces[face].edges[j];
            if sstate.state.lines[line2_index] != Line::Unknown {
                continue;
            }
            let (can1, inv1) = linedsf.canonify(line1_index);
            let (can2, inv2) = linedsf.canonify(line2_index);
            if can1 == can2 && inv1 == inv2 {
                changed |= sstate.set_line(line1_index, line_new);
                changed |= sstate.set_line(line2_index, line_new);
            }
        }
    }
    changed
}

/// Given an edge list whose Yes count has known parity, relates or
/// resolves the unknowns when there are at most four of them.
fn parity_deductions(
    sstate: &mut SolverState,
    linedsf: &mut Edsf,
    edge_list: &[usize],
    total_parity: bool,
) -> Option<Difficulty> {
    let mut diff = None;
    let e: Vec<usize> = edge_list
        .iter()
        .copied()
        .filter(|&ei| sstate.state.lines[ei] == Line::Unknown)
        .collect();

    match e.len() {
        2 => {
            if merge_lines(sstate, linedsf, e[0], e[1], total_parity) {
                note_progress(&mut diff, Difficulty::Hard);
            }
        }
        3 => {
            let (can0, inv0) = linedsf.canonify(e[0]);
            let (can1, inv1) = linedsf.canonify(e[1]);
            let (can2, inv2) = linedsf.canonify(e[2]);
            let set = |sstate: &mut SolverState, idx: usize, parity: bool| {
                sstate.set_line(idx, if parity { Line::Yes } else { Line::No })
            };
            if can0 == can1 && set(sstate, e[2], total_parity ^ inv0 ^ inv1) {
                note_progress(&mut diff, Difficulty::Easy);
            }
            if can0 == can2 && set(sstate, e[1], total_parity ^ inv0 ^ inv2) {
                note_progress(&mut diff, Difficulty::Easy);
            }
            if can1 == can2 && set(sstate, e[0], total_parity ^ inv1 ^ inv2) {
                note_progress(&mut diff, Difficulty::Easy);
            }
        }
        4 => {
            let (can0, inv0) = linedsf.canonify(e[0]);
            let (can1, inv1) = linedsf.canonify(e[1]);
            let (can2, inv2) = linedsf.canonify(e[2]);
            let (can3, inv3) = linedsf.canonify(e[3]);
            let merged = if can0 == can1 {
                merge_lines(sstate, linedsf, e[2], e[3], total_parity ^ inv0 ^ inv1)
            } else if can0 == can2 {
                merge_lines(sstate, linedsf, e[1], e[3], total_parity ^ inv0 ^ inv2)
            } else if can0 == can3 {
                merge_lines(sstate, linedsf, e[1], e[2], total_parity ^ inv0 ^ inv3)
            } else if can1 == can2 {
                merge_lines(sstate, linedsf, e[0], e[3], total_parity ^ inv1 ^ inv2)
            } else if can1 == can3 {
                merge_lines(sstate, linedsf, e[0], e[2], total_parity ^ inv1 ^ inv3)
            } else if can2 == can3 {
                merge_lines(sstate, linedsf, e[0], e[1], total_parity ^ inv2 ^ inv3)
            } else {
                false
            };
            if merged {
                note_progress(&mut diff, Difficulty::Hard);
            }
        }
        _ => {}
    }
    diff
}

/// Chain analysis over the dot union-find. Detects the solved
/// position, and refuses (or speculatively accepts, reporting
/// ambiguity) any unknown edge that would close a loop early.
fn loop_deductions(sstate: &mut SolverState) -> Option<Difficulty> {
    let g = Arc::clone(&sstate.state.grid);
    let mut edgecount = 0;
    for i in 0..g.edges.len() {
        if sstate.state.lines[i] == Line::Yes {
            sstate.merge_dots(i);
            edgecount += 1;
        }
    }

    let mut clues = 0;
    let mut satclues = 0;
    let mut sm1clues = 0;
    for i in 0..g.faces.len() {
        let c = i32::from(sstate.state.clues[i]);
        if c >= 0 {
            let o = i32::from(sstate.face_yes[i]);
            if o == c {
                satclues += 1;
            } else if o == c - 1 {
                sm1clues += 1;
            }
            clues += 1;
        }
    }

    let mut shortest_chainlen = g.dots.len();
    for i in 0..g.dots.len() {
        let root = sstate.dotdsf.canonify(i);
        let connected = sstate.looplen[root];
        if connected > 1 {
            shortest_chainlen = shortest_chainlen.min(connected);
        }
    }

    if satclues == clues && shortest_chainlen == edgecount {
        sstate.status = SolverStatus::Solved;
        return Some(Difficulty::Easy);
    }

    let mut progress = false;
    for i in 0..g.edges.len() {
        if sstate.state.lines[i] != Line::Unknown {
            continue;
        }
        let e = g.edges[i].clone();
        let eqclass = sstate.dotdsf.canonify(e.dot1);
        if eqclass != sstate.dotdsf.canonify(e.dot2) {
            continue;
        }

        // This edge closes a loop. It is only allowed if the loop would
        // take in every drawn edge and satisfy every clue, with the at
        // most two one-short clues sitting either side of this edge.
        let mut val = Line::No;
        if sstate.looplen[eqclass] == edgecount + 1 {
            let mut sm1_nearby = 0;
            for f in [e.face1, e.face2].into_iter().flatten() {
                let c = i32::from(sstate.state.clues[f]);
                if c >= 0 && i32::from(sstate.face_yes[f]) == c - 1 {
                    sm1_nearby += 1;
                }
            }
            if sm1clues == sm1_nearby && sm1clues + satclues == clues {
                val = Line::Yes;
            }
        }

        progress = sstate.set_line(i, val);
        if val == Line::Yes {
            // A solution, but found by loop-closing rather than forced
            // deduction, so not necessarily the only one.
            sstate.status = SolverStatus::Ambiguous;
            break;
        }
    }

    progress.then_some(Difficulty::Easy)
}

// ----------------------------------------------------------------------
// Generation

fn colour_at(board: &[FaceColour], face: Option<usize>) -> FaceColour {
    face.map_or(FaceColour::Black, |i| board[i])
}

/// Generates a loop and fills in every face's clue from it.
fn add_full_clues(state: &mut LoopyState, rs: &mut RandomState) {
    let g = Arc::clone(&state.grid);
    let board = generate_loop(&g, rs, None);

    state.clues.fill(0);
    for e in &g.edges {
        if colour_at(&board, e.face1) != colour_at(&board, e.face2) {
            if let Some(f) = e.face1 {
                state.clues[f] += 1;
            }
            if let Some(f) = e.face2 {
                state.clues[f] += 1;
            }
        }
    }
}

fn game_has_unique_soln(state: &LoopyState, diff: Difficulty) -> bool {
    let mut sstate = SolverState::new(state, diff);
    run_solver(&mut sstate, &SOLVER_STAGES);
    debug_assert!(sstate.status != SolverStatus::Mistake);
    sstate.status == SolverStatus::Solved
}

/// Blanks clues one at a time in random order, keeping each removal
/// only if the puzzle stays uniquely solvable at `diff`.
fn remove_clues(state: &mut LoopyState, rs: &mut RandomState, diff: Difficulty) {
    let mut face_list: Vec<usize> = (0..state.clues.len()).collect();
    rs.shuffle(&mut face_list);

    for f in face_list {
        let saved = state.clues[f];
        state.clues[f] = -1;
        if !game_has_unique_soln(state, diff) {
            state.clues[f] = saved;
        }
    }
}

// ----------------------------------------------------------------------
// Interaction state and rendering scratch

/// Cursor position in grid coordinates; the edge nearest to it is the
/// keyboard target.
#[derive(Debug)]
pub struct LoopyUi {
    cur_x: i32,
    cur_y: i32,
    cur_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineDraw {
    Yes,
    Unknown,
    No,
    Error,
}

/// Renderer scratch: what is currently on screen per edge and clue,
/// plus a cache of clue text positions (incentre lookups are not
/// cheap on aperiodic tilings).
#[derive(Debug)]
pub struct LoopyDraw {
    tilesize: i32,
    started: bool,
    flashing: bool,
    lines: Vec<LineDraw>,
    clue_error: Vec<bool>,
    clue_satisfied: Vec<bool>,
    text_pos: Vec<Option<(i32, i32)>>,
    cur_edge: Option<usize>,
}

fn draw_faint_lines() -> bool {
    static FAINT: OnceLock<bool> = OnceLock::new();
    *FAINT.get_or_init(|| {
        std::env::var("LOOPY_FAINT_LINES")
            .map_or(true, |v| v.starts_with('y') || v.starts_with('Y'))
    })
}

fn grid_to_screen(ds: &LoopyDraw, g: &Grid, gx: i32, gy: i32) -> (i32, i32) {
    let x = (gx - g.lowest_x) * ds.tilesize / g.tilesize + border(ds.tilesize);
    let y = (gy - g.lowest_y) * ds.tilesize / g.tilesize + border(ds.tilesize);
    (x, y)
}

fn face_text_pos(ds: &mut LoopyDraw, g: &Grid, face: usize) -> (i32, i32) {
    if let Some(p) = ds.text_pos[face] {
        return p;
    }
    let (ix, iy) = g.face_incentre(face);
    let p = grid_to_screen(ds, g, ix, iy);
    ds.text_pos[face] = Some(p);
    p
}

fn face_text_bbox(ds: &mut LoopyDraw, g: &Grid, face: usize) -> (i32, i32, i32, i32) {
    let (xx, yy) = face_text_pos(ds, g, face);
    (
        xx - ds.tilesize / 4 - 1,
        yy - ds.tilesize / 4 - 3,
        ds.tilesize / 2 + 2,
        ds.tilesize / 2 + 5,
    )
}

fn edge_bbox(ds: &LoopyDraw, g: &Grid, edge: usize) -> (i32, i32, i32, i32) {
    let e = &g.edges[edge];
    let (x1, y1) = grid_to_screen(ds, g, g.dots[e.dot1].x, g.dots[e.dot1].y);
    let (x2, y2) = grid_to_screen(ds, g, g.dots[e.dot2].x, g.dots[e.dot2].y);
    // Margin for dots and line thickness.
    let xmin = x1.min(x2) - 2;
    let xmax = x1.max(x2) + 2;
    let ymin = y1.min(y2) - 2;
    let ymax = y1.max(y2) + 2;
    (xmin, ymin, xmax - xmin + 1, ymax - ymin + 1)
}

fn dot_bbox(ds: &LoopyDraw, g: &Grid, dot: usize) -> (i32, i32, i32, i32) {
    let (x, y) = grid_to_screen(ds, g, g.dots[dot].x, g.dots[dot].y);
    (x - 2, y - 2, 5, 5)
}

fn boxes_intersect(a: (i32, i32, i32, i32), b: (i32, i32, i32, i32)) -> bool {
    let (x0, y0, w0, h0) = a;
    let (x1, y1, w1, h1) = b;
    x0 < x1 + w1 && x1 < x0 + w0 && y0 < y1 + h1 && y1 < y0 + h0
}

/// Lines are drawn in colour groups so that overdraw between states is
/// deterministic: errors always end up on top.
const LINE_PHASES: [usize; 5] = [
    COL_FAINT,
    COL_LINEUNKNOWN,
    COL_FOREGROUND,
    COL_HIGHLIGHT,
    COL_MISTAKE,
];

fn line_colour(ds: &LoopyDraw, state: &LoopyState, i: usize) -> usize {
    if state.line_errors[i] {
        COL_MISTAKE
    } else if state.lines[i] == Line::Unknown {
        COL_LINEUNKNOWN
    } else if state.lines[i] == Line::No {
        COL_FAINT
    } else if ds.flashing {
        COL_HIGHLIGHT
    } else {
        COL_FOREGROUND
    }
}

#[allow(clippy::cast_precision_loss)]
fn redraw_line(draw: &mut Draw, ds: &LoopyDraw, state: &LoopyState, g: &Grid, i: usize, phase: usize) {
    let colour = line_colour(ds, state, i);
    if colour != phase {
        return;
    }
    let e = &g.edges[i];
    let (x1, y1) = grid_to_screen(ds, g, g.dots[e.dot1].x, g.dots[e.dot1].y);
    let (x2, y2) = grid_to_screen(ds, g, g.dots[e.dot2].x, g.dots[e.dot2].y);

    if colour == COL_FAINT {
        if draw_faint_lines() {
            draw.api().draw_line(x1, y1, x2, y2, colour);
        }
    } else {
        draw.api().draw_thick_line(
            3.0,
            x1 as f32 + 0.5,
            y1 as f32 + 0.5,
            x2 as f32 + 0.5,
            y2 as f32 + 0.5,
            colour,
        );
    }
}

fn redraw_clue(draw: &mut Draw, ds: &mut LoopyDraw, state: &LoopyState, g: &Grid, i: usize) {
    let (x, y) = face_text_pos(ds, g, i);
    let colour = if ds.clue_error[i] {
        COL_MISTAKE
    } else if ds.clue_satisfied[i] {
        COL_SATISFIED
    } else {
        COL_FOREGROUND
    };
    let text = clue2char(state.clues[i]).to_string();
    draw.api().draw_text(
        x,
        y,
        FontType::Variable,
        ds.tilesize / 2,
        HAlign::Centre,
        VAlign::Centre,
        colour,
        &text,
    );
}

fn redraw_in_rect(
    draw: &mut Draw,
    ds: &mut LoopyDraw,
    state: &LoopyState,
    g: &Grid,
    rect: (i32, i32, i32, i32),
) {
    let (x, y, w, h) = rect;
    let cur_dots = ds.cur_edge.map(|e| (g.edges[e].dot1, g.edges[e].dot2));

    draw.api().clip(x, y, w, h);
    draw.api().draw_rect(x, y, w, h, COL_BACKGROUND);

    for i in 0..g.faces.len() {
        if state.clues[i] >= 0 {
            let bbox = face_text_bbox(ds, g, i);
            if boxes_intersect(rect, bbox) {
                redraw_clue(draw, ds, state, g, i);
            }
        }
    }
    for phase in LINE_PHASES {
        for i in 0..g.edges.len() {
            if boxes_intersect(rect, edge_bbox(ds, g, i)) {
                redraw_line(draw, ds, state, g, i, phase);
            }
        }
    }
    for i in 0..g.dots.len() {
        if boxes_intersect(rect, dot_bbox(ds, g, i)) {
            let current = cur_dots.is_some_and(|(d1, d2)| i == d1 || i == d2);
            let colour = if current { COL_CURSOR } else { COL_FOREGROUND };
            let (dx, dy) = grid_to_screen(ds, g, g.dots[i].x, g.dots[i].y);
            draw.api().draw_circle(dx, dy, 2, Some(colour), colour);
        }
    }

    draw.api().unclip();
    draw.api().draw_update(x, y, w, h);
}

impl Backend for Loopy {
    type Params = LoopyParams;
    type State = LoopyState;
    type Ui = LoopyUi;
    type DrawState = LoopyDraw;

    const NAME: &'static str = "Loopy";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = true;
    const CAN_FORMAT_AS_TEXT: bool = true;
    const WANTS_STATUSBAR: bool = false;
    const IS_TIMED: bool = false;
    const PREFERRED_TILESIZE: i32 = PREFERRED_TILESIZE;

    fn flags() -> BackendFlags {
        BackendFlags::REQUIRE_RBUTTON
    }

    fn default_params() -> LoopyParams {
        LoopyParams {
            width: 7,
            height: 7,
            diff: Difficulty::Easy,
            grid_type: 0,
        }
    }

    fn presets() -> Vec<(String, LoopyParams)> {
        let entries: [(i32, i32, Difficulty, usize); 22] = [
            (7, 7, Difficulty::Easy, 0),
            (10, 10, Difficulty::Easy, 0),
            (7, 7, Difficulty::Normal, 0),
            (10, 10, Difficulty::Normal, 0),
            (7, 7, Difficulty::Hard, 0),
            (10, 10, Difficulty::Hard, 0),
            (10, 10, Difficulty::Hard, 2),
            (12, 10, Difficulty::Hard, 1),
            (7, 7, Difficulty::Hard, 3),
            (9, 9, Difficulty::Hard, 4),
            (5, 4, Difficulty::Hard, 5),
            (7, 7, Difficulty::Hard, 6),
            (7, 7, Difficulty::Hard, 7),
            (5, 5, Difficulty::Hard, 8),
            (5, 5, Difficulty::Hard, 9),
            (5, 4, Difficulty::Hard, 10),
            (5, 4, Difficulty::Hard, 11),
            (3, 3, Difficulty::Hard, 12),
            (3, 3, Difficulty::Hard, 13),
            (10, 10, Difficulty::Hard, 14),
            (10, 10, Difficulty::Hard, 15),
            (5, 5, Difficulty::Hard, 16),
        ];
        entries
            .iter()
            .map(|&(w, h, diff, ty)| {
                (
                    format!("{w}x{h} {} - {}", GRID_NAMES[ty], diff.title()),
                    LoopyParams {
                        width: w,
                        height: h,
                        diff,
                        grid_type: ty,
                    },
                )
            })
            .collect()
    }

    #[allow(clippy::cast_sign_loss)]
    fn decode_params(params: &mut LoopyParams, string: &str) {
        let bytes = string.as_bytes();
        let mut k = 0;

        params.width = eat_num(bytes, &mut k);
        params.height = params.width;
        params.diff = Difficulty::Easy;
        if bytes.get(k) == Some(&b'x') {
            k += 1;
            params.height = eat_num(bytes, &mut k);
        }
        if bytes.get(k) == Some(&b't') {
            k += 1;
            params.grid_type = eat_num(bytes, &mut k).max(0) as usize;
        }
        if bytes.get(k) == Some(&b'd') {
            k += 1;
            if let Some(&c) = bytes.get(k) {
                for d in Difficulty::ALL {
                    if char::from(c) == d.encode_char() {
                        params.diff = d;
                    }
                }
            }
        }
    }

    fn encode_params(params: &LoopyParams, full: bool) -> String {
        let mut ret = format!("{}x{}t{}", params.width, params.height, params.grid_type);
        if full {
            ret.push('d');
            ret.push(params.diff.encode_char());
        }
        ret
    }

    fn configure(params: &LoopyParams) -> Vec<ConfigItem> {
        vec![
            ConfigItem {
                name: "Width".to_owned(),
                value: ConfigValue::String(params.width.to_string()),
            },
            ConfigItem {
                name: "Height".to_owned(),
                value: ConfigValue::String(params.height.to_string()),
            },
            ConfigItem {
                name: "Grid type".to_owned(),
                value: ConfigValue::Choices {
                    options: GRID_NAMES.iter().map(|&s| s.to_owned()).collect(),
                    selected: params.grid_type.min(GRID_NAMES.len() - 1),
                },
            },
            ConfigItem {
                name: "Difficulty".to_owned(),
                value: ConfigValue::Choices {
                    options: Difficulty::ALL.iter().map(|d| d.title().to_owned()).collect(),
                    selected: params.diff as usize,
                },
            },
        ]
    }

    fn custom_params(cfg: &[ConfigItem]) -> LoopyParams {
        let mut params = Self::default_params();
        if let Some(ConfigValue::String(s)) = cfg.first().map(|c| &c.value) {
            params.width = s.trim().parse().unwrap_or(0);
        }
        if let Some(ConfigValue::String(s)) = cfg.get(1).map(|c| &c.value) {
            params.height = s.trim().parse().unwrap_or(0);
        }
        if let Some(ConfigValue::Choices { selected, .. }) = cfg.get(2).map(|c| &c.value) {
            params.grid_type = *selected;
        }
        if let Some(ConfigValue::Choices { selected, .. }) = cfg.get(3).map(|c| &c.value) {
            params.diff = Difficulty::ALL
                .get(*selected)
                .copied()
                .unwrap_or(Difficulty::Easy);
        }
        params
    }

    fn validate_params(params: &LoopyParams, _full: bool) -> Result<(), ParamsError> {
        if params.grid_type >= GridType::ALL.len() {
            return Err(ParamsError::new("Illegal grid type"));
        }
        let (amin, omin) = GRID_SIZE_LIMITS[params.grid_type];
        if params.width < amin || params.height < amin {
            return Err(ParamsError::new(format!(
                "Width and height for this grid type must both be at least {amin}"
            )));
        }
        if params.width < omin && params.height < omin {
            return Err(ParamsError::new(format!(
                "At least one of width and height for this grid type must be at least {omin}"
            )));
        }
        params
            .tiling()
            .validate_params(params.width, params.height)
            .map_err(|e| ParamsError::new(e.to_string()))
    }

    fn new_desc(
        params: &LoopyParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        let tiling = params.tiling();
        let (grid_desc, grid) = loop {
            let gd = tiling.generate_desc(params.width, params.height, rs);
            if let Ok(g) = tiling.build(params.width, params.height, gd.as_deref()) {
                break (gd, g);
            }
        };

        let num_faces = grid.faces.len();
        let num_edges = grid.edges.len();
        let mut state = LoopyState {
            grid,
            clues: vec![0; num_faces],
            lines: vec![Line::Unknown; num_edges],
            line_errors: vec![false; num_edges],
            solved: false,
            cheated: false,
            grid_type: params.grid_type,
        };

        loop {
            // A fresh solvable board with all clues filled in. Tiny
            // boards could make this spin, but the size floors keep
            // every permitted board comfortably above that.
            loop {
                add_full_clues(&mut state, rs);
                if game_has_unique_soln(&state, params.diff) {
                    break;
                }
            }

            remove_clues(&mut state, rs, params.diff);

            match params.diff.previous() {
                Some(easier) if game_has_unique_soln(&state, easier) => {
                    debug!(
                        "rejecting {} board, solvable at {}",
                        params.diff.title(),
                        easier.title()
                    );
                }
                _ => break,
            }
        }

        let game_desc = encode_clues(&state);
        let desc = match grid_desc {
            Some(gd) => format!("{gd}{GRID_DESC_SEP}{game_desc}"),
            None => game_desc,
        };
        (desc, None)
    }

    fn validate_desc(params: &LoopyParams, desc: &str) -> Result<(), DescError> {
        let tiling = params.tiling();
        let (grid_desc, clue_desc) = split_desc(desc);
        let grid = tiling
            .build(params.width, params.height, grid_desc)
            .map_err(|e| DescError::new(e.to_string()))?;

        let mut count = 0;
        for c in clue_desc.chars() {
            match c {
                '0'..='9' | 'A'..='Z' => count += 1,
                c if c >= 'a' => count += (c as usize) - ('a' as usize) + 1,
                _ => return Err(DescError::new("Unknown character in description")),
            }
        }
        if count < grid.faces.len() {
            return Err(DescError::new("Description too short for board size"));
        }
        if count > grid.faces.len() {
            return Err(DescError::new("Description too long for board size"));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn new_game(params: &LoopyParams, desc: &str) -> LoopyState {
        let (grid_desc, clue_desc) = split_desc(desc);
        let grid = params
            .tiling()
            .build(params.width, params.height, grid_desc)
            .unwrap_or_else(|_| empty_grid());

        let num_faces = grid.faces.len();
        let num_edges = grid.edges.len();
        let mut clues = vec![-1_i8; num_faces];

        let mut i = 0;
        for c in clue_desc.chars() {
            if i >= num_faces {
                break;
            }
            match c {
                '0'..='9' => {
                    clues[i] = (c as u8 - b'0') as i8;
                    i += 1;
                }
                'A'..='Z' => {
                    clues[i] = (c as u8 - b'A') as i8 + 10;
                    i += 1;
                }
                c if c >= 'a' => {
                    i += (c as usize) - ('a' as usize) + 1;
                }
                _ => {}
            }
        }

        LoopyState {
            grid,
            clues,
            lines: vec![Line::Unknown; num_edges],
            line_errors: vec![false; num_edges],
            solved: false,
            cheated: false,
            grid_type: params.grid_type,
        }
    }

    fn solve(
        origstate: &LoopyState,
        _currstate: &LoopyState,
        _aux: Option<&str>,
    ) -> Result<String, SolveError> {
        let mut sstate = SolverState::new(origstate, Difficulty::Hard);
        run_solver(&mut sstate, &SOLVER_STAGES);
        if sstate.status == SolverStatus::Mistake {
            return Err(SolveError::new("Puzzle is inconsistent"));
        }
        Ok(encode_solve_move(&sstate.state))
    }

    fn can_format_as_text_now(params: &LoopyParams) -> bool {
        params.tiling() == GridType::Square
    }

    /// Square grids only: a half-resolution character canvas with `-`,
    /// `|` and `x` at edge midpoints and clue digits at face centres.
    fn text_format(state: &LoopyState) -> String {
        let g = &state.grid;
        let Some(f) = g.faces.first() else {
            return String::new();
        };
        // Dots are clockwise, so corners 0 and 2 span the square.
        let cell = (g.dots[f.dots[0]].x - g.dots[f.dots[2]].x).abs();
        if cell == 0 {
            return String::new();
        }

        let to_cell = |v: i32, low: i32| usize::try_from((v - low) / cell).unwrap_or(0);
        let w = to_cell(g.highest_x, g.lowest_x);
        let h = to_cell(g.highest_y, g.lowest_y);
        let mut canvas = vec![vec![b' '; 2 * w + 1]; 2 * h + 1];

        for (i, e) in g.edges.iter().enumerate() {
            let x1 = to_cell(g.dots[e.dot1].x, g.lowest_x);
            let x2 = to_cell(g.dots[e.dot2].x, g.lowest_x);
            let y1 = to_cell(g.dots[e.dot1].y, g.lowest_y);
            let y2 = to_cell(g.dots[e.dot2].y, g.lowest_y);
            let glyph = match state.lines[i] {
                Line::Yes => {
                    if y1 == y2 {
                        b'-'
                    } else {
                        b'|'
                    }
                }
                Line::No => b'x',
                Line::Unknown => continue,
            };
            canvas[y1 + y2][x1 + x2] = glyph;
        }

        for (i, f) in g.faces.iter().enumerate() {
            let x1 = to_cell(g.dots[f.dots[0]].x, g.lowest_x);
            let x2 = to_cell(g.dots[f.dots[2]].x, g.lowest_x);
            let y1 = to_cell(g.dots[f.dots[0]].y, g.lowest_y);
            let y2 = to_cell(g.dots[f.dots[2]].y, g.lowest_y);
            canvas[y1 + y2][x1 + x2] = clue2char(state.clues[i]) as u8;
        }

        let mut out = String::new();
        for row in canvas {
            out.push_str(&String::from_utf8_lossy(&row));
            out.push('\n');
        }
        out
    }

    fn new_ui(state: &LoopyState) -> LoopyUi {
        let g = &state.grid;
        LoopyUi {
            cur_x: (g.lowest_x + g.highest_x) / 2,
            cur_y: (g.lowest_y + g.highest_y) / 2,
            cur_visible: false,
        }
    }

    fn interpret_move(
        state: &LoopyState,
        ui: &mut LoopyUi,
        ds: &LoopyDraw,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent {
        let g = &state.grid;

        match button {
            Button::CursorUp | Button::CursorDown | Button::CursorLeft | Button::CursorRight => {
                let (dx, dy) = match button {
                    Button::CursorUp => (0, -1),
                    Button::CursorDown => (0, 1),
                    Button::CursorLeft => (-1, 0),
                    _ => (1, 0),
                };
                // Slide in grid coordinates until a different edge
                // becomes the nearest one; stop silently at the edge of
                // the board.
                let start = g.nearest_edge(ui.cur_x, ui.cur_y);
                let (mut cx, mut cy) = (ui.cur_x, ui.cur_y);
                loop {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if nx < g.lowest_x || nx > g.highest_x || ny < g.lowest_y || ny > g.highest_y
                    {
                        break;
                    }
                    cx = nx;
                    cy = ny;
                    let newe = g.nearest_edge(cx, cy);
                    if newe.is_some() && newe != start {
                        ui.cur_x = cx;
                        ui.cur_y = cy;
                        break;
                    }
                }
                ui.cur_visible = true;
                MoveIntent::Redraw
            }
            Button::CursorSelect | Button::CursorSelect2 => {
                if !ui.cur_visible {
                    ui.cur_visible = true;
                    return MoveIntent::Redraw;
                }
                let Some(i) = g.nearest_edge(ui.cur_x, ui.cur_y) else {
                    return MoveIntent::Ignored;
                };
                let old = state.lines[i];
                let c = if button == Button::CursorSelect2 {
                    if old == Line::Unknown { 'n' } else { 'u' }
                } else if old == Line::Unknown {
                    'y'
                } else {
                    'u'
                };
                MoveIntent::Move(format!("{i}{c}"))
            }
            Button::Down(mb) => {
                if ds.tilesize <= 0 {
                    return MoveIntent::Ignored;
                }
                let gx = (x - border(ds.tilesize)) * g.tilesize / ds.tilesize + g.lowest_x;
                let gy = (y - border(ds.tilesize)) * g.tilesize / ds.tilesize + g.lowest_y;
                let Some(i) = g.nearest_edge(gx, gy) else {
                    return MoveIntent::Ignored;
                };
                let old = state.lines[i];
                let c = match mb {
                    MouseButton::Left => {
                        if old == Line::Unknown { 'y' } else { 'u' }
                    }
                    MouseButton::Middle => 'u',
                    MouseButton::Right => {
                        if old == Line::Unknown { 'n' } else { 'u' }
                    }
                };
                ui.cur_visible = false;
                MoveIntent::Move(format!("{i}{c}"))
            }
            _ => MoveIntent::Ignored,
        }
    }

    fn execute_move(state: &LoopyState, movestr: &str) -> MoveResult<LoopyState> {
        let mut new = state.clone();
        let mut rest = movestr;
        if let Some(stripped) = rest.strip_prefix('S') {
            new.cheated = true;
            rest = stripped;
        }

        let bytes = rest.as_bytes();
        let mut k = 0;
        while k < bytes.len() {
            let start = k;
            while k < bytes.len() && bytes[k].is_ascii_digit() {
                k += 1;
            }
            let Ok(i) = rest[start..k].parse::<usize>() else {
                return MoveResult::Invalid;
            };
            if i >= new.lines.len() {
                return MoveResult::Invalid;
            }
            let Some(&op) = bytes.get(k) else {
                return MoveResult::Invalid;
            };
            k += 1;
            new.lines[i] = match op {
                b'y' => Line::Yes,
                b'n' => Line::No,
                b'u' => Line::Unknown,
                _ => return MoveResult::Invalid,
            };
        }

        if new.check_completion() {
            new.solved = true;
        }
        MoveResult::Changed(new)
    }

    fn compute_size(params: &LoopyParams, tilesize: i32) -> (i32, i32) {
        let gs = params.tiling().size(params.width, params.height);
        // Multiply first to minimise integer division error.
        let w = gs.xextent * tilesize / gs.tilesize;
        let h = gs.yextent * tilesize / gs.tilesize;
        (w + 2 * border(tilesize) + 1, h + 2 * border(tilesize) + 1)
    }

    fn set_size(ds: &mut LoopyDraw, _params: &LoopyParams, tilesize: i32) {
        ds.tilesize = tilesize;
        ds.text_pos.fill(None);
    }

    fn colours() -> Vec<Rgb> {
        let bg = DEFAULT_BACKGROUND;
        let mut ret = vec![[0.0; 3]; NCOLOURS];
        ret[COL_BACKGROUND] = bg;
        ret[COL_FOREGROUND] = [0.0, 0.0, 0.0];
        // A yellow slightly darker than the background, so it stays
        // visible on light and mid-grey themes alike.
        ret[COL_LINEUNKNOWN] = [bg[0] * 0.9, bg[1] * 0.9, 0.0];
        ret[COL_HIGHLIGHT] = [1.0, 1.0, 1.0];
        ret[COL_MISTAKE] = [1.0, 0.0, 0.0];
        ret[COL_SATISFIED] = [0.0, 0.0, 0.0];
        ret[COL_CURSOR] = [0.5, 0.5, 1.0];
        ret[COL_FAINT] = [bg[0] * 0.9, bg[1] * 0.9, bg[2] * 0.9];
        ret
    }

    fn new_drawstate(state: &LoopyState) -> LoopyDraw {
        let num_faces = state.grid.faces.len();
        let num_edges = state.grid.edges.len();
        LoopyDraw {
            tilesize: 0,
            started: false,
            flashing: false,
            lines: vec![LineDraw::Unknown; num_edges],
            clue_error: vec![false; num_faces],
            clue_satisfied: vec![false; num_faces],
            text_pos: vec![None; num_faces],
            cur_edge: None,
        }
    }

    /// Two passes: work out which clues and edges changed on screen,
    /// then redraw either just their bounding rectangles or, past a
    /// small limit, everything. Piecemeal redraw is never allowed to
    /// repaint an antialiased line over itself.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn redraw(
        draw: &mut Draw,
        ds: &mut LoopyDraw,
        _oldstate: Option<&LoopyState>,
        state: &LoopyState,
        _dir: i32,
        ui: &LoopyUi,
        _anim_time: f32,
        flash_time: f32,
    ) {
        let g = Arc::clone(&state.grid);
        let mut redraw_everything = !ds.started;

        let cur_edge = if ui.cur_visible {
            g.nearest_edge(ui.cur_x, ui.cur_y)
        } else {
            None
        };
        if cur_edge != ds.cur_edge {
            redraw_everything = true;
        }

        let mut changed_faces: Vec<usize> = Vec::new();
        let mut changed_edges: Vec<usize> = Vec::new();

        for i in 0..g.faces.len() {
            let n = i32::from(state.clues[i]);
            if n < 0 {
                continue;
            }
            let sides = g.faces[i].order() as i32;
            let yes = state.face_order(i, Line::Yes) as i32;
            let no = state.face_order(i, Line::No) as i32;
            let clue_mistake = yes > n || no > sides - n;
            let clue_satisfied = yes == n && no == sides - n;
            if clue_mistake != ds.clue_error[i] || clue_satisfied != ds.clue_satisfied[i] {
                ds.clue_error[i] = clue_mistake;
                ds.clue_satisfied[i] = clue_satisfied;
                if changed_faces.len() == REDRAW_OBJECTS_LIMIT {
                    redraw_everything = true;
                } else {
                    changed_faces.push(i);
                }
            }
        }

        let flash_changed;
        if flash_time > 0.0
            && (flash_time <= FLASH_TIME / 3.0 || flash_time >= FLASH_TIME * 2.0 / 3.0)
        {
            flash_changed = !ds.flashing;
            ds.flashing = true;
        } else {
            flash_changed = ds.flashing;
            ds.flashing = false;
        }

        for i in 0..g.edges.len() {
            let new = if state.line_errors[i] {
                LineDraw::Error
            } else {
                match state.lines[i] {
                    Line::Yes => LineDraw::Yes,
                    Line::Unknown => LineDraw::Unknown,
                    Line::No => LineDraw::No,
                }
            };
            if new != ds.lines[i] || (flash_changed && state.lines[i] == Line::Yes) {
                ds.lines[i] = new;
                if changed_edges.len() == REDRAW_OBJECTS_LIMIT {
                    redraw_everything = true;
                } else {
                    changed_edges.push(i);
                }
            }
        }

        ds.cur_edge = cur_edge;

        if redraw_everything {
            let b = border(ds.tilesize);
            let w = (g.highest_x - g.lowest_x) * ds.tilesize / g.tilesize;
            let h = (g.highest_y - g.lowest_y) * ds.tilesize / g.tilesize;
            redraw_in_rect(draw, ds, state, &g, (0, 0, w + 2 * b + 1, h + 2 * b + 1));
        } else {
            for &i in &changed_faces {
                let bbox = face_text_bbox(ds, &g, i);
                redraw_in_rect(draw, ds, state, &g, bbox);
            }
            for &i in &changed_edges {
                let bbox = edge_bbox(ds, &g, i);
                redraw_in_rect(draw, ds, state, &g, bbox);
            }
        }

        ds.started = true;
    }

    fn flash_length(
        oldstate: &LoopyState,
        newstate: &LoopyState,
        _dir: i32,
        _ui: &LoopyUi,
    ) -> f32 {
        if !oldstate.solved && newstate.solved && !oldstate.cheated && !newstate.cheated {
            FLASH_TIME
        } else {
            0.0
        }
    }

    fn status(state: &LoopyState) -> Status {
        if state.solved {
            Status::Solved
        } else {
            Status::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use parlor_engine::NullDraw;
    use proptest::prelude::*;

    use super::*;

    fn params(spec: &str) -> LoopyParams {
        let mut p = Loopy::default_params();
        Loopy::decode_params(&mut p, spec);
        Loopy::validate_params(&p, true).unwrap();
        p
    }

    #[test]
    fn params_encoding_round_trips() {
        let p = params("7x7t0de");
        assert_eq!((p.width, p.height), (7, 7));
        assert_eq!(p.grid_type, 0);
        assert_eq!(p.diff, Difficulty::Easy);
        assert_eq!(Loopy::encode_params(&p, true), "7x7t0de");
        assert_eq!(Loopy::encode_params(&p, false), "7x7t0");

        let q = params("5x4t10dh");
        assert_eq!((q.width, q.height), (5, 4));
        assert_eq!(q.grid_type, 10);
        assert_eq!(q.diff, Difficulty::Hard);

        let r = params("9");
        assert_eq!((r.width, r.height), (9, 9));
        assert_eq!(r.diff, Difficulty::Easy);

        let reencoded = Loopy::custom_params(&Loopy::configure(&q));
        assert_eq!(reencoded, q);
    }

    #[test]
    fn size_limits_are_per_grid_type() {
        let mut p = Loopy::default_params();

        Loopy::decode_params(&mut p, "2x2t0");
        let err = Loopy::validate_params(&p, true).unwrap_err();
        assert!(err.to_string().contains("both be at least 3"), "{err}");

        Loopy::decode_params(&mut p, "3x3t4");
        let err = Loopy::validate_params(&p, true).unwrap_err();
        assert!(err.to_string().contains("At least one"), "{err}");
        Loopy::decode_params(&mut p, "4x3t4");
        assert!(Loopy::validate_params(&p, true).is_ok());

        Loopy::decode_params(&mut p, "1x2t9");
        assert!(Loopy::validate_params(&p, true).is_ok());
        Loopy::decode_params(&mut p, "1x1t9");
        assert!(Loopy::validate_params(&p, true).is_err());

        Loopy::decode_params(&mut p, "3x3t99");
        let err = Loopy::validate_params(&p, true).unwrap_err();
        assert!(err.to_string().contains("Illegal grid type"), "{err}");
    }

    #[test]
    fn desc_validation_reports_specific_errors() {
        let p = params("3x3t0");
        assert!(Loopy::validate_desc(&p, "i").is_ok());
        assert!(Loopy::validate_desc(&p, "0h").is_ok());
        assert!(Loopy::validate_desc(&p, "33a23b12").is_ok());

        let err = Loopy::validate_desc(&p, "h").unwrap_err();
        assert!(err.to_string().contains("too short"), "{err}");
        let err = Loopy::validate_desc(&p, "j").unwrap_err();
        assert!(err.to_string().contains("too long"), "{err}");
        let err = Loopy::validate_desc(&p, "3!h").unwrap_err();
        assert!(err.to_string().contains("Unknown character"), "{err}");
    }

    #[test]
    fn generated_puzzles_match_their_difficulty() {
        let p = params("7x7t0de");
        let mut rs = RandomState::from_seed(b"loopy-7x7-easy");
        let (desc, aux) = Loopy::new_desc(&p, &mut rs, false);
        assert!(aux.is_none());
        Loopy::validate_desc(&p, &desc).unwrap();

        let state = Loopy::new_game(&p, &desc);

        // The full pipeline at the target difficulty finds the unique
        // solution.
        let mut sstate = SolverState::new(&state, Difficulty::Easy);
        run_solver(&mut sstate, &SOLVER_STAGES);
        assert_eq!(sstate.status, SolverStatus::Solved);

        // Counting deductions alone never prove the loop closed; only
        // the loop stage can declare a solution.
        let mut sstate = SolverState::new(&state, Difficulty::Easy);
        run_solver(&mut sstate, &SOLVER_STAGES[..1]);
        assert_ne!(sstate.status, SolverStatus::Solved);
    }

    #[test]
    fn normal_puzzles_are_not_solvable_at_easy() {
        let p = params("7x7t0dn");
        let mut rs = RandomState::from_seed(b"loopy-7x7-normal");
        let (desc, _) = Loopy::new_desc(&p, &mut rs, false);
        let state = Loopy::new_game(&p, &desc);

        assert!(game_has_unique_soln(&state, Difficulty::Normal));
        assert!(!game_has_unique_soln(&state, Difficulty::Easy));
    }

    #[test]
    fn solve_move_completes_the_puzzle() {
        let p = params("7x7t0de");
        let mut rs = RandomState::from_seed(b"loopy-solve");
        let (desc, _) = Loopy::new_desc(&p, &mut rs, false);
        let state = Loopy::new_game(&p, &desc);
        let ui = Loopy::new_ui(&state);

        let movestr = Loopy::solve(&state, &state, None).unwrap();
        assert!(movestr.starts_with('S'));

        let MoveResult::Changed(cheated) = Loopy::execute_move(&state, &movestr) else {
            panic!("solve move rejected");
        };
        assert!(cheated.solved);
        assert!(cheated.cheated);
        assert_eq!(Loopy::status(&cheated), Status::Solved);
        assert_eq!(Loopy::flash_length(&state, &cheated, 1, &ui), 0.0);

        // The same moves played by hand flash on completion.
        let by_hand = movestr.strip_prefix('S').unwrap();
        let MoveResult::Changed(honest) = Loopy::execute_move(&state, by_hand) else {
            panic!("hand moves rejected");
        };
        assert!(honest.solved);
        assert!(!honest.cheated);
        assert_eq!(Loopy::flash_length(&state, &honest, 1, &ui), FLASH_TIME);
    }

    #[test]
    fn completion_accepts_single_loop_and_flags_extras() {
        let p = params("3x3t0");
        let state = Loopy::new_game(&p, "i");

        // Any single closed loop solves a clueless board.
        let mut ring = String::new();
        for &e in &state.grid.faces[0].edges {
            let _ = write!(ring, "{e}y");
        }
        let MoveResult::Changed(one_loop) = Loopy::execute_move(&state, &ring) else {
            panic!("ring rejected");
        };
        assert!(one_loop.solved);
        assert!(one_loop.line_errors.iter().all(|&e| !e));

        // Two disjoint rings are not a solution and both get flagged.
        let mut two = ring.clone();
        for &e in &state.grid.faces[8].edges {
            let _ = write!(two, "{e}y");
        }
        let MoveResult::Changed(two_loops) = Loopy::execute_move(&state, &two) else {
            panic!("double ring rejected");
        };
        assert!(!two_loops.solved);
        for &e in &state.grid.faces[0].edges {
            assert!(two_loops.line_errors[e]);
        }
        for &e in &state.grid.faces[8].edges {
            assert!(two_loops.line_errors[e]);
        }
    }

    #[test]
    fn moves_toggle_and_reject() {
        let p = params("3x3t0");
        let state = Loopy::new_game(&p, "i");

        let MoveResult::Changed(s) = Loopy::execute_move(&state, "0y") else {
            panic!("move rejected");
        };
        assert_eq!(s.lines[0], Line::Yes);
        let MoveResult::Changed(s) = Loopy::execute_move(&s, "0u") else {
            panic!("move rejected");
        };
        assert_eq!(s.lines[0], Line::Unknown);

        assert!(matches!(
            Loopy::execute_move(&state, "999y"),
            MoveResult::Invalid
        ));
        assert!(matches!(
            Loopy::execute_move(&state, "0q"),
            MoveResult::Invalid
        ));
        assert!(matches!(
            Loopy::execute_move(&state, "y"),
            MoveResult::Invalid
        ));
    }

    #[test]
    fn text_format_renders_square_grids() {
        let p = params("3x3t0");
        assert!(Loopy::can_format_as_text_now(&p));
        assert!(!Loopy::can_format_as_text_now(&params("3x3t2")));

        let state = Loopy::new_game(&p, "30b12c");
        let text = Loopy::text_format(&state);
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 7);
        assert!(rows.iter().all(|r| r.len() == 7));
        assert_eq!(&rows[1][1..2], "3");
        assert_eq!(&rows[1][3..4], "0");

        let MoveResult::Changed(s) = Loopy::execute_move(&state, "0y") else {
            panic!("move rejected");
        };
        let text = Loopy::text_format(&s);
        assert_eq!(
            text.chars().filter(|&c| c == '-' || c == '|').count(),
            1
        );
    }

    #[test]
    fn clicks_map_to_nearest_edge() {
        let p = params("3x3t0");
        let state = Loopy::new_game(&p, "i");
        let mut ui = Loopy::new_ui(&state);
        let mut ds = Loopy::new_drawstate(&state);
        Loopy::set_size(&mut ds, &p, 32);

        let g = &state.grid;
        let e = &g.edges[0];
        let mx = (g.dots[e.dot1].x + g.dots[e.dot2].x) / 2;
        let my = (g.dots[e.dot1].y + g.dots[e.dot2].y) / 2;
        let sx = (mx - g.lowest_x) * ds.tilesize / g.tilesize + border(ds.tilesize);
        let sy = (my - g.lowest_y) * ds.tilesize / g.tilesize + border(ds.tilesize);

        let intent =
            Loopy::interpret_move(&state, &mut ui, &ds, sx, sy, Button::Down(MouseButton::Left));
        assert_eq!(intent, MoveIntent::Move("0y".to_owned()));
        let intent =
            Loopy::interpret_move(&state, &mut ui, &ds, sx, sy, Button::Down(MouseButton::Right));
        assert_eq!(intent, MoveIntent::Move("0n".to_owned()));

        let MoveResult::Changed(drawn) = Loopy::execute_move(&state, "0y") else {
            panic!("move rejected");
        };
        let intent =
            Loopy::interpret_move(&drawn, &mut ui, &ds, sx, sy, Button::Down(MouseButton::Left));
        assert_eq!(intent, MoveIntent::Move("0u".to_owned()));

        // Far outside the board nothing is near enough.
        let intent = Loopy::interpret_move(
            &state,
            &mut ui,
            &ds,
            -1000,
            -1000,
            Button::Down(MouseButton::Left),
        );
        assert_eq!(intent, MoveIntent::Ignored);
    }

    #[test]
    fn cursor_keys_drive_the_nearest_edge() {
        let p = params("3x3t0");
        let state = Loopy::new_game(&p, "i");
        let mut ui = Loopy::new_ui(&state);
        let ds = Loopy::new_drawstate(&state);

        // First select only reveals the cursor.
        let intent = Loopy::interpret_move(&state, &mut ui, &ds, 0, 0, Button::CursorSelect);
        assert_eq!(intent, MoveIntent::Redraw);
        assert!(ui.cur_visible);

        let intent = Loopy::interpret_move(&state, &mut ui, &ds, 0, 0, Button::CursorSelect);
        let MoveIntent::Move(m) = intent else {
            panic!("select did not move");
        };
        assert!(m.ends_with('y'));

        let before = (ui.cur_x, ui.cur_y);
        let intent = Loopy::interpret_move(&state, &mut ui, &ds, 0, 0, Button::CursorRight);
        assert_eq!(intent, MoveIntent::Redraw);
        assert_ne!((ui.cur_x, ui.cur_y), before);

        let intent = Loopy::interpret_move(&state, &mut ui, &ds, 0, 0, Button::CursorSelect2);
        let MoveIntent::Move(m) = intent else {
            panic!("select2 did not move");
        };
        assert!(m.ends_with('n'));
    }

    #[test]
    fn triangular_descs_carry_a_grid_desc() {
        let p = params("3x3t2de");
        let mut rs = RandomState::from_seed(b"loopy-tri");
        let (desc, _) = Loopy::new_desc(&p, &mut rs, false);
        assert!(desc.contains(GRID_DESC_SEP));
        Loopy::validate_desc(&p, &desc).unwrap();

        let state = Loopy::new_game(&p, &desc);
        let movestr = Loopy::solve(&state, &state, None).unwrap();
        let MoveResult::Changed(s) = Loopy::execute_move(&state, &movestr) else {
            panic!("solve move rejected");
        };
        assert!(s.solved);
    }

    #[test]
    fn honeycomb_generation_round_trips() {
        let p = params("4x3t1de");
        let mut rs = RandomState::from_seed(b"loopy-honey");
        let (desc, _) = Loopy::new_desc(&p, &mut rs, false);
        assert!(!desc.contains(GRID_DESC_SEP));
        Loopy::validate_desc(&p, &desc).unwrap();

        let state = Loopy::new_game(&p, &desc);
        assert!(game_has_unique_soln(&state, Difficulty::Easy));
    }

    #[test]
    fn redraw_smoke_test() {
        let p = params("3x3t0");
        let state = Loopy::new_game(&p, "30b12c");
        let ui = Loopy::new_ui(&state);
        let mut ds = Loopy::new_drawstate(&state);
        Loopy::set_size(&mut ds, &p, 32);

        let mut draw = Draw::new(Box::new(NullDraw));
        Loopy::redraw(&mut draw, &mut ds, None, &state, 1, &ui, 0.0, 0.0);
        assert!(ds.started);

        let MoveResult::Changed(s) = Loopy::execute_move(&state, "0y1n") else {
            panic!("move rejected");
        };
        Loopy::redraw(&mut draw, &mut ds, Some(&state), &s, 1, &ui, 0.0, 0.0);
        assert_eq!(ds.lines[0], LineDraw::Yes);
        assert_eq!(ds.lines[1], LineDraw::No);
    }

    proptest! {
        #[test]
        fn prop_clue_encoding_round_trips(
            clues in prop::collection::vec(-1_i8..=4, 9),
        ) {
            let p = params("3x3t0");
            let mut state = Loopy::new_game(&p, "i");
            state.clues = clues.clone();

            let desc = encode_clues(&state);
            prop_assert!(Loopy::validate_desc(&p, &desc).is_ok(), "{desc}");
            let decoded = Loopy::new_game(&p, &desc);
            prop_assert_eq!(decoded.clues, clues);
        }
    }
}
