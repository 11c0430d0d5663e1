//! Untangle: drag the vertices of a planar graph until no two edges
//! cross.
//!
//! Points live on rational coordinates, one denominator per point, so
//! that circle positions, drag positions in pixels and solved grid
//! positions can all be represented exactly. The crossing test widens
//! to 128 bits, which comfortably holds the dot products of products
//! of screen-scale coordinates.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use parlor_core::RandomState;
use parlor_engine::{
    Backend, BackendFlags, Button, ConfigItem, ConfigValue, DescError, Draw, MouseButton,
    MoveIntent, MoveResult, ParamsError, Rgb, SolveError, Status, mkhighlight,
};

use crate::DEFAULT_BACKGROUND;

const CIRCLE_RADIUS: i32 = 6;
const DRAG_THRESHOLD: i64 = (CIRCLE_RADIUS as i64) * 2;
const PREFERRED_TILESIZE: i32 = 64;

const FLASH_TIME: f32 = 0.30;
const ANIM_TIME: f32 = 0.13;
const SOLVEANIM_TIME: f32 = 0.50;

/// The playing area keeps its own background so dead space around a
/// non-square window reads as outside the puzzle.
const COL_SYSBACKGROUND: usize = 0;
const COL_BACKGROUND: usize = 1;
const COL_LINE: usize = 2;
const COL_CROSSEDLINE: usize = 3;
const COL_OUTLINE: usize = 4;
const COL_POINT: usize = 5;
const COL_DRAGPOINT: usize = 6;
const COL_NEIGHBOUR: usize = 7;
const COL_FLASH1: usize = 8;
const COL_FLASH2: usize = 9;
const NCOLOURS: usize = 10;

/// Points occupy about a third of the solution grid.
const POINT_DENSITY: usize = 3;
const MAX_DEGREE: usize = 4;

fn coord_limit(n: usize) -> usize {
    (n * POINT_DENSITY).isqrt()
}

/// A point at (x/d, y/d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    x: i64,
    y: i64,
    d: i64,
}

/// An edge as an ordered pair of vertex indices, low first.
type Edge = (usize, usize);

fn edge(a: usize, b: usize) -> Edge {
    (a.min(b), a.max(b))
}

fn dotprod(a: i64, b: i64, p: i64, q: i64) -> i128 {
    i128::from(a) * i128::from(b) + i128::from(p) * i128::from(q)
}

/// Whether the segments a1-a2 and b1-b2 intersect. An endpoint lying on
/// the other segment counts.
fn cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    // b1 and b2 must be on opposite sides of a1-a2. Work with the
    // numerators of b1-a1 and b2-a1 against a perpendicular of a2-a1;
    // only the signs matter.
    let b1x = b1.x * a1.d - a1.x * b1.d;
    let b1y = b1.y * a1.d - a1.y * b1.d;
    let b2x = b2.x * a1.d - a1.x * b2.d;
    let b2y = b2.y * a1.d - a1.y * b2.d;
    let px = a1.y * a2.d - a2.y * a1.d;
    let py = a2.x * a1.d - a1.x * a2.d;

    let d1 = dotprod(b1x, px, b1y, py);
    let d2 = dotprod(b2x, px, b2y, py);
    if (d1 > 0 && d2 > 0) || (d1 < 0 && d2 < 0) {
        return false;
    }

    if d1 == 0 && d2 == 0 {
        // Collinear: intersect iff the segments overlap within their
        // common line.
        let px = a2.x * a1.d - a1.x * a2.d;
        let py = a2.y * a1.d - a1.y * a2.d;
        let d1 = dotprod(b1x, px, b1y, py);
        let d2 = dotprod(b2x, px, b2y, py);
        if d1 < 0 && d2 < 0 {
            return false;
        }
        let d3 = dotprod(px, px, py, py);
        if d1 > d3 && d2 > d3 {
            return false;
        }
    }

    // And a1, a2 on opposite sides of b1-b2.
    let a1x = a1.x * b1.d - b1.x * a1.d;
    let a1y = a1.y * b1.d - b1.y * a1.d;
    let a2x = a2.x * b1.d - b1.x * a2.d;
    let a2y = a2.y * b1.d - b1.y * a2.d;
    let px = b1.y * b2.d - b2.y * b1.d;
    let py = b2.x * b1.d - b1.x * b2.d;
    let d1 = dotprod(a1x, px, a1y, py);
    let d2 = dotprod(a2x, px, a2y, py);
    !((d1 > 0 && d2 > 0) || (d1 < 0 && d2 < 0))
}

/// n points evenly spaced on a circle within (0,0)-(w,w).
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn make_circle(n: usize, w: usize) -> Vec<Point> {
    // Fixed denominator; fine enough to separate the points without
    // inflating the numerators.
    let d = i64::from(PREFERRED_TILESIZE);
    let w = i64::try_from(w).unwrap_or(0);
    let c = d * w / 2;
    let r = d * w * 3 / 7;

    (0..n)
        .map(|i| {
            let angle = i as f64 * 2.0 * std::f64::consts::PI / n as f64;
            let (x, y) = (r as f64 * angle.sin(), -(r as f64) * angle.cos());
            Point {
                x: (c as f64 + x + 0.5) as i64,
                y: (c as f64 + y + 0.5) as i64,
                d,
            }
        })
        .collect()
}

/// Marker type implementing the Untangle backend.
pub struct Untangle;

/// Shape of an Untangle game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntangleParams {
    /// Number of vertices.
    pub n: usize,
}

/// Full position: point locations over the shared edge set.
#[derive(Debug, Clone)]
pub struct UntangleState {
    params: UntangleParams,
    /// Extent of the coordinate system, not of the window.
    w: usize,
    h: usize,
    pts: Vec<Point>,
    edges: Arc<BTreeSet<Edge>>,
    crosses: Vec<bool>,
    completed: bool,
    cheated: bool,
    just_solved: bool,
}

/// Drag-in-progress state.
#[derive(Debug)]
pub struct UntangleUi {
    dragpoint: Option<usize>,
    newpoint: Point,
    just_dragged: bool,
    just_moved: bool,
}

/// Last-drawn point positions, for suppressing no-op redraws.
#[derive(Debug, Default)]
pub struct UntangleDraw {
    tilesize: i32,
    bg: Option<usize>,
    dragpoint: Option<usize>,
    x: Vec<i64>,
    y: Vec<i64>,
}

/// Marks crossed edges and flags completion when there are none.
fn mark_crossings(state: &mut UntangleState) {
    let edges: Vec<Edge> = state.edges.iter().copied().collect();
    state.crosses = vec![false; edges.len()];
    let mut ok = true;
    for (i, &(ea, eb)) in edges.iter().enumerate() {
        for (j, &(fa, fb)) in edges.iter().enumerate().skip(i + 1) {
            if fa == ea || fa == eb || fb == ea || fb == eb {
                continue;
            }
            if cross(state.pts[fa], state.pts[fb], state.pts[ea], state.pts[eb]) {
                ok = false;
                state.crosses[i] = true;
                state.crosses[j] = true;
            }
        }
    }
    if ok {
        state.completed = true;
    }
}

/// Parses "P{i}:{x},{y}/{d}" after the leading 'P' has been checked.
fn parse_point_move(cmd: &str) -> Option<(usize, Point)> {
    let (p, rest) = cmd.split_once(':')?;
    let (x, rest) = rest.split_once(',')?;
    let (y, d) = rest.split_once('/')?;
    let pt = Point {
        x: x.parse().ok()?,
        y: y.parse().ok()?,
        d: d.parse().ok()?,
    };
    if pt.d <= 0 {
        return None;
    }
    Some((p.parse().ok()?, pt))
}

fn parse_desc(n: usize, desc: &str) -> Result<BTreeSet<Edge>, DescError> {
    let mut edges = BTreeSet::new();
    for pair in desc.split(',') {
        let Some((a, b)) = pair.split_once('-') else {
            return Err(DescError::new(
                "Expected '-' after number in game description",
            ));
        };
        let (Ok(a), Ok(b)) = (a.parse::<usize>(), b.parse::<usize>()) else {
            return Err(DescError::new(
                "Expected ',' after number in game description",
            ));
        };
        if a >= n || b >= n {
            return Err(DescError::new("Number out of range in game description"));
        }
        edges.insert(edge(a, b));
    }
    Ok(edges)
}

/// The edge set built during generation, together with the solved
/// point positions it is planar on.
fn make_graph(n: usize, rs: &mut RandomState) -> (Vec<Point>, BTreeSet<Edge>) {
    let w = coord_limit(n);

    let mut cells: Vec<usize> = (0..w * w).collect();
    rs.shuffle(&mut cells);
    #[allow(clippy::cast_possible_wrap)]
    let pts: Vec<Point> = cells[..n]
        .iter()
        .map(|&c| Point {
            x: (c % w) as i64,
            y: (c / w) as i64,
            d: 1,
        })
        .collect();

    // Repeatedly try to give the lowest-degree vertex another edge,
    // preferring nearby endpoints. An edge is acceptable if it keeps
    // every degree within bounds, crosses nothing, and passes through
    // no third point.
    let mut edges: BTreeSet<Edge> = BTreeSet::new();
    let mut degree = vec![0usize; n];
    loop {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&v| (degree[v], v));

        let mut added = false;
        'vertices: for (pos, &j) in order.iter().enumerate() {
            if degree[j] >= MAX_DEGREE {
                break;
            }
            let mut candidates: Vec<(i64, usize)> = order[pos + 1..]
                .iter()
                .filter(|&&k| degree[k] < MAX_DEGREE && !edges.contains(&edge(j, k)))
                .map(|&k| {
                    let dx = pts[k].x - pts[j].x;
                    let dy = pts[k].y - pts[j].y;
                    (dx * dx + dy * dy, k)
                })
                .collect();
            candidates.sort_unstable();

            for (_, k) in candidates {
                let blocked = (0..n)
                    .any(|p| p != k && p != j && cross(pts[k], pts[j], pts[p], pts[p]));
                if blocked {
                    continue;
                }
                let crossed = edges.iter().any(|&(ea, eb)| {
                    ea != k && ea != j && eb != k && eb != j
                        && cross(pts[k], pts[j], pts[ea], pts[eb])
                });
                if crossed {
                    continue;
                }
                edges.insert(edge(j, k));
                degree[j] += 1;
                degree[k] += 1;
                added = true;
                break 'vertices;
            }
        }
        if !added {
            break;
        }
    }
    (pts, edges)
}

impl Backend for Untangle {
    type Params = UntangleParams;
    type State = UntangleState;
    type Ui = UntangleUi;
    type DrawState = UntangleDraw;

    const NAME: &'static str = "Untangle";
    const CAN_CONFIGURE: bool = true;
    const CAN_SOLVE: bool = true;
    const CAN_FORMAT_AS_TEXT: bool = false;
    const WANTS_STATUSBAR: bool = false;
    const IS_TIMED: bool = false;
    const PREFERRED_TILESIZE: i32 = PREFERRED_TILESIZE;

    fn flags() -> BackendFlags {
        BackendFlags::SOLVE_ANIMATES
    }

    fn default_params() -> UntangleParams {
        UntangleParams { n: 10 }
    }

    fn presets() -> Vec<(String, UntangleParams)> {
        [6, 10, 15, 20, 25]
            .into_iter()
            .map(|n| (format!("{n} points"), UntangleParams { n }))
            .collect()
    }

    fn decode_params(params: &mut UntangleParams, string: &str) {
        let digits = string.len() - string.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        params.n = string[..digits].parse().unwrap_or(0);
    }

    fn encode_params(params: &UntangleParams, _full: bool) -> String {
        format!("{}", params.n)
    }

    fn configure(params: &UntangleParams) -> Vec<ConfigItem> {
        vec![ConfigItem {
            name: "Number of points".to_owned(),
            value: ConfigValue::String(format!("{}", params.n)),
        }]
    }

    fn custom_params(cfg: &[ConfigItem]) -> UntangleParams {
        let n = match cfg.first().map(|item| &item.value) {
            Some(ConfigValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        UntangleParams { n }
    }

    fn validate_params(params: &UntangleParams, _full: bool) -> Result<(), ParamsError> {
        if params.n < 4 {
            return Err(ParamsError::new("Number of points must be at least four"));
        }
        Ok(())
    }

    fn new_desc(
        params: &UntangleParams,
        rs: &mut RandomState,
        _interactive: bool,
    ) -> (String, Option<String>) {
        let n = params.n;
        let w = coord_limit(n);
        let (pts, edges) = make_graph(n, rs);

        // Shuffle the vertex labels until the circle arrangement has at
        // least one crossing, so the new game does not open solved.
        let circle = make_circle(n, w);
        let mut perm: Vec<usize> = (0..n).collect();
        loop {
            rs.shuffle(&mut perm);
            let edge_list: Vec<Edge> = edges.iter().copied().collect();
            let crossed = edge_list.iter().enumerate().any(|(i, &(ea, eb))| {
                edge_list[i + 1..].iter().any(|&(fa, fb)| {
                    fa != ea && fa != eb && fb != ea && fb != eb
                        && cross(
                            circle[perm[fa]],
                            circle[perm[fb]],
                            circle[perm[ea]],
                            circle[perm[eb]],
                        )
                })
            });
            if crossed {
                break;
            }
        }

        // Comma-separated dash pairs, sorted so the desc leaks nothing
        // about generation order.
        let relabelled: BTreeSet<Edge> = edges
            .iter()
            .map(|&(a, b)| edge(perm[a], perm[b]))
            .collect();
        let desc = relabelled
            .iter()
            .map(|&(a, b)| format!("{a}-{b}"))
            .collect::<Vec<_>>()
            .join(",");

        // The generation positions, nudged to half-integer coordinates
        // so they sit in cell centres, make the aux solution.
        let mut solved = vec![Point { x: 0, y: 0, d: 1 }; n];
        for (i, &p) in pts.iter().enumerate() {
            solved[perm[i]] = Point {
                x: p.x * 2 + 1,
                y: p.y * 2 + 1,
                d: 2,
            };
        }
        let mut aux = String::from("S");
        for (i, p) in solved.iter().enumerate() {
            let _ = write!(aux, ";P{}:{},{}/{}", i, p.x, p.y, p.d);
        }
        (desc, Some(aux))
    }

    fn validate_desc(params: &UntangleParams, desc: &str) -> Result<(), DescError> {
        parse_desc(params.n, desc).map(|_| ())
    }

    fn new_game(params: &UntangleParams, desc: &str) -> UntangleState {
        let n = params.n;
        let w = coord_limit(n);
        let edges = parse_desc(n, desc).unwrap_or_default();
        let mut state = UntangleState {
            params: params.clone(),
            w,
            h: w,
            pts: make_circle(n, w),
            edges: Arc::new(edges),
            crosses: Vec::new(),
            completed: false,
            cheated: false,
            just_solved: false,
        };
        mark_crossings(&mut state);
        state
    }

    fn solve(
        _state: &UntangleState,
        currstate: &UntangleState,
        aux: Option<&str>,
    ) -> Result<String, SolveError> {
        let n = currstate.params.n;
        let Some(aux) = aux else {
            return Err(SolveError::new("Solution not known for this puzzle"));
        };

        let mut pts = Vec::with_capacity(n);
        for (i, cmd) in aux.trim_start_matches('S').split(';').skip(1).enumerate() {
            match cmd.strip_prefix('P').and_then(parse_point_move) {
                Some((p, pt)) if p == i => pts.push(pt),
                _ => return Err(SolveError::new("Internal error: aux_info badly formatted")),
            }
        }
        if pts.len() != n {
            return Err(SolveError::new("Internal error: aux_info badly formatted"));
        }

        // Any reflection or rotation of the solution is equally solved;
        // pick the one of the eight square symmetries needing the least
        // total movement from where the points are now.
        #[allow(clippy::cast_precision_loss)]
        let (cx, cy) = (currstate.w as f32 / 2.0, currstate.h as f32 / 2.0);
        let matrix = |i: usize| {
            let mut m = [0i32; 4];
            m[i & 1] = if i & 2 != 0 { 1 } else { -1 };
            m[3 - (i & 1)] = if i & 4 != 0 { 1 } else { -1 };
            m
        };
        #[allow(clippy::cast_precision_loss)]
        let transform = |m: [i32; 4], p: Point| {
            let px = p.x as f32 / p.d as f32 - cx;
            let py = p.y as f32 / p.d as f32 - cy;
            #[allow(clippy::cast_precision_loss)]
            let ox = m[0] as f32 * px + m[1] as f32 * py + cx;
            #[allow(clippy::cast_precision_loss)]
            let oy = m[2] as f32 * px + m[3] as f32 * py + cy;
            (ox, oy)
        };

        let mut best = (0usize, f32::INFINITY);
        for i in 0..8 {
            let m = matrix(i);
            #[allow(clippy::cast_precision_loss)]
            let d: f32 = pts
                .iter()
                .zip(currstate.pts.iter())
                .map(|(&p, &s)| {
                    let (ox, oy) = transform(m, p);
                    let dx = ox - s.x as f32 / s.d as f32;
                    let dy = oy - s.y as f32 / s.d as f32;
                    dx * dx + dy * dy
                })
                .sum();
            if d < best.1 {
                best = (i, d);
            }
        }

        let m = matrix(best.0);
        let mut ret = String::from("S");
        for (i, &p) in pts.iter().enumerate() {
            let (ox, oy) = transform(m, p);
            // The solved points sit on half-integer coordinates, so a
            // denominator of 2 is exact.
            #[allow(clippy::cast_possible_truncation)]
            let (x, y) = ((ox * 2.0 + 0.5) as i64, (oy * 2.0 + 0.5) as i64);
            let _ = write!(ret, ";P{i}:{x},{y}/2");
        }
        Ok(ret)
    }

    fn text_format(_state: &UntangleState) -> String {
        String::new()
    }

    fn new_ui(_state: &UntangleState) -> UntangleUi {
        UntangleUi {
            dragpoint: None,
            newpoint: Point { x: 0, y: 0, d: 1 },
            just_dragged: false,
            just_moved: false,
        }
    }

    fn changed_state(ui: &mut UntangleUi, _oldstate: &UntangleState, _newstate: &UntangleState) {
        ui.dragpoint = None;
        ui.just_moved = ui.just_dragged;
        ui.just_dragged = false;
    }

    fn interpret_move(
        state: &UntangleState,
        ui: &mut UntangleUi,
        ds: &UntangleDraw,
        x: i32,
        y: i32,
        button: Button,
    ) -> MoveIntent {
        let (x, y) = (i64::from(x), i64::from(y));
        match button {
            Button::Down(MouseButton::Left | MouseButton::Middle | MouseButton::Right) => {
                // Drag the nearest vertex, in case two sit almost on
                // top of each other, but nothing at all beyond the
                // threshold.
                let ts = i64::from(ds.tilesize);
                let nearest = state
                    .pts
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let dx = p.x * ts / p.d - x;
                        let dy = p.y * ts / p.d - y;
                        (dx * dx + dy * dy, i)
                    })
                    .min();
                if let Some((d, i)) = nearest {
                    if d <= DRAG_THRESHOLD * DRAG_THRESHOLD {
                        ui.dragpoint = Some(i);
                        ui.newpoint = Point { x, y, d: ts };
                        return MoveIntent::Redraw;
                    }
                }
                MoveIntent::Ignored
            }
            Button::Drag(_) if ui.dragpoint.is_some() => {
                ui.newpoint = Point { x, y, d: i64::from(ds.tilesize) };
                MoveIntent::Redraw
            }
            Button::Release(_) => {
                let Some(p) = ui.dragpoint.take() else {
                    return MoveIntent::Ignored;
                };
                // Dragging off the window cancels the drag.
                let np = ui.newpoint;
                #[allow(clippy::cast_possible_wrap)]
                let off_board = np.x < 0
                    || np.x >= state.w as i64 * np.d
                    || np.y < 0
                    || np.y >= state.h as i64 * np.d;
                if off_board {
                    return MoveIntent::Redraw;
                }
                ui.just_dragged = true;
                MoveIntent::Move(format!("P{}:{},{}/{}", p, np.x, np.y, np.d))
            }
            _ => MoveIntent::Ignored,
        }
    }

    fn execute_move(from: &UntangleState, movestr: &str) -> MoveResult<UntangleState> {
        let mut state = from.clone();
        state.just_solved = false;
        for cmd in movestr.split(';') {
            if cmd == "S" {
                state.cheated = true;
                state.just_solved = true;
                continue;
            }
            let parsed = cmd.strip_prefix('P').and_then(parse_point_move);
            let Some((p, pt)) = parsed else {
                return MoveResult::Invalid;
            };
            if p >= state.params.n {
                return MoveResult::Invalid;
            }
            state.pts[p] = pt;
        }
        mark_crossings(&mut state);
        MoveResult::Changed(state)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn compute_size(params: &UntangleParams, tilesize: i32) -> (i32, i32) {
        let span = coord_limit(params.n) as i32 * tilesize;
        (span, span)
    }

    fn set_size(ds: &mut UntangleDraw, _params: &UntangleParams, tilesize: i32) {
        ds.tilesize = tilesize;
    }

    fn colours() -> Vec<Rgb> {
        let (background, _, lowlight) = mkhighlight(DEFAULT_BACKGROUND);
        let mut ret = vec![[0.0, 0.0, 0.0]; NCOLOURS];
        ret[COL_SYSBACKGROUND] = lowlight;
        ret[COL_BACKGROUND] = background;
        ret[COL_LINE] = [0.0, 0.0, 0.0];
        ret[COL_CROSSEDLINE] = [1.0, 0.0, 0.0];
        ret[COL_OUTLINE] = [0.0, 0.0, 0.0];
        ret[COL_POINT] = [0.0, 0.0, 1.0];
        ret[COL_DRAGPOINT] = [1.0, 1.0, 1.0];
        ret[COL_NEIGHBOUR] = [1.0, 0.0, 0.0];
        ret[COL_FLASH1] = [0.5, 0.5, 0.5];
        ret[COL_FLASH2] = [1.0, 1.0, 1.0];
        ret
    }

    fn new_drawstate(state: &UntangleState) -> UntangleDraw {
        UntangleDraw {
            tilesize: 0,
            bg: None,
            dragpoint: None,
            x: vec![-1; state.params.n],
            y: vec![-1; state.params.n],
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::too_many_lines)]
    fn redraw(
        draw: &mut Draw,
        ds: &mut UntangleDraw,
        oldstate: Option<&UntangleState>,
        state: &UntangleState,
        dir: i32,
        ui: &UntangleUi,
        anim_time: f32,
        flash_time: f32,
    ) {
        // No sensible partial redraw exists for this game; instead the
        // whole frame is skipped when nothing moved and neither flash
        // colour nor drag status changed.
        let bg = if flash_time == 0.0 {
            COL_BACKGROUND
        } else if (flash_time * 4.0 / FLASH_TIME) as i32 % 2 == 0 {
            COL_FLASH1
        } else {
            COL_FLASH2
        };

        let anim_total = if oldstate.is_some() {
            let solving = if dir < 0 {
                oldstate.is_some_and(|s| s.just_solved)
            } else {
                state.just_solved
            };
            if solving { SOLVEANIM_TIME } else { ANIM_TIME }
        } else {
            0.0
        };

        let ts = i64::from(ds.tilesize);
        let mut points_moved = false;
        for i in 0..state.params.n {
            let mut p = state.pts[i];
            if ui.dragpoint == Some(i) {
                p = ui.newpoint;
            }
            if let Some(old) = oldstate {
                p = mix(old.pts[i], p, anim_time / anim_total);
            }
            let x = p.x * ts / p.d;
            let y = p.y * ts / p.d;
            if ds.x[i] != x || ds.y[i] != y {
                points_moved = true;
            }
            ds.x[i] = x;
            ds.y[i] = y;
        }

        if ds.bg == Some(bg) && ds.dragpoint == ui.dragpoint && !points_moved {
            return;
        }
        ds.bg = Some(bg);
        ds.dragpoint = ui.dragpoint;

        let (w, h) = Self::compute_size(&state.params, ds.tilesize);
        draw.api().draw_rect(0, 0, w, h, bg);

        let crosses = oldstate.map_or(&state.crosses, |s| &s.crosses);
        for (i, &(a, b)) in state.edges.iter().enumerate() {
            let colour = if crosses.get(i).copied().unwrap_or(false) {
                COL_CROSSEDLINE
            } else {
                COL_LINE
            };
            #[allow(clippy::cast_possible_truncation)]
            let (x1, y1, x2, y2) =
                (ds.x[a] as i32, ds.y[a] as i32, ds.x[b] as i32, ds.y[b] as i32);
            draw.api().draw_line(x1, y1, x2, y2, colour);
        }

        // Plain points first, then the dragged point's neighbours, then
        // the dragged point itself on top.
        for wanted in [COL_POINT, COL_NEIGHBOUR, COL_DRAGPOINT] {
            for i in 0..state.params.n {
                let c = if ui.dragpoint == Some(i) {
                    COL_DRAGPOINT
                } else if ui
                    .dragpoint
                    .is_some_and(|d| state.edges.contains(&edge(d, i)))
                {
                    COL_NEIGHBOUR
                } else {
                    COL_POINT
                };
                if c == wanted {
                    #[allow(clippy::cast_possible_truncation)]
                    let (cx, cy) = (ds.x[i] as i32, ds.y[i] as i32);
                    draw.api()
                        .draw_circle(cx, cy, CIRCLE_RADIUS, Some(c), COL_OUTLINE);
                }
            }
        }

        draw.api().draw_update(0, 0, w, h);
    }

    fn anim_length(
        oldstate: &UntangleState,
        newstate: &UntangleState,
        dir: i32,
        ui: &UntangleUi,
    ) -> f32 {
        if ui.just_moved {
            return 0.0;
        }
        let solving = if dir < 0 {
            oldstate.just_solved
        } else {
            newstate.just_solved
        };
        if solving { SOLVEANIM_TIME } else { ANIM_TIME }
    }

    fn flash_length(
        oldstate: &UntangleState,
        newstate: &UntangleState,
        _dir: i32,
        _ui: &UntangleUi,
    ) -> f32 {
        if !oldstate.completed
            && newstate.completed
            && !oldstate.cheated
            && !newstate.cheated
        {
            FLASH_TIME
        } else {
            0.0
        }
    }

    fn status(state: &UntangleState) -> Status {
        if state.completed {
            Status::Solved
        } else {
            Status::Active
        }
    }
}

/// Interpolates between two rational points, for move animation.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn mix(a: Point, b: Point, distance: f32) -> Point {
    Point {
        d: a.d * b.d,
        x: (a.x * b.d) + ((b.x * a.d - a.x * b.d) as f32 * distance) as i64,
        y: (a.y * b.d) + ((b.y * a.d - a.y * b.d) as f32 * distance) as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: i64, y: i64) -> Point {
        Point { x, y, d: 1 }
    }

    #[test]
    fn crossing_test_handles_the_special_cases() {
        // A clean crossing.
        assert!(cross(pt(0, 0), pt(4, 4), pt(0, 4), pt(4, 0)));
        // Clearly separate.
        assert!(!cross(pt(0, 0), pt(1, 0), pt(0, 2), pt(1, 2)));
        // Endpoint on the other segment counts.
        assert!(cross(pt(0, 0), pt(4, 0), pt(2, 0), pt(2, 3)));
        // Collinear and overlapping.
        assert!(cross(pt(0, 0), pt(4, 0), pt(2, 0), pt(6, 0)));
        // Collinear but disjoint.
        assert!(!cross(pt(0, 0), pt(1, 0), pt(3, 0), pt(5, 0)));
        // A point (degenerate segment) on a line.
        assert!(cross(pt(0, 0), pt(4, 4), pt(2, 2), pt(2, 2)));
        // Mixed denominators: (1/2, 1/2) lies on y = x.
        let half = Point { x: 1, y: 1, d: 2 };
        assert!(cross(pt(0, 0), pt(2, 2), half, half));
    }

    #[test]
    fn generated_graphs_respect_the_degree_bound() {
        let mut rs = RandomState::from_seed(b"untangle degrees");
        let (pts, edges) = make_graph(10, &mut rs);
        let mut degree = vec![0usize; 10];
        for &(a, b) in &edges {
            assert!(a < b);
            degree[a] += 1;
            degree[b] += 1;
        }
        assert!(degree.iter().all(|&d| d <= MAX_DEGREE));
        // The generation layout itself is planar.
        let list: Vec<Edge> = edges.iter().copied().collect();
        for (i, &(ea, eb)) in list.iter().enumerate() {
            for &(fa, fb) in &list[i + 1..] {
                if fa == ea || fa == eb || fb == ea || fb == eb {
                    continue;
                }
                assert!(!cross(pts[fa], pts[fb], pts[ea], pts[eb]));
            }
        }
    }

    #[test]
    fn new_games_open_tangled() {
        let params = UntangleParams { n: 6 };
        let mut rs = RandomState::from_seed(b"untangle tangle");
        let (desc, _) = Untangle::new_desc(&params, &mut rs, false);
        Untangle::validate_desc(&params, &desc).unwrap();
        let state = Untangle::new_game(&params, &desc);
        assert!(!state.completed);
        assert!(state.crosses.iter().any(|&c| c));
    }

    #[test]
    fn aux_solution_untangles_the_graph() {
        let params = UntangleParams { n: 6 };
        let mut rs = RandomState::from_seed(b"untangle solve");
        let (desc, aux) = Untangle::new_desc(&params, &mut rs, false);
        let state = Untangle::new_game(&params, &desc);

        let movestr = Untangle::solve(&state, &state, aux.as_deref()).unwrap();
        let MoveResult::Changed(done) = Untangle::execute_move(&state, &movestr) else {
            panic!("solve move rejected");
        };
        assert!(done.completed);
        assert!(done.cheated);
        assert!(done.just_solved);
        assert_eq!(Untangle::status(&done), Status::Solved);
        // Solving by cheating earns no completion flash.
        assert_eq!(Untangle::flash_length(&state, &done, 1, &Untangle::new_ui(&done)), 0.0);
    }

    #[test]
    fn solve_without_aux_is_an_error() {
        let state = Untangle::new_game(&UntangleParams { n: 4 }, "0-1,1-2,2-3");
        assert!(Untangle::solve(&state, &state, None).is_err());
    }

    #[test]
    fn drags_travel_through_the_ui() {
        let params = UntangleParams { n: 4 };
        let state = Untangle::new_game(&params, "0-1,0-2,1-3,2-3");
        let mut ui = Untangle::new_ui(&state);
        let mut ds = Untangle::new_drawstate(&state);
        Untangle::set_size(&mut ds, &params, 64);

        // Point 0 sits at the top of the circle.
        let x = i32::try_from(state.pts[0].x * 64 / state.pts[0].d).unwrap();
        let y = i32::try_from(state.pts[0].y * 64 / state.pts[0].d).unwrap();
        assert!(matches!(
            Untangle::interpret_move(&state, &mut ui, &ds, x + 3, y + 3, Button::Down(MouseButton::Left)),
            MoveIntent::Redraw
        ));
        assert_eq!(ui.dragpoint, Some(0));
        let MoveIntent::Move(m) =
            Untangle::interpret_move(&state, &mut ui, &ds, x + 30, y + 40, Button::Release(MouseButton::Left))
        else {
            panic!("release did not produce a move");
        };
        assert_eq!(m, format!("P0:{},{}/64", x + 30, y + 40));
        let MoveResult::Changed(moved) = Untangle::execute_move(&state, &m) else {
            panic!("move rejected");
        };
        assert_eq!(moved.pts[0], Point { x: i64::from(x) + 30, y: i64::from(y) + 40, d: 64 });

        // A drag released outside the board is a cancel, not a move.
        let mut ui = Untangle::new_ui(&state);
        Untangle::interpret_move(&state, &mut ui, &ds, x, y, Button::Down(MouseButton::Left));
        assert!(matches!(
            Untangle::interpret_move(&state, &mut ui, &ds, -50, -50, Button::Drag(MouseButton::Left)),
            MoveIntent::Redraw
        ));
        assert!(matches!(
            Untangle::interpret_move(&state, &mut ui, &ds, -50, -50, Button::Release(MouseButton::Left)),
            MoveIntent::Redraw
        ));
    }

    #[test]
    fn desc_errors_are_specific() {
        let params = UntangleParams { n: 4 };
        assert!(Untangle::validate_desc(&params, "0-1,1-4").is_err());
        assert!(Untangle::validate_desc(&params, "0-1,2").is_err());
        assert!(Untangle::validate_desc(&params, "01").is_err());
    }
}
