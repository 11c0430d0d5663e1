//! The aperiodic hat monotile tiling (Smith, Myers, Kaplan and
//! Goodman-Strauss, 2023).
//!
//! Hats are unions of eight kites from the deltoidal kite tiling, so a
//! patch is produced by walking every kite of a rectangular region in
//! boustrophedon order and tracking each kite's *combinatorial
//! coordinates*: its index within a hat, the hat's index within a
//! metatile, and the metatile's index within its parent at every level of
//! the H/T/P/F substitution system. Stepping to an adjacent kite rewrites
//! as few levels of that address as possible, consulting adjacency maps
//! for one expansion (the kitemap) and for re-parenting a tile across a
//! metatile boundary (the metamap).
//!
//! The adjacency maps themselves are derived once, on first use, by
//! geometrically expanding each metatile type and matching up the kite
//! centres of the resulting hats.
//!
//! A grid description records the random ancestry choices so the same
//! patch can be rebuilt: comma-terminated level indices, innermost first,
//! then the letter of the outermost metatile reached.

use std::collections::{BTreeMap, VecDeque};
use std::ops::{Add, Mul, Sub};
use std::sync::OnceLock;

use parlor_core::RandomState;

use crate::grid::{Grid, GridBuilder, GridError};
use crate::tilings::GridSize;

pub(crate) const HATS_TILESIZE: i32 = 32;
/// One coarse grid square is 4 x 6 kite-lattice units.
const XSQUARELEN: i32 = 4;
const YSQUARELEN: i32 = 6;
/// Pixel size of one kite-lattice unit in each direction.
const XUNIT: i32 = 14;
const YUNIT: i32 = 8;

/// Kites per hat.
const HAT_KITES: usize = 8;
/// Vertices per hat outline, counting the one straight corner.
const HAT_VERTICES: usize = 14;
/// Largest number of tiles in any metatile expansion.
const MAX_EXPAND: usize = 13;

/// A point in the hexagonal basis `(1, r)` where `r` is a primitive sixth
/// root of unity. Kite vertices all have integer coordinates in this
/// basis, and hexagon centres sit at multiples of six.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
struct Spot {
    x: i32,
    y: i32,
}

const fn sp(x: i32, y: i32) -> Spot {
    Spot { x, y }
}

impl Spot {
    /// Rotation by 60 degrees anticlockwise about the origin.
    fn left6(self) -> Spot {
        sp(-self.y, self.x + self.y)
    }

    /// Rotation by 60 degrees clockwise about the origin.
    fn right6(self) -> Spot {
        sp(self.x + self.y, -self.x)
    }
}

impl Add for Spot {
    type Output = Spot;
    fn add(self, o: Spot) -> Spot {
        sp(self.x + o.x, self.y + o.y)
    }
}

impl Sub for Spot {
    type Output = Spot;
    fn sub(self, o: Spot) -> Spot {
        sp(self.x - o.x, self.y - o.y)
    }
}

impl Mul<i32> for Spot {
    type Output = Spot;
    fn mul(self, k: i32) -> Spot {
        sp(self.x * k, self.y * k)
    }
}

/// The four metatile types of the substitution system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Meta {
    H,
    T,
    P,
    F,
}

impl Meta {
    const ALL: [Meta; 4] = [Meta::H, Meta::T, Meta::P, Meta::F];

    fn letter(self) -> char {
        match self {
            Meta::H => 'H',
            Meta::T => 'T',
            Meta::P => 'P',
            Meta::F => 'F',
        }
    }

    fn from_letter(c: char) -> Option<Meta> {
        match c {
            'H' => Some(Meta::H),
            'T' => Some(Meta::T),
            'P' => Some(Meta::P),
            'F' => Some(Meta::F),
            _ => None,
        }
    }
}

/// Outline vertices of each metatile type, relative to its distinguished
/// vertex with orientation `(1, 0)`.
const VERTICES: [&[Spot]; 4] = [
    &[sp(0, 0), sp(4, -2), sp(12, 6), sp(10, 10), sp(-6, 18), sp(-8, 16)],
    &[sp(0, 0), sp(6, 6), sp(-6, 12)],
    &[sp(0, 0), sp(4, 4), sp(-4, 20), sp(-8, 16)],
    &[sp(0, 0), sp(4, -2), sp(6, 0), sp(-2, 16), sp(-6, 12)],
];

/// Where the same outline vertices land after one expansion.
const EXPANDED_VERTICES: [&[Spot]; 4] = [
    &[sp(0, 0), sp(12, -6), sp(30, 12), sp(24, 24), sp(-12, 42), sp(-18, 36)],
    &[sp(0, 0), sp(12, 12), sp(-12, 24)],
    &[sp(0, 0), sp(14, 8), sp(-4, 44), sp(-18, 36)],
    &[sp(0, 0), sp(14, -4), sp(18, 6), sp(0, 42), sp(-14, 34)],
];

/// Child placements of each metatile type under one expansion, in the
/// expanded coordinate frame: (type, start, orientation).
const EXPANSIONS: [&[(Meta, Spot, Spot)]; 4] = [
    &[
        (Meta::H, sp(-4, 20), sp(1, 0)),
        (Meta::H, sp(2, 2), sp(1, 0)),
        (Meta::H, sp(8, 26), sp(0, -1)),
        (Meta::T, sp(6, 24), sp(-1, 0)),
        (Meta::P, sp(-8, 16), sp(1, 0)),
        (Meta::P, sp(4, 34), sp(0, -1)),
        (Meta::P, sp(6, 0), sp(1, -1)),
        (Meta::F, sp(-10, 38), sp(-1, 1)),
        (Meta::F, sp(-10, 44), sp(0, -1)),
        (Meta::F, sp(-4, 2), sp(1, 0)),
        (Meta::F, sp(2, 2), sp(0, -1)),
        (Meta::F, sp(26, 14), sp(1, 0)),
        (Meta::F, sp(32, 8), sp(-1, 1)),
    ],
    &[
        (Meta::H, sp(10, 10), sp(-1, 1)),
        (Meta::P, sp(-6, 0), sp(1, 0)),
        (Meta::P, sp(8, 14), sp(0, 1)),
        (Meta::P, sp(18, 6), sp(-1, 1)),
        (Meta::F, sp(-14, 34), sp(-1, 0)),
        (Meta::F, sp(-8, -2), sp(1, -1)),
        (Meta::F, sp(22, 4), sp(0, 1)),
    ],
    &[
        (Meta::H, sp(4, 22), sp(0, 1)),
        (Meta::H, sp(10, 10), sp(-1, 1)),
        (Meta::P, sp(-6, 0), sp(1, 0)),
        (Meta::P, sp(6, 24), sp(1, 0)),
        (Meta::P, sp(8, 14), sp(0, 1)),
        (Meta::F, sp(-20, 40), sp(1, -1)),
        (Meta::F, sp(-14, 34), sp(-1, 0)),
        (Meta::F, sp(-8, -2), sp(1, -1)),
        (Meta::F, sp(4, 46), sp(-1, 1)),
        (Meta::F, sp(10, 10), sp(1, 0)),
        (Meta::F, sp(16, 4), sp(-1, 1)),
    ],
    &[
        (Meta::H, sp(8, 20), sp(0, 1)),
        (Meta::H, sp(14, 8), sp(-1, 1)),
        (Meta::P, sp(10, 22), sp(1, 0)),
        (Meta::P, sp(12, 12), sp(0, 1)),
        (Meta::F, sp(-16, 38), sp(1, -1)),
        (Meta::F, sp(-10, 32), sp(-1, 0)),
        (Meta::F, sp(-4, 2), sp(1, 0)),
        (Meta::F, sp(2, 2), sp(0, -1)),
        (Meta::F, sp(8, 44), sp(-1, 1)),
        (Meta::F, sp(14, 8), sp(1, 0)),
        (Meta::F, sp(20, 2), sp(-1, 1)),
    ],
];

/// Hats within each metatile type: (start, orientation, reversed). The
/// reversed hat is the reflected one, and only H contains it.
const HAT_PLACEMENTS: [&[(Spot, Spot, bool)]; 4] = [
    &[
        (sp(6, 0), sp(1, 0), false),
        (sp(6, 6), sp(0, -1), false),
        (sp(0, 12), sp(1, 0), false),
        (sp(0, 6), sp(-1, 0), true),
    ],
    &[(sp(-2, 10), sp(-1, 1), false)],
    &[(sp(-2, 10), sp(-1, 1), false), (sp(-2, 16), sp(0, 1), false)],
    &[(sp(0, 6), sp(-1, 1), false), (sp(0, 12), sp(0, 1), false)],
];

/// Centres of the eight kites making up a hat at the origin with
/// orientation `(1, 0)`.
const REFERENCE_KITE_CENTRES: [Spot; 8] = [
    sp(-7, 5),
    sp(-5, 4),
    sp(-5, 1),
    sp(-4, -1),
    sp(-1, -1),
    sp(-2, 1),
    sp(-1, 2),
    sp(1, 1),
];

/// A metatile somewhere in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Placement {
    kind: Meta,
    start: Spot,
    orient: Spot,
}

impl Placement {
    fn initial(kind: Meta) -> Placement {
        Placement { kind, start: sp(0, 0), orient: sp(1, 0) }
    }

    fn map_vector(self, v: Spot) -> Spot {
        self.orient * v.x + self.orient.left6() * v.y
    }

    fn map_point(self, p: Spot) -> Spot {
        self.start + self.map_vector(p)
    }

    fn vertices(self, expanded: bool) -> Vec<Spot> {
        let table = if expanded { EXPANDED_VERTICES } else { VERTICES };
        table[self.kind as usize].iter().map(|&v| self.map_point(v)).collect()
    }

    fn expand(self) -> Vec<Placement> {
        EXPANSIONS[self.kind as usize]
            .iter()
            .map(|&(kind, start, orient)| Placement {
                kind,
                start: self.map_point(start),
                orient: self.map_vector(orient),
            })
            .collect()
    }

    fn hats(self) -> Vec<HatPlace> {
        HAT_PLACEMENTS[self.kind as usize]
            .iter()
            .map(|&(start, orient, reversed)| HatPlace {
                start: self.map_point(start),
                orient: self.map_vector(orient),
                reversed,
            })
            .collect()
    }
}

/// A single hat somewhere in the plane.
#[derive(Debug, Clone, Copy)]
struct HatPlace {
    start: Spot,
    orient: Spot,
    reversed: bool,
}

impl HatPlace {
    fn kite_centres(&self) -> [Spot; HAT_KITES] {
        let r = if self.reversed { self.orient.right6() } else { self.orient.left6() };
        REFERENCE_KITE_CENTRES.map(|v| self.start + self.orient * v.x + r * v.y)
    }
}

/// A tile of an expanded tiling, remembering where it came from: each
/// entry of `coords` is (index within the parent's expansion, the
/// parent's own first such index). Shared tiles record one entry per
/// parent that generated them.
struct SetTile {
    place: Placement,
    coords: Vec<(usize, usize)>,
}

#[derive(Default)]
struct VertexInfo {
    tiles: Vec<usize>,
    out: Option<Spot>,
}

fn map_vertex(
    vmap: &mut BTreeMap<Spot, VertexInfo>,
    v: Spot,
    out: Spot,
    queued: &mut [bool],
    queue: &mut VecDeque<usize>,
) {
    let Some(info) = vmap.get_mut(&v) else { return };
    if info.out.is_some() {
        return;
    }
    info.out = Some(out);
    for &t in &info.tiles {
        if !queued[t] {
            queued[t] = true;
            queue.push_back(t);
        }
    }
}

/// Expands a set of metatiles into the next-generation set.
///
/// Child placements come out in arbitrary positions per parent, so the
/// parents have to be placed consistently in the expanded coordinate
/// frame first. That is done by flood fill: anchor one vertex of one
/// tile, then repeatedly place any tile sharing a vertex with an
/// already-placed one, using the known expanded location of the shared
/// vertex.
fn expand_set(tiles: &[SetTile]) -> Vec<SetTile> {
    let mut vmap: BTreeMap<Spot, VertexInfo> = BTreeMap::new();
    for (i, t) in tiles.iter().enumerate() {
        for v in t.place.vertices(false) {
            vmap.entry(v).or_default().tiles.push(i);
        }
    }

    let mut queued = vec![false; tiles.len()];
    let mut queue = VecDeque::new();
    if let Some(first) = tiles.first() {
        map_vertex(&mut vmap, first.place.start, sp(0, 0), &mut queued, &mut queue);
    }

    let mut out: BTreeMap<Placement, Vec<(usize, usize)>> = BTreeMap::new();
    while let Some(ti) = queue.pop_front() {
        let tile = &tiles[ti];
        let vi = tile.place.vertices(false);
        let mut vo = tile.place.vertices(true);

        let Some(offset) = vi.iter().zip(&vo).find_map(|(a, b)| {
            let mapped = vmap.get(a)?.out?;
            Some(mapped - *b)
        }) else {
            continue;
        };

        for (a, b) in vi.iter().zip(vo.iter_mut()) {
            *b = *b + offset;
            map_vertex(&mut vmap, *a, *b, &mut queued, &mut queue);
        }

        let moved = Placement { start: vo[0], ..tile.place };
        let parent_first = tile.coords.first().map_or(0, |c| c.0);
        for (i, child) in moved.expand().into_iter().enumerate() {
            out.entry(child).or_default().push((i, parent_first));
        }
    }

    out.into_iter().map(|(place, coords)| SetTile { place, coords }).collect()
}

/// The four ways of stepping from a kite to one of its neighbours:
/// rotation about the kite's hexagon centre, or reflection into the next
/// hexagon through the left or right edge midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KiteStep {
    Left,
    Right,
    ForwardLeft,
    ForwardRight,
}

const KITE_STEPS: [KiteStep; 4] =
    [KiteStep::Left, KiteStep::Right, KiteStep::ForwardLeft, KiteStep::ForwardRight];

/// Rounds to the nearest multiple of six, which recovers the hexagon
/// centre nearest a kite centre.
fn round6(x: i32) -> i32 {
    let sign = if x < 0 { -1 } else { 1 };
    sign * ((sign * x + 3) / 6) * 6
}

/// Applies a step to a kite identified by its centre point alone.
fn centre_step(k: Spot, step: KiteStep) -> Spot {
    let hex = sp(round6(k.x), round6(k.y));
    let offset = k - hex;
    match step {
        KiteStep::Left => hex + offset.left6(),
        KiteStep::Right => hex + offset.right6(),
        KiteStep::ForwardLeft => k + offset.left6() + offset,
        KiteStep::ForwardRight => k + offset.right6() + offset,
    }
}

/// One entry of the kitemap: the coordinates a step leads to, when it
/// stays within the same two-level expansion.
#[derive(Debug, Clone, Copy)]
struct KiteRef {
    kite: usize,
    hat: usize,
    meta: usize,
}

/// The derived adjacency tables for all four metatile types.
struct Tables {
    hats_in_metatile: [usize; 4],
    nchildren: [usize; 4],
    children: [Vec<Meta>; 4],
    /// Indexed by [`kitemap_index`]; `None` where the step leaves the
    /// expansion.
    kitemap: [Vec<Option<KiteRef>>; 4],
    /// Cyclic lists of equivalent (index, parent index) pairs for each
    /// tile of a double expansion; entries with no alternatives map to
    /// themselves.
    metamap: [Vec<(usize, usize)>; 4],
}

fn kitemap_index(step: KiteStep, kite: usize, hat: usize, meta: usize) -> usize {
    (kite + HAT_KITES * (hat + 4 * meta)) * 4 + step as usize
}

fn metamap_index(meta: usize, meta2: usize) -> usize {
    meta + MAX_EXPAND * meta2
}

fn kitemap_for(kind: Meta) -> Vec<Option<KiteRef>> {
    let gen0 = vec![SetTile { place: Placement::initial(kind), coords: Vec::new() }];
    let gen1 = expand_set(&gen0);

    let mut hats = Vec::new();
    for tile in &gen1 {
        let im = tile.coords.first().map_or(0, |c| c.0);
        for (ih, hp) in tile.place.hats().into_iter().enumerate() {
            hats.push((hp, ih, im));
        }
    }

    // All kite positions are taken relative to the first hat, which keeps
    // them near the hexagon lattice the step functions assume.
    let origin = hats[0].0.start;
    let mut list = Vec::new();
    for (hp, ih, im) in &hats {
        for (ik, c) in hp.kite_centres().into_iter().enumerate() {
            list.push((c - origin, ik, *ih, *im));
        }
    }

    let nmeta = gen1.len();
    let mut map = vec![None; 4 * HAT_KITES * 4 * nmeta];
    for &(pos, ik, ih, im) in &list {
        for step in KITE_STEPS {
            let dst = centre_step(pos, step);
            if let Some(&(_, dk, dh, dm)) = list.iter().find(|e| e.0 == dst) {
                map[kitemap_index(step, ik, ih, im)] =
                    Some(KiteRef { kite: dk, hat: dh, meta: dm });
            }
        }
    }
    map
}

fn metamap_for(kind: Meta) -> Vec<(usize, usize)> {
    let gen0 = vec![SetTile { place: Placement::initial(kind), coords: Vec::new() }];
    let gen1 = expand_set(&gen0);
    let gen2 = expand_set(&gen1);

    let mut map: Vec<(usize, usize)> =
        (0..MAX_EXPAND * gen1.len()).map(|j| (j % MAX_EXPAND, j / MAX_EXPAND)).collect();

    // Each grandchild reachable through several parents yields a cycle of
    // equivalent coordinate pairs.
    for tile in &gen2 {
        let keys: Vec<usize> =
            tile.coords.iter().map(|&(idx, pf)| metamap_index(idx, pf)).collect();
        let mut prev = keys[keys.len() - 1];
        for &k in &keys {
            map[prev] = (k % MAX_EXPAND, k / MAX_EXPAND);
            prev = k;
        }
    }
    map
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| Tables {
        hats_in_metatile: std::array::from_fn(|i| HAT_PLACEMENTS[i].len()),
        nchildren: std::array::from_fn(|i| EXPANSIONS[i].len()),
        children: std::array::from_fn(|i| {
            EXPANSIONS[i].iter().map(|&(k, _, _)| k).collect()
        }),
        kitemap: std::array::from_fn(|i| kitemap_for(Meta::ALL[i])),
        metamap: std::array::from_fn(|i| metamap_for(Meta::ALL[i])),
    })
}

/// A kite in the plane, tracked by all four of its vertices so the
/// enumeration can report exact hat outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Kite {
    centre: Spot,
    left: Spot,
    right: Spot,
    outer: Spot,
}

impl Kite {
    fn first() -> Kite {
        Kite { centre: sp(0, 0), left: sp(0, 3), right: sp(3, 0), outer: sp(2, 2) }
    }

    fn step_left(self) -> Kite {
        let rot = |p: Spot| self.centre + (p - self.centre).left6();
        Kite { centre: self.centre, left: rot(self.left), right: self.left, outer: rot(self.outer) }
    }

    fn step_right(self) -> Kite {
        let rot = |p: Spot| self.centre + (p - self.centre).right6();
        Kite { centre: self.centre, left: self.right, right: rot(self.right), outer: rot(self.outer) }
    }

    fn step_forward_left(self) -> Kite {
        let centre = self.left * 2 - self.centre;
        let right = self.left;
        let left = centre + (right - centre).left6();
        Kite { centre, left, right, outer: self.outer }
    }

    fn step_forward_right(self) -> Kite {
        let centre = self.right * 2 - self.centre;
        let left = self.right;
        let right = centre + (left - centre).right6();
        Kite { centre, left, right, outer: self.outer }
    }

    fn step(self, s: KiteStep) -> Kite {
        match s {
            KiteStep::Left => self.step_left(),
            KiteStep::Right => self.step_right(),
            KiteStep::ForwardLeft => self.step_forward_left(),
            KiteStep::ForwardRight => self.step_forward_right(),
        }
    }
}

/// How many recently visited kites the enumerator keeps. The awkward
/// row-to-row transitions step from the last kite but one.
const KE_NKEEP: usize = 4;

/// Boustrophedon enumeration of every kite in a `w` x `h` patch of coarse
/// grid squares, visiting each next kite adjacent to a recent one.
struct KiteEnum {
    recent: [Kite; KE_NKEEP],
    curr_index: usize,
    last_index: usize,
    last_step: KiteStep,
    state: u8,
    w: i32,
    h: i32,
    x: i32,
    y: i32,
}

impl KiteEnum {
    fn new(w: i32, h: i32) -> KiteEnum {
        KiteEnum {
            recent: [Kite::first(); KE_NKEEP],
            curr_index: 0,
            last_index: 0,
            last_step: KiteStep::Left,
            state: 1,
            w,
            h,
            x: 0,
            y: 0,
        }
    }

    fn curr(&self) -> Kite {
        self.recent[self.curr_index]
    }

    fn next(&mut self) -> bool {
        let lastbut1 = self.last_index;
        self.last_index = self.curr_index;
        self.curr_index = (self.curr_index + 1) % KE_NKEEP;

        let step;
        match self.state {
            // States 1-3 walk rightwards along the upper side of a grid
            // line, starting from a pointy kite end.
            1 => {
                step = KiteStep::ForwardRight;
                self.state = 2;
            }
            2 => {
                if self.x + 1 >= self.w {
                    step = KiteStep::ForwardRight;
                    self.state = 4;
                } else {
                    step = KiteStep::Right;
                    self.state = 3;
                    self.x += 1;
                }
            }
            3 => {
                step = KiteStep::Right;
                self.state = 1;
            }
            // We have just moved down into the next row, but the rightmost
            // kite of that row is not adjacent to anything emitted yet, so
            // emit the second-rightmost first ...
            4 => {
                step = KiteStep::Left;
                self.state = 5;
            }
            // ... and then the rightmost, relative to the last kite but
            // one (the state-2 kite, not the state-4 one).
            5 => {
                step = KiteStep::Right;
                self.last_index = lastbut1;
                self.state = 6;
            }
            // States 6-8 walk leftwards along the lower side of a line,
            // starting from a right-angled kite end.
            6 => {
                if self.x <= 0 {
                    if self.y + 1 >= self.h {
                        self.state = 0;
                        return false;
                    }
                    step = KiteStep::Right;
                    self.state = 9;
                    self.y += 1;
                } else {
                    step = KiteStep::ForwardRight;
                    self.state = 7;
                    self.x -= 1;
                }
            }
            7 => {
                step = KiteStep::Right;
                self.state = 8;
            }
            8 => {
                step = KiteStep::Right;
                self.state = 6;
            }
            // States 9-11 walk rightwards from a right-angled kite end;
            // no awkward transition this time.
            9 => {
                step = KiteStep::Right;
                self.state = 10;
            }
            10 => {
                step = KiteStep::Right;
                self.state = 11;
            }
            11 => {
                if self.x + 1 >= self.w {
                    // Row transition generating the rightmost kite of the
                    // new row directly from the previous state-9 kite.
                    step = KiteStep::ForwardRight;
                    self.last_index = lastbut1;
                    self.state = 12;
                } else {
                    step = KiteStep::ForwardRight;
                    self.state = 9;
                    self.x += 1;
                }
            }
            // States 12-14 walk leftwards along the upper edge of a grid
            // line, starting from a pointy kite end.
            12 => {
                step = KiteStep::ForwardRight;
                self.state = 13;
            }
            13 => {
                if self.x <= 0 {
                    if self.y + 1 >= self.h {
                        self.state = 0;
                        return false;
                    }
                    step = KiteStep::Left;
                    self.state = 1;
                    self.y += 1;
                } else {
                    step = KiteStep::Right;
                    self.state = 14;
                    self.x -= 1;
                }
            }
            14 => {
                step = KiteStep::Right;
                self.state = 12;
            }
            _ => return false,
        }

        self.last_step = step;
        self.recent[self.curr_index] = self.recent[self.last_index].step(step);
        true
    }
}

/// The combinatorial address of one kite: its index within a hat, the
/// hat's index within a metatile, and the metatile ancestry. `meta[i]` is
/// (type of the level, index within its parent), innermost first; `outer`
/// is the type of the first level whose own position is undetermined.
#[derive(Debug, Clone)]
struct HatCoords {
    kite: usize,
    hat: usize,
    meta: Vec<(Meta, usize)>,
    outer: Meta,
}

impl HatCoords {
    /// Total number of levels, counting the undetermined outermost one.
    fn len(&self) -> usize {
        3 + self.meta.len()
    }

    /// Type of metatile level `i` (level 0 is the innermost metatile).
    fn kind_at(&self, i: usize) -> Meta {
        if i < self.meta.len() { self.meta[i].0 } else { self.outer }
    }
}

/// Relative probability weights for ancestry choices, approximating the
/// limiting distribution of metatile types so that patches are close to
/// uniformly sampled from the infinite tiling.
struct ParentChoice {
    kind: Meta,
    index: usize,
    weight: u32,
}

const PROB_H: u32 = 10_000_000;
const PROB_T: u32 = 1_458_980;
const PROB_P: u32 = 7_082_039;
const PROB_F: u32 = 11_458_980;

const fn pc(kind: Meta, index: usize, weight: u32) -> ParentChoice {
    ParentChoice { kind, index, weight }
}

/// Positions each metatile type can occupy within a parent, restricted to
/// the subtiles that belong to that parent alone.
const PARENTS_H: &[ParentChoice] = &[
    pc(Meta::H, 0, PROB_H),
    pc(Meta::H, 1, PROB_H),
    pc(Meta::H, 2, PROB_H),
    pc(Meta::T, 0, PROB_T),
    pc(Meta::P, 0, PROB_P),
    pc(Meta::P, 1, PROB_P),
    pc(Meta::F, 0, PROB_F),
    pc(Meta::F, 1, PROB_F),
];
const PARENTS_T: &[ParentChoice] = &[pc(Meta::H, 3, PROB_H)];
const PARENTS_P: &[ParentChoice] = &[
    pc(Meta::H, 4, PROB_H),
    pc(Meta::H, 5, PROB_H),
    pc(Meta::H, 6, PROB_H),
    pc(Meta::P, 4, PROB_P),
    pc(Meta::F, 3, PROB_F),
];
const PARENTS_F: &[ParentChoice] = &[
    pc(Meta::H, 8, PROB_H),
    pc(Meta::H, 9, PROB_H),
    pc(Meta::H, 12, PROB_H),
    pc(Meta::P, 5, PROB_P),
    pc(Meta::P, 10, PROB_P),
    pc(Meta::F, 6, PROB_F),
    pc(Meta::F, 8, PROB_F),
    pc(Meta::F, 10, PROB_F),
];

const PARENTS: [&[ParentChoice]; 4] = [PARENTS_H, PARENTS_T, PARENTS_P, PARENTS_F];

/// Choices for the hat the enumeration starts inside, weighted the same
/// way.
const STARTING_HATS: &[ParentChoice] = &[
    pc(Meta::H, 0, PROB_H),
    pc(Meta::H, 1, PROB_H),
    pc(Meta::H, 2, PROB_H),
    pc(Meta::H, 3, PROB_H),
    pc(Meta::T, 0, PROB_P),
    pc(Meta::P, 0, PROB_P),
    pc(Meta::P, 1, PROB_P),
    pc(Meta::F, 0, PROB_F),
    pc(Meta::F, 1, PROB_F),
];

fn choose_weighted<'a>(rs: &mut RandomState, entries: &'a [ParentChoice]) -> &'a ParentChoice {
    let limit: u64 = entries.iter().map(|e| u64::from(e.weight)).sum();
    #[allow(clippy::cast_possible_truncation)]
    let mut value = rs.upto(limit as usize) as u64;
    for e in &entries[..entries.len() - 1] {
        if value < u64::from(e.weight) {
            return e;
        }
        value -= u64::from(e.weight);
    }
    &entries[entries.len() - 1]
}

/// Stepping context: the prototype coordinates shared by every kite of
/// the patch. Whenever a step needs an ancestry level nobody has asked
/// about before, the prototype grows, randomly if a random source is
/// present and deterministically otherwise.
struct HatContext<'a> {
    rs: Option<&'a mut RandomState>,
    prototype: HatCoords,
}

impl<'a> HatContext<'a> {
    fn random(rs: &'a mut RandomState) -> HatContext<'a> {
        let start = choose_weighted(rs, STARTING_HATS);
        let outer = start.kind;
        let hat = start.index;
        let kite = rs.upto(HAT_KITES);
        HatContext {
            rs: Some(rs),
            prototype: HatCoords { kite, hat, meta: Vec::new(), outer },
        }
    }

    fn fixed(prototype: HatCoords) -> HatContext<'static> {
        HatContext { rs: None, prototype }
    }

    fn initial_coords(&self) -> HatCoords {
        self.prototype.clone()
    }

    /// Extends `hc` to at least `n` levels, growing the prototype first
    /// if it has never been asked for that many.
    fn extend(&mut self, hc: &mut HatCoords, n: usize) {
        while self.prototype.len() < n {
            let outer = self.prototype.outer;
            let parent = match self.rs.as_deref_mut() {
                Some(rs) => choose_weighted(rs, PARENTS[outer as usize]),
                None => &PARENTS[outer as usize][0],
            };
            self.prototype.meta.push((outer, parent.index));
            self.prototype.outer = parent.kind;
        }

        while hc.len() < n {
            let i = hc.meta.len();
            hc.meta.push(self.prototype.meta[i]);
            hc.outer = self.prototype.kind_at(i + 1);
        }
    }
}

/// Tries to move to the adjacent kite without leaving the two innermost
/// metatile levels.
fn step_kitemap(ctx: &mut HatContext, hc: &mut HatCoords, step: KiteStep) -> Option<HatCoords> {
    ctx.extend(hc, 4);
    let t = tables();
    let meta = hc.meta[0].1;
    let meta2type = hc.kind_at(1);
    let ke = t.kitemap[meta2type as usize][kitemap_index(step, hc.kite, hc.hat, meta)]?;

    let mut out = hc.clone();
    out.meta[0] = (t.children[meta2type as usize][ke.meta], ke.meta);
    out.hat = ke.hat;
    out.kite = ke.kite;
    Some(out)
}

/// Tries rewriting the ancestry at metatile levels `depth-2` and
/// `depth-1` so that a kitemap step lower down can succeed. Cycles
/// through every equivalent pair of coordinates, recursing down after
/// each rewrite; gives up (for the caller to try a level higher) once the
/// cycle closes.
fn step_metamap(
    ctx: &mut HatContext,
    hc: &mut HatCoords,
    step: KiteStep,
    depth: usize,
) -> Option<HatCoords> {
    ctx.extend(hc, depth + 3);
    let t = tables();
    let d = depth - 2;
    let meta_orig = hc.meta[d].1;
    let meta2_orig = hc.meta[d + 1].1;
    let meta3type = hc.kind_at(d + 2);

    let mut meta = meta_orig;
    let mut meta2 = meta2_orig;
    let mut tmp: Option<HatCoords> = None;

    loop {
        let res = {
            let curr = match tmp.as_mut() {
                Some(c) => c,
                None => &mut *hc,
            };
            if depth > 2 {
                step_metamap(ctx, curr, step, depth - 1)
            } else {
                step_kitemap(ctx, curr, step)
            }
        };
        if res.is_some() {
            return res;
        }

        let (m, m2) = t.metamap[meta3type as usize][metamap_index(meta, meta2)];
        if m == meta_orig && m2 == meta2_orig {
            return None;
        }
        meta = m;
        meta2 = m2;

        // Rewrites must go in a copy: a deeper metamap rewrite may have
        // touched one of the two levels we are cycling through.
        let work = tmp.get_or_insert_with(|| hc.clone());
        let kind2 = t.children[meta3type as usize][meta2];
        work.meta[d + 1] = (kind2, meta2);
        work.meta[d] = (t.children[kind2 as usize][meta], meta);
    }
}

/// Finds the coordinates of the kite one step away, rewriting as few
/// ancestry levels as possible.
fn coords_step(ctx: &mut HatContext, hc: &mut HatCoords, step: KiteStep) -> HatCoords {
    if let Some(out) = step_kitemap(ctx, hc, step) {
        return out;
    }
    let mut depth = 2;
    loop {
        if let Some(out) = step_metamap(ctx, hc, step, depth) {
            return out;
        }
        depth += 1;
    }
}

/// The serialisable form of a patch: every ancestry index of the
/// prototype coordinates, plus the type of the outermost level reached.
struct PatchParams {
    coords: Vec<u8>,
    final_metatile: Meta,
}

/// Walks the whole patch once, making random ancestry choices as the
/// prototype grows, then records the prototype.
fn randomise(w: i32, h: i32, rs: &mut RandomState) -> PatchParams {
    let mut ctx = HatContext::random(rs);
    let mut coords: [Option<HatCoords>; KE_NKEEP] = [const { None }; KE_NKEEP];

    let mut s = KiteEnum::new(w, h);
    coords[s.curr_index] = Some(ctx.initial_coords());

    while s.next() {
        let mut prev = coords[s.last_index].take();
        if let Some(p) = prev.as_mut() {
            coords[s.curr_index] = Some(coords_step(&mut ctx, p, s.last_step));
        }
        coords[s.last_index] = prev;
    }

    let proto = &ctx.prototype;
    let mut out = Vec::with_capacity(proto.len() - 1);
    #[allow(clippy::cast_possible_truncation)]
    {
        out.push(proto.kite as u8);
        out.push(proto.hat as u8);
        for &(_, idx) in &proto.meta {
            out.push(idx as u8);
        }
    }
    PatchParams { coords: out, final_metatile: proto.outer }
}

/// Validates patch parameters and reconstructs the prototype coordinates.
fn coords_from_params(p: &PatchParams) -> Result<HatCoords, GridError> {
    let bad = |reason: &str| GridError::BadDescription { reason: reason.to_owned() };

    if p.coords.len() < 3 {
        return Err(bad("grid description needs at least three coordinates"));
    }
    if usize::from(p.coords[0]) >= HAT_KITES {
        return Err(bad("invalid kite index in grid description"));
    }

    let t = tables();
    let mut kinds = vec![p.final_metatile; p.coords.len()];
    let mut mt = p.final_metatile;
    for i in (2..p.coords.len()).rev() {
        let idx = usize::from(p.coords[i]);
        if idx >= t.nchildren[mt as usize] {
            return Err(bad("invalid metatile index in grid description"));
        }
        mt = t.children[mt as usize][idx];
        kinds[i] = mt;
    }
    if usize::from(p.coords[1]) >= t.hats_in_metatile[mt as usize] {
        return Err(bad("invalid hat index in grid description"));
    }

    Ok(HatCoords {
        kite: usize::from(p.coords[0]),
        hat: usize::from(p.coords[1]),
        meta: (2..p.coords.len()).map(|i| (kinds[i], usize::from(p.coords[i]))).collect(),
        outer: p.final_metatile,
    })
}

/// Walks the patch again with fixed parameters, reporting each hat whose
/// outline lies entirely within bounds. Coordinates are converted to the
/// orthogonal external system: x proportional to `2vx + vy`, y to `vy`.
fn generate<F: FnMut(&[(i32, i32); HAT_VERTICES])>(
    prototype: HatCoords,
    w: i32,
    h: i32,
    mut emit: F,
) {
    let mut ctx = HatContext::fixed(prototype);
    let mut coords: [Option<HatCoords>; KE_NKEEP] = [const { None }; KE_NKEEP];

    let mut s = KiteEnum::new(w, h);
    coords[s.curr_index] = Some(ctx.initial_coords());
    if let Some(hc) = &coords[s.curr_index] {
        maybe_emit_hat(w, h, s.curr(), hc, &mut emit);
    }

    while s.next() {
        let mut prev = coords[s.last_index].take();
        if let Some(p) = prev.as_mut() {
            let next = coords_step(&mut ctx, p, s.last_step);
            maybe_emit_hat(w, h, s.curr(), &next, &mut emit);
            coords[s.curr_index] = Some(next);
        }
        coords[s.last_index] = prev;
    }
}

/// Reports the outline of the hat containing `kite`, once per hat: only
/// kite #0 triggers a report. Walks the other seven kites of the hat to
/// collect the fourteen outline vertices.
fn maybe_emit_hat<F: FnMut(&[(i32, i32); HAT_VERTICES])>(
    w: i32,
    h: i32,
    mut kite: Kite,
    hc: &HatCoords,
    emit: &mut F,
) {
    if hc.kite != 0 {
        return;
    }

    // Reflected hats are always hat #3 of an H metatile. Swapping the
    // starting kite's left and right vertices mirrors the walk below.
    let reversed = hc.kind_at(0) == Meta::H && hc.hat == 3;
    if reversed {
        std::mem::swap(&mut kite.left, &mut kite.right);
    }

    let mut v = [Spot::default(); HAT_VERTICES];
    let mut k = kite;
    v[0] = k.centre;
    v[1] = k.right;
    v[2] = k.outer;
    v[3] = k.left;
    k = k.step_left(); // kite #1
    k = k.step_forward_right(); // kite #2
    v[4] = k.centre;
    k = k.step_right(); // kite #3
    v[5] = k.right;
    v[6] = k.outer;
    k = k.step_forward_left(); // kite #4
    v[7] = k.left;
    v[8] = k.centre;
    k = k.step_right(); // kite #5
    k = k.step_right(); // kite #6
    k = k.step_right(); // kite #7
    v[9] = k.right;
    v[10] = k.outer;
    v[11] = k.left;
    k = k.step_left(); // kite #6 again
    v[12] = k.outer;
    v[13] = k.left;

    if reversed {
        // Keep every reported polygon in a consistent winding.
        v.reverse();
    }

    let mut out = [(0_i32, 0_i32); HAT_VERTICES];
    for (o, p) in out.iter_mut().zip(&v) {
        let x = (p.x * 2 + p.y) / 3;
        let y = p.y;
        if x < 0 || x > XSQUARELEN * w || y < 0 || y > YSQUARELEN * h {
            return; // a vertex of this hat is out of bounds
        }
        *o = (x, y);
    }
    emit(&out);
}

pub(crate) fn size(width: i32, height: i32) -> GridSize {
    GridSize {
        tilesize: HATS_TILESIZE,
        xextent: width * XUNIT * XSQUARELEN,
        yextent: height * YUNIT * YSQUARELEN,
    }
}

fn parse_desc(desc: &str) -> Result<PatchParams, GridError> {
    let bad = |reason: &str| GridError::BadDescription { reason: reason.to_owned() };

    let mut coords = Vec::new();
    let mut rest = desc;
    loop {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            break;
        }
        if digits > 2 {
            return Err(bad("too-large coordinate in grid description"));
        }
        let (num, tail) = rest.split_at(digits);
        let n: u8 = num.parse().map_err(|_| bad("unreadable coordinate in grid description"))?;
        rest = tail
            .strip_prefix(',')
            .ok_or_else(|| bad("expected ',' in grid description"))?;
        coords.push(n);
    }

    let mut chars = rest.chars();
    let final_metatile = chars
        .next()
        .and_then(Meta::from_letter)
        .ok_or_else(|| bad("invalid character in grid description"))?;
    if chars.next().is_some() {
        return Err(bad("trailing junk in grid description"));
    }

    Ok(PatchParams { coords, final_metatile })
}

pub(crate) fn new_desc(width: i32, height: i32, rs: &mut RandomState) -> String {
    let p = randomise(width, height, rs);
    let mut desc: String = p.coords.iter().map(|c| format!("{c},")).collect();
    desc.push(p.final_metatile.letter());
    desc
}

pub(crate) fn validate_desc(_width: i32, _height: i32, desc: &str) -> Result<(), GridError> {
    let params = parse_desc(desc)?;
    coords_from_params(&params).map(|_| ())
}

pub(crate) fn build(width: i32, height: i32, desc: &str) -> Result<Grid, GridError> {
    let params = parse_desc(desc)?;
    let prototype = coords_from_params(&params)?;

    let mut builder = GridBuilder::new(HATS_TILESIZE);
    generate(prototype, width, height, |outline| {
        let pts: Vec<(i32, i32)> =
            outline.iter().map(|&(x, y)| (x * XUNIT, y * YUNIT)).collect();
        builder.add_face(&pts);
    });

    if builder.num_faces() == 0 {
        return Err(GridError::Empty);
    }
    builder.trim_vigorously();
    builder.build()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn derived_tables_match_the_substitution_system() {
        let t = tables();
        assert_eq!(t.hats_in_metatile, [4, 1, 2, 2]);
        assert_eq!(t.nchildren, [13, 7, 11, 11]);
        // The T metatile expands to one H, three P and three F.
        assert_eq!(
            t.children[Meta::T as usize],
            vec![Meta::H, Meta::P, Meta::P, Meta::P, Meta::F, Meta::F, Meta::F]
        );
        // Kitemap entries always point at real coordinates.
        for kind in Meta::ALL {
            let nmeta = t.nchildren[kind as usize];
            for entry in t.kitemap[kind as usize].iter().flatten() {
                assert!(entry.kite < HAT_KITES);
                assert!(entry.hat < 4);
                assert!(entry.meta < nmeta);
            }
        }
    }

    #[test]
    fn centre_rotation_has_order_six() {
        let k = sp(-7, 5);
        let mut p = k;
        for _ in 0..6 {
            p = centre_step(p, KiteStep::Left);
        }
        assert_eq!(p, k);
        assert_eq!(centre_step(centre_step(k, KiteStep::Left), KiteStep::Right), k);
    }

    #[test]
    fn kite_steps_invert() {
        let k = Kite::first();
        assert_eq!(k.step_left().step_right(), k);
        assert_eq!(k.step_forward_right().step_forward_left(), k);
        assert_eq!(k.step_forward_left().step_forward_right(), k);
    }

    #[test]
    fn kite_enumeration_never_revisits() {
        let mut s = KiteEnum::new(2, 2);
        let mut seen = BTreeSet::new();
        let key = |k: Kite| (k.centre, k.left);
        seen.insert(key(s.curr()));
        while s.next() {
            assert!(seen.insert(key(s.curr())), "kite visited twice");
        }
        assert!(seen.len() > 32);
    }

    #[test]
    fn generated_descs_validate_and_build() {
        let mut rs = RandomState::from_seed(b"hats");
        let desc = new_desc(2, 2, &mut rs);
        validate_desc(2, 2, &desc).unwrap();

        let g = build(2, 2, &desc).unwrap();
        assert!(!g.faces.is_empty());
        assert_eq!(g.edges.len(), g.faces.len() + g.dots.len() - 1);
        assert!(g.faces.iter().all(|f| f.order() == HAT_VERTICES));
    }

    #[test]
    fn fixed_desc_builds_deterministically() {
        let a = build(3, 3, "0,0,0,H").unwrap();
        let b = build(3, 3, "0,0,0,H").unwrap();
        assert_eq!(a.faces.len(), b.faces.len());
        assert_eq!(a.dots.len(), b.dots.len());
        assert!(a.faces.iter().all(|f| f.order() == HAT_VERTICES));
    }

    #[test]
    fn malformed_descs_are_rejected() {
        assert!(validate_desc(2, 2, "H").is_err());
        assert!(validate_desc(2, 2, "1,2,3").is_err());
        assert!(validate_desc(2, 2, "9,0,0,H").is_err());
        assert!(validate_desc(2, 2, "0,0,100,H").is_err());
        assert!(validate_desc(2, 2, "1,2,3,Q").is_err());
        assert!(validate_desc(2, 2, "0,0,0,HH").is_err());
    }
}
