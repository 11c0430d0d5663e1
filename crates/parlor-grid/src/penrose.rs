//! Penrose tilings (P2 kite/dart and P3 rhombus forms).
//!
//! Generation works by recursive subdivision of half-tiles: a large
//! isosceles triangle is carved into smaller half-kites and half-darts (or
//! half-rhombi), down to a fixed depth, and the whole-tile halves are
//! stitched back together on emission. The triangle is big enough to cover
//! a circle from which any window of the infinite tiling can be cut, so a
//! grid description just records the window: `G<xoff>,<yoff>,<aoff>` with
//! the offsets in grid units and the angle a multiple of 36 degrees.
//!
//! Vectors are expressed exactly as integer combinations of four unit
//! basis vectors at 36-degree spacing, so that coincident tile corners
//! have identical coordinates; floating point only enters at the final
//! projection to window coordinates.

use parlor_core::RandomState;

use crate::grid::{Grid, GridBuilder, GridError};
use crate::tilings::{GridSize, GridType};

pub(crate) const PENROSE_TILESIZE: i32 = 100;

const PHI: f64 = 1.618_033_988_749_895;
/// Radius of the circle inscribed in the start triangle, as a fraction of
/// its long side (phi^-3 less a 5% safety margin).
const INCIRCLE_RADIUS: f64 = 0.22426;

const COS54: f64 = 0.587_785_2;
const SIN54: f64 = 0.809_016_9;
const COS18: f64 = 0.951_056_5;
const SIN18: f64 = 0.309_016_9;

/// A vector in the 36-degree basis: `a*A + b*B + c*C + d*D` where A..D are
/// unit vectors at -54, -18, 18 and 54 degrees from the x axis. The fifth
/// clock direction E equals (-1,1,-1,1), which is why four coordinates
/// suffice and equality testing is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Vector {
    a: i32,
    b: i32,
    c: i32,
    d: i32,
}

impl Vector {
    fn x(self) -> f64 {
        f64::from(self.a + self.d) * COS54 + f64::from(self.b + self.c) * COS18
    }

    fn y(self) -> f64 {
        f64::from(self.a - self.d) * SIN54 + f64::from(self.b - self.c) * SIN18
    }

    fn add(self, o: Vector) -> Vector {
        Vector {
            a: self.a + o.a,
            b: self.b + o.b,
            c: self.c + o.c,
            d: self.d + o.d,
        }
    }

    /// One 36-degree notch clockwise: (a,b,c,d) maps to aB + bC + cD + dE
    /// with E substituted back into the basis.
    fn rotate_36(self) -> Vector {
        Vector {
            a: -self.d,
            b: self.d + self.a,
            c: -self.d + self.b,
            d: self.d + self.c,
        }
    }

    fn rotate(self, ang: i32) -> Vector {
        debug_assert_eq!(ang % 36, 0);
        let steps = ((360 - ang.rem_euclid(360)) / 36) % 10;
        let mut v = self;
        for _ in 0..steps {
            v = v.rotate_36();
        }
        v
    }

    /// Same direction, length multiplied by phi: rotate(1) - rotate(4).
    fn grow_phi(self) -> Vector {
        Vector {
            a: self.a + self.b - self.d,
            b: self.c + self.d,
            c: self.a + self.b,
            d: self.c + self.d - self.a,
        }
    }

    /// Same direction, length divided by phi: rotate(2) - rotate(3).
    fn shrink_phi(self) -> Vector {
        Vector {
            a: self.b - self.d,
            b: self.c + self.d - self.b,
            c: self.a + self.b - self.c,
            d: self.c - self.a,
        }
    }
}

struct Subdivider<'a, F: FnMut([Vector; 4])> {
    max_depth: usize,
    emit: &'a mut F,
}

impl<F: FnMut([Vector; 4])> Subdivider<'_, F> {
    /// Half-kite (P2). Only the positive-flip half emits the assembled
    /// whole tile; its mirror twin would duplicate it.
    fn p2_large(&mut self, depth: usize, flip: i32, orig: Vector, edge: Vector) {
        if flip > 0 && depth == self.max_depth {
            (self.emit)([
                orig,
                orig.add(edge.rotate(-36)),
                orig.add(edge),
                orig.add(edge.rotate(36)),
            ]);
        }
        if depth >= self.max_depth {
            return;
        }

        let vv_orig = orig.add(edge.rotate(-36 * flip));
        let vv_edge = edge.rotate(108 * flip);

        self.p2_small(depth + 1, flip, orig, edge.shrink_phi());
        self.p2_large(depth + 1, flip, vv_orig, vv_edge.shrink_phi());
        self.p2_large(depth + 1, -flip, vv_orig, vv_edge.shrink_phi());
    }

    /// Half-dart (P2).
    fn p2_small(&mut self, depth: usize, flip: i32, orig: Vector, edge: Vector) {
        if flip > 0 && depth == self.max_depth {
            (self.emit)([
                orig,
                orig.add(edge.rotate(-72)),
                orig.add(edge.shrink_phi().rotate(-36)),
                orig.add(edge),
            ]);
        }
        if depth >= self.max_depth {
            return;
        }

        let vv_orig = orig.add(edge);
        self.p2_large(
            depth + 1,
            -flip,
            orig,
            edge.rotate(-36 * flip).shrink_phi(),
        );
        self.p2_small(
            depth + 1,
            flip,
            vv_orig,
            edge.rotate(-144 * flip).shrink_phi(),
        );
    }

    /// Half of a thick rhombus (P3).
    fn p3_large(&mut self, depth: usize, flip: i32, orig: Vector, edge: Vector) {
        if flip > 0 && depth == self.max_depth {
            (self.emit)([
                orig,
                orig.add(edge.rotate(-36)),
                orig.add(edge.grow_phi()),
                orig.add(edge.rotate(36)),
            ]);
        }
        if depth >= self.max_depth {
            return;
        }

        let vv_orig = orig.add(edge);
        self.p3_large(depth + 1, -flip, vv_orig, edge.rotate(180).shrink_phi());
        self.p3_small(
            depth + 1,
            flip,
            vv_orig,
            edge.rotate(-108 * flip).shrink_phi(),
        );

        let vv_orig = orig.add(edge.grow_phi());
        self.p3_large(
            depth + 1,
            flip,
            vv_orig,
            edge.rotate(-144 * flip).shrink_phi(),
        );
    }

    /// Half of a thin rhombus (P3).
    fn p3_small(&mut self, depth: usize, flip: i32, orig: Vector, edge: Vector) {
        if flip > 0 && depth == self.max_depth {
            let v3 = orig.add(edge);
            (self.emit)([orig, orig.add(edge.rotate(-36)), v3.add(edge.rotate(-36)), v3]);
        }
        if depth >= self.max_depth {
            return;
        }

        // Identical to the first two children of p3_large.
        let vv_orig = orig.add(edge);
        self.p3_large(depth + 1, -flip, vv_orig, edge.rotate(180).shrink_phi());
        self.p3_small(
            depth + 1,
            flip,
            vv_orig,
            edge.rotate(-108 * flip).shrink_phi(),
        );
    }
}

/// Runs the subdivision over the whole start triangle, rotated by `angle`.
fn run<F: FnMut([Vector; 4])>(
    which: GridType,
    start_size: i32,
    max_depth: usize,
    angle: i32,
    emit: &mut F,
) {
    // Start triangle: incentre at the origin, apex at phi^-2 * (B+C),
    // unit edge along B.
    let mut vo = Vector {
        a: 0,
        b: -start_size,
        c: -start_size,
        d: 0,
    };
    vo = vo.shrink_phi().shrink_phi();
    let vb = Vector {
        a: 0,
        b: start_size,
        c: 0,
        d: 0,
    };

    let vo = vo.rotate(angle);
    let vb = vb.rotate(angle);

    let mut sub = Subdivider { max_depth, emit };
    if which == GridType::PenroseP2 {
        sub.p2_large(0, 1, vo, vb);
    } else {
        sub.p3_small(0, 1, vo, vb);
    }
}

/// Start-triangle scale and subdivision depth needed so the final tiles
/// have unit edge length and the inscribed circle covers the requested
/// window at any offset and rotation.
fn calculate_size(which: GridType, tilesize: i32, w: i32, h: i32) -> (f64, i32, usize) {
    // Aesthetic fudge: scale P2 and P3 tiles slightly differently.
    let tilesize = if which == GridType::PenroseP2 {
        tilesize * 3 / 2
    } else {
        tilesize * 5 / 4
    };

    let rradius = f64::from(tilesize) * 3.11 * f64::from(w * w + h * h).sqrt();
    let mut size = f64::from(tilesize);
    let mut depth = 0;
    while size * INCIRCLE_RADIUS < rradius {
        depth += 1;
        size *= PHI;
    }
    #[allow(clippy::cast_possible_truncation)]
    (rradius, size as i32, depth)
}

fn inner_radius(which: GridType, w: i32, h: i32) -> i32 {
    let (outer, _, _) = calculate_size(which, PENROSE_TILESIZE, w, h);
    #[allow(clippy::cast_possible_truncation)]
    let r = (outer - f64::from(w * w + h * h).sqrt()) as i32;
    r
}

pub(crate) fn size(_which: GridType, width: i32, height: i32) -> GridSize {
    GridSize {
        tilesize: PENROSE_TILESIZE,
        xextent: PENROSE_TILESIZE * width,
        yextent: PENROSE_TILESIZE * height,
    }
}

fn parse_desc(desc: &str) -> Result<(i32, i32, i32), GridError> {
    let bad = || GridError::BadDescription {
        reason: "invalid format grid description string".to_owned(),
    };
    let rest = desc.strip_prefix('G').ok_or_else(bad)?;
    let mut nums = rest.split(',').map(str::parse::<i32>);
    let xoff = nums.next().ok_or_else(bad)?.map_err(|_| bad())?;
    let yoff = nums.next().ok_or_else(bad)?.map_err(|_| bad())?;
    let aoff = nums.next().ok_or_else(bad)?.map_err(|_| bad())?;
    if nums.next().is_some() {
        return Err(bad());
    }
    Ok((xoff, yoff, aoff))
}

/// Picks a random window of the tiling, retrying until the window actually
/// yields a usable grid.
pub(crate) fn new_desc(which: GridType, width: i32, height: i32, rs: &mut RandomState) -> String {
    let ir = inner_radius(which, width, height);
    loop {
        let (mut xoff, mut yoff);
        loop {
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            {
                xoff = rs.upto(2 * ir as usize) as i32 - ir;
                yoff = rs.upto(2 * ir as usize) as i32 - ir;
            }
            if f64::from(xoff * xoff + yoff * yoff).sqrt() <= f64::from(ir) {
                break;
            }
        }
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let aoff = rs.upto(360 / 36) as i32 * 36;

        let desc = format!("G{xoff},{yoff},{aoff}");
        if try_build(which, width, height, &desc).is_ok() {
            return desc;
        }
    }
}

pub(crate) fn validate_desc(
    which: GridType,
    width: i32,
    height: i32,
    desc: &str,
) -> Result<(), GridError> {
    let (xoff, yoff, aoff) = parse_desc(desc)?;
    let ir = inner_radius(which, width, height);
    if f64::from(xoff * xoff + yoff * yoff).sqrt() > f64::from(ir) {
        return Err(GridError::BadDescription {
            reason: "patch offset out of bounds".to_owned(),
        });
    }
    if aoff % 36 != 0 || !(0..360).contains(&aoff) {
        return Err(GridError::BadDescription {
            reason: "angle offset out of bounds".to_owned(),
        });
    }
    try_build(which, width, height, desc).map_err(|_| GridError::BadDescription {
        reason: "patch coordinates do not identify a usable grid fragment".to_owned(),
    })?;
    Ok(())
}

pub(crate) fn build(
    which: GridType,
    width: i32,
    height: i32,
    desc: &str,
) -> Result<Grid, GridError> {
    try_build(which, width, height, desc)
}

fn round_nearest_away(r: f64) -> i32 {
    #[allow(clippy::cast_possible_truncation)]
    let v = if r > 0.0 { (r + 0.5).floor() } else { (r - 0.5).ceil() } as i32;
    v
}

fn try_build(which: GridType, width: i32, height: i32, desc: &str) -> Result<Grid, GridError> {
    let (xoff, yoff, aoff) = parse_desc(desc)?;
    let (_, start_size, max_depth) =
        calculate_size(which, PENROSE_TILESIZE, width, height);

    let (xsz, ysz) = (width * PENROSE_TILESIZE, height * PENROSE_TILESIZE);
    let (xmin, xmax) = (xoff - xsz / 2, xoff + xsz / 2);
    let (ymin, ymax) = (yoff - ysz / 2, yoff + ysz / 2);

    let mut builder = GridBuilder::new(PENROSE_TILESIZE);
    run(which, start_size, max_depth, aoff, &mut |vs: [Vector; 4]| {
        let mut pts = [(0, 0); 4];
        for (p, v) in pts.iter_mut().zip(&vs) {
            let (x, y) = (round_nearest_away(v.x()), round_nearest_away(v.y()));
            if !(xmin..=xmax).contains(&x) || !(ymin..=ymax).contains(&y) {
                return;
            }
            *p = (x, y);
        }
        builder.add_face(&pts);
    });

    if builder.num_faces() == 0 {
        return Err(GridError::Empty);
    }
    builder.trim_vigorously();
    let mut grid = builder.build()?;

    // Centre the surviving patch in the window it was promised.
    grid.lowest_x -= ((xmax - xmin) - (grid.highest_x - grid.lowest_x)) / 2;
    grid.highest_x = grid.lowest_x + (xmax - xmin);
    grid.lowest_y -= ((ymax - ymin) - (grid.highest_y - grid.lowest_y)) / 2;
    grid.highest_y = grid.lowest_y + (ymax - ymin);

    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_has_order_ten() {
        let mut v = Vector { a: 0, b: 1, c: 0, d: 0 };
        for _ in 0..10 {
            v = v.rotate_36();
        }
        assert_eq!(v, Vector { a: 0, b: 1, c: 0, d: 0 });
    }

    #[test]
    fn grow_and_shrink_are_inverse()  {
        let v = Vector { a: 3, b: -2, c: 7, d: 1 };
        assert_eq!(v.grow_phi().shrink_phi(), v);
        assert_eq!(v.shrink_phi().grow_phi(), v);
    }

    #[test]
    fn grow_phi_scales_length_by_phi() {
        let v = Vector { a: 1, b: 2, c: 0, d: -1 };
        let len = |v: Vector| (v.x() * v.x() + v.y() * v.y()).sqrt();
        let ratio = len(v.grow_phi()) / len(v);
        assert!((ratio - PHI).abs() < 1e-4);
    }

    #[test]
    fn desc_parsing_round_trips() {
        assert_eq!(parse_desc("G-12,34,108").unwrap(), (-12, 34, 108));
        assert!(parse_desc("12,34,108").is_err());
        assert!(parse_desc("G12,34").is_err());
        assert!(parse_desc("G12,34,1,2").is_err());
    }

    #[test]
    fn p2_grid_builds_and_is_consistent() {
        let g = try_build(GridType::PenroseP2, 3, 3, "G0,0,0").unwrap();
        assert!(!g.faces.is_empty());
        assert_eq!(g.edges.len(), g.faces.len() + g.dots.len() - 1);
        // All faces are whole kites or darts.
        assert!(g.faces.iter().all(|f| f.order() == 4));
    }

    #[test]
    fn p3_grid_builds_and_is_consistent() {
        let g = try_build(GridType::PenroseP3, 3, 3, "G0,0,36").unwrap();
        assert!(!g.faces.is_empty());
        assert!(g.faces.iter().all(|f| f.order() == 4));
    }

    #[test]
    fn generated_descs_validate() {
        let mut rs = RandomState::from_seed(b"42");
        for which in [GridType::PenroseP2, GridType::PenroseP3] {
            let desc = new_desc(which, 3, 3, &mut rs);
            validate_desc(which, 3, 3, &desc).unwrap();
        }
    }

    #[test]
    fn window_is_honoured() {
        let g = try_build(GridType::PenroseP2, 3, 3, "G0,0,0").unwrap();
        assert_eq!(g.highest_x - g.lowest_x, 300);
        assert_eq!(g.highest_y - g.lowest_y, 300);
    }
}
