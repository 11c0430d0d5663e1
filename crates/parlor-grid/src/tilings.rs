//! The catalogue of supported tilings.
//!
//! Each periodic tiling is generated by walking a rectangle of unit cells
//! and emitting the faces belonging to each cell, with guard conditions
//! keeping border cells from producing faces that would stick out of the
//! rectangle. All coordinates are exact integers so that shared corners
//! coincide precisely; the side-length constants are integer pairs chosen
//! to approximate the necessary irrational ratios (e.g. 15/26 for sqrt(3),
//! 29/41 for sqrt(2)).
//!
//! The aperiodic tilings (both Penrose variants and the hat monotile) live
//! in their own modules and are reached through the same [`GridType`]
//! dispatch; they are the only types that carry a grid description string.

use std::sync::Arc;

use parlor_core::RandomState;

use crate::grid::{Grid, GridBuilder, GridError};
use crate::{hats, penrose};

/// Identifies one of the tilings a grid can be cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridType {
    /// Unit squares.
    Square,
    /// Regular hexagons.
    Honeycomb,
    /// Equilateral triangles.
    Triangular,
    /// Squares and triangles, snub square tiling.
    SnubSquare,
    /// Cairo pentagonal tiling.
    Cairo,
    /// Hexagons, squares and triangles (rhombitrihexagonal).
    GreatHexagonal,
    /// Hexagons and triangles (trihexagonal).
    Kagome,
    /// Octagons and diamonds (truncated square).
    Octagonal,
    /// Kites, six to a hexagon (deltoidal trihexagonal).
    Kites,
    /// Floret pentagonal tiling.
    Floret,
    /// Dodecagons and triangles (truncated hexagonal).
    Dodecagonal,
    /// Dodecagons, hexagons and squares (truncated trihexagonal).
    GreatDodecagonal,
    /// Second-order truncation with dodecagons, hexagons, squares and
    /// triangles.
    GreatGreatDodecagonal,
    /// Dodecagons with compass-point triangles around a central square.
    CompassDodecagonal,
    /// Penrose tiling, kite/dart form.
    PenroseP2,
    /// Penrose tiling, rhombus form.
    PenroseP3,
    /// The aperiodic hat monotile.
    Hats,
}

/// Preferred window geometry for a tiling at a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    /// Grid units per tile, for scaling to screen coordinates.
    pub tilesize: i32,
    /// Window width in grid units.
    pub xextent: i32,
    /// Window height in grid units.
    pub yextent: i32,
}

// Side-length constants per tiling. Each (a, b) pair approximates the
// irrational edge ratio the tiling needs.
const SQUARE_TILESIZE: i32 = 20;
const HONEY_TILESIZE: i32 = 45;
const HONEY_A: i32 = 15;
const HONEY_B: i32 = 26;
const TRIANGLE_TILESIZE: i32 = 18;
const TRIANGLE_VEC_X: i32 = 15;
const TRIANGLE_VEC_Y: i32 = 26;
const SNUBSQUARE_TILESIZE: i32 = 18;
const SNUBSQUARE_A: i32 = 15;
const SNUBSQUARE_B: i32 = 26;
const CAIRO_TILESIZE: i32 = 40;
const CAIRO_A: i32 = 14;
const CAIRO_B: i32 = 31;
const GREATHEX_TILESIZE: i32 = 18;
const GREATHEX_A: i32 = 15;
const GREATHEX_B: i32 = 26;
const KAGOME_TILESIZE: i32 = 18;
const KAGOME_A: i32 = 15;
const KAGOME_B: i32 = 26;
const OCTAGONAL_TILESIZE: i32 = 40;
const OCTAGONAL_A: i32 = 29;
const OCTAGONAL_B: i32 = 41;
const KITE_TILESIZE: i32 = 40;
const KITE_A: i32 = 15;
const KITE_B: i32 = 26;
const FLORET_TILESIZE: i32 = 150;
const FLORET_PX: i32 = 75;
const FLORET_PY: i32 = -26;
const DODEC_TILESIZE: i32 = 26;
const DODEC_A: i32 = 15;
const DODEC_B: i32 = 26;

impl GridType {
    /// Every supported tiling, in catalogue order.
    pub const ALL: [GridType; 17] = [
        GridType::Square,
        GridType::Honeycomb,
        GridType::Triangular,
        GridType::SnubSquare,
        GridType::Cairo,
        GridType::GreatHexagonal,
        GridType::Kagome,
        GridType::Octagonal,
        GridType::Kites,
        GridType::Floret,
        GridType::Dodecagonal,
        GridType::GreatDodecagonal,
        GridType::GreatGreatDodecagonal,
        GridType::CompassDodecagonal,
        GridType::PenroseP2,
        GridType::PenroseP3,
        GridType::Hats,
    ];

    /// Short lowercase name, used in encoded game parameters.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            GridType::Square => "square",
            GridType::Honeycomb => "honeycomb",
            GridType::Triangular => "triangular",
            GridType::SnubSquare => "snubsquare",
            GridType::Cairo => "cairo",
            GridType::GreatHexagonal => "greathexagonal",
            GridType::Kagome => "kagome",
            GridType::Octagonal => "octagonal",
            GridType::Kites => "kites",
            GridType::Floret => "floret",
            GridType::Dodecagonal => "dodecagonal",
            GridType::GreatDodecagonal => "greatdodecagonal",
            GridType::GreatGreatDodecagonal => "greatgreatdodecagonal",
            GridType::CompassDodecagonal => "compassdodecagonal",
            GridType::PenroseP2 => "penrose_p2_kite",
            GridType::PenroseP3 => "penrose_p3_thick",
            GridType::Hats => "hats",
        }
    }

    /// Window geometry for a `width` x `height` grid of this tiling.
    #[must_use]
    #[allow(clippy::similar_names, clippy::too_many_lines)]
    pub fn size(self, width: i32, height: i32) -> GridSize {
        let (w, h) = (width, height);
        match self {
            GridType::Square => GridSize {
                tilesize: SQUARE_TILESIZE,
                xextent: w * SQUARE_TILESIZE,
                yextent: h * SQUARE_TILESIZE,
            },
            GridType::Honeycomb => {
                let (a, b) = (HONEY_A, HONEY_B);
                GridSize {
                    tilesize: HONEY_TILESIZE,
                    xextent: 3 * a * (w - 1) + 4 * a,
                    yextent: 2 * b * (h - 1) + 3 * b,
                }
            }
            GridType::Triangular => GridSize {
                tilesize: TRIANGLE_TILESIZE,
                xextent: (w + 1) * 2 * TRIANGLE_VEC_X,
                yextent: h * TRIANGLE_VEC_Y,
            },
            GridType::SnubSquare => {
                let (a, b) = (SNUBSQUARE_A, SNUBSQUARE_B);
                GridSize {
                    tilesize: SNUBSQUARE_TILESIZE,
                    xextent: (a + b) * (w - 1) + a + b,
                    yextent: (a + b) * (h - 1) + a + b,
                }
            }
            GridType::Cairo => {
                let b = CAIRO_B;
                GridSize {
                    tilesize: CAIRO_TILESIZE,
                    xextent: 2 * b * (w - 1) + 2 * b,
                    yextent: 2 * b * (h - 1) + 2 * b,
                }
            }
            GridType::GreatHexagonal => {
                let (a, b) = (GREATHEX_A, GREATHEX_B);
                GridSize {
                    tilesize: GREATHEX_TILESIZE,
                    xextent: (3 * a + b) * (w - 1) + 4 * a,
                    yextent: (2 * a + 2 * b) * (h - 1) + 3 * b + a,
                }
            }
            GridType::Kagome => {
                let (a, b) = (KAGOME_A, KAGOME_B);
                GridSize {
                    tilesize: KAGOME_TILESIZE,
                    xextent: (4 * a) * (w - 1) + 6 * a,
                    yextent: (2 * b) * (h - 1) + 2 * b,
                }
            }
            GridType::Octagonal => {
                let (a, b) = (OCTAGONAL_A, OCTAGONAL_B);
                GridSize {
                    tilesize: OCTAGONAL_TILESIZE,
                    xextent: (2 * a + b) * w,
                    yextent: (2 * a + b) * h,
                }
            }
            GridType::Kites => {
                let (a, b) = (KITE_A, KITE_B);
                GridSize {
                    tilesize: KITE_TILESIZE,
                    xextent: 4 * b * w + 2 * b,
                    yextent: 6 * a * (h - 1) + 8 * a,
                }
            }
            GridType::Floret => {
                let (px, py) = (FLORET_PX, FLORET_PY);
                let (qx, qy) = (4 * px / 5, -py * 2);
                let ry = qy - py;
                let mut yextent = (5 * qy - 4 * py) * (h - 1) + 4 * qy + 2 * ry;
                if h == 1 {
                    yextent += (5 * qy - 4 * py) / 2;
                }
                GridSize {
                    tilesize: FLORET_TILESIZE,
                    xextent: (6 * px + 3 * qx) / 2 * (w - 1) + 4 * qx + 2 * px,
                    yextent,
                }
            }
            GridType::Dodecagonal => {
                let (a, b) = (DODEC_A, DODEC_B);
                GridSize {
                    tilesize: DODEC_TILESIZE,
                    xextent: (4 * a + 2 * b) * (w - 1) + 3 * (2 * a + b),
                    yextent: (3 * a + 2 * b) * (h - 1) + 2 * (2 * a + b),
                }
            }
            GridType::GreatDodecagonal => {
                let (a, b) = (DODEC_A, DODEC_B);
                GridSize {
                    tilesize: DODEC_TILESIZE,
                    xextent: (6 * a + 2 * b) * (w - 1) + 2 * (2 * a + b) + 3 * a + b,
                    yextent: (3 * a + 3 * b) * (h - 1) + 2 * (2 * a + b),
                }
            }
            GridType::GreatGreatDodecagonal => {
                let (a, b) = (DODEC_A, DODEC_B);
                GridSize {
                    tilesize: DODEC_TILESIZE,
                    xextent: (4 * a + 4 * b) * (w - 1) + 2 * (2 * a + b) + 2 * a + 2 * b,
                    yextent: (6 * a + 2 * b) * (h - 1) + 2 * (2 * a + b),
                }
            }
            GridType::CompassDodecagonal => {
                let (a, b) = (DODEC_A, DODEC_B);
                GridSize {
                    tilesize: DODEC_TILESIZE,
                    xextent: (4 * a + 2 * b) * w,
                    yextent: (4 * a + 2 * b) * h,
                }
            }
            GridType::PenroseP2 | GridType::PenroseP3 => penrose::size(self, w, h),
            GridType::Hats => hats::size(w, h),
        }
    }

    /// Checks that a `width` x `height` grid of this tiling fits in the
    /// 32-bit coordinate space.
    pub fn validate_params(self, width: i32, height: i32) -> Result<(), GridError> {
        if width < 1 || height < 1 {
            return Err(GridError::TooSmall);
        }
        // Redo the extent arithmetic at 64 bits and reject anything that
        // would have wrapped, plus a generous cap on total dot count.
        let (w, h) = (i64::from(width), i64::from(height));
        let size64 = |t: GridType| {
            let probe = t.size(1, 1);
            // Extents are affine in each dimension, so evaluate the formula
            // at (1,1) and (2,2) to recover the per-cell step exactly.
            let probe2 = t.size(2, 2);
            let sx = i64::from(probe2.xextent - probe.xextent);
            let sy = i64::from(probe2.yextent - probe.yextent);
            (
                i64::from(probe.xextent) + sx * (w - 1),
                i64::from(probe.yextent) + sy * (h - 1),
            )
        };
        let (xextent, yextent) = size64(self);
        let max_dots = match self {
            GridType::GreatDodecagonal => 200 * w * h,
            GridType::GreatGreatDodecagonal => 300 * w * h,
            _ => 20 * (w + 1) * (h + 1),
        };
        if xextent > i64::from(i32::MAX)
            || yextent > i64::from(i32::MAX)
            || max_dots > i64::from(i32::MAX)
        {
            return Err(GridError::TooLarge);
        }
        Ok(())
    }

    /// Generates a random grid description for tilings that need one.
    ///
    /// Only the aperiodic tilings have real descriptions, recording which
    /// patch of the infinite tiling was cut out. Triangular grids return
    /// `"0"`, a version marker selecting the generation scheme that never
    /// produces single-neighbour corner faces.
    #[must_use]
    pub fn generate_desc(
        self,
        width: i32,
        height: i32,
        rs: &mut RandomState,
    ) -> Option<String> {
        match self {
            GridType::Triangular => Some("0".to_owned()),
            GridType::PenroseP2 | GridType::PenroseP3 => {
                Some(penrose::new_desc(self, width, height, rs))
            }
            GridType::Hats => Some(hats::new_desc(width, height, rs)),
            _ => None,
        }
    }

    /// Validates a grid description against this tiling and size.
    pub fn validate_desc(
        self,
        width: i32,
        height: i32,
        desc: Option<&str>,
    ) -> Result<(), GridError> {
        match self {
            GridType::Triangular => match desc {
                None | Some("0") => Ok(()),
                Some(_) => Err(GridError::BadDescription {
                    reason: "unrecognised grid description".to_owned(),
                }),
            },
            GridType::PenroseP2 | GridType::PenroseP3 => {
                let desc = desc.ok_or_else(|| GridError::BadDescription {
                    reason: "grid description required".to_owned(),
                })?;
                penrose::validate_desc(self, width, height, desc)
            }
            GridType::Hats => {
                let desc = desc.ok_or_else(|| GridError::BadDescription {
                    reason: "grid description required".to_owned(),
                })?;
                hats::validate_desc(width, height, desc)
            }
            _ => {
                if desc.is_none() {
                    Ok(())
                } else {
                    Err(GridError::BadDescription {
                        reason: "grid description strings not used with this grid type"
                            .to_owned(),
                    })
                }
            }
        }
    }

    /// Builds a `width` x `height` grid of this tiling.
    pub fn build(
        self,
        width: i32,
        height: i32,
        desc: Option<&str>,
    ) -> Result<Arc<Grid>, GridError> {
        self.validate_params(width, height)?;
        self.validate_desc(width, height, desc)?;

        let grid = match self {
            GridType::PenroseP2 | GridType::PenroseP3 => {
                let desc = desc.ok_or_else(|| GridError::BadDescription {
                    reason: "grid description required".to_owned(),
                })?;
                penrose::build(self, width, height, desc)?
            }
            GridType::Hats => {
                let desc = desc.ok_or_else(|| GridError::BadDescription {
                    reason: "grid description required".to_owned(),
                })?;
                hats::build(width, height, desc)?
            }
            _ => {
                let mut b = GridBuilder::new(self.size(width, height).tilesize);
                match self {
                    GridType::Square => emit_square(&mut b, width, height),
                    GridType::Honeycomb => emit_honeycomb(&mut b, width, height),
                    GridType::Triangular => {
                        emit_triangular(&mut b, width, height, desc.is_none());
                    }
                    GridType::SnubSquare => emit_snubsquare(&mut b, width, height),
                    GridType::Cairo => emit_cairo(&mut b, width, height),
                    GridType::GreatHexagonal => emit_greathexagonal(&mut b, width, height),
                    GridType::Kagome => emit_kagome(&mut b, width, height),
                    GridType::Octagonal => emit_octagonal(&mut b, width, height),
                    GridType::Kites => emit_kites(&mut b, width, height),
                    GridType::Floret => emit_floret(&mut b, width, height),
                    GridType::Dodecagonal => emit_dodecagonal(&mut b, width, height),
                    GridType::GreatDodecagonal => {
                        emit_greatdodecagonal(&mut b, width, height);
                    }
                    GridType::GreatGreatDodecagonal => {
                        emit_greatgreatdodecagonal(&mut b, width, height);
                    }
                    GridType::CompassDodecagonal => {
                        emit_compassdodecagonal(&mut b, width, height);
                    }
                    _ => unreachable!(),
                }
                b.build()?
            }
        };
        Ok(Arc::new(grid))
    }
}

fn emit_square(b: &mut GridBuilder, width: i32, height: i32) {
    let a = SQUARE_TILESIZE;
    for y in 0..height {
        for x in 0..width {
            let (px, py) = (a * x, a * y);
            b.add_face(&[(px, py), (px + a, py), (px + a, py + a), (px, py + a)]);
        }
    }
}

fn emit_honeycomb(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (HONEY_A, HONEY_B);
    for y in 0..height {
        for x in 0..width {
            let cx = 3 * a * x;
            let mut cy = 2 * bb * y;
            if x % 2 != 0 {
                cy += bb;
            }
            b.add_face(&[
                (cx - a, cy - bb),
                (cx + a, cy - bb),
                (cx + 2 * a, cy),
                (cx + a, cy + bb),
                (cx - a, cy + bb),
                (cx - 2 * a, cy),
            ]);
        }
    }
}

/// `legacy` selects the original generation scheme, in which two corners
/// of the grid carry "ear" faces joined to only one neighbour. Kept for
/// compatibility with game ids that predate the `"0"` version marker.
fn emit_triangular(b: &mut GridBuilder, width: i32, height: i32, legacy: bool) {
    let (vx, vy) = (TRIANGLE_VEC_X, TRIANGLE_VEC_Y);
    if legacy {
        let at = |x: i32, y: i32| (x * 2 * vx + if y % 2 != 0 { vx } else { 0 }, y * vy);
        for y in 0..height {
            for x in 0..width {
                if y % 2 != 0 {
                    b.add_face(&[at(x, y), at(x + 1, y + 1), at(x, y + 1)]);
                    b.add_face(&[at(x, y), at(x + 1, y), at(x + 1, y + 1)]);
                } else {
                    b.add_face(&[at(x, y), at(x + 1, y), at(x, y + 1)]);
                    b.add_face(&[at(x + 1, y), at(x + 1, y + 1), at(x, y + 1)]);
                }
            }
        }
    } else {
        for y in 0..height {
            // Each row has width+1 triangles one way up and width the
            // other way up; orientation and winding both flip with row
            // parity.
            let (mut y0, mut y1) = (y * vy, y * vy);
            let flip = y % 2 != 0;
            if flip {
                y1 += vy;
            } else {
                y0 += vy;
            }

            for x in 0..=width {
                // With odd height, the outermost triangles of the last row
                // would end up as ears; skip them.
                if height % 2 == 1 && y == height - 1 && (x == 0 || x == width) {
                    continue;
                }
                let (x0, x1, x2) = (2 * x * vx, (2 * x + 1) * vx, (2 * x + 2) * vx);
                if flip {
                    b.add_face(&[(x0, y0), (x2, y0), (x1, y1)]);
                } else {
                    b.add_face(&[(x0, y0), (x1, y1), (x2, y0)]);
                }
            }

            for x in 0..width {
                let (x0, x1, x2) =
                    ((2 * x + 1) * vx, (2 * x + 2) * vx, (2 * x + 3) * vx);
                if flip {
                    b.add_face(&[(x0, y1), (x2, y1), (x1, y0)]);
                } else {
                    b.add_face(&[(x0, y1), (x1, y0), (x2, y1)]);
                }
            }
        }
    }
}

fn emit_snubsquare(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (SNUBSQUARE_A, SNUBSQUARE_B);
    for y in 0..height {
        for x in 0..width {
            let (px, py) = ((a + bb) * x, (a + bb) * y);
            let odd = (x + y) % 2 != 0;

            // Square, tilted one way or the other.
            if odd {
                b.add_face(&[
                    (px + a, py),
                    (px + a + bb, py + a),
                    (px + bb, py + a + bb),
                    (px, py + bb),
                ]);
            } else {
                b.add_face(&[
                    (px + bb, py),
                    (px + a + bb, py + bb),
                    (px + a, py + a + bb),
                    (px, py + a),
                ]);
            }

            // Up/down triangles.
            if x > 0 {
                if odd {
                    b.add_face(&[(px + a, py), (px, py + bb), (px - a, py)]);
                } else {
                    b.add_face(&[
                        (px, py + a),
                        (px + a, py + a + bb),
                        (px - a, py + a + bb),
                    ]);
                }
            }

            // Left/right triangles.
            if y > 0 {
                if odd {
                    b.add_face(&[
                        (px + a, py),
                        (px + a + bb, py - a),
                        (px + a + bb, py + a),
                    ]);
                } else {
                    b.add_face(&[(px, py - a), (px + bb, py), (px, py + a)]);
                }
            }
        }
    }
}

fn emit_cairo(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (CAIRO_A, CAIRO_B);
    for y in 0..height {
        for x in 0..width {
            let (px, py) = (2 * bb * x, 2 * bb * y);
            let odd = (x + y) % 2 != 0;

            // Horizontal pentagons.
            if y > 0 {
                if odd {
                    b.add_face(&[
                        (px + a, py - bb),
                        (px + 2 * bb - a, py - bb),
                        (px + 2 * bb, py),
                        (px + bb, py + a),
                        (px, py),
                    ]);
                } else {
                    b.add_face(&[
                        (px, py),
                        (px + bb, py - a),
                        (px + 2 * bb, py),
                        (px + 2 * bb - a, py + bb),
                        (px + a, py + bb),
                    ]);
                }
            }
            // Vertical pentagons.
            if x > 0 {
                if odd {
                    b.add_face(&[
                        (px, py),
                        (px + bb, py + a),
                        (px + bb, py + 2 * bb - a),
                        (px, py + 2 * bb),
                        (px - a, py + bb),
                    ]);
                } else {
                    b.add_face(&[
                        (px, py),
                        (px + a, py + bb),
                        (px, py + 2 * bb),
                        (px - bb, py + 2 * bb - a),
                        (px - bb, py + a),
                    ]);
                }
            }
        }
    }
}

fn emit_greathexagonal(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (GREATHEX_A, GREATHEX_B);
    for y in 0..height {
        for x in 0..width {
            let px = (3 * a + bb) * x;
            let mut py = (2 * a + 2 * bb) * y;
            if x % 2 != 0 {
                py += a + bb;
            }

            b.add_face(&[
                (px - a, py - bb),
                (px + a, py - bb),
                (px + 2 * a, py),
                (px + a, py + bb),
                (px - a, py + bb),
                (px - 2 * a, py),
            ]);

            // Square below the hexagon.
            if y < height - 1 {
                b.add_face(&[
                    (px - a, py + bb),
                    (px + a, py + bb),
                    (px + a, py + 2 * a + bb),
                    (px - a, py + 2 * a + bb),
                ]);
            }

            // Squares below right and below left.
            if x < width - 1 && (x % 2 == 0 || y < height - 1) {
                b.add_face(&[
                    (px + 2 * a, py),
                    (px + 2 * a + bb, py + a),
                    (px + a + bb, py + a + bb),
                    (px + a, py + bb),
                ]);
            }
            if x > 0 && (x % 2 == 0 || y < height - 1) {
                b.add_face(&[
                    (px - 2 * a, py),
                    (px - a, py + bb),
                    (px - a - bb, py + a + bb),
                    (px - 2 * a - bb, py + a),
                ]);
            }

            // Triangles below right and below left.
            if x < width - 1 && y < height - 1 {
                b.add_face(&[
                    (px + a, py + bb),
                    (px + a + bb, py + a + bb),
                    (px + a, py + 2 * a + bb),
                ]);
            }
            if x > 0 && y < height - 1 {
                b.add_face(&[
                    (px - a, py + bb),
                    (px - a, py + 2 * a + bb),
                    (px - a - bb, py + a + bb),
                ]);
            }
        }
    }
}

fn emit_kagome(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (KAGOME_A, KAGOME_B);
    for y in 0..height {
        for x in 0..width {
            let mut px = (4 * a) * x;
            let py = (2 * bb) * y;
            if y % 2 != 0 {
                px += 2 * a;
            }

            b.add_face(&[
                (px + a, py - bb),
                (px + 2 * a, py),
                (px + a, py + bb),
                (px - a, py + bb),
                (px - 2 * a, py),
                (px - a, py - bb),
            ]);

            // Triangles above right and below right.
            if x < width - 1 || (y % 2 == 0 && y > 0) {
                b.add_face(&[(px + 3 * a, py - bb), (px + 2 * a, py), (px + a, py - bb)]);
            }
            if x < width - 1 || (y % 2 == 0 && y < height - 1) {
                b.add_face(&[(px + 3 * a, py + bb), (px + a, py + bb), (px + 2 * a, py)]);
            }

            // Left-edge triangles on shifted rows.
            if x == 0 && y % 2 != 0 {
                b.add_face(&[(px - a, py - bb), (px - 2 * a, py), (px - 3 * a, py - bb)]);
                if y < height - 1 {
                    b.add_face(&[
                        (px - a, py + bb),
                        (px - 3 * a, py + bb),
                        (px - 2 * a, py),
                    ]);
                }
            }
        }
    }
}

fn emit_octagonal(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (OCTAGONAL_A, OCTAGONAL_B);
    for y in 0..height {
        for x in 0..width {
            let (px, py) = ((2 * a + bb) * x, (2 * a + bb) * y);
            b.add_face(&[
                (px + a, py),
                (px + a + bb, py),
                (px + 2 * a + bb, py + a),
                (px + 2 * a + bb, py + a + bb),
                (px + a + bb, py + 2 * a + bb),
                (px + a, py + 2 * a + bb),
                (px, py + a + bb),
                (px, py + a),
            ]);

            if x > 0 && y > 0 {
                b.add_face(&[(px, py - a), (px + a, py), (px, py + a), (px - a, py)]);
            }
        }
    }
}

fn emit_kites(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (KITE_A, KITE_B);
    for y in 0..height {
        for x in 0..width {
            // Six kites meeting at an order-6 dot.
            let mut px = 4 * bb * x;
            let py = 6 * a * y;
            if y % 2 != 0 {
                px += 2 * bb;
            }

            b.add_face(&[
                (px, py),
                (px + 2 * bb, py),
                (px + 2 * bb, py + 2 * a),
                (px + bb, py + 3 * a),
            ]);
            b.add_face(&[
                (px, py),
                (px + bb, py + 3 * a),
                (px, py + 4 * a),
                (px - bb, py + 3 * a),
            ]);
            b.add_face(&[
                (px, py),
                (px - bb, py + 3 * a),
                (px - 2 * bb, py + 2 * a),
                (px - 2 * bb, py),
            ]);
            b.add_face(&[
                (px, py),
                (px - 2 * bb, py),
                (px - 2 * bb, py - 2 * a),
                (px - bb, py - 3 * a),
            ]);
            b.add_face(&[
                (px, py),
                (px - bb, py - 3 * a),
                (px, py - 4 * a),
                (px + bb, py - 3 * a),
            ]);
            b.add_face(&[
                (px, py),
                (px + bb, py - 3 * a),
                (px + 2 * bb, py - 2 * a),
                (px + 2 * bb, py),
            ]);
        }
    }
}

#[allow(clippy::similar_names)]
fn emit_floret(b: &mut GridBuilder, width: i32, height: i32) {
    // Side vectors p, q, r at roughly 120 degrees with near-equal lengths;
    // the lopsided integers keep the tiling aligned with the window.
    let (px, py) = (FLORET_PX, FLORET_PY);
    let (qx, qy) = (4 * px / 5, -py * 2);
    let (rx, ry) = (qx - px, qy - py);

    for y in 0..height {
        for x in 0..width {
            let cx = (6 * px + 3 * qx) / 2 * x;
            let mut cy = (4 * py - 5 * qy) * y;
            if x % 2 != 0 {
                cy -= (4 * py - 5 * qy) / 2;
            } else if y > 0 && y == height - 1 {
                continue;
            }

            // Six petals around the centre dot.
            b.add_face(&[
                (cx, cy),
                (cx + 2 * rx, cy + 2 * ry),
                (cx + 2 * rx + qx, cy + 2 * ry + qy),
                (cx + 2 * qx + rx, cy + 2 * qy + ry),
                (cx + 2 * qx, cy + 2 * qy),
            ]);
            b.add_face(&[
                (cx, cy),
                (cx + 2 * qx, cy + 2 * qy),
                (cx + 2 * qx + px, cy + 2 * qy + py),
                (cx + 2 * px + qx, cy + 2 * py + qy),
                (cx + 2 * px, cy + 2 * py),
            ]);
            b.add_face(&[
                (cx, cy),
                (cx + 2 * px, cy + 2 * py),
                (cx + 2 * px - rx, cy + 2 * py - ry),
                (cx - 2 * rx + px, cy - 2 * ry + py),
                (cx - 2 * rx, cy - 2 * ry),
            ]);
            b.add_face(&[
                (cx, cy),
                (cx - 2 * rx, cy - 2 * ry),
                (cx - 2 * rx - qx, cy - 2 * ry - qy),
                (cx - 2 * qx - rx, cy - 2 * qy - ry),
                (cx - 2 * qx, cy - 2 * qy),
            ]);
            b.add_face(&[
                (cx, cy),
                (cx - 2 * qx, cy - 2 * qy),
                (cx - 2 * qx - px, cy - 2 * qy - py),
                (cx - 2 * px - qx, cy - 2 * py - qy),
                (cx - 2 * px, cy - 2 * py),
            ]);
            b.add_face(&[
                (cx, cy),
                (cx - 2 * px, cy - 2 * py),
                (cx - 2 * px + rx, cy - 2 * py + ry),
                (cx + 2 * rx - px, cy + 2 * ry - py),
                (cx + 2 * rx, cy + 2 * ry),
            ]);
        }
    }
}

fn dodecagon(px: i32, py: i32, a: i32, b: i32) -> [(i32, i32); 12] {
    [
        (px + a, py - (2 * a + b)),
        (px + a + b, py - (a + b)),
        (px + 2 * a + b, py - a),
        (px + 2 * a + b, py + a),
        (px + a + b, py + a + b),
        (px + a, py + 2 * a + b),
        (px - a, py + 2 * a + b),
        (px - (a + b), py + a + b),
        (px - (2 * a + b), py + a),
        (px - (2 * a + b), py - a),
        (px - (a + b), py - (a + b)),
        (px - a, py - (2 * a + b)),
    ]
}

fn emit_dodecagonal(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (DODEC_A, DODEC_B);
    for y in 0..height {
        for x in 0..width {
            let mut px = (4 * a + 2 * bb) * x;
            let py = (3 * a + 2 * bb) * y;
            if y % 2 != 0 {
                px += 2 * a + bb;
            }

            b.add_face(&dodecagon(px, py, a, bb));

            let interior_x = (x < width - 1 || y % 2 == 0) && (x > 0 || y % 2 != 0);
            if y < height - 1 && interior_x {
                b.add_face(&[
                    (px + a, py + 2 * a + bb),
                    (px, py + 2 * a + 2 * bb),
                    (px - a, py + 2 * a + bb),
                ]);
            }
            if y > 0 && interior_x {
                b.add_face(&[
                    (px - a, py - (2 * a + bb)),
                    (px, py - (2 * a + 2 * bb)),
                    (px + a, py - (2 * a + bb)),
                ]);
            }
        }
    }
}

fn emit_greatdodecagonal(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (DODEC_A, DODEC_B);
    for y in 0..height {
        for x in 0..width {
            let mut px = (6 * a + 2 * bb) * x;
            let py = (3 * a + 3 * bb) * y;
            if y % 2 != 0 {
                px += 3 * a + bb;
            }

            b.add_face(&dodecagon(px, py, a, bb));

            let interior_x = (x < width - 1 || y % 2 == 0) && (x > 0 || y % 2 != 0);
            // Hexagons below and above.
            if y < height - 1 && interior_x {
                b.add_face(&[
                    (px + a, py + 2 * a + bb),
                    (px + 2 * a, py + 2 * a + 2 * bb),
                    (px + a, py + 2 * a + 3 * bb),
                    (px - a, py + 2 * a + 3 * bb),
                    (px - 2 * a, py + 2 * a + 2 * bb),
                    (px - a, py + 2 * a + bb),
                ]);
            }
            if y > 0 && interior_x {
                b.add_face(&[
                    (px - a, py - (2 * a + bb)),
                    (px - 2 * a, py - (2 * a + 2 * bb)),
                    (px - a, py - (2 * a + 3 * bb)),
                    (px + a, py - (2 * a + 3 * bb)),
                    (px + 2 * a, py - (2 * a + 2 * bb)),
                    (px + a, py - (2 * a + bb)),
                ]);
            }

            // Square on the right.
            if x < width - 1 {
                b.add_face(&[
                    (px + 2 * a + bb, py - a),
                    (px + 4 * a + bb, py - a),
                    (px + 4 * a + bb, py + a),
                    (px + 2 * a + bb, py + a),
                ]);
            }

            // Tilted squares top right and top left.
            if y > 0 && (x < width - 1 || y % 2 == 0) {
                b.add_face(&[
                    (px + a, py - (2 * a + bb)),
                    (px + 2 * a, py - (2 * a + 2 * bb)),
                    (px + 2 * a + bb, py - (a + 2 * bb)),
                    (px + a + bb, py - (a + bb)),
                ]);
            }
            if y > 0 && (x > 0 || y % 2 != 0) {
                b.add_face(&[
                    (px - (a + bb), py - (a + bb)),
                    (px - (2 * a + bb), py - (a + 2 * bb)),
                    (px - 2 * a, py - (2 * a + 2 * bb)),
                    (px - a, py - (2 * a + bb)),
                ]);
            }
        }
    }
}

#[allow(clippy::too_many_lines)]
fn emit_greatgreatdodecagonal(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (DODEC_A, DODEC_B);
    for y in 0..height {
        for x in 0..width {
            let mut px = (4 * a + 4 * bb) * x;
            let py = (6 * a + 2 * bb) * y;
            if y % 2 != 0 {
                px += 2 * a + 2 * bb;
            }

            b.add_face(&dodecagon(px, py, a, bb));

            // Hexagons top right, right, bottom right.
            if y > 0 && (x < width - 1 || y % 2 == 0) {
                b.add_face(&[
                    (px + a + 2 * bb, py - (4 * a + bb)),
                    (px + a + 2 * bb, py - (2 * a + bb)),
                    (px + a + bb, py - (a + bb)),
                    (px + a, py - (2 * a + bb)),
                    (px + a, py - (4 * a + bb)),
                    (px + a + bb, py - (5 * a + bb)),
                ]);
            }
            if x < width - 1 {
                b.add_face(&[
                    (px + 2 * a + 3 * bb, py - a),
                    (px + 2 * a + 3 * bb, py + a),
                    (px + 2 * a + 2 * bb, py + 2 * a),
                    (px + 2 * a + bb, py + a),
                    (px + 2 * a + bb, py - a),
                    (px + 2 * a + 2 * bb, py - 2 * a),
                ]);
            }
            if y < height - 1 && (x < width - 1 || y % 2 == 0) {
                b.add_face(&[
                    (px + a + 2 * bb, py + 2 * a + bb),
                    (px + a + 2 * bb, py + 4 * a + bb),
                    (px + a + bb, py + 5 * a + bb),
                    (px + a, py + 4 * a + bb),
                    (px + a, py + 2 * a + bb),
                    (px + a + bb, py + a + bb),
                ]);
            }

            // Tilted squares top right and bottom right.
            if y > 0 && x < width - 1 {
                b.add_face(&[
                    (px + a + 2 * bb, py - (2 * a + bb)),
                    (px + 2 * a + 2 * bb, py - 2 * a),
                    (px + 2 * a + bb, py - a),
                    (px + a + bb, py - (a + bb)),
                ]);
            }
            if y < height - 1 && x < width - 1 {
                b.add_face(&[
                    (px + 2 * a + 2 * bb, py + 2 * a),
                    (px + a + 2 * bb, py + 2 * a + bb),
                    (px + a + bb, py + a + bb),
                    (px + 2 * a + bb, py + a),
                ]);
            }

            // Axis-aligned squares below and above.
            let interior_x = (x < width - 1 || y % 2 == 0) && (x > 0 || y % 2 != 0);
            if y < height - 1 && interior_x {
                b.add_face(&[
                    (px + a, py + 2 * a + bb),
                    (px + a, py + 4 * a + bb),
                    (px - a, py + 4 * a + bb),
                    (px - a, py + 2 * a + bb),
                ]);
            }
            if y > 0 && interior_x {
                b.add_face(&[
                    (px + a, py - (4 * a + bb)),
                    (px + a, py - (2 * a + bb)),
                    (px - a, py - (2 * a + bb)),
                    (px - a, py - (4 * a + bb)),
                ]);
            }

            // Tilted squares bottom left and top left.
            if x > 0 && y < height - 1 {
                b.add_face(&[
                    (px - (2 * a + bb), py + a),
                    (px - (a + bb), py + a + bb),
                    (px - (a + 2 * bb), py + 2 * a + bb),
                    (px - (2 * a + 2 * bb), py + 2 * a),
                ]);
            }
            if x > 0 && y > 0 {
                b.add_face(&[
                    (px - (a + bb), py - (a + bb)),
                    (px - (2 * a + bb), py - a),
                    (px - (2 * a + 2 * bb), py - 2 * a),
                    (px - (a + 2 * bb), py - (2 * a + bb)),
                ]);
            }

            // Triangles between the right-hand hexagons.
            if y > 0 && x < width - 1 {
                b.add_face(&[
                    (px + 3 * a + 2 * bb, py - (2 * a + bb)),
                    (px + 2 * a + 2 * bb, py - 2 * a),
                    (px + a + 2 * bb, py - (2 * a + bb)),
                ]);
            }
            if y < height - 1 && x < width - 1 {
                b.add_face(&[
                    (px + 3 * a + 2 * bb, py + 2 * a + bb),
                    (px + a + 2 * bb, py + 2 * a + bb),
                    (px + 2 * a + 2 * bb, py + 2 * a),
                ]);
            }
        }
    }
}

fn emit_compassdodecagonal(b: &mut GridBuilder, width: i32, height: i32) {
    let (a, bb) = (DODEC_A, DODEC_B);
    for y in 0..height {
        for x in 0..width {
            let (px, py) = ((4 * a + 2 * bb) * x, (4 * a + 2 * bb) * y);

            b.add_face(&dodecagon(px, py, a, bb));

            // North, east, south, west triangles and the square they
            // surround, in the gap between four dodecagons.
            if x < width - 1 && y < height - 1 {
                b.add_face(&[
                    (px + 2 * a + bb, py + a),
                    (px + 3 * a + bb, py + a + bb),
                    (px + a + bb, py + a + bb),
                ]);
                b.add_face(&[
                    (px + 3 * a + 2 * bb, py + 2 * a + bb),
                    (px + 3 * a + bb, py + 3 * a + bb),
                    (px + 3 * a + bb, py + a + bb),
                ]);
                b.add_face(&[
                    (px + 3 * a + bb, py + 3 * a + bb),
                    (px + 2 * a + bb, py + 3 * a + 2 * bb),
                    (px + a + bb, py + 3 * a + bb),
                ]);
                b.add_face(&[
                    (px + a + bb, py + a + bb),
                    (px + a + bb, py + 3 * a + bb),
                    (px + a, py + 2 * a + bb),
                ]);
                b.add_face(&[
                    (px + 3 * a + bb, py + a + bb),
                    (px + 3 * a + bb, py + 3 * a + bb),
                    (px + a + bb, py + 3 * a + bb),
                    (px + a + bb, py + a + bb),
                ]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn check_consistency(g: &Grid) {
        assert_eq!(g.edges.len(), g.faces.len() + g.dots.len() - 1);
        for f in &g.faces {
            assert_eq!(f.dots.len(), f.edges.len());
        }
        for d in &g.dots {
            assert_eq!(d.edges.len(), d.faces.len());
            assert!(d.edges.len() >= 2);
        }
        for (ei, e) in g.edges.iter().enumerate() {
            for fi in [e.face1, e.face2].into_iter().flatten() {
                assert!(g.faces[fi].edges.contains(&ei));
            }
        }
    }

    #[test]
    fn every_periodic_tiling_builds() {
        for ty in GridType::ALL {
            if matches!(
                ty,
                GridType::PenroseP2 | GridType::PenroseP3 | GridType::Hats
            ) {
                continue;
            }
            let g = ty.build(4, 4, None).unwrap();
            check_consistency(&g);
        }
    }

    #[test]
    fn square_grid_has_expected_counts() {
        let g = GridType::Square.build(3, 2, None).unwrap();
        assert_eq!(g.faces.len(), 6);
        assert_eq!(g.dots.len(), 12);
        assert_eq!(g.edges.len(), 17);
    }

    #[test]
    fn triangular_new_style_has_no_ears() {
        for h in [3, 4, 5] {
            let g = GridType::Triangular.build(5, h, Some("0")).unwrap();
            for f in &g.faces {
                let neighbours = f
                    .edges
                    .iter()
                    .filter(|&&e| {
                        g.edges[e].face1.is_some() && g.edges[e].face2.is_some()
                    })
                    .count();
                assert!(neighbours >= 2, "ear face in new-style triangular grid");
            }
        }
    }

    #[test]
    fn triangular_legacy_style_still_builds() {
        let g = GridType::Triangular.build(5, 5, None).unwrap();
        assert_eq!(g.faces.len(), 50);
        check_consistency(&g);
    }

    #[test]
    fn desc_validation_rejects_stray_descriptions() {
        assert!(GridType::Square.validate_desc(3, 3, Some("0")).is_err());
        assert!(GridType::Square.validate_desc(3, 3, None).is_ok());
        assert!(GridType::Triangular.validate_desc(3, 3, Some("0")).is_ok());
        assert!(GridType::Triangular.validate_desc(3, 3, Some("1")).is_err());
        assert!(GridType::PenroseP2.validate_desc(3, 3, None).is_err());
    }

    #[test]
    fn generate_desc_only_where_needed() {
        let mut rs = RandomState::from_seed(b"123456789");
        for ty in GridType::ALL {
            let desc = ty.generate_desc(3, 3, &mut rs);
            let expects_desc = matches!(
                ty,
                GridType::Triangular
                    | GridType::PenroseP2
                    | GridType::PenroseP3
                    | GridType::Hats
            );
            assert_eq!(desc.is_some(), expects_desc, "{}", ty.name());
        }
    }

    #[test]
    fn oversized_grids_are_rejected() {
        assert_eq!(
            GridType::Square.validate_params(0, 3),
            Err(GridError::TooSmall)
        );
        assert_eq!(
            GridType::Square.validate_params(i32::MAX / 2, 2),
            Err(GridError::TooLarge)
        );
    }

    #[test]
    fn extents_cover_all_dots() {
        for ty in [GridType::Square, GridType::Honeycomb, GridType::Kites] {
            let g = ty.build(4, 4, None).unwrap();
            let size = ty.size(4, 4);
            assert!(g.highest_x - g.lowest_x <= size.xextent);
            assert!(g.highest_y - g.lowest_y <= size.yextent);
        }
    }

    proptest! {
        #[test]
        fn prop_any_dimensions_build_a_consistent_grid(w in 3i32..9, h in 3i32..9) {
            for ty in [GridType::Square, GridType::Honeycomb, GridType::Cairo] {
                let g = ty.build(w, h, None).unwrap();
                check_consistency(&g);
            }
        }
    }
}
