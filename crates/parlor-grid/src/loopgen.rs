//! Random closed-loop generation over an arbitrary planar grid.
//!
//! A loop is represented by a two-colouring of the grid's faces: the white
//! faces are inside the path, the black ones (together with the infinite
//! exterior face) outside, and the loop itself is the set of edges whose
//! two sides disagree. Starting from one white face and the black
//! exterior, the two regions are grown one grey face at a time while each
//! stays simply connected, so the boundary between them remains a single
//! closed cycle throughout.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use log::debug;
use parlor_core::RandomState;

use crate::grid::Grid;

/// Colour of one face during and after generation. `Grey` never survives
/// in the final board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceColour {
    /// Not yet claimed by either region.
    Grey,
    /// Inside the loop.
    White,
    /// Outside the loop.
    Black,
}

/// Scoring callback used to steer generation. Called with the trial board
/// and the index of the face just recoloured; a higher return value makes
/// that choice more attractive. Also invoked (result ignored) whenever a
/// trial change is reverted, so the callback can maintain incremental
/// state.
pub type LoopgenBias<'a> = &'a mut dyn FnMut(&[FaceColour], usize) -> i32;

/// The exterior face is always black.
fn colour_at(board: &[FaceColour], face: Option<usize>) -> FaceColour {
    face.map_or(FaceColour::Black, |i| board[i])
}

/// Number of edge-neighbours of `face_index` with the given colour.
fn face_num_neighbours(
    g: &Grid,
    board: &[FaceColour],
    face_index: usize,
    colour: FaceColour,
) -> i32 {
    let count = g.faces[face_index]
        .edges
        .iter()
        .filter(|&&ei| colour_at(board, g.edges[ei].other_face(Some(face_index))) == colour)
        .count();
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    {
        count as i32
    }
}

/// Desirability of colouring a face: fewer same-coloured neighbours means
/// the face extends the region into fresh territory and adds perimeter.
fn face_score(g: &Grid, board: &[FaceColour], face_index: usize, colour: FaceColour) -> i32 {
    -face_num_neighbours(g, board, face_index, colour)
}

/// Whether colouring `face_index` with `colour` keeps that colour's
/// region simply connected.
///
/// The test walks the ring of faces touching the candidate face along an
/// edge or just at a corner, in order, and counts colour transitions. The
/// ring must contain exactly one contiguous run of `colour`: zero runs
/// would start a separate island, two or more would pinch off a hole or
/// meet the region corner-to-corner.
fn can_colour_face(
    g: &Grid,
    board: &[FaceColour],
    face_index: usize,
    colour: FaceColour,
) -> bool {
    let test_face = &g.faces[face_index];
    debug_assert!(board[face_index] != colour);

    let same_coloured_neighbour = test_face.edges.iter().any(|&ei| {
        colour_at(board, g.edges[ei].other_face(Some(face_index))) == colour
    });
    if !same_coloured_neighbour {
        return false;
    }

    // dots[i] walks clockwise round the test face; faces[j] walks
    // clockwise round each dot. The faces visited in sequence are exactly
    // the ring around the test face.
    let dot_faces = |i: usize| -> &[Option<usize>] { &g.dots[test_face.dots[i]].faces };

    let mut i = 0;
    let mut j = 0;
    let mut current = dot_faces(0)[0];
    if current == Some(face_index) {
        j = 1;
        current = dot_faces(0)[1];
    }

    // A degenerate grid can put the same neighbouring face (typically the
    // exterior) against the test face more than once, and several (i,j)
    // pairs can identify the same contiguity. Taking one step before
    // recording the termination point canonicalises the start.
    let mut transitions = 0;
    let mut current_state = colour_at(board, current) == colour;
    let mut start: Option<(usize, Option<usize>)> = None;

    loop {
        // Advance to the next face in the ring, skipping over the test
        // face itself by moving on to the next dot.
        loop {
            j += 1;
            if j == dot_faces(i).len() {
                j = 0;
            }
            if dot_faces(i)[j] == Some(face_index) {
                i += 1;
                if i == test_face.order() {
                    i = 0;
                }
                match dot_faces(i).iter().position(|&f| f == current) {
                    Some(pos) => j = pos,
                    // The current face must reappear around the next dot
                    // in a consistent grid.
                    None => return false,
                }
            } else {
                break;
            }
        }
        current = dot_faces(i)[j];
        let s = colour_at(board, current) == colour;

        match start {
            None => {
                start = Some((test_face.dots[i], current));
                current_state = s;
            }
            Some((start_dot, start_face)) => {
                if s != current_state {
                    transitions += 1;
                    current_state = s;
                    if transitions > 2 {
                        break;
                    }
                }
                if test_face.dots[i] == start_dot && current == start_face {
                    break;
                }
            }
        }
    }

    transitions == 2
}

/// Generates a random closed loop, returned as a face colouring with no
/// grey faces left. Edges whose two sides differ in colour form the loop.
///
/// Candidate faces for each colour are kept in score order, with a fixed
/// per-face random tiebreak so the ordering stays deterministic within a
/// run while still varying between runs. An optional [`LoopgenBias`]
/// overrides the score order by auditioning every candidate.
pub fn generate_loop(
    g: &Grid,
    rs: &mut RandomState,
    mut bias: Option<LoopgenBias<'_>>,
) -> Vec<FaceColour> {
    let num_faces = g.faces.len();
    let mut board = vec![FaceColour::Grey; num_faces];

    let randoms: Vec<u32> = (0..num_faces).map(|_| rs.bits(31)).collect();
    let mut white_score = vec![0_i32; num_faces];
    let mut black_score = vec![0_i32; num_faces];

    // Seed the regions: one random white face inside, the implicit
    // exterior face black outside.
    let seed = rs.upto(num_faces);
    board[seed] = FaceColour::White;

    // Sets ordered by (score descending, per-face random, index).
    let mut lightable: BTreeSet<(Reverse<i32>, u32, usize)> = BTreeSet::new();
    let mut darkable: BTreeSet<(Reverse<i32>, u32, usize)> = BTreeSet::new();

    // The full colourability check matters even at this stage: on some
    // grids a neighbour of the exterior face is not darkable.
    for i in 0..num_faces {
        if board[i] != FaceColour::Grey {
            continue;
        }
        if can_colour_face(g, &board, i, FaceColour::Black) {
            black_score[i] = face_score(g, &board, i, FaceColour::Black);
            darkable.insert((Reverse(black_score[i]), randoms[i], i));
        }
        if can_colour_face(g, &board, i, FaceColour::White) {
            white_score[i] = face_score(g, &board, i, FaceColour::White);
            lightable.insert((Reverse(white_score[i]), randoms[i], i));
        }
    }

    // Colour one face at a time until neither region can grow.
    loop {
        if lightable.is_empty() && darkable.is_empty() {
            break;
        }

        let colour = if rs.upto(2) == 1 { FaceColour::White } else { FaceColour::Black };
        let pool = if colour == FaceColour::White { &lightable } else { &darkable };

        let chosen = if let Some(b) = bias.as_deref_mut() {
            // Audition every candidate, breaking ties by our own ordering
            // (hence replace only on strictly greater score).
            let mut best: Option<usize> = None;
            let mut best_score = 0;
            for &(_, _, k) in pool {
                debug_assert!(board[k] == FaceColour::Grey);
                board[k] = colour;
                let score = b(&board, k);
                board[k] = FaceColour::Grey;
                b(&board, k);
                if best.is_none() || score > best_score {
                    best_score = score;
                    best = Some(k);
                }
            }
            best
        } else {
            pool.first().map(|&(_, _, k)| k)
        };
        let Some(face) = chosen else { break };

        board[face] = colour;
        if let Some(b) = bias.as_deref_mut() {
            b(&board, face);
        }
        lightable.remove(&(Reverse(white_score[face]), randoms[face], face));
        darkable.remove(&(Reverse(black_score[face]), randoms[face], face));

        // The new colouring affects the legality and score of every face
        // touching this one at an edge or corner. Remove-then-add keeps
        // the sort order correct even when only the score changed.
        for &di in &g.faces[face].dots {
            for &f in &g.dots[di].faces {
                let Some(fi) = f else { continue };
                if fi == face || board[fi] != FaceColour::Grey {
                    continue;
                }
                lightable.remove(&(Reverse(white_score[fi]), randoms[fi], fi));
                if can_colour_face(g, &board, fi, FaceColour::White) {
                    white_score[fi] = face_score(g, &board, fi, FaceColour::White);
                    lightable.insert((Reverse(white_score[fi]), randoms[fi], fi));
                }
                darkable.remove(&(Reverse(black_score[fi]), randoms[fi], fi));
                if can_colour_face(g, &board, fi, FaceColour::Black) {
                    black_score[fi] = face_score(g, &board, fi, FaceColour::Black);
                    darkable.insert((Reverse(black_score[fi]), randoms[fi], fi));
                }
            }
        }
    }

    // Region growth tends to leave large clumps of one colour, which make
    // for degenerate paths. Flipping any face with exactly one
    // opposite-coloured neighbour grows tendrils into the clumps; each
    // flip lengthens the perimeter, so this terminates. The result is
    // locally maximal loopiness, which would permit illicit deductions,
    // so a final pass makes a few random legal flips to muddy it.
    let mut face_list: Vec<usize> = (0..num_faces).collect();
    rs.shuffle(&mut face_list);

    let mut random_pass = false;
    loop {
        let mut flipped = false;
        for &j in &face_list {
            let opp = if board[j] == FaceColour::White {
                FaceColour::Black
            } else {
                FaceColour::White
            };
            if can_colour_face(g, &board, j, opp) {
                if random_pass {
                    if rs.upto(10) == 0 {
                        board[j] = opp;
                    }
                } else if face_num_neighbours(g, &board, j, opp) == 1 {
                    board[j] = opp;
                    flipped = true;
                }
            }
        }
        if random_pass {
            break;
        }
        if !flipped {
            random_pass = true;
        }
    }

    debug!(
        "loop of {} edges encloses {} of {num_faces} faces",
        g.edges
            .iter()
            .filter(|e| colour_at(&board, e.face1) != colour_at(&board, e.face2))
            .count(),
        board.iter().filter(|&&c| c == FaceColour::White).count(),
    );

    board
}

#[cfg(test)]
mod tests {
    use parlor_core::Dsf;

    use super::*;
    use crate::tilings::GridType;

    fn loop_edges(g: &Grid, board: &[FaceColour]) -> Vec<usize> {
        (0..g.edges.len())
            .filter(|&ei| {
                let e = &g.edges[ei];
                colour_at(board, e.face1) != colour_at(board, e.face2)
            })
            .collect()
    }

    #[test]
    fn board_is_fully_two_coloured() {
        let g = GridType::Square.build(6, 6, None).unwrap();
        let mut rs = RandomState::from_seed(b"loopgen colours");
        let board = generate_loop(&g, &mut rs, None);
        assert!(board.iter().all(|&c| c != FaceColour::Grey));
        assert!(board.contains(&FaceColour::White));
    }

    #[test]
    fn boundary_is_a_single_closed_cycle() {
        let g = GridType::Square.build(7, 5, None).unwrap();
        let mut rs = RandomState::from_seed(b"loopgen cycle");
        let board = generate_loop(&g, &mut rs, None);
        let edges = loop_edges(&g, &board);
        assert!(!edges.is_empty());

        // Every dot on the loop has exactly two loop edges.
        let mut degree = vec![0; g.dots.len()];
        for &ei in &edges {
            degree[g.edges[ei].dot1] += 1;
            degree[g.edges[ei].dot2] += 1;
        }
        assert!(degree.iter().all(|&d| d == 0 || d == 2));

        // And the loop edges form one connected component.
        let mut dsf = Dsf::new(g.dots.len());
        for &ei in &edges {
            dsf.merge(g.edges[ei].dot1, g.edges[ei].dot2);
        }
        let mut roots: Vec<usize> = degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > 0)
            .map(|(i, _)| dsf.canonify(i))
            .collect();
        roots.dedup();
        roots.sort_unstable();
        roots.dedup();
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn both_regions_stay_connected() {
        let g = GridType::Honeycomb.build(5, 5, None).unwrap();
        let mut rs = RandomState::from_seed(b"loopgen regions");
        let board = generate_loop(&g, &mut rs, None);

        // Union faces across same-coloured edges; the exterior face gets
        // the extra index.
        let exterior = g.faces.len();
        let mut dsf = Dsf::new(g.faces.len() + 1);
        for e in &g.edges {
            if colour_at(&board, e.face1) == colour_at(&board, e.face2) {
                dsf.merge(e.face1.unwrap_or(exterior), e.face2.unwrap_or(exterior));
            }
        }
        let whites: Vec<usize> = (0..g.faces.len())
            .filter(|&i| board[i] == FaceColour::White)
            .collect();
        let blacks: Vec<usize> = (0..g.faces.len())
            .filter(|&i| board[i] == FaceColour::Black)
            .collect();
        assert!(!whites.is_empty());
        let w0 = dsf.canonify(whites[0]);
        assert!(whites.iter().all(|&i| dsf.canonify(i) == w0));
        let b0 = dsf.canonify(exterior);
        assert!(blacks.iter().all(|&i| dsf.canonify(i) == b0));
    }

    #[test]
    fn same_seed_reproduces_the_same_loop() {
        let g = GridType::Cairo.build(4, 4, None).unwrap();
        let mut rs1 = RandomState::from_seed(b"loopgen repeat");
        let mut rs2 = RandomState::from_seed(b"loopgen repeat");
        let a = generate_loop(&g, &mut rs1, None);
        let b = generate_loop(&g, &mut rs2, None);
        assert_eq!(a, b);
    }

    #[test]
    fn bias_callback_sees_every_trial() {
        let g = GridType::Square.build(4, 4, None).unwrap();
        let mut rs = RandomState::from_seed(b"loopgen bias");
        let mut calls = 0;
        let mut bias = |_board: &[FaceColour], _face: usize| {
            calls += 1;
            0
        };
        let board = generate_loop(&g, &mut rs, Some(&mut bias));
        assert!(board.iter().all(|&c| c != FaceColour::Grey));
        assert!(calls > 0);
    }
}
