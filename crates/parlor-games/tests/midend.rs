//! Midend behaviour over the real backends: save files, undo/redo and
//! generation, exercised end to end rather than against a stub.

use parlor_engine::{Backend, Midend, Status, identify_game};
use parlor_games::{
    bridges::Bridges, dominosa::Dominosa, guess::Guess, loopy::Loopy, mosaic::Mosaic,
    sokoban::Sokoban, untangle::Untangle,
};

fn generates_fresh_game<B: Backend>(seed: &[u8]) {
    let mut midend = Midend::<B>::with_seed(None, seed);
    midend.new_game().unwrap();
    assert!(midend.get_game_id().is_some(), "{} had no game id", B::NAME);
    assert!(midend.get_random_seed().is_some());
    assert_eq!(midend.num_states(), 1);
}

#[test]
fn every_game_generates_under_its_default_params() {
    generates_fresh_game::<Bridges>(b"gen-bridges");
    generates_fresh_game::<Dominosa>(b"gen-dominosa");
    generates_fresh_game::<Guess>(b"gen-guess");
    generates_fresh_game::<Loopy>(b"gen-loopy");
    generates_fresh_game::<Mosaic>(b"gen-mosaic");
    generates_fresh_game::<Untangle>(b"gen-untangle");
    generates_fresh_game::<Sokoban>(b"gen-sokoban");
}

#[test]
fn save_files_round_trip_through_a_real_backend() {
    let mut midend = Midend::<Guess>::with_seed(None, b"midend-roundtrip");
    midend.new_game().unwrap();
    let id = midend.get_game_id().unwrap();
    let data = midend.serialise();

    assert_eq!(identify_game(data.as_bytes()).unwrap(), "Guess");

    let mut loaded = Midend::<Guess>::new(None);
    loaded.deserialise(data.as_bytes()).unwrap();
    assert_eq!(loaded.get_game_id().unwrap(), id);
    assert_eq!(loaded.num_states(), midend.num_states());
    assert_eq!(loaded.state_position(), midend.state_position());

    // Loading must be lossless: a reserialised session reads the same.
    assert_eq!(loaded.serialise(), data);
}

#[test]
fn the_wrong_backend_rejects_a_save() {
    let mut midend = Midend::<Guess>::with_seed(None, b"midend-wrong-game");
    midend.new_game().unwrap();
    let data = midend.serialise();

    let mut other = Midend::<Loopy>::new(None);
    assert!(other.deserialise(data.as_bytes()).is_err());
}

#[test]
fn solving_is_undoable_and_survives_a_save() {
    let mut midend = Midend::<Loopy>::with_seed(None, b"midend-loopy-solve");
    midend.new_game().unwrap();
    assert_eq!(midend.status(), Status::Active);

    midend.solve().unwrap();
    assert_eq!(midend.status(), Status::Solved);
    assert!(midend.can_undo());

    let data = midend.serialise();
    let mut loaded = Midend::<Loopy>::new(None);
    loaded.deserialise(data.as_bytes()).unwrap();
    assert_eq!(loaded.status(), Status::Solved);

    assert!(loaded.undo());
    assert_eq!(loaded.status(), Status::Active);
    assert!(loaded.redo());
    assert_eq!(loaded.status(), Status::Solved);
}
