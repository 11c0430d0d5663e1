//! Headless front-end for the puzzle collection.
//!
//! Drives a drawing-less [`Midend`] for bulk work: generating game ids,
//! running the solvers, and writing or replaying save files. Useful for
//! sanity-checking generation parameters and for producing puzzle
//! batches outside any GUI.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use parlor_engine::{Backend, GameKind, Midend, Status, identify_game};
use parlor_games::{
    bridges::Bridges, dominosa::Dominosa, guess::Guess, loopy::Loopy, mosaic::Mosaic,
    sokoban::Sokoban, untangle::Untangle,
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the puzzles and their preset menus.
    List,
    /// Generate fresh puzzles and print their descriptive game ids.
    Generate {
        /// Puzzle name, case-insensitive.
        #[arg(long, value_name = "GAME")]
        game: String,
        /// Parameter string, e.g. `7x7t0de`; defaults per puzzle.
        #[arg(long, value_name = "PARAMS")]
        params: Option<String>,
        /// Number of puzzles to generate.
        #[arg(long, value_name = "COUNT", default_value_t = 1)]
        count: usize,
        /// Generation seed, replacing the invented one.
        #[arg(long, value_name = "SEED")]
        seed: Option<String>,
    },
    /// Run a puzzle's solver over a game id and report the outcome.
    Solve {
        /// Puzzle name, case-insensitive.
        #[arg(long, value_name = "GAME")]
        game: String,
        /// Game id: `params:description` or `params#seed`.
        id: String,
    },
    /// Generate a puzzle and write it as a save file.
    Save {
        /// Puzzle name, case-insensitive.
        #[arg(long, value_name = "GAME")]
        game: String,
        /// Parameter string; defaults per puzzle.
        #[arg(long, value_name = "PARAMS")]
        params: Option<String>,
        /// Generation seed, replacing the invented one.
        #[arg(long, value_name = "SEED")]
        seed: Option<String>,
        /// Apply the solver before saving.
        #[arg(long)]
        solved: bool,
        /// Output path.
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Load a save file, replay it and report where it stands.
    Load {
        /// Save file written by this tool or any other frontend.
        file: PathBuf,
    },
}

/// Runs `$body` with `$backend` bound to the concrete backend type for
/// a runtime [`GameKind`].
macro_rules! dispatch {
    ($kind:expr, $backend:ident => $body:expr) => {
        match $kind {
            GameKind::Bridges => {
                type $backend = Bridges;
                $body
            }
            GameKind::Dominosa => {
                type $backend = Dominosa;
                $body
            }
            GameKind::Guess => {
                type $backend = Guess;
                $body
            }
            GameKind::Loopy => {
                type $backend = Loopy;
                $body
            }
            GameKind::Mosaic => {
                type $backend = Mosaic;
                $body
            }
            GameKind::Untangle => {
                type $backend = Untangle;
                $body
            }
            GameKind::Sokoban => {
                type $backend = Sokoban;
                $body
            }
        }
    };
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let result = match args.command {
        Command::List => {
            for kind in GameKind::ALL {
                dispatch!(kind, B => list_presets::<B>());
            }
            Ok(())
        }
        Command::Generate {
            game,
            params,
            count,
            seed,
        } => {
            let kind = parse_game(&game);
            dispatch!(kind, B => generate::<B>(params.as_deref(), count, seed.as_deref()))
        }
        Command::Solve { game, id } => {
            let kind = parse_game(&game);
            dispatch!(kind, B => solve::<B>(&id))
        }
        Command::Save {
            game,
            params,
            seed,
            solved,
            out,
        } => {
            let kind = parse_game(&game);
            dispatch!(kind, B => save::<B>(params.as_deref(), seed.as_deref(), solved, &out))
        }
        Command::Load { file } => load(&file),
    };

    if let Err(message) = result {
        eprintln!("{message}");
        process::exit(1);
    }
}

fn parse_game(name: &str) -> GameKind {
    let found = GameKind::ALL
        .into_iter()
        .find(|k| k.name().eq_ignore_ascii_case(name));
    match found {
        Some(kind) => kind,
        None => {
            eprintln!("Unknown puzzle: {name}");
            eprintln!("Available puzzles:");
            for kind in GameKind::ALL {
                eprintln!("  {}", kind.name());
            }
            process::exit(2);
        }
    }
}

fn list_presets<B: Backend>() {
    let midend = Midend::<B>::new(None);
    println!("{}", B::NAME);
    for preset in midend.presets() {
        println!("  {:24} {}", preset.encoding, preset.name);
    }
}

/// A game id from the optional parts. A bare seed still needs a full
/// params prefix to mean the same thing everywhere, so the defaults are
/// spelled out for it.
fn make_id<B: Backend>(params: Option<&str>, seed: Option<&str>) -> Option<String> {
    match (params, seed) {
        (Some(p), Some(s)) => Some(format!("{p}#{s}")),
        (Some(p), None) => Some(p.to_owned()),
        (None, Some(s)) => {
            let p = B::encode_params(&B::default_params(), true);
            Some(format!("{p}#{s}"))
        }
        (None, None) => None,
    }
}

fn generate<B: Backend>(
    params: Option<&str>,
    count: usize,
    seed: Option<&str>,
) -> Result<(), String> {
    if seed.is_some() && count != 1 {
        return Err("--seed names a single puzzle; use --count 1".to_owned());
    }

    let mut midend = Midend::<B>::new(None);
    if let Some(id) = make_id::<B>(params, seed) {
        midend.set_game_id(&id).map_err(|e| e.to_string())?;
    }

    for _ in 0..count {
        midend.new_game().map_err(|e| e.to_string())?;
        if let Some(seed_id) = midend.get_random_seed() {
            log::debug!("generated from {seed_id}");
        }
        let id = midend
            .get_game_id()
            .ok_or_else(|| "generation produced no game id".to_owned())?;
        println!("{id}");
    }
    Ok(())
}

fn solve<B: Backend>(id: &str) -> Result<(), String> {
    let mut midend = Midend::<B>::new(None);
    midend.set_game_id(id).map_err(|e| e.to_string())?;
    midend.new_game().map_err(|e| e.to_string())?;
    midend.solve().map_err(|e| e.to_string())?;

    println!("{}", status_str(midend.status()));
    if let Some(text) = midend.text_format() {
        print!("{text}");
    }
    Ok(())
}

fn save<B: Backend>(
    params: Option<&str>,
    seed: Option<&str>,
    solved: bool,
    out: &Path,
) -> Result<(), String> {
    let mut midend = Midend::<B>::new(None);
    if let Some(id) = make_id::<B>(params, seed) {
        midend.set_game_id(&id).map_err(|e| e.to_string())?;
    }
    midend.new_game().map_err(|e| e.to_string())?;
    if solved {
        midend.solve().map_err(|e| e.to_string())?;
    }

    fs::write(out, midend.serialise())
        .map_err(|e| format!("{}: {e}", out.display()))?;
    println!(
        "{} {}",
        out.display(),
        midend.get_game_id().unwrap_or_default()
    );
    Ok(())
}

fn load(file: &Path) -> Result<(), String> {
    let data = fs::read(file).map_err(|e| format!("{}: {e}", file.display()))?;
    let name = identify_game(&data).map_err(|e| e.to_string())?;
    let Some(kind) = GameKind::from_name(&name) else {
        return Err(format!("save file is for an unknown puzzle: {name}"));
    };

    dispatch!(kind, B => {
        let mut midend = Midend::<B>::new(None);
        midend.deserialise(&data).map_err(|e| e.to_string())?;
        println!("{} {}", B::NAME, midend.get_current_params(true));
        println!(
            "state {} of {}, {}",
            midend.state_position(),
            midend.num_states(),
            status_str(midend.status())
        );
        Ok(())
    })
}

fn status_str(status: Status) -> &'static str {
    match status {
        Status::Lost => "lost",
        Status::Active => "in progress",
        Status::Solved => "solved",
    }
}
