//! Save files.
//!
//! The format is a sequence of length-prefixed fields, one per line:
//! an eight-character key padded with spaces, a colon, the value length
//! in decimal, another colon, then the value itself. The first field is
//! always a magic marker so stray files are rejected early, and the
//! move history is replayed through the backend on load so a corrupted
//! file can never smuggle in an unreachable state.

use derive_more::{Display, Error};
use log::warn;

use crate::backend::{Backend, MoveResult};
use crate::midend::{GenMode, Midend, MoveType, StateEntry};
use parlor_core::{bin_to_hex, hex_to_bin, obfuscate_bitmap};

const MAGIC: &str = "Simon Tatham's Portable Puzzle Collection";
const VERSION: &str = "1";

/// Why a save file was rejected. The display strings are the messages
/// shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum SaveError {
    /// The data never looked like a save file at all.
    #[display("Data does not appear to be a saved game file")]
    NotSaveFile,
    /// A field was structurally malformed.
    #[display("Data was incorrectly formatted for a saved game file")]
    BadFormat,
    /// The data stopped in the middle of a field.
    #[display("Saved data ended unexpectedly")]
    UnexpectedEof,
    /// A format version this code does not speak.
    #[display("Cannot handle this version of the saved game file format")]
    WrongVersion,
    /// The file belongs to another puzzle.
    #[display("Save file is from a different game")]
    WrongGame,
    /// The long-term parameters failed validation.
    #[display("Long-term parameters in save file are invalid")]
    BadParams,
    /// The short-term parameters failed validation.
    #[display("Short-term parameters in save file are invalid")]
    BadCurParams,
    /// No game description field at all.
    #[display("Game description in save file is missing")]
    MissingDesc,
    /// The description failed validation.
    #[display("Game description in save file is invalid")]
    BadDesc,
    /// The private description failed validation.
    #[display("Game private description in save file is invalid")]
    BadPrivDesc,
    /// The recorded position does not point into the history.
    #[display("Game position in save file is out of range")]
    PositionOutOfRange,
    /// A non-positive state count.
    #[display("Number of states in save file was negative")]
    NegativeStateCount,
    /// More than one NSTATES field.
    #[display("Two state counts provided in save file")]
    DuplicateStateCount,
    /// A recorded move the backend rejects.
    #[display("Save file contained an invalid move")]
    InvalidMove,
    /// A recorded restart whose description the backend rejects.
    #[display("Save file contained an invalid restart move")]
    InvalidRestartMove,
}

fn field(out: &mut String, key: &str, value: &str) {
    use std::fmt::Write as _;
    // Never fails on a String.
    let _ = writeln!(out, "{key:<8.8}:{}:{value}", value.len());
}

/// Pull-parser over raw save data.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    started: bool,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            started: false,
        }
    }

    fn eof_error(&self) -> SaveError {
        if self.started {
            SaveError::UnexpectedEof
        } else {
            SaveError::NotSaveFile
        }
    }

    fn next_byte(&mut self) -> Option<u8> {
        let b = self.data.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    /// Reads one key/value field. `Ok(None)` at clean end of data.
    fn next_field(&mut self) -> Result<Option<(String, String)>, SaveError> {
        // Skip line breaks between fields.
        let first = loop {
            match self.next_byte() {
                None => return Ok(None),
                Some(b'\r' | b'\n') => {}
                Some(b) => break b,
            }
        };

        let mut keybuf = [0u8; 8];
        keybuf[0] = first;
        for slot in &mut keybuf[1..] {
            *slot = self.next_byte().ok_or_else(|| self.eof_error())?;
        }
        if self.next_byte().ok_or_else(|| self.eof_error())? != b':' {
            return Err(SaveError::BadFormat);
        }
        let keylen = keybuf
            .iter()
            .position(|&b| b == b' ')
            .unwrap_or(keybuf.len());
        let key = std::str::from_utf8(&keybuf[..keylen])
            .map_err(|_| SaveError::BadFormat)?
            .to_owned();

        let mut len: usize = 0;
        let mut digits = 0;
        loop {
            match self.next_byte().ok_or_else(|| self.eof_error())? {
                b':' if digits > 0 => break,
                b @ b'0'..=b'9' if digits < 9 => {
                    len = len * 10 + usize::from(b - b'0');
                    digits += 1;
                }
                _ => return Err(SaveError::BadFormat),
            }
        }

        if self.pos + len > self.data.len() {
            return Err(self.eof_error());
        }
        let value = std::str::from_utf8(&self.data[self.pos..self.pos + len])
            .map_err(|_| SaveError::BadFormat)?
            .to_owned();
        self.pos += len;

        if !self.started {
            if key != "SAVEFILE" || value != MAGIC {
                return Err(SaveError::NotSaveFile);
            }
            self.started = true;
        }
        Ok(Some((key, value)))
    }
}

/// Reads just far enough into save data to name the puzzle it belongs
/// to, so a frontend can pick the right backend before loading.
pub fn identify_game(data: &[u8]) -> Result<String, SaveError> {
    let mut rd = Reader::new(data);
    while let Some((key, value)) = rd.next_field()? {
        if key == "GAME" {
            return Ok(value);
        }
    }
    Err(rd.eof_error())
}

impl<B: Backend> Midend<B> {
    /// Writes the whole session, history included, as save-file text.
    #[must_use]
    pub fn serialise(&self) -> String {
        let mut out = String::new();
        field(&mut out, "SAVEFILE", MAGIC);
        field(&mut out, "VERSION", VERSION);
        field(&mut out, "GAME", B::NAME);
        field(&mut out, "PARAMS", &B::encode_params(&self.params, true));
        field(
            &mut out,
            "CPARAMS",
            &B::encode_params(self.curparams.as_ref().unwrap_or(&self.params), true),
        );
        if let Some(seed) = self.seedstr.as_deref() {
            field(&mut out, "SEED", seed);
        }
        if let Some(desc) = self.desc.as_deref() {
            field(&mut out, "DESC", desc);
        }
        if let Some(privdesc) = self.privdesc.as_deref() {
            field(&mut out, "PRIVDESC", privdesc);
        }
        if let Some(aux) = self.aux_info.as_deref() {
            // Lightly obfuscated so the solution is not sitting in the
            // file in plain text.
            let mut bytes = aux.as_bytes().to_vec();
            let nbits = bytes.len() * 8;
            obfuscate_bitmap(&mut bytes, nbits, false);
            field(&mut out, "AUXINFO", &bin_to_hex(&bytes));
        }
        if let Some(ui) = self.ui.as_ref() {
            let encoded = B::encode_ui(ui);
            if !encoded.is_empty() {
                field(&mut out, "UI", &encoded);
            }
        }
        if B::IS_TIMED {
            field(&mut out, "TIME", &format!("{}", self.elapsed));
        }
        field(&mut out, "NSTATES", &format!("{}", self.states.len()));
        field(&mut out, "STATEPOS", &format!("{}", self.statepos));
        for entry in &self.states[1..] {
            let key = match entry.movetype {
                MoveType::Move => "MOVE",
                MoveType::Solve => "SOLVE",
                MoveType::Restart => "RESTART",
                // Only ever the first entry.
                MoveType::NewGame => continue,
            };
            field(&mut out, key, entry.movestr.as_deref().unwrap_or(""));
        }
        out
    }

    /// Loads save-file data, replacing the whole session. Everything is
    /// parsed and validated into locals first; on any error the midend
    /// is untouched.
    pub fn deserialise(&mut self, data: &[u8]) -> Result<(), SaveError> {
        let mut params_str: Option<String> = None;
        let mut cparams_str: Option<String> = None;
        let mut seed: Option<String> = None;
        let mut desc: Option<String> = None;
        let mut privdesc: Option<String> = None;
        let mut aux_info: Option<String> = None;
        let mut ui_str: Option<String> = None;
        let mut elapsed: f32 = 0.0;
        let mut nstates: Option<usize> = None;
        let mut statepos: Option<usize> = None;
        let mut moves: Vec<(MoveType, String)> = Vec::new();

        let mut rd = Reader::new(data);
        while let Some((key, value)) = rd.next_field()? {
            match key.as_str() {
                "SAVEFILE" => {}
                "VERSION" => {
                    if value != VERSION {
                        return Err(SaveError::WrongVersion);
                    }
                }
                "GAME" => {
                    if value != B::NAME {
                        return Err(SaveError::WrongGame);
                    }
                }
                "PARAMS" => params_str = Some(value),
                "CPARAMS" => cparams_str = Some(value),
                "SEED" => seed = Some(value),
                "DESC" => desc = Some(value),
                "PRIVDESC" => privdesc = Some(value),
                "AUXINFO" => {
                    let mut bytes =
                        hex_to_bin(&value).map_err(|_| SaveError::BadFormat)?;
                    let nbits = bytes.len() * 8;
                    obfuscate_bitmap(&mut bytes, nbits, true);
                    aux_info = Some(
                        String::from_utf8(bytes).map_err(|_| SaveError::BadFormat)?,
                    );
                }
                "UI" => ui_str = Some(value),
                "TIME" => elapsed = value.trim().parse().unwrap_or(0.0),
                "NSTATES" => {
                    if nstates.is_some() {
                        return Err(SaveError::DuplicateStateCount);
                    }
                    let n: i64 = value.trim().parse().unwrap_or(0);
                    if n <= 0 {
                        return Err(SaveError::NegativeStateCount);
                    }
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        nstates = Some(n as usize);
                    }
                }
                "STATEPOS" => statepos = Some(value.trim().parse().unwrap_or(0)),
                "MOVE" | "SOLVE" | "RESTART" => {
                    let Some(n) = nstates else {
                        return Err(SaveError::BadFormat);
                    };
                    if moves.len() + 1 >= n {
                        return Err(SaveError::BadFormat);
                    }
                    let movetype = match key.as_str() {
                        "MOVE" => MoveType::Move,
                        "SOLVE" => MoveType::Solve,
                        _ => MoveType::Restart,
                    };
                    moves.push((movetype, value));
                }
                other => {
                    // Unknown keys from a newer writer are skipped, not
                    // fatal.
                    warn!("ignoring unknown save-file field {other:?}");
                }
            }
        }

        let (Some(params_str), Some(cparams_str), Some(nstates), Some(statepos)) =
            (params_str, cparams_str, nstates, statepos)
        else {
            return Err(SaveError::BadFormat);
        };
        if moves.len() + 1 != nstates {
            return Err(SaveError::BadFormat);
        }

        let mut params = B::default_params();
        B::decode_params(&mut params, &params_str);
        B::validate_params(&params, true).map_err(|_| SaveError::BadParams)?;

        let mut cparams = B::default_params();
        B::decode_params(&mut cparams, &cparams_str);
        B::validate_params(&cparams, false).map_err(|_| SaveError::BadCurParams)?;

        // A seed only reproduces the game if the short-term parameters
        // are a complete generation-grade set; otherwise quietly drop
        // it rather than save a lie next time.
        let seed = match (seed, B::validate_params(&cparams, true)) {
            (Some(s), Ok(())) => Some(s),
            _ => None,
        };

        let desc = desc.ok_or(SaveError::MissingDesc)?;
        B::validate_desc(&cparams, &desc).map_err(|_| SaveError::BadDesc)?;
        if let Some(pd) = privdesc.as_deref() {
            B::validate_desc(&cparams, pd).map_err(|_| SaveError::BadPrivDesc)?;
        }

        if statepos < 1 || statepos > nstates {
            return Err(SaveError::PositionOutOfRange);
        }

        // Rebuild the history by replaying every move through the
        // backend, exactly as it was originally made.
        let initial = B::new_game(&cparams, privdesc.as_deref().unwrap_or(&desc));
        let mut states: Vec<StateEntry<B::State>> = vec![StateEntry {
            state: initial,
            movestr: None,
            movetype: MoveType::NewGame,
        }];
        for (movetype, movestr) in moves {
            let prev = &states[states.len() - 1].state;
            let state = match movetype {
                MoveType::Move | MoveType::Solve => {
                    match B::execute_move(prev, &movestr) {
                        MoveResult::Changed(s) => s,
                        MoveResult::Unchanged | MoveResult::Invalid => {
                            return Err(SaveError::InvalidMove);
                        }
                    }
                }
                MoveType::Restart => {
                    B::validate_desc(&cparams, &movestr)
                        .map_err(|_| SaveError::InvalidRestartMove)?;
                    B::new_game(&cparams, &movestr)
                }
                MoveType::NewGame => return Err(SaveError::BadFormat),
            };
            states.push(StateEntry {
                state,
                movestr: Some(movestr),
                movetype,
            });
        }

        let mut ui = B::new_ui(&states[0].state);
        if let Some(enc) = ui_str.as_deref() {
            B::decode_ui(&mut ui, enc);
        }

        // Everything validated; commit.
        self.params = params;
        self.curparams = Some(cparams);
        self.desc = Some(desc);
        self.privdesc = privdesc;
        self.seedstr = seed;
        self.aux_info = aux_info;
        self.genmode = GenMode::Nothing;
        self.states = states;
        self.statepos = statepos;
        self.elapsed = elapsed;
        self.ui = Some(ui);
        self.oldstate = None;
        self.anim_time = 0.0;
        self.anim_pos = 0.0;
        self.flash_time = 0.0;
        self.flash_pos = 0.0;
        self.dir = 0;
        self.pressed_mouse_button = None;
        self.drawstate = Some(B::new_drawstate(&self.states[0].state));
        self.size_drawstate();
        self.notify_frontend();
        self.set_timer();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testgame::Tally;

    fn played_session() -> Midend<Tally> {
        let mut me = Midend::<Tally>::with_seed(None, b"serialise tests");
        me.new_game().unwrap();
        for _ in 0..3 {
            assert!(me.process_key(0, 0, crate::buttons::Button::Char('+')));
        }
        assert!(me.undo());
        me
    }

    #[test]
    fn round_trip_preserves_history_and_position() {
        let me = played_session();
        let saved = me.serialise();

        let mut other = Midend::<Tally>::with_seed(None, b"different entropy");
        other.deserialise(saved.as_bytes()).unwrap();
        assert_eq!(other.num_states(), me.num_states());
        assert_eq!(other.state_position(), me.state_position());
        assert_eq!(
            other.current_state().unwrap().count,
            me.current_state().unwrap().count
        );
        // The aux info survived obfuscation, so solve still works.
        other.solve().unwrap();

        // Saving the loaded session reproduces the file byte for byte.
        let mut me2 = Midend::<Tally>::with_seed(None, b"third");
        me2.deserialise(saved.as_bytes()).unwrap();
        assert_eq!(me2.serialise(), saved);
    }

    #[test]
    fn identify_game_reads_only_the_header() {
        let saved = played_session().serialise();
        assert_eq!(identify_game(saved.as_bytes()).unwrap(), "Tally");
        assert_eq!(
            identify_game(b"not a save file at all"),
            Err(SaveError::NotSaveFile)
        );
    }

    #[test]
    fn truncated_data_is_reported() {
        let saved = played_session().serialise();
        let cut = &saved.as_bytes()[..saved.len() - 4];
        let mut me = Midend::<Tally>::with_seed(None, b"x");
        assert_eq!(me.deserialise(cut), Err(SaveError::UnexpectedEof));
        // The failed load left the midend empty.
        assert_eq!(me.num_states(), 0);
    }

    #[test]
    fn wrong_game_is_rejected() {
        let saved = played_session()
            .serialise()
            .replace(":5:Tally", ":5:Blobs");
        let mut me = Midend::<Tally>::with_seed(None, b"x");
        assert_eq!(
            me.deserialise(saved.as_bytes()),
            Err(SaveError::WrongGame)
        );
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let saved = played_session()
            .serialise()
            .replace("STATEPOS:1:3", "STATEPOS:1:9");
        let mut me = Midend::<Tally>::with_seed(None, b"x");
        assert_eq!(
            me.deserialise(saved.as_bytes()),
            Err(SaveError::PositionOutOfRange)
        );
    }

    #[test]
    fn tampered_moves_are_rejected_on_replay() {
        let saved = played_session().serialise().replace(":1:+", ":1:?");
        let mut me = Midend::<Tally>::with_seed(None, b"x");
        assert_eq!(
            me.deserialise(saved.as_bytes()),
            Err(SaveError::InvalidMove)
        );
    }
}
