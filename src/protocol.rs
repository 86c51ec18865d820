//! Line-oriented text protocol, in the spirit of GTP.
//!
//! Each input line is an optional numeric id, a command, and arguments.
//! Each reply is `=[id] message` on success or `?[id] message` on failure,
//! followed by a blank line.
//!
//! ## Commands
//!
//! - `name`, `version`, `protocol_version`, `list_commands`,
//!   `known_command <cmd>`, `quit`
//! - `dispatch [encoding]` - start a game (default or given position)
//! - `move <from> <to>` - move the board piece on `from`
//! - `drop <letter> <to>` - reinsert a piece of that kind from the mover's hand
//! - `moves <cell>` - legal destinations of the piece on `cell`
//! - `hmoves <letter>` - legal destinations of a hand piece of the mover
//! - `undo` - take back the last move
//! - `turn`, `setturn <bottom|top>`
//! - `cell <index>`, `hand <bottom|top>`, `show`, `encode`, `result`
//! - `depth <plies>`, `time <ms>` - search budget for `genmove`
//! - `genmove` - let the engine play for the side to move
//!
//! A move that ends the game replies `end <code>` (0 draw, 1 BOTTOM wins,
//! 2 TOP wins). When an engine side is configured, the engine answers
//! every move made against it and its reply is appended to the response.
//!
//! ```text
//! dispatch
//! =
//!
//! move 4 7
//! =
//! ```

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::competitor::Competitor;
use crate::constants::CELLS;
use crate::events::GameEvent;
use crate::game::{Game, Location, MoveEffect};
use crate::piece::{PieceKind, Player};
use crate::playout::Move;
use crate::search::Budget;

/// The list of known commands.
const KNOWN_COMMANDS: &[&str] = &[
    "cell",
    "depth",
    "dispatch",
    "drop",
    "encode",
    "genmove",
    "hand",
    "hmoves",
    "known_command",
    "list_commands",
    "move",
    "moves",
    "name",
    "protocol_version",
    "quit",
    "result",
    "setturn",
    "show",
    "time",
    "turn",
    "undo",
    "version",
];

/// Protocol session: the game and the engine settings.
pub struct Session {
    game: Game,
    budget: Budget,
    /// Side played automatically by the engine, if any.
    engine_side: Option<Player>,
    seed: Option<u64>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Game::new(), Budget::default())
    }
}

impl Session {
    pub fn new(mut game: Game, budget: Budget) -> Self {
        game.subscribe(Box::new(|event: &GameEvent| {
            log::debug!("game event: {event:?}");
        }));
        Self {
            game,
            budget,
            engine_side: None,
            seed: None,
        }
    }

    /// Let the engine answer moves for `side`.
    pub fn with_engine_side(mut self, side: Option<Player>) -> Self {
        self.engine_side = side;
        self
    }

    /// Seed the engine's fallback moves.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Run the command loop on stdin/stdout.
    pub fn run_stdio(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.run(stdin.lock(), stdout.lock())
    }

    /// Run the command loop until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line.context("reading command")?;

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            let Some((command, args)) = parts.split_first() else {
                continue;
            };
            let command = command.to_lowercase();

            let (prefix, message) = match self.execute(&command, args) {
                Ok(message) => ('=', message),
                Err(err) => {
                    log::debug!("command {command} failed: {err:#}");
                    ('?', format!("{err:#}"))
                }
            };
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();
            writeln!(output, "{prefix}{id_str} {message}\n")?;
            output.flush()?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    /// Parse an optional numeric command id from the beginning of the line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(trimmed.len(), |(i, _)| i);
        if end > 0 {
            if let Ok(id) = trimmed[..end].parse::<u32>() {
                return (Some(id), trimmed[end..].trim());
            }
        }
        (None, trimmed)
    }

    /// Execute one command and return its reply.
    fn execute(&mut self, command: &str, args: &[&str]) -> Result<String> {
        match command {
            "name" => Ok(env!("CARGO_PKG_NAME").to_string()),
            "version" => Ok(env!("CARGO_PKG_VERSION").to_string()),
            "protocol_version" => Ok("1".to_string()),
            "list_commands" => Ok(KNOWN_COMMANDS.join("\n")),
            "known_command" => {
                let cmd = arg(args, 0)?.to_lowercase();
                Ok(KNOWN_COMMANDS.contains(&cmd.as_str()).to_string())
            }
            "quit" => Ok(String::new()),

            "dispatch" => {
                let encoding = args.join(" ");
                let encoding = (!encoding.is_empty()).then_some(encoding.as_str());
                self.game
                    .dispatch_pieces(encoding)
                    .context("invalid position")?;
                self.engine_reply()
            }

            "move" => {
                let from = parse_cell(arg(args, 0)?)?;
                let to = parse_cell(arg(args, 1)?)?;
                let piece = self
                    .game
                    .cell(from)
                    .ok_or_else(|| anyhow!("no piece on cell {from}"))?;
                self.play(Move { piece, to })
            }

            "drop" => {
                let kind = parse_kind(arg(args, 0)?)?;
                let to = parse_cell(arg(args, 1)?)?;
                let turn = self.game.current_player();
                let piece = self
                    .game
                    .hand_piece(turn, kind)
                    .ok_or_else(|| anyhow!("no {} in {turn} hand", kind.letter()))?;
                self.play(Move { piece, to })
            }

            "moves" => {
                let cell = parse_cell(arg(args, 0)?)?;
                let piece = self
                    .game
                    .cell(cell)
                    .ok_or_else(|| anyhow!("no piece on cell {cell}"))?;
                Ok(join_cells(self.game.legal_destinations(piece).iter()))
            }

            "hmoves" => {
                let kind = parse_kind(arg(args, 0)?)?;
                let turn = self.game.current_player();
                let piece = self
                    .game
                    .hand_piece(turn, kind)
                    .ok_or_else(|| anyhow!("no {} in {turn} hand", kind.letter()))?;
                Ok(join_cells(self.game.legal_destinations(piece).iter()))
            }

            "undo" => {
                self.game.undo_last_move()?;
                Ok(String::new())
            }

            "turn" => Ok(self.game.current_player().to_string()),

            "setturn" => {
                let player = parse_player(arg(args, 0)?)?;
                self.game.set_current_player(player);
                Ok(String::new())
            }

            "cell" => {
                let cell = parse_cell(arg(args, 0)?)?;
                Ok(self
                    .game
                    .cell_contents(cell)
                    .map_or(".".to_string(), |p| p.letter().to_string()))
            }

            "hand" => {
                let player = parse_player(arg(args, 0)?)?;
                Ok(self
                    .game
                    .hand(player)
                    .iter()
                    .filter_map(|&id| self.game.piece(id))
                    .map(|p| p.letter())
                    .collect())
            }

            "show" => Ok(format!("\n{}", self.game)),
            "encode" => Ok(self.game.encode()),

            "result" => Ok(self
                .game
                .outcome()
                .map_or("none".to_string(), |o| format!("{} {o}", o.code()))),

            "depth" => {
                let plies: u32 = arg(args, 0)?.parse().context("invalid depth")?;
                if plies == 0 {
                    bail!("depth must be at least 1");
                }
                self.budget = Budget::Depth(plies);
                Ok(String::new())
            }

            "time" => {
                let ms: u64 = arg(args, 0)?.parse().context("invalid time")?;
                self.budget = Budget::Time(Duration::from_millis(ms));
                Ok(String::new())
            }

            "genmove" => {
                let side = self.game.current_player();
                self.engine_move(side)
            }

            _ => bail!("unknown command: {command}"),
        }
    }

    /// Play a move for the side to move, then let the engine answer.
    fn play(&mut self, mv: Move) -> Result<String> {
        let effect = self.game.apply_move(mv.piece, mv.to)?;
        let mut reply = effect_text(effect);
        let answer = self.engine_reply()?;
        if !answer.is_empty() {
            if !reply.is_empty() {
                reply.push(' ');
            }
            reply.push_str(&answer);
        }
        Ok(reply)
    }

    /// Engine move if the engine plays the side to move and the game is on.
    fn engine_reply(&mut self) -> Result<String> {
        match self.engine_side {
            Some(side) if side == self.game.current_player() && self.game.outcome().is_none() => {
                self.engine_move(side)
            }
            _ => Ok(String::new()),
        }
    }

    fn engine_move(&mut self, side: Player) -> Result<String> {
        let mut competitor = Competitor::new(side, self.budget);
        if let Some(seed) = self.seed {
            competitor = competitor.with_seed(seed);
        }

        let before = self.game.clone();
        let report = competitor.play_turn(&mut self.game)?;
        let mut reply = describe(&before, report.mv);
        let effect = effect_text(report.effect);
        if !effect.is_empty() {
            reply.push(' ');
            reply.push_str(&effect);
        }
        Ok(reply)
    }
}

/// Protocol text for a move, as it stood before being played.
fn describe(game: &Game, mv: Move) -> String {
    match game.location(mv.piece) {
        Some(Location::Board(from)) => format!("{from} {}", mv.to),
        _ => {
            let letter = game.piece(mv.piece).map_or('?', |p| p.kind.letter());
            format!("drop {letter} {}", mv.to)
        }
    }
}

fn effect_text(effect: MoveEffect) -> String {
    match effect {
        MoveEffect::Continue => String::new(),
        MoveEffect::Ended(outcome) => format!("end {}", outcome.code()),
    }
}

fn join_cells(cells: impl Iterator<Item = usize>) -> String {
    cells.map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

fn arg<'a>(args: &[&'a str], index: usize) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| anyhow!("missing argument"))
}

fn parse_cell(s: &str) -> Result<usize> {
    let cell: usize = s.parse().with_context(|| format!("invalid cell {s:?}"))?;
    if cell >= CELLS {
        bail!("cell {cell} is off the board");
    }
    Ok(cell)
}

fn parse_kind(s: &str) -> Result<PieceKind> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => PieceKind::from_letter(c).ok_or_else(|| anyhow!("unknown piece {s:?}")),
        _ => bail!("expected one piece letter, got {s:?}"),
    }
}

fn parse_player(s: &str) -> Result<Player> {
    match s.to_lowercase().as_str() {
        "bottom" | "b" => Ok(Player::Bottom),
        "top" | "w" | "t" => Ok(Player::Top),
        _ => bail!("unknown player {s:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_POSITION;

    fn session() -> Session {
        Session::new(Game::new(), Budget::Depth(2))
    }

    #[test]
    fn test_parse_id_with_id() {
        let (id, cmd) = Session::parse_id("123 name");
        assert_eq!(id, Some(123));
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_parse_id_without_id() {
        let (id, cmd) = Session::parse_id("name");
        assert_eq!(id, None);
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_known_command() {
        let mut s = session();
        assert_eq!(s.execute("known_command", &["genmove"]).unwrap(), "true");
        assert_eq!(s.execute("known_command", &["komi"]).unwrap(), "false");
        assert!(s.execute("known_command", &[]).is_err());
    }

    #[test]
    fn test_moves_and_move() {
        let mut s = session();
        assert_eq!(s.execute("moves", &["4"]).unwrap(), "7");
        assert_eq!(s.execute("moves", &["1"]).unwrap(), "3 5");
        assert_eq!(s.execute("move", &["4", "7"]).unwrap(), "");
        assert_eq!(s.execute("hand", &["bottom"]).unwrap(), "p");
        assert_eq!(s.execute("turn", &[]).unwrap(), "top");
        assert_eq!(s.execute("cell", &["7"]).unwrap(), "p");
        assert_eq!(s.execute("cell", &["4"]).unwrap(), ".");
    }

    #[test]
    fn test_illegal_move_is_rejected() {
        let mut s = session();
        assert!(s.execute("move", &["4", "1"]).is_err());
        assert!(s.execute("move", &["3", "4"]).is_err());
        assert!(s.execute("move", &["4", "12"]).is_err());
        assert_eq!(s.execute("encode", &[]).unwrap(), DEFAULT_POSITION);
    }

    #[test]
    fn test_drop_and_undo() {
        let mut s = session();
        s.execute("dispatch", &["k2/3/3/2K", "b", "r"]).unwrap();
        assert_eq!(s.execute("hmoves", &["r"]).unwrap().split(' ').count(), 10);
        assert_eq!(s.execute("drop", &["r", "4"]).unwrap(), "");
        assert_eq!(s.execute("cell", &["4"]).unwrap(), "r");
        s.execute("undo", &[]).unwrap();
        assert_eq!(s.execute("encode", &[]).unwrap(), "k2/3/3/2K b r");
        assert!(s.execute("undo", &[]).is_err());
    }

    #[test]
    fn test_end_code_reported() {
        let mut s = session();
        s.execute("dispatch", &["k2/3/1K1/1r1", "b"]).unwrap();
        assert_eq!(s.execute("move", &["10", "7"]).unwrap(), "end 1");
        assert_eq!(s.execute("result", &[]).unwrap(), "1 bottom wins");
    }

    #[test]
    fn test_genmove_plays() {
        let mut s = session();
        s.execute("dispatch", &["k2/1R1/1r1/1K1", "b"]).unwrap();
        assert_eq!(s.execute("genmove", &[]).unwrap(), "7 10 end 1");
    }

    #[test]
    fn test_engine_answers() {
        let mut s = session().with_engine_side(Some(Player::Top)).with_seed(Some(5));
        let reply = s.execute("move", &["4", "7"]).unwrap();
        assert!(!reply.is_empty());
        assert_eq!(s.execute("turn", &[]).unwrap(), "bottom");
        assert_eq!(s.game().history().len(), 2);
    }

    #[test]
    fn test_run_loop() {
        let mut s = session();
        let input = b"1 name\nmoves 4\n# comment\n\nbogus\nquit\nname\n";
        let mut output = Vec::new();
        s.run(&input[..], &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(
            text,
            "=1 yokai-rust\n\n= 7\n\n? unknown command: bogus\n\n= \n\n"
        );
    }
}
