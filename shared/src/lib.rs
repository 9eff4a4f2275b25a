//! Wire-level types for the shared word grid.
//!
//! Clients talk to the server with comma-separated text commands terminated by
//! the `END` sentinel:
//!
//! ```text
//! WRITE,<x>,<y>,<direction>,<word>,END
//! READ,<x>,<y>,<direction>,END
//! ```
//!
//! `x` addresses the grid row and `y` the column. `+X`/`-X` walk along the
//! row (column index ±1 per character), `+Y`/`-Y` walk down or up the column
//! (row index ±1 per character).
//!
//! Commands are not length-prefixed, so a single socket read may carry any
//! number of complete commands plus a partial trailing one. [`CommandDecoder`]
//! buffers bytes across reads and only yields a command once its sentinel has
//! arrived.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const GRID_SIZE: usize = 30;
pub const EMPTY_CELL: u8 = 0;
pub const COMMAND_SENTINEL: &[u8] = b"END";
pub const FIELD_SEPARATOR: char = ',';
/// Longest unterminated command a decoder will buffer
pub const MAX_COMMAND_LEN: usize = 1024;

pub const WRITE_OP: &str = "WRITE";
pub const READ_OP: &str = "READ";

/// Errors raised while turning a token list into a [`Command`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("unknown direction {0:?}")]
    UnknownDirection(String),

    #[error("{pending} bytes buffered without a sentinel, limit is {limit}")]
    CommandTooLong { pending: usize, limit: usize },
}

/// One of the four unit steps used to place or read consecutive cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    IncreasingX,
    DecreasingX,
    IncreasingY,
    DecreasingY,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::IncreasingX,
        Direction::DecreasingX,
        Direction::IncreasingY,
        Direction::DecreasingY,
    ];

    pub fn as_token(&self) -> &'static str {
        match self {
            Direction::IncreasingX => "+X",
            Direction::DecreasingX => "-X",
            Direction::IncreasingY => "+Y",
            Direction::DecreasingY => "-Y",
        }
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|direction| direction.as_token() == token)
            .ok_or_else(|| ProtocolError::UnknownDirection(token.to_string()))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// A cell address on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Returns the cell `steps` cells away along `direction`, or `None` when
    /// that cell lies outside a `size` x `size` grid.
    pub fn step(&self, direction: Direction, steps: usize, size: usize) -> Option<Position> {
        let (row, col) = match direction {
            Direction::IncreasingX => (Some(self.row), self.col.checked_add(steps)),
            Direction::DecreasingX => (Some(self.row), self.col.checked_sub(steps)),
            Direction::IncreasingY => (self.row.checked_add(steps), Some(self.col)),
            Direction::DecreasingY => (self.row.checked_sub(steps), Some(self.col)),
        };

        match (row, col) {
            (Some(row), Some(col)) if row < size && col < size => Some(Position { row, col }),
            _ => None,
        }
    }

    pub fn is_inside(&self, size: usize) -> bool {
        self.row < size && self.col < size
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// A validated client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Write {
        origin: Position,
        direction: Direction,
        word: String,
    },
    Read {
        origin: Position,
        direction: Direction,
    },
}

impl Command {
    /// Validates a decoded token list.
    ///
    /// Returns `Ok(None)` for shapes the protocol silently ignores: fewer than
    /// four tokens, an unrecognized operation, or a WRITE without a word.
    /// Extra trailing tokens are ignored.
    pub fn parse(tokens: &[String]) -> Result<Option<Command>, ProtocolError> {
        if tokens.len() < 4 {
            return Ok(None);
        }

        match tokens[0].as_str() {
            WRITE_OP if tokens.len() >= 5 => {
                let origin = parse_origin(&tokens[1], &tokens[2])?;
                let direction = tokens[3].parse()?;
                let word = tokens[4].clone();
                if let Some(byte) = word.bytes().find(|b| !is_placeable(*b)) {
                    return Err(ProtocolError::MalformedCommand(format!(
                        "word contains non-printable byte 0x{:02x}",
                        byte
                    )));
                }
                Ok(Some(Command::Write {
                    origin,
                    direction,
                    word,
                }))
            }
            READ_OP => {
                let origin = parse_origin(&tokens[1], &tokens[2])?;
                let direction = tokens[3].parse()?;
                Ok(Some(Command::Read { origin, direction }))
            }
            _ => Ok(None),
        }
    }

    /// Renders the command in wire format, sentinel included
    pub fn encode(&self) -> String {
        match self {
            Command::Write {
                origin,
                direction,
                word,
            } => format!(
                "{WRITE_OP},{},{},{},{},END",
                origin.row, origin.col, direction, word
            ),
            Command::Read { origin, direction } => {
                format!("{READ_OP},{},{},{},END", origin.row, origin.col, direction)
            }
        }
    }
}

/// Bytes that may be stored in a cell
pub fn is_placeable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

fn parse_origin(x: &str, y: &str) -> Result<Position, ProtocolError> {
    Ok(Position::new(parse_coordinate(x)?, parse_coordinate(y)?))
}

fn parse_coordinate(token: &str) -> Result<usize, ProtocolError> {
    token
        .trim()
        .parse::<usize>()
        .map_err(|_| ProtocolError::MalformedCommand(format!("invalid coordinate {:?}", token)))
}

/// Incremental splitter for sentinel-terminated commands.
///
/// Bytes are appended with [`CommandDecoder::extend`]; complete commands are
/// pulled with [`CommandDecoder::next_command`]. Anything after the last
/// sentinel stays buffered until more bytes arrive.
#[derive(Debug, Default)]
pub struct CommandDecoder {
    buffer: Vec<u8>,
    /// Offset before which the buffer is known not to contain a sentinel
    search_from: usize,
}

impl CommandDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet part of a complete command
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Pops the next complete command as a token list
    pub fn next_command(&mut self) -> Option<Vec<String>> {
        let found = self.buffer[self.search_from..]
            .windows(COMMAND_SENTINEL.len())
            .position(|window| window == COMMAND_SENTINEL);

        let Some(offset) = found else {
            self.search_from = self
                .buffer
                .len()
                .saturating_sub(COMMAND_SENTINEL.len() - 1);
            return None;
        };

        let end = self.search_from + offset;
        let frame: Vec<u8> = self.buffer.drain(..end + COMMAND_SENTINEL.len()).collect();
        self.search_from = 0;
        Some(tokenize(&frame[..end]))
    }

    /// Fails once the unterminated tail grows past [`MAX_COMMAND_LEN`].
    ///
    /// Call after draining complete commands; a peer that never sends the
    /// sentinel would otherwise grow the buffer without bound.
    pub fn check_pending(&self) -> Result<(), ProtocolError> {
        if self.buffer.len() > MAX_COMMAND_LEN {
            return Err(ProtocolError::CommandTooLong {
                pending: self.buffer.len(),
                limit: MAX_COMMAND_LEN,
            });
        }
        Ok(())
    }

    /// Lazily yields every complete command currently buffered
    pub fn commands(&mut self) -> impl Iterator<Item = Vec<String>> + '_ {
        std::iter::from_fn(move || self.next_command())
    }
}

fn tokenize(text: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(text);
    let mut tokens: Vec<String> = text
        .split(FIELD_SEPARATOR)
        .map(|token| token.trim_matches(|c| c == '\r' || c == '\n').to_string())
        .collect();

    // "WRITE,1,2,+X,HI,END" leaves an empty field before the sentinel
    if tokens.last().is_some_and(|token| token.is_empty()) {
        tokens.pop();
    }
    tokens
}
