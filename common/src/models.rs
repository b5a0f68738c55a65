use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// What a player may see of a single cell.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "state")]
pub enum CellView {
    #[serde(rename = "hidden")]
    Hidden,
    #[serde(rename = "flagged")]
    Flagged,
    #[serde(rename = "revealed")]
    Revealed { adjacent: u8 },
    #[serde(rename = "mine")]
    Mine,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One open-ended round; the clock counts up and lower times rank higher.
    #[default]
    Classic,
    /// Escalating rounds against a shrinking countdown; more rounds rank higher.
    Challenge,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Easy,
    Normal,
    Hard,
}

/// Board dimensions and mine count of a single round.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardSize {
    pub rows: usize,
    pub columns: usize,
    pub mines: usize,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Classic, Mode::Challenge];

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Classic => "classic",
            Mode::Challenge => "challenge",
        }
    }
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Easy, Level::Normal, Level::Hard];

    pub fn name(&self) -> &'static str {
        match self {
            Level::Easy => "easy",
            Level::Normal => "normal",
            Level::Hard => "hard",
        }
    }

    /// The classic board for this level, also the first round of a challenge run.
    pub fn board(&self) -> BoardSize {
        match self {
            Level::Easy => BoardSize {
                rows: 9,
                columns: 9,
                mines: 10,
            },
            Level::Normal => BoardSize {
                rows: 16,
                columns: 16,
                mines: 40,
            },
            Level::Hard => BoardSize {
                rows: 16,
                columns: 36,
                mines: 99,
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| format!("unknown mode: {s}"))
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.name() == s)
            .ok_or_else(|| format!("unknown level: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GameParams {
    pub mode: Mode,
    pub level: Level,
}

#[derive(Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RecordEntry {
    pub name: String,
    pub score: u64,
}
