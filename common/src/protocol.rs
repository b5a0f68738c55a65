use serde::{Deserialize, Serialize};

use crate::models::{CellView, GameParams, Level, Mode, Pos, RecordEntry};

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "reveal")]
    Reveal { pos: Pos },
    #[serde(rename = "flag")]
    Flag { pos: Pos },
    #[serde(rename = "restart")]
    Restart { params: GameParams },
    /// Name for a record the server offered with `record_qualified`.
    #[serde(rename = "claim_record")]
    ClaimRecord { name: String },
    #[serde(rename = "skip_record")]
    SkipRecord,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub pos: Pos,
    pub value: CellView,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init {
        mode: Mode,
        level: Level,
        rows: usize,
        columns: usize,
        mines: usize,
        flags: usize,
        /// Rounds already won in a challenge run.
        round: Option<u64>,
        /// Clock reading in seconds.
        time: u64,
        field: Vec<Vec<CellView>>,
    },
    #[serde(rename = "update")]
    Update {
        updates: Vec<CellUpdate>,
        flags: usize,
        won: bool,
        lost: bool,
    },
    #[serde(rename = "clock")]
    Clock { time: u64 },
    #[serde(rename = "record_qualified")]
    RecordQualified { mode: Mode, level: Level, score: u64 },
    #[serde(rename = "name_rejected")]
    NameRejected {
        name: String,
        reason: String,
        attempts_left: u32,
    },
    #[serde(rename = "record_saved")]
    RecordSaved {
        mode: Mode,
        level: Level,
        entries: Vec<RecordEntry>,
    },
    #[serde(rename = "record_declined")]
    RecordDeclined,
    #[serde(rename = "notice")]
    Notice { message: String },
}
