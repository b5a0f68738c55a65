use minefield_common::models::{BoardSize, Level};
use tracing::debug;

/// How a challenge run escalates from round to round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeRules {
    /// Time budget of the first round, in seconds.
    pub time: u64,
    pub time_step: u64,
    pub time_floor: u64,
    /// A mine is added every `mine_period` rounds.
    pub mine_period: u64,
}

impl ChallengeRules {
    pub fn for_level(level: Level) -> Self {
        match level {
            Level::Easy => Self {
                time: 900,
                time_step: 5,
                time_floor: 300,
                mine_period: 2,
            },
            Level::Normal => Self {
                time: 600,
                time_step: 5,
                time_floor: 240,
                mine_period: 1,
            },
            Level::Hard => Self {
                time: 600,
                time_step: 6,
                time_floor: 180,
                mine_period: 1,
            },
        }
    }
}

/// Board and time budget of one challenge round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundParameters {
    pub rows: usize,
    pub columns: usize,
    pub mines: usize,
    pub time_budget: u64,
}

#[derive(Debug, Clone)]
pub struct ChallengeController {
    params: RoundParameters,
    rules: ChallengeRules,
    round: u64,
}

impl ChallengeController {
    pub fn new(level: Level) -> Self {
        Self::with_rules(level.board(), ChallengeRules::for_level(level))
    }

    pub fn with_rules(board: BoardSize, rules: ChallengeRules) -> Self {
        Self {
            params: RoundParameters {
                rows: board.rows,
                columns: board.columns,
                mines: board.mines,
                time_budget: rules.time,
            },
            rules,
            round: 0,
        }
    }

    /// Parameters of the round being played.
    pub fn parameters(&self) -> RoundParameters {
        self.params
    }

    /// Rounds won so far; the score of the run.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Make the next round harder after a won round and return its
    /// parameters.
    pub fn next_round_parameters(&mut self) -> RoundParameters {
        let round = self.round;
        let period = self.rules.mine_period.max(1);

        if self.params.time_budget > self.rules.time_floor {
            self.params.time_budget = self
                .params
                .time_budget
                .saturating_sub(self.rules.time_step)
                .max(self.rules.time_floor);
        }

        if round % period == 0 {
            self.params.mines += 1;
        }

        if round % (period * 4) == 0 {
            self.params.rows += 1;
        } else if round % (period * 2) == 0 {
            self.params.columns += 1;
        }

        self.round += 1;
        debug!(
            "Challenge round {}: {}x{} with {} mines, {}s",
            self.round,
            self.params.rows,
            self.params.columns,
            self.params.mines,
            self.params.time_budget
        );
        self.params
    }
}
