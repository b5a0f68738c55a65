use minefield_common::{
    models::{CellView, Pos},
    protocol::CellUpdate,
};
use rand::Rng;
use tracing::{debug, info};

use crate::{data::CellState, error::GameError, logic::field::MineField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Won,
    Lost,
}

impl Outcome {
    pub fn is_over(&self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Notifications for whoever hosts the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The first reveal of the session happened; start the clock.
    FirstReveal,
    /// The session reached a terminal outcome; stop the clock.
    Over(Outcome),
}

/// Everything that changed during one player action.
#[derive(Debug, Default)]
pub struct Step {
    pub updates: Vec<CellUpdate>,
    pub events: Vec<SessionEvent>,
}

impl Step {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.events.is_empty()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.events.iter().find_map(|event| match event {
            SessionEvent::Over(outcome) => Some(*outcome),
            SessionEvent::FirstReveal => None,
        })
    }

    pub fn first_reveal(&self) -> bool {
        self.events.contains(&SessionEvent::FirstReveal)
    }
}

/// A single round of minesweeper.
#[derive(Debug)]
pub struct GameSession {
    field: MineField,
    outcome: Outcome,
    flags: usize,
    safe_revealed: usize,
}

impl GameSession {
    pub fn new(rows: usize, columns: usize, mines: usize) -> Result<Self, GameError> {
        Ok(Self::from_field(MineField::new(rows, columns, mines)?))
    }

    pub(crate) fn from_field(field: MineField) -> Self {
        Self {
            field,
            outcome: Outcome::InProgress,
            flags: 0,
            safe_revealed: 0,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn flags(&self) -> usize {
        self.flags
    }

    pub fn rows(&self) -> usize {
        self.field.grid().rows()
    }

    pub fn columns(&self) -> usize {
        self.field.grid().columns()
    }

    pub fn mine_count(&self) -> usize {
        self.field.mine_count()
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.field.grid().contains(pos)
    }

    /// True once every cell without a mine has been revealed.
    pub fn win(&self) -> bool {
        self.outcome != Outcome::Lost
            && self.field.is_placed()
            && self.safe_revealed + self.field.mine_count() == self.field.grid().len()
    }

    pub fn cell_view(&self, pos: Pos) -> Option<CellView> {
        let state = self.field.grid().state(pos)?;
        Some(match state {
            CellState::Hidden => CellView::Hidden,
            CellState::Flagged => CellView::Flagged,
            CellState::Revealed if self.field.is_mine(pos) => CellView::Mine,
            CellState::Revealed => CellView::Revealed {
                adjacent: self.field.adjacent_mine_count(pos),
            },
        })
    }

    /// The board as rows of cell views.
    pub fn view(&self) -> Vec<Vec<CellView>> {
        let grid = self.field.grid();
        (0..grid.rows())
            .map(|row| {
                (0..grid.columns())
                    .filter_map(|col| self.cell_view(Pos { row, col }))
                    .collect()
            })
            .collect()
    }

    pub fn reveal(&mut self, pos: Pos) -> Step {
        self.reveal_with(pos, &mut rand::rng())
    }

    /// Reveal `pos`, laying the mines first if nothing was revealed yet.
    ///
    /// Hidden cells only: flagged, revealed or out-of-range targets and
    /// finished sessions leave everything untouched.
    pub fn reveal_with<R: Rng>(&mut self, pos: Pos, rng: &mut R) -> Step {
        let mut step = Step::default();
        if self.outcome.is_over() || self.field.grid().state(pos) != Some(CellState::Hidden) {
            return step;
        }

        if !self.field.is_placed() {
            let count = self.field.mine_count();
            if let Err(e) = self.field.place_mines(pos, count, rng) {
                // The count was validated when the field was built.
                debug!("Mine placement refused: {}", e);
                return step;
            }
            step.events.push(SessionEvent::FirstReveal);
        }

        if self.field.is_mine(pos) {
            self.mark_revealed(pos, &mut step);
            self.lose(&mut step);
            return step;
        }

        self.flood_reveal(pos, &mut step);

        if self.win() {
            self.outcome = Outcome::Won;
            info!(
                "Board {}x{} cleared",
                self.field.grid().rows(),
                self.field.grid().columns()
            );
            step.events.push(SessionEvent::Over(Outcome::Won));
        }

        step
    }

    /// Reveal a safe cell and, when it borders no mine, the whole blank
    /// region around it plus that region's numbered rim.
    fn flood_reveal(&mut self, start: Pos, step: &mut Step) {
        self.mark_revealed(start, step);
        let mut pending = vec![start];

        while let Some(pos) = pending.pop() {
            if self.field.adjacent_mine_count(pos) != 0 {
                continue;
            }

            for neighbor in self.field.grid().neighbors(pos) {
                if self.field.grid().state(neighbor) == Some(CellState::Hidden) {
                    self.mark_revealed(neighbor, step);
                    pending.push(neighbor);
                }
            }
        }
    }

    fn mark_revealed(&mut self, pos: Pos, step: &mut Step) {
        if let Some(cell) = self.field.grid_mut().cell_mut(pos) {
            cell.state = CellState::Revealed;
        }
        if !self.field.is_mine(pos) {
            self.safe_revealed += 1;
        }
        if let Some(value) = self.cell_view(pos) {
            step.updates.push(CellUpdate { pos, value });
        }
    }

    /// Flagged mines are exposed too. The flag counter keeps counting them:
    /// only flag and unflag change it.
    fn lose(&mut self, step: &mut Step) {
        self.outcome = Outcome::Lost;
        let hidden_mines: Vec<Pos> = self
            .field
            .mines()
            .filter(|mine| self.field.grid().state(*mine) != Some(CellState::Revealed))
            .collect();
        for mine in hidden_mines {
            self.mark_revealed(mine, step);
        }
        info!("Session lost, {} mines exposed", self.field.mine_count());
        step.events.push(SessionEvent::Over(Outcome::Lost));
    }

    /// The countdown ran out before the board was cleared.
    pub fn expire(&mut self) -> Step {
        let mut step = Step::default();
        if self.outcome.is_over() {
            return step;
        }
        self.lose(&mut step);
        step
    }

    /// Flag a hidden cell or clear an existing flag.
    pub fn toggle_flag(&mut self, pos: Pos) -> Option<CellUpdate> {
        if self.outcome.is_over() {
            return None;
        }

        let cell = self.field.grid_mut().cell_mut(pos)?;
        match cell.state {
            CellState::Hidden => {
                cell.state = CellState::Flagged;
                self.flags += 1;
            }
            CellState::Flagged => {
                cell.state = CellState::Hidden;
                self.flags -= 1;
            }
            CellState::Revealed => return None,
        }

        Some(CellUpdate {
            pos,
            value: self.cell_view(pos)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn session_with_mines(rows: usize, columns: usize, mines: &[Pos]) -> GameSession {
        GameSession::from_field(MineField::with_mines(rows, columns, mines))
    }

    fn revealed(session: &GameSession) -> usize {
        session
            .view()
            .iter()
            .flatten()
            .filter(|cell| matches!(cell, CellView::Revealed { .. } | CellView::Mine))
            .count()
    }

    #[test]
    fn first_reveal_is_never_a_mine() {
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut session = GameSession::new(5, 5, 20).unwrap();
            let step = session.reveal_with(Pos::new(2, 2), &mut rng);

            assert!(step.first_reveal());
            assert_ne!(session.outcome(), Outcome::Lost);
            assert_eq!(session.cell_view(Pos::new(2, 2)).map(|c| c != CellView::Mine), Some(true));
        }
    }

    #[test]
    fn first_reveal_event_fires_once() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut session = GameSession::new(9, 9, 10).unwrap();
        let first = session.reveal_with(Pos::new(0, 0), &mut rng);
        assert!(first.first_reveal());

        let hidden = (0..9)
            .flat_map(|row| (0..9).map(move |col| Pos::new(row, col)))
            .find(|pos| session.cell_view(*pos) == Some(CellView::Hidden));
        if let Some(pos) = hidden {
            let next = session.reveal_with(pos, &mut rng);
            assert!(!next.first_reveal());
        }
    }

    #[test]
    fn three_by_three_single_mine_win_and_loss() {
        let mine = Pos::new(0, 0);
        let mut session = session_with_mines(3, 3, &[mine]);
        let others: Vec<Pos> = (0..3)
            .flat_map(|row| (0..3).map(move |col| Pos::new(row, col)))
            .filter(|pos| *pos != mine)
            .collect();

        for pos in &others {
            let was_over = session.outcome().is_over();
            let step = session.reveal(*pos);
            if was_over {
                assert!(step.is_empty());
            }
        }
        assert_eq!(session.outcome(), Outcome::Won);
        assert!(session.win());
        assert_eq!(revealed(&session), 8);

        let mut session = session_with_mines(3, 3, &[mine]);
        session.reveal(Pos::new(0, 1));
        let step = session.reveal(mine);
        assert_eq!(step.outcome(), Some(Outcome::Lost));
        assert_eq!(session.outcome(), Outcome::Lost);
        assert!(!session.win());
    }

    #[test]
    fn win_only_after_the_last_safe_cell() {
        // Every safe cell is numbered here, so no flood fill helps.
        let mines = [Pos::new(0, 1), Pos::new(2, 1)];
        let mut session = session_with_mines(3, 3, &mines);
        let safe: Vec<Pos> = (0..3)
            .flat_map(|row| (0..3).map(move |col| Pos::new(row, col)))
            .filter(|pos| !mines.contains(pos))
            .collect();

        for (i, pos) in safe.iter().enumerate() {
            let step = session.reveal(*pos);
            assert_eq!(step.updates.len(), 1);
            if i + 1 == safe.len() {
                assert_eq!(step.outcome(), Some(Outcome::Won));
            } else {
                assert_eq!(session.outcome(), Outcome::InProgress);
            }
        }
    }

    #[test]
    fn flood_fill_reveals_blank_region_and_its_rim() {
        // Mine in the bottom-right corner of a 5x5 board.
        let mut session = session_with_mines(5, 5, &[Pos::new(4, 4)]);
        let step = session.reveal(Pos::new(0, 0));

        // Everything but the mine opens at once.
        assert_eq!(step.updates.len(), 24);
        assert_eq!(step.outcome(), Some(Outcome::Won));

        let mut positions: Vec<Pos> = step.updates.iter().map(|u| u.pos).collect();
        positions.sort();
        positions.dedup();
        assert_eq!(positions.len(), 24, "a cell was revealed twice");
        assert_eq!(
            session.cell_view(Pos::new(3, 3)),
            Some(CellView::Revealed { adjacent: 1 })
        );
    }

    #[test]
    fn flood_fill_stops_at_numbered_cells() {
        // A wall of mines down column 2 splits the board.
        let wall = [Pos::new(0, 2), Pos::new(1, 2), Pos::new(2, 2)];
        let mut session = session_with_mines(3, 5, &wall);
        let step = session.reveal(Pos::new(1, 0));

        let mut opened: Vec<Pos> = step.updates.iter().map(|u| u.pos).collect();
        opened.sort();
        let expected: Vec<Pos> = (0..3)
            .flat_map(|row| (0..2).map(move |col| Pos::new(row, col)))
            .collect();
        assert_eq!(opened, expected);
        assert_eq!(session.outcome(), Outcome::InProgress);
        assert_eq!(session.cell_view(Pos::new(1, 3)), Some(CellView::Hidden));
    }

    #[test]
    fn flood_fill_skips_flagged_cells() {
        let mut session = session_with_mines(4, 4, &[Pos::new(3, 3)]);
        session.toggle_flag(Pos::new(0, 3));
        session.reveal(Pos::new(0, 0));

        assert_eq!(session.cell_view(Pos::new(0, 3)), Some(CellView::Flagged));
        assert_eq!(session.outcome(), Outcome::InProgress);

        session.toggle_flag(Pos::new(0, 3));
        let step = session.reveal(Pos::new(0, 3));
        assert_eq!(step.outcome(), Some(Outcome::Won));
    }

    #[test]
    fn flood_fill_handles_large_boards() {
        let mut session = session_with_mines(400, 400, &[Pos::new(399, 399)]);
        let step = session.reveal(Pos::new(0, 0));
        assert_eq!(step.updates.len(), 400 * 400 - 1);
        assert_eq!(session.outcome(), Outcome::Won);
    }

    #[test]
    fn revealing_twice_is_a_no_op() {
        let mut session = session_with_mines(3, 3, &[Pos::new(0, 0), Pos::new(2, 2)]);
        let first = session.reveal(Pos::new(1, 1));
        assert_eq!(first.updates.len(), 1);
        assert!(session.reveal(Pos::new(1, 1)).is_empty());
    }

    #[test]
    fn flagged_cells_cannot_be_revealed() {
        let mut session = session_with_mines(3, 3, &[Pos::new(0, 0)]);
        session.toggle_flag(Pos::new(0, 0));
        assert!(session.reveal(Pos::new(0, 0)).is_empty());
        assert_eq!(session.outcome(), Outcome::InProgress);
    }

    #[test]
    fn flag_toggle_round_trip() {
        let mut session = session_with_mines(3, 3, &[Pos::new(0, 0)]);
        let pos = Pos::new(1, 2);

        let update = session.toggle_flag(pos).unwrap();
        assert_eq!(update.value, CellView::Flagged);
        assert_eq!(session.flags(), 1);

        let update = session.toggle_flag(pos).unwrap();
        assert_eq!(update.value, CellView::Hidden);
        assert_eq!(session.flags(), 0);
        assert_eq!(session.cell_view(pos), Some(CellView::Hidden));
    }

    #[test]
    fn flags_are_not_checked_against_mines() {
        let mut session = session_with_mines(2, 2, &[Pos::new(0, 0)]);
        for pos in [Pos::new(0, 0), Pos::new(0, 1), Pos::new(1, 0), Pos::new(1, 1)] {
            session.toggle_flag(pos);
        }
        assert_eq!(session.flags(), 4);
    }

    #[test]
    fn revealed_cells_cannot_be_flagged() {
        let mut session = session_with_mines(3, 3, &[Pos::new(0, 0)]);
        session.reveal(Pos::new(0, 1));
        assert!(session.toggle_flag(Pos::new(0, 1)).is_none());
        assert_eq!(session.flags(), 0);
    }

    #[test]
    fn finished_sessions_ignore_input() {
        let mut session = session_with_mines(3, 3, &[Pos::new(0, 0)]);
        session.reveal(Pos::new(0, 0));
        assert_eq!(session.outcome(), Outcome::Lost);

        assert!(session.reveal(Pos::new(2, 2)).is_empty());
        assert!(session.toggle_flag(Pos::new(2, 2)).is_none());
        assert!(session.expire().is_empty());
    }

    #[test]
    fn losing_exposes_every_mine() {
        let mines = [Pos::new(0, 0), Pos::new(2, 2), Pos::new(0, 2)];
        let mut session = session_with_mines(3, 3, &mines);
        session.toggle_flag(Pos::new(2, 2));
        let step = session.reveal(Pos::new(0, 0));

        assert_eq!(step.updates.len(), 3);
        for mine in mines {
            assert_eq!(session.cell_view(mine), Some(CellView::Mine));
        }
    }

    #[test]
    fn losing_keeps_the_flag_count() {
        let mines = [Pos::new(0, 0), Pos::new(2, 2)];
        let mut session = session_with_mines(3, 3, &mines);
        session.toggle_flag(Pos::new(2, 2));
        session.toggle_flag(Pos::new(1, 1));
        session.reveal(Pos::new(0, 0));

        assert_eq!(session.outcome(), Outcome::Lost);
        assert_eq!(session.cell_view(Pos::new(2, 2)), Some(CellView::Mine));
        assert_eq!(session.cell_view(Pos::new(1, 1)), Some(CellView::Flagged));
        assert_eq!(session.flags(), 2);
    }

    #[test]
    fn expire_loses_a_running_session() {
        let mut session = session_with_mines(3, 3, &[Pos::new(0, 0)]);
        session.reveal(Pos::new(0, 1));
        let step = session.expire();
        assert_eq!(step.outcome(), Some(Outcome::Lost));
        assert_eq!(session.cell_view(Pos::new(0, 0)), Some(CellView::Mine));
    }

    #[test]
    fn out_of_range_targets_are_ignored() {
        let mut session = session_with_mines(3, 3, &[Pos::new(0, 0)]);
        assert!(session.reveal(Pos::new(3, 0)).is_empty());
        assert!(session.toggle_flag(Pos::new(0, 7)).is_none());
    }
}
