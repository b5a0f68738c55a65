use std::collections::HashSet;

use minefield_common::models::Pos;
use rand::Rng;
use tracing::debug;

use crate::{data::Grid, error::GameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Unplaced,
    Placed,
}

/// A grid plus the mines hidden in it.
///
/// Mines are laid lazily by the first reveal, so the first clicked cell is
/// never one of them.
#[derive(Debug)]
pub struct MineField {
    grid: Grid,
    mine_count: usize,
    mines: HashSet<Pos>,
    placement: Placement,
}

fn check_fits(rows: usize, columns: usize, mines: usize) -> Result<(), GameError> {
    if mines >= rows * columns {
        return Err(GameError::InvalidConfiguration {
            rows,
            columns,
            mines,
        });
    }
    Ok(())
}

impl MineField {
    pub fn new(rows: usize, columns: usize, mine_count: usize) -> Result<Self, GameError> {
        check_fits(rows, columns, mine_count)?;
        Ok(Self {
            grid: Grid::new(rows, columns),
            mine_count,
            mines: HashSet::with_capacity(mine_count),
            placement: Placement::Unplaced,
        })
    }

    /// Lay `count` mines anywhere but `excluding`.
    ///
    /// Every cell other than `excluding` is equally likely to hold a mine.
    /// Calling this again once placed does nothing.
    pub fn place_mines<R: Rng>(
        &mut self,
        excluding: Pos,
        count: usize,
        rng: &mut R,
    ) -> Result<(), GameError> {
        check_fits(self.grid.rows(), self.grid.columns(), count)?;
        if self.placement == Placement::Placed {
            return Ok(());
        }

        let mut mines_left = count;
        let mut candidates_left = self.grid.len() - usize::from(self.grid.contains(excluding));
        for pos in self.grid.positions() {
            if pos == excluding {
                continue;
            }
            if mines_left > 0 && rng.random_ratio(mines_left as u32, candidates_left as u32) {
                self.mines.insert(pos);
                mines_left -= 1;
            }
            candidates_left -= 1;
        }

        self.mine_count = count;
        self.placement = Placement::Placed;
        debug!(
            "Placed {} mines on a {}x{} board, avoiding ({}, {})",
            self.mines.len(),
            self.grid.rows(),
            self.grid.columns(),
            excluding.row,
            excluding.col
        );
        Ok(())
    }

    pub fn is_mine(&self, pos: Pos) -> bool {
        self.mines.contains(&pos)
    }

    pub fn adjacent_mine_count(&self, pos: Pos) -> u8 {
        self.grid
            .neighbors(pos)
            .into_iter()
            .filter(|neighbor| self.is_mine(*neighbor))
            .count() as u8
    }

    pub fn is_placed(&self) -> bool {
        self.placement == Placement::Placed
    }

    pub fn mine_count(&self) -> usize {
        self.mine_count
    }

    pub fn mines(&self) -> impl Iterator<Item = Pos> + '_ {
        self.mines.iter().copied()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// A field with mines at fixed positions, already placed.
    #[cfg(test)]
    pub(crate) fn with_mines(rows: usize, columns: usize, mines: &[Pos]) -> Self {
        Self {
            grid: Grid::new(rows, columns),
            mine_count: mines.len(),
            mines: mines.iter().copied().collect(),
            placement: Placement::Placed,
        }
    }
}
