use minefield_common::models::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Hidden,
    Flagged,
    Revealed,
}

#[derive(Debug, Clone, Copy)]
pub struct Cell {
    pub state: CellState,
}

/// Fixed-size board of cells addressed by row and column.
#[derive(Debug)]
pub struct Grid {
    rows: usize,
    columns: usize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: vec![
                Cell {
                    state: CellState::Hidden
                };
                rows * columns
            ],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.row < self.rows && pos.col < self.columns
    }

    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        if !self.contains(pos) {
            return None;
        }
        self.cells.get(pos.row * self.columns + pos.col)
    }

    pub fn cell_mut(&mut self, pos: Pos) -> Option<&mut Cell> {
        if !self.contains(pos) {
            return None;
        }
        self.cells.get_mut(pos.row * self.columns + pos.col)
    }

    pub fn state(&self, pos: Pos) -> Option<CellState> {
        self.cell(pos).map(|cell| cell.state)
    }

    /// All positions in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Pos> + use<> {
        let columns = self.columns;
        (0..self.rows).flat_map(move |row| (0..columns).map(move |col| Pos { row, col }))
    }

    /// The surrounding cells of `pos`, clamped to the board edges.
    ///
    /// Corners have 3 neighbours, edges 5, inner cells 8.
    pub fn neighbors(&self, pos: Pos) -> Vec<Pos> {
        let mut neighbors = Vec::with_capacity(8);
        if self.is_empty() {
            return neighbors;
        }

        for row in pos.row.saturating_sub(1)..=(pos.row + 1).min(self.rows - 1) {
            for col in pos.col.saturating_sub(1)..=(pos.col + 1).min(self.columns - 1) {
                if row == pos.row && col == pos.col {
                    continue;
                }
                neighbors.push(Pos { row, col });
            }
        }

        neighbors
    }
}
