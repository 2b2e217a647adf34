// Cell index: O(1) lookup of a cell by (row, column).
//
// The index owns the cell collection and rebuilds its key map whenever
// membership changes. Value edits happen in place and keep positions valid.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::model::CellData;

/// Composite lookup key. Two UUIDs side by side cannot collide, unlike a
/// delimiter-joined string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row_id: Uuid,
    pub column_id: Uuid,
}

impl CellKey {
    pub fn new(row_id: Uuid, column_id: Uuid) -> Self {
        Self { row_id, column_id }
    }

    pub fn of(cell: &CellData) -> Self {
        Self::new(cell.row_id, cell.column_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CellIndex {
    cells: Vec<CellData>,
    slots: HashMap<CellKey, usize>,
}

impl CellIndex {
    /// Build an index over `cells`. If two cells share a key the later one
    /// wins and the earlier is dropped.
    pub fn build(cells: Vec<CellData>) -> Self {
        let mut index = Self { cells, slots: HashMap::new() };
        index.dedup();
        index.rebuild();
        index
    }

    fn dedup(&mut self) {
        let mut last: HashMap<CellKey, usize> = HashMap::with_capacity(self.cells.len());
        for (pos, cell) in self.cells.iter().enumerate() {
            last.insert(CellKey::of(cell), pos);
        }
        if last.len() == self.cells.len() {
            return;
        }

        warn!(
            cells = self.cells.len(),
            unique = last.len(),
            "duplicate (row, column) cells found; keeping the last of each"
        );
        let mut pos = 0;
        self.cells.retain(|cell| {
            let keep = last.get(&CellKey::of(cell)) == Some(&pos);
            pos += 1;
            keep
        });
    }

    fn rebuild(&mut self) {
        self.slots = self.cells.iter().enumerate().map(|(pos, c)| (CellKey::of(c), pos)).collect();
    }

    pub fn get(&self, row_id: Uuid, column_id: Uuid) -> Option<&CellData> {
        self.slots.get(&CellKey::new(row_id, column_id)).map(|&pos| &self.cells[pos])
    }

    pub fn get_mut(&mut self, row_id: Uuid, column_id: Uuid) -> Option<&mut CellData> {
        let pos = *self.slots.get(&CellKey::new(row_id, column_id))?;
        Some(&mut self.cells[pos])
    }

    pub fn get_by_id(&self, cell_id: Uuid) -> Option<&CellData> {
        self.cells.iter().find(|c| c.id == cell_id)
    }

    /// Insert a cell, replacing any existing cell at the same key.
    pub fn insert(&mut self, cell: CellData) {
        let key = CellKey::of(&cell);
        match self.slots.get(&key) {
            Some(&pos) => self.cells[pos] = cell,
            None => {
                self.cells.push(cell);
                self.rebuild();
            }
        }
    }

    /// Drop every cell the predicate rejects; returns the removed cells.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<CellData>
    where
        F: FnMut(&CellData) -> bool,
    {
        let (kept, removed): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.cells).into_iter().partition(|c| keep(c));
        self.cells = kept;
        self.rebuild();
        removed
    }

    pub fn cells(&self) -> &[CellData] {
        &self.cells
    }

    pub fn row_cells(&self, row_id: Uuid) -> impl Iterator<Item = &CellData> {
        self.cells.iter().filter(move |c| c.row_id == row_id)
    }

    pub fn column_cells(&self, column_id: Uuid) -> impl Iterator<Item = &CellData> {
        self.cells.iter().filter(move |c| c.column_id == column_id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
