use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::cell::{Cell, CellFormat, CellValue};

/// Excel caps sheet names at 31 characters.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Case-insensitive lookup key for a sheet name.
pub fn normalize_sheet_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Sheet names must be non-empty, at most 31 chars, and free of `[]:*?/\`.
pub fn is_valid_sheet_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_SHEET_NAME_LEN
        && !trimmed.chars().any(|c| matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    name_key: String,
    cells: FxHashMap<(usize, usize), Cell>,
}

impl Sheet {
    pub fn new_with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            name_key: normalize_sheet_name(name),
            cells: FxHashMap::default(),
        }
    }

    pub fn name_key(&self) -> &str {
        &self.name_key
    }

    /// Set a typed value, keeping any existing format.
    pub fn set_value(&mut self, row: usize, col: usize, value: impl Into<CellValue>) {
        let value = value.into();
        if value == CellValue::Empty {
            if let Some(cell) = self.cells.get_mut(&(row, col)) {
                cell.value = CellValue::Empty;
            }
            return;
        }
        self.cells.entry((row, col)).or_insert_with(Cell::new).value = value;
    }

    pub fn get_value(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(&(row, col)).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    /// Display text of a cell ("" when empty).
    pub fn get_text(&self, row: usize, col: usize) -> String {
        self.get_value(row, col).raw_display()
    }

    pub fn get_format(&self, row: usize, col: usize) -> CellFormat {
        self.cells.get(&(row, col)).map(|c| c.format.clone()).unwrap_or_default()
    }

    pub fn set_format(&mut self, row: usize, col: usize, format: CellFormat) {
        self.cells.entry((row, col)).or_insert_with(Cell::new).format = format;
    }

    /// Mutable access to a cell's format, creating the cell if needed.
    pub fn format_mut(&mut self, row: usize, col: usize) -> &mut CellFormat {
        &mut self.cells.entry((row, col)).or_insert_with(Cell::new).format
    }

    /// Remove every cell, values and formats alike.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Remove every cell at or below `start_row`.
    pub fn clear_rows_from(&mut self, start_row: usize) -> usize {
        let before = self.cells.len();
        self.cells.retain(|(r, _), _| *r < start_row);
        before - self.cells.len()
    }

    /// Highest row index holding a non-empty value.
    pub fn max_row(&self) -> Option<usize> {
        self.cells
            .iter()
            .filter(|(_, c)| !c.value.is_empty())
            .map(|((r, _), _)| *r)
            .max()
    }

    /// Non-empty values of one row, ordered by column.
    pub fn row_values(&self, row: usize) -> Vec<(usize, &CellValue)> {
        let mut out: Vec<_> = self
            .cells
            .iter()
            .filter(|((r, _), c)| *r == row && !c.value.is_empty())
            .map(|((_, col), c)| (*col, &c.value))
            .collect();
        out.sort_by_key(|(col, _)| *col);
        out
    }

    /// Cells ordered by (row, col), for deterministic export.
    pub fn sorted_cells(&self) -> Vec<(&(usize, usize), &Cell)> {
        let mut cells: Vec<_> = self.cells.iter().collect();
        cells.sort_by_key(|(pos, _)| **pos);
        cells
    }
}
