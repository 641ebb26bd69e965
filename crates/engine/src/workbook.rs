use serde::{Deserialize, Serialize};

use crate::sheet::{is_valid_sheet_name, normalize_sheet_name, Sheet};

/// A workbook containing multiple sheets, in tab order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Create an empty workbook (no sheets).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Get the number of sheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Get a reference to a sheet by index
    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    /// Get a mutable reference to a sheet by index
    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Index of a sheet by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let key = normalize_sheet_name(name);
        self.sheets.iter().position(|s| s.name_key() == key)
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheet_index(name).and_then(|i| self.sheets.get(i))
    }

    pub fn sheet_by_name_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheet_index(name).and_then(move |i| self.sheets.get_mut(i))
    }

    /// Check if a sheet name already exists (case-insensitive)
    pub fn sheet_name_exists(&self, name: &str) -> bool {
        self.sheet_index(name).is_some()
    }

    /// Add a new sheet with a specific name
    /// Returns None if name is invalid or already exists
    pub fn add_sheet_named(&mut self, name: &str) -> Option<usize> {
        if !is_valid_sheet_name(name) || self.sheet_name_exists(name) {
            return None;
        }
        self.sheets.push(Sheet::new_with_name(name));
        Some(self.sheets.len() - 1)
    }
}
