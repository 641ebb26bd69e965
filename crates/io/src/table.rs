// Header-detected tabular view over flat exports and Excel sheets

use std::path::Path;

/// Rows scanned when looking for the header row.
pub const HEADER_SCAN_ROWS: usize = 50;
/// Minimum non-empty cells for a row to count as the header.
pub const MIN_HEADER_CELLS: usize = 3;

/// A table of string cells with one header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 0-indexed row of the header within the source grid.
    pub header_row: usize,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows, header_row: 0 }
    }

    /// Build a table from a raw grid: the first row within `scan_limit` rows that has
    /// at least [`MIN_HEADER_CELLS`] non-empty cells becomes the header.
    pub fn from_grid(grid: Vec<Vec<String>>, scan_limit: usize) -> Option<Self> {
        let header_row = grid
            .iter()
            .take(scan_limit)
            .position(|row| non_empty_count(row) >= MIN_HEADER_CELLS)?;

        let mut iter = grid.into_iter().skip(header_row);
        let headers: Vec<String> = iter.next()?.into_iter().map(|h| h.trim().to_string()).collect();
        let rows = iter.filter(|row| non_empty_count(row) > 0).collect();

        Some(Self { headers, rows, header_row })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column index by exact (trimmed) header text.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Cell text; short rows read as empty.
    pub fn get(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

fn non_empty_count(row: &[String]) -> usize {
    row.iter().filter(|c| !c.trim().is_empty()).count()
}

/// Every cell of a flat export (`.csv`, `.txt`, `.tsv`) or of a workbook's
/// first sheet (`.xlsx`, `.xls`, ...), as text.
pub fn read_grid(path: &Path) -> Result<Vec<Vec<String>>, String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" | "txt" | "tsv" => crate::csv::read_grid(path),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => crate::xlsx::read_first_sheet_grid(path),
        other => Err(format!("unsupported export format '.{other}': {}", path.display())),
    }
}

/// Read a flat export or workbook into a table.
pub fn read_table(path: &Path) -> Result<RawTable, String> {
    let grid = read_grid(path)?;

    RawTable::from_grid(grid, HEADER_SCAN_ROWS).ok_or_else(|| {
        format!(
            "no header row (>= {MIN_HEADER_CELLS} filled cells) in the first {HEADER_SCAN_ROWS} rows of {}",
            path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect()
    }

    #[test]
    fn test_header_after_title_rows() {
        let g = grid(&[
            &["FERREINOX S.A.S."],
            &["", "Movimientos"],
            &["NIT", "CANTIDAD", "VENTAS"],
            &["1", "2", "3"],
            &["", "", ""],
            &["4", "5", "6"],
        ]);
        let t = RawTable::from_grid(g, HEADER_SCAN_ROWS).unwrap();
        assert_eq!(t.header_row, 2);
        assert_eq!(t.headers, vec!["NIT", "CANTIDAD", "VENTAS"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1, 2), "6");
    }

    #[test]
    fn test_no_header_within_limit() {
        let mut g = vec![vec!["x".to_string()]; 5];
        g.push(vec!["a".into(), "b".into(), "c".into()]);
        assert!(RawTable::from_grid(g.clone(), 5).is_none());
        assert!(RawTable::from_grid(g, 6).is_some());
    }

    #[test]
    fn test_short_rows_read_empty() {
        let t = RawTable::new(vec!["a".into(), "b".into()], vec![vec!["1".into()]]);
        assert_eq!(t.get(0, 1), "");
        assert_eq!(t.get(9, 0), "");
        assert_eq!(t.column("b"), Some(1));
    }

    #[test]
    fn test_read_table_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("EXCZ98020250115093000.csv");
        fs::write(&path, "Listado\nNIT;CANTIDAD;VENTAS\n900;2;1.000,50\n").unwrap();
        let t = read_table(&path).unwrap();
        assert_eq!(t.headers, vec!["NIT", "CANTIDAD", "VENTAS"]);
        assert_eq!(t.get(0, 2), "1.000,50");
    }

    #[test]
    fn test_read_grid_keeps_leading_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("movimientocontable1501.csv");
        fs::write(&path, "0024;900123\n0011;900124\n").unwrap();
        let grid = read_grid(&path).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0], vec!["0024", "900123"]);
    }

    #[test]
    fn test_read_table_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.pdf");
        fs::write(&path, "x").unwrap();
        assert!(read_table(&path).unwrap_err().contains("unsupported"));
    }
}
