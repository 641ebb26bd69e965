// Excel import (calamine) and export (rust_xlsxwriter)

use std::fs::OpenOptions;
use std::path::Path;
use std::time::Instant;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook as XlsxWorkbook, Worksheet};
use rentab_engine::cell::{CellFormat, CellValue, NumberFormat};
use rentab_engine::sheet::Sheet;
use rentab_engine::workbook::Workbook;

/// Accounting layout used by the ledger templates (`$` left-aligned, dash for zero).
pub const ACCOUNTING_FORMAT: &str =
    "_-[$$-409]* #,##0.00_-;\\-[$$-409]* #,##0.00_-;_-[$$-409]* \"-\"??_-;_-@_-";

/// Statistics from an import operation
#[derive(Debug, Default, Clone)]
pub struct ImportResult {
    pub sheets_imported: usize,
    pub cells_imported: usize,
    pub formulas_imported: usize,
    pub import_duration_ms: u128,
}

impl ImportResult {
    pub fn summary(&self) -> String {
        format!(
            "{} sheet{}, {} cells, {} formulas",
            self.sheets_imported,
            if self.sheets_imported == 1 { "" } else { "s" },
            self.cells_imported,
            self.formulas_imported
        )
    }
}

/// Statistics from an export operation
#[derive(Debug, Default, Clone)]
pub struct ExportResult {
    pub sheets_exported: usize,
    pub cells_exported: usize,
    pub formulas_exported: usize,
    pub export_duration_ms: u128,
}

fn open(path: &Path) -> Result<Sheets<std::io::BufReader<std::fs::File>>, String> {
    open_workbook_auto(path).map_err(|e| format!("Failed to open Excel file {}: {}", path.display(), e))
}

/// Plain text of an Excel value: integers without decimals, dates as serial numbers.
fn data_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => CellValue::Number(*n).raw_display(),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()).raw_display(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn data_to_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        other => CellValue::from(data_to_string(other)),
    }
}

/// Dense grid of the first worksheet, anchored at A1.
pub fn read_first_sheet_grid(path: &Path) -> Result<Vec<Vec<String>>, String> {
    let mut workbook = open(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| format!("Excel file contains no sheets: {}", path.display()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| format!("Failed to read sheet '{}': {}", first, e))?;

    Ok(range_to_grid(&range))
}

fn range_to_grid(range: &Range<Data>) -> Vec<Vec<String>> {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Vec<String>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut out = vec![String::new(); start_col as usize];
        out.extend(row.iter().map(|c| data_to_string(c).trim().to_string()));
        grid.push(out);
    }
    grid
}

/// Import every sheet of an Excel file: values plus formulas (formulas win).
pub fn import(path: &Path) -> Result<(Workbook, ImportResult), String> {
    let start_time = Instant::now();
    let mut workbook = open(path)?;
    let mut result = ImportResult::default();
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    if sheet_names.is_empty() {
        return Err("Excel file contains no sheets".to_string());
    }

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for sheet_name in &sheet_names {
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| format!("Failed to read sheet '{}': {}", sheet_name, e))?;

        let mut sheet = Sheet::new_with_name(sheet_name);

        // Range start offset (data may not begin at A1)
        let (data_start_row, data_start_col) = range.start().unwrap_or((0, 0));
        for (row_idx, row) in range.rows().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                let value = data_to_value(cell);
                if value.is_empty() {
                    continue;
                }
                sheet.set_value(data_start_row as usize + row_idx, data_start_col as usize + col_idx, value);
                result.cells_imported += 1;
            }
        }

        // Not every reader exposes formulas (xls); values alone are fine then
        if let Ok(formula_range) = workbook.worksheet_formula(sheet_name) {
            let (formula_start_row, formula_start_col) = formula_range.start().unwrap_or((0, 0));
            for (row_idx, row) in formula_range.rows().enumerate() {
                for (col_idx, formula) in row.iter().enumerate() {
                    if formula.is_empty() {
                        continue;
                    }
                    let source = if formula.starts_with('=') {
                        formula.clone()
                    } else {
                        format!("={}", formula)
                    };
                    sheet.set_value(
                        formula_start_row as usize + row_idx,
                        formula_start_col as usize + col_idx,
                        CellValue::Formula(source),
                    );
                    result.formulas_imported += 1;
                }
            }
        }

        sheets.push(sheet);
        result.sheets_imported += 1;
    }

    result.import_duration_ms = start_time.elapsed().as_millis();
    Ok((Workbook::from_sheets(sheets), result))
}

/// Fail early when the destination cannot be opened for writing (read-only, locked).
pub fn ensure_writable(path: &Path) -> Result<(), String> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| format!("{} is not writable: {}", path.display(), e))
}

/// Export a workbook to an .xlsx file, replacing it.
pub fn export(workbook: &Workbook, path: &Path) -> Result<ExportResult, String> {
    let start_time = Instant::now();
    let mut result = ExportResult::default();

    let mut xlsx_workbook = XlsxWorkbook::new();

    for sheet in workbook.sheets() {
        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(&sheet.name)
            .map_err(|e| format!("Failed to create sheet '{}': {}", sheet.name, e))?;

        let (cells, formulas) = export_sheet_cells(sheet, worksheet)?;
        result.cells_exported += cells;
        result.formulas_exported += formulas;
        result.sheets_exported += 1;
    }

    xlsx_workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;

    result.export_duration_ms = start_time.elapsed().as_millis();
    Ok(result)
}

fn export_sheet_cells(sheet: &Sheet, worksheet: &mut Worksheet) -> Result<(usize, usize), String> {
    let mut cells_exported = 0;
    let mut formulas_exported = 0;

    for ((row, col), cell) in sheet.sorted_cells() {
        let row32 = *row as u32;
        let col16 = *col as u16;
        let format = build_excel_format(&cell.format);

        match &cell.value {
            CellValue::Empty => {
                // Only write format if cell has formatting
                if cell.format != CellFormat::default() {
                    worksheet
                        .write_blank(row32, col16, &format)
                        .map_err(|e| format!("Failed to write cell ({}, {}): {}", row, col, e))?;
                    cells_exported += 1;
                }
            }
            CellValue::Text(s) => {
                worksheet
                    .write_string_with_format(row32, col16, s, &format)
                    .map_err(|e| format!("Failed to write cell ({}, {}): {}", row, col, e))?;
                cells_exported += 1;
            }
            CellValue::Number(n) => {
                worksheet
                    .write_number_with_format(row32, col16, *n, &format)
                    .map_err(|e| format!("Failed to write cell ({}, {}): {}", row, col, e))?;
                cells_exported += 1;
            }
            CellValue::Formula(source) => {
                let formula_str = source.strip_prefix('=').unwrap_or(source);
                worksheet
                    .write_formula_with_format(row32, col16, formula_str, &format)
                    .map_err(|e| format!("Failed to write formula ({}, {}): {}", row, col, e))?;
                formulas_exported += 1;
                cells_exported += 1;
            }
        }
    }

    Ok((cells_exported, formulas_exported))
}

fn build_excel_format(cell_format: &CellFormat) -> Format {
    let mut format = Format::new();

    if cell_format.bold {
        format = format.set_bold();
    }
    if cell_format.bordered {
        format = format.set_border(FormatBorder::Thin);
    }
    if let Some(rgb) = cell_format.fill {
        format = format.set_background_color(Color::RGB(rgb));
    }

    match cell_format.number_format {
        NumberFormat::General => format,
        NumberFormat::Number { decimals } => format.set_num_format(number_pattern(decimals)),
        NumberFormat::Accounting => format.set_num_format(ACCOUNTING_FORMAT),
        NumberFormat::Percent { decimals } => format.set_num_format(percent_pattern(decimals)),
        NumberFormat::Text => format.set_num_format("@"),
    }
}

fn number_pattern(decimals: u8) -> String {
    if decimals == 0 {
        "#,##0".to_string()
    } else {
        format!("#,##0.{}", "0".repeat(decimals as usize))
    }
}

fn percent_pattern(decimals: u8) -> String {
    if decimals == 0 {
        "0%".to_string()
    } else {
        format!("0.{}%", "0".repeat(decimals as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_number_patterns() {
        assert_eq!(number_pattern(0), "#,##0");
        assert_eq!(number_pattern(2), "#,##0.00");
        assert_eq!(percent_pattern(2), "0.00%");
    }

    #[test]
    fn test_export_then_import_keeps_values_and_formulas() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.xlsx");

        let mut sheet = Sheet::new_with_name("CCOSTO 1");
        sheet.set_value(0, 0, "NIT");
        sheet.set_value(1, 0, 10.0);
        sheet.set_value(2, 0, 32.5);
        sheet.set_value(3, 0, CellValue::Formula("=SUM(A2:A3)".into()));
        sheet.format_mut(1, 0).fill = Some(0xFFFF00);
        sheet.format_mut(1, 0).number_format = NumberFormat::Accounting;
        let wb = Workbook::from_sheets(vec![Sheet::new_with_name("Hoja1"), sheet]);

        let exported = export(&wb, &path).unwrap();
        assert_eq!(exported.sheets_exported, 2);
        assert_eq!(exported.formulas_exported, 1);

        let (back, stats) = import(&path).unwrap();
        assert_eq!(stats.sheets_imported, 2);
        assert_eq!(back.sheet_names(), vec!["Hoja1", "CCOSTO 1"]);
        let s = back.sheet_by_name("ccosto 1").unwrap();
        assert_eq!(s.get_text(0, 0), "NIT");
        assert_eq!(s.get_value(2, 0), &CellValue::Number(32.5));
        assert_eq!(s.get_value(3, 0), &CellValue::Formula("=SUM(A2:A3)".into()));
    }

    #[test]
    fn test_first_sheet_grid_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.xlsx");
        let mut sheet = Sheet::new_with_name("Movimientos");
        sheet.set_value(1, 0, "NIT");
        sheet.set_value(1, 1, "CANTIDAD");
        sheet.set_value(1, 2, "VENTAS");
        sheet.set_value(2, 0, "0900123");
        sheet.set_value(2, 1, 4.0);
        sheet.set_value(2, 2, 1500.75);
        export(&Workbook::from_sheets(vec![sheet]), &path).unwrap();

        let grid = read_first_sheet_grid(&path).unwrap();
        assert_eq!(grid[1], vec!["NIT", "CANTIDAD", "VENTAS"]);
        assert_eq!(grid[2], vec!["0900123", "4", "1500.75"]);
    }

    #[test]
    fn test_ensure_writable_missing_file() {
        let dir = tempdir().unwrap();
        assert!(ensure_writable(&dir.path().join("nope.xlsx")).is_err());
    }
}
