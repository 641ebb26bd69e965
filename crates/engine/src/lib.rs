pub mod cell;
pub mod sheet;
pub mod workbook;

pub use cell::{Cell, CellFormat, CellValue, NumberFormat};
pub use sheet::Sheet;
pub use workbook::Workbook;
