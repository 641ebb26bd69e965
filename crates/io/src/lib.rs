// File I/O operations

pub mod csv;
pub mod sql;
pub mod table;
pub mod xlsx;

pub use table::{read_grid, read_table, RawTable};
