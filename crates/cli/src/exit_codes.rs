//! CLI Exit Code Registry
//!
//! Single source of truth for `rentab` exit codes. Schedulers and wrapper
//! scripts branch on them, so values never change once released.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                   |
//! |---------|-----------|-----------------------------------------------|
//! | 0       | Universal | Success                                       |
//! | 1       | Universal | General error (unspecified)                   |
//! | 2       | Universal | CLI usage error (bad args, bad flag values)   |
//! | 60-69   | report    | Run failures, one per error category          |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into [`report_exit_code`] or the command that raises it

use rentab_report::ReportError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - the workbook was written (flagged lines are not a failure).
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments or flag values.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Report (60-69)
// =============================================================================

/// Missing or contradictory settings: no export directory, bad profile,
/// unknown source mode, rejected statement.
pub const EXIT_CONFIG: u8 = 60;

/// No export for the target date, or the database returned no movements.
pub const EXIT_NOT_FOUND: u8 = 61;

/// Database unreachable or login refused.
pub const EXIT_CONNECTION: u8 = 62;

/// Required columns missing or too many malformed rows.
pub const EXIT_DATA_SHAPE: u8 = 63;

/// Workbook missing, locked, or lacking required sections.
pub const EXIT_WRITE: u8 = 64;

/// Map a run failure to its exit code.
pub fn report_exit_code(err: &ReportError) -> u8 {
    match err {
        ReportError::Configuration(_) => EXIT_CONFIG,
        ReportError::NotFound(_) => EXIT_NOT_FOUND,
        ReportError::Connection(_) => EXIT_CONNECTION,
        ReportError::DataShape(_) => EXIT_DATA_SHAPE,
        ReportError::Write(_) => EXIT_WRITE,
    }
}

/// Stable identifier of an exit code for `--json` failure output. Run
/// failures share [`ReportError::kind`]'s names.
pub fn exit_kind(code: u8) -> &'static str {
    match code {
        EXIT_SUCCESS => "success",
        EXIT_USAGE => "usage",
        EXIT_CONFIG => "configuration",
        EXIT_NOT_FOUND => "not_found",
        EXIT_CONNECTION => "connection",
        EXIT_DATA_SHAPE => "data_shape",
        EXIT_WRITE => "write",
        _ => "error",
    }
}
