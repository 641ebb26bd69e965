// Integration tests for the `rentab` binary: exit codes and the --json
// stdout contract.
//
// Every test runs with a scratch config directory and without the job's
// environment variables, so nothing from the host leaks in.
//
// Run with: cargo test -p rentab-cli --test cli_tests -- --nocapture

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rentab_config::WorkbookSettings;
use rentab_engine::Workbook;
use tempfile::{tempdir, TempDir};

const JOB_ENV: [&str; 16] = [
    "RENTAB_CONFIG",
    "RENTAB_SOURCE",
    "RENTAB_FORCE_FILE",
    "RENTAB_USE_LATEST",
    "RENTAB_SQL_PROFILE",
    "RENTAB_WORKBOOK",
    "EXCZDIR",
    "EXCZPREFIX",
    "CCOSTO_EXCZPREFIX",
    "COD_EXCZPREFIX",
    "PRECIOS_DIR",
    "PRECIOS_PREFIX",
    "VENDEDORES_DIR",
    "VENDEDORES_PREFIX",
    "PLANTILLA_HOJA",
    "RUST_LOG",
];

struct Fixture {
    dir: TempDir,
    exports: PathBuf,
    workbook: PathBuf,
}

impl Fixture {
    fn rentab(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_rentab"));
        cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
        for name in JOB_ENV {
            cmd.env_remove(name);
        }
        cmd.env("XDG_CONFIG_HOME", self.dir.path().join("config"));
        cmd.env("HOME", self.dir.path());
        cmd
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            "run".into(),
            "--workbook".into(),
            self.workbook.display().to_string(),
            "--dir".into(),
            self.exports.display().to_string(),
            "--date".into(),
            "2025-01-15".into(),
        ]
    }
}

const EXPORT: &str = "\
FECHA;TIPO;NIT;CLIENTE;COD. VENDEDOR;CODIGO;DESCRIPCION;CENTRO DE COSTO;CANTIDAD;VENTAS;PRECIO LISTA
15/01/2025;F;900123;FERRETERIA UNO;0024;VIN-01;VINILO BLANCO;0001   MOST. PRINCIPAL;26;947.798,32;39.472,25
15/01/2025;F;900124;PINTURAS SAS;0011;BRO-02;BROCHA 2 PULG;0003   MOSTRADOR CALARCA;10;50.000,00;5.000,00
";

fn write_template(path: &Path) {
    let settings = WorkbookSettings::default();
    let mut wb = Workbook::new();
    wb.add_sheet_named("RENTABILIDAD");
    for c in &settings.cost_centers {
        wb.add_sheet_named(&c.sheet);
    }
    wb.add_sheet_named(&settings.code_section);
    rentab_io::xlsx::export(&wb, path).unwrap();
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let exports = dir.path().join("listados");
    fs::create_dir(&exports).unwrap();
    fs::write(exports.join("EXCZ98020250115183000.csv"), EXPORT).unwrap();
    let workbook = dir.path().join("rentabilidad.xlsx");
    write_template(&workbook);
    Fixture { dir, exports, workbook }
}

/// Assert stdout is a single, parseable JSON value with no extra lines.
fn assert_single_json(stdout: &str) -> serde_json::Value {
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed)
        .unwrap_or_else(|e| panic!("stdout must be one JSON value.\nParse error: {}\nstdout:\n{}", e, trimmed))
}

fn code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// ===========================================================================
// rentab run
// ===========================================================================

#[test]
fn run_json_prints_one_summary() {
    let f = fixture();
    let output = f.rentab().args(f.run_args()).arg("--json").output().unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["target_date"], "2025-01-15");
    assert_eq!(val["strategy"], "file");
    assert_eq!(val["artifact"], "EXCZ98020250115183000.csv");
    assert_eq!(val["lines_imported"], 2);
    assert_eq!(val["flagged"], 1);
    assert!(val["sections"].is_array());
    assert!(val["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn run_human_output_lists_flagged_lines() {
    let f = fixture();
    let output = f.rentab().args(f.run_args()).output().unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("2025-01-15: 2 lines imported, 1 flagged"));
    assert!(stdout.contains("VIN-01"));
    assert!(stdout.contains("Precio total menor que la lista en $78.480,18 (+7,65%)."));
    assert!(stdout.contains("CCOSTO 3"));
}

#[test]
fn run_writes_flagged_csv() {
    let f = fixture();
    let csv = f.dir.path().join("flagged.csv");
    let output = f
        .rentab()
        .args(f.run_args())
        .args(["--flagged-csv", csv.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let content = fs::read_to_string(&csv).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("fila,fecha,nit,cliente,codigo"));
    assert!(lines[1].contains("VIN-01"));
    assert!(lines[1].contains("78480.18"));
    assert!(lines[1].contains("0.0765"));
}

#[test]
fn run_reads_export_dir_from_env() {
    let f = fixture();
    let output = f
        .rentab()
        .env("EXCZDIR", &f.exports)
        .args(["run", "--workbook", f.workbook.to_str().unwrap(), "--date", "2025-01-15", "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["lines_imported"], 2);
}

#[test]
fn run_without_export_exits_not_found_and_keeps_workbook() {
    let f = fixture();
    let before = fs::read(&f.workbook).unwrap();
    let mut args = f.run_args();
    args[6] = "2025-01-16".into();

    let output = f.rentab().args(&args).arg("--json").output().unwrap();
    assert_eq!(code(&output), 61);

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["error"], "not_found");
    assert_eq!(val["exit_code"], 61);
    assert!(stderr(&output).contains("hint:"));
    assert_eq!(fs::read(&f.workbook).unwrap(), before);
}

#[test]
fn run_without_directory_is_a_config_error() {
    let f = fixture();
    let output = f
        .rentab()
        .args(["run", "--workbook", f.workbook.to_str().unwrap(), "--date", "2025-01-15"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 60);
    assert!(stderr(&output).contains("EXCZDIR"));
}

#[test]
fn run_with_missing_section_is_a_write_error() {
    let f = fixture();
    let mut wb = Workbook::new();
    wb.add_sheet_named("RENTABILIDAD");
    rentab_io::xlsx::export(&wb, &f.workbook).unwrap();

    let output = f.rentab().args(f.run_args()).output().unwrap();
    assert_eq!(code(&output), 64);
    assert!(stderr(&output).contains("CCOSTO 1"));
}

#[test]
fn bad_date_is_a_config_error() {
    let f = fixture();
    let before = fs::read(&f.workbook).unwrap();
    let mut args = f.run_args();
    args[6] = "15/01/2025".into();
    let output = f.rentab().args(&args).output().unwrap();
    assert_eq!(code(&output), 60);
    assert!(stderr(&output).contains("YYYY-MM-DD"));
    assert_eq!(fs::read(&f.workbook).unwrap(), before);
}

#[test]
fn bad_date_with_json_prints_error_object() {
    let f = fixture();
    let mut args = f.run_args();
    args[6] = "2025-13-40".into();
    let output = f.rentab().args(&args).arg("--json").output().unwrap();
    assert_eq!(code(&output), 60);

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["error"], "configuration");
    assert_eq!(val["exit_code"], 60);
    assert!(val["message"].as_str().unwrap().contains("2025-13-40"));
}

#[test]
fn invalid_settings_with_json_prints_error_object() {
    let f = fixture();
    let settings = f.dir.path().join("settings.toml");
    fs::write(&settings, "[validation]\ntolerance = \"mucho\"\n").unwrap();

    let output = f
        .rentab()
        .args(f.run_args())
        .args(["--config", settings.to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 60);

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["error"], "configuration");
    assert_eq!(val["exit_code"], 60);
    assert!(!val["message"].as_str().unwrap().is_empty());
}

#[test]
fn unknown_source_with_json_prints_usage_error() {
    let f = fixture();
    let output = f
        .rentab()
        .args(["resolve", "--dir", f.exports.to_str().unwrap(), "--source", "ftp", "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 2);
    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["error"], "usage");
}

#[test]
fn unknown_source_is_a_usage_error() {
    let f = fixture();
    let output = f.rentab().args(f.run_args()).args(["--source", "ftp"]).output().unwrap();
    assert_eq!(code(&output), 2);
}

// ===========================================================================
// rentab resolve
// ===========================================================================

#[test]
fn resolve_json_names_the_export() {
    let f = fixture();
    let output = f
        .rentab()
        .args(["resolve", "--dir", f.exports.to_str().unwrap(), "--date", "2025-01-15", "--json"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["strategy"], "file");
    assert_eq!(val["artifact"], "EXCZ98020250115183000.csv");
    assert!(val["path"].as_str().unwrap().ends_with("EXCZ98020250115183000.csv"));
}

#[test]
fn resolve_use_latest_falls_back_to_newest() {
    let f = fixture();
    let output = f
        .rentab()
        .env("RENTAB_USE_LATEST", "si")
        .args(["resolve", "--dir", f.exports.to_str().unwrap(), "--date", "2025-02-01"])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("EXCZ98020250115183000.csv"));
}

// ===========================================================================
// rentab check-config
// ===========================================================================

#[test]
fn check_config_masks_password() {
    let f = fixture();
    let settings = f.dir.path().join("settings.toml");
    fs::write(
        &settings,
        format!(
            "[source]\nmode = \"sql\"\n\n[sql.connection]\nserver = \"{}\"\ndatabase = \"erp.db\"\nuser = \"reporte\"\npassword = \"secreto\"\n",
            f.dir.path().display()
        ),
    )
    .unwrap();

    let output = f
        .rentab()
        .args(["check-config", "--show", "--config", settings.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("source:    sql (erp.db@"));
    assert!(stdout.contains("****"));
    assert!(!stdout.contains("secreto"));
}

#[test]
fn check_config_force_file_overrides_sql_mode() {
    let f = fixture();
    let output = f
        .rentab()
        .env("RENTAB_SOURCE", "sql")
        .env("RENTAB_FORCE_FILE", "1")
        .args(["check-config", "--dir", f.exports.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("source:    file"));
}
