use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

const RAP: &str = r#"
RAP:
  file_names:
    anl:
      - rap.t{{ cycle.strftime('%H') }}z.anl.grib2
  hpss:
    locations:
      - ARCHIVE_DIR
    archive_internal_dirs:
      - rap
    archive_format: FORMAT
    archive_file_names:
      anl:
        - rap.{{ cycle.strftime('%Y%m%d%H') }}.zip
"#;

fn retrieve_data(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_retrieve-data"))
        .args(args)
        .env("PATH", "")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

/// Writes a zip archive holding one RAP analysis and a config pointing at it.
fn rap_fixture(dir: &Path, format: &str) -> String {
    let file = fs::File::create(dir.join("rap.2025050400.zip")).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("rap/rap.t00z.anl.grib2", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"rap").unwrap();
    writer.finish().unwrap();

    let config = dir.join("data_locations.yml");
    fs::write(
        &config,
        RAP.replace("ARCHIVE_DIR", dir.to_str().unwrap())
            .replace("FORMAT", format),
    )
    .unwrap();
    config.to_string_lossy().to_string()
}

#[test]
fn unknown_data_store_exits_with_one() {
    let output = retrieve_data(&[
        "--file-set",
        "anl",
        "--data-stores",
        "ftp",
        "--data-type",
        "GFS",
        "--output-path",
        "out",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[test]
fn missing_file_set_exits_with_one() {
    let output = retrieve_data(&[
        "--data-stores",
        "aws",
        "--data-type",
        "GFS",
        "--output-path",
        "out",
    ]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn help_exits_with_zero() {
    let output = retrieve_data(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--data-stores"));
}

#[test]
fn zip_archives_do_not_need_htar() {
    let dir = tempfile::tempdir().unwrap();
    let config = rap_fixture(dir.path(), "zip");
    let target = dir.path().join("out");

    let output = retrieve_data(&[
        "--config",
        &config,
        "--cycle",
        "2025050400",
        "--file-set",
        "anl",
        "--data-stores",
        "hpss",
        "--data-type",
        "RAP",
        "--output-path",
        target.to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(target.join("rap.t00z.anl.grib2")).unwrap(), "rap");
}

#[test]
fn htar_archives_require_htar_on_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = rap_fixture(dir.path(), "htar");
    let target = dir.path().join("out");

    let output = retrieve_data(&[
        "--config",
        &config,
        "--cycle",
        "2025050400",
        "--file-set",
        "anl",
        "--data-stores",
        "hpss",
        "--data-type",
        "RAP",
        "--output-path",
        target.to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(1));
    assert!(!target.exists());
}
