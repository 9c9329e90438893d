//! Unit tests for instance registry loading.

use camino::Utf8PathBuf;
use rstest::rstest;
use tempfile::TempDir;

use fleetback::{RegistryError, load_instances};

fn write_csv(tmp: &TempDir, contents: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("instances.csv"))
        .expect("utf8 temp path");
    std::fs::write(&path, contents).expect("csv written");
    path
}

#[rstest]
fn loads_instances_preserving_row_order() {
    let tmp = TempDir::new().expect("temp dir");
    let path = write_csv(
        &tmp,
        "name,host,port,user\nbilling,db1,5432,postgres\nreports,db2,5433,repl\n",
    );

    let instances = load_instances(&path).expect("registry should load");

    let names: Vec<&str> = instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["billing", "reports"]);
    let first = instances.first().expect("first instance");
    assert_eq!(first.host, "db1");
    assert_eq!(first.port, 5432);
    assert_eq!(first.user, "postgres");
}

#[rstest]
fn rejects_duplicate_instance_names() {
    let tmp = TempDir::new().expect("temp dir");
    let path = write_csv(
        &tmp,
        "name,host,port,user\nbilling,db1,5432,postgres\nbilling,db2,5433,repl\n",
    );

    let err = load_instances(&path).expect_err("duplicates should be rejected");

    assert!(
        matches!(err, RegistryError::DuplicateName(ref name) if name == "billing"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn rejects_blank_instance_names() {
    let tmp = TempDir::new().expect("temp dir");
    let path = write_csv(&tmp, "name,host,port,user\n  ,db1,5432,postgres\n");

    let err = load_instances(&path).expect_err("blank name should be rejected");

    assert!(
        matches!(err, RegistryError::EmptyName { record: 1 }),
        "unexpected error: {err}"
    );
}

#[rstest]
fn reports_unparseable_rows() {
    let tmp = TempDir::new().expect("temp dir");
    let path = write_csv(&tmp, "name,host,port,user\nbilling,db1,not-a-port,postgres\n");

    let err = load_instances(&path).expect_err("bad port should be rejected");

    assert!(matches!(err, RegistryError::Parse(_)), "unexpected error: {err}");
}

#[rstest]
fn reports_missing_source_file() {
    let tmp = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("missing.csv"))
        .expect("utf8 temp path");

    let err = load_instances(&path).expect_err("missing file should be rejected");

    assert!(matches!(err, RegistryError::Open { .. }), "unexpected error: {err}");
}
