use parcel_fs::{ConfigStore, Error, NormalizedPath};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::fs;
use tempfile::TempDir;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ArchiveEntry {
    name: String,
    location: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestConfig {
    selected: Vec<String>,
    archives: Vec<ArchiveEntry>,
}

fn sample() -> TestConfig {
    TestConfig {
        selected: vec!["magit".into(), "org".into()],
        archives: vec![ArchiveEntry {
            name: "gnu".into(),
            location: "https://elpa.gnu.org/packages/".into(),
        }],
    }
}

#[test]
fn test_load_toml() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("parcel.toml");
    fs::write(
        &file_path,
        r#"selected = ["magit", "org"]

[[archives]]
name = "gnu"
location = "https://elpa.gnu.org/packages/"
"#,
    )
    .unwrap();

    let store = ConfigStore::new();
    let config: TestConfig = store.load(&NormalizedPath::new(&file_path)).unwrap();
    assert_eq!(config, sample());
}

#[test]
fn test_save_then_load_json() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("state.json"));

    let store = ConfigStore::new();
    store.save(&path, &sample()).unwrap();
    let loaded: TestConfig = store.load(&path).unwrap();
    assert_eq!(loaded, sample());
}

#[test]
fn test_save_creates_parent_directories() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("nested/dir/parcel.toml"));

    ConfigStore::new().save(&path, &sample()).unwrap();
    assert!(path.is_file());
}

#[test]
fn test_unsupported_extension() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("parcel.ini"));
    fs::write(path.to_native(), "x").unwrap();

    let result: Result<TestConfig, _> = ConfigStore::new().load(&path);
    assert!(matches!(result, Err(Error::UnsupportedFormat { ref extension }) if extension == "ini"));
}

#[test]
fn test_parse_error_names_format_and_path() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("broken.toml"));
    fs::write(path.to_native(), "selected = [").unwrap();

    let err = ConfigStore::new().load::<TestConfig>(&path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("TOML"), "got: {message}");
    assert!(message.contains("broken.toml"), "got: {message}");
}
