//! Catalog files on disk: defaults, user overlays and resolution.

use std::io::Write;
use std::path::Path;

use labserial::{
    catalog::{load_catalog, load_user_catalog},
    resolve_command, DeviceError, Mode,
};
use tempfile::NamedTempFile;

const DEFAULTS: &str = r#"{
    "stop": "s",
    "static": [
        {"voltage": "100", "command": "v100"},
        {"voltage": "200", "command": "v200"}
    ],
    "dynamic": [
        {"voltage": "100", "frequency": "1", "command": "d100f1"},
        {"voltage": "100", "frequency": "2", "command": "d100f2"}
    ]
}"#;

fn json_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

#[test]
fn test_defaults_only() {
    let defaults = json_file(DEFAULTS);
    let catalog = load_catalog(defaults.path(), None).unwrap();

    assert_eq!(catalog.stop_command(), "s");
    assert_eq!(
        resolve_command(&catalog, Mode::Static, "200", None).unwrap(),
        "v200"
    );
    assert_eq!(
        resolve_command(&catalog, Mode::Dynamic, "100", Some("2")).unwrap(),
        "d100f2"
    );
}

#[test]
fn test_user_static_replaces_whole_list() {
    let defaults = json_file(DEFAULTS);
    let user = json_file(r#"{"static": [{"voltage": "300", "command": "v300"}]}"#);
    let catalog = load_catalog(defaults.path(), Some(user.path())).unwrap();

    assert_eq!(
        resolve_command(&catalog, Mode::Static, "300", None).unwrap(),
        "v300"
    );
    // Old static entries are gone, not merged
    assert!(matches!(
        resolve_command(&catalog, Mode::Static, "100", None),
        Err(DeviceError::CommandNotFound(_))
    ));
    // Dynamic and stop still come from the defaults
    assert_eq!(
        resolve_command(&catalog, Mode::Dynamic, "100", Some("1")).unwrap(),
        "d100f1"
    );
    assert_eq!(catalog.stop_command(), "s");
}

#[test]
fn test_missing_user_file_is_config_error() {
    let defaults = json_file(DEFAULTS);
    let missing = Path::new("/nonexistent/user_commands.json");
    assert!(matches!(
        load_catalog(defaults.path(), Some(missing)),
        Err(DeviceError::Config(_))
    ));
}

#[test]
fn test_malformed_user_file_is_config_error() {
    let defaults = json_file(DEFAULTS);
    let user = json_file("{ not json");
    assert!(matches!(
        load_catalog(defaults.path(), Some(user.path())),
        Err(DeviceError::Config(_))
    ));
}

#[test]
fn test_missing_defaults_is_error() {
    let result = load_catalog(Path::new("/nonexistent/default_commands.json"), None);
    assert!(matches!(result, Err(DeviceError::Config(_))));
}

#[test]
fn test_user_file_missing_stop_inherits_default() {
    let defaults = json_file(DEFAULTS);
    let user = json_file(r#"{"dynamic": [], "comment": "ignored"}"#);
    let catalog = load_catalog(defaults.path(), Some(user.path())).unwrap();
    assert_eq!(catalog.stop_command(), "s");
    assert!(catalog.dynamic_entries().is_empty());
    assert_eq!(catalog.static_voltages(), vec!["100", "200"]);
}

#[test]
fn test_numeric_user_values_are_matched_as_text() {
    let defaults = json_file(DEFAULTS);
    let user = json_file(r#"{"dynamic": [{"voltage": 1500, "frequency": 2.5, "command": "d1500f2.5"}]}"#);
    let catalog = load_catalog(defaults.path(), Some(user.path())).unwrap();
    assert_eq!(
        resolve_command(&catalog, Mode::Dynamic, "1500", Some("2.5")).unwrap(),
        "d1500f2.5"
    );
}

#[test]
fn test_embedded_catalog_with_user_stop() {
    let user = json_file(r#"{"stop": "halt"}"#);
    let catalog = load_user_catalog(Some(user.path())).unwrap();
    assert_eq!(catalog.stop_command(), "halt");
    assert!(!catalog.static_entries().is_empty());
    assert!(!catalog.dynamic_entries().is_empty());
}
