//! Command catalog: the table of literal device commands.
//!
//! A catalog is built from a JSON document with three top-level keys:
//!
//! ```json
//! {
//!   "stop": "s",
//!   "static":  [ { "voltage": "1000", "command": "v1000" } ],
//!   "dynamic": [ { "voltage": "1000", "frequency": "5", "command": "d1000f5" } ]
//! }
//! ```
//!
//! A user document may overlay the default one. The overlay is shallow: each
//! of `static`, `dynamic` and `stop` present in the user document replaces the
//! default value for that key wholesale. Individual entries are never merged.
//!
//! Voltages and frequencies are kept as text and compared textually; numeric
//! JSON values are converted to their textual form (`100` becomes `"100"`).
//! No range checks are made and duplicate keys are legal.

use crate::error::{AppResult, DeviceError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Default command table shipped with the binary.
pub const DEFAULT_COMMANDS: &str = include_str!("../config/default_commands.json");

const MERGED_KEYS: [&str; 3] = ["static", "dynamic", "stop"];

/// Command selected by voltage alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCommand {
    /// Selection key, compared as text
    #[serde(deserialize_with = "textual")]
    pub voltage: String,
    /// Literal command sent to the supply
    pub command: String,
}

/// Command selected by voltage and frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicCommand {
    /// Selection key, compared as text
    #[serde(deserialize_with = "textual")]
    pub voltage: String,
    /// Selection key, compared as text
    #[serde(deserialize_with = "textual")]
    pub frequency: String,
    /// Literal command sent to the supply
    pub command: String,
}

/// Accept `"100"` or `100` and keep the text.
fn textual<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or a number, found {}",
            other
        ))),
    }
}

/// Shape of a document after merging; every key is still optional here.
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default, deserialize_with = "optional_textual")]
    stop: Option<String>,
    #[serde(rename = "static")]
    static_entries: Option<Vec<StaticCommand>>,
    #[serde(rename = "dynamic")]
    dynamic_entries: Option<Vec<DynamicCommand>>,
}

fn optional_textual<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    textual(deserializer).map(Some)
}

/// Immutable, merged command table.
///
/// Reloading builds a new value; an existing catalog is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandCatalog {
    static_entries: Vec<StaticCommand>,
    dynamic_entries: Vec<DynamicCommand>,
    stop_command: String,
}

impl CommandCatalog {
    /// Build a catalog from a default JSON source and an optional user overlay.
    pub fn load(default_source: &str, user_source: Option<&str>) -> AppResult<Self> {
        let mut document = parse_object(default_source, "default")?;
        if let Some(user_source) = user_source {
            let overlay = parse_object(user_source, "user")?;
            overlay_keys(&mut document, overlay);
        }
        Self::from_document(document)
    }

    /// The catalog shipped with the binary, without any user overlay.
    pub fn embedded() -> AppResult<Self> {
        Self::load(DEFAULT_COMMANDS, None)
    }

    fn from_document(document: Map<String, Value>) -> AppResult<Self> {
        let document: CatalogDocument = serde_json::from_value(Value::Object(document))
            .map_err(|e| DeviceError::Config(format!("invalid command entry: {}", e)))?;

        let stop_command = document
            .stop
            .ok_or_else(|| DeviceError::Config("catalog has no 'stop' command".into()))?;
        let static_entries = document
            .static_entries
            .ok_or_else(|| DeviceError::Config("catalog has no 'static' commands".into()))?;
        let dynamic_entries = document
            .dynamic_entries
            .ok_or_else(|| DeviceError::Config("catalog has no 'dynamic' commands".into()))?;

        Ok(Self {
            static_entries,
            dynamic_entries,
            stop_command,
        })
    }

    /// Static commands in file order.
    pub fn static_entries(&self) -> &[StaticCommand] {
        &self.static_entries
    }

    /// Dynamic commands in file order.
    pub fn dynamic_entries(&self) -> &[DynamicCommand] {
        &self.dynamic_entries
    }

    /// Command that switches the output off.
    pub fn stop_command(&self) -> &str {
        &self.stop_command
    }

    /// Distinct static voltages in string order, as offered for selection.
    pub fn static_voltages(&self) -> Vec<String> {
        distinct(self.static_entries.iter().map(|e| e.voltage.as_str()))
    }

    /// Distinct dynamic voltages in string order.
    pub fn dynamic_voltages(&self) -> Vec<String> {
        distinct(self.dynamic_entries.iter().map(|e| e.voltage.as_str()))
    }

    /// Distinct dynamic frequencies in string order.
    pub fn dynamic_frequencies(&self) -> Vec<String> {
        distinct(self.dynamic_entries.iter().map(|e| e.frequency.as_str()))
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn parse_object(source: &str, origin: &str) -> AppResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(source) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DeviceError::Config(format!(
            "{} command source must be a JSON object",
            origin
        ))),
        Err(e) => Err(DeviceError::Config(format!(
            "{} command source is not valid JSON: {}",
            origin, e
        ))),
    }
}

fn overlay_keys(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        if MERGED_KEYS.contains(&key.as_str()) {
            debug!("User commands replace '{}'", key);
            base.insert(key, value);
        } else {
            debug!("Ignoring unknown key '{}' in user commands", key);
        }
    }
}

fn read_source(path: &Path) -> AppResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        DeviceError::Config(format!("cannot read '{}': {}", path.display(), e))
    })
}

/// Load a catalog from a default file and an optional user file.
pub fn load_catalog(default_path: &Path, user_path: Option<&Path>) -> AppResult<CommandCatalog> {
    let default_source = read_source(default_path)?;
    let user_source = user_path.map(read_source).transpose()?;
    let catalog = CommandCatalog::load(&default_source, user_source.as_deref())?;
    log_loaded(&catalog, default_path.display(), user_path);
    Ok(catalog)
}

/// Load the embedded default catalog, overlaid by an optional user file.
pub fn load_user_catalog(user_path: Option<&Path>) -> AppResult<CommandCatalog> {
    let user_source = user_path.map(read_source).transpose()?;
    let catalog = CommandCatalog::load(DEFAULT_COMMANDS, user_source.as_deref())?;
    log_loaded(&catalog, "embedded defaults", user_path);
    Ok(catalog)
}

fn log_loaded(catalog: &CommandCatalog, base: impl std::fmt::Display, user: Option<&Path>) {
    match user {
        Some(user) => info!(
            "Loaded {} static / {} dynamic commands from {} + '{}'",
            catalog.static_entries.len(),
            catalog.dynamic_entries.len(),
            base,
            user.display()
        ),
        None => info!(
            "Loaded {} static / {} dynamic commands from {}",
            catalog.static_entries.len(),
            catalog.dynamic_entries.len(),
            base
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"{
        "stop": "s",
        "static": [ {"voltage": "100", "command": "A"}, {"voltage": 200, "command": "B"} ],
        "dynamic": [ {"voltage": "50", "frequency": 10, "command": "X"} ]
    }"#;

    #[test]
    fn test_embedded_catalog_parses() {
        let catalog = CommandCatalog::embedded().unwrap();
        assert!(!catalog.stop_command().is_empty());
        assert!(!catalog.static_entries().is_empty());
        assert!(!catalog.dynamic_entries().is_empty());
    }

    #[test]
    fn test_numbers_become_text() {
        let catalog = CommandCatalog::load(BASE, None).unwrap();
        assert_eq!(catalog.static_entries()[1].voltage, "200");
        assert_eq!(catalog.dynamic_entries()[0].frequency, "10");
        let floats = r#"{"stop": "s", "static": [{"voltage": 1.5, "command": "h"}], "dynamic": []}"#;
        let catalog = CommandCatalog::load(floats, None).unwrap();
        assert_eq!(catalog.static_entries()[0].voltage, "1.5");
    }

    #[test]
    fn test_user_stop_keeps_default_entries() {
        let base = CommandCatalog::load(BASE, None).unwrap();
        let merged = CommandCatalog::load(BASE, Some(r#"{"stop": "halt"}"#)).unwrap();
        assert_eq!(merged.stop_command(), "halt");
        assert_eq!(merged.static_entries(), base.static_entries());
        assert_eq!(merged.dynamic_entries(), base.dynamic_entries());
    }

    #[test]
    fn test_user_static_replaces_whole_list() {
        let user = r#"{"static": [{"voltage": "100", "command": "Z"}]}"#;
        let merged = CommandCatalog::load(BASE, Some(user)).unwrap();
        assert_eq!(
            merged.static_entries(),
            &[StaticCommand {
                voltage: "100".into(),
                command: "Z".into()
            }]
        );
        assert_eq!(merged.stop_command(), "s");
        assert_eq!(merged.dynamic_entries().len(), 1);
    }

    #[test]
    fn test_user_empty_list_replaces_too() {
        let merged = CommandCatalog::load(BASE, Some(r#"{"dynamic": []}"#)).unwrap();
        assert!(merged.dynamic_entries().is_empty());
    }

    #[test]
    fn test_missing_stop_is_config_error() {
        let source = r#"{"static": [], "dynamic": []}"#;
        let err = CommandCatalog::load(source, None).unwrap_err();
        assert!(matches!(err, DeviceError::Config(ref m) if m.contains("stop")));
    }

    #[test]
    fn test_missing_list_is_config_error() {
        let err = CommandCatalog::load(r#"{"stop": "s", "static": []}"#, None).unwrap_err();
        assert!(matches!(err, DeviceError::Config(ref m) if m.contains("dynamic")));
    }

    #[test]
    fn test_entry_missing_field_is_config_error() {
        let user = r#"{"dynamic": [{"voltage": "50", "command": "X"}]}"#;
        let err = CommandCatalog::load(BASE, Some(user)).unwrap_err();
        assert!(matches!(err, DeviceError::Config(ref m) if m.contains("frequency")));
    }

    #[test]
    fn test_non_textual_voltage_is_rejected() {
        let user = r#"{"static": [{"voltage": true, "command": "X"}]}"#;
        assert!(matches!(
            CommandCatalog::load(BASE, Some(user)),
            Err(DeviceError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_sources() {
        assert!(matches!(
            CommandCatalog::load("not json", None),
            Err(DeviceError::Config(_))
        ));
        assert!(matches!(
            CommandCatalog::load(BASE, Some("[1, 2]")),
            Err(DeviceError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_user_keys_are_ignored() {
        let merged = CommandCatalog::load(BASE, Some(r#"{"theme": "dark"}"#)).unwrap();
        assert_eq!(merged, CommandCatalog::load(BASE, None).unwrap());
    }

    #[test]
    fn test_selection_lists_are_sorted_and_distinct() {
        let source = r#"{
            "stop": "s",
            "static": [
                {"voltage": "200", "command": "a"},
                {"voltage": "1000", "command": "b"},
                {"voltage": "200", "command": "c"}
            ],
            "dynamic": [
                {"voltage": "50", "frequency": "20", "command": "x"},
                {"voltage": "50", "frequency": "5", "command": "y"}
            ]
        }"#;
        let catalog = CommandCatalog::load(source, None).unwrap();
        // String order, not numeric order
        assert_eq!(catalog.static_voltages(), vec!["1000", "200"]);
        assert_eq!(catalog.dynamic_voltages(), vec!["50"]);
        assert_eq!(catalog.dynamic_frequencies(), vec!["20", "5"]);
    }
}
