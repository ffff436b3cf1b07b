//! YAML and JSON variable files, read in-process.
//!
//! Top-level keys become `${key}` variables. Lists are also exposed as `@{key}` and mappings
//! as `&{key}`. Values are kept as display strings; mappings flatten to `key=value` items.

use serde_json::Value;
use std::path::Path;

use crate::{error::RideError, library::VariableSpec};

pub fn is_static(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "yaml" | "yml" | "json"))
}

pub fn load(path: &Path) -> Result<Vec<VariableSpec>, RideError> {
    let text = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let root: Value = if ext == "json" {
        serde_json::from_str(&text)?
    } else {
        serde_yaml::from_str(&text)?
    };
    let Value::Object(map) = root else {
        return Err(RideError::Data(format!(
            "variable file {} must contain a mapping at the top level",
            path.display()
        )));
    };
    let mut variables = Vec::new();
    for (key, value) in map {
        let items = values(&value);
        match &value {
            Value::Array(_) => variables.push(VariableSpec {
                name: format!("@{{{key}}}"),
                value: items.clone(),
            }),
            Value::Object(_) => variables.push(VariableSpec {
                name: format!("&{{{key}}}"),
                value: items.clone(),
            }),
            _ => {}
        }
        variables.push(VariableSpec {
            name: format!("${{{key}}}"),
            value: items,
        });
    }
    Ok(variables)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

fn values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(scalar).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", scalar(v)))
            .collect(),
        other => vec![scalar(other)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_and_json_files_expose_all_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("vars.yaml");
        std::fs::write(&yaml, "host: localhost\nusers:\n  - alice\n  - bob\nlimits:\n  max: 3\n")
            .unwrap();
        let vars = load(&yaml).unwrap();
        let get = |name: &str| vars.iter().find(|v| v.name == name).map(|v| v.value.clone());
        assert_eq!(get("${host}"), Some(vec!["localhost".to_string()]));
        assert_eq!(get("@{users}"), Some(vec!["alice".to_string(), "bob".to_string()]));
        assert_eq!(get("&{limits}"), Some(vec!["max=3".to_string()]));

        let json = dir.path().join("vars.json");
        std::fs::write(&json, r#"{"port": 8080}"#).unwrap();
        assert_eq!(load(&json).unwrap()[0].value, vec!["8080"]);

        std::fs::write(&json, "[1, 2]").unwrap();
        assert!(matches!(load(&json), Err(RideError::Data(_))));
        assert!(is_static(&json) && !is_static(Path::new("vars.py")));
    }
}
