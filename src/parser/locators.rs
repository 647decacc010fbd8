use super::scalar_string;
use crate::error::{Error, Result};
use anyhow::Context;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// One `{type, value}` attempt in a locator's fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Strategy {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Strategy {
    pub fn new(kind: &str, value: &str) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.to_string(),
        }
    }

    /// Parse a `{type, value}` mapping; scalar values are coerced to strings
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_mapping()
            .ok_or_else(|| Error::InvalidDefinition("selector must be a {type, value} mapping".into()))?;
        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidDefinition("selector is missing 'type'".into()))?;
        let value = map
            .get("value")
            .and_then(scalar_string)
            .ok_or_else(|| Error::InvalidDefinition(format!("selector '{}' is missing 'value'", kind)))?;
        Ok(Self {
            kind: kind.to_string(),
            value,
        })
    }
}

/// Ordered fallback chain: `primary`, `fallback_1`, `fallback_2`, ...
///
/// Strategies are tried by name ordinal whatever order they were declared in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorDefinition {
    strategies: Vec<(String, Strategy)>,
}

/// `primary` is 0 and `fallback_<n>` is n; anything else is not a strategy
fn strategy_ordinal(name: &str) -> Option<u32> {
    if name == "primary" {
        return Some(0);
    }
    let n = name.strip_prefix("fallback_")?;
    if n.is_empty() || !n.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    n.parse().ok()
}

impl LocatorDefinition {
    pub fn new(mut strategies: Vec<(String, Strategy)>) -> Result<Self> {
        if strategies.is_empty() {
            return Err(Error::InvalidDefinition(
                "locator must declare at least one strategy".into(),
            ));
        }
        if let Some((name, _)) = strategies
            .iter()
            .find(|(name, _)| strategy_ordinal(name).is_none())
        {
            return Err(Error::InvalidDefinition(format!(
                "invalid strategy name '{}' (expected primary or fallback_<n>)",
                name
            )));
        }
        strategies.sort_by_key(|(name, _)| strategy_ordinal(name));
        Ok(Self { strategies })
    }

    /// Shorthand for a single `primary` strategy
    pub fn single(kind: &str, value: &str) -> Self {
        Self {
            strategies: vec![("primary".to_string(), Strategy::new(kind, value))],
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_mapping()
            .ok_or_else(|| Error::InvalidDefinition("locator must be a mapping of strategies".into()))?;
        let mut strategies = Vec::with_capacity(map.len());
        for (name, body) in map {
            let name = name
                .as_str()
                .ok_or_else(|| Error::InvalidDefinition("strategy names must be strings".into()))?;
            let strategy = Strategy::from_value(body)
                .map_err(|e| Error::InvalidDefinition(format!("strategy '{}': {}", name, e)))?;
            strategies.push((name.to_string(), strategy));
        }
        Self::new(strategies)
    }

    pub fn strategies(&self) -> impl Iterator<Item = (&str, &Strategy)> {
        self.strategies.iter().map(|(name, s)| (name.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Symbolic locator keys mapped to their definitions; immutable once loaded
#[derive(Debug, Default, Clone)]
pub struct LocatorCatalog {
    entries: HashMap<String, LocatorDefinition>,
    sources: HashMap<String, String>,
}

impl LocatorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, definition: LocatorDefinition, source: &str) -> Result<()> {
        if let Some(first) = self.sources.get(key) {
            return Err(Error::DuplicateLocator {
                key: key.to_string(),
                file: if first == source {
                    source.to_string()
                } else {
                    format!("{} and {}", first, source)
                },
            });
        }
        self.entries.insert(key.to_string(), definition);
        self.sources.insert(key.to_string(), source.to_string());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&LocatorDefinition> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::UnknownLocator(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add every locator in a YAML document; `source` names it in errors
    pub fn merge_yaml(&mut self, content: &str, source: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Ok(());
        }
        let doc: Value = serde_yaml::from_str(content)
            .map_err(|e| Error::InvalidDefinition(format!("{}: {}", source, e)))?;
        let map = match doc {
            Value::Null => return Ok(()),
            Value::Mapping(map) => map,
            _ => {
                return Err(Error::InvalidDefinition(format!(
                    "{}: locator file must be a mapping",
                    source
                )))
            }
        };
        for (key, body) in &map {
            let key = key
                .as_str()
                .ok_or_else(|| Error::InvalidDefinition(format!("{}: locator keys must be strings", source)))?;
            let definition = LocatorDefinition::from_value(body)
                .map_err(|e| Error::InvalidDefinition(format!("{}: locator '{}': {}", source, key, e)))?;
            self.insert(key, definition, source)?;
        }
        Ok(())
    }

    pub fn from_yaml_str(content: &str, source: &str) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.merge_yaml(content, source)?;
        Ok(catalog)
    }

    /// Load every `*locators.yaml` / `*locators.yml` file under `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();
        let mut files = Vec::new();
        for ext in ["yaml", "yml"] {
            let pattern = dir.join(format!("*locators.{}", ext));
            let pattern = pattern.to_string_lossy();
            let paths = glob::glob(&pattern)
                .with_context(|| format!("Invalid locator pattern {}", pattern))?;
            files.extend(paths.filter_map(|p| p.ok()));
        }
        files.sort();

        for path in files {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read locator file: {}", path.display()))?;
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            catalog.merge_yaml(&content, &source)?;
        }
        log::debug!("Loaded {} locators from {}", catalog.len(), dir.display());
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r#"
login_button:
  primary: { type: id, value: "com.example.app:id/login" }
  fallback_1: { type: text, value: "Log in" }
  fallback_2: { type: xpath, value: "//android.widget.Button[1]" }
remember_me:
  fallback_3: { type: checked, value: false }
  primary: { type: class, value: android.widget.CheckBox }
"#;

    #[test]
    fn test_strategies_are_ordered_by_name() {
        let catalog = LocatorCatalog::from_yaml_str(LOGIN, "login_locators.yaml").unwrap();
        let names: Vec<&str> = catalog
            .get("login_button")
            .unwrap()
            .strategies()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["primary", "fallback_1", "fallback_2"]);

        let remember_me: Vec<(&str, &Strategy)> =
            catalog.get("remember_me").unwrap().strategies().collect();
        assert_eq!(
            remember_me,
            vec![
                ("primary", &Strategy::new("class", "android.widget.CheckBox")),
                ("fallback_3", &Strategy::new("checked", "false")),
            ]
        );

        let def = LocatorDefinition::new(vec![
            ("fallback_10".into(), Strategy::new("text", "ten")),
            ("fallback_2".into(), Strategy::new("text", "two")),
            ("primary".into(), Strategy::new("id", "first")),
        ])
        .unwrap();
        let names: Vec<&str> = def.strategies().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["primary", "fallback_2", "fallback_10"]);
    }

    #[test]
    fn test_invalid_definitions() {
        let err = LocatorCatalog::from_yaml_str("a: {}", "x.yaml").unwrap_err();
        assert!(err.to_string().contains("at least one strategy"));

        let err = LocatorCatalog::from_yaml_str("a: { best: { type: id, value: x } }", "x.yaml")
            .unwrap_err();
        assert!(err.to_string().contains("invalid strategy name 'best'"));

        let err = LocatorCatalog::from_yaml_str("a: { primary: { type: id } }", "x.yaml").unwrap_err();
        assert!(err.to_string().contains("missing 'value'"));

        assert!(matches!(
            LocatorCatalog::new().get("nope"),
            Err(Error::UnknownLocator(k)) if k == "nope"
        ));
    }

    #[test]
    fn test_duplicate_keys_across_files_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_locators.yaml"), LOGIN).unwrap();
        std::fs::write(
            dir.path().join("b_locators.yml"),
            "login_button:\n  primary: { type: id, value: other }\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.yaml"), "ignored: true").unwrap();

        match LocatorCatalog::load_dir(dir.path()) {
            Err(Error::DuplicateLocator { key, file }) => {
                assert_eq!(key, "login_button");
                assert_eq!(file, "a_locators.yaml and b_locators.yml");
            }
            other => panic!("expected duplicate locator error, got {:?}", other.map(|c| c.len())),
        }

        std::fs::remove_file(dir.path().join("b_locators.yml")).unwrap();
        let catalog = LocatorCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(!catalog.contains("ignored"));
    }
}
