//! Generic selector vocabulary and its mapping onto backend query forms.
//!
//! Locator catalogs describe elements with backend-neutral `(type, value)`
//! pairs. [`SelectorTransformer`] turns such a pair into a [`BackendLocator`]:
//! a `(queryKind, queryString)` pair for Appium, or a key/value query map for
//! uiautomator2. Partial-text selectors become OR-predicates over several
//! attribute names on Appium, because it only has structural XPath, while
//! uiautomator2 has dedicated `textContains` / `textStartsWith` operators.

use super::traits::Backend;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Backend-specific query produced by the transformer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendLocator {
    /// WebDriver locator strategy and expression
    Query { using: String, value: String },
    /// Native key/value query. A lone `xpath` entry carries an XPath expression.
    Native(BTreeMap<String, String>),
}

impl BackendLocator {
    pub fn query(using: impl Into<String>, value: impl Into<String>) -> Self {
        BackendLocator::Query {
            using: using.into(),
            value: value.into(),
        }
    }

    pub fn native(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.into(), value.into());
        BackendLocator::Native(map)
    }

    /// XPath expression carried by this locator, if any
    pub fn xpath(&self) -> Option<&str> {
        match self {
            BackendLocator::Query { using, value } if using == "xpath" => Some(value),
            BackendLocator::Native(map) => map.get("xpath").map(String::as_str),
            _ => None,
        }
    }
}

impl fmt::Display for BackendLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendLocator::Query { using, value } => write!(f, "{}={}", using, value),
            BackendLocator::Native(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

pub type ValueTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Target key and value transform for one backend
#[derive(Clone)]
pub struct SelectorTarget {
    pub key: String,
    pub transform: ValueTransform,
}

impl SelectorTarget {
    pub fn new(key: impl Into<String>, transform: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            key: key.into(),
            transform: Arc::new(transform),
        }
    }

    /// Pass the value through unchanged
    pub fn verbatim(key: impl Into<String>) -> Self {
        Self::new(key, |v: &str| v.to_string())
    }
}

impl fmt::Debug for SelectorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorTarget").field("key", &self.key).finish()
    }
}

/// Per-backend targets of one generic selector type. `None` marks the type as
/// unsupported on that backend.
#[derive(Debug, Clone, Default)]
pub struct SelectorMapping {
    pub appium: Option<SelectorTarget>,
    pub uiautomator2: Option<SelectorTarget>,
}

impl SelectorMapping {
    fn target(&self, backend: Backend) -> Option<&SelectorTarget> {
        match backend {
            Backend::Appium => self.appium.as_ref(),
            Backend::Uiautomator2 => self.uiautomator2.as_ref(),
        }
    }
}

const TEXT_ATTRIBUTES: [&str; 3] = ["text", "label", "name"];
const STATE_SELECTORS: [&str; 5] = ["clickable", "enabled", "checked", "focused", "selected"];

/// Quote a value as an XPath string literal
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// `//*[...]` predicate matching `value` against every text-like attribute
fn text_xpath(function: Option<&str>, value: &str) -> String {
    let literal = xpath_literal(value);
    let clauses: Vec<String> = TEXT_ATTRIBUTES
        .iter()
        .map(|attr| match function {
            Some(f) => format!("{}(@{}, {})", f, attr, literal),
            None => format!("@{}={}", attr, literal),
        })
        .collect();
    format!("//*[{}]", clauses.join(" or "))
}

fn bool_literal(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Maps generic selectors to backend locators
pub struct SelectorTransformer {
    mappings: HashMap<String, SelectorMapping>,
}

impl Default for SelectorTransformer {
    fn default() -> Self {
        let mut mappings = HashMap::new();
        let mut add = |name: &str, appium: Option<SelectorTarget>, u2: Option<SelectorTarget>| {
            mappings.insert(
                name.to_string(),
                SelectorMapping {
                    appium,
                    uiautomator2: u2,
                },
            );
        };

        add(
            "id",
            Some(SelectorTarget::verbatim("id")),
            Some(SelectorTarget::verbatim("resourceId")),
        );
        add(
            "xpath",
            Some(SelectorTarget::verbatim("xpath")),
            Some(SelectorTarget::verbatim("xpath")),
        );
        add(
            "text",
            Some(SelectorTarget::new("xpath", |v: &str| text_xpath(None, v))),
            Some(SelectorTarget::verbatim("text")),
        );
        add(
            "text_contains",
            Some(SelectorTarget::new("xpath", |v: &str| {
                text_xpath(Some("contains"), v)
            })),
            Some(SelectorTarget::verbatim("textContains")),
        );
        add(
            "text_starts_with",
            Some(SelectorTarget::new("xpath", |v: &str| {
                text_xpath(Some("starts-with"), v)
            })),
            Some(SelectorTarget::verbatim("textStartsWith")),
        );
        add(
            "class",
            Some(SelectorTarget::verbatim("class name")),
            Some(SelectorTarget::verbatim("className")),
        );
        add(
            "accessibility_id",
            Some(SelectorTarget::verbatim("accessibility id")),
            Some(SelectorTarget::verbatim("description")),
        );
        for state in STATE_SELECTORS {
            add(
                state,
                Some(SelectorTarget::new("xpath", move |v: &str| {
                    format!("//*[@{}='{}']", state, bool_literal(v))
                })),
                Some(SelectorTarget::new(state, bool_literal)),
            );
        }

        // Appium-only extensions
        add(
            "ios_predicate",
            Some(SelectorTarget::verbatim("-ios predicate string")),
            None,
        );
        add(
            "ios_class_chain",
            Some(SelectorTarget::verbatim("-ios class chain")),
            None,
        );
        add("image", Some(SelectorTarget::verbatim("-image")), None);

        Self { mappings }
    }
}

impl SelectorTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new generic selector type
    pub fn register(&mut self, name: &str, mapping: SelectorMapping) -> Result<()> {
        let name = name.trim().to_lowercase();
        if self.mappings.contains_key(&name) {
            return Err(Error::DuplicateSelectorType(name));
        }
        self.mappings.insert(name, mapping);
        Ok(())
    }

    pub fn supports(&self, selector_type: &str) -> bool {
        self.mappings
            .contains_key(&selector_type.trim().to_lowercase())
    }

    /// Registered selector type names, sorted
    pub fn selector_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mappings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn transform(&self, selector_type: &str, value: &str, backend: Backend) -> Result<BackendLocator> {
        let name = selector_type.trim().to_lowercase();
        let mapping = self
            .mappings
            .get(&name)
            .ok_or_else(|| Error::UnsupportedSelectorType(selector_type.to_string()))?;
        let target = mapping
            .target(backend)
            .ok_or_else(|| Error::UnsupportedForBackend {
                selector: name.clone(),
                backend,
            })?;
        let value = (target.transform)(value);

        Ok(match backend {
            Backend::Appium => BackendLocator::query(target.key.clone(), value),
            Backend::Uiautomator2 => BackendLocator::native(target.key.clone(), value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_contains_asymmetry() {
        let t = SelectorTransformer::new();

        let appium = t.transform("text_contains", "Login", Backend::Appium).unwrap();
        match &appium {
            BackendLocator::Query { using, value } => {
                assert_eq!(using, "xpath");
                assert_eq!(
                    value,
                    "//*[contains(@text, 'Login') or contains(@label, 'Login') or contains(@name, 'Login')]"
                );
            }
            other => panic!("unexpected locator {:?}", other),
        }

        let u2 = t
            .transform("text_contains", "Login", Backend::Uiautomator2)
            .unwrap();
        assert_eq!(u2, BackendLocator::native("textContains", "Login"));
    }

    #[test]
    fn test_basic_mappings() {
        let t = SelectorTransformer::new();
        assert_eq!(
            t.transform("id", "com.app:id/ok", Backend::Appium).unwrap(),
            BackendLocator::query("id", "com.app:id/ok")
        );
        assert_eq!(
            t.transform("id", "com.app:id/ok", Backend::Uiautomator2).unwrap(),
            BackendLocator::native("resourceId", "com.app:id/ok")
        );
        assert_eq!(
            t.transform("accessibility_id", "Menu", Backend::Appium).unwrap(),
            BackendLocator::query("accessibility id", "Menu")
        );
        assert_eq!(
            t.transform("CLASS", "android.widget.Button", Backend::Uiautomator2)
                .unwrap(),
            BackendLocator::native("className", "android.widget.Button")
        );
        assert_eq!(
            t.transform("text", "OK", Backend::Appium).unwrap(),
            BackendLocator::query("xpath", "//*[@text='OK' or @label='OK' or @name='OK']")
        );
    }

    #[test]
    fn test_xpath_uses_reserved_native_entry() {
        let t = SelectorTransformer::new();
        let loc = t
            .transform("xpath", "//android.widget.Button", Backend::Uiautomator2)
            .unwrap();
        assert_eq!(loc.xpath(), Some("//android.widget.Button"));
    }

    #[test]
    fn test_boolean_state_is_lowercased() {
        let t = SelectorTransformer::new();
        assert_eq!(
            t.transform("clickable", "True", Backend::Uiautomator2).unwrap(),
            BackendLocator::native("clickable", "true")
        );
        assert_eq!(
            t.transform("selected", "FALSE", Backend::Appium).unwrap(),
            BackendLocator::query("xpath", "//*[@selected='false']")
        );
    }

    #[test]
    fn test_unsupported_errors() {
        let t = SelectorTransformer::new();
        assert!(matches!(
            t.transform("css", ".btn", Backend::Appium),
            Err(Error::UnsupportedSelectorType(_))
        ));
        assert!(matches!(
            t.transform("ios_predicate", "name == 'x'", Backend::Uiautomator2),
            Err(Error::UnsupportedForBackend {
                backend: Backend::Uiautomator2,
                ..
            })
        ));
    }

    #[test]
    fn test_register_extension() {
        let mut t = SelectorTransformer::new();
        t.register(
            "description_contains",
            SelectorMapping {
                appium: Some(SelectorTarget::new("xpath", |v: &str| {
                    format!("//*[contains(@content-desc, {})]", xpath_literal(v))
                })),
                uiautomator2: Some(SelectorTarget::verbatim("descriptionContains")),
            },
        )
        .unwrap();
        assert!(t.supports("description_contains"));
        assert_eq!(
            t.transform("description_contains", "Cart", Backend::Uiautomator2)
                .unwrap(),
            BackendLocator::native("descriptionContains", "Cart")
        );

        let dup = t.register("text", SelectorMapping::default());
        assert!(matches!(dup, Err(Error::DuplicateSelectorType(ref n)) if n == "text"));
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("plain"), "'plain'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal("it's \"x\""),
            "concat('it', \"'\", 's \"x\"')"
        );
    }
}
