use super::locators::{LocatorCatalog, Strategy};
use super::scalar_string;
use super::types::{
    Action, Assertion, AssertionKind, EventConfig, Step, StepDefinition, SwipeConfig, TestCase,
    TestStepRef,
};
use crate::driver::traits::SwipeDirection;
use crate::error::{Error, Result};
use anyhow::Context;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Step bodies keyed by step id
pub type StepCatalog = HashMap<String, StepDefinition>;

/// A test suite directory: `locators/`, `steps/` and `test_cases/`
#[derive(Debug, Clone)]
pub struct Suite {
    root: PathBuf,
    pub locators: Arc<LocatorCatalog>,
}

impl Suite {
    /// Open a suite and load its locator catalog
    pub fn load(root: &Path) -> Result<Self> {
        let locators = LocatorCatalog::load_dir(&root.join("locators"))?;
        Ok(Self {
            root: root.to_path_buf(),
            locators: Arc::new(locators),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Test case ids (file stems under `test_cases/`), sorted
    pub fn test_ids(&self) -> Result<Vec<String>> {
        let pattern = self.root.join("test_cases").join("*.yaml");
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).with_context(|| format!("Invalid pattern {}", pattern))?;
        let mut ids: Vec<String> = paths
            .filter_map(|p| p.ok())
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn load_test(&self, id: &str) -> Result<TestCase> {
        let path = self.root.join("test_cases").join(format!("{}.yaml", id));
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read test case: {}", path.display()))?;
        let mut test = parse_test_case(&content)
            .map_err(|e| Error::InvalidDefinition(format!("{}: {}", path.display(), e)))?;
        test.id = id.to_string();
        Ok(test)
    }

    pub fn load_steps(&self, file: &str) -> Result<StepCatalog> {
        let path = self.root.join("steps").join(file);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read step file: {}", path.display()))?;
        parse_step_catalog(&content)
            .map_err(|e| Error::InvalidDefinition(format!("{}: {}", path.display(), e)))
    }

    /// Load a test case's step file and compile its steps
    pub fn compile(&self, test: &TestCase) -> Result<Vec<Step>> {
        let steps = self.load_steps(&test.step_file)?;
        compile_steps(test, &steps)
    }
}

pub fn parse_test_case(content: &str) -> Result<TestCase> {
    serde_yaml::from_str(content).map_err(|e| Error::InvalidDefinition(e.to_string()))
}

pub fn parse_step_catalog(content: &str) -> Result<StepCatalog> {
    if content.trim().is_empty() {
        return Ok(StepCatalog::new());
    }
    serde_yaml::from_str(content).map_err(|e| Error::InvalidDefinition(e.to_string()))
}

/// Compile every step of `test` against its step bodies
pub fn compile_steps(test: &TestCase, steps: &StepCatalog) -> Result<Vec<Step>> {
    test.test_steps
        .iter()
        .map(|step_ref| {
            let definition = steps.get(&step_ref.step_id).ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "step '{}' is not defined in {}",
                    step_ref.step_id, test.step_file
                ))
            })?;
            compile_step(step_ref, definition)
        })
        .collect()
}

/// Typed lookups over a step's `configs`, falling back to its `parameters`
struct Params<'a> {
    scope: String,
    layers: Vec<&'a Mapping>,
}

impl<'a> Params<'a> {
    fn new(scope: String, layers: Vec<&'a Mapping>) -> Self {
        Self { scope, layers }
    }

    fn invalid(&self, message: impl std::fmt::Display) -> Error {
        Error::InvalidDefinition(format!("{}: {}", self.scope, message))
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.layers
            .iter()
            .copied()
            .find_map(|m| m.get(key))
            .filter(|v| !v.is_null())
    }

    fn string(&self, keys: &[&str]) -> Result<Option<String>> {
        for key in keys {
            if let Some(value) = self.get(key) {
                return scalar_string(value)
                    .map(Some)
                    .ok_or_else(|| self.invalid(format!("'{}' must be a scalar", key)));
            }
        }
        Ok(None)
    }

    fn required(&self, keys: &[&str]) -> Result<String> {
        self.string(keys)?
            .ok_or_else(|| self.invalid(format!("missing parameter '{}'", keys.join("' or '"))))
    }

    fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" => Ok(true),
                "false" | "no" => Ok(false),
                _ => Err(self.invalid(format!("'{}' must be a boolean", key))),
            },
            Some(_) => Err(self.invalid(format!("'{}' must be a boolean", key))),
        }
    }

    fn float(&self, keys: &[&str]) -> Result<Option<f64>> {
        for key in keys {
            if let Some(value) = self.get(key) {
                let parsed = match value {
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    other => other.as_f64(),
                };
                return parsed
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map(Some)
                    .ok_or_else(|| self.invalid(format!("'{}' must be a non-negative number", key)));
            }
        }
        Ok(None)
    }

    fn count(&self, keys: &[&str]) -> Result<Option<u32>> {
        for key in keys {
            if let Some(value) = self.get(key) {
                let parsed = match value {
                    Value::String(s) => s.trim().parse::<u32>().ok(),
                    other => other.as_u64().and_then(|n| u32::try_from(n).ok()),
                };
                return parsed
                    .map(Some)
                    .ok_or_else(|| self.invalid(format!("'{}' must be a non-negative integer", key)));
            }
        }
        Ok(None)
    }

    fn seconds(&self, keys: &[&str]) -> Result<Option<Duration>> {
        Ok(self.float(keys)?.map(Duration::from_secs_f64))
    }

    fn direction(&self, key: &str) -> Result<Option<SwipeDirection>> {
        self.string(&[key])?.map(|d| d.parse()).transpose()
    }

    fn swipe(&self) -> Result<SwipeConfig> {
        let defaults = SwipeConfig::default();
        let distance = self.float(&["distance"])?.unwrap_or(defaults.distance);
        if distance <= 0.0 || distance > 1.0 {
            return Err(self.invalid(format!("'distance' must be in (0, 1], got {}", distance)));
        }
        Ok(SwipeConfig {
            direction: self.direction("direction")?.unwrap_or(defaults.direction),
            fallback_direction: self.direction("fallback_direction")?,
            max_swipes: self
                .count(&["max_swipe", "maxswipe", "max_swipes"])?
                .unwrap_or(defaults.max_swipes),
            distance,
            selector: self.string(&["selector"])?,
        })
    }
}

pub fn compile_step(step_ref: &TestStepRef, definition: &StepDefinition) -> Result<Step> {
    let params = Params::new(
        format!("step '{}'", step_ref.step_id),
        vec![&step_ref.configs, &definition.parameters],
    );

    let action = compile_action(&definition.action, &params)?;

    let assertions = match params.get("assertions") {
        None => Vec::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                compile_assertion(item).map_err(|e| {
                    Error::InvalidDefinition(format!("step '{}' assertion {}: {}", step_ref.step_id, i + 1, e))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(params.invalid("'assertions' must be a list")),
    };

    Ok(Step {
        id: step_ref.step_id.clone(),
        name: definition.name.clone(),
        description: definition.description.clone(),
        action,
        assertions,
        pre_wait: params.seconds(&["wait_timeout"])?,
        retries: params.count(&["retry", "retries"])?,
        screenshot: match params.get("screenshot") {
            None => None,
            Some(_) => Some(params.flag("screenshot")?),
        },
    })
}

fn compile_action(name: &str, params: &Params) -> Result<Action> {
    let target = || params.required(&["target", "locator_id", "locator_key"]);
    let action = match name.trim().to_lowercase().as_str() {
        "launch_app" => Action::LaunchApp {
            package: params.required(&["app_package", "package"])?,
            force_stop: params.flag("force_stop")?,
            clear_data: params.flag("clear_data")?,
        },
        "click" => Action::Click {
            locator: params.required(&["locator_id", "locator_key", "target"])?,
            ignore: params.flag("ignore")?,
        },
        "swipe" => Action::Swipe {
            swipe: params.swipe()?,
            count: params.count(&["count"])?.unwrap_or(1),
        },
        "swipe_until_visible" => Action::SwipeUntilVisible {
            target: target()?,
            swipe: params.swipe()?,
        },
        "swipe_until_not_visible" => Action::SwipeUntilNotVisible {
            target: target()?,
            swipe: params.swipe()?,
        },
        "swipe_to_element" => Action::SwipeToElement {
            target: target()?,
            swipe: params.swipe()?,
        },
        "swipe_refresh" => Action::SwipeRefresh {
            selector: params.string(&["selector"])?,
        },
        "swipe_and_collect_children" => {
            let child = params
                .get("child_selector")
                .ok_or_else(|| params.invalid("missing parameter 'child_selector'"))
                .and_then(|v| Strategy::from_value(v).map_err(|e| params.invalid(e)))?;
            Action::SwipeAndCollectChildren {
                parent: params.required(&["parent"])?,
                child,
                swipe: params.swipe()?,
            }
        }
        "wait" => Action::Wait {
            duration: params
                .seconds(&["seconds", "duration"])?
                .unwrap_or(Duration::from_secs(1)),
        },
        other => return Err(params.invalid(format!("unknown action '{}'", other))),
    };
    Ok(action)
}

pub fn compile_assertion(value: &Value) -> Result<Assertion> {
    let map = value
        .as_mapping()
        .ok_or_else(|| Error::InvalidDefinition("assertion must be a mapping".into()))?;
    let type_name = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidDefinition("assertion is missing 'type'".into()))?;
    let params = Params::new(format!("assertion '{}'", type_name), vec![map]);

    let kind = AssertionKind::parse(type_name);
    let mut assertion = Assertion::new(kind.clone());
    assertion.type_name = type_name.to_string();

    if let Some(expected) = params.get("expected") {
        assertion.expected = serde_json::to_value(expected).map_err(|e| params.invalid(e))?;
    }
    assertion.locator = params.string(&["locator", "target", "locator_id"])?;
    if assertion.locator.is_none() && kind.needs_locator() {
        // Visibility-style checks name their element in `expected`
        if let serde_json::Value::String(key) = &assertion.expected {
            assertion.locator = Some(key.clone());
        } else {
            return Err(params.invalid("missing 'locator'"));
        }
    }
    assertion.attribute = params.string(&["attribute"])?;
    if let Some(tolerance) = params.count(&["tolerance"])? {
        assertion.tolerance = i32::try_from(tolerance)
            .map_err(|_| params.invalid(format!("'tolerance' is out of range: {}", tolerance)))?;
    }
    assertion.ignore_interference =
        params.flag("ignore_interference")? || type_name.eq_ignore_ascii_case("app_launched");
    if params.flag("swipe")? {
        assertion.swipe = Some(params.swipe()?);
    }
    if let Some(timeout) = params.seconds(&["timeout"])? {
        assertion.timeout = timeout;
    }
    assertion.message = params.string(&["message"])?;
    if let Some(interval) = params.seconds(&["check_interval"])? {
        assertion.check_interval = interval.max(Duration::from_millis(10));
    }

    let defaults = EventConfig::default();
    assertion.event = EventConfig {
        tags: match params.get("tag").or_else(|| params.get("tags")) {
            None => Vec::new(),
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_string).collect(),
            Some(other) => scalar_string(other).into_iter().collect(),
        },
        buffer: params.seconds(&["buffer_timeout"])?.unwrap_or(defaults.buffer),
        start_timestamp: params.float(&["start_timestamp"])?,
        regex: params.string(&["regex"])?,
        window: params.seconds(&["window"])?.unwrap_or(defaults.window),
    };

    Ok(assertion)
}
