use super::locators::Strategy;
use crate::driver::traits::SwipeDirection;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::time::Duration;

/// Step body from a step file: `STEP_ID: { name, description, action, parameters }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Mapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reference to a step body plus per-use configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStepRef {
    pub step_id: String,
    #[serde(default)]
    pub configs: Mapping,
}

/// A test case file: `test_cases/<ID>.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub test_metadata: TestMetadata,
    #[serde(default = "default_step_file")]
    pub step_file: String,
    #[serde(default)]
    pub test_steps: Vec<TestStepRef>,
}

fn default_step_file() -> String {
    "base_steps.yaml".to_string()
}

impl TestCase {
    /// Whether this test runs for `env`; a test without tags runs everywhere
    pub fn matches_env(&self, env: &str) -> bool {
        self.test_metadata.tags.is_empty()
            || self
                .test_metadata
                .tags
                .iter()
                .any(|t| t.eq_ignore_ascii_case(env))
    }
}

/// Swipe settings shared by gesture actions and swipe-assisted assertions
#[derive(Debug, Clone, PartialEq)]
pub struct SwipeConfig {
    pub direction: SwipeDirection,
    pub fallback_direction: Option<SwipeDirection>,
    pub max_swipes: u32,
    /// Fraction of the element or screen extent covered by one swipe
    pub distance: f64,
    /// Locator key of the element to swipe inside; whole screen when `None`
    pub selector: Option<String>,
}

impl Default for SwipeConfig {
    fn default() -> Self {
        Self {
            direction: SwipeDirection::Up,
            fallback_direction: None,
            max_swipes: 10,
            distance: 0.7,
            selector: None,
        }
    }
}

/// Compiled step action
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    LaunchApp {
        package: String,
        force_stop: bool,
        clear_data: bool,
    },
    Click {
        locator: String,
        /// Treat a missing element as success
        ignore: bool,
    },
    Swipe {
        swipe: SwipeConfig,
        count: u32,
    },
    SwipeUntilVisible {
        target: String,
        swipe: SwipeConfig,
    },
    SwipeUntilNotVisible {
        target: String,
        swipe: SwipeConfig,
    },
    SwipeToElement {
        target: String,
        swipe: SwipeConfig,
    },
    SwipeRefresh {
        selector: Option<String>,
    },
    SwipeAndCollectChildren {
        parent: String,
        child: Strategy,
        swipe: SwipeConfig,
    },
    Wait {
        duration: Duration,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::LaunchApp { .. } => "launch_app",
            Action::Click { .. } => "click",
            Action::Swipe { .. } => "swipe",
            Action::SwipeUntilVisible { .. } => "swipe_until_visible",
            Action::SwipeUntilNotVisible { .. } => "swipe_until_not_visible",
            Action::SwipeToElement { .. } => "swipe_to_element",
            Action::SwipeRefresh { .. } => "swipe_refresh",
            Action::SwipeAndCollectChildren { .. } => "swipe_and_collect_children",
            Action::Wait { .. } => "wait",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Equals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeMatch {
    Equals,
    Contains,
}

/// Closed set of assertion types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionKind {
    Visible,
    NotVisible,
    Exists,
    NotExists,
    Enabled,
    Disabled,
    Selected,
    NotSelected,
    Text(TextMatch),
    Attribute(AttributeMatch),
    ElementCount,
    CountGreaterThan,
    ListContainsText,
    ElementPosition,
    ElementSize,
    CurrentApp,
    ScreenOrientation,
    EventTriggered,
    ElementAppears,
    BackgroundColor,
    TextColor,
    /// Unrecognised type name; fails when evaluated
    Unknown(String),
}

impl AssertionKind {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "visible" => Self::Visible,
            "not_visible" => Self::NotVisible,
            "exists" => Self::Exists,
            "not_exists" => Self::NotExists,
            "enabled" => Self::Enabled,
            "disabled" => Self::Disabled,
            "selected" => Self::Selected,
            "not_selected" => Self::NotSelected,
            "text_equals" => Self::Text(TextMatch::Equals),
            "text_contains" => Self::Text(TextMatch::Contains),
            "text_not_contains" => Self::Text(TextMatch::NotContains),
            "text_starts_with" => Self::Text(TextMatch::StartsWith),
            "text_ends_with" => Self::Text(TextMatch::EndsWith),
            "attribute_equals" => Self::Attribute(AttributeMatch::Equals),
            "attribute_contains" => Self::Attribute(AttributeMatch::Contains),
            "element_count" => Self::ElementCount,
            "element_count_greater_than" | "count_greater_than" => Self::CountGreaterThan,
            "list_contains_text" => Self::ListContainsText,
            "element_position" => Self::ElementPosition,
            "element_size" => Self::ElementSize,
            "current_app" | "app_launched" => Self::CurrentApp,
            "screen_orientation" => Self::ScreenOrientation,
            "event_triggered" => Self::EventTriggered,
            "element_appears" => Self::ElementAppears,
            "background_color" => Self::BackgroundColor,
            "text_color" => Self::TextColor,
            _ => Self::Unknown(name.to_string()),
        }
    }

    /// Whether the assertion targets an element through a locator key
    pub fn needs_locator(&self) -> bool {
        !matches!(
            self,
            Self::CurrentApp | Self::ScreenOrientation | Self::EventTriggered | Self::Unknown(_)
        )
    }
}

/// Settings for `event_triggered`
#[derive(Debug, Clone, PartialEq)]
pub struct EventConfig {
    /// Only lines containing one of these substrings are parsed; empty means every line
    pub tags: Vec<String>,
    /// Accepted timestamp window after the start timestamp
    pub buffer: Duration,
    /// Epoch seconds; defaults to the step start
    pub start_timestamp: Option<f64>,
    /// Extraction regex; capture group 1 (or the whole match) holds the JSON
    pub regex: Option<String>,
    /// How long the log is polled
    pub window: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            buffer: Duration::from_secs(10),
            start_timestamp: None,
            regex: None,
            window: Duration::from_secs(5),
        }
    }
}

/// Compiled assertion with every default resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub kind: AssertionKind,
    /// Type name as written in the test case
    pub type_name: String,
    pub expected: serde_json::Value,
    pub locator: Option<String>,
    pub attribute: Option<String>,
    /// Pixel tolerance for position and size checks
    pub tolerance: i32,
    pub ignore_interference: bool,
    /// Scroll the element into view before checking
    pub swipe: Option<SwipeConfig>,
    pub timeout: Duration,
    /// Replaces the generated failure diagnostic
    pub message: Option<String>,
    pub event: EventConfig,
    pub check_interval: Duration,
}

impl Assertion {
    pub fn new(kind: AssertionKind) -> Self {
        let timeout = if kind == AssertionKind::ElementAppears {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(10)
        };
        Self {
            type_name: String::new(),
            kind,
            expected: serde_json::Value::Null,
            locator: None,
            attribute: None,
            tolerance: 5,
            ignore_interference: false,
            swipe: None,
            timeout,
            message: None,
            event: EventConfig::default(),
            check_interval: Duration::from_millis(500),
        }
    }

    /// Expected value rendered as plain text (strings without quotes)
    pub fn expected_text(&self) -> String {
        match &self.expected {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Compiled, executable step
#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub description: String,
    pub action: Action,
    pub assertions: Vec<Assertion>,
    /// Sleep before each attempt
    pub pre_wait: Option<Duration>,
    /// Overrides the configured retry count
    pub retries: Option<u32>,
    /// Overrides the configured screenshot-per-step setting
    pub screenshot: Option<bool>,
}
