use crate::parser::types::{Step, TestCase};
use crate::report::types::{
    AssertionRecord, Status, StepArtifacts, StepRecord, TestArtifacts, TestRecord,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

fn now_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Step lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Executing { attempt: u32 },
    Retrying { attempt: u32, max_attempts: u32 },
    Succeeded,
    Failed { error: String },
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed { .. })
    }
}

/// State for a single step execution
#[derive(Debug, Clone)]
pub struct StepState {
    pub index: usize,
    pub step_id: String,
    pub name: String,
    pub description: String,
    pub action: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub started_at: Option<Instant>,
    pub timestamp: String,
    pub duration: Duration,
    pub swipes: u32,
    pub collected: Vec<String>,
    pub assertions: Vec<AssertionRecord>,
    pub screenshot: Option<String>,
}

impl StepState {
    pub fn new(index: usize, step: &Step) -> Self {
        Self {
            index,
            step_id: step.id.clone(),
            name: step.name.clone(),
            description: step.description.clone(),
            action: step.action.name().to_string(),
            status: StepStatus::Pending,
            attempts: 0,
            started_at: None,
            timestamp: String::new(),
            duration: Duration::ZERO,
            swipes: 0,
            collected: Vec::new(),
            assertions: Vec::new(),
            screenshot: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.timestamp = now_timestamp();
    }

    pub fn begin_attempt(&mut self, attempt: u32) {
        self.attempts = attempt;
        self.status = StepStatus::Executing { attempt };
    }

    pub fn retry(&mut self, attempt: u32, max_attempts: u32) {
        self.status = StepStatus::Retrying {
            attempt,
            max_attempts,
        };
    }

    pub fn succeed(&mut self) {
        self.finish(StepStatus::Succeeded);
    }

    pub fn fail(&mut self, error: String) {
        self.finish(StepStatus::Failed { error });
    }

    fn finish(&mut self, status: StepStatus) {
        self.status = status;
        if let Some(start) = self.started_at {
            self.duration = start.elapsed();
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            StepStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn to_record(&self) -> StepRecord {
        StepRecord {
            step_id: self.step_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            action: self.action.clone(),
            status: if self.status == StepStatus::Succeeded {
                Status::Passed
            } else {
                Status::Failed
            },
            attempts: self.attempts,
            duration_sec: self.duration.as_secs_f64(),
            timestamp: self.timestamp.clone(),
            swipes: self.swipes,
            collected: self.collected.clone(),
            error: self.error().map(str::to_string),
            assertions: self.assertions.clone(),
            artifacts: StepArtifacts {
                screenshot: self.screenshot.clone(),
            },
        }
    }
}

/// Test lifecycle; a failed step aborts the run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    /// Failed before any step ran (load or connection error)
    Failed { error: String },
    Aborted { step_id: String, error: String },
}

/// State for one test case on one device
#[derive(Debug, Clone)]
pub struct TestState {
    pub test_id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub device_id: String,
    pub driver: String,
    pub status: TestStatus,
    pub steps: Vec<StepState>,
    pub started_at: Option<Instant>,
    pub timestamp: String,
    pub duration: Duration,
    pub artifacts: TestArtifacts,
}

impl TestState {
    pub fn new(test_id: &str, device_id: &str, driver: &str) -> Self {
        Self {
            test_id: test_id.to_string(),
            name: test_id.to_string(),
            description: String::new(),
            tags: Vec::new(),
            device_id: device_id.to_string(),
            driver: driver.to_string(),
            status: TestStatus::Pending,
            steps: Vec::new(),
            started_at: None,
            timestamp: now_timestamp(),
            duration: Duration::ZERO,
            artifacts: TestArtifacts::default(),
        }
    }

    pub fn describe(&mut self, test_case: &TestCase) {
        if !test_case.test_metadata.name.is_empty() {
            self.name = test_case.test_metadata.name.clone();
        }
        self.description = test_case.test_metadata.description.clone();
        self.tags = test_case.test_metadata.tags.clone();
    }

    pub fn start(&mut self) {
        self.status = TestStatus::Running;
        self.started_at = Some(Instant::now());
        self.timestamp = now_timestamp();
    }

    pub fn is_running(&self) -> bool {
        self.status == TestStatus::Running
    }

    pub fn abort(&mut self, step_id: &str, error: &str) {
        self.status = TestStatus::Aborted {
            step_id: step_id.to_string(),
            error: error.to_string(),
        };
    }

    pub fn fail(&mut self, error: String) {
        self.status = TestStatus::Failed { error };
    }

    /// Close the run; a test still running at this point passed
    pub fn finish(&mut self) {
        if let Some(start) = self.started_at {
            self.duration = start.elapsed();
        }
        if self.status == TestStatus::Running {
            self.status = TestStatus::Passed;
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    pub fn error(&self) -> Option<String> {
        match &self.status {
            TestStatus::Failed { error } => Some(error.clone()),
            TestStatus::Aborted { step_id, error } => Some(format!("Step {} failed: {}", step_id, error)),
            _ => None,
        }
    }

    pub fn total_swipes(&self) -> u32 {
        self.steps.iter().map(|s| s.swipes).sum()
    }

    pub fn to_record(&self) -> TestRecord {
        TestRecord {
            test_id: self.test_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            device_id: self.device_id.clone(),
            driver: self.driver.clone(),
            status: if self.passed() {
                Status::Passed
            } else {
                Status::Failed
            },
            duration_sec: self.duration.as_secs_f64(),
            timestamp: self.timestamp.clone(),
            error: self.error(),
            steps: self.steps.iter().map(StepState::to_record).collect(),
            artifacts: self.artifacts.clone(),
        }
    }
}
