use serde::{Deserialize, Serialize};

/// Final status of a test, step or assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRecord {
    #[serde(rename = "type")]
    pub assertion_type: String,
    #[serde(default)]
    pub expected: serde_json::Value,
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub swipes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub action: String,
    pub status: Status,
    pub attempts: u32,
    pub duration_sec: f64,
    pub timestamp: String,
    #[serde(default)]
    pub swipes: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collected: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub assertions: Vec<AssertionRecord>,
    #[serde(default)]
    pub artifacts: StepArtifacts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestArtifacts {
    #[serde(default)]
    pub screenshots_dir: Option<String>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
}

/// One test case run on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub test_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub device_id: String,
    pub driver: String,
    pub status: Status,
    pub duration_sec: f64,
    pub timestamp: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub artifacts: TestArtifacts,
}

/// Totals over a set of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub devices: u32,
    pub duration_sec: f64,
}

impl Summary {
    pub fn from_records(records: &[TestRecord]) -> Self {
        let mut devices: Vec<&str> = records.iter().map(|r| r.device_id.as_str()).collect();
        devices.sort_unstable();
        devices.dedup();

        let passed = records.iter().filter(|r| r.status == Status::Passed).count() as u32;
        Self {
            total: records.len() as u32,
            passed,
            failed: records.len() as u32 - passed,
            devices: devices.len() as u32,
            duration_sec: records.iter().map(|r| r.duration_sec).sum(),
        }
    }

    pub fn pass_rate(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            (self.passed as f64 / self.total as f64 * 100.0) as u32
        }
    }
}

#[cfg(test)]
pub(crate) fn record(test_id: &str, device_id: &str, status: Status) -> TestRecord {
    TestRecord {
        test_id: test_id.to_string(),
        name: format!("{} name", test_id),
        description: String::new(),
        tags: vec!["stage".to_string()],
        device_id: device_id.to_string(),
        driver: "uiautomator2".to_string(),
        status,
        duration_sec: 1.5,
        timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        error: None,
        steps: Vec::new(),
        artifacts: TestArtifacts::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let mut rec = record("TC001", "emulator-5554", Status::Failed);
        rec.steps.push(StepRecord {
            step_id: "LOGIN".into(),
            name: "Tap login".into(),
            description: String::new(),
            action: "click".into(),
            status: Status::Failed,
            attempts: 2,
            duration_sec: 3.0,
            timestamp: rec.timestamp.clone(),
            swipes: 0,
            collected: Vec::new(),
            error: Some("Element 'login_button' not found".into()),
            assertions: vec![AssertionRecord {
                assertion_type: "visible".into(),
                expected: serde_json::json!("login_button"),
                status: Status::Failed,
                message: "nope".into(),
                swipes: 1,
            }],
            artifacts: StepArtifacts::default(),
        });

        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["steps"][0]["assertions"][0]["type"], "visible");
        assert!(value["steps"][0].get("collected").is_none());

        let back: TestRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            record("TC001", "a", Status::Passed),
            record("TC002", "a", Status::Failed),
            record("TC001", "b", Status::Passed),
        ];
        let summary = Summary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.devices, 2);
        assert_eq!(summary.pass_rate(), 66);
        assert_eq!(summary.duration_sec, 4.5);
    }
}
