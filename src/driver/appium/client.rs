//! Minimal W3C WebDriver HTTP client for an Appium server.

use crate::driver::traits::{Bounds, Point};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Deserialize)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

pub struct WebDriverClient {
    base_url: String,
    client: reqwest::Client,
    session_id: String,
}

impl WebDriverClient {
    /// Create a session on `server_url` with the given capabilities
    pub async fn start_session(server_url: &str, capabilities: Value) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = server_url.trim_end_matches('/').to_string();

        let body = json!({
            "capabilities": {
                "alwaysMatch": capabilities,
                "firstMatch": [{}],
            }
        });
        let resp = client
            .post(format!("{}/session", base_url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Appium server at {}", base_url))?;
        let value = unwrap_response(resp.json().await.context("Failed to parse session response")?)?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("No session ID in response"))?
            .to_string();

        log::debug!("Created Appium session {}", session_id);
        Ok(Self {
            base_url,
            client,
            session_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;
        let value = unwrap_response(resp.json().await?)?;
        serde_json::from_value(value).with_context(|| format!("Unexpected response for GET {}", path))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        let value = unwrap_response(resp.json().await?)?;
        serde_json::from_value(value).with_context(|| format!("Unexpected response for POST {}", path))
    }

    pub async fn delete_session(&self) -> Result<()> {
        self.client
            .delete(format!("{}/session/{}", self.base_url, self.session_id))
            .send()
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    fn scope(parent: Option<&str>) -> String {
        parent
            .map(|id| format!("/element/{}", id))
            .unwrap_or_default()
    }

    pub async fn find_element(&self, using: &str, value: &str, parent: Option<&str>) -> Result<String> {
        let path = format!("{}/element", Self::scope(parent));
        let found: Value = self
            .post(&path, json!({ "using": using, "value": value }))
            .await?;
        element_id(&found)
    }

    pub async fn find_elements(&self, using: &str, value: &str, parent: Option<&str>) -> Result<Vec<String>> {
        let path = format!("{}/elements", Self::scope(parent));
        let found: Vec<Value> = self
            .post(&path, json!({ "using": using, "value": value }))
            .await?;
        found.iter().map(element_id).collect()
    }

    pub async fn click(&self, element: &str) -> Result<()> {
        let _: Value = self
            .post(&format!("/element/{}/click", element), json!({}))
            .await?;
        Ok(())
    }

    pub async fn text(&self, element: &str) -> Result<String> {
        self.get(&format!("/element/{}/text", element)).await
    }

    pub async fn attribute(&self, element: &str, name: &str) -> Result<Option<String>> {
        let value: Value = self
            .get(&format!("/element/{}/attribute/{}", element, name))
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    pub async fn rect(&self, element: &str) -> Result<Bounds> {
        let rect: Rect = self.get(&format!("/element/{}/rect", element)).await?;
        Ok(Bounds::from_rect(
            rect.x as i32,
            rect.y as i32,
            rect.width as i32,
            rect.height as i32,
        ))
    }

    pub async fn tag_name(&self, element: &str) -> Result<String> {
        self.get(&format!("/element/{}/name", element)).await
    }

    pub async fn displayed(&self, element: &str) -> Result<bool> {
        self.get(&format!("/element/{}/displayed", element)).await
    }

    pub async fn enabled(&self, element: &str) -> Result<bool> {
        self.get(&format!("/element/{}/enabled", element)).await
    }

    pub async fn selected(&self, element: &str) -> Result<bool> {
        self.get(&format!("/element/{}/selected", element)).await
    }

    pub async fn window_size(&self) -> Result<(u32, u32)> {
        let rect: Rect = self.get("/window/rect").await?;
        Ok((rect.width as u32, rect.height as u32))
    }

    /// Single-finger drag through the W3C actions API
    pub async fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "finger1",
                "parameters": { "pointerType": "touch" },
                "actions": [
                    { "type": "pointerMove", "duration": 0, "x": from.x, "y": from.y },
                    { "type": "pointerDown", "button": 0 },
                    { "type": "pointerMove", "duration": duration_ms, "x": to.x, "y": to.y },
                    { "type": "pointerUp", "button": 0 }
                ]
            }]
        });
        let _: Value = self.post("/actions", actions).await?;
        Ok(())
    }

    pub async fn activate_app(&self, package: &str) -> Result<()> {
        let _: Value = self
            .post("/appium/device/activate_app", json!({ "appId": package }))
            .await?;
        Ok(())
    }

    pub async fn terminate_app(&self, package: &str) -> Result<()> {
        let _: Value = self
            .post("/appium/device/terminate_app", json!({ "appId": package }))
            .await?;
        Ok(())
    }

    pub async fn current_package(&self) -> Result<String> {
        self.get("/appium/device/current_package").await
    }

    pub async fn orientation(&self) -> Result<String> {
        self.get("/orientation").await
    }

    /// Base64-encoded PNG of the screen
    pub async fn screenshot(&self) -> Result<String> {
        self.get("/screenshot").await
    }
}

/// Return the `value` payload or the W3C error it carries
fn unwrap_response(body: Value) -> Result<Value> {
    let Value::Object(mut map) = body else {
        anyhow::bail!("Malformed WebDriver response");
    };
    let value = map.remove("value").unwrap_or(Value::Null);
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        anyhow::bail!("{}: {}", error, message);
    }
    Ok(value)
}

fn element_id(value: &Value) -> Result<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Response does not contain an element reference"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_response_surfaces_w3c_errors() {
        let ok = unwrap_response(json!({ "value": { "sessionId": "abc" } })).unwrap();
        assert_eq!(ok["sessionId"], "abc");

        let err = unwrap_response(json!({
            "value": { "error": "no such element", "message": "An element could not be located" }
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "no such element: An element could not be located");
    }

    #[test]
    fn test_element_id_accepts_both_reference_keys() {
        assert_eq!(element_id(&json!({ ELEMENT_KEY: "el-1" })).unwrap(), "el-1");
        assert_eq!(element_id(&json!({ "ELEMENT": "el-2" })).unwrap(), "el-2");
        assert!(element_id(&json!({})).is_err());
    }
}
