//! Scripted in-memory device for unit tests.

use super::selector::{BackendLocator, SelectorTransformer};
use super::traits::{
    Backend, Bounds, DeviceDriver, Element, ElementHandle, Orientation, Point, SwipeDirection,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Element scripted into a [`MockDriver`], addressed by a generic selector
#[derive(Clone)]
pub struct MockElement {
    selector_type: String,
    selector_value: String,
    text: String,
    class: String,
    bounds: Bounds,
    visible: bool,
    enabled: bool,
    selected: bool,
    attrs: HashMap<String, String>,
    reveal_after: Option<(Option<SwipeDirection>, u32)>,
    gone_after: Option<u32>,
    available_after_finds: u32,
    error: Option<String>,
    child_pages: Vec<Vec<MockElement>>,
    children_error_at: Option<u32>,
}

impl MockElement {
    pub fn new(selector_type: &str, selector_value: &str) -> Self {
        Self {
            selector_type: selector_type.to_string(),
            selector_value: selector_value.to_string(),
            text: String::new(),
            class: "android.view.View".to_string(),
            bounds: Bounds::from_rect(0, 0, 100, 50),
            visible: true,
            enabled: true,
            selected: false,
            attrs: HashMap::new(),
            reveal_after: None,
            gone_after: None,
            available_after_finds: 0,
            error: None,
            child_pages: Vec::new(),
            children_error_at: None,
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Present only after `count` swipes, in `direction` or any direction
    pub fn revealed_after(mut self, direction: Option<SwipeDirection>, count: u32) -> Self {
        self.reveal_after = Some((direction, count));
        self
    }

    /// Absent once `count` swipes have happened
    pub fn gone_after(mut self, count: u32) -> Self {
        self.gone_after = Some(count);
        self
    }

    /// Absent until the driver has served `count` lookups
    pub fn available_after_finds(mut self, count: u32) -> Self {
        self.available_after_finds = count;
        self
    }

    /// Lookups matching this element fail with `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    /// Children served per swipe count; the last page repeats
    pub fn child_pages(mut self, pages: Vec<Vec<MockElement>>) -> Self {
        self.child_pages = pages;
        self
    }

    pub fn children_error_at(mut self, swipes: u32) -> Self {
        self.children_error_at = Some(swipes);
        self
    }

    fn locator(&self, transformer: &SelectorTransformer, backend: Backend) -> Option<BackendLocator> {
        transformer
            .transform(&self.selector_type, &self.selector_value, backend)
            .ok()
    }

    fn present(&self, state: &MockState) -> bool {
        let revealed = match self.reveal_after {
            None => true,
            Some((None, n)) => state.swipes.len() as u32 >= n,
            Some((Some(dir), n)) => state.swipe_count(dir) >= n,
        };
        let gone = self
            .gone_after
            .map(|n| state.swipes.len() as u32 >= n)
            .unwrap_or(false);
        revealed && !gone && state.find_calls >= self.available_after_finds
    }
}

struct MockState {
    elements: Vec<MockElement>,
    swipes: Vec<(Point, Point, SwipeDirection)>,
    find_calls: u32,
    queried: Vec<BackendLocator>,
    clicks: HashMap<String, u32>,
    current_package: String,
    recent: Vec<String>,
    orientation: Orientation,
    launched: Vec<String>,
    stopped: Vec<String>,
    cleared: Vec<String>,
    clear_error: Option<String>,
    screenshots: u32,
}

impl MockState {
    fn swipe_count(&self, direction: SwipeDirection) -> u32 {
        self.swipes.iter().filter(|(_, _, d)| *d == direction).count() as u32
    }
}

/// Simulated device backend
#[derive(Clone)]
pub struct MockDriver {
    backend: Backend,
    transformer: Arc<SelectorTransformer>,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            transformer: Arc::new(SelectorTransformer::new()),
            state: Arc::new(Mutex::new(MockState {
                elements: Vec::new(),
                swipes: Vec::new(),
                find_calls: 0,
                queried: Vec::new(),
                clicks: HashMap::new(),
                current_package: "com.android.launcher".to_string(),
                recent: Vec::new(),
                orientation: Orientation::Portrait,
                launched: Vec::new(),
                stopped: Vec::new(),
                cleared: Vec::new(),
                clear_error: None,
                screenshots: 0,
            })),
        }
    }

    pub fn add(&self, element: MockElement) {
        self.state.lock().unwrap().elements.push(element);
    }

    pub fn find_calls(&self) -> u32 {
        self.state.lock().unwrap().find_calls
    }

    pub fn queried(&self) -> Vec<BackendLocator> {
        self.state.lock().unwrap().queried.clone()
    }

    pub fn swipe_count(&self) -> u32 {
        self.state.lock().unwrap().swipes.len() as u32
    }

    pub fn swipe_count_in(&self, direction: SwipeDirection) -> u32 {
        self.state.lock().unwrap().swipe_count(direction)
    }

    pub fn swipes(&self) -> Vec<(Point, Point)> {
        self.state
            .lock()
            .unwrap()
            .swipes
            .iter()
            .map(|(a, b, _)| (*a, *b))
            .collect()
    }

    pub fn clicks(&self, selector_value: &str) -> u32 {
        *self
            .state
            .lock()
            .unwrap()
            .clicks
            .get(selector_value)
            .unwrap_or(&0)
    }

    pub fn launched(&self) -> Vec<String> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.state.lock().unwrap().cleared.clone()
    }

    pub fn screenshots(&self) -> u32 {
        self.state.lock().unwrap().screenshots
    }

    pub fn set_current_package(&self, package: &str) {
        self.state.lock().unwrap().current_package = package.to_string();
    }

    pub fn set_recent(&self, packages: &[&str]) {
        self.state.lock().unwrap().recent = packages.iter().map(|p| p.to_string()).collect();
    }

    pub fn set_orientation(&self, orientation: Orientation) {
        self.state.lock().unwrap().orientation = orientation;
    }

    pub fn fail_clear_data(&self, message: &str) {
        self.state.lock().unwrap().clear_error = Some(message.to_string());
    }

    fn matching(&self, locator: &BackendLocator) -> Result<Vec<Element>> {
        let mut state = self.state.lock().unwrap();
        state.find_calls += 1;
        state.queried.push(locator.clone());

        let mut found: Vec<Element> = Vec::new();
        for element in &state.elements {
            if element.locator(&self.transformer, self.backend).as_ref() != Some(locator) {
                continue;
            }
            if let Some(message) = &element.error {
                anyhow::bail!("{}", message);
            }
            if element.present(&state) {
                found.push(Box::new(MockHandle {
                    element: element.clone(),
                    backend: self.backend,
                    transformer: self.transformer.clone(),
                    state: self.state.clone(),
                }));
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl DeviceDriver for MockDriver {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn device_id(&self) -> &str {
        "mock-device"
    }

    async fn find_element(&self, locator: &BackendLocator) -> Result<Element> {
        self.matching(locator)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No element matches {}", locator))
    }

    async fn find_elements(&self, locator: &BackendLocator) -> Result<Vec<Element>> {
        self.matching(locator)
    }

    async fn screen_size(&self) -> Result<(u32, u32)> {
        Ok((1080, 2400))
    }

    async fn swipe(&self, from: Point, to: Point, _duration_ms: u64) -> Result<()> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let direction = if dy.abs() >= dx.abs() {
            if dy < 0 {
                SwipeDirection::Up
            } else {
                SwipeDirection::Down
            }
        } else if dx < 0 {
            SwipeDirection::Left
        } else {
            SwipeDirection::Right
        };
        self.state.lock().unwrap().swipes.push((from, to, direction));
        Ok(())
    }

    async fn launch_app(&self, package: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.launched.push(package.to_string());
        state.current_package = package.to_string();
        state.recent.insert(0, package.to_string());
        Ok(())
    }

    async fn stop_app(&self, package: &str) -> Result<()> {
        self.state.lock().unwrap().stopped.push(package.to_string());
        Ok(())
    }

    async fn clear_app_data(&self, package: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.clear_error {
            anyhow::bail!("{}", message);
        }
        state.cleared.push(package.to_string());
        Ok(())
    }

    async fn current_package(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_package.clone())
    }

    async fn recent_packages(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().recent.clone())
    }

    async fn orientation(&self) -> Result<Orientation> {
        Ok(self.state.lock().unwrap().orientation)
    }

    async fn take_screenshot(&self, path: &Path) -> Result<()> {
        std::fs::write(path, b"\x89PNG mock")?;
        self.state.lock().unwrap().screenshots += 1;
        Ok(())
    }
}

struct MockHandle {
    element: MockElement,
    backend: Backend,
    transformer: Arc<SelectorTransformer>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl ElementHandle for MockHandle {
    async fn click(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state
            .clicks
            .entry(self.element.selector_value.clone())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        Ok(self.element.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(match name {
            "text" => Some(self.element.text.clone()),
            "className" | "class" => Some(self.element.class.clone()),
            "enabled" => Some(self.element.enabled.to_string()),
            "selected" => Some(self.element.selected.to_string()),
            other => self.element.attrs.get(other).cloned(),
        })
    }

    async fn bounds(&self) -> Result<Bounds> {
        Ok(self.element.bounds)
    }

    async fn class_name(&self) -> Result<String> {
        Ok(self.element.class.clone())
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(self.element.visible)
    }

    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.element.enabled)
    }

    async fn is_selected(&self) -> Result<bool> {
        Ok(self.element.selected)
    }

    async fn find_children(&self, locator: &BackendLocator) -> Result<Vec<Element>> {
        let swipes = self.state.lock().unwrap().swipes.len() as u32;
        if self.element.children_error_at == Some(swipes) {
            anyhow::bail!("stale element reference");
        }
        let Some(last) = self.element.child_pages.len().checked_sub(1) else {
            return Ok(Vec::new());
        };
        let page = &self.element.child_pages[(swipes as usize).min(last)];
        Ok(page
            .iter()
            .filter(|child| child.locator(&self.transformer, self.backend).as_ref() == Some(locator))
            .map(|child| {
                Box::new(MockHandle {
                    element: child.clone(),
                    backend: self.backend,
                    transformer: self.transformer.clone(),
                    state: self.state.clone(),
                }) as Element
            })
            .collect())
    }
}
