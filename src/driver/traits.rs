use super::adb;
use super::selector::BackendLocator;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Device automation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// W3C WebDriver server, XPath-style queries
    Appium,
    /// On-device accessibility dump, native key/value queries
    Uiautomator2,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Appium => write!(f, "appium"),
            Backend::Uiautomator2 => write!(f, "uiautomator2"),
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "appium" => Ok(Backend::Appium),
            "uiautomator2" | "u2" => Ok(Backend::Uiautomator2),
            other => anyhow::bail!("Unknown backend: {}", other),
        }
    }
}

/// Element rectangle in screen pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn from_rect(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Get the center point of the bounds
    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2,
            y: (self.top + self.bottom) / 2,
        }
    }

    /// Parse bounds from string like "[0,0][1080,1920]"
    pub fn parse(s: &str) -> Option<Self> {
        let (left_top, right_bottom) = s.trim().split_once("][")?;
        let parse_pair = |pair: &str| -> Option<(i32, i32)> {
            let (a, b) = pair.split_once(',')?;
            Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
        };
        let (left, top) = parse_pair(left_top.trim_start_matches('['))?;
        let (right, bottom) = parse_pair(right_bottom.trim_end_matches(']'))?;
        Some(Bounds {
            left,
            top,
            right,
            bottom,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Swipe direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    pub fn opposite(self) -> Self {
        match self {
            SwipeDirection::Up => SwipeDirection::Down,
            SwipeDirection::Down => SwipeDirection::Up,
            SwipeDirection::Left => SwipeDirection::Right,
            SwipeDirection::Right => SwipeDirection::Left,
        }
    }
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwipeDirection::Up => "up",
            SwipeDirection::Down => "down",
            SwipeDirection::Left => "left",
            SwipeDirection::Right => "right",
        };
        f.write_str(s)
    }
}

impl FromStr for SwipeDirection {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(SwipeDirection::Up),
            "down" => Ok(SwipeDirection::Down),
            "left" => Ok(SwipeDirection::Left),
            "right" => Ok(SwipeDirection::Right),
            _ => Err(crate::error::Error::InvalidDirection(s.to_string())),
        }
    }
}

/// Screen orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

impl FromStr for Orientation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => anyhow::bail!("Unknown orientation: {}", other),
        }
    }
}

/// Element handle returned by a single backend query.
///
/// Handles are never cached across polls; every lookup yields a fresh one.
pub type Element = Box<dyn ElementHandle>;

/// Capability surface of one located element
#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn click(&self) -> Result<()>;

    /// Visible text, falling back to the content description
    async fn text(&self) -> Result<String>;

    /// Read a named attribute; `None` when the backend does not report it
    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    async fn bounds(&self) -> Result<Bounds>;

    /// Element class or tag name
    async fn class_name(&self) -> Result<String>;

    async fn is_visible(&self) -> Result<bool>;

    async fn is_enabled(&self) -> Result<bool>;

    async fn is_selected(&self) -> Result<bool>;

    /// Query descendants of this element
    async fn find_children(&self, locator: &BackendLocator) -> Result<Vec<Element>>;
}

/// Capability surface of a connected device.
///
/// The engine only talks to devices through this trait and never branches on
/// which backend sits behind it.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    fn backend(&self) -> Backend;

    fn device_id(&self) -> &str;

    /// Single-attempt lookup of one element; errors when nothing matches
    async fn find_element(&self, locator: &BackendLocator) -> Result<Element>;

    /// Single-attempt lookup of all matching elements; empty when nothing matches
    async fn find_elements(&self, locator: &BackendLocator) -> Result<Vec<Element>>;

    /// Screen width and height in pixels
    async fn screen_size(&self) -> Result<(u32, u32)>;

    async fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()>;

    async fn launch_app(&self, package: &str) -> Result<()>;

    async fn stop_app(&self, package: &str) -> Result<()>;

    /// Clear application data through `pm clear`
    async fn clear_app_data(&self, package: &str) -> Result<()> {
        adb::clear_app_data(self.device_id(), package).await
    }

    /// Package name of the foreground application
    async fn current_package(&self) -> Result<String>;

    /// Packages listed in the recent tasks stack
    async fn recent_packages(&self) -> Result<Vec<String>> {
        adb::recent_packages(self.device_id()).await
    }

    async fn orientation(&self) -> Result<Orientation>;

    async fn take_screenshot(&self, path: &Path) -> Result<()>;

    /// Release the backend session
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_parse() {
        let b = Bounds::parse("[0,210][1080,2274]").unwrap();
        assert_eq!(b.left, 0);
        assert_eq!(b.top, 210);
        assert_eq!(b.width(), 1080);
        assert_eq!(b.height(), 2064);
        assert_eq!(b.center(), Point::new(540, 1242));
        assert!(Bounds::parse("[0,0]").is_none());
        assert!(Bounds::parse("[a,0][1,1]").is_none());
    }

    #[test]
    fn test_direction_parse_rejects_unknown() {
        assert_eq!("UP".parse::<SwipeDirection>().unwrap(), SwipeDirection::Up);
        assert_eq!(SwipeDirection::Left.opposite(), SwipeDirection::Right);
        let err = "diagonal".parse::<SwipeDirection>().unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidDirection(ref d) if d == "diagonal"));
    }

    #[test]
    fn test_backend_names() {
        assert_eq!("UiAutomator2".parse::<Backend>().unwrap(), Backend::Uiautomator2);
        assert_eq!(Backend::Appium.to_string(), "appium");
        assert!("espresso".parse::<Backend>().is_err());
    }
}
