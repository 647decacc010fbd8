use super::resolver::Resolver;
use crate::driver::traits::{Bounds, Element, Point, SwipeDirection};
use crate::error::Result;
use crate::parser::locators::Strategy;
use crate::parser::types::SwipeConfig;
use std::time::Duration;

const SWIPE_DURATION_MS: u64 = 500;
const SWIPE_SETTLE: Duration = Duration::from_millis(500);
const REFRESH_SETTLE: Duration = Duration::from_secs(1);

/// Result of a convergence loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeOutcome {
    /// Whether the condition was met
    pub reached: bool,
    /// Swipes issued, across every direction tried
    pub swipes: u32,
}

/// Children gathered across swipe rounds, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    pub identities: Vec<String>,
    pub swipes: u32,
}

/// Swipe start and end inside an element's bounds
pub fn swipe_from_bounds(bounds: &Bounds, direction: SwipeDirection, distance: f64) -> (Point, Point) {
    let Point { x: cx, y: cy } = bounds.center();
    let (left, top, right, bottom) = (
        bounds.left as f64,
        bounds.top as f64,
        bounds.right as f64,
        bounds.bottom as f64,
    );
    let width = bounds.width() as f64;
    let height = bounds.height() as f64;
    let px = |v: f64| v.round() as i32;

    match direction {
        SwipeDirection::Up => (
            Point::new(cx, px(bottom - height * 0.1)),
            Point::new(cx, px(top + height * (1.0 - distance))),
        ),
        SwipeDirection::Down => (
            Point::new(cx, px(top + height * 0.1)),
            Point::new(cx, px(bottom - height * (1.0 - distance))),
        ),
        SwipeDirection::Left => (
            Point::new(px(right - width * 0.1), cy),
            Point::new(px(left + width * (1.0 - distance)), cy),
        ),
        SwipeDirection::Right => (
            Point::new(px(left + width * 0.1), cy),
            Point::new(px(right - width * (1.0 - distance)), cy),
        ),
    }
}

/// Swipe start and end across the whole screen, anchored at 80% / 20%
pub fn swipe_from_screen(width: u32, height: u32, direction: SwipeDirection, distance: f64) -> (Point, Point) {
    let (w, h) = (width as f64, height as f64);
    let (cx, cy) = ((width / 2) as i32, (height / 2) as i32);
    let px = |v: f64| v.round().max(0.0) as i32;

    match direction {
        SwipeDirection::Up => (Point::new(cx, px(h * 0.8)), Point::new(cx, px(h * (0.8 - distance)))),
        SwipeDirection::Down => (Point::new(cx, px(h * 0.2)), Point::new(cx, px(h * (0.2 + distance)))),
        SwipeDirection::Left => (Point::new(px(w * 0.8), cy), Point::new(px(w * (0.8 - distance)), cy)),
        SwipeDirection::Right => (Point::new(px(w * 0.2), cy), Point::new(px(w * (0.2 + distance)), cy)),
    }
}

/// Directional swipes and the scroll-search loops built on them
#[derive(Clone)]
pub struct Gestures {
    resolver: Resolver,
}

impl Gestures {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Coordinates inside `selector`'s bounds, or across the screen when
    /// there is no selector or its bounds cannot be read
    pub async fn coordinates(
        &self,
        selector: Option<&str>,
        direction: SwipeDirection,
        distance: f64,
    ) -> Result<(Point, Point)> {
        if let Some(key) = selector {
            match self.resolver.bounds(key).await {
                Ok(bounds) if bounds.width() > 0 && bounds.height() > 0 => {
                    return Ok(swipe_from_bounds(&bounds, direction, distance));
                }
                Ok(bounds) => log::debug!("Selector '{}' has empty bounds {:?}", key, bounds),
                Err(e) if e.is_selector_config() => return Err(e),
                Err(e) => log::debug!("Could not get bounds for selector '{}': {}", key, e),
            }
        }
        let (width, height) = self.resolver.driver().screen_size().await?;
        Ok(swipe_from_screen(width, height, direction, distance))
    }

    async fn perform(&self, from: Point, to: Point) -> Result<()> {
        log::debug!("Swiping from ({}, {}) to ({}, {})", from.x, from.y, to.x, to.y);
        self.resolver
            .driver()
            .swipe(from, to, SWIPE_DURATION_MS)
            .await?;
        Ok(())
    }

    /// `count` swipes with a settle pause between them
    pub async fn swipe(&self, config: &SwipeConfig, count: u32) -> Result<u32> {
        let (from, to) = self
            .coordinates(config.selector.as_deref(), config.direction, config.distance)
            .await?;
        for i in 0..count {
            self.perform(from, to).await?;
            if i + 1 < count {
                tokio::time::sleep(SWIPE_SETTLE).await;
            }
            log::debug!("Swipe {}/{} {} completed", i + 1, count, config.direction);
        }
        Ok(count)
    }

    async fn until_visible_in(
        &self,
        target: &str,
        direction: SwipeDirection,
        max_swipes: u32,
        config: &SwipeConfig,
    ) -> Result<SwipeOutcome> {
        if self.resolver.is_visible(target).await? {
            return Ok(SwipeOutcome {
                reached: true,
                swipes: 0,
            });
        }
        let (from, to) = self
            .coordinates(config.selector.as_deref(), direction, config.distance)
            .await?;

        for swipe in 1..=max_swipes {
            self.perform(from, to).await?;
            tokio::time::sleep(SWIPE_SETTLE).await;
            if self.resolver.is_visible(target).await? {
                log::info!("'{}' visible after {} swipe(s) {}", target, swipe, direction);
                return Ok(SwipeOutcome {
                    reached: true,
                    swipes: swipe,
                });
            }
        }
        Ok(SwipeOutcome {
            reached: false,
            swipes: max_swipes,
        })
    }

    /// Swipe in the configured direction until `target` is visible, then
    /// repeat in the fallback direction when that is distinct
    pub async fn swipe_until_visible(&self, target: &str, config: &SwipeConfig) -> Result<SwipeOutcome> {
        let primary = self
            .until_visible_in(target, config.direction, config.max_swipes, config)
            .await?;
        if primary.reached {
            return Ok(primary);
        }

        let mut swipes = primary.swipes;
        if let Some(fallback) = config.fallback_direction.filter(|d| *d != config.direction) {
            log::info!(
                "'{}' not found swiping {}, trying {}",
                target,
                config.direction,
                fallback
            );
            let second = self
                .until_visible_in(target, fallback, config.max_swipes, config)
                .await?;
            swipes += second.swipes;
            if second.reached {
                return Ok(SwipeOutcome {
                    reached: true,
                    swipes,
                });
            }
        }

        log::warn!("'{}' not visible after {} swipe(s)", target, swipes);
        Ok(SwipeOutcome {
            reached: false,
            swipes,
        })
    }

    /// Swipe until `target` is no longer visible
    pub async fn swipe_until_not_visible(&self, target: &str, config: &SwipeConfig) -> Result<SwipeOutcome> {
        if !self.resolver.is_visible(target).await? {
            return Ok(SwipeOutcome {
                reached: true,
                swipes: 0,
            });
        }
        let (from, to) = self
            .coordinates(config.selector.as_deref(), config.direction, config.distance)
            .await?;

        for swipe in 1..=config.max_swipes {
            self.perform(from, to).await?;
            tokio::time::sleep(SWIPE_SETTLE).await;
            if !self.resolver.is_visible(target).await? {
                log::info!("'{}' gone after {} swipe(s)", target, swipe);
                return Ok(SwipeOutcome {
                    reached: true,
                    swipes: swipe,
                });
            }
        }

        log::warn!("'{}' still visible after {} swipe(s)", target, config.max_swipes);
        Ok(SwipeOutcome {
            reached: false,
            swipes: config.max_swipes,
        })
    }

    /// Bring `target` into view: half the budget in the configured direction,
    /// the rest in the opposite one
    pub async fn swipe_to_element(&self, target: &str, config: &SwipeConfig) -> Result<SwipeOutcome> {
        if self.resolver.is_visible(target).await? {
            log::info!("'{}' is already visible", target);
            return Ok(SwipeOutcome {
                reached: true,
                swipes: 0,
            });
        }

        let forward = config.max_swipes / 2;
        let first = self
            .until_visible_in(target, config.direction, forward, config)
            .await?;
        if first.reached {
            return Ok(first);
        }

        let opposite = config.direction.opposite();
        log::debug!("Trying opposite direction {}", opposite);
        let second = self
            .until_visible_in(target, opposite, config.max_swipes - forward, config)
            .await?;
        Ok(SwipeOutcome {
            reached: second.reached,
            swipes: first.swipes + second.swipes,
        })
    }

    /// Pull-to-refresh: a downward swipe from near the top of the screen
    pub async fn swipe_refresh(&self, selector: Option<&str>) -> Result<()> {
        let (from, to) = self.coordinates(selector, SwipeDirection::Down, 0.5).await?;
        let (_, height) = self.resolver.driver().screen_size().await?;
        let from = Point::new(from.x, (height as f64 * 0.1).round() as i32);
        let to = Point::new(to.x, (height as f64 * 0.6).round() as i32);
        self.perform(from, to).await?;
        tokio::time::sleep(REFRESH_SETTLE).await;
        Ok(())
    }

    /// Collect unique children of `parent` over `max_swipes + 1` rounds
    pub async fn swipe_and_collect_children(
        &self,
        parent: &str,
        child: &Strategy,
        config: &SwipeConfig,
    ) -> Result<Collected> {
        let (from, to) = self
            .coordinates(config.selector.as_deref(), config.direction, config.distance)
            .await?;
        let mut collected = Collected::default();

        for round in 0..=config.max_swipes {
            match self.children(parent, child).await {
                Ok(children) => {
                    for element in &children {
                        match identity(element).await {
                            Ok(id) if !collected.identities.contains(&id) => {
                                log::debug!("Collected child {}", id);
                                collected.identities.push(id);
                            }
                            Ok(_) => {}
                            Err(e) => log::debug!("Skipping unreadable child: {:#}", e),
                        }
                    }
                }
                Err(e) if e.is_selector_config() => return Err(e),
                Err(e) => log::debug!("Error collecting children on round {}: {}", round, e),
            }

            if round < config.max_swipes {
                self.perform(from, to).await?;
                collected.swipes += 1;
                tokio::time::sleep(SWIPE_SETTLE).await;
            }
        }

        log::info!(
            "Collected {} unique children of '{}' after {} swipe(s)",
            collected.identities.len(),
            parent,
            collected.swipes
        );
        Ok(collected)
    }

    async fn children(&self, parent: &str, child: &Strategy) -> Result<Vec<Element>> {
        let parent = self.resolver.resolve(parent).await?;
        self.resolver
            .finder()
            .find_children(&parent, &child.kind, &child.value)
            .await
    }
}

/// Stable identity from text, class and position
async fn identity(element: &Element) -> anyhow::Result<String> {
    let text = element.text().await?;
    let class = element.class_name().await?;
    let bounds = element.bounds().await?;
    Ok(format!("{}_{}_{}_{}", text, class, bounds.left, bounds.top))
}
