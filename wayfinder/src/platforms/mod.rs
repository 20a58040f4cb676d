use crate::element::{Point, Size};
use crate::{AutomationError, Selector, UIElement};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub mod appium;

/// Direction the *content* should move, as a user would say "scroll down"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Scroll gesture parameters chosen by the caller to bias toward the
/// expected location of a target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollParams {
    pub direction: ScrollDirection,
    /// Finger speed in points per second; lower values scroll less
    pub velocity: f64,
}

impl ScrollParams {
    pub fn new(direction: ScrollDirection, velocity: f64) -> Self {
        Self {
            direction,
            velocity,
        }
    }

    /// "Scroll down slowly", for controls known to sit below the fold
    pub fn down_slowly() -> Self {
        Self::new(ScrollDirection::Down, 600.0)
    }
}

impl Default for ScrollParams {
    fn default() -> Self {
        Self::down_slowly()
    }
}

/// Share of the screen a scroll gesture travels
const SCROLL_TRAVEL: f64 = 0.4;
const MIN_GESTURE: Duration = Duration::from_millis(100);
const MAX_GESTURE: Duration = Duration::from_millis(2000);

/// The capability every remote-control backend must provide.
///
/// Handles are single-session and stateful; implementations are not required
/// to support concurrent use of one session.
#[async_trait::async_trait]
pub trait MobileDriver: Send + Sync {
    /// Find the first element matching a selector, without waiting
    async fn find_element(&self, selector: &Selector) -> Result<UIElement, AutomationError>;

    /// Find all elements matching a selector, in traversal order, without waiting
    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError>;

    /// Drag a finger from `from` to `to` over `duration`
    async fn swipe(&self, from: Point, to: Point, duration: Duration)
        -> Result<(), AutomationError>;

    /// Tap once at a screen coordinate
    async fn tap(&self, at: Point) -> Result<(), AutomationError>;

    /// Size of the device window in points
    async fn window_size(&self) -> Result<Size, AutomationError>;

    /// Scroll the content in `direction`. The default implementation derives a
    /// swipe across the middle of the window from the velocity.
    async fn scroll(&self, direction: ScrollDirection, velocity: f64) -> Result<(), AutomationError> {
        if !(velocity.is_finite() && velocity > 0.0) {
            return Err(AutomationError::InvalidArgument(format!(
                "Scroll velocity must be a positive number, got {velocity}"
            )));
        }
        let size = self.window_size().await?;
        let (from, to) = scroll_swipe_points(size, direction);
        let distance = ((to.x - from.x).powi(2) + (to.y - from.y).powi(2)).sqrt();
        let duration = Duration::from_secs_f64(distance / velocity).clamp(MIN_GESTURE, MAX_GESTURE);
        debug!(?direction, velocity, ?duration, "scrolling via swipe");
        self.swipe(from, to, duration)
            .await
            .map_err(|e| AutomationError::ScrollFailed(format!("{direction:?}: {e}")))
    }
}

/// Finger start and end for a scroll; the finger moves against the content direction.
pub(crate) fn scroll_swipe_points(size: Size, direction: ScrollDirection) -> (Point, Point) {
    let cx = size.width / 2.0;
    let cy = size.height / 2.0;
    let dx = size.width * SCROLL_TRAVEL / 2.0;
    let dy = size.height * SCROLL_TRAVEL / 2.0;
    match direction {
        ScrollDirection::Down => (Point::new(cx, cy + dy), Point::new(cx, cy - dy)),
        ScrollDirection::Up => (Point::new(cx, cy - dy), Point::new(cx, cy + dy)),
        ScrollDirection::Right => (Point::new(cx + dx, cy), Point::new(cx - dx, cy)),
        ScrollDirection::Left => (Point::new(cx - dx, cy), Point::new(cx + dx, cy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrolling_down_swipes_finger_up() {
        let size = Size {
            width: 400.0,
            height: 800.0,
        };
        let (from, to) = scroll_swipe_points(size, ScrollDirection::Down);
        assert_eq!(from.x, 200.0);
        assert!(from.y > to.y);
        assert_eq!(from.y - to.y, 320.0);
    }

    #[test]
    fn horizontal_scroll_keeps_vertical_center() {
        let size = Size {
            width: 400.0,
            height: 800.0,
        };
        let (from, to) = scroll_swipe_points(size, ScrollDirection::Left);
        assert_eq!(from.y, 400.0);
        assert_eq!(to.y, 400.0);
        assert!(from.x < to.x);
    }
}
