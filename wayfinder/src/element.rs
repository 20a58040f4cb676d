use crate::errors::AutomationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use tracing::instrument;

/// A screen coordinate in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned bounding box of an element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Snapshot of one element's observable properties.
///
/// Descriptors are produced fresh by every query and must not be reused once
/// the UI has been mutated: the tree they were read from no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ElementDescriptor {
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default)]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
}

impl ElementDescriptor {
    /// A visible button with the given name and no geometry
    pub fn button(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: "XCUIElementTypeButton".to_string(),
            visible: true,
            ..Default::default()
        }
    }

    /// Name used for display and logging; falls back to the label, then the role
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if let Some(label) = self.label.as_deref().filter(|l| !l.is_empty()) {
            label
        } else {
            &self.role
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Interface for driver-specific element handles
#[async_trait]
pub trait UIElementImpl: Send + Sync + Debug {
    /// Driver-assigned reference, stable only while the element exists
    fn element_ref(&self) -> String;
    async fn click(&self) -> Result<(), AutomationError>;
    async fn send_keys(&self, text: &str) -> Result<(), AutomationError>;
    async fn clear(&self) -> Result<(), AutomationError>;
    async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError>;
    async fn location(&self) -> Result<Point, AutomationError>;
    async fn size(&self) -> Result<Size, AutomationError>;
    async fn is_displayed(&self) -> Result<bool, AutomationError>;

    async fn bounds(&self) -> Result<Bounds, AutomationError> {
        let location = self.location().await?;
        let size = self.size().await?;
        Ok(Bounds::new(location.x, location.y, size.width, size.height))
    }

    /// Reads every property the classifier and selectors need in one go.
    /// Drivers with a cheaper bulk read should override this.
    async fn describe(&self) -> Result<ElementDescriptor, AutomationError> {
        let name = self.attribute("name").await?.unwrap_or_default();
        let label = self.attribute("label").await?;
        let placeholder = self.attribute("placeholderValue").await?;
        let role = self.attribute("type").await?.unwrap_or_default();
        let id = self.attribute("accessibilityIdentifier").await?;
        let selected = self
            .attribute("selected")
            .await?
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let visible = self.is_displayed().await?;
        let bounds = self.bounds().await?;
        Ok(ElementDescriptor {
            id,
            name,
            label,
            placeholder,
            role,
            bounds,
            visible,
            selected,
        })
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl>;
}

/// Represents a live UI element handle
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

impl Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UIElement")
            .field("ref", &self.inner.element_ref())
            .finish()
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl UIElement {
    /// Create a new UI element from a driver-specific implementation
    pub fn new(impl_: Box<dyn UIElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn element_ref(&self) -> String {
        self.inner.element_ref()
    }

    /// Click on this element
    #[instrument(level = "debug", skip(self), fields(element = %self.inner.element_ref()))]
    pub async fn click(&self) -> Result<(), AutomationError> {
        self.inner.click().await
    }

    /// Type text into this element
    #[instrument(level = "debug", skip(self, text), fields(element = %self.inner.element_ref()))]
    pub async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.send_keys(text).await
    }

    pub async fn clear(&self) -> Result<(), AutomationError> {
        self.inner.clear().await
    }

    pub async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        self.inner.attribute(name).await
    }

    pub async fn location(&self) -> Result<Point, AutomationError> {
        self.inner.location().await
    }

    pub async fn size(&self) -> Result<Size, AutomationError> {
        self.inner.size().await
    }

    /// Element bounds (x, y, width, height)
    pub async fn bounds(&self) -> Result<Bounds, AutomationError> {
        self.inner.bounds().await
    }

    pub async fn is_displayed(&self) -> Result<bool, AutomationError> {
        self.inner.is_displayed().await
    }

    pub async fn describe(&self) -> Result<ElementDescriptor, AutomationError> {
        self.inner.describe().await
    }

    /// Accessible name, if the driver reports one
    pub async fn name(&self) -> Result<Option<String>, AutomationError> {
        self.inner.attribute("name").await
    }

    /// Text currently shown by the element: its value, falling back to its label
    pub async fn text(&self) -> Result<String, AutomationError> {
        if let Some(value) = self.inner.attribute("value").await?.filter(|v| !v.is_empty()) {
            return Ok(value);
        }
        Ok(self.inner.attribute("label").await?.unwrap_or_default())
    }
}
