use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::element::{Bounds, ElementDescriptor, Point, Size, UIElementImpl};
use crate::errors::AutomationError;
use crate::platforms::MobileDriver;
use crate::selector::Selector;
use crate::UIElement;

/// W3C element reference key
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobilePlatform {
    Ios,
    Android,
}

impl MobilePlatform {
    fn default_capabilities(self) -> Map<String, Value> {
        let (platform, automation) = match self {
            MobilePlatform::Ios => ("iOS", "XCUITest"),
            MobilePlatform::Android => ("Android", "UiAutomator2"),
        };
        let mut caps = Map::new();
        caps.insert("platformName".to_string(), json!(platform));
        caps.insert("appium:automationName".to_string(), json!(automation));
        caps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppiumConfig {
    pub server_url: String,
    pub platform: MobilePlatform,
    /// Merged over the platform defaults when a new session is created
    pub capabilities: Map<String, Value>,
    pub request_timeout_ms: u64,
}

impl Default for AppiumConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4723".to_string(),
            platform: MobilePlatform::Ios,
            capabilities: Map::new(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

fn map_wire_error(error: &str, message: &str) -> AutomationError {
    let detail = if message.is_empty() { error } else { message };
    match error {
        "no such element" => AutomationError::ElementNotFound(detail.to_string()),
        "stale element reference" => AutomationError::ElementDetached(detail.to_string()),
        "timeout" | "script timeout" => AutomationError::Timeout(detail.to_string()),
        "invalid selector" => AutomationError::InvalidSelector(detail.to_string()),
        "element not interactable" => AutomationError::ElementNotVisible(detail.to_string()),
        "invalid argument" => AutomationError::InvalidArgument(detail.to_string()),
        _ => AutomationError::PlatformError(format!("{error}: {detail}")),
    }
}

fn map_transport_error(e: reqwest::Error) -> AutomationError {
    if e.is_timeout() {
        AutomationError::Timeout(format!("Appium request timed out: {e}"))
    } else {
        AutomationError::PlatformError(format!("Appium request failed: {e}"))
    }
}

/// HTTP plumbing shared by the driver and every element handle of one session
#[derive(Debug)]
struct WireSession {
    client: reqwest::Client,
    session_url: String,
    session_id: String,
    platform: MobilePlatform,
}

impl WireSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AutomationError> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.client, method, &url, body).await
    }
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, AutomationError> {
    debug!("{method} {url}");
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status();
    let payload: Value = response.json().await.map_err(|e| {
        AutomationError::PlatformError(format!("Unreadable Appium response ({status}): {e}"))
    })?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    match serde_json::from_value::<WireError>(value) {
        Ok(wire) => Err(map_wire_error(&wire.error, &wire.message)),
        Err(_) => Err(AutomationError::PlatformError(format!(
            "Appium returned {status}: {payload}"
        ))),
    }
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Quote a string for an iOS predicate
fn predicate_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Quote a string for XPath 1.0, which has no escape sequences
pub(crate) fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn ios_type(role: &str) -> String {
    if role.starts_with("XCUIElementType") {
        return role.to_string();
    }
    let suffix = match role.to_ascii_lowercase().as_str() {
        "button" => "Button",
        "textfield" => "TextField",
        "securetextfield" => "SecureTextField",
        "statictext" => "StaticText",
        "navigationbar" => "NavigationBar",
        "cell" => "Cell",
        "image" => "Image",
        "switch" => "Switch",
        "other" => "Other",
        _ => return format!("XCUIElementType{role}"),
    };
    format!("XCUIElementType{suffix}")
}

/// Widget class for a role. Roles with no UiAutomator2 counterpart are
/// rejected rather than widened to every node.
fn android_class(role: &str) -> Result<&str, AutomationError> {
    let class = match role.to_ascii_lowercase().as_str() {
        "button" => "android.widget.Button",
        "textfield" | "securetextfield" => "android.widget.EditText",
        "statictext" => "android.widget.TextView",
        "image" => "android.widget.ImageView",
        "switch" => "android.widget.Switch",
        _ if role.contains('.') => role,
        _ => {
            return Err(AutomationError::InvalidSelector(format!(
                "role '{role}' has no Android widget class"
            )))
        }
    };
    Ok(class)
}

/// W3C locator strategy and value for a selector on the given platform
pub(crate) fn locator_for(
    platform: MobilePlatform,
    selector: &Selector,
) -> Result<(&'static str, String), AutomationError> {
    const PREDICATE: &str = "-ios predicate string";
    let locator = match (platform, selector) {
        (_, Selector::AccessibilityId(id)) => ("accessibility id", id.clone()),
        (_, Selector::XPath(xpath)) => ("xpath", xpath.clone()),

        (MobilePlatform::Ios, Selector::Name(name)) => {
            (PREDICATE, format!("name == {}", predicate_literal(name)))
        }
        (MobilePlatform::Ios, Selector::NameContains(name)) => {
            (PREDICATE, format!("name CONTAINS[c] {}", predicate_literal(name)))
        }
        (MobilePlatform::Ios, Selector::Label(label)) => {
            (PREDICATE, format!("label == {}", predicate_literal(label)))
        }
        (MobilePlatform::Ios, Selector::Placeholder(text)) => (
            PREDICATE,
            format!("placeholderValue == {}", predicate_literal(text)),
        ),
        (MobilePlatform::Ios, Selector::Role { role, name }) => {
            let mut predicate = format!("type == {}", predicate_literal(&ios_type(role)));
            if let Some(name) = name {
                predicate.push_str(&format!(" AND name CONTAINS[c] {}", predicate_literal(name)));
            }
            (PREDICATE, predicate)
        }
        (MobilePlatform::Ios, Selector::Predicate(predicate)) => (PREDICATE, predicate.clone()),

        (MobilePlatform::Android, Selector::Name(name)) => {
            let name = xpath_literal(name);
            ("xpath", format!("//*[@content-desc={name} or @text={name}]"))
        }
        (MobilePlatform::Android, Selector::NameContains(name)) => {
            let name = xpath_literal(name);
            (
                "xpath",
                format!("//*[contains(@content-desc, {name}) or contains(@text, {name})]"),
            )
        }
        (MobilePlatform::Android, Selector::Label(label)) => {
            ("xpath", format!("//*[@text={}]", xpath_literal(label)))
        }
        (MobilePlatform::Android, Selector::Placeholder(text)) => {
            ("xpath", format!("//*[@hint={}]", xpath_literal(text)))
        }
        (MobilePlatform::Android, Selector::Role { role, name }) => {
            let class = android_class(role)?;
            let xpath = match name {
                Some(name) => {
                    let name = xpath_literal(name);
                    format!("//{class}[contains(@content-desc, {name}) or contains(@text, {name})]")
                }
                None => format!("//{class}"),
            };
            ("xpath", xpath)
        }
        (MobilePlatform::Android, Selector::Predicate(expression)) => {
            ("-android uiautomator", expression.clone())
        }
        (_, Selector::Invalid(reason)) => {
            return Err(AutomationError::InvalidSelector(reason.clone()))
        }
    };
    Ok(locator)
}

fn pointer_actions(steps: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": steps,
        }]
    })
}

/// Remote control of one device session through an Appium server.
#[derive(Debug, Clone)]
pub struct AppiumDriver {
    session: Arc<WireSession>,
}

impl AppiumDriver {
    fn http_client(config: &AppiumConfig) -> Result<reqwest::Client, AutomationError> {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AutomationError::Config(format!("Failed to build HTTP client: {e}")))
    }

    fn session_url(config: &AppiumConfig, session_id: &str) -> String {
        format!(
            "{}/session/{session_id}",
            config.server_url.trim_end_matches('/')
        )
    }

    /// Start a new session with the platform defaults merged with
    /// `config.capabilities`.
    #[instrument(skip(config), fields(server = %config.server_url, platform = ?config.platform))]
    pub async fn connect(config: &AppiumConfig) -> Result<Self, AutomationError> {
        let client = Self::http_client(config)?;
        let mut capabilities = config.platform.default_capabilities();
        capabilities.extend(config.capabilities.clone());

        let url = format!("{}/session", config.server_url.trim_end_matches('/'));
        let body = json!({
            "capabilities": { "alwaysMatch": capabilities, "firstMatch": [{}] }
        });
        let value = send(&client, Method::POST, &url, Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AutomationError::PlatformError(format!("New session response has no sessionId: {value}"))
            })?
            .to_string();

        info!("Appium session {session_id} started");
        Ok(Self::with_session(config, client, session_id))
    }

    /// Reuse a session started elsewhere
    pub fn attach(config: &AppiumConfig, session_id: &str) -> Result<Self, AutomationError> {
        if session_id.is_empty() {
            return Err(AutomationError::InvalidArgument(
                "Session id must not be empty".to_string(),
            ));
        }
        let client = Self::http_client(config)?;
        Ok(Self::with_session(config, client, session_id.to_string()))
    }

    fn with_session(config: &AppiumConfig, client: reqwest::Client, session_id: String) -> Self {
        Self {
            session: Arc::new(WireSession {
                client,
                session_url: Self::session_url(config, &session_id),
                session_id,
                platform: config.platform,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn platform(&self) -> MobilePlatform {
        self.session.platform
    }

    pub async fn quit(&self) -> Result<(), AutomationError> {
        self.session.command(Method::DELETE, "", None).await?;
        info!("Appium session {} ended", self.session.session_id);
        Ok(())
    }

    fn element(&self, id: String) -> UIElement {
        UIElement::new(Box::new(AppiumElement {
            session: self.session.clone(),
            id,
        }))
    }

    async fn perform_actions(&self, steps: Vec<Value>) -> Result<(), AutomationError> {
        self.session
            .command(Method::POST, "/actions", Some(pointer_actions(steps)))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MobileDriver for AppiumDriver {
    async fn find_element(&self, selector: &Selector) -> Result<UIElement, AutomationError> {
        let (using, value) = locator_for(self.session.platform, selector)?;
        let found = self
            .session
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        let id = element_id(&found).ok_or_else(|| {
            AutomationError::PlatformError(format!("Malformed element reference: {found}"))
        })?;
        Ok(self.element(id))
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError> {
        let (using, value) = locator_for(self.session.platform, selector)?;
        let found = self
            .session
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        let refs = found.as_array().cloned().unwrap_or_default();
        let elements: Vec<UIElement> = refs
            .iter()
            .filter_map(|r| {
                let id = element_id(r);
                if id.is_none() {
                    warn!("skipping malformed element reference {r}");
                }
                id
            })
            .map(|id| self.element(id))
            .collect();
        debug!("{} elements for {selector}", elements.len());
        Ok(elements)
    }

    async fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<(), AutomationError> {
        self.perform_actions(vec![
            json!({ "type": "pointerMove", "duration": 0, "x": from.x.round(), "y": from.y.round() }),
            json!({ "type": "pointerDown", "button": 0 }),
            json!({
                "type": "pointerMove",
                "duration": duration.as_millis() as u64,
                "x": to.x.round(),
                "y": to.y.round(),
            }),
            json!({ "type": "pointerUp", "button": 0 }),
        ])
        .await
    }

    async fn tap(&self, at: Point) -> Result<(), AutomationError> {
        self.perform_actions(vec![
            json!({ "type": "pointerMove", "duration": 0, "x": at.x.round(), "y": at.y.round() }),
            json!({ "type": "pointerDown", "button": 0 }),
            json!({ "type": "pause", "duration": 50 }),
            json!({ "type": "pointerUp", "button": 0 }),
        ])
        .await
    }

    async fn window_size(&self) -> Result<Size, AutomationError> {
        let rect = self.session.command(Method::GET, "/window/rect", None).await?;
        let size: Size = serde_json::from_value(rect.clone()).map_err(|e| {
            AutomationError::PlatformError(format!("Malformed window rect {rect}: {e}"))
        })?;
        Ok(size)
    }
}

/// Element handle scoped to the session that found it
#[derive(Debug, Clone)]
pub struct AppiumElement {
    session: Arc<WireSession>,
    id: String,
}

impl AppiumElement {
    fn path(&self, suffix: &str) -> String {
        format!("/element/{}{}", self.id, suffix)
    }

    async fn rect(&self) -> Result<Bounds, AutomationError> {
        let rect = self.session.command(Method::GET, &self.path("/rect"), None).await?;
        serde_json::from_value(rect.clone())
            .map_err(|e| AutomationError::PlatformError(format!("Malformed element rect {rect}: {e}")))
    }
}

fn attribute_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[async_trait::async_trait]
impl UIElementImpl for AppiumElement {
    fn element_ref(&self) -> String {
        self.id.clone()
    }

    async fn click(&self) -> Result<(), AutomationError> {
        self.session
            .command(Method::POST, &self.path("/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.session
            .command(Method::POST, &self.path("/value"), Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AutomationError> {
        self.session
            .command(Method::POST, &self.path("/clear"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        let value = self
            .session
            .command(Method::GET, &self.path(&format!("/attribute/{name}")), None)
            .await?;
        Ok(attribute_string(value))
    }

    async fn location(&self) -> Result<Point, AutomationError> {
        let rect = self.rect().await?;
        Ok(Point::new(rect.x, rect.y))
    }

    async fn size(&self) -> Result<Size, AutomationError> {
        let rect = self.rect().await?;
        Ok(Size {
            width: rect.width,
            height: rect.height,
        })
    }

    async fn bounds(&self) -> Result<Bounds, AutomationError> {
        self.rect().await
    }

    async fn is_displayed(&self) -> Result<bool, AutomationError> {
        let value = self
            .session
            .command(Method::GET, &self.path("/displayed"), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// UiAutomator2 exposes different attribute names than XCUITest
    async fn describe(&self) -> Result<ElementDescriptor, AutomationError> {
        if self.session.platform == MobilePlatform::Ios {
            let name = self.attribute("name").await?.unwrap_or_default();
            let label = self.attribute("label").await?;
            let placeholder = self.attribute("placeholderValue").await?;
            let role = self.attribute("type").await?.unwrap_or_default();
            let selected = self.attribute("selected").await?;
            // the `accessibility id` strategy matches `name` on XCUITest
            return Ok(ElementDescriptor {
                id: Some(name.clone()).filter(|n| !n.is_empty()),
                name,
                label,
                placeholder,
                role,
                bounds: self.rect().await?,
                visible: self.is_displayed().await?,
                selected: selected.is_some_and(|v| v == "true"),
            });
        }

        // and `content-desc` on UiAutomator2
        let content_desc = self.attribute("content-desc").await?.filter(|d| !d.is_empty());
        let text = self.attribute("text").await?.filter(|t| !t.is_empty());
        Ok(ElementDescriptor {
            id: content_desc.clone(),
            name: content_desc.clone().or_else(|| text.clone()).unwrap_or_default(),
            label: text,
            placeholder: self.attribute("hint").await?.filter(|h| !h.is_empty()),
            role: self.attribute("class").await?.unwrap_or_default(),
            bounds: self.rect().await?,
            visible: self.is_displayed().await?,
            selected: self
                .attribute("selected")
                .await?
                .is_some_and(|v| v == "true"),
        })
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(self.clone())
    }
}
