//! In-memory device that renders a location picker.
//!
//! The screen is recomputed from `MockState` on every query, so handles are
//! live in the same way a real driver's are: an element that disappears after
//! a click reports `ElementDetached` on the next read.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::element::{Bounds, ElementDescriptor, Point, Size, UIElementImpl};
use crate::errors::AutomationError;
use crate::platforms::MobileDriver;
use crate::resolver::DismissTechnique;
use crate::selector::Selector;
use crate::token::TokenSupplier;
use crate::UIElement;

const WINDOW: Size = Size {
    width: 390.0,
    height: 844.0,
};
const HEADER: Bounds = Bounds {
    x: 0.0,
    y: 60.0,
    width: 390.0,
    height: 44.0,
};
const ROW_HEIGHT: f64 = 44.0;
const FIRST_ROW_Y: f64 = 120.0;
const INDENT: f64 = 24.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Click(String),
    Typed(String),
    Tap(Point),
    Swipe(Point, Point),
}

/// Controls that can be removed from the mock screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Add,
    TextField,
    Save,
    /// The opener is present but clicking it does nothing
    OpenerAction,
}

/// Elements that can be kept in the tree but reported as not displayed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Hidden {
    Add,
    Item(String),
}

#[derive(Debug, Clone)]
struct MockItem {
    name: String,
    parent: Option<String>,
    expanded: bool,
    selected: bool,
    /// Hidden until this many scrolls have happened
    below_fold: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Opener,
    Header,
    Marker,
    Cancel,
    Add,
    TextField,
    Save,
    Item(String),
}

#[derive(Debug)]
struct MockState {
    picker_open: bool,
    form_open: bool,
    opener_text: String,
    typed: String,
    items: Vec<MockItem>,
    removed: HashSet<Control>,
    hidden: HashSet<Hidden>,
    /// Report every row at the same x, as drivers without indentation do
    flat_rows: bool,
    closes_on: Option<DismissTechnique>,
    scrolls: usize,
    events: Vec<Event>,
}

impl MockState {
    fn has_children(&self, name: &str) -> bool {
        self.items.iter().any(|i| i.parent.as_deref() == Some(name))
    }

    fn depth(&self, item: &MockItem) -> usize {
        let mut depth = 0;
        let mut parent = item.parent.as_deref();
        while let Some(name) = parent {
            depth += 1;
            parent = self
                .items
                .iter()
                .find(|i| i.name == name)
                .and_then(|p| p.parent.as_deref());
        }
        depth
    }

    fn item_shown(&self, item: &MockItem) -> bool {
        if self.scrolls < item.below_fold {
            return false;
        }
        let mut parent = item.parent.as_deref();
        while let Some(name) = parent {
            match self.items.iter().find(|i| i.name == name) {
                Some(p) if p.expanded => parent = p.parent.as_deref(),
                _ => return false,
            }
        }
        true
    }

    /// Everything on screen, in traversal order
    fn screen(&self) -> Vec<(Key, ElementDescriptor)> {
        let mut screen = Vec::new();
        let control = |id: &str, name: &str, role: &str| ElementDescriptor {
            id: Some(id.to_string()),
            name: name.to_string(),
            role: format!("XCUIElementType{role}"),
            visible: true,
            ..Default::default()
        };

        if !self.picker_open {
            let mut opener = control("location_picker", "Location", "Button");
            opener.label = Some(self.opener_text.clone());
            screen.push((Key::Opener, opener));
            return screen;
        }

        if self.form_open {
            if !self.removed.contains(&Control::TextField) {
                let mut field = control("name_field", "", "TextField");
                field.placeholder = Some("Name".to_string());
                screen.push((Key::TextField, field));
            }
            if !self.removed.contains(&Control::Save) {
                screen.push((Key::Save, control("save_button", "Save", "Button")));
            }
            return screen;
        }

        let mut header = control("location_picker_header", "Select Location", "NavigationBar");
        header.bounds = HEADER;
        screen.push((Key::Header, header));
        screen.push((Key::Marker, control("location_picker_list", "", "Other")));
        screen.push((Key::Cancel, control("cancel", "Cancel", "Button")));
        if !self.removed.contains(&Control::Add) {
            let mut add = control("add_button", "plus", "Button");
            add.visible = !self.hidden.contains(&Hidden::Add);
            screen.push((Key::Add, add));
        }
        let shown = self.items.iter().filter(|i| self.item_shown(i));
        for (row, item) in shown.enumerate() {
            let mut descriptor = ElementDescriptor::button(&item.name);
            descriptor.selected = item.selected;
            descriptor.visible = !self.hidden.contains(&Hidden::Item(item.name.clone()));
            let indent = if self.flat_rows { 0 } else { self.depth(item) };
            let x = 16.0 + INDENT * indent as f64;
            descriptor.bounds = Bounds::new(
                x,
                FIRST_ROW_Y + ROW_HEIGHT * row as f64,
                WINDOW.width - x,
                ROW_HEIGHT,
            );
            screen.push((Key::Item(item.name.clone()), descriptor));
        }
        screen
    }

    fn lookup(&self, key: &Key) -> Result<ElementDescriptor, AutomationError> {
        self.screen()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, d)| d)
            .ok_or_else(|| AutomationError::ElementDetached(format!("{key:?}")))
    }

    fn close_if(&mut self, technique: DismissTechnique) {
        if self.closes_on == Some(technique) {
            self.picker_open = false;
        }
    }

    fn click(&mut self, key: &Key) -> Result<(), AutomationError> {
        let descriptor = self.lookup(key)?;
        self.events.push(Event::Click(descriptor.display_name().to_string()));
        match key {
            Key::Opener => {
                if !self.removed.contains(&Control::OpenerAction) {
                    self.picker_open = true;
                }
            }
            Key::Cancel => self.close_if(DismissTechnique::ClickCancel),
            Key::Add => {
                self.form_open = true;
                self.typed.clear();
            }
            Key::Save => {
                self.items.push(MockItem {
                    name: self.typed.clone(),
                    parent: None,
                    expanded: false,
                    selected: false,
                    below_fold: 0,
                });
                self.form_open = false;
            }
            Key::Item(name) => {
                if self.has_children(name) {
                    if let Some(item) = self.items.iter_mut().find(|i| &i.name == name) {
                        item.expanded = !item.expanded;
                    }
                } else if let Some(item) = self.items.iter_mut().find(|i| &i.name == name) {
                    item.selected = true;
                }
            }
            Key::Header | Key::Marker | Key::TextField => {}
        }
        Ok(())
    }
}

/// Shares its state with every clone, so a test can keep one for assertions
/// after handing another to the code under test.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                picker_open: false,
                form_open: false,
                opener_text: "Select location".to_string(),
                typed: String::new(),
                items: Vec::new(),
                removed: HashSet::new(),
                hidden: HashSet::new(),
                flat_rows: false,
                closes_on: Some(DismissTechnique::TapHeader),
                scrolls: 0,
                events: Vec::new(),
            })),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// Top-level items, always shown
    pub fn with_items(self, names: &[&str]) -> Self {
        self.with_state(|s| {
            s.items.extend(names.iter().map(|name| MockItem {
                name: name.to_string(),
                parent: None,
                expanded: false,
                selected: false,
                below_fold: 0,
            }))
        })
    }

    /// An item shown only while `parent` is expanded
    pub fn with_child(self, parent: &str, name: &str) -> Self {
        self.with_state(|s| {
            s.items.push(MockItem {
                name: name.to_string(),
                parent: Some(parent.to_string()),
                expanded: false,
                selected: false,
                below_fold: 0,
            })
        })
    }

    pub fn expanded(self, name: &str) -> Self {
        self.with_state(|s| {
            if let Some(item) = s.items.iter_mut().find(|i| i.name == name) {
                item.expanded = true;
            }
        })
    }

    pub fn selected(self, name: &str) -> Self {
        self.with_state(|s| {
            if let Some(item) = s.items.iter_mut().find(|i| i.name == name) {
                item.selected = true;
            }
        })
    }

    pub fn below_fold(self, name: &str, scrolls: usize) -> Self {
        self.with_state(|s| {
            if let Some(item) = s.items.iter_mut().find(|i| i.name == name) {
                item.below_fold = scrolls;
            }
        })
    }

    pub fn opener_text(self, text: &str) -> Self {
        self.with_state(|s| s.opener_text = text.to_string())
    }

    pub fn picker_open(self) -> Self {
        self.with_state(|s| s.picker_open = true)
    }

    pub fn closes_on(self, technique: Option<DismissTechnique>) -> Self {
        self.with_state(|s| s.closes_on = technique)
    }

    pub fn without(self, control: Control) -> Self {
        self.with_state(|s| {
            s.removed.insert(control);
        })
    }

    /// Keep the element in the tree but report it as not displayed
    pub fn hidden(self, element: Hidden) -> Self {
        self.with_state(|s| {
            s.hidden.insert(element);
        })
    }

    pub fn flat_rows(self) -> Self {
        self.with_state(|s| s.flat_rows = true)
    }

    pub fn shared(&self) -> Arc<dyn MobileDriver> {
        Arc::new(self.clone())
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Click(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn item_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .map(|i| i.name.clone())
            .collect()
    }

    pub fn is_picker_open(&self) -> bool {
        self.state.lock().unwrap().picker_open
    }

    pub fn scrolls(&self) -> usize {
        self.state.lock().unwrap().scrolls
    }

    fn element(&self, key: Key) -> UIElement {
        UIElement::new(Box::new(MockElement {
            state: self.state.clone(),
            key,
        }))
    }
}

#[async_trait]
impl MobileDriver for MockDriver {
    async fn find_element(&self, selector: &Selector) -> Result<UIElement, AutomationError> {
        self.find_elements(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AutomationError::ElementNotFound(format!("{selector}")))
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError> {
        if let Selector::Invalid(reason) = selector {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }
        let screen = self.state.lock().unwrap().screen();
        Ok(screen
            .into_iter()
            .filter(|(_, d)| selector.matches(d))
            .map(|(key, _)| self.element(key))
            .collect())
    }

    async fn swipe(&self, from: Point, to: Point, _duration: Duration) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Swipe(from, to));
        if to.y > from.y {
            state.close_if(DismissTechnique::SwipeDown);
        } else {
            state.scrolls += 1;
        }
        Ok(())
    }

    async fn tap(&self, at: Point) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Tap(at));
        if HEADER.contains(at) {
            state.close_if(DismissTechnique::TapHeader);
        } else if at.y < HEADER.y {
            state.close_if(DismissTechnique::TapOutside);
        }
        Ok(())
    }

    async fn window_size(&self) -> Result<Size, AutomationError> {
        Ok(WINDOW)
    }
}

#[derive(Debug, Clone)]
struct MockElement {
    state: Arc<Mutex<MockState>>,
    key: Key,
}

impl MockElement {
    fn descriptor(&self) -> Result<ElementDescriptor, AutomationError> {
        self.state.lock().unwrap().lookup(&self.key)
    }
}

#[async_trait]
impl UIElementImpl for MockElement {
    fn element_ref(&self) -> String {
        format!("{:?}", self.key)
    }

    async fn click(&self) -> Result<(), AutomationError> {
        self.state.lock().unwrap().click(&self.key)
    }

    async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.lookup(&self.key)?;
        state.typed.push_str(text);
        state.events.push(Event::Typed(text.to_string()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.lookup(&self.key)?;
        state.typed.clear();
        Ok(())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        let d = self.descriptor()?;
        Ok(match name {
            "name" => Some(d.name),
            "label" | "value" => d.label,
            "placeholderValue" => d.placeholder,
            "type" => Some(d.role),
            "accessibilityIdentifier" => d.id,
            "selected" => Some(d.selected.to_string()),
            _ => None,
        })
    }

    async fn location(&self) -> Result<Point, AutomationError> {
        let b = self.descriptor()?.bounds;
        Ok(Point::new(b.x, b.y))
    }

    async fn size(&self) -> Result<Size, AutomationError> {
        let b = self.descriptor()?.bounds;
        Ok(Size {
            width: b.width,
            height: b.height,
        })
    }

    async fn is_displayed(&self) -> Result<bool, AutomationError> {
        Ok(self.descriptor()?.visible)
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(self.clone())
    }
}

/// Predictable tokens: 1001, 1002, ...
#[derive(Debug, Default)]
pub struct SequenceTokens {
    next: AtomicU64,
}

impl TokenSupplier for SequenceTokens {
    fn next_token(&self) -> String {
        (1001 + self.next.fetch_add(1, Ordering::SeqCst)).to_string()
    }
}
