//! Location picker state machine.
//!
//! ```text
//! PickerClosed → PickerOpen → BuildingChosen → FloorChosen → LeafChosen → PickerClosed
//!                                                                       ↘ DismissFailed
//! (any state) → ErrorAborted
//! ```
//!
//! Every decision is taken on a fresh snapshot of the picker; nothing observed
//! before a click is trusted after it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::{
    classify, find_by_name, find_named, name_match, select_candidate, Choice, ClassifierRules,
    HierarchyLevel, NameMatch, Scope, Selection,
};
use crate::config::ResolverConfig;
use crate::creation::CreationWorkflow;
use crate::element::{ElementDescriptor, Point, UIElement};
use crate::errors::AutomationError;
use crate::locator::StrategyChain;
use crate::platforms::{MobileDriver, ScrollDirection};
use crate::token::TokenSupplier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickerState {
    Closed,
    Open,
    Dismissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolverState {
    PickerClosed,
    PickerOpen,
    BuildingChosen,
    FloorChosen,
    LeafChosen,
    DismissFailed,
    ErrorAborted,
}

/// Ways of closing the picker, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DismissTechnique {
    TapHeader,
    ClickCancel,
    SwipeDown,
    TapOutside,
}

impl DismissTechnique {
    pub const ORDER: [DismissTechnique; 4] = [
        DismissTechnique::TapHeader,
        DismissTechnique::ClickCancel,
        DismissTechnique::SwipeDown,
        DismissTechnique::TapOutside,
    ];
}

/// Names chosen so far in one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyPath {
    pub building: Option<String>,
    pub floor: Option<String>,
    pub room: Option<String>,
    /// Structural items expanded below the floor on the way to the room
    pub nodes: Vec<String>,
}

impl HierarchyPath {
    fn set(&mut self, level: HierarchyLevel, name: String) {
        match level {
            HierarchyLevel::Building => self.building = Some(name),
            HierarchyLevel::Floor => self.floor = Some(name),
            HierarchyLevel::Room => self.room = Some(name),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.building
            .iter()
            .chain(self.floor.iter())
            .chain(self.nodes.iter())
            .chain(self.room.iter())
            .cloned()
            .collect()
    }

    /// The most recently expanded ancestor, whose children are listed after it
    fn deepest_ancestor(&self) -> Option<&str> {
        self.nodes
            .last()
            .or(self.floor.as_ref())
            .or(self.building.as_ref())
            .map(String::as_str)
    }
}

/// What the caller wants selected. `None` at a level means "any item".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRequest {
    pub building: Option<String>,
    pub floor: Option<String>,
    pub room: Option<String>,
}

impl LocationRequest {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn named(building: &str, floor: &str, room: &str) -> Self {
        Self {
            building: Some(building.to_string()),
            floor: Some(floor.to_string()),
            room: Some(room.to_string()),
        }
    }

    fn for_level(&self, level: HierarchyLevel) -> Option<&str> {
        match level {
            HierarchyLevel::Building => self.building.as_deref(),
            HierarchyLevel::Floor => self.floor.as_deref(),
            HierarchyLevel::Room => self.room.as_deref(),
        }
    }
}

/// Soft findings that never fail a run on their own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    AmbiguousMatch {
        level: HierarchyLevel,
        candidates: Vec<String>,
        chosen: String,
    },
    /// Chosen by traversal order because no item carried a level hint
    FallbackSelection { level: HierarchyLevel, name: String },
    AlreadySelected { level: HierarchyLevel, name: String },
    /// An expansion click collapsed the item and it was clicked again
    CollapseRecovered { name: String },
    DescentLimitReached { depth: usize },
    DismissFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStatus {
    Selected,
    /// The requested room was already the current selection; nothing was clicked
    AlreadySelected,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub status: ResolutionStatus,
    pub path: HierarchyPath,
    pub final_state: ResolverState,
    pub transitions: Vec<ResolverState>,
    pub creations: usize,
    /// Clicks on hierarchy items, excluding the picker opener and dismissal
    pub item_clicks: usize,
    pub dismissal: Vec<DismissTechnique>,
    pub picker_may_be_open: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub error: Option<AutomationError>,
}

impl ResolutionOutcome {
    pub fn is_success(&self) -> bool {
        self.status != ResolutionStatus::Aborted
    }

    pub(crate) fn aborted(error: AutomationError) -> Self {
        Self {
            status: ResolutionStatus::Aborted,
            path: HierarchyPath::default(),
            final_state: ResolverState::ErrorAborted,
            transitions: vec![ResolverState::ErrorAborted],
            creations: 0,
            item_clicks: 0,
            dismissal: Vec::new(),
            picker_may_be_open: false,
            diagnostics: Vec::new(),
            error: Some(error),
        }
    }
}

/// The visible hierarchy items with their live handles, index-aligned
struct Snapshot {
    descriptors: Vec<ElementDescriptor>,
    handles: Vec<UIElement>,
}

impl Snapshot {
    fn visible_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.visible).count()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|d| d.visible && d.name == name)
    }

    /// Whether the item after `index` is indented under it, i.e. its
    /// children are already listed
    fn shows_children_of(&self, index: usize) -> bool {
        let parent = &self.descriptors[index];
        self.descriptors[index + 1..]
            .iter()
            .find(|d| d.visible)
            .is_some_and(|next| next.bounds.x > parent.bounds.x)
    }
}

enum Flow {
    Selected,
    AlreadySelected,
}

/// How a just-created item is found again
#[derive(Debug)]
enum Wanted {
    /// Requested by the caller, so named exactly this
    Exact(String),
    /// Generated, so identified by its unique token
    Containing(String),
}

/// Runs one picker resolution. Not reentrant: one resolver per run, one run
/// per driver session at a time.
pub struct LocationResolver<'a> {
    driver: Arc<dyn MobileDriver>,
    config: &'a ResolverConfig,
    tokens: &'a dyn TokenSupplier,
    rules: ClassifierRules,
    state: ResolverState,
    picker: PickerState,
    transitions: Vec<ResolverState>,
    path: HierarchyPath,
    expanded: HashSet<String>,
    creations: usize,
    item_clicks: usize,
    dismissal: Vec<DismissTechnique>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> LocationResolver<'a> {
    pub fn new(
        driver: Arc<dyn MobileDriver>,
        config: &'a ResolverConfig,
        tokens: &'a dyn TokenSupplier,
    ) -> Self {
        Self {
            driver,
            config,
            tokens,
            rules: config.classifier_rules(),
            state: ResolverState::PickerClosed,
            picker: PickerState::Closed,
            transitions: vec![ResolverState::PickerClosed],
            path: HierarchyPath::default(),
            expanded: HashSet::new(),
            creations: 0,
            item_clicks: 0,
            dismissal: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[instrument(skip(self), fields(building = ?request.building, floor = ?request.floor, room = ?request.room))]
    pub async fn run(mut self, request: &LocationRequest) -> ResolutionOutcome {
        match self.drive(request).await {
            Ok(Flow::Selected) => self.finish(ResolutionStatus::Selected, None),
            Ok(Flow::AlreadySelected) => self.finish(ResolutionStatus::AlreadySelected, None),
            Err(e) => {
                if e.is_fatal() {
                    error!("location resolution aborted in {:?}: {e}", self.state);
                } else {
                    warn!("driver error in {:?}, aborting resolution: {e}", self.state);
                }
                self.transition(ResolverState::ErrorAborted);
                self.finish(ResolutionStatus::Aborted, Some(e))
            }
        }
    }

    fn finish(self, status: ResolutionStatus, error: Option<AutomationError>) -> ResolutionOutcome {
        ResolutionOutcome {
            status,
            path: self.path,
            final_state: self.state,
            transitions: self.transitions,
            creations: self.creations,
            item_clicks: self.item_clicks,
            dismissal: self.dismissal,
            picker_may_be_open: self.picker != PickerState::Closed,
            diagnostics: self.diagnostics,
            error,
        }
    }

    fn transition(&mut self, next: ResolverState) {
        info!("picker resolver: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    async fn settle(&self) {
        tokio::time::sleep(self.config.settle_delay()).await;
    }

    async fn drive(&mut self, request: &LocationRequest) -> Result<Flow, AutomationError> {
        if self.observe_picker(Duration::ZERO).await? == PickerState::Open {
            debug!("picker already open");
            self.picker = PickerState::Open;
        } else {
            let opener = self.find_opener().await?;
            if let Some(room) = request.room.as_deref() {
                if self.opener_shows(&opener, room).await? {
                    info!("'{room}' is already the selected location");
                    self.diagnostics.push(Diagnostic::AlreadySelected {
                        level: HierarchyLevel::Room,
                        name: room.to_string(),
                    });
                    return Ok(Flow::AlreadySelected);
                }
            }
            self.open_picker(&opener).await?;
        }
        self.transition(ResolverState::PickerOpen);

        self.choose_ancestor(HierarchyLevel::Building, request.building.as_deref())
            .await?;
        self.transition(ResolverState::BuildingChosen);

        self.choose_ancestor(HierarchyLevel::Floor, request.floor.as_deref())
            .await?;
        self.transition(ResolverState::FloorChosen);

        self.choose_room(request.for_level(HierarchyLevel::Room))
            .await?;
        self.transition(ResolverState::LeafChosen);

        if self.dismiss().await {
            self.transition(ResolverState::PickerClosed);
        } else {
            warn!("picker may still be visible after all dismissal techniques");
            self.diagnostics.push(Diagnostic::DismissFailed);
            self.transition(ResolverState::DismissFailed);
        }
        Ok(Flow::Selected)
    }

    async fn observe_picker(&self, timeout: Duration) -> Result<PickerState, AutomationError> {
        let chain = StrategyChain::from_selectors(
            "picker marker",
            self.config.picker_marker.iter().map(String::as_str),
            timeout,
        )
        .with_poll_interval(self.config.poll_interval());
        match chain.locate(&self.driver).await {
            Ok(_) => Ok(PickerState::Open),
            Err(e) if e.is_not_found() => Ok(PickerState::Closed),
            Err(e) => Err(e),
        }
    }

    async fn find_opener(&self) -> Result<UIElement, AutomationError> {
        let chain = self.config.chain("picker opener", &self.config.picker_opener);
        self.config
            .scroll_retry(ScrollDirection::Down)
            .find(&self.driver, || chain.locate(&self.driver))
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => AutomationError::PickerNotOpened(e.to_string()),
                e => e,
            })
    }

    async fn opener_shows(&self, opener: &UIElement, room: &str) -> Result<bool, AutomationError> {
        let shown = opener.text().await?;
        let name = opener.name().await?.unwrap_or_default();
        let exact = |text: &str| name_match(text, room) == Some(NameMatch::Exact);
        Ok(exact(&shown) || exact(&name))
    }

    async fn open_picker(&mut self, opener: &UIElement) -> Result<(), AutomationError> {
        opener.click().await?;
        self.settle().await;
        match self.observe_picker(self.config.strategy_timeout()).await? {
            PickerState::Open => {
                self.picker = PickerState::Open;
                Ok(())
            }
            _ => Err(AutomationError::PickerNotOpened(
                "opener was clicked but the picker never appeared".to_string(),
            )),
        }
    }

    async fn snapshot(&self) -> Result<Snapshot, AutomationError> {
        let handles = match self
            .driver
            .find_elements(&self.config.hierarchy_item_selector())
            .await
        {
            Ok(handles) => handles,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut snapshot = Snapshot {
            descriptors: Vec::with_capacity(handles.len()),
            handles: Vec::with_capacity(handles.len()),
        };
        for handle in handles {
            match handle.describe().await {
                Ok(descriptor) => {
                    snapshot.descriptors.push(descriptor);
                    snapshot.handles.push(handle);
                }
                // gone between the query and the read
                Err(AutomationError::ElementDetached(_)) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        debug!(items = snapshot.descriptors.len(), "picker snapshot");
        Ok(snapshot)
    }

    fn scope_start(&self, snapshot: &Snapshot) -> usize {
        self.path
            .deepest_ancestor()
            .and_then(|name| snapshot.position(name))
            .map_or(0, |index| index + 1)
    }

    fn select(&mut self, snapshot: &Snapshot, level: HierarchyLevel, requested: Option<&str>) -> Selection {
        let classified = classify(&snapshot.descriptors, level, &self.rules);
        let exclude = self.path.names();
        let scope = Scope {
            start: self.scope_start(snapshot),
            exclude: &exclude,
            requested,
        };
        let selection = select_candidate(&classified, level, &scope);

        if let Choice::Select(index) | Choice::Descend(index) = selection.choice {
            let chosen = snapshot.descriptors[index].name.clone();
            if !selection.ambiguous.is_empty() {
                warn!(
                    "{} equally valid {level} candidates, taking '{chosen}'",
                    selection.ambiguous.len()
                );
                self.diagnostics.push(Diagnostic::AmbiguousMatch {
                    level,
                    candidates: selection.ambiguous.clone(),
                    chosen: chosen.clone(),
                });
            }
            if selection.fallback {
                debug!("no {level} hint visible, falling back to '{chosen}'");
                self.diagnostics
                    .push(Diagnostic::FallbackSelection { level, name: chosen });
            }
        }
        selection
    }

    async fn choose_ancestor(
        &mut self,
        level: HierarchyLevel,
        requested: Option<&str>,
    ) -> Result<(), AutomationError> {
        let snapshot = self.snapshot().await?;
        match self.select(&snapshot, level, requested).choice {
            Choice::Select(index) | Choice::Descend(index) => {
                self.expand(&snapshot, index).await?;
                self.path.set(level, snapshot.descriptors[index].name.clone());
                Ok(())
            }
            Choice::Create => self.create_and_pick(level, requested).await,
        }
    }

    async fn choose_room(&mut self, requested: Option<&str>) -> Result<(), AutomationError> {
        let mut depth = 0;
        loop {
            let snapshot = self.snapshot().await?;
            match self.select(&snapshot, HierarchyLevel::Room, requested).choice {
                Choice::Select(index) => {
                    let descriptor = snapshot.descriptors[index].clone();
                    return self.pick_leaf(&snapshot.handles[index], &descriptor).await;
                }
                Choice::Descend(index) if depth < self.config.max_descent_depth => {
                    let name = snapshot.descriptors[index].name.clone();
                    debug!("no leaf visible, descending into '{name}'");
                    self.expand(&snapshot, index).await?;
                    self.path.nodes.push(name);
                    depth += 1;
                }
                Choice::Descend(_) => {
                    warn!("descent limit of {depth} reached without finding a room");
                    self.diagnostics
                        .push(Diagnostic::DescentLimitReached { depth });
                    return self.create_and_pick(HierarchyLevel::Room, requested).await;
                }
                Choice::Create => {
                    return self.create_and_pick(HierarchyLevel::Room, requested).await
                }
            }
        }
    }

    /// Click an ancestor so its children show. Clicking an expanded item
    /// collapses it, so items expanded earlier in this run or already showing
    /// indented children are left alone, and an observed collapse is undone
    /// with a second click.
    async fn expand(&mut self, snapshot: &Snapshot, index: usize) -> Result<(), AutomationError> {
        let descriptor = &snapshot.descriptors[index];
        if self.expanded.contains(&descriptor.name) {
            debug!("'{}' already expanded in this run", descriptor.name);
            return Ok(());
        }
        if snapshot.shows_children_of(index) {
            debug!("'{}' is already expanded", descriptor.name);
            self.expanded.insert(descriptor.name.clone());
            return Ok(());
        }

        let visible_before = snapshot.visible_count();
        snapshot.handles[index].click().await?;
        self.item_clicks += 1;
        self.settle().await;
        self.expanded.insert(descriptor.name.clone());

        let after = self.snapshot().await?;
        if after.visible_count() < visible_before {
            if let Some(index) = after.position(&descriptor.name) {
                warn!("'{}' collapsed on click, expanding again", descriptor.name);
                after.handles[index].click().await?;
                self.item_clicks += 1;
                self.settle().await;
                self.diagnostics.push(Diagnostic::CollapseRecovered {
                    name: descriptor.name.clone(),
                });
            }
        }
        Ok(())
    }

    async fn pick_leaf(
        &mut self,
        handle: &UIElement,
        descriptor: &ElementDescriptor,
    ) -> Result<(), AutomationError> {
        if descriptor.selected {
            info!("'{}' is already selected", descriptor.name);
            self.diagnostics.push(Diagnostic::AlreadySelected {
                level: HierarchyLevel::Room,
                name: descriptor.name.clone(),
            });
        } else {
            handle.click().await?;
            self.item_clicks += 1;
            self.settle().await;
        }
        self.path.room = Some(descriptor.name.clone());
        Ok(())
    }

    async fn create_and_pick(
        &mut self,
        level: HierarchyLevel,
        requested: Option<&str>,
    ) -> Result<(), AutomationError> {
        let (name, wanted) = match requested {
            Some(requested) => (requested.to_string(), Wanted::Exact(requested.to_string())),
            None => {
                let token = self.tokens.next_token();
                (
                    self.config.creation_prefixes.item_name(level, &token),
                    Wanted::Containing(token),
                )
            }
        };
        info!("no {level} candidate, creating '{name}'");

        CreationWorkflow::new(&self.driver, self.config)
            .create(level, &name)
            .await?;
        self.creations += 1;

        let handle = self.relocate(&wanted).await?;
        let descriptor = handle.describe().await?;
        match level {
            HierarchyLevel::Room => self.pick_leaf(&handle, &descriptor).await,
            HierarchyLevel::Building | HierarchyLevel::Floor => {
                let snapshot = self.snapshot().await?;
                let index = snapshot.position(&descriptor.name).ok_or_else(|| {
                    AutomationError::ElementDetached(format!(
                        "'{}' vanished after relocation",
                        descriptor.name
                    ))
                })?;
                self.expand(&snapshot, index).await?;
                self.path.set(level, descriptor.name);
                Ok(())
            }
        }
    }

    /// Find a just-created item, scrolling if it landed below the fold.
    async fn relocate(&self, wanted: &Wanted) -> Result<UIElement, AutomationError> {
        self.config
            .scroll_retry(ScrollDirection::Down)
            .find(&self.driver, || self.lookup_item(wanted))
            .await
    }

    async fn lookup_item(&self, wanted: &Wanted) -> Result<UIElement, AutomationError> {
        let snapshot = self.snapshot().await?;
        let found = match wanted {
            Wanted::Exact(name) => find_named(&snapshot.descriptors, name, 0),
            Wanted::Containing(token) => find_by_name(&snapshot.descriptors, token, 0),
        };
        found
            .map(|index| snapshot.handles[index].clone())
            .ok_or_else(|| AutomationError::ElementNotFound(format!("No item matching {wanted:?}")))
    }

    /// Try each dismissal technique once, stopping as soon as the picker is
    /// observed closed. Returns whether it closed.
    async fn dismiss(&mut self) -> bool {
        match self.observe_picker(Duration::ZERO).await {
            Ok(PickerState::Closed) => {
                debug!("picker closed on its own after selection");
                self.picker = PickerState::Closed;
                return true;
            }
            Ok(_) => {}
            Err(e) => debug!("could not observe picker before dismissal: {e}"),
        }

        self.picker = PickerState::Dismissing;
        for technique in DismissTechnique::ORDER {
            self.dismissal.push(technique);
            match self.apply(technique).await {
                Ok(true) => debug!(?technique, "dismissal technique applied"),
                Ok(false) => debug!(?technique, "dismissal technique not applicable"),
                Err(e) => debug!(?technique, "dismissal technique failed: {e}"),
            }
            self.settle().await;

            if let Ok(PickerState::Closed) = self.observe_picker(Duration::ZERO).await {
                info!(?technique, "picker dismissed");
                self.picker = PickerState::Closed;
                return true;
            }
        }
        false
    }

    async fn probe(&self, target: &str, selectors: &[String]) -> Option<UIElement> {
        StrategyChain::from_selectors(target, selectors.iter().map(String::as_str), Duration::ZERO)
            .locate(&self.driver)
            .await
            .ok()
    }

    async fn apply(&self, technique: DismissTechnique) -> Result<bool, AutomationError> {
        match technique {
            DismissTechnique::TapHeader => {
                let Some(header) = self.probe("picker header", &self.config.picker_header).await
                else {
                    return Ok(false);
                };
                let center = header.bounds().await?.center();
                self.driver.tap(center).await?;
                Ok(true)
            }
            DismissTechnique::ClickCancel => {
                let Some(control) = self
                    .probe("dismiss control", &self.config.dismiss_controls)
                    .await
                else {
                    return Ok(false);
                };
                control.click().await?;
                Ok(true)
            }
            DismissTechnique::SwipeDown => {
                let window = self.driver.window_size().await?;
                let top = self.modal_top().await.unwrap_or(window.height * 0.2);
                let x = window.width / 2.0;
                let from = Point::new(x, top + 10.0);
                let to = Point::new(x, window.height * 0.95);
                self.driver
                    .swipe(from, to, self.config.swipe_duration())
                    .await?;
                Ok(true)
            }
            DismissTechnique::TapOutside => {
                let window = self.driver.window_size().await?;
                let top = self.modal_top().await.unwrap_or(0.0);
                // midway into the strip above the sheet, or the status bar area
                let y = if top > window.height * 0.1 {
                    top / 2.0
                } else {
                    window.height * 0.03
                };
                self.driver.tap(Point::new(window.width / 2.0, y)).await?;
                Ok(true)
            }
        }
    }

    async fn modal_top(&self) -> Option<f64> {
        let header = self.probe("picker header", &self.config.picker_header).await?;
        header.bounds().await.ok().map(|b| b.y)
    }
}
