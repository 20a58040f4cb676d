//! Labels a flat picker snapshot with hierarchy levels.
//!
//! The picker renders Buildings, Floors and Rooms as one list of buttons. The
//! only level signal is the child count each item shows in its name: a
//! building lists its floors (`"HQ Tower, 2 floors"`), a floor lists its rooms
//! (`"Level 1, 3 rooms"`) and a structural room lists its nodes
//! (`"East Wing, 4 nodes"`). Items created by this crate carry a level prefix
//! and a unique token instead.
//!
//! Everything here is a pure function of an immutable snapshot. Labels are
//! only meaningful for the snapshot they were computed from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::element::ElementDescriptor;
use crate::selector::contains_ignore_case;

const BUILDING_HINT: &str = " floor";
const FLOOR_HINT: &str = " room";
const PARENT_HINT: &str = " node";

/// One tier of the fixed Building → Floor → Room location model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HierarchyLevel {
    Building,
    Floor,
    Room,
}

impl HierarchyLevel {
    /// Levels strictly above this one
    pub fn ancestors(self) -> &'static [HierarchyLevel] {
        match self {
            HierarchyLevel::Building => &[],
            HierarchyLevel::Floor => &[HierarchyLevel::Building],
            HierarchyLevel::Room => &[HierarchyLevel::Building, HierarchyLevel::Floor],
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HierarchyLevel::Building => "building",
            HierarchyLevel::Floor => "floor",
            HierarchyLevel::Room => "room",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Building,
    Floor,
    /// Has children one layer deeper; may need another descent
    Parent,
    Leaf,
    SystemChrome,
    Unknown,
}

/// Name prefixes used when this crate creates an item at each level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationPrefixes {
    pub building: String,
    pub floor: String,
    pub room: String,
}

impl Default for CreationPrefixes {
    fn default() -> Self {
        Self {
            building: "Building".to_string(),
            floor: "Floor".to_string(),
            room: "Room".to_string(),
        }
    }
}

impl CreationPrefixes {
    pub fn for_level(&self, level: HierarchyLevel) -> &str {
        match level {
            HierarchyLevel::Building => &self.building,
            HierarchyLevel::Floor => &self.floor,
            HierarchyLevel::Room => &self.room,
        }
    }

    /// Name for a freshly created item
    pub fn item_name(&self, level: HierarchyLevel, token: &str) -> String {
        format!("{} {}", self.for_level(level), token)
    }

    fn is_prefixed(&self, name: &str, level: HierarchyLevel) -> bool {
        let prefix = self.for_level(level);
        !prefix.is_empty()
            && name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(' '))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRules {
    /// Compared case-insensitively against the whole trimmed name
    pub chrome_names: Vec<String>,
    pub min_name_len: usize,
    pub creation_prefixes: CreationPrefixes,
}

pub const DEFAULT_CHROME_NAMES: &[&str] = &[
    "Cancel", "Save", "Done", "Back", "Close", "Add", "Search", "Edit", "Menu", "More",
    "Navigate up", "chevron.left", "chevron.right", "xmark", "plus", "ic_back", "ic_close",
];

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            chrome_names: DEFAULT_CHROME_NAMES.iter().map(|s| s.to_string()).collect(),
            min_name_len: 2,
            creation_prefixes: CreationPrefixes::default(),
        }
    }
}

impl ClassifierRules {
    fn is_chrome(&self, name: &str) -> bool {
        let trimmed = name.trim();
        trimmed.chars().count() < self.min_name_len
            || !trimmed.chars().any(char::is_alphanumeric)
            || self
                .chrome_names
                .iter()
                .any(|chrome| chrome.eq_ignore_ascii_case(trimmed))
    }
}

/// A descriptor with its label and its position in traversal order
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub index: usize,
    pub element: ElementDescriptor,
    pub label: Label,
}

impl Classified {
    pub fn name(&self) -> &str {
        &self.element.name
    }
}

/// Label one element for selection at `level`; first matching rule wins.
pub fn label_for(element: &ElementDescriptor, level: HierarchyLevel, rules: &ClassifierRules) -> Label {
    let name = element.name.as_str();
    if !element.visible {
        return Label::Unknown;
    }
    if rules.is_chrome(name) {
        return Label::SystemChrome;
    }
    if contains_ignore_case(name, BUILDING_HINT) {
        return Label::Building;
    }
    if contains_ignore_case(name, FLOOR_HINT) {
        return Label::Floor;
    }
    if contains_ignore_case(name, PARENT_HINT) {
        return Label::Parent;
    }
    // an item we created for an ancestor level is never a candidate here
    if level
        .ancestors()
        .iter()
        .any(|ancestor| rules.creation_prefixes.is_prefixed(name, *ancestor))
    {
        return Label::Unknown;
    }
    Label::Leaf
}

pub fn classify(
    snapshot: &[ElementDescriptor],
    level: HierarchyLevel,
    rules: &ClassifierRules,
) -> Vec<Classified> {
    snapshot
        .iter()
        .enumerate()
        .map(|(index, element)| Classified {
            index,
            element: element.clone(),
            label: label_for(element, level, rules),
        })
        .collect()
}

/// What to do at one level of the picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Click the item at this snapshot index
    Select(usize),
    /// Expand this structural item and classify again one level deeper
    Descend(usize),
    /// Nothing suitable is visible
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub choice: Choice,
    /// Names of all equally valid candidates when there was more than one
    pub ambiguous: Vec<String>,
    /// Chosen without a level hint, by traversal order alone
    pub fallback: bool,
}

impl Selection {
    fn create() -> Self {
        Self {
            choice: Choice::Create,
            ambiguous: Vec::new(),
            fallback: false,
        }
    }

    fn pick(choice: fn(usize) -> Choice, candidates: &[&Classified], fallback: bool) -> Self {
        let ambiguous = if candidates.len() > 1 {
            candidates.iter().map(|c| c.name().to_string()).collect()
        } else {
            Vec::new()
        };
        Self {
            choice: choice(candidates[0].index),
            ambiguous,
            fallback,
        }
    }
}

/// Restricts selection to part of the snapshot.
#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    /// Only items at or after this index are considered; children are listed
    /// after the ancestor that was expanded to reveal them
    pub start: usize,
    /// Names already chosen in this run
    pub exclude: &'a [String],
    /// Caller-requested name for this level, matched by [`name_match`]
    pub requested: Option<&'a str>,
}

fn accepts(level: HierarchyLevel, label: Label) -> bool {
    match level {
        HierarchyLevel::Building => matches!(label, Label::Building | Label::Leaf),
        HierarchyLevel::Floor => matches!(label, Label::Floor | Label::Leaf),
        HierarchyLevel::Room => matches!(label, Label::Leaf | Label::Parent),
    }
}

/// Choose an item for `level` from a classified snapshot.
///
/// Preference: a requested name (exact before prefix); the level's own label; at room level a
/// `Leaf` before a `Parent`; finally the first unhinted item in traversal
/// order. Ties always go to the earliest item.
pub fn select_candidate(
    classified: &[Classified],
    level: HierarchyLevel,
    scope: &Scope<'_>,
) -> Selection {
    let eligible: Vec<&Classified> = classified
        .iter()
        .filter(|c| c.index >= scope.start)
        .filter(|c| !matches!(c.label, Label::SystemChrome | Label::Unknown))
        .filter(|c| !scope.exclude.iter().any(|name| name == c.name()))
        .collect();

    if let Some(requested) = scope.requested {
        let matching_by = |wanted: NameMatch| -> Vec<&Classified> {
            eligible
                .iter()
                .copied()
                .filter(|c| accepts(level, c.label) && name_match(c.name(), requested) == Some(wanted))
                .collect()
        };
        let exact = matching_by(NameMatch::Exact);
        let matching = if exact.is_empty() {
            matching_by(NameMatch::Prefix)
        } else {
            exact
        };
        return if matching.is_empty() {
            Selection::create()
        } else {
            Selection::pick(Choice::Select, &matching, false)
        };
    }

    let with_label = |label: Label| -> Vec<&Classified> {
        eligible.iter().copied().filter(|c| c.label == label).collect()
    };

    let (primary, fallback) = match level {
        HierarchyLevel::Building => (with_label(Label::Building), with_label(Label::Leaf)),
        HierarchyLevel::Floor => (with_label(Label::Floor), with_label(Label::Leaf)),
        HierarchyLevel::Room => {
            let leaves = with_label(Label::Leaf);
            if !leaves.is_empty() {
                return Selection::pick(Choice::Select, &leaves, false);
            }
            let parents = with_label(Label::Parent);
            if !parents.is_empty() {
                return Selection::pick(Choice::Descend, &parents, false);
            }
            return Selection::create();
        }
    };

    if !primary.is_empty() {
        Selection::pick(Choice::Select, &primary, false)
    } else if !fallback.is_empty() {
        // unhinted names: take the first one, there is nothing to rank by
        Selection::pick(Choice::Select, &fallback[..1], true)
    } else {
        Selection::create()
    }
}

/// How an item name relates to a requested name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// Same text, ignoring case and surrounding whitespace
    Exact,
    /// Starts with the requested text followed by a non-alphanumeric
    /// character, as in `"HQ Tower, 2 floors"` for `"HQ Tower"`
    Prefix,
}

pub fn name_match(name: &str, requested: &str) -> Option<NameMatch> {
    let name = name.trim().to_lowercase();
    let requested = requested.trim().to_lowercase();
    if requested.is_empty() {
        return None;
    }
    if name == requested {
        return Some(NameMatch::Exact);
    }
    name.strip_prefix(&requested)
        .and_then(|rest| rest.chars().next())
        .filter(|next| !next.is_alphanumeric())
        .map(|_| NameMatch::Prefix)
}

/// Index of the first visible item named exactly `name`, ignoring case.
pub fn find_named(snapshot: &[ElementDescriptor], name: &str, start: usize) -> Option<usize> {
    snapshot
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, e)| e.visible && name_match(&e.name, name) == Some(NameMatch::Exact))
        .map(|(index, _)| index)
}

/// Index of the first visible item whose name contains `fragment`.
pub fn find_by_name(snapshot: &[ElementDescriptor], fragment: &str, start: usize) -> Option<usize> {
    snapshot
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, e)| e.visible && contains_ignore_case(&e.name, fragment))
        .map(|(index, _)| index)
}
