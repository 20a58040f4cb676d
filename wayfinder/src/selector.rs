use crate::element::ElementDescriptor;

/// Represents ways to locate a UI element on a mobile screen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by accessibility identifier
    AccessibilityId(String),
    /// Select by exact accessible name
    Name(String),
    /// Select by case-insensitive name substring
    NameContains(String),
    /// Select by exact label
    Label(String),
    /// Select by role (element type) and optional name substring
    Role { role: String, name: Option<String> },
    /// Select a text input by its placeholder
    Placeholder(String),
    /// Raw platform predicate (iOS predicate string / UiAutomator expression)
    Predicate(String),
    /// Raw XPath query
    XPath(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // role|name is the precise format for controls that share a role
        if let Some((role_part, name_part)) = s.split_once('|') {
            let role = role_part
                .trim()
                .strip_prefix("role:")
                .unwrap_or(role_part.trim())
                .to_string();
            let name = name_part
                .trim()
                .strip_prefix("name:")
                .unwrap_or(name_part.trim())
                .to_string();
            return Selector::Role {
                role,
                name: Some(name),
            };
        }

        let lower = s.to_lowercase();
        match s {
            "" => Selector::Invalid("Empty selector".to_string()),
            _ if s.starts_with("//") || s.starts_with("(//") => Selector::XPath(s.to_string()),
            _ if lower.starts_with("xpath:") => Selector::XPath(s[6..].to_string()),
            _ if lower.starts_with("role:") => Selector::Role {
                role: s[5..].to_string(),
                name: None,
            },
            "button" | "textfield" | "securetextfield" | "statictext" | "cell" | "image"
            | "switch" | "other" => Selector::Role {
                role: s.to_string(),
                name: None,
            },
            _ if lower.starts_with("id:") => Selector::AccessibilityId(s[3..].to_string()),
            _ if lower.starts_with("name:") => Selector::Name(s[5..].to_string()),
            _ if lower.starts_with("contains:") => Selector::NameContains(s[9..].to_string()),
            _ if lower.starts_with("label:") => Selector::Label(s[6..].to_string()),
            _ if lower.starts_with("placeholder:") => Selector::Placeholder(s[12..].to_string()),
            _ if lower.starts_with("predicate:") => Selector::Predicate(s[10..].to_string()),
            _ if s.starts_with('#') => Selector::AccessibilityId(s[1..].to_string()),
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use prefixes like 'id:', 'name:', 'contains:', 'label:', 'role:', 'placeholder:', 'predicate:' or an XPath starting with '//'."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl Selector {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Selector::Invalid(_))
    }

    /// Evaluates the selector against an already captured descriptor.
    ///
    /// Platform-native queries (`Predicate`, `XPath`) cannot be evaluated
    /// in memory and never match.
    pub fn matches(&self, element: &ElementDescriptor) -> bool {
        match self {
            Selector::AccessibilityId(id) => element.id.as_deref() == Some(id.as_str()),
            Selector::Name(name) => element.name == *name,
            Selector::NameContains(fragment) => contains_ignore_case(&element.name, fragment),
            Selector::Label(label) => element.label.as_deref() == Some(label.as_str()),
            Selector::Role { role, name } => {
                role_matches(&element.role, role)
                    && name
                        .as_ref()
                        .map_or(true, |n| contains_ignore_case(&element.name, n))
            }
            Selector::Placeholder(placeholder) => {
                element.placeholder.as_deref() == Some(placeholder.as_str())
            }
            Selector::Predicate(_) | Selector::XPath(_) | Selector::Invalid(_) => false,
        }
    }
}

/// Roles compare without the platform type prefix, so `button` matches
/// `XCUIElementTypeButton` and `android.widget.Button`.
pub(crate) fn role_matches(actual: &str, wanted: &str) -> bool {
    let actual = actual
        .trim_start_matches("XCUIElementType")
        .rsplit('.')
        .next()
        .unwrap_or(actual);
    actual.eq_ignore_ascii_case(wanted.trim_start_matches("XCUIElementType"))
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
