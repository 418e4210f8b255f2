use crate::element::Element;
use crate::errors::AutomationError;

/// How an attribute selector compares the attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeOp {
    /// `attr:name` - attribute is present
    Exists,
    /// `attr:name=value`
    Equals,
    /// `attr:name*=value`
    Contains,
    /// `attr:name^=value`
    Prefix,
}

/// Represents ways to locate a node in the host document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by tag name (case-insensitive)
    Tag(String),
    /// Select by explicit or implicit ARIA role
    Role(String),
    /// Select by text content (case-insensitive substring)
    Text(String),
    /// Select by accessible label (case-insensitive substring)
    Label(String),
    /// Select by attribute presence or value
    Attribute {
        name: String,
        op: AttributeOp,
        value: Option<String>,
    },
    /// Filter by visibility
    Visible(bool),
    /// All selectors must hold for the same node
    And(Vec<Selector>),
    /// Descendant chain: each selector is searched within the matches of the previous one
    Chain(Vec<Selector>),
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
        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            if parts.iter().any(|p| p.is_empty()) {
                return Selector::Invalid(format!("empty segment in chain '{s}'"));
            }
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        let parts: Vec<&str> = s.split("&&").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            if parts.iter().any(|p| p.is_empty()) {
                return Selector::Invalid(format!("empty operand in '{s}'"));
            }
            return Selector::And(parts.into_iter().map(Selector::from).collect());
        }

        let s = s.trim();
        let Some((prefix, rest)) = s.split_once(':') else {
            return Selector::Invalid(format!("missing selector prefix in '{s}'"));
        };

        match prefix.to_lowercase().as_str() {
            "tag" if !rest.is_empty() => Selector::Tag(rest.trim().to_lowercase()),
            "role" if !rest.is_empty() => Selector::Role(rest.trim().to_lowercase()),
            "text" => Selector::Text(rest.to_string()),
            "label" | "name" => Selector::Label(rest.to_string()),
            "attr" => parse_attribute(rest),
            "visible" => match rest.trim().to_lowercase().as_str() {
                "true" => Selector::Visible(true),
                "false" => Selector::Visible(false),
                other => Selector::Invalid(format!("visible expects true|false, got '{other}'")),
            },
            _ => Selector::Invalid(format!("unknown selector '{s}'")),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

fn parse_attribute(raw: &str) -> Selector {
    let raw = raw.trim();
    let (name, op, value) = if let Some((name, value)) = raw.split_once("*=") {
        (name, AttributeOp::Contains, Some(value))
    } else if let Some((name, value)) = raw.split_once("^=") {
        (name, AttributeOp::Prefix, Some(value))
    } else if let Some((name, value)) = raw.split_once('=') {
        (name, AttributeOp::Equals, Some(value))
    } else {
        (raw, AttributeOp::Exists, None)
    };

    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Selector::Invalid(format!("bad attribute name in 'attr:{raw}'"));
    }

    Selector::Attribute {
        name: name.to_lowercase(),
        op,
        value: value.map(|v| v.trim().trim_matches('"').to_string()),
    }
}

impl Selector {
    /// Tests a single node against this selector.
    ///
    /// `Chain` is not a node predicate; it is resolved by [`Element::query_all`].
    pub fn matches(&self, element: &Element) -> Result<bool, AutomationError> {
        match self {
            Selector::Tag(tag) => Ok(element.tag().eq_ignore_ascii_case(tag)),
            Selector::Role(role) => Ok(element
                .role()
                .map(|r| r.eq_ignore_ascii_case(role))
                .unwrap_or(false)),
            Selector::Text(needle) => Ok(contains_ignore_case(&element.text(), needle)),
            Selector::Label(needle) => Ok(contains_ignore_case(&element.label(), needle)),
            Selector::Attribute { name, op, value } => {
                let Some(actual) = element.attribute(name) else {
                    return Ok(false);
                };
                let expected = value.as_deref().unwrap_or_default();
                Ok(match op {
                    AttributeOp::Exists => true,
                    AttributeOp::Equals => actual == expected,
                    AttributeOp::Contains => actual.contains(expected),
                    AttributeOp::Prefix => actual.starts_with(expected),
                })
            }
            Selector::Visible(wanted) => Ok(element.is_visible() == *wanted),
            Selector::And(parts) => {
                for part in parts {
                    if !part.matches(element)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Selector::Chain(_) => Err(AutomationError::InvalidSelector(format!(
                "chain cannot be used as a node predicate: {self}"
            ))),
            Selector::Invalid(reason) => Err(AutomationError::InvalidSelector(reason.clone())),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
