use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use tracing::{debug, instrument, trace};

use crate::element::Element;
use crate::errors::AutomationError;
use crate::selector::Selector;

/// Marker attribute carried by the injected action control
pub const ACTION_MARKER: &str = "data-quickmeet-action";

/// Logical roles resolved against the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// The transient editing surface
    DialogRegion,
    /// The host control that persists the record ("Save")
    CommitControl,
    /// The host control that starts conference attachment
    AttachControl,
    /// Submenu entry naming the conferencing provider
    ProviderMenuItem,
    /// A conference link or marker already attached to the record
    Attachment,
    /// Our injected control
    ActionControl,
}

impl Role {
    pub fn short_name(&self) -> &'static str {
        match self {
            Role::DialogRegion => "Dialog",
            Role::CommitControl => "Save",
            Role::AttachControl => "Meet control",
            Role::ProviderMenuItem => "Meet option",
            Role::Attachment => "Meet link",
            Role::ActionControl => "Button",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::DialogRegion => "dialog region",
            Role::CommitControl => "commit control",
            Role::AttachControl => "attach control",
            Role::ProviderMenuItem => "provider menu item",
            Role::Attachment => "attachment",
            Role::ActionControl => "action control",
        };
        f.write_str(name)
    }
}

/// One independent lookup rule
#[derive(Debug, Clone)]
pub enum Rule {
    /// Every node matching the selector
    Query(Selector),
    /// Nodes matching the selector whose accessible label matches the pattern
    Labeled { selector: Selector, pattern: Regex },
}

impl Rule {
    pub fn query(selector: &str) -> Self {
        Rule::Query(Selector::from(selector))
    }

    /// A rule with an unparseable pattern degrades to an invalid selector so the
    /// failure surfaces (and is swallowed) at evaluation time.
    pub fn labeled(selector: &str, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(pattern) => Rule::Labeled {
                selector: Selector::from(selector),
                pattern,
            },
            Err(e) => Rule::Query(Selector::Invalid(format!("bad label pattern {pattern:?}: {e}"))),
        }
    }

    fn evaluate(&self, scope: &Element) -> Result<Vec<Element>, AutomationError> {
        match self {
            Rule::Query(selector) => scope.query_all(selector),
            Rule::Labeled { selector, pattern } => Ok(scope
                .query_all(selector)?
                .into_iter()
                .filter(|e| pattern.is_match(&e.label()))
                .collect()),
        }
    }
}

/// Ordered fallback rules for one role
#[derive(Debug, Clone)]
pub struct Matcher {
    pub rules: Vec<Rule>,
    /// Only visible nodes are candidates
    pub require_visible: bool,
}

impl Matcher {
    pub fn new(rules: Vec<Rule>, require_visible: bool) -> Self {
        Self {
            rules,
            require_visible,
        }
    }
}

/// Resolves logical roles to nodes through ordered matcher lists.
///
/// Matchers never mutate the tree. A failing rule is treated as "no match" and
/// the next rule is tried.
#[derive(Debug, Clone)]
pub struct ElementLocator {
    matchers: HashMap<Role, Matcher>,
}

impl ElementLocator {
    pub fn new(matchers: HashMap<Role, Matcher>) -> Self {
        Self { matchers }
    }

    /// Matchers for the calendar event editor. `provider` is the conferencing
    /// provider's display name.
    pub fn calendar(provider: &str) -> Self {
        let provider_re = format!("(?i){}", regex::escape(provider));
        let mut matchers = HashMap::new();
        matchers.insert(
            Role::DialogRegion,
            Matcher::new(
                vec![
                    Rule::query("role:dialog && attr:aria-modal=true"),
                    Rule::query("role:dialog"),
                    Rule::query("attr:data-event-editor"),
                ],
                false,
            ),
        );
        matchers.insert(
            Role::CommitControl,
            Matcher::new(
                vec![
                    Rule::query("attr:jsname=x8hlje"),
                    Rule::labeled("role:button", r"(?i)^save$"),
                    Rule::labeled("attr:type=submit", r"(?i)^save"),
                ],
                true,
            ),
        );
        matchers.insert(
            Role::AttachControl,
            Matcher::new(
                vec![
                    Rule::labeled("role:button", &format!(r"(?i)^add {}", regex::escape(provider))),
                    Rule::labeled("role:button", r"(?i)video conferenc"),
                    Rule::query("attr:data-conference-add"),
                ],
                true,
            ),
        );
        matchers.insert(
            Role::ProviderMenuItem,
            Matcher::new(
                vec![
                    Rule::labeled("role:menuitem", &provider_re),
                    Rule::labeled("role:option", &provider_re),
                    Rule::labeled("role:menuitemradio", &provider_re),
                ],
                true,
            ),
        );
        matchers.insert(
            Role::Attachment,
            Matcher::new(
                vec![
                    Rule::query("tag:a && attr:href*=meet.google.com/"),
                    Rule::query("attr:data-conference-id"),
                    Rule::labeled("role:button", &format!(r"(?i)^join with {}", regex::escape(provider))),
                ],
                false,
            ),
        );
        matchers.insert(
            Role::ActionControl,
            Matcher::new(vec![Rule::query(&format!("attr:{ACTION_MARKER}"))], false),
        );
        Self { matchers }
    }

    pub fn matcher(&self, role: Role) -> Option<&Matcher> {
        self.matchers.get(&role)
    }

    /// First candidate for `role` within `scope`.
    #[instrument(level = "trace", skip(self, scope))]
    pub fn locate(&self, role: Role, scope: &Element) -> Option<Element> {
        self.candidates(role, scope, true, &|_| true).into_iter().next()
    }

    /// First candidate for `role` that also satisfies `accept`. Rules whose
    /// candidates are all rejected fall through to the next rule.
    pub fn locate_where(
        &self,
        role: Role,
        scope: &Element,
        accept: &dyn Fn(&Element) -> bool,
    ) -> Option<Element> {
        self.candidates(role, scope, true, accept).into_iter().next()
    }

    /// All candidates produced by the first rule that yields any.
    pub fn locate_all(&self, role: Role, scope: &Element) -> Vec<Element> {
        self.candidates(role, scope, false, &|_| true)
    }

    fn candidates(
        &self,
        role: Role,
        scope: &Element,
        first_only: bool,
        accept: &dyn Fn(&Element) -> bool,
    ) -> Vec<Element> {
        let Some(matcher) = self.matchers.get(&role) else {
            debug!(%role, "no matcher configured");
            return Vec::new();
        };

        for (index, rule) in matcher.rules.iter().enumerate() {
            let found = match rule.evaluate(scope) {
                Ok(found) => found,
                Err(e) => {
                    debug!(%role, rule = index, error = %e, "rule failed; trying next");
                    continue;
                }
            };

            let mut candidates = found.into_iter().filter(|e| {
                (role == Role::ActionControl || !e.has_attribute(ACTION_MARKER))
                    && (!matcher.require_visible || e.is_visible())
                    && accept(e)
            });

            let picked: Vec<Element> = if first_only {
                candidates.next().into_iter().collect()
            } else {
                candidates.collect()
            };
            if !picked.is_empty() {
                trace!(%role, rule = index, count = picked.len(), "role resolved");
                return picked;
            }
        }
        Vec::new()
    }
}
