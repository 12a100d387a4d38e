use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Additional match condition attached to a trigger
///
/// Constraints are carried along for whoever raises events; listing and
/// filtering never evaluate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    #[serde(default = "default_op")]
    pub op: String,
    #[serde(default)]
    pub value: Vec<String>,
}

fn default_op() -> String {
    "=".to_string()
}

/// Binds a script to automation events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    pub event_types: BTreeSet<String>,
    pub resource_types: BTreeSet<String>,
    pub constraints: Vec<Constraint>,
}

/// What a listing caller asks triggers about
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerQuery<'a> {
    pub resource_type: Option<&'a str>,
    pub event_types: Option<&'a [String]>,
}

impl TriggerQuery<'_> {
    /// True when the query cannot exclude anything
    pub fn is_unconstrained(&self) -> bool {
        self.resource_type.is_none() && self.event_types.is_none_or(|e| e.is_empty())
    }
}

impl Trigger {
    pub fn new<E, R>(event_types: E, resource_types: R) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            event_types: event_types.into_iter().map(Into::into).collect(),
            resource_types: resource_types.into_iter().map(Into::into).collect(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Check both the resource type and the event types of a query
    pub fn matches(&self, query: &TriggerQuery<'_>) -> bool {
        self.matches_resource_type(query.resource_type)
            && self.matches_event_types(query.event_types)
    }

    /// An explicit resource type only matches triggers that list it
    pub fn matches_resource_type(&self, resource_type: Option<&str>) -> bool {
        match resource_type {
            None => true,
            Some(rt) => self.resource_types.contains(rt),
        }
    }

    /// Any overlap is enough; an empty request matches everything
    pub fn matches_event_types(&self, event_types: Option<&[String]>) -> bool {
        match event_types {
            None | Some([]) => true,
            Some(requested) => requested.iter().any(|e| self.event_types.contains(e)),
        }
    }
}

/// OR across a script's triggers
///
/// A script without triggers only passes an unconstrained query.
pub fn any_matches(triggers: &[Trigger], query: &TriggerQuery<'_>) -> bool {
    query.is_unconstrained() || triggers.iter().any(|t| t.matches(query))
}
