use serde::{Deserialize, Serialize};

use crate::script::Script;
use crate::trigger::{any_matches, TriggerQuery};

/// Criteria for listing scripts; every field that is set must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    /// Case-insensitive substring of label, name or description
    pub query: Option<String>,
    pub resource_type: Option<String>,
    pub event_types: Option<Vec<String>>,
    /// Exact bundle name
    pub bundle: Option<String>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn event_types<I>(mut self, event_types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.event_types = Some(event_types.into_iter().map(Into::into).collect());
        self
    }

    pub fn bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }
}

/// Build the predicate for a filter
pub fn make_filter(filter: &ListFilter) -> impl Fn(&Script) -> bool + '_ {
    let needle = filter
        .query
        .as_deref()
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    let triggers = TriggerQuery {
        resource_type: filter.resource_type.as_deref(),
        event_types: filter.event_types.as_deref(),
    };

    move |script: &Script| {
        matches_query(script, needle.as_deref())
            && any_matches(&script.triggers, &triggers)
            && filter
                .bundle
                .as_deref()
                .is_none_or(|b| script.bundle.as_deref() == Some(b))
    }
}

fn matches_query(script: &Script, needle: Option<&str>) -> bool {
    let Some(needle) = needle else {
        return true;
    };

    let contains = |s: &str| s.to_lowercase().contains(needle);

    script.label.as_deref().is_some_and(contains)
        || contains(&script.name)
        || script.description.as_deref().is_some_and(contains)
}
