//! Event filters.
//!
//! A filter is a conjunction: category set, minimum severity, source
//! allow-list, and attribute equality predicates. An event matches iff
//! every clause passes. An empty clause passes everything.

use crate::event::event::{AttrValue, CategorySet, Event, EventCategory, EventSeverity};
use smallvec::SmallVec;

/// Conjunction filter over events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    categories: Option<CategorySet>,
    min_severity: EventSeverity,
    sources: SmallVec<[&'static str; 4]>,
    attr_equals: SmallVec<[(&'static str, AttrValue); 2]>,
}

impl EventFilter {
    /// A filter that matches everything at `Debug` and above.
    #[must_use]
    pub fn any() -> Self {
        Self {
            min_severity: EventSeverity::Debug,
            ..Self::default()
        }
    }

    /// Restricts to a category set.
    #[must_use]
    pub const fn categories(mut self, set: CategorySet) -> Self {
        self.categories = Some(set);
        self
    }

    /// Restricts to a single category.
    #[must_use]
    pub const fn category(self, category: EventCategory) -> Self {
        self.categories(CategorySet::of(&[category]))
    }

    /// Requires at least this severity.
    #[must_use]
    pub const fn min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Adds a source to the allow-list. An empty list allows all sources.
    #[must_use]
    pub fn source(mut self, source: &'static str) -> Self {
        self.sources.push(source);
        self
    }

    /// Requires an attribute to equal a value.
    #[must_use]
    pub fn attr_equals(mut self, key: &'static str, value: AttrValue) -> Self {
        self.attr_equals.push((key, value));
        self
    }

    /// True iff every clause passes.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(set) = self.categories {
            if !set.contains(event.category) {
                return false;
            }
        }
        if event.severity < self.min_severity {
            return false;
        }
        if !self.sources.is_empty() && !self.sources.contains(&event.source) {
            return false;
        }
        self.attr_equals
            .iter()
            .all(|(key, value)| event.attr(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event::EventPayload;

    fn event(category: EventCategory, severity: EventSeverity, source: &'static str) -> Event {
        Event::new(category, severity, source, EventPayload::None)
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = EventFilter::any();
        assert!(filter.matches(&event(
            EventCategory::Hardware,
            EventSeverity::Debug,
            "x"
        )));
        assert!(filter.matches(&event(EventCategory::Security, EventSeverity::Fatal, "y")));
    }

    #[test]
    fn category_clause() {
        let filter = EventFilter::any().category(EventCategory::Hardware);
        assert!(filter.matches(&event(EventCategory::Hardware, EventSeverity::Info, "x")));
        assert!(!filter.matches(&event(EventCategory::System, EventSeverity::Info, "x")));
    }

    #[test]
    fn severity_clause_is_minimum() {
        let filter = EventFilter::any().min_severity(EventSeverity::Warning);
        assert!(!filter.matches(&event(EventCategory::Hardware, EventSeverity::Info, "x")));
        assert!(filter.matches(&event(
            EventCategory::Hardware,
            EventSeverity::Warning,
            "x"
        )));
        assert!(filter.matches(&event(
            EventCategory::Hardware,
            EventSeverity::Critical,
            "x"
        )));
    }

    #[test]
    fn source_allow_list() {
        let filter = EventFilter::any().source("gamepad").source("keyboard");
        assert!(filter.matches(&event(EventCategory::Hardware, EventSeverity::Info, "gamepad")));
        assert!(!filter.matches(&event(EventCategory::Hardware, EventSeverity::Info, "mouse")));
    }

    #[test]
    fn attr_equality_clause() {
        let filter = EventFilter::any().attr_equals("port", AttrValue::U64(1));
        let hit = event(EventCategory::Hardware, EventSeverity::Info, "pad")
            .with_attr("port", AttrValue::U64(1));
        let miss = event(EventCategory::Hardware, EventSeverity::Info, "pad")
            .with_attr("port", AttrValue::U64(2));
        let absent = event(EventCategory::Hardware, EventSeverity::Info, "pad");
        assert!(filter.matches(&hit));
        assert!(!filter.matches(&miss));
        assert!(!filter.matches(&absent));
    }

    #[test]
    fn clauses_conjoin() {
        let filter = EventFilter::any()
            .category(EventCategory::Hardware)
            .min_severity(EventSeverity::Warning)
            .source("dma");
        assert!(filter.matches(&event(
            EventCategory::Hardware,
            EventSeverity::Error,
            "dma"
        )));
        assert!(!filter.matches(&event(
            EventCategory::Hardware,
            EventSeverity::Error,
            "other"
        )));
        assert!(!filter.matches(&event(EventCategory::Hardware, EventSeverity::Info, "dma")));
        assert!(!filter.matches(&event(EventCategory::System, EventSeverity::Error, "dma")));
    }
}
