//! Predicates deciding which messages are persisted.

use serde::{Deserialize, Serialize};
use thingstore_types::AffordanceType;

use crate::config::ValidationError;
use crate::message::{MessageKind, ThingMessage};

/// Filter applied to one kind of message before it is recorded.
///
/// Empty lists match everything. A message matching an exclude list is
/// rejected even if it also matches the corresponding include list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    /// Record nothing when false.
    pub enabled: bool,
    pub include_things: Vec<String>,
    pub exclude_things: Vec<String>,
    pub include_names: Vec<String>,
    pub exclude_names: Vec<String>,
    /// Affordance types to record; empty records all of them.
    pub affordance_types: Vec<AffordanceType>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            enabled: true,
            include_things: Vec::new(),
            exclude_things: Vec::new(),
            include_names: Vec::new(),
            exclude_names: Vec::new(),
            affordance_types: Vec::new(),
        }
    }
}

impl RecordFilter {
    /// A filter that records nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Default filter for requests: only actions are recorded.
    pub fn actions_only() -> Self {
        Self {
            affordance_types: vec![AffordanceType::Action],
            ..Self::default()
        }
    }

    /// Whether `message` should be recorded.
    pub fn matches(&self, message: &ThingMessage) -> bool {
        if !self.enabled {
            return false;
        }
        if self.exclude_things.contains(&message.thing_id)
            || self.exclude_names.contains(&message.name)
        {
            return false;
        }
        if !self.include_things.is_empty() && !self.include_things.contains(&message.thing_id) {
            return false;
        }
        if !self.include_names.is_empty() && !self.include_names.contains(&message.name) {
            return false;
        }
        if self.affordance_types.is_empty() {
            return true;
        }
        message
            .affordance()
            .is_some_and(|kind| self.affordance_types.contains(&kind))
    }

    /// Validate filter configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let lists = [
            ("include_things", &self.include_things),
            ("exclude_things", &self.exclude_things),
            ("include_names", &self.include_names),
            ("exclude_names", &self.exclude_names),
        ];

        let mut errors = Vec::new();
        for (field, entries) in lists {
            for (i, entry) in entries.iter().enumerate() {
                if entry.is_empty() {
                    errors.push(ValidationError {
                        field: format!("{}.{}[{}]", prefix, field, i),
                        message: "entry cannot be empty".to_string(),
                    });
                }
            }
        }
        errors
    }
}

/// The notification and request filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub notifications: RecordFilter,
    pub requests: RecordFilter,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            notifications: RecordFilter::default(),
            requests: RecordFilter::actions_only(),
        }
    }
}

impl FiltersConfig {
    /// The filter responsible for messages of `kind`.
    pub fn for_kind(&self, kind: MessageKind) -> &RecordFilter {
        match kind {
            MessageKind::Notification => &self.notifications,
            MessageKind::Request => &self.requests,
        }
    }

    /// Whether `message` passes the filter for its kind.
    pub fn matches(&self, message: &ThingMessage) -> bool {
        self.for_kind(message.kind).matches(message)
    }

    /// Validate both filters.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = self.notifications.validate("filters.notifications");
        errors.extend(self.requests.validate("filters.requests"));
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageKind, thing: &str, name: &str, affordance: &str) -> ThingMessage {
        ThingMessage {
            kind,
            thing_id: thing.to_string(),
            name: name.to_string(),
            affordance_type: affordance.to_string(),
            sender_id: "agent".to_string(),
            timestamp: None,
            data: serde_json::Value::Null,
        }
    }

    fn notification(thing: &str, name: &str) -> ThingMessage {
        message(MessageKind::Notification, thing, name, "property")
    }

    #[test]
    fn test_default_matches_everything() {
        let filter = RecordFilter::default();
        assert!(filter.matches(&notification("t1", "temperature")));
        assert!(filter.matches(&message(MessageKind::Notification, "t1", "x", "bogus")));
    }

    #[test]
    fn test_disabled_matches_nothing() {
        assert!(!RecordFilter::disabled().matches(&notification("t1", "temperature")));
    }

    #[test]
    fn test_include_lists() {
        let filter = RecordFilter {
            include_things: vec!["t1".to_string()],
            include_names: vec!["temperature".to_string()],
            ..RecordFilter::default()
        };
        assert!(filter.matches(&notification("t1", "temperature")));
        assert!(!filter.matches(&notification("t2", "temperature")));
        assert!(!filter.matches(&notification("t1", "humidity")));
    }

    #[test]
    fn test_exclusion_wins() {
        let filter = RecordFilter {
            include_things: vec!["t1".to_string()],
            exclude_things: vec!["t1".to_string()],
            ..RecordFilter::default()
        };
        assert!(!filter.matches(&notification("t1", "temperature")));

        let filter = RecordFilter {
            exclude_names: vec!["debug".to_string()],
            ..RecordFilter::default()
        };
        assert!(!filter.matches(&notification("t1", "debug")));
        assert!(filter.matches(&notification("t1", "temperature")));
    }

    #[test]
    fn test_affordance_types() {
        let filter = RecordFilter::actions_only();
        assert!(filter.matches(&message(MessageKind::Request, "t1", "open", "action")));
        assert!(!filter.matches(&message(MessageKind::Request, "t1", "level", "property")));
        assert!(!filter.matches(&message(MessageKind::Request, "t1", "open", "bogus")));
    }

    #[test]
    fn test_filters_by_kind() {
        let filters = FiltersConfig::default();
        assert!(filters.matches(&message(MessageKind::Notification, "t1", "level", "property")));
        assert!(!filters.matches(&message(MessageKind::Request, "t1", "level", "property")));
        assert!(filters.matches(&message(MessageKind::Request, "t1", "open", "action")));
    }

    #[test]
    fn test_filter_toml() {
        let toml = r#"
            enabled = true
            exclude_names = ["debug"]
            affordance_types = ["property", "event"]
        "#;
        let filter: RecordFilter = toml::from_str(toml).unwrap();
        assert!(filter.include_things.is_empty());
        assert_eq!(filter.exclude_names, vec!["debug".to_string()]);
        assert_eq!(
            filter.affordance_types,
            vec![AffordanceType::Property, AffordanceType::Event]
        );
    }

    #[test]
    fn test_filter_validation() {
        let filter = RecordFilter {
            include_names: vec!["ok".to_string(), String::new()],
            ..RecordFilter::default()
        };
        let errors = filter.validate("filters.notifications");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "filters.notifications.include_names[1]");
    }
}
