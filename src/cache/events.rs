//! Change notifications.
//!
//! Webhook payloads sent by the content platform when content changes. Only the
//! fields needed to derive invalidation subjects are modelled.

use serde::Deserialize;
use uuid::Uuid;

use super::aliases::{ITEM_CATEGORY, TYPE_CATEGORY};
use super::keys::SubjectKey;

/// What kind of object a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    ContentItem,
    ContentType,
    #[serde(other)]
    Other,
}

impl ObjectKind {
    /// Subject category for this kind, if it is one the cache binds.
    pub fn category(self) -> Option<&'static str> {
        match self {
            ObjectKind::ContentItem => Some(ITEM_CATEGORY),
            ObjectKind::ContentType => Some(TYPE_CATEGORY),
            ObjectKind::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Upsert,
    Archive,
    Unpublish,
    Publish,
    Restore,
    #[serde(other)]
    Other,
}

impl Operation {
    /// True if cached copies of the affected objects must be dropped.
    pub fn invalidates(self) -> bool {
        matches!(
            self,
            Operation::Upsert | Operation::Archive | Operation::Unpublish
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationMessage {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub operation: Operation,
    #[serde(default)]
    pub api_name: Option<String>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AffectedObject {
    pub codename: String,
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationData {
    #[serde(default)]
    pub items: Vec<AffectedObject>,
}

/// One webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeNotification {
    pub message: NotificationMessage,
    #[serde(default)]
    pub data: NotificationData,
}

impl ChangeNotification {
    /// Canonical subjects to invalidate; empty for ignored notifications.
    pub fn subjects(&self) -> Vec<SubjectKey> {
        let Some(category) = self.message.kind.category() else {
            return Vec::new();
        };
        if !self.message.operation.invalidates() {
            return Vec::new();
        }

        self.data
            .items
            .iter()
            .map(|object| SubjectKey::new(category, object.codename.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn notification(kind: &str, operation: &str) -> ChangeNotification {
        serde_json::from_value(json!({
            "message": {
                "id": "2b5a1c3e-79c9-4b7f-8a63-0e2e7f6a8f10",
                "type": kind,
                "operation": operation,
                "api_name": "delivery_production",
                "project_id": "975bf280-fd91-488c-994c-2f04416e5ee3"
            },
            "data": {
                "items": [
                    { "codename": "on_roasts", "type": "article", "language": "default" },
                    { "codename": "coffee_beverages_explained", "type": "article", "language": "default" }
                ]
            }
        }))
        .expect("notification should deserialize")
    }

    #[test]
    fn item_upsert_yields_one_subject_per_item() {
        let subjects = notification("content_item", "upsert").subjects();

        assert_eq!(
            subjects,
            vec![
                SubjectKey::new("item", "on_roasts"),
                SubjectKey::new("item", "coffee_beverages_explained"),
            ]
        );
    }

    #[test]
    fn archive_and_unpublish_invalidate() {
        assert_eq!(notification("content_item", "archive").subjects().len(), 2);
        assert_eq!(notification("content_item", "unpublish").subjects().len(), 2);
    }

    #[test]
    fn content_type_maps_to_type_category() {
        let subjects = notification("content_type", "upsert").subjects();
        assert!(subjects.iter().all(|subject| subject.category() == "type"));
    }

    #[test]
    fn other_operations_are_ignored() {
        assert!(notification("content_item", "publish").subjects().is_empty());
        assert!(notification("content_item", "restore").subjects().is_empty());
        assert!(notification("content_item", "workflow_step_changed").subjects().is_empty());
    }

    #[test]
    fn unknown_object_kind_is_ignored() {
        assert!(notification("taxonomy", "upsert").subjects().is_empty());
    }

    #[test]
    fn missing_data_is_empty() {
        let parsed: ChangeNotification = serde_json::from_value(json!({
            "message": { "type": "content_item", "operation": "upsert" }
        }))
        .expect("notification should deserialize");

        assert!(parsed.subjects().is_empty());
    }
}
