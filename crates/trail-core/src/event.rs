//! The audit record built by a scope.
//!
//! The canonical wire form is a JSON object with PascalCase keys:
//!
//! ```json
//! {
//!   "EventType": "Order:Update",
//!   "Environment": { "UserName": "...", "MachineName": "...", "DomainName": "...",
//!                    "CallingMethodName": "...", "Exception": null, "Culture": "en-US" },
//!   "StartDate": "2026-10-19T09:30:00.125+02:00",
//!   "EndDate": "2026-10-19T09:30:00.310+02:00",
//!   "Duration": 185,
//!   "Target": { "Type": "Order", "Old": { "Status": 2 }, "New": { "Status": -1 } },
//!   "Comments": [],
//!   "ReferenceId": "A-113"
//! }
//! ```
//!
//! Custom fields are merged at the top level. `EndDate`, `Duration` and
//! `Target.New` are absent while the event is partial (before the scope
//! ends). `Duration` is always derived from the two dates, never stored.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::errors::ReservedKeyError;

/// Who, where and from what call site the event was produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AuditEnvironment {
    /// Acting user.
    pub user_name: Option<String>,
    /// Host the scope ran on.
    pub machine_name: Option<String>,
    /// Domain of the acting user.
    pub domain_name: Option<String>,
    /// Source location that opened the scope (`file:line:column`).
    pub calling_method_name: Option<String>,
    /// Failure raised inside the instrumented block, if any.
    pub exception: Option<String>,
    /// Culture tag.
    pub culture: Option<String>,
}

/// Before/after state of the tracked object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditTarget {
    /// Short type name of the target.
    #[serde(rename = "Type")]
    pub type_name: String,
    /// Snapshot taken when the scope began.
    pub old: Value,
    /// Snapshot taken when the scope ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

/// A single audit record.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditEvent {
    event_type: String,
    environment: AuditEnvironment,
    start_date: DateTime<FixedOffset>,
    end_date: Option<DateTime<FixedOffset>>,
    target: Option<AuditTarget>,
    comments: Vec<String>,
    custom_fields: BTreeMap<String, Value>,
}

impl AuditEvent {
    /// Top-level keys owned by the event itself. Custom fields may not use them.
    pub const RESERVED_KEYS: [&'static str; 7] = [
        "EventType",
        "Environment",
        "StartDate",
        "EndDate",
        "Duration",
        "Target",
        "Comments",
    ];

    /// A partial event: no end date, no target.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        environment: AuditEnvironment,
        start_date: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            environment,
            start_date,
            end_date: None,
            target: None,
            comments: Vec::new(),
            custom_fields: BTreeMap::new(),
        }
    }

    /// Whether `key` collides with one of the event's own keys.
    #[must_use]
    pub fn is_reserved_key(key: &str) -> bool {
        Self::RESERVED_KEYS.contains(&key)
    }

    /// Operation kind.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Rename the operation kind.
    pub fn set_event_type(&mut self, event_type: impl Into<String>) {
        self.event_type = event_type.into();
    }

    /// Environment metadata.
    #[must_use]
    pub fn environment(&self) -> &AuditEnvironment {
        &self.environment
    }

    /// Mutable environment metadata.
    pub fn environment_mut(&mut self) -> &mut AuditEnvironment {
        &mut self.environment
    }

    /// When the scope began.
    #[must_use]
    pub fn start_date(&self) -> DateTime<FixedOffset> {
        self.start_date
    }

    /// When the scope ended, once it has.
    #[must_use]
    pub fn end_date(&self) -> Option<DateTime<FixedOffset>> {
        self.end_date
    }

    /// `EndDate - StartDate`, once the scope has ended. Never negative.
    #[must_use]
    pub fn duration(&self) -> Option<TimeDelta> {
        self.end_date.map(|end| end - self.start_date)
    }

    /// Duration in whole milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration().map(|d| d.num_milliseconds())
    }

    /// Whether the event carries end-of-scope data.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.end_date.is_some()
    }

    /// Target snapshots, if the scope tracks a target.
    #[must_use]
    pub fn target(&self) -> Option<&AuditTarget> {
        self.target.as_ref()
    }

    /// Attach the "before" snapshot.
    pub fn set_target(&mut self, type_name: impl Into<String>, old: Value) {
        self.target = Some(AuditTarget {
            type_name: type_name.into(),
            old,
            new: None,
        });
    }

    /// Record the end of the scope.
    ///
    /// `end_date` is clamped to `start_date` so the duration cannot go
    /// negative under clock adjustments. `new` is stored only when a target
    /// was attached.
    pub fn finish(&mut self, end_date: DateTime<FixedOffset>, new: Option<Value>) {
        self.end_date = Some(end_date.max(self.start_date));
        if let (Some(target), Some(new)) = (self.target.as_mut(), new) {
            target.new = Some(new);
        }
    }

    /// Comments in insertion order.
    #[must_use]
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Append a comment.
    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.comments.push(text.into());
    }

    /// Custom fields, keyed by name.
    #[must_use]
    pub fn custom_fields(&self) -> &BTreeMap<String, Value> {
        &self.custom_fields
    }

    /// One custom field.
    #[must_use]
    pub fn custom_field(&self, key: &str) -> Option<&Value> {
        self.custom_fields.get(key)
    }

    /// Upsert an already-snapshotted custom field. Returns the replaced value.
    ///
    /// Keys in [`RESERVED_KEYS`](Self::RESERVED_KEYS) are rejected: custom
    /// fields share the top-level JSON object with the event's own keys.
    pub fn insert_custom_field(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, ReservedKeyError> {
        let key = key.into();
        if Self::is_reserved_key(&key) {
            return Err(ReservedKeyError(key));
        }
        Ok(self.custom_fields.insert(key, value))
    }

    /// Canonical JSON form.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EventRef<'a> {
    event_type: &'a str,
    environment: &'a AuditEnvironment,
    start_date: &'a DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<&'a DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a AuditTarget>,
    comments: &'a [String],
    #[serde(flatten)]
    custom_fields: &'a BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventOwned {
    event_type: String,
    #[serde(default)]
    environment: AuditEnvironment,
    start_date: DateTime<FixedOffset>,
    #[serde(default)]
    end_date: Option<DateTime<FixedOffset>>,
    // Derived; read so it does not land among the custom fields.
    #[serde(default)]
    #[allow(dead_code)]
    duration: Option<i64>,
    #[serde(default)]
    target: Option<AuditTarget>,
    #[serde(default)]
    comments: Vec<String>,
    #[serde(flatten)]
    custom_fields: BTreeMap<String, Value>,
}

impl Serialize for AuditEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EventRef {
            event_type: &self.event_type,
            environment: &self.environment,
            start_date: &self.start_date,
            end_date: self.end_date.as_ref(),
            duration: self.duration_ms(),
            target: self.target.as_ref(),
            comments: &self.comments,
            custom_fields: &self.custom_fields,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AuditEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = EventOwned::deserialize(deserializer)?;
        Ok(Self {
            event_type: raw.event_type,
            environment: raw.environment,
            start_date: raw.start_date,
            end_date: raw.end_date,
            target: raw.target,
            comments: raw.comments,
            custom_fields: raw.custom_fields,
        })
    }
}
