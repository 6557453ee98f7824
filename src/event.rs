//! Event records and their user-facing rendering.

use chrono::{DateTime, Local, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Rendering of stored and displayed timestamps, millisecond precision.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Which clock the command layer reads and prints times in.
///
/// Storage is always UTC; this only affects the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBasis {
    #[default]
    Local,
    Utc,
}

impl TimeBasis {
    /// Format a stored instant for display.
    pub fn format(&self, at: &DateTime<Utc>) -> String {
        match self {
            TimeBasis::Local => at.with_timezone(&Local).format(DISPLAY_FORMAT).to_string(),
            TimeBasis::Utc => at.format(DISPLAY_FORMAT).to_string(),
        }
    }
}

/// An event waiting to be written.
///
/// All fields are owned types to satisfy `tokio::spawn` `'static` requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub player_name: String,
    pub event_type: String,
    pub custom_data: String,
    pub server_name: String,
    pub timestamp: DateTime<Utc>,
}

impl NewEvent {
    /// Build an event stamped with the current instant.
    pub fn now(
        player_name: impl Into<String>,
        event_type: impl Into<String>,
        custom_data: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Self {
        Self::at(player_name, event_type, custom_data, server_name, Utc::now())
    }

    /// Build an event with an explicit timestamp.
    ///
    /// Timestamps are truncated to milliseconds, the precision both backends store.
    pub fn at(
        player_name: impl Into<String>,
        event_type: impl Into<String>,
        custom_data: impl Into<String>,
        server_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            player_name: player_name.into(),
            event_type: event_type.into(),
            custom_data: custom_data.into(),
            server_name: server_name.into(),
            timestamp: timestamp.trunc_subsecs(3),
        }
    }
}

/// A stored event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: i64,
    pub player_name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub custom_data: String,
    pub server_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Render as `ID: .., Player: .., Type: .., Custom Data: .., Time: ..`.
    pub fn render(&self, basis: TimeBasis) -> String {
        format!(
            "ID: {}, Player: {}, Type: {}, Custom Data: {}, Time: {}",
            self.id,
            self.player_name,
            self.event_type,
            self.custom_data,
            basis.format(&self.timestamp)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_utc() {
        let event = Event {
            id: 42,
            player_name: "Steve".to_string(),
            event_type: "large-transfer".to_string(),
            custom_data: "amount=5000".to_string(),
            server_name: "lobby-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 9, 18, 13, 13, 27).unwrap(),
        };

        assert_eq!(
            event.render(TimeBasis::Utc),
            "ID: 42, Player: Steve, Type: large-transfer, Custom Data: amount=5000, \
             Time: 2024-09-18 13:13:27.000"
        );
    }

    #[test]
    fn test_render_local_matches_local_clock() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let expected = at.with_timezone(&Local).format(DISPLAY_FORMAT).to_string();
        assert_eq!(TimeBasis::Local.format(&at), expected);
    }

    #[test]
    fn test_new_event_truncates_to_millis() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let event = NewEvent::at("a", "b", "c", "d", at);
        assert_eq!(event.timestamp.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_empty_strings_are_accepted() {
        let event = NewEvent::now("", "", "", "");
        assert!(event.player_name.is_empty());
        assert!(event.custom_data.is_empty());
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = Event {
            id: 1,
            player_name: "Alex".to_string(),
            event_type: "ban".to_string(),
            custom_data: String::new(),
            server_name: "s".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ban");
        assert_eq!(json["id"], 1);
    }
}
