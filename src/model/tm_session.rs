//! Telemetry sessions and the folder naming scheme on disk
//!
//! Folder and file names follow `<kind>.<YYYYmmddTHHMMSS>.<uuid>[.<info>]`:
//! - `session.*` - a session folder under the sessions directory
//! - `device.*` / `channel.*` - per-object recordings inside a session folder
//! - `screen.avi` - screen recording of the session

use crate::name::{Channel, Device, EntityName, TmSession};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

const TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

pub const SESSION_KIND: &str = "session";
pub const DEVICE_KIND: &str = "device";
pub const CHANNEL_KIND: &str = "channel";
pub const SCREEN_RECORD_FILE: &str = "screen.avi";
pub const ABOUT_FILE: &str = "about.txt";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TmSessionDescription {
    pub name: TmSession,
    pub info: String,
    /// Folder name relative to the sessions directory
    pub folder: String,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub has_screen_record: bool,
    pub devices: Vec<Device>,
    pub channels: Vec<Channel>,
}

impl TmSessionDescription {
    pub fn new(name: TmSession, info: impl Into<String>, folder: impl Into<String>, started: DateTime<Utc>) -> Self {
        Self {
            name,
            info: info.into(),
            folder: folder.into(),
            started,
            finished: None,
            has_screen_record: false,
            devices: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.finished.is_none()
    }
}

/// Parsed form of a session folder or recording file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderName {
    pub kind: String,
    pub started: Option<DateTime<Utc>>,
    pub uuid: Uuid,
    pub info: Option<String>,
}

impl FolderName {
    pub fn new(kind: &str, uuid: Uuid, started: DateTime<Utc>) -> Self {
        Self {
            kind: kind.to_string(),
            started: Some(started),
            uuid,
            info: None,
        }
    }

    pub fn session(session: TmSession, started: DateTime<Utc>) -> Self {
        Self::new(SESSION_KIND, session.uuid(), started)
    }

    /// Parse `<kind>.<time>.<uuid>[.<info>]`; the time part may be unreadable
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.splitn(4, '.');
        let kind = parts.next()?;
        let time = parts.next()?;
        let uuid = Uuid::parse_str(parts.next()?).ok()?;
        let info = parts.next().map(str::to_string);
        if kind.is_empty() {
            return None;
        }

        let started = NaiveDateTime::parse_from_str(time, TIME_FORMAT)
            .ok()
            .map(|t| t.and_utc());

        Some(Self {
            kind: kind.to_string(),
            started,
            uuid,
            info,
        })
    }

    pub fn as_session(&self) -> Option<TmSession> {
        (self.kind == SESSION_KIND).then(|| TmSession::from_uuid(self.uuid))
    }

    pub fn as_device(&self) -> Option<Device> {
        (self.kind == DEVICE_KIND).then(|| Device::from_uuid(self.uuid))
    }

    pub fn as_channel(&self) -> Option<Channel> {
        (self.kind == CHANNEL_KIND).then(|| Channel::from_uuid(self.uuid))
    }
}

impl std::fmt::Display for FolderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let time = self.started.unwrap_or_else(Utc::now).format(TIME_FORMAT);
        write!(f, "{}.{}.{}", self.kind, time, self.uuid.hyphenated())?;
        if let Some(info) = &self.info {
            write!(f, ".{}", info)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_folder_name_format() {
        let session = TmSession::parse("3f2504e0-4f89-11d3-9a0c-0305e82c3301").unwrap();
        let started = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 5).unwrap();
        let folder = FolderName::session(session, started).to_string();
        assert_eq!(folder, "session.20240517T083005.3f2504e0-4f89-11d3-9a0c-0305e82c3301");

        let parsed = FolderName::parse(&folder).unwrap();
        assert_eq!(parsed.as_session(), Some(session));
        assert_eq!(parsed.started, Some(started));
        assert_eq!(parsed.as_device(), None);
    }

    #[test]
    fn test_folder_name_with_info() {
        let parsed = FolderName::parse("device.20240101T000000.3f2504e0-4f89-11d3-9a0c-0305e82c3301.uav.alpha").unwrap();
        assert!(parsed.as_device().is_some());
        assert_eq!(parsed.info.as_deref(), Some("uav.alpha"));
    }

    #[test]
    fn test_folder_name_rejects_garbage() {
        assert!(FolderName::parse("about.txt").is_none());
        assert!(FolderName::parse("session.20240101T000000.not-a-uuid").is_none());
        assert!(FolderName::parse("session").is_none());
    }
}
