//! Telemetry session registry
//!
//! Each session owns a folder under the sessions directory. The database
//! mirrors those folders:
//! - `sync` reconciles rows with the folders found by `scan_dirs`
//! - opening a session creates its folder and row together
//! - at most one session is open (unfinished) at a time

use super::cached::{CachedRegistry, EntityCodec, row_info, row_name};
use super::{Ctx, column};
use crate::model::tm_session::{ABOUT_FILE, SCREEN_RECORD_FILE};
use crate::model::{FolderName, TmSessionDescription};
use crate::name::{EntityName, TmSession};
use crate::notify::AnyDescription;
use crate::storage::RelationalStore;
use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Value;
use rusqlite::{Row, named_params};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type TmSessionRegistry = CachedRegistry<TmSessionCodec>;

const UPDATE_INFO: &str = "UPDATE tm_session SET info = :info WHERE name = :name";

const CLOSE_SESSIONS: &str = "UPDATE tm_session SET finished = :finished WHERE finished IS NULL";

#[derive(Debug)]
pub struct TmSessionCodec {
    sessions_dir: PathBuf,
}

impl EntityCodec for TmSessionCodec {
    type Name = TmSession;
    type Description = TmSessionDescription;

    const COLUMNS: &'static [&'static str] = &["folder", "started", "finished"];

    fn decode(&self, _store: &RelationalStore, row: &Row<'_>) -> Result<TmSessionDescription> {
        let started: String = column(row, "started")?;
        let finished: Option<String> = column(row, "finished")?;

        let mut description = TmSessionDescription {
            name: row_name(row)?,
            info: row_info(row)?,
            folder: column(row, "folder")?,
            started: parse_time(&started)?,
            finished: finished.as_deref().map(parse_time).transpose()?,
            has_screen_record: false,
            devices: Vec::new(),
            channels: Vec::new(),
        };
        fill_contents(&self.sessions_dir.join(&description.folder), &mut description);
        Ok(description)
    }

    fn encode(&self, _store: &RelationalStore, d: &TmSessionDescription) -> Result<Vec<(&'static str, Value)>> {
        Ok(vec![
            ("folder", Value::from(d.folder.clone())),
            ("started", Value::from(d.started.to_rfc3339())),
            ("finished", Value::from(d.finished.map(|t| t.to_rfc3339()))),
        ])
    }

    fn name_of(d: &TmSessionDescription) -> TmSession {
        d.name
    }

    fn info_of(d: &TmSessionDescription) -> &str {
        &d.info
    }

    fn describe(d: Arc<TmSessionDescription>) -> AnyDescription {
        AnyDescription::TmSession(d)
    }

    /// Sessions found on disk keep the name from their folder
    fn assign_name(&self, d: &TmSessionDescription) -> TmSession {
        if d.name.is_nil() { TmSession::generate() } else { d.name }
    }
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InconsistentData(format!("time {:?}: {}", text, e)))
}

/// Record the screen capture and per-object recordings found in `dir`
fn fill_contents(dir: &Path, description: &mut TmSessionDescription) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name == SCREEN_RECORD_FILE {
            description.has_screen_record = true;
            continue;
        }
        let Some(parsed) = FolderName::parse(file_name) else {
            continue;
        };
        if let Some(device) = parsed.as_device() {
            description.devices.push(device);
        } else if let Some(channel) = parsed.as_channel() {
            description.channels.push(channel);
        }
    }
    description.devices.sort_by_key(|d| d.uuid());
    description.channels.sort_by_key(|c| c.uuid());
}

/// Build a description for one session folder, or `None` if the name doesn't qualify
fn read_session_dir(dir: &Path) -> Option<TmSessionDescription> {
    let folder = dir.file_name()?.to_str()?;
    let parsed = FolderName::parse(folder)?;
    let session = parsed.as_session()?;

    let info = std::fs::read_to_string(dir.join(ABOUT_FILE))
        .map(|text| text.trim().to_string())
        .ok()
        .or(parsed.info)
        .unwrap_or_default();
    let started = parsed.started.unwrap_or_else(|| {
        tracing::debug!("session folder {} has no readable start time", folder);
        Utc::now().trunc_subsecs(0)
    });

    let mut description = TmSessionDescription::new(session, info, folder, started);
    fill_contents(dir, &mut description);
    Some(description)
}

impl CachedRegistry<TmSessionCodec> {
    pub fn with_sessions_dir(sessions_dir: impl Into<PathBuf>) -> Self {
        Self::new(TmSessionCodec {
            sessions_dir: sessions_dir.into(),
        })
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.codec.sessions_dir
    }

    /// Session folders present in the sessions directory
    pub fn scan_dirs(&self) -> Result<Vec<TmSessionDescription>> {
        let dir = self.sessions_dir();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::CantGet(format!("{}: {}", dir.display(), e))),
        };

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match read_session_dir(&path) {
                Some(session) => sessions.push(session),
                None => tracing::warn!("not a session folder: {}", path.display()),
            }
        }
        sessions.sort_by(|a, b| a.folder.cmp(&b.folder));
        Ok(sessions)
    }

    /// Make the rows match `folders`: add missing rows, close open ones,
    /// drop rows whose folder is gone
    pub fn sync(&mut self, ctx: &Ctx<'_>, folders: &[TmSessionDescription]) -> Result<()> {
        for folder in folders {
            if self.get_id(ctx.store, &folder.name)?.is_some() {
                continue;
            }
            match self.insert(ctx.store, folder) {
                Ok((_, name)) => self.registered(ctx, &name, true),
                Err(e) => tracing::warn!("session folder {} not registered: {}", folder.folder, e),
            }
        }

        self.close_all_sessions(ctx)?;

        let on_disk: HashSet<&str> = folders.iter().map(|f| f.folder.as_str()).collect();
        for row in self.get_all(ctx.store)? {
            if on_disk.contains(row.folder.as_str()) {
                continue;
            }
            tracing::info!("session {} lost its folder {}", row.name, row.folder);
            self.remove_one(ctx.store, &row.name)?;
            self.registered(ctx, &row.name, false);
        }
        Ok(())
    }

    /// Stamp every open session as finished now
    pub fn close_all_sessions(&mut self, ctx: &Ctx<'_>) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let closed = ctx
            .store
            .execute(CLOSE_SESSIONS, named_params! { ":finished": now })
            .map_err(|e| Error::CantUpdate(e.to_string()))?;
        self.clear_cache();
        if closed > 0 {
            tracing::debug!("closed {} open session(s)", closed);
        }
        Ok(closed)
    }

    /// Close open sessions and start a new one with its own folder
    pub fn open_session(&mut self, ctx: &Ctx<'_>, info: &str) -> Result<Arc<TmSessionDescription>> {
        self.close_all_sessions(ctx)?;

        let name = TmSession::generate();
        let started = Utc::now().trunc_subsecs(0);
        let folder = FolderName::session(name, started).to_string();
        let path = self.sessions_dir().join(&folder);

        std::fs::create_dir_all(&path).map_err(|e| Error::CantRegister(format!("{}: {}", path.display(), e)))?;
        if !info.is_empty() {
            if let Err(e) = std::fs::write(path.join(ABOUT_FILE), info) {
                tracing::warn!("{} not written: {}", path.join(ABOUT_FILE).display(), e);
            }
        }

        let description = TmSessionDescription::new(name, info, folder, started);
        let id = match self.insert(ctx.store, &description) {
            Ok((id, _)) => id,
            Err(e) => {
                if let Err(io) = std::fs::remove_dir_all(&path) {
                    tracing::warn!("{} not removed: {}", path.display(), io);
                }
                return Err(e);
            }
        };

        let stored = self.get_one_by_id(ctx.store, id)?;
        self.registered(ctx, &name, true);
        ctx.notifier.recording_folder(path);
        Ok(stored)
    }

    pub fn update(&mut self, ctx: &Ctx<'_>, d: &TmSessionDescription) -> Result<Arc<TmSessionDescription>> {
        let changed = ctx
            .store
            .execute(UPDATE_INFO, named_params! { ":info": d.info, ":name": d.name.to_name_string() })
            .map_err(|e| Error::CantUpdate(e.to_string()))?;
        if changed == 0 {
            return Err(Error::TmSessionUnknown);
        }
        self.updated(ctx, &d.name)
            .map_err(|e| Error::CantUpdate(e.to_string()))
    }

    /// Remove the session folder (if still present) and the row
    pub fn unregister(&mut self, ctx: &Ctx<'_>, name: &TmSession) -> Result<()> {
        let (_, session) = self.get_one(ctx.store, name, true).map_err(|e| match e {
            Error::NotFound => Error::TmSessionUnknown,
            other => other,
        })?;

        let path = self.sessions_dir().join(&session.folder);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::CantUnRegister(format!("{}: {}", path.display(), e))),
        }

        self.remove_one(ctx.store, name)?;
        self.registered(ctx, name, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tm_session::{CHANNEL_KIND, DEVICE_KIND};
    use crate::name::{Channel, Device};
    use crate::notify::{Notification, drain};
    use crate::registry::testing;

    #[test]
    fn test_open_session_creates_folder_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let mut rx = hub.subscribe();
        let (ctx, regs) = hub.split();

        let session = regs.tm_session.open_session(&ctx, "flight 12").unwrap();
        let path = dir.path().join(&session.folder);
        assert!(path.is_dir());
        assert_eq!(std::fs::read_to_string(path.join(ABOUT_FILE)).unwrap(), "flight 12");
        assert!(session.is_open());

        let notes = drain(&mut rx);
        assert!(matches!(notes[0], Notification::Registered { registered: true, .. }));
        assert!(matches!(&notes[1], Notification::RecordingFolder(p) if *p == path));
    }

    #[test]
    fn test_failed_insert_removes_new_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let mut rx = hub.subscribe();
        let (ctx, regs) = hub.split();
        ctx.store
            .execute(
                "CREATE TRIGGER refuse_sessions BEFORE INSERT ON tm_session BEGIN SELECT RAISE(ABORT, 'refused'); END",
                &[],
            )
            .unwrap();

        let err = regs.tm_session.open_session(&ctx, "flight 13").unwrap_err();
        assert!(matches!(err, Error::CantRegister(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(ctx.store.count("tm_session").unwrap(), 0);

        let notes = drain(&mut rx);
        assert!(!notes.iter().any(|n| matches!(n, Notification::Registered { .. } | Notification::RecordingFolder(_))));
    }

    #[test]
    fn test_only_latest_session_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();

        let first = regs.tm_session.open_session(&ctx, "one").unwrap();
        let second = regs.tm_session.open_session(&ctx, "two").unwrap();

        let (_, first) = regs.tm_session.get_one(ctx.store, &first.name, false).unwrap();
        assert!(!first.is_open());
        assert!(second.is_open());
    }

    #[test]
    fn test_scan_reads_folder_contents() {
        let dir = tempfile::tempdir().unwrap();
        let session = TmSession::generate();
        let device = Device::generate();
        let channel = Channel::generate();
        let started = Utc::now().trunc_subsecs(0);

        let folder = dir.path().join(FolderName::session(session, started).to_string());
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join(SCREEN_RECORD_FILE), b"").unwrap();
        std::fs::write(folder.join(FolderName::new(DEVICE_KIND, device.uuid(), started).to_string()), b"").unwrap();
        std::fs::write(folder.join(FolderName::new(CHANNEL_KIND, channel.uuid(), started).to_string()), b"").unwrap();
        std::fs::create_dir(dir.path().join("not-a-session")).unwrap();

        let registry = TmSessionRegistry::with_sessions_dir(dir.path());
        let found = registry.scan_dirs().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, session);
        assert_eq!(found[0].started, started);
        assert!(found[0].has_screen_record);
        assert_eq!(found[0].devices, vec![device]);
        assert_eq!(found[0].channels, vec![channel]);
    }

    #[test]
    fn test_sync_reconciles_disk_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();

        // b: folder and row; c: row only; a: folder only
        let b = regs.tm_session.open_session(&ctx, "b").unwrap();
        let c = regs.tm_session.open_session(&ctx, "c").unwrap();
        std::fs::remove_dir_all(dir.path().join(&c.folder)).unwrap();
        let a = TmSession::generate();
        std::fs::create_dir(dir.path().join(FolderName::session(a, Utc::now()).to_string())).unwrap();

        let mut rx = ctx.notifier.subscribe();
        let folders = regs.tm_session.scan_dirs().unwrap();
        regs.tm_session.sync(&ctx, &folders).unwrap();

        let mut names = regs.tm_session.get_list(ctx.store).unwrap();
        names.sort_by_key(|n| n.uuid());
        let mut expected = vec![a, b.name];
        expected.sort_by_key(|n| n.uuid());
        assert_eq!(names, expected);

        let notes = drain(&mut rx);
        assert!(notes.iter().any(
            |n| matches!(n, Notification::Registered { registered: true, name, .. } if *name == a.uuid())
        ));
        assert!(notes.iter().any(
            |n| matches!(n, Notification::Registered { registered: false, name, .. } if *name == c.name.uuid())
        ));
        assert!(regs.tm_session.get_all(ctx.store).unwrap().iter().all(|s| !s.is_open()));
    }

    #[test]
    fn test_update_and_unregister() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();

        let session = regs.tm_session.open_session(&ctx, "before").unwrap();
        let mut changed = (*session).clone();
        changed.info = "after".to_string();
        assert_eq!(regs.tm_session.update(&ctx, &changed).unwrap().info, "after");

        regs.tm_session.unregister(&ctx, &session.name).unwrap();
        assert!(!dir.path().join(&session.folder).exists());
        assert!(matches!(
            regs.tm_session.unregister(&ctx, &session.name),
            Err(Error::TmSessionUnknown)
        ));

        let mut ghost = changed;
        ghost.name = TmSession::generate();
        assert!(matches!(regs.tm_session.update(&ctx, &ghost), Err(Error::TmSessionUnknown)));
    }
}
