//! Sessions keyed by device.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ProfileSession, SessionError};
use crate::counters::{ResourceBackend, ResourceManager};
use crate::message::MessageSink;
use crate::metadata::MetadataReader;
use crate::profile::ProfileMetadata;
use crate::settings::ProfileSettings;

/// All live profiling sessions.
///
/// A device has at most one session. Loading a new application on a device
/// replaces its session; the old one is finished first.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<u64, ProfileSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `settings` against `metadata` and configure counters on
    /// `resources` for a device without a session.
    pub fn create(
        &mut self,
        device_id: u64,
        metadata: Arc<dyn MetadataReader>,
        settings: &ProfileSettings,
        resources: Arc<dyn ResourceManager>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<&mut ProfileSession, SessionError> {
        if self.sessions.contains_key(&device_id) {
            return Err(SessionError::Duplicate(device_id));
        }

        let profile = Arc::new(ProfileMetadata::new(metadata, settings, sink));
        let backend = ResourceBackend::new(Arc::clone(&profile), resources);
        let session = ProfileSession::new(device_id, profile, Box::new(backend))?;
        Ok(self.sessions.entry(device_id).or_insert(session))
    }

    /// Replace the session of a device after a new application load.
    pub fn reload(
        &mut self,
        device_id: u64,
        metadata: Arc<dyn MetadataReader>,
        settings: &ProfileSettings,
        resources: Arc<dyn ResourceManager>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<&mut ProfileSession, SessionError> {
        if self.sessions.contains_key(&device_id) {
            self.destroy(device_id)?;
        }
        self.create(device_id, metadata, settings, resources, sink)
    }

    /// Finish and remove a device's session. Joins its polling thread.
    pub fn destroy(&mut self, device_id: u64) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .remove(&device_id)
            .ok_or(SessionError::Unknown(device_id))?;
        session.finish();
        Ok(())
    }

    pub fn get(&self, device_id: u64) -> Option<&ProfileSession> {
        self.sessions.get(&device_id)
    }

    pub fn get_mut(&mut self, device_id: u64) -> Option<&mut ProfileSession> {
        self.sessions.get_mut(&device_id)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.sessions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Finish every session.
    pub fn clear(&mut self) {
        for (device_id, mut session) in std::mem::take(&mut self.sessions) {
            log::debug!("Finishing profiling session of device {}", device_id);
            session.finish();
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
