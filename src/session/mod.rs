//! Per-device profiling sessions.
//!
//! ```text
//! application load ──> SessionRegistry::create(device)
//!                        ProfileMetadata::new     resolve settings
//!                        ResourceBackend          reserve counters
//!                      ProfileSession::start_poll
//!                        thread: poll, sleep(interval_us), ... until stopped
//! application unload ─> SessionRegistry::destroy(device)
//!                        stop flag, join, free resources
//! ```
//!
//! Resolution runs once per load on the caller's thread. The polling thread
//! only reads the resolved metadata and the counter table.

pub mod poller;
pub mod registry;

pub use poller::{ProfileSession, DEFAULT_SAMPLE_CAPACITY};
pub use registry::SessionRegistry;

use crate::counters::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("device {0} already has a profiling session")]
    Duplicate(u64),
    #[error("no profiling session for device {0}")]
    Unknown(u64),
    #[error("counter configuration failed: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to start polling thread: {0}")]
    Spawn(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::counters::ResourceManager;
    use crate::device::{arch_for_generation, ModuleType, SimulatedDevice, TileLoc};
    use crate::message::{RecordingSink, Severity};
    use crate::metadata::static_metadata::tests::fixture;
    use crate::metadata::MetadataReader;
    use crate::settings::ProfileSettings;

    struct Env {
        device: Arc<SimulatedDevice>,
        sink: Arc<RecordingSink>,
    }

    impl Env {
        fn new() -> Self {
            Self {
                device: Arc::new(SimulatedDevice::new(arch_for_generation(2))),
                sink: Arc::new(RecordingSink::new()),
            }
        }

        fn create<'a>(
            &self,
            registry: &'a mut SessionRegistry,
            device_id: u64,
            settings: &ProfileSettings,
        ) -> Result<&'a mut ProfileSession, SessionError> {
            let metadata: Arc<dyn MetadataReader> = Arc::new(fixture());
            let resources: Arc<dyn ResourceManager> = self.device.clone();
            registry.create(device_id, metadata, settings, resources, self.sink.clone())
        }
    }

    fn heat_map() -> ProfileSettings {
        ProfileSettings::default()
            .with("tile_based_aie_metrics", "{1,1}:heat_map")
            .with("interval_us", "100")
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_create_and_destroy() {
        let env = Env::new();
        let mut registry = SessionRegistry::new();

        let session = env.create(&mut registry, 7, &heat_map()).unwrap();
        assert_eq!(session.counters().len(), 4);
        assert_eq!(env.device.running_counters(), 4);
        assert_eq!(registry.len(), 1);

        registry.destroy(7).unwrap();
        assert!(registry.is_empty());
        assert!(env.device.reserved_counters().is_empty());
        assert!(matches!(registry.destroy(7), Err(SessionError::Unknown(7))));
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let env = Env::new();
        let mut registry = SessionRegistry::new();
        env.create(&mut registry, 1, &heat_map()).unwrap();
        assert!(matches!(
            env.create(&mut registry, 1, &heat_map()),
            Err(SessionError::Duplicate(1))
        ));
    }

    #[test]
    fn test_reload_discards_previous_configuration() {
        let env = Env::new();
        let mut registry = SessionRegistry::new();
        env.create(&mut registry, 3, &heat_map()).unwrap();

        let metadata: Arc<dyn MetadataReader> = Arc::new(fixture());
        let settings = ProfileSettings::default().with("tile_based_aie_metrics", "{0,0}:stalls");
        let session = registry
            .reload(3, metadata, &settings, env.device.clone(), env.sink.clone())
            .unwrap();

        assert!(session.counters().iter().all(|c| (c.column, c.row) == (0, 2)));
        let reserved = env.device.reserved_counters();
        assert_eq!(reserved.len(), 4);
        assert!(reserved.iter().all(|h| h.tile == TileLoc::new(0, 2)));
    }

    #[test]
    fn test_polling_thread_collects_and_stops() {
        let env = Env::new();
        env.device.set_counter_value(TileLoc::new(1, 3), ModuleType::Core, 0, 11);
        let mut registry = SessionRegistry::new();

        let session = env.create(&mut registry, 0, &heat_map()).unwrap();
        session.start_poll().unwrap();
        assert!(session.is_polling());
        assert!(wait_for(|| session.samples().len() >= 8));

        session.end_poll();
        assert!(!session.is_polling());
        let after_stop = session.samples().len();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(session.samples().len(), after_stop);

        let samples = session.take_samples();
        assert_eq!(samples[0].counter_value(), 11);
        assert!(session.samples().is_empty());
    }

    #[test]
    fn test_destroy_joins_running_poller() {
        let env = Env::new();
        let mut registry = SessionRegistry::new();
        env.create(&mut registry, 5, &heat_map())
            .unwrap()
            .start_poll()
            .unwrap();

        registry.destroy(5).unwrap();
        assert!(env.device.reserved_counters().is_empty());
    }

    #[test]
    fn test_registry_drop_releases_everything() {
        let env = Env::new();
        {
            let mut registry = SessionRegistry::new();
            env.create(&mut registry, 1, &heat_map()).unwrap();
            let settings = ProfileSettings::default().with("tile_based_aie_metrics", "{0,0}:stalls");
            env.create(&mut registry, 2, &settings)
                .unwrap()
                .start_poll()
                .unwrap();
            assert_eq!(registry.device_ids().collect::<Vec<_>>(), vec![1, 2]);
        }
        assert!(env.device.reserved_counters().is_empty());
    }

    #[test]
    fn test_no_counters_means_no_thread() {
        let env = Env::new();
        let mut registry = SessionRegistry::new();
        let session = env
            .create(&mut registry, 9, &ProfileSettings::default())
            .unwrap();
        session.start_poll().unwrap();
        assert!(!session.is_polling());
        assert_eq!(env.sink.count_containing(Severity::Warning, "were not found"), 1);
    }

    #[test]
    fn test_sample_buffer_is_bounded() {
        let env = Env::new();
        env.device.set_counter_value(TileLoc::new(1, 3), ModuleType::Core, 3, 5);
        let mut registry = SessionRegistry::new();
        let session = env.create(&mut registry, 6, &heat_map()).unwrap();
        session.set_sample_capacity(6);

        for _ in 0..5 {
            session.poll_once();
        }
        let samples = session.samples();
        assert_eq!(samples.len(), 6);
        assert_eq!(session.dropped_samples(), 14);
        // Oldest dropped first: the buffer ends with the last full poll
        assert_eq!(samples[1].counter_value(), 5);
        assert_eq!(samples[5].counter_value(), 5);

        session.start_poll().unwrap();
        assert!(wait_for(|| session.dropped_samples() > 40));
        assert!(session.samples().len() <= 6);
        session.end_poll();
        assert_eq!(session.samples().len(), 6);
    }

    #[test]
    fn test_poll_once() {
        let env = Env::new();
        let mut registry = SessionRegistry::new();
        let session = env.create(&mut registry, 4, &heat_map()).unwrap();
        assert_eq!(session.poll_once(), 4);
        assert_eq!(session.samples().len(), 4);
    }
}
