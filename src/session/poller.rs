//! One device's profiling session and its polling thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::SessionError;
use crate::counters::{AieSample, CounterRecord, ProfileBackend};
use crate::profile::ProfileMetadata;

/// Samples kept per session before the oldest are dropped.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 1 << 20;

type SharedBackend = Arc<Mutex<Box<dyn ProfileBackend>>>;
type SharedSamples = Arc<Mutex<SampleBuffer>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Bounded sample queue. Overflow drops the oldest samples.
#[derive(Debug)]
struct SampleBuffer {
    device_id: u64,
    samples: VecDeque<AieSample>,
    capacity: usize,
    dropped: u64,
}

impl SampleBuffer {
    fn new(device_id: u64) -> Self {
        Self {
            device_id,
            samples: VecDeque::new(),
            capacity: DEFAULT_SAMPLE_CAPACITY,
            dropped: 0,
        }
    }

    fn extend(&mut self, batch: Vec<AieSample>) {
        self.samples.extend(batch);
        self.trim();
    }

    fn trim(&mut self) {
        let excess = self.samples.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        if self.dropped == 0 {
            log::warn!(
                "Sample buffer of device {} is full ({} samples), dropping the oldest samples",
                self.device_id,
                self.capacity
            );
        }
        self.samples.drain(..excess);
        self.dropped += excess as u64;
    }
}

/// Configured counters of one device plus the thread sampling them.
///
/// The profile metadata is read-only once the session exists. Dropping
/// the session stops and joins the polling thread, then releases the
/// hardware resources.
pub struct ProfileSession {
    device_id: u64,
    profile: Arc<ProfileMetadata>,
    backend: SharedBackend,
    counters: Vec<CounterRecord>,
    samples: SharedSamples,
    running: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
    freed: bool,
}

impl std::fmt::Debug for ProfileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileSession")
            .field("device_id", &self.device_id)
            .field("counters", &self.counters.len())
            .field("polling", &self.is_polling())
            .finish()
    }
}

impl ProfileSession {
    /// Configure `backend` for `profile` on device `device_id`.
    pub fn new(
        device_id: u64,
        profile: Arc<ProfileMetadata>,
        mut backend: Box<dyn ProfileBackend>,
    ) -> Result<Self, SessionError> {
        backend.update_device()?;
        let counters = backend.counters().to_vec();
        log::debug!(
            "Profiling session for device {} configured {} counters",
            device_id,
            counters.len()
        );

        Ok(Self {
            device_id,
            profile,
            backend: Arc::new(Mutex::new(backend)),
            counters,
            samples: Arc::new(Mutex::new(SampleBuffer::new(device_id))),
            running: Arc::new(AtomicBool::new(false)),
            poller: None,
            freed: false,
        })
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    pub fn profile(&self) -> &Arc<ProfileMetadata> {
        &self.profile
    }

    /// Counter table produced when the session was configured.
    pub fn counters(&self) -> &[CounterRecord] {
        &self.counters
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Start sampling every `interval_us` on a background thread.
    ///
    /// Does nothing when no counters were configured or polling already
    /// runs.
    pub fn start_poll(&mut self) -> Result<(), SessionError> {
        if self.poller.is_some() || self.counters.is_empty() || self.freed {
            return Ok(());
        }

        let interval = Duration::from_micros(self.profile.polling_interval_us());
        let backend = Arc::clone(&self.backend);
        let samples = Arc::clone(&self.samples);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name(format!("aie-profile-{}", self.device_id))
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    let batch = lock(&backend).poll();
                    lock(&samples).extend(batch);
                    thread::sleep(interval);
                }
            });

        match spawned {
            Ok(handle) => {
                self.poller = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(SessionError::Spawn(e))
            }
        }
    }

    /// Stop the polling thread and wait for its current iteration.
    pub fn end_poll(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.poller.take() {
            if handle.join().is_err() {
                log::error!("Polling thread of device {} panicked", self.device_id);
            }
        }
    }

    /// Poll once on the calling thread. Returns the number of samples taken.
    pub fn poll_once(&self) -> usize {
        let batch = lock(&self.backend).poll();
        let taken = batch.len();
        lock(&self.samples).extend(batch);
        taken
    }

    /// Copy of the buffered samples, oldest first.
    pub fn samples(&self) -> Vec<AieSample> {
        lock(&self.samples).samples.iter().cloned().collect()
    }

    /// Drain the sample buffer.
    pub fn take_samples(&self) -> Vec<AieSample> {
        lock(&self.samples).samples.drain(..).collect()
    }

    /// Limit the buffer to `capacity` samples (at least one).
    pub fn set_sample_capacity(&self, capacity: usize) {
        let mut buffer = lock(&self.samples);
        buffer.capacity = capacity.max(1);
        buffer.trim();
    }

    /// Samples dropped because the buffer was full.
    pub fn dropped_samples(&self) -> u64 {
        lock(&self.samples).dropped
    }

    /// Stop polling and release all hardware resources.
    pub fn finish(&mut self) {
        self.end_poll();
        if !self.freed {
            lock(&self.backend).free_resources();
            self.freed = true;
        }
    }
}

impl Drop for ProfileSession {
    fn drop(&mut self) {
        self.finish();
    }
}
