//! Per-thread event profiler.
//!
//! Events are registered process-wide and copied into every thread's profiler, so recording a
//! sample only ever locks the calling thread's own profiler.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::error::{GrfxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProfilerEventType {
    #[default]
    Undefined,
    GrfxApiFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordAction {
    /// Keep every sample.
    #[default]
    Insert,
    /// Keep count, total, min and max of `end - start`.
    Average,
}

pub type ProfilerEventToken = u64;

/// Timestamps in nanoseconds since the first profiler use in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfilerEventSample {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone)]
pub struct ProfilerEvent {
    event_type: ProfilerEventType,
    name: String,
    action: RecordAction,
    token: ProfilerEventToken,
    samples: Vec<ProfilerEventSample>,
    sample_count: u64,
    sample_total: u64,
    sample_min: u64,
    sample_max: u64,
}

impl ProfilerEvent {
    fn new(event_type: ProfilerEventType, name: &str, action: RecordAction, token: ProfilerEventToken) -> Self {
        Self {
            event_type,
            name: name.to_string(),
            action,
            token,
            samples: Vec::new(),
            sample_count: 0,
            sample_total: 0,
            sample_min: u64::MAX,
            sample_max: 0,
        }
    }

    pub fn event_type(&self) -> ProfilerEventType {
        self.event_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> ProfilerEventToken {
        self.token
    }

    pub fn samples(&self) -> &[ProfilerEventSample] {
        &self.samples
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn sample_total(&self) -> u64 {
        self.sample_total
    }

    pub fn sample_min(&self) -> u64 {
        self.sample_min
    }

    pub fn sample_max(&self) -> u64 {
        self.sample_max
    }

    pub fn record_sample(&mut self, sample: ProfilerEventSample) {
        match self.action {
            RecordAction::Insert => self.samples.push(sample),
            RecordAction::Average => {
                let diff = sample.end.saturating_sub(sample.start);
                self.sample_count += 1;
                self.sample_total += diff;
                self.sample_min = self.sample_min.min(diff);
                self.sample_max = self.sample_max.max(diff);
            }
        }
    }

    fn cleared(&self) -> Self {
        Self::new(self.event_type, &self.name, self.action, self.token)
    }
}

/// Events of one thread.
#[derive(Debug, Default)]
pub struct Profiler {
    events: Vec<ProfilerEvent>,
}

#[derive(Default)]
struct Registry {
    events: Vec<ProfilerEvent>,
    profilers: HashMap<ThreadId, Arc<Mutex<Profiler>>>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Profiler {
    /// Token for an event name.
    pub fn event_token(name: &str) -> ProfilerEventToken {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        hasher.finish()
    }

    pub fn timestamp() -> u64 {
        epoch().elapsed().as_nanos() as u64
    }

    /// Registers an event in every current and future thread profiler.
    pub fn register_event(
        event_type: ProfilerEventType,
        name: &str,
        action: RecordAction,
    ) -> Result<ProfilerEventToken> {
        let token = Self::event_token(name);
        let mut registry = registry().write();
        if registry.events.iter().any(|e| e.token == token) {
            return Err(GrfxError::DuplicateElement);
        }
        let event = ProfilerEvent::new(event_type, name, action, token);
        for profiler in registry.profilers.values() {
            profiler.lock().events.push(event.clone());
        }
        registry.events.push(event);
        Ok(token)
    }

    pub fn register_grfx_api_fn_event(name: &str) -> Result<ProfilerEventToken> {
        Self::register_event(ProfilerEventType::GrfxApiFn, name, RecordAction::Average)
    }

    /// The calling thread's profiler, created on first use with every registered event.
    pub fn for_current_thread() -> Arc<Mutex<Profiler>> {
        let id = std::thread::current().id();
        if let Some(profiler) = registry().read().profilers.get(&id) {
            return Arc::clone(profiler);
        }
        let mut registry = registry().write();
        let events: Vec<ProfilerEvent> = registry.events.iter().map(ProfilerEvent::cleared).collect();
        Arc::clone(registry.profilers.entry(id).or_insert_with(|| Arc::new(Mutex::new(Profiler { events }))))
    }

    /// Drops every registered event from the registry and from all thread profilers.
    pub fn reinitialize_global_variables() {
        let mut registry = registry().write();
        registry.events.clear();
        for profiler in registry.profilers.values() {
            profiler.lock().remove_all_events();
        }
    }

    pub fn events(&self) -> &[ProfilerEvent] {
        &self.events
    }

    pub fn event(&self, token: ProfilerEventToken) -> Option<&ProfilerEvent> {
        self.events.iter().find(|e| e.token == token)
    }

    /// Samples for unknown tokens are dropped.
    pub fn record_sample(&mut self, token: ProfilerEventToken, sample: ProfilerEventSample) {
        if let Some(event) = self.events.iter_mut().find(|e| e.token == token) {
            event.record_sample(sample);
        }
    }

    pub fn remove_all_events(&mut self) {
        self.events.clear();
    }
}

/// Times its own lifetime and records it into the current thread's profiler on drop.
#[derive(Debug)]
pub struct ScopedEventSample {
    token: ProfilerEventToken,
    start: u64,
}

impl ScopedEventSample {
    pub fn new(token: ProfilerEventToken) -> Self {
        Self { token, start: Profiler::timestamp() }
    }
}

impl Drop for ScopedEventSample {
    fn drop(&mut self) {
        let sample = ProfilerEventSample { start: self.start, end: Profiler::timestamp() };
        Profiler::for_current_thread().lock().record_sample(self.token, sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_keeps_running_stats() {
        let mut event = ProfilerEvent::new(ProfilerEventType::GrfxApiFn, "avg", RecordAction::Average, 1);
        event.record_sample(ProfilerEventSample { start: 10, end: 15 });
        event.record_sample(ProfilerEventSample { start: 20, end: 40 });
        assert_eq!(event.sample_count(), 2);
        assert_eq!(event.sample_total(), 25);
        assert_eq!(event.sample_min(), 5);
        assert_eq!(event.sample_max(), 20);
        assert!(event.samples().is_empty());
    }

    #[test]
    fn insert_keeps_samples() {
        let mut event = ProfilerEvent::new(ProfilerEventType::Undefined, "ins", RecordAction::Insert, 2);
        event.record_sample(ProfilerEventSample { start: 1, end: 2 });
        assert_eq!(event.samples().len(), 1);
        assert_eq!(event.sample_count(), 0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let token = Profiler::register_grfx_api_fn_event("profiler_test_duplicate").unwrap();
        assert_eq!(token, Profiler::event_token("profiler_test_duplicate"));
        assert_eq!(
            Profiler::register_grfx_api_fn_event("profiler_test_duplicate"),
            Err(GrfxError::DuplicateElement)
        );
    }

    #[test]
    fn scoped_samples_land_in_the_calling_thread() {
        let token = Profiler::register_grfx_api_fn_event("profiler_test_scoped").unwrap();
        std::thread::spawn(move || {
            {
                let _sample = ScopedEventSample::new(token);
            }
            let profiler = Profiler::for_current_thread();
            assert_eq!(profiler.lock().event(token).map(|e| e.sample_count()), Some(1));
        })
        .join()
        .unwrap();
        let main = Profiler::for_current_thread();
        assert_eq!(main.lock().event(token).map(|e| e.sample_count()), Some(0));
    }

    #[test]
    fn remove_all_events_clears_one_profiler() {
        let mut profiler = Profiler::default();
        profiler.events.push(ProfilerEvent::new(ProfilerEventType::Undefined, "x", RecordAction::Insert, 3));
        profiler.remove_all_events();
        assert!(profiler.events().is_empty());
    }
}
