// src/manager.rs
//! Fusion of several NMEA ports into one navigation fix

use crate::{
    error::{FixError, Result},
    gps::{
        data::NavigationFix,
        nmea::{self, FixFragment},
        port::NmeaPort,
        reader::{FragmentSink, PortReader, DEFAULT_IDLE_DELAY},
    },
    observer::{FixObserver, Registry, StaleCallback},
    watchdog::WatchdogTimer,
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Span};

/// Timing of the per-port readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Pause between two reads of the same port
    pub idle_delay: Duration,
    /// How long `stop()` waits for each reader before aborting it
    pub join_timeout: Duration,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            idle_delay: DEFAULT_IDLE_DELAY,
            join_timeout: Duration::from_secs(1),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the reader tasks and the watchdog.
struct FusionCore {
    state: Mutex<NavigationFix>,
    // Lock order: state, then watchdog
    watchdog: Mutex<Option<WatchdogTimer>>,
    observers: Mutex<Registry<dyn FixObserver>>,
    stale_callbacks: Mutex<Registry<dyn Fn() + Send + Sync>>,
}

impl FusionCore {
    fn new() -> Self {
        Self {
            state: Mutex::new(NavigationFix::new()),
            watchdog: Mutex::new(None),
            observers: Mutex::new(Registry::new()),
            stale_callbacks: Mutex::new(Registry::new()),
        }
    }

    fn merge(&self, fragment: &FixFragment) {
        let snapshot = {
            let mut state = lock(&self.state);
            state.stale = false;
            if let Some(watchdog) = lock(&self.watchdog).as_ref() {
                watchdog.reset();
            }
            state.apply(fragment);
            state.clone()
        };
        trace!(kind = ?fragment.kind(), "Merged fragment");

        let observers = lock(&self.observers).snapshot();
        if !observers.is_empty() {
            debug!(count = observers.len(), "Update observers");
        }
        for observer in observers {
            observer.update(&snapshot);
        }
    }

    fn mark_stale(&self) {
        lock(&self.state).stale = true;
        warn!("GPS data is stale");

        let callbacks = lock(&self.stale_callbacks).snapshot();
        for callback in callbacks {
            callback();
        }
    }
}

impl FragmentSink for FusionCore {
    fn update(&self, fragment: &FixFragment) {
        self.merge(fragment);
    }
}

#[derive(Default)]
struct Lifecycle {
    // Present while running
    shutdown: Option<CancellationToken>,
    readers: Vec<(String, JoinHandle<()>)>,
}

/// Oversees the reading of every registered port and owns the fused fix.
///
/// `start()` spawns one reader task per port; each decoded fragment is
/// merged under a single lock and then pushed to the observers. An optional
/// watchdog flags the fix as stale when nothing arrives for an interval.
///
/// Ports added while running are only read after the next `start()`.
pub struct FixManager {
    core: Arc<FusionCore>,
    ports: Mutex<Vec<Arc<NmeaPort>>>,
    lifecycle: Mutex<Lifecycle>,
    settings: ReaderSettings,
    span: Span,
}

impl FixManager {
    pub fn new() -> Self {
        Self::with_settings(ReaderSettings::default())
    }

    pub fn with_settings(settings: ReaderSettings) -> Self {
        Self {
            core: Arc::new(FusionCore::new()),
            ports: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            settings,
            span: info_span!("fix_manager"),
        }
    }

    /// Use `span` for all events emitted by this manager, its readers and
    /// its watchdog
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn settings(&self) -> ReaderSettings {
        self.settings
    }

    /// Register a port. Returns false if this exact port is already registered.
    pub fn add_port(&self, port: Arc<NmeaPort>) -> bool {
        let _enter = self.span.enter();
        // start() takes lifecycle before ports
        let running = self.is_running();
        let mut ports = lock(&self.ports);
        if ports.iter().any(|p| Arc::ptr_eq(p, &port)) {
            debug!(port = port.name(), "Port already registered");
            return false;
        }
        if running {
            info!(port = port.name(), "Port added while running, it will be read after the next start");
        }
        ports.push(port);
        true
    }

    /// Unregister a port. A reader already running on it keeps going until `stop()`.
    pub fn remove_port(&self, port: &Arc<NmeaPort>) -> bool {
        let mut ports = lock(&self.ports);
        let before = ports.len();
        ports.retain(|p| !Arc::ptr_eq(p, port));
        ports.len() != before
    }

    pub fn port_count(&self) -> usize {
        lock(&self.ports).len()
    }

    /// Spawn one reader per registered port. A no-op if already running.
    pub fn start(&self) -> Result<()> {
        let _enter = self.span.enter();
        let handle = Handle::try_current()?;

        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.shutdown.is_some() {
            warn!("GPS manager already started");
            return Ok(());
        }

        let shutdown = CancellationToken::new();
        let ports = lock(&self.ports).clone();
        for port in ports {
            let sink: Arc<dyn FragmentSink> = self.core.clone();
            let name = port.name().to_string();
            let reader = PortReader::new(port, sink, shutdown.child_token())
                .with_idle_delay(self.settings.idle_delay);
            lifecycle.readers.push((name, reader.spawn(&handle)));
        }
        lifecycle.shutdown = Some(shutdown);

        info!(readers = lifecycle.readers.len(), "Started GPS manager");
        Ok(())
    }

    /// Signal every reader to exit and wait (bounded) for each.
    ///
    /// Safe to call when not running.
    pub async fn stop(&self) {
        let (shutdown, readers) = {
            let mut lifecycle = lock(&self.lifecycle);
            (lifecycle.shutdown.take(), std::mem::take(&mut lifecycle.readers))
        };

        let Some(shutdown) = shutdown else {
            let _enter = self.span.enter();
            debug!("GPS manager not running");
            return;
        };
        shutdown.cancel();

        for (name, mut handle) in readers {
            match tokio::time::timeout(self.settings.join_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _enter = self.span.enter();
                    warn!(port = %name, error = %e, "GPS reader task failed");
                }
                Err(_) => {
                    let _enter = self.span.enter();
                    warn!(port = %name, "GPS reader did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        let _enter = self.span.enter();
        info!("Stopped GPS manager");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.lifecycle).shutdown.is_some()
    }

    pub fn reader_count(&self) -> usize {
        lock(&self.lifecycle).readers.len()
    }

    /// Arm a watchdog that flags the fix stale after `interval` without a
    /// merged fragment. Replaces any watchdog already armed.
    ///
    /// A zero interval is rejected with [`FixError::InvalidInterval`].
    pub fn enable_watchdog(&self, interval: Duration) -> Result<()> {
        let _enter = self.span.enter();
        let core = Arc::downgrade(&self.core);
        let watchdog = WatchdogTimer::new(
            move || {
                if let Some(core) = core.upgrade() {
                    core.mark_stale();
                }
            },
            interval,
        )?;

        let previous = lock(&self.core.watchdog).replace(watchdog);
        if let Some(mut previous) = previous {
            previous.stop();
            debug!("Replaced existing watchdog");
        }

        info!(interval_ms = interval.as_millis() as u64, "Watchdog enabled");
        Ok(())
    }

    /// Stop and discard the watchdog.
    ///
    /// Returns [`FixError::WatchdogNotEnabled`] if none is armed.
    pub fn disable_watchdog(&self) -> Result<()> {
        let _enter = self.span.enter();
        let watchdog = lock(&self.core.watchdog).take();
        match watchdog {
            Some(mut watchdog) => {
                watchdog.stop();
                debug!("Stopped watchdog timer");
                Ok(())
            }
            None => {
                warn!("disable_watchdog called with no active watchdog");
                Err(FixError::WatchdogNotEnabled)
            }
        }
    }

    pub fn has_watchdog(&self) -> bool {
        lock(&self.core.watchdog).is_some()
    }

    /// Merge one fragment: clears `stale`, resets the watchdog and notifies
    /// observers with the new state.
    pub fn update(&self, fragment: &FixFragment) {
        let _enter = self.span.enter();
        self.core.merge(fragment);
    }

    /// Decode and merge a raw sentence. Returns false (and changes nothing)
    /// if the sentence does not decode.
    pub fn ingest(&self, sentence: &str) -> bool {
        match nmea::decode(sentence) {
            Some(fragment) => {
                self.update(&fragment);
                true
            }
            None => false,
        }
    }

    /// Copy of every field, taken under the state lock
    pub fn snapshot(&self) -> NavigationFix {
        lock(&self.core.state).clone()
    }

    pub fn is_stale(&self) -> bool {
        lock(&self.core.state).stale
    }

    pub fn register_observer(&self, observer: Arc<dyn FixObserver>) -> bool {
        lock(&self.core.observers).register(observer)
    }

    pub fn remove_observer(&self, observer: &Arc<dyn FixObserver>) -> bool {
        lock(&self.core.observers).remove(observer)
    }

    /// Called on the watchdog task each time it fires. The callback must not
    /// disable the watchdog itself.
    pub fn register_watchdog_callback(&self, callback: StaleCallback) -> bool {
        lock(&self.core.stale_callbacks).register(callback)
    }

    pub fn remove_watchdog_callback(&self, callback: &StaleCallback) -> bool {
        lock(&self.core.stale_callbacks).remove(callback)
    }
}

impl Default for FixManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FixManager {
    fn drop(&mut self) {
        let lifecycle = std::mem::take(&mut *lock(&self.lifecycle));
        if let Some(shutdown) = lifecycle.shutdown {
            shutdown.cancel();
        }

        // Release the slot before stopping: a firing watchdog needs the state
        // lock, and a merging reader holds it while touching the slot
        let watchdog = lock(&self.core.watchdog).take();
        if let Some(mut watchdog) = watchdog {
            watchdog.stop();
        }
    }
}
