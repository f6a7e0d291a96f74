//! Device hotplug tracking
//!
//! Notifications of devices arriving or leaving are reduced to a
//! shared counter: the notifying side only increments it and rings a
//! doorbell, and the monitor loop consumes the count on its own thread. No
//! connection state is touched from the notification side.
//!
//! [`HotplugWatcher`] runs a [`DeviceEventSource`] on a dedicated thread.
//! [`system_source`] subscribes to the OS's USB arrival and removal
//! notifications through libusb ([`UsbHotplug`]). Where libusb has no hotplug
//! support it falls back to [`PortSetDiff`], which compares successive port
//! listings.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::scanner::PortEnumerator;
use crate::usb_events::UsbHotplug;

/// A device appeared or disappeared
///
/// Carries the serial port path, or the USB location for changes reported
/// by libusb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    Arrived(String),
    Removed(String),
}

impl DeviceChange {
    pub fn port(&self) -> &str {
        match self {
            DeviceChange::Arrived(port) | DeviceChange::Removed(port) => port,
        }
    }
}

/// Shared hotplug counter with a doorbell for sleepers
#[derive(Debug, Default)]
pub struct HotplugEvents {
    pending: AtomicU64,
    suspect: AtomicBool,
    bell: Mutex<u64>,
    rung: Condvar,
}

impl HotplugEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device change and wake any sleeper
    pub fn notify(&self, change: &DeviceChange) {
        debug!(port = change.port(), "Device change: {:?}", change);
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.suspect.store(true, Ordering::SeqCst);
        self.ring();
    }

    /// Events not yet consumed
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Consume one pending event; false if none was pending
    pub fn take_one(&self) -> bool {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Read and clear the suspect flag
    pub fn take_suspect(&self) -> bool {
        self.suspect.swap(false, Ordering::SeqCst)
    }

    /// Wake every thread blocked in [`wait_after`](Self::wait_after)
    pub fn ring(&self) {
        let mut seq = self.bell.lock();
        *seq = seq.wrapping_add(1);
        self.rung.notify_all();
    }

    /// Current doorbell sequence number
    pub fn sequence(&self) -> u64 {
        *self.bell.lock()
    }

    /// Block until the doorbell rings after `seen`, or `timeout` passes
    ///
    /// Returns the sequence number observed on return. A ring that happened
    /// before the call but after `seen` returns immediately.
    pub fn wait_after(&self, seen: u64, timeout: Duration) -> u64 {
        let mut seq = self.bell.lock();
        if *seq == seen {
            self.rung.wait_for(&mut seq, timeout);
        }
        *seq
    }
}

/// Something that reports device arrivals and removals
pub trait DeviceEventSource: Send + 'static {
    /// Changes observed since the previous call
    ///
    /// Event-driven sources block here for a bounded time waiting for
    /// notifications.
    fn poll_changes(&mut self) -> Result<Vec<DeviceChange>, DetectError>;

    /// Whether `poll_changes` waits for notifications itself
    ///
    /// The watcher only sleeps between calls for sources that do not.
    fn is_event_driven(&self) -> bool {
        false
    }
}

impl<S: DeviceEventSource + ?Sized> DeviceEventSource for Box<S> {
    fn poll_changes(&mut self) -> Result<Vec<DeviceChange>, DetectError> {
        (**self).poll_changes()
    }

    fn is_event_driven(&self) -> bool {
        (**self).is_event_driven()
    }
}

/// The best device event source this system offers
///
/// libusb hotplug notifications when available, otherwise a [`PortSetDiff`]
/// over `enumerator`. `tick` bounds each wait for notifications.
pub fn system_source(
    enumerator: Arc<dyn PortEnumerator>,
    tick: Duration,
) -> Box<dyn DeviceEventSource> {
    match UsbHotplug::new(tick) {
        Ok(source) => {
            info!("Using USB hotplug notifications");
            Box::new(source)
        }
        Err(e) => {
            warn!("USB hotplug unavailable ({}), polling the port list", e);
            Box::new(PortSetDiff::new(enumerator))
        }
    }
}

/// Detects changes by comparing successive port listings
pub struct PortSetDiff {
    enumerator: Arc<dyn PortEnumerator>,
    known: Option<BTreeSet<String>>,
}

impl PortSetDiff {
    pub fn new(enumerator: Arc<dyn PortEnumerator>) -> Self {
        Self {
            enumerator,
            known: None,
        }
    }

    fn listing(&self) -> Result<BTreeSet<String>, DetectError> {
        Ok(self
            .enumerator
            .enumerate()?
            .into_iter()
            .filter_map(|entry| entry.ok().map(|info| info.port))
            .collect())
    }
}

impl DeviceEventSource for PortSetDiff {
    fn poll_changes(&mut self) -> Result<Vec<DeviceChange>, DetectError> {
        let current = self.listing()?;

        // The first listing is the baseline
        let Some(known) = self.known.replace(current.clone()) else {
            return Ok(Vec::new());
        };

        let arrived = current
            .difference(&known)
            .map(|p| DeviceChange::Arrived(p.clone()));
        let removed = known
            .difference(&current)
            .map(|p| DeviceChange::Removed(p.clone()));
        Ok(removed.chain(arrived).collect())
    }
}

/// Background thread feeding a [`DeviceEventSource`] into [`HotplugEvents`]
pub struct HotplugWatcher {
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HotplugWatcher {
    /// Start watching; `tick` bounds every wait, including shutdown latency
    pub fn spawn<S: DeviceEventSource>(
        source: S,
        events: Arc<HotplugEvents>,
        tick: Duration,
    ) -> Result<Self, DetectError> {
        let (tx, rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("squeak-hotplug".into())
            .spawn(move || watch(source, &events, &rx, tick))
            .map_err(DetectError::WatcherSpawn)?;

        Ok(Self {
            shutdown: Some(tx),
            thread: Some(thread),
        })
    }

    /// Stop the watcher and wait for its thread to exit
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Hotplug watcher thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch<S: DeviceEventSource>(
    mut source: S,
    events: &HotplugEvents,
    shutdown: &mpsc::Receiver<()>,
    tick: Duration,
) {
    info!("Hotplug watcher started");
    loop {
        // A failed wait did not block, so sleep the tick before retrying
        let waited = match source.poll_changes() {
            Ok(changes) => {
                for change in &changes {
                    events.notify(change);
                }
                source.is_event_driven()
            }
            Err(e) => {
                debug!("Hotplug poll failed: {}", e);
                false
            }
        };

        let stop = if waited {
            !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
        } else {
            !matches!(shutdown.recv_timeout(tick), Err(RecvTimeoutError::Timeout))
        };
        if stop {
            break;
        }
    }
    info!("Hotplug watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{PortEntry, SerialPortInfo};
    use std::time::Instant;

    #[derive(Default)]
    struct MutablePorts(Mutex<Vec<String>>);

    impl MutablePorts {
        fn set(&self, ports: &[&str]) {
            *self.0.lock() = ports.iter().map(|p| p.to_string()).collect();
        }
    }

    impl PortEnumerator for MutablePorts {
        fn enumerate(&self) -> Result<Vec<PortEntry>, DetectError> {
            Ok(self
                .0
                .lock()
                .iter()
                .map(|port| {
                    Ok(SerialPortInfo {
                        port: port.clone(),
                        ..Default::default()
                    })
                })
                .collect())
        }
    }

    #[test]
    fn test_notify_and_take() {
        let events = HotplugEvents::new();
        assert!(!events.take_one());

        events.notify(&DeviceChange::Arrived("COM5".into()));
        events.notify(&DeviceChange::Removed("COM5".into()));

        assert_eq!(events.pending(), 2);
        assert!(events.take_suspect());
        assert!(!events.take_suspect());
        assert!(events.take_one());
        assert!(events.take_one());
        assert!(!events.take_one());
        assert_eq!(events.pending(), 0);
    }

    #[test]
    fn test_wait_returns_immediately_after_missed_ring() {
        let events = HotplugEvents::new();
        let seen = events.sequence();
        events.ring();

        let start = Instant::now();
        let now = events.wait_after(seen, Duration::from_secs(5));
        assert_ne!(now, seen);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_times_out() {
        let events = HotplugEvents::new();
        let seen = events.sequence();
        let now = events.wait_after(seen, Duration::from_millis(20));
        assert_eq!(now, seen);
    }

    #[test]
    fn test_ring_wakes_sleeper() {
        let events = Arc::new(HotplugEvents::new());
        let seen = events.sequence();

        let sleeper = {
            let events = events.clone();
            std::thread::spawn(move || {
                let start = Instant::now();
                events.wait_after(seen, Duration::from_secs(10));
                start.elapsed()
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        events.notify(&DeviceChange::Arrived("/dev/ttyACM0".into()));
        let waited = sleeper.join().unwrap();
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_port_set_diff() {
        let ports = Arc::new(MutablePorts::default());
        ports.set(&["COM1", "COM5"]);
        let mut diff = PortSetDiff::new(ports.clone());

        // Baseline
        assert!(diff.poll_changes().unwrap().is_empty());
        assert!(diff.poll_changes().unwrap().is_empty());

        ports.set(&["COM1", "COM6"]);
        let changes = diff.poll_changes().unwrap();
        assert_eq!(
            changes,
            vec![
                DeviceChange::Removed("COM5".into()),
                DeviceChange::Arrived("COM6".into()),
            ]
        );
        assert!(diff.poll_changes().unwrap().is_empty());
    }

    #[test]
    fn test_watcher_posts_events_and_stops_promptly() {
        let ports = Arc::new(MutablePorts::default());
        ports.set(&["COM1"]);
        let events = Arc::new(HotplugEvents::new());

        let mut watcher = HotplugWatcher::spawn(
            PortSetDiff::new(ports.clone()),
            events.clone(),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(watcher.is_running());

        std::thread::sleep(Duration::from_millis(50));
        ports.set(&["COM1", "COM5"]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while events.pending() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(events.pending() >= 1);

        let start = Instant::now();
        watcher.shutdown();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!watcher.is_running());
    }

    /// Blocks for injected notifications the way an OS callback source does
    struct InjectedEvents {
        rx: mpsc::Receiver<DeviceChange>,
        wait: Duration,
    }

    impl DeviceEventSource for InjectedEvents {
        fn poll_changes(&mut self) -> Result<Vec<DeviceChange>, DetectError> {
            let mut changes = Vec::new();
            match self.rx.recv_timeout(self.wait) {
                Ok(change) => changes.push(change),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DetectError::HotplugUnsupported)
                }
            }
            changes.extend(self.rx.try_iter());
            Ok(changes)
        }

        fn is_event_driven(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_event_driven_source_feeds_notifications() {
        let (inject, rx) = mpsc::channel();
        let source: Box<dyn DeviceEventSource> = Box::new(InjectedEvents {
            rx,
            wait: Duration::from_millis(20),
        });
        let events = Arc::new(HotplugEvents::new());

        // A long tick shows event-driven sources are not throttled by it
        let mut watcher =
            HotplugWatcher::spawn(source, events.clone(), Duration::from_secs(60)).unwrap();

        for (n, change) in [
            DeviceChange::Arrived("usb 001:004 2fe3:0003".into()),
            DeviceChange::Removed("usb 001:004 2fe3:0003".into()),
        ]
        .into_iter()
        .enumerate()
        {
            let seen = events.sequence();
            inject.send(change).unwrap();
            let deadline = Instant::now() + Duration::from_secs(5);
            while events.pending() <= n as u64 && Instant::now() < deadline {
                events.wait_after(seen, Duration::from_millis(50));
            }
            assert_eq!(events.pending(), n as u64 + 1);
        }
        assert!(events.take_suspect());

        let start = Instant::now();
        watcher.shutdown();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_shutdown_does_not_wait_for_long_tick() {
        let ports = Arc::new(MutablePorts::default());
        let events = Arc::new(HotplugEvents::new());
        let mut watcher =
            HotplugWatcher::spawn(PortSetDiff::new(ports), events, Duration::from_secs(60))
                .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        watcher.shutdown();
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
