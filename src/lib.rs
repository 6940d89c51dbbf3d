// src/lib.rs
//! NMEA Fusion Library
//!
//! Reads NMEA-0183 sentences from one or more ports, merges them into a
//! single navigation fix and flags the fix as stale when updates stop.

pub mod config;
pub mod error;
pub mod gps;
pub mod logging;
pub mod manager;
pub mod observer;
pub mod watchdog;

// Re-export main types for convenience
pub use error::{FixError, Result};
pub use gps::{FixFragment, NavigationFix, NmeaPort, PortRead, SentenceKind};
pub use manager::{FixManager, ReaderSettings};
pub use observer::{FixObserver, StaleCallback};
pub use watchdog::WatchdogTimer;
