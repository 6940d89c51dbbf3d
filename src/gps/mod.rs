// src/gps/mod.rs
//! NMEA acquisition: decoding, transport and per-port readers

pub mod data;
pub mod nmea;
pub mod port;
pub mod reader;

pub use data::NavigationFix;
pub use nmea::{FixFragment, SentenceKind};
pub use port::{NmeaPort, PortRead};
