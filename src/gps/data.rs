// src/gps/data.rs
//! Fused navigation state

use super::nmea::FixFragment;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;

/// One consistent view of the navigation state merged from every sentence
/// type seen so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavigationFix {
    pub heading: Option<f64>,    // degrees
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,   // meters
    pub speed: Option<f64>,      // knots
    pub fix_type: u8,
    pub fix_quality: u8,
    pub timestamp: Option<DateTime<Utc>>,
    /// Set once any compass (HCHDG) heading has been merged.
    pub proper_compass: bool,
    /// Set by the watchdog, cleared by the next merged fragment.
    pub stale: bool,
}

impl NavigationFix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment.
    ///
    /// Compass headings win over GPS track headings for the rest of the
    /// session. The `stale` flag is left to the caller.
    pub fn apply(&mut self, fragment: &FixFragment) {
        match *fragment {
            FixFragment::Gsa { fix_quality } => {
                self.fix_quality = fix_quality;
            }
            FixFragment::Hdg { heading } => {
                self.proper_compass = true;
                self.heading = Some(heading);
            }
            FixFragment::Vtg { heading, speed } => {
                self.speed = Some(speed);
                if !self.proper_compass {
                    self.heading = Some(heading);
                }
            }
            FixFragment::Gga {
                hour,
                min,
                sec,
                timestamp,
                lat,
                lon,
                altitude,
                fix_type,
            } => {
                self.latitude = Some(lat);
                self.longitude = Some(lon);
                self.altitude = Some(altitude);
                self.fix_type = fix_type;
                self.timestamp = Some(match self.timestamp {
                    // Keep the date an RMC gave us, take the newer time of day
                    Some(current) => with_time_of_day(current, hour, min, sec).unwrap_or(timestamp),
                    None => timestamp,
                });
            }
            FixFragment::Rmc {
                timestamp,
                lat,
                lon,
                speed,
                heading,
                ..
            } => {
                self.latitude = Some(lat);
                self.longitude = Some(lon);
                self.timestamp = Some(timestamp);
                self.speed = Some(speed);
                if !self.proper_compass {
                    self.heading = Some(heading);
                }
            }
        }
    }

    /// Check if the state holds a position
    pub fn has_fix(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Speed converted from knots to km/h
    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed.map(|knots| knots * 1.852)
    }

    /// Get fix type description (GGA quality indicator)
    pub fn get_fix_description(&self) -> String {
        match self.fix_type {
            0 => "No fix".to_string(),
            1 => "GPS".to_string(),
            2 => "DGPS".to_string(),
            3 => "PPS".to_string(),
            4 => "RTK".to_string(),
            5 => "Float RTK".to_string(),
            6 => "Estimated".to_string(),
            7 => "Manual".to_string(),
            8 => "Simulation".to_string(),
            other => format!("Unknown ({})", other),
        }
    }

    /// Get fix mode description (GSA 2D/3D mode)
    pub fn get_mode_description(&self) -> String {
        match self.fix_quality {
            0 => "Unknown".to_string(),
            1 => "No fix".to_string(),
            2 => "2D fix".to_string(),
            3 => "3D fix".to_string(),
            m => format!("Mode {}", m),
        }
    }
}

fn with_time_of_day(current: DateTime<Utc>, hour: u32, min: u32, sec: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, min, sec)?;
    let naive = current.date_naive().and_time(time);
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn rmc_fragment(heading: f64) -> FixFragment {
        let naive = chrono::NaiveDate::from_ymd_opt(2015, 3, 31)
            .unwrap()
            .and_hms_opt(11, 36, 23)
            .unwrap();
        FixFragment::Rmc {
            hour: 11,
            min: 36,
            sec: 23,
            day: 31,
            month: 3,
            year: 2015,
            timestamp: Utc.from_utc_datetime(&naive),
            lat: 50.5,
            lon: -4.1,
            speed: 2.0,
            heading,
        }
    }

    fn gga_fragment(hour: u32, min: u32, sec: u32) -> FixFragment {
        let naive = Utc::now().date_naive().and_hms_opt(hour, min, sec).unwrap();
        FixFragment::Gga {
            hour,
            min,
            sec,
            timestamp: Utc.from_utc_datetime(&naive),
            lat: 48.1,
            lon: 11.5,
            altitude: 545.4,
            fix_type: 1,
        }
    }

    #[test]
    fn test_new_state_is_empty() {
        let fix = NavigationFix::new();
        assert!(!fix.has_fix());
        assert!(!fix.stale);
        assert!(!fix.proper_compass);
        assert_eq!(fix.heading, None);
        assert_eq!(fix.fix_type, 0);
    }

    #[test]
    fn test_vtg_heading_used_without_compass() {
        let mut fix = NavigationFix::new();
        fix.apply(&FixFragment::Vtg { heading: 232.7, speed: 1.3 });
        assert_eq!(fix.heading, Some(232.7));
        assert_eq!(fix.speed, Some(1.3));
    }

    #[test]
    fn test_compass_heading_takes_precedence() {
        let mut fix = NavigationFix::new();
        fix.apply(&FixFragment::Hdg { heading: 10.0 });
        fix.apply(&FixFragment::Vtg { heading: 232.7, speed: 1.3 });
        fix.apply(&rmc_fragment(358.1));

        assert!(fix.proper_compass);
        assert_eq!(fix.heading, Some(10.0));
        // Speed still follows VTG/RMC
        assert_eq!(fix.speed, Some(2.0));
    }

    #[test]
    fn test_gga_keeps_rmc_date() {
        let mut fix = NavigationFix::new();
        fix.apply(&rmc_fragment(0.0));
        fix.apply(&gga_fragment(12, 0, 5));

        let ts = fix.timestamp.unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2015, 3, 31));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (12, 0, 5));
        assert_eq!(fix.altitude, Some(545.4));
        assert_eq!(fix.fix_type, 1);
    }

    #[test]
    fn test_gga_without_prior_timestamp() {
        let mut fix = NavigationFix::new();
        let fragment = gga_fragment(1, 2, 3);
        fix.apply(&fragment);
        match fragment {
            FixFragment::Gga { timestamp, .. } => assert_eq!(fix.timestamp, Some(timestamp)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_gsa_sets_fix_quality() {
        let mut fix = NavigationFix::new();
        fix.apply(&FixFragment::Gsa { fix_quality: 3 });
        assert_eq!(fix.fix_quality, 3);
        assert_eq!(fix.get_mode_description(), "3D fix");
    }

    #[test]
    fn test_descriptions() {
        let mut fix = NavigationFix::new();
        assert_eq!(fix.get_fix_description(), "No fix");
        fix.fix_type = 2;
        assert_eq!(fix.get_fix_description(), "DGPS");
        fix.speed = Some(10.0);
        assert!((fix.speed_kmh().unwrap() - 18.52).abs() < 1e-9);
    }
}
