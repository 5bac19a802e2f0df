use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use serde::Serialize;

use crate::error::{InsError, Result};

/// 1980-01-06 00:00:00 as unix seconds.
const GPST0: i64 = 315_964_800;
const WEEK_SECS: i64 = 7 * 86_400;

/// Time as whole unix seconds plus a fraction in [0, 1).
///
/// Keeping the fraction separate preserves sub-microsecond resolution over
/// long epochs; use [`GpsTime::diff`] rather than subtracting `as_secs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct GpsTime {
    pub time: i64,
    pub sec: f64,
}

impl GpsTime {
    pub fn new(time: i64, sec: f64) -> Self {
        Self { time, sec: 0.0 }.add(sec)
    }

    pub fn from_secs(secs: f64) -> Self {
        Self::split(0, secs)
    }

    /// `time + secs` with the fraction brought into [0, 1). A value just
    /// below an integer can round up to a fraction of exactly 1.
    fn split(time: i64, secs: f64) -> Self {
        let whole = secs.floor();
        let sec = secs - whole;
        if sec >= 1.0 {
            Self {
                time: time + whole as i64 + 1,
                sec: sec - 1.0,
            }
        } else {
            Self {
                time: time + whole as i64,
                sec,
            }
        }
    }

    pub fn as_secs(&self) -> f64 {
        self.time as f64 + self.sec
    }

    /// `self - other` in seconds.
    pub fn diff(&self, other: &GpsTime) -> f64 {
        (self.time - other.time) as f64 + (self.sec - other.sec)
    }

    pub fn add(&self, secs: f64) -> Self {
        Self::split(self.time, self.sec + secs)
    }

    /// From calendar fields `[year, month, day, hour, minute, second]`.
    pub fn from_epoch(ep: &[f64; 6]) -> Result<Self> {
        if ep.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(InsError::InvalidTime);
        }
        let whole = ep[5].floor();
        let t = NaiveDate::from_ymd_opt(ep[0] as i32, ep[1] as u32, ep[2] as u32)
            .and_then(|d| d.and_hms_opt(ep[3] as u32, ep[4] as u32, whole as u32))
            .ok_or(InsError::InvalidTime)?
            .and_utc()
            .timestamp();
        Ok(Self {
            time: t,
            sec: ep[5] - whole,
        })
    }

    /// To calendar fields `[year, month, day, hour, minute, second]`.
    pub fn to_epoch(&self) -> Result<[f64; 6]> {
        let t = DateTime::from_timestamp(self.time, 0).ok_or(InsError::InvalidTime)?;
        Ok([
            t.year() as f64,
            t.month() as f64,
            t.day() as f64,
            t.hour() as f64,
            t.minute() as f64,
            t.second() as f64 + self.sec,
        ])
    }

    /// From GPS week number and time of week.
    pub fn from_gps_week(week: i32, tow: f64) -> Self {
        Self {
            time: GPST0 + WEEK_SECS * week as i64,
            sec: 0.0,
        }
        .add(tow)
    }

    /// GPS week number and time of week.
    pub fn to_gps_week(&self) -> (i32, f64) {
        let elapsed = self.time - GPST0;
        let week = elapsed.div_euclid(WEEK_SECS);
        let tow = elapsed.rem_euclid(WEEK_SECS) as f64 + self.sec;
        (week as i32, tow)
    }
}
