//! Calendar days and the chain-height ranges that cover them
//!
//! An export period is one UTC calendar day expressed as an inclusive range
//! of chain heights. Periods tile height-space: the first starts at height 0
//! and ends just before the first UTC midnight after genesis, and every later
//! period is exactly one day of epochs long.
//!
//! Locating the period for a date or height always walks forward from
//! genesis with [`ExportPeriod::next`]. This keeps every lookup consistent
//! with the ranges an earlier run produced, at the cost of a linear scan.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ExportError, Result};

pub const SECONDS_IN_DAY: i64 = 86_400;

/// Mainnet genesis, 2020-08-24T22:00:00Z
pub const MAINNET_GENESIS_TS: i64 = 1_598_306_400;

/// Calibration network genesis, 2022-11-01T18:13:00Z
pub const CALIBNET_GENESIS_TS: i64 = 1_667_326_380;

pub const DEFAULT_EPOCH_DURATION_SECS: i64 = 30;

/// Heights that must pass before a tipset is considered final
pub const DEFAULT_FINALITY: i64 = 900;

/// A UTC calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Date(NaiveDate);

impl Date {
    pub fn from_ymd_opt(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// The following calendar day
    pub fn next(&self) -> Date {
        Date(self.0.succ_opt().unwrap_or(NaiveDate::MAX))
    }

    /// UTC midnight at the start of this day
    pub fn midnight(&self) -> DateTime<Utc> {
        self.0.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
    }
}

impl From<NaiveDate> for Date {
    fn from(d: NaiveDate) -> Self {
        Self(d)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for Date {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

/// Timing parameters of a chain
///
/// `epoch_duration_secs` must divide a day evenly so that every period after
/// the first covers the same number of heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    genesis: DateTime<Utc>,
    epoch_duration_secs: i64,
    finality: i64,
}

impl ChainParams {
    pub fn new(genesis_ts: i64, epoch_duration_secs: i64, finality: i64) -> Result<Self> {
        if epoch_duration_secs <= 0 || SECONDS_IN_DAY % epoch_duration_secs != 0 {
            return Err(ExportError::config(format!(
                "epoch duration of {epoch_duration_secs}s does not divide a day"
            )));
        }
        if finality < 0 {
            return Err(ExportError::config("finality must not be negative"));
        }
        let genesis = DateTime::from_timestamp(genesis_ts, 0)
            // leave headroom for iterating forward a day at a time
            .filter(|g| (1970..=9999).contains(&g.year()))
            .ok_or_else(|| ExportError::config(format!("genesis timestamp {genesis_ts} out of range")))?;

        Ok(Self {
            genesis,
            epoch_duration_secs,
            finality,
        })
    }

    pub fn mainnet() -> Self {
        Self {
            genesis: DateTime::from_timestamp(MAINNET_GENESIS_TS, 0).unwrap_or_default(),
            epoch_duration_secs: DEFAULT_EPOCH_DURATION_SECS,
            finality: DEFAULT_FINALITY,
        }
    }

    pub fn calibnet() -> Self {
        Self {
            genesis: DateTime::from_timestamp(CALIBNET_GENESIS_TS, 0).unwrap_or_default(),
            ..Self::mainnet()
        }
    }

    /// Parameters of a well-known network
    pub fn for_network(name: &str) -> Option<Self> {
        match name {
            "mainnet" => Some(Self::mainnet()),
            "calibnet" | "calibrationnet" => Some(Self::calibnet()),
            _ => None,
        }
    }

    pub fn genesis(&self) -> DateTime<Utc> {
        self.genesis
    }

    pub fn genesis_ts(&self) -> i64 {
        self.genesis.timestamp()
    }

    pub fn epoch_duration_secs(&self) -> i64 {
        self.epoch_duration_secs
    }

    pub fn finality(&self) -> i64 {
        self.finality
    }

    pub fn epochs_in_day(&self) -> i64 {
        SECONDS_IN_DAY / self.epoch_duration_secs
    }

    pub fn height_to_unix(&self, height: i64) -> i64 {
        self.genesis_ts() + height * self.epoch_duration_secs
    }

    pub fn unix_to_height(&self, ts: i64) -> i64 {
        (ts - self.genesis_ts()) / self.epoch_duration_secs
    }
}

/// The inclusive height range exported for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPeriod {
    pub date: Date,
    pub start_height: i64,
    pub end_height: i64,
}

impl ExportPeriod {
    /// The period covering the following calendar day
    pub fn next(&self, params: &ChainParams) -> ExportPeriod {
        ExportPeriod {
            date: self.date.next(),
            start_height: self.end_height + 1,
            end_height: self.end_height + params.epochs_in_day(),
        }
    }

    /// Earliest unix time at which the period's last height is final
    pub fn earliest_export_ts(&self, params: &ChainParams) -> i64 {
        params.height_to_unix(self.end_height + params.finality())
    }
}

impl fmt::Display for ExportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.date, self.start_height, self.end_height)
    }
}

/// Height at UTC midnight at the start of the day containing `ts`
pub fn midnight_epoch_for_ts(ts: DateTime<Utc>, params: &ChainParams) -> i64 {
    let midnight = Date(ts.date_naive()).midnight();
    params.unix_to_height(midnight.timestamp())
}

/// The period covering genesis up to 23:59:59 UTC on the genesis day
pub fn first_export_period(params: &ChainParams) -> ExportPeriod {
    let genesis = params.genesis();
    let midnight_after_genesis = midnight_epoch_for_ts(genesis + Duration::days(1), params);

    ExportPeriod {
        date: Date(genesis.date_naive()),
        start_height: 0,
        end_height: midnight_after_genesis - 1,
    }
}

/// The first period starting at or after `min_height`
pub fn first_export_period_after(min_height: i64, params: &ChainParams) -> ExportPeriod {
    let mut p = first_export_period(params);
    while p.start_height < min_height {
        p = p.next(params);
    }
    p
}

/// The period covering `date`
pub fn export_period_for_date(date: Date, params: &ChainParams) -> Result<ExportPeriod> {
    let mut p = first_export_period(params);
    if p.date > date {
        return Err(ExportError::DatePrecedesGenesis(date));
    }
    while p.date != date {
        p = p.next(params);
    }
    Ok(p)
}
