// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Point-in-time-recovery target parsing and validation.
//!
//! A target has the form `YYYY-MM-DD HH:MM:SS+TZ` (or `-TZ`), the syntax
//! pgbackrest accepts for `--target`.

use crate::error::{CloneError, Result};
use crate::types::backup_catalog::{BackupType, StanzaInfo};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const MAX_TZ_OFFSET_HOURS: u32 = 12;

fn pitr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<year>[0-9]{4})-(?P<month>[0-9]{2})-(?P<day>[0-9]{2}) (?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2})(?P<sign>[+-])(?P<tz>[0-9]{2})$",
        )
        .expect("PITR pattern is a valid regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PitrFields {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    /// Offset east of UTC, in hours
    offset_hours: i64,
}

fn parse_fields(text: &str) -> Option<PitrFields> {
    let caps = pitr_pattern().captures(text)?;
    let num = |name: &str| caps[name].parse::<u32>().ok();
    let tz = num("tz")?;
    let offset_hours = if &caps["sign"] == "-" {
        -i64::from(tz)
    } else {
        i64::from(tz)
    };

    Some(PitrFields {
        year: caps["year"].parse().ok()?,
        month: num("month")?,
        day: num("day")?,
        hour: num("hour")?,
        minute: num("minute")?,
        second: num("second")?,
        offset_hours,
    })
}

/// Check the grammar and field ranges of a PITR target.
///
/// Days are only checked against 1..=31; calendar validity is left to
/// [`resolve_utc`]. Whether the target lies in the past is not checked.
pub fn is_syntactically_valid(text: &str) -> bool {
    let Some(f) = parse_fields(text) else {
        return false;
    };

    (1..=12).contains(&f.month)
        && (1..=31).contains(&f.day)
        && f.hour <= 23
        && f.minute <= 59
        && f.second <= 59
        && f.offset_hours.unsigned_abs() <= u64::from(MAX_TZ_OFFSET_HOURS)
}

/// Convert a PITR target to an absolute UTC instant.
///
/// A `+01` time is one hour ahead of UTC, so the offset is subtracted.
pub fn resolve_utc(text: &str) -> Result<DateTime<Utc>> {
    let f = parse_fields(text).ok_or_else(|| {
        CloneError::InvalidInput(format!(
            "PITR {:?} does not match YYYY-MM-DD HH:MM:SS+TZ",
            text
        ))
    })?;

    let local = NaiveDate::from_ymd_opt(f.year, f.month, f.day)
        .and_then(|d| d.and_hms_opt(f.hour, f.minute, f.second))
        .ok_or_else(|| CloneError::InvalidInput(format!("failed to parse PITR date {:?}", text)))?;

    Ok(local.and_utc() - Duration::hours(f.offset_hours))
}

fn unix_seconds_to_nanos(seconds: i64) -> i128 {
    i128::from(seconds) * NANOS_PER_SECOND
}

fn instant_to_nanos(instant: &DateTime<Utc>) -> i128 {
    unix_seconds_to_nanos(instant.timestamp()) + i128::from(instant.timestamp_subsec_nanos())
}

/// True when `target` is strictly after the start of at least one full backup.
///
/// Entries are walked in catalog order and the first match wins; pgbackrest
/// performs the authoritative check during the restore.
pub fn is_after_oldest_full_backup(target: &DateTime<Utc>, catalog: &StanzaInfo) -> bool {
    let target = instant_to_nanos(target);
    catalog
        .backups
        .iter()
        .filter(|b| b.backup_type == BackupType::Full)
        .any(|b| target > unix_seconds_to_nanos(b.timestamp.start))
}

/// Check a PITR target against the first stanza of a fetched catalog.
///
/// A catalog without stanzas has no full backup to recover from.
pub fn check_against_catalog(text: &str, catalog: &[StanzaInfo]) -> Result<()> {
    let target = resolve_utc(text)?;
    match catalog.first() {
        Some(stanza) if is_after_oldest_full_backup(&target, stanza) => Ok(()),
        _ => Err(CloneError::PitrBeforeOldestBackup(text.to_string())),
    }
}
