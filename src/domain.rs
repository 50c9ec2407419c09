use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RetrieveError;

/// A named retrieval channel for external model data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DataStore {
    Disk,
    Aws,
    Nomads,
    Hpss,
}

impl DataStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataStore::Disk => "disk",
            DataStore::Aws => "aws",
            DataStore::Nomads => "nomads",
            DataStore::Hpss => "hpss",
        }
    }
}

impl fmt::Display for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataStore {
    type Err = RetrieveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "disk" => Ok(DataStore::Disk),
            "aws" => Ok(DataStore::Aws),
            "nomads" => Ok(DataStore::Nomads),
            "hpss" => Ok(DataStore::Hpss),
            other => Err(RetrieveError::UnsupportedStore(other.to_string())),
        }
    }
}

/// Category of data being retrieved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FileSet {
    Anl,
    Fcst,
    Obs,
    Fix,
}

impl fmt::Display for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSet::Anl => write!(f, "anl"),
            FileSet::Fcst => write!(f, "fcst"),
            FileSet::Obs => write!(f, "obs"),
            FileSet::Fix => write!(f, "fix"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Grib2,
    Nemsio,
    Netcdf,
    Prepbufr,
    Tcvitals,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Grib2 => write!(f, "grib2"),
            FileFormat::Nemsio => write!(f, "nemsio"),
            FileFormat::Netcdf => write!(f, "netcdf"),
            FileFormat::Prepbufr => write!(f, "prepbufr"),
            FileFormat::Tcvitals => write!(f, "tcvitals"),
        }
    }
}

/// Ensemble member of a request. `Deterministic` means the request has no
/// ensemble dimension: target names carry no member prefix and templates see
/// no `mem` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Member {
    Deterministic,
    Ensemble(u32),
}

impl Member {
    /// Directory prefix for target names, e.g. `mem003/`.
    pub fn prefix(&self) -> String {
        match self {
            Member::Deterministic => String::new(),
            Member::Ensemble(id) => format!("mem{id:03}/"),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Deterministic => write!(f, "deterministic"),
            Member::Ensemble(id) => write!(f, "mem{id:03}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Copy,
    Symlink,
}

/// Parses a cycle in one of the accepted ISO 8601 spellings. Every cycle is
/// read as UTC wall-clock time: an explicit offset is dropped, not applied.
pub fn parse_cycle(value: &str) -> Result<DateTime<Utc>, RetrieveError> {
    let trimmed = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(time.naive_local().and_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(time.and_utc());
        }
    }
    let hourly = trimmed.split_once('T').or_else(|| {
        (trimmed.len() == 10 && trimmed.chars().all(|ch| ch.is_ascii_digit()))
            .then(|| trimmed.split_at(8))
    });
    if let Some((date, hour)) = hourly {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(date, "%Y%m%d"));
        if let (Ok(date), Ok(hour)) = (date, hour.parse::<u32>()) {
            if let Some(time) = date.and_hms_opt(hour, 0, 0) {
                return Ok(time.and_utc());
            }
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(time) = date.and_hms_opt(0, 0, 0) {
            return Ok(time.and_utc());
        }
    }
    Err(RetrieveError::InvalidCycle(value.to_string()))
}

static LEAD_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?::(\d+))?(?::(\d+))?$").expect("static regex"));

/// Parses a lead time given as `hours[:minutes[:seconds]]`.
pub fn parse_lead_time(value: &str) -> Result<TimeDelta, RetrieveError> {
    let invalid = || RetrieveError::InvalidLeadTime(value.to_string());
    let captures = LEAD_TIME.captures(value.trim()).ok_or_else(invalid)?;
    let field = |index: usize| -> Result<i64, RetrieveError> {
        captures
            .get(index)
            .map(|m| m.as_str().parse::<i64>().map_err(|_| invalid()))
            .unwrap_or(Ok(0))
    };
    let (hours, minutes, seconds) = (field(1)?, field(2)?, field(3)?);
    let seconds = hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes.checked_mul(60)?))
        .and_then(|total| total.checked_add(seconds))
        .ok_or_else(invalid)?;
    TimeDelta::try_seconds(seconds).ok_or_else(invalid)
}

/// Expands the range shorthand used by `--fcst-hrs` and `--members`:
/// one value is itself, two values are an inclusive `start..=stop`, three
/// values are an inclusive `start..=stop` by `step`, more values are taken
/// as given.
pub fn expand_range(values: &[i64]) -> Result<Vec<i64>, RetrieveError> {
    let describe = || {
        values
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    };
    match values {
        [] => Err(RetrieveError::InvalidRange("no values given".to_string())),
        [start, stop] | [start, stop, _] => {
            let step = values.get(2).copied().unwrap_or(1);
            if step <= 0 {
                return Err(RetrieveError::InvalidRange(format!(
                    "{}: step must be positive",
                    describe()
                )));
            }
            let step = usize::try_from(step)
                .map_err(|_| RetrieveError::InvalidRange(describe()))?;
            Ok((*start..=*stop).step_by(step).collect())
        }
        _ => Ok(values.to_vec()),
    }
}

/// Parses `--fcst-hrs` tokens. Integer tokens follow the range shorthand;
/// any token in `h:m[:s]` form makes the list explicit.
pub fn parse_lead_times(tokens: &[String]) -> Result<Vec<TimeDelta>, RetrieveError> {
    if tokens.iter().any(|token| token.contains(':')) {
        return tokens.iter().map(|token| parse_lead_time(token)).collect();
    }
    let hours = parse_integers(tokens, RetrieveError::InvalidLeadTime)?;
    expand_range(&hours)?
        .into_iter()
        .map(|hour| {
            TimeDelta::try_hours(hour)
                .ok_or_else(|| RetrieveError::InvalidLeadTime(hour.to_string()))
        })
        .collect()
}

/// Member value accepted on the command line for "no ensemble dimension".
pub const NO_ENSEMBLE: i64 = -999;

/// Parses `--members` tokens with the range shorthand. No tokens, or the
/// single value [`NO_ENSEMBLE`], means the request has no ensemble dimension.
pub fn parse_members(tokens: &[String]) -> Result<Vec<Member>, RetrieveError> {
    if tokens.is_empty() {
        return Ok(vec![Member::Deterministic]);
    }
    let values = parse_integers(tokens, RetrieveError::InvalidRange)?;
    if values == [NO_ENSEMBLE] {
        return Ok(vec![Member::Deterministic]);
    }
    expand_range(&values)?
        .into_iter()
        .map(|value| {
            u32::try_from(value)
                .map(Member::Ensemble)
                .map_err(|_| RetrieveError::InvalidRange(format!("invalid member {value}")))
        })
        .collect()
}

fn parse_integers(
    tokens: &[String],
    error: fn(String) -> RetrieveError,
) -> Result<Vec<i64>, RetrieveError> {
    tokens
        .iter()
        .flat_map(|token| token.split_whitespace())
        .map(|token| token.parse::<i64>().map_err(|_| error(token.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_cycle_spellings() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 4, 0, 0, 0).unwrap();
        assert_eq!(parse_cycle("2025-05-04T00").unwrap(), expected);
        assert_eq!(parse_cycle("2025-05-04T00:00:00").unwrap(), expected);
        assert_eq!(parse_cycle("2025050400").unwrap(), expected);
        assert_eq!(parse_cycle("2025-05-04").unwrap(), expected);
    }

    #[test]
    fn parse_cycle_keeps_wall_clock_of_offsets() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 4, 2, 0, 0).unwrap();
        assert_eq!(parse_cycle("2025-05-04T02:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_cycle("2025-05-04T02:00:00Z").unwrap(), expected);
    }

    #[test]
    fn parse_cycle_invalid() {
        let err = parse_cycle("yesterday").unwrap_err();
        assert_matches!(err, RetrieveError::InvalidCycle(_));
    }

    #[test]
    fn lead_time_components() {
        assert_eq!(parse_lead_time("6").unwrap(), TimeDelta::hours(6));
        assert_eq!(
            parse_lead_time("1:30").unwrap(),
            TimeDelta::minutes(90)
        );
        assert_eq!(parse_lead_time("0:0:45").unwrap(), TimeDelta::seconds(45));
        assert_matches!(parse_lead_time("six"), Err(RetrieveError::InvalidLeadTime(_)));
    }

    #[test]
    fn range_shorthand() {
        assert_eq!(expand_range(&[6]).unwrap(), vec![6]);
        assert_eq!(expand_range(&[0, 3]).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(expand_range(&[0, 12, 6]).unwrap(), vec![0, 6, 12]);
        assert_eq!(expand_range(&[1, 5, 9, 13]).unwrap(), vec![1, 5, 9, 13]);
        assert_matches!(expand_range(&[0, 6, 0]), Err(RetrieveError::InvalidRange(_)));
    }

    #[test]
    fn member_prefix() {
        assert_eq!(Member::Ensemble(2).prefix(), "mem002/");
        assert_eq!(Member::Deterministic.prefix(), "");
        assert_eq!(parse_members(&[]).unwrap(), vec![Member::Deterministic]);
        assert_eq!(
            parse_members(&["-999".to_string()]).unwrap(),
            vec![Member::Deterministic]
        );
        assert_eq!(
            parse_members(&["1".to_string(), "3".to_string()]).unwrap(),
            vec![Member::Ensemble(1), Member::Ensemble(2), Member::Ensemble(3)]
        );
    }
}
