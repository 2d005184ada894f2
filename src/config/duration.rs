// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Human readable durations ("300s", "5m", "500ms") for configuration values.
//!
//! Use with `#[serde(with = "crate::config::duration")]`. Plain integers are
//! interpreted as seconds.

use std::time::Duration;

use serde::{Deserializer, Serializer, de::Visitor};

type UnitFn = fn(u64) -> Duration;

fn from_minutes(v: u64) -> Duration {
    Duration::from_secs(v.saturating_mul(60))
}

fn from_hours(v: u64) -> Duration {
    Duration::from_secs(v.saturating_mul(3600))
}

const UNITS: &[(&str, UnitFn)] = &[
    ("ns", Duration::from_nanos),
    ("us", Duration::from_micros),
    ("ms", Duration::from_millis),
    ("s", Duration::from_secs),
    ("", Duration::from_secs),
    ("m", from_minutes),
    ("h", from_hours),
];

/// Deserialize a duration from a string like "1s", "5m" or a number of seconds.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a duration like \"30s\" or a number of seconds")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        parse(v).map_err(serde::de::Error::custom)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Duration::from_secs(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(v)
            .map(Duration::from_secs)
            .map_err(|_| serde::de::Error::custom(format!("negative duration: {v}")))
    }
}

/// Serialize a duration into the shortest exact string like "5m", "30s" or "500ms".
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(duration))
}

/// Parses a duration from a string.
pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid number in duration: {s}"))?;
    let unit = s[digits.len()..].trim();
    UNITS
        .iter()
        .find(|(u, _)| *u == unit)
        .map(|(_, f)| f(value))
        .ok_or_else(|| {
            let supported = UNITS
                .iter()
                .filter(|(u, _)| !u.is_empty())
                .map(|(u, _)| *u)
                .collect::<Vec<_>>()
                .join(", ");
            format!("Unknown duration unit '{unit}' only '{supported}' are supported")
        })
}

/// Formats a duration the way `parse` reads it.
pub fn format_duration(duration: &Duration) -> String {
    if duration.subsec_nanos() == 0 {
        let secs = duration.as_secs();
        match secs {
            0 => "0s".to_owned(),
            s if s % 3600 == 0 => format!("{}h", s / 3600),
            s if s % 60 == 0 => format!("{}m", s / 60),
            s => format!("{s}s"),
        }
    } else if duration.as_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}
