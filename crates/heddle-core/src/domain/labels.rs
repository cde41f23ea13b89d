//! Label metadata: pause switch, deadline and dispatch rate.
//!
//! Stored in the queue backend as a flat string hash so any backend with
//! hash support can hold it:
//!
//! | field           | encoding             |
//! |-----------------|----------------------|
//! | `paused`        | `"1"` / `"0"`        |
//! | `deadline`      | RFC 3339 timestamp   |
//! | `rate`          | tasks per second     |
//! | `allowed_after` | RFC 3339 timestamp   |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Slowest accepted dispatch rate: one task per day.
pub const MIN_RATE: f64 = 1.0 / 86_400.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelMeta {
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Earliest time the next task carrying this label may be handed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_after: Option<DateTime<Utc>>,
}

/// Per-label decision made when a worker picks a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelGate {
    Open,
    /// Leave the task in the ready queue for now.
    Hold,
    /// The label's deadline has passed; the task is cancelled.
    Expired(String),
}

/// Partial update for `Label.update`. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelUpdate {
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Tasks per second; `0` removes the limit.
    #[serde(default)]
    pub rate: Option<f64>,
}

impl LabelUpdate {
    /// A rate must be `0` or a finite number of at least [`MIN_RATE`].
    pub fn validate(&self) -> Result<(), String> {
        match self.rate {
            Some(rate) if rate != 0.0 && !(rate.is_finite() && rate >= MIN_RATE) => Err(format!(
                "rate must be 0 or a finite value >= {MIN_RATE}, got {rate}"
            )),
            _ => Ok(()),
        }
    }
}

impl LabelMeta {
    pub fn apply(&mut self, update: &LabelUpdate) {
        if let Some(paused) = update.paused {
            self.paused = paused;
        }
        if let Some(deadline) = update.deadline {
            self.deadline = Some(deadline);
        }
        if let Some(rate) = update.rate {
            if rate > 0.0 {
                self.rate = Some(rate);
            } else {
                self.rate = None;
                self.allowed_after = None;
            }
        }
    }

    pub fn gate(&self, label: &str, now: DateTime<Utc>) -> LabelGate {
        if self.deadline.is_some_and(|deadline| now > deadline) {
            return LabelGate::Expired(label.to_string());
        }
        if self.paused {
            return LabelGate::Hold;
        }
        if self.rate.is_some() && self.allowed_after.is_some_and(|after| now < after) {
            return LabelGate::Hold;
        }
        LabelGate::Open
    }

    /// Advance `allowed_after` after a dispatch. Returns `false` when the
    /// label has no rate limit and nothing needs to be written.
    pub fn note_dispatch(&mut self, now: DateTime<Utc>) -> bool {
        let Some(rate) = self.rate else {
            return false;
        };
        // stored rates bypass validation; clamp so the interval stays in range
        let interval_us = (1_000_000.0 / rate.max(MIN_RATE)).round() as i64;
        let after = now
            .checked_add_signed(chrono::Duration::microseconds(interval_us))
            .unwrap_or(now);
        self.allowed_after = Some(after);
        true
    }

    /// Every field is written, absent ones as `""`, so an `hset` also clears
    /// fields that were removed.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let timestamp = |t: Option<DateTime<Utc>>| t.map(|t| t.to_rfc3339()).unwrap_or_default();
        vec![
            ("paused".into(), if self.paused { "1" } else { "0" }.into()),
            ("deadline".into(), timestamp(self.deadline)),
            (
                "rate".into(),
                self.rate.map(|r| r.to_string()).unwrap_or_default(),
            ),
            ("allowed_after".into(), timestamp(self.allowed_after)),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, String> {
        let timestamp = |key: &str| -> Result<Option<DateTime<Utc>>, String> {
            fields
                .get(key)
                .filter(|v| !v.is_empty())
                .map(|v| {
                    DateTime::parse_from_rfc3339(v)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| format!("label field {key}: {e}"))
                })
                .transpose()
        };
        let rate = fields
            .get("rate")
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<f64>().map_err(|e| format!("label field rate: {e}")))
            .transpose()?;

        Ok(Self {
            paused: fields.get("paused").is_some_and(|v| v == "1"),
            deadline: timestamp("deadline")?,
            rate,
            allowed_after: timestamp("allowed_after")?,
        })
    }
}
