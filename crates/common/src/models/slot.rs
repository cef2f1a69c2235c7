use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ParseLabelError;

/// Scheduling unit: one time window of one calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub index: u32,
}

impl SlotKey {
    pub fn new(date: NaiveDate, index: u32) -> Self {
        Self { date, index }
    }

    /// Key under which the per-slot lease is taken.
    pub fn lease_key(&self) -> String {
        format!("slot:{}:{}", self.date.format("%Y-%m-%d"), self.index)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.date.format("%Y-%m-%d"), self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Empty,
    Filling,
    Closed,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::Filling => "FILLING",
            Self::Closed => "CLOSED",
        }
    }

    /// State a slot is in after holding `fill_count` of `capacity` signals.
    pub fn for_fill(fill_count: u32, capacity: u32) -> Self {
        if fill_count == 0 {
            Self::Empty
        } else if fill_count >= capacity {
            Self::Closed
        } else {
            Self::Filling
        }
    }
}

impl FromStr for SlotState {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(Self::Empty),
            "FILLING" => Ok(Self::Filling),
            "CLOSED" => Ok(Self::Closed),
            other => Err(ParseLabelError {
                kind: "slot state",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub key: SlotKey,
    pub state: SlotState,
    pub fill_count: u32,
}
