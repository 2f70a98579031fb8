//! Capacity ranges over the sharding-key domain
//!
//! A region owns one or more half-open intervals `[start, end)`. The textual
//! form used in configuration is a comma separated list such as
//! `"0-1000000,2000000-3000000"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TopologyError;

/// Half-open key interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: u64,
    pub end: u64,
}

impl KeyRange {
    /// Create a range, rejecting empty or inverted bounds
    pub fn new(start: u64, end: u64) -> Result<Self, TopologyError> {
        if end <= start {
            return Err(TopologyError::InvalidCapacity {
                input: format!("{}-{}", start, end),
                reason: "end must be greater than start".to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Check if a position falls in this range
    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end
    }

    /// Number of positions covered
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Union of disjoint key ranges, kept sorted by start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capacity {
    ranges: Vec<KeyRange>,
}

impl Capacity {
    /// Build a capacity from ranges. The ranges must not overlap each other.
    pub fn new(mut ranges: Vec<KeyRange>) -> Result<Self, TopologyError> {
        if ranges.is_empty() {
            return Err(TopologyError::InvalidCapacity {
                input: String::new(),
                reason: "at least one range is required".to_string(),
            });
        }
        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(TopologyError::InvalidCapacity {
                    input: format!("{},{}", pair[0], pair[1]),
                    reason: "ranges overlap".to_string(),
                });
            }
        }
        Ok(Self { ranges })
    }

    /// Single-interval capacity
    pub fn single(start: u64, end: u64) -> Result<Self, TopologyError> {
        Self::new(vec![KeyRange::new(start, end)?])
    }

    /// Parse `"start-end,start-end"`
    pub fn parse(input: &str) -> Result<Self, TopologyError> {
        let invalid = |reason: &str| TopologyError::InvalidCapacity {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let mut ranges = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid("empty range"));
            }
            let (start, end) = part
                .split_once('-')
                .ok_or_else(|| invalid("expected start-end"))?;
            let start: u64 = start
                .trim()
                .parse()
                .map_err(|_| invalid("start must be a non-negative integer"))?;
            let end: u64 = end
                .trim()
                .parse()
                .map_err(|_| invalid("end must be a non-negative integer"))?;
            if end <= start {
                return Err(invalid("end must be greater than start"));
            }
            ranges.push(KeyRange { start, end });
        }

        Self::new(ranges).map_err(|e| match e {
            TopologyError::InvalidCapacity { reason, .. } => invalid(&reason),
            other => other,
        })
    }

    /// Check if a position falls in any of the ranges
    pub fn contains(&self, position: u64) -> bool {
        // Rightmost range whose start is <= position
        let idx = self.ranges.partition_point(|r| r.start <= position);
        idx > 0 && self.ranges[idx - 1].contains(position)
    }

    pub fn ranges(&self) -> &[KeyRange] {
        &self.ranges
    }

    /// Lowest covered position
    pub fn start(&self) -> u64 {
        self.ranges.first().map(|r| r.start).unwrap_or(0)
    }

    /// One past the highest covered position
    pub fn end(&self) -> u64 {
        self.ranges.last().map(|r| r.end).unwrap_or(0)
    }

    pub fn overlaps(&self, other: &Capacity) -> bool {
        self.ranges
            .iter()
            .any(|a| other.ranges.iter().any(|b| a.overlaps(b)))
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

impl FromStr for Capacity {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Capacity {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Capacity> for String {
    fn from(capacity: Capacity) -> Self {
        capacity.to_string()
    }
}
