//! Strategies for partitioning one content slice into task configurations.
//!
//! Every strategy is a pure function of its input: the same slice and
//! count always yield the same configurations in the same order.

use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{One, ToPrimitive};
use serde::Deserialize;

use crate::config::Configuration;
use crate::error::PluginError;

pub trait SplitStrategy: Send + Sync {
    fn split(&self, slice: &Configuration, number: usize) -> Result<Vec<Configuration>, PluginError>;
}

/// The slice unchanged, whatever the requested count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSplit;

impl SplitStrategy for SingleSplit {
    fn split(&self, slice: &Configuration, _number: usize) -> Result<Vec<Configuration>, PluginError> {
        Ok(vec![slice.clone()])
    }
}

/// `number` identical copies of the slice (at least one).
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicaSplit;

impl SplitStrategy for ReplicaSplit {
    fn split(&self, slice: &Configuration, number: usize) -> Result<Vec<Configuration>, PluginError> {
        Ok(vec![slice.clone(); number.max(1)])
    }
}

#[derive(Debug, Deserialize)]
struct KeyRange {
    key: String,
    range: Bounds,
}

#[derive(Debug, Deserialize)]
struct Bounds {
    left: String,
    right: String,
}

/// Contiguous integer key ranges over `parameter.split`:
///
/// ```json
/// "split": { "key": "id", "range": { "left": "1", "right": "1000" } }
/// ```
///
/// Each range becomes a predicate appended to `parameter.where`. A slice
/// without `parameter.split.key` is returned unchanged. A range holding
/// fewer keys than `number` yields one configuration per key.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyRangeSplit;

impl KeyRangeSplit {
    fn bounds(range: &KeyRange) -> Result<(BigInt, BigInt), PluginError> {
        let parse = |s: &str| {
            BigInt::from_str(s.trim()).map_err(|e| {
                PluginError::config(format!("split range bound '{s}' is not an integer: {e}"))
            })
        };
        let left = parse(&range.range.left)?;
        let right = parse(&range.range.right)?;
        if left > right {
            return Err(PluginError::config(format!(
                "split range left {left} is greater than right {right}"
            )));
        }
        Ok((left, right))
    }
}

impl SplitStrategy for KeyRangeSplit {
    fn split(&self, slice: &Configuration, number: usize) -> Result<Vec<Configuration>, PluginError> {
        if !slice.contains("parameter.split.key") {
            return Ok(vec![slice.clone()]);
        }
        let range: KeyRange = slice.decode("parameter.split")?;
        let (left, right) = Self::bounds(&range)?;
        let existing = slice.get_string_or("parameter.where", "")?;

        let total = &right - &left + BigInt::one();
        let n = BigInt::from(number.max(1)).min(total.clone());
        let step = &total / &n;
        let remainder = &total % &n;
        let count = n.to_usize().unwrap_or(1);

        let mut configs = Vec::with_capacity(count);
        let mut lo = left;
        for i in 0..count {
            let size = if BigInt::from(i) < remainder {
                &step + BigInt::one()
            } else {
                step.clone()
            };
            let hi = &lo + size;
            let predicate = if i + 1 == count {
                format!("{key} >= {lo} AND {key} <= {right}", key = range.key)
            } else {
                format!("{key} >= {lo} AND {key} < {hi}", key = range.key)
            };
            let clause = if existing.trim().is_empty() {
                predicate
            } else {
                format!("({existing}) AND ({predicate})")
            };

            let mut conf = slice.clone();
            conf.set("parameter.where", clause)?;
            configs.push(conf);
            lo = hi;
        }
        Ok(configs)
    }
}
