//! Cardinality parsing for blueprint layout selectors.
//!
//! A cardinality is an inclusive `[from, to]` bound on how many candidates a
//! selector may pick, where the upper bound may be infinite. Accepted input
//! shapes: a non-negative integer, a string shorthand (`"2"`, `"2+"`, `"*"`,
//! `"?"`), or a two-element `[from, to]` array whose upper bound may be
//! `"*"`, `"Infinity"`, or `null` for unbounded.
//!
//! Malformed input is a configuration error and fails fast; bounds are never
//! silently clamped.

use crate::core::error::{CovenantError, Result};
use serde_json::Value;

/// An inclusive occupancy bound. `to: None` marks an infinite upper end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cardinality {
    pub from: u64,
    pub to: Option<u64>,
}

fn finite_bound(value: &Value, input: &Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        CovenantError::InvalidCardinality(format!(
            "bound must be a non-negative integer in {input}"
        ))
    })
}

impl Cardinality {
    /// Parses a cardinality specification.
    pub fn parse(input: &Value) -> Result<Self> {
        match input {
            Value::Number(_) => {
                let n = finite_bound(input, input)?;
                Ok(Self {
                    from: n,
                    to: Some(n),
                })
            }
            Value::String(spec) => Self::parse_shorthand(spec.trim(), input),
            Value::Array(pair) if pair.len() == 2 => {
                let from = finite_bound(&pair[0], input)?;
                let to = match &pair[1] {
                    Value::Null => None,
                    Value::String(s) if s == "*" || s == "Infinity" => None,
                    bound => Some(finite_bound(bound, input)?),
                };
                if let Some(to) = to {
                    if from > to {
                        return Err(CovenantError::InvalidCardinality(format!(
                            "inverted range in {input}"
                        )));
                    }
                }
                Ok(Self { from, to })
            }
            other => Err(CovenantError::InvalidCardinality(format!(
                "unsupported specification: {other}"
            ))),
        }
    }

    fn parse_shorthand(spec: &str, input: &Value) -> Result<Self> {
        match spec {
            "*" => Ok(Self { from: 0, to: None }),
            "?" | "1?" => Ok(Self {
                from: 0,
                to: Some(1),
            }),
            _ => {
                if let Some(prefix) = spec.strip_suffix('+') {
                    let from = prefix.parse::<u64>().map_err(|_| {
                        CovenantError::InvalidCardinality(format!(
                            "malformed shorthand: {input}"
                        ))
                    })?;
                    return Ok(Self { from, to: None });
                }
                let n = spec.parse::<u64>().map_err(|_| {
                    CovenantError::InvalidCardinality(format!("malformed shorthand: {input}"))
                })?;
                Ok(Self {
                    from: n,
                    to: Some(n),
                })
            }
        }
    }

    /// True when the upper bound is a concrete integer.
    pub fn is_finite(&self) -> bool {
        self.to.is_some()
    }
}
