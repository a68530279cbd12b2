//! Budget-aware shaping of response payloads.
//!
//! Applies estimation and standard reduction to JSON payloads on their
//! way out. A top-level array is re-wrapped in a reduction envelope; an
//! object has its largest array fields reduced in place. Payloads that
//! are over budget with nothing left to reduce are reported so the
//! caller can answer with a resource-limit error.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::estimate::{estimate_object, estimate_tokens};
use crate::reduce::reduce;

/// What shaping did to a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeOutcome {
    /// Fit as-is.
    Unchanged,
    /// One or more collections were reduced; payload rewritten.
    Reduced {
        original_count: usize,
        returned_count: usize,
    },
    /// Over budget even after reducing everything reducible.
    OverBudget { estimated_tokens: usize },
}

/// A payload after shaping, with its final estimate.
#[derive(Debug, Clone)]
pub struct Shaped {
    pub payload: Value,
    pub estimated_tokens: usize,
    pub outcome: ShapeOutcome,
}

/// Shape `payload` to fit `token_limit`.
pub fn shape_to_budget(payload: Value, token_limit: usize) -> Shaped {
    let estimated = estimate_tokens(&payload);
    if estimated <= token_limit {
        return Shaped {
            payload,
            estimated_tokens: estimated,
            outcome: ShapeOutcome::Unchanged,
        };
    }
    match payload {
        Value::Array(items) => shape_array(items, token_limit),
        Value::Object(map) => shape_object(map, token_limit),
        other => Shaped {
            payload: other,
            estimated_tokens: estimated,
            outcome: ShapeOutcome::OverBudget {
                estimated_tokens: estimated,
            },
        },
    }
}

/// A reduced top-level array becomes this envelope so the caller can see
/// what was dropped.
fn shape_array(items: Vec<Value>, token_limit: usize) -> Shaped {
    let reduced = reduce(&items, estimate_tokens, token_limit);
    if !reduced.fits(token_limit) {
        return Shaped {
            payload: Value::Array(items),
            estimated_tokens: reduced.estimated_tokens,
            outcome: ShapeOutcome::OverBudget {
                estimated_tokens: reduced.estimated_tokens,
            },
        };
    }
    debug!(
        original = reduced.original_count,
        returned = reduced.items.len(),
        estimated_tokens = reduced.estimated_tokens,
        "reduced array payload"
    );
    let returned_count = reduced.items.len();
    let payload = json!({
        "items": reduced.items,
        "original_count": reduced.original_count,
        "returned_count": returned_count,
        "estimated_tokens": reduced.estimated_tokens,
        "truncated": true,
    });
    Shaped {
        payload,
        estimated_tokens: reduced.estimated_tokens,
        outcome: ShapeOutcome::Reduced {
            original_count: reduced.original_count,
            returned_count,
        },
    }
}

/// Reduce array fields largest-first, each getting whatever budget its
/// siblings leave over, until the object fits or nothing reducible
/// remains. Only top-level fields are considered.
fn shape_object(mut map: Map<String, Value>, token_limit: usize) -> Shaped {
    let mut reduced_fields: Vec<String> = Vec::new();
    let mut original_count = 0usize;
    let mut returned_count = 0usize;

    loop {
        let estimated = estimate_object(&map);
        if estimated <= token_limit {
            break;
        }

        let target = map
            .iter()
            .filter(|(key, value)| {
                value.as_array().is_some_and(|a| !a.is_empty())
                    && !reduced_fields.contains(key)
            })
            .max_by_key(|(_, value)| estimate_tokens(value))
            .map(|(key, _)| key.clone());

        let Some(field) = target else {
            return Shaped {
                payload: Value::Object(map),
                estimated_tokens: estimated,
                outcome: ShapeOutcome::OverBudget {
                    estimated_tokens: estimated,
                },
            };
        };

        let field_estimate = map.get(&field).map(estimate_tokens).unwrap_or(0);
        let Some(Value::Array(items)) = map.remove(&field) else {
            // Filter above only selects non-empty array fields.
            continue;
        };
        let field_budget = token_limit.saturating_sub(estimated - field_estimate);
        let r = reduce(&items, estimate_tokens, field_budget);
        debug!(
            field = %field,
            original = r.original_count,
            returned = r.items.len(),
            "reduced object field"
        );
        original_count += r.original_count;
        returned_count += r.items.len();
        map.insert(field.clone(), Value::Array(r.items));
        reduced_fields.push(field);
    }

    if reduced_fields.is_empty() {
        // Unreachable in practice: shape_to_budget only calls in when
        // over budget, and the loop either reduces or returns OverBudget.
        let estimated = estimate_object(&map);
        return Shaped {
            payload: Value::Object(map),
            estimated_tokens: estimated,
            outcome: ShapeOutcome::Unchanged,
        };
    }

    map.insert("truncated".to_string(), Value::Bool(true));
    let estimated = estimate_object(&map);
    Shaped {
        payload: Value::Object(map),
        estimated_tokens: estimated,
        outcome: ShapeOutcome::Reduced {
            original_count,
            returned_count,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_payload_unchanged() {
        let payload = json!({"status": "ok"});
        let shaped = shape_to_budget(payload.clone(), 1_000);
        assert_eq!(shaped.outcome, ShapeOutcome::Unchanged);
        assert_eq!(shaped.payload, payload);
    }

    #[test]
    fn test_array_reduced_into_envelope() {
        let items: Vec<Value> = (0..100).map(|i| json!({"n": i})).collect();
        let shaped = shape_to_budget(Value::Array(items), 60);
        match shaped.outcome {
            ShapeOutcome::Reduced {
                original_count,
                returned_count,
            } => {
                assert_eq!(original_count, 100);
                assert!(returned_count < 100);
                assert!(returned_count >= 1);
            }
            other => panic!("expected Reduced, got {:?}", other),
        }
        assert_eq!(shaped.payload["original_count"], json!(100));
        assert_eq!(shaped.payload["truncated"], json!(true));
        let kept = shaped.payload["items"].as_array().unwrap();
        // Prefix of the original order survives.
        assert_eq!(kept[0], json!({"n": 0}));
    }

    #[test]
    fn test_object_largest_array_field_reduced() {
        let payload = json!({
            "summary": "totals",
            "rows": (0..200).map(|i| json!({"row": i})).collect::<Vec<_>>(),
        });
        let shaped = shape_to_budget(payload, 120);
        assert!(matches!(shaped.outcome, ShapeOutcome::Reduced { .. }));
        let obj = shaped.payload.as_object().unwrap();
        assert_eq!(obj["summary"], json!("totals"));
        assert_eq!(obj["truncated"], json!(true));
        assert!(obj["rows"].as_array().unwrap().len() < 200);
        assert!(shaped.estimated_tokens <= 120);
    }

    #[test]
    fn test_scalar_over_budget_reported() {
        let long = "x".repeat(4_000);
        let shaped = shape_to_budget(json!(long), 10);
        assert!(matches!(shaped.outcome, ShapeOutcome::OverBudget { .. }));
    }

    #[test]
    fn test_array_floor_still_over_reported() {
        // Two items, each far over the limit on its own.
        let huge = "y".repeat(4_000);
        let items = vec![json!(huge.clone()), json!(huge)];
        let shaped = shape_to_budget(Value::Array(items), 10);
        assert!(matches!(shaped.outcome, ShapeOutcome::OverBudget { .. }));
    }

    #[test]
    fn test_object_without_arrays_over_budget() {
        let payload = json!({"blob": "z".repeat(2_000)});
        let shaped = shape_to_budget(payload, 20);
        assert!(matches!(shaped.outcome, ShapeOutcome::OverBudget { .. }));
    }
}
