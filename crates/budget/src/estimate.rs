//! Token estimation heuristic.
//!
//! Approximates language-model token counts from the shape of a JSON
//! value without running a tokenizer. Deterministic and allocation-light:
//! large arrays are estimated from a bounded prefix/suffix sample, so the
//! cost stays O(sample) no matter how big the collection gets and the
//! same input always produces the same estimate.

use serde_json::{Map, Value};

// ── Constants ───────────────────────────────────────────────────────

/// Average characters per token for ordinary spaced text.
const CHARS_PER_TOKEN: usize = 4;

/// Dense text (minified JSON, base64, hex digests) tokenizes worse.
const DENSE_CHARS_PER_TOKEN: usize = 3;

/// Whitespace share below which text counts as dense.
const DENSE_WHITESPACE_RATIO: f64 = 0.05;

/// Minimum length before the density adjustment applies.
const DENSE_MIN_CHARS: usize = 16;

/// Fixed cost per object field (key quoting, separators).
const FIELD_OVERHEAD_TOKENS: usize = 2;

/// Arrays longer than this are sampled instead of walked.
const SAMPLE_THRESHOLD: usize = 32;

/// Elements taken from each end when sampling.
const SAMPLE_EACH_END: usize = 8;

// ── Estimation ──────────────────────────────────────────────────────

/// Estimate the token cost of a JSON value.
pub fn estimate_tokens(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(s) => estimate_text(s),
        Value::Array(items) => estimate_array(items),
        Value::Object(map) => estimate_object(map),
    }
}

/// Estimate the token cost of a plain string.
///
/// Roughly one token per four characters. Text with almost no whitespace
/// uses a denser ratio, and characters from scripts without word-breaking
/// spaces (CJK and friends) count as one token each.
pub fn estimate_text(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut narrow = 0usize;
    let mut wide = 0usize;
    let mut whitespace = 0usize;
    for ch in text.chars() {
        if is_non_spacing_script(ch) {
            wide += 1;
        } else {
            narrow += 1;
            if ch.is_whitespace() {
                whitespace += 1;
            }
        }
    }
    let divisor = if narrow >= DENSE_MIN_CHARS
        && (whitespace as f64) < (narrow as f64) * DENSE_WHITESPACE_RATIO
    {
        DENSE_CHARS_PER_TOKEN
    } else {
        CHARS_PER_TOKEN
    };
    narrow.div_ceil(divisor) + wide
}

/// Estimate an object's fields without wrapping them in a `Value`.
pub fn estimate_object(map: &Map<String, Value>) -> usize {
    if map.is_empty() {
        return 1;
    }
    map.iter()
        .map(|(key, value)| FIELD_OVERHEAD_TOKENS + estimate_text(key) + estimate_tokens(value))
        .sum()
}

fn estimate_array(items: &[Value]) -> usize {
    if items.is_empty() {
        return 1;
    }
    if items.len() <= SAMPLE_THRESHOLD {
        return items.iter().map(estimate_tokens).sum();
    }
    // Bounded sample: first and last SAMPLE_EACH_END elements, mean
    // scaled to the full length. Prefix/suffix keeps it deterministic.
    let head = items[..SAMPLE_EACH_END].iter();
    let tail = items[items.len() - SAMPLE_EACH_END..].iter();
    let sampled: usize = head.chain(tail).map(estimate_tokens).sum();
    (sampled * items.len()).div_ceil(SAMPLE_EACH_END * 2)
}

/// Scripts written without word-breaking spaces, counted one token per
/// character: CJK ideographs, kana, Hangul, full-width forms.
fn is_non_spacing_script(ch: char) -> bool {
    matches!(
        ch as u32,
        0x2E80..=0x9FFF      // CJK radicals, kana, unified ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
        | 0xFF00..=0xFFEF    // full-width forms
        | 0x20000..=0x2FA1F  // CJK extensions
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_string_is_free() {
        assert_eq!(estimate_text(""), 0);
    }

    #[test]
    fn test_short_string_rounds_up() {
        assert_eq!(estimate_text("hi"), 1);
        assert_eq!(estimate_text("word"), 1);
        assert_eq!(estimate_text("hello"), 2);
    }

    #[test]
    fn test_prose_uses_four_chars_per_token() {
        let prose = "the quick brown fox jumps over the lazy dog";
        assert_eq!(estimate_text(prose), prose.len().div_ceil(4));
    }

    #[test]
    fn test_dense_text_estimates_higher() {
        // 64 chars of hex, no whitespace.
        let dense = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
        assert_eq!(dense.len(), 64);
        let spaced = "a1b2 c3d4 e5f6 0718 293a 4b5c 6d7e 8f90 a1b2 c3d4 e5f6 0718 293";
        assert!(estimate_text(dense) > estimate_text(spaced));
        assert_eq!(estimate_text(dense), 64usize.div_ceil(3));
    }

    #[test]
    fn test_cjk_counts_per_character() {
        let ja = "こんにちは";
        assert_eq!(estimate_text(ja), 5);
        let mixed = "ab こんにちは";
        // 2 narrow ascii + 1 space = 1 token, plus 5 wide.
        assert_eq!(estimate_text(mixed), 6);
    }

    #[test]
    fn test_scalars() {
        assert_eq!(estimate_tokens(&json!(null)), 1);
        assert_eq!(estimate_tokens(&json!(true)), 1);
        assert_eq!(estimate_tokens(&json!(12345)), 2);
    }

    #[test]
    fn test_object_field_overhead() {
        let obj = json!({"id": 7});
        // 2 overhead + 1 for "id" + 2 for the number.
        assert_eq!(estimate_tokens(&obj), 5);
        assert_eq!(estimate_tokens(&json!({})), 1);
    }

    #[test]
    fn test_small_array_walks_every_element() {
        let arr = json!([1, 2, 3]);
        assert_eq!(estimate_tokens(&arr), 6);
    }

    #[test]
    fn test_large_array_sampled_estimate_scales() {
        // Uniform elements: the sampled mean matches the exact mean, so
        // the scaled estimate equals the exact sum.
        let items: Vec<Value> = (0..100).map(|_| json!("word")).collect();
        let est = estimate_tokens(&Value::Array(items));
        assert_eq!(est, 100);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let items: Vec<Value> =
            (0..500).map(|i| json!({"n": i, "label": "row"})).collect();
        let value = Value::Array(items);
        assert_eq!(estimate_tokens(&value), estimate_tokens(&value));
    }
}
