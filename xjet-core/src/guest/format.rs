// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `printf`-style formatting for `each`-expanded names and log arguments (§4.G.3).

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn dollar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(#|[A-Za-z_][A-Za-z0-9_.]*)").expect("static pattern"))
}

/// Expands a `describe.each`/`test.each` name template for one row.
///
/// First pass (only applied when the template has no literal `%%`, matching the source's own
/// gating): replaces `$dotted.path` references into `params[0]` (an object row) and `$#` with
/// `index`. Second pass processes the `%s %d %i %f %j %o %p %# %%` specifiers in order,
/// consuming `params` positionally (§8 testable property 8).
pub fn printf(template: &str, params: &[Value], index: usize) -> String {
    let after_dollar = if template.contains("%%") {
        template.to_string()
    } else {
        substitute_dollar_refs(template, params, index)
    };
    apply_percent_specifiers(&after_dollar, params, index)
}

fn substitute_dollar_refs(template: &str, params: &[Value], index: usize) -> String {
    dollar_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let path = &caps[1];
            if path == "#" {
                return index.to_string();
            }
            match params.first() {
                Some(row) => resolve_dotted_path(row, path)
                    .map(|v| format_value(v))
                    .unwrap_or_else(|| format!("${path}")),
                None => format!("${path}"),
            }
        })
        .into_owned()
}

fn resolve_dotted_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn apply_percent_specifiers(template: &str, params: &[Value], index: usize) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut params = params.iter();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('#') => out.push_str(&index.to_string()),
            Some(spec @ ('s' | 'd' | 'i' | 'f' | 'j' | 'o' | 'p')) => match params.next() {
                Some(value) => out.push_str(&format_specifier(spec, value)),
                None => {
                    out.push('%');
                    out.push(spec);
                }
            },
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

fn format_specifier(spec: char, value: &Value) -> String {
    match spec {
        's' => match value {
            Value::String(s) => s.clone(),
            other => format_value(other),
        },
        'd' | 'i' => match value.as_i64() {
            Some(n) => n.to_string(),
            None => value
                .as_f64()
                .map(|f| (f as i64).to_string())
                .unwrap_or_else(|| "NaN".to_string()),
        },
        'f' => value
            .as_f64()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "NaN".to_string()),
        'j' => serde_json::to_string(value).unwrap_or_default(),
        'o' | 'p' => format_value(value),
        _ => unreachable!("guarded by caller"),
    }
}

/// Formats a single log/printf argument the way the guest's `formatValue` does: primitives
/// render as their bare `String(v)` form, everything else pretty-prints as 2-space JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn dollar_dotted_path_resolves_from_first_row() {
        let params = [json!({"a": {"b": 42}})];
        assert_eq!(printf("$a.b", &params, 0), "42");
    }

    #[test]
    fn percent_hash_is_index() {
        assert_eq!(printf("%#", &[], 3), "3");
    }

    #[test]
    fn percent_percent_is_literal_and_disables_dollar_pass() {
        assert_eq!(printf("%%", &[], 0), "%");
        let params = [json!({"a": 1})];
        assert_eq!(printf("$a.b %%", &params, 0), "$a.b %");
    }

    #[test_case("%d + %d", &[json!(1), json!(2)], 0, "1 + 2"; "percent d consumes positionally")]
    #[test_case("%s world", &[json!("hello")], 0, "hello world"; "percent s uses raw string")]
    #[test_case("%j", &[json!({"x": 1})], 0, r#"{"x":1}"#; "percent j stringifies json")]
    #[test_case("%i", &[json!(7.9)], 0, "7"; "percent i truncates float")]
    #[test_case("%f", &[json!(1.5)], 0, "1.5"; "percent f renders float")]
    fn printf_specifier_table(template: &str, params: &[Value], index: usize, expected: &str) {
        assert_eq!(printf(template, params, index), expected);
    }

    #[test_case(json!(null), "null"; "null renders bare")]
    #[test_case(json!(42), "42"; "number renders bare")]
    #[test_case(json!("hi"), "hi"; "string renders bare")]
    fn format_value_primitives_render_bare(value: Value, expected: &str) {
        assert_eq!(format_value(&value), expected);
    }

    #[test]
    fn format_value_objects_pretty_print() {
        let rendered = format_value(&json!({"a": 1}));
        assert!(rendered.contains('\n'));
    }
}
