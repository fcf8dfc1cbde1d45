//! Filter/function helper registry
//!
//! A closed set of pure value-transformation helpers callable from mapping
//! expressions, either as filter pipes (`name|splitlast`) or as function
//! calls (`nonejoin(a, b)`). The registry is a static name-to-function
//! mapping; adding an entry here is the only change needed to expose a new
//! helper, the expression front end and resolver stay untouched.

use std::fmt::Write as _;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::resolver::{is_truthy, render};

/// A registry entry: positional arguments plus keyword arguments, fully
/// resolved by the caller. When invoked as a filter pipe the piped-in value
/// is the first positional argument.
pub(crate) type Helper = fn(&[Value], &[(String, Value)]) -> Result<Value>;

/// Look up a helper by name.
pub(crate) fn lookup(name: &str) -> Option<Helper> {
    let helper: Helper = match name {
        "splitfirst" => splitfirst,
        "splitlast" => splitlast,
        "strftime" => strftime,
        "nonejoin" => nonejoin,
        "first" => first,
        "last" => last,
        "strip_non_digits" => strip_non_digits,
        "remove_curly_brackets" => remove_curly_brackets,
        "bitwise_and" => bitwise_and,
        "minimum" => minimum,
        _ => return None,
    };
    Some(helper)
}

fn format_error(helper: &str, message: impl Into<String>) -> Error {
    Error::Format {
        helper: helper.to_string(),
        message: message.into(),
    }
}

fn require_arg<'a>(helper: &str, args: &'a [Value], index: usize) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| format_error(helper, format!("missing argument {}", index + 1)))
}

fn check_kwargs(helper: &str, kwargs: &[(String, Value)], allowed: &[&str]) -> Result<()> {
    for (name, _) in kwargs {
        if !allowed.contains(&name.as_str()) {
            return Err(format_error(
                helper,
                format!("unexpected keyword argument '{name}'"),
            ));
        }
    }
    Ok(())
}

/// Separator for the split helpers: second positional argument or
/// `separator=` keyword, defaulting to a single space.
fn separator(helper: &str, args: &[Value], kwargs: &[(String, Value)]) -> Result<String> {
    let value = args
        .get(1)
        .or_else(|| kwargs.iter().find(|(k, _)| k == "separator").map(|(_, v)| v));
    match value {
        None => Ok(" ".to_string()),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => Err(format_error(
            helper,
            format!("separator must be a non-empty string, got {other}"),
        )),
    }
}

/// Split at the first separator into `[first, rest]`.
///
/// Convenient for splitting a name into a given name and a surname; with no
/// separator present the rest is empty, and a null or empty input yields two
/// empty strings.
fn splitfirst(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("splitfirst", kwargs, &["separator"])?;
    let sep = separator("splitfirst", args, kwargs)?;
    let text = render(require_arg("splitfirst", args, 0)?);
    let parts = match text.split_once(&sep) {
        Some((head, tail)) => [head.to_string(), tail.to_string()],
        None => [text, String::new()],
    };
    Ok(Value::from(parts.to_vec()))
}

/// Split at the last separator into `[rest, last]`.
///
/// With no separator present the leading part is empty, and a null or empty
/// input yields two empty strings.
fn splitlast(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("splitlast", kwargs, &["separator"])?;
    let sep = separator("splitlast", args, kwargs)?;
    let text = render(require_arg("splitlast", args, 0)?);
    let parts = match text.rsplit_once(&sep) {
        Some((head, tail)) => [head.to_string(), tail.to_string()],
        None => [String::new(), text],
    };
    Ok(Value::from(parts.to_vec()))
}

/// Format a datetime-like value through a chrono format pattern.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DDTHH:MM:SS` /
/// `YYYY-MM-DD HH:MM:SS` naive datetimes and plain `YYYY-MM-DD` dates.
fn strftime(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("strftime", kwargs, &[])?;
    let value = require_arg("strftime", args, 0)?;
    let pattern = match require_arg("strftime", args, 1)? {
        Value::String(s) => s,
        other => {
            return Err(format_error(
                "strftime",
                format!("format pattern must be a string, got {other}"),
            ));
        }
    };

    let text = value
        .as_str()
        .ok_or_else(|| format_error("strftime", format!("{value} is not a datetime")))?;

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return render_formatted(dt.format(pattern));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(text, fmt) {
            return render_formatted(dt.format(pattern));
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return render_formatted(date.and_time(chrono::NaiveTime::MIN).format(pattern));
    }
    Err(format_error(
        "strftime",
        format!("'{text}' is not a datetime"),
    ))
}

fn render_formatted(formatted: impl std::fmt::Display) -> Result<Value> {
    // chrono reports a bad format specifier as a fmt error while writing
    let mut out = String::new();
    write!(out, "{formatted}").map_err(|_| format_error("strftime", "invalid format pattern"))?;
    Ok(Value::String(out))
}

/// Join all truthy arguments with a separator (`sep=","` by default).
///
/// Null, empty strings, zero, `false` and empty collections are skipped;
/// with nothing left the result is the empty string.
fn nonejoin(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("nonejoin", kwargs, &["sep"])?;
    let sep = match kwargs.iter().find(|(k, _)| k == "sep").map(|(_, v)| v) {
        None => ",".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(format_error(
                "nonejoin",
                format!("sep must be a string, got {other}"),
            ));
        }
    };
    let joined = args
        .iter()
        .filter(|v| is_truthy(v))
        .map(render)
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(Value::String(joined))
}

/// First element of a list, or first character of a string.
fn first(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("first", kwargs, &[])?;
    match require_arg("first", args, 0)? {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(Value::String(s.chars().take(1).collect())),
        other => Err(format_error(
            "first",
            format!("expects a sequence, got {other}"),
        )),
    }
}

/// Last element of a list, or last character of a string.
fn last(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("last", kwargs, &[])?;
    match require_arg("last", args, 0)? {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(Value::String(
            s.chars().last().map(String::from).unwrap_or_default(),
        )),
        other => Err(format_error(
            "last",
            format!("expects a sequence, got {other}"),
        )),
    }
}

/// Keep only the ASCII digits of a string; non-string input gives null.
///
/// Typically applied to identity numbers arriving with embedded dashes,
/// e.g. `{{source.employeeNumber|strip_non_digits}}`.
fn strip_non_digits(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("strip_non_digits", kwargs, &[])?;
    match require_arg("strip_non_digits", args, 0)? {
        Value::String(s) => Ok(Value::String(
            s.chars().filter(char::is_ascii_digit).collect(),
        )),
        _ => Ok(Value::Null),
    }
}

/// Remove all `{` and `}` characters, e.g. from brace-wrapped GUIDs.
fn remove_curly_brackets(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("remove_curly_brackets", kwargs, &[])?;
    let text = render(require_arg("remove_curly_brackets", args, 0)?);
    Ok(Value::String(text.replace(['{', '}'], "")))
}

/// Bitwise and of two integers. Mostly useful for reading individual bits
/// out of `userAccountControl`.
fn bitwise_and(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("bitwise_and", kwargs, &[])?;
    let input = int_arg("bitwise_and", args, 0)?;
    let bitmask = int_arg("bitwise_and", args, 1)?;
    Ok(Value::from(input & bitmask))
}

fn int_arg(helper: &str, args: &[Value], index: usize) -> Result<i64> {
    let value = require_arg(helper, args, index)?;
    value
        .as_i64()
        .ok_or_else(|| format_error(helper, format!("expects an integer, got {value}")))
}

/// Null-tolerant minimum: a null side yields the other value. Numbers
/// compare numerically, strings lexicographically (which is chronological
/// for ISO dates).
fn minimum(args: &[Value], kwargs: &[(String, Value)]) -> Result<Value> {
    check_kwargs("minimum", kwargs, &[])?;
    let a = require_arg("minimum", args, 0)?;
    let b = require_arg("minimum", args, 1)?;
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Number(x), Value::Number(y)) => {
            let b_smaller = x
                .as_f64()
                .zip(y.as_f64())
                .map(|(xf, yf)| yf < xf)
                .unwrap_or(false);
            Ok(if b_smaller { b.clone() } else { a.clone() })
        }
        (Value::String(x), Value::String(y)) => {
            Ok(Value::String(if y < x { y.clone() } else { x.clone() }))
        }
        _ => Err(format_error(
            "minimum",
            format!("cannot compare {a} and {b}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> Result<Value> {
        lookup(name).unwrap()(args, &[])
    }

    #[rstest]
    #[case("Anne Marie Jensen", json!(["Anne", "Marie Jensen"]))]
    #[case("Single", json!(["Single", ""]))]
    #[case("", json!(["", ""]))]
    fn test_splitfirst(#[case] input: &str, #[case] expected: Value) {
        assert_eq!(call("splitfirst", &[json!(input)]).unwrap(), expected);
    }

    #[rstest]
    #[case("Anne Marie Jensen", json!(["Anne Marie", "Jensen"]))]
    #[case("Single", json!(["", "Single"]))]
    #[case("", json!(["", ""]))]
    fn test_splitlast(#[case] input: &str, #[case] expected: Value) {
        assert_eq!(call("splitlast", &[json!(input)]).unwrap(), expected);
    }

    #[test]
    fn test_split_of_null_gives_empty_pair() {
        assert_eq!(
            call("splitfirst", &[Value::Null]).unwrap(),
            json!(["", ""])
        );
        assert_eq!(call("splitlast", &[Value::Null]).unwrap(), json!(["", ""]));
    }

    #[test]
    fn test_split_with_custom_separator() {
        assert_eq!(
            call("splitfirst", &[json!("a/b/c"), json!("/")]).unwrap(),
            json!(["a", "b/c"])
        );
        assert_eq!(
            call("splitlast", &[json!("a/b/c"), json!("/")]).unwrap(),
            json!(["a/b", "c"])
        );
    }

    #[test]
    fn test_split_rejects_non_string_separator() {
        let err = call("splitfirst", &[json!("a b"), json!(3)]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_nonejoin_skips_falsy_values() {
        let result = call(
            "nonejoin",
            &[json!("a"), Value::Null, json!("b"), json!(""), json!(0)],
        )
        .unwrap();
        assert_eq!(result, json!("a,b"));
    }

    #[test]
    fn test_nonejoin_all_falsy_gives_empty_string() {
        let result = call("nonejoin", &[Value::Null, json!(""), json!(false), json!([])]).unwrap();
        assert_eq!(result, json!(""));
    }

    #[test]
    fn test_nonejoin_custom_separator() {
        let helper = lookup("nonejoin").unwrap();
        let kwargs = vec![("sep".to_string(), json!(" / "))];
        let result = helper(&[json!("Unit"), json!("Team")], &kwargs).unwrap();
        assert_eq!(result, json!("Unit / Team"));
    }

    #[test]
    fn test_nonejoin_rejects_unknown_kwarg() {
        let helper = lookup("nonejoin").unwrap();
        let kwargs = vec![("glue".to_string(), json!("-"))];
        assert!(helper(&[json!("a")], &kwargs).is_err());
    }

    #[rstest]
    #[case("2021-01-01T12:30:00", "%Y-%m-%d", "2021-01-01")]
    #[case("2021-01-01 12:30:00", "%H:%M", "12:30")]
    #[case("2021-01-01", "%d/%m/%Y", "01/01/2021")]
    #[case("2021-06-01T00:00:00+02:00", "%Y-%m-%dT00:00:00", "2021-06-01T00:00:00")]
    fn test_strftime(#[case] input: &str, #[case] pattern: &str, #[case] expected: &str) {
        let result = call("strftime", &[json!(input), json!(pattern)]).unwrap();
        assert_eq!(result, json!(expected));
    }

    #[test]
    fn test_strftime_rejects_non_datetime() {
        let err = call("strftime", &[json!("not a date"), json!("%Y")]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));

        let err = call("strftime", &[json!(17), json!("%Y")]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_first_and_last() {
        assert_eq!(call("first", &[json!(["a", "b"])]).unwrap(), json!("a"));
        assert_eq!(call("last", &[json!(["a", "b"])]).unwrap(), json!("b"));
        assert_eq!(call("first", &[json!("abc")]).unwrap(), json!("a"));
        assert_eq!(call("last", &[json!("abc")]).unwrap(), json!("c"));
        assert_eq!(call("first", &[json!([])]).unwrap(), Value::Null);
        assert_eq!(call("first", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_strip_non_digits() {
        assert_eq!(
            call("strip_non_digits", &[json!("60-01-01-1234")]).unwrap(),
            json!("6001011234")
        );
        assert_eq!(call("strip_non_digits", &[json!("abc")]).unwrap(), json!(""));
        assert_eq!(call("strip_non_digits", &[json!(123)]).unwrap(), Value::Null);
        assert_eq!(
            call("strip_non_digits", &[Value::Null]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_remove_curly_brackets() {
        assert_eq!(
            call(
                "remove_curly_brackets",
                &[json!("{1caa2a34-ddd9-4b66-9af3-1c1462986b1a}")]
            )
            .unwrap(),
            json!("1caa2a34-ddd9-4b66-9af3-1c1462986b1a")
        );
        assert_eq!(call("remove_curly_brackets", &[Value::Null]).unwrap(), json!(""));
    }

    #[test]
    fn test_bitwise_and() {
        // bit 2 of userAccountControl is ACCOUNTDISABLE
        assert_eq!(call("bitwise_and", &[json!(514), json!(2)]).unwrap(), json!(2));
        assert_eq!(call("bitwise_and", &[json!(512), json!(2)]).unwrap(), json!(0));

        let err = call("bitwise_and", &[json!("514"), json!(2)]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_minimum() {
        assert_eq!(call("minimum", &[json!(2), json!(3)]).unwrap(), json!(2));
        assert_eq!(call("minimum", &[json!(3), json!(2)]).unwrap(), json!(2));
        assert_eq!(call("minimum", &[Value::Null, json!(3)]).unwrap(), json!(3));
        assert_eq!(call("minimum", &[json!(3), Value::Null]).unwrap(), json!(3));
        assert_eq!(
            call("minimum", &[Value::Null, Value::Null]).unwrap(),
            Value::Null
        );
        assert_eq!(
            call("minimum", &[json!("2021-06-01"), json!("2020-01-01")]).unwrap(),
            json!("2020-01-01")
        );

        let err = call("minimum", &[json!(1), json!("x")]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_lookup_unknown_name() {
        assert!(lookup("uppercase").is_none());
    }
}
