//! Placeholder interpolation for upstream URL templates.
//!
//! A placeholder is a name wrapped in braces, e.g. `{hostname}`. Names that
//! are not present in the value map are left in place, braces included, so a
//! misconfigured template shows up verbatim in the output. There is no escape
//! for literal braces.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Everything except RFC 3986 unreserved characters gets escaped.
const URL_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("placeholder pattern"))
}

/// A value that can be substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateValue::Str(s) => f.write_str(s),
            TemplateValue::Int(i) => write!(f, "{}", i),
            // Display for f64 already yields the shortest round-trippable form.
            TemplateValue::Float(v) => write!(f, "{}", v),
            TemplateValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Str(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Str(value)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        TemplateValue::Int(value)
    }
}

impl From<f64> for TemplateValue {
    fn from(value: f64) -> Self {
        TemplateValue::Float(value)
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        TemplateValue::Bool(value)
    }
}

pub type TemplateValues = HashMap<String, TemplateValue>;

/// Replace every `{name}` in `pattern` whose name is in `values`.
pub fn interpolate(pattern: &str, values: &TemplateValues) -> String {
    placeholder_regex()
        .replace_all(pattern, |caps: &regex::Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// String-valued parameters as interpolation values.
pub fn string_values(values: &HashMap<String, String>) -> TemplateValues {
    values
        .iter()
        .map(|(name, value)| (name.clone(), TemplateValue::from(value.as_str())))
        .collect()
}

/// `interpolate` over a plain string table such as collected request parameters.
pub fn interpolate_strings(pattern: &str, values: &HashMap<String, String>) -> String {
    interpolate(pattern, &string_values(values))
}

/// Percent-escape a value so it stays valid inside URL userinfo or a query string.
pub fn escape_url_value(value: &str) -> String {
    utf8_percent_encode(value, URL_VALUE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, TemplateValue)]) -> TemplateValues {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_string_substitution() {
        let vals = values(&[("test", "test".into())]);
        assert_eq!(interpolate("simple {test} for test", &vals), "simple test for test");
    }

    #[test]
    fn test_integer_substitution() {
        let vals = values(&[("number", 10i64.into())]);
        assert_eq!(interpolate("simple {number} for test", &vals), "simple 10 for test");
    }

    #[test]
    fn test_float_substitution() {
        let vals = values(&[("number", 12.34f64.into())]);
        assert_eq!(interpolate("simple {number} for test", &vals), "simple 12.34 for test");

        let vals = values(&[("number", 0.1f64.into())]);
        assert_eq!(interpolate("{number}", &vals), "0.1");
    }

    #[test]
    fn test_bool_substitution() {
        let vals = values(&[("flag", true.into())]);
        assert_eq!(interpolate("force={flag}", &vals), "force=true");
    }

    #[test]
    fn test_missing_placeholder_left_unchanged() {
        let vals = values(&[("known", "x".into())]);
        assert_eq!(
            interpolate("{known}-{unknown}-{known}", &vals),
            "x-{unknown}-x"
        );
        assert_eq!(interpolate("{a}{b}", &TemplateValues::new()), "{a}{b}");
    }

    #[test]
    fn test_resolved_pattern_is_stable() {
        let vals = values(&[("host", "example.com".into()), ("ip", "1.2.3.4".into())]);
        let once = interpolate("https://{host}/?ip={ip}", &vals);
        let twice = interpolate(&once, &vals);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_literal_braces_have_no_escape() {
        // Known limitation: a literal "{...}" that happens to match a key is replaced.
        let vals = values(&[("json", "X".into())]);
        assert_eq!(interpolate("body={json}", &vals), "body=X");
        // Empty braces are not a placeholder.
        assert_eq!(interpolate("a{}b", &vals), "a{}b");
    }

    #[test]
    fn test_value_containing_braces_is_not_reinterpolated() {
        let vals = values(&[("a", "{b}".into()), ("b", "nope".into())]);
        assert_eq!(interpolate("{a}", &vals), "{b}");
    }

    #[test]
    fn test_interpolate_strings() {
        let mut vals = HashMap::new();
        vals.insert("note".to_string(), "hello".to_string());
        assert_eq!(interpolate_strings("x={note}&y={other}", &vals), "x=hello&y={other}");
        assert_eq!(
            interpolate("x={note}&y={other}", &string_values(&vals)),
            interpolate_strings("x={note}&y={other}", &vals)
        );
    }

    #[test]
    fn test_escape_url_value() {
        assert_eq!(escape_url_value("alice.example.com"), "alice.example.com");
        assert_eq!(escape_url_value("p@ss:w/rd"), "p%40ss%3Aw%2Frd");
        assert_eq!(escape_url_value("a b&c"), "a%20b%26c");
        assert_eq!(escape_url_value("2001:db8::1"), "2001%3Adb8%3A%3A1");
    }
}
