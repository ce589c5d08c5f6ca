//! Injection-safe dynamic filter building.
//!
//! Dashboard queries accept a variable set of dimension filters. Each filter
//! becomes a parameterized `AND column = ?N` clause; values always bind
//! positionally and only column identifiers from the fixed [`FilterKey`]
//! alias table are ever interpolated. The builder produces a structured
//! intermediate form ([`SqlFragment`]) that renders to the positional
//! placeholder dialect at the call site.

use serde_json::Value;

use crate::flatten::{infer_kind, DataKind};

/// The fixed set of filterable dimensions and their storage columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Url,
    Referrer,
    Title,
    Query,
    Event,
    Os,
    Browser,
    Device,
    Country,
    Region,
    City,
    Language,
}

impl FilterKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "url" => Some(Self::Url),
            "referrer" => Some(Self::Referrer),
            "title" => Some(Self::Title),
            "query" => Some(Self::Query),
            "event" => Some(Self::Event),
            "os" => Some(Self::Os),
            "browser" => Some(Self::Browser),
            "device" => Some(Self::Device),
            "country" => Some(Self::Country),
            "region" => Some(Self::Region),
            "city" => Some(Self::City),
            "language" => Some(Self::Language),
            _ => None,
        }
    }

    /// Storage column for this dimension. The only source of identifiers
    /// interpolated into filter SQL.
    pub fn column(self) -> &'static str {
        match self {
            Self::Url => "url_path",
            Self::Referrer => "referrer_domain",
            Self::Title => "page_title",
            Self::Query => "url_query",
            Self::Event => "event_name",
            Self::Os => "os",
            Self::Browser => "browser",
            Self::Device => "device",
            Self::Country => "country",
            Self::Region => "subdivision1",
            Self::City => "city",
            Self::Language => "language",
        }
    }

    /// Session-level attributes require joining the session table.
    pub fn is_session_attribute(self) -> bool {
        matches!(
            self,
            Self::Os
                | Self::Browser
                | Self::Device
                | Self::Country
                | Self::Region
                | Self::City
                | Self::Language
        )
    }
}

/// An ordered set of dimension filters. Insertion order is preserved so
/// parameter positions are stable.
#[derive(Debug, Clone, Default)]
pub struct MetricFilters {
    entries: Vec<(FilterKey, String)>,
}

impl MetricFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: FilterKey, value: impl Into<String>) {
        self.entries.push((key, value.into()));
    }

    /// Drop every filter on `key`. Used by breakdown queries, which exclude
    /// the dimension being broken down.
    pub fn remove(&mut self, key: FilterKey) {
        self.entries.retain(|(k, _)| *k != key);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(FilterKey, String)> {
        self.entries.iter()
    }
}

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    /// Formatted timestamp string, bound as-is.
    Timestamp(String),
}

/// Parameterized SQL clauses plus their values, prior to dialect rendering.
///
/// Each clause template carries `{}` markers, one per parameter, which
/// [`SqlFragment::render`] replaces with `?N` placeholders numbered from a
/// caller-supplied starting index.
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    clauses: Vec<String>,
    params: Vec<ParamValue>,
}

impl SqlFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause. The number of `{}` markers in `template` must equal
    /// `values.len()`.
    pub fn push(&mut self, template: &str, values: Vec<ParamValue>) {
        debug_assert_eq!(template.matches("{}").count(), values.len());
        self.clauses.push(template.to_string());
        self.params.extend(values);
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn params(&self) -> &[ParamValue] {
        &self.params
    }

    pub fn into_params(self) -> Vec<ParamValue> {
        self.params
    }

    /// Render to newline-joined SQL with positional `?N` placeholders,
    /// numbering from `first_index`. Empty fragments render to an empty
    /// string, always safe to splice after a `WHERE` clause.
    pub fn render(&self, first_index: usize) -> String {
        let mut n = first_index;
        let mut out = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let mut rendered = String::with_capacity(clause.len() + 4);
            let mut rest = clause.as_str();
            while let Some(pos) = rest.find("{}") {
                rendered.push_str(&rest[..pos]);
                rendered.push_str(&format!("?{n}"));
                n += 1;
                rest = &rest[pos + 2..];
            }
            rendered.push_str(rest);
            out.push(rendered);
        }
        out.join("\n")
    }
}

/// Join clause pulled in when any session-level attribute is filtered.
pub const SESSION_JOIN: &str =
    "inner join session on website_event.session_id = session.session_id";

/// Result of translating a filter set: the rendered-to-be fragment and
/// whether the session join is required.
#[derive(Debug, Clone)]
pub struct ParsedFilters {
    pub fragment: SqlFragment,
    pub join_session: bool,
}

impl ParsedFilters {
    pub fn join_clause(&self) -> &'static str {
        if self.join_session {
            SESSION_JOIN
        } else {
            ""
        }
    }
}

/// Build `AND column = ?N` clauses for each filter entry. Values are
/// URL-decoded before binding; column names come only from the alias table.
pub fn build_filter_fragment(filters: &MetricFilters) -> SqlFragment {
    let mut fragment = SqlFragment::new();
    for (key, value) in filters.iter() {
        fragment.push(
            &format!("and {} = {{}}", key.column()),
            vec![ParamValue::Text(percent_decode(value))],
        );
    }
    fragment
}

/// Translate filters into a fragment plus the session-join requirement.
pub fn parse_filters(filters: &MetricFilters) -> ParsedFilters {
    let join_session = filters.iter().any(|(k, _)| k.is_session_attribute());
    ParsedFilters {
        fragment: build_filter_fragment(filters),
        join_session,
    }
}

/// Build an event-data predicate for one `(key, value)` pair.
///
/// The value's inferred [`DataKind`] selects which typed column to compare
/// against, mirroring the dispatch used when the rows were written.
pub fn event_data_filter(key: &str, value: &Value) -> SqlFragment {
    let mut fragment = SqlFragment::new();
    let kind = infer_kind(value);
    let key_param = ParamValue::Text(key.to_string());
    match kind {
        DataKind::Number => {
            let n = value.as_f64().unwrap_or_default();
            fragment.push(
                "and (event_key = {} and event_numeric_value = {})",
                vec![key_param, ParamValue::Float(n)],
            );
        }
        DataKind::Date => {
            let s = value.as_str().unwrap_or_default().to_string();
            fragment.push(
                "and (event_key = {} and event_date_value = {})",
                vec![key_param, ParamValue::Timestamp(s)],
            );
        }
        DataKind::String | DataKind::Boolean | DataKind::Array => {
            let s = match value {
                Value::String(s) => percent_decode(s),
                other => other.to_string(),
            };
            fragment.push(
                "and (event_key = {} and event_string_value = {})",
                vec![key_param, ParamValue::Text(s)],
            );
        }
    }
    fragment
}

/// Decode %XX escapes (and `+` as space is deliberately *not* applied —
/// values arrive URI-component-encoded, not form-encoded).
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filters_render_to_empty_string() {
        let parsed = parse_filters(&MetricFilters::new());
        assert_eq!(parsed.fragment.render(1), "");
        assert!(parsed.fragment.params().is_empty());
        assert_eq!(parsed.join_clause(), "");
    }

    #[test]
    fn single_filter_binds_one_param() {
        let mut filters = MetricFilters::new();
        filters.insert(FilterKey::Country, "US");
        let parsed = parse_filters(&filters);
        assert_eq!(parsed.fragment.render(5), "and country = ?5");
        assert_eq!(
            parsed.fragment.params(),
            &[ParamValue::Text("US".to_string())]
        );
        assert!(parsed.join_session);
    }

    #[test]
    fn event_filters_do_not_require_session_join() {
        let mut filters = MetricFilters::new();
        filters.insert(FilterKey::Url, "/docs");
        filters.insert(FilterKey::Event, "signup");
        let parsed = parse_filters(&filters);
        assert!(!parsed.join_session);
        assert_eq!(
            parsed.fragment.render(2),
            "and url_path = ?2\nand event_name = ?3"
        );
    }

    #[test]
    fn values_are_percent_decoded() {
        let mut filters = MetricFilters::new();
        filters.insert(FilterKey::Url, "/docs%2Fguide%20one");
        let parsed = parse_filters(&filters);
        assert_eq!(
            parsed.fragment.params(),
            &[ParamValue::Text("/docs/guide one".to_string())]
        );
    }

    #[test]
    fn remove_excludes_a_dimension() {
        let mut filters = MetricFilters::new();
        filters.insert(FilterKey::Referrer, "google.com");
        filters.insert(FilterKey::Browser, "Chrome");
        filters.remove(FilterKey::Referrer);
        let parsed = parse_filters(&filters);
        assert_eq!(parsed.fragment.render(1), "and browser = ?1");
    }

    #[test]
    fn event_data_filter_dispatches_on_value_kind() {
        let numeric = event_data_filter("cart.total", &json!(42.5));
        assert_eq!(
            numeric.render(3),
            "and (event_key = ?3 and event_numeric_value = ?4)"
        );
        assert_eq!(
            numeric.params()[1],
            ParamValue::Float(42.5),
        );

        let stringy = event_data_filter("plan", &json!("pro"));
        assert_eq!(
            stringy.render(1),
            "and (event_key = ?1 and event_string_value = ?2)"
        );

        let dated = event_data_filter("when", &json!("2024-01-02T10:00:00Z"));
        assert_eq!(
            dated.render(1),
            "and (event_key = ?1 and event_date_value = ?2)"
        );
    }
}
