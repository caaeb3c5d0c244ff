//! Header and query parameter maps.
//!
//! Header names are compared case-insensitively, the way HTTP defines them,
//! while the casing of the first writer is kept for display.

use std::collections::HashMap;

/// HTTP header map, name to value.
pub type Headers = HashMap<String, String>;

/// Query parameter map, name to value.
pub type Params = HashMap<String, String>;

/// Look up a header value, ignoring the case of the name.
#[must_use]
pub fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Insert a header, replacing any existing entry whose name differs only by case.
pub fn insert_header(headers: &mut Headers, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
    headers.insert(name, value.into());
}

/// Overlay `overrides` on top of `base`; entries from `overrides` win.
#[must_use]
pub fn merge_headers(base: &Headers, overrides: &Headers) -> Headers {
    let mut merged = base.clone();
    for (name, value) in overrides {
        insert_header(&mut merged, name.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_header_ignores_case() {
        let headers = Headers::from([("Content-Type".to_string(), "text/html".to_string())]);
        assert_eq!(find_header(&headers, "content-type"), Some("text/html"));
        assert_eq!(find_header(&headers, "accept"), None);
    }

    #[test]
    fn insert_header_replaces_other_casing() {
        let mut headers = Headers::from([("accept".to_string(), "application/json".to_string())]);
        insert_header(&mut headers, "Accept", "text/html");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Accept").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn merge_headers_prefers_overrides() {
        let base = Headers::from([
            ("Accept".to_string(), "application/json".to_string()),
            ("X-Service".to_string(), "widgets".to_string()),
        ]);
        let overrides = Headers::from([("ACCEPT".to_string(), "text/html".to_string())]);

        let merged = merge_headers(&base, &overrides);

        assert_eq!(merged.len(), 2);
        assert_eq!(find_header(&merged, "accept"), Some("text/html"));
        assert_eq!(find_header(&merged, "x-service"), Some("widgets"));
    }
}
