use url::Url;

/// Parse a possibly scheme-less URL, retrying with an `https://` prefix.
pub fn parse_lenient(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Url::parse(raw)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", raw)).ok())
}

/// Canonical string form used for URL equality checks.
pub fn normalize_href(raw: &str) -> Option<String> {
    parse_lenient(raw).map(String::from)
}

/// Host name of a URL, if it has one.
pub fn host_of(raw: &str) -> Option<String> {
    parse_lenient(raw)?.host_str().map(str::to_string)
}
