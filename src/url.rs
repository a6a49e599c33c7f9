//! Turns whatever the user typed into the URL every attempt will request.

use std::net::IpAddr;

use reqwest::Url;

use crate::error::{Error, Result};

/// Adds `https://` when no scheme is given, and `www.` to bare domain names.
///
/// Input that already carries a scheme is left alone. Scheme-relative input (`//host`)
/// only gets the scheme. Hosts that already start with `www.`, `localhost` and IP
/// literals never get the `www.` prefix.
pub fn normalise(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(invalid(raw, "empty url"));
    }

    let url = if has_scheme(raw) {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{}", rest)
    } else if wants_www(raw) {
        format!("https://www.{}", raw)
    } else {
        format!("https://{}", raw)
    };

    let parsed = Url::parse(&url).map_err(|e| invalid(raw, e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(raw, format!("unsupported scheme '{}'", other))),
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid(raw, "missing host"));
    }

    Ok(url)
}

/// True when `raw` starts with `scheme://`, where the scheme is a letter followed by
/// letters, digits, `+`, `-` or `.`. A `://` later in the path or query doesn't count.
fn has_scheme(raw: &str) -> bool {
    let scheme = match raw.find("://") {
        Some(i) => &raw[..i],
        None => return false,
    };

    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

fn wants_www(raw: &str) -> bool {
    let authority = raw.split(|c: char| c == '/' || c == '?' || c == '#').next().unwrap_or("");

    // bracketed ipv6 literal
    if authority.starts_with('[') {
        return false;
    }

    let host = authority.split(':').next().unwrap_or("").to_ascii_lowercase();

    !(host.starts_with("www.") || host == "localhost" || host.parse::<IpAddr>().is_ok())
}

fn invalid(url: &str, reason: impl Into<String>) -> Error {
    Error::InvalidUrl {
        url: url.to_string(),
        reason: reason.into(),
    }
}
