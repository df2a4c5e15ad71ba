//! Endpoint URL canonicalization
//!
//! A canonical endpoint keeps scheme, userinfo, host and port only. Path,
//! query and fragment are stripped and there is never a trailing slash.
//! A port written in the input is kept even when it is the scheme default.
//! Inputs that fail to parse or use a scheme other than `http`/`https`
//! are dropped.

use url::Url;

/// Canonicalize a single endpoint URL, returning `None` if it is unusable
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = Url::parse(raw).ok()?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = url.host_str()?;

    let mut out = String::with_capacity(raw.len());
    out.push_str(scheme);
    out.push_str("://");
    if !url.username().is_empty() || url.password().is_some() {
        out.push_str(url.username());
        if let Some(password) = url.password() {
            out.push(':');
            out.push_str(password);
        }
        out.push('@');
    }
    out.push_str(host);
    // `Url::port` hides default ports
    let port = if has_explicit_port(raw) {
        url.port_or_known_default()
    } else {
        url.port()
    };
    if let Some(port) = port {
        out.push(':');
        out.push_str(&port.to_string());
    }
    Some(out)
}

/// True if the authority of `raw` spells out a port
fn has_explicit_port(raw: &str) -> bool {
    let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let after_host = host_port.rsplit_once(']').map_or(host_port, |(_, tail)| tail);
    after_host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty())
}

/// Canonicalize a list of URLs, silently discarding invalid entries
pub fn canonicalize<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    urls.iter()
        .filter_map(|u| canonicalize_url(u.as_ref()))
        .collect()
}
