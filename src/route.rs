use reqwest::Url;

use crate::config::ProxyConfig;

/// Whether a request to `url` must traverse the tunnel.
///
/// Fails closed: a URL whose host cannot be extracted is never routed, even
/// in route-all mode. Whitelist entries match the host by exact, case-sensitive
/// string equality only; `api.example.com` does not match `example.com`.
pub fn should_route(url: &str, config: &ProxyConfig) -> bool {
    let Some(host) = extract_host(url) else {
        return false;
    };
    if config.route_all {
        return true;
    }
    config
        .whitelist_domains
        .iter()
        .any(|domain| domain.as_str() == host)
}

/// Host component of an absolute URL, exactly as written.
///
/// A URL counts as malformed only when the dispatching client would refuse
/// it too. The host is cut from the raw authority because `Url` lowercases it.
pub fn extract_host(url: &str) -> Option<String> {
    let url = url.trim();
    let parsed = Url::parse(url).ok()?;
    let normalized = parsed.host_str().filter(|h| !h.is_empty())?;

    let raw = raw_authority(url)
        .map(authority_host)
        .filter(|h| !h.is_empty() && h.eq_ignore_ascii_case(normalized));
    Some(raw.unwrap_or(normalized).to_string())
}

fn raw_authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#', '\\']).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn authority_host(authority: &str) -> &str {
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    if host_port.starts_with('[') {
        match host_port.find(']') {
            Some(end) => &host_port[..=end],
            None => host_port,
        }
    } else {
        host_port.split(':').next().unwrap_or(host_port)
    }
}
