use anyhow::{Context, Result};

/// Registry key for a URL: lowercase host, plus `:port` when the URL names a
/// non-default port.
pub fn host_of(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).with_context(|| format!("invalid URL for range registry: {url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("URL missing host for range registry: {url}"))?
        .to_ascii_lowercase();
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

/// True when `host` (a registry key) is `domain` or one of its subdomains.
pub(crate) fn domain_matches(host: &str, domain: &str) -> bool {
    let name = strip_port(host).as_bytes();
    let domain = domain.trim().trim_start_matches('.').as_bytes();
    if domain.is_empty() {
        return false;
    }
    let split = name.len().wrapping_sub(domain.len());
    name.eq_ignore_ascii_case(domain)
        || (name.len() > domain.len()
            && name[split - 1] == b'.'
            && name[split..].eq_ignore_ascii_case(domain))
}

fn strip_port(host: &str) -> &str {
    // IPv6 literals keep their brackets; only a trailing `:digits` is a port.
    match host.rsplit_once(':') {
        Some((name, port)) if !name.ends_with(':') && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
