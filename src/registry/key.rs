//! Canonical form of public keys (hostnames).
//!
//! HTTP `Host` headers arrive with optional ports, mixed case, and
//! possibly unicode labels; every registry operation first reduces them
//! to the same canonical shape so lookups agree with what registration
//! stored.

/// Canonicalize a hostname: strip any port, then IDNA-ASCII encode
/// (which also lower-cases). Falls back to plain lower-casing when the
/// input is not a valid domain.
pub fn canonical(host: &str) -> String {
    let host = strip_port(host);
    match idna::domain_to_ascii(host) {
        Ok(ascii) if !ascii.is_empty() => ascii,
        _ => host.to_ascii_lowercase(),
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match host.split_once(':') {
        Some((h, _)) => h,
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_port() {
        assert_eq!(canonical("alpha.example.com:8080"), "alpha.example.com");
        assert_eq!(canonical("alpha.example.com"), "alpha.example.com");
    }

    #[test]
    fn test_lowercases() {
        assert_eq!(canonical("Alpha.Example.COM"), "alpha.example.com");
    }

    #[test]
    fn test_idna() {
        assert_eq!(canonical("bücher.example.com"), "xn--bcher-kva.example.com");
    }

    #[test]
    fn test_ipv6_literal() {
        assert_eq!(canonical("[::1]:8080"), "::1");
    }
}
