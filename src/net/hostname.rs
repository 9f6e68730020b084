//! Server name resolution.
//!
//! # Responsibilities
//! - Determine the name the server advertises for a bound host
//! - Reverse-resolve numeric addresses, best effort
//! - Cache results per distinct input
//!
//! # Design Decisions
//! - Anything that does not parse as an IPv4 or IPv6 address is already a
//!   name and is returned unchanged
//! - Resolution failures fall back to the literal input, so the result is
//!   never empty

use std::net::IpAddr;

use dashmap::DashMap;

/// Fallback used when the host name itself cannot be read.
const FALLBACK_NAME: &str = "localhost";

/// Resolves and caches server names.
#[derive(Debug, Default)]
pub struct ServerNameResolver {
    cache: DashMap<String, String>,
}

impl ServerNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name to advertise for `ip`; an empty input means "this machine".
    pub fn resolve(&self, ip: &str) -> String {
        if let Some(name) = self.cache.get(ip) {
            return name.value().clone();
        }

        let name = server_name(ip);
        self.cache.insert(ip.to_string(), name.clone());
        name
    }

    /// Number of cached entries.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

fn server_name(ip: &str) -> String {
    let candidate = if ip.is_empty() {
        local_hostname().unwrap_or_else(|| FALLBACK_NAME.to_string())
    } else {
        ip.to_string()
    };

    let Ok(addr) = candidate.parse::<IpAddr>() else {
        return candidate;
    };
    if addr.is_unspecified() {
        return FALLBACK_NAME.to_string();
    }

    reverse_lookup(addr).unwrap_or(candidate)
}

fn local_hostname() -> Option<String> {
    dns_lookup::get_hostname()
        .ok()
        .filter(|name| !name.is_empty())
}

fn reverse_lookup(ip: IpAddr) -> Option<String> {
    match dns_lookup::lookup_addr(&ip) {
        Ok(name) if !name.is_empty() => Some(name),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(%ip, error = %e, "Reverse lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_resolves_to_something() {
        let resolver = ServerNameResolver::new();
        assert!(!resolver.resolve("").is_empty());
    }

    #[test]
    fn numeric_resolves_to_something() {
        let resolver = ServerNameResolver::new();
        assert!(!resolver.resolve("127.0.0.1").is_empty());
    }

    #[test]
    fn names_pass_through() {
        let resolver = ServerNameResolver::new();
        assert_eq!(resolver.resolve("fred.flintstone.com"), "fred.flintstone.com");
    }

    #[test]
    fn any_address_is_localhost() {
        let resolver = ServerNameResolver::new();
        assert_eq!(resolver.resolve("0.0.0.0"), "localhost");
    }

    #[test]
    fn caches_per_input() {
        let resolver = ServerNameResolver::new();
        resolver.resolve("fred.flintstone.com");
        resolver.resolve("fred.flintstone.com");
        resolver.resolve("0.0.0.0");
        assert_eq!(resolver.cached(), 2);
    }

    #[test]
    fn ipv6_any_address_is_localhost() {
        let resolver = ServerNameResolver::new();
        assert_eq!(resolver.resolve("::"), "localhost");
    }

    #[test]
    fn ipv6_literal_is_resolved_not_passed_through() {
        let resolver = ServerNameResolver::new();
        let name = resolver.resolve("::1");
        assert!(!name.is_empty());

        // Either a reverse-lookup result or the literal fallback.
        assert!(name == "::1" || name.parse::<IpAddr>().is_err());
    }

    #[test]
    fn unparsable_hosts_pass_through() {
        let resolver = ServerNameResolver::new();
        assert_eq!(resolver.resolve("10.0.0"), "10.0.0");
        assert_eq!(resolver.resolve("example.com"), "example.com");
    }
}
