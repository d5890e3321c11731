//! Name allocation: turning a registration path into a unique public key.

use rand::Rng;
use thiserror::Error;

use super::{Store, Tags};

/// A successful allocation.
#[derive(Debug)]
pub struct Lease {
    /// Canonical hostname the registry indexes by (`sub.root`).
    pub key: String,
    /// Form reported back to the client: equals `key` for
    /// subdomain-style routing, or `root/sub/` when the client asked for
    /// path-style routing by ending its path with a slash.
    pub display: String,
}

#[derive(Debug, Error)]
pub enum AllocateError {
    #[error("none of the requested subdomains are available: {candidates:?}")]
    NoneAvailable { candidates: Vec<String> },
}

/// Split a registration path into name candidates, in order.
pub fn parse_candidates(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Random docker-style subdomain: four hyphen-separated 4-digit groups.
///
/// The space is large enough that collisions with live records are
/// treated as negligible; there is no uniqueness retry.
pub fn random_subdomain() -> String {
    let mut rng = rand::thread_rng();
    (0..4)
        .map(|_| format!("{:04}", rng.gen_range(0..10_000)))
        .collect::<Vec<_>>()
        .join("-")
}

/// Pick a public key for a registration.
///
/// Candidates from the path are tried in order; a candidate is eligible
/// when no record holds it, when the supplied clobber token matches the
/// holder's stored one, or when no token was supplied and the request
/// comes from the holder's IP (same client reconnecting). With no
/// candidates at all, a random subdomain is assigned.
pub fn allocate(
    store: &Store,
    path: &str,
    values: &Tags,
    real_ip: &str,
    root: &str,
) -> Result<Lease, AllocateError> {
    let candidates = parse_candidates(path);
    let clobber = values.get("clobber").filter(|t| !t.is_empty());

    let sub = if candidates.is_empty() {
        random_subdomain()
    } else {
        let winner = candidates.iter().find(|c| {
            let key = format!("{c}.{root}");
            match store.get_record(&key) {
                None => true,
                Some(existing) => match clobber {
                    Some(token) => existing.tags.get("clobber") == Some(token),
                    None => existing.ip == real_ip,
                },
            }
        });
        match winner {
            Some(w) => w.clone(),
            None => return Err(AllocateError::NoneAvailable { candidates }),
        }
    };

    let key = format!("{sub}.{root}");
    let display = if path.ends_with('/') && path != "/" {
        format!("{root}/{sub}/")
    } else {
        key.clone()
    };
    Ok(Lease { key, display })
}
