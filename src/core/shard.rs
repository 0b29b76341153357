// src/core/shard.rs

//! Maps keys to owning nodes by hashing the key's prefix.

use crate::core::errors::S4Error;
use crate::core::key::{self, Key};
use blake2::Blake2s256;
use blake2::digest::Digest;

/// `127.0.0.1` and a server's own address are interchangeable for
/// self-comparison; the source normalizes loopback to the wildcard address.
pub fn normalize_loopback(addr: &str) -> &str {
    if addr == "127.0.0.1" { "0.0.0.0" } else { addr }
}

fn prefix_index(prefix: &str, n: usize) -> usize {
    if let Ok(value) = prefix.parse::<u64>() {
        return (value as usize) % n;
    }
    let digest = Blake2s256::digest(prefix.as_bytes());
    let hash = first_eight_le(digest.as_slice());
    (hash as usize) % n
}

fn first_eight_le(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Resolves the owning server's `address:port` entry for `key`.
pub fn pick_server<'a>(key_str: &str, servers: &'a [String]) -> Result<&'a str, S4Error> {
    if servers.is_empty() {
        return Err(S4Error::Internal("no servers configured".to_string()));
    }
    let parsed = Key::parse(key_str)?;
    if parsed.is_directory() {
        return Err(S4Error::BadRequest(format!(
            "key '{key_str}' is directory-shaped"
        )));
    }
    let prefix = key::prefix(parsed.basename());
    let index = prefix_index(prefix, servers.len());
    Ok(&servers[index])
}

/// Whether `key_str` is owned by `self_addr` given the cluster's `servers`
/// list.
pub fn on_this_server(key_str: &str, self_addr: &str, servers: &[String]) -> Result<bool, S4Error> {
    let owner = pick_server(key_str, servers)?;
    Ok(normalize_loopback(owner) == normalize_loopback(self_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{i}:8080")).collect()
    }

    #[test]
    fn routing_is_deterministic() {
        let s = servers(3);
        let a = pick_server("s4://b/123_k", &s).unwrap();
        let b = pick_server("s4://b/123_k", &s).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_prefix_uses_mod_directly() {
        let s = servers(3);
        assert_eq!(pick_server("s4://b/3_k", &s).unwrap(), &s[0]);
        assert_eq!(pick_server("s4://b/4_k", &s).unwrap(), &s[1]);
    }

    #[test]
    fn exactly_one_owner() {
        let s = servers(4);
        let owner = pick_server("s4://b/some_textual_key", &s).unwrap().to_string();
        let owners: Vec<_> = s
            .iter()
            .filter(|candidate| {
                on_this_server("s4://b/some_textual_key", candidate, &s).unwrap()
            })
            .collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(*owners[0], owner);
    }

    #[test]
    fn rejects_directory_shaped_key() {
        let s = servers(2);
        assert!(pick_server("s4://b/dir/", &s).is_err());
    }
}
