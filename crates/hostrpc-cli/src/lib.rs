//! # hostrpc CLI
//!
//! Command-line interface for hostrpc.
//!
//! - `hostrpc serve`: run a TCP host serving the demo [`modules`], one Host
//!   per accepted connection
//! - `hostrpc call`: load a module, call one method and print the JSON result
//! - `hostrpc watch`: subscribe to a module event and print each payload as a
//!   JSON line
//!
//! Argument parsing uses `argh`; the binary lives in `main.rs`.

pub mod modules;

/// Environment variable consulted when `serve` is given no bind address.
pub const ADDR_ENV: &str = "HOSTRPC_ADDR";

pub const DEFAULT_ADDR: &str = "127.0.0.1:7400";

/// Picks the address to use: the explicit one, then [`ADDR_ENV`], then
/// [`DEFAULT_ADDR`].
pub fn resolve_addr(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var(ADDR_ENV).ok().filter(|addr| !addr.is_empty()))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

/// Splits `"Module.method"` at the first dot.
///
/// # Errors
///
/// Fails if either side of the dot is empty or there is no dot.
pub fn split_target(target: &str) -> anyhow::Result<(&str, &str)> {
    match target.split_once('.') {
        Some((module, method)) if !module.is_empty() && !method.is_empty() => Ok((module, method)),
        _ => Err(anyhow::anyhow!(
            "Invalid target '{}': expected Module.method",
            target
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_addr_prefers_explicit() {
        assert_eq!(resolve_addr(Some("0.0.0.0:9000".into())), "0.0.0.0:9000");
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("Store.get").unwrap(), ("Store", "get"));
        assert_eq!(split_target("Store.nested.name").unwrap(), ("Store", "nested.name"));
        assert!(split_target("Store").is_err());
        assert!(split_target(".get").is_err());
        assert!(split_target("Store.").is_err());
    }
}
