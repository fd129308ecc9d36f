//! Lily API address handling
//!
//! Nodes advertise their API as a multiaddr (`/ip4/127.0.0.1/tcp/1234/http`);
//! plain `http://` and `https://` URLs are accepted as well.

use crate::error::{ExportError, Result};

/// Path of the JSON-RPC endpoint on a lily node
pub const RPC_PATH: &str = "/rpc/v0";

/// JSON-RPC method names
pub const METHOD_WALK: &str = "Filecoin.LilyWalk";
pub const METHOD_JOB_LIST: &str = "Filecoin.LilyJobList";

/// Build the JSON-RPC URL for an API address
pub fn rpc_url(addr: &str) -> Result<String> {
    let addr = addr.trim();

    if addr.starts_with("http://") || addr.starts_with("https://") {
        let base = addr.trim_end_matches('/');
        let has_path = base
            .split_once("://")
            .is_some_and(|(_, rest)| rest.contains('/'));
        return Ok(if has_path {
            base.to_string()
        } else {
            format!("{base}{RPC_PATH}")
        });
    }

    multiaddr_url(addr)
}

fn multiaddr_url(addr: &str) -> Result<String> {
    let invalid = || ExportError::config(format!("unsupported lily api address: {addr}"));

    let parts: Vec<&str> = addr.split('/').filter(|p| !p.is_empty()).collect();
    let (proto, host, port, rest) = match parts.as_slice() {
        [proto, host, "tcp", port, rest @ ..] => (*proto, *host, *port, rest),
        _ => return Err(invalid()),
    };

    port.parse::<u16>().map_err(|_| invalid())?;
    let host = match proto {
        "ip4" | "dns" | "dns4" | "dns6" => host.to_string(),
        "ip6" => format!("[{host}]"),
        _ => return Err(invalid()),
    };
    let scheme = match rest {
        [] | ["http"] => "http",
        ["https"] => "https",
        _ => return Err(invalid()),
    };

    Ok(format!("{scheme}://{host}:{port}{RPC_PATH}"))
}
