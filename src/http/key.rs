//! Client key derivation from request metadata.
//!
//! A key function maps request parts to the opaque string a limiter counts
//! against. Keys are composed of one or more parts joined with `:`, in the
//! order they are listed.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use http::request::Parts;
use http::HeaderName;
use ipnet::Ipv6Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SlidegateError;

/// Why a client key could not be derived. Requests that fail here are never
/// counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// No `ConnectInfo<SocketAddr>` was attached to the request
    #[error("Remote address unavailable")]
    MissingRemoteAddr,

    /// A header the key depends on was absent
    #[error("Missing required header {0}")]
    MissingHeader(String),

    /// A header the key depends on was not visible ASCII
    #[error("Header {0} is not a valid string")]
    InvalidHeader(String),
}

/// Derives a client key from request parts.
pub type KeyFunc = Arc<dyn Fn(&Parts) -> Result<String, KeyError> + Send + Sync>;

const TRUE_CLIENT_IP: HeaderName = HeaderName::from_static("true-client-ip");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// One component of a configured client key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Every request shares one key
    All,
    /// Peer address of the connection
    Ip,
    /// Client address reported by a trusted proxy, falling back to the peer
    RealIp,
    /// Request path
    Endpoint,
    /// Value of the named header; requests without it are refused
    Header(String),
}

impl KeyKind {
    pub fn key_func(&self) -> Result<KeyFunc, SlidegateError> {
        let func: KeyFunc = match self {
            KeyKind::All => Arc::new(key_all),
            KeyKind::Ip => Arc::new(key_by_ip),
            KeyKind::RealIp => Arc::new(key_by_real_ip),
            KeyKind::Endpoint => Arc::new(key_by_endpoint),
            KeyKind::Header(name) => {
                let name = HeaderName::try_from(name.as_str())
                    .map_err(|_| SlidegateError::InvalidHeaderName(name.clone()))?;
                key_by_header(name)
            }
        };
        Ok(func)
    }
}

/// Build a single key function from configured components.
///
/// No components means one shared key for every request.
pub fn key_func_for(kinds: &[KeyKind]) -> Result<KeyFunc, SlidegateError> {
    match kinds {
        [] => Ok(Arc::new(key_all) as KeyFunc),
        [kind] => kind.key_func(),
        kinds => {
            let funcs = kinds
                .iter()
                .map(KeyKind::key_func)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(compose_keys(funcs))
        }
    }
}

/// Join several key functions with `:`. Any failing part fails the key.
pub fn compose_keys(funcs: Vec<KeyFunc>) -> KeyFunc {
    Arc::new(move |parts: &Parts| -> Result<String, KeyError> {
        let keys = funcs
            .iter()
            .map(|f| f(parts))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys.join(":"))
    })
}

pub fn key_all(_parts: &Parts) -> Result<String, KeyError> {
    Ok("*".to_string())
}

pub fn key_by_ip(parts: &Parts) -> Result<String, KeyError> {
    remote_ip(parts).map(canonical_ip)
}

pub fn key_by_real_ip(parts: &Parts) -> Result<String, KeyError> {
    let forwarded = [TRUE_CLIENT_IP, X_REAL_IP]
        .iter()
        .filter_map(|name| header_str(parts, name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .or_else(|| {
            header_str(parts, &X_FORWARDED_FOR)
                .and_then(|xff| xff.split(',').next())
                .map(|first| first.trim().to_string())
                .filter(|first| !first.is_empty())
        });

    match forwarded {
        Some(ip) => Ok(canonicalize_ip(&ip)),
        None => key_by_ip(parts),
    }
}

pub fn key_by_endpoint(parts: &Parts) -> Result<String, KeyError> {
    Ok(parts.uri.path().to_string())
}

pub fn key_by_header(name: HeaderName) -> KeyFunc {
    Arc::new(move |parts: &Parts| -> Result<String, KeyError> {
        let value = parts
            .headers
            .get(&name)
            .ok_or_else(|| KeyError::MissingHeader(name.to_string()))?;
        value
            .to_str()
            .map(str::to_string)
            .map_err(|_| KeyError::InvalidHeader(name.to_string()))
    })
}

/// Reduce an address string to the part that identifies one client.
///
/// IPv6 addresses collapse to their /64 network, since a single host usually
/// owns a whole /64. IPv4 and unparseable strings come back unchanged.
pub fn canonicalize_ip(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(addr) => canonical_ip(addr),
        Err(_) => ip.to_string(),
    }
}

fn canonical_ip(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => Ipv6Net::new(v6, 64)
                .map(|net| net.trunc().addr().to_string())
                .unwrap_or_else(|_| v6.to_string()),
        },
    }
}

fn remote_ip(parts: &Parts) -> Result<IpAddr, KeyError> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or(KeyError::MissingRemoteAddr)
}

fn header_str<'a>(parts: &'a Parts, name: &HeaderName) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}
