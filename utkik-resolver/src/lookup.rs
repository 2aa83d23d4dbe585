//! ## utkik-resolver::lookup
//! **The blocking resolution primitive behind a swappable seam**
//!
//! Lookups are plain blocking calls into the platform resolver; nothing
//! here knows about threads or deadlines. The engine races these calls
//! against its timers, which is why [`NameResolver`] implementations must
//! tolerate their result being discarded.

use std::ffi::CStr;
use std::net::{IpAddr, ToSocketAddrs};

use thiserror::Error;

/// What a single resolution task asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    /// Forward lookup: hostname to its first address.
    Host(String),
    /// Reverse lookup: address to its canonical name.
    Addr(IpAddr),
}

impl std::fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupTarget::Host(host) => f.write_str(host),
            LookupTarget::Addr(addr) => write!(f, "{addr}"),
        }
    }
}

/// Categorized failure attached to a target in place of a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no name found for {0}")]
    NotFound(String),
    #[error("temporary resolver failure for {0}")]
    Temporary(String),
    #[error("invalid lookup target: {0}")]
    InvalidTarget(String),
    #[error("resolver failure for {0}: {1}")]
    Other(String, String),
}

pub type LookupOutcome = Result<String, LookupError>;

/// The blocking call the worker pool runs. A call may still be in flight
/// when the engine gives up waiting for it, so implementations must not
/// assume anyone reads their result.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, target: &LookupTarget) -> LookupOutcome;
}

/// Platform resolver: forward lookups through the standard address
/// resolution path, reverse lookups through `getnameinfo(3)`.
#[derive(Debug, Default, Clone)]
pub struct SystemResolver;

impl NameResolver for SystemResolver {
    fn resolve(&self, target: &LookupTarget) -> LookupOutcome {
        match target {
            LookupTarget::Host(host) => forward(host),
            LookupTarget::Addr(addr) => reverse(*addr),
        }
    }
}

fn forward(host: &str) -> LookupOutcome {
    if host.is_empty() || host.len() > 253 {
        return Err(LookupError::InvalidTarget(host.to_string()));
    }
    // Already an address: pass it through without a query.
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }
    let mut addrs = (host, 0u16)
        .to_socket_addrs()
        .map_err(|e| LookupError::Other(host.to_string(), e.to_string()))?;
    addrs
        .next()
        .map(|sa| sa.ip().to_string())
        .ok_or_else(|| LookupError::NotFound(host.to_string()))
}

fn reverse(addr: IpAddr) -> LookupOutcome {
    // NI_MAXHOST
    let mut name = [0 as libc::c_char; 1025];

    let rc = match addr {
        IpAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: 0,
                // Octets are already in network order.
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.octets()),
                },
                sin_zero: [0; 8],
            };
            // SAFETY: sin is fully initialized and name is a live buffer of
            // the advertised length.
            unsafe {
                libc::getnameinfo(
                    std::ptr::addr_of!(sin).cast::<libc::sockaddr>(),
                    std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                    name.as_mut_ptr(),
                    name.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }
        }
        IpAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: 0,
                sin6_flowinfo: 0,
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.octets(),
                },
                sin6_scope_id: 0,
            };
            // SAFETY: as above, with the IPv6 socket address layout.
            unsafe {
                libc::getnameinfo(
                    std::ptr::addr_of!(sin6).cast::<libc::sockaddr>(),
                    std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                    name.as_mut_ptr(),
                    name.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }
        }
    };

    match rc {
        0 => {
            // SAFETY: getnameinfo nul-terminates the buffer on success.
            let name = unsafe { CStr::from_ptr(name.as_ptr()) };
            Ok(name.to_string_lossy().into_owned())
        }
        libc::EAI_NONAME => Err(LookupError::NotFound(addr.to_string())),
        libc::EAI_AGAIN => Err(LookupError::Temporary(addr.to_string())),
        code => Err(LookupError::Other(addr.to_string(), gai_error(code))),
    }
}

fn gai_error(code: libc::c_int) -> String {
    // SAFETY: gai_strerror returns a pointer to a static message.
    unsafe { CStr::from_ptr(libc::gai_strerror(code)) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_addresses_pass_through() {
        let outcome = SystemResolver.resolve(&LookupTarget::Host("127.0.0.1".into()));
        assert_eq!(outcome, Ok("127.0.0.1".into()));
    }

    #[test]
    fn localhost_resolves_forward() {
        let outcome = SystemResolver.resolve(&LookupTarget::Host("localhost".into()));
        assert!(outcome.is_ok(), "localhost should resolve: {outcome:?}");
    }

    #[test]
    fn loopback_resolves_reverse() {
        let outcome = SystemResolver.resolve(&LookupTarget::Addr("127.0.0.1".parse().unwrap()));
        let name = outcome.expect("loopback should have a name");
        assert!(!name.is_empty());
    }

    #[test]
    fn empty_host_is_invalid() {
        let outcome = SystemResolver.resolve(&LookupTarget::Host(String::new()));
        assert_eq!(outcome, Err(LookupError::InvalidTarget(String::new())));
    }

    #[test]
    fn unknown_reverse_is_categorized() {
        // TEST-NET-1 space has no name; depending on the environment this
        // surfaces as not-found, temporary, or a resolver error.
        let outcome = SystemResolver.resolve(&LookupTarget::Addr("192.0.2.55".parse().unwrap()));
        assert!(outcome.is_err());
    }

    #[test]
    fn target_display_matches_the_query() {
        assert_eq!(LookupTarget::Host("a.example".into()).to_string(), "a.example");
        let addr: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(LookupTarget::Addr(addr).to_string(), "192.0.2.1");
    }
}
