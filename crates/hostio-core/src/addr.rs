//! Socket-address marshalling.
//!
//! The POSIX-emulation layer above the bridge speaks raw
//! `sockaddr_in`/`sockaddr_in6`; the host network API speaks
//! `std::net::SocketAddr`. `SockAddr` is the generic representation in
//! between, discriminated by family. Translation of an unsupported family
//! fails rather than guessing.

use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::error::{BridgeError, Result};

/// Address family of a datagram socket or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    V4,
    V6,
}

impl AddrFamily {
    /// Map an `AF_*` domain constant. Anything but INET/INET6 is refused.
    pub fn from_domain(domain: i32) -> Result<Self> {
        match domain {
            libc::AF_INET => Ok(Self::V4),
            libc::AF_INET6 => Ok(Self::V6),
            _ => Err(BridgeError::AddrNotSupported),
        }
    }
}

/// Generic socket address. Ports are host byte order; `ip` is the address
/// in network byte order, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockAddr {
    V4 { ip: [u8; 4], port: u16 },
    V6 { ip: [u8; 16], port: u16, scope: u32 },
}

impl SockAddr {
    pub fn family(&self) -> AddrFamily {
        match self {
            Self::V4 { .. } => AddrFamily::V4,
            Self::V6 { .. } => AddrFamily::V6,
        }
    }

    /// Decode a raw sockaddr from the caller.
    ///
    /// # Safety
    /// `addr` must point to at least `len` readable bytes.
    pub unsafe fn from_raw(addr: *const libc::sockaddr, len: libc::socklen_t) -> Result<Self> {
        if addr.is_null() || (len as usize) < mem::size_of::<libc::sa_family_t>() {
            return Err(BridgeError::InvalidArgument);
        }
        match (*addr).sa_family as i32 {
            libc::AF_INET => {
                if (len as usize) < mem::size_of::<libc::sockaddr_in>() {
                    return Err(BridgeError::InvalidArgument);
                }
                let sin = &*(addr as *const libc::sockaddr_in);
                Ok(Self::V4 {
                    ip: sin.sin_addr.s_addr.to_ne_bytes(),
                    port: u16::from_be(sin.sin_port),
                })
            }
            libc::AF_INET6 => {
                if (len as usize) < mem::size_of::<libc::sockaddr_in6>() {
                    return Err(BridgeError::InvalidArgument);
                }
                let sin6 = &*(addr as *const libc::sockaddr_in6);
                Ok(Self::V6 {
                    ip: sin6.sin6_addr.s6_addr,
                    port: u16::from_be(sin6.sin6_port),
                    scope: sin6.sin6_scope_id,
                })
            }
            _ => Err(BridgeError::AddrNotSupported),
        }
    }

    /// Encode into caller storage, truncating to `*addrlen` bytes and
    /// updating `*addrlen` to the full encoded size.
    ///
    /// # Safety
    /// `addr` must point to at least `*addrlen` writable bytes and `addrlen`
    /// must be a valid pointer.
    pub unsafe fn write_raw(&self, addr: *mut libc::sockaddr, addrlen: *mut libc::socklen_t) {
        match self {
            Self::V4 { ip, port } => {
                let mut sin: libc::sockaddr_in = mem::zeroed();
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = port.to_be();
                sin.sin_addr.s_addr = u32::from_ne_bytes(*ip);
                let want = mem::size_of::<libc::sockaddr_in>();
                let n = (*addrlen as usize).min(want);
                std::ptr::copy_nonoverlapping(&sin as *const _ as *const u8, addr as *mut u8, n);
                *addrlen = want as libc::socklen_t;
            }
            Self::V6 { ip, port, scope } => {
                let mut sin6: libc::sockaddr_in6 = mem::zeroed();
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = port.to_be();
                sin6.sin6_addr.s6_addr = *ip;
                sin6.sin6_scope_id = *scope;
                let want = mem::size_of::<libc::sockaddr_in6>();
                let n = (*addrlen as usize).min(want);
                std::ptr::copy_nonoverlapping(&sin6 as *const _ as *const u8, addr as *mut u8, n);
                *addrlen = want as libc::socklen_t;
            }
        }
    }

    /// Convert to the host representation.
    pub fn to_host(&self) -> SocketAddr {
        match self {
            Self::V4 { ip, port } => {
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(*ip), *port))
            }
            Self::V6 { ip, port, scope } => {
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(*ip), *port, 0, *scope))
            }
        }
    }

    /// Convert from the host representation.
    pub fn from_host(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::V4 {
                ip: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => Self::V6 {
                ip: v6.ip().octets(),
                port: v6.port(),
                scope: v6.scope_id(),
            },
        }
    }
}

/// Wildcard host bind address for the given family, port 0.
pub fn any_addr(family: AddrFamily) -> SocketAddr {
    match family {
        AddrFamily::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        AddrFamily::V6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}
