//! Local interface lookup.
//!
//! Wraps `getifaddrs` to find the interface configured with a given address
//! (as its own address or as the peer of a point-to-point link) and to read
//! an interface's link-layer address.

use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};

use nix::ifaddrs::{getifaddrs, InterfaceAddress};
use nix::sys::socket::SockaddrStorage;

/// Name of the interface whose address or peer address is `ip`.
pub fn interface_with_address(ip: IpAddr) -> nix::Result<Option<String>> {
    Ok(find_interface(getifaddrs()?, ip))
}

/// Hardware address of `interface` in `aa:bb:cc:dd:ee:ff` form. Interfaces
/// without one, or with an all-zero one such as loopback, yield `None`.
pub fn hardware_address(interface: &str) -> nix::Result<Option<String>> {
    for ifaddr in getifaddrs()? {
        if ifaddr.interface_name != interface {
            continue;
        }
        let mac = ifaddr
            .address
            .as_ref()
            .and_then(|a| a.as_link_addr())
            .and_then(|link| link.addr());
        if let Some(mac) = mac {
            if mac.iter().any(|b| *b != 0) {
                return Ok(Some(format_mac(&mac)));
            }
        }
    }
    Ok(None)
}

fn find_interface<I>(addrs: I, ip: IpAddr) -> Option<String>
where
    I: IntoIterator<Item = InterfaceAddress>,
{
    addrs
        .into_iter()
        .find(|ifaddr| {
            [&ifaddr.address, &ifaddr.destination]
                .into_iter()
                .flatten()
                .any(|addr| ip_of(addr) == Some(ip))
        })
        .map(|ifaddr| ifaddr.interface_name)
}

fn ip_of(addr: &SockaddrStorage) -> Option<IpAddr> {
    if let Some(sin) = addr.as_sockaddr_in() {
        return Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()));
    }
    addr.as_sockaddr_in6()
        .map(|sin6| IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
}

fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
