//! CIDR-based interface discovery: resolving the network names the
//! gateway is configured with down to concrete links and addresses.
//!
//! Plain async functions rather than an injectable capability trait —
//! unlike the datapath programmer, nothing here needs a recording fake in
//! tests, since the properties under test are the handlers' and session
//! table's behavior, not the environment the gateway happens to boot in.

use std::net::Ipv4Addr;

use rtnetlink::Handle;

use crate::datapath::link_index_for_network;
use crate::error::GatewayError;

/// The first IPv4 address configured on the link that owns a local route
/// to `network`. Mirrors `GetIPFromNetwork`'s two-step resolution: find
/// the link serving the network, then read its first address.
pub async fn first_ipv4_in_network(handle: &Handle, network: ipnet::Ipv4Net) -> Result<Ipv4Addr, GatewayError> {
    use futures::TryStreamExt;

    let index = link_index_for_network(handle, network).await.ok_or_else(|| GatewayError::DiscoveryFailed {
        network: network.to_string(),
    })?;

    let mut addresses = handle.address().get().set_link_index_filter(index).execute();

    while let Ok(Some(address)) = addresses.try_next().await {
        for attr in &address.attributes {
            if let netlink_packet_route::address::AddressAttribute::Address(std::net::IpAddr::V4(addr)) = attr {
                return Ok(*addr);
            }
        }
    }

    Err(GatewayError::DiscoveryFailed { network: network.to_string() })
}

/// Resolves a link by name to its kernel ifindex.
pub async fn link_index_by_name(handle: &Handle, name: &str) -> Result<u32, GatewayError> {
    crate::datapath::link_index_by_name(handle, name).await.ok_or_else(|| GatewayError::DiscoveryFailed {
        network: name.to_string(),
    })
}
