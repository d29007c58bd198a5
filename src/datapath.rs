//! Netlink-backed implementation of [`service::datapath::DatapathProgrammer`].
//!
//! This is the one place in the workspace that talks to `rtnetlink`
//! directly; everything else programs the kernel through the trait.

use std::net::Ipv4Addr;

use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage, RouteProtocol, RouteScope};
use netlink_packet_route::rule::{RuleAction, RuleAttribute};
use parking_lot::Mutex;
use rtnetlink::{Error::NetlinkError, Handle, LinkGtp, LinkUnspec, RouteMessageBuilder};

use service::datapath::{AddedRoute, AddedRule, AddedTunnel, DatapathProgrammer};

use crate::gtp_genl::GtpGenlClient;

pub const GTP_LINK_NAME: &str = "gtp-pgw";

/// Resolves a kernel ifindex to its interface name, the same key `ip rule`
/// itself matches on (rules are indexed by iifname, not ifindex).
fn ifname(index: u32) -> Option<String> {
    let mut buf = [0u8; libc::IF_NAMESIZE];
    // Safety: `buf` is `IF_NAMESIZE` bytes as the libc contract requires.
    let result = unsafe { libc::if_indextoname(index, buf.as_mut_ptr() as *mut libc::c_char) };
    if result.is_null() {
        return None;
    }

    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..len]).ok().map(str::to_string)
}

/// Bound UDP sockets the kernel GTP device multiplexes encapsulated
/// traffic through. The control-plane socket (fd0) carries echo/error
/// indication; the user-plane socket (fd1) carries encapsulated payload.
pub struct GtpSockets {
    pub control_fd: i32,
    pub user_fd: i32,
}

/// Creates the kernel GTP device in GGSN role, bound to the given sockets.
/// Mirrors `EnableKernelGTP` in the router construction this gateway is
/// modeled on: failure here is logged by the caller and does not stop the
/// gateway from serving control-plane traffic, since only the user-plane
/// forwarding path needs it.
pub async fn create_gtp_link(handle: &Handle, sockets: GtpSockets) -> Result<u32, String> {
    let message = LinkGtp::new(GTP_LINK_NAME)
        .fd0(sockets.control_fd)
        .fd1(sockets.user_fd)
        .role(0) // GGSN
        .build();

    handle
        .link()
        .add(message)
        .execute()
        .await
        .map_err(|e| format!("failed to create {GTP_LINK_NAME}: {e}"))?;

    let index = link_index_by_name(handle, GTP_LINK_NAME)
        .await
        .ok_or_else(|| format!("{GTP_LINK_NAME} not found after creation"))?;

    handle
        .link()
        .set(LinkUnspec::new_with_index(index).up().build())
        .execute()
        .await
        .map_err(|e| format!("failed to bring {GTP_LINK_NAME} up: {e}"))?;

    Ok(index)
}

pub async fn delete_gtp_link(handle: &Handle, index: u32) -> Result<(), String> {
    handle
        .link()
        .del(index)
        .execute()
        .await
        .map_err(|e| format!("failed to delete {GTP_LINK_NAME}: {e}"))
}

pub async fn link_index_by_name(handle: &Handle, name: &str) -> Option<u32> {
    use futures::TryStreamExt;

    handle
        .link()
        .get()
        .match_name(name.to_string())
        .execute()
        .try_next()
        .await
        .ok()
        .flatten()
        .map(|message| message.header.index)
}

/// Resolves a CIDR network to the link carrying a local route for it,
/// mirroring `getLinksByNetwork`'s route-filter-by-destination approach.
pub async fn link_index_for_network(handle: &Handle, network: ipnet::Ipv4Net) -> Option<u32> {
    use futures::TryStreamExt;

    let mut routes = handle.route().get(RouteMessageBuilder::<Ipv4Addr>::new().build()).execute();

    while let Ok(Some(route)) = routes.try_next().await {
        let destination_matches = route.header.destination_prefix_length == network.prefix_len()
            && route.attributes.iter().any(|attr| {
                matches!(attr, RouteAttribute::Destination(RouteAddress::Inet(addr)) if *addr == network.network())
            });

        if !destination_matches {
            continue;
        }

        if let Some(index) = route.attributes.iter().find_map(|attr| match attr {
            RouteAttribute::Oif(idx) => Some(*idx),
            _ => None,
        }) {
            return Some(index);
        }
    }

    None
}

/// `rtnetlink`/`genetlink`-backed implementation of [`DatapathProgrammer`].
/// Each trait method is synchronous (the trait is shared with unit tests
/// that substitute a recording fake); this type bridges to `rtnetlink`'s
/// and `genetlink`'s async APIs via [`tokio::task::block_in_place`], which
/// is safe as long as the owning runtime is multi-threaded — this binary
/// always starts one.
///
/// `gtp` is `None` when the kernel GTP device could not be brought up (see
/// `Router::new`): `add_tunnel`/`remove_tunnel` then report a failure
/// instead of silently skipping the PDP-context write, so a degraded
/// datapath shows up in the logs the same way a failed route/rule call
/// already does.
pub struct NetlinkDatapathProgrammer {
    handle: Handle,
    gtp: Option<Mutex<GtpGenlClient>>,
}

impl NetlinkDatapathProgrammer {
    pub fn new(handle: Handle, gtp: Option<GtpGenlClient>) -> Self {
        Self { handle, gtp: gtp.map(Mutex::new) }
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
    }
}

fn route_message(route: AddedRoute) -> RouteMessage {
    RouteMessageBuilder::<Ipv4Addr>::new()
        .output_interface(route.oif_index)
        .protocol(RouteProtocol::Static)
        .scope(RouteScope::Universe)
        .table_id(route.table)
        .destination_prefix(route.dst, route.prefix_len)
        .build()
}

impl DatapathProgrammer for NetlinkDatapathProgrammer {
    fn add_tunnel(&self, tunnel: AddedTunnel) -> Result<(), String> {
        let Some(gtp) = &self.gtp else {
            return Err("kernel gtp genetlink family unavailable".to_string());
        };
        self.block_on(gtp.lock().add_pdp_context(tunnel))
    }

    fn remove_tunnel(&self, tunnel: AddedTunnel) -> Result<(), String> {
        let Some(gtp) = &self.gtp else {
            return Err("kernel gtp genetlink family unavailable".to_string());
        };
        self.block_on(gtp.lock().del_pdp_context(tunnel))
    }

    fn add_route(&self, route: AddedRoute) -> Result<(), String> {
        self.block_on(async {
            match self.handle.route().add(route_message(route)).execute().await {
                Ok(()) => Ok(()),
                Err(NetlinkError(err)) if err.raw_code() == -libc::EEXIST => Ok(()),
                Err(e) => Err(format!("add_route {route:?}: {e}")),
            }
        })
    }

    fn remove_route(&self, route: AddedRoute) -> Result<(), String> {
        self.block_on(async {
            match self.handle.route().del(route_message(route)).execute().await {
                Ok(()) => Ok(()),
                Err(NetlinkError(err)) if err.raw_code() == -libc::ESRCH || err.raw_code() == -libc::ENOENT => Ok(()),
                Err(e) => Err(format!("remove_route {route:?}: {e}")),
            }
        })
    }

    fn add_rule(&self, rule: AddedRule) -> Result<(), String> {
        self.block_on(async {
            if self.rule_exists(rule).await? {
                return Ok(());
            }

            let iif = ifname(rule.iif_index).ok_or_else(|| format!("no ifname for index {}", rule.iif_index))?;

            let mut request = self
                .handle
                .rule()
                .add()
                .input_interface(iif)
                .table_id(rule.table)
                .action(RuleAction::ToTable)
                .v4();

            let message = request.message_mut();
            message.header.dst_len = rule.prefix_len;
            message.attributes.push(RuleAttribute::Destination(std::net::IpAddr::V4(rule.dst)));
            message.attributes.push(RuleAttribute::Protocol(RouteProtocol::Static));

            request.execute().await.map_err(|e| format!("add_rule {rule:?}: {e}"))
        })
    }

    fn remove_rule(&self, rule: AddedRule) -> Result<(), String> {
        self.block_on(async {
            let iif = ifname(rule.iif_index).ok_or_else(|| format!("no ifname for index {}", rule.iif_index))?;

            let mut request = self.handle.rule().add().input_interface(iif).table_id(rule.table).v4();
            let message = request.message_mut();
            message.header.dst_len = rule.prefix_len;
            message.attributes.push(RuleAttribute::Destination(std::net::IpAddr::V4(rule.dst)));
            let message = message.clone();

            self.handle.rule().del(message).execute().await.map_err(|e| format!("remove_rule {rule:?}: {e}"))
        })
    }
}

impl NetlinkDatapathProgrammer {
    /// Presence is tested on `(iif_name, dst)` per the gateway's add-rule
    /// contract, not on table: a stale rule into a different table for the
    /// same UE would otherwise be mistaken for the one we're about to add.
    async fn rule_exists(&self, rule: AddedRule) -> Result<bool, String> {
        use futures::TryStreamExt;

        let Some(iif) = ifname(rule.iif_index) else {
            return Ok(false);
        };

        let mut rules = self.handle.rule().get(rtnetlink::IpVersion::V4).execute();

        while let Ok(Some(existing)) = rules.try_next().await {
            let iif_matches = existing.attributes.iter().any(|attr| matches!(attr, RuleAttribute::Iifname(name) if name == &iif));
            let dst_matches = existing.header.dst_len == rule.prefix_len
                && existing
                    .attributes
                    .iter()
                    .any(|attr| matches!(attr, RuleAttribute::Destination(std::net::IpAddr::V4(addr)) if *addr == rule.dst));

            if iif_matches && dst_matches {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

