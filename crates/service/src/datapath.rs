use std::net::Ipv4Addr;

/// A route added by [`DatapathProgrammer::add_route`], remembered so it can
/// be reversed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddedRoute {
    pub dst: Ipv4Addr,
    pub prefix_len: u8,
    pub oif_index: u32,
    pub table: u32,
}

/// A policy rule added by [`DatapathProgrammer::add_rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddedRule {
    pub iif_index: u32,
    pub dst: Ipv4Addr,
    pub prefix_len: u8,
    pub table: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddedTunnel {
    pub peer_ip: Ipv4Addr,
    pub ue_ip: Ipv4Addr,
    pub outbound_teid: u32,
    pub inbound_teid: u32,
}

/// Kernel datapath programming capability, modeled as an injectable
/// capability: tests substitute a recording fake, production wires a
/// netlink-backed implementation (`pgw-core`'s own `datapath` module, which
/// is the one place in this workspace that talks to `rtnetlink` directly).
///
/// All operations are idempotent where the OS allows, and failures are
/// reported to the caller rather than panicking — the handlers decide
/// whether a given failure is fatal to the request (it never is; a
/// datapath programming failure is logged and the session stays up).
pub trait DatapathProgrammer: Send + Sync {
    fn add_tunnel(&self, tunnel: AddedTunnel) -> Result<(), String>;
    fn add_route(&self, route: AddedRoute) -> Result<(), String>;

    /// Add-if-absent: presence is tested by scanning existing rules for a
    /// match on `(iif_index, dst)`.
    fn add_rule(&self, rule: AddedRule) -> Result<(), String>;

    fn remove_route(&self, route: AddedRoute) -> Result<(), String>;
    fn remove_rule(&self, rule: AddedRule) -> Result<(), String>;
    fn remove_tunnel(&self, tunnel: AddedTunnel) -> Result<(), String>;
}
