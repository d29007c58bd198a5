//! Generic-netlink client for the kernel `gtp` module's PDP context table.
//!
//! `rtnetlink`'s route/link/rule surface (see [`crate::datapath`]) has no
//! notion of a GTP tunnel endpoint; that table lives behind a dedicated
//! generic-netlink family the kernel registers as `"gtp"` (`linux/gtp.h`:
//! `GTP_GENL_FAMILY_NAME`, commands `GTP_CMD_NEWPDP`/`GTP_CMD_DELPDP`,
//! attributes `GTPA_LINK`/`GTPA_VERSION`/`GTPA_PEER_ADDRESS`/
//! `GTPA_MS_ADDRESS`/`GTPA_I_TEI`/`GTPA_O_TEI`). This module speaks that
//! family directly via `genetlink`/`netlink-packet-generic`, the same
//! layering `rtnetlink` itself is built on.

use std::net::Ipv4Addr;

use futures::StreamExt;
use genetlink::GenetlinkHandle;
use genetlink::message::GenlMessage;
use netlink_packet_core::{NLM_F_ACK, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload};
use netlink_packet_generic::{GenlFamily, GenlHeader};
use netlink_packet_utils::nla::{Nla, NlasIterator};
use netlink_packet_utils::{DecodeError, Emitable, ParseableParametrized};

use service::datapath::AddedTunnel;

const GTP_GENL_FAMILY_NAME: &str = "gtp";
const GTP_GENL_VERSION: u8 = 0;

const GTP_CMD_NEWPDP: u8 = 1;
const GTP_CMD_DELPDP: u8 = 2;

const GTPA_LINK: u16 = 1;
const GTPA_VERSION: u16 = 2;
const GTPA_PEER_ADDRESS: u16 = 4;
const GTPA_MS_ADDRESS: u16 = 5;
const GTPA_I_TEI: u16 = 8;
const GTPA_O_TEI: u16 = 9;

fn ipv4_from_slice(bytes: &[u8]) -> Result<Ipv4Addr, DecodeError> {
    let octets: [u8; 4] = bytes.try_into().map_err(|_| DecodeError::from("expected 4 bytes for an IPv4 address"))?;
    Ok(Ipv4Addr::from(octets))
}

/// One `GTPA_*` attribute of a PDP context message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GtpAttr {
    Link(u32),
    Version(u32),
    PeerAddress(Ipv4Addr),
    MsAddress(Ipv4Addr),
    ITei(u32),
    OTei(u32),
}

impl Nla for GtpAttr {
    fn value_len(&self) -> usize {
        4
    }

    fn kind(&self) -> u16 {
        match self {
            Self::Link(_) => GTPA_LINK,
            Self::Version(_) => GTPA_VERSION,
            Self::PeerAddress(_) => GTPA_PEER_ADDRESS,
            Self::MsAddress(_) => GTPA_MS_ADDRESS,
            Self::ITei(_) => GTPA_I_TEI,
            Self::OTei(_) => GTPA_O_TEI,
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match *self {
            Self::Link(v) | Self::Version(v) | Self::ITei(v) | Self::OTei(v) => buffer.copy_from_slice(&v.to_ne_bytes()),
            Self::PeerAddress(ip) | Self::MsAddress(ip) => buffer.copy_from_slice(&ip.octets()),
        }
    }
}

/// A `NEWPDP`/`DELPDP` generic-netlink request: one GTPv1 PDP context,
/// keyed by the UE's address on the device named by `GTPA_LINK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtpPdpContext {
    command: u8,
    attrs: Vec<GtpAttr>,
}

impl GtpPdpContext {
    fn new_pdp(link_index: u32, tunnel: AddedTunnel) -> Self {
        Self {
            command: GTP_CMD_NEWPDP,
            attrs: vec![
                GtpAttr::Link(link_index),
                GtpAttr::Version(1),
                GtpAttr::PeerAddress(tunnel.peer_ip),
                GtpAttr::MsAddress(tunnel.ue_ip),
                GtpAttr::ITei(tunnel.inbound_teid),
                GtpAttr::OTei(tunnel.outbound_teid),
            ],
        }
    }

    fn del_pdp(link_index: u32, tunnel: AddedTunnel) -> Self {
        Self {
            command: GTP_CMD_DELPDP,
            attrs: vec![
                GtpAttr::Link(link_index),
                GtpAttr::Version(1),
                GtpAttr::PeerAddress(tunnel.peer_ip),
                GtpAttr::MsAddress(tunnel.ue_ip),
            ],
        }
    }
}

impl GenlFamily for GtpPdpContext {
    fn family_name() -> &'static str {
        GTP_GENL_FAMILY_NAME
    }

    fn command(&self) -> u8 {
        self.command
    }

    fn version(&self) -> u8 {
        GTP_GENL_VERSION
    }
}

impl Emitable for GtpPdpContext {
    fn buffer_len(&self) -> usize {
        self.attrs.as_slice().buffer_len()
    }

    fn emit(&self, buffer: &mut [u8]) {
        self.attrs.as_slice().emit(buffer)
    }
}

impl ParseableParametrized<[u8], GenlHeader> for GtpPdpContext {
    fn parse_with_param(buf: &[u8], header: GenlHeader) -> Result<Self, DecodeError> {
        let mut attrs = Vec::new();

        for nla in NlasIterator::new(buf) {
            let nla = nla?;
            let parsed = match nla.kind() {
                GTPA_LINK => GtpAttr::Link(u32::from_ne_bytes(
                    nla.value().try_into().map_err(|_| DecodeError::from("GTPA_LINK: invalid length"))?,
                )),
                GTPA_VERSION => GtpAttr::Version(u32::from_ne_bytes(
                    nla.value().try_into().map_err(|_| DecodeError::from("GTPA_VERSION: invalid length"))?,
                )),
                GTPA_PEER_ADDRESS => GtpAttr::PeerAddress(ipv4_from_slice(nla.value())?),
                GTPA_MS_ADDRESS => GtpAttr::MsAddress(ipv4_from_slice(nla.value())?),
                GTPA_I_TEI => GtpAttr::ITei(u32::from_ne_bytes(
                    nla.value().try_into().map_err(|_| DecodeError::from("GTPA_I_TEI: invalid length"))?,
                )),
                GTPA_O_TEI => GtpAttr::OTei(u32::from_ne_bytes(
                    nla.value().try_into().map_err(|_| DecodeError::from("GTPA_O_TEI: invalid length"))?,
                )),
                other => {
                    log::debug!("ignoring unknown GTPA attribute {other}");
                    continue;
                }
            };
            attrs.push(parsed);
        }

        Ok(Self { command: header.cmd, attrs })
    }
}

/// Bridges [`service::datapath::DatapathProgrammer`]'s synchronous
/// PDP-context calls to the async `genetlink` connection, the same way
/// `NetlinkDatapathProgrammer` bridges to `rtnetlink` for routes and rules.
pub struct GtpGenlClient {
    handle: GenetlinkHandle,
    link_index: u32,
}

impl GtpGenlClient {
    /// Opens the generic-netlink socket. Cheap and side-effect free beyond
    /// the socket itself; the family is resolved lazily on first request
    /// since resolution also requires a round trip.
    pub async fn connect(link_index: u32) -> Result<Self, String> {
        let (connection, handle, _) = genetlink::new_connection().map_err(|e| format!("genetlink connection: {e}"))?;
        tokio::spawn(connection);
        Ok(Self { handle, link_index })
    }

    async fn request(&mut self, context: GtpPdpContext) -> Result<(), String> {
        let family_id = self
            .handle
            .resolve_family_id::<GtpPdpContext>()
            .await
            .map_err(|e| format!("resolve {GTP_GENL_FAMILY_NAME} genetlink family: {e}"))?;

        let mut genl_message = GenlMessage::from_payload(context);
        genl_message.set_resolved_family_id(family_id);

        let mut message = NetlinkMessage::from(genl_message);
        message.header.flags = NLM_F_REQUEST | NLM_F_ACK;
        message.finalize();

        let mut responses = self.handle.request(message).await.map_err(|e| format!("genetlink request: {e}"))?;

        while let Some(response) = responses.next().await {
            if let NetlinkPayload::Error(e) = response.payload {
                return Err(format!("kernel {GTP_GENL_FAMILY_NAME} family rejected request: {e}"));
            }
        }

        Ok(())
    }

    pub async fn add_pdp_context(&mut self, tunnel: AddedTunnel) -> Result<(), String> {
        self.request(GtpPdpContext::new_pdp(self.link_index, tunnel)).await
    }

    pub async fn del_pdp_context(&mut self, tunnel: AddedTunnel) -> Result<(), String> {
        self.request(GtpPdpContext::del_pdp(self.link_index, tunnel)).await
    }
}
