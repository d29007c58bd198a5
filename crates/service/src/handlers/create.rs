use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use bytes::BytesMut;
use codec::{
    cause,
    ie::{
        APN_RESTRICTION_PUBLIC_2, Apn, ApnRestriction, BearerContext, BearerContextToBeCreated,
        BearerContextValue, Fteid, FteidValue, FqCsid, FqCsidValue, Imsi, InterfaceType, Mei,
        Msisdn, Paa, RatType, ServingNetwork,
    },
    message::{Message, MessageEncoder, MessageType},
};
use parking_lot::Mutex;

use crate::{
    datapath::{AddedRoute, AddedRule, AddedTunnel, DatapathProgrammer},
    error::Error,
    metrics::SESSIONS_CREATED_TOTAL,
    middleware::MessageHandler,
    session::{InterfaceKind, Session, SessionTable, TunnelEndpoint},
    teid::TeidAllocator,
};

/// The gateway's own S5-C/S5-U addresses, stripped of the UDP port which
/// the router already bound.
#[derive(Debug, Clone, Copy)]
pub struct GatewayAddresses {
    pub s5c_ip: Ipv4Addr,
    pub s5u_ip: Ipv4Addr,
}

/// The SGi-side link a session's downlink rule watches for ingress traffic.
#[derive(Debug, Clone)]
pub struct SgiLink {
    pub ifindex: u32,
    pub name: String,
    pub subnet: Ipv4Addr,
    pub subnet_prefix_len: u8,
}

/// Convention used throughout the gateway for the downlink routing table.
pub const DOWNLINK_TABLE: u32 = 3001;

/// Linux' reserved "main" routing table id.
pub const MAIN_TABLE: u32 = 254;

/// A fully validated and encoded Create Session Response, together with
/// everything needed to activate the session once the response has been
/// sent: registration and datapath programming happen only after the send
/// completes, so this carries the not-yet-committed session across that
/// boundary instead of mutating shared state inline (see DESIGN.md).
pub struct CreateOutcome {
    pub bytes: BytesMut,
    pgw_c_teid: u32,
    session: Session,
    tunnel: AddedTunnel,
    ue_ip: Ipv4Addr,
}

/// Handles `CreateSessionRequest`: validates IEs, allocates the gateway's
/// own F-TEIDs, builds the response, and on activation programs the kernel
/// datapath for the new session.
pub struct CreateSessionHandler {
    addresses: GatewayAddresses,
    sgi_link: SgiLink,
    gtp_link_index: u32,
    sessions: Arc<SessionTable>,
    control_teids: TeidAllocator,
    user_teids: TeidAllocator,
    next_charging_id: AtomicU32,
    datapath: Arc<dyn DatapathProgrammer>,
    added_routes: Mutex<Vec<AddedRoute>>,
    added_rules: Mutex<Vec<AddedRule>>,
}

impl CreateSessionHandler {
    pub fn new(
        addresses: GatewayAddresses,
        sgi_link: SgiLink,
        gtp_link_index: u32,
        sessions: Arc<SessionTable>,
        datapath: Arc<dyn DatapathProgrammer>,
    ) -> Self {
        Self {
            addresses,
            sgi_link,
            gtp_link_index,
            sessions,
            control_teids: TeidAllocator::default(),
            user_teids: TeidAllocator::default(),
            next_charging_id: AtomicU32::new(1),
            datapath,
            added_routes: Mutex::new(Vec::new()),
            added_rules: Mutex::new(Vec::new()),
        }
    }

    fn build(&self, message: &Message<'_>) -> Result<CreateOutcome, Error> {
        let imsi = message.get::<Imsi>().ok_or(Error::RequiredIeMissing("IMSI"))?;
        let msisdn = message.get::<Msisdn>().ok_or(Error::RequiredIeMissing("MSISDN"))?;
        let imei = message.get::<Mei>().ok_or(Error::RequiredIeMissing("MEI"))?;
        let apn = message.get::<Apn>().ok_or(Error::RequiredIeMissing("APN"))?;
        let (mcc, mnc) = message
            .get::<ServingNetwork>()
            .ok_or(Error::RequiredIeMissing("ServingNetwork"))?;
        let rat_type = message.get::<RatType>().ok_or(Error::RequiredIeMissing("RATType"))?;
        let sender_fteid = message
            .get::<Fteid>()
            .ok_or(Error::RequiredIeMissing("SenderFTEIDC"))?;
        let bearer = message
            .get::<BearerContextToBeCreated>()
            .ok_or(Error::RequiredIeMissing("BearerContextsToBeCreated"))?;
        let ue_ip = message.get::<Paa>().ok_or(Error::RequiredIeMissing("PAA"))?;

        let sgw_fteid = bearer.sgw_fteid;
        if !matches!(sgw_fteid.interface_type, InterfaceType::S5S8SgwGtpU) {
            return Err(Error::MissingTunnelData);
        }

        let control_teid = self.control_teids.alloc();
        let user_teid = self.user_teids.alloc();
        let charging_id = self.next_charging_id.fetch_add(1, Ordering::Relaxed);

        let mut session = Session::new(imsi, msisdn, imei, mcc, mnc, rat_type, apn, ue_ip, bearer.ebi, charging_id);
        session.set_teid(
            InterfaceKind::S5S8SgwGtpC,
            TunnelEndpoint { teid: sender_fteid.teid, ip: sender_fteid.ipv4 },
        );
        session.set_teid(
            InterfaceKind::S5S8SgwGtpU,
            TunnelEndpoint { teid: sgw_fteid.teid, ip: sgw_fteid.ipv4 },
        );
        session.set_teid(
            InterfaceKind::S5S8PgwGtpC,
            TunnelEndpoint { teid: control_teid, ip: self.addresses.s5c_ip },
        );
        session.set_teid(
            InterfaceKind::S5S8PgwGtpU,
            TunnelEndpoint { teid: user_teid, ip: self.addresses.s5u_ip },
        );

        let mut encoder = MessageEncoder::new(MessageType::CreateSessionResponse, sender_fteid.teid, message.sequence());
        encoder.append::<codec::ie::Cause>(cause::REQUEST_ACCEPTED);
        encoder.append_instance::<Fteid>(
            FteidValue { interface_type: InterfaceType::S5S8PgwGtpC, teid: control_teid, ipv4: self.addresses.s5c_ip },
            1,
        );
        encoder.append::<Paa>(ue_ip);
        encoder.append::<ApnRestriction>(APN_RESTRICTION_PUBLIC_2);
        encoder.append::<BearerContext>(BearerContextValue {
            cause: cause::REQUEST_ACCEPTED,
            ebi: bearer.ebi,
            pgw_fteid: FteidValue {
                interface_type: InterfaceType::S5S8PgwGtpU,
                teid: user_teid,
                ipv4: self.addresses.s5u_ip,
            },
            charging_id,
        });

        if let Some(sgw_fqcsid) = message.get::<FqCsid>() {
            let _ = sgw_fqcsid;
            encoder.append_instance::<FqCsid>(
                FqCsidValue { node_id: self.addresses.s5c_ip, csids: vec![1] },
                1,
            );
        }

        Ok(CreateOutcome {
            bytes: encoder.finish(),
            pgw_c_teid: control_teid,
            session,
            tunnel: AddedTunnel {
                peer_ip: sgw_fteid.ipv4,
                ue_ip,
                outbound_teid: sgw_fteid.teid,
                inbound_teid: user_teid,
            },
            ue_ip,
        })
    }

    /// Registers the session and programs the kernel datapath for it.
    /// Called by the router only after the response for `outcome` has
    /// been sent over the S5-C socket, which is also why
    /// `sessions_created_total` is incremented here rather than in the
    /// request-decoding middleware: a send failure must not count a
    /// session that was never actually stood up.
    pub fn activate(&self, outcome: CreateOutcome) {
        self.sessions.register(outcome.pgw_c_teid, outcome.session);
        SESSIONS_CREATED_TOTAL.inc();

        if let Err(cause) = self.datapath.add_tunnel(outcome.tunnel) {
            log::warn!("datapath add_tunnel failed: {cause}");
        }

        let downlink = AddedRoute {
            dst: outcome.ue_ip,
            prefix_len: 32,
            oif_index: self.gtp_link_index,
            table: DOWNLINK_TABLE,
        };
        if let Err(cause) = self.datapath.add_route(downlink) {
            log::warn!("datapath add_route (downlink) failed: {cause}");
        } else {
            self.added_routes.lock().push(downlink);
        }

        let sgi_return = AddedRoute {
            dst: self.sgi_link.subnet,
            prefix_len: self.sgi_link.subnet_prefix_len,
            oif_index: self.sgi_link.ifindex,
            table: MAIN_TABLE,
        };
        if let Err(cause) = self.datapath.add_route(sgi_return) {
            log::warn!("datapath add_route (sgi return) failed: {cause}");
        } else {
            self.added_routes.lock().push(sgi_return);
        }

        let rule = AddedRule {
            iif_index: self.sgi_link.ifindex,
            dst: outcome.ue_ip,
            prefix_len: 32,
            table: DOWNLINK_TABLE,
        };
        if let Err(cause) = self.datapath.add_rule(rule) {
            log::warn!("datapath add_rule failed: {cause}");
        } else {
            self.added_rules.lock().push(rule);
        }
    }

    /// Reverses every route/rule this handler instance has added. Only
    /// ever invoked at router shutdown, not per-session Delete (see
    /// DESIGN.md's open question on datapath delta cleanup).
    pub fn close(&self) {
        for route in self.added_routes.lock().drain(..) {
            if let Err(cause) = self.datapath.remove_route(route) {
                log::warn!("datapath remove_route failed: {cause}");
            }
        }

        for rule in self.added_rules.lock().drain(..) {
            if let Err(cause) = self.datapath.remove_rule(rule) {
                log::warn!("datapath remove_rule failed: {cause}");
            }
        }
    }
}

impl MessageHandler<Vec<u8>, CreateOutcome> for CreateSessionHandler {
    fn handle(&self, _peer: SocketAddr, datagram: &Vec<u8>) -> Result<CreateOutcome, Error> {
        let message = Message::decode(datagram).map_err(|e| Error::IeDecodeFailed(e.to_string()))?;
        self.build(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct RecordingDatapath;

    impl DatapathProgrammer for RecordingDatapath {
        fn add_tunnel(&self, _tunnel: AddedTunnel) -> Result<(), String> {
            Ok(())
        }

        fn add_route(&self, _route: AddedRoute) -> Result<(), String> {
            Ok(())
        }

        fn add_rule(&self, _rule: AddedRule) -> Result<(), String> {
            Ok(())
        }

        fn remove_route(&self, _route: AddedRoute) -> Result<(), String> {
            Ok(())
        }

        fn remove_rule(&self, _rule: AddedRule) -> Result<(), String> {
            Ok(())
        }

        fn remove_tunnel(&self, _tunnel: AddedTunnel) -> Result<(), String> {
            Ok(())
        }
    }

    fn encode_create_session_request(imsi: &str, sgw_c_teid: u32) -> Vec<u8> {
        use codec::ie::{BearerContextToBeCreatedValue, FteidValue};

        let mut encoder = MessageEncoder::new(MessageType::CreateSessionRequest, 0, 7);
        encoder.append::<Imsi>(imsi.to_string());
        encoder.append::<Msisdn>("819012345678".to_string());
        encoder.append::<Mei>("3520990000000000".to_string());
        encoder.append::<Apn>("internet".to_string());
        encoder.append::<ServingNetwork>(("001".to_string(), "01".to_string()));
        encoder.append::<RatType>(6);
        encoder.append::<Fteid>(FteidValue {
            interface_type: InterfaceType::S5S8SgwGtpC,
            teid: sgw_c_teid,
            ipv4: Ipv4Addr::new(192, 168, 1, 1),
        });
        encoder.append::<BearerContextToBeCreated>(BearerContextToBeCreatedValue {
            ebi: 5,
            sgw_fteid: FteidValue {
                interface_type: InterfaceType::S5S8SgwGtpU,
                teid: 0x22222222,
                ipv4: Ipv4Addr::new(192, 168, 1, 2),
            },
        });
        encoder.append::<Paa>(Ipv4Addr::new(10, 10, 0, 5));
        encoder.finish().to_vec()
    }

    fn sample_handler() -> CreateSessionHandler {
        CreateSessionHandler::new(
            GatewayAddresses { s5c_ip: Ipv4Addr::new(10, 0, 0, 1), s5u_ip: Ipv4Addr::new(10, 0, 0, 2) },
            SgiLink { ifindex: 3, name: "eth2".to_string(), subnet: Ipv4Addr::new(10, 0, 1, 0), subnet_prefix_len: 24 },
            9,
            Arc::new(SessionTable::default()),
            Arc::new(RecordingDatapath),
        )
    }

    #[test]
    fn happy_create_allocates_distinct_pgw_teids_and_echoes_ue_ip() {
        let handler = sample_handler();
        let datagram = encode_create_session_request("001010123456789", 0x11111111);

        let outcome = handler.handle("127.0.0.1:2123".parse().unwrap(), &datagram).unwrap();
        assert_ne!(outcome.pgw_c_teid, 0x11111111);
        assert_eq!(outcome.tunnel.ue_ip, Ipv4Addr::new(10, 10, 0, 5));
        assert_eq!(outcome.tunnel.outbound_teid, 0x22222222);

        let response = Message::decode(&outcome.bytes).unwrap();
        assert_eq!(response.teid(), 0x11111111);
        assert_eq!(response.get::<codec::ie::Cause>().unwrap(), cause::REQUEST_ACCEPTED);
        assert_eq!(response.get::<Paa>().unwrap(), Ipv4Addr::new(10, 10, 0, 5));

        handler.activate(outcome);
        assert!(handler.sessions.lookup_by_imsi("001010123456789").is_some());
    }

    #[test]
    fn missing_paa_fails_without_mutating_state() {
        let handler = sample_handler();

        let mut encoder = MessageEncoder::new(MessageType::CreateSessionRequest, 0, 1);
        encoder.append::<Imsi>("001010123456789".to_string());
        encoder.append::<Msisdn>("819012345678".to_string());
        encoder.append::<Mei>("3520990000000000".to_string());
        encoder.append::<Apn>("internet".to_string());
        encoder.append::<ServingNetwork>(("001".to_string(), "01".to_string()));
        encoder.append::<RatType>(6);
        encoder.append::<Fteid>(codec::ie::FteidValue {
            interface_type: InterfaceType::S5S8SgwGtpC,
            teid: 0x11111111,
            ipv4: Ipv4Addr::new(192, 168, 1, 1),
        });
        encoder.append::<BearerContextToBeCreated>(codec::ie::BearerContextToBeCreatedValue {
            ebi: 5,
            sgw_fteid: codec::ie::FteidValue {
                interface_type: InterfaceType::S5S8SgwGtpU,
                teid: 0x22222222,
                ipv4: Ipv4Addr::new(192, 168, 1, 2),
            },
        });
        let datagram = encoder.finish().to_vec();

        let err = handler.handle("127.0.0.1:2123".parse().unwrap(), &datagram).unwrap_err();
        assert!(matches!(err, Error::RequiredIeMissing("PAA")));
        assert_eq!(handler.sessions.len(), 0);
    }

    #[test]
    fn reattach_allocates_a_new_pgw_c_teid() {
        let handler = sample_handler();

        let first = handler
            .handle("127.0.0.1:2123".parse().unwrap(), &encode_create_session_request("001010123456789", 0x11111111))
            .unwrap();
        let first_teid = first.pgw_c_teid;
        handler.activate(first);

        let second = handler
            .handle("127.0.0.1:2123".parse().unwrap(), &encode_create_session_request("001010123456789", 0x33333333))
            .unwrap();
        let second_teid = second.pgw_c_teid;
        handler.activate(second);

        assert_ne!(first_teid, second_teid);
        assert_eq!(handler.sessions.len(), 1);
        assert!(handler.sessions.lookup_by_teid(second_teid).is_some());
    }
}
