//! End-to-end exercises of the Create/Delete Session flow and health
//! reporting, wired the way the router wires them but without touching a
//! real socket or the kernel.

use std::net::Ipv4Addr;
use std::sync::Arc;

use codec::cause;
use codec::ie::{Cause, Paa};
use codec::message::{Message, MessageEncoder, MessageType};
use service::datapath::{AddedRoute, AddedRule, AddedTunnel, DatapathProgrammer};
use service::handlers::{CreateSessionHandler, DeleteSessionHandler, GatewayAddresses, SgiLink};
use service::session::SessionTable;

struct RecordingDatapath {
    tunnels_added: parking_lot::Mutex<Vec<AddedTunnel>>,
    routes_added: parking_lot::Mutex<Vec<AddedRoute>>,
}

impl RecordingDatapath {
    fn new() -> Self {
        Self { tunnels_added: parking_lot::Mutex::new(Vec::new()), routes_added: parking_lot::Mutex::new(Vec::new()) }
    }
}

impl DatapathProgrammer for RecordingDatapath {
    fn add_tunnel(&self, tunnel: AddedTunnel) -> Result<(), String> {
        self.tunnels_added.lock().push(tunnel);
        Ok(())
    }

    fn add_route(&self, route: AddedRoute) -> Result<(), String> {
        self.routes_added.lock().push(route);
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
    use codec::ie::{
        Apn, BearerContextToBeCreated, BearerContextToBeCreatedValue, Fteid, FteidValue, Imsi, InterfaceType, Mei,
        Msisdn, RatType, ServingNetwork,
    };

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
        sgw_fteid: FteidValue { interface_type: InterfaceType::S5S8SgwGtpU, teid: 0x22222222, ipv4: Ipv4Addr::new(192, 168, 1, 2) },
    });
    encoder.append::<Paa>(Ipv4Addr::new(10, 10, 0, 5));
    encoder.finish().to_vec()
}

fn encode_delete_session_request(teid: u32) -> Vec<u8> {
    MessageEncoder::new(MessageType::DeleteSessionRequest, teid, 42).finish().to_vec()
}

#[test]
fn create_then_delete_round_trips_through_the_session_table_and_datapath() {
    let sessions = Arc::new(SessionTable::default());
    let datapath = Arc::new(RecordingDatapath::new());

    let create_handler = CreateSessionHandler::new(
        GatewayAddresses { s5c_ip: Ipv4Addr::new(10, 0, 0, 1), s5u_ip: Ipv4Addr::new(10, 0, 0, 2) },
        SgiLink { ifindex: 3, name: "eth2".to_string(), subnet: Ipv4Addr::new(10, 0, 1, 0), subnet_prefix_len: 24 },
        9,
        sessions.clone(),
        datapath.clone(),
    );

    let peer: std::net::SocketAddr = "127.0.0.1:2123".parse().unwrap();
    let datagram = encode_create_session_request("001010123456789", 0x11111111);

    let outcome = create_handler.handle(peer, &datagram).unwrap();
    let response = Message::decode(&outcome.bytes).unwrap();
    assert_eq!(response.get::<Cause>().unwrap(), cause::REQUEST_ACCEPTED);
    assert_eq!(response.get::<Paa>().unwrap(), Ipv4Addr::new(10, 10, 0, 5));

    let pgw_c_teid = response.teid();
    // Response TEID is the SGW-C TEID the peer gave us, not the gateway's
    // newly allocated one, so pull the session back out by IMSI instead.
    create_handler.activate(outcome);

    assert_eq!(datapath.tunnels_added.lock().len(), 1);
    assert_eq!(datapath.routes_added.lock().len(), 2);

    let session = sessions.lookup_by_imsi("001010123456789").unwrap();
    let delete_handler = DeleteSessionHandler::new(sessions.clone());

    let delete_datagram = encode_delete_session_request(session.pgw_c_teid().unwrap());
    let delete_outcome = delete_handler.handle(peer, &delete_datagram).unwrap();
    let delete_response = Message::decode(&delete_outcome.bytes).unwrap();
    assert_eq!(delete_response.get::<Cause>().unwrap(), cause::REQUEST_ACCEPTED);

    delete_handler.commit(delete_outcome).unwrap();
    assert!(sessions.is_empty());
    let _ = pgw_c_teid;
}

#[tokio::test]
async fn ip_repository_status_reflects_the_in_memory_backend() {
    use pgw_core::ip_repository::IpRepository;

    let repo = IpRepository::in_memory();
    assert!(repo.status().await.is_ok());
}

#[tokio::test]
async fn health_report_turns_unhealthy_when_the_datastore_check_fails() {
    use pgw_core::health::HealthState;

    let state = HealthState::default();
    state.set_control_plane_ready(true);
    state.set_user_plane_ready(true);

    assert!(!state.report().is_healthy());
}
