use std::{net::SocketAddr, sync::Arc};

use codec::{
    cause,
    ie::Cause,
    message::{Message, MessageEncoder, MessageType},
};

use crate::{
    error::Error,
    middleware::MessageHandler,
    session::{Session, SessionTable},
};

/// A Delete Session Response ready to send, plus (on a hit) the session to
/// drop from the table once the send completes.
///
/// On a miss the handler still has to answer the peer with cause
/// `IMSIIMEINotKnown`, so `resolved` is `None` rather than the whole call
/// failing outright: the router sends `bytes` either way, and afterwards
/// calls [`DeleteSessionHandler::commit`], which both removes a resolved
/// session and reports back whether the TEID was known at all.
pub struct DeleteOutcome {
    pub bytes: bytes::BytesMut,
    resolved: Option<Arc<Session>>,
}

/// Handles `DeleteSessionRequest`: resolves the session by its PGW-C TEID
/// and removes it from the table.
pub struct DeleteSessionHandler {
    sessions: Arc<SessionTable>,
}

impl DeleteSessionHandler {
    pub fn new(sessions: Arc<SessionTable>) -> Self {
        Self { sessions }
    }

    fn build(&self, message: &Message<'_>) -> DeleteOutcome {
        let teid = message.teid();

        match self.sessions.lookup_by_teid(teid) {
            Some(session) => {
                let peer_teid = session.sgw_c_teid().unwrap_or_else(|| {
                    log::warn!("session for teid={teid:#x} has no recorded SGW-C TEID");
                    0
                });

                let mut encoder = MessageEncoder::new(MessageType::DeleteSessionResponse, peer_teid, message.sequence());
                encoder.append::<Cause>(cause::REQUEST_ACCEPTED);

                DeleteOutcome { bytes: encoder.finish(), resolved: Some(session) }
            }
            None => {
                let mut encoder = MessageEncoder::new(MessageType::DeleteSessionResponse, 0, message.sequence());
                encoder.append::<Cause>(cause::IMSI_IMEI_NOT_KNOWN);

                DeleteOutcome { bytes: encoder.finish(), resolved: None }
            }
        }
    }

    /// Removes the resolved session from the table, once the router has
    /// sent `outcome.bytes`. Returns [`Error::SessionNotKnown`] when the
    /// request named a TEID the gateway never had a session for, so the
    /// dispatcher can still surface that as a failed request even though a
    /// response was already sent on the wire.
    pub fn commit(&self, outcome: DeleteOutcome) -> Result<(), Error> {
        match outcome.resolved {
            Some(session) => {
                self.sessions.remove(&session);
                Ok(())
            }
            None => Err(Error::SessionNotKnown),
        }
    }
}

impl MessageHandler<Vec<u8>, DeleteOutcome> for DeleteSessionHandler {
    fn handle(&self, _peer: SocketAddr, datagram: &Vec<u8>) -> Result<DeleteOutcome, Error> {
        let message = Message::decode(datagram).map_err(|e| Error::IeDecodeFailed(e.to_string()))?;
        Ok(self.build(&message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InterfaceKind, TunnelEndpoint};
    use std::net::Ipv4Addr;

    fn sample_session(imsi: &str) -> Session {
        Session::new(
            imsi.to_string(),
            "819012345678".into(),
            "3520990000000000".into(),
            "001".into(),
            "01".into(),
            6,
            "internet".into(),
            Ipv4Addr::new(10, 10, 0, 5),
            5,
            1,
        )
    }

    fn encode_delete_session_request(teid: u32) -> Vec<u8> {
        MessageEncoder::new(MessageType::DeleteSessionRequest, teid, 42).finish().to_vec()
    }

    #[test]
    fn known_teid_responds_with_request_accepted_and_removes_session() {
        let sessions = Arc::new(SessionTable::default());
        let mut session = sample_session("001010123456789");
        session.set_teid(
            InterfaceKind::S5S8SgwGtpC,
            TunnelEndpoint { teid: 0x11111111, ip: Ipv4Addr::new(192, 168, 1, 1) },
        );
        sessions.register(0x99999999, session);

        let handler = DeleteSessionHandler::new(sessions.clone());
        let datagram = encode_delete_session_request(0x99999999);

        let outcome = handler.handle("127.0.0.1:2123".parse().unwrap(), &datagram).unwrap();
        let response = Message::decode(&outcome.bytes).unwrap();
        assert_eq!(response.teid(), 0x11111111);
        assert_eq!(response.get::<Cause>().unwrap(), cause::REQUEST_ACCEPTED);

        handler.commit(outcome).unwrap();
        assert!(sessions.is_empty());
    }

    #[test]
    fn unknown_teid_responds_with_not_known_and_surfaces_an_error() {
        let sessions = Arc::new(SessionTable::default());
        let handler = DeleteSessionHandler::new(sessions);
        let datagram = encode_delete_session_request(0xdeadbeef);

        let outcome = handler.handle("127.0.0.1:2123".parse().unwrap(), &datagram).unwrap();
        let response = Message::decode(&outcome.bytes).unwrap();
        assert_eq!(response.get::<Cause>().unwrap(), cause::IMSI_IMEI_NOT_KNOWN);

        let err = handler.commit(outcome).unwrap_err();
        assert!(matches!(err, Error::SessionNotKnown));
    }

    #[test]
    fn session_missing_sgw_c_teid_still_responds_accepted() {
        let sessions = Arc::new(SessionTable::default());
        let session = sample_session("001010123456789");
        sessions.register(0x99999999, session);

        let handler = DeleteSessionHandler::new(sessions.clone());
        let datagram = encode_delete_session_request(0x99999999);

        let outcome = handler.handle("127.0.0.1:2123".parse().unwrap(), &datagram).unwrap();
        let response = Message::decode(&outcome.bytes).unwrap();
        assert_eq!(response.teid(), 0);
        assert_eq!(response.get::<Cause>().unwrap(), cause::REQUEST_ACCEPTED);

        handler.commit(outcome).unwrap();
        assert!(sessions.is_empty());
    }
}
