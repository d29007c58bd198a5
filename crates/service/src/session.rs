use std::{net::Ipv4Addr, sync::Arc};

use ahash::AHashMap;
use parking_lot::RwLock;

/// One of the four TEID slots a session tracks: the peer's received TEID
/// and the gateway's own allocated TEIDs, on both the control and user
/// planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    S5S8SgwGtpC,
    S5S8PgwGtpC,
    S5S8SgwGtpU,
    S5S8PgwGtpU,
}

#[derive(Debug, Clone, Copy)]
pub struct TunnelEndpoint {
    pub teid: u32,
    pub ip: Ipv4Addr,
}

/// A single active P-GW subscriber session. Mutable only while the Create
/// handler is assembling it; once [`SessionTable::register`] commits it, it
/// is shared read-only via `Arc`.
#[derive(Debug, Clone)]
pub struct Session {
    pub imsi: String,
    pub msisdn: String,
    pub imei: String,
    pub mcc: String,
    pub mnc: String,
    pub rat_type: u8,
    pub apn: String,
    pub ue_ip: Ipv4Addr,
    pub ebi: u8,
    pub charging_id: u32,
    teids: AHashMap<InterfaceKind, TunnelEndpoint>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        imsi: String,
        msisdn: String,
        imei: String,
        mcc: String,
        mnc: String,
        rat_type: u8,
        apn: String,
        ue_ip: Ipv4Addr,
        ebi: u8,
        charging_id: u32,
    ) -> Self {
        Self {
            imsi,
            msisdn,
            imei,
            mcc,
            mnc,
            rat_type,
            apn,
            ue_ip,
            ebi,
            charging_id,
            teids: AHashMap::default(),
        }
    }

    pub fn set_teid(&mut self, kind: InterfaceKind, endpoint: TunnelEndpoint) {
        self.teids.insert(kind, endpoint);
    }

    pub fn teid(&self, kind: InterfaceKind) -> Option<TunnelEndpoint> {
        self.teids.get(&kind).copied()
    }

    pub fn pgw_c_teid(&self) -> Option<u32> {
        self.teid(InterfaceKind::S5S8PgwGtpC).map(|t| t.teid)
    }

    pub fn sgw_c_teid(&self) -> Option<u32> {
        self.teid(InterfaceKind::S5S8SgwGtpC).map(|t| t.teid)
    }
}

#[derive(Default)]
struct Tables {
    by_imsi: AHashMap<String, Arc<Session>>,
    by_teid: AHashMap<u32, Arc<Session>>,
}

/// Process-wide session table: `IMSI -> Session` and `PGW-C TEID -> Session`,
/// kept consistent under one lock — single writer, the dispatch task;
/// readers never observe a half-updated pair of indexes.
///
/// # Test
///
/// ```
/// use std::net::Ipv4Addr;
/// use pgw_service::session::{Session, SessionTable};
///
/// let table = SessionTable::default();
/// let session = Session::new(
///     "001010123456789".into(), "819012345678".into(), "3520990000000000".into(),
///     "001".into(), "01".into(), 6, "internet".into(), Ipv4Addr::new(10, 10, 0, 5), 5, 1,
/// );
///
/// table.register(0x1000, session);
/// assert!(table.lookup_by_imsi("001010123456789").is_some());
/// assert!(table.lookup_by_teid(0x1000).is_some());
/// ```
#[derive(Default)]
pub struct SessionTable {
    tables: RwLock<Tables>,
}

impl SessionTable {
    /// Registers `session` under `pgw_c_teid`, evicting any previous session
    /// with the same IMSI first: at most one session per IMSI.
    pub fn register(&self, pgw_c_teid: u32, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let mut tables = self.tables.write();

        if let Some(previous) = tables.by_imsi.remove(&session.imsi) {
            if let Some(previous_teid) = previous.pgw_c_teid() {
                tables.by_teid.remove(&previous_teid);
            }
        }

        tables.by_imsi.insert(session.imsi.clone(), session.clone());
        tables.by_teid.insert(pgw_c_teid, session.clone());

        session
    }

    pub fn lookup_by_imsi(&self, imsi: &str) -> Option<Arc<Session>> {
        self.tables.read().by_imsi.get(imsi).cloned()
    }

    pub fn lookup_by_teid(&self, teid: u32) -> Option<Arc<Session>> {
        self.tables.read().by_teid.get(&teid).cloned()
    }

    /// Removes `session` from both indexes.
    pub fn remove(&self, session: &Arc<Session>) {
        let mut tables = self.tables.write();

        tables.by_imsi.remove(&session.imsi);
        if let Some(teid) = session.pgw_c_teid() {
            tables.by_teid.remove(&teid);
        }
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_imsi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn reattach_evicts_previous_session_before_registering_new_one() {
        let table = SessionTable::default();

        let mut first = sample_session("001010123456789");
        first.set_teid(
            InterfaceKind::S5S8SgwGtpC,
            TunnelEndpoint {
                teid: 0x11111111,
                ip: Ipv4Addr::new(192, 168, 1, 1),
            },
        );
        table.register(0x1000, first);

        assert_eq!(table.len(), 1);

        let mut second = sample_session("001010123456789");
        second.set_teid(
            InterfaceKind::S5S8SgwGtpC,
            TunnelEndpoint {
                teid: 0x33333333,
                ip: Ipv4Addr::new(192, 168, 1, 1),
            },
        );
        table.register(0x2000, second);

        assert_eq!(table.len(), 1);
        assert!(table.lookup_by_teid(0x1000).is_none());
        assert!(table.lookup_by_teid(0x2000).is_some());
    }

    #[test]
    fn remove_clears_both_indexes() {
        let table = SessionTable::default();
        let session = sample_session("001010123456789");
        let registered = table.register(0x1000, session);

        table.remove(&registered);

        assert!(table.lookup_by_imsi("001010123456789").is_none());
        assert!(table.lookup_by_teid(0x1000).is_none());
    }
}
