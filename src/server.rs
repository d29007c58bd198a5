//! Router/orchestrator: binds the S5-C and S5-U sockets and the HTTP
//! management surface, dispatches datagrams to decorated handlers, and
//! owns the whole gateway's graceful shutdown sequence.

use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use rtnetlink::Handle;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use codec::message::{MessageType, peek_message_type};
use service::handlers::{CreateSessionHandler, DeleteSessionHandler, GatewayAddresses};
use service::middleware::{Logger, MessageHandler};
use service::session::SessionTable;

use crate::config::GatewayConfig;
use crate::datapath::{self, GtpSockets, NetlinkDatapathProgrammer};
use crate::error::GatewayError;
use crate::gtp_genl::GtpGenlClient;
use crate::health::HealthState;
use crate::ip_repository::IpRepository;

const MANAGEMENT_BIND: &str = "0.0.0.0:8080";
const MAX_DATAGRAM: usize = 2048;

/// A bound, up kernel GTP link plus the netlink handle used to program it,
/// torn down together at [`Router::close`].
struct KernelGtp {
    handle: Handle,
    link_index: u32,
}

pub struct Router {
    control_socket: Arc<UdpSocket>,
    user_socket: Arc<UdpSocket>,
    create_handler: Arc<Logger<CreateSessionHandler>>,
    delete_handler: Arc<Logger<DeleteSessionHandler>>,
    kernel_gtp: KernelGtp,
    health: Arc<HealthState>,
    repository: Arc<IpRepository>,
    shutdown: CancellationToken,
}

impl Router {
    /// Validates `config`, binds both plane sockets, enables kernel GTP on
    /// the user plane, connects the PDP-context genetlink client, and only
    /// then registers the Create/Delete handlers under their decorators:
    /// the Create handler needs the GTP link's real ifindex and a working
    /// genetlink connection before it can program a tunnel.
    pub async fn new(config: &GatewayConfig, repository: Arc<IpRepository>) -> Result<Self, GatewayError> {
        let control_socket = Arc::new(
            UdpSocket::bind(config.control_address())
                .await
                .map_err(|e| GatewayError::InvalidConfig { reason: format!("bind S5-C socket: {e}") })?,
        );
        let user_socket = Arc::new(
            UdpSocket::bind(config.user_address())
                .await
                .map_err(|e| GatewayError::InvalidConfig { reason: format!("bind S5-U socket: {e}") })?,
        );

        let (connection, handle, _) = rtnetlink::new_connection()
            .map_err(|e| GatewayError::InvalidConfig { reason: format!("netlink connection: {e}") })?;
        tokio::spawn(connection);

        let gtp_sockets = GtpSockets { control_fd: control_socket.as_raw_fd(), user_fd: user_socket.as_raw_fd() };

        let link_index = match datapath::create_gtp_link(&handle, gtp_sockets).await {
            Ok(index) => index,
            Err(cause) => {
                log::warn!("failed to enable kernel GTP: {cause}");
                0
            }
        };

        let gtp_genl = if link_index != 0 {
            match GtpGenlClient::connect(link_index).await {
                Ok(client) => Some(client),
                Err(cause) => {
                    log::warn!("failed to connect to the kernel gtp genetlink family: {cause}");
                    None
                }
            }
        } else {
            None
        };

        let datapath: Arc<NetlinkDatapathProgrammer> =
            Arc::new(NetlinkDatapathProgrammer::new(handle.clone(), gtp_genl));

        let sessions = Arc::new(SessionTable::default());

        let create_handler = Arc::new(Logger::new(
            "CreateSessionRequest",
            CreateSessionHandler::new(
                GatewayAddresses { s5c_ip: config.s5c_ip, s5u_ip: config.s5u_ip },
                config.sgi_link.clone(),
                link_index,
                sessions.clone(),
                datapath.clone(),
            ),
        ));
        let delete_handler = Arc::new(Logger::new("DeleteSessionRequest", DeleteSessionHandler::new(sessions.clone())));

        Ok(Self {
            control_socket,
            user_socket,
            create_handler,
            delete_handler,
            kernel_gtp: KernelGtp { handle, link_index },
            health: Arc::new(HealthState::default()),
            repository,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn health(&self) -> Arc<HealthState> {
        self.health.clone()
    }

    /// Spawns the S5-C, S5-U, HTTP management, and health-polling tasks,
    /// then blocks until a shutdown signal or a fatal task error. Always
    /// runs [`Router::close`] before returning.
    pub async fn listen_and_serve(self) -> anyhow::Result<()> {
        let shutdown = self.shutdown.clone();

        let control = tokio::spawn(control_plane_loop(
            self.control_socket.clone(),
            self.create_handler.clone(),
            self.delete_handler.clone(),
            self.health.clone(),
            shutdown.clone(),
        ));
        let user = tokio::spawn(user_plane_loop(self.user_socket.clone(), self.health.clone(), shutdown.clone()));
        let http = tokio::spawn(crate::api::start_server(MANAGEMENT_BIND.parse().unwrap(), self.health.clone()));
        let health_poller = tokio::spawn(crate::health::run(self.health.clone(), self.repository.clone(), shutdown.clone()));

        let mut signal_int = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
        let mut signal_hup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

        log::info!("P-GW server has started");

        tokio::select! {
            _ = signal_int.recv() => log::info!("received SIGINT, shutting down"),
            _ = signal_hup.recv() => log::info!("received SIGHUP, shutting down"),
            result = control => {
                if let Err(e) = result {
                    log::error!("control plane task panicked: {e}");
                }
            }
            result = user => {
                if let Err(e) = result {
                    log::error!("user plane task panicked: {e}");
                }
            }
            result = http => {
                if let Err(e) = result {
                    log::error!("management api task panicked: {e}");
                }
            }
        }

        self.shutdown.cancel();
        health_poller.abort();
        self.close().await;

        Ok(())
    }

    /// Removes every route/rule the handlers added, deletes the kernel GTP
    /// link, and drops the sockets. Every step is logged and non-fatal;
    /// shutdown always proceeds to completion.
    async fn close(&self) {
        self.create_handler.inner().close();

        if self.kernel_gtp.link_index != 0 {
            if let Err(cause) = datapath::delete_gtp_link(&self.kernel_gtp.handle, self.kernel_gtp.link_index).await {
                log::warn!("failed to delete kernel GTP link: {cause}");
            }
        }
    }
}

async fn control_plane_loop(
    socket: Arc<UdpSocket>,
    create_handler: Arc<Logger<CreateSessionHandler>>,
    delete_handler: Arc<Logger<DeleteSessionHandler>>,
    health: Arc<HealthState>,
    shutdown: CancellationToken,
) {
    health.set_control_plane_ready(true);
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        let (size, peer) = tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("S5-C recv failed: {e}");
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        dispatch_control_message(&socket, &create_handler, &delete_handler, peer, &buf[..size]).await;
    }

    health.set_control_plane_ready(false);
}

async fn dispatch_control_message(
    socket: &UdpSocket,
    create_handler: &Arc<Logger<CreateSessionHandler>>,
    delete_handler: &Arc<Logger<DeleteSessionHandler>>,
    peer: SocketAddr,
    datagram: &[u8],
) {
    let Some(message_type) = peek_message_type(datagram) else {
        log::warn!("dropping undersized datagram from {peer}");
        return;
    };

    match message_type {
        MessageType::CreateSessionRequest => {
            let datagram = datagram.to_vec();
            match create_handler.handle(peer, &datagram) {
                Ok(outcome) => {
                    if let Err(e) = socket.send_to(&outcome.bytes, peer).await {
                        log::warn!("failed to send Create Session Response to {peer}: {e}");
                        return;
                    }
                    create_handler.inner().activate(outcome);
                }
                Err(e) => log::warn!("Create Session Request from {peer} rejected: {e}"),
            }
        }
        MessageType::DeleteSessionRequest => {
            let datagram = datagram.to_vec();
            match delete_handler.handle(peer, &datagram) {
                Ok(outcome) => {
                    let bytes = outcome.bytes.clone();
                    if let Err(e) = socket.send_to(&bytes, peer).await {
                        log::warn!("failed to send Delete Session Response to {peer}: {e}");
                        return;
                    }
                    if let Err(e) = delete_handler.inner().commit(outcome) {
                        log::warn!("Delete Session Request from {peer} failed: {e}");
                    }
                }
                Err(e) => log::warn!("Delete Session Request from {peer} undecodable: {e}"),
            }
        }
        other => {
            log::debug!("ignoring unhandled message type {other:?} from {peer}");
        }
    }
}

async fn user_plane_loop(socket: Arc<UdpSocket>, health: Arc<HealthState>, shutdown: CancellationToken) {
    health.set_user_plane_ready(true);
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok((size, peer)) => {
                    log::debug!("S5-U datagram from {peer} ({size} bytes) not intercepted by the kernel");
                }
                Err(e) => log::warn!("S5-U recv failed: {e}"),
            },
            _ = shutdown.cancelled() => break,
        }
    }

    health.set_user_plane_ready(false);
}
