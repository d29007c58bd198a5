use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use clap::Parser;
use rtnetlink::Handle;

use service::handlers::SgiLink;

use crate::error::GatewayError;
use crate::interface_discovery::{first_ipv4_in_network, link_index_by_name};
use crate::ip_repository::IpRepository;

pub const S5C_PORT: u16 = 2123;
pub const S5U_PORT: u16 = 2152;

#[derive(Debug, Clone, Copy, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

/// Command-line / environment arguments. Every field is also readable
/// from an environment variable, so the gateway can run unconfigured by
/// flags entirely, matching how it is normally deployed.
#[derive(Parser, Debug)]
#[command(name = "pgw-core", about = "Core GTPv2-C/GTPv1-U session engine for a PDN Gateway")]
pub struct CliArgs {
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    #[arg(long, env = "REDIS_URL", default_value = "")]
    pub redis_url: String,

    #[arg(long, env = "REDIS_PASSWORD", default_value = "")]
    pub redis_password: String,

    #[arg(long, env = "ETCD_URL", default_value = "")]
    pub etcd_url: String,

    #[arg(long, env = "S5U_NETWORK")]
    pub s5u_network: String,

    #[arg(long, env = "S5C_NETWORK")]
    pub s5c_network: String,

    #[arg(long, env = "SGI_NIC")]
    pub sgi_nic: String,

    #[arg(long, env = "SGI_SUBNET")]
    pub sgi_subnet: String,
}

/// Everything the router needs to stand the gateway up: the addresses it
/// answers S5-C/S5-U on, and the SGi-side link UE traffic returns through.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub s5c_ip: Ipv4Addr,
    pub s5u_ip: Ipv4Addr,
    pub sgi_link: SgiLink,
}

impl GatewayConfig {
    /// Checks the structural invariant the router relies on before binding
    /// sockets: both plane IPs must be set. Constructing a `GatewayConfig`
    /// only ever happens through [`GatewayConfig::from_env`], which already
    /// returns concrete `Ipv4Addr`s, so the one case this actually catches
    /// is the unspecified address (`0.0.0.0`) coming back from discovery.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.s5c_ip.is_unspecified() {
            return Err(GatewayError::InvalidConfig { reason: "s5c_ip is empty".to_string() });
        }
        if self.s5u_ip.is_unspecified() {
            return Err(GatewayError::InvalidConfig { reason: "s5u_ip is empty".to_string() });
        }
        Ok(())
    }

    /// Resolves `args` into a [`GatewayConfig`], discovering the S5-U
    /// address before the S5-C address. That order is not cosmetic: it
    /// mirrors the composition root this gateway is modeled on, which
    /// discovers the user-plane network first so a failure there is
    /// reported before any control-plane resources are touched.
    pub async fn from_env(args: &CliArgs, handle: &Handle) -> Result<Self, GatewayError> {
        let s5u_network: ipnet::Ipv4Net = args.s5u_network.parse().map_err(|_| GatewayError::InvalidConfig {
            reason: format!("S5U_NETWORK is not a valid IPv4 CIDR: {}", args.s5u_network),
        })?;
        let s5c_network: ipnet::Ipv4Net = args.s5c_network.parse().map_err(|_| GatewayError::InvalidConfig {
            reason: format!("S5C_NETWORK is not a valid IPv4 CIDR: {}", args.s5c_network),
        })?;
        let sgi_subnet: ipnet::Ipv4Net = args.sgi_subnet.parse().map_err(|_| GatewayError::InvalidConfig {
            reason: format!("SGI_SUBNET is not a valid IPv4 CIDR: {}", args.sgi_subnet),
        })?;

        let s5u_ip = first_ipv4_in_network(handle, s5u_network).await?;
        let s5c_ip = first_ipv4_in_network(handle, s5c_network).await?;

        // Resolving the SGi link is logged-and-tolerated, not fatal: a
        // missing link only breaks the datapath programmer's route/rule
        // calls later, which already report failures without crashing the
        // control plane that doesn't depend on SGi being up yet.
        let sgi_ifindex = match link_index_by_name(handle, &args.sgi_nic).await {
            Ok(index) => index,
            Err(e) => {
                log::warn!("failed to resolve SGi link {}: {e}", args.sgi_nic);
                0
            }
        };

        Ok(Self {
            s5c_ip,
            s5u_ip,
            sgi_link: SgiLink {
                ifindex: sgi_ifindex,
                name: args.sgi_nic.clone(),
                subnet: sgi_subnet.network(),
                subnet_prefix_len: sgi_subnet.prefix_len(),
            },
        })
    }

    pub fn control_address(&self) -> SocketAddr {
        SocketAddr::from((self.s5c_ip, S5C_PORT))
    }

    pub fn user_address(&self) -> SocketAddr {
        SocketAddr::from((self.s5u_ip, S5U_PORT))
    }
}

/// Picks the first configured KV backend: Redis, then etcd, then the
/// in-process fallback. Mirrors `getRepository`'s precedence exactly.
pub async fn repository_from_args(args: &CliArgs) -> Result<IpRepository, GatewayError> {
    if !args.redis_url.is_empty() {
        return IpRepository::connect_redis(&args.redis_url, &args.redis_password).await;
    }

    if !args.etcd_url.is_empty() {
        return IpRepository::connect_etcd(&args.etcd_url).await;
    }

    Ok(IpRepository::in_memory())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(s5c_ip: Ipv4Addr, s5u_ip: Ipv4Addr) -> GatewayConfig {
        GatewayConfig {
            s5c_ip,
            s5u_ip,
            sgi_link: SgiLink { ifindex: 3, name: "eth2".to_string(), subnet: Ipv4Addr::new(10, 0, 1, 0), subnet_prefix_len: 24 },
        }
    }

    #[test]
    fn validate_accepts_two_concrete_ips() {
        let config = sample_config(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_an_unspecified_s5c_ip() {
        let config = sample_config(Ipv4Addr::UNSPECIFIED, Ipv4Addr::new(10, 0, 0, 2));
        assert!(matches!(config.validate(), Err(GatewayError::InvalidConfig { .. })));
    }

    #[test]
    fn control_and_user_addresses_use_the_fixed_gtp_ports() {
        let config = sample_config(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(config.control_address(), SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), S5C_PORT)));
        assert_eq!(config.user_address(), SocketAddr::from((Ipv4Addr::new(10, 0, 0, 2), S5U_PORT)));
    }
}
