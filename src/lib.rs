pub mod api;
pub mod config;
pub mod datapath;
pub mod error;
pub mod gtp_genl;
pub mod health;
pub mod interface_discovery;
pub mod ip_repository;
pub mod server;

use std::sync::Arc;

use config::{CliArgs, GatewayConfig, repository_from_args};
use server::Router;

/// Composition root: resolves the KV repository and the gateway's own
/// addresses, publishes them, then hands off to the router for the rest
/// of the process lifetime.
pub async fn startup(args: CliArgs) -> anyhow::Result<()> {
    let repository = Arc::new(repository_from_args(&args).await?);

    let (connection, handle, _) = rtnetlink::new_connection()?;
    tokio::spawn(connection);

    let config = GatewayConfig::from_env(&args, &handle).await?;
    config.validate()?;

    repository.save(ip_repository::S5C_IP_KEY, &config.s5c_ip.to_string()).await?;
    repository.save(ip_repository::S5U_IP_KEY, &config.s5u_ip.to_string()).await?;

    let router = Router::new(&config, repository.clone()).await?;
    let result = router.listen_and_serve().await;

    repository.delete(ip_repository::S5C_IP_KEY).await;
    repository.delete(ip_repository::S5U_IP_KEY).await;

    result
}
