//! Pluggable key/value store for publishing the gateway's own S5-C/S5-U
//! addresses, so other components (or operators) can look them up by a
//! well-known key without scraping logs.
//!
//! Modeled as an enum over concrete backends rather than a `dyn` async
//! trait object: this workspace doesn't otherwise depend on `async-trait`,
//! and three known variants fit comfortably in a `match`.

use redis::AsyncCommands;

use crate::error::GatewayError;

pub const S5C_IP_KEY: &str = "pgw_s5c_ip";
pub const S5U_IP_KEY: &str = "pgw_s5u_ip";

pub enum IpRepository {
    InMemory(parking_lot::Mutex<ahash::AHashMap<String, String>>),
    Redis(redis::Client),
    Etcd(etcd_client::Client),
}

impl IpRepository {
    pub fn in_memory() -> Self {
        Self::InMemory(parking_lot::Mutex::new(ahash::AHashMap::default()))
    }

    pub async fn connect_redis(url: &str, password: &str) -> Result<Self, GatewayError> {
        let connection_url = if password.is_empty() {
            url.to_string()
        } else {
            redis_url_with_password(url, password)
        };

        let client = redis::Client::open(connection_url).map_err(|e| GatewayError::KvFailed {
            op: "redis-connect",
            cause: e.to_string(),
        })?;

        // Fail fast: a dead Redis at startup should stop the gateway
        // before it ever binds a socket, not surface as a later timeout.
        let mut connection = client.get_multiplexed_async_connection().await.map_err(|e| GatewayError::KvFailed {
            op: "redis-ping",
            cause: e.to_string(),
        })?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await.map_err(|e| GatewayError::KvFailed {
            op: "redis-ping",
            cause: e.to_string(),
        })?;

        Ok(Self::Redis(client))
    }

    pub async fn connect_etcd(url: &str) -> Result<Self, GatewayError> {
        let client = etcd_client::Client::connect([url], None).await.map_err(|e| GatewayError::KvFailed {
            op: "etcd-connect",
            cause: e.to_string(),
        })?;

        Ok(Self::Etcd(client))
    }

    pub async fn save(&self, id: &str, ip: &str) -> Result<(), GatewayError> {
        match self {
            Self::InMemory(store) => {
                store.lock().insert(id.to_string(), ip.to_string());
                Ok(())
            }
            Self::Redis(client) => {
                let mut connection = client.get_multiplexed_async_connection().await.map_err(kv_err("redis-save"))?;
                let _: () = connection.set(id, ip).await.map_err(kv_err("redis-save"))?;
                Ok(())
            }
            Self::Etcd(client) => {
                client.kv_client().put(id, ip, None).await.map_err(kv_err("etcd-save"))?;
                Ok(())
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<String>, GatewayError> {
        match self {
            Self::InMemory(store) => Ok(store.lock().get(id).cloned()),
            Self::Redis(client) => {
                let mut connection = client.get_multiplexed_async_connection().await.map_err(kv_err("redis-get"))?;
                let value: Option<String> = connection.get(id).await.map_err(kv_err("redis-get"))?;
                Ok(value)
            }
            Self::Etcd(client) => {
                let response = client.kv_client().get(id, None).await.map_err(kv_err("etcd-get"))?;
                Ok(response.kvs().first().map(|kv| kv.value_str().unwrap_or_default().to_string()))
            }
        }
    }

    /// Best-effort delete. The original keeps this infallible from the
    /// caller's point of view — a failed delete just leaves a stale
    /// entry, which the next `save` for the same id overwrites anyway.
    pub async fn delete(&self, id: &str) {
        match self {
            Self::InMemory(store) => {
                store.lock().remove(id);
            }
            Self::Redis(client) => {
                if let Ok(mut connection) = client.get_multiplexed_async_connection().await {
                    let _: Result<(), _> = connection.del(id).await;
                }
            }
            Self::Etcd(client) => {
                if let Err(e) = client.kv_client().delete(id, None).await {
                    log::warn!("etcd delete for {id} failed: {e}");
                }
            }
        }
    }

    /// Polled by the health checker every couple of seconds; `Ok(())`
    /// means the backing store is reachable.
    pub async fn status(&self) -> Result<(), GatewayError> {
        match self {
            Self::InMemory(_) => Ok(()),
            Self::Redis(client) => {
                let mut connection = client.get_multiplexed_async_connection().await.map_err(kv_err("redis-status"))?;
                let _: String = redis::cmd("PING").query_async(&mut connection).await.map_err(kv_err("redis-status"))?;
                Ok(())
            }
            Self::Etcd(client) => {
                client.kv_client().get("health-check", None).await.map_err(kv_err("etcd-status"))?;
                Ok(())
            }
        }
    }
}

fn kv_err<E: std::fmt::Display>(op: &'static str) -> impl Fn(E) -> GatewayError {
    move |cause| GatewayError::KvFailed { op, cause: cause.to_string() }
}

fn redis_url_with_password(url: &str, password: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => format!("{scheme}://:{password}@{rest}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips_a_value() {
        let repo = IpRepository::in_memory();
        repo.save(S5C_IP_KEY, "10.0.0.1").await.unwrap();
        assert_eq!(repo.get(S5C_IP_KEY).await.unwrap().as_deref(), Some("10.0.0.1"));

        repo.delete(S5C_IP_KEY).await;
        assert_eq!(repo.get(S5C_IP_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_status_is_always_ok() {
        let repo = IpRepository::in_memory();
        assert!(repo.status().await.is_ok());
    }
}
