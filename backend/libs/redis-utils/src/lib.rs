use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, IntoConnectionInfo};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Redis connection pool backed by a single multiplexed connection manager.
pub struct RedisPool {
    manager: SharedConnectionManager,
    address: String,
}

impl RedisPool {
    /// Connect to `redis_url`, giving up after `connect_timeout`.
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let address = describe_addr(&info.addr);

        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .with_context(|| format!("timed out connecting to Redis at {}", address))?
            .context("failed to initialize Redis connection manager")?;

        info!(address = %address, "Redis connection manager initialized");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
            address,
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    /// Host and port of the server, without credentials.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Round-trip a PING to verify the connection is usable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.lock().await.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;

        anyhow::ensure!(pong == "PONG", "unexpected PING reply: {}", pong);
        Ok(())
    }
}

fn describe_addr(addr: &ConnectionAddr) -> String {
    match addr {
        ConnectionAddr::Tcp(host, port) => format!("{}:{}", host, port),
        ConnectionAddr::TcpTls { host, port, .. } => format!("{}:{} (tls)", host, port),
        ConnectionAddr::Unix(path) => path.display().to_string(),
        #[allow(unreachable_patterns)]
        _ => "redis".to_string(),
    }
}
