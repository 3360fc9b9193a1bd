//! Low-level Redis store client.
//!
//! A thin typed layer over the `redis` crate: one multiplexed command
//! connection for reads and probes, plus a factory for the subscriber
//! connection. Every operation is one send, one outcome — there is no
//! connection manager and no silent retry; a transport failure surfaces to
//! the caller, who decides whether to re-run `connect`.

use std::collections::HashMap;
use std::time::Duration;

use redis::aio::{MultiplexedConnection, PubSub};
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use jobscope_core::{ConnectionInfo, Error, Result};

/// Command-connection handle plus the endpoint descriptor captured at
/// connect time.
///
/// The underlying multiplexed connection is cheaply cloneable; concurrent
/// probes each clone it and issue independent requests. Dropping the client
/// releases both the connection and its socket — in-flight requests on
/// clones drain on their own handles, so drop is the graceful close and no
/// separate forced-close path is needed at this layer.
#[derive(Debug)]
pub struct StoreClient {
    client: Client,
    conn: MultiplexedConnection,
    info: ConnectionInfo,
}

impl StoreClient {
    /// Open the command connection, waiting at most `connect_timeout` for
    /// the broker's first ready/error.
    pub async fn open(endpoint: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(endpoint)?;
        let info = describe(&client);

        let conn = match tokio::time::timeout(
            connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(conn) => conn?,
            Err(_) => {
                return Err(Error::Transport(format!(
                    "broker did not become ready within {}ms",
                    connect_timeout.as_millis()
                )))
            }
        };

        debug!(endpoint = %info, "Store client connected");
        Ok(Self { client, conn, info })
    }

    /// Endpoint descriptor (host, port, db) of this connection.
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// Ordered range-read of a list, inclusive indices.
    pub async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let ids: Vec<String> = self.conn().lrange(key, start, stop).await?;
        Ok(ids)
    }

    /// Cardinality of a list.
    pub async fn list_len(&self, key: &str) -> Result<u64> {
        let len: u64 = self.conn().llen(key).await?;
        Ok(len)
    }

    /// Position of a member in a list, `None` when absent.
    pub async fn list_position(&self, key: &str, member: &str) -> Result<Option<u64>> {
        let pos: Option<u64> = self
            .conn()
            .lpos(key, member, redis::LposOptions::default())
            .await?;
        Ok(pos)
    }

    /// Ordered range-read of a sorted set, inclusive rank indices.
    /// Descending reads newest-first for timestamp-scored sets.
    pub async fn sorted_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        ascending: bool,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let ids: Vec<String> = if ascending {
            conn.zrange(key, start, stop).await?
        } else {
            conn.zrevrange(key, start, stop).await?
        };
        Ok(ids)
    }

    /// Ordered range-read of a sorted set with member scores.
    pub async fn sorted_range_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        ascending: bool,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn();
        let members: Vec<(String, f64)> = if ascending {
            conn.zrange_withscores(key, start, stop).await?
        } else {
            conn.zrevrange_withscores(key, start, stop).await?
        };
        Ok(members)
    }

    /// Cardinality of a sorted set.
    pub async fn sorted_len(&self, key: &str) -> Result<u64> {
        let len: u64 = self.conn().zcard(key).await?;
        Ok(len)
    }

    /// Score of a member in a sorted set, `None` when absent.
    pub async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let score: Option<f64> = self.conn().zscore(key, member).await?;
        Ok(score)
    }

    /// All fields of a record hash. Empty map when the key does not exist.
    pub async fn record(&self, key: &str) -> Result<HashMap<String, String>> {
        let fields: HashMap<String, String> = self.conn().hgetall(key).await?;
        Ok(fields)
    }

    /// Cursor-scan all keys matching a glob pattern until the cursor
    /// returns to the zero sentinel.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    /// The broker's `notify-keyspace-events` flag string.
    ///
    /// Returns `None` when the CONFIG command is unavailable (managed Redis
    /// commonly disables it), in which case subscription proceeds
    /// unverified.
    pub async fn notify_flags(&self) -> Result<Option<String>> {
        let mut conn = self.conn();
        let reply: redis::RedisResult<Vec<String>> = redis::cmd("CONFIG")
            .arg("GET")
            .arg("notify-keyspace-events")
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(pair) => Ok(pair.into_iter().nth(1)),
            Err(e) => {
                warn!(error = %e, "CONFIG GET unavailable, skipping keyspace-event verification");
                Ok(None)
            }
        }
    }

    /// Open the subscriber connection. The caller owns its lifecycle.
    pub async fn open_subscriber(&self) -> Result<PubSub> {
        let pubsub = self.client.get_async_pubsub().await?;
        Ok(pubsub)
    }
}

/// Extract the diagnostic endpoint descriptor from a parsed client.
fn describe(client: &Client) -> ConnectionInfo {
    let ci = client.get_connection_info();
    let (host, port) = match &ci.addr {
        redis::ConnectionAddr::Tcp(host, port) => (host.clone(), *port),
        redis::ConnectionAddr::TcpTls { host, port, .. } => (host.clone(), *port),
        redis::ConnectionAddr::Unix(path) => (path.display().to_string(), 0),
    };
    ConnectionInfo {
        host,
        port,
        db: ci.redis.db,
    }
}
