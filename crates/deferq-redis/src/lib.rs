//! Redis backing store for deferq.
//!
//! Maps the store contract onto Redis primitives: the holding collection
//! is a sorted set (`ZADD`/`ZRANGEBYSCORE`/`ZREMRANGEBYSCORE`/`ZCARD`),
//! the destination queue a list (`RPUSH`/`BLPOP`), and atomic promotion a
//! Lua script, available since Redis 2.6.0.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use deferq_store::{ConnectionId, DelayStore, Score, ServerVersion, StoreError};

/// Select, append, and delete in one server-side step.
const PROMOTE_SCRIPT: &str = r#"
local ready = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
if #ready == 0 then
    return 0
end
redis.call('RPUSH', KEYS[2], unpack(ready))
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
return #ready
"#;

/// A [`DelayStore`] over one multiplexed Redis connection.
///
/// Cloning shares the underlying connection and therefore its
/// [`ConnectionId`]; open a second [`RedisStore::connect`] for consumers.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    version: ServerVersion,
    id: ConnectionId,
}

impl RedisStore {
    /// Open a connection to `url` (e.g. `redis://localhost:6379`) and read
    /// the server's version from `INFO server`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(connection_error)?;
        let mut conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(connection_error)?;

        let info: String = redis::cmd("INFO")
            .arg("server")
            .query_async(&mut conn)
            .await
            .map_err(connection_error)?;
        let version = parse_info_version(&info)?;
        debug!(%version, "connected to redis");

        Ok(Self {
            conn,
            version,
            id: ConnectionId::new(),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl DelayStore for RedisStore {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    async fn server_version(&self) -> Result<ServerVersion, StoreError> {
        Ok(self.version)
    }

    async fn sorted_insert(
        &self,
        key: &str,
        score: Score,
        member: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let added: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(connection_error)?;
        Ok(added == 1)
    }

    async fn sorted_range(
        &self,
        key: &str,
        min: Score,
        max: Score,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(connection_error)?;
        Ok(members)
    }

    async fn sorted_remove_range(
        &self,
        key: &str,
        min: Score,
        max: Score,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(connection_error)?;
        Ok(removed)
    }

    async fn sorted_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let len: u64 = redis::cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(connection_error)?;
        Ok(len)
    }

    async fn queue_push(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        if members.is_empty() {
            let len: u64 = redis::cmd("LLEN")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(connection_error)?;
            return Ok(len);
        }
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(key);
        for member in members {
            cmd.arg(member);
        }
        let len: u64 = cmd.query_async(&mut conn).await.map_err(connection_error)?;
        Ok(len)
    }

    async fn queue_blocking_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        // BLPOP takes whole seconds; round sub-second waits up so they
        // still block, and keep zero as "wait forever".
        let timeout_secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(connection_error)?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn promote_atomic(
        &self,
        from: &str,
        to: &str,
        max_score: Score,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let moved: u64 = redis::Script::new(PROMOTE_SCRIPT)
            .key(from)
            .key(to)
            .arg(max_score)
            .invoke_async(&mut conn)
            .await
            .map_err(connection_error)?;
        Ok(moved)
    }
}

fn connection_error(e: redis::RedisError) -> StoreError {
    StoreError::Connection(e.to_string())
}

/// Pull `redis_version:` out of an `INFO server` reply.
fn parse_info_version(info: &str) -> Result<ServerVersion, StoreError> {
    info.lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .and_then(ServerVersion::parse)
        .ok_or_else(|| StoreError::Protocol("missing or unparsable redis_version".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_version() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_git_sha1:0\r\n";
        assert_eq!(
            parse_info_version(info).unwrap(),
            ServerVersion::new(7, 2, 4)
        );
    }

    #[test]
    fn test_parse_info_version_missing() {
        assert!(matches!(
            parse_info_version("# Server\r\nuptime:1\r\n"),
            Err(StoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_info_version_garbage() {
        assert!(matches!(
            parse_info_version("redis_version:banana\r\n"),
            Err(StoreError::Protocol(_))
        ));
    }
}
