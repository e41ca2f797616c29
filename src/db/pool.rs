use postgres::Client;
use postgres_native_tls::MakeTlsConnector;
use r2d2::{ManageConnection, Pool};
use std::time::Duration;

use crate::db::connect::Credentials;
use crate::error::AgentError;

pub struct PgConnectionManager {
    connection_string: String,
    tls: MakeTlsConnector,
}

impl PgConnectionManager {
    pub fn new(connection_string: String, tls: MakeTlsConnector) -> Self {
        Self {
            connection_string,
            tls,
        }
    }
}

impl ManageConnection for PgConnectionManager {
    type Connection = Client;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Client::connect(&self.connection_string, self.tls.clone())
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.simple_query("SELECT 1").map(|_| ())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

/// Builds the connection pool for a session. Every checkout is validated with
/// a ping, and connections are recycled after `recycle_seconds` so the pool
/// survives idle-timeout disconnects from the remote database.
pub fn build_pool(
    credentials: &Credentials,
    pool_size: u32,
    recycle_seconds: u64,
) -> Result<Pool<PgConnectionManager>, AgentError> {
    let tls = credentials.tls_connector()?;
    let manager = PgConnectionManager::new(credentials.connection_string(), tls);

    Pool::builder()
        .max_size(pool_size)
        .test_on_check_out(true)
        .max_lifetime(Some(Duration::from_secs(recycle_seconds)))
        .connection_timeout(Duration::from_secs(credentials.timeout_seconds))
        .build(manager)
        .map_err(|e| AgentError::Connection(e.to_string()))
}
