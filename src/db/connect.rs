use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;

use crate::config::DatabaseConfig;
use crate::error::AgentError;

/// Connection settings handed in by the credentials provider. Field presence
/// is enforced by the caller, not here.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub trust_certificate: bool,
    pub timeout_seconds: u64,
}

impl From<&DatabaseConfig> for Credentials {
    fn from(cfg: &DatabaseConfig) -> Self {
        Self {
            server: cfg.server.clone(),
            port: cfg.port,
            database: cfg.database.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            trust_certificate: cfg.trust_certificate,
            timeout_seconds: cfg.timeout_seconds,
        }
    }
}

impl Credentials {
    /// Builds the driver keyword/value connection string. Parameter names are
    /// specific to rust-postgres and are the compatibility surface to touch
    /// when swapping drivers. Encryption is always requested; certificate
    /// trust is handled by the TLS connector, not the string.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} connect_timeout={} sslmode=prefer",
            quote_conn_value(&self.server),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            self.timeout_seconds,
        )
    }

    /// TLS connector honoring the trust-certificate flag.
    pub fn tls_connector(&self) -> Result<MakeTlsConnector, AgentError> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(self.trust_certificate)
            .danger_accept_invalid_hostnames(self.trust_certificate)
            .build()
            .map_err(|e| AgentError::Connection(format!("TLS setup failed: {}", e)))?;
        Ok(MakeTlsConnector::new(connector))
    }
}

/// Quotes a connection-string value per the libpq keyword/value rules:
/// values with spaces, quotes or backslashes (and empty values) are wrapped
/// in single quotes with backslash escapes.
fn quote_conn_value(value: &str) -> String {
    if !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\')
    {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Heuristic troubleshooting guidance keyed by substring match on the driver
/// error. Advisory only, not an authoritative classification.
pub fn troubleshooting_hint(error_msg: &str) -> &'static str {
    let lower = error_msg.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "\n\nTroubleshooting timeout issues:\n\
         1. Check that the server host name is correct\n\
         2. Verify firewall rules allow your IP address\n\
         3. Confirm the server port (default 5432) is reachable\n\
         4. Check that the database is online and accessible"
    } else if lower.contains("password") || lower.contains("authentication") || lower.contains("login") {
        "\n\nTroubleshooting login issues:\n\
         1. Verify the username and password are correct\n\
         2. Check that the user has permission to access the database\n\
         3. Confirm the database name is correct"
    } else if lower.contains("ssl") || lower.contains("certificate") || lower.contains("tls") {
        "\n\nTroubleshooting SSL/certificate issues:\n\
         1. Try enabling the trust-certificate option\n\
         2. Check the server's TLS configuration"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            server: "db.example.com".into(),
            port: 5432,
            database: "adventureworks".into(),
            username: "reader".into(),
            password: "secret".into(),
            trust_certificate: false,
            timeout_seconds: 30,
        }
    }

    #[test]
    fn connection_string_carries_all_fields() {
        let s = creds().connection_string();
        assert!(s.contains("host=db.example.com"));
        assert!(s.contains("port=5432"));
        assert!(s.contains("dbname=adventureworks"));
        assert!(s.contains("user=reader"));
        assert!(s.contains("password=secret"));
        assert!(s.contains("connect_timeout=30"));
        assert!(s.contains("sslmode=prefer"));
    }

    #[test]
    fn password_with_spaces_and_quotes_is_quoted() {
        let mut c = creds();
        c.password = "p@ss 'word'\\".into();
        let s = c.connection_string();
        assert!(s.contains(r"password='p@ss \'word\'\\'"));
    }

    #[test]
    fn empty_password_is_quoted() {
        let mut c = creds();
        c.password = String::new();
        assert!(c.connection_string().contains("password=''"));
    }

    #[test]
    fn hints_are_keyed_by_error_text() {
        assert!(troubleshooting_hint("connection timed out").contains("timeout"));
        assert!(troubleshooting_hint("password authentication failed for user").contains("login"));
        assert!(troubleshooting_hint("SSL error: certificate verify failed").contains("certificate"));
        assert!(troubleshooting_hint("something else entirely").is_empty());
    }
}
