//! Connection and pool configuration
//!
//! All tunables are explicit, injectable structs. [`Defaults`] replaces the
//! process-wide mutable defaults object of older drivers: construct one at
//! startup, adjust it, and hand it to [`crate::Connection`] or
//! [`crate::Pool`] constructors.
//!
//! Connect strings use the EZConnect form:
//! - `host:port/service_name`
//! - `host/service_name`
//! - `host:port:sid`

use std::time::Duration;

use crate::constants::charset;
use crate::error::{Error, Result};
use crate::transport::TlsConfig;

/// Default listener port
pub const DEFAULT_PORT: u16 = 1521;

/// Default SDU size
pub const DEFAULT_SDU: u32 = 8192;

/// Process-wide default values, passed explicitly instead of living in
/// ambient global state.
#[derive(Debug, Clone)]
pub struct Defaults {
    /// Rows fetched per round trip once a query is executing
    pub arraysize: u32,
    /// Rows piggybacked on the execute response
    pub prefetchrows: u32,
    /// Statement cache size (0 disables caching)
    pub stmtcachesize: usize,
    /// Bound on a single network round trip; `None` means unbounded
    pub call_timeout: Option<Duration>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            arraysize: 100,
            prefetchrows: 2,
            stmtcachesize: 20,
            call_timeout: None,
        }
    }
}

/// Service identification method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMethod {
    /// Connect using service name
    ServiceName(String),
    /// Connect using SID (legacy)
    Sid(String),
}

/// Session purity requested from server-side connection brokering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Purity {
    /// No preference
    #[default]
    Default,
    /// Require a brand new session
    New,
    /// Allow reuse of a session previously used by this connection class
    Self_,
}

/// Parameters for one connection
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Host to connect to
    pub host: String,
    /// Port to connect to
    pub port: u16,
    /// Service name or SID
    pub service: ServiceMethod,
    /// Username for authentication
    pub username: String,
    /// Password for authentication
    pub(crate) password: String,
    /// Session user to assume when authenticating through a proxy account;
    /// `username`/`password` then belong to the proxy
    pub proxy_client: Option<String>,
    /// New password, set when changing the password during connect
    pub(crate) new_password: Option<String>,
    /// TLS configuration; `None` means plain TCP
    pub tls: Option<TlsConfig>,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Requested SDU size
    pub sdu: u32,
    /// Client charset id
    pub charset_id: u16,
    /// National charset id
    pub ncharset_id: u16,
    /// Connection class for server-side session brokering
    pub cclass: Option<String>,
    /// Session purity
    pub purity: Purity,
    /// Autocommit after each DML execute
    pub autocommit: bool,
}

impl ConnectParams {
    /// Create connection parameters with a service name
    pub fn new(
        host: impl Into<String>,
        port: u16,
        service_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            service: ServiceMethod::ServiceName(service_name.into()),
            username: username.into(),
            password: password.into(),
            proxy_client: None,
            new_password: None,
            tls: None,
            connect_timeout: Duration::from_secs(10),
            sdu: DEFAULT_SDU,
            charset_id: charset::UTF8,
            ncharset_id: charset::UTF16,
            cclass: None,
            purity: Purity::Default,
            autocommit: false,
        }
    }

    /// Parse an EZConnect string into connection parameters
    pub fn from_connect_string(
        connect_string: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let (host_part, service_part) = match connect_string.split_once('/') {
            Some((h, s)) if !s.is_empty() => (h, Some(s)),
            Some((h, _)) => (h, None),
            None => (connect_string, None),
        };

        let mut pieces = host_part.split(':');
        let host = pieces
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidConnectionString(connect_string.to_string()))?;
        let port = match pieces.next() {
            Some(p) => p
                .parse()
                .map_err(|_| Error::InvalidConnectionString(connect_string.to_string()))?,
            None => DEFAULT_PORT,
        };

        let service = match (service_part, pieces.next()) {
            (Some(name), None) => ServiceMethod::ServiceName(name.to_string()),
            (None, Some(sid)) => ServiceMethod::Sid(sid.to_string()),
            (None, None) => {
                return Err(Error::InvalidConnectionString(format!(
                    "{}: missing service name",
                    connect_string
                )))
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidConnectionString(connect_string.to_string()))
            }
        };

        let mut params = Self::new(host, port, "", username, password);
        params.service = service;
        Ok(params)
    }

    /// The service name, if connecting by service name
    pub fn service_name(&self) -> Option<&str> {
        match &self.service {
            ServiceMethod::ServiceName(s) => Some(s),
            ServiceMethod::Sid(_) => None,
        }
    }

    /// Enable TLS with the given configuration
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Assume the given session user after authenticating with the proxy
    /// account's credentials
    pub fn proxy_client(mut self, client: impl Into<String>) -> Self {
        self.proxy_client = Some(client.into());
        self
    }

    /// Change the password during connect
    pub fn new_password(mut self, new_password: impl Into<String>) -> Self {
        self.new_password = Some(new_password.into());
        self
    }

    /// Set the connection class for server-side brokering
    pub fn cclass(mut self, cclass: impl Into<String>) -> Self {
        self.cclass = Some(cclass.into());
        self
    }

    /// Set the session purity
    pub fn purity(mut self, purity: Purity) -> Self {
        self.purity = purity;
        self
    }

    /// Enable autocommit
    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// The connect-data descriptor sent in the connect packet
    pub(crate) fn connect_descriptor(&self) -> String {
        let service = match &self.service {
            ServiceMethod::ServiceName(name) => format!("(SERVICE_NAME={})", name),
            ServiceMethod::Sid(sid) => format!("(SID={})", sid),
        };
        format!(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL={})(HOST={})(PORT={}))(CONNECT_DATA={}))",
            if self.tls.is_some() { "tcps" } else { "tcp" },
            self.host,
            self.port,
            service
        )
    }
}

/// Behavior when the pool has no free entry and is at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetMode {
    /// Block until an entry is released
    #[default]
    Wait,
    /// Fail immediately with `PoolExhausted`
    NoWait,
    /// Block up to the given duration, then fail with `PoolTimeout`
    TimedWait(Duration),
}

/// Parameters for a connection pool
#[derive(Debug, Clone)]
pub struct PoolParams {
    /// Minimum number of sessions kept open
    pub min: u32,
    /// Maximum number of sessions
    pub max: u32,
    /// Number of sessions opened per growth step
    pub increment: u32,
    /// Whole-pool idle time after which the pool shrinks back to `min`
    pub timeout: Option<Duration>,
    /// Behavior of acquire when the pool is exhausted
    pub getmode: GetMode,
    /// Idle time after which a session is pinged before reuse
    pub ping_interval: Option<Duration>,
    /// Statement cache size for pooled sessions
    pub stmtcachesize: usize,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            min: 1,
            max: 2,
            increment: 1,
            timeout: None,
            getmode: GetMode::Wait,
            ping_interval: Some(Duration::from_secs(60)),
            stmtcachesize: 20,
        }
    }
}

impl PoolParams {
    /// Validate and normalize the parameters.
    ///
    /// A dynamic pool (min < max) must grow, so increment 0 is coerced to 1;
    /// a static pool (min == max) keeps increment 0.
    pub fn normalized(mut self) -> Result<Self> {
        if self.max == 0 {
            return Err(Error::InvalidParameter("pool max must be at least 1".into()));
        }
        if self.min > self.max {
            return Err(Error::InvalidParameter(format!(
                "pool min ({}) exceeds max ({})",
                self.min, self.max
            )));
        }
        if self.increment == 0 && self.min < self.max {
            self.increment = 1;
        }
        Ok(self)
    }

    /// A static pool never grows or shrinks past its initial fill
    pub fn is_static(&self) -> bool {
        self.min == self.max && self.increment == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ezconnect_with_port_and_service() {
        let p = ConnectParams::from_connect_string("db1:1522/orclpdb", "scott", "tiger").unwrap();
        assert_eq!(p.host, "db1");
        assert_eq!(p.port, 1522);
        assert_eq!(p.service_name(), Some("orclpdb"));
    }

    #[test]
    fn test_ezconnect_default_port() {
        let p = ConnectParams::from_connect_string("db1/orclpdb", "scott", "tiger").unwrap();
        assert_eq!(p.port, DEFAULT_PORT);
    }

    #[test]
    fn test_ezconnect_sid_form() {
        let p = ConnectParams::from_connect_string("db1:1521:ORCL", "scott", "tiger").unwrap();
        assert_eq!(p.service, ServiceMethod::Sid("ORCL".to_string()));
    }

    #[test]
    fn test_ezconnect_invalid() {
        assert!(ConnectParams::from_connect_string("", "u", "p").is_err());
        assert!(ConnectParams::from_connect_string("host:port/svc", "u", "p").is_err());
        assert!(ConnectParams::from_connect_string("host", "u", "p").is_err());
    }

    #[test]
    fn test_connect_descriptor() {
        let p = ConnectParams::new("db1", 1521, "orclpdb", "scott", "tiger");
        let desc = p.connect_descriptor();
        assert!(desc.contains("(HOST=db1)"));
        assert!(desc.contains("(PORT=1521)"));
        assert!(desc.contains("(SERVICE_NAME=orclpdb)"));
        assert!(desc.contains("(PROTOCOL=tcp)"));
    }

    #[test]
    fn test_defaults() {
        let d = Defaults::default();
        assert_eq!(d.arraysize, 100);
        assert_eq!(d.prefetchrows, 2);
        assert_eq!(d.stmtcachesize, 20);
        assert!(d.call_timeout.is_none());
    }

    #[test]
    fn test_pool_params_increment_coercion() {
        let p = PoolParams {
            min: 1,
            max: 3,
            increment: 0,
            ..Default::default()
        };
        let p = p.normalized().unwrap();
        assert_eq!(p.increment, 1);
        assert!(!p.is_static());
    }

    #[test]
    fn test_static_pool_keeps_zero_increment() {
        let p = PoolParams {
            min: 2,
            max: 2,
            increment: 0,
            ..Default::default()
        };
        let p = p.normalized().unwrap();
        assert_eq!(p.increment, 0);
        assert!(p.is_static());
    }

    #[test]
    fn test_pool_params_validation() {
        let bad = PoolParams {
            min: 5,
            max: 2,
            ..Default::default()
        };
        assert!(bad.normalized().is_err());
    }
}
