use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{CacheError, CacheResult, ErrorKind};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Name of the setting holding the server host or IP address.
pub const SETTING_SERVER: &str = "CACHE_SERVER";
/// Name of the setting holding the server port.
pub const SETTING_PORT: &str = "CACHE_PORT";
/// Name of the setting holding the auth secret. Empty means none.
pub const SETTING_AUTH: &str = "CACHE_AUTH";
/// Name of the setting holding the logical database index.
pub const SETTING_DB: &str = "CACHE_DB";

/// Holds the information needed to reach the backing store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreInfo {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Optionally a username, for servers with ACL users.
    pub username: Option<String>,
    /// Optionally a password that should be used for connection.
    pub password: Option<String>,
    /// The database number to use.  This is usually `0`.
    pub db: i64,
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Bound on every read and write once connected.
    pub io_timeout: Duration,
}

impl Default for StoreInfo {
    fn default() -> Self {
        StoreInfo {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
            connect_timeout: DEFAULT_TIMEOUT,
            io_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Returns true for names such as `localhost` or `cache-1.internal.example`.
fn is_valid_domain(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.trim_end_matches('.').split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

fn parse_db(value: &str) -> CacheResult<i64> {
    value.trim().parse::<i64>().map_err(|_| -> CacheError {
        (
            ErrorKind::InvalidConfig,
            "Invalid database number",
            value.to_string(),
        )
            .into()
    })
}

impl StoreInfo {
    /// Parses `redis://[<username>][:<password>@]<hostname>[:port][/<db>]`.
    ///
    /// - Basic: `redis://127.0.0.1:6379`
    /// - Password only: `redis://:password@127.0.0.1:6379`
    /// - Specifying DB: `redis://127.0.0.1:6379/2`
    pub fn from_url(input: &str) -> CacheResult<StoreInfo> {
        let url = match url::Url::parse(input) {
            Ok(url) if url.scheme() == "redis" => url,
            Ok(url) => fail!((
                ErrorKind::InvalidConfig,
                "URL provided is not a redis:// URL",
                url.scheme().to_string()
            )),
            Err(err) => fail!((
                ErrorKind::InvalidConfig,
                "Store URL did not parse",
                err.to_string()
            )),
        };
        let host = match url.host() {
            // Ipv6 is rendered without brackets so it can be resolved as is
            Some(url::Host::Domain(domain)) => domain.to_string(),
            Some(url::Host::Ipv4(v4)) => v4.to_string(),
            Some(url::Host::Ipv6(v6)) => v6.to_string(),
            None => fail!((ErrorKind::InvalidConfig, "Missing hostname")),
        };
        let username = if url.username().is_empty() {
            None
        } else {
            match percent_encoding::percent_decode(url.username().as_bytes()).decode_utf8() {
                Ok(decoded) => Some(decoded.into_owned()),
                Err(_) => fail!((
                    ErrorKind::InvalidConfig,
                    "Username is not valid UTF-8 string"
                )),
            }
        };
        let password = match url.password() {
            Some(pw) => match percent_encoding::percent_decode(pw.as_bytes()).decode_utf8() {
                Ok(decoded) => Some(decoded.into_owned()),
                Err(_) => fail!((
                    ErrorKind::InvalidConfig,
                    "Password is not valid UTF-8 string"
                )),
            },
            None => None,
        };
        let db = match url.path().trim_matches('/') {
            "" => 0,
            path => parse_db(path)?,
        };
        Ok(StoreInfo {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            username,
            password,
            db,
            ..StoreInfo::default()
        })
    }

    /// Builds the connection parameters from name/value settings, as kept
    /// in the application's configuration table: [`SETTING_SERVER`],
    /// [`SETTING_PORT`], [`SETTING_AUTH`] and [`SETTING_DB`]. Unknown names
    /// are ignored, and missing or empty values keep their defaults.
    ///
    /// The server must be an IP address or a valid domain name; port and
    /// database must be integers.
    pub fn from_settings<I, K, V>(settings: I) -> CacheResult<StoreInfo>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut info = StoreInfo::default();
        for (name, value) in settings {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                SETTING_SERVER => {
                    if value.parse::<IpAddr>().is_err() && !is_valid_domain(value) {
                        fail!((
                            ErrorKind::InvalidConfig,
                            "Server is neither an IP address nor a domain name",
                            value.to_string()
                        ));
                    }
                    info.host = value.to_string();
                }
                SETTING_PORT => {
                    info.port = value.parse::<u16>().map_err(|_| -> CacheError {
                        (ErrorKind::InvalidConfig, "Invalid port", value.to_string()).into()
                    })?;
                }
                SETTING_AUTH => info.password = Some(value.to_string()),
                SETTING_DB => info.db = parse_db(value)?,
                _ => {}
            }
        }
        Ok(info)
    }

    /// Reads the same settings as [`StoreInfo::from_settings`] from the
    /// process environment.
    pub fn from_env() -> CacheResult<StoreInfo> {
        StoreInfo::from_settings(
            [SETTING_SERVER, SETTING_PORT, SETTING_AUTH, SETTING_DB]
                .into_iter()
                .filter_map(|name| std::env::var(name).ok().map(|value| (name, value))),
        )
    }

    /// Sets the bound on establishing the connection.
    pub fn set_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the bound on every read and write.
    pub fn set_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    #[cfg(feature = "redis-store")]
    pub(crate) fn to_connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: redis::RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

impl FromStr for StoreInfo {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreInfo::from_url(s)
    }
}
