// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Resolved connection parameters and the transfer target.
//!
//! `RawConnectionSettings` is whatever the command line / environment handed
//! us. `ConnectionConfig::derive` turns it into the immutable set of network
//! parameters the transport is built from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::debug;
use url::Url;

use crate::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_PLAIN_PORT, DEFAULT_SETTINGS_FILE, DEFAULT_TLS_PORT};
use crate::error::ConfigError;

/// Unresolved connection input, one field per user-facing option.
#[derive(Clone, Default)]
pub struct RawConnectionSettings {
    /// Full endpoint URL, e.g. `https://store.example:9000`
    pub host_url: Option<String>,
    /// Explicit `host:port` to dial; wins over the URL's authority
    pub address: Option<String>,
    /// Name checked against the server certificate
    pub server_name: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub skip_verify: bool,
    pub buffer_size: usize,
    pub region: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub operation_timeout: Option<Duration>,
}

// Hand-written so a debug dump never grows a credential field by accident.
impl fmt::Debug for RawConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawConnectionSettings")
            .field("host_url", &self.host_url)
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .field("ca_file", &self.ca_file)
            .field("skip_verify", &self.skip_verify)
            .field("buffer_size", &self.buffer_size)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Network parameters for one run. Immutable once derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `host:port` every connection is dialed to
    pub address: String,
    pub use_tls: bool,
    /// Certificate name; empty only when TLS is off
    pub server_name: String,
    pub ca_file: Option<PathBuf>,
    pub skip_verify: bool,
    pub buffer_size: usize,
    /// Plain-scheme URL handed to the endpoint resolver
    pub endpoint_url: String,
    pub signing_region: Option<String>,
    /// Bound on dial + handshake. `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Bound on each SDK operation. `None` waits forever.
    pub operation_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Resolve raw settings into a validated configuration.
    pub fn derive(raw: &RawConnectionSettings) -> Result<Self, ConfigError> {
        if raw.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        let explicit_address = non_empty(raw.address.as_deref());
        let explicit_server_name = non_empty(raw.server_name.as_deref());

        let (address, use_tls, derived_server_name, endpoint_url) =
            match non_empty(raw.host_url.as_deref()) {
                Some(host_url) => {
                    let url = Url::parse(host_url).map_err(|source| ConfigError::MalformedUrl {
                        url: host_url.to_string(),
                        source,
                    })?;
                    let (use_tls, default_port) = match url.scheme() {
                        "https" => (true, DEFAULT_TLS_PORT),
                        "http" => (false, DEFAULT_PLAIN_PORT),
                        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
                    };
                    let host = url.host_str().filter(|h| !h.is_empty());
                    let authority = host.map(|h| match url.port() {
                        Some(port) => format!("{h}:{port}"),
                        None => h.to_string(),
                    });

                    let address = match (explicit_address, host) {
                        (Some(addr), _) => with_default_port(addr, default_port)?,
                        (None, Some(h)) => {
                            format!("{}:{}", h, url.port().unwrap_or(default_port))
                        }
                        (None, None) => return Err(ConfigError::MissingAddress),
                    };

                    // TLS terminates in the dialer, so the SDK only ever sees http://
                    let endpoint_url = match (&authority, use_tls) {
                        (Some(auth), true) => format!("http://{auth}"),
                        (Some(_), false) => host_url.trim_end_matches('/').to_string(),
                        (None, _) => format!("http://{address}"),
                    };
                    let server_name = host.map(|h| h.trim_matches(['[', ']']).to_string());
                    (address, use_tls, server_name, endpoint_url)
                }
                None => {
                    let addr = explicit_address.ok_or(ConfigError::MissingAddress)?;
                    let address = with_default_port(addr, DEFAULT_PLAIN_PORT)?;
                    let endpoint_url = format!("http://{address}");
                    (address, false, None, endpoint_url)
                }
            };

        let server_name = explicit_server_name
            .map(str::to_string)
            .or(derived_server_name)
            .unwrap_or_default();
        if use_tls && server_name.is_empty() {
            return Err(ConfigError::MissingServerName);
        }

        let cfg = ConnectionConfig {
            address,
            use_tls,
            server_name,
            ca_file: raw.ca_file.clone(),
            skip_verify: raw.skip_verify,
            buffer_size: raw.buffer_size,
            endpoint_url,
            signing_region: non_empty(raw.region.as_deref()).map(str::to_string),
            connect_timeout: raw.connect_timeout,
            operation_timeout: raw.operation_timeout,
        };
        debug!(config = ?cfg, "resolved connection config");
        Ok(cfg)
    }
}

/// Identifies the object to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub bucket: String,
    pub key: String,
    pub buffer_size: usize,
}

impl TransferRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

/// Optional YAML settings file. Keys are the long option names in snake_case:
///
/// ```yaml
/// host_url: https://store.example:9000
/// address: 10.0.0.5:9000
/// buffer_size: 65536
/// connect_timeout: 10s
/// access_key: AKID...
/// secret_key: ...
/// ```
///
/// Anything set on the command line or in the environment wins over the file.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub host_url: Option<String>,
    pub address: Option<String>,
    pub server_name: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub skip_verify: Option<bool>,
    pub buffer_size: Option<usize>,
    pub region: Option<String>,
    #[serde(deserialize_with = "human_duration")]
    pub connect_timeout: Option<Duration>,
    #[serde(deserialize_with = "human_duration")]
    pub operation_timeout: Option<Duration>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl fmt::Debug for SettingsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsFile")
            .field("host_url", &self.host_url)
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .field("ca_file", &self.ca_file)
            .field("skip_verify", &self.skip_verify)
            .field("buffer_size", &self.buffer_size)
            .field("region", &self.region)
            .field("connect_timeout", &self.connect_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("access_key", &self.access_key.as_ref().map(|_| "<set>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SettingsFile {
    /// `$HOME/.s3pin.yaml`, if `HOME` is set.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_SETTINGS_FILE))
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        // an empty document is a valid, empty settings file
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bad_file = |reason: String| ConfigError::SettingsFile {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| bad_file(e.to_string()))?;
        let settings = Self::parse(&text).map_err(|e| bad_file(e.to_string()))?;
        debug!(path = %path.display(), settings = ?settings, "loaded settings file");
        Ok(settings)
    }

    /// Load `explicit` if given (it must exist), else the default file if present.
    pub fn discover(explicit: Option<&Path>) -> Result<Option<Self>, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path).map(Some),
            _ => Ok(None),
        }
    }

    /// Fill in every setting `raw` leaves unset.
    ///
    /// `buffer_size` always carries a value, so `buffer_size_is_default` says
    /// whether that value was chosen by the user or is only the built-in default.
    pub fn fill_unset(&self, raw: &mut RawConnectionSettings, buffer_size_is_default: bool) {
        fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut raw.host_url, &self.host_url);
        fill(&mut raw.address, &self.address);
        fill(&mut raw.server_name, &self.server_name);
        fill(&mut raw.ca_file, &self.ca_file);
        fill(&mut raw.region, &self.region);
        fill(&mut raw.connect_timeout, &self.connect_timeout);
        fill(&mut raw.operation_timeout, &self.operation_timeout);
        // a flag can only turn verification off, never back on
        raw.skip_verify |= self.skip_verify.unwrap_or(false);
        if buffer_size_is_default {
            if let Some(size) = self.buffer_size {
                raw.buffer_size = size;
            }
        }
    }
}

fn human_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let text: Option<String> = Option::deserialize(deserializer)?;
    text.map(|t| humantime::parse_duration(&t).map_err(serde::de::Error::custom))
        .transpose()
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Split `host:port`, `[v6]:port`, or a bare host. Returns `None` for a malformed port.
pub(crate) fn split_host_port(addr: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return match tail {
            "" => Some((host, None)),
            t => t.strip_prefix(':')?.parse().ok().map(|p| (host, Some(p))),
        };
    }
    match addr.rsplit_once(':') {
        // a second colon means a bare IPv6 literal, not a port
        Some((host, _)) if host.contains(':') => Some((addr, None)),
        Some((host, port)) => port.parse().ok().map(|p| (host, Some(p))),
        None => Some((addr, None)),
    }
}

fn with_default_port(addr: &str, default_port: u16) -> Result<String, ConfigError> {
    match split_host_port(addr) {
        Some((host, _)) if host.is_empty() => Err(ConfigError::InvalidAddress(addr.to_string())),
        Some((_, Some(_))) => Ok(addr.to_string()),
        Some((host, None)) if host.contains(':') => Ok(format!("[{host}]:{default_port}")),
        Some((host, None)) => Ok(format!("{host}:{default_port}")),
        None => Err(ConfigError::InvalidAddress(addr.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: Option<&str>) -> RawConnectionSettings {
        RawConnectionSettings {
            host_url: url.map(str::to_string),
            buffer_size: DEFAULT_BUFFER_SIZE,
            ..Default::default()
        }
    }

    #[test]
    fn https_url_with_port() {
        let cfg = ConnectionConfig::derive(&raw(Some("https://store.example:9000"))).unwrap();
        assert_eq!(cfg.address, "store.example:9000");
        assert!(cfg.use_tls);
        assert_eq!(cfg.server_name, "store.example");
        assert_eq!(cfg.endpoint_url, "http://store.example:9000");
    }

    #[test]
    fn https_defaults_to_443() {
        for url in ["https://s3.local", "https://s3.local/", "https://s3.local:443"] {
            let cfg = ConnectionConfig::derive(&raw(Some(url))).unwrap();
            assert_eq!(cfg.address, "s3.local:443", "url {url}");
            assert!(cfg.use_tls);
            assert_eq!(cfg.server_name, "s3.local");
            assert!(cfg.endpoint_url.starts_with("http://"));
        }
    }

    #[test]
    fn http_defaults_to_80() {
        let cfg = ConnectionConfig::derive(&raw(Some("http://minio.lan"))).unwrap();
        assert_eq!(cfg.address, "minio.lan:80");
        assert!(!cfg.use_tls);
        assert_eq!(cfg.endpoint_url, "http://minio.lan");
    }

    #[test]
    fn explicit_address_and_server_name_win() {
        let mut settings = raw(Some("https://public.example"));
        settings.address = Some("10.1.2.3:8443".into());
        settings.server_name = Some("internal.example".into());
        let cfg = ConnectionConfig::derive(&settings).unwrap();
        assert_eq!(cfg.address, "10.1.2.3:8443");
        assert_eq!(cfg.server_name, "internal.example");
        assert_eq!(cfg.endpoint_url, "http://public.example");
    }

    #[test]
    fn explicit_address_without_port_gets_scheme_default() {
        let mut settings = raw(Some("https://public.example"));
        settings.address = Some("10.1.2.3".into());
        let cfg = ConnectionConfig::derive(&settings).unwrap();
        assert_eq!(cfg.address, "10.1.2.3:443");
    }

    #[test]
    fn address_only_is_plain_http() {
        let mut settings = raw(None);
        settings.address = Some("127.0.0.1:9000".into());
        let cfg = ConnectionConfig::derive(&settings).unwrap();
        assert!(!cfg.use_tls);
        assert_eq!(cfg.endpoint_url, "http://127.0.0.1:9000");
        assert!(cfg.server_name.is_empty());
    }

    #[test]
    fn ipv6_hosts_keep_brackets_in_address() {
        let cfg = ConnectionConfig::derive(&raw(Some("https://[::1]:9443"))).unwrap();
        assert_eq!(cfg.address, "[::1]:9443");
        assert_eq!(cfg.server_name, "::1");
    }

    #[test]
    fn malformed_url_is_surfaced() {
        let err = ConnectionConfig::derive(&raw(Some("https://bad host:99999"))).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedUrl { .. }));
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = ConnectionConfig::derive(&raw(Some("ftp://files.example"))).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    fn nothing_to_dial_is_an_error() {
        let err = ConnectionConfig::derive(&raw(None)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAddress));
    }

    #[test]
    fn zero_buffer_rejected() {
        let mut settings = raw(Some("http://x"));
        settings.buffer_size = 0;
        assert!(matches!(
            ConnectionConfig::derive(&settings),
            Err(ConfigError::ZeroBufferSize)
        ));
    }

    #[test]
    fn host_port_splitting() {
        assert_eq!(split_host_port("a:1"), Some(("a", Some(1))));
        assert_eq!(split_host_port("a"), Some(("a", None)));
        assert_eq!(split_host_port("[::1]:80"), Some(("::1", Some(80))));
        assert_eq!(split_host_port("::1"), Some(("::1", None)));
        assert_eq!(split_host_port("a:http"), None);
        assert!(matches!(
            with_default_port(":9000", 80),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn settings_file_fills_only_unset_fields() {
        let file = SettingsFile::parse(
            "host_url: https://store.example:9000\n\
             address: 10.0.0.5:9000\n\
             buffer_size: 65536\n\
             connect_timeout: 10s\n\
             skip_verify: true\n",
        )
        .unwrap();
        assert_eq!(file.connect_timeout, Some(Duration::from_secs(10)));

        let mut settings = raw(Some("http://from-flag:8080"));
        file.fill_unset(&mut settings, false);
        assert_eq!(settings.host_url.as_deref(), Some("http://from-flag:8080"));
        assert_eq!(settings.address.as_deref(), Some("10.0.0.5:9000"));
        assert_eq!(settings.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(settings.skip_verify);

        let mut defaulted = raw(None);
        file.fill_unset(&mut defaulted, true);
        assert_eq!(defaulted.buffer_size, 65536);
        let cfg = ConnectionConfig::derive(&defaulted).unwrap();
        assert!(cfg.use_tls);
        assert_eq!(cfg.address, "10.0.0.5:9000");
        assert_eq!(cfg.server_name, "store.example");
    }

    #[test]
    fn settings_file_rejects_unknown_keys_and_bad_durations() {
        assert!(SettingsFile::parse("s3_host: http://x\n").is_err());
        assert!(SettingsFile::parse("connect_timeout: soon\n").is_err());
        assert!(SettingsFile::parse("  \n").unwrap().host_url.is_none());
    }

    #[test]
    fn missing_explicit_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SettingsFile::discover(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::SettingsFile { .. }));
    }

    #[test]
    fn settings_file_debug_hides_secret() {
        let file = SettingsFile::parse("access_key: AKID\nsecret_key: hunter2\n").unwrap();
        let dump = format!("{file:?}");
        assert!(!dump.contains("hunter2"));
        assert!(!dump.contains("AKID"));
    }
}
