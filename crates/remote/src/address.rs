//! Remote store addresses

use crate::error::{RemoteError, Result};
use std::fmt;
use std::path::PathBuf;

/// Scheme of shared-directory stores
pub const FILE_SCHEME: &str = "file";

/// A parsed `scheme://host[:port][/path]` address
///
/// `file://` addresses carry only a path: `file:///mnt/buildstash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    /// Protocol scheme
    pub scheme: String,
    /// Host name or IP address (empty for `file://`)
    pub host: String,
    /// Port, if given
    pub port: Option<u16>,
    /// Path on the host
    pub path: String,
}

impl RemoteAddress {
    /// Parse an address
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let Some((scheme, rest)) = address.split_once("://") else {
            return Err(RemoteError::invalid_address(address, "missing '://'"));
        };
        if scheme.is_empty() {
            return Err(RemoteError::invalid_address(address, "missing scheme"));
        }
        let scheme = scheme.to_ascii_lowercase();

        if scheme == FILE_SCHEME {
            if rest.is_empty() {
                return Err(RemoteError::invalid_address(address, "missing path"));
            }
            return Ok(Self {
                scheme,
                host: String::new(),
                port: None,
                path: rest.to_string(),
            });
        }

        let colon = rest.find(':');
        let slash = rest.find('/');

        // The slash, if any, must come after the colon, if any
        if let (Some(colon), Some(slash)) = (colon, slash)
            && slash < colon
        {
            return Err(RemoteError::invalid_address(
                address,
                "path separator before port",
            ));
        }

        let host_end = colon.or(slash).unwrap_or(rest.len());
        let host = &rest[..host_end];
        if host.is_empty() {
            return Err(RemoteError::invalid_address(address, "missing host"));
        }

        let port = match colon {
            Some(colon) => {
                let port_end = slash.unwrap_or(rest.len());
                let port = &rest[colon + 1..port_end];
                Some(port.parse::<u16>().map_err(|e| {
                    RemoteError::invalid_address(address, format!("invalid port '{port}': {e}"))
                })?)
            }
            None => None,
        };

        let path = slash.map_or_else(String::new, |slash| rest[slash + 1..].to_string());

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Whether this is a shared-directory address
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.scheme == FILE_SCHEME
    }

    /// Filesystem path of a `file://` address
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        self.is_file().then(|| PathBuf::from(&self.path))
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_file() {
            return write!(f, "{}://{}", self.scheme, self.path);
        }
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}
