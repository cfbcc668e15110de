//! Construction-time configuration for the gateway (spec.md §4.8, §6).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bmc_core::CoreError;

#[derive(Clone, Debug)]
pub enum TlsSource {
    /// Generate (and cache on disk) a self-signed certificate for
    /// `hostname` if none exists yet.
    SelfSigned { hostname: String },
    /// Provision via ACME HTTP-01 against `directory_url` for `domain`.
    Acme { directory_url: String, domain: String },
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Shared TCP/UDP address for the HTTP/2+TLS and HTTP/3 listeners
    /// (spec.md §6, default `:443`).
    pub addr: SocketAddr,
    /// The `:80` listener address for the HTTP->HTTPS redirect and the
    /// ACME HTTP-01 challenge subtree.
    pub redirect_addr: SocketAddr,
    pub tls: TlsSource,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Serve static assets from this directory when the request's
    /// `Content-Type` does not start with `application/` (spec.md §4.8).
    pub web_ui_dir: Option<PathBuf>,
    pub request_deadline: Duration,
    /// Best-effort `net.core.rmem_max`/`wmem_max` target; failure to set
    /// is a warning, never fatal (spec.md §6).
    pub socket_buffer_bytes: Option<usize>,
}

impl GatewayConfig {
    pub fn builder(hostname: impl Into<String>) -> GatewayConfigBuilder {
        GatewayConfigBuilder::new(hostname)
    }
}

pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn new(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        GatewayConfigBuilder {
            config: GatewayConfig {
                addr: "0.0.0.0:443".parse().unwrap(),
                redirect_addr: "0.0.0.0:80".parse().unwrap(),
                tls: TlsSource::SelfSigned { hostname },
                cert_path: PathBuf::from("/var/cache/cert/cert.pem"),
                key_path: PathBuf::from("/var/cache/cert/key.pem"),
                web_ui_dir: None,
                request_deadline: bmc_core::deadline::DEFAULT_REQUEST_DEADLINE,
                socket_buffer_bytes: None,
            },
        }
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.config.addr = addr;
        self
    }

    pub fn redirect_addr(mut self, addr: SocketAddr) -> Self {
        self.config.redirect_addr = addr;
        self
    }

    pub fn acme(mut self, directory_url: impl Into<String>, domain: impl Into<String>) -> Self {
        self.config.tls = TlsSource::Acme { directory_url: directory_url.into(), domain: domain.into() };
        self
    }

    pub fn cert_paths(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.config.cert_path = cert_path.into();
        self.config.key_path = key_path.into();
        self
    }

    pub fn web_ui_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.web_ui_dir = Some(dir.into());
        self
    }

    pub fn request_deadline(mut self, deadline: Duration) -> Self {
        self.config.request_deadline = deadline;
        self
    }

    pub fn socket_buffer_bytes(mut self, bytes: usize) -> Self {
        self.config.socket_buffer_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<GatewayConfig, CoreError> {
        Ok(self.config)
    }
}
