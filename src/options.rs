//! Settable per-connection configuration.

/// Connection-wide behavior switches. All default to the spec's documented
/// defaults; construct with [`ConnectionOptions::default`] and override with
/// the builder methods.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Run the authentication handshake immediately after dialing/accepting.
    pub auto_auth: bool,
    /// Convert an inbound `ERRO`/`ERRC` pair into a [`crate::NcpError::Command`]
    /// raised at the targeted consumer, instead of surfacing the raw field.
    pub auto_erro: bool,
    /// Convert an inbound `WARN` parameter into a warning delivered to the
    /// configured warning sink, instead of surfacing the raw field.
    pub auto_warn: bool,
    /// Silently drop any inbound field that carries an `ACKN` parameter.
    pub auto_ackn: bool,
    /// Identification string sent during the client handshake's `CCRE` step.
    /// Defaults to the local hostname if left unset.
    pub remote_hostname: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_auth: true,
            auto_erro: true,
            auto_warn: true,
            auto_ackn: true,
            remote_hostname: None,
        }
    }
}

impl ConnectionOptions {
    pub fn auto_auth(mut self, on: bool) -> Self {
        self.auto_auth = on;
        self
    }

    pub fn auto_erro(mut self, on: bool) -> Self {
        self.auto_erro = on;
        self
    }

    pub fn auto_warn(mut self, on: bool) -> Self {
        self.auto_warn = on;
        self
    }

    pub fn auto_ackn(mut self, on: bool) -> Self {
        self.auto_ackn = on;
        self
    }

    pub fn remote_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.remote_hostname = Some(hostname.into());
        self
    }

    pub(crate) fn hostname_or_local(&self) -> String {
        self.remote_hostname.clone().unwrap_or_else(|| {
            hostname_fallback()
        })
    }
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
