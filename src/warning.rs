//! The pluggable sink `WARN` parameters are routed through.

use std::fmt;
use std::sync::Arc;

use crate::identifier::Identifier;

/// One `WARN`/`WARC` pair observed on an inbound field.
#[derive(Debug, Clone)]
pub struct CommandWarning {
    pub detail: String,
    pub code: i32,
    pub packet_type: Identifier,
    pub field_name: Identifier,
}

impl fmt::Display for CommandWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warning {} on {}/{}: {}",
            self.code, self.packet_type, self.field_name, self.detail
        )
    }
}

/// Where `auto_warn` delivers [`CommandWarning`]s.
///
/// The default sink logs via `tracing` at `warn` level. Swap in a callback
/// (e.g. one that forwards into an `mpsc` channel) to observe warnings in
/// application code instead.
#[derive(Clone)]
pub struct WarnSink(Arc<dyn Fn(CommandWarning) + Send + Sync>);

impl WarnSink {
    pub fn new(f: impl Fn(CommandWarning) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn emit(&self, warning: CommandWarning) {
        (self.0)(warning)
    }
}

impl Default for WarnSink {
    fn default() -> Self {
        Self::new(|warning| tracing::warn!(%warning, "peer command warning"))
    }
}

impl fmt::Debug for WarnSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WarnSink(..)")
    }
}
