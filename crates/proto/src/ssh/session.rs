//! Shared session context.
//!
//! A [`SessionContext`] bundles the collaborators the transport consumes
//! but does not own: the crypto provider installed by key exchange, the
//! channel multiplexer, the diagnostic log sink, and the per-operation
//! timeout. The session layer owns the context, the transport, and the
//! mux; the transport holds the context by `Arc` and references nothing
//! that references it back, so teardown has no ownership cycles to break.

use crate::ssh::channel::ChannelMux;
use crate::ssh::crypto::CryptoProvider;
use skiff_platform::LogSink;
use std::sync::Arc;
use std::time::Duration;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators and configuration shared across one SSH session.
pub struct SessionContext {
    crypto: Arc<dyn CryptoProvider>,
    channel: Arc<dyn ChannelMux>,
    log: Arc<dyn LogSink>,
    timeout: Duration,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SessionContext {
    /// Creates a session context.
    ///
    /// # Arguments
    ///
    /// * `crypto` - Per-packet cryptography (use
    ///   [`PlainCrypto`](crate::ssh::crypto::PlainCrypto) before key
    ///   exchange)
    /// * `channel` - Upstream channel multiplexer
    /// * `log` - Diagnostic sink; receives one line per reported failure
    /// * `timeout` - Bound on every blocking transport operation
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        channel: Arc<dyn ChannelMux>,
        log: Arc<dyn LogSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            crypto,
            channel,
            log,
            timeout,
        }
    }

    /// Returns the crypto provider.
    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    /// Returns the channel multiplexer.
    pub fn channel(&self) -> &dyn ChannelMux {
        self.channel.as_ref()
    }

    /// Returns the per-operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Appends a diagnostic line to the log sink.
    pub fn push_log(&self, message: impl Into<String>) {
        self.log.push_message(&message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::channel::NullMux;
    use crate::ssh::crypto::PlainCrypto;
    use skiff_platform::MemoryLog;

    #[test]
    fn test_context_accessors() {
        let log = Arc::new(MemoryLog::new());
        let ctx = SessionContext::new(
            Arc::new(PlainCrypto),
            Arc::new(NullMux),
            log.clone(),
            Duration::from_millis(250),
        );

        assert_eq!(ctx.timeout(), Duration::from_millis(250));
        assert!(!ctx.crypto().is_initialized());

        ctx.push_log("connection refused");
        assert_eq!(log.drain(), vec!["connection refused".to_string()]);
    }

    #[test]
    fn test_debug_omits_collaborators() {
        let ctx = SessionContext::new(
            Arc::new(PlainCrypto),
            Arc::new(NullMux),
            Arc::new(MemoryLog::new()),
            DEFAULT_TIMEOUT,
        );
        let rendered = format!("{:?}", ctx);
        assert!(rendered.contains("timeout"));
    }
}
