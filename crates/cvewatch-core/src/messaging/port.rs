use async_trait::async_trait;

use crate::{domain::RecipientId, messaging::types::MessagingCapabilities, Result};

/// Cross-messenger port.
///
/// The poller only needs two things from a transport: a one-time readiness
/// gate and "deliver this text to that recipient".
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Block until the session can send.
    ///
    /// Transient failures are retried internally. `Error::Unauthorized` means
    /// the credentials were rejected and the session will never become ready.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Deliver `text`. `Ok` means the transport accepted the message.
    async fn send_text(&self, recipient: &RecipientId, text: &str) -> Result<()>;
}
