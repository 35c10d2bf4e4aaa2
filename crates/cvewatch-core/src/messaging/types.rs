/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Longest message the transport accepts, in characters.
    pub max_message_len: usize,
}
