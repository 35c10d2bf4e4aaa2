use std::fmt;

/// Transport-specific recipient id (Telegram chat id, Discord user id).
///
/// Kept as an opaque string; each adapter parses it into its own id type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecipientId(pub String);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which detection path produced a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    /// Found in the primary (short) window.
    New,
    /// Newest record of the one-day fallback window.
    MostRecent,
}

impl AlertKind {
    pub fn title(self) -> &'static str {
        match self {
            AlertKind::New => "New CVE Alert",
            AlertKind::MostRecent => "Most Recent CVE Alert",
        }
    }
}
