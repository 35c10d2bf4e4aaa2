use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::RecipientId,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between sends (Telegram allows ~1 msg/sec per chat).
    pub min_send_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_send_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces out sends.
///
/// A burst of new CVEs is delivered back-to-back; this keeps the burst under
/// the transport's flood limits instead of relying on 429 retries.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    limiter: Mutex<IntervalLimiter>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            limiter: Mutex::new(IntervalLimiter::new(cfg.min_send_interval)),
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.inner.wait_until_ready().await
    }

    async fn send_text(&self, recipient: &RecipientId, text: &str) -> Result<()> {
        let wait = { self.limiter.lock().await.reserve() };
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
        self.inner.send_text(recipient, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        sent_at: StdMutex<Vec<Instant>>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for Recorder {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_message_len: 100,
            }
        }

        async fn wait_until_ready(&self) -> Result<()> {
            Ok(())
        }

        async fn send_text(&self, _recipient: &RecipientId, _text: &str) -> Result<()> {
            self.sent_at.lock().unwrap().push(Instant::now());
            Ok(())
        }
    }

    #[tokio::test]
    async fn consecutive_sends_are_spaced() {
        let inner = Arc::new(Recorder::default());
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                min_send_interval: Duration::from_millis(60),
            },
        );
        let to = RecipientId("1".to_string());

        throttled.send_text(&to, "a").await.unwrap();
        throttled.send_text(&to, "b").await.unwrap();
        throttled.send_text(&to, "c").await.unwrap();

        let times = inner.sent_at.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= Duration::from_millis(50));
        assert!(times[2] - times[1] >= Duration::from_millis(50));
        assert_eq!(throttled.capabilities().max_message_len, 100);
    }
}
