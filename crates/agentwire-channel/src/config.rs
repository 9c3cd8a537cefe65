use std::time::Duration;

use agentwire_frame::FrameConfig;

/// How long [`Channel::call`](crate::Channel::call) waits for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-channel settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Limits and buffer sizing for both directions.
    pub frame: FrameConfig,
    /// Reply deadline for the awaiting call form. Default: 5 s.
    pub reply_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.frame.max_payload_size = max;
        self
    }
}
