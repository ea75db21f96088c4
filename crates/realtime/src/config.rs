use std::time::Duration;

/// Debounce delays for the disconnect sweeps.
///
/// When a connection closes, its lock and presence entries are removed
/// only after these delays, so a fast reconnect does not flash
/// "unlocked" or "offline" at the other editors. The values are tuning
/// knobs for the deployment network's reconnect latency, not protocol
/// constants.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// Delay before a closed connection's locks are swept.
    pub lock_delay: Duration,
    /// Delay before a closed connection's presence entry is swept.
    pub presence_delay: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lock_delay: Duration::from_millis(500),
            presence_delay: Duration::from_millis(1000),
        }
    }
}
