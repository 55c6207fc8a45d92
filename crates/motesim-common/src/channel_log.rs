//! Named-channel diagnostic logging for the simulation core.
//!
//! Every diagnostic the core produces is addressed to a named channel
//! (`"Gain"`, `"Noise"`, `"Queue"`, ...). A [`ChannelLogConfig`] selects which
//! channels are live, and a [`LogSink`] receives the `(channel, text)` pairs.
//! Fan-out to files or callbacks is the sink's business, not the core's.
//!
//! # Usage
//!
//! ```rust
//! use motesim_common::{ChannelLog, ChannelLogConfig};
//!
//! let log = ChannelLog::new(ChannelLogConfig::parse("Gain,Noise"));
//! if log.enabled("Gain") {
//!     log.write("Gain", "Adding link from 1 to 2 with gain -54.0");
//! }
//! assert!(log.test_flag());
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Channel Configuration
// ============================================================================

/// Which channels are enabled.
#[derive(Debug, Clone, Default)]
pub struct ChannelLogConfig {
    /// Enabled channel names. `"*"` enables every channel.
    pub channels: HashSet<String>,
}

impl ChannelLogConfig {
    /// A config with every channel disabled.
    pub fn none() -> Self {
        ChannelLogConfig {
            channels: HashSet::new(),
        }
    }

    /// A config with every channel enabled.
    pub fn all() -> Self {
        Self::parse("*")
    }

    /// Parse a comma-separated channel list.
    ///
    /// - `"Gain,Noise"` enables those two channels
    /// - `"*"` enables every channel
    /// - `""` enables nothing
    pub fn parse(list: &str) -> Self {
        let channels = list
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        ChannelLogConfig { channels }
    }

    /// Whether any channel is enabled.
    pub fn is_enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Whether all channels are enabled.
    pub fn enables_all(&self) -> bool {
        self.channels.contains("*")
    }

    /// Whether `channel` is enabled.
    pub fn enables(&self, channel: &str) -> bool {
        self.enables_all() || self.channels.contains(channel)
    }

    /// Enable an additional channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.insert(channel.into());
        self
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for channel writes.
pub trait LogSink: Send + Sync {
    /// Deliver one formatted line on a channel.
    fn write(&self, channel: &str, text: &str);

    /// Deliver an error line. Defaults to a regular write.
    fn write_error(&self, channel: &str, text: &str) {
        self.write(channel, text);
    }
}

/// Sink that forwards channel writes to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, channel: &str, text: &str) {
        tracing::debug!(channel, text, "channel write");
    }

    fn write_error(&self, channel: &str, text: &str) {
        tracing::warn!(channel, text, "channel error");
    }
}

/// Sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded `(channel, text)` lines.
    pub fn lines(&self) -> Vec<(String, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Lines recorded on one channel.
    pub fn channel_lines(&self, channel: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, text)| text)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, channel: &str, text: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push((channel.to_string(), text.to_string()));
    }
}

// ============================================================================
// Channel Log
// ============================================================================

/// Shared handle used by the core to write diagnostics.
///
/// Cloning is cheap; clones share configuration, sink and the written flag.
#[derive(Clone)]
pub struct ChannelLog {
    config: Arc<ChannelLogConfig>,
    sink: Arc<dyn LogSink>,
    written: Arc<AtomicBool>,
}

impl ChannelLog {
    /// Create a log writing to `tracing`.
    pub fn new(config: ChannelLogConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a log writing to a custom sink.
    pub fn with_sink(config: ChannelLogConfig, sink: Arc<dyn LogSink>) -> Self {
        ChannelLog {
            config: Arc::new(config),
            sink,
            written: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A log with every channel disabled.
    pub fn disabled() -> Self {
        Self::new(ChannelLogConfig::none())
    }

    /// The active configuration.
    pub fn config(&self) -> &ChannelLogConfig {
        &self.config
    }

    /// Whether writes to `channel` reach the sink.
    pub fn enabled(&self, channel: &str) -> bool {
        self.config.enables(channel)
    }

    /// Write a line to `channel` if it is enabled.
    pub fn write(&self, channel: &str, text: impl AsRef<str>) {
        if !self.config.enables(channel) {
            return;
        }
        self.written.store(true, Ordering::Relaxed);
        self.sink.write(channel, text.as_ref());
    }

    /// Write an error line to `channel`. Errors bypass channel filtering.
    pub fn error(&self, channel: &str, text: impl AsRef<str>) {
        self.written.store(true, Ordering::Relaxed);
        self.sink.write_error(channel, text.as_ref());
    }

    /// Clear the written flag.
    pub fn reset_flag(&self) {
        self.written.store(false, Ordering::Relaxed);
    }

    /// Whether anything was written since the last [`reset_flag`](Self::reset_flag).
    pub fn test_flag(&self) -> bool {
        self.written.load(Ordering::Relaxed)
    }
}

impl Default for ChannelLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for ChannelLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelLog")
            .field("config", &self.config)
            .field("written", &self.test_flag())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse_empty() {
        let config = ChannelLogConfig::parse("");
        assert!(!config.is_enabled());
        assert!(!config.enables("Gain"));
    }

    #[test]
    fn test_config_parse_names() {
        let config = ChannelLogConfig::parse("Gain, Noise");
        assert!(config.is_enabled());
        assert!(config.enables("Gain"));
        assert!(config.enables("Noise"));
        assert!(!config.enables("Queue"));
    }

    #[test]
    fn test_config_parse_all() {
        let config = ChannelLogConfig::parse("*");
        assert!(config.enables_all());
        assert!(config.enables("AnyChannel"));
    }

    #[test]
    fn test_disabled_channel_not_written() {
        let sink = Arc::new(MemorySink::new());
        let log = ChannelLog::with_sink(ChannelLogConfig::parse("Gain"), sink.clone());

        log.write("Noise", "dropped");
        assert!(!log.test_flag());
        assert!(sink.lines().is_empty());

        log.write("Gain", "kept");
        assert!(log.test_flag());
        assert_eq!(sink.channel_lines("Gain"), vec!["kept".to_string()]);
    }

    #[test]
    fn test_errors_bypass_filter() {
        let sink = Arc::new(MemorySink::new());
        let log = ChannelLog::with_sink(ChannelLogConfig::none(), sink.clone());

        log.error("Noise", "untrained");
        assert_eq!(sink.channel_lines("Noise"), vec!["untrained".to_string()]);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_sink_emits_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let log = ChannelLog::new(ChannelLogConfig::parse("Gain"));
            log.write("Gain", "Adding link from 1 to 2 with gain -54");
            log.error("Noise", "untrained");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("channel write"), "{output}");
        assert!(output.contains("channel=\"Gain\""), "{output}");
        assert!(output.contains("text=\"Adding link from 1 to 2 with gain -54\""), "{output}");
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("channel=\"Noise\""), "{output}");
    }

    #[test]
    fn test_flag_reset_shared_between_clones() {
        let log = ChannelLog::with_sink(ChannelLogConfig::all(), Arc::new(MemorySink::new()));
        let clone = log.clone();

        clone.write("Queue", "x");
        assert!(log.test_flag());
        log.reset_flag();
        assert!(!clone.test_flag());
    }
}
