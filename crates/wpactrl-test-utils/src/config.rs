//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`ClientConfig`] values
//! without repeating boilerplate across crate boundaries.

use std::path::Path;

use wpactrl_config::ClientConfig;

use crate::daemon::MockDaemon;

/// Fluent builder for [`ClientConfig`] in tests.
///
/// Starts from a short one-second request timeout so failing tests finish
/// quickly.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::for_daemon(&daemon)
///     .request_timeout_ms(200)
///     .max_reply_size(64)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: ClientConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = ClientConfig::default();
        config.connection.request_timeout_ms = 1000;
        Self { config }
    }

    /// Place client sockets next to the mock daemon's socket.
    pub fn for_daemon(daemon: &MockDaemon) -> Self {
        Self::new().local_dir(daemon.dir())
    }

    pub fn local_dir(mut self, dir: &Path) -> Self {
        self.config.connection.local_dir = dir.display().to_string();
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connection.request_timeout_ms = ms;
        self
    }

    pub fn max_reply_size(mut self, size: usize) -> Self {
        self.config.connection.max_reply_size = size;
        self
    }

    pub fn max_event_size(mut self, size: usize) -> Self {
        self.config.connection.max_event_size = size;
        self
    }

    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.connection.event_queue_capacity = capacity;
        self
    }

    pub fn scan_max_index(mut self, max_index: usize) -> Self {
        self.config.scan.max_index = max_index;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
