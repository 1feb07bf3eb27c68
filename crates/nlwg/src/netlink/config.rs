//! Connection configuration.

/// Default ceiling for a single received datagram.
pub const DEFAULT_MAX_RECEIVE_SIZE: usize = 1 << 20;

/// Options applied when a connection is opened.
///
/// # Example
///
/// ```
/// use nlwg::netlink::Config;
///
/// let config = Config::new().debug(true).max_receive_size(256 * 1024);
/// assert!(config.debug);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Multicast group bitmask bound at open.
    pub groups: u32,
    /// Ask the kernel for extended acknowledgements.
    pub extended_ack: bool,
    /// Ask the kernel for strict header checking on dumps.
    pub strict_check: bool,
    /// Largest datagram the receive path will allocate for.
    pub max_receive_size: usize,
    /// Log every frame sent and received at debug level.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            groups: 0,
            extended_ack: true,
            strict_check: false,
            max_receive_size: DEFAULT_MAX_RECEIVE_SIZE,
            debug: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(mut self, groups: u32) -> Self {
        self.groups = groups;
        self
    }

    pub fn extended_ack(mut self, enable: bool) -> Self {
        self.extended_ack = enable;
        self
    }

    pub fn strict_check(mut self, enable: bool) -> Self {
        self.strict_check = enable;
        self
    }

    pub fn max_receive_size(mut self, bytes: usize) -> Self {
        self.max_receive_size = bytes;
        self
    }

    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }
}
