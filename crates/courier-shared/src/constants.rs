/// Application name
pub const APP_NAME: &str = "Courier";

/// Default REST API base URL (local development backend)
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Default push transport URL
pub const DEFAULT_SOCKET_URL: &str = "http://localhost:5000";

/// Number of messages requested per history page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Trailing window in which a send acknowledgement may claim an
/// optimistic message (milliseconds)
pub const ACK_MATCH_WINDOW_MS: i64 = 5_000;

/// Keyboard inactivity after which `typing:stop` is emitted (milliseconds)
pub const TYPING_IDLE_TIMEOUT_MS: u64 = 3_000;

/// HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Capacity of the inbound transport and change-notification channels
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Push transport event names (server -> client)
pub const EVENT_MESSAGE_RECEIVE: &str = "message:receive";
pub const EVENT_MESSAGE_SENT: &str = "message:sent";
pub const EVENT_MESSAGE_DELIVERED: &str = "message:delivered";
pub const EVENT_MESSAGE_READ: &str = "message:read";
pub const EVENT_MESSAGE_ERROR: &str = "message:error";
pub const EVENT_TYPING_START: &str = "typing:start";
pub const EVENT_TYPING_STOP: &str = "typing:stop";
pub const EVENT_PRESENCE_UPDATE: &str = "presence:update";
pub const EVENT_USER_ONLINE: &str = "user:online";
pub const EVENT_USER_OFFLINE: &str = "user:offline";

/// Push transport event names (client -> server)
pub const EVENT_MESSAGE_SEND: &str = "message:send";
