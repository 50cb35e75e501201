use std::time::Duration;

// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BASE_PATH: &str = "broadcaster";
pub const WS_PATH: &str = "websocket";

// Per-connection outbound queue capacity
pub const OUTBOX_CAPACITY: usize = 1024;

// Default maximum inbound frame size, overridable via MAX_FRAME_BYTES
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024;

// Connection deadlines
pub const READ_DEADLINE: Duration = Duration::from_secs(60);
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);
pub const HANDLER_DEADLINE: Duration = Duration::from_secs(60);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

// Token verification
pub const TOKEN_AUDIENCE: &str = "broadcaster";
pub const TOKEN_LEEWAY_SECS: u64 = 30;

// History replay
pub const HISTORY_LIMIT: usize = 100;
