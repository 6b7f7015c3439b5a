//! Handshake rates, timeouts and table sizes.
//!
//! All times are in seconds on the caller-supplied monotonic clock.

/// Maximum simultaneously connected clients per server.
pub const MAX_CLIENTS: usize = 32;

/// Challenge table slot count. Prime, to spread the keyed hash well under
/// open addressing.
pub const CHALLENGE_HASH_SIZE: usize = 1031;

/// Minimum interval between challenge packets to one requester.
pub const CHALLENGE_SEND_RATE: f64 = 0.1;

/// Lifetime of a challenge entry; expired entries are overwritten.
pub const CHALLENGE_TIME_OUT: f64 = 10.0;

/// Client resend interval for connection requests.
pub const CONNECTION_REQUEST_SEND_RATE: f64 = 0.1;

/// Client resend interval for challenge responses.
pub const CONNECTION_RESPONSE_SEND_RATE: f64 = 0.1;

/// Server re-confirm interval for a client whose keep-alive confirming the
/// connection may have been lost.
pub const CONNECTION_CONFIRM_SEND_RATE: f64 = 0.1;

/// Keep-alive interval on an established connection, both directions.
pub const CONNECTION_KEEP_ALIVE_SEND_RATE: f64 = 1.0;

/// How long a client keeps requesting before giving up.
pub const CONNECTION_REQUEST_TIME_OUT: f64 = 5.0;

/// How long a client keeps answering the challenge before giving up.
pub const CHALLENGE_RESPONSE_TIME_OUT: f64 = 5.0;

/// Established connections time out after this long without a packet.
pub const KEEP_ALIVE_TIME_OUT: f64 = 10.0;

/// Sentinel for "never sent"; far enough in the past that every rate check
/// passes immediately even near t = 0.
pub const NEVER_SENT: f64 = -1000.0;
