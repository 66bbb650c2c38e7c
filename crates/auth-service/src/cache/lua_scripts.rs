//! Lua scripts for atomic shared-cache operations.
//!
//! Redis runs each script atomically, so a counter can never exist without
//! its expiry even if the client disconnects between commands.

/// Increment a counter and attach the window expiry on first use.
///
/// Arguments:
/// - KEYS[1]: Counter key (e.g., `ratelimit:login:<client hash>`)
/// - ARGV[1]: Window length in milliseconds
///
/// Returns the counter value after incrementing.
///
/// A counter found without a TTL (written by an older deployment or by a
/// manual `SET`) gets one attached, so it cannot block a client forever.
pub const INCREMENT_WITH_EXPIRY: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;
