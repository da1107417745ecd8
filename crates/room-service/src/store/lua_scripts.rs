//! Lua scripts for atomic room operations.
//!
//! Each script is one read-modify-write executed atomically by Redis, so
//! concurrent requests against the same room serialize without any
//! in-process locking.

/// Sliding-window rate limit hit.
///
/// Arguments:
/// - KEYS[1]: Window key (e.g., `ratelimit:ip:203.0.113.7`)
/// - ARGV[1]: Now (epoch seconds)
/// - ARGV[2]: Window length in seconds
/// - ARGV[3]: Max requests per window
/// - ARGV[4]: Unique member marker for this request
///
/// Returns `{allowed, count, oldest}`:
/// - allowed: 1 if counted, 0 if denied (denied hits are not recorded)
/// - count: requests in the window before this one
/// - oldest: score of the oldest request in the window (now if empty)
pub const RATE_WINDOW: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])

local oldest = now
local head = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
if head[2] then
    oldest = tonumber(head[2])
end

if count >= max then
    return {0, count, oldest}
end

redis.call('ZADD', KEYS[1], now, ARGV[4])
redis.call('EXPIRE', KEYS[1], window)
return {1, count, oldest}
"#;

/// Create room metadata unless the id is already taken.
///
/// Arguments:
/// - KEYS[1]: Meta key
/// - ARGV[1]: TTL in seconds
/// - ARGV[2..]: Hash field-value pairs
///
/// Returns:
/// - 1: Created
/// - 0: Id collision, nothing written
pub const CREATE_ROOM: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end

for i = 2, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i+1])
end
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[1]))
return 1
"#;

/// Add a membership token to `connected` with a capacity check.
///
/// Arguments:
/// - KEYS[1]: Meta key
/// - ARGV[1]: Membership token
/// - ARGV[2]: Capacity
///
/// Returns:
/// - 1: Joined
/// - 2: Already a member
/// - 0: Full
/// - -1: Room missing
pub const JOIN_ROOM: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end

local raw = redis.call('HGET', KEYS[1], 'connected')
local connected = {}
if raw and raw ~= '' then
    connected = cjson.decode(raw)
end

for _, token in ipairs(connected) do
    if token == ARGV[1] then
        return 2
    end
end

if #connected >= tonumber(ARGV[2]) then
    return 0
end

table.insert(connected, ARGV[1])
redis.call('HSET', KEYS[1], 'connected', cjson.encode(connected))
return 1
"#;

/// Append a message and mirror the room's remaining TTL onto the list.
///
/// Arguments:
/// - KEYS[1]: Meta key
/// - KEYS[2]: Messages key
/// - ARGV[1]: Serialized message
///
/// Returns:
/// - 1: Appended
/// - 0: Room missing, nothing written
pub const APPEND_MESSAGE: &str = r#"
local ttl = redis.call('PTTL', KEYS[1])
if ttl == -2 then
    return 0
end

redis.call('RPUSH', KEYS[2], ARGV[1])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[2], ttl)
end
return 1
"#;

/// Compare-and-set one list element.
///
/// Arguments:
/// - KEYS[1]: Messages key
/// - ARGV[1]: Zero-based index
/// - ARGV[2]: Expected current element
/// - ARGV[3]: Replacement element
///
/// Returns:
/// - 1: Replaced
/// - 0: Conflict (element changed)
/// - -1: Missing (no element at index)
pub const REPLACE_MESSAGE: &str = r#"
local index = tonumber(ARGV[1])
local current = redis.call('LINDEX', KEYS[1], index)
if not current then
    return -1
end

if current ~= ARGV[2] then
    return 0
end

redis.call('LSET', KEYS[1], index, ARGV[3])
return 1
"#;

/// Write a typing mark and mirror the room's remaining TTL onto the hash.
///
/// Arguments:
/// - KEYS[1]: Meta key
/// - KEYS[2]: Typing key
/// - ARGV[1]: Membership token
/// - ARGV[2]: Mark (epoch millis, or 0)
///
/// Returns:
/// - 1: Written
/// - 0: Room missing
pub const SET_TYPING: &str = r#"
local ttl = redis.call('PTTL', KEYS[1])
if ttl == -2 then
    return 0
end

redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[2], ttl)
end
return 1
"#;

/// Reset a typing mark to 0 only if it was not superseded.
///
/// Arguments:
/// - KEYS[1]: Typing key
/// - ARGV[1]: Membership token
/// - ARGV[2]: Mark the caller scheduled the clear for
///
/// Returns:
/// - 1: Cleared
/// - 0: Superseded (or hash gone)
pub const CLEAR_TYPING_IF: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
    redis.call('HSET', KEYS[1], ARGV[1], '0')
    return 1
end
return 0
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_window_evicts_before_counting() {
        let evict = RATE_WINDOW.find("ZREMRANGEBYSCORE").unwrap_or(usize::MAX);
        let count = RATE_WINDOW.find("ZCARD").unwrap_or(0);
        assert!(evict < count);
    }

    #[test]
    fn test_rate_window_denies_without_recording() {
        // The deny branch must return before ZADD.
        let deny = RATE_WINDOW.find("return {0, count, oldest}").unwrap_or(usize::MAX);
        let add = RATE_WINDOW.find("ZADD").unwrap_or(0);
        assert!(deny < add);
        assert!(RATE_WINDOW.contains("redis.call('EXPIRE', KEYS[1], window)"));
    }

    #[test]
    fn test_create_room_refuses_existing_id() {
        assert!(CREATE_ROOM.contains("if redis.call('EXISTS', KEYS[1]) == 1 then"));
        assert!(CREATE_ROOM.contains("for i = 2, #ARGV, 2 do"));
    }

    #[test]
    fn test_join_room_checks_capacity_after_membership() {
        let member = JOIN_ROOM.find("return 2").unwrap_or(usize::MAX);
        let full = JOIN_ROOM.find("return 0").unwrap_or(0);
        assert!(member < full);
        assert!(JOIN_ROOM.contains("if #connected >= tonumber(ARGV[2]) then"));
        assert!(JOIN_ROOM.contains("return -1"));
    }

    #[test]
    fn test_writes_mirror_room_ttl() {
        for script in [APPEND_MESSAGE, SET_TYPING] {
            assert!(script.contains("redis.call('PTTL', KEYS[1])"));
            assert!(script.contains("if ttl == -2 then"));
            assert!(script.contains("redis.call('PEXPIRE', KEYS[2], ttl)"));
        }
    }

    #[test]
    fn test_replace_message_compares_before_set() {
        let compare = REPLACE_MESSAGE.find("if current ~= ARGV[2] then").unwrap_or(usize::MAX);
        let set = REPLACE_MESSAGE.find("LSET").unwrap_or(0);
        assert!(compare < set);
    }

    #[test]
    fn test_clear_typing_is_conditional() {
        assert!(CLEAR_TYPING_IF.contains("== ARGV[2] then"));
        assert!(CLEAR_TYPING_IF.contains("'0'"));
    }
}
