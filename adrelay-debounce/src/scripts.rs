/// Atomic submit: update the `latest` hash and the `due` sorted set for a
/// task key in one round trip (spec.md §4.9).
///
/// `KEYS[1]` = latest hash key, `KEYS[2]` = due zset key
/// `ARGV[1]` = task key, `ARGV[2]` = now_ms, `ARGV[3]` = max_wait_ms,
/// `ARGV[4]` = order_ts_ms, `ARGV[5]` = job_json, `ARGV[6]` = latest_ttl_ms
///
/// Returns the new `due_at_ms`.
pub const SUBMIT: &str = r"
local latest = KEYS[1]
local due_z = KEYS[2]
local task_key = ARGV[1]
local now_ms = tonumber(ARGV[2])
local max_wait_ms = tonumber(ARGV[3])
local order_ts_ms = tonumber(ARGV[4])
local job_json = ARGV[5]
local latest_ttl = tonumber(ARGV[6])

local first = redis.call('HGET', latest, 'first_submit_ms')
if not first then
    first = now_ms
    redis.call('HSET', latest, 'first_submit_ms', first)
end

local old_order = tonumber(redis.call('HGET', latest, 'order_ts_ms') or '-1')
if order_ts_ms >= old_order then
    redis.call('HSET', latest, 'order_ts_ms', order_ts_ms)
    redis.call('HSET', latest, 'job_json', job_json)
end

local new_due = tonumber(first) + max_wait_ms

redis.call('HSET', latest, 'due_at_ms', new_due)
redis.call('HSET', latest, 'updated_ms', now_ms)
redis.call('ZADD', due_z, new_due, task_key)
redis.call('PEXPIRE', latest, latest_ttl)
return new_due
";

/// Acquire the short-lived per-task exclusive lock (`SET NX PX`).
///
/// `KEYS[1]` = lock key, `ARGV[1]` = ttl_ms. Returns 1 if acquired.
pub const LOCK_ACQUIRE: &str = r"
local ok = redis.call('SET', KEYS[1], '1', 'NX', 'PX', ARGV[1])
if ok then
    return 1
end
return 0
";
