//! Sharded key layout (spec.md §4.9): `h = crc32(task_key) mod shards`.

pub(crate) fn shard_index(task_key: &str, shards: u32) -> u32 {
    crc32fast::hash(task_key.as_bytes()) % shards.max(1)
}

pub(crate) fn due_key(prefix: &str, shard: u32) -> String {
    format!("{prefix}due:{shard}")
}

pub(crate) fn latest_key(prefix: &str, shard: u32, task_key: &str) -> String {
    format!("{prefix}latest:{shard}:{task_key}")
}

pub(crate) fn lock_key(prefix: &str, shard: u32, task_key: &str) -> String {
    format!("{prefix}lock:{shard}:{task_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_index_is_stable() {
        let a = shard_index("up1:ad1:dev1", 8);
        let b = shard_index("up1:ad1:dev1", 8);
        assert_eq!(a, b);
        assert!(a < 8);
    }

    #[test]
    fn shard_index_clamps_zero_shards_to_one() {
        assert_eq!(shard_index("k", 0), 0);
    }
}
