//! config.rs — the configuration key table
//!
//! `Config` is the immutable-after-init snapshot; `ThreadCounts` and
//! `WritePolicy` are its nested value types. The handful of fields that
//! remain mutable post-init (`write_policy`, `deduplication` pre-start,
//! growth of `physical_blocks`/`logical_bytes`) are mutated in place through
//! dedicated methods rather than by replacing the whole snapshot, so a
//! caller can never slip an immutable field through a generic setter.

use crate::error::ErrorKind;

/// Per-zone thread counts configured at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreadCounts {
    pub logical_zones: u32,
    pub physical_zones: u32,
    pub hash_zones: u32,
    pub cpu_threads: u32,
    pub bio_threads: u32,
    pub bio_ack_threads: u32,
    pub bio_rotation_interval: u32,
}

impl Default for ThreadCounts {
    fn default() -> Self {
        ThreadCounts {
            logical_zones: 1,
            physical_zones: 1,
            hash_zones: 1,
            cpu_threads: 1,
            bio_threads: 4,
            bio_ack_threads: 1,
            bio_rotation_interval: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WritePolicy {
    Sync,
    Async,
    AsyncUnsafe,
}

/// Fixed-at-init fields plus the mutable subset allowed to change later.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pool_name: String,
    parent_device_name: String,
    logical_block_size: u32,
    cache_size: u32,
    block_map_maximum_age: u32,
    md_raid5_mode_enabled: bool,
    thread_counts: ThreadCounts,

    write_policy: WritePolicy,
    deduplication: bool,
    physical_blocks: u64,
    logical_bytes: u64,
}

impl Config {
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn parent_device_name(&self) -> &str {
        &self.parent_device_name
    }

    pub fn logical_block_size(&self) -> u32 {
        self.logical_block_size
    }

    pub fn cache_size(&self) -> u32 {
        self.cache_size
    }

    pub fn block_map_maximum_age(&self) -> u32 {
        self.block_map_maximum_age
    }

    pub fn md_raid5_mode_enabled(&self) -> bool {
        self.md_raid5_mode_enabled
    }

    pub fn thread_counts(&self) -> ThreadCounts {
        self.thread_counts
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    pub fn deduplication(&self) -> bool {
        self.deduplication
    }

    pub fn physical_blocks(&self) -> u64 {
        self.physical_blocks
    }

    pub fn logical_bytes(&self) -> u64 {
        self.logical_bytes
    }

    /// Validate and apply a modify-request against this snapshot. Only the
    /// mutable fields may differ from the current values; any other
    /// difference is a `parameter-mismatch`, and on rejection the snapshot
    /// is left untouched.
    pub fn apply_modify(&mut self, request: &ModifyRequest) -> Result<(), ErrorKind> {
        if request.pool_name != self.pool_name {
            return Err(ErrorKind::ParameterMismatch("pool_name"));
        }
        if request.parent_device_name != self.parent_device_name {
            return Err(ErrorKind::ParameterMismatch("parent_device_name"));
        }
        if request.logical_block_size != self.logical_block_size {
            return Err(ErrorKind::ParameterMismatch("logical_block_size"));
        }
        if request.cache_size != self.cache_size {
            return Err(ErrorKind::ParameterMismatch("cache_size"));
        }
        if request.block_map_maximum_age != self.block_map_maximum_age {
            return Err(ErrorKind::ParameterMismatch("block_map_maximum_age"));
        }
        if request.md_raid5_mode_enabled != self.md_raid5_mode_enabled {
            return Err(ErrorKind::ParameterMismatch("md_raid5_mode_enabled"));
        }
        if request.thread_counts != self.thread_counts {
            return Err(ErrorKind::ParameterMismatch("thread_counts"));
        }
        self.write_policy = request.write_policy;
        Ok(())
    }

    /// Grow the logical size. Must be a multiple of the block size; growth
    /// is one-directional and this only updates the snapshot, the caller is
    /// responsible for sequencing prepare/grow against the Engine and
    /// against SUSPENDED state.
    pub fn set_logical_bytes(&mut self, logical_bytes: u64) -> Result<(), ErrorKind> {
        if logical_bytes % self.logical_block_size as u64 != 0 {
            return Err(ErrorKind::ParameterMismatch("logical_bytes"));
        }
        if logical_bytes < self.logical_bytes {
            return Err(ErrorKind::ParameterMismatch("logical_bytes"));
        }
        self.logical_bytes = logical_bytes;
        Ok(())
    }

    pub fn set_physical_blocks(&mut self, physical_blocks: u64) -> Result<(), ErrorKind> {
        if physical_blocks < self.physical_blocks {
            return Err(ErrorKind::ParameterMismatch("physical_blocks"));
        }
        self.physical_blocks = physical_blocks;
        Ok(())
    }

    pub fn set_deduplication(&mut self, enabled: bool) {
        self.deduplication = enabled;
    }
}

/// The fields a `modify` admin message carries; compared field-for-field
/// against the live `Config` so any attempt to change an immutable field is
/// caught uniformly (`Config::apply_modify`).
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyRequest {
    pub pool_name: String,
    pub parent_device_name: String,
    pub logical_block_size: u32,
    pub cache_size: u32,
    pub block_map_maximum_age: u32,
    pub md_raid5_mode_enabled: bool,
    pub thread_counts: ThreadCounts,
    pub write_policy: WritePolicy,
}

pub struct ConfigBuilder {
    pool_name: String,
    parent_device_name: String,
    logical_block_size: u32,
    cache_size: u32,
    block_map_maximum_age: u32,
    md_raid5_mode_enabled: bool,
    thread_counts: ThreadCounts,
    write_policy: WritePolicy,
    deduplication: bool,
    physical_blocks: u64,
    logical_bytes: u64,
}

impl ConfigBuilder {
    pub fn new(pool_name: impl Into<String>, parent_device_name: impl Into<String>) -> Self {
        ConfigBuilder {
            pool_name: pool_name.into(),
            parent_device_name: parent_device_name.into(),
            logical_block_size: 4096,
            cache_size: 1024,
            block_map_maximum_age: 8 * 60,
            md_raid5_mode_enabled: false,
            thread_counts: ThreadCounts::default(),
            write_policy: WritePolicy::Async,
            deduplication: true,
            physical_blocks: 0,
            logical_bytes: 0,
        }
    }

    pub fn logical_block_size(mut self, size: u32) -> Self {
        self.logical_block_size = size;
        self
    }

    pub fn cache_size(mut self, size: u32) -> Self {
        self.cache_size = size;
        self
    }

    pub fn block_map_maximum_age(mut self, age: u32) -> Self {
        self.block_map_maximum_age = age;
        self
    }

    pub fn md_raid5_mode_enabled(mut self, enabled: bool) -> Self {
        self.md_raid5_mode_enabled = enabled;
        self
    }

    pub fn thread_counts(mut self, counts: ThreadCounts) -> Self {
        self.thread_counts = counts;
        self
    }

    pub fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn deduplication(mut self, enabled: bool) -> Self {
        self.deduplication = enabled;
        self
    }

    pub fn physical_blocks(mut self, blocks: u64) -> Self {
        self.physical_blocks = blocks;
        self
    }

    pub fn logical_bytes(mut self, bytes: u64) -> Result<Self, ErrorKind> {
        if bytes % self.logical_block_size as u64 != 0 {
            return Err(ErrorKind::ParameterMismatch("logical_bytes"));
        }
        self.logical_bytes = bytes;
        Ok(self)
    }

    pub fn build(self) -> Config {
        Config {
            pool_name: self.pool_name,
            parent_device_name: self.parent_device_name,
            logical_block_size: self.logical_block_size,
            cache_size: self.cache_size,
            block_map_maximum_age: self.block_map_maximum_age,
            md_raid5_mode_enabled: self.md_raid5_mode_enabled,
            thread_counts: self.thread_counts,
            write_policy: self.write_policy,
            deduplication: self.deduplication,
            physical_blocks: self.physical_blocks,
            logical_bytes: self.logical_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> Config {
        ConfigBuilder::new("pool0", "/dev/sdb")
            .logical_block_size(4096)
            .logical_bytes(4096 * 1024)
            .unwrap()
            .build()
    }

    #[test]
    fn modify_with_changed_immutable_field_is_rejected() {
        let mut cfg = build();
        let mut req = ModifyRequest {
            pool_name: cfg.pool_name().to_string(),
            parent_device_name: cfg.parent_device_name().to_string(),
            logical_block_size: cfg.logical_block_size(),
            cache_size: cfg.cache_size(),
            block_map_maximum_age: cfg.block_map_maximum_age(),
            md_raid5_mode_enabled: cfg.md_raid5_mode_enabled(),
            thread_counts: cfg.thread_counts(),
            write_policy: WritePolicy::Sync,
        };
        req.logical_block_size = 512;
        let before = cfg.clone();
        let err = cfg.apply_modify(&req).unwrap_err();
        assert!(matches!(err, ErrorKind::ParameterMismatch("logical_block_size")));
        assert_eq!(cfg, before);
    }

    #[test]
    fn modify_with_only_mutable_field_changed_succeeds() {
        let mut cfg = build();
        let req = ModifyRequest {
            pool_name: cfg.pool_name().to_string(),
            parent_device_name: cfg.parent_device_name().to_string(),
            logical_block_size: cfg.logical_block_size(),
            cache_size: cfg.cache_size(),
            block_map_maximum_age: cfg.block_map_maximum_age(),
            md_raid5_mode_enabled: cfg.md_raid5_mode_enabled(),
            thread_counts: cfg.thread_counts(),
            write_policy: WritePolicy::Sync,
        };
        cfg.apply_modify(&req).unwrap();
        assert_eq!(cfg.write_policy(), WritePolicy::Sync);
    }

    #[test]
    fn grow_logical_requires_block_alignment() {
        let mut cfg = build();
        let err = cfg.set_logical_bytes(4096 * 1024 + 1).unwrap_err();
        assert!(matches!(err, ErrorKind::ParameterMismatch("logical_bytes")));

        cfg.set_logical_bytes(4096 * 2048).unwrap();
        assert_eq!(cfg.logical_bytes(), 4096 * 2048);
    }
}
