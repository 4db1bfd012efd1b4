use super::types::CompressionAlgorithm;

pub(super) fn default_min_size() -> u32 {
    64 * 1024 // 64 KiB
}

pub(super) fn default_normal_size() -> u32 {
    1024 * 1024 // 1 MiB
}

pub(super) fn default_max_size() -> u32 {
    4 * 1024 * 1024 // 4 MiB
}

pub(super) fn default_packfile_max_size() -> u32 {
    20 * 1024 * 1024 // 20 MiB
}

pub(super) fn default_btree_order() -> usize {
    50
}

pub(super) fn default_algorithm() -> CompressionAlgorithm {
    CompressionAlgorithm::Lz4
}

pub(super) fn default_zstd_level() -> i32 {
    3
}

pub(super) fn default_file_cache() -> bool {
    true
}

pub(super) fn default_file_cache_ttl_secs() -> u64 {
    7 * 24 * 3600
}

/// Twice the available CPUs, at least one.
pub fn default_max_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}
