#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub buffer_pool_size: usize,
    /// K parameter of the LRU-K replacer.
    pub lru_k_k: usize,
    /// Entries per bucket in the page-table directory.
    pub bucket_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            buffer_pool_size: 5000,
            lru_k_k: 2,
            bucket_size: 4,
        }
    }
}
