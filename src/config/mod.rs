#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub buffer_pool_size: usize,
    /// Backward K-distance used by the LRU-K replacer.
    pub lru_k_k: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            buffer_pool_size: 1024,
            lru_k_k: 2,
        }
    }
}
