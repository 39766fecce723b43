//! Process-wide byte-buffer pools.
//!
//! Request bodies are JSON-encoded into pooled buffers and response bodies
//! are read into them, so short-lived requests do not allocate new backing
//! arrays. [`PooledBuf`] is an RAII guard: dropping it returns the buffer
//! to its pool with length reset and capacity preserved.

use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

use bytes::Bytes;
use parking_lot::Mutex;

/// Buffers above this capacity are dropped instead of pooled, so one huge
/// response cannot pin memory forever.
const MAX_POOLED_CAPACITY: usize = 1 << 20;

/// How many idle buffers a pool retains.
const MAX_POOLED_BUFFERS: usize = 32;

pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Take a buffer from the pool (or allocate a fresh one). The returned
    /// guard has length 0.
    pub fn get(&'static self) -> PooledBuf {
        let buf = self.buffers.lock().pop().unwrap_or_default();
        PooledBuf { buf, pool: self }
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < MAX_POOLED_BUFFERS {
            buffers.push(buf);
        }
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.buffers.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard over a pooled `Vec<u8>`; derefs to the vector and returns it
/// to the pool on drop.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: &'static BufferPool,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}

/// Pool used for encoding request bodies.
pub fn request_pool() -> &'static BufferPool {
    static POOL: OnceLock<BufferPool> = OnceLock::new();
    POOL.get_or_init(BufferPool::new)
}

/// Pool used for reading response bodies.
pub fn response_pool() -> &'static BufferPool {
    static POOL: OnceLock<BufferPool> = OnceLock::new();
    POOL.get_or_init(BufferPool::new)
}

/// JSON-encode `value` through the request pool, freezing the result into a
/// cheaply-cloneable [`Bytes`] so retry attempts resend the same body
/// without re-encoding. The scratch buffer returns to the pool immediately.
pub fn encode_json_body(value: &serde_json::Value) -> wh_domain::Result<Bytes> {
    let mut buf = request_pool().get();
    serde_json::to_writer(&mut *buf, value)
        .map_err(|e| wh_domain::Error::request(format!("failed to encode request body: {e}")))?;
    Ok(Bytes::copy_from_slice(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_returns_to_pool_with_capacity_preserved() {
        static POOL: OnceLock<BufferPool> = OnceLock::new();
        let pool = POOL.get_or_init(BufferPool::new);

        let capacity = {
            let mut buf = pool.get();
            buf.extend_from_slice(&[0u8; 4096]);
            buf.capacity()
        };
        assert!(capacity >= 4096);
        assert_eq!(pool.idle(), 1);

        let buf = pool.get();
        assert_eq!(buf.len(), 0);
        assert!(buf.capacity() >= 4096, "capacity was not preserved");
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn oversized_buffers_are_not_pooled() {
        static POOL: OnceLock<BufferPool> = OnceLock::new();
        let pool = POOL.get_or_init(BufferPool::new);

        {
            let mut buf = pool.get();
            buf.reserve(MAX_POOLED_CAPACITY + 1);
        }
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn encode_json_body_is_cloneable_across_attempts() {
        let body = encode_json_body(&serde_json::json!({"k": "v"})).unwrap();
        assert_eq!(&body[..], br#"{"k":"v"}"#);
        let second = body.clone();
        assert_eq!(body, second);
    }
}
