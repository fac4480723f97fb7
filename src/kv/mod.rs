//! 远程KV缓存客户端抽象模块
//!
//! 定义远程缓存服务必须实现的操作契约，`miss` 与 `already-stored`
//! 必须区别于其他传输失败单独上报

pub mod memory;

pub use memory::MemoryKvClient;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// KV客户端结果类型
pub type KvResult<T> = Result<T, KvError>;

/// KV客户端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// 键不存在
    #[error("cache miss")]
    Miss,

    /// `add` 时键已存在
    #[error("not stored")]
    NotStored,

    /// 传输层失败
    #[error("远程缓存通信失败: {message}")]
    Io { message: String },
}

impl KvError {
    /// 是否为未命中
    pub fn is_miss(&self) -> bool {
        matches!(self, KvError::Miss)
    }
}

/// 远程KV缓存客户端契约
///
/// 实现方（memcached、redis等客户端的适配层）必须保证：
/// - `get` 在键不存在时返回 [`KvError::Miss`]
/// - `get_multi` 只返回命中的键，缺失的键不算错误
/// - `add` 在键已存在时返回 [`KvError::NotStored`]
/// - 所有操作自带各自的超时控制
#[async_trait]
pub trait KvClient: Send + Sync {
    /// 读取单个键
    async fn get(&self, key: &str) -> KvResult<Bytes>;

    /// 批量读取，返回命中键到值的映射
    async fn get_multi(&self, keys: &[String]) -> KvResult<HashMap<String, Bytes>>;

    /// 写入键值，`expire_secs` 为过期秒数
    async fn set(&self, key: &str, value: Bytes, expire_secs: u32) -> KvResult<()>;

    /// 仅在键不存在时写入
    async fn add(&self, key: &str, value: Bytes, expire_secs: u32) -> KvResult<()>;

    /// 删除键，键不存在时返回 [`KvError::Miss`]
    async fn delete(&self, key: &str) -> KvResult<()>;
}
