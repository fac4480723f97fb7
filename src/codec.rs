//! 记录序列化模块
//!
//! 定义记录与字节之间的编解码契约，默认提供JSON实现

use crate::error::{CacheError, CacheResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// 记录序列化器契约
pub trait Serializer<R>: Send + Sync {
    /// 将记录编码为字节
    fn serialize(&self, record: &R) -> CacheResult<Bytes>;

    /// 从字节还原记录
    fn deserialize(&self, bytes: &[u8]) -> CacheResult<R>;
}

/// 默认的JSON序列化器
pub struct JsonSerializer<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R> JsonSerializer<R> {
    /// 创建JSON序列化器
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R> Default for JsonSerializer<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Serializer<R> for JsonSerializer<R>
where
    R: Serialize + DeserializeOwned + Send + Sync,
{
    fn serialize(&self, record: &R) -> CacheResult<Bytes> {
        let data = serde_json::to_vec(record).map_err(|e| CacheError::SerializationError {
            message: format!("记录序列化失败: {}", e),
        })?;
        Ok(Bytes::from(data))
    }

    fn deserialize(&self, bytes: &[u8]) -> CacheResult<R> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::SerializationError {
            message: format!("记录反序列化失败: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Demo {
        id: u64,
        name: String,
    }

    #[test]
    fn test_json_roundtrip() {
        let serializer = JsonSerializer::<Demo>::new();
        let record = Demo {
            id: 7,
            name: "索引页".to_string(),
        };
        let bytes = serializer.serialize(&record).unwrap();
        let back = serializer.deserialize(&bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_deserialize_error_is_fatal_kind() {
        let serializer = JsonSerializer::<Demo>::new();
        let ret = serializer.deserialize(b"not-json");
        assert!(matches!(
            ret,
            Err(CacheError::SerializationError { .. })
        ));
    }
}
