//! 进程内KV客户端实现
//!
//! 按契约实现 `get`/`get_multi`/`set`/`add`/`delete` 与TTL语义，
//! 供测试和单进程部署场景使用

use super::{KvClient, KvError, KvResult};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 缓存条目
#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    /// 过期时刻，`None` 表示永不过期
    deadline: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// 进程内KV客户端
#[derive(Debug, Default)]
pub struct MemoryKvClient {
    entries: DashMap<String, Entry>,
}

impl MemoryKvClient {
    /// 创建空的客户端
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// 当前存活的条目数量（惰性清理过期条目）
    pub fn len(&self) -> usize {
        self.entries.retain(|_, entry| !entry.expired());
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_entry(value: Bytes, expire_secs: u32) -> Entry {
        let deadline = if expire_secs > 0 {
            Some(Instant::now() + Duration::from_secs(expire_secs as u64))
        } else {
            None
        };
        Entry { value, deadline }
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn get(&self, key: &str) -> KvResult<Bytes> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired() {
                return Ok(entry.value.clone());
            }
        } else {
            return Err(KvError::Miss);
        }

        // 过期条目惰性清理，读锁释放后再删除
        self.entries.remove(key);
        Err(KvError::Miss)
    }

    async fn get_multi(&self, keys: &[String]) -> KvResult<HashMap<String, Bytes>> {
        let mut ret = HashMap::new();
        for key in keys {
            if let Ok(value) = self.get(key).await {
                ret.insert(key.clone(), value);
            }
        }
        Ok(ret)
    }

    async fn set(&self, key: &str, value: Bytes, expire_secs: u32) -> KvResult<()> {
        self.entries
            .insert(key.to_string(), Self::make_entry(value, expire_secs));
        Ok(())
    }

    async fn add(&self, key: &str, value: Bytes, expire_secs: u32) -> KvResult<()> {
        // entry API 保证检查与写入的原子性
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.insert(Self::make_entry(value, expire_secs));
                    Ok(())
                } else {
                    Err(KvError::NotStored)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Self::make_entry(value, expire_secs));
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        match self.entries.remove(key) {
            Some(_) => Ok(()),
            None => Err(KvError::Miss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let kv = MemoryKvClient::new();
        assert_eq!(kv.get("a").await, Err(KvError::Miss));

        kv.set("a", Bytes::from_static(b"1"), 60).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Bytes::from_static(b"1"));

        kv.delete("a").await.unwrap();
        assert_eq!(kv.delete("a").await, Err(KvError::Miss));
    }

    #[tokio::test]
    async fn test_add_distinguishes_not_stored() {
        let kv = MemoryKvClient::new();
        kv.add("k", Bytes::from_static(b"1"), 60).await.unwrap();
        assert_eq!(
            kv.add("k", Bytes::from_static(b"2"), 60).await,
            Err(KvError::NotStored)
        );
        // 原值保持不变
        assert_eq!(kv.get("k").await.unwrap(), Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn test_get_multi_skips_missing() {
        let kv = MemoryKvClient::new();
        kv.set("a", Bytes::from_static(b"1"), 60).await.unwrap();
        kv.set("b", Bytes::from_static(b"2"), 60).await.unwrap();

        let keys = vec!["a".to_string(), "x".to_string(), "b".to_string()];
        let ret = kv.get_multi(&keys).await.unwrap();
        assert_eq!(ret.len(), 2);
        assert!(!ret.contains_key("x"));
    }
}
