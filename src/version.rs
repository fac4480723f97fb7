//! 版本计数器存取模块
//!
//! 对象版本与查询方法版本统一存放在远程KV中，值为十进制毫秒
//! 时间戳文本。未命中以 `None` 上报，不作为错误；其余传输错误
//! 原样向上传播

use crate::error::CacheResult;
use crate::keys::KeyBuilder;
use crate::kv::{KvClient, KvError};
use crate::meta::EntityMeta;
use crate::types::ArgValue;
use bytes::Bytes;
use rat_logger::warn;
use std::collections::HashMap;
use std::sync::Arc;

/// 当前毫秒时间戳
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 版本存取器
#[derive(Clone)]
pub struct VersionStore {
    kv: Arc<dyn KvClient>,
    keys: KeyBuilder,
    meta: Arc<EntityMeta>,
}

impl VersionStore {
    /// 创建版本存取器
    pub fn new(kv: Arc<dyn KvClient>, keys: KeyBuilder, meta: Arc<EntityMeta>) -> Self {
        Self { kv, keys, meta }
    }

    /// 读取对象版本，未命中返回 `None`
    pub async fn get_object_version(&self, id: u64) -> CacheResult<Option<String>> {
        let version_key = self.keys.object_version_key(id);
        match self.kv.get(&version_key).await {
            Ok(value) => Ok(Some(bytes_to_text(&value))),
            Err(KvError::Miss) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 批量读取对象版本，结果仅包含命中的id
    pub async fn get_object_versions(&self, ids: &[u64]) -> CacheResult<HashMap<u64, String>> {
        let version_keys: Vec<String> = ids
            .iter()
            .map(|id| self.keys.object_version_key(*id))
            .collect();
        let items = self.kv.get_multi(&version_keys).await?;

        let mut ret = HashMap::with_capacity(items.len());
        for (key, value) in items {
            match self.keys.id_from_object_version_key(&key) {
                Some(id) => {
                    ret.insert(id, bytes_to_text(&value));
                }
                None => {
                    warn!("无法从版本键 '{}' 反解id", key);
                }
            }
        }
        Ok(ret)
    }

    /// 写入对象版本
    pub async fn set_object_version(&self, id: u64, token: i64) -> CacheResult<()> {
        let version_key = self.keys.object_version_key(id);
        self.kv
            .set(
                &version_key,
                Bytes::from(token.to_string()),
                self.meta.expire_secs,
            )
            .await?;
        Ok(())
    }

    /// 构造方法版本键
    ///
    /// 按通知信息声明的参数下标取参数文本，拼在版本键前缀之后
    pub fn method_version_key(&self, method: &str, args: &[ArgValue]) -> CacheResult<String> {
        let info = self.meta.method_info(method)?;
        let mut field_texts = Vec::with_capacity(info.args.len());
        for arg_index in &info.args {
            let text = args
                .get(*arg_index)
                .map(|arg| arg.to_key_text())
                .unwrap_or_default();
            field_texts.push(text);
        }
        Ok(self.keys.version_key(&info.version_key_prefix, &field_texts))
    }

    /// 读取方法版本，未命中返回 `None`
    pub async fn get_method_version(
        &self,
        method: &str,
        args: &[ArgValue],
    ) -> CacheResult<Option<String>> {
        let version_key = self.method_version_key(method, args)?;
        match self.kv.get(&version_key).await {
            Ok(value) => Ok(Some(bytes_to_text(&value))),
            Err(KvError::Miss) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 批量读取方法版本
    ///
    /// 返回 `参数串 -> 版本` 的映射，键为 [`KeyBuilder::join_args`] 文本，
    /// 仅包含命中的参数组
    pub async fn get_method_versions(
        &self,
        method: &str,
        arg_tuples: &[Vec<ArgValue>],
    ) -> CacheResult<HashMap<String, String>> {
        let mut version_keys = Vec::with_capacity(arg_tuples.len());
        let mut key_to_args: HashMap<String, String> = HashMap::with_capacity(arg_tuples.len());
        for tuple in arg_tuples {
            let version_key = match self.method_version_key(method, tuple) {
                Ok(k) => k,
                Err(e) => {
                    warn!("构造方法版本键失败: {}", e);
                    continue;
                }
            };
            key_to_args.insert(version_key.clone(), self.keys.join_args(tuple));
            version_keys.push(version_key);
        }

        let items = self.kv.get_multi(&version_keys).await?;
        let mut ret = HashMap::with_capacity(items.len());
        for (key, value) in items {
            if let Some(args_text) = key_to_args.get(&key) {
                ret.insert(args_text.clone(), bytes_to_text(&value));
            }
        }
        Ok(ret)
    }

    /// 无条件覆盖方法版本，失效路径使用
    pub async fn set_method_version(
        &self,
        method: &str,
        token: i64,
        args: &[ArgValue],
    ) -> CacheResult<()> {
        let version_key = self.method_version_key(method, args)?;
        self.set_version_key(&version_key, token).await
    }

    /// 仅在版本不存在时写入；已存在视为成功
    pub async fn add_method_version(
        &self,
        method: &str,
        token: i64,
        args: &[ArgValue],
    ) -> CacheResult<()> {
        let version_key = self.method_version_key(method, args)?;
        match self
            .kv
            .add(
                &version_key,
                Bytes::from(token.to_string()),
                self.meta.expire_secs,
            )
            .await
        {
            Ok(()) | Err(KvError::NotStored) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 直接按版本键写入版本值
    pub async fn set_version_key(&self, version_key: &str, token: i64) -> CacheResult<()> {
        self.kv
            .set(
                version_key,
                Bytes::from(token.to_string()),
                self.meta.expire_secs,
            )
            .await?;
        Ok(())
    }
}

fn bytes_to_text(bytes: &Bytes) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvClient;
    use crate::meta::EntityMeta;

    fn store() -> VersionStore {
        let meta = Arc::new(
            EntityMeta::assemble(
                "User",
                None,
                "Id",
                None,
                &["func=FindByName;type=concrete;keys=['Name'];args=[0]".to_string()],
            )
            .unwrap(),
        );
        VersionStore::new(
            Arc::new(MemoryKvClient::new()),
            KeyBuilder::new(meta.object_prefix.clone()),
            meta,
        )
    }

    #[tokio::test]
    async fn test_object_version_roundtrip() {
        let store = store();
        assert_eq!(store.get_object_version(7).await.unwrap(), None);

        store.set_object_version(7, 1700000000123).await.unwrap();
        assert_eq!(
            store.get_object_version(7).await.unwrap(),
            Some("1700000000123".to_string())
        );

        let versions = store.get_object_versions(&[7, 8]).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[&7], "1700000000123");
    }

    #[tokio::test]
    async fn test_method_version_add_is_idempotent() {
        let store = store();
        let args = vec![ArgValue::Str("a".to_string())];

        store.add_method_version("FindByName", 100, &args).await.unwrap();
        // 已存在时 add 视为成功且不覆盖
        store.add_method_version("FindByName", 200, &args).await.unwrap();
        assert_eq!(
            store.get_method_version("FindByName", &args).await.unwrap(),
            Some("100".to_string())
        );

        // set 无条件覆盖
        store.set_method_version("FindByName", 300, &args).await.unwrap();
        assert_eq!(
            store.get_method_version("FindByName", &args).await.unwrap(),
            Some("300".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_method_version_key() {
        let store = store();
        assert!(store.method_version_key("Nope", &[]).is_err());
    }
}
