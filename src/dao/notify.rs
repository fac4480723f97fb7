//! 失效路由
//!
//! 记录变更后调用：尽力删除当前版本的对象缓存体，并把该记录
//! 牵连的每个查询版本键推进到当前时间。旧版本下的查询缓存条目
//! 不再可达，留待TTL自然过期

use super::CacheDao;
use crate::error::CacheResult;
use crate::record::CacheRecord;
use crate::version::now_millis;
use rat_logger::{debug, error, warn};

impl<R: CacheRecord> CacheDao<R> {
    /// 记录新增/修改/删除后的缓存失效入口
    pub async fn notify_modified(&self, record: &R) -> CacheResult<()> {
        let id = record.id();

        // 删除对象缓存体，失败不阻断版本推进
        match self.versions.get_object_version(id).await {
            Ok(Some(version)) => {
                let object_key = self.keys.object_key(id, &version);
                debug!("删除对象缓存键: {}", object_key);
                if let Err(e) = self.ctx.kv().delete(&object_key).await {
                    if !e.is_miss() {
                        warn!("删除对象缓存失败, key: {}, err: {}", object_key, e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => error!("读取对象版本失败, id: {}, err: {}", id, e),
        }

        // 推进每个通知信息对应的查询版本
        let now = now_millis();
        for info in &self.meta.notify_infos {
            let field_texts: Vec<String> = info
                .fields
                .iter()
                .map(|field| record.field_text(field).unwrap_or_default())
                .collect();
            let version_key = self.keys.version_key(&info.version_key_prefix, &field_texts);
            debug!("推进查询版本键: {}", version_key);
            if let Err(e) = self.versions.set_version_key(&version_key, now).await {
                error!("推进查询版本失败, key: {}, err: {}", version_key, e);
            }
        }

        Ok(())
    }
}
