//! 对象缓存读写路径
//!
//! 整条记录以 `(前缀, id, 版本)` 为键缓存。写路径先写缓存体
//! 再推进版本键，保证读到新版本的读者必能读到新值；读路径
//! 任何未命中或传输失败都退化为SQL回源

use super::CacheDao;
use crate::error::{CacheError, CacheResult};
use crate::record::CacheRecord;
use crate::version::now_millis;
use rat_logger::{debug, error, warn};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

impl<R: CacheRecord> CacheDao<R> {
    /// 按主键读取，优先走缓存，未命中回源并回写
    pub async fn get_by_id(&self, id: u64) -> CacheResult<Option<R>> {
        if id == 0 {
            return Err(CacheError::ArgumentError {
                message: "非法id，必须大于0".to_string(),
            });
        }

        // 第一步：对象版本
        let version = match self.versions.get_object_version(id).await {
            Ok(Some(version)) => version,
            Ok(None) => {
                warn!("对象版本未命中, id: {}", id);
                return self.set_object_cache_for_get_by_id(id).await;
            }
            Err(e) => {
                warn!("读取对象版本失败, id: {}, err: {}", id, e);
                return self.set_object_cache_for_get_by_id(id).await;
            }
        };

        // 第二步：对象缓存体
        let object_key = self.keys.object_key(id, &version);
        let value = match self.ctx.kv().get(&object_key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("对象缓存未命中, id: {}, err: {}", id, e);
                return self.set_object_cache_for_get_by_id(id).await;
            }
        };

        // 反序列化失败说明编解码不兼容，原样抛出而不是静默回填
        let record = self.serializer.deserialize(&value)?;
        debug!("命中对象缓存, id: {}", id);
        Ok(Some(record))
    }

    /// 按主键批量读取
    ///
    /// 版本缺席与缓存体缺席的id合并回源，结果按入参顺序重排：
    /// 每个位置取首个id匹配的记录，无法解析的id被丢弃
    pub async fn get_by_ids(&self, ids: &[u64]) -> CacheResult<Vec<R>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let versions = match self.versions.get_object_versions(ids).await {
            Ok(versions) => versions,
            Err(e) => {
                warn!("批量读取对象版本失败, ids: {:?}, err: {}", ids, e);
                let list = self.set_object_caches_for_get_by_ids(ids).await?;
                return Ok(self.reorder_by_ids(ids, list));
            }
        };
        debug!("批量读取对象版本耗时: {}ms", started.elapsed().as_millis());

        let mut absent_ids: Vec<u64> = Vec::new();
        let mut fetch_keys: Vec<String> = Vec::new();
        let mut present_ids: Vec<u64> = Vec::new();
        for &id in ids {
            match versions.get(&id) {
                Some(version) => {
                    fetch_keys.push(self.keys.object_key(id, version));
                    present_ids.push(id);
                }
                None => absent_ids.push(id),
            }
        }

        let started = Instant::now();
        let items = match self.ctx.kv().get_multi(&fetch_keys).await {
            Ok(items) => items,
            Err(e) => {
                warn!("批量读取对象缓存失败, ids: {:?}, err: {}", ids, e);
                let list = self.set_object_caches_for_get_by_ids(ids).await?;
                return Ok(self.reorder_by_ids(ids, list));
            }
        };
        debug!("批量读取对象缓存耗时: {}ms", started.elapsed().as_millis());

        let mut records: Vec<R> = Vec::new();
        let mut cached_ids: HashSet<u64> = HashSet::new();
        for (key, value) in &items {
            let id = match self.keys.id_from_object_key(key) {
                Some(id) => id,
                None => continue,
            };
            // 无法反序列化的条目按尽力而为跳过，不进入回源集合
            cached_ids.insert(id);
            match self.serializer.deserialize(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!("跳过无法反序列化的缓存条目 '{}': {}", key, e),
            }
        }

        for &id in &present_ids {
            if !cached_ids.contains(&id) {
                absent_ids.push(id);
            }
        }
        debug!("缺席id: {:?}", absent_ids);

        if !absent_ids.is_empty() {
            match self.set_object_caches_for_get_by_ids(&absent_ids).await {
                Ok(list) => records.extend(list),
                Err(e) => {
                    warn!("回源缺席id失败, ids: {:?}, err: {}", absent_ids, e);
                    let list = self.set_object_caches_for_get_by_ids(ids).await?;
                    return Ok(self.reorder_by_ids(ids, list));
                }
            }
        }

        Ok(self.reorder_by_ids(ids, records))
    }

    /// 写入对象缓存并推进对象版本
    pub async fn set_object_cache(&self, record: &R) -> CacheResult<()> {
        let id = record.id();

        // 先写缓存体再推进版本。相反的顺序会出现一段
        // 版本悬空期：读者拿到新版本却取不到值
        let now = now_millis();
        let object_key = self.keys.object_key(id, &now.to_string());
        let data = self.serializer.serialize(record)?;
        self.ctx
            .kv()
            .set(&object_key, data, self.meta.expire_secs)
            .await?;

        self.versions.set_object_version(id, now).await
    }

    /// 单条回源并回写对象缓存
    pub(crate) async fn set_object_cache_for_get_by_id(&self, id: u64) -> CacheResult<Option<R>> {
        let record = self.source.get_by_id(id).await?;
        if let Some(ref r) = record {
            if let Err(e) = self.set_object_cache(r).await {
                error!("设置对象缓存失败, id: {}, err: {}", id, e);
            }
        }
        Ok(record)
    }

    /// 批量回源，缓存回写在有界后台任务中完成
    pub(crate) async fn set_object_caches_for_get_by_ids(
        &self,
        ids: &[u64],
    ) -> CacheResult<Vec<R>> {
        let list = self.source.get_by_ids(ids).await?;

        let dao = self.clone();
        let warm_list = list.clone();
        self.ctx.spawn_warm("object_caches", async move {
            dao.set_object_caches(warm_list).await;
            Ok(())
        });

        Ok(list)
    }

    /// 逐条写入对象缓存，单条失败不影响其余
    pub(crate) async fn set_object_caches(&self, records: Vec<R>) {
        for record in &records {
            if let Err(e) = self.set_object_cache(record).await {
                error!("批量回写对象缓存失败, id: {}, err: {}", record.id(), e);
            }
        }
    }

    /// 按入参id顺序重排结果，同id取首见记录，无匹配的id丢弃
    fn reorder_by_ids(&self, ids: &[u64], records: Vec<R>) -> Vec<R> {
        let mut by_id: HashMap<u64, R> = HashMap::with_capacity(records.len());
        for record in records {
            by_id.entry(record.id()).or_insert(record);
        }

        let mut ret = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = by_id.get(id) {
                ret.push(record.clone());
            }
        }
        ret
    }
}
