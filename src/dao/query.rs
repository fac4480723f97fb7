//! 查询缓存路径
//!
//! 三种查询形态共用一套版本化键：`concrete` 缓存单条记录的
//! 主键，`concrete`批量形态将平行列表参数拆行后逐行查缓存，
//! `list`/`range` 缓存JSON编码的主键列表。缓存值只存主键，
//! 记录本身始终经对象缓存取回

use super::CacheDao;
use crate::error::{CacheError, CacheResult};
use crate::method::MethodHandle;
use crate::meta::NotifyInfo;
use crate::record::CacheRecord;
use crate::types::{ArgValue, QueryMode};
use crate::version::now_millis;
use bytes::Bytes;
use rat_logger::{debug, error, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

impl<R: CacheRecord> CacheDao<R> {
    /// 二级键查询，命中时经缓存的主键转入 [`CacheDao::get_by_id`]
    ///
    /// 设计假定二级键与记录一一对应；多条记录共享同一组
    /// 二级键值时只有首见记录生效
    pub async fn get_by_concrete_key(
        &self,
        method: &str,
        args: &[ArgValue],
    ) -> CacheResult<Option<R>> {
        self.meta.method_info(method)?;
        let handle = self.method_handle(method)?;

        let cache_key = match self.query_cache_key(method, args).await {
            Ok(Some(cache_key)) => cache_key,
            Ok(None) => {
                warn!("方法 '{}' 版本未命中, 回源查询", method);
                return self.set_cache_for_concrete(method, &handle, args).await;
            }
            Err(e) => {
                warn!("方法 '{}' 读取版本失败: {}, 回源查询", method, e);
                return self.set_cache_for_concrete(method, &handle, args).await;
            }
        };

        let value = match self.ctx.kv().get(&cache_key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("方法 '{}' 缓存未命中: {}, 回源查询", method, e);
                return self.set_cache_for_concrete(method, &handle, args).await;
            }
        };

        let text = String::from_utf8_lossy(&value);
        match text.parse::<u64>() {
            Ok(id) => {
                debug!("命中二级键缓存, 方法: {}", method);
                self.get_by_id(id).await
            }
            Err(_) => {
                warn!("二级键缓存值损坏 '{}', 回源查询", text);
                self.set_cache_for_concrete(method, &handle, args).await
            }
        }
    }

    /// 二级键批量查询
    ///
    /// 参数中的序列值为平行列表，逐行拆分后批量查版本与缓存，
    /// 缺席行合并为一次回源调用。返回顺序为尽力而为
    pub async fn get_by_concrete_keys(
        &self,
        method: &str,
        args: &[ArgValue],
    ) -> CacheResult<Vec<R>> {
        let info = self.meta.method_info(method)?.clone();
        let handle = self.method_handle(method)?;

        // 找出列表参数位置并校验等长
        let list_positions: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, arg)| arg.is_seq())
            .map(|(i, _)| i)
            .collect();
        if list_positions.is_empty() {
            return Err(CacheError::ArgumentError {
                message: "参数中没有列表参数".to_string(),
            });
        }
        let mut row_count: Option<usize> = None;
        for &pos in &list_positions {
            let len = args[pos].seq_len().unwrap_or(0);
            match row_count {
                Some(expected) if expected != len => {
                    return Err(CacheError::ArgumentError {
                        message: "列表参数长度不一致".to_string(),
                    });
                }
                Some(_) => {}
                None => row_count = Some(len),
            }
        }
        let row_count = row_count.unwrap_or(0);
        debug!("列表参数位置: {:?}, 行数: {}", list_positions, row_count);
        if row_count == 0 {
            return Ok(Vec::new());
        }

        // 拆行：列表位置逐行取元素，其余参数原样复制
        let tuples: Vec<Vec<ArgValue>> = (0..row_count)
            .map(|row| {
                args.iter()
                    .enumerate()
                    .map(|(i, arg)| match arg {
                        ArgValue::Seq(items) if list_positions.contains(&i) => items[row].clone(),
                        other => other.clone(),
                    })
                    .collect()
            })
            .collect();

        // 批量读方法版本
        let versions = match self.versions.get_method_versions(method, &tuples).await {
            Ok(versions) => versions,
            Err(e) => {
                warn!("方法 '{}' 批量读取版本失败: {}, 回源查询", method, e);
                return self
                    .concrete_keys_fallback(method, &handle, args, &tuples)
                    .await;
            }
        };
        debug!("命中版本数: {}/{}", versions.len(), tuples.len());

        // 有版本的行计算缓存键后批量读
        let mut cache_keys = Vec::with_capacity(versions.len());
        for tuple in &tuples {
            let args_text = self.keys.join_args(tuple);
            if let Some(version) = versions.get(&args_text) {
                let key_prefix = self.keys.key_prefix(method, tuple);
                cache_keys.push(self.keys.cache_key(&key_prefix, version));
            }
        }

        let started = Instant::now();
        let items = match self.ctx.kv().get_multi(&cache_keys).await {
            Ok(items) => items,
            Err(e) => {
                warn!("方法 '{}' 批量读取缓存失败: {}, 回源查询", method, e);
                return self
                    .concrete_keys_fallback(method, &handle, args, &tuples)
                    .await;
            }
        };
        debug!("批量读取查询缓存耗时: {}ms", started.elapsed().as_millis());

        let mut ids: Vec<u64> = Vec::with_capacity(items.len());
        for value in items.values() {
            let text = String::from_utf8_lossy(value);
            match text.parse::<u64>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!("跳过损坏的二级键缓存值 '{}'", text),
            }
        }

        let mut records = match self.get_by_ids(&ids).await {
            Ok(records) => records,
            Err(e) => {
                warn!("方法 '{}' 取回缓存记录失败: {}, 回源查询", method, e);
                return self
                    .concrete_keys_fallback(method, &handle, args, &tuples)
                    .await;
            }
        };

        if records.len() >= row_count {
            return Ok(records);
        }

        // 对照拆行参数找出缺席行
        let tuple_map: HashMap<String, &[ArgValue]> = tuples
            .iter()
            .map(|tuple| (tuple_match_key(&info, tuple), tuple.as_slice()))
            .collect();
        let matched: HashSet<String> = records
            .iter()
            .map(|record| record_match_key(&info, record))
            .collect();

        let mut absent = false;
        let mut absent_rows: Vec<&[ArgValue]> = Vec::new();
        for (match_key, tuple) in &tuple_map {
            if !matched.contains(match_key) {
                absent = true;
                absent_rows.push(*tuple);
            }
        }

        if absent {
            // 重写列表位置参数，只保留缺席行的取值
            let mut absent_args: Vec<ArgValue> = args.to_vec();
            for &pos in &list_positions {
                let values: Vec<ArgValue> = absent_rows
                    .iter()
                    .map(|tuple| tuple[pos].clone())
                    .collect();
                absent_args[pos] = ArgValue::Seq(values);
            }
            debug!("缺席行数: {}", absent_rows.len());

            let absent_records = handle.invoke(QueryMode::Full, absent_args).await?;

            // 整个拆行集合异步回写，逐行与记录按键匹配
            let dao = self.clone();
            let warm_records = absent_records.clone();
            let warm_method = method.to_string();
            let warm_tuples = tuples.clone();
            self.ctx.spawn_warm("concrete_caches", async move {
                dao.set_caches(&warm_records, &warm_method, &warm_tuples)
                    .await
            });

            records.extend(absent_records);
        }

        Ok(records)
    }

    /// 列表查询，缓存值为JSON编码的主键列表
    ///
    /// 首个参数必须是数据访问句柄占位（[`ArgValue::Db`]），
    /// 回源时以仅投影主键的模式调用方法句柄
    pub async fn get_by_list(&self, method: &str, args: &[ArgValue]) -> CacheResult<Vec<R>> {
        self.meta.method_info(method)?;
        let handle = self.method_handle(method)?;

        if !args.first().map(ArgValue::is_db).unwrap_or(false) {
            return Err(CacheError::ArgumentError {
                message: "首个参数必须是数据访问句柄".to_string(),
            });
        }

        let cache_key = match self.query_cache_key(method, args).await {
            Ok(Some(cache_key)) => cache_key,
            Ok(None) => {
                warn!("列表方法 '{}' 版本未命中, 回源查询", method);
                return self.set_list_cache(method, &handle, args).await;
            }
            Err(e) => {
                warn!("列表方法 '{}' 读取版本失败: {}, 回源查询", method, e);
                return self.set_list_cache(method, &handle, args).await;
            }
        };

        let value = match self.ctx.kv().get(&cache_key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("列表方法 '{}' 缓存未命中: {}, 回源查询", method, e);
                return self.set_list_cache(method, &handle, args).await;
            }
        };
        debug!("命中列表缓存键 {}", cache_key);

        // 主键列表损坏属于编解码错误，原样抛出
        let ids: Vec<u64> =
            serde_json::from_slice(&value).map_err(|e| CacheError::SerializationError {
                message: format!("列表缓存值解析失败: {}", e),
            })?;
        self.get_by_ids(&ids).await
    }

    /// 失效通知之外的查询缓存写入：对象缓存先行，方法缓存
    /// 复用既有版本，版本键以 `add` 写入保证并发写者一致
    pub(crate) async fn set_cache(
        &self,
        record: &R,
        method: &str,
        args: &[ArgValue],
    ) -> CacheResult<()> {
        // 对象缓存失败不阻断方法缓存
        if let Err(e) = self.set_object_cache(record).await {
            warn!("设置对象缓存失败, id: {}, err: {}", record.id(), e);
        }

        // 已有版本优先复用，让旧版本下的条目被干净覆盖
        let old_version = self.versions.get_method_version(method, args).await?;
        let version_token = old_version
            .and_then(|text| text.parse::<i64>().ok())
            .unwrap_or_else(now_millis);

        let key_prefix = self.keys.key_prefix(method, args);
        let cache_key = self.keys.cache_key(&key_prefix, &version_token.to_string());
        self.ctx
            .kv()
            .set(
                &cache_key,
                Bytes::from(record.id().to_string()),
                self.meta.expire_secs,
            )
            .await?;

        // 版本已存在时忽略冲突
        self.versions
            .add_method_version(method, version_token, args)
            .await
    }

    /// 将一批记录按拆行参数匹配后逐行写缓存
    pub(crate) async fn set_caches(
        &self,
        records: &[R],
        method: &str,
        tuples: &[Vec<ArgValue>],
    ) -> CacheResult<()> {
        let info = self.meta.method_info(method)?.clone();
        let tuple_map: HashMap<String, &[ArgValue]> = tuples
            .iter()
            .map(|tuple| (tuple_match_key(&info, tuple), tuple.as_slice()))
            .collect();

        for record in records {
            let match_key = record_match_key(&info, record);
            if let Some(tuple) = tuple_map.get(&match_key) {
                debug!("缓存匹配行: {}", match_key);
                if let Err(e) = self.set_cache(record, method, tuple).await {
                    error!("回写查询缓存失败, 方法: {}, err: {}", method, e);
                }
            }
        }
        Ok(())
    }

    /// 查询缓存键，方法版本缺席时返回 `None`
    async fn query_cache_key(
        &self,
        method: &str,
        args: &[ArgValue],
    ) -> CacheResult<Option<String>> {
        let version = match self.versions.get_method_version(method, args).await? {
            Some(version) => version,
            None => return Ok(None),
        };
        let key_prefix = self.keys.key_prefix(method, args);
        Ok(Some(self.keys.cache_key(&key_prefix, &version)))
    }

    /// `concrete` 回源路径：查SQL、写缓存、返回首条记录
    async fn set_cache_for_concrete(
        &self,
        method: &str,
        handle: &MethodHandle<R>,
        args: &[ArgValue],
    ) -> CacheResult<Option<R>> {
        let records = handle.invoke(QueryMode::Full, args.to_vec()).await?;
        let record = records.into_iter().next();
        if let Some(ref r) = record {
            if let Err(e) = self.set_cache(r, method, args).await {
                error!("回写查询缓存失败, 方法: {}, err: {}", method, e);
            }
        }
        Ok(record)
    }

    /// 批量路径的整体回源：一次SQL调用，拆行集合异步回写
    async fn concrete_keys_fallback(
        &self,
        method: &str,
        handle: &MethodHandle<R>,
        args: &[ArgValue],
        tuples: &[Vec<ArgValue>],
    ) -> CacheResult<Vec<R>> {
        let records = handle.invoke(QueryMode::Full, args.to_vec()).await?;

        let dao = self.clone();
        let warm_records = records.clone();
        let warm_method = method.to_string();
        let warm_tuples = tuples.to_vec();
        self.ctx.spawn_warm("concrete_caches", async move {
            dao.set_caches(&warm_records, &warm_method, &warm_tuples)
                .await
        });

        Ok(records)
    }

    /// `list` 回源路径：仅投影主键调用方法，经对象缓存取回
    /// 记录，主键列表持久化到方法缓存键下
    async fn set_list_cache(
        &self,
        method: &str,
        handle: &MethodHandle<R>,
        args: &[ArgValue],
    ) -> CacheResult<Vec<R>> {
        let id_records = handle.invoke(QueryMode::IdOnly, args.to_vec()).await?;
        let ids: Vec<u64> = id_records.iter().map(|record| record.id()).collect();

        let records = self.get_by_ids(&ids).await?;

        // 版本读取失败退化为新令牌，不丢弃已取回的记录
        let version_token = match self.versions.get_method_version(method, args).await {
            Ok(Some(text)) => text.parse::<i64>().unwrap_or_else(|_| now_millis()),
            Ok(None) => now_millis(),
            Err(e) => {
                warn!("列表方法 '{}' 读取版本失败: {}", method, e);
                now_millis()
            }
        };

        let key_prefix = self.keys.key_prefix(method, args);
        let cache_key = self.keys.cache_key(&key_prefix, &version_token.to_string());

        match serde_json::to_vec(&ids) {
            Ok(payload) => {
                if let Err(e) = self
                    .ctx
                    .kv()
                    .set(&cache_key, Bytes::from(payload), self.meta.expire_secs)
                    .await
                {
                    error!("写入列表缓存失败, 方法: {}, err: {}", method, e);
                    return Ok(records);
                }
            }
            Err(e) => {
                error!("列表缓存序列化失败, 方法: {}, err: {}", method, e);
                return Ok(records);
            }
        }

        if let Err(e) = self
            .versions
            .add_method_version(method, version_token, args)
            .await
        {
            error!("写入列表版本失败, 方法: {}, err: {}", method, e);
        }

        Ok(records)
    }
}

/// 拆行参数的匹配键：通知信息声明的参数下标取文本后以 `_` 串接
fn tuple_match_key(info: &Arc<NotifyInfo>, tuple: &[ArgValue]) -> String {
    let texts: Vec<String> = info
        .args
        .iter()
        .map(|&i| tuple.get(i).map(|arg| arg.to_key_text()).unwrap_or_default())
        .collect();
    texts.join("_")
}

/// 记录的匹配键：通知信息声明的字段取文本后以 `_` 串接
fn record_match_key<R: CacheRecord>(info: &Arc<NotifyInfo>, record: &R) -> String {
    let texts: Vec<String> = info
        .fields
        .iter()
        .map(|field| record.field_text(field).unwrap_or_default())
        .collect();
    texts.join("_")
}
