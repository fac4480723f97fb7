//! 实体缓存元数据模块
//!
//! 汇集实体的缓存策略：对象键前缀、主键字段、TTL、通知信息集合
//! 以及方法到通知信息的映射。初始化完成后不可变

pub mod tag;

pub use tag::{resolve_notify_tag, NotifyTag};

use crate::config::DEFAULT_EXPIRE_SECS;
use crate::error::{CacheError, CacheResult};
use crate::types::NotifyType;
use std::collections::HashMap;
use std::sync::Arc;

/// 版本键前缀标记
pub const VERSION_PREFIX: &str = "V";

/// 查询与记录字段的绑定关系
#[derive(Debug, Clone)]
pub struct NotifyInfo {
    /// 查询类型
    pub notify_type: NotifyType,
    /// 构成缓存键的记录字段名
    pub fields: Vec<String>,
    /// 与 `fields` 平行的方法参数下标
    pub args: Vec<usize>,
    /// 版本键前缀，`V_{对象前缀}`
    pub version_key_prefix: String,
}

/// 实体缓存元数据
#[derive(Debug, Clone)]
pub struct EntityMeta {
    /// 对象缓存键前缀
    pub object_prefix: String,
    /// 主键字段名
    pub id_field: String,
    /// 缓存过期时间（秒）
    pub expire_secs: u32,
    /// 去重后的通知信息集合
    pub notify_infos: Vec<Arc<NotifyInfo>>,
    /// 方法名到通知信息的映射
    pub method_map: HashMap<String, Arc<NotifyInfo>>,
}

impl EntityMeta {
    /// 组装实体元数据
    ///
    /// `user_prefix` 为空时对象前缀即类型名，否则为 `{前缀}_{类型名}`；
    /// 通知信息按 `版本键前缀 + 字段串` 去重，方法映射不去重
    pub fn assemble(
        type_name: &str,
        user_prefix: Option<&str>,
        id_field: &str,
        expire_secs: Option<u32>,
        tags: &[String],
    ) -> CacheResult<EntityMeta> {
        if type_name.is_empty() {
            return Err(CacheError::ConfigError {
                message: "实体类型名不能为空".to_string(),
            });
        }
        if id_field != "Id" && id_field != "ID" {
            return Err(CacheError::ValidationError {
                field: id_field.to_string(),
                message: "主键字段名必须是 'Id' 或 'ID'".to_string(),
            });
        }

        let object_prefix = match user_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}_{}", prefix, type_name),
            _ => type_name.to_string(),
        };
        let version_key_prefix = format!("{}_{}", VERSION_PREFIX, object_prefix);

        let mut notify_infos: Vec<Arc<NotifyInfo>> = Vec::new();
        let mut method_map: HashMap<String, Arc<NotifyInfo>> = HashMap::new();
        let mut filter: HashMap<String, ()> = HashMap::new();

        for tag_text in tags {
            let tag = resolve_notify_tag(tag_text)?;
            if tag.keys.len() != tag.args.len() {
                return Err(CacheError::ConfigError {
                    message: format!(
                        "方法 '{}' 的 keys({}) 与 args({}) 数量不一致",
                        tag.func,
                        tag.keys.len(),
                        tag.args.len()
                    ),
                });
            }

            let info = Arc::new(NotifyInfo {
                notify_type: tag.notify_type,
                fields: tag.keys.clone(),
                args: tag.args.clone(),
                version_key_prefix: version_key_prefix.clone(),
            });

            // 同一字段组合只保留一份通知信息
            let filter_key = format!("{}_{}", version_key_prefix, tag.keys.join("_"));
            if filter.insert(filter_key, ()).is_none() {
                notify_infos.push(info.clone());
            }

            method_map.insert(tag.func, info);
        }

        Ok(EntityMeta {
            object_prefix,
            id_field: id_field.to_string(),
            expire_secs: expire_secs.unwrap_or(DEFAULT_EXPIRE_SECS),
            notify_infos,
            method_map,
        })
    }

    /// 按方法名查找通知信息
    pub fn method_info(&self, method: &str) -> CacheResult<&Arc<NotifyInfo>> {
        self.method_map
            .get(method)
            .ok_or_else(|| CacheError::MethodNotFound {
                method: method.to_string(),
            })
    }
}
