//! 通知注解解析模块
//!
//! 注解为分号分隔的 `key=value` 对，识别 `func`/`type`/`keys`/`args`
//! 四个键，`keys` 与 `args` 为JSON数组，容忍单引号JSON

use crate::error::{CacheError, CacheResult};
use crate::types::NotifyType;
use std::collections::HashMap;

/// 注解中的方法名键
pub const TAG_FUNC: &str = "func";
/// 注解中的查询类型键
pub const TAG_TYPE: &str = "type";
/// 注解中的记录字段列表键
pub const TAG_KEYS: &str = "keys";
/// 注解中的参数下标列表键
pub const TAG_ARGS: &str = "args";

/// 解析后的通知注解
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyTag {
    /// 注解作用的数据访问方法名
    pub func: String,
    /// 查询类型
    pub notify_type: NotifyType,
    /// 记录上的字段名列表
    pub keys: Vec<String>,
    /// 方法参数下标列表，与 `keys` 平行
    pub args: Vec<usize>,
}

/// 将 `key=value;...` 注解文本拆为映射
fn tag_text_to_map(tag: &str) -> HashMap<String, String> {
    let mut ret = HashMap::new();
    for pair in tag.split(';') {
        let mut parts = pair.splitn(2, '=');
        let key = match parts.next() {
            Some(k) => k.trim(),
            None => continue,
        };
        let value = match parts.next() {
            Some(v) => v.trim(),
            None => continue,
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        ret.insert(key.to_string(), value.to_string());
    }
    ret
}

/// 解析通知注解文本
pub fn resolve_notify_tag(tag: &str) -> CacheResult<NotifyTag> {
    let tag_map = tag_text_to_map(tag);
    if tag_map.len() < 3 {
        return Err(CacheError::ConfigError {
            message: format!("通知注解参数不足: '{}'", tag),
        });
    }

    let func = tag_map
        .get(TAG_FUNC)
        .ok_or_else(|| CacheError::ConfigError {
            message: format!("通知注解缺少 '{}': '{}'", TAG_FUNC, tag),
        })?
        .clone();

    let type_text = tag_map.get(TAG_TYPE).ok_or_else(|| CacheError::ConfigError {
        message: format!("通知注解缺少 '{}': '{}'", TAG_TYPE, tag),
    })?;
    let notify_type = NotifyType::parse(type_text).ok_or_else(|| CacheError::ConfigError {
        message: format!("未知的通知类型 '{}': '{}'", type_text, tag),
    })?;

    // 单引号JSON归一化为双引号后解析
    let keys_text = tag_map
        .get(TAG_KEYS)
        .ok_or_else(|| CacheError::ConfigError {
            message: format!("通知注解缺少 '{}': '{}'", TAG_KEYS, tag),
        })?
        .replace('\'', "\"");
    let keys: Vec<String> =
        serde_json::from_str(&keys_text).map_err(|e| CacheError::ConfigError {
            message: format!("通知注解 '{}' 解析失败: {}", TAG_KEYS, e),
        })?;

    let args_text = tag_map
        .get(TAG_ARGS)
        .ok_or_else(|| CacheError::ConfigError {
            message: format!("通知注解缺少 '{}': '{}'", TAG_ARGS, tag),
        })?
        .replace('\'', "\"");
    let args: Vec<usize> =
        serde_json::from_str(&args_text).map_err(|e| CacheError::ConfigError {
            message: format!("通知注解 '{}' 解析失败: {}", TAG_ARGS, e),
        })?;

    Ok(NotifyTag {
        func,
        notify_type,
        keys,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_basic_tag() {
        let tag = resolve_notify_tag("func=FindByName;type=concrete;keys=['Name'];args=[0]")
            .unwrap();
        assert_eq!(tag.func, "FindByName");
        assert_eq!(tag.notify_type, NotifyType::Concrete);
        assert_eq!(tag.keys, vec!["Name".to_string()]);
        assert_eq!(tag.args, vec![0]);
    }

    #[test]
    fn test_resolve_double_quoted_multi_key() {
        let tag = resolve_notify_tag(
            r#"func=FindByTenantAndName;type=list;keys=["TenantId","Name"];args=[1,2]"#,
        )
        .unwrap();
        assert_eq!(tag.notify_type, NotifyType::List);
        assert_eq!(tag.keys.len(), 2);
        assert_eq!(tag.args, vec![1, 2]);
    }

    #[test]
    fn test_resolve_rejects_incomplete() {
        assert!(resolve_notify_tag("func=F;type=concrete").is_err());
        assert!(resolve_notify_tag("").is_err());
    }

    #[test]
    fn test_resolve_rejects_unknown_type() {
        let ret = resolve_notify_tag("func=F;type=windowed;keys=['A'];args=[0]");
        assert!(matches!(ret, Err(CacheError::ConfigError { .. })));
    }
}
