//! 缓存键构造模块
//!
//! 对象键、对象版本键、查询版本键与查询缓存键的统一构造，
//! 以及从键文本反解主键id

use crate::meta::VERSION_PREFIX;
use crate::types::ArgValue;

/// 实体级缓存键构造器
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    object_prefix: String,
}

impl KeyBuilder {
    /// 以对象前缀创建构造器
    pub fn new(object_prefix: impl Into<String>) -> Self {
        Self {
            object_prefix: object_prefix.into(),
        }
    }

    /// 对象前缀
    pub fn object_prefix(&self) -> &str {
        &self.object_prefix
    }

    /// 对象缓存键 `{前缀}_{id}_{版本}`
    pub fn object_key(&self, id: u64, version: &str) -> String {
        format!("{}_{}_{}", self.object_prefix, id, version)
    }

    /// 对象版本键 `V_{前缀}_{id}`
    pub fn object_version_key(&self, id: u64) -> String {
        format!("{}_{}_{}", VERSION_PREFIX, self.object_prefix, id)
    }

    /// 从对象版本键反解id（最后一段）
    pub fn id_from_object_version_key(&self, key: &str) -> Option<u64> {
        key.rsplit('_').next()?.parse().ok()
    }

    /// 从对象缓存键反解id（倒数第二段）
    pub fn id_from_object_key(&self, key: &str) -> Option<u64> {
        key.rsplit('_').nth(1)?.parse().ok()
    }

    /// 查询版本键 `{版本前缀}_{字段值1}_{字段值2}...`
    pub fn version_key(&self, version_key_prefix: &str, field_texts: &[String]) -> String {
        let mut parts = Vec::with_capacity(field_texts.len() + 1);
        parts.push(version_key_prefix.to_string());
        parts.extend(field_texts.iter().cloned());
        parts.join("_")
    }

    /// 查询键前缀 `{方法名}_{参数1}_{参数2}...`，数据访问句柄参数不参与
    pub fn key_prefix(&self, method: &str, args: &[ArgValue]) -> String {
        let mut parts = vec![method.to_string()];
        for arg in args {
            if arg.is_db() {
                continue;
            }
            parts.push(arg.to_key_text());
        }
        parts.join("_")
    }

    /// 查询缓存键 `{键前缀}_{版本}`
    pub fn cache_key(&self, key_prefix: &str, version: &str) -> String {
        format!("{}_{}", key_prefix, version)
    }

    /// 将参数串接为记录-参数匹配用的文本，数据访问句柄参数不参与
    pub fn join_args(&self, args: &[ArgValue]) -> String {
        let texts: Vec<String> = args
            .iter()
            .filter(|arg| !arg.is_db())
            .map(|arg| arg.to_key_text())
            .collect();
        texts.join("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_keys() {
        let keys = KeyBuilder::new("User");
        assert_eq!(keys.object_key(7, "1700000000123"), "User_7_1700000000123");
        assert_eq!(keys.object_version_key(7), "V_User_7");
    }

    #[test]
    fn test_id_reparse() {
        let keys = KeyBuilder::new("User");
        let object_key = keys.object_key(42, "1700000000123");
        assert_eq!(keys.id_from_object_key(&object_key), Some(42));

        let version_key = keys.object_version_key(42);
        assert_eq!(keys.id_from_object_version_key(&version_key), Some(42));

        assert_eq!(keys.id_from_object_key("broken"), None);
    }

    #[test]
    fn test_query_keys_skip_db_handle() {
        let keys = KeyBuilder::new("User");
        let args = vec![
            ArgValue::Db,
            ArgValue::Str("a".to_string()),
            ArgValue::Unsigned(3),
        ];
        let prefix = keys.key_prefix("FindByName", &args);
        assert_eq!(prefix, "FindByName_a_3");
        assert_eq!(keys.cache_key(&prefix, "1700"), "FindByName_a_3_1700");
        assert_eq!(keys.join_args(&args), "a_3");
    }

    #[test]
    fn test_version_key() {
        let keys = KeyBuilder::new("User");
        let key = keys.version_key("V_User", &["a".to_string(), "b".to_string()]);
        assert_eq!(key, "V_User_a_b");
    }
}
