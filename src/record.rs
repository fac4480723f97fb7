//! 缓存记录契约模块
//!
//! 以显式能力集替代运行时反射：读取主键、按名读取字段文本、
//! 提供类型名。其余字段对框架不可见

use serde::de::DeserializeOwned;
use serde::Serialize;

/// 可被缓存的记录契约
///
/// 字段文本必须与 [`crate::types::ArgValue`] 标量的规范化文本一致
/// （十进制整数、`true`/`false`、字符串原文），否则批量查询的
/// 记录-参数匹配会失效
pub trait CacheRecord:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// 记录类型名，用于派生对象缓存前缀
    fn type_name() -> &'static str;

    /// 主键字段名，`"Id"` 或 `"ID"`
    fn id_field_name() -> &'static str {
        "Id"
    }

    /// 主键值
    fn id(&self) -> u64;

    /// 按名读取字段的规范化文本，未知字段返回 `None`
    fn field_text(&self, field: &str) -> Option<String>;
}
