//! 公共类型定义模块

pub mod arg_value;

pub use arg_value::ArgValue;

use serde::{Deserialize, Serialize};

/// 查询通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyType {
    /// 二级键到单条记录
    Concrete,
    /// 返回id列表的查询
    List,
    /// 范围查询，键语义与 `List` 一致
    Range,
}

impl NotifyType {
    /// 从注解文本解析
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "concrete" => Some(NotifyType::Concrete),
            "list" => Some(NotifyType::List),
            "range" => Some(NotifyType::Range),
            _ => None,
        }
    }

    /// 注解文本表示
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyType::Concrete => "concrete",
            NotifyType::List => "list",
            NotifyType::Range => "range",
        }
    }
}

/// 数据源方法的查询模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// 返回完整记录
    Full,
    /// 仅投影主键字段，供列表缓存回源使用
    IdOnly,
}
