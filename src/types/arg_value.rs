//! 方法参数值模块
//!
//! 以标签变体的形式建模数据访问方法的参数，提供键构造所需的
//! 规范化文本：标量直接十进制/文本化，结构化值经稳定排序后取
//! 128位十六进制摘要，保证与遍历顺序无关

use crate::error::{CacheError, CacheResult};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// 数据访问方法的参数值
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// 无符号整数
    Unsigned(u64),
    /// 有符号整数
    Int(i64),
    /// 浮点数
    Float(f64),
    /// 布尔值
    Bool(bool),
    /// 文本
    Str(String),
    /// 有序序列
    Seq(Vec<ArgValue>),
    /// 键值映射
    Map(Vec<(String, ArgValue)>),
    /// 记录的规范化文本（构造时已定序）
    Record(String),
    /// 外部数据访问句柄，不参与键构造
    Db,
}

impl ArgValue {
    /// 由任意可序列化记录构造参数值
    ///
    /// 经由 `serde_json::Value` 中转，映射键自然有序，
    /// 从而得到与字段遍历顺序无关的规范化文本
    pub fn record<T: Serialize>(value: &T) -> CacheResult<Self> {
        let json = serde_json::to_value(value).map_err(|e| CacheError::SerializationError {
            message: format!("记录参数规范化失败: {}", e),
        })?;
        Ok(ArgValue::Record(json.to_string()))
    }

    /// 由字符串列表构造序列参数
    pub fn str_seq<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ArgValue::Seq(values.into_iter().map(|v| ArgValue::Str(v.into())).collect())
    }

    /// 由无符号整数列表构造序列参数
    pub fn id_seq<I>(values: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        ArgValue::Seq(values.into_iter().map(ArgValue::Unsigned).collect())
    }

    /// 是否为外部数据访问句柄
    pub fn is_db(&self) -> bool {
        matches!(self, ArgValue::Db)
    }

    /// 是否为序列参数
    pub fn is_seq(&self) -> bool {
        matches!(self, ArgValue::Seq(_))
    }

    /// 序列参数的长度，非序列返回 `None`
    pub fn seq_len(&self) -> Option<usize> {
        match self {
            ArgValue::Seq(items) => Some(items.len()),
            _ => None,
        }
    }

    /// 键构造用的规范化文本
    ///
    /// 标量原样文本化；序列按元素文本字典序排序后整体摘要；
    /// 映射按键排序后整体摘要；记录对其规范化文本摘要
    pub fn to_key_text(&self) -> String {
        match self {
            ArgValue::Unsigned(v) => v.to_string(),
            ArgValue::Int(v) => v.to_string(),
            ArgValue::Float(v) => v.to_string(),
            ArgValue::Bool(v) => v.to_string(),
            ArgValue::Str(v) => v.clone(),
            ArgValue::Seq(items) => {
                let mut texts: Vec<String> = items.iter().map(|v| v.to_key_text()).collect();
                texts.sort();
                digest_text(&format!("[{}]", texts.join(",")))
            }
            ArgValue::Map(entries) => {
                let mut pairs: Vec<(String, String)> = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_key_text()))
                    .collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                let body: Vec<String> =
                    pairs.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                digest_text(&format!("{{{}}}", body.join(",")))
            }
            ArgValue::Record(text) => digest_text(text),
            ArgValue::Db => String::new(),
        }
    }
}

/// 对稳定文本取128位十六进制摘要
fn digest_text(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..16])
}
