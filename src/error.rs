//! 错误类型定义模块
//!
//! 定义缓存框架统一的错误类型和结果别名

use crate::kv::KvError;
use thiserror::Error;

/// 缓存框架统一结果类型
pub type CacheResult<T> = Result<T, CacheError>;

/// 缓存框架错误
#[derive(Error, Debug)]
pub enum CacheError {
    /// 配置错误（初始化阶段致命）
    #[error("配置错误: {message}")]
    ConfigError { message: String },

    /// 校验错误
    #[error("校验错误: 字段 '{field}': {message}")]
    ValidationError { field: String, message: String },

    /// 调用参数错误
    #[error("参数错误: {message}")]
    ArgumentError { message: String },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    SerializationError { message: String },

    /// 远程缓存服务错误
    #[error("缓存服务错误: {source}")]
    KvError {
        #[from]
        source: KvError,
    },

    /// 数据源（SQL层）错误
    #[error("数据源错误: {message}")]
    SourceError { message: String },

    /// 方法未注册
    #[error("未注册的缓存方法: {method}")]
    MethodNotFound { method: String },
}

/// 快捷构造错误的宏
///
/// ```
/// use rat_vercache::cache_error;
/// let err = cache_error!(config, "缺少KV客户端");
/// let err = cache_error!(validation, "Id", "必须为非负整数");
/// ```
#[macro_export]
macro_rules! cache_error {
    (config, $msg:expr) => {
        $crate::error::CacheError::ConfigError {
            message: $msg.to_string(),
        }
    };
    (validation, $field:expr, $msg:expr) => {
        $crate::error::CacheError::ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
        }
    };
    (argument, $msg:expr) => {
        $crate::error::CacheError::ArgumentError {
            message: $msg.to_string(),
        }
    };
    (serialization, $msg:expr) => {
        $crate::error::CacheError::SerializationError {
            message: $msg.to_string(),
        }
    };
    (source, $msg:expr) => {
        $crate::error::CacheError::SourceError {
            message: $msg.to_string(),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = cache_error!(validation, "Id", "必须为非负整数");
        assert_eq!(err.to_string(), "校验错误: 字段 'Id': 必须为非负整数");

        let err: CacheError = KvError::Miss.into();
        assert!(matches!(
            err,
            CacheError::KvError {
                source: KvError::Miss
            }
        ));
    }
}
