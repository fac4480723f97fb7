//! 缓存框架配置模块
//!
//! 提供框架级配置及其构建器，实体级的TTL等可在DAO上单独覆盖

use crate::error::{CacheError, CacheResult};

/// 默认缓存过期时间（秒），24小时
pub const DEFAULT_EXPIRE_SECS: u32 = 24 * 3600;

/// 防穿透结果暂存的默认容量
pub const DEFAULT_MEMO_CAPACITY: usize = 8192;

/// 异步回写任务的默认并发上限
pub const DEFAULT_WARM_CONCURRENCY: usize = 16;

/// 缓存框架配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 所有缓存键的默认过期时间（秒）
    pub default_expire_secs: u32,
    /// 防穿透结果暂存（LRU）容量
    pub memo_capacity: usize,
    /// 后台缓存回写任务并发上限
    pub warm_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_expire_secs: DEFAULT_EXPIRE_SECS,
            memo_capacity: DEFAULT_MEMO_CAPACITY,
            warm_concurrency: DEFAULT_WARM_CONCURRENCY,
        }
    }
}

impl CacheConfig {
    /// 创建配置构建器
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// 缓存配置构建器
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_expire_secs: Option<u32>,
    memo_capacity: Option<usize>,
    warm_concurrency: Option<usize>,
}

impl CacheConfigBuilder {
    /// 设置默认过期时间（秒）
    pub fn default_expire_secs(mut self, secs: u32) -> Self {
        self.default_expire_secs = Some(secs);
        self
    }

    /// 设置防穿透暂存容量
    pub fn memo_capacity(mut self, capacity: usize) -> Self {
        self.memo_capacity = Some(capacity);
        self
    }

    /// 设置后台回写并发上限
    pub fn warm_concurrency(mut self, concurrency: usize) -> Self {
        self.warm_concurrency = Some(concurrency);
        self
    }

    /// 构建配置
    pub fn build(self) -> CacheResult<CacheConfig> {
        let config = CacheConfig {
            default_expire_secs: self.default_expire_secs.unwrap_or(DEFAULT_EXPIRE_SECS),
            memo_capacity: self.memo_capacity.unwrap_or(DEFAULT_MEMO_CAPACITY),
            warm_concurrency: self.warm_concurrency.unwrap_or(DEFAULT_WARM_CONCURRENCY),
        };

        if config.default_expire_secs == 0 {
            return Err(CacheError::ConfigError {
                message: "default_expire_secs 不能为 0".to_string(),
            });
        }
        if config.memo_capacity == 0 {
            return Err(CacheError::ConfigError {
                message: "memo_capacity 不能为 0".to_string(),
            });
        }
        if config.warm_concurrency == 0 {
            return Err(CacheError::ConfigError {
                message: "warm_concurrency 不能为 0".to_string(),
            });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_expire_secs, 86400);
        assert_eq!(config.memo_capacity, 8192);
    }

    #[test]
    fn test_builder_rejects_zero() {
        let ret = CacheConfig::builder().default_expire_secs(0).build();
        assert!(ret.is_err());

        let config = CacheConfig::builder()
            .default_expire_secs(600)
            .memo_capacity(128)
            .build()
            .unwrap();
        assert_eq!(config.default_expire_secs, 600);
        assert_eq!(config.memo_capacity, 128);
    }
}
