//! 进程级缓存上下文模块
//!
//! 将远程KV客户端、防穿透状态与后台回写并发限制聚合为显式的
//! 进程级上下文；全局便捷函数只是其上的薄封装。DAO初始化回调
//! 先注册，待 `initialize_cache` 配置好上下文后统一执行

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::kv::KvClient;
use crate::penetrate::AntiPenetrate;
use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use rat_logger::{error, info};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// DAO初始化回调
pub type DaoInitFn = Box<dyn Fn(Arc<CacheContext>) -> CacheResult<()> + Send + Sync>;

/// 全局上下文
static GLOBAL_CONTEXT: OnceCell<Arc<CacheContext>> = OnceCell::new();

/// DAO初始化回调注册表，仅在程序启动阶段写入
static DAO_INITIALIZERS: Lazy<DashMap<String, DaoInitFn>> = Lazy::new(DashMap::new);

/// 进程级缓存上下文
pub struct CacheContext {
    kv: Arc<dyn KvClient>,
    config: CacheConfig,
    penetrate: AntiPenetrate,
    warm_permits: Arc<Semaphore>,
}

impl CacheContext {
    /// 创建上下文
    pub fn new(kv: Arc<dyn KvClient>, config: CacheConfig) -> Arc<Self> {
        let warm_permits = Arc::new(Semaphore::new(config.warm_concurrency));
        Arc::new(Self {
            penetrate: AntiPenetrate::new(config.memo_capacity),
            kv,
            config,
            warm_permits,
        })
    }

    /// 远程KV客户端
    pub fn kv(&self) -> Arc<dyn KvClient> {
        self.kv.clone()
    }

    /// 框架配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 防穿透代理
    pub fn penetrate(&self) -> &AntiPenetrate {
        &self.penetrate
    }

    /// 派生有界后台回写任务，失败只记录日志
    pub fn spawn_warm<F>(&self, task_name: &'static str, fut: F)
    where
        F: Future<Output = CacheResult<()>> + Send + 'static,
    {
        let permits = self.warm_permits.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Err(e) = fut.await {
                error!("后台缓存回写失败 [{}]: {}", task_name, e);
            }
        });
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// 注册DAO初始化回调，同名覆盖
pub fn register_dao(name: impl Into<String>, init: DaoInitFn) {
    DAO_INITIALIZERS.insert(name.into(), init);
}

/// 配置全局上下文并初始化全部已注册的DAO
///
/// 任一DAO初始化失败即返回错误；重复初始化是配置错误。
/// 初始化失败的进程不应继续对外服务
pub fn initialize_cache(
    kv: Arc<dyn KvClient>,
    config: CacheConfig,
) -> CacheResult<Arc<CacheContext>> {
    let ctx = CacheContext::new(kv, config);
    GLOBAL_CONTEXT
        .set(ctx.clone())
        .map_err(|_| CacheError::ConfigError {
            message: "缓存上下文重复初始化".to_string(),
        })?;

    for entry in DAO_INITIALIZERS.iter() {
        entry.value()(ctx.clone()).map_err(|e| CacheError::ConfigError {
            message: format!("DAO '{}' 初始化失败: {}", entry.key(), e),
        })?;
        info!("缓存DAO '{}' 初始化完成", entry.key());
    }

    Ok(ctx)
}

/// 当前全局上下文
pub fn current_context() -> CacheResult<Arc<CacheContext>> {
    GLOBAL_CONTEXT
        .get()
        .cloned()
        .ok_or_else(|| CacheError::ConfigError {
            message: "缓存上下文尚未初始化，请先调用 initialize_cache".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvClient;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_initialize_runs_registered_daos() {
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = ran.clone();
            register_dao(
                "demo_dao",
                Box::new(move |_ctx| {
                    ran.store(true, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        let ctx = initialize_cache(Arc::new(MemoryKvClient::new()), CacheConfig::default())
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert!(current_context().is_ok());
        assert_eq!(ctx.config().memo_capacity, 8192);

        // 重复初始化是配置错误
        let ret = initialize_cache(Arc::new(MemoryKvClient::new()), CacheConfig::default());
        assert!(matches!(ret, Err(CacheError::ConfigError { .. })));
    }
}
