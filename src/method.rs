//! 数据访问方法句柄模块
//!
//! 以显式注册的方法句柄替代按名字符串的动态分发：句柄持有
//! 回源闭包，并接受查询模式以支持仅投影主键的列表回源

use crate::error::CacheResult;
use crate::types::{ArgValue, QueryMode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// 方法回源调用的返回future
pub type MethodFuture<R> = Pin<Box<dyn Future<Output = CacheResult<Vec<R>>> + Send + 'static>>;

/// 已注册的数据访问方法句柄
///
/// 闭包收到完整参数元组；`QueryMode::IdOnly` 时实现方只需
/// 填充主键字段
#[derive(Clone)]
pub struct MethodHandle<R> {
    invoke: Arc<dyn Fn(QueryMode, Vec<ArgValue>) -> MethodFuture<R> + Send + Sync>,
}

impl<R> MethodHandle<R> {
    /// 由回源闭包创建方法句柄
    pub fn new<F>(invoke: F) -> Self
    where
        F: Fn(QueryMode, Vec<ArgValue>) -> MethodFuture<R> + Send + Sync + 'static,
    {
        Self {
            invoke: Arc::new(invoke),
        }
    }

    /// 调用回源方法
    pub async fn invoke(&self, mode: QueryMode, args: Vec<ArgValue>) -> CacheResult<Vec<R>> {
        (self.invoke)(mode, args).await
    }
}

impl<R> std::fmt::Debug for MethodHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_passes_mode_and_args() {
        let handle = MethodHandle::new(|mode, args: Vec<ArgValue>| {
            Box::pin(async move {
                assert_eq!(mode, QueryMode::IdOnly);
                assert_eq!(args.len(), 2);
                Ok(vec![7u64])
            }) as MethodFuture<u64>
        });

        let ret = handle
            .invoke(
                QueryMode::IdOnly,
                vec![ArgValue::Db, ArgValue::Str("a".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(ret, vec![7]);
    }
}
