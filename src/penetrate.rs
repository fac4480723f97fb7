//! 进程内防穿透模块
//!
//! 将同一进程内并发的相同调用折叠为一次回源：第一个调用者成为
//! 领导者执行真实调用，其余调用者在会合点上等待结果或超时。
//! 结果可选地以短TTL暂存在有界LRU中，供紧随其后的调用直接命中

use crate::config::DEFAULT_MEMO_CAPACITY;
use crate::types::ArgValue;
use dashmap::DashMap;
use lru::LruCache;
use rat_logger::{debug, warn};
use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// 会合点共享的结果值
type SharedValue = Arc<dyn Any + Send + Sync>;

/// 进行中调用的会合点
struct Flight {
    done_tx: watch::Sender<bool>,
    slot: Mutex<Option<SharedValue>>,
}

impl Flight {
    fn new() -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            done_tx,
            slot: Mutex::new(None),
        }
    }
}

/// 暂存条目
struct MemoEntry {
    value: SharedValue,
    deadline: Instant,
}

/// 防穿透代理
///
/// 指纹 = 被代理方法的标识 + 参数元组的规范化文本。
/// 同一指纹同一时刻至多一个领导者在执行真实调用
pub struct AntiPenetrate {
    inflight: DashMap<String, Arc<Flight>>,
    memo: Mutex<LruCache<String, MemoEntry>>,
}

impl AntiPenetrate {
    /// 以暂存容量创建代理
    pub fn new(memo_capacity: usize) -> Self {
        let capacity =
            NonZeroUsize::new(memo_capacity).unwrap_or(NonZeroUsize::new(DEFAULT_MEMO_CAPACITY).unwrap());
        Self {
            inflight: DashMap::new(),
            memo: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// 构造调用指纹
    pub fn make_penetrate_key(func_name: &str, args: &[ArgValue]) -> String {
        let mut ret = func_name.to_string();
        for arg in args {
            ret.push('_');
            ret.push_str(&arg.to_key_text());
        }
        ret
    }

    /// 防穿透调用，不暂存结果
    pub async fn anti_penetrate<T, F, Fut>(
        &self,
        func_name: &str,
        args: &[ArgValue],
        wait_timeout: Duration,
        callee: F,
    ) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T> + Send,
    {
        self.anti_penetrate_with_cache(func_name, args, wait_timeout, Duration::ZERO, callee)
            .await
    }

    /// 防穿透调用并以 `memo_ttl` 暂存结果
    ///
    /// 返回 `None` 仅发生在等待超时且领导者尚未写入结果，
    /// 或极端情况下同一指纹对应了不同的结果类型
    pub async fn anti_penetrate_with_cache<T, F, Fut>(
        &self,
        func_name: &str,
        args: &[ArgValue],
        wait_timeout: Duration,
        memo_ttl: Duration,
        callee: F,
    ) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T> + Send,
    {
        let key = Self::make_penetrate_key(func_name, args);
        debug!("防穿透指纹: {}", key);

        // 先查暂存
        if let Some(value) = self.memo_lookup::<T>(&key) {
            return Some(value);
        }

        // 原子地加入或创建会合点
        let (flight, is_leader) = match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => (occupied.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let flight = Arc::new(Flight::new());
                vacant.insert(flight.clone());
                (flight, true)
            }
        };

        if !is_leader {
            // 等待领导者完成或超时，超时返回槽中现状
            let mut done_rx = flight.done_tx.subscribe();
            match tokio::time::timeout(wait_timeout, done_rx.wait_for(|done| *done)).await {
                Ok(_) => debug!("从领导者取得结果"),
                Err(_) => debug!("等待领导者超时"),
            }
            let shared = flight.slot.lock().unwrap().clone();
            return shared.and_then(|value| downcast_value::<T>(&key, value));
        }

        // 领导者：执行真实调用
        debug!("穿透执行真实调用");
        let value = callee().await;
        let shared: SharedValue = Arc::new(value.clone());
        *flight.slot.lock().unwrap() = Some(shared.clone());

        // 先移除会合点再写暂存，保证新来的调用要么命中暂存
        // 要么开启新一轮会合
        self.inflight.remove(&key);
        if !memo_ttl.is_zero() {
            let deadline = Instant::now() + memo_ttl + Duration::from_millis(100);
            self.memo.lock().unwrap().put(
                key,
                MemoEntry {
                    value: shared,
                    deadline,
                },
            );
        }
        let _ = flight.done_tx.send(true);

        Some(value)
    }

    /// 当前进行中的调用数量
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    fn memo_lookup<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut memo = self.memo.lock().unwrap();
        if let Some(entry) = memo.get(key) {
            if Instant::now() < entry.deadline {
                let value = entry.value.clone();
                return downcast_value::<T>(key, value);
            }
            // 过期条目就地清除
            memo.pop(key);
        }
        None
    }
}

impl Default for AntiPenetrate {
    fn default() -> Self {
        Self::new(DEFAULT_MEMO_CAPACITY)
    }
}

fn downcast_value<T>(key: &str, value: SharedValue) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    match value.downcast::<T>() {
        Ok(typed) => Some((*typed).clone()),
        Err(_) => {
            warn!("指纹 '{}' 的共享结果类型不匹配", key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_make_penetrate_key() {
        let key = AntiPenetrate::make_penetrate_key(
            "dao::find_hot",
            &[ArgValue::Unsigned(7), ArgValue::Str("a".to_string())],
        );
        assert_eq!(key, "dao::find_hot_7_a");
    }

    #[tokio::test]
    async fn test_burst_invokes_callee_once() {
        let gate = Arc::new(AntiPenetrate::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let gate = gate.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                gate.anti_penetrate(
                    "test::burst",
                    &[ArgValue::Unsigned(1)],
                    Duration::from_secs(1),
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42u64
                    },
                )
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.inflight_len(), 0);
    }

    async fn invoke_memoized(gate: &AntiPenetrate, calls: Arc<AtomicUsize>) -> Option<u32> {
        gate.anti_penetrate_with_cache(
            "test::memo",
            &[ArgValue::Str("x".to_string())],
            Duration::from_secs(1),
            Duration::from_millis(300),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                7u32
            },
        )
        .await
    }

    #[tokio::test]
    async fn test_memo_hit_then_expire() {
        let gate = AntiPenetrate::default();
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(invoke_memoized(&gate, calls.clone()).await, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 暂存期内不再调用
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(invoke_memoized(&gate, calls.clone()).await, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 暂存过期（含100ms余量）后再次回源
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(invoke_memoized(&gate, calls.clone()).await, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_waiter_timeout_returns_empty() {
        let gate = Arc::new(AntiPenetrate::default());

        let leader = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.anti_penetrate(
                    "test::slow",
                    &[],
                    Duration::from_secs(5),
                    || async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        1u8
                    },
                )
                .await
            })
        };

        // 让领导者先占位
        tokio::time::sleep(Duration::from_millis(20)).await;

        // 等待10ms即超时，槽内尚无结果
        let waited = gate
            .anti_penetrate("test::slow", &[], Duration::from_millis(10), || async {
                1u8
            })
            .await;
        assert_eq!(waited, None);

        assert_eq!(leader.await.unwrap(), Some(1));
    }
}
