//! 防穿透代理端到端测试

use rat_vercache::{AntiPenetrate, ArgValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_burst_single_execution() {
    let gate = Arc::new(AntiPenetrate::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let gate = gate.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            gate.anti_penetrate(
                "dao::find_hot_user",
                &[ArgValue::Unsigned(7)],
                Duration::from_secs(1),
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    "record-7".to_string()
                },
            )
            .await
        }));
    }

    // 全部调用者拿到同一结果，真实调用只发生一次
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some("record-7".to_string()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 会合点已清空
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gate.inflight_len(), 0);
}

#[tokio::test]
async fn test_memo_window() {
    let gate = AntiPenetrate::default();
    let calls = Arc::new(AtomicUsize::new(0));

    async fn invoke(gate: &AntiPenetrate, calls: Arc<AtomicUsize>) -> Option<u64> {
        gate.anti_penetrate_with_cache(
            "dao::count_active",
            &[ArgValue::Str("on".to_string())],
            Duration::from_millis(1000),
            Duration::from_millis(500),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                99u64
            },
        )
        .await
    }

    assert_eq!(invoke(&gate, calls.clone()).await, Some(99));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 100ms后仍在暂存窗口内，不回源
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(invoke(&gate, calls.clone()).await, Some(99));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 700ms后暂存过期，再次回源
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(invoke(&gate, calls.clone()).await, Some(99));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fingerprint_ignores_seq_order() {
    let a = AntiPenetrate::make_penetrate_key(
        "dao::find_by_tags",
        &[ArgValue::str_seq(["x", "y", "z"])],
    );
    let b = AntiPenetrate::make_penetrate_key(
        "dao::find_by_tags",
        &[ArgValue::str_seq(["z", "x", "y"])],
    );
    assert_eq!(a, b);

    let c = AntiPenetrate::make_penetrate_key(
        "dao::find_by_tags",
        &[ArgValue::str_seq(["x", "y"])],
    );
    assert_ne!(a, c);
}

#[tokio::test]
async fn test_different_args_do_not_collapse() {
    let gate = Arc::new(AntiPenetrate::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for id in 1..=4u64 {
        let gate = gate.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            gate.anti_penetrate(
                "dao::find_user",
                &[ArgValue::Unsigned(id)],
                Duration::from_secs(1),
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    id * 10
                },
            )
            .await
        }));
    }

    let mut rets = Vec::new();
    for handle in handles {
        rets.push(handle.await.unwrap().unwrap());
    }
    rets.sort_unstable();
    assert_eq!(rets, vec![10, 20, 30, 40]);
    // 不同参数各自回源
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
