//! Shard boot barrier: readiness depends only on the completion count.

mod common;

use common::{context, TestShard};
use realm_gateway::shard::{LifecycleBarrier, Shard, ShardPool, ShardStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Every ordering of 0..n
fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn permute(prefix: &mut Vec<usize>, rest: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if rest.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for i in 0..rest.len() {
            let item = rest.remove(i);
            prefix.push(item);
            permute(prefix, rest, out);
            prefix.pop();
            rest.insert(i, item);
        }
    }

    let mut out = Vec::new();
    permute(&mut Vec::new(), &mut (0..n).collect(), &mut out);
    out
}

#[test]
fn readiness_flips_once_for_every_completion_order() {
    for n in 1..=5 {
        for order in permutations(n) {
            let barrier = LifecycleBarrier::new(n, "http://localhost:8000");
            let mut flips = 0;

            for (seen, _shard) in order.iter().enumerate() {
                assert!(!barrier.is_ready(), "ready before {n} completions");
                if barrier.complete() {
                    flips += 1;
                    assert_eq!(seen + 1, n);
                }
            }

            assert!(barrier.is_ready());
            assert_eq!(flips, 1, "order {order:?}");
        }
    }
}

async fn wait_for_completions(barrier: &LifecycleBarrier, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while barrier.completed() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("boot completion not observed");
}

#[tokio::test]
async fn boot_completions_in_any_order_open_admission() {
    for order in permutations(3) {
        let gates: Vec<Arc<Notify>> = (0..3).map(|_| Arc::new(Notify::new())).collect();
        let for_factory = gates.clone();
        let pool = ShardPool::initialize(3, &move |index: u32| -> Arc<dyn Shard> {
            Arc::new(TestShard::gated(index, for_factory[index as usize - 1].clone()))
        })
        .unwrap();

        let ctx = context(pool, None);
        let handles = ctx.boot_shards();

        for (released, &position) in order.iter().enumerate() {
            assert!(!ctx.readiness.is_ready());
            gates[position].notify_one();
            wait_for_completions(&ctx.readiness, released + 1).await;

            let index = position as u32 + 1;
            assert_eq!(ctx.pool.state().status(index), Some(ShardStatus::Ready));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(ctx.readiness.is_ready());
        assert_eq!(ctx.pool.state().ready_shards(), 3);
    }
}

#[tokio::test]
async fn stalled_shard_keeps_admission_closed() {
    let stalled = Arc::new(Notify::new());
    let quick = Arc::new(Notify::new());
    quick.notify_one();

    let gates = [Arc::clone(&quick), Arc::clone(&stalled)];
    let pool = ShardPool::initialize(2, &move |index: u32| -> Arc<dyn Shard> {
        Arc::new(TestShard::gated(index, gates[index as usize - 1].clone()))
    })
    .unwrap();

    let ctx = context(pool, None);
    let _handles = ctx.boot_shards();

    wait_for_completions(&ctx.readiness, 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!ctx.readiness.is_ready());
    assert_eq!(ctx.pool.state().status(2), Some(ShardStatus::Booting));
}

#[test]
fn connect_url_is_announced_with_loopback() {
    let url = realm_gateway::config::connect_url("0.0.0.0", 8000);
    let barrier = LifecycleBarrier::new(1, url);
    assert_eq!(barrier.connect_url(), "http://localhost:8000");
}
