use forge_scheduler::{Scheduler, SchedulerError, TaskState};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

fn res(s: &str) -> String {
    s.to_string()
}

#[tokio::test]
async fn same_resource_is_strictly_fifo() {
    let scheduler = Scheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..5)
        .map(|i| {
            let log = Arc::clone(&log);
            scheduler.enqueue(res("asset"), move |_| async move {
                log.lock().push(format!("start {i}"));
                tokio::task::yield_now().await;
                log.lock().push(format!("end {i}"));
                Ok(i)
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().await.unwrap(), i);
    }
    let expected: Vec<String> = (0..5)
        .flat_map(|i| [format!("start {i}"), format!("end {i}")])
        .collect();
    assert_eq!(*log.lock(), expected);
}

#[tokio::test]
async fn different_resources_progress_independently() {
    let scheduler = Scheduler::new();
    let (tx, rx) = oneshot::channel::<()>();
    let a = scheduler.enqueue(res("a"), |_| async move {
        rx.await?;
        Ok(())
    });
    let b = scheduler.enqueue(res("b"), |_| async move {
        let _ = tx.send(());
        Ok(())
    });
    timeout(Duration::from_secs(5), async {
        b.join().await.unwrap();
        a.join().await.unwrap();
    })
    .await
    .expect("lanes must not block each other");
}

#[tokio::test]
async fn wait_for_resumes_after_dependency_drains() {
    let scheduler = Scheduler::new();
    let imported = Arc::new(AtomicBool::new(false));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let flag = Arc::clone(&imported);
    let prefab = scheduler.enqueue(res("prefab"), move |_| async move {
        release_rx.await?;
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });
    let flag = Arc::clone(&imported);
    let mut scene = scheduler.enqueue(res("scene"), move |ctx| async move {
        ctx.wait_for(&res("prefab")).await?;
        Ok(flag.load(Ordering::SeqCst))
    });

    assert_eq!(scene.reached(TaskState::Waiting).await, TaskState::Waiting);
    assert_eq!(scheduler.state(scene.id()), Some(TaskState::Waiting));
    release_tx.send(()).unwrap();

    prefab.join().await.unwrap();
    assert!(scene.join().await.unwrap(), "scene resumed before prefab finished");
}

#[tokio::test]
async fn wait_on_idle_resource_returns_immediately() {
    let scheduler = Scheduler::new();
    let h = scheduler.enqueue(res("scene"), |ctx| async move {
        ctx.wait_for(&res("nothing")).await?;
        Ok(())
    });
    h.join().await.unwrap();
}

#[tokio::test]
async fn cycle_is_refused_for_the_later_waiter() {
    let scheduler = Scheduler::new();
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let b = scheduler.enqueue(res("b"), |ctx| async move {
        go_rx.await?;
        match ctx.wait_for(&res("a")).await {
            Err(SchedulerError::DependencyCycle { cycle }) => Ok(Some(cycle)),
            Err(other) => Err(other.into()),
            Ok(()) => Ok(None),
        }
    });
    let mut a = scheduler.enqueue(res("a"), |ctx| async move {
        ctx.wait_for(&res("b")).await?;
        Ok(())
    });

    a.reached(TaskState::Waiting).await;
    go_tx.send(()).unwrap();

    let cycle = timeout(Duration::from_secs(5), b.join())
        .await
        .expect("no deadlock")
        .unwrap();
    assert_eq!(cycle, Some(vec![res("b"), res("a"), res("b")]));
    timeout(Duration::from_secs(5), a.join())
        .await
        .expect("waiter resumes once the other side degrades")
        .unwrap();
}

#[tokio::test]
async fn self_wait_is_a_cycle() {
    let scheduler = Scheduler::new();
    let h = scheduler.enqueue(res("a"), |ctx| async move {
        let err = ctx.wait_for(&res("a")).await.unwrap_err();
        Ok(err.is_recoverable())
    });
    assert!(h.join().await.unwrap());
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn cancel_drops_paused_and_queued_operations() {
    let scheduler = Scheduler::new();
    let released = Arc::new(AtomicBool::new(false));

    let blocker = scheduler.enqueue(res("prefab"), |_| async move {
        std::future::pending::<()>().await;
        Ok(())
    });
    let flag = Arc::clone(&released);
    let mut paused = scheduler.enqueue(res("scene"), move |ctx| async move {
        let _guard = DropFlag(flag);
        ctx.wait_for(&res("prefab")).await?;
        Ok(())
    });
    let queued = scheduler.enqueue(res("scene"), |_| async move { Ok(()) });

    paused.reached(TaskState::Waiting).await;
    assert_eq!(scheduler.cancel(&res("scene")), 2);

    assert_eq!(paused.reached(TaskState::Cancelled).await, TaskState::Cancelled);
    assert!(matches!(paused.join().await, Err(SchedulerError::Cancelled)));
    assert!(matches!(queued.join().await, Err(SchedulerError::Cancelled)));
    assert!(released.load(Ordering::SeqCst), "paused future was not dropped");
    assert!(!scheduler.is_busy(&res("scene")));

    scheduler.cancel(&res("prefab"));
    assert!(matches!(blocker.join().await, Err(SchedulerError::Cancelled)));
    timeout(Duration::from_secs(5), scheduler.drain())
        .await
        .expect("drain completes");
    assert_eq!(scheduler.in_flight(), 0);
}

#[tokio::test]
async fn failing_operation_reports_failure() {
    let scheduler = Scheduler::new();
    let mut h = scheduler.enqueue(res("a"), |_| async move {
        Err::<(), _>(anyhow::anyhow!("decode failed"))
    });
    assert_eq!(h.reached(TaskState::Failed).await, TaskState::Failed);
    let err = h.join().await.unwrap_err();
    assert!(matches!(err, SchedulerError::TaskFailed(_)));
    assert!(err.to_string().contains("decode failed"));

    // The lane keeps working after a failure
    let next = scheduler.enqueue(res("a"), |_| async move { Ok(7) });
    assert_eq!(next.join().await.unwrap(), 7);
}

#[tokio::test]
async fn drain_waits_for_everything() {
    let scheduler = Scheduler::new();
    let counter = Arc::new(Mutex::new(0));
    for i in 0..10 {
        let counter = Arc::clone(&counter);
        scheduler.enqueue(format!("r{}", i % 3), move |_| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            *counter.lock() += 1;
            Ok(())
        });
    }
    scheduler.drain().await;
    assert_eq!(*counter.lock(), 10);
}

mod properties {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_each_resource_runs_in_enqueue_order(lanes in proptest::collection::vec(0u8..3, 1..24)) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let log = runtime.block_on(async {
                let scheduler = Scheduler::new();
                let log = Arc::new(Mutex::new(Vec::new()));
                let handles: Vec<_> = lanes
                    .iter()
                    .enumerate()
                    .map(|(seq, lane)| {
                        let log = Arc::clone(&log);
                        let lane = *lane;
                        scheduler.enqueue(format!("r{lane}"), move |_| async move {
                            tokio::task::yield_now().await;
                            log.lock().push((lane, seq));
                            Ok(())
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().await.unwrap();
                }
                scheduler.drain().await;
                assert_eq!(scheduler.in_flight(), 0);
                let log = log.lock().clone();
                log
            });

            prop_assert_eq!(log.len(), lanes.len());
            for lane in 0u8..3 {
                let order: Vec<usize> = log.iter().filter(|(l, _)| *l == lane).map(|(_, s)| *s).collect();
                let mut sorted = order.clone();
                sorted.sort_unstable();
                prop_assert_eq!(order, sorted);
            }
        }
    }
}
