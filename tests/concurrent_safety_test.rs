//! 并发安全性测试
//!
//! 验证并发流之间的追踪树隔离：当前工作单元状态按逻辑流隔离，
//! 一个周期的span绝不出现在另一个周期的trace之下

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use trace_link::{
    in_memory_queue, BoxError, ConsumerWorker, DataSink, DataSource, MemoryReporter, Outcome,
    ProducerWorker, Span, SpanId, TraceId, Tracer, Transform,
};

/// 返回固定数据的确定性数据源
struct FixedSource(Vec<u8>);

impl DataSource for FixedSource {
    async fn fetch(&mut self) -> Result<Vec<u8>, BoxError> {
        Ok(self.0.clone())
    }
}

/// 原样通过的变换步骤
struct PassTransform;

impl Transform for PassTransform {
    async fn apply(&mut self, data: Vec<u8>) -> Result<Vec<u8>, BoxError> {
        Ok(data)
    }
}

/// 把落地数据收集到共享Vec的确定性落地步骤
#[derive(Clone, Default)]
struct VecSink(Arc<Mutex<Vec<Vec<u8>>>>);

impl DataSink for VecSink {
    async fn store(&mut self, data: Vec<u8>) -> Result<(), BoxError> {
        self.0.lock().unwrap().push(data);
        Ok(())
    }
}

/// 测试并发周期之间的追踪树隔离
///
/// N个周期共享同一个追踪器实例并发执行；每个周期的事务与子span必须
/// 构成独立的追踪树，父链接绝不跨树
#[tokio::test]
async fn test_concurrent_cycles_trace_isolation() {
    const CONCURRENT_CYCLES: usize = 50;

    let reporter = Arc::new(MemoryReporter::new());
    let tracer = Tracer::new(reporter.clone());

    let mut handles = vec![];
    for i in 0..CONCURRENT_CYCLES {
        let tracer = tracer.clone();
        let handle = tokio::spawn(async move {
            let result: Result<String, BoxError> = tracer
                .capture_transaction(format!("cycle-{i:03}"), "test", None, async {
                    let trace_id = tracer.current_span().unwrap().trace_id();

                    tracer
                        .capture_span("step-a", "internal", async {
                            // 随机等待，增加任务交错执行的可能性
                            tokio::time::sleep(Duration::from_millis(fastrand::u64(1..5))).await;
                            Ok::<_, BoxError>(())
                        })
                        .await?;
                    tracer
                        .capture_span("step-b", "internal", async { Ok::<_, BoxError>(()) })
                        .await?;

                    Ok(trace_id.as_str().to_string())
                })
                .await;
            result.unwrap()
        });
        handles.push(handle);
    }

    let mut expected_trace_ids = HashSet::new();
    for handle in handles {
        let trace_id = handle.await.unwrap();
        assert!(
            expected_trace_ids.insert(trace_id),
            "每个周期应有独立的trace_id"
        );
    }
    assert_eq!(expected_trace_ids.len(), CONCURRENT_CYCLES);

    // 按trace_id分组：每条追踪恰好包含1个事务+2个子span，父链接落在本组内
    let mut by_trace: HashMap<String, Vec<Span>> = HashMap::new();
    for span in reporter.spans() {
        by_trace
            .entry(span.trace_id().as_str().to_string())
            .or_default()
            .push(span);
    }
    assert_eq!(by_trace.len(), CONCURRENT_CYCLES);

    for (trace_id, spans) in &by_trace {
        assert!(
            expected_trace_ids.contains(trace_id),
            "出现了不属于任何周期的trace_id: {}",
            trace_id
        );
        assert_eq!(spans.len(), 3, "每条追踪应恰好包含1个事务+2个子span");

        let transactions: Vec<_> = spans.iter().filter(|s| s.is_transaction()).collect();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].outcome(), Outcome::Success);

        let ids: HashSet<&str> = spans.iter().map(|s| s.id().as_str()).collect();
        for span in spans.iter().filter(|s| !s.is_transaction()) {
            let parent = span.parent_id().expect("子span必须有父链接");
            assert!(
                ids.contains(parent.as_str()),
                "子span的父链接必须落在本追踪子树内"
            );
        }
    }
}

/// 测试并发的生产侧工作器：消费侧接续到的两条追踪互不混淆
#[tokio::test]
async fn test_concurrent_producer_workers_do_not_cross_traces() {
    let reporter_a = Arc::new(MemoryReporter::new());
    let reporter_b = Arc::new(MemoryReporter::new());
    let consumer_reporter = Arc::new(MemoryReporter::new());

    let (queue_tx, queue_rx) = in_memory_queue("my-topic", 8);

    let mut worker_a = ProducerWorker::new(
        Tracer::new(reporter_a.clone()),
        FixedSource(b"from-a".to_vec()),
        PassTransform,
        queue_tx.clone(),
        "my-topic",
    );
    let mut worker_b = ProducerWorker::new(
        Tracer::new(reporter_b.clone()),
        FixedSource(b"from-b".to_vec()),
        PassTransform,
        queue_tx.clone(),
        "my-topic",
    );

    // 两个独立的流并发执行各自的周期
    let (result_a, result_b) = tokio::join!(worker_a.run_cycle(), worker_b.run_cycle());
    result_a.unwrap();
    result_b.unwrap();
    drop(worker_a);
    drop(worker_b);
    drop(queue_tx);

    let sink = VecSink::default();
    let mut consumer = ConsumerWorker::new(
        Tracer::new(consumer_reporter.clone()),
        queue_rx,
        PassTransform,
        sink,
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    consumer.run(shutdown_rx).await;

    let trace_a = reporter_a
        .spans()
        .iter()
        .find(|s| s.is_transaction())
        .unwrap()
        .trace_id()
        .clone();
    let trace_b = reporter_b
        .spans()
        .iter()
        .find(|s| s.is_transaction())
        .unwrap()
        .trace_id()
        .clone();
    assert_ne!(trace_a, trace_b, "并发周期的trace_id必须彼此独立");

    // 消费侧恰好接续了这两条追踪，一一对应、互不交叉
    let consumed: HashSet<String> = consumer_reporter
        .spans()
        .iter()
        .filter(|s| s.is_transaction())
        .map(|s| s.trace_id().as_str().to_string())
        .collect();
    let expected: HashSet<String> = [
        trace_a.as_str().to_string(),
        trace_b.as_str().to_string(),
    ]
    .into();
    assert_eq!(consumed, expected);
}

/// 测试并发ID生成的唯一性
#[tokio::test]
async fn test_concurrent_id_generation_uniqueness() {
    const TASK_COUNT: usize = 10;
    const IDS_PER_TASK: usize = 1000;

    let ids = Arc::new(Mutex::new(HashSet::new()));
    let mut handles = vec![];

    for _ in 0..TASK_COUNT {
        let ids_clone = Arc::clone(&ids);
        let handle = tokio::spawn(async move {
            let mut local_ids = Vec::new();

            for _ in 0..IDS_PER_TASK {
                local_ids.push(TraceId::new().as_str().to_string());
                local_ids.push(format!("span:{}", SpanId::new()));
            }

            let mut global_ids = ids_clone.lock().unwrap();
            for id in local_ids {
                assert!(global_ids.insert(id), "发现重复的ID");
            }
        });
        handles.push(handle);
    }

    let timeout_result = timeout(Duration::from_secs(30), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;
    assert!(timeout_result.is_ok(), "并发ID生成测试超时");

    let final_ids = ids.lock().unwrap();
    assert_eq!(final_ids.len(), TASK_COUNT * IDS_PER_TASK * 2);
}

/// 测试原子计数器在系统线程上的安全性
#[test]
fn test_atomic_counter_thread_safety() {
    const THREAD_COUNT: usize = 10;
    const IDS_PER_THREAD: usize = 1000;

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            thread::spawn(|| {
                let mut ids = Vec::new();
                for _ in 0..IDS_PER_THREAD {
                    ids.push(TraceId::new());
                }
                ids
            })
        })
        .collect();

    let mut all_ids = HashSet::new();
    for handle in handles {
        let thread_ids = handle.join().unwrap();
        for id in thread_ids {
            assert!(
                all_ids.insert(id.as_str().to_string()),
                "发现重复的trace_id"
            );
        }
    }

    assert_eq!(all_ids.len(), THREAD_COUNT * IDS_PER_THREAD);
}
