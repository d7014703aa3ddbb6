//! 流水线集成测试：清单云 + 计数 / 注入失败的协作方

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rightsizer::cloud::{
    AttachedDisk, DataPoint, DiskDescriptor, InstanceDescriptor, Inventory, InventoryCloud,
    MetricFilter, MetricSource, TimeWindow,
};
use rightsizer::core::PipelineError;
use rightsizer::pipeline::optimize::hash_id;
use rightsizer::pipeline::preferences::default_preferences;
use rightsizer::pipeline::{
    Collaborators, Pipeline, PipelineEvent, PipelineSettings, PreferenceItem, PreferenceKey,
};
use rightsizer::recommendation::{
    DiskRightsizing, DiskSpec, InstanceRightsizing, MachineSpec, OptimizationRequest,
    RecommendationResponse, RecommendationService,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DAY_SAMPLES: usize = 1440;

fn inventory(instances: u64, disks_per_instance: u64) -> Inventory {
    let zone = "https://www.googleapis.com/compute/v1/projects/test-project/zones/us-central1-a";
    let mut inv = Inventory {
        project_id: "test-project".into(),
        ..Inventory::default()
    };
    for i in 1..=instances {
        let mut attached = Vec::new();
        for d in 1..=disks_per_instance {
            let name = format!("vm-{}-disk-{}", i, d);
            attached.push(AttachedDisk {
                source: format!("{}/disks/{}", zone, name),
            });
            inv.disks.push(DiskDescriptor {
                id: i * 100 + d,
                name,
                zone: zone.to_string(),
                disk_type: format!("{}/diskTypes/pd-balanced", zone),
                size_gb: 100,
                provisioned_iops: None,
            });
        }
        inv.instances.push(InstanceDescriptor {
            id: i,
            name: format!("vm-{}", i),
            zone: zone.to_string(),
            machine_type: format!("{}/machineTypes/n2-standard-4", zone),
            cpu_platform: "Intel Ice Lake".into(),
            status: "RUNNING".into(),
            preemptible: false,
            os_license: None,
            disks: attached,
        });
    }
    inv.utilization = HashMap::from([(
        "compute.googleapis.com/instance/cpu/utilization".to_string(),
        0.3,
    )]);
    inv
}

/// 统计调用次数的指标源，可选地让所有调用失败，或让某个实例的查询变慢
struct CountingMetrics {
    inner: InventoryCloud,
    calls: AtomicUsize,
    fail: bool,
    slow: Option<(&'static str, Duration)>,
}

impl CountingMetrics {
    fn new(inv: Inventory, fail: bool) -> Self {
        Self {
            inner: InventoryCloud::from_inventory(inv),
            calls: AtomicUsize::new(0),
            fail,
            slow: None,
        }
    }
}

#[async_trait]
impl MetricSource for CountingMetrics {
    async fn get_series(
        &self,
        filter: &MetricFilter,
        window: &TimeWindow,
        alignment: Duration,
    ) -> Result<Vec<DataPoint>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((instance_id, delay)) = self.slow {
            if filter.instance_id == instance_id {
                tokio::time::sleep(delay).await;
            }
        }
        if self.fail {
            return Err(PipelineError::Metrics("quota exceeded".into()));
        }
        self.inner.get_series(filter, window, alignment).await
    }
}

/// 前 fail_first 次调用失败，之后返回固定成本：实例 100 -> 60，每块磁盘 10 -> 5
struct StubRecommender {
    calls: AtomicUsize,
    fail_first: usize,
    delay: Duration,
    requests: Mutex<Vec<OptimizationRequest>>,
}

impl StubRecommender {
    fn new(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用先等待 delay 再应答
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(0)
        }
    }

    /// 请求里带着某个实例 ID 摘要的调用次数
    fn calls_for(&self, id: &str) -> usize {
        let hashed = hash_id(id);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.instance.id == hashed)
            .count()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecommendationService for StubRecommender {
    async fn optimize(
        &self,
        request: OptimizationRequest,
    ) -> Result<RecommendationResponse, PipelineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if n <= self.fail_first {
            return Err(PipelineError::Recommendation("service unavailable".into()));
        }

        let volumes_rightsizing = request
            .disks
            .iter()
            .map(|d| {
                let spec = |cost| DiskSpec {
                    disk_type: d.disk_type.clone(),
                    region: d.region.clone(),
                    disk_size: d.disk_size,
                    cost,
                    ..DiskSpec::default()
                };
                let rightsizing = DiskRightsizing {
                    current: spec(10.0),
                    recommended: Some(spec(5.0)),
                    read_iops: Default::default(),
                    write_iops: Default::default(),
                    read_throughput: Default::default(),
                    write_throughput: Default::default(),
                };
                (d.id.clone(), rightsizing)
            })
            .collect();
        let response = RecommendationResponse {
            rightsizing: InstanceRightsizing {
                current: MachineSpec {
                    machine_type: request.instance.machine_type.clone(),
                    region: request.region.clone(),
                    cpu: 4,
                    memory_mb: 16384,
                    cost: 100.0,
                    ..MachineSpec::default()
                },
                recommended: Some(MachineSpec {
                    machine_type: "n2-standard-2".into(),
                    region: request.region.clone(),
                    cpu: 2,
                    memory_mb: 8192,
                    cost: 60.0,
                    ..MachineSpec::default()
                }),
                cpu: Default::default(),
                memory: Default::default(),
                description: "cpu is mostly idle".into(),
            },
            volumes_rightsizing,
        };
        self.requests
            .lock()
            .unwrap()
            .push(request);
        Ok(response)
    }
}

struct Harness {
    pipeline: Pipeline,
    events_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    events: Vec<PipelineEvent>,
    metrics: Arc<CountingMetrics>,
    recommender: Arc<StubRecommender>,
    token: CancellationToken,
}

impl Harness {
    fn new(
        inv: Inventory,
        settings: PipelineSettings,
        recommender: StubRecommender,
        fail_metrics: bool,
    ) -> Self {
        let metrics = CountingMetrics::new(inv.clone(), fail_metrics);
        Self::with_metrics(inv, settings, recommender, metrics)
    }

    fn with_metrics(
        inv: Inventory,
        settings: PipelineSettings,
        recommender: StubRecommender,
        metrics: CountingMetrics,
    ) -> Self {
        let cloud = Arc::new(InventoryCloud::from_inventory(inv));
        let metrics = Arc::new(metrics);
        let recommender = Arc::new(recommender);
        let collaborators = Collaborators {
            lister: cloud.clone(),
            disks: cloud,
            metrics: metrics.clone(),
            recommender: recommender.clone(),
        };
        let token = CancellationToken::new();
        let (tx, events_rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new("test-project", collaborators, settings, token.clone(), tx);
        Self {
            pipeline,
            events_rx,
            events: Vec::new(),
            metrics,
            recommender,
            token,
        }
    }

    fn start(&self) {
        assert!(self.pipeline.start().is_some());
    }

    /// 收集事件直到下一次 Ready(true)
    async fn wait_ready(&mut self) {
        let rx = &mut self.events_rx;
        let events = &mut self.events;
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = rx.recv().await {
                let done = event == PipelineEvent::Ready(true);
                events.push(event);
                if done {
                    break;
                }
            }
        })
        .await
        .expect("pipeline did not drain in time");
    }

    /// 等一小段时间，把之后的事件也收进来
    async fn settle(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(event) = self.events_rx.try_recv() {
            self.events.push(event);
        }
    }

    fn ready_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| **e == PipelineEvent::Ready(true))
            .count()
    }

    fn recommendation_items(&self, id: &str) -> usize {
        self.events
            .iter()
            .filter(|e| match e {
                PipelineEvent::Item(item) => {
                    item.id == id && item.devices[0].right_sized_cost.is_some()
                }
                _ => false,
            })
            .count()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn settings(lazy_load_threshold: u32) -> PipelineSettings {
    PipelineSettings {
        lazy_load_threshold,
        request_timeout: Duration::from_secs(5),
        ..PipelineSettings::default()
    }
}

#[tokio::test]
async fn test_end_to_end_three_instances_two_disks() {
    let mut h = Harness::new(inventory(3, 2), settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;
    h.settle().await;

    assert_eq!(h.events.first(), Some(&PipelineEvent::Ready(false)));
    assert_eq!(h.ready_count(), 1);
    assert_eq!(h.pipeline.store().len().await, 3);

    for id in h.pipeline.store().ids().await {
        let s = h.pipeline.store().get(&id).await.unwrap();
        assert_eq!(s.metrics.len(), 2);
        assert!(s.metrics.values().all(|points| points.len() == DAY_SAMPLES));
        assert_eq!(s.disks_metrics.len(), 2);
        for disk_metrics in s.disks_metrics.values() {
            assert_eq!(disk_metrics.len(), 4);
            assert!(disk_metrics.values().all(|points| points.len() == DAY_SAMPLES));
        }
        assert!(!s.loading);
    }

    // 只有第一个资源自动优化，其余等待释放
    assert_eq!(h.recommender.calls(), 1);
    let first = h.pipeline.store().get("1").await.unwrap();
    assert!(!first.lazy_load_enabled);
    assert!(first.recommendation.is_some());
    for id in ["2", "3"] {
        let s = h.pipeline.store().get(id).await.unwrap();
        assert!(s.lazy_load_enabled);
        assert!(s.recommendation.is_none());
        assert_eq!(s.status_label(), "press enter to load");
    }

    let summary = h.pipeline.summary().await;
    assert!(summary.total_cost > 0.0);
    assert!((summary.total_cost - 120.0).abs() < 1e-9);
    assert!((summary.total_savings - 50.0).abs() < 1e-9);
    assert_eq!(summary.resources, 1);

    let request = h.recommender.requests.lock().unwrap()[0].clone();
    assert_eq!(request.instance.id, hash_id("1"));
    assert_ne!(request.instance.id, "1");
    assert_eq!(request.instance.zone, "us-central1-a");
    assert_eq!(request.region, "us-central1");
    assert_eq!(request.disks.len(), 2);
    assert_eq!(request.disks[0].disk_type, "pd-balanced");
    assert_eq!(request.metrics["cpuUtilization"].len(), DAY_SAMPLES);
    assert_eq!(request.disks_metrics["101"]["DiskReadIOPS"].len(), DAY_SAMPLES);
}

#[tokio::test]
async fn test_lazy_load_threshold() {
    let mut h = Harness::new(inventory(5, 1), settings(3), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;

    let mut eager = 0;
    h.pipeline
        .store()
        .range(|_, s| {
            if !s.lazy_load_enabled {
                eager += 1;
            }
            true
        })
        .await;
    assert_eq!(eager, 3);
    assert_eq!(h.recommender.calls(), 3);
}

#[tokio::test]
async fn test_refreshed_telemetry_is_replaced_not_appended() {
    let mut h = Harness::new(inventory(2, 1), settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;

    // 第二个资源被延后：发现后拉一次，延后时再刷新一次
    let per_pass = 2 + 4;
    assert_eq!(h.metrics.calls.load(Ordering::SeqCst), per_pass * 3);
    let lazy = h.pipeline.store().get("2").await.unwrap();
    assert_eq!(lazy.metrics["cpuUtilization"].len(), DAY_SAMPLES);
    assert_eq!(lazy.disks_metrics["201"]["DiskWriteIOPS"].len(), DAY_SAMPLES);
}

#[tokio::test]
async fn test_optimize_retry_then_success() {
    let mut h = Harness::new(inventory(1, 2), settings(1), StubRecommender::new(2), false);
    h.start();
    h.wait_ready().await;
    h.settle().await;

    assert_eq!(h.recommender.calls(), 3);
    assert_eq!(h.recommendation_items("1"), 1);
    let s = h.pipeline.store().get("1").await.unwrap();
    assert!(s.recommendation.is_some());
    assert!(s.failure.is_none());

    let summary = h.pipeline.summary().await;
    assert_eq!(summary.resources, 1);
    assert!((summary.total_cost - 120.0).abs() < 1e-9);
    assert_eq!(h.pipeline.stats().retried, 2);
}

#[tokio::test]
async fn test_optimize_retry_budget_exhausted() {
    let mut h = Harness::new(inventory(1, 2), settings(1), StubRecommender::new(4), false);
    h.start();
    h.wait_ready().await;
    h.settle().await;

    assert_eq!(h.recommender.calls(), 4);
    assert_eq!(h.recommendation_items("1"), 0);
    let s = h.pipeline.store().get("1").await.unwrap();
    assert!(s.recommendation.is_none());
    assert!(!s.loading);
    assert!(s.failure.as_deref().unwrap().contains("service unavailable"));
    assert!(s.status_label().starts_with("failed - "));
    assert_eq!(h.pipeline.summary().await.resources, 0);
}

#[tokio::test]
async fn test_re_evaluate_releases_lazy_resource_without_refetch() {
    let mut h = Harness::new(inventory(2, 1), settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;

    let metric_calls = h.metrics.calls.load(Ordering::SeqCst);
    assert_eq!(h.recommender.calls(), 1);

    let mut prefs = default_preferences();
    for p in prefs.iter_mut() {
        if p.key == PreferenceKey::CpuBreathingRoom {
            p.value = Some("25".into());
        }
    }
    h.pipeline.re_evaluate("2", prefs).await.unwrap();

    h.wait_ready().await;
    h.settle().await;

    let released = h.events.iter().any(|e| match e {
        PipelineEvent::Item(item) => {
            item.id == "2" && item.loading && !item.lazy_load_enabled && item.status == "loading"
        }
        _ => false,
    });
    assert!(released);

    assert_eq!(h.recommender.calls(), 2);
    assert_eq!(h.metrics.calls.load(Ordering::SeqCst), metric_calls);
    let s = h.pipeline.store().get("2").await.unwrap();
    assert!(s.recommendation.is_some());
    assert!(!s.loading);
    assert_eq!(h.recommendation_items("2"), 1);

    let requests = h.recommender.requests.lock().unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.instance.id, hash_id("2"));
    assert_eq!(last.preferences["CPUBreathingRoom"].as_deref(), Some("25"));
    assert_eq!(last.metrics["cpuUtilization"].len(), DAY_SAMPLES);
    drop(requests);

    assert_eq!(h.pipeline.summary().await.resources, 2);
}

#[tokio::test]
async fn test_re_evaluate_during_discovery_metrics_optimizes_once() {
    let inv = inventory(2, 1);
    let mut metrics = CountingMetrics::new(inv.clone(), false);
    metrics.slow = Some(("2", Duration::from_millis(300)));
    let mut h = Harness::with_metrics(inv, settings(1), StubRecommender::new(0), metrics);
    h.start();

    // 第二个实例的指标还在拉取时就释放它
    tokio::time::sleep(Duration::from_millis(100)).await;
    let pending = h.pipeline.store().get("2").await.unwrap();
    assert!(pending.lazy_load_enabled);
    assert!(pending.metrics.is_empty());
    h.pipeline.re_evaluate("2", default_preferences()).await.unwrap();

    h.wait_ready().await;
    h.settle().await;

    assert_eq!(h.ready_count(), 1);
    assert_eq!(h.recommender.calls_for("2"), 1);
    assert_eq!(h.recommender.calls(), 2);

    // 唯一的一次请求带着拉取到的指标
    let requests = h.recommender.requests.lock().unwrap();
    let request = requests
        .iter()
        .find(|r| r.instance.id == hash_id("2"))
        .unwrap();
    assert_eq!(request.metrics["cpuUtilization"].len(), DAY_SAMPLES);
    drop(requests);

    let s = h.pipeline.store().get("2").await.unwrap();
    assert!(s.recommendation.is_some());
    assert!(!s.loading && !s.lazy_load_enabled);
    assert_eq!(h.recommendation_items("2"), 1);
}

#[tokio::test]
async fn test_repeated_re_evaluate_before_optimize_runs_is_coalesced() {
    let mut h = Harness::new(inventory(2, 1), settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;
    assert_eq!(h.recommender.calls(), 1);

    h.pipeline.re_evaluate("2", default_preferences()).await.unwrap();
    let mut prefs = default_preferences();
    for p in prefs.iter_mut() {
        if p.key == PreferenceKey::VCpu {
            p.value = Some("2".into());
        }
    }
    h.pipeline.re_evaluate("2", prefs).await.unwrap();
    h.wait_ready().await;
    h.settle().await;

    // 第二次调用时优化任务还在排队，合并为一次请求，带最新的偏好
    assert_eq!(h.recommender.calls_for("2"), 1);
    assert_eq!(h.ready_count(), 2);
    let requests = h.recommender.requests.lock().unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.preferences["vCPU"].as_deref(), Some("2"));
}

#[tokio::test]
async fn test_queue_busy_again_after_re_evaluate() {
    let mut h = Harness::new(inventory(2, 1), settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;
    assert!(h.pipeline.is_idle());

    h.pipeline.re_evaluate("2", default_preferences()).await.unwrap();
    assert!(!h.pipeline.is_idle());

    h.wait_ready().await;
    assert!(h.pipeline.is_idle());
    assert_eq!(h.ready_count(), 2);
    assert_eq!(h.recommender.calls_for("2"), 1);
}

#[tokio::test]
async fn test_recommendation_timeout_is_retried_then_fails() {
    let short_timeout = PipelineSettings {
        request_timeout: Duration::from_millis(50),
        ..settings(1)
    };
    let slow = StubRecommender::slow(Duration::from_millis(200));
    let mut h = Harness::new(inventory(1, 1), short_timeout, slow, false);
    h.start();
    h.wait_ready().await;
    h.settle().await;

    assert_eq!(h.recommender.calls(), 4);
    assert_eq!(h.pipeline.stats().retried, 3);
    let s = h.pipeline.store().get("1").await.unwrap();
    assert!(s.recommendation.is_none());
    assert!(!s.loading);
    assert!(s.failure.as_deref().unwrap().contains("timed out"));
    assert_eq!(h.recommendation_items("1"), 0);
}

#[tokio::test]
async fn test_re_evaluate_rejects_bad_input() {
    let mut h = Harness::new(inventory(1, 0), settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;

    let missing = h.pipeline.re_evaluate("404", default_preferences()).await;
    assert!(matches!(missing, Err(PipelineError::ResourceNotFound(_))));

    let invalid = vec![PreferenceItem::with_value(PreferenceKey::VCpu, "lots")];
    let rejected = h.pipeline.re_evaluate("1", invalid).await;
    assert!(matches!(rejected, Err(PipelineError::InvalidPreference(_))));
    assert_eq!(h.recommender.calls(), 1);
}

#[tokio::test]
async fn test_metrics_failure_marks_resource_failed() {
    let mut h = Harness::new(inventory(1, 1), settings(1), StubRecommender::new(0), true);
    h.start();
    h.wait_ready().await;

    assert_eq!(h.recommender.calls(), 0);
    let s = h.pipeline.store().get("1").await.unwrap();
    assert!(s.metrics.is_empty());
    assert!(!s.loading);
    assert!(s.failure.is_some());
}

#[tokio::test]
async fn test_missing_disk_aborts_discovery_without_partial_snapshot() {
    let mut inv = inventory(2, 1);
    inv.disks.retain(|d| d.id != 201);
    let mut h = Harness::new(inv, settings(5), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;

    assert_eq!(h.pipeline.store().ids().await, vec!["1"]);
    assert_eq!(h.recommender.calls(), 1);
}

#[tokio::test]
async fn test_terminated_instance_is_skipped() {
    let mut inv = inventory(2, 1);
    inv.instances[0].status = "TERMINATED".into();
    let mut h = Harness::new(inv, settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;

    let skipped = h.pipeline.store().get("1").await.unwrap();
    assert!(skipped.skipped);
    assert_eq!(skipped.status_label(), "skipped - instance is not running");
    // 跳过的实例不占闸门名额，第二个实例仍然自动优化
    let second = h.pipeline.store().get("2").await.unwrap();
    assert!(!second.lazy_load_enabled);
    assert_eq!(h.recommender.calls(), 1);
}

#[tokio::test]
async fn test_export_all() {
    let mut h = Harness::new(inventory(3, 2), settings(1), StubRecommender::new(0), false);
    h.start();
    h.wait_ready().await;

    let rows = h.pipeline.export_all().await;
    assert_eq!(rows.len(), 1 + 3 * 3);
    assert_eq!(rows[0][0], "Project ID");
    assert_eq!(rows[1][3], "1");
    assert_eq!(rows[1][8], "$60.00");
    assert_eq!(rows[2][2], "Compute Disk");
    assert_eq!(rows[2][9], "$5.00");
    assert_eq!(rows[4][3], "2");
    assert_eq!(rows[4][8], "");
}

#[tokio::test]
async fn test_start_only_once() {
    let h = Harness::new(inventory(1, 0), settings(1), StubRecommender::new(0), false);
    h.start();
    assert!(h.pipeline.start().is_none());
}
