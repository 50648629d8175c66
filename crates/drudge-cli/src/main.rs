use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use drudge_core::{
    BackgroundTask, CancellationToken, ExceptionSink, HostedService, InMemoryQueue, PoolWorker, Queue,
    QueueConfig, SequentialWorker, TaskError, TracingSink, WorkerSettings,
};
use tokio::time::sleep;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// One task at a time, completion in enqueue order
    Sequential,
    /// Up to --max-concurrent tasks at once
    Pool,
}

#[derive(Parser, Debug)]
#[command(name = "drudge")]
#[command(about = "Run demo background tasks through a drudge worker", long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value = "sequential")]
    mode: Mode,

    /// Number of demo tasks to enqueue
    #[arg(short, long, default_value = "8")]
    tasks: usize,

    /// How long each demo task works
    #[arg(long, default_value = "50")]
    task_delay_ms: u64,

    /// Per-task timeout budget (none by default)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Make every Nth task fail (0 = never)
    #[arg(long, default_value = "0")]
    fail_every: usize,

    /// Overrides DRUDGE_POLL_QUEUE_DELAY_MS
    #[arg(long, allow_negative_numbers = true)]
    poll_delay_ms: Option<i64>,

    /// Overrides DRUDGE_MAX_CONCURRENT_COUNT
    #[arg(long, allow_negative_numbers = true)]
    max_concurrent: Option<i64>,
}

/// Stand-in for the host application's deferred work (mail, scheduled jobs).
struct DemoTask {
    id: usize,
    work: Duration,
    fail: bool,
    timeout: Option<Duration>,
    completed: Arc<AtomicUsize>,
    /// Bumped once when the body exits, however it exits. A timed-out task is
    /// reported by the runner first and settles later, when its body finishes.
    settled: Arc<AtomicUsize>,
}

impl DemoTask {
    async fn perform(&self, cancel: CancellationToken) -> Result<(), TaskError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            _ = sleep(self.work) => {}
        }
        if self.fail {
            return Err(TaskError::msg(format!("demo task {} failed on purpose", self.id)));
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        info!(task = self.id, "demo task done");
        Ok(())
    }
}

#[async_trait]
impl BackgroundTask for DemoTask {
    async fn run(&self, cancel: CancellationToken) -> Result<(), TaskError> {
        let outcome = self.perform(cancel).await;
        self.settled.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Polls until `expected` tasks have settled. Returns `false` if `shutdown` fired first.
async fn wait_until_settled(
    settled: &AtomicUsize,
    expected: usize,
    shutdown: impl Future<Output = ()>,
) -> bool {
    tokio::pin!(shutdown);
    while settled.load(Ordering::SeqCst) < expected {
        tokio::select! {
            _ = &mut shutdown => return false,
            _ = sleep(Duration::from_millis(20)) => {}
        }
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    // (A) 設定: 環境変数 → CLI 引数で上書き
    let mut settings = WorkerSettings::from_env();
    if let Some(ms) = args.poll_delay_ms {
        settings.poll_queue_delay_ms = ms;
    }
    if let Some(n) = args.max_concurrent {
        settings.max_concurrent_count = n;
    }

    // (B) Queue と exception sink
    let reported = Arc::new(AtomicUsize::new(0));
    let sink = {
        let reported = Arc::clone(&reported);
        move |err: &TaskError| {
            reported.fetch_add(1, Ordering::SeqCst);
            TracingSink.report(err);
        }
    };
    let queue = Arc::new(InMemoryQueue::new(QueueConfig::new().with_sink(sink)));

    // (C) タスク投入
    let completed = Arc::new(AtomicUsize::new(0));
    let settled = Arc::new(AtomicUsize::new(0));
    for id in 1..=args.tasks {
        queue.push(DemoTask {
            id,
            work: Duration::from_millis(args.task_delay_ms),
            fail: args.fail_every > 0 && id % args.fail_every == 0,
            timeout: args.timeout_ms.map(Duration::from_millis),
            completed: Arc::clone(&completed),
            settled: Arc::clone(&settled),
        });
    }
    info!(queued = args.tasks, "demo tasks enqueued");

    // (D) worker 起動
    let worker: Box<dyn HostedService> = match args.mode {
        Mode::Sequential => Box::new(SequentialWorker::new(queue.clone(), settings.worker_config())),
        Mode::Pool => Box::new(PoolWorker::new(queue.clone(), settings.pool_config())),
    };
    worker.start(CancellationToken::new()).await?;

    // (E) 全件終わるか Ctrl-C まで待つ
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if !wait_until_settled(&settled, args.tasks, ctrl_c).await {
        info!("received shutdown signal");
    }

    // give a stuck loop five seconds, then leave
    let stop_deadline = CancellationToken::new();
    let deadline = stop_deadline.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(5)).await;
        deadline.cancel();
    });
    worker.stop(stop_deadline).await?;

    println!(
        "completed={} reported_failures={} still_queued={}",
        completed.load(Ordering::SeqCst),
        reported.load(Ordering::SeqCst),
        queue.count(),
    );
    Ok(())
}
