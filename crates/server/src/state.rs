//! Shared application state: the fixed-size worker pool that
//! serializes render calls onto a bounded number of OS threads, each
//! running one [`RenderOrchestrator::render`] call at a time.

use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{error, info};

use utau_config::Settings;
use utau_core::{AudioIo, CancellationToken, HoundAudioIo, RenderError, RenderParams, RenderResult};
use utau_render::{FallbackSeparator, FallbackVocoder, RenderOrchestrator, SeparatorModel, VocoderModel};

struct RenderJob {
    params: RenderParams,
    cancel: CancellationToken,
    respond_to: tokio::sync::oneshot::Sender<RenderResult<()>>,
}

/// A fixed pool of worker threads pulling render jobs off a shared
/// queue. The pool size is `Settings::max_workers`; it never grows.
pub struct WorkerPool {
    sender: Sender<RenderJob>,
    num_workers: usize,
}

impl WorkerPool {
    pub fn new(
        num_workers: usize,
        orchestrator: Arc<RenderOrchestrator>,
        audio_io: Arc<dyn AudioIo>,
    ) -> WorkerPool {
        let (sender, receiver) = channel::<RenderJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        for worker_id in 0..num_workers.max(1) {
            let receiver = receiver.clone();
            let orchestrator = orchestrator.clone();
            let audio_io = audio_io.clone();
            thread::Builder::new()
                .name(format!("render-worker-{worker_id}"))
                .spawn(move || loop {
                    let job = {
                        let rx = receiver.lock().expect("worker queue mutex poisoned");
                        rx.recv()
                    };
                    match job {
                        Ok(job) => {
                            let result = orchestrator.render(&job.params, audio_io.as_ref(), &job.cancel);
                            if let Err(e) = &result {
                                error!(worker_id, error = %e, "render failed");
                            }
                            let _ = job.respond_to.send(result);
                        }
                        Err(_) => {
                            info!(worker_id, "render worker shutting down");
                            break;
                        }
                    }
                })
                .expect("failed to spawn render worker thread");
        }
        WorkerPool {
            sender,
            num_workers: num_workers.max(1),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Enqueues a render job and awaits its result. Rejects once the
    /// pool's worker threads have stopped accepting work.
    pub async fn submit(&self, params: RenderParams, cancel: CancellationToken) -> RenderResult<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let job = RenderJob {
            params,
            cancel,
            respond_to: tx,
        };
        self.sender
            .send(job)
            .map_err(|_| RenderError::Internal("render worker pool has shut down".into()))?;
        rx.await
            .map_err(|_| RenderError::Internal("render worker dropped its response channel".into()))?
    }
}

pub struct AppState {
    pub settings: Settings,
    pub pool: WorkerPool,
    ready: std::sync::atomic::AtomicBool,
}

impl AppState {
    pub fn new(settings: Settings) -> AppState {
        let vocoder: Arc<dyn VocoderModel> = Arc::new(FallbackVocoder);
        let separator: Arc<dyn SeparatorModel> = Arc::new(FallbackSeparator);
        let orchestrator = Arc::new(RenderOrchestrator::new(settings.clone(), vocoder, separator));
        let audio_io: Arc<dyn AudioIo> = Arc::new(HoundAudioIo);
        let pool = WorkerPool::new(settings.max_workers, orchestrator, audio_io);
        AppState {
            settings,
            pool,
            ready: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// True once the worker pool has finished spawning. `WorkerPool::new`
    /// blocks until every thread is up, so this is true as soon as
    /// `AppState::new` returns.
    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::Acquire)
    }
}
