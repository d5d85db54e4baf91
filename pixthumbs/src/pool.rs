//! Pool borné de workers de conversion
//!
//! Les demandes passent par une file `async-channel` bornée. Quand la file est
//! pleine, la soumission échoue immédiatement avec
//! [`PipelineError::PoolSaturated`] au lieu de grossir sans limite.
//!
//! Chaque job s'exécute dans sa propre tâche sous un délai : une conversion
//! qui panique ou qui dépasse son délai est signalée en échec et le worker
//! passe au job suivant.
//!
//! Au délai, le [`CancellationToken`] du job est déclenché et
//! [`PipelineError::Timeout`] est renvoyé tout de suite. Le worker reste
//! pourtant occupé jusqu'à la fin réelle de la conversion (un décodage dans
//! `spawn_blocking` ne s'interrompt pas) : il n'y a jamais plus de
//! `workers` conversions en cours. [`ConversionTicket::settled`] signale
//! cette fin réelle.

use crate::convert::Converter;
use crate::error::PipelineError;
use crate::media::MediaRef;
use crate::render::RenderSpec;
use async_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(900);

/// Nombre de workers par défaut : les cœurs disponibles
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

/// Dimensionnement du pool
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    /// Délai des transcodages vidéo complets
    pub transcode_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            transcode_timeout: DEFAULT_TRANSCODE_TIMEOUT,
        }
    }
}

/// Travail à effectuer : écrire le dérivé de `media` dans `output`
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub media: MediaRef,
    pub spec: RenderSpec,
    pub output: PathBuf,
}

struct QueuedJob {
    request: ConversionRequest,
    started: oneshot::Sender<()>,
    outcome: oneshot::Sender<Result<(), PipelineError>>,
    settled: oneshot::Sender<()>,
}

/// Suivi d'un job accepté par le pool
pub struct ConversionTicket {
    started: oneshot::Receiver<()>,
    outcome: oneshot::Receiver<Result<(), PipelineError>>,
    settled: oneshot::Receiver<()>,
}

impl ConversionTicket {
    /// Attend qu'un worker prenne le job en charge
    pub async fn started(&mut self) -> Result<(), PipelineError> {
        (&mut self.started)
            .await
            .map_err(|_| PipelineError::conversion_failed("conversion pool shut down"))
    }

    /// Attend le résultat de la conversion
    ///
    /// Après un [`PipelineError::Timeout`], la conversion peut encore tourner :
    /// voir [`ConversionTicket::settled`].
    pub async fn outcome(&mut self) -> Result<(), PipelineError> {
        (&mut self.outcome)
            .await
            .unwrap_or_else(|_| Err(PipelineError::conversion_failed("conversion worker lost")))
    }

    /// Attend que la conversion soit réellement terminée et que le worker
    /// l'ait relâchée. Plus rien n'est écrit dans la sortie ensuite.
    pub async fn settled(self) {
        let _ = self.settled.await;
    }
}

#[derive(Default)]
struct Counters {
    running: AtomicUsize,
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Instantané des compteurs du pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub running: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

/// Pool de workers de conversion
pub struct ConversionPool {
    tx: Sender<QueuedJob>,
    counters: Arc<Counters>,
    workers: usize,
    queue_capacity: usize,
}

impl ConversionPool {
    /// Démarre `options.workers` workers. Doit être appelé dans un runtime tokio.
    pub fn new(converter: Arc<dyn Converter>, options: PoolOptions) -> Self {
        let workers = if options.workers == 0 {
            default_workers()
        } else {
            options.workers
        };
        let queue_capacity = options.queue_capacity.max(1);
        let (tx, rx) = async_channel::bounded(queue_capacity);
        let counters = Arc::new(Counters::default());

        for id in 0..workers {
            tokio::spawn(worker_loop(
                id,
                rx.clone(),
                converter.clone(),
                counters.clone(),
                options.clone(),
            ));
        }

        debug!(workers, queue_capacity, "Conversion pool started");

        Self {
            tx,
            counters,
            workers,
            queue_capacity,
        }
    }

    /// Place un job dans la file, sans jamais attendre
    pub fn submit(&self, request: ConversionRequest) -> Result<ConversionTicket, PipelineError> {
        let (started_tx, started_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (settled_tx, settled_rx) = oneshot::channel();
        let job = QueuedJob {
            request,
            started: started_tx,
            outcome: outcome_tx,
            settled: settled_tx,
        };

        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(ConversionTicket {
                    started: started_rx,
                    outcome: outcome_rx,
                    settled: settled_rx,
                })
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(PipelineError::PoolSaturated)
            }
            Err(TrySendError::Closed(_)) => {
                Err(PipelineError::conversion_failed("conversion pool shut down"))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            queued: self.tx.len(),
            running: c.running.load(Ordering::Relaxed),
            submitted: c.submitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
        }
    }

    /// Ferme la file : les jobs déjà en attente sont traités, les suivants refusés
    pub fn shutdown(&self) {
        self.tx.close();
    }
}

impl Drop for ConversionPool {
    fn drop(&mut self) {
        self.tx.close();
    }
}

async fn worker_loop(
    id: usize,
    rx: Receiver<QueuedJob>,
    converter: Arc<dyn Converter>,
    counters: Arc<Counters>,
    options: PoolOptions,
) {
    while let Ok(job) = rx.recv().await {
        let QueuedJob {
            request,
            started,
            outcome,
            settled,
        } = job;

        counters.running.fetch_add(1, Ordering::Relaxed);
        let _ = started.send(());

        let deadline = if request.spec.is_transcode() {
            options.transcode_timeout
        } else {
            options.job_timeout
        };

        let path = request.media.path.clone();
        let converter = converter.clone();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let mut task = tokio::spawn(async move {
            converter
                .convert(&request.media, &request.spec, &request.output, &task_cancel)
                .await
        });

        match tokio::time::timeout(deadline, &mut task).await {
            Ok(joined) => {
                let result = match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(PipelineError::from(e)),
                    Err(join_error) => {
                        warn!(worker = id, path = %path.display(), "Conversion task crashed: {}", join_error);
                        Err(PipelineError::conversion_failed("conversion task crashed"))
                    }
                };

                counters.running.fetch_sub(1, Ordering::Relaxed);
                match &result {
                    Ok(()) => counters.completed.fetch_add(1, Ordering::Relaxed),
                    Err(PipelineError::Timeout) => counters.timed_out.fetch_add(1, Ordering::Relaxed),
                    Err(_) => counters.failed.fetch_add(1, Ordering::Relaxed),
                };

                let _ = settled.send(());
                let _ = outcome.send(result);
            }
            Err(_) => {
                cancel.cancel();
                counters.timed_out.fetch_add(1, Ordering::Relaxed);
                let _ = outcome.send(Err(PipelineError::Timeout));
                warn!(
                    worker = id,
                    path = %path.display(),
                    "Conversion timed out after {:?}, waiting for it to stop",
                    deadline
                );

                // Le worker ne prend pas d'autre job avant la fin réelle
                if let Err(join_error) = task.await {
                    warn!(worker = id, "Timed-out conversion task crashed: {}", join_error);
                }
                counters.running.fetch_sub(1, Ordering::Relaxed);
                let _ = settled.send(());
                debug!(worker = id, path = %path.display(), "Timed-out conversion settled");
            }
        }
    }

    debug!(worker = id, "Conversion worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::media::MediaKind;
    use crate::render::RenderPolicy;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::SystemTime;
    use tokio::sync::Semaphore;

    /// Convertisseur bloqué tant que le sémaphore n'a pas de permis
    struct Gated(Arc<Semaphore>);

    #[async_trait]
    impl Converter for Gated {
        async fn convert(
            &self,
            _media: &MediaRef,
            _spec: &RenderSpec,
            _output: &Path,
            cancel: &CancellationToken,
        ) -> Result<(), ConversionError> {
            tokio::select! {
                permit = self.0.acquire() => {
                    let _permit = permit.map_err(|e| ConversionError::Tool(e.to_string()))?;
                    Ok(())
                }
                _ = cancel.cancelled() => Err(ConversionError::Cancelled),
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl Converter for Panicking {
        async fn convert(
            &self,
            _media: &MediaRef,
            _spec: &RenderSpec,
            _output: &Path,
            _cancel: &CancellationToken,
        ) -> Result<(), ConversionError> {
            panic!("decoder exploded");
        }
    }

    /// Travail bloquant qui ignore l'annulation, avec suivi du parallélisme
    #[derive(Default)]
    struct Stubborn {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Converter for Stubborn {
        async fn convert(
            &self,
            _media: &MediaRef,
            _spec: &RenderSpec,
            _output: &Path,
            _cancel: &CancellationToken,
        ) -> Result<(), ConversionError> {
            let current = self.current.clone();
            let peak = self.peak.clone();
            tokio::task::spawn_blocking(move || {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                current.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .map_err(|e| ConversionError::Encode(e.to_string()))
        }
    }

    fn request() -> ConversionRequest {
        ConversionRequest {
            media: MediaRef::new("/g/p.jpg", MediaKind::Photo, SystemTime::now(), 1),
            spec: RenderPolicy::default().icon(MediaKind::Photo),
            output: PathBuf::from("/dev/null"),
        }
    }

    fn options(workers: usize, queue_capacity: usize) -> PoolOptions {
        PoolOptions {
            workers,
            queue_capacity,
            ..PoolOptions::default()
        }
    }

    #[tokio::test]
    async fn test_saturation_fails_fast() {
        let gate = Arc::new(Semaphore::new(0));
        let pool = ConversionPool::new(Arc::new(Gated(gate.clone())), options(1, 1));

        // Le seul worker prend le premier job et reste bloqué
        let mut first = pool.submit(request()).unwrap();
        first.started().await.unwrap();

        // Le second occupe l'unique place de la file
        let mut second = pool.submit(request()).unwrap();

        // Le troisième est refusé sans attendre
        assert!(matches!(pool.submit(request()), Err(PipelineError::PoolSaturated)));

        let stats = pool.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.running, 1);

        gate.add_permits(2);
        first.outcome().await.unwrap();
        second.outcome().await.unwrap();
        assert_eq!(pool.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_timeout_marks_job_failed_and_worker_survives() {
        let gate = Arc::new(Semaphore::new(0));
        let pool = ConversionPool::new(
            Arc::new(Gated(gate.clone())),
            PoolOptions {
                workers: 1,
                queue_capacity: 4,
                job_timeout: Duration::from_millis(50),
                transcode_timeout: Duration::from_millis(50),
            },
        );

        let mut ticket = pool.submit(request()).unwrap();
        assert_eq!(ticket.outcome().await, Err(PipelineError::Timeout));
        ticket.settled().await;
        assert_eq!(pool.stats().running, 0);

        gate.add_permits(1);
        let mut ticket = pool.submit(request()).unwrap();
        ticket.outcome().await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_blocking_work_keeps_worker_busy() {
        let converter = Arc::new(Stubborn::default());
        let pool = ConversionPool::new(
            converter.clone(),
            PoolOptions {
                workers: 1,
                queue_capacity: 4,
                job_timeout: Duration::from_millis(30),
                transcode_timeout: Duration::from_millis(30),
            },
        );

        let mut first = pool.submit(request()).unwrap();
        let others: Vec<_> = (0..2).map(|_| pool.submit(request()).unwrap()).collect();

        // Le délai est signalé sans attendre la fin du travail bloquant
        let submitted_at = std::time::Instant::now();
        assert_eq!(first.outcome().await, Err(PipelineError::Timeout));
        assert!(submitted_at.elapsed() < Duration::from_millis(150));
        assert_eq!(pool.stats().running, 1);
        assert_eq!(pool.stats().queued, 2);
        first.settled().await;

        for mut ticket in others {
            assert_eq!(ticket.outcome().await, Err(PipelineError::Timeout));
            ticket.settled().await;
        }

        assert_eq!(converter.peak.load(Ordering::SeqCst), 1);
        assert_eq!(converter.current.load(Ordering::SeqCst), 0);
        let stats = pool.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.timed_out, 3);
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_conversion_failure() {
        let pool = ConversionPool::new(Arc::new(Panicking), options(1, 4));

        let err = pool.submit(request()).unwrap().outcome().await.unwrap_err();
        assert!(matches!(err, PipelineError::ConversionFailed { .. }));

        // Le worker est toujours là
        let err = pool.submit(request()).unwrap().outcome().await.unwrap_err();
        assert!(matches!(err, PipelineError::ConversionFailed { .. }));
        assert_eq!(pool.stats().failed, 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let pool = ConversionPool::new(Arc::new(Gated(Arc::new(Semaphore::new(1)))), options(1, 1));
        pool.shutdown();
        assert!(matches!(
            pool.submit(request()),
            Err(PipelineError::ConversionFailed { .. })
        ));
    }
}
