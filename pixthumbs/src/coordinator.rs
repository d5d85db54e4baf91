//! Coordinateur de génération
//!
//! Point d'entrée unique [`GenerationCoordinator::get_or_create`]. Une table
//! protégée par un mutex garantit au plus un job par empreinte : les demandes
//! concurrentes pour la même empreinte s'abonnent au canal `watch` du job
//! existant et reçoivent toutes le même résultat.
//!
//! Cycle de vie d'un job : `Queued -> Running -> {Done, Failed}`. La
//! transition terminale et le retrait de la table se font ensemble, sous le
//! mutex, une seule fois. Les échecs ne sont pas mémorisés : la demande
//! suivante relance un job.
//!
//! Aucune E/S n'est faite sous le mutex.
//!
//! Un job qui dépasse son délai est terminé en échec tout de suite, mais son
//! fichier temporaire n'est supprimé qu'une fois la conversion réellement
//! arrêtée.

use crate::error::PipelineError;
use crate::fingerprint::Fingerprint;
use crate::media::MediaRef;
use crate::pool::{ConversionPool, ConversionRequest};
use crate::render::RenderSpec;
use crate::store::{DerivativeCache, DerivativeEntry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// État d'un job de génération
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Queued,
    Running,
    Done(DerivativeEntry),
    Failed(PipelineError),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done(_) | JobState::Failed(_))
    }

    fn into_result(self) -> Result<DerivativeEntry, PipelineError> {
        match self {
            JobState::Done(entry) => Ok(entry),
            JobState::Failed(err) => Err(err),
            JobState::Queued | JobState::Running => {
                Err(PipelineError::conversion_failed("generation job still pending"))
            }
        }
    }
}

struct GenerationJob {
    fingerprint: Fingerprint,
    media: MediaRef,
    spec: RenderSpec,
    state: watch::Sender<JobState>,
}

type ActiveJobs = HashMap<Fingerprint, Arc<GenerationJob>>;

struct Inner {
    cache: Arc<DerivativeCache>,
    pool: Arc<ConversionPool>,
    active: Mutex<ActiveJobs>,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, ActiveJobs> {
        // La table reste cohérente même après une panique : chaque mutation
        // est une seule opération sur la HashMap.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition terminale : retrait de la table puis notification, sous le mutex
    fn finish(&self, job: &GenerationJob, state: JobState) {
        let mut active = self.active();
        let is_current = active
            .get(&job.fingerprint)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), job));
        if is_current {
            active.remove(&job.fingerprint);
        }
        job.state.send_replace(state);
    }

    async fn run(&self, job: &GenerationJob) -> Result<DerivativeEntry, PipelineError> {
        let fp = &job.fingerprint;

        // Publié entre la recherche et l'insertion dans la table
        if let Some(entry) = self.cache.lookup(fp).await {
            return Ok(entry);
        }

        match tokio::fs::metadata(&job.media.path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(PipelineError::source_unavailable("not a regular file")),
            Err(e) => return Err(PipelineError::source_unavailable(e)),
        }

        let handle = self.cache.begin_write(fp).await?;
        let request = ConversionRequest {
            media: job.media.clone(),
            spec: job.spec,
            output: handle.temp_path().to_path_buf(),
        };

        let mut ticket = match self.pool.submit(request) {
            Ok(ticket) => ticket,
            Err(e) => {
                self.cache.abort(handle).await;
                return Err(e);
            }
        };

        if let Err(e) = ticket.started().await {
            self.cache.abort(handle).await;
            return Err(e);
        }
        {
            let _active = self.active();
            job.state.send_replace(JobState::Running);
        }
        debug!(fingerprint = %fp, "Conversion started");

        match ticket.outcome().await {
            Ok(()) => self.cache.commit(handle).await,
            Err(PipelineError::Timeout) => {
                // La conversion tourne peut-être encore et peut écrire dans
                // le fichier temporaire : on le retire après sa fin réelle
                let cache = self.cache.clone();
                let fingerprint = fp.clone();
                tokio::spawn(async move {
                    ticket.settled().await;
                    cache.abort(handle).await;
                    debug!(fingerprint = %fingerprint, "Timed-out derivative discarded");
                });
                Err(PipelineError::Timeout)
            }
            Err(e) => {
                self.cache.abort(handle).await;
                Err(e)
            }
        }
    }
}

/// Termine le job en échec si la tâche qui le pilote disparaît
struct JobGuard {
    inner: Arc<Inner>,
    job: Arc<GenerationJob>,
    finished: bool,
}

impl JobGuard {
    fn finish(mut self, result: Result<DerivativeEntry, PipelineError>) {
        self.finished = true;
        let state = match result {
            Ok(entry) => {
                info!(
                    fingerprint = %self.job.fingerprint,
                    kind = %self.job.spec.kind,
                    size = entry.size,
                    "Derivative generated"
                );
                JobState::Done(entry)
            }
            Err(err) => {
                warn!(
                    fingerprint = %self.job.fingerprint,
                    path = %self.job.media.path.display(),
                    "Derivative generation failed: {}", err
                );
                JobState::Failed(err)
            }
        };
        self.inner.finish(&self.job, state);
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.finish(
                &self.job,
                JobState::Failed(PipelineError::conversion_failed("generation task lost")),
            );
        }
    }
}

/// Orchestrateur de la génération des dérivés
///
/// Reçoit le cache et le pool à la construction : aucun singleton global.
#[derive(Clone)]
pub struct GenerationCoordinator {
    inner: Arc<Inner>,
}

impl GenerationCoordinator {
    pub fn new(cache: Arc<DerivativeCache>, pool: Arc<ConversionPool>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                pool,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<DerivativeCache> {
        &self.inner.cache
    }

    pub fn pool(&self) -> &Arc<ConversionPool> {
        &self.inner.pool
    }

    /// Retourne le dérivé, en le générant au besoin
    ///
    /// L'attente ne bloque pas le thread appelant. Abandonner le future
    /// n'annule pas le job : il se termine pour les autres demandeurs.
    pub async fn get_or_create(
        &self,
        media: &MediaRef,
        spec: &RenderSpec,
    ) -> Result<DerivativeEntry, PipelineError> {
        let fp = Fingerprint::compute(media, spec);

        if let Some(entry) = self.inner.cache.lookup(&fp).await {
            debug!(fingerprint = %fp, "Derivative cache hit");
            return Ok(entry);
        }

        let (mut rx, created) = {
            let mut active = self.inner.active();
            match active.get(&fp) {
                Some(job) => (job.state.subscribe(), None),
                None => {
                    let (tx, rx) = watch::channel(JobState::Queued);
                    let job = Arc::new(GenerationJob {
                        fingerprint: fp.clone(),
                        media: media.clone(),
                        spec: *spec,
                        state: tx,
                    });
                    active.insert(fp.clone(), job.clone());
                    (rx, Some(job))
                }
            }
        };

        match created {
            Some(job) => {
                debug!(fingerprint = %fp, path = %media.path.display(), "Derivative cache miss, new job");
                let guard = JobGuard {
                    inner: self.inner.clone(),
                    job,
                    finished: false,
                };
                tokio::spawn(async move {
                    let result = guard.inner.run(&guard.job).await;
                    guard.finish(result);
                });
            }
            None => debug!(fingerprint = %fp, "Joining generation job in flight"),
        }

        let state = rx
            .wait_for(JobState::is_terminal)
            .await
            .map_err(|_| PipelineError::conversion_failed("generation job lost"))?
            .clone();
        state.into_result()
    }

    /// Nombre de jobs en cours
    pub fn active_jobs(&self) -> usize {
        self.inner.active().len()
    }

    /// État du job en cours pour une empreinte, `None` s'il n'y en a pas
    pub fn job_state(&self, fp: &Fingerprint) -> Option<JobState> {
        self.inner
            .active()
            .get(fp)
            .map(|job| job.state.borrow().clone())
    }
}
