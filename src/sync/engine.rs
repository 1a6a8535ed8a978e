//! sync::engine
//!
//! [`SyncEngine`]: orchestration of one working directory and its remote.
//!
//! # Serialization
//!
//! Every operation acquires the staging lock as an owned guard. The guard
//! travels into each blocking backend call and comes back out when the call
//! returns, so a caller that drops its future never releases the lock while
//! libgit2 is still working. A dropped caller simply leaves the last call to
//! finish on the blocking pool, after which the guard is released.
//!
//! # Push coalescing
//!
//! [`SyncEngine::request_push`] sets a pending flag and wakes the background
//! worker. The flag is cleared right before a push starts and set again if
//! the push fails, so any number of requests arriving during one push cause
//! exactly one further push.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, Notify, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::error::{Phase, SyncError};
use super::options::{
    CommitSummary, EngineOptions, InitOutcome, PullOutcome, RemoteUrls, RepositoryLocation,
    SyncReport,
};
use crate::auth::{CredentialProvider, Credentials, Password};
use crate::core::lock::WorkDirLock;
use crate::core::paths::StorePaths;
use crate::core::status::{Operation, RemoteRelation, StatusReporter, SyncStatus};
use crate::core::types::{BranchName, CommitId};
use crate::git::{
    validate_config_key, Git2Backend, GitError, RemoteOptions, VcsBackend, ORIGIN, UPSTREAM,
};

struct Shared<B> {
    backend: Arc<B>,
    options: EngineOptions,
    paths: StorePaths,
    staging: Arc<Mutex<()>>,
    credentials: RwLock<Credentials>,
    provider: Option<Arc<dyn CredentialProvider>>,
    /// A provider-supplied password not yet accepted by the remote.
    remember_on_success: AtomicBool,
    status: StatusReporter,
    push_pending: AtomicBool,
    push_wakeup: Notify,
    shutdown: Notify,
    worker: StdMutex<Option<JoinHandle<()>>>,
    work_lock: StdMutex<Option<WorkDirLock>>,
}

/// Backend access for the duration of one locked operation.
struct Locked<B> {
    backend: Arc<B>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<B: VcsBackend> Locked<B> {
    /// Run `f` on the blocking pool while the staging lock stays held.
    async fn call<T, F>(&mut self, f: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&B) -> Result<T, SyncError> + Send + 'static,
    {
        let guard = self.guard.take().ok_or_else(|| {
            SyncError::UnknownGit(GitError::Internal(
                "staging lock lost after a failed backend call".into(),
            ))
        })?;
        let backend = Arc::clone(&self.backend);

        let (guard, result) = tokio::task::spawn_blocking(move || {
            let result = f(&backend);
            (guard, result)
        })
        .await
        .map_err(|e| SyncError::UnknownGit(GitError::Internal(format!("backend task failed: {e}"))))?;

        self.guard = Some(guard);
        result
    }
}

fn git(phase: Phase) -> impl Fn(GitError) -> SyncError {
    move |err| SyncError::from_git(err, phase)
}

fn init_io(err: std::io::Error) -> SyncError {
    SyncError::Initialization(err.to_string())
}

/// Remove clone directories left behind by an interrupted initialization.
fn remove_stale_staging_dirs(paths: &StorePaths) -> Result<(), SyncError> {
    let parent = paths.parent_dir();
    let Ok(entries) = fs::read_dir(&parent) else {
        return Ok(());
    };
    let prefix = paths.clone_staging_prefix();
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            tracing::warn!(path = %entry.path().display(), "removing stale clone directory");
            fs::remove_dir_all(entry.path()).map_err(init_io)?;
        }
    }
    Ok(())
}

/// Clone into a sibling staging directory and move it into place.
///
/// Falls back to the upstream URL when the remote is unreachable.
fn clone_atomically<B: VcsBackend>(
    backend: &B,
    paths: &StorePaths,
    location: &RepositoryLocation,
    remote: &RemoteOptions,
    force: bool,
) -> Result<InitOutcome, SyncError> {
    remove_stale_staging_dirs(paths)?;

    let work_dir = paths.work_dir();
    if !force && work_dir.exists() {
        let occupied = fs::read_dir(work_dir).map_err(init_io)?.next().is_some();
        if occupied {
            return Err(SyncError::Initialization(format!(
                "{} exists and is not a git repository",
                work_dir.display()
            )));
        }
    }
    fs::create_dir_all(paths.parent_dir()).map_err(init_io)?;

    let staging = paths.clone_staging_dir();
    let outcome = match backend.clone_into(&location.remote_url, &staging, &location.branch, remote) {
        Ok(()) => InitOutcome::Cloned,
        Err(err) => {
            let _ = fs::remove_dir_all(&staging);
            let unreachable = matches!(err, GitError::Network(_) | GitError::Auth(_));
            let upstream = match &location.upstream_url {
                Some(url) if unreachable => url,
                _ => {
                    return Err(match err {
                        GitError::Auth(msg) => SyncError::Authentication(msg),
                        err => SyncError::Initialization(err.to_string()),
                    })
                }
            };
            tracing::warn!(error = %err, "remote unavailable, cloning from upstream");
            backend
                .clone_into(upstream, &staging, &location.branch, remote)
                .map_err(|upstream_err| {
                    let _ = fs::remove_dir_all(&staging);
                    SyncError::Initialization(format!(
                        "neither remote nor upstream is reachable: {}; {}",
                        err, upstream_err
                    ))
                })?;
            InitOutcome::ClonedFromUpstream
        }
    };

    if work_dir.exists() {
        fs::remove_dir_all(work_dir).map_err(init_io)?;
    }
    fs::rename(&staging, work_dir).map_err(|e| {
        let _ = fs::remove_dir_all(&staging);
        init_io(e)
    })?;
    Ok(outcome)
}

/// Serialized synchronization of one working directory with its remote.
///
/// Cloning is cheap; clones share the same state.
pub struct SyncEngine<B: VcsBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: VcsBackend> Clone for SyncEngine<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: VcsBackend> std::fmt::Debug for SyncEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("work_dir", &self.shared.paths.work_dir())
            .field("branch", &self.shared.options.location.branch)
            .finish_non_exhaustive()
    }
}

impl SyncEngine<Git2Backend> {
    /// Engine over libgit2 for `options.location.work_dir`.
    pub fn open(options: EngineOptions, provider: Option<Arc<dyn CredentialProvider>>) -> Self {
        let backend = Git2Backend::new(options.location.work_dir.clone());
        Self::new(backend, options, provider)
    }
}

impl<B: VcsBackend> SyncEngine<B> {
    pub fn new(
        backend: B,
        options: EngineOptions,
        provider: Option<Arc<dyn CredentialProvider>>,
    ) -> Self {
        let paths = StorePaths::new(options.location.work_dir.clone());
        let credentials = Credentials::new(options.username.clone());
        Self {
            shared: Arc::new(Shared {
                backend: Arc::new(backend),
                paths,
                staging: Arc::new(Mutex::new(())),
                credentials: RwLock::new(credentials),
                provider,
                remember_on_success: AtomicBool::new(false),
                status: StatusReporter::new(),
                push_pending: AtomicBool::new(false),
                push_wakeup: Notify::new(),
                shutdown: Notify::new(),
                worker: StdMutex::new(None),
                work_lock: StdMutex::new(None),
                options,
            }),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.shared.options
    }

    pub fn paths(&self) -> &StorePaths {
        &self.shared.paths
    }

    pub fn branch(&self) -> &BranchName {
        &self.shared.options.location.branch
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    async fn lock(&self) -> Locked<B> {
        let guard = Arc::clone(&self.shared.staging).lock_owned().await;
        Locked {
            backend: Arc::clone(&self.shared.backend),
            guard: Some(guard),
        }
    }

    fn read_creds(&self) -> RwLockReadGuard<'_, Credentials> {
        self.shared
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_creds(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.shared
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, operation: Operation) {
        self.shared.status.update(|s| s.operation = operation);
    }

    /// Record the outcome of an operation in the status and return it.
    fn finish<T>(&self, result: Result<T, SyncError>) -> Result<T, SyncError> {
        match &result {
            Ok(_) => {
                self.shared.status.update(|s| {
                    s.operation = Operation::Idle;
                    s.last_error = None;
                });
            }
            Err(err) => {
                tracing::debug!(error = %err, "operation failed");
                let message = err.to_string();
                self.shared.status.update(|s| {
                    s.operation = Operation::Idle;
                    s.last_error = Some(message);
                    match err {
                        SyncError::Authentication(_) => s.needs_password = true,
                        SyncError::Network(_) => s.is_online = false,
                        SyncError::DivergedHistory { .. } => {
                            s.status_relative_to_local = Some(RemoteRelation::Diverged)
                        }
                        _ => {}
                    }
                });
            }
        }
        result
    }

    /// Credentials and transport settings for the next network call.
    ///
    /// Fails fast once the remote has rejected the credentials, until
    /// [`SyncEngine::set_password`] supplies new ones.
    async fn remote_options(&self) -> Result<RemoteOptions, SyncError> {
        let (username, password, needs_password) = {
            let creds = self.read_creds();
            (
                creds.username().to_string(),
                creds.password().cloned(),
                creds.needs_password,
            )
        };
        if needs_password && password.is_none() {
            return Err(SyncError::Authentication(
                "password required before contacting the remote".into(),
            ));
        }

        let password = match (password, &self.shared.provider) {
            (Some(password), _) => Some(password),
            (None, Some(provider)) => {
                let supplied = provider
                    .password(&username, &self.shared.options.location.remote_url)
                    .await
                    .map_err(|e| SyncError::Authentication(e.to_string()))?;
                if let Some(password) = &supplied {
                    self.write_creds().set_password(Some(password.clone()));
                    self.shared.remember_on_success.store(true, Ordering::SeqCst);
                }
                supplied
            }
            (None, None) => None,
        };

        let location = &self.shared.options.location;
        Ok(RemoteOptions {
            username,
            password,
            proxy_url: location.proxy_url.clone(),
            timeout: self.shared.options.network_timeout,
        })
    }

    /// Credential and connectivity bookkeeping after a network operation.
    async fn settle_remote<T>(&self, result: Result<T, SyncError>) -> Result<T, SyncError> {
        let url = &self.shared.options.location.remote_url;
        match &result {
            Err(SyncError::Authentication(_)) => {
                let (username, offered) = {
                    let mut creds = self.write_creds();
                    let offered = creds.password().is_some();
                    creds.clear();
                    creds.needs_password = true;
                    (creds.username().to_string(), offered)
                };
                self.shared.remember_on_success.store(false, Ordering::SeqCst);
                if let (true, Some(provider)) = (offered, &self.shared.provider) {
                    if let Err(err) = provider.forget(&username, url).await {
                        tracing::warn!(error = %err, "could not forget rejected password");
                    }
                }
            }
            Err(SyncError::Network(_)) => {}
            _ => {
                self.shared.status.update(|s| s.is_online = true);
                if self.shared.remember_on_success.swap(false, Ordering::SeqCst) {
                    let (username, password) = {
                        let creds = self.read_creds();
                        (creds.username().to_string(), creds.password().cloned())
                    };
                    if let (Some(password), Some(provider)) = (password, &self.shared.provider) {
                        if let Err(err) = provider.remember(&username, url, &password).await {
                            tracing::warn!(error = %err, "could not store accepted password");
                        }
                    }
                }
            }
        }
        result
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Make sure the working directory holds a clone of the remote.
    ///
    /// With `force`, any existing working directory is replaced by a fresh
    /// clone and the status is reset.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Initialization`] if neither remote nor upstream is
    ///   reachable and there is no local copy, or another engine owns the
    ///   working directory
    /// - [`SyncError::Authentication`] if the remote refused the credentials
    pub async fn initialize(&self, force: bool) -> Result<InitOutcome, SyncError> {
        let mut locked = self.lock().await;
        if force {
            if let Some(mut lock) = self
                .shared
                .work_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                lock.release()?;
            }
            self.shared.status.reset();
        }
        self.begin(Operation::Initializing);

        let result = self.initialize_locked(&mut locked, force).await;
        let result = self.settle_remote(result).await;
        if let Ok(outcome) = &result {
            tracing::info!(work_dir = %self.shared.paths.work_dir().display(), ?outcome, "initialized");
        }
        self.finish(result)
    }

    async fn initialize_locked(
        &self,
        locked: &mut Locked<B>,
        force: bool,
    ) -> Result<InitOutcome, SyncError> {
        let existing = !force && locked.call(|b| Ok(b.is_initialized())).await?;

        let outcome = if existing {
            InitOutcome::Existing
        } else {
            let remote = self.remote_options().await?;
            let paths = self.shared.paths.clone();
            let location = self.shared.options.location.clone();
            locked
                .call(move |b| clone_atomically(b, &paths, &location, &remote, force))
                .await?
        };

        if outcome != InitOutcome::Existing {
            let location = self.shared.options.location.clone();
            let author = self.shared.options.author.clone();
            locked
                .call(move |b| {
                    let config = git(Phase::Config);
                    if let Some(upstream) = &location.upstream_url {
                        b.set_remote_url(UPSTREAM, upstream).map_err(&config)?;
                    }
                    if outcome == InitOutcome::ClonedFromUpstream {
                        b.set_remote_url(ORIGIN, &location.remote_url)
                            .map_err(&config)?;
                    }
                    b.config_set("user.name", &author.name).map_err(&config)?;
                    b.config_set("user.email", &author.email).map_err(&config)?;
                    if let Some(proxy) = &location.proxy_url {
                        b.config_set("http.proxy", proxy).map_err(&config)?;
                    }
                    Ok(())
                })
                .await?;
        }
        if outcome == InitOutcome::ClonedFromUpstream {
            // Upstream history still has to reach the remote.
            self.shared.push_pending.store(true, Ordering::SeqCst);
        }

        let mut work_lock = self
            .shared
            .work_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if work_lock.is_none() {
            *work_lock = Some(WorkDirLock::acquire(&self.shared.paths)?);
        }
        Ok(outcome)
    }

    /// Whether the working directory holds a valid repository. No network.
    pub async fn is_initialized(&self) -> bool {
        let mut locked = self.lock().await;
        locked
            .call(|b| Ok(b.is_initialized()))
            .await
            .unwrap_or(false)
    }

    /// Whether `origin` (and `upstream`, when expected) use the given URLs.
    pub async fn is_using_remote_urls(&self, expected: &RemoteUrls) -> Result<bool, SyncError> {
        let mut locked = self.lock().await;
        let (origin, upstream) = locked
            .call(|b| {
                let config = git(Phase::Config);
                Ok((
                    b.remote_url(ORIGIN).map_err(&config)?,
                    b.remote_url(UPSTREAM).map_err(&config)?,
                ))
            })
            .await?;

        let origin_matches = origin.as_deref() == Some(expected.origin.as_str());
        let upstream_matches = match &expected.upstream {
            Some(url) => upstream.as_deref() == Some(url.as_str()),
            None => true,
        };
        Ok(origin_matches && upstream_matches)
    }

    /// Stop the background worker, drop credentials and release the
    /// working-directory lock. Waits for an in-flight operation to finish.
    pub async fn destroy(&self) {
        self.shared.shutdown.notify_one();
        let worker = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "background worker ended abnormally");
            }
        }

        let _locked = self.lock().await;
        self.write_creds().clear();
        let work_lock = self
            .shared
            .work_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut lock) = work_lock {
            if let Err(err) = lock.release() {
                tracing::warn!(error = %err, "could not release working directory lock");
            }
        }
        tracing::info!(work_dir = %self.shared.paths.work_dir().display(), "sync engine stopped");
    }

    // =========================================================================
    // Repository config
    // =========================================================================

    /// Set a repository-level git config value.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<(), SyncError> {
        validate_config_key(key).map_err(git(Phase::Config))?;
        let (key, value) = (key.to_string(), value.to_string());
        let mut locked = self.lock().await;
        let result = locked
            .call(move |b| b.config_set(&key, &value).map_err(git(Phase::Config)))
            .await;
        self.finish(result)
    }

    /// Repository-level git config value, if set.
    pub async fn config_get(&self, key: &str) -> Result<Option<String>, SyncError> {
        validate_config_key(key).map_err(git(Phase::Config))?;
        let key = key.to_string();
        let mut locked = self.lock().await;
        locked
            .call(move |b| b.config_get(&key).map_err(git(Phase::Config)))
            .await
    }

    // =========================================================================
    // Local writes
    // =========================================================================

    /// Stage `paths`, or stage their removal.
    pub async fn stage(&self, paths: &[String], removing: bool) -> Result<(), SyncError> {
        let paths = paths.to_vec();
        let mut locked = self.lock().await;
        let result = locked
            .call(move |b| b.stage(&paths, removing).map_err(git(Phase::Stage)))
            .await;
        self.finish(result)
    }

    /// Commit what is staged. `None` if nothing is.
    pub async fn commit(&self, message: &str) -> Result<Option<CommitId>, SyncError> {
        let message = message.to_string();
        let author = self.shared.options.author.clone();
        let mut locked = self.lock().await;
        self.begin(Operation::Committing);

        let result = locked
            .call(move |b| {
                let commit = b.commit(&message, &author).map_err(git(Phase::Commit))?;
                let dirty = !b.changed_files(None).map_err(git(Phase::Commit))?.is_empty();
                Ok((commit, dirty))
            })
            .await
            .map(|(commit, dirty)| {
                self.shared.status.update(|s| s.has_local_changes = dirty);
                commit
            });
        self.finish(result)
    }

    /// Stage and commit `paths` (or their removal) under one lock acquisition.
    ///
    /// A new commit schedules a push.
    pub async fn stage_and_commit(
        &self,
        paths: &[String],
        message: &str,
        removing: bool,
    ) -> Result<CommitSummary, SyncError> {
        if removing {
            self.commit_paths(&[], paths, message).await
        } else {
            self.commit_paths(paths, &[], message).await
        }
    }

    /// Commit exactly `additions` and the removal of `removals`.
    ///
    /// The index is reset to HEAD first, so nothing staged earlier ends up
    /// in the commit. Reset, staging and commit run under one lock
    /// acquisition.
    pub async fn commit_paths(
        &self,
        additions: &[String],
        removals: &[String],
        message: &str,
    ) -> Result<CommitSummary, SyncError> {
        let additions = additions.to_vec();
        let removals = removals.to_vec();
        let author = self.shared.options.author.clone();
        let commit_message = message.to_string();
        let mut locked = self.lock().await;
        self.begin(Operation::Committing);

        let result = locked
            .call(move |b| {
                b.unstage_all().map_err(git(Phase::Stage))?;
                b.stage(&additions, false).map_err(git(Phase::Stage))?;
                b.stage(&removals, true).map_err(git(Phase::Stage))?;
                let staged = b.staged_paths().map_err(git(Phase::Commit))?;
                let commit = b
                    .commit(&commit_message, &author)
                    .map_err(git(Phase::Commit))?;
                let dirty = !b.changed_files(None).map_err(git(Phase::Commit))?.is_empty();
                Ok((commit, staged.len(), dirty))
            })
            .await
            .map(|(commit, staged, dirty)| {
                self.shared.status.update(|s| s.has_local_changes = dirty);
                CommitSummary {
                    paths_committed: if commit.is_some() { staged } else { 0 },
                    commit,
                    message: message.to_string(),
                }
            });
        let result = self.finish(result);

        if let Ok(CommitSummary {
            commit: Some(commit),
            paths_committed,
            ..
        }) = &result
        {
            tracing::info!(commit = %commit.short(8), paths = paths_committed, "committed");
            self.request_push();
        }
        result
    }

    /// Discard uncommitted changes under `paths` (everything if `None`).
    pub async fn reset_files(&self, paths: Option<&[String]>) -> Result<(), SyncError> {
        let paths = paths.map(<[String]>::to_vec);
        let mut locked = self.lock().await;
        let result = locked
            .call(move |b| {
                b.reset_files(paths.as_deref()).map_err(git(Phase::Reset))?;
                Ok(!b.changed_files(None).map_err(git(Phase::Reset))?.is_empty())
            })
            .await
            .map(|dirty| {
                self.shared.status.update(|s| s.has_local_changes = dirty);
            });
        self.finish(result)
    }

    // =========================================================================
    // Remote integration
    // =========================================================================

    async fn pull_locked(&self, locked: &mut Locked<B>) -> Result<PullOutcome, SyncError> {
        let remote = self.remote_options().await?;
        let branch = self.branch().clone();

        let outcome = locked
            .call(move |b| {
                b.fetch(&branch, &remote).map_err(git(Phase::Fetch))?;
                let counts = b.ahead_behind(&branch).map_err(git(Phase::Fetch))?;
                match (counts.ahead, counts.behind) {
                    (0, 0) => Ok(PullOutcome::unchanged(RemoteRelation::Updated)),
                    (0, behind) => {
                        let changed_paths = b.fast_forward(&branch).map_err(git(Phase::Fetch))?;
                        Ok(PullOutcome {
                            relation: RemoteRelation::Updated,
                            fast_forwarded: behind,
                            changed_paths,
                        })
                    }
                    (_, 0) => Ok(PullOutcome::unchanged(RemoteRelation::Ahead)),
                    (ahead, behind) => Err(SyncError::DivergedHistory { ahead, behind }),
                }
            })
            .await?;

        tracing::debug!(
            relation = %outcome.relation,
            fast_forwarded = outcome.fast_forwarded,
            "pulled"
        );
        self.shared
            .status
            .update(|s| s.status_relative_to_local = Some(outcome.relation));
        Ok(outcome)
    }

    async fn push_locked(&self, locked: &mut Locked<B>) -> Result<(), SyncError> {
        let remote = self.remote_options().await?;
        let branch = self.branch().clone();

        self.shared.push_pending.store(false, Ordering::SeqCst);
        let result = locked
            .call(move |b| b.push(&branch, &remote).map_err(git(Phase::Push)))
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(branch = %self.branch(), "pushed");
                self.shared
                    .status
                    .update(|s| s.status_relative_to_local = Some(RemoteRelation::Updated));
                Ok(())
            }
            Err(err) => {
                self.shared.push_pending.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Fetch and fast-forward.
    ///
    /// # Errors
    ///
    /// - [`SyncError::DivergedHistory`] if both sides have new commits;
    ///   local commits are left untouched
    /// - [`SyncError::MergeConflict`] if the fast-forward would overwrite
    ///   uncommitted edits; nothing is changed
    pub async fn pull(&self) -> Result<PullOutcome, SyncError> {
        let mut locked = self.lock().await;
        self.begin(Operation::Pulling);
        let result = self.pull_locked(&mut locked).await;
        let result = self.settle_remote(result).await;
        self.finish(result)
    }

    /// Push the branch to origin.
    pub async fn push(&self) -> Result<(), SyncError> {
        let mut locked = self.lock().await;
        self.begin(Operation::Pushing);
        let result = self.push_locked(&mut locked).await;
        let result = self.settle_remote(result).await;
        self.finish(result)
    }

    /// Pull, then push if local commits are ahead or a push was requested.
    ///
    /// A push the remote rejects is retried once after one more pull; a
    /// second rejection is returned with the push request still pending.
    pub async fn synchronize(&self) -> Result<SyncReport, SyncError> {
        let mut locked = self.lock().await;
        self.begin(Operation::Pulling);
        let result = self.synchronize_locked(&mut locked).await;
        let result = self.settle_remote(result).await;
        if result.is_ok() {
            self.shared
                .status
                .update(|s| s.last_synchronized = Some(Utc::now()));
        }
        self.finish(result)
    }

    async fn synchronize_locked(&self, locked: &mut Locked<B>) -> Result<SyncReport, SyncError> {
        let pull = self.pull_locked(locked).await?;
        let wants_push = pull.relation == RemoteRelation::Ahead
            || self.shared.push_pending.load(Ordering::SeqCst);
        if !wants_push {
            return Ok(SyncReport {
                pull,
                pushed: false,
                retried_after_rejection: false,
            });
        }

        self.begin(Operation::Pushing);
        match self.push_locked(locked).await {
            Ok(()) => Ok(SyncReport {
                pull,
                pushed: true,
                retried_after_rejection: false,
            }),
            Err(SyncError::Rejected(reason)) => {
                tracing::info!(%reason, "push rejected, pulling before one retry");
                self.begin(Operation::Pulling);
                let pull = self.pull_locked(locked).await?;
                self.begin(Operation::Pushing);
                self.push_locked(locked).await?;
                Ok(SyncReport {
                    pull,
                    pushed: true,
                    retried_after_rejection: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Ask the background worker to push. Never blocks.
    pub fn request_push(&self) {
        self.shared.push_pending.store(true, Ordering::SeqCst);
        self.shared.push_wakeup.notify_one();
    }

    /// Whether a push has been requested and not yet completed.
    pub fn push_pending(&self) -> bool {
        self.shared.push_pending.load(Ordering::SeqCst)
    }

    /// Spawn the worker that honors push requests and synchronizes every
    /// `interval`. Calling it again while a worker runs has no effect.
    pub fn start_background(&self, interval: Duration) {
        let mut worker = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }
        let engine = self.clone();
        *worker = Some(tokio::spawn(async move { engine.run_worker(interval).await }));
    }

    async fn run_worker(self, interval: Duration) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "background sync started");

        loop {
            tokio::select! {
                _ = self.shared.shutdown.notified() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.synchronize().await {
                        tracing::warn!(error = %err, "background synchronization failed");
                    }
                }
                _ = self.shared.push_wakeup.notified() => self.drain_push_requests().await,
            }
        }
        tracing::debug!("background sync stopped");
    }

    async fn drain_push_requests(&self) {
        while self.shared.push_pending.load(Ordering::SeqCst) {
            if let Err(err) = self.push().await {
                tracing::warn!(error = %err, "requested push failed, retrying on next sync");
                break;
            }
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Whether anything differs from HEAD. Updates `hasLocalChanges`.
    pub async fn check_uncommitted(&self) -> Result<bool, SyncError> {
        let mut locked = self.lock().await;
        self.begin(Operation::Checking);
        let result = locked
            .call(|b| Ok(!b.changed_files(None).map_err(git(Phase::Read))?.is_empty()))
            .await
            .map(|dirty| {
                self.shared.status.update(|s| s.has_local_changes = dirty);
                dirty
            });
        self.finish(result)
    }

    /// Uncommitted paths, optionally limited to `pathspecs`, sorted.
    pub async fn list_changed_files(
        &self,
        pathspecs: Option<&[String]>,
    ) -> Result<Vec<String>, SyncError> {
        let pathspecs = pathspecs.map(<[String]>::to_vec);
        let mut locked = self.lock().await;
        locked
            .call(move |b| {
                b.changed_files(pathspecs.as_deref())
                    .map_err(git(Phase::Read))
            })
            .await
    }

    /// Commits not yet on the remote, newest first.
    pub async fn list_local_commits(&self) -> Result<Vec<CommitId>, SyncError> {
        let branch = self.branch().clone();
        let mut locked = self.lock().await;
        locked
            .call(move |b| b.local_commits(&branch).map_err(git(Phase::Read)))
            .await
    }

    /// Content of `path` as of `commit`.
    pub async fn read_file_blob_at_commit(
        &self,
        path: &str,
        commit: &CommitId,
    ) -> Result<Vec<u8>, SyncError> {
        let (path, commit) = (path.to_string(), commit.clone());
        let mut locked = self.lock().await;
        locked
            .call(move |b| b.blob_at_commit(&path, &commit).map_err(git(Phase::Read)))
            .await
    }

    /// File names directly inside `dir` as of `commit`.
    pub async fn list_files_at_commit(
        &self,
        dir: &str,
        commit: &CommitId,
    ) -> Result<Vec<String>, SyncError> {
        let (dir, commit) = (dir.to_string(), commit.clone());
        let mut locked = self.lock().await;
        locked
            .call(move |b| {
                b.list_tree_at_commit(&dir, &commit)
                    .map_err(git(Phase::Read))
            })
            .await
    }

    // =========================================================================
    // Credentials and status
    // =========================================================================

    /// Replace the session password. A password re-enables network calls.
    pub fn set_password(&self, password: Option<Password>) {
        let has_password = password.is_some();
        let needs_password = {
            let mut creds = self.write_creds();
            creds.set_password(password);
            creds.needs_password
        };
        self.shared.remember_on_success.store(
            has_password && self.shared.provider.is_some(),
            Ordering::SeqCst,
        );
        self.shared
            .status
            .update(|s| s.needs_password = needs_password);
    }

    pub fn needs_password(&self) -> bool {
        self.read_creds().needs_password
    }

    pub fn username(&self) -> String {
        self.read_creds().username().to_string()
    }

    /// URL `origin` currently points at.
    pub async fn origin_url(&self) -> Result<Option<String>, SyncError> {
        let mut locked = self.lock().await;
        locked
            .call(|b| b.remote_url(ORIGIN).map_err(git(Phase::Config)))
            .await
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.status.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    pub fn status_reporter(&self) -> &StatusReporter {
        &self.shared.status
    }
}
