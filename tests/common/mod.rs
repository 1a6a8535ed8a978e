//! Shared fixtures for the integration tests.
//!
//! - [`FakeBackend`]: in-memory VCS that detects overlapping calls, counts
//!   network operations and returns injected errors
//! - [`RemoteFixture`]: a bare remote repository created with the git CLI

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tempfile::TempDir;

use gitshelf::core::types::{BranchName, CommitId};
use gitshelf::git::{AheadBehind, Author, GitError, RemoteOptions, VcsBackend};
use gitshelf::sync::{EngineOptions, RepositoryLocation};

// =============================================================================
// Engine options
// =============================================================================

pub fn engine_options(work_dir: impl Into<PathBuf>, remote_url: &str) -> EngineOptions {
    EngineOptions {
        location: RepositoryLocation {
            work_dir: work_dir.into(),
            remote_url: remote_url.to_string(),
            upstream_url: None,
            proxy_url: None,
            branch: BranchName::new("main").unwrap(),
        },
        author: Author {
            name: "Test User".into(),
            email: "test@example.com".into(),
        },
        username: "alice".into(),
        network_timeout: Duration::from_secs(30),
    }
}

// =============================================================================
// Fake backend
// =============================================================================

/// Counters and injected behavior of a [`FakeBackend`].
#[derive(Default)]
pub struct FakeState {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
    commits: AtomicUsize,
    pub fetch_errors: Mutex<VecDeque<GitError>>,
    pub push_errors: Mutex<VecDeque<GitError>>,
    pub ahead_behind: Mutex<AheadBehind>,
    pub changed: Mutex<Vec<String>>,
    pub initialized: Mutex<bool>,
    /// Clone URLs that fail with the paired error
    pub clone_failures: Mutex<Vec<(String, GitError)>>,
    /// Every `set_remote_url` call, in order
    pub remotes_set: Mutex<Vec<(String, String)>>,
    pub last_password: Mutex<Option<String>>,
    /// How long each call holds the backend
    pub call_delay: Mutex<Duration>,
    /// How long a push takes
    pub push_delay: Mutex<Duration>,
    /// How long a reset takes
    pub reset_delay: Mutex<Duration>,
    unstaged: AtomicUsize,
}

impl FakeState {
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn set_ahead_behind(&self, ahead: usize, behind: usize) {
        *self.ahead_behind.lock().unwrap() = AheadBehind { ahead, behind };
    }

    pub fn fail_next_fetch(&self, err: GitError) {
        self.fetch_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_next_push(&self, err: GitError) {
        self.push_errors.lock().unwrap().push_back(err);
    }

    pub fn unstage_calls(&self) -> usize {
        self.unstaged.load(Ordering::SeqCst)
    }

    pub fn last_password(&self) -> Option<String> {
        self.last_password.lock().unwrap().clone()
    }
}

/// Marks one backend call as running.
struct Active<'a>(&'a FakeState);

impl<'a> Active<'a> {
    fn enter(state: &'a FakeState) -> Self {
        state.calls.fetch_add(1, Ordering::SeqCst);
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(now, Ordering::SeqCst);
        let delay = *state.call_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Active(state)
    }
}

impl Drop for Active<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// VCS backend without a repository behind it.
pub struct FakeBackend {
    work_dir: PathBuf,
    state: std::sync::Arc<FakeState>,
}

impl FakeBackend {
    pub fn new(work_dir: impl Into<PathBuf>) -> (Self, std::sync::Arc<FakeState>) {
        let state = std::sync::Arc::new(FakeState::default());
        (
            Self {
                work_dir: work_dir.into(),
                state: std::sync::Arc::clone(&state),
            },
            state,
        )
    }

    fn record_password(&self, remote: &RemoteOptions) {
        *self.state.last_password.lock().unwrap() =
            remote.password.as_ref().map(|p| p.expose().to_string());
    }
}

impl VcsBackend for FakeBackend {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn is_initialized(&self) -> bool {
        let _active = Active::enter(&self.state);
        *self.state.initialized.lock().unwrap()
    }

    fn clone_into(
        &self,
        url: &str,
        dest: &Path,
        _branch: &BranchName,
        _remote: &RemoteOptions,
    ) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        let mut failures = self.state.clone_failures.lock().unwrap();
        if let Some(i) = failures.iter().position(|(u, _)| u == url) {
            return Err(failures.remove(i).1);
        }
        std::fs::create_dir_all(dest.join(".git"))?;
        *self.state.initialized.lock().unwrap() = true;
        Ok(())
    }

    fn remote_url(&self, _name: &str) -> Result<Option<String>, GitError> {
        let _active = Active::enter(&self.state);
        Ok(None)
    }

    fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        self.state
            .remotes_set
            .lock()
            .unwrap()
            .push((name.to_string(), url.to_string()));
        Ok(())
    }

    fn config_get(&self, _key: &str) -> Result<Option<String>, GitError> {
        let _active = Active::enter(&self.state);
        Ok(None)
    }

    fn config_set(&self, _key: &str, _value: &str) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        Ok(())
    }

    fn stage(&self, _paths: &[String], _removing: bool) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        Ok(())
    }

    fn unstage_all(&self) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        self.state.unstaged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn staged_paths(&self) -> Result<Vec<String>, GitError> {
        let _active = Active::enter(&self.state);
        Ok(self.state.changed.lock().unwrap().clone())
    }

    fn commit(&self, _message: &str, _author: &Author) -> Result<Option<CommitId>, GitError> {
        let _active = Active::enter(&self.state);
        let mut changed = self.state.changed.lock().unwrap();
        if changed.is_empty() {
            return Ok(None);
        }
        changed.clear();
        let n = self.state.commits.fetch_add(1, Ordering::SeqCst) + 1;
        let id = CommitId::new(format!("{:040x}", n)).map_err(|e| GitError::Internal(e.to_string()))?;
        Ok(Some(id))
    }

    fn fetch(&self, _branch: &BranchName, remote: &RemoteOptions) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        self.record_password(remote);
        match self.state.fetch_errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ahead_behind(&self, _branch: &BranchName) -> Result<AheadBehind, GitError> {
        let _active = Active::enter(&self.state);
        Ok(*self.state.ahead_behind.lock().unwrap())
    }

    fn fast_forward(&self, _branch: &BranchName) -> Result<Vec<String>, GitError> {
        let _active = Active::enter(&self.state);
        self.state.ahead_behind.lock().unwrap().behind = 0;
        Ok(Vec::new())
    }

    fn push(&self, _branch: &BranchName, remote: &RemoteOptions) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        self.state.pushes.fetch_add(1, Ordering::SeqCst);
        self.record_password(remote);
        let delay = *self.state.push_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        match self.state.push_errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => {
                self.state.ahead_behind.lock().unwrap().ahead = 0;
                Ok(())
            }
        }
    }

    fn reset_files(&self, _paths: Option<&[String]>) -> Result<(), GitError> {
        let _active = Active::enter(&self.state);
        let delay = *self.state.reset_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.state.changed.lock().unwrap().clear();
        Ok(())
    }

    fn changed_files(&self, _pathspecs: Option<&[String]>) -> Result<Vec<String>, GitError> {
        let _active = Active::enter(&self.state);
        Ok(self.state.changed.lock().unwrap().clone())
    }

    fn local_commits(&self, _branch: &BranchName) -> Result<Vec<CommitId>, GitError> {
        let _active = Active::enter(&self.state);
        Ok(Vec::new())
    }

    fn blob_at_commit(&self, path: &str, _commit: &CommitId) -> Result<Vec<u8>, GitError> {
        let _active = Active::enter(&self.state);
        Err(GitError::NotFound(path.to_string()))
    }

    fn list_tree_at_commit(&self, dir: &str, _commit: &CommitId) -> Result<Vec<String>, GitError> {
        let _active = Active::enter(&self.state);
        Err(GitError::NotFound(dir.to_string()))
    }
}

// =============================================================================
// Real repositories
// =============================================================================

pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Remote User")
        .env("GIT_AUTHOR_EMAIL", "remote@example.com")
        .env("GIT_COMMITTER_NAME", "Remote User")
        .env("GIT_COMMITTER_EMAIL", "remote@example.com")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare remote with one commit on `main`, plus a scratch clone used to
/// push changes "from another device".
pub struct RemoteFixture {
    root: TempDir,
}

impl RemoteFixture {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp dir");
        let bare = root.path().join("remote.git");
        std::fs::create_dir_all(&bare).unwrap();
        run_git(&bare, &["init", "--bare", "-b", "main"]);

        let seed = root.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        run_git(&seed, &["init", "-b", "main"]);
        std::fs::create_dir_all(seed.join("items")).unwrap();
        std::fs::write(seed.join("items/seed.yaml"), "title: Seed\n").unwrap();
        run_git(&seed, &["add", "."]);
        run_git(&seed, &["commit", "-m", "seed"]);
        run_git(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]);
        run_git(&seed, &["push", "origin", "main"]);

        Self { root }
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.root.path().join("remote.git").display())
    }

    pub fn bare_path(&self) -> PathBuf {
        self.root.path().join("remote.git")
    }

    /// Working directory path for an engine, not created yet.
    pub fn work_dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Commit `content` at `path` from the scratch clone and push it.
    pub fn push_from_elsewhere(&self, path: &str, content: &str, message: &str) {
        let seed = self.root.path().join("seed");
        run_git(&seed, &["pull", "--ff-only", "origin", "main"]);
        let file = seed.join(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&file, content).unwrap();
        run_git(&seed, &["add", path]);
        run_git(&seed, &["commit", "-m", message]);
        run_git(&seed, &["push", "origin", "main"]);
    }

    /// Current commit of `main` on the remote.
    pub fn remote_head(&self) -> String {
        run_git(&self.bare_path(), &["rev-parse", "main"])
    }
}
