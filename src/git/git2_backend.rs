//! git::git2_backend
//!
//! [`VcsBackend`] over libgit2.
//!
//! The repository is reopened for every call. `git2::Repository` is not
//! `Sync`, and reopening keeps the backend shareable across the blocking
//! pool without holding handles between serialized operations.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    ConfigLevel, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, IndexAddOption,
    ObjectType, Oid, ProxyOptions, PushOptions, RemoteCallbacks, Repository, Signature, Sort,
    Status, StatusOptions, Tree,
};

use super::interface::{AheadBehind, Author, GitError, RemoteOptions, VcsBackend, ORIGIN};
use crate::core::paths::{normalize_relative, validate_relative};
use crate::core::types::{BranchName, CommitId};

/// Credential callbacks tolerated before giving up on a remote.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 1;

impl GitError {
    /// Normalize a local libgit2 failure.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match (err.code(), err.class()) {
            (ErrorCode::NotFound, _) | (ErrorCode::UnbornBranch, _) => {
                GitError::NotFound(format!("{}: {}", context, err.message()))
            }
            (ErrorCode::Conflict, _) | (ErrorCode::MergeConflict, _) => {
                GitError::Conflict(format!("{}: {}", context, err.message()))
            }
            (ErrorCode::NotFastForward, _) => GitError::NotFastForward(err.message().to_string()),
            (ErrorCode::Auth, _) => GitError::Auth(err.message().to_string()),
            (_, ErrorClass::Config) if err.message().contains("invalid config item name") => {
                GitError::InvalidConfigKey(context.to_string())
            }
            _ => GitError::Internal(format!("{}: {}", context, err.message())),
        }
    }

    /// Normalize a failure during fetch, push or clone.
    fn from_remote(err: git2::Error, context: &str) -> Self {
        let message = err.message().to_ascii_lowercase();
        match (err.code(), err.class()) {
            (ErrorCode::Auth, _) => GitError::Auth(err.message().to_string()),
            (_, ErrorClass::Http | ErrorClass::Ssh)
                if message.contains("authentication")
                    || message.contains("401")
                    || message.contains("403") =>
            {
                GitError::Auth(err.message().to_string())
            }
            (ErrorCode::NotFastForward, _) => GitError::NotFastForward(err.message().to_string()),
            (ErrorCode::User, _) => {
                GitError::Network(format!("{}: transfer aborted after deadline", context))
            }
            (ErrorCode::Certificate, _)
            | (_, ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh)
            | (_, ErrorClass::Os) => GitError::Network(format!("{}: {}", context, err.message())),
            (ErrorCode::NotFound, _) | (_, ErrorClass::Repository) => {
                GitError::Network(format!("{}: remote unavailable: {}", context, err.message()))
            }
            _ => Self::from_git2(err, context),
        }
    }
}

fn auth_error(message: &str) -> git2::Error {
    git2::Error::new(ErrorCode::Auth, ErrorClass::Callback, message)
}

fn commit_id(oid: Oid) -> Result<CommitId, GitError> {
    CommitId::new(oid.to_string()).map_err(|e| GitError::Internal(e.to_string()))
}

fn checked_paths(paths: &[String]) -> Result<Vec<String>, GitError> {
    paths
        .iter()
        .map(|p| {
            validate_relative(p).map_err(|e| GitError::InvalidPath(e.to_string()))?;
            Ok(normalize_relative(p))
        })
        .collect()
}

/// Callbacks shared by every network operation.
///
/// Transfers abort once `remote.timeout` has elapsed. Credentials are
/// offered once; a second request means the remote rejected them.
fn remote_callbacks(remote: &RemoteOptions) -> RemoteCallbacks<'_> {
    let deadline = Instant::now() + remote.timeout;
    let mut attempts = 0u32;

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(auth_error("credentials rejected by remote"));
        }
        let username = username_from_url.unwrap_or(remote.username.as_str());
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return match &remote.password {
                Some(password) => Cred::userpass_plaintext(&remote.username, password.expose()),
                None => Err(auth_error("password required")),
            };
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username);
        }
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(username);
        }
        Cred::default()
    });
    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    callbacks.sideband_progress(move |_| Instant::now() < deadline);
    callbacks.push_negotiation(move |_| {
        if Instant::now() < deadline {
            Ok(())
        } else {
            Err(git2::Error::new(
                ErrorCode::User,
                ErrorClass::Callback,
                "deadline exceeded",
            ))
        }
    });
    callbacks
}

fn proxy_options(remote: &RemoteOptions) -> ProxyOptions<'_> {
    let mut proxy = ProxyOptions::new();
    match &remote.proxy_url {
        Some(url) => {
            proxy.url(url);
        }
        None => {
            proxy.auto();
        }
    }
    proxy
}

fn fetch_options(remote: &RemoteOptions) -> FetchOptions<'_> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(remote_callbacks(remote));
    fetch.proxy_options(proxy_options(remote));
    fetch
}

fn head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, GitError> {
    match repo.head() {
        Ok(head) => {
            let tree = head
                .peel_to_tree()
                .map_err(|e| GitError::from_git2(e, "HEAD"))?;
            Ok(Some(tree))
        }
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(GitError::from_git2(e, "HEAD")),
    }
}

fn head_oid(repo: &Repository) -> Result<Option<Oid>, GitError> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(GitError::from_git2(e, "HEAD")),
    }
}

fn try_ref(repo: &Repository, refname: &str) -> Result<Option<Oid>, GitError> {
    match repo.refname_to_id(refname) {
        Ok(oid) => Ok(Some(oid)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(GitError::from_git2(e, refname)),
    }
}

fn count_commits(repo: &Repository, tip: Oid, hide: Option<Oid>) -> Result<usize, GitError> {
    let mut walk = repo
        .revwalk()
        .map_err(|e| GitError::from_git2(e, "revwalk"))?;
    walk.push(tip).map_err(|e| GitError::from_git2(e, "revwalk"))?;
    if let Some(hide) = hide {
        walk.hide(hide).map_err(|e| GitError::from_git2(e, "revwalk"))?;
    }
    Ok(walk.count())
}

fn diff_paths(diff: &git2::Diff<'_>) -> Vec<String> {
    let mut paths: Vec<String> = diff
        .deltas()
        .filter_map(|delta| {
            delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

/// Remove empty directories from `rel`'s parent up to (not including) `root`.
fn prune_empty_parents(root: &Path, rel: &str) {
    let mut current = Path::new(rel).parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            break;
        }
        // Stops at the first non-empty directory.
        if fs::remove_dir(root.join(dir)).is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// libgit2-backed repository operations for one working directory.
#[derive(Debug, Clone)]
pub struct Git2Backend {
    work_dir: PathBuf,
}

impl Git2Backend {
    /// Backend for the repository at `work_dir` (which may not exist yet).
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    fn open(&self) -> Result<Repository, GitError> {
        let repo = Repository::open(&self.work_dir).map_err(|_| GitError::NotARepo {
            path: self.work_dir.clone(),
        })?;
        if repo.is_bare() {
            return Err(GitError::NotARepo {
                path: self.work_dir.clone(),
            });
        }
        Ok(repo)
    }

    fn statuses(
        &self,
        repo: &Repository,
        pathspecs: Option<&[String]>,
    ) -> Result<Vec<(String, Status)>, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(false);
        if let Some(specs) = pathspecs {
            for spec in checked_paths(specs)? {
                opts.pathspec(spec);
            }
        }

        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, "status"))?;

        let mut entries: Vec<(String, Status)> = statuses
            .iter()
            .filter(|entry| {
                let status = entry.status();
                status != Status::CURRENT && !status.contains(Status::IGNORED)
            })
            .filter_map(|entry| entry.path().map(|p| (p.to_string(), entry.status())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);
        Ok(entries)
    }

    /// Point `branch` at the remote-tracking commit if there is one, or
    /// leave it unborn for an empty remote.
    fn attach_branch(repo: &Repository, branch: &BranchName) -> Result<(), GitError> {
        let local_ref = branch.local_ref();
        if let Some(remote_oid) = try_ref(repo, &branch.remote_ref(ORIGIN))? {
            if try_ref(repo, &local_ref)?.is_none() {
                repo.reference(&local_ref, remote_oid, false, "gitshelf: create branch")
                    .map_err(|e| GitError::from_git2(e, &local_ref))?;
            }
            repo.set_head(&local_ref)
                .map_err(|e| GitError::from_git2(e, &local_ref))?;
            repo.checkout_head(Some(CheckoutBuilder::new().force()))
                .map_err(|e| GitError::from_git2(e, "checkout"))?;
        } else {
            repo.set_head(&local_ref)
                .map_err(|e| GitError::from_git2(e, &local_ref))?;
        }

        let mut config = repo
            .config()
            .map_err(|e| GitError::from_git2(e, "config"))?;
        config
            .set_str(&format!("branch.{}.remote", branch), ORIGIN)
            .map_err(|e| GitError::from_git2(e, "branch.remote"))?;
        config
            .set_str(&format!("branch.{}.merge", branch), &local_ref)
            .map_err(|e| GitError::from_git2(e, "branch.merge"))?;
        Ok(())
    }
}

impl VcsBackend for Git2Backend {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn is_initialized(&self) -> bool {
        self.work_dir.join(".git").is_dir() && self.open().is_ok()
    }

    fn clone_into(
        &self,
        url: &str,
        dest: &Path,
        branch: &BranchName,
        remote: &RemoteOptions,
    ) -> Result<(), GitError> {
        if dest.exists() {
            return Err(GitError::AlreadyExists(dest.to_path_buf()));
        }
        tracing::debug!(url, dest = %dest.display(), "cloning");

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options(remote));
        let repo = builder
            .clone(url, dest)
            .map_err(|e| GitError::from_remote(e, "clone"))?;

        Self::attach_branch(&repo, branch)
    }

    fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        let repo = self.open()?;
        let url = match repo.find_remote(name) {
            Ok(remote) => remote.url().map(str::to_string),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => None,
            Err(e) => return Err(GitError::from_git2(e, name)),
        };
        Ok(url)
    }

    fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        let repo = self.open()?;
        if repo.find_remote(name).is_ok() {
            repo.remote_set_url(name, url)
                .map_err(|e| GitError::from_git2(e, name))?;
        } else {
            repo.remote(name, url)
                .map_err(|e| GitError::from_git2(e, name))?;
        }
        Ok(())
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        super::validate_config_key(key)?;
        let repo = self.open()?;
        let config = repo
            .config()
            .map_err(|e| GitError::from_git2(e, "config"))?;
        match config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, key)),
        }
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        super::validate_config_key(key)?;
        let repo = self.open()?;
        let mut config = repo
            .config()
            .and_then(|c| c.open_level(ConfigLevel::Local))
            .map_err(|e| GitError::from_git2(e, "config"))?;
        config
            .set_str(key, value)
            .map_err(|e| GitError::from_git2(e, key))
    }

    fn stage(&self, paths: &[String], removing: bool) -> Result<(), GitError> {
        let paths = checked_paths(paths)?;
        if paths.is_empty() {
            return Ok(());
        }
        let repo = self.open()?;
        let mut index = repo.index().map_err(|e| GitError::from_git2(e, "index"))?;

        if removing {
            index
                .remove_all(paths.iter().map(String::as_str), None)
                .map_err(|e| GitError::from_git2(e, "index remove"))?;
        } else {
            if let Some(missing) = paths.iter().find(|p| !self.work_dir.join(p).exists()) {
                return Err(GitError::NotFound(missing.clone()));
            }
            index
                .add_all(paths.iter().map(String::as_str), IndexAddOption::DEFAULT, None)
                .map_err(|e| GitError::from_git2(e, "index add"))?;
            // Picks up files deleted inside staged directories.
            index
                .update_all(paths.iter().map(String::as_str), None)
                .map_err(|e| GitError::from_git2(e, "index update"))?;
        }

        index
            .write()
            .map_err(|e| GitError::from_git2(e, "index write"))
    }

    fn unstage_all(&self) -> Result<(), GitError> {
        let repo = self.open()?;
        let mut index = repo.index().map_err(|e| GitError::from_git2(e, "index"))?;
        match head_tree(&repo)? {
            Some(tree) => index
                .read_tree(&tree)
                .map_err(|e| GitError::from_git2(e, "index reset"))?,
            None => index
                .clear()
                .map_err(|e| GitError::from_git2(e, "index clear"))?,
        }
        index
            .write()
            .map_err(|e| GitError::from_git2(e, "index write"))
    }

    fn staged_paths(&self) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        let index = repo.index().map_err(|e| GitError::from_git2(e, "index"))?;
        let tree = head_tree(&repo)?;
        let diff = repo
            .diff_tree_to_index(tree.as_ref(), Some(&index), None)
            .map_err(|e| GitError::from_git2(e, "diff"))?;
        Ok(diff_paths(&diff))
    }

    fn commit(&self, message: &str, author: &Author) -> Result<Option<CommitId>, GitError> {
        if self.staged_paths()?.is_empty() {
            return Ok(None);
        }

        let repo = self.open()?;
        let mut index = repo.index().map_err(|e| GitError::from_git2(e, "index"))?;
        let tree_oid = index
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "write tree"))?;
        let tree = repo
            .find_tree(tree_oid)
            .map_err(|e| GitError::from_git2(e, "tree"))?;
        let signature = Signature::now(&author.name, &author.email)
            .map_err(|e| GitError::from_git2(e, "signature"))?;

        let parent = match head_oid(&repo)? {
            Some(oid) => Some(
                repo.find_commit(oid)
                    .map_err(|e| GitError::from_git2(e, "HEAD"))?,
            ),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(|e| GitError::from_git2(e, "commit"))?;
        commit_id(oid).map(Some)
    }

    fn fetch(&self, branch: &BranchName, remote: &RemoteOptions) -> Result<(), GitError> {
        let repo = self.open()?;
        let mut origin = repo
            .find_remote(ORIGIN)
            .map_err(|e| GitError::from_git2(e, ORIGIN))?;
        let refspec = format!("+refs/heads/*:refs/remotes/{}/*", ORIGIN);
        tracing::debug!(branch = %branch, "fetching");

        let mut opts = fetch_options(remote);
        opts.prune(git2::FetchPrune::On);
        origin
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(|e| GitError::from_remote(e, "fetch"))
    }

    fn ahead_behind(&self, branch: &BranchName) -> Result<AheadBehind, GitError> {
        let repo = self.open()?;
        let local = head_oid(&repo)?;
        let remote = try_ref(&repo, &branch.remote_ref(ORIGIN))?;

        let counts = match (local, remote) {
            (None, None) => AheadBehind::default(),
            (Some(local), None) => AheadBehind {
                ahead: count_commits(&repo, local, None)?,
                behind: 0,
            },
            (None, Some(remote)) => AheadBehind {
                ahead: 0,
                behind: count_commits(&repo, remote, None)?,
            },
            (Some(local), Some(remote)) => {
                let (ahead, behind) = repo
                    .graph_ahead_behind(local, remote)
                    .map_err(|e| GitError::from_git2(e, "ahead/behind"))?;
                AheadBehind { ahead, behind }
            }
        };
        Ok(counts)
    }

    fn fast_forward(&self, branch: &BranchName) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        let remote_ref = branch.remote_ref(ORIGIN);
        let target_oid = try_ref(&repo, &remote_ref)?
            .ok_or_else(|| GitError::NotFound(remote_ref.clone()))?;
        let target = repo
            .find_commit(target_oid)
            .map_err(|e| GitError::from_git2(e, &remote_ref))?;
        let target_tree = target
            .tree()
            .map_err(|e| GitError::from_git2(e, &remote_ref))?;
        let old_tree = head_tree(&repo)?;

        let changed = {
            let diff = repo
                .diff_tree_to_tree(old_tree.as_ref(), Some(&target_tree), None)
                .map_err(|e| GitError::from_git2(e, "diff"))?;
            diff_paths(&diff)
        };

        // Safe checkout refuses before writing anything if local edits
        // would be overwritten.
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        repo.checkout_tree(target.as_object(), Some(&mut checkout))
            .map_err(|e| match e.code() {
                ErrorCode::Conflict | ErrorCode::MergeConflict => GitError::Conflict(format!(
                    "fast-forward would overwrite local changes: {}",
                    e.message()
                )),
                _ => GitError::from_git2(e, "checkout"),
            })?;

        let local_ref = branch.local_ref();
        repo.reference(&local_ref, target_oid, true, "gitshelf: fast-forward")
            .map_err(|e| GitError::from_git2(e, &local_ref))?;
        repo.set_head(&local_ref)
            .map_err(|e| GitError::from_git2(e, &local_ref))?;

        Ok(changed)
    }

    fn push(&self, branch: &BranchName, remote: &RemoteOptions) -> Result<(), GitError> {
        let repo = self.open()?;
        let local_ref = branch.local_ref();
        if try_ref(&repo, &local_ref)?.is_none() {
            tracing::debug!(branch = %branch, "nothing to push, branch is unborn");
            return Ok(());
        }

        let mut origin = repo
            .find_remote(ORIGIN)
            .map_err(|e| GitError::from_git2(e, ORIGIN))?;
        let refspec = format!("{}:{}", local_ref, local_ref);
        let rejected: RefCell<Option<String>> = RefCell::new(None);

        {
            let mut callbacks = remote_callbacks(remote);
            callbacks.push_update_reference(|refname, status| {
                if let Some(reason) = status {
                    *rejected.borrow_mut() = Some(format!("{}: {}", refname, reason));
                }
                Ok(())
            });
            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            opts.proxy_options(proxy_options(remote));

            tracing::debug!(branch = %branch, "pushing");
            origin
                .push(&[refspec.as_str()], Some(&mut opts))
                .map_err(|e| GitError::from_remote(e, "push"))?;
        }

        match rejected.into_inner() {
            Some(reason) => Err(GitError::NotFastForward(reason)),
            None => {
                // Keep the remote-tracking ref current so ahead/behind is
                // accurate without another fetch.
                if let Some(oid) = try_ref(&repo, &local_ref)? {
                    let tracking = branch.remote_ref(ORIGIN);
                    repo.reference(&tracking, oid, true, "gitshelf: push")
                        .map_err(|e| GitError::from_git2(e, &tracking))?;
                }
                Ok(())
            }
        }
    }

    fn reset_files(&self, paths: Option<&[String]>) -> Result<(), GitError> {
        let repo = self.open()?;
        let entries = self.statuses(&repo, paths)?;
        if entries.is_empty() {
            return Ok(());
        }
        let tree = head_tree(&repo)?;

        let (tracked, untracked): (Vec<String>, Vec<String>) = entries
            .into_iter()
            .map(|(path, _)| path)
            .partition(|path| {
                tree.as_ref()
                    .map(|t| t.get_path(Path::new(path)).is_ok())
                    .unwrap_or(false)
            });

        if !untracked.is_empty() {
            let mut index = repo.index().map_err(|e| GitError::from_git2(e, "index"))?;
            for path in &untracked {
                // Not in the index when never staged.
                if let Err(err) = index.remove_path(Path::new(path)) {
                    if err.code() != ErrorCode::NotFound {
                        return Err(GitError::from_git2(err, "index remove"));
                    }
                }
                let absolute = self.work_dir.join(path);
                if absolute.is_file() {
                    fs::remove_file(&absolute)?;
                }
                prune_empty_parents(&self.work_dir, path);
            }
            index
                .write()
                .map_err(|e| GitError::from_git2(e, "index write"))?;
        }

        if !tracked.is_empty() {
            let head = repo
                .head()
                .and_then(|h| h.peel(ObjectType::Commit))
                .map_err(|e| GitError::from_git2(e, "HEAD"))?;
            repo.reset_default(Some(&head), tracked.iter().map(String::as_str))
                .map_err(|e| GitError::from_git2(e, "reset"))?;

            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            for path in &tracked {
                checkout.path(path.as_str());
            }
            repo.checkout_head(Some(&mut checkout))
                .map_err(|e| GitError::from_git2(e, "checkout"))?;
        }

        tracing::debug!(
            restored = tracked.len(),
            removed = untracked.len(),
            "reset files"
        );
        Ok(())
    }

    fn changed_files(&self, pathspecs: Option<&[String]>) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        Ok(self
            .statuses(&repo, pathspecs)?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
    }

    fn local_commits(&self, branch: &BranchName) -> Result<Vec<CommitId>, GitError> {
        let repo = self.open()?;
        let Some(head) = head_oid(&repo)? else {
            return Ok(Vec::new());
        };

        let mut walk = repo
            .revwalk()
            .map_err(|e| GitError::from_git2(e, "revwalk"))?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(|e| GitError::from_git2(e, "revwalk"))?;
        walk.push(head)
            .map_err(|e| GitError::from_git2(e, "revwalk"))?;
        if let Some(remote) = try_ref(&repo, &branch.remote_ref(ORIGIN))? {
            walk.hide(remote)
                .map_err(|e| GitError::from_git2(e, "revwalk"))?;
        }

        let commits = walk
            .map(|oid| {
                oid.map_err(|e| GitError::from_git2(e, "revwalk"))
                    .and_then(commit_id)
            })
            .collect();
        commits
    }

    fn blob_at_commit(&self, path: &str, commit: &CommitId) -> Result<Vec<u8>, GitError> {
        validate_relative(path).map_err(|e| GitError::InvalidPath(e.to_string()))?;
        let repo = self.open()?;
        let tree = commit_tree(&repo, commit)?;

        let entry = tree
            .get_path(Path::new(&normalize_relative(path)))
            .map_err(|_| GitError::NotFound(format!("{} at {}", path, commit.short(8))))?;
        let blob = entry
            .to_object(&repo)
            .and_then(|o| o.peel_to_blob())
            .map_err(|_| GitError::NotFound(format!("{} at {} is not a file", path, commit.short(8))))?;
        Ok(blob.content().to_vec())
    }

    fn list_tree_at_commit(&self, dir: &str, commit: &CommitId) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        let root = commit_tree(&repo, commit)?;

        let dir = normalize_relative(dir);
        let tree = if dir.is_empty() || dir == "." {
            root
        } else {
            validate_relative(&dir).map_err(|e| GitError::InvalidPath(e.to_string()))?;
            root.get_path(Path::new(&dir))
                .and_then(|entry| entry.to_object(&repo))
                .and_then(|o| o.peel_to_tree())
                .map_err(|_| GitError::NotFound(format!("{} at {}", dir, commit.short(8))))?
        };

        let mut names: Vec<String> = tree
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Blob))
            .filter_map(|entry| entry.name().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

fn commit_tree<'r>(repo: &'r Repository, commit: &CommitId) -> Result<Tree<'r>, GitError> {
    let oid = Oid::from_str(commit.as_str())
        .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
    repo.find_commit(oid)
        .and_then(|c| c.tree())
        .map_err(|_| GitError::NotFound(format!("commit {}", commit)))
}
