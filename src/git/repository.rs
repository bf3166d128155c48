//! Subprocess façade over the system `git` binary.
//!
//! Every operation shells out to `git` with an explicit environment and a
//! per-invocation timeout. Nothing here reads or writes git's object model
//! directly; the installed binary is the single source of git semantics.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::process::Stdio;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use super::env::GitEnvironment;
use super::error::GitError;
use super::refspec::Refspec;
use super::revision::{GitRevision, is_complete_sha1};

/// Default per-invocation timeout for git subprocesses.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Commit messages larger than this are passed through a file instead of
/// the command line, which has platform-dependent length limits.
const MAX_INLINE_COMMIT_MESSAGE: usize = 64 * 1024;

/// Local namespace for refs created while fetching a bare SHA-1.
const FETCH_REF_NAMESPACE: &str = "refs/gitferry_fetch";

const LOG_ENTRY_SEPARATOR: &str = "\u{1}\u{1}";
const LOG_FIELD_SEPARATOR: char = '\u{0}';
// NUL separators are spelled with git's `%x00` escape because a raw NUL
// byte cannot be passed in an argv string.
const LOG_FORMAT: &str =
    "--format=\u{1}\u{1}%H%x00%T%x00%P%x00%an <%ae>%x00%aI%x00%cn <%ce>%x00%cI%x00%B%x00";

/// Captured output of one git invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl CommandOutput {
    /// Standard output, lossily decoded as UTF-8.
    #[must_use]
    pub fn stdout(&self) -> &str {
        self.stdout.as_str()
    }

    /// Standard error, lossily decoded as UTF-8.
    #[must_use]
    pub fn stderr(&self) -> &str {
        self.stderr.as_str()
    }

    /// The subprocess exit code (-1 when killed by a signal).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Whether the subprocess exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Local ref state captured around a fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    before: BTreeMap<String, GitRevision>,
    after: BTreeMap<String, GitRevision>,
}

impl FetchResult {
    /// Local refs before the fetch.
    #[must_use]
    pub const fn before(&self) -> &BTreeMap<String, GitRevision> {
        &self.before
    }

    /// Local refs after the fetch.
    #[must_use]
    pub const fn after(&self) -> &BTreeMap<String, GitRevision> {
        &self.after
    }

    /// Refs created or moved by the fetch.
    #[must_use]
    pub fn changed(&self) -> BTreeMap<&str, &GitRevision> {
        self.after
            .iter()
            .filter(|(name, rev)| self.before.get(name.as_str()) != Some(rev))
            .map(|(name, rev)| (name.as_str(), rev))
            .collect()
    }
}

/// One commit parsed from `git log` output.
#[derive(Debug, Clone)]
pub struct GitLogEntry {
    /// Commit SHA-1.
    pub sha1: String,
    /// Tree SHA-1.
    pub tree: String,
    /// Parent SHA-1s, empty for a root commit.
    pub parents: Vec<String>,
    /// Author in `Name <email>` form.
    pub author: String,
    /// Author date.
    pub author_date: DateTime<FixedOffset>,
    /// Committer in `Name <email>` form.
    pub committer: String,
    /// Committer date.
    pub committer_date: DateTime<FixedOffset>,
    /// Full commit message with LF line endings.
    pub body: String,
    /// Touched files when the log was run with file listing enabled.
    pub files: Option<Vec<String>>,
}

/// One entry of `git status --porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFile {
    /// Status letter of the index side.
    pub index_status: char,
    /// Status letter of the work tree side.
    pub worktree_status: char,
    /// Path relative to the repository root.
    pub path: String,
    /// Original path for renames.
    pub renamed_from: Option<String>,
}

impl StatusFile {
    /// Whether this entry represents an unresolved merge conflict.
    #[must_use]
    pub const fn is_conflicted(&self) -> bool {
        matches!(
            (self.index_status, self.worktree_status),
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D')
        )
    }
}

/// Handle to a local git repository driven through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepository {
    git_dir: Utf8PathBuf,
    work_tree: Option<Utf8PathBuf>,
    env: GitEnvironment,
    timeout: Duration,
}

impl GitRepository {
    /// Handle to a bare repository at `git_dir`.
    #[must_use]
    pub const fn new_bare(git_dir: Utf8PathBuf, env: GitEnvironment) -> Self {
        Self {
            git_dir,
            work_tree: None,
            env,
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    /// Handle to a repository with a work tree; the git dir is the
    /// conventional `.git` inside it.
    #[must_use]
    pub fn with_work_tree(work_tree: Utf8PathBuf, env: GitEnvironment) -> Self {
        Self {
            git_dir: work_tree.join(".git"),
            work_tree: Some(work_tree),
            env,
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    /// Overrides the per-invocation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A handle sharing this git directory but staging against a
    /// different work tree.
    #[must_use]
    pub fn with_alternate_work_tree(&self, work_tree: Utf8PathBuf) -> Self {
        Self {
            git_dir: self.git_dir.clone(),
            work_tree: Some(work_tree),
            env: self.env.clone(),
            timeout: self.timeout,
        }
    }

    /// The git directory of this repository.
    #[must_use]
    pub fn git_dir(&self) -> &Utf8Path {
        self.git_dir.as_path()
    }

    /// The work tree, when this is not a bare repository.
    #[must_use]
    pub fn work_tree(&self) -> Option<&Utf8Path> {
        self.work_tree.as_deref()
    }

    /// Initialises the repository on disk (`git init`, bare when there is
    /// no work tree).
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git init` fails.
    pub async fn init(&self) -> Result<(), GitError> {
        let args: Vec<&str> = self.work_tree.as_ref().map_or_else(
            || vec!["init", "--bare", self.git_dir.as_str()],
            |work_tree| vec!["init", work_tree.as_str()],
        );
        let output = self.raw_git(&args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(GitError::repo(format!(
                "git init failed: {}",
                output.stderr().trim()
            )))
        }
    }

    /// Runs a git command in this repository, failing on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] on non-zero exit and
    /// [`GitError::Timeout`] when the invocation exceeds the configured
    /// timeout.
    pub async fn git(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        let output = self.git_allow_non_zero(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(GitError::repo(format!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr().trim()
            )))
        }
    }

    /// Runs a git command in this repository, returning output even on a
    /// non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when the process cannot be spawned and
    /// [`GitError::Timeout`] when the invocation exceeds the configured
    /// timeout.
    pub async fn git_allow_non_zero(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        self.exec(&self.env, args, None).await
    }

    pub(crate) async fn git_with_input(
        &self,
        input: &str,
        args: &[&str],
    ) -> Result<CommandOutput, GitError> {
        self.exec(&self.env, args, Some(input)).await
    }

    async fn raw_git(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        let mut command = Command::new(self.env.resolve_git_binary().as_str());
        command.env_clear();
        command.envs(self.env.environment());
        self.spawn_and_wait(command, args, None).await
    }

    async fn exec(
        &self,
        env: &GitEnvironment,
        args: &[&str],
        input: Option<&str>,
    ) -> Result<CommandOutput, GitError> {
        let mut command = Command::new(self.env.resolve_git_binary().as_str());
        command.arg("--git-dir").arg(self.git_dir.as_str());
        if let Some(work_tree) = &self.work_tree {
            command.arg("--work-tree").arg(work_tree.as_str());
            command.current_dir(work_tree.as_str());
        }
        command.env_clear();
        command.envs(env.environment());
        self.spawn_and_wait(command, args, input).await
    }

    async fn spawn_and_wait(
        &self,
        mut command: Command,
        args: &[&str],
        input: Option<&str>,
    ) -> Result<CommandOutput, GitError> {
        tracing::debug!(command = %args.join(" "), "running git");
        command
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command
            .spawn()
            .map_err(|err| GitError::repo(format!("failed to spawn git: {err}")))?;
        if let Some(data) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(data.as_bytes())
                    .await
                    .map_err(|err| GitError::repo(format!("failed to write git stdin: {err}")))?;
            }
        }
        let waited = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| GitError::Timeout {
                command: format!("git {}", args.join(" ")),
                seconds: self.timeout.as_secs(),
            })?;
        let output =
            waited.map_err(|err| GitError::repo(format!("failed to wait for git: {err}")))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Remote interaction.
impl GitRepository {
    /// Fetches `refspecs` from `url`, recording local ref state before and
    /// after.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::CannotResolveRevision`] when the remote does
    /// not have the requested refs, [`GitError::Validation`] for an
    /// invalid URL, and [`GitError::Repo`] for other fetch failures.
    pub async fn fetch(
        &self,
        url: &str,
        prune: bool,
        force: bool,
        refspecs: &[Refspec],
    ) -> Result<FetchResult, GitError> {
        let validated = Self::validate_url(url)?;
        let before = self.show_ref().await?;
        let mut args = vec!["fetch".to_owned()];
        if prune {
            args.push("--prune".to_owned());
        }
        args.push(validated);
        for refspec in refspecs {
            let spec = if force {
                refspec.with_allow_no_fast_forward()
            } else {
                refspec.clone()
            };
            args.push(spec.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.git_allow_non_zero(&arg_refs).await?;
        if !output.success() {
            return Err(classify_fetch_failure(
                output.stderr(),
                &refspecs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ));
        }
        let after = self.show_ref().await?;
        Ok(FetchResult { before, after })
    }

    /// Fetches a single ref or complete SHA-1 from `url` and resolves it
    /// to a revision.
    ///
    /// A SHA-1 that is already present locally is resolved without
    /// touching the network. Otherwise the SHA-1 is fetched directly,
    /// falling back to an explicit refspec into a private ref namespace
    /// for servers that refuse bare object ids.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::CannotResolveRevision`] when the remote does
    /// not know the ref.
    pub async fn fetch_single_ref(
        &self,
        url: &str,
        ref_name: &str,
    ) -> Result<GitRevision, GitError> {
        let validated = Self::validate_url(url)?;
        if is_complete_sha1(ref_name) {
            if let Ok(rev) = self.resolve_reference(ref_name).await {
                return Ok(rev.with_url(url));
            }
            let direct = self
                .git_allow_non_zero(&["fetch", &validated, ref_name])
                .await?;
            if !direct.success() {
                // Not every server allows fetching bare object ids;
                // retry into a private ref namespace.
                let refspec = format!("+{ref_name}:{FETCH_REF_NAMESPACE}/{ref_name}");
                let output = self
                    .git_allow_non_zero(&["fetch", &validated, &refspec])
                    .await?;
                if !output.success() {
                    return Err(classify_fetch_failure(output.stderr(), ref_name));
                }
            }
            return Ok(self.resolve_reference(ref_name).await?.with_url(url));
        }
        let output = self
            .git_allow_non_zero(&["fetch", &validated, ref_name])
            .await?;
        if !output.success() {
            return Err(classify_fetch_failure(output.stderr(), ref_name));
        }
        let sha1 = self.rev_parse("FETCH_HEAD").await?;
        Ok(GitRevision::new(sha1)?
            .with_reference(ref_name)
            .with_url(url))
    }

    /// Lists refs on a remote without fetching.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git ls-remote` fails.
    pub async fn ls_remote(
        &self,
        url: &str,
        patterns: &[&str],
    ) -> Result<BTreeMap<String, String>, GitError> {
        let validated = Self::validate_url(url)?;
        let mut args = vec!["ls-remote", validated.as_str()];
        args.extend_from_slice(patterns);
        let output = self.git(&args).await?;
        let mut refs = BTreeMap::new();
        for line in output.stdout().lines() {
            if let Some((sha1, name)) = line.split_once('\t') {
                refs.insert(name.to_owned(), sha1.to_owned());
            }
        }
        Ok(refs)
    }

    /// Starts a `git push` invocation.
    #[must_use]
    pub const fn push(&self) -> PushCmd<'_> {
        PushCmd {
            repo: self,
            url: None,
            refspecs: Vec::new(),
            prune: false,
            push_options: Vec::new(),
        }
    }

    /// Validates a git remote URL, returning it in normalized form.
    ///
    /// Accepts remote-helper syntax (`transport::address`), scheme URLs,
    /// scp-style `user@host:path` addresses, and existing local
    /// directories. Plain `http://` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Validation`] when the URL has none of the
    /// accepted shapes or uses plain http.
    pub fn validate_url(url: &str) -> Result<String, GitError> {
        if let Some((transport, address)) = url.split_once("::") {
            if !transport.is_empty() && transport.chars().all(|c| c.is_ascii_alphanumeric()) {
                let inner = Self::validate_url(address)?;
                return Ok(format!("{transport}::{inner}"));
            }
        }
        if url.starts_with("http://") {
            return Err(GitError::validation(format!(
                "URL '{url}' is not valid - plain http is not supported, use https instead"
            )));
        }
        if has_url_scheme(url) || is_scp_style(url) {
            return Ok(url.to_owned());
        }
        if std::path::Path::new(url).is_dir() {
            return Ok(url.to_owned());
        }
        Err(GitError::validation(format!("URL '{url}' is not valid")))
    }
}

/// Local ref and history inspection.
impl GitRepository {
    /// Returns all local refs mapped to their revisions.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git show-ref` fails for a reason
    /// other than the repository having no refs.
    pub async fn show_ref(&self) -> Result<BTreeMap<String, GitRevision>, GitError> {
        let output = self.git_allow_non_zero(&["show-ref"]).await?;
        // Exit code 1 with empty output means no refs exist yet.
        if !output.success() && !(output.exit_code() == 1 && output.stderr().is_empty()) {
            return Err(GitError::repo(format!(
                "git show-ref failed: {}",
                output.stderr().trim()
            )));
        }
        let mut refs = BTreeMap::new();
        for line in output.stdout().lines() {
            if let Some((sha1, name)) = line.split_once(' ') {
                refs.insert(name.to_owned(), GitRevision::new(sha1)?.with_reference(name));
            }
        }
        Ok(refs)
    }

    /// Resolves a ref expression to a full SHA-1 string.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::CannotResolveRevision`] when the expression
    /// does not resolve.
    pub async fn rev_parse(&self, ref_expr: &str) -> Result<String, GitError> {
        let output = self
            .git_allow_non_zero(&["rev-parse", "--verify", ref_expr])
            .await?;
        if output.success() {
            Ok(output.stdout().trim().to_owned())
        } else {
            Err(GitError::cannot_resolve(format!(
                "Cannot find reference '{ref_expr}'"
            )))
        }
    }

    /// Resolves a ref expression to a [`GitRevision`].
    ///
    /// # Errors
    ///
    /// Returns [`GitError::CannotResolveRevision`] when the expression
    /// does not resolve.
    pub async fn resolve_reference(&self, ref_expr: &str) -> Result<GitRevision, GitError> {
        let sha1 = self.rev_parse(ref_expr).await?;
        let revision = GitRevision::new(sha1)?;
        if revision.sha1() == ref_expr {
            Ok(revision)
        } else {
            Ok(revision.with_reference(ref_expr))
        }
    }

    /// The tree hash of a committish, used to compare content regardless
    /// of commit metadata.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::CannotResolveRevision`] when the committish
    /// does not resolve.
    pub async fn tree_hash(&self, ref_expr: &str) -> Result<String, GitError> {
        self.rev_parse(&format!("{ref_expr}^{{tree}}")).await
    }

    /// The merge base of two committish expressions, or `None` when they
    /// share no history.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git merge-base` fails for a
    /// reason other than unrelated histories.
    pub async fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError> {
        let output = self.git_allow_non_zero(&["merge-base", a, b]).await?;
        match output.exit_code() {
            0 => Ok(Some(output.stdout().trim().to_owned())),
            1 => Ok(None),
            _ => Err(GitError::repo(format!(
                "git merge-base failed: {}",
                output.stderr().trim()
            ))),
        }
    }

    /// Starts a `git log` invocation for a ref expression.
    #[must_use]
    pub fn log(&self, ref_expr: &str) -> LogCmd<'_> {
        LogCmd {
            repo: self,
            ref_expr: ref_expr.to_owned(),
            limit: None,
            skip: None,
            first_parent: false,
            include_files: false,
            include_body: true,
        }
    }
}

/// Work tree manipulation.
impl GitRepository {
    /// `git status --porcelain` parsed into entries.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git status` fails.
    pub async fn status(&self) -> Result<Vec<StatusFile>, GitError> {
        let output = self.git(&["status", "--porcelain"]).await?;
        Ok(output.stdout().lines().filter_map(parse_status_line).collect())
    }

    /// Stages every change in the work tree.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git add` fails.
    pub async fn add_all(&self) -> Result<(), GitError> {
        self.git(&["add", "--all"]).await.map(|_| ())
    }

    /// Stages every change in the work tree, including ignored files.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git add` fails.
    pub async fn add_force_all(&self) -> Result<(), GitError> {
        self.git(&["add", "--force", "--all"]).await.map(|_| ())
    }

    /// Stages specific paths, including ignored files.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git add` fails.
    pub async fn add_force_files(&self, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        // Batch to stay clear of platform argv length limits.
        for chunk in paths.chunks(100) {
            let mut args = vec!["add", "--force", "--"];
            args.extend(chunk.iter().map(String::as_str));
            self.git(&args).await?;
        }
        Ok(())
    }

    /// Unstages a single path, restoring its index entry from `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git reset` fails.
    pub async fn reset_path(&self, path: &str) -> Result<(), GitError> {
        self.git(&["reset", "--quiet", "--", path]).await.map(|_| ())
    }

    /// All file paths in the tree of a committish.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git ls-tree` fails.
    pub async fn ls_tree_paths(&self, ref_expr: &str) -> Result<Vec<String>, GitError> {
        let output = self
            .git(&["ls-tree", "-r", "--name-only", ref_expr])
            .await?;
        Ok(output.stdout().lines().map(str::to_owned).collect())
    }

    /// The full `git show` output for a committish, used to present a
    /// change for confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git show` fails.
    pub async fn show(&self, ref_expr: &str) -> Result<String, GitError> {
        let output = self.git(&["show", ref_expr]).await?;
        Ok(output.stdout().to_owned())
    }

    /// Forcibly checks out a committish, discarding local changes.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git checkout` fails.
    pub async fn force_checkout(&self, ref_expr: &str) -> Result<(), GitError> {
        self.git(&["checkout", "-f", ref_expr]).await.map(|_| ())
    }

    /// Resets the work tree and index to a committish.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git reset` fails.
    pub async fn reset_hard(&self, ref_expr: &str) -> Result<(), GitError> {
        self.git(&["reset", "--hard", ref_expr]).await.map(|_| ())
    }

    /// Creates (or with `force` moves) a tag pointing at `HEAD`.
    ///
    /// A `message` produces an annotated tag, otherwise a lightweight one.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git tag` fails, for example when
    /// the tag exists and `force` is not set.
    pub async fn tag(
        &self,
        name: &str,
        message: Option<&str>,
        force: bool,
    ) -> Result<(), GitError> {
        let mut args = vec!["tag"];
        if force {
            args.push("-f");
        }
        if let Some(text) = message {
            args.push("-m");
            args.push(text);
        }
        args.push(name);
        self.git(&args).await.map(|_| ())
    }

    /// The diff of staged changes against `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git diff` fails.
    pub async fn diff_cached(&self) -> Result<String, GitError> {
        let output = self.git(&["diff", "--cached"]).await?;
        Ok(output.stdout().to_owned())
    }

    /// Paths that are submodule entries in the index.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git ls-files` fails.
    pub async fn submodule_paths(&self) -> Result<Vec<String>, GitError> {
        let output = self.git(&["ls-files", "--stage"]).await?;
        Ok(output
            .stdout()
            .lines()
            .filter(|line| line.starts_with("160000 "))
            .filter_map(|line| line.split_once('\t').map(|(_, path)| path.to_owned()))
            .collect())
    }

    /// Rebases the current branch onto `upstream`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::RebaseConflict`] listing the conflicted paths
    /// when the rebase cannot apply cleanly (the rebase is aborted first),
    /// or [`GitError::Repo`] for other failures.
    pub async fn rebase(&self, upstream: &str) -> Result<(), GitError> {
        let output = self.git_allow_non_zero(&["rebase", upstream]).await?;
        if output.success() {
            return Ok(());
        }
        let conflicted = self.conflicted_paths().await?;
        let _aborted = self.git_allow_non_zero(&["rebase", "--abort"]).await;
        if conflicted.is_empty() {
            Err(GitError::repo(format!(
                "git rebase failed: {}",
                output.stderr().trim()
            )))
        } else {
            Err(GitError::RebaseConflict { paths: conflicted })
        }
    }

    async fn conflicted_paths(&self) -> Result<Vec<String>, GitError> {
        Ok(self
            .status()
            .await?
            .into_iter()
            .filter(StatusFile::is_conflicted)
            .map(|entry| entry.path)
            .collect())
    }

    /// Creates a commit from the staged changes.
    ///
    /// Oversized messages are passed through a file to stay clear of
    /// command-line length limits. Line endings are normalized to LF.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::EmptyChange`] when nothing is staged and
    /// [`GitError::Repo`] when `git commit` fails.
    pub async fn commit(
        &self,
        author: Option<&str>,
        timestamp: DateTime<FixedOffset>,
        message: &str,
    ) -> Result<(), GitError> {
        if self.status().await?.is_empty() {
            return Err(GitError::EmptyChange {
                message: "nothing to commit".to_owned(),
            });
        }
        let date = timestamp.format("%Y-%m-%d %H:%M:%S%z").to_string();
        let normalized = normalize_message(message);
        let mut args: Vec<String> = vec!["commit".to_owned()];
        if let Some(author_line) = author {
            args.push(format!("--author={author_line}"));
        }
        args.push(format!("--date={date}"));
        // Keep the temp file alive until the subprocess has read it.
        let message_file = if normalized.len() > MAX_INLINE_COMMIT_MESSAGE {
            let mut file = tempfile::NamedTempFile::new()
                .map_err(|err| GitError::repo(format!("cannot create message file: {err}")))?;
            file.write_all(normalized.as_bytes())
                .map_err(|err| GitError::repo(format!("cannot write message file: {err}")))?;
            args.push("-F".to_owned());
            args.push(file.path().to_string_lossy().into_owned());
            Some(file)
        } else {
            args.push("-m".to_owned());
            args.push(normalized);
            None
        };
        let env = self.env.clone().with_var("GIT_COMMITTER_DATE", date);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&env, &arg_refs, None).await?;
        drop(message_file);
        if output.success() {
            Ok(())
        } else {
            Err(GitError::repo(format!(
                "git commit failed: {}",
                output.stderr().trim()
            )))
        }
    }
}

/// Configuration.
impl GitRepository {
    /// Sets a local config field, replacing all previous values.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git config` fails.
    pub async fn replace_local_config_field(
        &self,
        category: &str,
        field: &str,
        value: &str,
    ) -> Result<(), GitError> {
        self.git(&[
            "config",
            "--local",
            "--replace-all",
            &format!("{category}.{field}"),
            value,
        ])
        .await
        .map(|_| ())
    }

    /// Configures the credential helper for this repository.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git config` fails.
    pub async fn set_credential_helper(&self, helper: &str) -> Result<(), GitError> {
        self.replace_local_config_field("credential", "helper", helper)
            .await
    }

    /// Checks that a committer identity is configured.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Validation`] when `user.name` or `user.email`
    /// is missing from the effective configuration.
    pub async fn verify_user_info_configured(&self) -> Result<(), GitError> {
        let output = self.git(&["config", "-l"]).await?;
        let has_name = output
            .stdout()
            .lines()
            .any(|line| line.starts_with("user.name="));
        let has_email = output
            .stdout()
            .lines()
            .any(|line| line.starts_with("user.email="));
        if has_name && has_email {
            Ok(())
        } else {
            Err(GitError::validation(
                "'user.name' and/or 'user.email' are not configured. Please run \
                 `git config --global user.name your-name` and \
                 `git config --global user.email your@email`",
            ))
        }
    }
}

/// Builder for one `git push` invocation.
#[derive(Debug)]
pub struct PushCmd<'a> {
    repo: &'a GitRepository,
    url: Option<String>,
    refspecs: Vec<Refspec>,
    prune: bool,
    push_options: Vec<String>,
}

impl PushCmd<'_> {
    /// Sets the destination URL and the refspecs to push.
    #[must_use]
    pub fn with_refspecs(mut self, url: impl Into<String>, refspecs: Vec<Refspec>) -> Self {
        self.url = Some(url.into());
        self.refspecs = refspecs;
        self
    }

    /// Enables pruning of destination refs matched by the refspecs.
    #[must_use]
    pub const fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Adds server push options.
    #[must_use]
    pub fn with_push_options(mut self, options: Vec<String>) -> Self {
        self.push_options = options;
        self
    }

    /// Runs the push, returning the server response text.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when the push fails or is rejected by
    /// the remote.
    pub async fn run(self) -> Result<String, GitError> {
        let mut args: Vec<String> = vec!["push".to_owned()];
        for option in &self.push_options {
            args.push(format!("--push-option={option}"));
        }
        if self.prune {
            args.push("--prune".to_owned());
        }
        if let Some(url) = &self.url {
            args.push(GitRepository::validate_url(url)?);
            for refspec in &self.refspecs {
                args.push(refspec.to_string());
            }
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.repo.git_allow_non_zero(&arg_refs).await?;
        if output.success() {
            // git reports push progress on stderr.
            return Ok(output.stderr().to_owned());
        }
        if output.stderr().contains("[rejected]") {
            return Err(GitError::repo(format!(
                "Push was rejected by the remote: {}",
                output.stderr().trim()
            )));
        }
        Err(GitError::repo(format!(
            "git push failed: {}",
            output.stderr().trim()
        )))
    }
}

/// Builder for one `git log` invocation.
#[derive(Debug)]
pub struct LogCmd<'a> {
    repo: &'a GitRepository,
    ref_expr: String,
    limit: Option<usize>,
    skip: Option<usize>,
    first_parent: bool,
    include_files: bool,
    include_body: bool,
}

impl LogCmd<'_> {
    /// Limits the number of commits returned.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `skip` commits.
    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Follows only the first parent of merge commits.
    #[must_use]
    pub const fn first_parent(mut self, first_parent: bool) -> Self {
        self.first_parent = first_parent;
        self
    }

    /// Includes the list of touched files per commit.
    #[must_use]
    pub const fn include_files(mut self, include_files: bool) -> Self {
        self.include_files = include_files;
        self
    }

    /// Whether entry bodies are populated (on by default).
    #[must_use]
    pub const fn include_body(mut self, include_body: bool) -> Self {
        self.include_body = include_body;
        self
    }

    /// Runs the log and parses its output.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when `git log` fails or its output
    /// cannot be parsed.
    pub async fn run(self) -> Result<Vec<GitLogEntry>, GitError> {
        let mut args: Vec<String> = vec!["log".to_owned(), LOG_FORMAT.to_owned()];
        if let Some(limit) = self.limit {
            args.push(format!("--max-count={limit}"));
        }
        if let Some(skip) = self.skip {
            args.push(format!("--skip={skip}"));
        }
        if self.first_parent {
            args.push("--first-parent".to_owned());
        }
        if self.include_files {
            args.push("--name-only".to_owned());
        }
        args.push(self.ref_expr.clone());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.repo.git(&arg_refs).await?;
        output
            .stdout()
            .split(LOG_ENTRY_SEPARATOR)
            .filter(|record| !record.trim().is_empty())
            .map(|record| parse_log_record(record, self.include_files, self.include_body))
            .collect()
    }
}

fn normalize_message(message: &str) -> String {
    let mut normalized = message.replace("\r\n", "\n");
    if !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

fn classify_fetch_failure(stderr: &str, refs: &str) -> GitError {
    let not_found = [
        "ouldn't find remote ref",
        "no such remote ref",
        "no matching remote head",
        "not our ref",
        "ERR want ",
    ];
    if not_found.iter().any(|needle| stderr.contains(needle)) {
        GitError::cannot_resolve(format!("Cannot find references: {refs}"))
    } else {
        GitError::repo(format!("git fetch failed: {}", stderr.trim()))
    }
}

fn parse_status_line(line: &str) -> Option<StatusFile> {
    let mut chars = line.chars();
    let index_status = chars.next()?;
    let worktree_status = chars.next()?;
    chars.next()?;
    let path_field: String = chars.collect();
    let (renamed_from, path) = path_field.split_once(" -> ").map_or_else(
        || (None, path_field.clone()),
        |(from, to)| (Some(from.to_owned()), to.to_owned()),
    );
    Some(StatusFile {
        index_status,
        worktree_status,
        path,
        renamed_from,
    })
}

fn parse_log_record(
    record: &str,
    include_files: bool,
    include_body: bool,
) -> Result<GitLogEntry, GitError> {
    let malformed = || GitError::repo("malformed git log output".to_owned());
    let mut fields = record.splitn(9, LOG_FIELD_SEPARATOR);
    let sha1 = fields.next().ok_or_else(malformed)?.trim().to_owned();
    let tree = fields.next().ok_or_else(malformed)?.to_owned();
    let parents = fields
        .next()
        .ok_or_else(malformed)?
        .split_whitespace()
        .map(str::to_owned)
        .collect();
    let author = fields.next().ok_or_else(malformed)?.to_owned();
    let author_date = parse_log_date(fields.next().ok_or_else(malformed)?)?;
    let committer = fields.next().ok_or_else(malformed)?.to_owned();
    let committer_date = parse_log_date(fields.next().ok_or_else(malformed)?)?;
    let raw_body = fields.next().ok_or_else(malformed)?;
    let body = if include_body {
        raw_body.replace("\r\n", "\n")
    } else {
        String::new()
    };
    let files = if include_files {
        let trailer = fields.next().unwrap_or("");
        Some(
            trailer
                .lines()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    } else {
        None
    };
    Ok(GitLogEntry {
        sha1,
        tree,
        parents,
        author,
        author_date,
        committer,
        committer_date,
        body,
        files,
    })
}

fn parse_log_date(field: &str) -> Result<DateTime<FixedOffset>, GitError> {
    DateTime::parse_from_rfc3339(field.trim())
        .map_err(|err| GitError::repo(format!("invalid date in git log output: {err}")))
}

fn has_url_scheme(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|first| first.is_ascii_lowercase())
            && scheme.len() >= 2
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-'))
    })
}

fn is_scp_style(url: &str) -> bool {
    url.split_once('@').is_some_and(|(user, rest)| {
        let mut user_chars = user.chars();
        let user_ok = user_chars.next().is_some_and(|first| first.is_ascii_lowercase())
            && user_chars.all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-')
            });
        let host = rest.split_once(':').map_or(rest, |(host, _)| host);
        let host_ok = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        user_ok && host_ok
    })
}
