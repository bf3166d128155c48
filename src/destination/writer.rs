//! The destination write state machine.

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use super::effect::{DestinationEffect, DestinationRef, EffectType};
use super::glob::Glob;
use super::transform::TransformResult;
use super::write_hook::{DefaultWriteHook, WriteHook};
use crate::credentials::CredentialFileHandler;
use crate::git::{GitEnvironment, GitError, GitRepository, Refspec};

/// Decides whether a presented diff may be pushed.
pub trait ConfirmationPrompt: Send + Sync + fmt::Debug {
    /// Returns true when the shown change may proceed.
    fn confirm(&self, diff: &str) -> bool;
}

/// Prompt that accepts every change, for non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmationPrompt for AutoConfirm {
    fn confirm(&self, _diff: &str) -> bool {
        true
    }
}

/// Configuration of a plain Git branch destination.
#[derive(Debug, Clone)]
pub struct GitDestination {
    url: String,
    fetch_ref: String,
    push_ref: String,
    committer_name: Option<String>,
    committer_email: Option<String>,
    credentials: Option<Arc<CredentialFileHandler>>,
    env: GitEnvironment,
    force: bool,
}

impl GitDestination {
    /// A destination pushing to `push_ref` of `url`, with `fetch_ref` as
    /// the baseline.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        fetch_ref: impl Into<String>,
        push_ref: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            fetch_ref: fetch_ref.into(),
            push_ref: push_ref.into(),
            committer_name: None,
            committer_email: None,
            credentials: None,
            env: GitEnvironment::default(),
            force: false,
        }
    }

    /// Sets the committer identity configured in the scratch clone.
    #[must_use]
    pub fn with_committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer_name = Some(name.into());
        self.committer_email = Some(email.into());
        self
    }

    /// Installs issuer-backed credentials into the scratch clone.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<CredentialFileHandler>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the git subprocess environment.
    #[must_use]
    pub fn with_environment(mut self, env: GitEnvironment) -> Self {
        self.env = env;
        self
    }

    /// Allows writing to a destination whose fetch ref does not exist
    /// yet, and skips previous-ref discovery.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The remote URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The ref fetched as the destination baseline.
    #[must_use]
    pub fn fetch_ref(&self) -> &str {
        self.fetch_ref.as_str()
    }

    /// The ref pushed to.
    #[must_use]
    pub fn push_ref(&self) -> &str {
        self.push_ref.as_str()
    }

    /// Creates a writer for the paths covered by `destination_files`.
    #[must_use]
    pub fn writer(&self, destination_files: Glob) -> GitDestinationWriter {
        self.writer_with_hook(destination_files, Arc::new(DefaultWriteHook))
    }

    /// Creates a writer with a review-host hook around the push.
    #[must_use]
    pub fn writer_with_hook(
        &self,
        destination_files: Glob,
        write_hook: Arc<dyn WriteHook>,
    ) -> GitDestinationWriter {
        GitDestinationWriter {
            destination: self.clone(),
            destination_files,
            write_hook,
            prompt: Arc::new(AutoConfirm),
            scratch: None,
        }
    }
}

struct Scratch {
    repo: GitRepository,
    baseline_found: bool,
    _dir: TempDir,
}

#[derive(Default)]
struct PreservedPaths {
    excluded: Vec<String>,
    submodules: Vec<String>,
}

/// Executes destination writes against one scratch clone.
///
/// The scratch clone is created lazily on the first operation and reused
/// across sequential writes so that review-branch pushes append onto the
/// branch instead of resetting it.
pub struct GitDestinationWriter {
    destination: GitDestination,
    destination_files: Glob,
    write_hook: Arc<dyn WriteHook>,
    prompt: Arc<dyn ConfirmationPrompt>,
    scratch: Option<Scratch>,
}

impl fmt::Debug for GitDestinationWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitDestinationWriter")
            .field("destination", &self.destination)
            .field("destination_files", &self.destination_files)
            .finish_non_exhaustive()
    }
}

impl GitDestinationWriter {
    /// Replaces the confirmation prompt used for interactive writes.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Writes one transformed tree to the destination.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::EmptyChange`] when the staged tree equals the
    /// baseline, [`GitError::RebaseConflict`] when the change cannot be
    /// rebased onto a moved destination, [`GitError::RedundantChange`]
    /// when the write hook detects an equivalent open review request,
    /// and [`GitError::Repo`] or [`GitError::Validation`] for the
    /// failures described on each step.
    pub async fn write(
        &mut self,
        transform: &TransformResult,
    ) -> Result<Vec<DestinationEffect>, GitError> {
        let baseline = transform.baseline();
        if self.destination.force && baseline.is_some() {
            return Err(GitError::repo(format!(
                "cannot force-write with a previous baseline ({})",
                baseline.unwrap_or_default()
            )));
        }
        self.ensure_scratch(baseline).await?;
        let (repo, baseline_found) = self.scratch_handle()?;

        // Record what must survive staging before deletions are staged.
        let preserved = self.preserved_paths(&repo).await?;

        let alternate = repo.with_alternate_work_tree(transform.workdir().to_owned());
        match transform.changed_files() {
            // Smart prune: stage only the touched paths, so destination
            // files the transform never produced keep their baseline
            // content instead of being staged as deletions.
            Some(changed) => alternate.add_force_files(changed).await?,
            None => alternate.add_force_all().await?,
        }
        repo.add_force_files(&preserved.excluded).await?;
        for submodule in &preserved.submodules {
            repo.reset_path(submodule).await?;
            repo.add_force_files(std::slice::from_ref(submodule)).await?;
        }

        if let Ok(base_sha) = repo.rev_parse("HEAD").await {
            let staged = alternate
                .git_allow_non_zero(&["diff", "--cached", "--quiet"])
                .await?;
            if staged.success() {
                return Err(GitError::EmptyChange {
                    message: format!(
                        "Migration of the revision resulted in an empty change from \
                         baseline '{base_sha}'"
                    ),
                });
            }
        }

        tracing::debug!(url = self.destination.url.as_str(), "creating local commit");
        alternate
            .commit(transform.author(), transform.timestamp(), transform.summary())
            .await?;

        if baseline.is_some() {
            // Rebase needs a clean work tree to create conflict markers in.
            alternate.reset_hard("HEAD").await?;
            alternate.rebase("FETCH_HEAD").await?;
        }

        if transform.ask_for_confirmation() {
            let shown = alternate.show("HEAD").await?;
            if !self.prompt.confirm(&shown) {
                return Err(GitError::repo(
                    "User aborted execution: did not confirm diff changes.",
                ));
            }
        }

        self.write_hook.before_push(&alternate, transform).await?;

        let push_refspec = Refspec::parse(&format!("HEAD:{}", self.destination.push_ref))?;
        alternate
            .push()
            .with_refspecs(self.destination.url.clone(), vec![push_refspec])
            .run()
            .await?;

        let sha1 = alternate.rev_parse("HEAD").await?;
        let effect_type = if baseline_found {
            EffectType::Updated
        } else {
            EffectType::Created
        };
        let mut effects = vec![DestinationEffect::new(
            effect_type,
            format!(
                "Pushed revision {sha1} to {url} {push}",
                url = self.destination.url,
                push = self.destination.push_ref
            ),
            DestinationRef::commit(&sha1),
        )];
        effects.extend(self.write_hook.after_push(&sha1, transform).await?);
        Ok(effects)
    }

    /// Finds the most recent value of a `<label>: <value>` trailer in the
    /// destination history, walking first-parent from the baseline.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Repo`] when a merge commit is found before the
    /// label, since first-parent lookup is only defined on linear
    /// history.
    pub async fn previous_ref(&mut self, label: &str) -> Result<Option<String>, GitError> {
        if self.destination.force {
            return Ok(None);
        }
        self.ensure_scratch(None).await?;
        let (repo, baseline_found) = self.scratch_handle()?;
        if !baseline_found {
            return Ok(None);
        }
        let roots: Vec<String> = self
            .destination_files
            .roots()
            .into_iter()
            .filter(|root| !root.is_empty())
            .collect();
        let prefix = format!("{label}: ");
        let mut commit = repo.rev_parse("FETCH_HEAD").await?;
        while !commit.is_empty() {
            let body = self
                .previous_ref_log(&repo, &roots, &commit, "--format=%b")
                .await?;
            for line in body.lines() {
                if let Some(value) = line.strip_prefix(&prefix) {
                    return Ok(Some(value.to_owned()));
                }
            }
            let parents = self
                .previous_ref_log(&repo, &roots, &commit, "--format=%P")
                .await?
                .trim()
                .to_owned();
            if parents.contains(' ') {
                return Err(GitError::repo(format!(
                    "Found commit with multiple parents (merge commit) when looking \
                     for {label}. Pass the previous revision explicitly instead."
                )));
            }
            commit = parents;
        }
        Ok(None)
    }

    async fn previous_ref_log(
        &self,
        repo: &GitRepository,
        roots: &[String],
        commit: &str,
        format: &str,
    ) -> Result<String, GitError> {
        let mut args = vec!["log", "--no-color", format, commit, "-1"];
        if !roots.is_empty() {
            args.push("--");
            args.extend(roots.iter().map(String::as_str));
        }
        let output = repo.git(&args).await?;
        Ok(output.stdout().to_owned())
    }

    async fn ensure_scratch(&mut self, baseline: Option<&str>) -> Result<(), GitError> {
        if self.scratch.is_some() {
            return Ok(());
        }
        let dir = TempDir::new()
            .map_err(|err| GitError::repo(format!("cannot create scratch directory: {err}")))?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|_| GitError::repo("scratch directory path is not valid UTF-8".to_owned()))?;
        let work_tree = root.join("repo");
        std::fs::create_dir_all(&work_tree)
            .map_err(|err| GitError::repo(format!("cannot create scratch work tree: {err}")))?;
        let repo = GitRepository::with_work_tree(work_tree, self.destination.env.clone());
        repo.init().await?;
        if let Some(credentials) = &self.destination.credentials {
            credentials.install(&repo, &root.join("credentials")).await?;
        }
        tracing::debug!(url = self.destination.url.as_str(), "fetching destination baseline");
        let baseline_found = match repo
            .fetch_single_ref(&self.destination.url, &self.destination.fetch_ref)
            .await
        {
            Ok(_) => true,
            Err(GitError::CannotResolveRevision { .. }) => {
                if self.destination.force {
                    false
                } else {
                    return Err(GitError::repo(format!(
                        "'{fetch}' doesn't exist in '{url}'. Enable the force option if \
                         the destination is a new repository",
                        fetch = self.destination.fetch_ref,
                        url = self.destination.url
                    )));
                }
            }
            Err(err) => return Err(err),
        };
        self.checkout_baseline(&repo, baseline.unwrap_or("FETCH_HEAD"))
            .await?;
        self.configure_committer(&repo).await?;
        repo.verify_user_info_configured().await?;
        self.scratch = Some(Scratch {
            repo,
            baseline_found,
            _dir: dir,
        });
        Ok(())
    }

    fn scratch_handle(&self) -> Result<(GitRepository, bool), GitError> {
        self.scratch.as_ref().map_or_else(
            || Err(GitError::repo("scratch clone is not initialised".to_owned())),
            |scratch| Ok((scratch.repo.clone(), scratch.baseline_found)),
        )
    }

    async fn checkout_baseline(
        &self,
        repo: &GitRepository,
        reference: &str,
    ) -> Result<(), GitError> {
        match repo.git(&["checkout", "-q", reference]).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if self.destination.force {
                    tracing::warn!(
                        reference,
                        "cannot check out baseline, writing against an empty tree"
                    );
                    Ok(())
                } else {
                    Err(GitError::repo(format!(
                        "Cannot checkout '{reference}' from '{url}': {err}. Enable the \
                         force option if the destination is a new repository",
                        url = self.destination.url
                    )))
                }
            }
        }
    }

    async fn configure_committer(&self, repo: &GitRepository) -> Result<(), GitError> {
        if let Some(name) = &self.destination.committer_name {
            repo.replace_local_config_field("user", "name", name).await?;
        }
        if let Some(email) = &self.destination.committer_email {
            repo.replace_local_config_field("user", "email", email).await?;
        }
        Ok(())
    }

    /// Paths that must survive staging: baseline files outside the
    /// destination glob, and submodule entries the glob does not cover.
    async fn preserved_paths(&self, repo: &GitRepository) -> Result<PreservedPaths, GitError> {
        if repo.rev_parse("HEAD").await.is_err() {
            return Ok(PreservedPaths::default());
        }
        let submodules: Vec<String> = repo
            .submodule_paths()
            .await?
            .into_iter()
            .filter(|path| !self.destination_files.matches(path))
            .collect();
        let excluded: Vec<String> = repo
            .ls_tree_paths("HEAD")
            .await?
            .into_iter()
            .filter(|path| !self.destination_files.matches(path))
            .filter(|path| !submodules.iter().any(|sub| path == sub || path.starts_with(&format!("{sub}/"))))
            .collect();
        Ok(PreservedPaths {
            excluded,
            submodules,
        })
    }
}
