#![expect(clippy::unwrap_used, reason = "tests panic on failure")]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use http::StatusCode;
use rstest::rstest;
use tempfile::TempDir;

use super::api::{MockGitHubApi, PullRequest, PullRequestSide};
use super::error::GitHubApiError;
use super::pr_destination::{GitHubPrDestination, GitHubPrWriteHook};
use crate::destination::{EffectType, Glob, TransformResult, WriteHook};
use crate::git::{GitEnvironment, GitError, GitRepository, Refspec};

fn test_env(home: &Utf8Path) -> GitEnvironment {
    let mut vars = BTreeMap::new();
    if let Ok(path) = std::env::var("PATH") {
        vars.insert("PATH".to_owned(), path);
    }
    vars.insert("HOME".to_owned(), home.to_string());
    GitEnvironment::new(vars)
}

fn write_time() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00+00:00").unwrap()
}

fn pull_request(number: u64, branch: &str, sha: &str) -> PullRequest {
    PullRequest {
        number,
        state: "open".to_owned(),
        title: Some("existing".to_owned()),
        body: None,
        html_url: format!("https://github.com/acme/widgets/pull/{number}"),
        head: PullRequestSide {
            reference: branch.to_owned(),
            sha: sha.to_owned(),
        },
        base: PullRequestSide {
            reference: "main".to_owned(),
            sha: "0".repeat(40),
        },
        mergeable: None,
        mergeable_state: None,
    }
}

struct Fixture {
    root: Utf8PathBuf,
    seed: GitRepository,
    remote: GitRepository,
    remote_url: String,
    _dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let remote_dir = root.join("remote.git");
        std::fs::create_dir_all(&remote_dir).unwrap();
        let remote = GitRepository::new_bare(remote_dir.clone(), test_env(&root));
        remote.init().await.unwrap();
        // Lets tree comparisons fetch a review head by its exact sha.
        remote
            .replace_local_config_field("uploadpack", "allowAnySHA1InWant", "true")
            .await
            .unwrap();

        let seed_dir = root.join("seed");
        std::fs::create_dir_all(&seed_dir).unwrap();
        let seed = GitRepository::with_work_tree(seed_dir, test_env(&root));
        seed.init().await.unwrap();
        seed.git(&["checkout", "-b", "main"]).await.unwrap();
        seed.replace_local_config_field("user", "name", "Seed User")
            .await
            .unwrap();
        seed.replace_local_config_field("user", "email", "seed@example.com")
            .await
            .unwrap();

        Self {
            root,
            seed,
            remote,
            remote_url: remote_dir.to_string(),
            _dir: dir,
        }
    }

    async fn seed_commit(&self, files: &[(&str, &str)], message: &str) {
        for (name, content) in files {
            let path = self.seed.work_tree().unwrap().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        self.seed.add_all().await.unwrap();
        self.seed.commit(None, write_time(), message).await.unwrap();
    }

    async fn push_seed(&self) {
        self.seed
            .push()
            .with_refspecs(
                self.remote_url.clone(),
                vec![Refspec::parse("refs/heads/main:refs/heads/main").unwrap()],
            )
            .run()
            .await
            .unwrap();
    }

    fn workdir(&self, name: &str, files: &[(&str, &str)]) -> Utf8PathBuf {
        let dir = self.root.join(name);
        for (file, content) in files {
            let path = dir.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn destination(&self, api: MockGitHubApi) -> GitHubPrDestination {
        GitHubPrDestination::with_project_slug(
            &self.remote_url,
            "acme/widgets",
            "main",
            "pr-${CONTEXT_REFERENCE}",
            Arc::new(api),
        )
        .with_committer("Dest Committer", "dest@example.com")
        .with_environment(test_env(&self.root))
    }
}

fn transform(workdir: Utf8PathBuf, summary: &str, context: &str) -> TransformResult {
    TransformResult::new(workdir, summary, write_time()).with_context_reference(context)
}

#[rstest]
#[tokio::test]
async fn write_creates_a_pull_request_for_a_new_branch() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;

    let mut api = MockGitHubApi::new();
    api.expect_list_pull_requests()
        .withf(|project, head| project == "acme/widgets" && head == "acme:pr-feature_x")
        .times(2)
        .returning(|_, _| Ok(Vec::new()));
    api.expect_create_pull_request()
        .withf(|_, request| {
            request.title == "update a"
                && request.head == "pr-feature_x"
                && request.base == "main"
        })
        .returning(|_, _| Ok(pull_request(7, "pr-feature_x", &"a".repeat(40))));

    let mut writer = fx.destination(api).writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "two\n")]);
    let effects = writer
        .write(&transform(workdir, "update a\n\nmore detail", "feature/x"))
        .await
        .unwrap();

    let pr_effect = effects.last().unwrap();
    assert_eq!(pr_effect.effect_type(), EffectType::Created);
    let reference = pr_effect.destination_ref().unwrap();
    assert_eq!(reference.id(), "7");
    assert_eq!(reference.ref_type(), "pull_request");
    assert_eq!(writer.pull_request_number(), Some(7));

    let branch_head = fx.remote.rev_parse("refs/heads/pr-feature_x").await.unwrap();
    assert_eq!(branch_head.len(), 40);
}

#[rstest]
#[tokio::test]
async fn write_updates_the_existing_pull_request() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;
    let base_sha = fx.seed.rev_parse("HEAD").await.unwrap();

    let existing = pull_request(9, "pr-feature_x", &base_sha);
    let mut api = MockGitHubApi::new();
    api.expect_list_pull_requests()
        .times(2)
        .returning(move |_, _| Ok(vec![existing.clone()]));
    api.expect_update_pull_request()
        .withf(|_, number, _| *number == 9)
        .returning(|_, number, _| Ok(pull_request(number, "pr-feature_x", &"b".repeat(40))));

    let mut writer = fx.destination(api).writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "two\n")]);
    let effects = writer
        .write(&transform(workdir, "update a", "feature/x"))
        .await
        .unwrap();

    let pr_effect = effects.last().unwrap();
    assert_eq!(pr_effect.effect_type(), EffectType::Updated);
    assert_eq!(pr_effect.destination_ref().unwrap().id(), "9");
}

#[rstest]
#[tokio::test]
async fn redundant_tree_skips_the_push_to_the_existing_pull_request() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;

    // First migration creates the review branch.
    let slot: Arc<Mutex<Option<PullRequest>>> = Arc::new(Mutex::new(None));
    let list_slot = Arc::clone(&slot);
    let mut api = MockGitHubApi::new();
    api.expect_list_pull_requests()
        .returning(move |_, _| Ok(list_slot.lock().unwrap().clone().into_iter().collect()));
    api.expect_create_pull_request()
        .returning(|_, _| Ok(pull_request(7, "pr-feature_x", &"a".repeat(40))));
    api.expect_get_pull_request().returning(|_, number| {
        let mut pr = pull_request(number, "pr-feature_x", &"a".repeat(40));
        pr.mergeable = Some(true);
        Ok(pr)
    });

    let destination = fx.destination(api);
    let mut first = destination.writer(Glob::all_files());
    let first_dir = fx.workdir("work1", &[("a.txt", "two\n")]);
    first
        .write(&transform(first_dir, "update a", "feature/x"))
        .await
        .unwrap();

    let branch_sha = fx.remote.rev_parse("refs/heads/pr-feature_x").await.unwrap();
    *slot.lock().unwrap() = Some(pull_request(7, "pr-feature_x", &branch_sha));

    // A fresh writer migrating the same content finds the identical tree.
    let mut second = destination.writer(Glob::all_files());
    let second_dir = fx.workdir("work2", &[("a.txt", "two\n")]);
    let err = second
        .write(&transform(second_dir, "update a again", "feature/x"))
        .await
        .unwrap_err();
    match err {
        GitError::RedundantChange { message, sha } => {
            assert!(message.contains("/pull/7"));
            assert_eq!(sha, branch_sha);
        }
        other => panic!("expected a redundant change, got {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn empty_title_fails_the_pull_request_creation() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;

    let mut api = MockGitHubApi::new();
    api.expect_list_pull_requests()
        .times(2)
        .returning(|_, _| Ok(Vec::new()));

    let mut writer = fx
        .destination(api)
        .with_title("")
        .writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "two\n")]);
    let err = writer
        .write(&transform(workdir, "update a", "feature/x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("title cannot be empty"));
}

#[rstest]
#[tokio::test]
async fn missing_template_label_is_a_validation_error() {
    let fx = Fixture::new().await;
    let api = MockGitHubApi::new();
    let destination = GitHubPrDestination::with_project_slug(
        &fx.remote_url,
        "acme/widgets",
        "main",
        "pr-${UNSET_LABEL}",
        Arc::new(api),
    );

    let mut writer = destination.writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "one\n")]);
    let err = writer
        .write(&transform(workdir, "update", "feature/x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("has an error"));
}

#[rstest]
#[tokio::test]
async fn allow_empty_diff_bypasses_the_redundancy_check() {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    // Never touched, the hook returns before any git or API call.
    let repo = GitRepository::new_bare(root.join("unused.git"), test_env(&root));

    let api = MockGitHubApi::new();
    let hook = GitHubPrWriteHook::new(Arc::new(api), "url", "acme/widgets", "branch")
        .with_allow_empty_diff(true);
    let change = transform(root.join("work"), "update", "feature/x");
    hook.before_push(&repo, &change).await.unwrap();
}

#[rstest]
#[tokio::test]
async fn a_missing_branch_probe_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let repo = GitRepository::new_bare(root.join("unused.git"), test_env(&root));

    let mut api = MockGitHubApi::new();
    api.expect_list_pull_requests().returning(|_, _| {
        Err(GitHubApiError::Api {
            operation: "list pull requests".to_owned(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "head invalid".to_owned(),
        })
    });

    let hook = GitHubPrWriteHook::new(Arc::new(api), "url", "acme/widgets", "branch");
    let change = transform(root.join("work"), "update", "feature/x");
    hook.before_push(&repo, &change).await.unwrap();
}

#[rstest]
#[tokio::test]
async fn multiple_matching_pull_requests_skip_the_check() {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let repo = GitRepository::new_bare(root.join("unused.git"), test_env(&root));

    let mut api = MockGitHubApi::new();
    api.expect_list_pull_requests().returning(|_, _| {
        Ok(vec![
            pull_request(1, "branch", &"a".repeat(40)),
            pull_request(2, "branch", &"b".repeat(40)),
        ])
    });

    let hook = GitHubPrWriteHook::new(Arc::new(api), "url", "acme/widgets", "branch");
    let change = transform(root.join("work"), "update", "feature/x");
    hook.before_push(&repo, &change).await.unwrap();
}

#[rstest]
#[tokio::test]
async fn merge_status_in_the_upload_list_pushes_anyway() {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let work = root.join("repo");
    std::fs::create_dir_all(&work).unwrap();
    let repo = GitRepository::with_work_tree(work.clone(), test_env(&root));
    repo.init().await.unwrap();
    repo.replace_local_config_field("user", "name", "User")
        .await
        .unwrap();
    repo.replace_local_config_field("user", "email", "user@example.com")
        .await
        .unwrap();
    std::fs::write(work.join("a.txt"), "one\n").unwrap();
    repo.add_all().await.unwrap();
    repo.commit(None, write_time(), "seed").await.unwrap();
    let head_sha = repo.rev_parse("HEAD").await.unwrap();

    let list_sha = head_sha.clone();
    let mut api = MockGitHubApi::new();
    api.expect_list_pull_requests()
        .returning(move |_, _| Ok(vec![pull_request(3, "branch", &list_sha)]));
    let status_sha = head_sha;
    api.expect_get_pull_request().returning(move |_, number| {
        let mut pr = pull_request(number, "branch", &status_sha);
        pr.mergeable = Some(true);
        pr.mergeable_state = Some("dirty".to_owned());
        Ok(pr)
    });

    let hook = GitHubPrWriteHook::new(Arc::new(api), "url", "acme/widgets", "branch")
        .with_allow_empty_diff_merge_statuses(BTreeSet::from(["DIRTY".to_owned()]));
    let change = transform(root.join("work"), "update", "feature/x");
    // The tree is identical but DIRTY is in the upload list, so the
    // push proceeds.
    hook.before_push(&repo, &change).await.unwrap();
}
