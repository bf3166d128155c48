#![expect(clippy::unwrap_used, reason = "tests panic on failure")]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use rstest::rstest;
use tempfile::TempDir;

use super::api::{MergeRequest, MergeRequestState, MockGitLabApi, Project, User};
use super::mr_destination::{GitLabMrDestination, GitLabMrWriteHook};
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

fn project() -> Project {
    Project {
        id: 42,
        path_with_namespace: "group/repo".to_owned(),
    }
}

fn merge_request(iid: u64, state: MergeRequestState, branch: &str, sha: &str) -> MergeRequest {
    MergeRequest {
        iid,
        state,
        sha: Some(sha.to_owned()),
        source_branch: branch.to_owned(),
        target_branch: "main".to_owned(),
        title: Some("existing".to_owned()),
        description: Some("existing body".to_owned()),
        web_url: format!("https://gitlab.example.com/group/repo/-/merge_requests/{iid}"),
        detailed_merge_status: Some("mergeable".to_owned()),
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

    fn destination(&self, api: MockGitLabApi) -> GitLabMrDestination {
        GitLabMrDestination::with_project_path(&self.remote_url, "group/repo", "main", Arc::new(api))
            .with_committer("Dest Committer", "dest@example.com")
            .with_environment(test_env(&self.root))
    }
}

fn transform(workdir: Utf8PathBuf, summary: &str, context: &str) -> TransformResult {
    TransformResult::new(workdir, summary, write_time()).with_context_reference(context)
}

#[rstest]
#[tokio::test]
async fn write_creates_a_merge_request_for_a_new_branch() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;

    let mut api = MockGitLabApi::new();
    api.expect_get_project()
        .withf(|path| path == "group/repo")
        .times(1)
        .returning(|_| Ok(project()));
    api.expect_list_merge_requests()
        .withf(|id, branch| *id == 42 && branch == "feature_x")
        .times(2)
        .returning(|_, _| Ok(Vec::new()));
    api.expect_create_merge_request()
        .withf(|id, request| {
            *id == 42
                && request.source_branch == "feature_x"
                && request.target_branch == "main"
                && request.title == "update a"
        })
        .returning(|_, _| {
            Ok(merge_request(
                7,
                MergeRequestState::Opened,
                "feature_x",
                &"a".repeat(40),
            ))
        });

    let mut writer = fx.destination(api).writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "two\n")]);
    let effects = writer
        .write(&transform(workdir, "update a\n\ndetail", "feature/x"))
        .await
        .unwrap();

    let mr_effect = effects.last().unwrap();
    assert_eq!(mr_effect.effect_type(), EffectType::Created);
    let reference = mr_effect.destination_ref().unwrap();
    assert_eq!(reference.id(), "7");
    assert_eq!(reference.ref_type(), "merge_request");
    assert_eq!(writer.merge_request_iid(), Some(7));

    let branch_head = fx.remote.rev_parse("refs/heads/feature_x").await.unwrap();
    assert_eq!(branch_head.len(), 40);
}

#[rstest]
#[tokio::test]
async fn a_closed_merge_request_is_reopened_on_update() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;
    let base_sha = fx.seed.rev_parse("HEAD").await.unwrap();

    let existing = merge_request(9, MergeRequestState::Closed, "feature_x", &base_sha);
    let mut api = MockGitLabApi::new();
    api.expect_get_project().returning(|_| Ok(project()));
    api.expect_list_merge_requests()
        .times(2)
        .returning(move |_, _| Ok(vec![existing.clone()]));
    api.expect_update_merge_request()
        .withf(|_, iid, update| {
            *iid == 9
                && update.state_event.as_deref() == Some("reopen")
                && update.title.as_deref() == Some("update a")
        })
        .returning(|_, iid, _| {
            Ok(merge_request(
                iid,
                MergeRequestState::Opened,
                "feature_x",
                &"b".repeat(40),
            ))
        });

    let mut writer = fx.destination(api).writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "two\n")]);
    let effects = writer
        .write(&transform(workdir, "update a", "feature/x"))
        .await
        .unwrap();

    let mr_effect = effects.last().unwrap();
    assert_eq!(mr_effect.effect_type(), EffectType::Updated);
    assert_eq!(mr_effect.destination_ref().unwrap().id(), "9");
}

#[rstest]
#[tokio::test]
async fn redundant_tree_skips_the_push_to_the_existing_merge_request() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;

    let slot: Arc<Mutex<Option<MergeRequest>>> = Arc::new(Mutex::new(None));
    let list_slot = Arc::clone(&slot);
    let mut api = MockGitLabApi::new();
    api.expect_get_project().returning(|_| Ok(project()));
    api.expect_list_merge_requests()
        .returning(move |_, _| Ok(list_slot.lock().unwrap().clone().into_iter().collect()));
    api.expect_create_merge_request().returning(|_, _| {
        Ok(merge_request(
            7,
            MergeRequestState::Opened,
            "feature_x",
            &"a".repeat(40),
        ))
    });

    let destination = fx.destination(api);
    let mut first = destination.writer(Glob::all_files());
    let first_dir = fx.workdir("work1", &[("a.txt", "two\n")]);
    first
        .write(&transform(first_dir, "update a", "feature/x"))
        .await
        .unwrap();

    let branch_sha = fx.remote.rev_parse("refs/heads/feature_x").await.unwrap();
    *slot.lock().unwrap() = Some(merge_request(
        7,
        MergeRequestState::Opened,
        "feature_x",
        &branch_sha,
    ));

    let mut second = destination.writer(Glob::all_files());
    let second_dir = fx.workdir("work2", &[("a.txt", "two\n")]);
    let err = second
        .write(&transform(second_dir, "update a again", "feature/x"))
        .await
        .unwrap_err();
    match err {
        GitError::RedundantChange { message, sha } => {
            assert!(message.contains("/-/merge_requests/7"));
            assert_eq!(sha, branch_sha);
        }
        other => panic!("expected a redundant change, got {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn an_unresolved_assignee_fails_the_write() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;

    let mut api = MockGitLabApi::new();
    api.expect_get_project().returning(|_| Ok(project()));
    api.expect_list_merge_requests().returning(|_, _| Ok(Vec::new()));
    api.expect_list_users()
        .withf(|username| username == "ghost")
        .returning(|_| Ok(Vec::new()));

    let mut writer = fx
        .destination(api)
        .with_assignees(["ghost".to_owned()])
        .writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "two\n")]);
    let err = writer
        .write(&transform(workdir, "update a", "feature/x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[rstest]
#[tokio::test]
async fn assignees_are_resolved_to_user_ids() {
    let fx = Fixture::new().await;
    fx.seed_commit(&[("a.txt", "one\n")], "seed").await;
    fx.push_seed().await;

    let mut api = MockGitLabApi::new();
    api.expect_get_project().returning(|_| Ok(project()));
    api.expect_list_merge_requests().returning(|_, _| Ok(Vec::new()));
    api.expect_list_users().returning(|username| {
        Ok(vec![User {
            id: 31,
            username: username.to_owned(),
        }])
    });
    api.expect_create_merge_request()
        .withf(|_, request| request.assignee_ids == vec![31])
        .returning(|_, _| {
            Ok(merge_request(
                7,
                MergeRequestState::Opened,
                "feature_x",
                &"a".repeat(40),
            ))
        });

    let mut writer = fx
        .destination(api)
        .with_assignees(["reviewer".to_owned()])
        .writer(Glob::all_files());
    let workdir = fx.workdir("work", &[("a.txt", "two\n")]);
    writer
        .write(&transform(workdir, "update a", "feature/x"))
        .await
        .unwrap();
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

    let mut api = MockGitLabApi::new();
    api.expect_list_merge_requests().returning(move |_, _| {
        let mut mr = merge_request(3, MergeRequestState::Opened, "branch", &head_sha);
        mr.detailed_merge_status = Some("conflict".to_owned());
        Ok(vec![mr])
    });

    let hook = GitLabMrWriteHook::new(Arc::new(api), "url", "branch")
        .with_project_id(42)
        .with_allow_empty_diff_merge_statuses(BTreeSet::from(["CONFLICT".to_owned()]));
    let change = transform(root.join("work"), "update", "feature/x");
    // The tree is identical but CONFLICT is in the upload list, so the
    // push proceeds.
    hook.before_push(&repo, &change).await.unwrap();
}
