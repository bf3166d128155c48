//! Querying credentials through `git credential fill`.

use std::fmt;

use url::Url;

use super::error::GitError;
use super::repository::GitRepository;

/// A username/password pair returned by a git credential helper.
///
/// The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct UserPassword {
    username: String,
    password: String,
}

impl UserPassword {
    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// The password. Callers must keep it out of logs and error messages.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPassword")
            .field("username", &self.username)
            .field("password", &"(hidden)")
            .finish()
    }
}

/// Driver for `git credential fill`.
///
/// Runs inside a repository so that credential helpers configured in the
/// local git config take effect. Interactive prompting stays disabled;
/// when no helper can answer, the call fails instead of blocking on a
/// terminal.
#[derive(Debug, Clone, Copy)]
pub struct GitCredential;

impl GitCredential {
    /// Asks the configured credential helpers for the credentials of
    /// `url`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Validation`] when the URL cannot be parsed or
    /// has no protocol, and [`GitError::Repo`] when no helper returns a
    /// username and password.
    pub async fn fill(repo: &GitRepository, url: &str) -> Result<UserPassword, GitError> {
        let parsed = Url::parse(url)
            .map_err(|_| GitError::validation(format!("Cannot get credentials for {url}")))?;
        let protocol = parsed.scheme();
        if protocol.is_empty() {
            return Err(GitError::validation(format!(
                "Cannot find the protocol for {url}"
            )));
        }
        let host = parsed.host_str().ok_or_else(|| {
            GitError::validation(format!("Cannot find the host for {url}"))
        })?;
        let mut request = format!("protocol={protocol}\nhost={host}\n");
        let path = parsed.path().trim_start_matches('/');
        if !path.is_empty() {
            request.push_str(&format!("path={path}\n"));
        }
        request.push('\n');

        // The output of this command carries the password. It is parsed
        // here and must never be logged or attached to an error.
        let output = repo
            .git_with_input(&request, &["credential", "fill"])
            .await?;
        if !output.success() {
            if output.stderr().contains("could not read") {
                return Err(GitError::validation(
                    "Interactive prompting of passwords for git is disabled, \
                     use git credential store before running the migration",
                ));
            }
            return Err(GitError::repo(format!(
                "Error getting credentials:\n{}",
                output.stderr()
            )));
        }

        let mut found_username = None;
        let mut found_password = None;
        for line in output.stdout().lines() {
            match line.split_once('=') {
                Some(("username", value)) => found_username = Some(value.to_owned()),
                Some(("password", value)) => found_password = Some(value.to_owned()),
                _ => {}
            }
        }
        let username = found_username.ok_or_else(|| {
            GitError::repo(format!("git credentials for {url} didn't return a username"))
        })?;
        let password = found_password.ok_or_else(|| {
            GitError::repo(format!("git credentials for {url} didn't return a password"))
        })?;
        Ok(UserPassword { username, password })
    }
}
