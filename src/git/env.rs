//! Deterministic environment handling for git subprocesses.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

/// Environment variable that points at a directory holding the `git`
/// executable.
pub const GIT_EXEC_PATH: &str = "GIT_EXEC_PATH";

/// Explicit environment map passed to every git invocation.
///
/// Subprocesses never inherit the full parent environment; only the
/// variables captured here are visible, which keeps invocations
/// reproducible. Interactive prompting is disabled by setting
/// `GIT_TERMINAL_PROMPT=0` unless explicitly re-enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitEnvironment {
    env: BTreeMap<String, String>,
    prompt_disabled: bool,
}

impl GitEnvironment {
    /// Creates an environment from an explicit variable map.
    #[must_use]
    pub const fn new(env: BTreeMap<String, String>) -> Self {
        Self {
            env,
            prompt_disabled: true,
        }
    }

    /// Captures the variables git subprocesses need from the parent
    /// process: `PATH` for binary lookup, `HOME` for global config, and
    /// `GIT_EXEC_PATH` when set.
    #[must_use]
    pub fn from_system() -> Self {
        let mut env = BTreeMap::new();
        for key in ["PATH", "HOME", GIT_EXEC_PATH] {
            if let Ok(value) = std::env::var(key) {
                env.insert(key.to_owned(), value);
            }
        }
        Self::new(env)
    }

    /// Re-enables interactive prompting (disabled by default).
    #[must_use]
    pub const fn with_prompt(mut self) -> Self {
        self.prompt_disabled = false;
        self
    }

    /// Returns a copy with prompting disabled.
    #[must_use]
    pub const fn with_no_prompt(mut self) -> Self {
        self.prompt_disabled = true;
        self
    }

    /// Adds or replaces one variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The effective variable map for a subprocess.
    #[must_use]
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        if self.prompt_disabled {
            env.insert("GIT_TERMINAL_PROMPT".to_owned(), "0".to_owned());
        }
        env
    }

    /// Resolves the git executable: `$GIT_EXEC_PATH/git` when the variable
    /// is present in this environment, otherwise bare `git` found through
    /// `PATH`.
    #[must_use]
    pub fn resolve_git_binary(&self) -> Utf8PathBuf {
        self.env.get(GIT_EXEC_PATH).map_or_else(
            || Utf8PathBuf::from("git"),
            |exec_path| Utf8PathBuf::from(exec_path).join("git"),
        )
    }
}

impl Default for GitEnvironment {
    fn default() -> Self {
        Self::from_system()
    }
}
