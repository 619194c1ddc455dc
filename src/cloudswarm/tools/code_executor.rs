//! Code Execution Tool
//!
//! Runs agent-authored scripts as subprocesses inside a dedicated working
//! directory. Each submission is written to a fresh `tmp_code_<uuid>` file and
//! executed with the matching interpreter, so generated artifacts (plots,
//! CSVs, logs) accumulate in the working directory where later turns can find
//! them.
//!
//! # Example
//!
//! ```ignore
//! use cloudswarm::tools::{CodeExecutor, Language};
//! use std::time::Duration;
//!
//! let executor = CodeExecutor::new("coding_output").with_timeout(Duration::from_secs(300));
//! let result = executor.execute(Language::Python, "print('hello')").await?;
//! assert_eq!(result.stdout.trim(), "hello");
//! ```
//!
//! A script that exits non-zero is *not* an error: the [`ExecutionResult`]
//! carries the exit code and stderr so a coder agent can hand the failure to a
//! debugger. Only timeouts and I/O failures surface as [`CodeExecutionError`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use uuid::Uuid;

/// Interpreter used to run a submitted script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    Python,
    Shell,
}

impl Language {
    /// Parse the language names models commonly emit in fenced code blocks.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Language::Python),
            "bash" | "sh" | "shell" => Some(Language::Shell),
            _ => None,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Shell => "sh",
        }
    }
}

/// Outcome of running one script to completion.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the process exited with status 0
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 if the process was killed by a signal
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Script file name, relative to the working directory
    pub script: String,
}

/// Errors that prevent a script from producing an [`ExecutionResult`]
#[derive(Debug)]
pub enum CodeExecutionError {
    /// The script exceeded its deadline and was killed
    Timeout(Duration),
    /// The script or working directory could not be written, or the
    /// interpreter could not be spawned
    IoError(std::io::Error),
    /// Empty submissions are rejected before anything touches the disk
    EmptyCode,
}

impl std::fmt::Display for CodeExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeExecutionError::Timeout(after) => {
                write!(f, "Execution timed out after {} seconds", after.as_secs())
            }
            CodeExecutionError::IoError(e) => write!(f, "IO error: {}", e),
            CodeExecutionError::EmptyCode => write!(f, "No code was provided"),
        }
    }
}

impl std::error::Error for CodeExecutionError {}

impl From<std::io::Error> for CodeExecutionError {
    fn from(err: std::io::Error) -> Self {
        CodeExecutionError::IoError(err)
    }
}

/// Subprocess-backed script runner rooted at a working directory.
///
/// Cheap to clone and safe to share across agents behind an `Arc`.
#[derive(Clone, Debug)]
pub struct CodeExecutor {
    work_dir: PathBuf,
    timeout: Duration,
    python: String,
    shell: String,
    env_vars: HashMap<String, String>,
}

impl CodeExecutor {
    /// Create an executor writing scripts into `work_dir` (created on first use).
    ///
    /// Defaults: 300 second timeout, `python3` and `/bin/bash` interpreters.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout: Duration::from_secs(300),
            python: "python3".to_string(),
            shell: "/bin/bash".to_string(),
            env_vars: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a specific Python interpreter (e.g. a virtualenv's `bin/python`).
    pub fn with_python(mut self, interpreter: impl Into<String>) -> Self {
        self.python = interpreter.into();
        self
    }

    /// Set an environment variable for every spawned script.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write `code` to a fresh script file and run it to completion.
    pub async fn execute(
        &self,
        language: Language,
        code: &str,
    ) -> Result<ExecutionResult, CodeExecutionError> {
        if code.trim().is_empty() {
            return Err(CodeExecutionError::EmptyCode);
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let script = format!("tmp_code_{}.{}", Uuid::new_v4().simple(), language.extension());
        tokio::fs::write(self.work_dir.join(&script), code).await?;

        let program = match language {
            Language::Python => &self.python,
            Language::Shell => &self.shell,
        };
        log::debug!(
            "cloudswarm::tools::code_executor: running {} {} in {}",
            program,
            script,
            self.work_dir.display()
        );

        let start_time = Instant::now();
        let child = Command::new(program)
            .arg(&script)
            .current_dir(&self.work_dir)
            .envs(&self.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                log::warn!(
                    "cloudswarm::tools::code_executor: {} exceeded {:?}",
                    script,
                    self.timeout
                );
                return Err(CodeExecutionError::Timeout(self.timeout));
            }
        };

        Ok(ExecutionResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration_ms: start_time.elapsed().as_millis() as u64,
            script,
        })
    }
}
