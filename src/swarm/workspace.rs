//! Isolated per-worker workspaces backed by git worktrees.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info};

/// A failed external command, with its combined output trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: String,
    pub output: String,
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.command, self.output)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace for branch {branch}: {failure}")]
    Create {
        branch: String,
        failure: CommandFailure,
    },

    #[error("Workspace cleanup failed: {}", join_failures(.0))]
    Cleanup(Vec<CommandFailure>),

    #[error("Failed to list workspaces: {0}")]
    List(CommandFailure),

    #[error("Workspace IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_failures(failures: &[CommandFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Creates and tears down the working directory a worker operates in.
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    /// Creates a workspace on a new branch and returns its absolute path.
    async fn create(&self, branch: &str) -> Result<PathBuf, WorkspaceError>;

    /// Removes the workspace and its branch. Every step is attempted even
    /// after an earlier one fails.
    async fn remove(&self, path: &Path, branch: &str) -> Result<(), WorkspaceError>;

    /// Paths of all workspaces currently registered.
    async fn list(&self) -> Result<Vec<PathBuf>, WorkspaceError>;
}

/// Provisions workspaces with `git worktree` under `<worktree_root>/<sanitized branch>`.
#[derive(Debug, Clone)]
pub struct GitWorktreeManager {
    project_root: PathBuf,
    worktree_root: PathBuf,
}

impl GitWorktreeManager {
    pub fn new(project_root: impl Into<PathBuf>, worktree_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            worktree_root: worktree_root.into(),
        }
    }

    pub fn worktree_root(&self) -> &Path {
        &self.worktree_root
    }

    pub fn path_for_branch(&self, branch: &str) -> PathBuf {
        self.worktree_root.join(sanitize_branch_for_dir(branch))
    }

    async fn git(&self, args: &[&str]) -> Result<String, CommandFailure> {
        let command = format!("git {}", args.join(" "));
        debug!("Running {} in {}", command, self.project_root.display());

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.project_root)
            .output()
            .await
            .map_err(|e| CommandFailure {
                command: command.clone(),
                output: e.to_string(),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            let failure = CommandFailure {
                command,
                output: combined.trim().to_string(),
            };
            error!("{}", failure);
            Err(failure)
        }
    }
}

#[async_trait]
impl WorkspaceProvisioner for GitWorktreeManager {
    async fn create(&self, branch: &str) -> Result<PathBuf, WorkspaceError> {
        tokio::fs::create_dir_all(&self.worktree_root).await?;

        let path = self.path_for_branch(branch);
        let path_arg = path.to_string_lossy().into_owned();
        self.git(&["worktree", "add", "-b", branch, path_arg.as_str()])
            .await
            .map_err(|failure| WorkspaceError::Create {
                branch: branch.to_string(),
                failure,
            })?;

        info!("Created worktree {} on branch {}", path.display(), branch);
        Ok(path)
    }

    async fn remove(&self, path: &Path, branch: &str) -> Result<(), WorkspaceError> {
        let mut failures = Vec::new();

        let path_arg = path.to_string_lossy().into_owned();
        if let Err(failure) = self
            .git(&["worktree", "remove", "--force", path_arg.as_str()])
            .await
        {
            failures.push(failure);
        }

        if !branch.is_empty() {
            if let Err(failure) = self.git(&["branch", "-D", branch]).await {
                failures.push(failure);
            }
        }

        if failures.is_empty() {
            info!("Removed worktree {}", path.display());
            Ok(())
        } else {
            Err(WorkspaceError::Cleanup(failures))
        }
    }

    async fn list(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let output = self
            .git(&["worktree", "list", "--porcelain"])
            .await
            .map_err(WorkspaceError::List)?;

        Ok(output
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .collect())
    }
}

/// Converts a branch name into a single safe directory name.
pub fn sanitize_branch_for_dir(branch: &str) -> String {
    branch
        .replace(['/', '\\', ':'], "-")
        .replace("..", "-")
        .trim_matches(['-', '.'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_branch_for_dir() {
        assert_eq!(
            sanitize_branch_for_dir("swarm/auth/0123456789abcdef"),
            "swarm-auth-0123456789abcdef"
        );
        assert_eq!(sanitize_branch_for_dir("../escape"), "escape");
        assert_eq!(sanitize_branch_for_dir("c:\\x"), "c--x");
        assert_eq!(sanitize_branch_for_dir(".hidden/"), "hidden");
    }

    #[test]
    fn test_cleanup_error_lists_every_failure() {
        let err = WorkspaceError::Cleanup(vec![
            CommandFailure {
                command: "git worktree remove --force /tmp/x".to_string(),
                output: "not a working tree".to_string(),
            },
            CommandFailure {
                command: "git branch -D swarm/m/w".to_string(),
                output: "branch not found".to_string(),
            },
        ]);
        let message = err.to_string();
        assert!(message.contains("not a working tree"));
        assert!(message.contains("branch not found"));
    }

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q"],
            vec![
                "-c",
                "user.name=Stratus Test",
                "-c",
                "user.email=test@stratus.local",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                "init",
            ],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(dir)
                .status()
                .await
                .unwrap();
            assert!(status.success(), "git {:?} failed", args);
        }
    }

    #[tokio::test]
    async fn test_git_worktree_lifecycle() {
        if !git_available().await {
            eprintln!("git not available, skipping");
            return;
        }

        let repo = TempDir::new().unwrap();
        init_repo(repo.path()).await;
        let manager = GitWorktreeManager::new(repo.path(), repo.path().join(".stratus/worktrees"));

        let path = manager.create("swarm/demo/abc123").await.unwrap();
        assert!(path.ends_with("swarm-demo-abc123"));
        assert!(path.exists());

        let listed = manager.list().await.unwrap();
        assert!(listed.iter().any(|p| p.ends_with("swarm-demo-abc123")));

        manager.remove(&path, "swarm/demo/abc123").await.unwrap();
        assert!(!path.exists());

        // Second removal fails on both steps and reports both
        let err = manager.remove(&path, "swarm/demo/abc123").await.unwrap_err();
        assert_matches!(err, WorkspaceError::Cleanup(failures) if failures.len() == 2);
    }

    #[tokio::test]
    async fn test_create_outside_repository_fails() {
        if !git_available().await {
            return;
        }

        let not_a_repo = TempDir::new().unwrap();
        let manager = GitWorktreeManager::new(not_a_repo.path(), not_a_repo.path().join("wt"));
        assert_matches!(
            manager.create("swarm/x/y").await,
            Err(WorkspaceError::Create { branch, .. }) if branch == "swarm/x/y"
        );
    }
}
