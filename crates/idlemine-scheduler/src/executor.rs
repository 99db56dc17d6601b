use async_trait::async_trait;
use nix::unistd::User;
use tokio::process::Command;

use idlemine_common::{CommandClass, MineError, Result};

/// Runs a shell command as another UNIX identity and returns its combined output.
///
/// Implementations must stop the underlying process when the returned future is dropped,
/// which is how callers enforce deadlines and shutdown.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, as_user: &str, command: &str, class: CommandClass) -> Result<String>;
}

/// Spawns `sh -c` from `/tmp` with the target user's uid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Numeric ids pass through; names go through NSS, so directory-backed accounts resolve
/// the same way `id <user>` would.
async fn lookup_uid(user: &str, class: CommandClass) -> Result<u32> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(uid);
    }
    let name = user.to_string();
    let found = tokio::task::spawn_blocking(move || User::from_name(&name))
        .await
        .map_err(|e| lookup_error(class, format!("user lookup task failed: {e}")))?
        .map_err(|e| lookup_error(class, format!("failed to resolve user {user:?}: {e}")))?;
    found
        .map(|u| u.uid.as_raw())
        .ok_or_else(|| lookup_error(class, format!("unknown user {user:?}")))
}

fn lookup_error(class: CommandClass, message: String) -> MineError {
    MineError::Exec {
        class,
        message,
        output: String::new(),
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, as_user: &str, command: &str, class: CommandClass) -> Result<String> {
        let uid = lookup_uid(as_user, class).await?;
        tracing::debug!(user = as_user, uid, %class, "exec");

        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("cd /tmp && {command}"))
            .uid(uid)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MineError::Exec {
                class,
                message: format!("failed to spawn: {e}"),
                output: String::new(),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(MineError::Exec {
                class,
                message: output.status.to_string(),
                output: combined,
            });
        }
        Ok(combined)
    }
}
