use tracing::{info, warn};

use crate::config::HooksConfig;
use crate::error::{LxdeltaError, Result};
use crate::platform::shell::command_for_script;

/// Per-entity values exposed to hook commands, both as environment variables
/// (`LXDELTA_ENTITY`, `LXDELTA_TARGET`, `LXDELTA_ERROR`) and as `{entity}`,
/// `{target}` and `{error}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub entity: String,
    pub target: String,
    pub error: Option<String>,
}

impl HookContext {
    pub fn new(entity: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            target: target.into(),
            error: None,
        }
    }
}

/// Run the hook lifecycle around one entity's backup:
///
/// 1. `before` hooks; the first failure aborts the action
/// 2. the action itself
/// 3. `after` on success, `failed` on error (including a failed `before`)
/// 4. `finally` in every case
///
/// Failures of `after`, `failed` and `finally` hooks are logged and do not
/// change the result.
pub fn run_with_hooks<F, T>(hooks: &HooksConfig, ctx: &mut HookContext, action: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let action_result = match run_hook_list(&hooks.before, ctx) {
        Ok(()) => action(),
        Err(e) => Err(e),
    };

    match &action_result {
        Ok(_) => log_hook_errors(run_hook_list(&hooks.after, ctx)),
        Err(e) => {
            ctx.error = Some(e.to_string());
            log_hook_errors(run_hook_list(&hooks.failed, ctx));
        }
    }

    log_hook_errors(run_hook_list(&hooks.finally, ctx));
    action_result
}

fn run_hook_list(cmds: &[String], ctx: &HookContext) -> Result<()> {
    for cmd in cmds {
        execute_hook_command(cmd, ctx)?;
    }
    Ok(())
}

fn execute_hook_command(cmd: &str, ctx: &HookContext) -> Result<()> {
    let expanded = substitute_variables(cmd, ctx);
    info!(entity = %ctx.entity, "running hook: {expanded}");

    let mut child = command_for_script(&expanded);
    child.env("LXDELTA_ENTITY", &ctx.entity);
    child.env("LXDELTA_TARGET", &ctx.target);
    match &ctx.error {
        Some(error) => child.env("LXDELTA_ERROR", error),
        None => child.env_remove("LXDELTA_ERROR"),
    };

    let output = child
        .output()
        .map_err(|e| LxdeltaError::Hook(format!("failed to execute '{expanded}': {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(LxdeltaError::Hook(format!(
            "hook '{expanded}' exited with {code}: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

fn substitute_variables(cmd: &str, ctx: &HookContext) -> String {
    cmd.replace("{entity}", &shell_escape(&ctx.entity))
        .replace("{target}", &shell_escape(&ctx.target))
        .replace("{error}", &shell_escape(ctx.error.as_deref().unwrap_or("")))
}

fn shell_escape(input: &str) -> String {
    if input.is_empty() {
        return "''".to_string();
    }
    let escaped = input.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

fn log_hook_errors(result: Result<()>) {
    if let Err(e) = result {
        warn!("hook warning: {e}");
    }
}
