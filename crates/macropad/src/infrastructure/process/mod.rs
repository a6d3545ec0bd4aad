//! Detached command spawning for `cmd` macros and layer entry commands.
//!
//! # Detaching (for beginners)
//!
//! A terminal delivers Ctrl-C to every process in the foreground *process
//! group*.  If a launched program stayed in the daemon's group, stopping the
//! daemon would also kill, say, the terminal emulator a macro just opened.
//! [`DetachedCommandRunner`] therefore starts each child as the leader of a
//! new process group (`setpgid(0, 0)` via `CommandExt::process_group`).
//!
//! The child's stdin, stdout, and stderr are connected to `/dev/null`, and a
//! small background thread reaps it when it exits, so the dispatch loop never
//! waits on a child and no zombies pile up.
//!
//! # Argument expansion
//!
//! Every argument is expanded like a shell would before a word is split:
//! `$VAR` and `${VAR}` are replaced by the environment variable's value
//! (unset variables are left as written), then a leading `~` or `~/` is
//! replaced by the user's home directory.

pub mod mock;

use std::path::Path;
use std::process::{Command, Stdio};

use macropad_core::CommandSpec;
use tracing::{debug, warn};

use crate::application::dispatch_event::{CommandError, CommandRunner};

/// Spawns commands as detached process-group leaders.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedCommandRunner;

impl CommandRunner for DetachedCommandRunner {
    fn spawn_detached(&self, command: &CommandSpec) -> Result<(), CommandError> {
        let home = dirs::home_dir();
        let argv: Vec<String> = command
            .argv()
            .into_iter()
            .map(|arg| expand_arg(arg, |name| std::env::var(name).ok(), home.as_deref()))
            .collect();
        let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!("spawned {program} as pid {pid}");

        let reaper = std::thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => debug!("pid {pid} exited: {status}"),
                Err(e) => debug!("pid {pid} could not be reaped: {e}"),
            });
        if let Err(e) = reaper {
            warn!("no reaper thread for pid {pid}: {e}");
        }
        Ok(())
    }
}

/// Expands environment variables, then a leading home-directory tilde.
pub fn expand_arg(
    arg: &str,
    lookup: impl Fn(&str) -> Option<String>,
    home: Option<&Path>,
) -> String {
    expand_home(&expand_vars(arg, lookup), home)
}

/// Replaces `$NAME` and `${NAME}` with `lookup(NAME)`; unknown names and
/// malformed references are kept verbatim.
pub fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => {
                out.push_str(&value);
                rest = &after[consumed..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Replaces a leading `~` (alone or followed by `/`) with `home`.
pub fn expand_home(input: &str, home: Option<&Path>) -> String {
    let Some(home) = home else {
        return input.to_string();
    };
    match input.strip_prefix('~') {
        Some("") => home.to_string_lossy().into_owned(),
        Some(tail) if tail.starts_with('/') => format!("{}{tail}", home.to_string_lossy()),
        _ => input.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── expand_vars ───────────────────────────────────────────────────────────

    #[test]
    fn test_expand_vars_replaces_plain_and_braced_names() {
        let lookup = env(&[("XDG_PICTURES", "/p"), ("USER", "sam")]);

        assert_eq!(expand_vars("$XDG_PICTURES/shot.png", &lookup), "/p/shot.png");
        assert_eq!(expand_vars("${USER}_notes", &lookup), "sam_notes");
        assert_eq!(expand_vars("a$USER-b", &lookup), "asam-b");
    }

    #[test]
    fn test_expand_vars_keeps_unset_and_malformed_references() {
        let lookup = env(&[]);

        assert_eq!(expand_vars("$NOPE/x", &lookup), "$NOPE/x");
        assert_eq!(expand_vars("${NOPE}", &lookup), "${NOPE}");
        assert_eq!(expand_vars("cost: 5$", &lookup), "cost: 5$");
        assert_eq!(expand_vars("${unterminated", &lookup), "${unterminated");
        assert_eq!(expand_vars("$$", &lookup), "$$");
    }

    #[test]
    fn test_expand_vars_does_not_rescan_substituted_values() {
        let lookup = env(&[("A", "$B"), ("B", "oops")]);
        assert_eq!(expand_vars("$A", &lookup), "$B");
    }

    // ── expand_home ───────────────────────────────────────────────────────────

    #[test]
    fn test_expand_home_replaces_leading_tilde_only() {
        let home = Path::new("/home/sam");

        assert_eq!(expand_home("~", Some(home)), "/home/sam");
        assert_eq!(expand_home("~/bin/run.sh", Some(home)), "/home/sam/bin/run.sh");
        assert_eq!(expand_home("~other/x", Some(home)), "~other/x");
        assert_eq!(expand_home("/opt/~/x", Some(home)), "/opt/~/x");
    }

    #[test]
    fn test_expand_home_without_home_dir_is_identity() {
        assert_eq!(expand_home("~/x", None), "~/x");
    }

    #[test]
    fn test_expand_arg_expands_vars_before_tilde() {
        let lookup = env(&[("SCRIPTS", "~/scripts")]);
        let home = Path::new("/home/sam");

        assert_eq!(
            expand_arg("$SCRIPTS/run.sh", lookup, Some(home)),
            "/home/sam/scripts/run.sh"
        );
    }

    // ── DetachedCommandRunner ─────────────────────────────────────────────────

    #[test]
    fn test_spawn_of_missing_program_reports_program_name() {
        let runner = DetachedCommandRunner;
        let command = CommandSpec::Program("/nonexistent/macropad-test-binary".into());

        let err = runner.spawn_detached(&command).unwrap_err();

        assert!(matches!(
            err,
            CommandError::Spawn { ref program, .. } if program == "/nonexistent/macropad-test-binary"
        ));
    }

    #[test]
    fn test_empty_argv_is_rejected() {
        let runner = DetachedCommandRunner;
        let err = runner.spawn_detached(&CommandSpec::Argv(Vec::new())).unwrap_err();
        assert!(matches!(err, CommandError::Empty));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_of_true_succeeds_without_waiting() {
        let runner = DetachedCommandRunner;
        let command = CommandSpec::Argv(vec!["sh".into(), "-c".into(), "exit 0".into()]);

        assert!(runner.spawn_detached(&command).is_ok());
    }
}
