//! Remote control of a running instance from a second invocation.
//!
//! `toggle`, `cycle` and `quit` are plain signals. `set <param> <value>`
//! appends a line to the instance's edit queue file and sends SIGHUP; the
//! instance takes the whole queue between ticks.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PROCESS_NAME: &str = "turnbinds";

/// Subcommands that are a bare signal: (name, signal, log label).
const SIGNAL_COMMANDS: [(&str, libc::c_int, &str); 3] = [
    ("toggle", libc::SIGUSR1, "Toggle"),
    ("cycle", libc::SIGUSR2, "Cycle"),
    ("quit", libc::SIGTERM, "Quit"),
];

/// Signal that tells the instance its edit queue has lines.
pub const EDIT_SIGNAL: libc::c_int = libc::SIGHUP;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Signal { signal: libc::c_int, label: &'static str },
    Set { name: String, value: String },
}

impl Command {
    /// Parse the arguments after the program name. `None` means the
    /// arguments are not a remote command and belong to the normal CLI.
    pub fn from_args(args: &[String]) -> Option<Result<Command, String>> {
        let (first, rest) = args.split_first()?;
        if first == "set" {
            let Some((name, value)) = rest.split_first() else {
                return Some(Err("usage: turnbinds set <param> <value...>".into()));
            };
            return Some(Ok(Command::Set {
                name: name.clone(),
                value: value.join(" "),
            }));
        }
        SIGNAL_COMMANDS
            .iter()
            .find(|(cmd, _, _)| *cmd == first.as_str())
            .map(|&(_, signal, label)| Ok(Command::Signal { signal, label }))
    }

    /// Deliver to the instance `pid`.
    pub fn send(&self, pid: i32) -> io::Result<&'static str> {
        match self {
            Command::Signal { signal, label } => {
                kill(pid, *signal)?;
                Ok(*label)
            }
            Command::Set { name, value } => {
                queue_edit(&edit_queue_path(pid), name, value)?;
                kill(pid, EDIT_SIGNAL)?;
                Ok("Set")
            }
        }
    }
}

/// One queued `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub name: String,
    pub value: String,
}

/// Queue file of instance `pid`, in the runtime dir when there is one.
pub fn edit_queue_path(pid: i32) -> PathBuf {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("{}-{}.edits", PROCESS_NAME, pid))
}

fn queue_edit(path: &Path, name: &str, value: &str) -> io::Result<()> {
    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{} {}", name, value)
}

/// Take every queued edit, oldest first, leaving the queue empty.
pub fn take_edits(path: &Path) -> Vec<Edit> {
    // Move the queue aside first so a concurrent `set` starts a new file.
    let taken = path.with_extension("taken");
    match fs::rename(path, &taken) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("Cannot take edits from {}: {}", path.display(), e);
            return Vec::new();
        }
    }
    let text = fs::read_to_string(&taken).unwrap_or_else(|e| {
        log::warn!("Cannot read {}: {}", taken.display(), e);
        String::new()
    });
    if let Err(e) = fs::remove_file(&taken) {
        log::debug!("Cannot remove {}: {}", taken.display(), e);
    }
    text.lines().filter_map(parse_edit).collect()
}

fn parse_edit(line: &str) -> Option<Edit> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (name, value) = line.split_once(' ').unwrap_or((line, ""));
    Some(Edit {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// PID of another running instance, found by scanning /proc.
pub fn find_running_instance() -> Option<i32> {
    let own = std::process::id() as i32;
    fs::read_dir("/proc")
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let pid: i32 = entry.file_name().to_str()?.parse().ok()?;
            let comm = fs::read_to_string(entry.path().join("comm")).ok()?;
            (pid != own && comm.trim() == PROCESS_NAME).then_some(pid)
        })
        .next()
}

fn kill(pid: i32, signal: libc::c_int) -> io::Result<()> {
    // SAFETY: kill has no memory-safety preconditions.
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn scratch(name: &str) -> PathBuf {
        let file = format!("turnbinds-test-{}-{}.edits", name, std::process::id());
        std::env::temp_dir().join(file)
    }

    #[test]
    fn signal_commands_from_table() {
        assert_eq!(
            Command::from_args(&args(&["cycle"])),
            Some(Ok(Command::Signal {
                signal: libc::SIGUSR2,
                label: "Cycle"
            }))
        );
        assert!(matches!(
            Command::from_args(&args(&["quit", "now"])),
            Some(Ok(Command::Signal { signal: libc::SIGTERM, .. }))
        ));
        assert_eq!(Command::from_args(&args(&["--rate", "500"])), None);
        assert_eq!(Command::from_args(&[]), None);
    }

    #[test]
    fn set_joins_the_value_words() {
        assert_eq!(
            Command::from_args(&args(&["set", "yawspeed", "100", "200"])),
            Some(Ok(Command::Set {
                name: "yawspeed".into(),
                value: "100 200".into()
            }))
        );
        assert!(matches!(Command::from_args(&args(&["set"])), Some(Err(_))));
        // An empty value is passed through and rejected by the instance.
        assert_eq!(
            Command::from_args(&args(&["set", "rate"])),
            Some(Ok(Command::Set {
                name: "rate".into(),
                value: String::new()
            }))
        );
    }

    #[test]
    fn queued_edits_are_taken_once_in_order() {
        let path = scratch("queue");
        let _ = fs::remove_file(&path);
        assert!(take_edits(&path).is_empty());

        queue_edit(&path, "rate", "500").unwrap();
        queue_edit(&path, "yawspeed", "100\n200").unwrap();
        queue_edit(&path, "sleep", "").unwrap();
        assert_eq!(
            take_edits(&path),
            vec![
                Edit {
                    name: "rate".into(),
                    value: "500".into()
                },
                Edit {
                    name: "yawspeed".into(),
                    value: "100 200".into()
                },
                Edit {
                    name: "sleep".into(),
                    value: String::new()
                },
            ]
        );
        assert!(!path.exists());
        assert!(take_edits(&path).is_empty());
    }

    #[test]
    fn own_process_is_not_a_running_instance() {
        let own = std::process::id() as i32;
        assert_ne!(find_running_instance(), Some(own));
    }
}
