//! Best-effort detection of a project that is open in the editor.

use crate::constants::EDITOR_EXECUTABLES;
use crate::discovery;
use crate::registry::{canonical_root, normalize_path};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

pub trait ProcessSource: Send + Sync {
    /// Command lines of the running processes whose executable name is a
    /// known editor binary. Each call reflects the current process table.
    fn editor_command_lines(&self) -> Vec<Vec<String>>;
}

pub struct SystemProcesses;

impl ProcessSource for SystemProcesses {
    fn editor_command_lines(&self) -> Vec<Vec<String>> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        // Processes that exit or deny access mid-refresh are simply absent.
        system
            .processes()
            .values()
            .filter(|process| {
                let name = process.name().to_string_lossy();
                EDITOR_EXECUTABLES.contains(&name.as_ref())
            })
            .map(|process| {
                tracing::trace!(pid = %process.pid(), "editor process");
                process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect()
            })
            .collect()
    }
}

pub fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

fn normalize_arg(arg: &str) -> PathBuf {
    normalize_path(Path::new(arg.trim_matches('"')))
}

fn same_path(a: &Path, b: &Path) -> bool {
    if cfg!(windows) {
        a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
    } else {
        a == b
    }
}

pub fn is_open_with(root: &Path, processes: &dyn ProcessSource) -> bool {
    let Some(descriptor) = discovery::find_descriptor(root) else {
        tracing::debug!(root = %root.display(), "no descriptor file, assuming closed");
        return false;
    };
    let descriptor_path = canonical_root(&root.join(descriptor));

    let open = processes.editor_command_lines().iter().any(|cmdline| {
        cmdline
            .iter()
            .any(|arg| same_path(&normalize_arg(arg), &descriptor_path))
    });

    tracing::debug!(
        descriptor = %descriptor_path.display(),
        open,
        "checked editor processes"
    );
    open
}
