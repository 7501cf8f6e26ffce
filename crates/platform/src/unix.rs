// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! POSIX shell command synthesis for mac/linux/unix-other hosts (§4.3,
//! §4.7). Portable between GNU and BSD userlands (mac's `stat` takes
//! different flags than Linux's).

use crate::PlatformAdapter;
use fnerd_core::command::{CommandRequest, Privilege};
use fnerd_core::config::HostEntry;
use fnerd_core::remote_artifact::RemoteArtifact;

pub struct UnixAdapter;

const EXIT_SENTINEL: &str = "_exit.sentinel";
const PID_SENTINEL: &str = "_pid.sentinel";
const STDOUT_LOG: &str = "_stdout.log";

impl PlatformAdapter for UnixAdapter {
    fn mkdir_p(&self, path: &str) -> CommandRequest {
        CommandRequest::new(Privilege::Responder, "runscript", format!("mkdir -p '{path}'"))
    }

    fn expand_archive(&self, archive_path: &str, dest: &str, expected_entry: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Responder,
            "runscript",
            format!("unzip -o '{archive_path}' -d '{dest}' && test -e '{dest}/{expected_entry}'"),
        )
    }

    fn launch_background(&self, workspace: &str, invocation: &str) -> CommandRequest {
        // Deliberately not `nohup`: it fails under the constrained TTY the
        // RTR channel provides.
        CommandRequest::new(
            Privilege::Responder,
            "runscript",
            format!(
                "({invocation} < /dev/null > '{workspace}/{STDOUT_LOG}' 2>&1; \
                 echo $? > '{workspace}/{EXIT_SENTINEL}') & echo $! > '{workspace}/{PID_SENTINEL}'"
            ),
        )
    }

    fn list_glob(&self, dir: &str, glob: &str) -> CommandRequest {
        CommandRequest::new(Privilege::Read, "runscript", format!("find '{dir}' -maxdepth 1 -name '{glob}'"))
    }

    fn stat(&self, path: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Read,
            "runscript",
            format!("stat -c '%s %Y' '{path}' 2>/dev/null || stat -f '%z %m' '{path}' 2>/dev/null"),
        )
    }

    fn parse_stat(&self, path: &str, stdout: &str) -> Option<RemoteArtifact> {
        let line = stdout.lines().next()?.trim();
        let mut parts = line.split_whitespace();
        let size: u64 = parts.next()?.parse().ok()?;
        let mtime_s: u64 = parts.next()?.parse().ok()?;
        Some(RemoteArtifact::new(path, size, mtime_s * 1000))
    }

    fn read_exit_sentinel(&self, workspace: &str) -> CommandRequest {
        CommandRequest::new(Privilege::Read, "runscript", format!("cat '{workspace}/{EXIT_SENTINEL}' 2>/dev/null"))
    }

    fn parse_exit_sentinel(&self, stdout: &str) -> Option<i32> {
        stdout.trim().parse::<i32>().ok()
    }

    fn tail(&self, path: &str, bytes: u64) -> CommandRequest {
        CommandRequest::new(Privilege::Read, "runscript", format!("tail -c {bytes} '{path}' 2>/dev/null"))
    }

    fn rmrf(&self, path: &str) -> CommandRequest {
        CommandRequest::new(Privilege::Responder, "runscript", format!("rm -rf '{path}'"))
    }

    fn sha256(&self, path: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Read,
            "runscript",
            format!("sha256sum '{path}' 2>/dev/null || shasum -a 256 '{path}' 2>/dev/null"),
        )
    }

    fn parse_sha256(&self, stdout: &str) -> Option<String> {
        let digest = stdout.split_whitespace().next()?;
        if digest.len() == 64 {
            Some(digest.to_ascii_lowercase())
        } else {
            None
        }
    }

    fn append_host_entries(&self, entries: &[HostEntry]) -> Option<CommandRequest> {
        if entries.is_empty() {
            return None;
        }
        let script = entries.iter().map(|e| format!("echo '{} {}' >> /etc/hosts", e.ip, e.hostname)).collect::<Vec<_>>().join("; ");
        Some(CommandRequest::new(Privilege::Admin, "runscript", script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_background_avoids_nohup() {
        let cmd = UnixAdapter.launch_background("/opt/0x4n6nerd", "./uac -p full /opt/0x4n6nerd/out");
        assert!(!cmd.command_line.contains("nohup"));
        assert!(cmd.command_line.contains("< /dev/null"));
    }

    #[test]
    fn stat_falls_back_between_gnu_and_bsd() {
        let cmd = UnixAdapter.stat("/opt/0x4n6nerd/out.7z");
        assert!(cmd.command_line.contains("stat -c"));
        assert!(cmd.command_line.contains("stat -f"));
    }

    #[test]
    fn parse_stat_reads_size_and_mtime_seconds() {
        let artifact = UnixAdapter.parse_stat("/opt/0x4n6nerd/out.7z", "2048 1700000000\n").unwrap();
        assert_eq!(artifact.size_bytes, 2048);
        assert_eq!(artifact.last_modified_epoch_ms, 1_700_000_000_000);
    }

    #[test]
    fn parse_stat_returns_none_on_garbage() {
        assert!(UnixAdapter.parse_stat("/missing", "").is_none());
    }

    #[test]
    fn rmrf_is_best_effort_recursive() {
        let cmd = UnixAdapter.rmrf("/opt/0x4n6nerd");
        assert_eq!(cmd.command_line, "rm -rf '/opt/0x4n6nerd'");
    }

    #[test]
    fn parse_sha256_takes_first_whitespace_field() {
        let digest = "b".repeat(64);
        assert_eq!(UnixAdapter.parse_sha256(&format!("{digest}  out.7z\n")), Some(digest));
        assert!(UnixAdapter.parse_sha256("").is_none());
    }

    #[test]
    fn append_host_entries_is_none_when_empty() {
        assert!(UnixAdapter.append_host_entries(&[]).is_none());
    }

    #[test]
    fn append_host_entries_appends_each_entry_under_admin_privilege() {
        let entries = vec![
            HostEntry { ip: "10.0.0.1".to_string(), hostname: "objectstore.internal".to_string() },
            HostEntry { ip: "10.0.0.2".to_string(), hostname: "objectstore-2.internal".to_string() },
        ];
        let cmd = UnixAdapter.append_host_entries(&entries).unwrap();
        assert_eq!(cmd.privilege, Privilege::Admin);
        assert!(cmd.command_line.contains("echo '10.0.0.1 objectstore.internal' >> /etc/hosts"));
        assert!(cmd.command_line.contains("echo '10.0.0.2 objectstore-2.internal' >> /etc/hosts"));
    }
}
