// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows PowerShell command synthesis (§4.3, §4.7).

use crate::PlatformAdapter;
use fnerd_core::command::{CommandRequest, Privilege};
use fnerd_core::config::HostEntry;
use fnerd_core::remote_artifact::RemoteArtifact;

pub struct WindowsAdapter;

const EXIT_SENTINEL: &str = "_exit.sentinel";
const STDOUT_LOG: &str = "_stdout.log";

impl PlatformAdapter for WindowsAdapter {
    fn mkdir_p(&self, path: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Responder,
            "runscript",
            format!("New-Item -ItemType Directory -Force -Path \"{path}\" | Out-Null"),
        )
    }

    fn expand_archive(&self, archive_path: &str, dest: &str, expected_entry: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Responder,
            "runscript",
            format!(
                "Expand-Archive -Path \"{archive_path}\" -DestinationPath \"{dest}\" -Force; \
                 if (-not (Test-Path \"{dest}\\{expected_entry}\")) {{ throw \"expand_archive: missing {expected_entry}\" }}"
            ),
        )
    }

    fn launch_background(&self, workspace: &str, invocation: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Responder,
            "runscript",
            format!(
                "Start-Process -FilePath cmd.exe -ArgumentList '/c {invocation} \
                 > \"{workspace}\\{STDOUT_LOG}\" 2>&1 & echo %errorlevel% > \"{workspace}\\{EXIT_SENTINEL}\"' \
                 -WindowStyle Hidden"
            ),
        )
    }

    fn list_glob(&self, dir: &str, glob: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Read,
            "runscript",
            format!(
                "Get-ChildItem -Path \"{dir}\" -Filter \"{glob}\" -ErrorAction SilentlyContinue \
                 | Select-Object -ExpandProperty FullName"
            ),
        )
    }

    fn stat(&self, path: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Read,
            "runscript",
            format!(
                "Get-Item -Path \"{path}\" -ErrorAction SilentlyContinue \
                 | Select-Object Length, @{{n='MtimeMs';e={{[DateTimeOffset]$_.LastWriteTimeUtc.ToUnixTimeMilliseconds()}}}} \
                 | ConvertTo-Json -Compress"
            ),
        )
    }

    fn parse_stat(&self, path: &str, stdout: &str) -> Option<RemoteArtifact> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let size = value.get("Length")?.as_u64()?;
        let mtime_ms = value.get("MtimeMs")?.as_u64()?;
        Some(RemoteArtifact::new(path, size, mtime_ms))
    }

    fn read_exit_sentinel(&self, workspace: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Read,
            "runscript",
            format!("Get-Content -Path \"{workspace}\\{EXIT_SENTINEL}\" -ErrorAction SilentlyContinue"),
        )
    }

    fn parse_exit_sentinel(&self, stdout: &str) -> Option<i32> {
        stdout.trim().parse::<i32>().ok()
    }

    fn tail(&self, path: &str, bytes: u64) -> CommandRequest {
        CommandRequest::new(
            Privilege::Read,
            "runscript",
            format!(
                "$c = Get-Content -Raw -Path \"{path}\" -ErrorAction SilentlyContinue; \
                 if ($c) {{ $c.Substring([Math]::Max(0, $c.Length - {bytes})) }}"
            ),
        )
    }

    fn rmrf(&self, path: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Responder,
            "runscript",
            format!("Remove-Item -Path \"{path}\" -Recurse -Force -ErrorAction SilentlyContinue"),
        )
    }

    fn sha256(&self, path: &str) -> CommandRequest {
        CommandRequest::new(
            Privilege::Read,
            "runscript",
            format!("(Get-FileHash -Path \"{path}\" -Algorithm SHA256 -ErrorAction SilentlyContinue).Hash"),
        )
    }

    fn parse_sha256(&self, stdout: &str) -> Option<String> {
        let trimmed = stdout.trim();
        if trimmed.len() == 64 {
            Some(trimmed.to_ascii_lowercase())
        } else {
            None
        }
    }

    fn append_host_entries(&self, entries: &[HostEntry]) -> Option<CommandRequest> {
        if entries.is_empty() {
            return None;
        }
        let script = entries
            .iter()
            .map(|e| format!(r"Add-Content -Path 'C:\Windows\System32\drivers\etc\hosts' -Value '{} {}'", e.ip, e.hostname))
            .collect::<Vec<_>>()
            .join("; ");
        Some(CommandRequest::new(Privilege::Admin, "runscript", script))
    }
}
