use crate::error::{Result, SkylineError};
use log::{debug, info};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

pub const DEFAULT_TOOL: &str = "openscad";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const MAX_STDERR_LEN: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Compiles an OpenSCAD program into a mesh by running
/// `<tool> -o <staging file> <program file>`.
///
/// The program goes to a temporary `skyline*.scad` file and the tool writes
/// into a staging file next to `output` that keeps its extension, since the
/// tool picks the mesh format from it. The staging file is renamed onto
/// `output` only after the tool succeeded with a non-empty mesh. Both
/// temporary files are removed on every other path. The tool is killed once
/// `timeout` has elapsed.
pub fn materialize<P: AsRef<Path>>(
    program: &str,
    tool: &str,
    output: P,
    timeout: Duration,
) -> Result<MeshReport> {
    let output = output.as_ref();
    let start = Instant::now();
    let write_err = |source| SkylineError::Write {
        path: output.to_path_buf(),
        source,
    };

    let mut scad = tempfile::Builder::new()
        .prefix("skyline")
        .suffix(".scad")
        .tempfile()?;
    scad.write_all(program.as_bytes())?;
    scad.flush()?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(write_err)?;
            parent
        }
        _ => Path::new("."),
    };
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let staged = tempfile::Builder::new()
        .prefix(".skyline")
        .suffix(&suffix)
        .tempfile_in(dir)
        .map_err(write_err)?;

    let mut stderr_sink = tempfile::tempfile()?;

    debug!(
        "Running: {} -o {} {}",
        tool,
        staged.path().display(),
        scad.path().display()
    );
    let mut child = Command::new(tool)
        .arg("-o")
        .arg(staged.path())
        .arg(scad.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr_sink.try_clone()?)
        .spawn()
        .map_err(|e| SkylineError::ToolNotFound {
            tool: tool.to_string(),
            source: e,
        })?;

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            // The child may exit between wait_timeout and kill
            let _ = child.kill();
            let _ = child.wait();
            return Err(SkylineError::ToolTimeout {
                tool: tool.to_string(),
                timeout,
            });
        }
    };

    if !status.success() {
        return Err(SkylineError::ToolFailed {
            tool: tool.to_string(),
            status,
            stderr: read_stderr(&mut stderr_sink),
        });
    }

    let bytes = match std::fs::metadata(staged.path()) {
        Ok(meta) if meta.len() > 0 => meta.len(),
        _ => {
            return Err(SkylineError::ToolNoOutput {
                tool: tool.to_string(),
                path: output.to_path_buf(),
            });
        }
    };
    staged.persist(output).map_err(|e| write_err(e.error))?;

    let elapsed = start.elapsed();
    info!(
        "Mesh written to {} ({} bytes) in {:?}",
        output.display(),
        bytes,
        elapsed
    );

    Ok(MeshReport {
        path: output.to_path_buf(),
        bytes,
        elapsed,
    })
}

fn read_stderr(sink: &mut File) -> String {
    let mut buf = String::new();
    if sink.seek(SeekFrom::Start(0)).is_ok() {
        let _ = sink.read_to_string(&mut buf);
    }
    let trimmed = buf.trim();
    if trimmed.len() > MAX_STDERR_LEN {
        let mut end = MAX_STDERR_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}
