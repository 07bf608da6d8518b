// src/executor/output.rs

//! Output artifact lifecycle.
//!
//! Every task gets its own directory holding a `stdout` and a `stderr` file.
//! The directory is created before the task starts and removed only on an
//! explicit erase (or when the task never started).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::errors::{ExecError, Result};

const STDOUT_FILE: &str = "stdout";
const STDERR_FILE: &str = "stderr";
const MAX_NAME_LEN: usize = 32;

/// Paths of one task's artifacts.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl OutputPaths {
    pub fn open_stdout(&self) -> Result<File> {
        open_artifact(&self.stdout)
    }

    pub fn open_stderr(&self) -> Result<File> {
        open_artifact(&self.stderr)
    }

    /// Remove the whole directory; a missing directory is not an error.
    pub fn erase(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "removed output directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExecError::IoError(e)),
        }
    }
}

/// Freshly created artifacts plus the writer side of both files.
#[derive(Debug)]
pub struct OutputFiles {
    pub paths: OutputPaths,
    pub stdout: File,
    pub stderr: File,
}

impl OutputFiles {
    /// Create `<root>/<kind>_<command name>_<random>/{stdout,stderr}`.
    pub fn create(root: &Path, command: &str, kind: &str) -> io::Result<Self> {
        let name = command_name(command).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty command string")
        })?;

        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{kind}_{name}_"))
            .tempdir_in(root)?
            .keep();

        let paths = OutputPaths {
            stdout: dir.join(STDOUT_FILE),
            stderr: dir.join(STDERR_FILE),
            dir,
        };

        let files = File::create(&paths.stdout).and_then(|stdout| {
            File::create(&paths.stderr).map(|stderr| (stdout, stderr))
        });
        match files {
            Ok((stdout, stderr)) => Ok(Self {
                paths,
                stdout,
                stderr,
            }),
            Err(e) => {
                let _ = fs::remove_dir_all(&paths.dir);
                Err(e)
            }
        }
    }
}

/// Flush a finished task's output file to disk. Failures are only logged.
pub fn sync_and_close(file: File, stream: &str, command: &str) {
    if let Err(err) = file.sync_all() {
        error!(
            command = %command,
            stream,
            error = %err,
            "cannot sync task output file"
        );
    }
}

fn open_artifact(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ExecError::OutputUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

/// Filesystem-safe name of the program a command line runs.
fn command_name(command: &str) -> Option<String> {
    let program = command.split_whitespace().next()?;
    let base = program.rsplit('/').find(|s| !s.is_empty()).unwrap_or(program);

    let name: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn command_name_uses_program_basename() {
        assert_eq!(command_name("/usr/bin/redis-server --port 1").as_deref(), Some("redis-server"));
        assert_eq!(command_name("  echo hi").as_deref(), Some("echo"));
        assert_eq!(command_name("a$b;c").as_deref(), Some("a_b_c"));
        assert_eq!(command_name("   "), None);
    }

    #[test]
    fn create_open_and_erase() {
        let root = tempfile::tempdir().unwrap();
        let files = OutputFiles::create(root.path(), "echo hi", "local").unwrap();

        let dir_name = files.paths.dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(dir_name.starts_with("local_echo_"));

        let mut content = String::new();
        files.paths.open_stdout().unwrap().read_to_string(&mut content).unwrap();
        assert!(content.is_empty());

        files.paths.erase().unwrap();
        files.paths.erase().unwrap();
        assert!(matches!(
            files.paths.open_stderr(),
            Err(ExecError::OutputUnavailable { .. })
        ));
    }

    #[test]
    fn empty_command_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let err = OutputFiles::create(root.path(), "", "local").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
