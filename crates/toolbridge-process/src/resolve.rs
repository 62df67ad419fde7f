//! Executable path resolution

use std::path::{Path, PathBuf};

use crate::error::{ProcessError, Result};

/// Resolve the tool executable to an absolute path.
///
/// Paths that are absolute or contain a separator are taken as given and
/// only checked for existence. Bare names are looked up on `PATH`.
pub fn resolve_executable(executable: &str) -> Result<PathBuf> {
    let path = Path::new(executable);

    if path.is_absolute() || executable.contains(['/', std::path::MAIN_SEPARATOR]) {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ProcessError::ExecutableNotFound {
            name: executable.to_string(),
            reason: "no such file".to_string(),
        });
    }

    which::which(executable).map_err(|e| ProcessError::ExecutableNotFound {
        name: executable.to_string(),
        reason: e.to_string(),
    })
}
