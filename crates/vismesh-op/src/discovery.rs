//! Fixed-priority discovery of the native mesh kernel binary.
//!
//! The container-local install path is checked first, then a copy sitting
//! next to the running executable. Absence is a fatal startup condition; the
//! caller decides whether to abort or fall back to the reference operator
//! explicitly.

use std::path::PathBuf;
use vismesh_core::{Result, VisualMeshError};

/// Install path inside the training container.
pub const CONTAINER_KERNEL_PATH: &str = "/visualmesh/op/libvisualmesh_op.so";

/// File name searched for next to the executable.
pub const KERNEL_FILE_NAME: &str = "libvisualmesh_op.so";

/// Locate the native kernel shared object.
pub fn discover_kernel() -> Result<PathBuf> {
    let container = PathBuf::from(CONTAINER_KERNEL_PATH);
    if container.is_file() {
        log::debug!("native kernel found at container path {:?}", container);
        return Ok(container);
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let local = dir.join(KERNEL_FILE_NAME);
            if local.is_file() {
                log::debug!("native kernel found next to executable at {:?}", local);
                return Ok(local);
            }
        }
    }

    Err(VisualMeshError::native(
        "discovery",
        format!(
            "mesh kernel not found; searched {} and the executable directory for {}",
            CONTAINER_KERNEL_PATH, KERNEL_FILE_NAME
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_kernel_is_a_native_error() {
        // Neither search location exists in the test environment.
        let err = discover_kernel().unwrap_err();
        assert!(matches!(err, VisualMeshError::Native { .. }));
        assert!(err.to_string().contains(KERNEL_FILE_NAME));
    }
}
