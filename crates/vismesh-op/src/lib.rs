//! # vismesh-op
//!
//! Implementations of the mesh operator boundary defined in `vismesh-core`:
//!
//! - [`NativeOperator`]: loads the native mesh kernel shared object via
//!   `libloading`, discovered by a fixed-priority search (container-local
//!   path first, then next to the executable). Absence is fatal.
//! - [`ReferenceOperator`]: pure-Rust CPU reimplementation of the same
//!   contract, used by tests and CPU-only runs.
//!
//! Both are selected explicitly by the caller; there is no hidden global
//! operator state.

pub mod discovery;
pub mod native;
pub mod reference;

pub use discovery::{discover_kernel, CONTAINER_KERNEL_PATH, KERNEL_FILE_NAME};
pub use native::NativeOperator;
pub use reference::ReferenceOperator;

use std::sync::Arc;
use vismesh_core::{MeshOperator, Result};

/// Operator provider selection, driven by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// Native kernel, located by [`discover_kernel`]. Missing binary aborts.
    Native,
    /// In-tree CPU reference kernel.
    Reference,
}

/// Construct the selected operator.
pub fn create_operator(kind: OperatorKind) -> Result<Arc<dyn MeshOperator>> {
    match kind {
        OperatorKind::Native => Ok(Arc::new(NativeOperator::discover()?)),
        OperatorKind::Reference => Ok(Arc::new(ReferenceOperator::new())),
    }
}
