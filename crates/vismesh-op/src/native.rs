//! Native mesh kernel loader.
//!
//! Loads the visual mesh kernel shared object dynamically and exposes it
//! through the `MeshOperator` trait using a function-table pattern: every
//! exported symbol is resolved once at load time, and a load failure (missing
//! binary, missing symbol) is fatal before any computation starts.
//!
//! ## Kernel ABI
//!
//! Each entry point takes contiguous row-major buffers plus their dimensions
//! and returns 0 on success or a nonzero kernel error code. Index buffers are
//! `u64`. Output buffers are caller-allocated at the exact size implied by
//! the dimensions; the kernel never allocates.

use ndarray::Array2;
use std::path::Path;
use vismesh_core::{
    LookupParams, MeshLookup, MeshOperator, MeshPlacement, NeighborTable, Result, VisualMeshError,
};

use crate::discovery::discover_kernel;

type LookupFn = unsafe extern "C" fn(
    points: *const f32,
    n_points: u64,
    dim: u64,
    degree: u64,
    device: u32,
    out_table: *mut u64,
    out_seed: *mut f32,
) -> i32;

type MapFn = unsafe extern "C" fn(
    values: *const f32,
    n_sources: u64,
    channels: u64,
    node_for_source: *const u64,
    n_nodes: u64,
    out: *mut f32,
) -> i32;

type UnmapFn = unsafe extern "C" fn(
    features: *const f32,
    n_nodes: u64,
    channels: u64,
    node_for_source: *const u64,
    n_sources: u64,
    out: *mut f32,
) -> i32;

type DifferenceFn = unsafe extern "C" fn(
    a: *const f32,
    b: *const f32,
    n_nodes: u64,
    channels: u64,
    table: *const u64,
    degree: u64,
    out: *mut f32,
) -> i32;

/// Resolved kernel entry points. The `Library` is kept alive for as long as
/// the table exists so the copied function pointers stay valid.
struct NativeApi {
    lookup: LookupFn,
    map: MapFn,
    unmap: UnmapFn,
    difference: DifferenceFn,
    difference_grad: DifferenceFn,
    _lib: libloading::Library,
}

impl NativeApi {
    unsafe fn load(path: &Path) -> Result<Self> {
        let lib = libloading::Library::new(path).map_err(|e| {
            VisualMeshError::native("load", format!("failed to load {:?}: {}", path, e))
        })?;

        unsafe fn symbol<T: Copy>(lib: &libloading::Library, name: &[u8]) -> Result<T> {
            let sym: libloading::Symbol<T> = lib.get(name).map_err(|e| {
                VisualMeshError::native(
                    "load",
                    format!("{} not found: {}", String::from_utf8_lossy(name), e),
                )
            })?;
            Ok(*sym)
        }

        let lookup = symbol::<LookupFn>(&lib, b"vm_lookup\0")?;
        let map = symbol::<MapFn>(&lib, b"vm_map\0")?;
        let unmap = symbol::<UnmapFn>(&lib, b"vm_unmap\0")?;
        let difference = symbol::<DifferenceFn>(&lib, b"vm_difference\0")?;
        let difference_grad = symbol::<DifferenceFn>(&lib, b"vm_difference_grad\0")?;

        Ok(Self {
            lookup,
            map,
            unmap,
            difference,
            difference_grad,
            _lib: lib,
        })
    }
}

/// Mesh operator backed by the native kernel shared object.
pub struct NativeOperator {
    api: NativeApi,
}

impl NativeOperator {
    /// Load the kernel from an explicit path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let api = unsafe { NativeApi::load(path) }?;
        log::info!("native mesh kernel loaded from {:?}", path);
        Ok(Self { api })
    }

    /// Discover the kernel by the fixed-priority search and load it.
    pub fn discover() -> Result<Self> {
        Self::from_path(&discover_kernel()?)
    }
}

fn kernel_status(context: &str, code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(VisualMeshError::numerical(format!(
            "{} kernel returned error code {}",
            context, code
        )))
    }
}

fn table_as_u64(table: &NeighborTable) -> Vec<u64> {
    table.view().iter().map(|&i| i as u64).collect()
}

fn placement_as_u64(placement: &MeshPlacement) -> Vec<u64> {
    placement.nodes().iter().map(|&n| n as u64).collect()
}

impl MeshOperator for NativeOperator {
    fn lookup(&self, points: &Array2<f32>, params: &LookupParams) -> Result<MeshLookup> {
        let (n_points, dim) = points.dim();
        if n_points == 0 || params.degree == 0 {
            return Err(VisualMeshError::shape(
                "NativeOperator::lookup",
                "lookup requires at least one point and a positive degree",
            ));
        }
        let points = points.as_standard_layout();
        let mut out_table = vec![0u64; n_points * params.degree];
        let mut out_seed = Array2::<f32>::zeros((n_points, dim));

        let code = unsafe {
            (self.api.lookup)(
                points.as_ptr(),
                n_points as u64,
                dim as u64,
                params.degree as u64,
                params.device,
                out_table.as_mut_ptr(),
                out_seed.as_mut_ptr(),
            )
        };
        kernel_status("lookup", code)?;

        let indices = Array2::from_shape_vec(
            (n_points, params.degree),
            out_table.into_iter().map(|i| i as usize).collect(),
        )
        .map_err(|e| VisualMeshError::shape("NativeOperator::lookup", e.to_string()))?;

        Ok(MeshLookup {
            seed: out_seed,
            table: NeighborTable::new(indices)?,
            placement: MeshPlacement::identity(n_points),
        })
    }

    fn map(&self, values: &Array2<f32>, placement: &MeshPlacement) -> Result<Array2<f32>> {
        if values.nrows() != placement.num_sources() {
            return Err(VisualMeshError::shape(
                "NativeOperator::map",
                format!(
                    "{} value rows for a placement of {} sources",
                    values.nrows(),
                    placement.num_sources()
                ),
            ));
        }
        let channels = values.ncols();
        let values = values.as_standard_layout();
        let nodes = placement_as_u64(placement);
        let mut out = Array2::<f32>::zeros((placement.num_nodes(), channels));

        let code = unsafe {
            (self.api.map)(
                values.as_ptr(),
                placement.num_sources() as u64,
                channels as u64,
                nodes.as_ptr(),
                placement.num_nodes() as u64,
                out.as_mut_ptr(),
            )
        };
        kernel_status("map", code)?;
        Ok(out)
    }

    fn unmap(&self, features: &Array2<f32>, placement: &MeshPlacement) -> Result<Array2<f32>> {
        if features.nrows() != placement.num_nodes() {
            return Err(VisualMeshError::shape(
                "NativeOperator::unmap",
                format!(
                    "{} feature rows for a placement onto {} nodes",
                    features.nrows(),
                    placement.num_nodes()
                ),
            ));
        }
        let channels = features.ncols();
        let features = features.as_standard_layout();
        let nodes = placement_as_u64(placement);
        let mut out = Array2::<f32>::zeros((placement.num_sources(), channels));

        let code = unsafe {
            (self.api.unmap)(
                features.as_ptr(),
                placement.num_nodes() as u64,
                channels as u64,
                nodes.as_ptr(),
                placement.num_sources() as u64,
                out.as_mut_ptr(),
            )
        };
        kernel_status("unmap", code)?;
        Ok(out)
    }

    fn difference(
        &self,
        a: &Array2<f32>,
        b: &Array2<f32>,
        table: &NeighborTable,
    ) -> Result<Array2<f32>> {
        if a.dim() != b.dim() || a.nrows() != table.num_nodes() {
            return Err(VisualMeshError::shape(
                "NativeOperator::difference",
                format!(
                    "operands {:?} / {:?} against a table of {} nodes",
                    a.dim(),
                    b.dim(),
                    table.num_nodes()
                ),
            ));
        }
        let channels = a.ncols();
        let a = a.as_standard_layout();
        let b = b.as_standard_layout();
        let indices = table_as_u64(table);
        let mut out = Array2::<f32>::zeros((table.num_nodes(), channels));

        let code = unsafe {
            (self.api.difference)(
                a.as_ptr(),
                b.as_ptr(),
                table.num_nodes() as u64,
                channels as u64,
                indices.as_ptr(),
                table.degree() as u64,
                out.as_mut_ptr(),
            )
        };
        kernel_status("difference", code)?;
        Ok(out)
    }

    fn difference_grad(
        &self,
        grad_delta: &Array2<f32>,
        table: &NeighborTable,
    ) -> Result<Array2<f32>> {
        if grad_delta.nrows() != table.num_nodes() {
            return Err(VisualMeshError::shape(
                "NativeOperator::difference_grad",
                format!(
                    "{} gradient rows against a table of {} nodes",
                    grad_delta.nrows(),
                    table.num_nodes()
                ),
            ));
        }
        let channels = grad_delta.ncols();
        let grad = grad_delta.as_standard_layout();
        let indices = table_as_u64(table);
        let mut out = Array2::<f32>::zeros((table.num_nodes(), channels));

        // Same signature as the forward kernel; the second operand slot is
        // unused and passed as the gradient itself.
        let code = unsafe {
            (self.api.difference_grad)(
                grad.as_ptr(),
                grad.as_ptr(),
                table.num_nodes() as u64,
                channels as u64,
                indices.as_ptr(),
                table.degree() as u64,
                out.as_mut_ptr(),
            )
        };
        kernel_status("difference_grad", code)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_a_nonexistent_kernel_fails_fast() {
        let err = NativeOperator::from_path(Path::new("/nonexistent/libvisualmesh_op.so"))
            .err()
            .expect("load must fail");
        assert!(matches!(err, VisualMeshError::Native { .. }));
    }
}
