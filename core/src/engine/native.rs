//! Safe [`Engine`] implementation over the native bridge.
//!
//! Every bridge handle is owned by a Rust value that frees it on drop, so
//! early returns on error paths never leak native memory.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use tracing::debug;

use super::ffi;
use super::{Engine, FeedTargets, FetchTargets, Place, Program};
use crate::config::ProgramSource;
use crate::error::{InferError, Result};
use crate::tensor::{DataType, NativeBuffer, NativeTensor};

/// Get the last error message from the bridge.
fn get_last_error() -> String {
    unsafe {
        let err_ptr = ffi::fluid_get_last_error();
        if err_ptr.is_null() {
            "Unknown error".to_string()
        } else {
            CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
        }
    }
}

fn check(status: i32, what: &str) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(InferError::engine(format!("{}: {}", what, get_last_error())))
    }
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| InferError::engine(format!("Invalid string: {:?}", s)))
}

fn c_path(path: &Path) -> Result<CString> {
    if !path.exists() {
        return Err(InferError::FileNotFound(path.to_path_buf()));
    }
    CString::new(path.to_string_lossy().as_ref())
        .map_err(|_| InferError::model_load("Invalid path encoding"))
}

/// Engine backed by the native executor.
pub struct NativeEngine {
    handle: ffi::ExecutorHandle,
    place: Place,
}

// SAFETY: Each executor, scope, program and plan handle is owned by exactly
// one session and only used from the thread currently driving it.
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    /// Get the place this engine is bound to.
    pub fn place(&self) -> Place {
        self.place
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::fluid_executor_free(self.handle) };
        }
    }
}

/// Variable scope owned by a session.
pub struct NativeScope {
    handle: ffi::ScopeHandle,
}

unsafe impl Send for NativeScope {}

impl Drop for NativeScope {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::fluid_scope_free(self.handle) };
        }
    }
}

/// Program loaded by the bridge.
pub struct NativeProgram {
    handle: ffi::ProgramHandle,
}

unsafe impl Send for NativeProgram {}

impl NativeProgram {
    fn names(
        &self,
        count: unsafe extern "C" fn(ffi::ProgramHandle) -> usize,
        name_at: unsafe extern "C" fn(ffi::ProgramHandle, usize) -> *const c_char,
    ) -> Vec<String> {
        let n = unsafe { count(self.handle) };
        (0..n)
            .filter_map(|i| {
                let ptr = unsafe { name_at(self.handle, i) };
                if ptr.is_null() {
                    None
                } else {
                    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
                }
            })
            .collect()
    }
}

impl Program for NativeProgram {
    fn feed_target_names(&self) -> Vec<String> {
        self.names(
            ffi::fluid_program_num_feed_targets,
            ffi::fluid_program_feed_target,
        )
    }

    fn fetch_target_names(&self) -> Vec<String> {
        self.names(
            ffi::fluid_program_num_fetch_targets,
            ffi::fluid_program_fetch_target,
        )
    }
}

impl Drop for NativeProgram {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::fluid_program_free(self.handle) };
        }
    }
}

/// Prepared execution context, with the fetch targets it produces.
pub struct NativePlan {
    handle: ffi::PlanHandle,
    fetch_names: Vec<String>,
}

unsafe impl Send for NativePlan {}

impl Drop for NativePlan {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::fluid_plan_free(self.handle) };
        }
    }
}

/// Bridge tensor freed on drop.
struct OwnedTensor(ffi::TensorHandle);

impl Drop for OwnedTensor {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { ffi::fluid_tensor_free(self.0) };
        }
    }
}

fn dtype_code(dtype: DataType) -> i32 {
    match dtype {
        DataType::Float32 => ffi::DTYPE_FLOAT32,
        DataType::Float64 => ffi::DTYPE_FLOAT64,
        DataType::Int32 => ffi::DTYPE_INT32,
        DataType::Int64 => ffi::DTYPE_INT64,
    }
}

fn create_tensor(tensor: &NativeTensor) -> Result<OwnedTensor> {
    let dims: Vec<i64> = tensor.dims.iter().map(|&d| d as i64).collect();
    let (data, num_bytes): (*const c_void, usize) = match &tensor.buffer {
        NativeBuffer::F32(v) => (v.as_ptr().cast(), std::mem::size_of_val(v.as_slice())),
        NativeBuffer::F64(v) => (v.as_ptr().cast(), std::mem::size_of_val(v.as_slice())),
        NativeBuffer::I32(v) => (v.as_ptr().cast(), std::mem::size_of_val(v.as_slice())),
        NativeBuffer::I64(v) => (v.as_ptr().cast(), std::mem::size_of_val(v.as_slice())),
    };

    let handle = unsafe {
        ffi::fluid_tensor_create(
            dtype_code(tensor.data_type()),
            dims.as_ptr(),
            dims.len(),
            data,
            num_bytes,
        )
    };
    if handle.is_null() {
        return Err(InferError::engine(format!(
            "Failed to create input tensor: {}",
            get_last_error()
        )));
    }
    Ok(OwnedTensor(handle))
}

/// Copy a bridge tensor into Rust-owned storage.
///
/// # Safety
///
/// The handle must be a valid tensor pointer from the bridge.
unsafe fn extract_tensor(handle: ffi::TensorHandle) -> Result<NativeTensor> {
    if handle.is_null() {
        return Err(InferError::tensor("Null tensor handle"));
    }

    let ndim = ffi::fluid_tensor_ndim(handle);
    let dims_ptr = ffi::fluid_tensor_dims(handle);
    let data_ptr = ffi::fluid_tensor_data(handle);
    if dims_ptr.is_null() {
        return Err(InferError::tensor("Null tensor dims"));
    }

    let dims: Vec<usize> = std::slice::from_raw_parts(dims_ptr, ndim)
        .iter()
        .map(|&d| d as usize)
        .collect();
    let numel: usize = dims.iter().product();
    if data_ptr.is_null() && numel > 0 {
        return Err(InferError::tensor("Null tensor data"));
    }

    unsafe fn copy<T: Copy>(ptr: *const c_void, n: usize) -> Vec<T> {
        if n == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(ptr.cast::<T>(), n).to_vec()
        }
    }

    let buffer = match ffi::fluid_tensor_dtype(handle) {
        ffi::DTYPE_FLOAT32 => NativeBuffer::F32(copy(data_ptr, numel)),
        ffi::DTYPE_FLOAT64 => NativeBuffer::F64(copy(data_ptr, numel)),
        ffi::DTYPE_INT32 => NativeBuffer::I32(copy(data_ptr, numel)),
        ffi::DTYPE_INT64 => NativeBuffer::I64(copy(data_ptr, numel)),
        code => {
            return Err(InferError::tensor(format!(
                "Unknown element type code {}",
                code
            )))
        }
    };

    let levels = ffi::fluid_tensor_lod_levels(handle);
    let mut lod = Vec::with_capacity(levels);
    for level in 0..levels {
        let len = ffi::fluid_tensor_lod_level_len(handle, level);
        let ptr = ffi::fluid_tensor_lod_level(handle, level);
        if ptr.is_null() && len > 0 {
            return Err(InferError::lod(format!("Null LoD level {}", level)));
        }
        lod.push(copy::<usize>(ptr.cast(), len));
    }

    Ok(NativeTensor::new(dims, buffer).with_lod(lod))
}

impl Engine for NativeEngine {
    type Scope = NativeScope;
    type Program = NativeProgram;
    type Plan = NativePlan;

    fn init_global_flags(flags: &[String]) -> Result<()> {
        // The bridge parses argv-style, so the first entry is a program name.
        let mut args = vec![c_string("fluid-infer")?];
        for flag in flags {
            args.push(c_string(flag)?);
        }
        let ptrs: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
        check(
            unsafe { ffi::fluid_init_flags(ptrs.as_ptr(), ptrs.len()) },
            "Failed to initialize flags",
        )
    }

    fn new(place: Place) -> Result<Self> {
        let handle = unsafe { ffi::fluid_executor_create(place.device_id()) };
        if handle.is_null() {
            return Err(InferError::engine(format!(
                "Failed to create executor on {}: {}",
                place,
                get_last_error()
            )));
        }
        debug!("created executor on {}", place);
        Ok(Self { handle, place })
    }

    fn new_scope(&self) -> Result<NativeScope> {
        let handle = unsafe { ffi::fluid_scope_create() };
        if handle.is_null() {
            return Err(InferError::engine(format!(
                "Failed to create scope: {}",
                get_last_error()
            )));
        }
        Ok(NativeScope { handle })
    }

    fn load_program(
        &self,
        scope: &mut NativeScope,
        source: &ProgramSource,
    ) -> Result<NativeProgram> {
        let handle = match source {
            ProgramSource::Directory(dir) => {
                let dir = c_path(dir)?;
                unsafe { ffi::fluid_load_from_dir(self.handle, scope.handle, dir.as_ptr()) }
            }
            ProgramSource::Combined { program, params } => {
                let program = c_path(program)?;
                let params = c_path(params)?;
                unsafe {
                    ffi::fluid_load_combined(
                        self.handle,
                        scope.handle,
                        program.as_ptr(),
                        params.as_ptr(),
                    )
                }
            }
        };
        if handle.is_null() {
            return Err(InferError::model_load(format!(
                "Failed to load program: {}",
                get_last_error()
            )));
        }
        Ok(NativeProgram { handle })
    }

    fn prepare(&self, program: &NativeProgram, block: usize) -> Result<NativePlan> {
        let handle = unsafe { ffi::fluid_prepare(self.handle, program.handle, block) };
        if handle.is_null() {
            return Err(InferError::engine(format!(
                "Failed to prepare block {}: {}",
                block,
                get_last_error()
            )));
        }
        Ok(NativePlan {
            handle,
            fetch_names: program.fetch_target_names(),
        })
    }

    fn create_variables(
        &self,
        program: &NativeProgram,
        scope: &mut NativeScope,
        block: usize,
    ) -> Result<()> {
        check(
            unsafe {
                ffi::fluid_create_variables(self.handle, program.handle, scope.handle, block)
            },
            "Failed to create variables",
        )
    }

    fn run_prepared(
        &self,
        plan: &NativePlan,
        scope: &mut NativeScope,
        feeds: &FeedTargets,
        fetches: &mut FetchTargets,
        create_vars: bool,
    ) -> Result<()> {
        let mut feed_names = Vec::with_capacity(feeds.len());
        let mut feed_tensors = Vec::with_capacity(feeds.len());
        for (name, tensor) in feeds {
            feed_names.push(c_string(name)?);
            feed_tensors.push(create_tensor(tensor)?);
        }
        let feed_name_ptrs: Vec<*const c_char> =
            feed_names.iter().map(|n| n.as_ptr()).collect();
        let feed_handles: Vec<ffi::TensorHandle> = feed_tensors.iter().map(|t| t.0).collect();

        let fetch_names = plan
            .fetch_names
            .iter()
            .map(|n| c_string(n))
            .collect::<Result<Vec<_>>>()?;
        let fetch_name_ptrs: Vec<*const c_char> =
            fetch_names.iter().map(|n| n.as_ptr()).collect();
        let mut fetch_handles: Vec<ffi::TensorHandle> =
            vec![std::ptr::null_mut(); fetch_names.len()];

        let status = unsafe {
            ffi::fluid_run_prepared(
                self.handle,
                plan.handle,
                scope.handle,
                feed_name_ptrs.as_ptr(),
                feed_handles.as_ptr(),
                feed_handles.len(),
                fetch_name_ptrs.as_ptr(),
                fetch_handles.as_mut_ptr(),
                fetch_handles.len(),
                i32::from(create_vars),
            )
        };
        // Take ownership before checking status so partial outputs are freed.
        let outputs: Vec<OwnedTensor> = fetch_handles.into_iter().map(OwnedTensor).collect();
        check(status, "Failed to run program")?;

        for (name, output) in plan.fetch_names.iter().zip(&outputs) {
            let tensor = unsafe { extract_tensor(output.0)? };
            fetches.insert(name.clone(), tensor);
        }
        Ok(())
    }
}
