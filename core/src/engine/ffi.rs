//! FFI declarations for the native engine bridge.
//!
//! This module contains the raw FFI bindings. Use the safe wrappers
//! in the `native` module instead of calling these directly.
//!
//! Functions returning `i32` report success with 0. Functions returning a
//! handle report failure with null. In both cases the message is available
//! from `fluid_get_last_error`.

use std::ffi::c_void;
use std::os::raw::c_char;

/// Opaque handle to an executor bound to one place.
pub type ExecutorHandle = *mut c_void;

/// Opaque handle to a variable scope.
pub type ScopeHandle = *mut c_void;

/// Opaque handle to a loaded program.
pub type ProgramHandle = *mut c_void;

/// Opaque handle to a prepared execution context.
pub type PlanHandle = *mut c_void;

/// Opaque handle to a LoD tensor.
pub type TensorHandle = *mut c_void;

/// Element type codes shared with the bridge.
pub const DTYPE_FLOAT32: i32 = 0;
pub const DTYPE_FLOAT64: i32 = 1;
pub const DTYPE_INT32: i32 = 2;
pub const DTYPE_INT64: i32 = 3;

extern "C" {
    pub fn fluid_get_last_error() -> *const c_char;

    // Process-wide flags
    pub fn fluid_init_flags(flags: *const *const c_char, num_flags: usize) -> i32;

    // Executor and scope lifecycle
    pub fn fluid_executor_create(device: i32) -> ExecutorHandle;
    pub fn fluid_executor_free(executor: ExecutorHandle);
    pub fn fluid_scope_create() -> ScopeHandle;
    pub fn fluid_scope_free(scope: ScopeHandle);

    // Program loading
    pub fn fluid_load_from_dir(
        executor: ExecutorHandle,
        scope: ScopeHandle,
        dirname: *const c_char,
    ) -> ProgramHandle;
    pub fn fluid_load_combined(
        executor: ExecutorHandle,
        scope: ScopeHandle,
        prog_file: *const c_char,
        param_file: *const c_char,
    ) -> ProgramHandle;
    pub fn fluid_program_free(program: ProgramHandle);
    pub fn fluid_program_num_feed_targets(program: ProgramHandle) -> usize;
    pub fn fluid_program_feed_target(program: ProgramHandle, index: usize) -> *const c_char;
    pub fn fluid_program_num_fetch_targets(program: ProgramHandle) -> usize;
    pub fn fluid_program_fetch_target(program: ProgramHandle, index: usize) -> *const c_char;

    // Execution
    pub fn fluid_prepare(
        executor: ExecutorHandle,
        program: ProgramHandle,
        block: usize,
    ) -> PlanHandle;
    pub fn fluid_plan_free(plan: PlanHandle);
    pub fn fluid_create_variables(
        executor: ExecutorHandle,
        program: ProgramHandle,
        scope: ScopeHandle,
        block: usize,
    ) -> i32;
    pub fn fluid_run_prepared(
        executor: ExecutorHandle,
        plan: PlanHandle,
        scope: ScopeHandle,
        feed_names: *const *const c_char,
        feeds: *const TensorHandle,
        num_feeds: usize,
        fetch_names: *const *const c_char,
        fetches: *mut TensorHandle,
        num_fetches: usize,
        create_vars: i32,
    ) -> i32;

    // Tensors (host memory)
    pub fn fluid_tensor_create(
        dtype: i32,
        dims: *const i64,
        ndim: usize,
        data: *const c_void,
        num_bytes: usize,
    ) -> TensorHandle;
    pub fn fluid_tensor_free(tensor: TensorHandle);
    pub fn fluid_tensor_dtype(tensor: TensorHandle) -> i32;
    pub fn fluid_tensor_ndim(tensor: TensorHandle) -> usize;
    pub fn fluid_tensor_dims(tensor: TensorHandle) -> *const i64;
    pub fn fluid_tensor_data(tensor: TensorHandle) -> *const c_void;
    pub fn fluid_tensor_lod_levels(tensor: TensorHandle) -> usize;
    pub fn fluid_tensor_lod_level_len(tensor: TensorHandle, level: usize) -> usize;
    pub fn fluid_tensor_lod_level(tensor: TensorHandle, level: usize) -> *const usize;
}
