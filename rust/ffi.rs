//! Raw declarations of the engine's C ABI (see `include/ctensor/engine.h`).

use libc::{c_char, c_double, c_int, c_void, size_t};

use crate::error::{Error, Result};

pub(crate) type CTensor = *mut c_void;

pub(crate) type LoadCallback = unsafe extern "C" fn(data: *mut c_void, name: *const c_char, t: CTensor);

extern "C" {
    pub(crate) fn get_and_reset_last_err() -> *mut c_char;

    pub(crate) fn at_new_tensor() -> CTensor;
    pub(crate) fn at_tensor_of_data(
        vs: *const c_void,
        dims: *const i64,
        ndims: size_t,
        element_size_in_bytes: size_t,
        kind: c_int,
    ) -> CTensor;
    pub(crate) fn at_free(t: CTensor);

    pub(crate) fn at_defined(t: CTensor) -> c_int;
    pub(crate) fn at_is_sparse(t: CTensor) -> c_int;
    pub(crate) fn at_is_contiguous(t: CTensor) -> c_int;
    pub(crate) fn at_dim(t: CTensor) -> size_t;
    pub(crate) fn at_shape(t: CTensor, dims: *mut i64);
    pub(crate) fn at_stride(t: CTensor, strides: *mut i64);
    pub(crate) fn at_scalar_type(t: CTensor) -> c_int;
    pub(crate) fn at_device(t: CTensor) -> c_int;
    pub(crate) fn at_requires_grad(t: CTensor) -> c_int;
    pub(crate) fn at_set_requires_grad(t: CTensor, requires_grad: c_int);

    pub(crate) fn at_copy_data(
        t: CTensor,
        vs: *mut c_void,
        numel: size_t,
        element_size_in_bytes: size_t,
    );
    pub(crate) fn at_double_value_at_indexes(
        t: CTensor,
        indexes: *const i64,
        indexes_len: c_int,
    ) -> c_double;
    pub(crate) fn at_int64_value_at_indexes(
        t: CTensor,
        indexes: *const i64,
        indexes_len: c_int,
    ) -> i64;

    pub(crate) fn at_shallow_clone(t: CTensor) -> CTensor;
    pub(crate) fn at_get(t: CTensor, index: c_int) -> CTensor;
    pub(crate) fn at_copy_(dst: CTensor, src: CTensor);

    pub(crate) fn at_save(t: CTensor, filename: *const c_char);
    pub(crate) fn at_load(filename: *const c_char) -> CTensor;
    pub(crate) fn at_save_multi(
        tensors: *const CTensor,
        tensor_names: *const *const c_char,
        ntensors: c_int,
        filename: *const c_char,
    );
    pub(crate) fn at_load_callback(filename: *const c_char, data: *mut c_void, f: LoadCallback);
    pub(crate) fn at_load_callback_with_device(
        filename: *const c_char,
        data: *mut c_void,
        f: LoadCallback,
        device_id: c_int,
    );

    pub(crate) fn at_grad_set_enabled(enabled: c_int) -> c_int;
}

/// Drains the engine's last-error channel for the calling thread.
pub(crate) fn check_last_err() -> Result<()> {
    // Safety: the engine hands over a malloc'd, nul-terminated string (or null)
    // and expects the caller to free it.
    unsafe {
        let err = get_and_reset_last_err();
        if err.is_null() {
            return Ok(());
        }
        let message = std::ffi::CStr::from_ptr(err).to_string_lossy().into_owned();
        libc::free(err as *mut c_void);
        Err(Error::Native(message))
    }
}

/// Runs an engine call and turns a pending last-error into `Err`.
macro_rules! native_call {
    ($call:expr) => {{
        #[allow(unused_unsafe)]
        let value = unsafe { $call };
        $crate::ffi::check_last_err()?;
        value
    }};
}

pub(crate) use native_call;
