//! The seam between the lifetime manager and whatever owns the native memory.
//!
//! [`HandleManager`](crate::HandleManager) only needs two things from an
//! engine: a way to free a handle and, in diagnostic mode, an estimate of how
//! much memory the handle pins. [`Native`] provides both over the C ABI;
//! tests plug in their own backends to observe frees or inject failures.

use std::fmt;
use std::hash::Hash;
use std::ptr::NonNull;

use libc::c_void;

use crate::error::{Error, Result};
use crate::ffi::{self, native_call};
use crate::kind::{Device, Kind};

/// Largest rank the binding accepts from the engine.
pub const MAX_DIMS: usize = 16;

/// Operations the lifetime manager performs on native handles.
pub trait Backend: Send + Sync + 'static {
    /// Opaque handle type. Two equal handles refer to the same native object.
    type Handle: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Releases the native resource behind `handle`.
    ///
    /// Called at most once per acquired handle.
    fn free(&self, handle: Self::Handle) -> Result<()>;

    /// Estimated bytes held by `handle`. Only used for advisory accounting.
    fn footprint(&self, handle: Self::Handle) -> Result<u64>;
}

// region: Native

/// A non-null pointer to an engine tensor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTensor(NonNull<c_void>);

// Safety: the pointer is an opaque token; the engine synchronizes its own
// storage, and ownership of the token is tracked by the manager.
unsafe impl Send for RawTensor {}
// Safety: shared access only passes the token to read-only engine queries.
unsafe impl Sync for RawTensor {}

impl RawTensor {
    /// Wraps an engine pointer, returning `None` for null.
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for RawTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawTensor({:p})", self.0)
    }
}

/// The engine linked into this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Native;

impl Backend for Native {
    type Handle = RawTensor;

    fn free(&self, handle: RawTensor) -> Result<()> {
        native_call!(ffi::at_free(handle.as_ptr()));
        Ok(())
    }

    fn footprint(&self, handle: RawTensor) -> Result<u64> {
        if !Native::defined(handle)? {
            return Ok(0);
        }
        let shape = Native::shape(handle)?;
        let kind = Native::kind(handle)?;
        checked_numel(&shape)?
            .checked_mul(kind.elt_size_in_bytes())
            .map(|nbytes| nbytes as u64)
            .ok_or(Error::ShapeOverflow(shape))
    }
}

/// Number of elements in `shape`, rejecting negative dimensions and overflow.
pub(crate) fn checked_numel(shape: &[i64]) -> Result<usize> {
    let mut dims = Vec::with_capacity(shape.len());
    for &d in shape {
        dims.push(usize::try_from(d).map_err(|_| Error::InvalidDimension(d))?);
    }
    if dims.contains(&0) {
        return Ok(0);
    }
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::ShapeOverflow(shape.to_vec()))
}

impl Native {
    pub(crate) fn defined(raw: RawTensor) -> Result<bool> {
        Ok(native_call!(ffi::at_defined(raw.as_ptr())) != 0)
    }

    pub(crate) fn dim(raw: RawTensor) -> Result<usize> {
        let dim = native_call!(ffi::at_dim(raw.as_ptr()));
        if dim > MAX_DIMS {
            return Err(Error::InvalidDim(dim));
        }
        Ok(dim)
    }

    pub(crate) fn shape(raw: RawTensor) -> Result<Vec<i64>> {
        let mut dims = vec![0i64; Native::dim(raw)?];
        native_call!(ffi::at_shape(raw.as_ptr(), dims.as_mut_ptr()));
        Ok(dims)
    }

    pub(crate) fn stride(raw: RawTensor) -> Result<Vec<i64>> {
        let mut strides = vec![0i64; Native::dim(raw)?];
        native_call!(ffi::at_stride(raw.as_ptr(), strides.as_mut_ptr()));
        Ok(strides)
    }

    pub(crate) fn kind(raw: RawTensor) -> Result<Kind> {
        Kind::of_c_int(native_call!(ffi::at_scalar_type(raw.as_ptr())))
    }

    pub(crate) fn device(raw: RawTensor) -> Result<Device> {
        Ok(Device::of_c_int(native_call!(ffi::at_device(raw.as_ptr()))))
    }
}

// endregion: Native

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_tensor_rejects_null() {
        assert!(RawTensor::new(std::ptr::null_mut()).is_none());
    }

    #[test]
    fn native_footprint_counts_elements() {
        let data = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let dims = [2i64, 3];
        let ptr = unsafe {
            ffi::at_tensor_of_data(
                data.as_ptr() as *const c_void,
                dims.as_ptr(),
                dims.len(),
                8,
                Kind::Double.c_int(),
            )
        };
        let raw = RawTensor::new(ptr).unwrap();
        assert_eq!(Native.footprint(raw).unwrap(), 48);
        assert_eq!(Native::shape(raw).unwrap(), vec![2, 3]);
        assert_eq!(Native::stride(raw).unwrap(), vec![3, 1]);
        Native.free(raw).unwrap();
    }

    #[test]
    fn element_counts_are_checked() {
        assert_eq!(checked_numel(&[]).unwrap(), 1);
        assert_eq!(checked_numel(&[2, 3, 4]).unwrap(), 24);
        assert_eq!(checked_numel(&[1 << 62, 4, 0]).unwrap(), 0);
        assert!(matches!(checked_numel(&[3, -2]), Err(Error::InvalidDimension(-2))));
        assert!(matches!(
            checked_numel(&[1 << 62, 4]),
            Err(Error::ShapeOverflow(ref s)) if s == &[1i64 << 62, 4]
        ));
    }

    #[test]
    fn undefined_tensor_has_no_footprint() {
        let raw = RawTensor::new(unsafe { ffi::at_new_tensor() }).unwrap();
        assert_eq!(Native.footprint(raw).unwrap(), 0);
        assert!(matches!(Native::dim(raw), Err(Error::Native(_))));
        Native.free(raw).unwrap();
    }
}
