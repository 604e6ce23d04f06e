//! Engine tensors behind managed handles.
//!
//! This module provides:
//!
//! - [`Tensor`]: an owned engine tensor, released exactly once
//! - constructors that marshal host slices into engine buffers
//! - shape, dtype and device queries, element copies back to host slices
//!
//! Argument mismatches (buffer sizes, element kinds, ranks) are checked before
//! the engine is called, so a rejected call never leaves partial native state.
//!
//! # Example
//!
//! ```rust
//! use ctensor::{Config, Kind, Tensor, TensorManager};
//!
//! let manager = TensorManager::native(Config::default());
//! let t = Tensor::from_data(&manager, &[1i64, 2, 3, 4, 5, 6], &[2, 3]).unwrap();
//!
//! assert_eq!(t.size().unwrap(), vec![2, 3]);
//! assert_eq!(t.kind().unwrap(), Kind::Int64);
//! assert_eq!(t.get(1).unwrap().to_vec::<i64>().unwrap(), vec![4, 5, 6]);
//! ```

use std::fmt;
use std::mem;

use libc::{c_int, c_void};
use log::warn;

use crate::backend::{checked_numel, Native, RawTensor};
use crate::error::{Error, Result};
use crate::ffi::{self, native_call};
use crate::kind::{Device, Element, Kind};
use crate::manager::{Managed, TensorManager};

/// An engine tensor owned by a [`TensorManager`].
///
/// Dropping a tensor frees its native handle; [`Tensor::release`] does the
/// same deterministically and reports engine errors.
pub struct Tensor {
    inner: Managed<Native>,
}

// region: Construction

impl Tensor {
    /// Wraps a handle freshly produced by the engine, freeing it if the
    /// manager refuses to take ownership.
    #[track_caller]
    pub(crate) fn adopt(manager: &TensorManager, ptr: *mut c_void, name: Option<&str>) -> Result<Self> {
        let raw = RawTensor::new(ptr).ok_or(Error::NullHandle)?;
        match manager.acquire(raw, name) {
            Ok(inner) => Ok(Self { inner }),
            Err(err) => {
                // Safety: the engine just returned this handle and nothing else owns it.
                unsafe { ffi::at_free(raw.as_ptr()) };
                if let Err(free_err) = ffi::check_last_err() {
                    warn!("could not free unowned handle {:?}: {}", raw, free_err);
                }
                Err(err)
            }
        }
    }

    /// An undefined tensor, usable as a placeholder for optional arguments.
    #[track_caller]
    pub fn new(manager: &TensorManager) -> Result<Self> {
        let ptr = native_call!(ffi::at_new_tensor());
        Self::adopt(manager, ptr, None)
    }

    /// A 1-D tensor holding a copy of `data`.
    #[track_caller]
    pub fn of_slice<T: Element>(manager: &TensorManager, data: &[T]) -> Result<Self> {
        Self::of_slice_named(manager, data, None)
    }

    #[track_caller]
    pub fn of_slice_named<T: Element>(
        manager: &TensorManager,
        data: &[T],
        name: Option<&str>,
    ) -> Result<Self> {
        Self::from_data_named(manager, data, &[data.len() as i64], name)
    }

    /// A tensor of the given shape holding a copy of `data` in row-major order.
    #[track_caller]
    pub fn from_data<T: Element>(manager: &TensorManager, data: &[T], shape: &[i64]) -> Result<Self> {
        Self::from_data_named(manager, data, shape, None)
    }

    #[track_caller]
    pub fn from_data_named<T: Element>(
        manager: &TensorManager,
        data: &[T],
        shape: &[i64],
        name: Option<&str>,
    ) -> Result<Self> {
        let expected = element_count(shape)?;
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                len: data.len(),
                expected,
            });
        }
        let ptr = native_call!(ffi::at_tensor_of_data(
            data.as_ptr() as *const c_void,
            shape.as_ptr(),
            shape.len(),
            mem::size_of::<T>(),
            T::KIND.c_int(),
        ));
        Self::adopt(manager, ptr, name)
    }

    /// A tensor built from raw native-endian bytes.
    #[track_caller]
    pub fn of_data_size(
        manager: &TensorManager,
        data: &[u8],
        shape: &[i64],
        kind: Kind,
    ) -> Result<Self> {
        Self::of_data_size_named(manager, data, shape, kind, None)
    }

    #[track_caller]
    pub fn of_data_size_named(
        manager: &TensorManager,
        data: &[u8],
        shape: &[i64],
        kind: Kind,
        name: Option<&str>,
    ) -> Result<Self> {
        let expected = element_count(shape)?
            .checked_mul(kind.elt_size_in_bytes())
            .ok_or_else(|| Error::ShapeOverflow(shape.to_vec()))?;
        if data.len() != expected {
            return Err(Error::DataSizeMismatch {
                len: data.len(),
                expected,
            });
        }
        let ptr = native_call!(ffi::at_tensor_of_data(
            data.as_ptr() as *const c_void,
            shape.as_ptr(),
            shape.len(),
            kind.elt_size_in_bytes(),
            kind.c_int(),
        ));
        Self::adopt(manager, ptr, name)
    }

    /// Takes ownership of a handle produced by the engine.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live engine tensor that nothing else will free.
    #[track_caller]
    pub unsafe fn from_raw(manager: &TensorManager, ptr: *mut c_void, name: Option<&str>) -> Result<Self> {
        let raw = RawTensor::new(ptr).ok_or(Error::NullHandle)?;
        Ok(Self {
            inner: manager.acquire(raw, name)?,
        })
    }
}

fn element_count(shape: &[i64]) -> Result<usize> {
    if shape.len() > crate::backend::MAX_DIMS {
        return Err(Error::InvalidDim(shape.len()));
    }
    checked_numel(shape)
}

// endregion: Construction

// region: Queries

impl Tensor {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn manager(&self) -> &TensorManager {
        self.inner.manager()
    }

    pub(crate) fn raw(&self) -> Result<RawTensor> {
        self.inner
            .handle()
            .ok_or_else(|| Error::Released(self.name().to_string()))
    }

    /// The engine pointer, valid until this tensor is released.
    pub fn as_ptr(&self) -> Result<*mut c_void> {
        self.raw().map(RawTensor::as_ptr)
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    pub fn dim(&self) -> Result<usize> {
        Native::dim(self.raw()?)
    }

    /// Shape of the tensor.
    pub fn size(&self) -> Result<Vec<i64>> {
        Native::shape(self.raw()?)
    }

    fn size_of_rank(&self, rank: usize) -> Result<Vec<i64>> {
        let shape = self.size()?;
        if shape.len() != rank {
            return Err(Error::DimMismatch {
                expected: rank,
                got: shape.len(),
            });
        }
        Ok(shape)
    }

    pub fn size1(&self) -> Result<i64> {
        Ok(self.size_of_rank(1)?[0])
    }

    pub fn size2(&self) -> Result<(i64, i64)> {
        let s = self.size_of_rank(2)?;
        Ok((s[0], s[1]))
    }

    pub fn size3(&self) -> Result<(i64, i64, i64)> {
        let s = self.size_of_rank(3)?;
        Ok((s[0], s[1], s[2]))
    }

    pub fn size4(&self) -> Result<(i64, i64, i64, i64)> {
        let s = self.size_of_rank(4)?;
        Ok((s[0], s[1], s[2], s[3]))
    }

    /// Strides in elements.
    pub fn stride(&self) -> Result<Vec<i64>> {
        Native::stride(self.raw()?)
    }

    pub fn kind(&self) -> Result<Kind> {
        Native::kind(self.raw()?)
    }

    pub fn device(&self) -> Result<Device> {
        Native::device(self.raw()?)
    }

    pub fn defined(&self) -> Result<bool> {
        Native::defined(self.raw()?)
    }

    /// Number of elements; zero for an undefined tensor.
    pub fn numel(&self) -> Result<usize> {
        if !self.defined()? {
            return Ok(0);
        }
        checked_numel(&self.size()?)
    }

    /// Bytes of element data; zero for an undefined tensor.
    pub fn nbytes(&self) -> Result<usize> {
        if !self.defined()? {
            return Ok(0);
        }
        self.numel()?
            .checked_mul(self.kind()?.elt_size_in_bytes())
            .ok_or_else(|| match self.size() {
                Ok(shape) => Error::ShapeOverflow(shape),
                Err(err) => err,
            })
    }

    pub fn is_sparse(&self) -> Result<bool> {
        Ok(native_call!(ffi::at_is_sparse(self.raw()?.as_ptr())) != 0)
    }

    pub fn is_contiguous(&self) -> Result<bool> {
        Ok(native_call!(ffi::at_is_contiguous(self.raw()?.as_ptr())) != 0)
    }

    /// Whether the engine tracks gradients for this tensor.
    pub fn requires_grad(&self) -> Result<bool> {
        Ok(native_call!(ffi::at_requires_grad(self.raw()?.as_ptr())) != 0)
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) -> Result<()> {
        native_call!(ffi::at_set_requires_grad(
            self.raw()?.as_ptr(),
            requires_grad as c_int
        ));
        Ok(())
    }
}

// endregion: Queries

// region: Data Access

impl Tensor {
    /// Copies the first `numel` elements into `dst`.
    ///
    /// `dst` must hold at least `numel` elements of the tensor's own kind.
    pub fn copy_data<T: Element>(&self, dst: &mut [T], numel: usize) -> Result<()> {
        let raw = self.raw()?;
        if dst.len() < numel {
            return Err(Error::BufferTooSmall {
                len: dst.len(),
                numel,
            });
        }
        let kind = Native::kind(raw)?;
        if kind != T::KIND {
            return Err(Error::KindMismatch {
                expected: kind,
                got: T::KIND,
            });
        }
        native_call!(ffi::at_copy_data(
            raw.as_ptr(),
            dst.as_mut_ptr() as *mut c_void,
            numel,
            mem::size_of::<T>(),
        ));
        Ok(())
    }

    /// Copies the first `numel` elements of a `Uint8` tensor into `dst`.
    pub fn copy_data_u8(&self, dst: &mut [u8], numel: usize) -> Result<()> {
        self.copy_data(dst, numel)
    }

    /// All elements in row-major order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if !self.defined()? {
            return Ok(Vec::new());
        }
        let numel = self.numel()?;
        let mut values = vec![T::default(); numel];
        self.copy_data(&mut values, numel)?;
        Ok(values)
    }

    /// The element at `index`, converted to `f64`.
    pub fn double_value(&self, index: &[i64]) -> Result<f64> {
        Ok(native_call!(ffi::at_double_value_at_indexes(
            self.raw()?.as_ptr(),
            index.as_ptr(),
            index.len() as c_int,
        )))
    }

    /// The element at `index`, converted to `i64`.
    pub fn int64_value(&self, index: &[i64]) -> Result<i64> {
        Ok(native_call!(ffi::at_int64_value_at_indexes(
            self.raw()?.as_ptr(),
            index.as_ptr(),
            index.len() as c_int,
        )))
    }
}

// endregion: Data Access

// region: Views

impl Tensor {
    /// A new handle sharing storage with this tensor, named `"{name}_cloned"`.
    #[track_caller]
    pub fn shallow_clone(&self) -> Result<Tensor> {
        let ptr = native_call!(ffi::at_shallow_clone(self.raw()?.as_ptr()));
        let name = format!("{}_cloned", self.name());
        Tensor::adopt(self.manager(), ptr, Some(&name))
    }

    /// The sub-tensor at `index` along the first dimension, sharing storage.
    #[track_caller]
    pub fn get(&self, index: i64) -> Result<Tensor> {
        let index = c_int::try_from(index).map_err(|_| Error::IndexOutOfRange(index))?;
        let ptr = native_call!(ffi::at_get(self.raw()?.as_ptr(), index));
        Tensor::adopt(self.manager(), ptr, None)
    }

    /// Overwrites this tensor's elements with those of `src`.
    pub fn copy_(&mut self, src: &Tensor) -> Result<()> {
        native_call!(ffi::at_copy_(self.raw()?.as_ptr(), src.raw()?.as_ptr()));
        Ok(())
    }
}

// endregion: Views

// region: Lifetime

impl Tensor {
    /// Frees the native handle now. Repeated calls are logged and ignored.
    pub fn release(&mut self) -> Result<()> {
        self.inner.release()
    }

    /// Gives up ownership of the native handle without freeing it.
    pub fn into_raw(self) -> Result<*mut c_void> {
        let name = self.name().to_string();
        self.inner
            .into_raw()
            .map(RawTensor::as_ptr)
            .ok_or(Error::Released(name))
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Tensor");
        s.field("name", &self.name());
        match (self.size(), self.kind()) {
            (Ok(shape), Ok(kind)) => s.field("shape", &shape).field("kind", &kind),
            _ if self.is_released() => s.field("released", &true),
            _ => s.field("defined", &false),
        };
        s.finish()
    }
}

// endregion: Lifetime
