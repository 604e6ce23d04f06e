//! Process-wide gradient tracking switch.

use libc::c_int;

use crate::error::Result;
use crate::ffi::{self, native_call};

/// Enables or disables gradient tracking, returning the previous state.
pub fn set_grad_enabled(enabled: bool) -> Result<bool> {
    Ok(native_call!(ffi::at_grad_set_enabled(enabled as c_int)) != 0)
}

/// Disables gradient tracking until dropped, then restores the previous state.
#[must_use = "gradient tracking is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct NoGradGuard {
    previous: bool,
}

impl NoGradGuard {
    pub fn new() -> Result<Self> {
        Ok(Self {
            previous: set_grad_enabled(false)?,
        })
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        if let Err(err) = set_grad_enabled(self.previous) {
            log::error!("failed to restore gradient tracking: {}", err);
        }
    }
}

/// Runs `f` with gradient tracking disabled.
pub fn no_grad<T, F: FnOnce() -> T>(f: F) -> Result<T> {
    let _guard = NoGradGuard::new()?;
    Ok(f())
}
