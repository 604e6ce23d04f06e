//! Saving and loading tensors through the engine's file format.
//!
//! Loaded tensors are acquired by the caller's manager under the names they
//! were stored with, so leak reports point back at the file entries.

use std::ffi::{CStr, CString};
use std::path::Path;

use libc::{c_char, c_int, c_void};
use log::warn;

use crate::error::{Error, Result};
use crate::ffi::{self, native_call, CTensor};
use crate::kind::Device;
use crate::manager::TensorManager;
use crate::tensor::Tensor;

fn path_to_cstring(path: &Path) -> Result<CString> {
    let path_str = path
        .to_str()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
    Ok(CString::new(path_str)?)
}

impl Tensor {
    /// Writes this tensor to `path` as a single-entry file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path_to_cstring(path.as_ref())?;
        native_call!(ffi::at_save(self.raw()?.as_ptr(), path.as_ptr()));
        Ok(())
    }

    /// Reads the first tensor stored in `path`.
    #[track_caller]
    pub fn load<P: AsRef<Path>>(manager: &TensorManager, path: P, name: Option<&str>) -> Result<Tensor> {
        let path = path_to_cstring(path.as_ref())?;
        let ptr = native_call!(ffi::at_load(path.as_ptr()));
        Tensor::adopt(manager, ptr, name)
    }
}

/// Writes several named tensors to one file.
pub fn save_multi<S: AsRef<str>, P: AsRef<Path>>(named_tensors: &[(S, &Tensor)], path: P) -> Result<()> {
    let path = path_to_cstring(path.as_ref())?;
    let names = named_tensors
        .iter()
        .map(|(name, _)| CString::new(name.as_ref()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let name_ptrs: Vec<*const c_char> = names.iter().map(|n| n.as_ptr()).collect();
    let tensors = named_tensors
        .iter()
        .map(|(_, t)| t.as_ptr())
        .collect::<Result<Vec<CTensor>>>()?;
    native_call!(ffi::at_save_multi(
        tensors.as_ptr(),
        name_ptrs.as_ptr(),
        tensors.len() as c_int,
        path.as_ptr(),
    ));
    Ok(())
}

type Delivered = Vec<(String, CTensor)>;

unsafe extern "C" fn collect(data: *mut c_void, name: *const c_char, t: CTensor) {
    let delivered = &mut *(data as *mut Delivered);
    let name = CStr::from_ptr(name).to_string_lossy().into_owned();
    delivered.push((name, t));
}

fn free_all<I: IntoIterator<Item = (String, CTensor)>>(delivered: I) {
    for (name, t) in delivered {
        // Safety: delivered handles are owned by us until adopted.
        unsafe { ffi::at_free(t) };
        if let Err(err) = ffi::check_last_err() {
            warn!("could not free loaded tensor {:?}: {}", name, err);
        }
    }
}

/// Reads every tensor stored in `path`.
#[track_caller]
pub fn load_multi<P: AsRef<Path>>(manager: &TensorManager, path: P) -> Result<Vec<(String, Tensor)>> {
    load_with(manager, path.as_ref(), |path, data| unsafe {
        ffi::at_load_callback(path, data, collect)
    })
}

/// Reads every tensor stored in `path` onto `device`.
///
/// If the engine fails part way through the file, tensors it already handed
/// over are freed and the error is returned.
#[track_caller]
pub fn load_multi_with_device<P: AsRef<Path>>(
    manager: &TensorManager,
    path: P,
    device: Device,
) -> Result<Vec<(String, Tensor)>> {
    load_with(manager, path.as_ref(), |path, data| unsafe {
        ffi::at_load_callback_with_device(path, data, collect, device.c_int())
    })
}

#[track_caller]
fn load_with<F>(manager: &TensorManager, path: &Path, load: F) -> Result<Vec<(String, Tensor)>>
where
    F: FnOnce(*const c_char, *mut c_void),
{
    let path = path_to_cstring(path)?;
    let mut delivered: Delivered = Vec::new();
    load(path.as_ptr(), &mut delivered as *mut Delivered as *mut c_void);
    if let Err(err) = ffi::check_last_err() {
        warn!(
            "load from {:?} failed after {} tensors: {}",
            path,
            delivered.len(),
            err
        );
        free_all(delivered);
        return Err(err);
    }

    let mut loaded = Vec::with_capacity(delivered.len());
    let mut pending = delivered.into_iter();
    while let Some((name, ptr)) = pending.next() {
        match Tensor::adopt(manager, ptr, Some(&name)) {
            Ok(tensor) => loaded.push((name, tensor)),
            Err(err) => {
                free_all(pending);
                return Err(err);
            }
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::kind::Kind;

    fn manager() -> TensorManager {
        let _ = env_logger::builder().is_test(true).try_init();
        TensorManager::native(Config::default().with_diagnostics(true))
    }

    #[test]
    fn save_and_load_single() {
        let manager = manager();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.ct");

        let t = Tensor::from_data(&manager, &[1.0f64, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        t.save(&path).unwrap();

        let loaded = Tensor::load(&manager, &path, Some("restored")).unwrap();
        assert_eq!(loaded.name(), "restored");
        assert_eq!(loaded.size().unwrap(), vec![2, 2]);
        assert_eq!(loaded.kind().unwrap(), Kind::Double);
        assert_eq!(loaded.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn save_and_load_multi() {
        let manager = manager();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.ct");

        let weight = Tensor::from_data(&manager, &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let bias = Tensor::of_slice(&manager, &[7i64, 8]).unwrap();
        save_multi(&[("weight", &weight), ("bias", &bias)], &path).unwrap();
        drop((weight, bias));

        let loaded = load_multi(&manager, &path).unwrap();
        let names: Vec<&str> = loaded.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["weight", "bias"]);
        assert_eq!(loaded[0].1.name(), "weight");
        assert_eq!(loaded[0].1.size2().unwrap(), (2, 3));
        assert_eq!(loaded[1].1.to_vec::<i64>().unwrap(), vec![7, 8]);
        assert!(manager.is_live("bias"));

        drop(loaded);
        assert!(manager.leak_report().is_clean());
    }

    #[test]
    fn missing_file_is_an_error() {
        let manager = manager();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ct");
        assert!(matches!(Tensor::load(&manager, &path, None), Err(Error::Native(_))));
        assert!(matches!(load_multi(&manager, &path), Err(Error::Native(_))));
        assert_eq!(manager.live_count(), 0);
    }

    #[test]
    fn truncated_file_frees_delivered_tensors() {
        let manager = manager();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.ct");

        let a = Tensor::of_slice(&manager, &[1u8, 2, 3]).unwrap();
        let b = Tensor::of_slice(&manager, &[4.0f32; 16]).unwrap();
        save_multi(&[("a", &a), ("b", &b)], &path).unwrap();
        drop((a, b));

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

        let err = load_multi(&manager, &path).unwrap_err();
        assert!(err.to_string().contains("truncated"), "{}", err);
        assert!(manager.leak_report().is_clean());
    }

    #[test]
    fn oversized_shape_in_file_is_rejected() {
        let manager = manager();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.ct");

        // One Double entry of shape [2^62, 4] whose byte count wraps to zero.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"CTEN");
        bytes.extend_from_slice(&1u32.to_ne_bytes());
        bytes.extend_from_slice(&1u32.to_ne_bytes());
        bytes.extend_from_slice(&4u32.to_ne_bytes());
        bytes.extend_from_slice(b"huge");
        bytes.extend_from_slice(&Kind::Double.c_int().to_ne_bytes());
        bytes.extend_from_slice(&2u32.to_ne_bytes());
        bytes.extend_from_slice(&(1i64 << 62).to_ne_bytes());
        bytes.extend_from_slice(&4i64.to_ne_bytes());
        bytes.extend_from_slice(&0u64.to_ne_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let err = load_multi(&manager, &path).unwrap_err();
        assert!(err.to_string().contains("invalid shape"), "{}", err);
        assert!(matches!(Tensor::load(&manager, &path, None), Err(Error::Native(_))));
        assert!(manager.leak_report().is_clean());
    }

    #[test]
    fn unavailable_device_is_an_error() {
        let manager = manager();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.ct");
        Tensor::of_slice(&manager, &[1i32]).unwrap().save(&path).unwrap();

        let err = load_multi_with_device(&manager, &path, Device::Cuda(0)).unwrap_err();
        assert!(err.to_string().contains("cuda:0"), "{}", err);
        assert!(manager.leak_report().is_clean());
    }

    #[test]
    fn interior_nul_in_name_is_rejected() {
        let manager = manager();
        let dir = tempfile::tempdir().unwrap();
        let t = Tensor::of_slice(&manager, &[1i8]).unwrap();
        let err = save_multi(&[("bad\0name", &t)], dir.path().join("x.ct")).unwrap_err();
        assert!(matches!(err, Error::Nul(_)));
    }
}
