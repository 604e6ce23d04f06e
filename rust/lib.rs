//! # ctensor - Deterministic Lifetimes for Native Tensor Handles
//!
//! * Safe Rust bindings over a C-ABI tensor engine, bundled and built with `cc`.
//! * Every native handle is owned by exactly one wrapper and freed exactly once.
//! * Explicit manager objects instead of process globals: counters, names and
//!   leak reports are scoped to the manager that acquired the handle.
//! * Optional diagnostic mode with per-handle byte estimates and allocation origins.
//!
//! ## Handle lifetimes
//!
//! A [`HandleManager`] registers each native handle under a unique name when it
//! is acquired and removes it when the wrapper is released, either explicitly
//! through [`Tensor::release`] or when the wrapper is dropped. Releasing twice
//! is logged as a probable double free and otherwise ignored. Engine errors
//! reported while freeing are returned, but the registry is cleaned up anyway.
//!
//! [`HandleManager::leak_report`] lists everything still live, which makes it a
//! natural assertion at the end of a test or before shutdown.
//!
//! # Example
//!
//! ```rust
//! use ctensor::{Config, Tensor, TensorManager};
//!
//! let manager = TensorManager::native(Config::default().with_diagnostics(true));
//!
//! let mut weights = Tensor::of_slice_named(&manager, &[0.5f32, 1.5, 2.5], Some("weights")).unwrap();
//! let view = weights.shallow_clone().unwrap();
//! assert_eq!(view.name(), "weights_cloned");
//! assert_eq!(manager.stats().allocated_bytes, 24);
//!
//! weights.release().unwrap();
//! drop(view);
//! assert!(manager.leak_report().is_clean());
//! ```
//!
//! # Configuration
//!
//! [`Config::from_env`] reads `CTENSOR_DEBUG` to enable diagnostics and
//! `CTENSOR_NAME_PREFIX` to change the prefix of generated handle names.
//! Logging goes through the `log` facade; install any logger to see it.

pub mod backend;
pub mod config;
pub mod error;
mod ffi;
pub mod grad;
pub mod kind;
pub mod manager;
pub mod serialize;
pub mod tensor;

pub use backend::{Backend, Native, RawTensor, MAX_DIMS};
pub use config::Config;
pub use error::{Error, Result};
pub use grad::{no_grad, set_grad_enabled, NoGradGuard};
pub use kind::{Device, Element, Kind};
pub use manager::{HandleManager, LeakReport, LiveHandle, Managed, Stats, TensorManager};
pub use serialize::{load_multi, load_multi_with_device, save_multi};
pub use tensor::Tensor;
