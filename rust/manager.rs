//! Handle lifetime management.
//!
//! A [`HandleManager`] owns the bookkeeping for every native handle it hands
//! out: a registry of live wrappers keyed by name, a running count of created
//! wrappers, and an advisory estimate of the bytes those wrappers pin. All of
//! it sits behind one lock, so reports are always consistent with the last
//! completed acquire or release.
//!
//! Each handle is wrapped in a [`Managed`] value that frees it exactly once:
//! either on an explicit [`Managed::release`] or, as a safety net, on drop.
//! Releasing twice is tolerated and only logged.
//!
//! # Example
//!
//! ```rust
//! use ctensor::{Config, HandleManager, Tensor};
//!
//! let manager = HandleManager::native(Config::default().with_diagnostics(true));
//! let mut t = Tensor::of_slice(&manager, &[1.0f32, 2.0, 3.0]).unwrap();
//! assert_eq!(manager.stats().live, 1);
//!
//! t.release().unwrap();
//! assert!(manager.leak_report().is_clean());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::backend::{Backend, Native};
use crate::config::Config;
use crate::error::{Error, Result};

// region: Registry

struct Entry<H> {
    handle: H,
    nbytes: u64,
    origin: &'static Location<'static>,
}

struct Registry<H> {
    entries: HashMap<String, Entry<H>>,
    owners: HashMap<H, String>,
    created: u64,
    allocated_bytes: u64,
}

impl<H: Copy + Eq + std::hash::Hash> Registry<H> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            owners: HashMap::new(),
            created: 0,
            allocated_bytes: 0,
        }
    }

    /// Picks a free name. Collisions get the running created count appended,
    /// which makes the result deterministic for a given acquire order.
    fn unique_name(&self, requested: Option<&str>, prefix: &str) -> String {
        let base = match requested {
            Some(name) => name.to_string(),
            None => format!("{}_{:09}", prefix, self.created),
        };
        if !self.entries.contains_key(&base) {
            return base;
        }
        let mut counter = self.created;
        loop {
            let candidate = format!("{}_{:09}", base, counter);
            if !self.entries.contains_key(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn remove(&mut self, name: &str) -> Option<Entry<H>> {
        let entry = self.entries.remove(name)?;
        self.owners.remove(&entry.handle);
        self.allocated_bytes = self.allocated_bytes.saturating_sub(entry.nbytes);
        Some(entry)
    }
}

// endregion: Registry

// region: Reports

/// Counters kept by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Wrappers created over the manager's lifetime.
    pub created: u64,
    /// Wrappers currently live.
    pub live: usize,
    /// Estimated bytes pinned by live wrappers (diagnostic mode only).
    pub allocated_bytes: u64,
}

/// A live wrapper as seen by a leak report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveHandle {
    pub name: String,
    /// Estimated bytes, zero unless diagnostics are on.
    pub bytes: u64,
    /// Source location that created the wrapper.
    pub origin: String,
}

/// Snapshot of everything a manager has not released yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakReport {
    /// Live wrappers sorted by name.
    pub live: Vec<LiveHandle>,
    pub outstanding_bytes: u64,
}

impl LeakReport {
    pub fn is_clean(&self) -> bool {
        self.live.is_empty() && self.outstanding_bytes == 0
    }

    pub fn names(&self) -> Vec<&str> {
        self.live.iter().map(|h| h.name.as_str()).collect()
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- native memory check ----")?;
        writeln!(f, "outstanding native memory: {} bytes", self.outstanding_bytes)?;
        writeln!(f, "unreleased handles: {}", self.live.len())?;
        for handle in &self.live {
            writeln!(
                f,
                "  {} ({} bytes, created at {})",
                handle.name, handle.bytes, handle.origin
            )?;
        }
        write!(f, "-----------------------------")
    }
}

// endregion: Reports

// region: HandleManager

struct Shared<B: Backend> {
    backend: B,
    config: Config,
    registry: Mutex<Registry<B::Handle>>,
}

/// Tracks the lifetime of native handles produced by backend `B`.
///
/// Cloning is cheap and yields another reference to the same registry; every
/// wrapper keeps one so it can unregister itself.
pub struct HandleManager<B: Backend> {
    shared: Arc<Shared<B>>,
}

impl<B: Backend> Clone for HandleManager<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Backend> fmt::Debug for HandleManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleManager")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Manager for tensors owned by the linked engine.
pub type TensorManager = HandleManager<Native>;

impl HandleManager<Native> {
    /// A manager over the engine linked into this crate.
    pub fn native(config: Config) -> Self {
        Self::new(Native, config)
    }
}

impl<B: Backend> HandleManager<B> {
    pub fn new(backend: B, config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                registry: Mutex::new(Registry::new()),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Takes ownership of `handle` and registers it under a unique name.
    ///
    /// Fails with [`Error::AliasedHandle`] if another live wrapper already owns
    /// the same handle; ownership then stays with that wrapper.
    #[track_caller]
    pub fn acquire(&self, handle: B::Handle, name: Option<&str>) -> Result<Managed<B>> {
        let origin = Location::caller();
        let diagnostics = self.shared.config.diagnostics;
        let nbytes = if diagnostics {
            self.shared.backend.footprint(handle).unwrap_or_else(|err| {
                warn!("could not estimate footprint of {:?}: {}", handle, err);
                0
            })
        } else {
            0
        };

        let name = {
            let mut registry = self.shared.registry.lock();
            if let Some(owner) = registry.owners.get(&handle) {
                return Err(Error::AliasedHandle {
                    owner: owner.clone(),
                });
            }
            registry.created += 1;
            let name = registry.unique_name(name, &self.shared.config.name_prefix);
            registry.entries.insert(
                name.clone(),
                Entry {
                    handle,
                    nbytes,
                    origin,
                },
            );
            registry.owners.insert(handle, name.clone());
            registry.allocated_bytes += nbytes;
            name
        };

        if diagnostics {
            info!("acquired tensor {:?} ({} bytes)", name, nbytes);
        }

        Ok(Managed {
            handle: Some(handle),
            name,
            origin,
            manager: self.clone(),
        })
    }

    /// Same as [`Managed::release`].
    pub fn release(&self, wrapper: &mut Managed<B>) -> Result<()> {
        wrapper.release()
    }

    pub fn stats(&self) -> Stats {
        let registry = self.shared.registry.lock();
        Stats {
            created: registry.created,
            live: registry.entries.len(),
            allocated_bytes: registry.allocated_bytes,
        }
    }

    pub fn live_count(&self) -> usize {
        self.shared.registry.lock().entries.len()
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.shared.registry.lock().entries.contains_key(name)
    }

    /// Lists every wrapper not yet released, with outstanding bytes.
    pub fn leak_report(&self) -> LeakReport {
        let registry = self.shared.registry.lock();
        let mut live: Vec<LiveHandle> = registry
            .entries
            .iter()
            .map(|(name, entry)| LiveHandle {
                name: name.clone(),
                bytes: entry.nbytes,
                origin: entry.origin.to_string(),
            })
            .collect();
        let outstanding_bytes = registry.allocated_bytes;
        drop(registry);

        live.sort_by(|a, b| a.name.cmp(&b.name));
        LeakReport {
            live,
            outstanding_bytes,
        }
    }

    /// Detaches `name` from the registry and returns its handle.
    fn unregister(&self, name: &str) -> Option<Entry<B::Handle>> {
        self.shared.registry.lock().remove(name)
    }
}

// endregion: HandleManager

// region: Managed

/// Exclusive owner of one native handle.
///
/// The handle is either live or released (`None`); the transition happens
/// once, with the registry lock held.
pub struct Managed<B: Backend> {
    handle: Option<B::Handle>,
    name: String,
    origin: &'static Location<'static>,
    manager: HandleManager<B>,
}

impl<B: Backend> Managed<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The native handle, or `None` once released.
    pub fn handle(&self) -> Option<B::Handle> {
        self.handle
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Where this wrapper was acquired.
    pub fn origin(&self) -> &'static Location<'static> {
        self.origin
    }

    pub fn manager(&self) -> &HandleManager<B> {
        &self.manager
    }

    /// Frees the native handle.
    ///
    /// The first call unregisters the wrapper and frees the handle; engine
    /// failures come back as [`Error::Release`] but the wrapper is released
    /// and unregistered regardless. Later calls log a warning and return `Ok`.
    pub fn release(&mut self) -> Result<()> {
        let (handle, nbytes) = {
            let mut registry = self.manager.shared.registry.lock();
            let Some(handle) = self.handle.take() else {
                warn!(
                    "probable double free of tensor {:?} (created at {}), skipping",
                    self.name, self.origin
                );
                return Ok(());
            };
            let nbytes = registry.remove(&self.name).map_or(0, |entry| entry.nbytes);
            (handle, nbytes)
        };

        let freed = self.manager.shared.backend.free(handle);
        if self.manager.shared.config.diagnostics {
            info!("released tensor {:?} ({} bytes)", self.name, nbytes);
        }
        freed.map_err(|source| Error::Release {
            name: self.name.clone(),
            source: Box::new(source),
        })
    }

    /// Gives up ownership without freeing. The caller becomes responsible for
    /// the returned handle.
    pub fn into_raw(mut self) -> Option<B::Handle> {
        let handle = self.handle.take()?;
        self.manager.unregister(&self.name);
        Some(handle)
    }
}

impl<B: Backend> Drop for Managed<B> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.release() {
                error!("{}", err);
            }
        }
    }
}

impl<B: Backend> fmt::Debug for Managed<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("origin", &format_args!("{}", self.origin))
            .finish()
    }
}

// endregion: Managed
