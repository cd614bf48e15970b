// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The process-wide engine: a resolved function table plus the library that
//! backs it.

use std::path::Path;

use cogito_config::engine::EngineConfig;
use cogito_sys::{EngineApi, NativeLibrary};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{CogitoError, CogitoResult};

/// A resolved Cogito engine. Read-only after construction and shareable
/// between threads; tensors allocated through it are not.
#[derive(Debug)]
pub struct Engine {
    api: EngineApi,
    library: Option<NativeLibrary>,
    label: String,
}

impl Engine {
    /// Locates the shared library with `cfg` and resolves every entry point.
    pub fn load(cfg: &EngineConfig) -> CogitoResult<Self> {
        let library = cogito_sys::load(cfg)?;
        let label = library.path().display().to_string();
        Ok(Self {
            api: *library.api(),
            library: Some(library),
            label,
        })
    }

    /// Opens exactly one library file.
    ///
    /// # Safety
    ///
    /// The file must be a Cogito engine build; its initialisers run on load.
    pub unsafe fn open(path: &Path) -> CogitoResult<Self> {
        let library = NativeLibrary::open(path)?;
        Ok(Self {
            api: *library.api(),
            library: Some(library),
            label: path.display().to_string(),
        })
    }

    /// Wraps a function table that is already linked into the process.
    ///
    /// # Safety
    ///
    /// Every pointer in `api` must implement the Cogito ABI and stay valid
    /// for the lifetime of the returned engine.
    pub unsafe fn from_api(api: EngineApi, label: impl Into<String>) -> CogitoResult<Self> {
        api.check_layout()?;
        Ok(Self {
            api,
            library: None,
            label: label.into(),
        })
    }

    pub fn api(&self) -> &EngineApi {
        &self.api
    }

    /// Path of the backing shared library, if the engine was loaded from one.
    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().map(NativeLibrary::path)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

static GLOBAL: OnceCell<CogitoResult<Engine>> = OnceCell::new();

fn resolve(slot: &'static CogitoResult<Engine>) -> CogitoResult<&'static Engine> {
    slot.as_ref().map_err(Clone::clone)
}

/// Returns the process-wide engine, loading it on first use.
///
/// Loading happens once. A failed load is remembered and every later call
/// reports the same error.
pub fn global() -> CogitoResult<&'static Engine> {
    resolve(GLOBAL.get_or_init(|| {
        let result = cogito_config::config()
            .map_err(CogitoError::from)
            .and_then(Engine::load);
        match &result {
            Ok(engine) => info!(engine = engine.label(), "cogito engine ready"),
            Err(err) => warn!("cogito engine unavailable: {err}"),
        }
        result
    }))
}

/// Installs `engine` as the process-wide engine. Fails once an engine (or a
/// load failure) has been recorded.
pub fn install(engine: Engine) -> CogitoResult<&'static Engine> {
    match GLOBAL.try_insert(Ok(engine)) {
        Ok(slot) => resolve(slot),
        Err(_) => Err(CogitoError::AlreadyInstalled),
    }
}

/// Returns the process-wide engine, initialising it with `init` instead of
/// the configured search if nothing is installed yet.
pub fn get_or_install(
    init: impl FnOnce() -> CogitoResult<Engine>,
) -> CogitoResult<&'static Engine> {
    resolve(GLOBAL.get_or_init(init))
}
