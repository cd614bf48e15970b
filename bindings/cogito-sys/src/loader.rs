// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Locating and resolving the native engine library.

use std::path::{Path, PathBuf};

use cogito_config::engine::{Candidate, EngineConfig};
use libloading::Library;
use tracing::{debug, info};

use crate::error::{LoadAttempt, SysError, SysResult};
use crate::{
    symbol_name, EngineApi, StructSizeFn, TensorBinaryFn, TensorFreeFn, TensorFromDataFn,
    TensorNewFn, SYM_STRUCT_SIZE, SYM_TENSOR_ADD, SYM_TENSOR_FREE, SYM_TENSOR_FROM_DATA,
    SYM_TENSOR_MUL, SYM_TENSOR_NEW,
};

/// A loaded engine library together with its resolved entry points.
///
/// The library is kept alive here so the function pointers in `api` never
/// dangle. Dropping this value unloads the engine.
#[derive(Debug)]
pub struct NativeLibrary {
    #[allow(dead_code)]
    library: Library,
    path: PathBuf,
    api: EngineApi,
}

impl NativeLibrary {
    /// Opens a single library path and resolves every entry point.
    ///
    /// # Safety
    ///
    /// Loading a shared library runs its initialisers. The library must
    /// implement the Cogito ABI with the signatures declared in this crate.
    pub unsafe fn open(path: &Path) -> SysResult<Self> {
        let library = Library::new(path).map_err(|err| SysError::Load {
            library: path.display().to_string(),
            attempts: vec![LoadAttempt {
                source: "explicit",
                path: path.to_path_buf(),
                reason: err.to_string(),
            }],
        })?;
        Self::from_library(library, path.to_path_buf())
    }

    unsafe fn from_library(library: Library, path: PathBuf) -> SysResult<Self> {
        let api = resolve(&library, &path)?;
        api.check_layout()?;
        info!(path = %path.display(), "cogito engine loaded");
        Ok(Self { library, path, api })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn api(&self) -> &EngineApi {
        &self.api
    }
}

/// Loads the engine using the search order described by `cfg`.
pub fn load(cfg: &EngineConfig) -> SysResult<NativeLibrary> {
    let library = cfg.file_name().to_string_lossy().into_owned();
    // SAFETY: every candidate is expected to be a Cogito engine build.
    unsafe { load_candidates(&library, &cfg.candidates()) }
}

/// Tries each candidate in order and returns the first that opens.
///
/// A candidate that opens but lacks a symbol fails immediately; falling
/// through to another build would hide an ABI mismatch.
///
/// # Safety
///
/// See [`NativeLibrary::open`].
pub unsafe fn load_candidates(library: &str, candidates: &[Candidate]) -> SysResult<NativeLibrary> {
    let mut attempts = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        debug!(
            source = candidate.source.label(),
            path = %candidate.path.display(),
            "trying cogito engine candidate"
        );
        match Library::new(&candidate.path) {
            Ok(lib) => return NativeLibrary::from_library(lib, candidate.path.clone()),
            Err(err) => {
                debug!(path = %candidate.path.display(), "candidate rejected: {err}");
                attempts.push(LoadAttempt {
                    source: candidate.source.label(),
                    path: candidate.path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Err(SysError::Load {
        library: library.to_string(),
        attempts,
    })
}

unsafe fn symbol<T: Copy>(library: &Library, path: &Path, name: &'static [u8]) -> SysResult<T> {
    let sym: libloading::Symbol<T> = library.get(name).map_err(|err| SysError::Symbol {
        symbol: symbol_name(name),
        path: path.to_path_buf(),
        source: err,
    })?;
    debug!(symbol = symbol_name(name), "resolved");
    Ok(*sym)
}

unsafe fn resolve(library: &Library, path: &Path) -> SysResult<EngineApi> {
    Ok(EngineApi {
        tensor_new: symbol::<TensorNewFn>(library, path, SYM_TENSOR_NEW)?,
        tensor_from_data: symbol::<TensorFromDataFn>(library, path, SYM_TENSOR_FROM_DATA)?,
        tensor_free: symbol::<TensorFreeFn>(library, path, SYM_TENSOR_FREE)?,
        tensor_add: symbol::<TensorBinaryFn>(library, path, SYM_TENSOR_ADD)?,
        tensor_mul: symbol::<TensorBinaryFn>(library, path, SYM_TENSOR_MUL)?,
        struct_size: library
            .get::<StructSizeFn>(SYM_STRUCT_SIZE)
            .ok()
            .map(|sym| *sym),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogito_config::engine::CandidateSource;
    use tempfile::tempdir;

    #[test]
    fn missing_candidates_are_all_reported() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::empty()
            .with_library_stem("cogito_missing_engine")
            .with_library_path(dir.path().join("nope").join("libcogito.so"))
            .with_adjacent_dir(dir.path())
            .with_build_dir(dir.path().join("build"))
            .with_system_fallback(true);
        let expected: Vec<_> = cfg.candidates().into_iter().map(|c| c.path).collect();

        let err = load(&cfg).unwrap_err();
        assert_eq!(err.attempted_paths(), expected);
        let rendered = err.to_string();
        for path in &expected {
            assert!(rendered.contains(&path.display().to_string()), "{rendered}");
        }
    }

    #[test]
    fn non_library_file_is_rejected() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("libcogito.so");
        std::fs::write(&bogus, b"not an elf").unwrap();
        let candidates = vec![Candidate {
            source: CandidateSource::Override,
            path: bogus.clone(),
        }];
        let err = unsafe { load_candidates("libcogito.so", &candidates) }.unwrap_err();
        match err {
            SysError::Load { attempts, .. } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].path, bogus);
                assert_eq!(attempts[0].source, "override");
                assert!(!attempts[0].reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn opened_library_without_symbols_stops_the_search() {
        let candidates = vec![
            Candidate {
                source: CandidateSource::Override,
                path: PathBuf::from("libc.so.6"),
            },
            Candidate {
                source: CandidateSource::System,
                path: PathBuf::from("libcogito.so"),
            },
        ];
        let err = unsafe { load_candidates("libcogito.so", &candidates) }.unwrap_err();
        match err {
            SysError::Symbol { symbol, path, .. } => {
                assert_eq!(symbol, "cg_tensor_new");
                assert_eq!(path, PathBuf::from("libc.so.6"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_candidate_list_fails() {
        let err = unsafe { load_candidates("libcogito.so", &[]) }.unwrap_err();
        assert!(err.to_string().contains("no candidate paths"));
    }
}
