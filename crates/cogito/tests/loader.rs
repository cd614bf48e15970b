// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::{Path, PathBuf};

use cogito::{engine, CogitoError, Engine, Tensor};
use cogito_config::engine::{EngineConfig, LIBRARY_PATH_ENV};
use tempfile::tempdir;

#[test]
fn unreachable_library_lists_every_attempt() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist").join("libcogito.so");
    std::env::set_var(LIBRARY_PATH_ENV, &missing);

    let cfg = EngineConfig::from_env()
        .unwrap()
        .with_library_stem("cogito_absent_for_tests");
    let expected: Vec<PathBuf> = cfg.candidates().into_iter().map(|c| c.path).collect();
    assert_eq!(expected.first(), Some(&missing));

    let err = Engine::load(&cfg).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.attempted_paths(), expected);
    let rendered = err.to_string();
    for path in &expected {
        assert!(rendered.contains(&path.display().to_string()), "{rendered}");
    }

    // The process-wide engine records the failure once and keeps reporting it.
    cogito_config::configure(cfg).unwrap();
    let first = engine::global().unwrap_err();
    let second = Tensor::new(&[2, 3], false).unwrap_err();
    assert!(matches!(first, CogitoError::Load { .. }));
    assert_eq!(first, second);
    assert!(matches!(
        engine::install(unsafe { Engine::from_api(cogito_engine::api(), "late") }.unwrap()),
        Err(CogitoError::AlreadyInstalled)
    ));
}

#[test]
fn opening_a_non_library_fails_with_load_error() {
    let dir = tempdir().unwrap();
    let bogus = dir.path().join("libcogito.so");
    std::fs::write(&bogus, b"definitely not a shared object").unwrap();
    let err = unsafe { Engine::open(&bogus) }.unwrap_err();
    assert_eq!(err.attempted_paths(), vec![bogus]);
}

/// A real shared object that carries none of the `cg_*` entry points.
#[cfg(target_os = "linux")]
const FOREIGN_LIBRARY: &str = "libc.so.6";
#[cfg(target_os = "macos")]
const FOREIGN_LIBRARY: &str = "/usr/lib/libSystem.B.dylib";
#[cfg(windows)]
const FOREIGN_LIBRARY: &str = "msvcrt.dll";

#[cfg(any(target_os = "linux", target_os = "macos", windows))]
#[test]
fn library_without_entry_points_fails_symbol_resolution() {
    let err = unsafe { Engine::open(Path::new(FOREIGN_LIBRARY)) }.unwrap_err();
    assert!(err.is_fatal());
    assert!(err.attempted_paths().is_empty());
    match &err {
        CogitoError::SymbolResolution { symbol, path, .. } => {
            assert_eq!(symbol, "cg_tensor_new");
            assert_eq!(path, Path::new(FOREIGN_LIBRARY));
        }
        other => panic!("expected a symbol resolution error, got {other}"),
    }
    assert!(err.to_string().contains("cg_tensor_new"));
}

/// Directory of the test executable; cargo places dependency artefacts here
/// (`target/<profile>/deps`) and in its parent.
fn artefact_dir() -> PathBuf {
    std::env::current_exe()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

#[test]
fn reference_engine_loads_dynamically() {
    let deps = artefact_dir();
    let mut cfg = EngineConfig::empty()
        .with_library_stem("cogito_engine")
        .with_library_path(&deps);
    if let Some(profile_dir) = deps.parent() {
        cfg = cfg.with_build_dir(profile_dir);
    }

    let engine: &'static Engine = Box::leak(Box::new(Engine::load(&cfg).unwrap()));
    let loaded_from = engine.library_path().unwrap();
    assert!(loaded_from.to_string_lossy().contains("cogito_engine"));
    assert_eq!(engine.label(), loaded_from.display().to_string());

    let lhs = Tensor::from_slice_in(engine, &[1.0, 2.0, 3.0, 4.0], &[2, 2], false).unwrap();
    let rhs = Tensor::from_slice_in(engine, &[10.0, 20.0, 30.0, 40.0], &[2, 2], false).unwrap();
    assert!(std::ptr::eq(lhs.engine(), engine));

    let sum = cogito::add(&lhs, &rhs).unwrap();
    assert_eq!(sum.shape().unwrap(), vec![2, 2]);
    let view = sum.view().unwrap();
    assert_eq!(view.as_slice().unwrap(), &[11.0, 22.0, 33.0, 44.0]);
    assert_eq!(view.base_address(), sum.view().unwrap().base_address());

    let product = cogito::multiply(&lhs, &rhs).unwrap();
    assert_eq!(product.to_vec().unwrap(), vec![10.0, 40.0, 90.0, 160.0]);
}
