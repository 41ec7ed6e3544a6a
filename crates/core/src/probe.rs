//! Startup capability probe for required external binaries.
//!
//! The probe runs once, before any source is built, and its result is
//! passed down explicitly. Nothing re-checks `PATH` lazily later.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Whether a named binary was found, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryProbe {
    pub name: String,
    pub path: Option<PathBuf>,
}

impl BinaryProbe {
    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }
}

/// Probe results for every binary the configured sources need.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    probes: HashMap<String, BinaryProbe>,
}

impl Capabilities {
    /// Probe each binary in `names` against the current `PATH`.
    pub fn probe(names: &[&str]) -> Self {
        let mut caps = Self::default();
        for name in names {
            let probe = probe_binary(name);
            tracing::info!(
                binary = %probe.name,
                available = probe.is_available(),
                path = ?probe.path,
                "Probed external binary",
            );
            caps.insert(probe);
        }
        caps
    }

    pub fn insert(&mut self, probe: BinaryProbe) {
        self.probes.insert(probe.name.clone(), probe);
    }

    pub fn get(&self, name: &str) -> Option<&BinaryProbe> {
        self.probes.get(name)
    }

    /// `false` both for binaries that were probed and missing and for
    /// binaries that were never probed.
    pub fn is_available(&self, name: &str) -> bool {
        self.get(name).is_some_and(BinaryProbe::is_available)
    }
}

/// Look for `name` in the directories of `PATH`.
///
/// A name containing a path separator is checked as-is.
pub fn probe_binary(name: &str) -> BinaryProbe {
    probe_in(name, std::env::var_os("PATH"))
}

fn probe_in(name: &str, path_var: Option<OsString>) -> BinaryProbe {
    let path = if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        let candidate = PathBuf::from(name);
        is_executable(&candidate).then_some(candidate)
    } else {
        path_var.and_then(|paths| {
            std::env::split_paths(&paths)
                .flat_map(|dir| candidates(&dir, name))
                .find(|candidate| is_executable(candidate))
        })
    };

    BinaryProbe {
        name: name.to_string(),
        path,
    }
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![dir.join(name), dir.join(format!("{name}.exe"))]
    } else {
        vec![dir.join(name)]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
