// SPDX-License-Identifier: MIT
//
// On-disk layout probing (§6 "On-disk layout"). The client derives the
// server executable and the wrapped model library from its own module
// path, assuming siblings under `binaries/<32|64>/`.

use std::path::{Path, PathBuf};

/// Resolved to "always use the `-remoted` suffix" (§9 open question 2):
/// whenever the client probes the opposite-bitness directory, the library
/// it looks for carries this suffix before its platform extension.
pub const REMOTED_SUFFIX: &str = "-remoted";

#[cfg(target_pointer_width = "64")]
const NATIVE_BITS: &str = "64";
#[cfg(target_pointer_width = "32")]
const NATIVE_BITS: &str = "32";

#[cfg(target_os = "windows")]
const LIBRARY_EXT: &str = "dll";
#[cfg(target_os = "macos")]
const LIBRARY_EXT: &str = "dylib";
#[cfg(all(unix, not(target_os = "macos")))]
const LIBRARY_EXT: &str = "so";

#[cfg(target_os = "windows")]
const SERVER_EXE: &str = "server_sm.exe";
#[cfg(not(target_os = "windows"))]
const SERVER_EXE: &str = "server_sm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayout {
    pub server_path: PathBuf,
    pub library_path: PathBuf,
    /// True when the resolved library lives under the opposite-bitness
    /// directory (the cross-architecture case this bridge exists for).
    pub cross_bitness: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("model library for {identifier:?} not found under either bitness directory")]
    LibraryNotFound { identifier: String },
}

fn opposite_bits(bits: &str) -> &'static str {
    if bits == "64" {
        "32"
    } else {
        "64"
    }
}

/// Resolves the server executable and wrapped-library paths for `identifier`
/// (the model's base name, without extension), starting the search at
/// `module_root` — the directory containing the client shim itself.
pub fn resolve(module_root: &Path, identifier: &str) -> Result<ResolvedLayout, LayoutError> {
    let native_dir = module_root.join("binaries").join(NATIVE_BITS);
    let native_library = native_dir.join(format!("{identifier}.{LIBRARY_EXT}"));

    if native_library.is_file() {
        return Ok(ResolvedLayout {
            server_path: native_dir.join(SERVER_EXE),
            library_path: native_library,
            cross_bitness: false,
        });
    }

    let other_bits = opposite_bits(NATIVE_BITS);
    let other_dir = module_root.join("binaries").join(other_bits);
    let remoted_library = other_dir.join(format!("{identifier}{REMOTED_SUFFIX}.{LIBRARY_EXT}"));
    let plain_library = other_dir.join(format!("{identifier}.{LIBRARY_EXT}"));

    if remoted_library.is_file() {
        return Ok(ResolvedLayout {
            server_path: other_dir.join(SERVER_EXE),
            library_path: remoted_library,
            cross_bitness: true,
        });
    }
    if plain_library.is_file() {
        return Ok(ResolvedLayout {
            server_path: other_dir.join(SERVER_EXE),
            library_path: plain_library,
            cross_bitness: true,
        });
    }

    Err(LayoutError::LibraryNotFound {
        identifier: identifier.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_dir(root: &Path, bits: &str) -> PathBuf {
        let dir = root.join("binaries").join(bits);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn finds_native_library_first() {
        let tmp = std::env::temp_dir().join(format!("remote_client_layout_native_{}", std::process::id()));
        let native = make_dir(&tmp, NATIVE_BITS);
        fs::write(native.join(format!("model.{LIBRARY_EXT}")), b"").unwrap();

        let resolved = resolve(&tmp, "model").unwrap();
        assert!(!resolved.cross_bitness);
        assert_eq!(resolved.library_path, native.join(format!("model.{LIBRARY_EXT}")));
        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn falls_back_to_remoted_suffix_in_opposite_bitness_dir() {
        let tmp = std::env::temp_dir().join(format!("remote_client_layout_cross_{}", std::process::id()));
        let other = make_dir(&tmp, opposite_bits(NATIVE_BITS));
        fs::write(other.join(format!("model{REMOTED_SUFFIX}.{LIBRARY_EXT}")), b"").unwrap();

        let resolved = resolve(&tmp, "model").unwrap();
        assert!(resolved.cross_bitness);
        assert!(resolved.library_path.to_string_lossy().contains(REMOTED_SUFFIX));
        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn missing_library_is_reported() {
        let tmp = std::env::temp_dir().join(format!("remote_client_layout_missing_{}", std::process::id()));
        fs::create_dir_all(&tmp).unwrap();
        let result = resolve(&tmp, "nonexistent");
        assert!(matches!(result, Err(LayoutError::LibraryNotFound { .. })));
        fs::remove_dir_all(&tmp).ok();
    }
}
