// SPDX-License-Identifier: MIT
//
// Dynamic library loading. Grounded in the original C remoting server's own
// `library_load`/`library_symbol`/`library_unload` trio (dlopen/dlsym/dlclose
// on POSIX, LoadLibraryA/GetProcAddress/FreeLibrary on Windows) — reimplemented
// here as a safe, typed wrapper instead of a vendored `libloading` dependency,
// since the rest of this crate already owns its raw FFI surface to the OS.

use std::ffi::CString;
use std::io;

use crate::error::PlatformError;

#[cfg(unix)]
pub struct LoadedLibrary {
    handle: *mut libc::c_void,
}

#[cfg(unix)]
unsafe impl Send for LoadedLibrary {}
#[cfg(unix)]
unsafe impl Sync for LoadedLibrary {}

#[cfg(unix)]
impl LoadedLibrary {
    pub fn load(path: &str) -> Result<Self, PlatformError> {
        let c_path = CString::new(path).map_err(|e| PlatformError::LibraryLoad {
            path: path.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(PlatformError::LibraryLoad {
                path: path.to_string(),
                source: io::Error::new(io::ErrorKind::Other, dlerror_message()),
            });
        }
        Ok(Self { handle })
    }

    /// Resolve a symbol to a raw function pointer. The caller is responsible
    /// for transmuting to the correct `fn` type.
    pub fn symbol(&self, name: &str) -> Result<*mut libc::c_void, PlatformError> {
        let c_name =
            CString::new(name).map_err(|_| PlatformError::SymbolNotFound { symbol: name.to_string() })?;
        unsafe { libc::dlerror() }; // clear any pending error
        let sym = unsafe { libc::dlsym(self.handle, c_name.as_ptr()) };
        if sym.is_null() {
            return Err(PlatformError::SymbolNotFound {
                symbol: name.to_string(),
            });
        }
        Ok(sym)
    }
}

#[cfg(unix)]
fn dlerror_message() -> String {
    let ptr = unsafe { libc::dlerror() };
    if ptr.is_null() {
        "unknown dlopen failure".to_string()
    } else {
        unsafe { std::ffi::CStr::from_ptr(ptr) }
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(unix)]
impl Drop for LoadedLibrary {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                libc::dlclose(self.handle);
            }
        }
    }
}

#[cfg(windows)]
pub struct LoadedLibrary {
    handle: windows_sys::Win32::Foundation::HMODULE,
}

#[cfg(windows)]
unsafe impl Send for LoadedLibrary {}
#[cfg(windows)]
unsafe impl Sync for LoadedLibrary {}

#[cfg(windows)]
impl LoadedLibrary {
    pub fn load(path: &str) -> Result<Self, PlatformError> {
        use windows_sys::Win32::System::LibraryLoader::LoadLibraryW;
        let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle == 0 {
            return Err(PlatformError::LibraryLoad {
                path: path.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self { handle })
    }

    pub fn symbol(&self, name: &str) -> Result<*mut std::ffi::c_void, PlatformError> {
        use windows_sys::Win32::System::LibraryLoader::GetProcAddress;
        let c_name = CString::new(name).map_err(|_| PlatformError::SymbolNotFound {
            symbol: name.to_string(),
        })?;
        let sym = unsafe { GetProcAddress(self.handle, c_name.as_ptr() as *const u8) };
        match sym {
            Some(f) => Ok(f as *mut std::ffi::c_void),
            None => Err(PlatformError::SymbolNotFound {
                symbol: name.to_string(),
            }),
        }
    }
}

#[cfg(windows)]
impl Drop for LoadedLibrary {
    fn drop(&mut self) {
        use windows_sys::Win32::System::LibraryLoader::FreeLibrary;
        if self.handle != 0 {
            unsafe {
                FreeLibrary(self.handle);
            }
        }
    }
}
