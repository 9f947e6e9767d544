//! Host library loading for host thunks.

use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LAZY};

use crate::error::{Result, RuntimeError};

/// An opened host shared object.
#[derive(Debug)]
pub struct HostLibrary {
    name: String,
    lib: Library,
}

impl HostLibrary {
    /// Open `name` (e.g. `libfoo.so.1`) with global symbol visibility.
    pub fn open(name: &str) -> Result<Self> {
        // SAFETY: loading runs the library's initializers; host libraries
        // wrapped by thunks are trusted
        let lib = unsafe { Library::open(Some(name), RTLD_GLOBAL | RTLD_LAZY) }.map_err(|source| {
            RuntimeError::LibraryLoad {
                name: name.to_string(),
                source,
            }
        })?;
        log::debug!("loaded host library {name}");
        Ok(Self {
            name: name.to_string(),
            lib,
        })
    }

    /// Symbols already loaded into the process, for libraries annotated
    /// `host_loader = default`.
    pub fn global() -> Self {
        Self {
            name: "<global>".to_string(),
            lib: Library::this(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a symbol and copy it out, typically as a function pointer.
    ///
    /// # Safety
    /// `T` must match the symbol's actual type.
    pub unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T> {
        let symbol = self
            .lib
            .get::<T>(name.as_bytes())
            .map_err(|source| RuntimeError::MissingSymbol {
                name: name.to_string(),
                library: self.name.clone(),
                source,
            })?;
        Ok(*symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library() {
        let err = HostLibrary::open("libdoes-not-exist-thunk.so.7").unwrap_err();
        assert!(matches!(err, RuntimeError::LibraryLoad { .. }));
        assert!(err.to_string().contains("libdoes-not-exist-thunk.so.7"));
    }

    #[test]
    fn global_symbols() {
        let lib = HostLibrary::global();
        let strlen: unsafe extern "C" fn(*const std::ffi::c_char) -> usize =
            unsafe { lib.symbol("strlen") }.unwrap();
        assert_eq!(unsafe { strlen(b"thunk\0".as_ptr().cast()) }, 5);

        let err = unsafe { lib.symbol::<usize>("no_such_symbol_for_thunks") }.unwrap_err();
        assert!(matches!(err, RuntimeError::MissingSymbol { .. }));
    }
}
