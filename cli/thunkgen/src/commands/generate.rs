//! `thunkgen generate`: write both thunk halves for one interface.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use thunk_interface::Interface;
use thunk_layout::GuestAbi;
use tempfile::NamedTempFile;

/// Requested output locations. Unset paths default to
/// `<dir>/<lib>_guest.rs` and `<dir>/<lib>_host.rs`.
#[derive(Debug, Default)]
pub struct OutputPaths {
    pub guest: Option<PathBuf>,
    pub host: Option<PathBuf>,
    pub dir: Option<PathBuf>,
}

/// Paths actually written.
#[derive(Debug)]
pub struct Written {
    pub guest: PathBuf,
    pub host: PathBuf,
}

pub fn run(interface_path: &Path, abi: GuestAbi, outputs: &OutputPaths) -> Result<Written> {
    if !interface_path.is_file() {
        bail!("interface declaration not found: {}", interface_path.display());
    }
    let interface = Interface::load(interface_path)
        .with_context(|| format!("loading {}", interface_path.display()))?;

    // Nothing is written unless both halves rendered
    let generated = thunk_gen::generate(&interface, abi)
        .with_context(|| format!("generating thunks for {}", interface.library.name))?;

    let dir = match &outputs.dir {
        Some(dir) => dir.clone(),
        None => interface_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let ident = &interface.library.ident;
    let guest = outputs
        .guest
        .clone()
        .unwrap_or_else(|| dir.join(format!("{ident}_guest.rs")));
    let host = outputs
        .host
        .clone()
        .unwrap_or_else(|| dir.join(format!("{ident}_host.rs")));

    // Stage both halves before either destination is replaced
    let staged_guest = stage_output(&guest, &generated.guest)?;
    let staged_host = stage_output(&host, &generated.host)?;
    persist(staged_guest, &guest)?;
    persist(staged_host, &host)?;
    log::info!("wrote {} and {}", guest.display(), host.display());

    Ok(Written { guest, host })
}

/// Write `contents` to a temporary file next to `path`.
fn stage_output(path: &Path, contents: &str) -> Result<NamedTempFile> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
            parent
        }
        None => Path::new("."),
    };
    let mut staged =
        NamedTempFile::new_in(parent).with_context(|| format!("staging {}", path.display()))?;
    staged
        .write_all(contents.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(staged)
}

fn persist(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged
        .persist(path)
        .map(drop)
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERFACE: &str = r#"
[library]
name = "libtest"

[[types]]
name = "Point"
fields = ["int x", "int y"]

[[functions]]
signature = "int distance(const Point* a, const Point* b)"

[[functions]]
signature = "void visit(int (*cb)(char, char))"
"#;

    fn write_interface(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("libtest.thunks.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn writes_both_halves_next_to_interface() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_interface(dir.path(), INTERFACE);

        let written = run(&path, GuestAbi::X86_64, &OutputPaths::default()).unwrap();
        assert_eq!(written.guest, dir.path().join("libtest_guest.rs"));
        assert_eq!(written.host, dir.path().join("libtest_host.rs"));

        let guest = fs::read_to_string(&written.guest).unwrap();
        let host = fs::read_to_string(&written.host).unwrap();
        assert!(guest.contains("pub mod libtest_guest_thunks {"));
        assert!(host.contains("pub mod libtest_host_thunks {"));
        assert!(host.contains("thunk_runtime::identical_layout!(Point);"));
    }

    #[test]
    fn explicit_paths_and_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_interface(dir.path(), INTERFACE);
        let outputs = OutputPaths {
            guest: Some(dir.path().join("custom/guest.rs")),
            host: None,
            dir: Some(dir.path().join("gen")),
        };

        let written = run(&path, GuestAbi::X86_32, &outputs).unwrap();
        assert_eq!(written.guest, dir.path().join("custom/guest.rs"));
        assert_eq!(written.host, dir.path().join("gen/libtest_host.rs"));
        assert!(written.guest.is_file());
        assert!(written.host.is_file());
    }

    #[test]
    fn failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_interface(
            dir.path(),
            r#"
[library]
name = "libtest"

[[functions]]
signature = "int printf(const char* fmt, ...)"
"#,
        );

        let err = run(&path, GuestAbi::X86_64, &OutputPaths::default()).unwrap_err();
        assert!(format!("{err:#}").contains("uniform_va_type"));
        assert!(!dir.path().join("libtest_guest.rs").exists());
        assert!(!dir.path().join("libtest_host.rs").exists());
    }

    #[test]
    fn unwritable_host_leaves_guest_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_interface(dir.path(), INTERFACE);
        // A regular file where the host output directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "").unwrap();
        let outputs = OutputPaths {
            guest: None,
            host: Some(blocker.join("libtest_host.rs")),
            dir: None,
        };

        assert!(run(&path, GuestAbi::X86_64, &outputs).is_err());
        assert!(!dir.path().join("libtest_guest.rs").exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n != "libtest.thunks.toml" && n != "blocked")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn missing_interface() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("nope.thunks.toml"), GuestAbi::X86_64, &OutputPaths::default())
            .unwrap_err();
        assert!(err.to_string().contains("interface declaration not found"));
    }
}
