//! Build script: generate both thunk halves for the fixture interfaces into
//! `OUT_DIR`, where `src/lib.rs` includes them.

use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use thunk_interface::Interface;
use thunk_layout::GuestAbi;

fn main() -> Result<(), Box<dyn Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let interface_path = manifest_dir.join("interfaces/libc.thunks.toml");

    generate(&interface_path, &out_dir)?;

    println!("cargo:rerun-if-changed={}", interface_path.display());
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}

fn generate(interface_path: &Path, out_dir: &Path) -> Result<(), Box<dyn Error>> {
    let interface = Interface::load(interface_path)?;
    let generated = thunk_gen::generate(&interface, GuestAbi::X86_64)?;
    let ident = &interface.library.ident;
    fs::write(out_dir.join(format!("{ident}_guest.rs")), generated.guest)?;
    fs::write(out_dir.join(format!("{ident}_host.rs")), generated.host)?;
    Ok(())
}
