//! Build script for fluid-infer.
//!
//! With the `native` feature, links the prebuilt engine bridge library
//! (`libfluid_bridge`) that exposes the graph runtime through a C ABI.
//! Without it, nothing is linked and only the library's pure-Rust parts build.
//!
//! # Environment Variables
//!
//! - `FLUID_BRIDGE_DIR`: Directory containing `libfluid_bridge` (optional;
//!   falls back to `PADDLE_ROOT/lib`, then `../fluid_bridge/build` next to the crate)
//! - `FLUID_BRIDGE_SKIP_LINK`: Set to "1" to skip emitting link directives (for development)

use std::env;
use std::path::PathBuf;

/// Find the directory holding the bridge library.
///
/// Tries in order:
/// 1. `FLUID_BRIDGE_DIR`
/// 2. `PADDLE_ROOT/lib`
/// 3. `../fluid_bridge/build` relative to the manifest
fn detect_bridge_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("FLUID_BRIDGE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(root) = env::var("PADDLE_ROOT") {
        let lib = PathBuf::from(root).join("lib");
        if lib.exists() {
            return Some(lib);
        }
    }
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").ok()?);
    let local = manifest_dir.join("../fluid_bridge/build");
    if local.exists() {
        Some(local)
    } else {
        None
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=FLUID_BRIDGE_DIR");
    println!("cargo:rerun-if-env-changed=PADDLE_ROOT");
    println!("cargo:rerun-if-env-changed=FLUID_BRIDGE_SKIP_LINK");

    if env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }
    link_bridge();
}

fn link_bridge() {
    if env::var("FLUID_BRIDGE_SKIP_LINK")
        .map(|v| v == "1")
        .unwrap_or(false)
    {
        println!("cargo:warning=Skipping fluid_bridge link (FLUID_BRIDGE_SKIP_LINK=1)");
        return;
    }

    let bridge_dir = detect_bridge_dir().unwrap_or_else(|| {
        panic!(
            "Could not find the fluid_bridge library.\n\
             Checked: FLUID_BRIDGE_DIR, PADDLE_ROOT/lib, ../fluid_bridge/build\n\
             \n\
             To fix, either:\n\
             1. Set FLUID_BRIDGE_DIR to the directory containing libfluid_bridge\n\
             2. Build without the `native` feature"
        )
    });

    if !bridge_dir.exists() {
        panic!(
            "Bridge library path does not exist: {}\n\
             The FLUID_BRIDGE_DIR environment variable points to a non-existent path.",
            bridge_dir.display()
        );
    }

    println!("cargo:rustc-link-search=native={}", bridge_dir.display());
    println!("cargo:rustc-link-lib=dylib=fluid_bridge");

    // Use RPATH (not RUNPATH) for reliable library discovery
    println!("cargo:rustc-link-arg=-Wl,--disable-new-dtags");
    println!("cargo:rustc-link-arg=-Wl,-rpath,{}", bridge_dir.display());
    println!("cargo:rustc-link-arg=-Wl,-rpath,$ORIGIN/lib");

    if cfg!(feature = "cuda") {
        println!("cargo:rustc-env=FLUID_BRIDGE_BACKEND=cuda");
    } else {
        println!("cargo:rustc-env=FLUID_BRIDGE_BACKEND=cpu");
    }
}
