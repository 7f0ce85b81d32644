//! Version command implementation.

use serde::Serialize;

use crate::error::Result;

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    build: &'static str,
    os: &'static str,
    arch: &'static str,
}

impl VersionOutput {
    const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            build: if cfg!(debug_assertions) { "dev" } else { "release" },
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}

/// Print the version.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let info = VersionOutput::current();

    if json {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!(
            "{} {} ({}, {}/{})",
            info.name, info.version, info.build, info.os, info.arch
        );
    }
    Ok(())
}
