//! Build script for swarm-deployer
//!
//! Exposes GIT_HASH and BUILD_TIME to the crate for version reporting.

use std::process::Command;

use chrono::{SecondsFormat, Utc};

fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

fn main() {
    // packaged builds have no checkout; let the packager pass the hash
    let hash = std::env::var("SWARM_DEPLOYER_GIT_HASH")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(git_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", hash);
    println!(
        "cargo:rustc-env=BUILD_TIME={}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    println!("cargo:rerun-if-env-changed=SWARM_DEPLOYER_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
