//! Build script for berth
//! Stamps the binary with the commit and build time shown by `--version`

use chrono::Utc;
use std::process::Command;

fn main() {
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let build_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    println!("cargo:rustc-env=BERTH_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BERTH_BUILD_TIME={}", build_time);

    println!("cargo:rerun-if-changed=.git/HEAD");
}
