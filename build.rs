//! Stamps the startup banner with the build time and commit.

use std::process::Command;

/// Trimmed stdout of a successful command
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !text.is_empty()).then_some(text)
}

fn main() {
    let built = capture("date", &["-u", "+%Y-%m-%d %H:%M:%S UTC"]);
    let commit = capture("git", &["rev-parse", "--short", "HEAD"]);

    println!(
        "cargo:rustc-env=HIDPI_BUILT={}",
        built.as_deref().unwrap_or("unknown")
    );
    println!(
        "cargo:rustc-env=HIDPI_COMMIT={}",
        commit.as_deref().unwrap_or("unknown")
    );
    println!("cargo:rerun-if-changed=.git/HEAD");
}
