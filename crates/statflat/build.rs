use std::process::Command;

/// Abbreviated commit of the checkout being built, if git is available.
fn git_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8(output.stdout).ok()?;
    Some(revision.trim().to_owned())
}

fn main() {
    let revision = git_revision().unwrap_or_else(|| "unknown".to_owned());
    println!("cargo:rustc-env=STATFLAT_GIT_SHA={revision}");

    // Rebuild when the checked-out commit moves.
    for watched in ["../../.git/HEAD", "../../.git/refs/"] {
        println!("cargo:rerun-if-changed={watched}");
    }
}
