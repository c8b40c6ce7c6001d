use std::path::{Path, PathBuf};
use std::process::Command;

/// Build id shown by `tgfin --version`. Packagers building from a tarball can
/// set TGFIN_BUILD_SHA themselves; otherwise it comes from git.
fn main() {
    println!("cargo:rerun-if-env-changed=TGFIN_BUILD_SHA");
    let manifest_dir =
        PathBuf::from(std::env::var_os("CARGO_MANIFEST_DIR").unwrap_or_else(|| ".".into()));
    let repo_root = manifest_dir.parent().unwrap_or(manifest_dir.as_path()).to_path_buf();

    let sha = std::env::var("TGFIN_BUILD_SHA")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| short_sha(&repo_root))
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=TGFIN_BUILD_SHA={sha}");

    let watched = git_watch_list(&repo_root.join(".git"));
    if watched.is_empty() {
        println!("cargo:rerun-if-changed=build.rs");
    }
    for path in watched {
        println!("cargo:rerun-if-changed={}", path.display());
    }
}

fn short_sha(repo_root: &Path) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

/// HEAD plus the branch ref it points at, so new commits rebuild the id.
/// Empty outside a plain checkout (tarball, worktree file).
fn git_watch_list(git_dir: &Path) -> Vec<PathBuf> {
    let head = git_dir.join("HEAD");
    let Ok(contents) = std::fs::read_to_string(&head) else {
        return Vec::new();
    };
    let mut paths = vec![head];
    if let Some(reference) = contents.trim().strip_prefix("ref: ") {
        let ref_path = git_dir.join(reference);
        if ref_path.exists() {
            paths.push(ref_path);
        }
    }
    paths
}
