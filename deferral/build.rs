// Rejects lint-suppression attributes ("#[" + "allow" + ...) anywhere in the deferral sources.
// Runs on every build so a suppression cannot slip in through tests or benches either.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Skip with DEFERRAL_ALLOW_CHECK=0.
    if env::var("DEFERRAL_ALLOW_CHECK")
        .map(|v| v == "0")
        .unwrap_or(false)
    {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let check_paths = ["src", "tests", "benches"];

    for relative in &check_paths {
        println!("cargo:rerun-if-changed={relative}");
    }

    let mut violations = Vec::new();
    for relative in &check_paths {
        let path = manifest_dir.join(relative);
        if path.exists() {
            scan_path(&path, &mut violations);
        }
    }

    if violations.is_empty() {
        return;
    }

    eprintln!("ERROR: lint suppression attributes found in deferral:");
    for (file, line, content) in &violations {
        eprintln!("  {}:{}: {}", file.display(), line, content.trim());
    }
    panic!("lint suppression attributes are forbidden");
}

fn scan_path(path: &Path, violations: &mut Vec<(PathBuf, usize, String)>) {
    if path.is_dir() {
        if path.ends_with("target") {
            return;
        }
        for entry in fs::read_dir(path).expect("read dir") {
            let entry = entry.expect("dir entry");
            scan_path(&entry.path(), violations);
        }
        return;
    }

    if path.extension().map_or(true, |ext| ext != "rs") {
        return;
    }

    if let Ok(content) = fs::read_to_string(path) {
        for (idx, line) in content.lines().enumerate() {
            let needle = ["#[", "allow"].concat();
            let inner = ["#![", "allow"].concat();
            if line.contains(&needle) || line.contains(&inner) {
                violations.push((path.to_path_buf(), idx + 1, line.to_string()));
            }
        }
    }
}
