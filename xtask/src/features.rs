use std::process::Command;

use anyhow::{Context, Result};

const PACKAGE: &str = "retryloop";

/// Feature sets checked for the library crate, as `(label, cargo args)`.
const FEATURE_COMBINATIONS: &[(&str, &[&str])] = &[
    ("no-default", &["--no-default-features"]),
    ("default", &[]),
    ("config", &["--no-default-features", "--features", "config"]),
    ("all", &["--all-features"]),
];

/// Check that every feature combination builds and passes its tests.
pub fn test_feature_matrix() -> Result<()> {
    println!("Testing {} {PACKAGE} feature combinations...", FEATURE_COMBINATIONS.len());

    for (index, (label, args)) in FEATURE_COMBINATIONS.iter().enumerate() {
        println!(
            "\n[{}/{}] cargo test -p {PACKAGE} {}",
            index + 1,
            FEATURE_COMBINATIONS.len(),
            args.join(" ")
        );

        let status = Command::new("cargo")
            .args(["test", "-p", PACKAGE])
            .args(*args)
            .status()
            .with_context(|| format!("Failed to run cargo test for '{label}'"))?;

        if !status.success() {
            anyhow::bail!("Feature combination '{label}' failed");
        }

        println!("✅ Features '{label}' passed");
    }

    println!("\n✅ All {} feature combinations passed!", FEATURE_COMBINATIONS.len());

    Ok(())
}
