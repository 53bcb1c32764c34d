//! ML-DSA-65 relayer key generator for snapshot-relay.
//!
//! Writes `relayer.key` (hex of secret key followed by public key) to the
//! output directory and prints the relayer address.
//!
//! Usage:
//!   snapshot-relay-keygen [output-dir]

use color_eyre::eyre::{bail, WrapErr};
use snapshot_relay::RelaySigner;
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    println!("ML-DSA-65 relayer key generator for snapshot-relay\n");

    // Get output directory from args or use current directory
    let output_dir = match env::args().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir().wrap_err("Failed to get current directory")?,
    };

    fs::create_dir_all(&output_dir).wrap_err("Failed to create output directory")?;

    let key_path = output_dir.join("relayer.key");
    if key_path.exists() {
        bail!(
            "{} already exists; refusing to overwrite a relayer key",
            key_path.display()
        );
    }

    println!("Generating ML-DSA-65 keypair...");
    let signer = RelaySigner::generate()?;

    fs::write(&key_path, signer.to_hex()).wrap_err("Failed to write relayer key")?;
    restrict_permissions(&key_path)?;

    println!("\nRelayer key saved to: {}", key_path.display());
    println!("  WARNING: Keep this file secure! Anyone holding it can sign as the relay.");
    println!("\nRelayer address: {}", signer.address());
    println!(
        "\nGenerated: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> color_eyre::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .wrap_err("Failed to restrict relayer key permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> color_eyre::Result<()> {
    Ok(())
}
