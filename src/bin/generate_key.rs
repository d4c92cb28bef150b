//! Script to generate a signing key for the exchange client.

use std::env;

use bki_exchange::Certificate;

/// Main entry point for the key generator.
///
/// Writes the hex seed to the path given as the first argument (the file
/// `BKI_SIGNING_KEY_PATH` should point at) and prints the public key to hand
/// over to the bureau.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = env::args()
        .nth(1)
        .ok_or("usage: generate_key <key-file>")?;
    if std::path::Path::new(&path).exists() {
        return Err(format!("{} already exists, refusing to overwrite", path).into());
    }

    let certificate = Certificate::generate();
    std::fs::write(&path, format!("{}\n", certificate.seed_hex()))?;

    println!("Signing key written to {}", path);
    println!("Public key:  {}", hex::encode(certificate.public_key().as_bytes()));
    println!("Fingerprint: {}", certificate.fingerprint());
    Ok(())
}
