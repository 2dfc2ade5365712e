//! `keygen` command: generate a new account key.

use super::CliResult;
use medivault_cipher::CipherKey;

pub fn run() -> CliResult {
    let key = CipherKey::generate();

    println!("key:    {}", key.encode());
    println!("digest: {}", key.digest());
    println!();
    println!("Keep the key private; it never leaves this machine in plaintext.");
    println!("Only the digest may be stored server-side for possession checks.");
    Ok(())
}
