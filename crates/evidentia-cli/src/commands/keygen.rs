//! Generate a field encryption key.

use evidentia_crypto::FieldKey;

use crate::theme::Theme;

/// Print a fresh 32-byte key as hex on stdout, with usage on stderr.
pub(crate) fn keygen() {
    let key = FieldKey::generate();
    println!("{}", key.to_hex());
    eprintln!(
        "{}",
        Theme::dimmed("Set it as [cipher] key_hex in config.toml or EVIDENTIA_ENCRYPTION_KEY.")
    );
    eprintln!(
        "{}",
        Theme::warning("Records sealed with a lost key cannot be decrypted.")
    );
}
