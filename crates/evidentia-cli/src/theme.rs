//! Terminal styling for command output.

use colored::Colorize;
use evidentia_core::VerifiedFlag;
use evidentia_evidence::VerificationStatus;

/// Styling helpers. All output goes through these so `NO_COLOR` is honoured
/// in one place (by `colored`).
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(60).dimmed().to_string()
    }

    /// Format a key-value line.
    pub(crate) fn kv(key: &str, value: &str) -> String {
        format!("  {:<14} {}", format!("{key}:").bold(), value)
    }

    /// Shorten a 0x-prefixed or bare hex hash for tables.
    pub(crate) fn short_hash(hash: &str) -> String {
        let bare = hash.strip_prefix("0x").unwrap_or(hash);
        let short = bare.get(..12).unwrap_or(bare);
        format!("{}", short.cyan())
    }

    /// Colour a stored verification flag.
    pub(crate) fn flag(flag: VerifiedFlag) -> String {
        match flag {
            VerifiedFlag::Verified => "verified".green().to_string(),
            VerifiedFlag::Tampered => "TAMPERED".red().bold().to_string(),
            VerifiedFlag::Unset => "unverified".dimmed().to_string(),
        }
    }

    /// Colour a verification verdict.
    pub(crate) fn status(status: VerificationStatus) -> String {
        match status {
            VerificationStatus::Verified => "VERIFIED".green().bold().to_string(),
            VerificationStatus::Tampered => "TAMPERED".red().bold().to_string(),
            VerificationStatus::Skipped => "SKIPPED".yellow().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_strips_prefix() {
        colored::control::set_override(false);
        assert_eq!(Theme::short_hash("0xabcdef0123456789ff"), "abcdef012345");
        assert_eq!(Theme::short_hash("abc"), "abc");
    }

    #[test]
    fn test_flag_labels() {
        colored::control::set_override(false);
        assert_eq!(Theme::flag(VerifiedFlag::Tampered), "TAMPERED");
        assert_eq!(Theme::status(VerificationStatus::Skipped), "SKIPPED");
    }
}
