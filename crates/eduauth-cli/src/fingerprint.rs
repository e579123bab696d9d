//! # Fingerprint Subcommand
//!
//! Prints the identity fingerprint the registry stores for an identity
//! number, so operators can match a database row to a document without
//! the number ever being written down.

use anyhow::Result;
use clap::Args;

use eduauth_core::IdentityFingerprint;

/// Arguments for `eduauth fingerprint`.
#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// The identity number (NID or birth certificate number).
    #[arg(value_name = "IDENTITY_NUMBER")]
    pub identity_number: Option<String>,
}

/// The line to print, or `None` for a missing number.
pub fn render(identity_number: Option<&str>) -> Option<String> {
    IdentityFingerprint::of_optional(identity_number).map(|fp| fp.as_str().to_string())
}

/// Execute the fingerprint subcommand. Exits 2 for a missing number.
pub fn run_fingerprint(args: &FingerprintArgs) -> Result<u8> {
    match render(args.identity_number.as_deref()) {
        Some(line) => {
            println!("{line}");
            Ok(0)
        }
        None => {
            eprintln!("identity number is missing; no fingerprint");
            Ok(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_hex_fingerprint() {
        let line = render(Some("1234567890")).unwrap();
        assert_eq!(line.len(), 64);
        assert_eq!(render(Some("1234567890")), Some(line));
    }

    #[test]
    fn missing_number_has_no_fingerprint() {
        assert_eq!(render(None), None);
        assert_eq!(render(Some("")), None);
        assert_eq!(render(Some("   ")), None);
    }

    #[test]
    fn missing_number_exits_with_two() {
        let args = FingerprintArgs {
            identity_number: None,
        };
        assert_eq!(run_fingerprint(&args).unwrap(), 2);
    }
}
