//! Error types for the challenge engine and driver.

use std::path::PathBuf;

/// Failure to build a challenge engine from a key file.
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    #[error("no key file configured")]
    NotConfigured,

    #[error("cannot read key file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode private key in {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("password does not unlock private key in {}", .path.display())]
    Locked { path: PathBuf },
}

/// Failure to turn accumulated ciphertext into a response token.
#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("no ciphertext received")]
    Empty,

    #[error("ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("RSA decryption failed: {0}")]
    Rsa(#[from] rsa::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_path() {
        let err = KeyLoadError::Locked {
            path: PathBuf::from("/etc/oper.key"),
        };
        assert_eq!(
            err.to_string(),
            "password does not unlock private key in /etc/oper.key"
        );
    }
}
