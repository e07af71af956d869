use solana_sdk::signature::Keypair;
use solana_sdk::signer::SignerError;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::{AppError, Result};

const SECRET_KEY_LEN: usize = 64;

/// Parse a secret key from any of the supported encodings: a base58
/// string, a JSON byte array (`[12, 34, …]`), or a hex string. Whatever
/// the encoding, the decoded secret must be exactly 64 bytes.
pub fn parse_secret_key(raw: &str) -> Result<Keypair> {
    let raw = raw.trim();

    let bytes: Vec<u8> = if raw.starts_with('[') {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Config(format!("invalid JSON key array: {}", e)))?
    } else if raw.len() == SECRET_KEY_LEN * 2 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(raw).map_err(|e| AppError::Config(format!("invalid hex key: {}", e)))?
    } else {
        bs58::decode(raw)
            .into_vec()
            .map_err(|e| AppError::Config(format!("invalid base58 key: {}", e)))?
    };

    if bytes.len() != SECRET_KEY_LEN {
        return Err(AppError::Config(format!(
            "secret key must decode to {} bytes, got {}",
            SECRET_KEY_LEN,
            bytes.len()
        )));
    }

    Keypair::from_bytes(&bytes).map_err(|e| AppError::Config(format!("invalid keypair: {}", e)))
}

/// Sign an unsigned versioned message with a single wallet key. The wallet
/// is always payer and sole required signer for venue transactions.
pub fn sign_message(
    message: solana_sdk::message::VersionedMessage,
    keypair: &Keypair,
) -> Result<VersionedTransaction> {
    VersionedTransaction::try_new(message, &[keypair])
        .map_err(|e: SignerError| AppError::Build(format!("signing failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::Signer;

    #[test]
    fn test_parse_base58_key() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();

        let parsed = parse_secret_key(&encoded).expect("base58 key should parse");
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_parse_json_array_key() {
        let keypair = Keypair::new();
        let encoded = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();

        let parsed = parse_secret_key(&encoded).expect("JSON key should parse");
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_parse_hex_key() {
        let keypair = Keypair::new();
        let encoded = hex::encode(keypair.to_bytes());

        let parsed = parse_secret_key(&encoded).expect("hex key should parse");
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_reject_short_key() {
        let encoded = bs58::encode([1u8; 32]).into_string();
        assert!(parse_secret_key(&encoded).is_err());
    }

    #[test]
    fn test_reject_garbage() {
        assert!(parse_secret_key("not a key at all !!!").is_err());
    }
}
