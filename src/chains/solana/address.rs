/// A Solana address is the base58 encoding of a 32-byte public key.
pub fn validate_address(address: &str) -> bool {
    match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}
