use ethers::core::types::H160;

pub fn validate_address(address: &str) -> bool {
    address.starts_with("0x") && address.parse::<H160>().is_ok()
}

/// Hex addresses compare case-insensitively (EIP-55 checksums only change case).
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
