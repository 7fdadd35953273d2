use alloy::primitives::Address;
use std::str::FromStr;

use super::Web3Error;

type Result<T> = std::result::Result<T, Web3Error>;

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(Web3Error::InvalidInput("Address cannot be empty".to_string()));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(Web3Error::InvalidInput(format!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        )));
    }

    if address.len() != 42 {
        return Err(Web3Error::InvalidInput(format!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        )));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Web3Error::InvalidInput(format!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        )));
    }

    Address::from_str(address)
        .map_err(|e| Web3Error::InvalidInput(format!("Invalid Ethereum address: '{}'. Error: {}", address, e)))
}

/// Validates a Solidity identifier used as a function name
pub fn validate_function_name(function_name: &str) -> Result<()> {
    let Some(first) = function_name.chars().next() else {
        return Err(Web3Error::InvalidInput(
            "Function name cannot be empty".to_string(),
        ));
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Web3Error::InvalidInput(format!(
            "Invalid function name: '{}'. Function names must start with a letter or underscore",
            function_name
        )));
    }

    if !function_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Web3Error::InvalidInput(format!(
            "Invalid function name: '{}'. Function names can only contain letters, numbers, and underscores",
            function_name
        )));
    }

    Ok(())
}

pub fn strip_0x(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Parses a JSON-RPC quantity (`0x`-prefixed hex) into an integer.
pub fn parse_hex_quantity(value: &str) -> Result<u128> {
    let digits = strip_0x(value.trim());
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| Web3Error::InvalidInput(format!("Invalid hexadecimal quantity: '{}'", value)))
}

/// Encodes an integer as a JSON-RPC quantity.
pub fn to_hex_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Validates `0x`-prefixed hex data (bytecode, calldata) and returns it
/// lowercased with the prefix.
pub fn validate_hex_data(data: &str) -> Result<String> {
    let digits = strip_0x(data.trim());
    if digits.len() % 2 != 0 {
        return Err(Web3Error::InvalidInput(format!(
            "Hex data must have an even number of digits, got {}",
            digits.len()
        )));
    }
    hex::decode(digits)
        .map_err(|e| Web3Error::InvalidInput(format!("Invalid hex data: {}", e)))?;
    Ok(format!("0x{}", digits.to_lowercase()))
}

/// Parses a 4-byte function selector such as `0x6a627842`.
pub fn parse_selector(selector: &str) -> Result<[u8; 4]> {
    let bytes = hex::decode(strip_0x(selector.trim())).map_err(|_| {
        Web3Error::InvalidInput(format!("Invalid function selector: '{}'", selector))
    })?;
    <[u8; 4]>::try_from(bytes.as_slice()).map_err(|_| {
        Web3Error::InvalidInput(format!(
            "Function selector must be exactly 4 bytes: '{}'",
            selector
        ))
    })
}

/// Creates user-friendly error messages for common wallet and RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("user rejected") || error.contains("User denied") || error.contains("4001") {
        "Transaction rejected: The request was declined in the wallet.".to_string()
    } else if error.contains("execution reverted") {
        format!(
            "Transaction failed: The contract function reverted execution. {}",
            if error.contains("revert") {
                "This usually means the function's requirements were not met or an assertion failed."
            } else {
                "Check your parameters and try again."
            }
        )
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover gas costs. Make sure your account has enough ETH on Base for gas fees.".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Transaction failed: Gas limit too low. Try increasing the minimum gas for this call."
            .to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: Nonce too low. This usually means another transaction was already mined with this nonce.".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Transaction failed: Gas price too low to replace pending transaction. Increase the max fee.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to the wallet RPC endpoint. Check the wallet URL configuration.".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "Network error: Request timed out. The wallet or RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("rate limit") || error.contains("429") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments.".to_string()
    } else if error.contains("method not found") || error.contains("-32601") {
        "RPC error: The requested method is not supported by this wallet or endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_ok());
        assert!(validate_address("0x0000000000000000000000000000000000000000").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("not_an_address").is_err());
        assert!(validate_address("0x123").is_err()); // Too short
        assert!(validate_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err()); // Missing 0x
        assert!(validate_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
    }

    #[test]
    fn test_validate_function_name() {
        assert!(validate_function_name("createClone").is_ok());
        assert!(validate_function_name("_internal").is_ok());
        assert!(validate_function_name("ping2").is_ok());

        assert!(validate_function_name("").is_err());
        assert!(validate_function_name("123invalid").is_err());
        assert!(validate_function_name("invalid-name").is_err());
    }

    #[test]
    fn test_hex_quantities() {
        assert_eq!(parse_hex_quantity("0x2105").unwrap(), 8453);
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x").unwrap(), 0);
        assert!(parse_hex_quantity("0xzz").is_err());

        assert_eq!(to_hex_quantity(30400), "0x76c0");
        assert_eq!(to_hex_quantity(0), "0x0");
    }

    #[test]
    fn test_validate_hex_data() {
        assert_eq!(validate_hex_data("0x6080AB").unwrap(), "0x6080ab");
        assert_eq!(validate_hex_data("6080").unwrap(), "0x6080");
        assert!(validate_hex_data("0x608").is_err());
        assert!(validate_hex_data("0xzz").is_err());
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(parse_selector("0x6a627842").unwrap(), [0x6a, 0x62, 0x78, 0x42]);
        assert!(parse_selector("0x6a6278").is_err());
        assert!(parse_selector("nope").is_err());
    }

    #[test]
    fn test_interpret_rpc_error() {
        assert!(interpret_rpc_error("RPC error 4001: User denied transaction signature")
            .starts_with("Transaction rejected"));
        assert!(interpret_rpc_error("insufficient funds for gas * price + value")
            .contains("Insufficient funds"));
        assert_eq!(interpret_rpc_error("something odd"), "RPC error: something odd");
    }
}
