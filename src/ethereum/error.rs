use thiserror::Error;

/// Wallet error code for "the user rejected the request" (EIP-1193).
pub const USER_REJECTED_CODE: i64 = 4001;

/// Wallet error code returned by `wallet_switchEthereumChain` when the chain
/// has not been added to the wallet yet.
pub const CHAIN_NOT_ADDED_CODE: i64 = 4902;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Web3Error {
    #[error("No wallet provider available: {0}")]
    ProviderUnavailable(String),

    #[error("No accounts connected")]
    NoAccount,

    #[error("Method {0} not found in ABI")]
    MethodNotFound(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response for {method}: {message}")]
    InvalidResponse { method: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    ReceiptTimeout(String),

    #[error("Transaction {0} failed on chain")]
    TransactionFailed(String),

    #[error("Wrong network: expected chain {expected}, wallet is on {actual}")]
    WrongNetwork { expected: String, actual: String },

    #[error("Transactions are disabled: {0}")]
    TransactionsDisabled(String),
}

impl Web3Error {
    pub fn invalid_response(method: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }

    /// True when the wallet reported that the user declined to sign.
    pub fn is_user_rejection(&self) -> bool {
        match self {
            Self::Rpc { code, message } => {
                *code == USER_REJECTED_CODE
                    || message.contains("user rejected")
                    || message.contains("User denied")
            }
            _ => false,
        }
    }

    pub fn is_chain_not_added(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == CHAIN_NOT_ADDED_CODE)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReceiptTimeout(_))
    }

    /// Text for the activity log and tool output. Wallet and transport
    /// failures get the friendlier wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rpc { .. } | Self::Transport(_) => {
                super::utils::interpret_rpc_error(&self.to_string())
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejection_detection() {
        let by_code = Web3Error::Rpc {
            code: 4001,
            message: "rejected".to_string(),
        };
        let by_message = Web3Error::Rpc {
            code: -32000,
            message: "MetaMask Tx Signature: User denied transaction signature.".to_string(),
        };
        let other = Web3Error::Rpc {
            code: -32000,
            message: "insufficient funds".to_string(),
        };

        assert!(by_code.is_user_rejection());
        assert!(by_message.is_user_rejection());
        assert!(!other.is_user_rejection());
        assert!(!Web3Error::NoAccount.is_user_rejection());
    }

    #[test]
    fn test_user_message() {
        let rejected = Web3Error::Rpc {
            code: 4001,
            message: "User rejected the request.".to_string(),
        };
        assert!(rejected.user_message().starts_with("Transaction rejected"));
        assert_eq!(
            Web3Error::NoAccount.user_message(),
            "No accounts connected"
        );
    }

    #[test]
    fn test_chain_not_added_detection() {
        let err = Web3Error::Rpc {
            code: 4902,
            message: "Unrecognized chain ID".to_string(),
        };
        assert!(err.is_chain_not_added());
        assert!(!Web3Error::NoAccount.is_chain_not_added());
    }
}
