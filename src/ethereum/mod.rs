pub mod abi;
pub mod client;
pub mod contract;
pub mod error;
pub mod provider;
pub mod receipt;
pub mod utils;

#[cfg(test)]
pub mod testing;

use serde::{Deserialize, Serialize};

pub use error::Web3Error;

/// Receipt `status` as reported by different RPC backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ReceiptStatus {
    Bool(bool),
    Number(u64),
    Hex(String),
}

impl ReceiptStatus {
    /// `"0x1"`, `1` and `true` all mean success.
    pub fn is_success(&self) -> bool {
        match self {
            ReceiptStatus::Bool(b) => *b,
            ReceiptStatus::Number(n) => *n == 1,
            ReceiptStatus::Hex(s) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("0x1") || s == "1"
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Log {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReceiptStatus>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status.as_ref().is_some_and(ReceiptStatus::is_success)
    }

    pub fn gas_used(&self) -> Option<u64> {
        self.gas_used
            .as_deref()
            .and_then(|g| utils::parse_hex_quantity(g).ok())
            .and_then(|g| u64::try_from(g).ok())
    }

    pub fn block_number(&self) -> Option<u64> {
        self.block_number
            .as_deref()
            .and_then(|b| utils::parse_hex_quantity(b).ok())
            .and_then(|b| u64::try_from(b).ok())
    }

    /// Address carried in `topics[1]` of the first log emitted by `emitter`.
    /// Factories index the created contract there.
    pub fn indexed_address_from(&self, emitter: &str) -> Option<String> {
        self.logs
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(emitter))
            .find_map(|log| {
                let topic = log.topics.get(1)?;
                let tail = topic.get(topic.len().checked_sub(40)?..)?;
                Some(format!("0x{}", tail.to_lowercase()))
            })
    }
}

/// EIP-1559 fee snapshot in wei.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub gas_price: u128,
}

impl FeeData {
    pub const DEFAULT: FeeData = FeeData {
        max_fee_per_gas: 50_000_000,         // 0.05 gwei
        max_priority_fee_per_gas: 10_000_000, // 0.01 gwei
        gas_price: 50_000_000,
    };
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GasOverrides {
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub from: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
}

impl TransactionParams {
    /// Hex-encode the overrides into the transaction. Without overrides the
    /// legacy defaults apply.
    pub fn apply_gas(&mut self, overrides: Option<&GasOverrides>, default_gas: &str) {
        match overrides {
            Some(overrides) => {
                if let Some(gas) = overrides.gas_limit.filter(|g| *g > 0) {
                    self.gas = Some(utils::to_hex_quantity(gas as u128));
                }
                if let Some(max_fee) = overrides.max_fee_per_gas.filter(|f| *f > 0) {
                    self.max_fee_per_gas = Some(utils::to_hex_quantity(max_fee));
                }
                if let Some(priority) = overrides.max_priority_fee_per_gas.filter(|p| *p > 0) {
                    self.max_priority_fee_per_gas = Some(utils::to_hex_quantity(priority));
                }
            }
            None => {
                self.gas = Some(default_gas.to_string());
                self.gas_price = Some(LEGACY_GAS_PRICE.to_string());
            }
        }
    }
}

/// Legacy fallback gas limit for contract calls (30400).
pub const LEGACY_CALL_GAS: &str = "0x76c0";
/// Legacy fallback gas limit for deployments (500000).
pub const LEGACY_DEPLOY_GAS: &str = "0x7a120";
/// Legacy fallback gas price (10000000000000 wei).
pub const LEGACY_GAS_PRICE: &str = "0x9184e72a000";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// `wallet_addEthereumChain` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}
