use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::ethereum::contract::{
    BASE_CHAIN_ID, BASE_EXPLORER_URL, BASE_PUBLIC_RPC_URL, FACTORY_ADDRESS, NFT_FACTORY_ADDRESS,
};
use crate::ethereum::receipt::{Platform, ReceiptTimeouts, WaitStrategy};
use crate::ethereum::{utils, NativeCurrency, NetworkParams};

/// Upper bound for `farming.gas_buffer_percent`.
pub const MAX_GAS_BUFFER_PERCENT: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub contracts: ContractsConfig,
    pub farming: FarmingConfig,
    pub receipts: ReceiptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub currency_name: String,
    pub currency_symbol: String,
    pub currency_decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletConfig {
    /// JSON-RPC endpoint that signs `eth_sendTransaction` for the user.
    pub rpc_url: String,
    pub timeout_seconds: u64,
    pub receipt_poll_ms: u64,
    pub receipt_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractsConfig {
    pub factory: String,
    pub nft_factory: String,
    pub pinger_bytecode: Option<String>,
    /// 4-byte selector of the NFT factory's `mint`, e.g. "0x056b01ce".
    pub mint_selector: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GasMode {
    /// Fees are left to the wallet.
    #[default]
    Wallet,
    /// maxFeePerGas / maxPriorityFeePerGas come from the farming settings.
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FarmingConfig {
    pub transactions_enabled: bool,
    pub gas_mode: GasMode,
    pub min_gas_create_clone: u64,
    pub min_gas_ping: u64,
    pub gas_buffer_percent: u64,
    pub max_fee_gwei: f64,
    pub priority_gwei: f64,
    pub send_retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptConfig {
    pub platform: Platform,
    /// Overrides the strategy derived from `platform`.
    pub strategy: Option<WaitStrategy>,
    pub public_rpc_url: String,
    pub public_poll_ms: u64,
    pub public_timeout_ms: u64,
    pub race_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                chain_id: BASE_CHAIN_ID,
                chain_name: "Base".to_string(),
                rpc_url: BASE_PUBLIC_RPC_URL.to_string(),
                explorer_url: BASE_EXPLORER_URL.to_string(),
                currency_name: "Ether".to_string(),
                currency_symbol: "ETH".to_string(),
                currency_decimals: 18,
            },
            wallet: WalletConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                timeout_seconds: 30,
                receipt_poll_ms: 1000,
                receipt_max_attempts: 60,
            },
            contracts: ContractsConfig {
                factory: FACTORY_ADDRESS.to_string(),
                nft_factory: NFT_FACTORY_ADDRESS.to_string(),
                pinger_bytecode: None,
                mint_selector: None,
            },
            farming: FarmingConfig {
                transactions_enabled: false,
                gas_mode: GasMode::Wallet,
                min_gas_create_clone: 180_000,
                min_gas_ping: 50_000,
                gas_buffer_percent: 20,
                max_fee_gwei: 0.05,
                priority_gwei: 0.01,
                send_retry_backoff_ms: 2000,
            },
            receipts: ReceiptConfig {
                platform: Platform::Desktop,
                strategy: None,
                public_rpc_url: BASE_PUBLIC_RPC_URL.to_string(),
                public_poll_ms: 800,
                public_timeout_ms: 12_000,
                race_timeout_ms: 10_000,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("BASER_WALLET_RPC_URL") {
            tracing::info!("Using BASER_WALLET_RPC_URL for the wallet provider");
            self.wallet.rpc_url = url;
        }

        if let Ok(url) = std::env::var("BASER_PUBLIC_RPC_URL") {
            tracing::info!("Using BASER_PUBLIC_RPC_URL for receipt polling");
            self.receipts.public_rpc_url = url;
        }
    }

    /// Checks the values that would otherwise only fail mid-transaction.
    pub fn validate(&self) -> Result<()> {
        utils::validate_address(&self.contracts.factory)
            .map_err(|e| anyhow!("contracts.factory: {}", e))?;
        utils::validate_address(&self.contracts.nft_factory)
            .map_err(|e| anyhow!("contracts.nft_factory: {}", e))?;

        if let Some(bytecode) = &self.contracts.pinger_bytecode {
            utils::validate_hex_data(bytecode)
                .map_err(|e| anyhow!("contracts.pinger_bytecode: {}", e))?;
        }
        self.mint_selector()?;

        for (name, gwei) in [
            ("farming.max_fee_gwei", self.farming.max_fee_gwei),
            ("farming.priority_gwei", self.farming.priority_gwei),
        ] {
            if !gwei.is_finite() || gwei < 0.0 {
                return Err(anyhow!("{} must be a non-negative number, got {}", name, gwei));
            }
        }

        if self.farming.gas_buffer_percent > MAX_GAS_BUFFER_PERCENT {
            return Err(anyhow!(
                "farming.gas_buffer_percent must be at most {}, got {}",
                MAX_GAS_BUFFER_PERCENT,
                self.farming.gas_buffer_percent
            ));
        }

        if self.wallet.receipt_max_attempts == 0 {
            return Err(anyhow!("wallet.receipt_max_attempts must be at least 1"));
        }

        Ok(())
    }

    pub fn network_params(&self) -> NetworkParams {
        NetworkParams {
            chain_id: utils::to_hex_quantity(self.network.chain_id as u128),
            chain_name: self.network.chain_name.clone(),
            native_currency: NativeCurrency {
                name: self.network.currency_name.clone(),
                symbol: self.network.currency_symbol.clone(),
                decimals: self.network.currency_decimals,
            },
            rpc_urls: vec![self.network.rpc_url.clone()],
            block_explorer_urls: vec![self.network.explorer_url.clone()],
        }
    }

    pub fn mint_selector(&self) -> Result<Option<[u8; 4]>> {
        self.contracts
            .mint_selector
            .as_deref()
            .map(utils::parse_selector)
            .transpose()
            .map_err(|e| anyhow!("contracts.mint_selector: {}", e))
    }

    pub fn wait_strategy(&self) -> WaitStrategy {
        self.receipts
            .strategy
            .unwrap_or_else(|| WaitStrategy::for_platform(self.receipts.platform))
    }

    pub fn receipt_timeouts(&self) -> ReceiptTimeouts {
        ReceiptTimeouts {
            public_poll: Duration::from_millis(self.receipts.public_poll_ms),
            public_timeout: Duration::from_millis(self.receipts.public_timeout_ms),
            race_timeout: Duration::from_millis(self.receipts.race_timeout_ms),
        }
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("baser-mcp").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# BaseR MCP Server Configuration File
# This file configures the wallet provider, contracts, farming and receipt waiting

# Target network (Base mainnet)
[network]
chain_id = 8453
chain_name = "Base"
rpc_url = "https://mainnet.base.org"
explorer_url = "https://basescan.org"
currency_name = "Ether"
currency_symbol = "ETH"
currency_decimals = 18

# Wallet provider: any JSON-RPC endpoint that signs eth_sendTransaction
[wallet]
rpc_url = "http://127.0.0.1:8545"
timeout_seconds = 30
receipt_poll_ms = 1000
receipt_max_attempts = 60

[contracts]
factory = "0x0ae36d90d4e295a4b87274eec0c1520fd5f6f842"
nft_factory = "0x5A5aea5bF11BaaF2f3f420C8e694425aC3590c8C"
# pinger_bytecode = "0x6080..."   # required by deploy_pinger
# mint_selector = "0x056b01ce"    # required by mint_collection

[farming]
transactions_enabled = false
gas_mode = "wallet"              # "wallet" or "custom"
min_gas_create_clone = 180000
min_gas_ping = 50000
gas_buffer_percent = 20
max_fee_gwei = 0.05              # custom gas mode only
priority_gwei = 0.01             # custom gas mode only
send_retry_backoff_ms = 2000

[receipts]
platform = "desktop"             # "desktop" (public_first) or "mobile" (race)
# strategy = "two_stage"         # pin "public_first", "race" or "two_stage"
public_rpc_url = "https://mainnet.base.org"
public_poll_ms = 800
public_timeout_ms = 12000
race_timeout_ms = 10000

# Environment variables that can be used:
# BASER_WALLET_RPC_URL - overrides wallet.rpc_url
# BASER_PUBLIC_RPC_URL - overrides receipts.public_rpc_url
"#;
        sample_config.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sample_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();
        assert_eq!(config, Config::default());
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.contracts.mint_selector = Some("0x056b01ce".to_string());
        config.farming.gas_mode = GasMode::Custom;
        config.receipts.strategy = Some(WaitStrategy::TwoStage);
        config.save_to_file(&path).await.unwrap();

        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.mint_selector().unwrap(), Some([0x05, 0x6b, 0x01, 0xce]));
        assert_eq!(loaded.wait_strategy(), WaitStrategy::TwoStage);
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.contracts.mint_selector = Some("0x056b01".to_string());
        config.save_to_file(&path).await.unwrap();

        assert!(Config::load_from_file(&path).await.is_err());
        let loaded = Config::load_or_default(Some(&path)).await;
        assert_eq!(loaded.contracts.mint_selector, None);
    }

    #[test]
    fn test_derived_values() {
        let mut config = Config::default();
        assert_eq!(config.wait_strategy(), WaitStrategy::PublicFirst);
        config.receipts.platform = Platform::Mobile;
        assert_eq!(config.wait_strategy(), WaitStrategy::Race);

        let params = config.network_params();
        assert_eq!(params.chain_id, "0x2105");
        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["chainName"], "Base");
        assert_eq!(wire["nativeCurrency"]["decimals"], 18);
        assert_eq!(wire["rpcUrls"][0], "https://mainnet.base.org");
        assert_eq!(wire["blockExplorerUrls"][0], "https://basescan.org");

        assert_eq!(config.receipt_timeouts(), ReceiptTimeouts::default());
        assert_eq!(config.mint_selector().unwrap(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.contracts.factory = "0x1234".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.farming.max_fee_gwei = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.contracts.pinger_bytecode = Some("0x608".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.farming.gas_buffer_percent = u64::MAX;
        assert!(config.validate().is_err());
        config.farming.gas_buffer_percent = MAX_GAS_BUFFER_PERCENT;
        assert!(config.validate().is_ok());
    }
}
