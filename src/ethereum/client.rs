use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::abi::{self, AbiItem};
use super::provider::Eip1193Provider;
use super::{
    utils, FeeData, GasOverrides, NetworkParams, TransactionParams, TransactionReceipt, Web3Error,
    LEGACY_CALL_GAS, LEGACY_DEPLOY_GAS,
};

type Result<T> = std::result::Result<T, Web3Error>;

pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const RECEIPT_MAX_ATTEMPTS: u32 = 60;

/// Blocks inspected by `eth_feeHistory` and the reward percentiles asked for.
const FEE_HISTORY_BLOCKS: u64 = 4;
const FEE_HISTORY_PERCENTILES: [u8; 3] = [25, 50, 75];

/// Typed JSON-RPC helpers over an injected provider.
#[derive(Debug, Clone)]
pub struct Web3Client {
    provider: Arc<dyn Eip1193Provider>,
    receipt_poll_interval: Duration,
    receipt_max_attempts: u32,
}

impl Web3Client {
    pub fn new(provider: Arc<dyn Eip1193Provider>) -> Self {
        Self {
            provider,
            receipt_poll_interval: RECEIPT_POLL_INTERVAL,
            receipt_max_attempts: RECEIPT_MAX_ATTEMPTS,
        }
    }

    pub fn with_receipt_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_max_attempts = max_attempts;
        self
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.provider.request(method, params).await
    }

    async fn request_string(&self, method: &str, params: Value) -> Result<String> {
        let value = self.request(method, params).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Web3Error::invalid_response(method, format!("expected a string, got {}", value)))
    }

    async fn request_addresses(&self, method: &str) -> Result<Vec<String>> {
        let value = self.request(method, json!([])).await?;
        serde_json::from_value(value).map_err(|e| Web3Error::invalid_response(method, e.to_string()))
    }

    /// May open a permission prompt in the wallet.
    pub async fn request_accounts(&self) -> Result<Vec<String>> {
        self.request_addresses("eth_requestAccounts").await
    }

    pub async fn get_accounts(&self) -> Result<Vec<String>> {
        self.request_addresses("eth_accounts").await
    }

    /// First connected account, or `NoAccount`.
    pub async fn primary_account(&self) -> Result<String> {
        self.get_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(Web3Error::NoAccount)
    }

    pub async fn get_chain_id(&self) -> Result<String> {
        self.request_string("eth_chainId", json!([])).await
    }

    pub async fn get_balance(&self, address: &str) -> Result<String> {
        self.request_string("eth_getBalance", json!([address, "latest"]))
            .await
    }

    pub async fn get_gas_price(&self) -> Result<String> {
        self.request_string("eth_gasPrice", json!([])).await
    }

    /// Suggested EIP-1559 fees. Degrades from fee history to the legacy gas
    /// price to fixed defaults; never fails.
    pub async fn get_fee_data(&self) -> FeeData {
        match self.fee_data_from_history().await {
            Ok(fee_data) => return fee_data,
            Err(e) => warn!(
                "EIP-1559 fee data not available, falling back to legacy gas price: {}",
                e
            ),
        }

        match self.fee_data_from_gas_price().await {
            Ok(fee_data) => fee_data,
            Err(e) => {
                warn!("Gas price not available, using default fees: {}", e);
                FeeData::DEFAULT
            }
        }
    }

    async fn fee_data_from_history(&self) -> Result<FeeData> {
        let history = self
            .request(
                "eth_feeHistory",
                json!([FEE_HISTORY_BLOCKS, "latest", FEE_HISTORY_PERCENTILES]),
            )
            .await?;
        fee_data_from_history(&history)
    }

    async fn fee_data_from_gas_price(&self) -> Result<FeeData> {
        let gas_price = utils::parse_hex_quantity(&self.get_gas_price().await?)?;
        Ok(FeeData {
            max_fee_per_gas: gas_price,
            max_priority_fee_per_gas: gas_price.div_ceil(10),
            gas_price,
        })
    }

    /// `eth_estimateGas` for an encoded call from the primary account.
    pub async fn estimate_call_gas(&self, to: &str, data: &str, value: Option<&str>) -> Result<u64> {
        let from = self.primary_account().await?;
        let mut call = json!({ "to": to, "from": from, "data": data });
        if let Some(value) = value {
            call["value"] = json!(value);
        }

        let estimate = self.request_string("eth_estimateGas", json!([call])).await?;
        let gas = utils::parse_hex_quantity(&estimate)?;
        u64::try_from(gas)
            .map_err(|_| Web3Error::invalid_response("eth_estimateGas", "estimate exceeds u64"))
    }

    pub async fn estimate_gas(
        &self,
        contract_address: &str,
        abi: &[AbiItem],
        method_name: &str,
        params: &[Value],
    ) -> Result<u64> {
        let method = abi::find_function(abi, method_name)?;
        let data = abi::encode_call(method, params)?;
        self.estimate_call_gas(contract_address, &data, None).await
    }

    pub async fn switch_network(&self, chain_id: &str) -> Result<()> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": chain_id }]),
        )
        .await?;
        Ok(())
    }

    pub async fn add_network(&self, network: &NetworkParams) -> Result<()> {
        self.request("wallet_addEthereumChain", json!([network]))
            .await?;
        Ok(())
    }

    /// Puts the wallet on `network`: switch, add the chain when the wallet
    /// does not know it, then re-read the active chain.
    pub async fn ensure_network(&self, network: &NetworkParams) -> Result<String> {
        let current = self.get_chain_id().await?;
        if same_chain(&current, &network.chain_id) {
            return Ok(current);
        }

        info!(
            "Wallet is on chain {}, switching to {} ({})",
            current, network.chain_name, network.chain_id
        );
        match self.switch_network(&network.chain_id).await {
            Ok(()) => {}
            Err(e) if e.is_chain_not_added() => {
                info!("{} is not added to the wallet, adding it", network.chain_name);
                self.add_network(network).await?;
            }
            Err(e) => return Err(e),
        }

        let active = self.get_chain_id().await?;
        if !same_chain(&active, &network.chain_id) {
            return Err(Web3Error::WrongNetwork {
                expected: network.chain_id.clone(),
                actual: active,
            });
        }
        Ok(active)
    }

    pub async fn send_transaction(&self, transaction: &TransactionParams) -> Result<String> {
        debug!("eth_sendTransaction {:?}", transaction);
        self.request_string("eth_sendTransaction", json!([transaction]))
            .await
    }

    pub async fn call_contract(
        &self,
        contract_address: &str,
        abi: &[AbiItem],
        method_name: &str,
        params: &[Value],
        gas_overrides: Option<&GasOverrides>,
    ) -> Result<String> {
        let method = abi::find_function(abi, method_name)?;
        let data = abi::encode_call(method, params)?;
        let from = self.primary_account().await?;

        let mut transaction = TransactionParams {
            to: Some(contract_address.to_string()),
            from,
            data,
            ..Default::default()
        };
        transaction.apply_gas(gas_overrides, LEGACY_CALL_GAS);

        self.send_transaction(&transaction).await
    }

    pub async fn deploy_contract(
        &self,
        abi: &[AbiItem],
        bytecode: &str,
        constructor_params: &[Value],
        gas_overrides: Option<&GasOverrides>,
    ) -> Result<String> {
        let from = self.primary_account().await?;

        let mut data = utils::validate_hex_data(bytecode)?;
        if let Some(constructor) = abi::find_constructor(abi) {
            if !constructor_params.is_empty() {
                let encoded = abi::encode_parameters(&constructor.inputs, constructor_params)?;
                data.push_str(&encoded[2..]);
            }
        }

        let mut transaction = TransactionParams {
            to: None,
            from,
            data,
            ..Default::default()
        };
        transaction.apply_gas(gas_overrides, LEGACY_DEPLOY_GAS);

        self.send_transaction(&transaction).await
    }

    pub async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>> {
        let value = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Web3Error::invalid_response("eth_getTransactionReceipt", e.to_string()))
    }

    /// Polls the provider for a receipt, once per interval, up to the
    /// configured number of attempts. Request errors count as a miss.
    pub async fn wait_for_transaction(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        for attempt in 1..=self.receipt_max_attempts {
            match self.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => debug!(
                    "Error getting transaction receipt for {} (attempt {}): {}",
                    tx_hash, attempt, e
                ),
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }

        Err(Web3Error::ReceiptTimeout(format!(
            "Transaction receipt not found after waiting ({} attempts) for {}",
            self.receipt_max_attempts, tx_hash
        )))
    }
}

fn same_chain(a: &str, b: &str) -> bool {
    match (utils::parse_hex_quantity(a), utils::parse_hex_quantity(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// Fee suggestion from an `eth_feeHistory` result: twice the latest base
/// fee plus the mean median reward.
fn fee_data_from_history(history: &Value) -> Result<FeeData> {
    let malformed = |message: &str| Web3Error::invalid_response("eth_feeHistory", message);

    let base_fees = history
        .get("baseFeePerGas")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing baseFeePerGas"))?;
    let rewards = history
        .get("reward")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing reward"))?;

    let latest_base_fee = base_fees
        .last()
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("empty baseFeePerGas"))?;
    let latest_base_fee = utils::parse_hex_quantity(latest_base_fee)?;

    let mut priority_fees = Vec::with_capacity(rewards.len());
    for block in rewards {
        let median = block
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("reward entry without a 50th percentile"))?;
        priority_fees.push(utils::parse_hex_quantity(median)?);
    }

    let avg_priority_fee = if priority_fees.is_empty() {
        0
    } else {
        let total: u128 = priority_fees.iter().sum();
        total.div_ceil(priority_fees.len() as u128)
    };

    Ok(FeeData {
        max_fee_per_gas: latest_base_fee
            .saturating_mul(2)
            .saturating_add(avg_priority_fee),
        max_priority_fee_per_gas: avg_priority_fee,
        gas_price: latest_base_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ethereum::contract;
    use crate::ethereum::testing::{rpc_error, success_receipt, unsupported, MockProvider};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const ACCOUNT: &str = "0xabc0000000000000000000000000000000000001";

    fn wallet(method: &str, _params: &Value) -> std::result::Result<Value, Web3Error> {
        match method {
            "eth_accounts" | "eth_requestAccounts" => Ok(json!([ACCOUNT])),
            "eth_chainId" => Ok(json!("0x2105")),
            "eth_sendTransaction" => Ok(json!("0xfeed")),
            "eth_estimateGas" => Ok(json!("0x1d4c0")),
            other => Err(unsupported(other)),
        }
    }

    #[tokio::test]
    async fn test_fee_data_from_history() {
        let provider = MockProvider::new(|method, params| match method {
            "eth_feeHistory" => {
                assert_eq!(params, &json!([4, "latest", [25, 50, 75]]));
                Ok(json!({
                    "oldestBlock": "0x10",
                    "baseFeePerGas": ["0x5", "0x6", "0x7", "0x8", "0x64"],
                    "reward": [
                        ["0x1", "0xa", "0x20"],
                        ["0x1", "0xb", "0x20"],
                        ["0x1", "0xb", "0x20"],
                        ["0x1", "0xb", "0x20"]
                    ]
                }))
            }
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider);

        // mean of 10, 11, 11, 11 is 10.75, rounded up
        let fees = client.get_fee_data().await;
        assert_eq!(
            fees,
            FeeData {
                max_fee_per_gas: 211,
                max_priority_fee_per_gas: 11,
                gas_price: 100,
            }
        );
    }

    #[tokio::test]
    async fn test_fee_data_falls_back_to_gas_price() {
        let provider = MockProvider::new(|method, _| match method {
            "eth_feeHistory" => Ok(json!({ "baseFeePerGas": [] })),
            "eth_gasPrice" => Ok(json!("0x3b9aca05")), // 1_000_000_005
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider.clone());

        let fees = client.get_fee_data().await;
        assert_eq!(fees.max_fee_per_gas, 1_000_000_005);
        assert_eq!(fees.max_priority_fee_per_gas, 100_000_001);
        assert_eq!(fees.gas_price, 1_000_000_005);
        assert_eq!(provider.calls_to("eth_gasPrice").len(), 1);
    }

    #[tokio::test]
    async fn test_fee_data_never_fails() {
        let provider = MockProvider::new(|method, _| Err(unsupported(method)));
        let client = Web3Client::new(provider);

        let fees = client.get_fee_data().await;
        assert_eq!(
            fees,
            FeeData {
                max_fee_per_gas: 50_000_000,
                max_priority_fee_per_gas: 10_000_000,
                gas_price: 50_000_000,
            }
        );
    }

    #[tokio::test]
    async fn test_estimate_gas() {
        let provider = MockProvider::new(wallet);
        let client = Web3Client::new(provider.clone());

        let gas = client
            .estimate_gas(contract::FACTORY_ADDRESS, &contract::factory_abi(), "createClone", &[])
            .await
            .unwrap();
        assert_eq!(gas, 120_000);

        let call = &provider.calls_to("eth_estimateGas")[0][0];
        assert_eq!(call["from"], ACCOUNT);
        assert_eq!(call["data"], "0x64f2d4b9");

        let err = client
            .estimate_gas(contract::FACTORY_ADDRESS, &contract::factory_abi(), "destroy", &[])
            .await
            .unwrap_err();
        assert_eq!(err, Web3Error::MethodNotFound("destroy".to_string()));
    }

    #[tokio::test]
    async fn test_estimate_gas_without_account() {
        let provider = MockProvider::new(|method, _| match method {
            "eth_accounts" => Ok(json!([])),
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider);

        let err = client
            .estimate_gas(contract::FACTORY_ADDRESS, &contract::factory_abi(), "createClone", &[])
            .await
            .unwrap_err();
        assert_eq!(err, Web3Error::NoAccount);
    }

    #[tokio::test]
    async fn test_call_contract_with_and_without_overrides() {
        let provider = MockProvider::new(wallet);
        let client = Web3Client::new(provider.clone());
        let pinger = contract::pinger_abi();
        let clone = "0x00000000000000000000000000000000000000c1";

        let hash = client
            .call_contract(clone, &pinger, "ping", &[], None)
            .await
            .unwrap();
        assert_eq!(hash, "0xfeed");

        let overrides = GasOverrides {
            gas_limit: Some(50_000),
            max_fee_per_gas: Some(2_000_000),
            max_priority_fee_per_gas: Some(1_000_000),
        };
        client
            .call_contract(clone, &pinger, "ping", &[], Some(&overrides))
            .await
            .unwrap();

        let sent = provider.calls_to("eth_sendTransaction");
        assert_eq!(
            sent[0][0],
            json!({
                "to": clone,
                "from": ACCOUNT,
                "data": "0x5c36b186",
                "gas": "0x76c0",
                "gasPrice": "0x9184e72a000"
            })
        );
        assert_eq!(
            sent[1][0],
            json!({
                "to": clone,
                "from": ACCOUNT,
                "data": "0x5c36b186",
                "gas": "0xc350",
                "maxFeePerGas": "0x1e8480",
                "maxPriorityFeePerGas": "0xf4240"
            })
        );
    }

    #[tokio::test]
    async fn test_deploy_contract() {
        let provider = MockProvider::new(wallet);
        let client = Web3Client::new(provider.clone());
        let abi = vec![AbiItem::constructor(&[("start", "uint256")])];

        client
            .deploy_contract(&abi, "0x6080", &[json!(1)], None)
            .await
            .unwrap();
        client
            .deploy_contract(&contract::pinger_abi(), "0x6080", &[], None)
            .await
            .unwrap();

        let sent = provider.calls_to("eth_sendTransaction");
        let with_args = &sent[0][0];
        assert!(with_args.get("to").is_none());
        assert_eq!(with_args["data"], format!("0x6080{:064x}", 1));
        assert_eq!(with_args["gas"], "0x7a120");
        assert_eq!(sent[1][0]["data"], "0x6080");
    }

    #[tokio::test]
    async fn test_ensure_network_already_active() {
        let provider = MockProvider::new(wallet);
        let client = Web3Client::new(provider.clone());
        let base = Config::default().network_params();

        assert_eq!(client.ensure_network(&base).await.unwrap(), "0x2105");
        assert!(provider.calls_to("wallet_switchEthereumChain").is_empty());
    }

    #[tokio::test]
    async fn test_ensure_network_adds_unknown_chain() {
        let chain = Arc::new(Mutex::new("0x1".to_string()));
        let state = chain.clone();
        let provider = MockProvider::new(move |method, params| match method {
            "eth_chainId" => Ok(json!(state.lock().unwrap().clone())),
            "wallet_switchEthereumChain" => Err(rpc_error(4902, "Unrecognized chain ID")),
            "wallet_addEthereumChain" => {
                *state.lock().unwrap() = params[0]["chainId"].as_str().unwrap().to_string();
                Ok(Value::Null)
            }
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider.clone());
        let base = Config::default().network_params();

        assert_eq!(client.ensure_network(&base).await.unwrap(), "0x2105");
        assert_eq!(provider.calls_to("wallet_switchEthereumChain").len(), 1);
        let added = &provider.calls_to("wallet_addEthereumChain")[0][0];
        assert_eq!(added["chainName"], "Base");
        assert_eq!(provider.calls_to("eth_chainId").len(), 2);
    }

    #[tokio::test]
    async fn test_ensure_network_reports_wrong_chain() {
        let provider = MockProvider::new(|method, _| match method {
            "eth_chainId" => Ok(json!("0x1")),
            "wallet_switchEthereumChain" => Ok(Value::Null),
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider);
        let base = Config::default().network_params();

        let err = client.ensure_network(&base).await.unwrap_err();
        assert!(matches!(err, Web3Error::WrongNetwork { .. }));
    }

    #[tokio::test]
    async fn test_ensure_network_propagates_rejection() {
        let provider = MockProvider::new(|method, _| match method {
            "eth_chainId" => Ok(json!("0x1")),
            "wallet_switchEthereumChain" => Err(rpc_error(4001, "User rejected the request.")),
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider.clone());
        let base = Config::default().network_params();

        assert!(client.ensure_network(&base).await.unwrap_err().is_user_rejection());
        assert!(provider.calls_to("wallet_addEthereumChain").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_transaction_times_out() {
        let provider = MockProvider::new(|method, _| match method {
            "eth_getTransactionReceipt" => Ok(Value::Null),
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider.clone());

        let started = tokio::time::Instant::now();
        let err = client.wait_for_transaction("0xfeed").await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(provider.calls_to("eth_getTransactionReceipt").len(), 60);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_transaction_retries_through_errors() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let provider = MockProvider::new(move |method, params| match method {
            "eth_getTransactionReceipt" => match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(rpc_error(-32000, "header not found")),
                1 => Ok(Value::Null),
                _ => Ok(success_receipt(params[0].as_str().unwrap())),
            },
            other => Err(unsupported(other)),
        });
        let client = Web3Client::new(provider);

        let receipt = client.wait_for_transaction("0xfeed").await.unwrap();
        assert!(receipt.is_success());
        assert_eq!(receipt.transaction_hash.as_deref(), Some("0xfeed"));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }
}
