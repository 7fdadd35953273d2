//! Pinger farm orchestration: wallet session, pinger deployment, the
//! clone/ping loop and NFT collection minting.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::{Config, FarmingConfig, GasMode};
use crate::ethereum::abi::{self, AbiEncoder};
use crate::ethereum::client::Web3Client;
use crate::ethereum::contract;
use crate::ethereum::provider::Eip1193Provider;
use crate::ethereum::receipt::{ReceiptTimeouts, ReceiptWaiter, WaitStrategy};
use crate::ethereum::{
    utils, FeeData, GasOverrides, NetworkParams, TransactionParams, TransactionReceipt, Web3Error,
};

type Result<T> = std::result::Result<T, Web3Error>;

pub const MAX_CLONES: u32 = 10;
pub const MAX_PINGS_PER_CLONE: u32 = 20;
pub const MAX_MINT_AMOUNT: u64 = 10;

/// Gas limit for pinger deployments.
const DEPLOY_GAS_LIMIT: u64 = 500_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: String,
}

/// Append-only activity log shown to the user. Every entry is also emitted
/// through `tracing`.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl ActivityLog {
    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                timestamp,
                level,
                message,
            });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
        self.info("Logs cleared");
    }
}

#[derive(Debug, Clone)]
pub struct WalletSession {
    pub client: Web3Client,
    pub account: String,
    pub chain_id: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FarmingReport {
    pub clones: Vec<String>,
    pub clones_failed: u32,
    pub pings_confirmed: u32,
    pub pings_failed: u32,
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeployOutcome {
    pub tx_hash: String,
    pub contract_address: Option<String>,
    pub gas_used: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MintOutcome {
    pub tx_hash: String,
    pub success: bool,
    pub gas_used: Option<u64>,
    pub collection_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmStatus {
    pub connected_account: Option<String>,
    pub chain_id: Option<String>,
    pub transactions_enabled: bool,
    pub wait_strategy: WaitStrategy,
    pub running: bool,
    pub deployed_pingers: Vec<String>,
    pub clones: Vec<String>,
}

#[derive(Debug)]
pub struct Farm {
    wallet_provider: Arc<dyn Eip1193Provider>,
    public_provider: Arc<dyn Eip1193Provider>,
    network: NetworkParams,
    factory: String,
    nft_factory: String,
    pinger_bytecode: Option<String>,
    mint_selector: Option<[u8; 4]>,
    settings: FarmingConfig,
    strategy: WaitStrategy,
    timeouts: ReceiptTimeouts,
    receipt_poll: Duration,
    receipt_max_attempts: u32,
    session: RwLock<Option<WalletSession>>,
    deployed_pingers: Mutex<Vec<String>>,
    clones: Mutex<Vec<String>>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    log: ActivityLog,
}

impl Farm {
    pub fn new(
        config: &Config,
        wallet_provider: Arc<dyn Eip1193Provider>,
        public_provider: Arc<dyn Eip1193Provider>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let mint_selector = config.mint_selector()?;

        if let Some(selector) = mint_selector {
            let nft_abi = contract::nft_factory_abi();
            let mint = abi::find_function(&nft_abi, "mint")?;
            let expected = abi::encode_function_signature(mint);
            if selector != expected {
                warn!(
                    "Configured mint selector 0x{} differs from {} (0x{})",
                    hex::encode(selector),
                    mint.signature(),
                    hex::encode(expected)
                );
            }
        }

        Ok(Self {
            wallet_provider,
            public_provider,
            network: config.network_params(),
            factory: config.contracts.factory.clone(),
            nft_factory: config.contracts.nft_factory.clone(),
            pinger_bytecode: config.contracts.pinger_bytecode.clone(),
            mint_selector,
            settings: config.farming.clone(),
            strategy: config.wait_strategy(),
            timeouts: config.receipt_timeouts(),
            receipt_poll: Duration::from_millis(config.wallet.receipt_poll_ms),
            receipt_max_attempts: config.wallet.receipt_max_attempts,
            session: RwLock::new(None),
            deployed_pingers: Mutex::new(Vec::new()),
            clones: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            log: ActivityLog::default(),
        })
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn transactions_enabled(&self) -> bool {
        self.settings.transactions_enabled
    }

    fn wallet_client(&self) -> Web3Client {
        Web3Client::new(self.wallet_provider.clone())
            .with_receipt_polling(self.receipt_poll, self.receipt_max_attempts)
    }

    fn waiter(&self, client: Web3Client) -> ReceiptWaiter {
        ReceiptWaiter::new(client, self.public_provider.clone(), self.timeouts)
    }

    async fn session(&self) -> Result<WalletSession> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| Web3Error::ProviderUnavailable("Wallet is not connected".to_string()))
    }

    fn require_transactions(&self, action: &str) -> Result<()> {
        if self.settings.transactions_enabled {
            return Ok(());
        }
        self.log
            .warning(format!("{} is disabled, transactions are not enabled", action));
        Err(Web3Error::TransactionsDisabled(action.to_string()))
    }

    fn failed<T>(&self, action: &str, e: Web3Error) -> Result<T> {
        self.log.error(format!(
            "{} error: {}",
            action,
            e.user_message()
        ));
        Err(e)
    }

    /// Requests accounts and puts the wallet on the configured network.
    pub async fn connect(&self) -> Result<WalletSession> {
        match self.try_connect().await {
            Ok(session) => Ok(session),
            Err(e) => self.failed("Connect", e),
        }
    }

    async fn try_connect(&self) -> Result<WalletSession> {
        let client = self.wallet_client();
        let account = client
            .request_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(Web3Error::NoAccount)?;
        self.log.info(format!("Account {} connected", account));

        let chain_id = client.ensure_network(&self.network).await?;
        self.log
            .success(format!("Wallet on {} ({})", self.network.chain_name, chain_id));

        match client.get_balance(&account).await {
            Ok(balance) => match utils::parse_hex_quantity(&balance) {
                Ok(wei) => self.log.info(format!("Balance: {} wei", wei)),
                Err(_) => self.log.info(format!("Balance: {}", balance)),
            },
            Err(e) => tracing::debug!("Balance lookup for {} failed: {}", account, e),
        }

        let session = WalletSession {
            client,
            account,
            chain_id,
        };
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    pub async fn disconnect(&self) {
        if let Some(session) = self.session.write().await.take() {
            self.log.info(format!("Account {} disconnected", session.account));
        }
    }

    pub async fn status(&self) -> FarmStatus {
        let session = self.session.read().await.clone();
        FarmStatus {
            connected_account: session.as_ref().map(|s| s.account.clone()),
            chain_id: session.map(|s| s.chain_id),
            transactions_enabled: self.settings.transactions_enabled,
            wait_strategy: self.strategy,
            running: self.running.load(Ordering::SeqCst),
            deployed_pingers: self
                .deployed_pingers
                .lock()
                .map(|p| p.clone())
                .unwrap_or_default(),
            clones: self.clones.lock().map(|c| c.clone()).unwrap_or_default(),
        }
    }

    /// Fee suggestion from the wallet when connected, the public endpoint
    /// otherwise.
    pub async fn fee_data(&self) -> FeeData {
        match self.session().await {
            Ok(session) => session.client.get_fee_data().await,
            Err(_) => Web3Client::new(self.public_provider.clone()).get_fee_data().await,
        }
    }

    pub async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        strategy: Option<WaitStrategy>,
    ) -> Result<TransactionReceipt> {
        self.waiter(self.wallet_client())
            .wait(tx_hash, strategy.unwrap_or(self.strategy))
            .await
    }

    fn gas_overrides(&self, gas_limit: u64) -> GasOverrides {
        let (max_fee, priority) = match self.settings.gas_mode {
            GasMode::Wallet => (None, None),
            GasMode::Custom => (
                Some(gwei_to_wei(self.settings.max_fee_gwei)),
                Some(gwei_to_wei(self.settings.priority_gwei)),
            ),
        };
        GasOverrides {
            gas_limit: Some(gas_limit),
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
        }
    }

    /// Estimate plus the configured buffer, never below `floor`. A failed
    /// estimate falls back to `floor`.
    async fn gas_limit(
        &self,
        client: &Web3Client,
        to: &str,
        abi: &[abi::AbiItem],
        method: &str,
        floor: u64,
        step: &str,
    ) -> u64 {
        match client.estimate_gas(to, abi, method, &[]).await {
            Ok(estimate) => {
                let buffered = estimate
                    .saturating_mul(self.settings.gas_buffer_percent.saturating_add(100))
                    / 100;
                buffered.max(floor)
            }
            Err(e) => {
                self.log.warning(format!(
                    "{} gas estimation failed ({}), using minimum gas {}",
                    step, e, floor
                ));
                floor
            }
        }
    }

    /// Sends once and, on failure, once more after the configured backoff.
    async fn send_with_retry<F, Fut>(&self, step: &str, send: F) -> Result<String>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        match send().await {
            Ok(tx_hash) => Ok(tx_hash),
            Err(e) => {
                let backoff = Duration::from_millis(self.settings.send_retry_backoff_ms);
                let outcome = if e.is_user_rejection() {
                    "rejected in the wallet"
                } else {
                    "failed"
                };
                self.log.warning(format!(
                    "{} send {} ({}), retrying in {:?}",
                    step,
                    outcome,
                    e.user_message(),
                    backoff
                ));
                tokio::time::sleep(backoff).await;
                send().await
            }
        }
    }

    pub async fn deploy_pinger(&self) -> Result<DeployOutcome> {
        self.require_transactions("Deploy")?;
        match self.try_deploy_pinger().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.failed("Deploy", e),
        }
    }

    async fn try_deploy_pinger(&self) -> Result<DeployOutcome> {
        let bytecode = self.pinger_bytecode.as_deref().ok_or_else(|| {
            Web3Error::InvalidInput("contracts.pinger_bytecode is not configured".to_string())
        })?;
        let session = self.session().await?;
        let pinger_abi = contract::pinger_abi();
        let overrides = self.gas_overrides(DEPLOY_GAS_LIMIT);

        self.log.info("Deploying pinger contract...");
        let tx_hash = self
            .send_with_retry("Deploy", || {
                session
                    .client
                    .deploy_contract(&pinger_abi, bytecode, &[], Some(&overrides))
            })
            .await?;
        self.log.info(format!("Deploy transaction sent: {}", tx_hash));

        let receipt = self
            .waiter(session.client.clone())
            .wait(&tx_hash, self.strategy)
            .await?;
        if !receipt.is_success() {
            return Err(Web3Error::TransactionFailed(tx_hash));
        }

        if let Some(address) = &receipt.contract_address {
            self.log.success(format!("Pinger deployed at {}", address));
            if let Ok(mut pingers) = self.deployed_pingers.lock() {
                pingers.push(address.clone());
            }
        }

        Ok(DeployOutcome {
            tx_hash,
            contract_address: receipt.contract_address.clone(),
            gas_used: receipt.gas_used(),
        })
    }

    /// Suppresses every iteration of the running loop that has not started.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if self.running.load(Ordering::SeqCst) {
            self.log.warning("Process stopped by user");
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub async fn run_farming(&self, clone_count: u32, pings_per_clone: u32) -> Result<FarmingReport> {
        self.require_transactions("Start")?;

        if !(1..=MAX_CLONES).contains(&clone_count) {
            return Err(Web3Error::InvalidInput(format!(
                "Clone count must be between 1 and {}",
                MAX_CLONES
            )));
        }
        if !(1..=MAX_PINGS_PER_CLONE).contains(&pings_per_clone) {
            return Err(Web3Error::InvalidInput(format!(
                "Pings per clone must be between 1 and {}",
                MAX_PINGS_PER_CLONE
            )));
        }

        let session = match self.session().await {
            Ok(session) => session,
            Err(e) => return self.failed("Start", e),
        };

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Web3Error::InvalidInput(
                "Farming is already running".to_string(),
            ));
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let report = self.farm(&session, clone_count, pings_per_clone).await;
        self.running.store(false, Ordering::SeqCst);

        self.log.info(format!(
            "Farming finished: {} clone(s) created, {} failed, {} ping(s) confirmed, {} failed",
            report.clones.len(),
            report.clones_failed,
            report.pings_confirmed,
            report.pings_failed
        ));
        Ok(report)
    }

    async fn farm(&self, session: &WalletSession, clone_count: u32, pings_per_clone: u32) -> FarmingReport {
        let mut report = FarmingReport::default();
        self.log.info(format!(
            "Starting: {} clone(s), {} ping(s) each",
            clone_count, pings_per_clone
        ));

        'clones: for clone_index in 1..=clone_count {
            if self.should_stop() {
                report.stopped = true;
                break;
            }

            let step = format!("Clone {}/{}", clone_index, clone_count);
            let clone = match self.create_clone(session, &step).await {
                Ok(clone) => clone,
                Err(e) => {
                    self.log.error(format!(
                        "{} failed: {}",
                        step,
                        e.user_message()
                    ));
                    report.clones_failed += 1;
                    continue;
                }
            };
            self.log.success(format!("{} created at {}", step, clone));
            if let Ok(mut clones) = self.clones.lock() {
                clones.push(clone.clone());
            }
            report.clones.push(clone.clone());

            for ping_index in 1..=pings_per_clone {
                if self.should_stop() {
                    report.stopped = true;
                    break 'clones;
                }

                let step = format!(
                    "Clone {}/{} ping {}/{}",
                    clone_index, clone_count, ping_index, pings_per_clone
                );
                match self.ping(session, &clone, &step).await {
                    Ok(()) => {
                        self.log.success(format!("{} confirmed", step));
                        report.pings_confirmed += 1;
                    }
                    Err(e) => {
                        self.log.error(format!(
                            "{} failed: {}",
                            step,
                            e.user_message()
                        ));
                        report.pings_failed += 1;
                    }
                }
            }
        }

        report
    }

    async fn create_clone(&self, session: &WalletSession, step: &str) -> Result<String> {
        let factory_abi = contract::factory_abi();
        let gas = self
            .gas_limit(
                &session.client,
                &self.factory,
                &factory_abi,
                "createClone",
                self.settings.min_gas_create_clone,
                step,
            )
            .await;
        let overrides = self.gas_overrides(gas);

        let tx_hash = self
            .send_with_retry(step, || {
                session.client.call_contract(
                    &self.factory,
                    &factory_abi,
                    "createClone",
                    &[],
                    Some(&overrides),
                )
            })
            .await?;
        self.log.info(format!(
            "{} createClone ({}) sent: {}",
            step,
            abi::function_selector("createClone"),
            tx_hash
        ));

        let receipt = self
            .waiter(session.client.clone())
            .wait(&tx_hash, self.strategy)
            .await?;
        if !receipt.is_success() {
            return Err(Web3Error::TransactionFailed(tx_hash));
        }

        receipt.indexed_address_from(&self.factory).ok_or_else(|| {
            Web3Error::invalid_response(
                "eth_getTransactionReceipt",
                format!("no factory log with a clone address in {}", tx_hash),
            )
        })
    }

    async fn ping(&self, session: &WalletSession, clone: &str, step: &str) -> Result<()> {
        let pinger_abi = contract::pinger_abi();
        let gas = self
            .gas_limit(
                &session.client,
                clone,
                &pinger_abi,
                "ping",
                self.settings.min_gas_ping,
                step,
            )
            .await;
        let overrides = self.gas_overrides(gas);

        let tx_hash = self
            .send_with_retry(step, || {
                session
                    .client
                    .call_contract(clone, &pinger_abi, "ping", &[], Some(&overrides))
            })
            .await?;

        let receipt = self
            .waiter(session.client.clone())
            .wait(&tx_hash, self.strategy)
            .await?;
        if !receipt.is_success() {
            return Err(Web3Error::TransactionFailed(tx_hash));
        }
        Ok(())
    }

    pub async fn mint_collection(&self, handle: &str, amount: u64) -> Result<MintOutcome> {
        self.require_transactions("Mint")?;

        let handle = handle.trim();
        if handle.is_empty() {
            return Err(Web3Error::InvalidInput("Handle cannot be empty".to_string()));
        }
        if !(1..=MAX_MINT_AMOUNT).contains(&amount) {
            return Err(Web3Error::InvalidInput(format!(
                "Amount must be between 1 and {}",
                MAX_MINT_AMOUNT
            )));
        }

        match self.try_mint_collection(handle, amount).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.failed("NFT minting", e),
        }
    }

    async fn try_mint_collection(&self, handle: &str, amount: u64) -> Result<MintOutcome> {
        let selector = self.mint_selector.ok_or_else(|| {
            Web3Error::InvalidInput("contracts.mint_selector is not configured".to_string())
        })?;
        let session = self.session().await?;

        self.log.info(format!(
            "Minting NFT collection with handle: {}, amount: {}...",
            handle, amount
        ));
        let data = AbiEncoder::encode_function_data(
            &contract::nft_factory_abi(),
            "mint",
            &[json!(handle), json!(amount)],
            selector,
        )?;
        self.log
            .info(format!("Function selector: 0x{} (mint)", hex::encode(selector)));

        let zero = Some("0x0");
        let gas = match session
            .client
            .estimate_call_gas(&self.nft_factory, &data, zero)
            .await
        {
            Ok(gas) => {
                self.log.info(format!("Gas estimate: {}", gas));
                Some(utils::to_hex_quantity(gas as u128))
            }
            Err(e) => {
                self.log.warning(format!("Gas estimation failed: {}", e));
                self.log.info("Will use wallet-suggested gas");
                None
            }
        };

        let transaction = TransactionParams {
            to: Some(self.nft_factory.clone()),
            from: session.account.clone(),
            data,
            value: zero.map(str::to_string),
            gas,
            ..Default::default()
        };

        let tx_hash = self
            .send_with_retry("Mint", || session.client.send_transaction(&transaction))
            .await?;
        self.log
            .info(format!("NFT minting transaction sent: {}", tx_hash));

        let receipt = self
            .waiter(session.client.clone())
            .wait(&tx_hash, WaitStrategy::TwoStage)
            .await?;

        let success = receipt.is_success();
        let collection_address = if success {
            receipt.indexed_address_from(&self.nft_factory)
        } else {
            None
        };

        if success {
            self.log.success("NFT collection successfully minted!");
            if let Some(gas_used) = receipt.gas_used() {
                self.log.info(format!("Gas Used: {}", gas_used));
            }
            if let Some(address) = &collection_address {
                self.log.success(format!("New Collection Address: {}", address));
            }
        } else {
            self.log.error("NFT minting transaction failed");
        }

        Ok(MintOutcome {
            tx_hash,
            success,
            gas_used: receipt.gas_used(),
            collection_address,
        })
    }
}

fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * 1e9).round() as u128
}

/// JSON summary of a session for tool output.
pub fn session_summary(session: &WalletSession) -> Value {
    json!({
        "account": session.account,
        "chain_id": session.chain_id,
    })
}
