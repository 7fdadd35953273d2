//! Receipt confirmation across the wallet provider and a public endpoint.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info};

use super::client::Web3Client;
use super::provider::Eip1193Provider;
use super::{TransactionReceipt, Web3Error};

type Result<T> = std::result::Result<T, Web3Error>;

pub const DEFAULT_PUBLIC_POLL: Duration = Duration::from_millis(800);
pub const DEFAULT_PUBLIC_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_RACE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Poll the public endpoint only.
    PublicFirst,
    /// Wallet provider and public endpoint concurrently, first receipt wins.
    Race,
    /// Public-first, falling back to the race on timeout.
    TwoStage,
}

/// Where the signing wallet runs. Mobile in-app wallets are slow to report
/// receipts and public endpoints may be unreachable from their networks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
}

impl WaitStrategy {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Desktop => WaitStrategy::PublicFirst,
            Platform::Mobile => WaitStrategy::Race,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptTimeouts {
    pub public_poll: Duration,
    pub public_timeout: Duration,
    pub race_timeout: Duration,
}

impl Default for ReceiptTimeouts {
    fn default() -> Self {
        Self {
            public_poll: DEFAULT_PUBLIC_POLL,
            public_timeout: DEFAULT_PUBLIC_TIMEOUT,
            race_timeout: DEFAULT_RACE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReceiptWaiter {
    wallet: Web3Client,
    public: Web3Client,
    timeouts: ReceiptTimeouts,
}

impl ReceiptWaiter {
    pub fn new(
        wallet: Web3Client,
        public_provider: Arc<dyn Eip1193Provider>,
        timeouts: ReceiptTimeouts,
    ) -> Self {
        Self {
            wallet,
            public: Web3Client::new(public_provider),
            timeouts,
        }
    }

    pub async fn wait(&self, tx_hash: &str, strategy: WaitStrategy) -> Result<TransactionReceipt> {
        debug!("Waiting for {} using {:?}", tx_hash, strategy);
        match strategy {
            WaitStrategy::PublicFirst => self.public_first(tx_hash).await,
            WaitStrategy::Race => self.race(tx_hash).await,
            WaitStrategy::TwoStage => self.two_stage(tx_hash).await,
        }
    }

    pub async fn public_first(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        poll_public(
            self.public.clone(),
            tx_hash.to_string(),
            self.timeouts.public_poll,
            self.timeouts.public_timeout,
        )
        .await
        .ok_or_else(|| Web3Error::ReceiptTimeout("Receipt timeout on public RPC".to_string()))
    }

    /// Both sources run as tasks bounded by the race timeout. The first
    /// receipt wins and the other task is aborted; a side that comes back
    /// empty leaves the race to the other one.
    pub async fn race(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        let timeout = self.timeouts.race_timeout;
        let mut contenders = JoinSet::new();

        let wallet = self.wallet.clone();
        let hash = tx_hash.to_string();
        contenders.spawn(async move {
            match tokio::time::timeout(timeout, wallet.wait_for_transaction(&hash)).await {
                Ok(Ok(receipt)) => Some(("provider", receipt)),
                Ok(Err(e)) => {
                    debug!("Provider wait for {} failed: {}", hash, e);
                    None
                }
                Err(_) => {
                    debug!("Provider wait for {} timed out", hash);
                    None
                }
            }
        });

        let public = self.public.clone();
        let hash = tx_hash.to_string();
        let poll = self.timeouts.public_poll;
        contenders.spawn(async move {
            poll_public(public, hash, poll, timeout)
                .await
                .map(|receipt| ("public RPC", receipt))
        });

        let mut winner = None;
        while let Some(joined) = contenders.join_next().await {
            match joined {
                Ok(Some(found)) => {
                    winner = Some(found);
                    break;
                }
                Ok(None) => {}
                Err(e) => debug!("Receipt contender for {} ended abnormally: {}", tx_hash, e),
            }
        }
        contenders.shutdown().await;

        match winner {
            Some((source, receipt)) => {
                info!("Receipt for {} delivered by {}", tx_hash, source);
                Ok(receipt)
            }
            None => Err(Web3Error::ReceiptTimeout(
                "Receipt not found (both failed)".to_string(),
            )),
        }
    }

    pub async fn two_stage(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        match self.public_first(tx_hash).await {
            Err(e) if e.is_timeout() => {
                info!("{} for {}, racing provider against public RPC", e, tx_hash);
                self.race(tx_hash).await
            }
            other => other,
        }
    }
}

/// Polls until a receipt shows up or `timeout` elapses. A hung request
/// counts against the same deadline.
async fn poll_public(
    public: Web3Client,
    tx_hash: String,
    poll: Duration,
    timeout: Duration,
) -> Option<TransactionReceipt> {
    let started = Instant::now();
    let polling = async {
        while started.elapsed() < timeout {
            match public.get_transaction_receipt(&tx_hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => {}
                Err(e) => debug!("Public RPC receipt lookup for {} failed: {}", tx_hash, e),
            }
            tokio::time::sleep(poll).await;
        }
        None
    };
    match tokio::time::timeout(timeout, polling).await {
        Ok(found) => found,
        Err(_) => {
            debug!("Public RPC receipt lookup for {} still pending at deadline", tx_hash);
            None
        }
    }
}
