use anyhow::Result;
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    ethereum::{receipt::WaitStrategy, Web3Error},
    farm::{self, Farm},
};

#[derive(Debug, Clone)]
pub struct BaseRMcpServer {
    farm: Arc<Farm>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct RunFarmingRequest {
    /// Number of clones to create (1-10)
    clone_count: u32,
    /// Pings sent to each clone (1-20)
    pings_per_clone: u32,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct MintCollectionRequest {
    handle: String,
    /// Number of NFTs to mint (1-10)
    amount: u64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct WaitForReceiptRequest {
    tx_hash: String,
    /// "public_first", "race" or "two_stage"; defaults to the configured strategy
    strategy: Option<String>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "Failed to serialize result".to_string())
}

fn error_text(action: &str, e: Web3Error) -> String {
    let message = e.user_message();
    error!("{} failed: {}", action, message);
    format!("Error: {}", message)
}

impl BaseRMcpServer {
    pub fn new(farm: Farm) -> Self {
        Self {
            farm: Arc::new(farm),
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting BaseR MCP Server");

        let service = self.clone().serve(stdio()).await?;

        info!("BaseR MCP Server started successfully");
        let _ = service.waiting().await;
        Ok(())
    }
}

#[tool(tool_box)]
impl BaseRMcpServer {
    #[tool(description = "Connect the wallet provider: request accounts and switch it to Base, adding the network if needed")]
    async fn connect_wallet(&self) -> String {
        match self.farm.connect().await {
            Ok(session) => to_json(&farm::session_summary(&session)),
            Err(e) => error_text("Connect", e),
        }
    }

    #[tool(description = "Forget the connected wallet session")]
    async fn disconnect_wallet(&self) -> String {
        self.farm.disconnect().await;
        "Disconnected".to_string()
    }

    #[tool(description = "Show the connected account, transaction mode, wait strategy and addresses created so far")]
    async fn get_status(&self) -> String {
        to_json(&self.farm.status().await)
    }

    #[tool(description = "Suggested EIP-1559 fees (wei) from fee history, gas price, or defaults")]
    async fn get_fee_data(&self) -> String {
        to_json(&self.farm.fee_data().await)
    }

    #[tool(description = "Deploy the pinger contract from the configured bytecode")]
    async fn deploy_pinger(&self) -> String {
        match self.farm.deploy_pinger().await {
            Ok(outcome) => to_json(&outcome),
            Err(e) => error_text("Deploy", e),
        }
    }

    #[tool(description = "Create clones through the factory and ping each of them; failures are logged and the loop continues")]
    async fn run_farming(&self, #[tool(aggr)] request: RunFarmingRequest) -> String {
        match self
            .farm
            .run_farming(request.clone_count, request.pings_per_clone)
            .await
        {
            Ok(report) => to_json(&report),
            Err(e) => error_text("Farming", e),
        }
    }

    #[tool(description = "Stop the running farming loop before its next clone or ping")]
    async fn stop_farming(&self) -> String {
        self.farm.stop();
        "Stop requested".to_string()
    }

    #[tool(description = "Mint an NFT collection for a handle through the NFT factory")]
    async fn mint_collection(&self, #[tool(aggr)] request: MintCollectionRequest) -> String {
        match self
            .farm
            .mint_collection(&request.handle, request.amount)
            .await
        {
            Ok(outcome) => to_json(&outcome),
            Err(e) => error_text("NFT minting", e),
        }
    }

    #[tool(description = "Wait for a transaction receipt from the wallet provider and/or the public Base RPC")]
    async fn wait_for_receipt(&self, #[tool(aggr)] request: WaitForReceiptRequest) -> String {
        let strategy = match request.strategy.as_deref() {
            Some(name) => match serde_json::from_value::<WaitStrategy>(json!(name)) {
                Ok(strategy) => Some(strategy),
                Err(_) => {
                    return format!(
                        "Error: Unknown strategy '{}'. Use public_first, race or two_stage",
                        name
                    )
                }
            },
            None => None,
        };

        match self.farm.wait_for_receipt(&request.tx_hash, strategy).await {
            Ok(receipt) => to_json(&json!({
                "success": receipt.is_success(),
                "block_number": receipt.block_number(),
                "gas_used": receipt.gas_used(),
                "receipt": receipt,
            })),
            Err(e) => error_text("Receipt wait", e),
        }
    }

    #[tool(description = "Return the activity log entries")]
    async fn get_activity_log(&self) -> String {
        to_json(&self.farm.log().entries())
    }

    #[tool(description = "Clear the activity log")]
    async fn clear_activity_log(&self) -> String {
        self.farm.log().clear();
        "Logs cleared".to_string()
    }
}

#[tool(tool_box)]
impl ServerHandler for BaseRMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("MCP server for the BaseR pinger farm on Base. Connects an EIP-1193 style wallet provider, deploys the pinger, creates and pings factory clones, mints NFT collections and confirms receipts by racing the wallet against the public Base RPC.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ethereum::testing::{unsupported, MockProvider};

    fn server() -> (BaseRMcpServer, Arc<MockProvider>) {
        let wallet = MockProvider::new(|method, _| match method {
            "eth_requestAccounts" => Ok(json!(["0xabc0000000000000000000000000000000000001"])),
            "eth_chainId" => Ok(json!("0x2105")),
            other => Err(unsupported(other)),
        });
        let public = MockProvider::new(|method, _| Err(unsupported(method)));
        let farm = Farm::new(&Config::default(), wallet.clone(), public).unwrap();
        (BaseRMcpServer::new(farm), wallet)
    }

    #[tokio::test]
    async fn test_disabled_transactions_are_reported() {
        let (server, wallet) = server();

        let text = server.deploy_pinger().await;
        assert!(text.starts_with("Error: Transactions are disabled"), "{}", text);
        assert!(wallet.calls().is_empty());

        let log: serde_json::Value = serde_json::from_str(&server.get_activity_log().await).unwrap();
        assert_eq!(log[0]["level"], "warning");
    }

    #[tokio::test]
    async fn test_connect_and_status() {
        let (server, _wallet) = server();

        let connected: serde_json::Value =
            serde_json::from_str(&server.connect_wallet().await).unwrap();
        assert_eq!(connected["chain_id"], "0x2105");

        let status: serde_json::Value = serde_json::from_str(&server.get_status().await).unwrap();
        assert_eq!(status["transactions_enabled"], false);
        assert_eq!(status["wait_strategy"], "public_first");
    }

    #[tokio::test]
    async fn test_unknown_strategy() {
        let (server, _wallet) = server();
        let text = server
            .wait_for_receipt(WaitForReceiptRequest {
                tx_hash: "0xfeed".to_string(),
                strategy: Some("fastest".to_string()),
            })
            .await;
        assert!(text.starts_with("Error: Unknown strategy"));
    }
}
