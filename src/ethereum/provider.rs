use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::Web3Error;

/// Anything that answers EIP-1193 `request({ method, params })` calls: an
/// injected wallet bridge, a signing node, or a plain public endpoint.
#[async_trait]
pub trait Eip1193Provider: Send + Sync + Debug {
    async fn request(&self, method: &str, params: Value) -> Result<Value, Web3Error>;
}

/// JSON-RPC 2.0 over HTTP POST.
#[derive(Debug)]
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Web3Error> {
        reqwest::Url::parse(url).map_err(|e| {
            Web3Error::ProviderUnavailable(format!("Invalid RPC URL '{}': {}", url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Web3Error::transport)?;

        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Returns the chain id if the endpoint answers at all.
    pub async fn check_connection(&self) -> Result<String, Web3Error> {
        let chain_id = self.request("eth_chainId", json!([])).await.map_err(|e| {
            tracing::debug!("Connection check failed for {}: {}", self.url, e);
            Web3Error::ProviderUnavailable(format!("Cannot reach {}: {}", self.url, e))
        })?;
        chain_id
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Web3Error::invalid_response("eth_chainId", "expected a hex string"))
    }
}

#[async_trait]
impl Eip1193Provider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, Web3Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!("-> {} {}", method, body["params"]);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(Web3Error::transport)?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|e| {
            if status.is_success() {
                Web3Error::invalid_response(method, e.to_string())
            } else {
                Web3Error::Transport(format!("HTTP {} from {}", status, self.url))
            }
        })?;

        parse_response(method, payload)
    }
}

/// Splits a JSON-RPC response into its result or its error object.
pub fn parse_response(method: &str, response: Value) -> Result<Value, Web3Error> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32603);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(Web3Error::Rpc { code, message });
    }

    match response {
        Value::Object(mut map) => map
            .remove("result")
            .ok_or_else(|| Web3Error::invalid_response(method, "missing result")),
        _ => Err(Web3Error::invalid_response(method, "response is not an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves exactly one HTTP request with `reply` and hands back the body
    /// it received.
    async fn one_shot_server(reply: Value) -> (String, oneshot::Receiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let headers = text[..split].to_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + length {
                        break text[split + 4..split + 4 + length].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let _ = tx.send(serde_json::from_str(&body).unwrap_or(Value::Null));

            let payload = reply.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        (format!("http://{}", addr), rx)
    }

    #[test]
    fn test_parse_response() {
        let ok = parse_response("eth_chainId", json!({"jsonrpc": "2.0", "id": 1, "result": "0x2105"}));
        assert_eq!(ok.unwrap(), json!("0x2105"));

        let null_result =
            parse_response("eth_getTransactionReceipt", json!({"id": 1, "result": null}));
        assert_eq!(null_result.unwrap(), Value::Null);

        let err = parse_response(
            "wallet_switchEthereumChain",
            json!({"id": 1, "error": {"code": 4902, "message": "Unrecognized chain ID"}}),
        )
        .unwrap_err();
        assert!(err.is_chain_not_added());

        assert!(matches!(
            parse_response("eth_chainId", json!({"id": 1})),
            Err(Web3Error::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_invalid_url() {
        let err = HttpProvider::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Web3Error::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_http_request_round_trip() {
        let (url, received) =
            one_shot_server(json!({"jsonrpc": "2.0", "id": 1, "result": "0x2105"})).await;
        let provider = HttpProvider::new(&url, Duration::from_secs(5)).unwrap();

        let chain_id = provider.check_connection().await.unwrap();
        assert_eq!(chain_id, "0x2105");

        let request = received.await.unwrap();
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "eth_chainId");
        assert_eq!(request["params"], json!([]));
    }

    #[tokio::test]
    async fn test_http_error_object() {
        let (url, _received) = one_shot_server(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 4001, "message": "User rejected the request."}
        }))
        .await;
        let provider = HttpProvider::new(&url, Duration::from_secs(5)).unwrap();

        let err = provider
            .request("eth_sendTransaction", json!([{}]))
            .await
            .unwrap_err();
        assert!(err.is_user_rejection());
    }
}
