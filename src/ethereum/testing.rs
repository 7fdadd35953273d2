//! Scripted in-memory provider for tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::provider::Eip1193Provider;
use super::Web3Error;

type Handler = dyn Fn(&str, &Value) -> Result<Value, Web3Error> + Send + Sync;

pub struct MockProvider {
    handler: Box<Handler>,
    delay: Duration,
    calls: Mutex<Vec<(String, Value)>>,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider").finish_non_exhaustive()
    }
}

impl MockProvider {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Value) -> Result<Value, Web3Error> + Send + Sync + 'static,
    {
        Self::with_delay(Duration::ZERO, handler)
    }

    /// Every request sleeps for `delay` before answering.
    pub fn with_delay<F>(delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Value) -> Result<Value, Web3Error> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params)
            .collect()
    }
}

#[async_trait]
impl Eip1193Provider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, Web3Error> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(method, &params)
    }
}

pub fn rpc_error(code: i64, message: &str) -> Web3Error {
    Web3Error::Rpc {
        code,
        message: message.to_string(),
    }
}

pub fn unsupported(method: &str) -> Web3Error {
    rpc_error(-32601, &format!("method {} not found", method))
}

pub fn success_receipt(hash: &str) -> Value {
    json!({
        "transactionHash": hash,
        "blockNumber": "0x1",
        "gasUsed": "0x5208",
        "status": "0x1",
        "logs": []
    })
}
