//! Coin-B explorer integration.
//!
//! The Coin-B indexer wraps every response in a `data` envelope:
//! * `GET /addresses/{address}/pending`: `{"data": [{"hash": "..."}, ...]}`
//! * `GET /addresses/{address}/transactions`: `{"data": [{"hash": "..."}, ...]}`, most recent first
//! * `GET /transactions/{hash}`: `{"data": { ... }}`
//!
//! ```json
//! { "hash": "0xab..", "sender": "B1payer", "recipient": "B1receiver", "amount": "1,234.50 CB",
//!   "confirmations": "12", "timestamp": "2024-06-01T10:00:00Z" }
//! ```
//! Amounts are human-formatted decimal strings and confirmations may arrive as a string or a number.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_common::Amount;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::rails::{ChainExplorer, ChainTransfer, ExplorerClient, RailError};

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct TxRef {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct CoinBTransaction {
    hash: String,
    sender: Option<String>,
    recipient: String,
    amount: String,
    #[serde(default, deserialize_with = "number_or_string")]
    confirmations: u32,
    timestamp: Option<DateTime<Utc>>,
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(|| D::Error::custom("bad count")),
        Value::String(s) => s.trim().parse::<u32>().map_err(D::Error::custom),
        Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("expected a count, got {other}"))),
    }
}

#[derive(Clone)]
pub struct CoinBExplorer {
    client: ExplorerClient,
}

impl CoinBExplorer {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, RailError> {
        let client = ExplorerClient::with_api_key("coin_b explorer", base_url, timeout, API_KEY_HEADER, api_key)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChainExplorer for CoinBExplorer {
    fn name(&self) -> &'static str {
        self.client.name()
    }

    async fn pending_txids(&self, address: &str) -> Result<Vec<String>, RailError> {
        let refs = self.client.get_json::<Envelope<Vec<TxRef>>>(&format!("/addresses/{address}/pending")).await?;
        Ok(refs.data.into_iter().map(|r| r.hash).collect())
    }

    async fn history_txids(&self, address: &str) -> Result<Vec<String>, RailError> {
        let refs = self.client.get_json::<Envelope<Vec<TxRef>>>(&format!("/addresses/{address}/transactions")).await?;
        Ok(refs.data.into_iter().map(|r| r.hash).collect())
    }

    async fn transaction(&self, txid: &str) -> Result<Value, RailError> {
        let doc = self.client.get_json::<Envelope<Value>>(&format!("/transactions/{txid}")).await?;
        Ok(doc.data)
    }

    fn normalize(&self, detail: &Value) -> Result<ChainTransfer, RailError> {
        let tx = CoinBTransaction::deserialize(detail)
            .map_err(|e| RailError::MalformedSignal(format!("Not a Coin-B transaction. {e}")))?;
        let amount = Amount::parse_formatted(&tx.amount).map_err(|e| RailError::MalformedSignal(e.to_string()))?;
        Ok(ChainTransfer {
            txid: tx.hash,
            sender: tx.sender,
            receiver: tx.recipient,
            amount,
            confirmations: tx.confirmations,
            timestamp: tx.timestamp,
        })
    }
}
