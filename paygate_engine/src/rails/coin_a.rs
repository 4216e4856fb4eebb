//! Coin-A explorer integration.
//!
//! The Coin-A explorer exposes three read-only endpoints:
//! * `GET /address/{address}/mempool`: unconfirmed transactions, `[{"txid": "..."}, ...]`
//! * `GET /address/{address}/txids`: confirmed transaction ids, most recent first, `["...", ...]`
//! * `GET /tx/{txid}`: the transaction document
//!
//! ```json
//! { "txid": "9f0c..", "from": "A1sender", "to": "A1receiver", "value": 5000000, "confirmations": 2,
//!   "blocktime": 1717236000, "time": 1717235940 }
//! ```
//! `value` is an integer count of base units; the number of decimals is configured per deployment.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate_common::Amount;
use serde::Deserialize;
use serde_json::Value;

use crate::rails::{ChainExplorer, ChainTransfer, ExplorerClient, RailError};

pub const DEFAULT_COIN_A_DECIMALS: u32 = 8;

#[derive(Debug, Deserialize)]
struct MempoolEntry {
    txid: String,
}

#[derive(Debug, Deserialize)]
struct CoinATransaction {
    txid: String,
    from: Option<String>,
    to: String,
    value: u64,
    #[serde(default)]
    confirmations: u32,
    blocktime: Option<i64>,
    time: Option<i64>,
}

#[derive(Clone)]
pub struct CoinAExplorer {
    client: ExplorerClient,
    decimals: u32,
}

impl CoinAExplorer {
    pub fn new(base_url: &str, decimals: u32, timeout: Duration) -> Result<Self, RailError> {
        let client = ExplorerClient::new("coin_a explorer", base_url, timeout)?;
        Ok(Self { client, decimals })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }
}

#[async_trait]
impl ChainExplorer for CoinAExplorer {
    fn name(&self) -> &'static str {
        self.client.name()
    }

    async fn pending_txids(&self, address: &str) -> Result<Vec<String>, RailError> {
        let entries = self.client.get_json::<Vec<MempoolEntry>>(&format!("/address/{address}/mempool")).await?;
        Ok(entries.into_iter().map(|e| e.txid).collect())
    }

    async fn history_txids(&self, address: &str) -> Result<Vec<String>, RailError> {
        self.client.get_json::<Vec<String>>(&format!("/address/{address}/txids")).await
    }

    async fn transaction(&self, txid: &str) -> Result<Value, RailError> {
        self.client.get_json::<Value>(&format!("/tx/{txid}")).await
    }

    fn normalize(&self, detail: &Value) -> Result<ChainTransfer, RailError> {
        let tx = CoinATransaction::deserialize(detail)
            .map_err(|e| RailError::MalformedSignal(format!("Not a Coin-A transaction. {e}")))?;
        let amount = Amount::from_base_units(i128::from(tx.value), self.decimals)
            .map_err(|e| RailError::MalformedSignal(e.to_string()))?;
        let timestamp = tx.blocktime.or(tx.time).and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        Ok(ChainTransfer {
            txid: tx.txid,
            sender: tx.from,
            receiver: tx.to,
            amount,
            confirmations: tx.confirmations,
            timestamp,
        })
    }
}
