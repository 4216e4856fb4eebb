#![allow(dead_code)]
use std::{collections::HashMap, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::*;
use paygate_engine::{
    db_types::{Amount, Issuer, Rail},
    events::EventProducers,
    order_objects::OrderRequest,
    rails::{ChainExplorer, ChainTransfer, CoinRail, QrRail, RailError, RailRegistry},
    PaymentGatewayDatabase,
    QueueApi,
    SqliteDatabase,
};
use serde_json::{json, Value};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::sync::RwLock;

pub const QR_PAYLOAD: &str = "00020101021126570011ID.DANA.WWW011893600915000000000102";
pub const COIN_A_ADDRESS: &str = "A1receiver";

pub fn random_db_path() -> String {
    format!("sqlite://{}/paygate_it_{:016x}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    Sqlite::create_database(url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    db
}

/// An explorer that serves whatever transfers the test has put in it.
#[derive(Clone, Default)]
pub struct StaticExplorer {
    transfers: std::sync::Arc<RwLock<HashMap<String, Value>>>,
    delay: Option<std::time::Duration>,
}

impl StaticExplorer {
    /// An explorer that takes `delay` to answer every history lookup.
    pub fn slow(delay: std::time::Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub async fn add_transfer(&self, txid: &str, to: &str, amount: &str, confirmations: u32, at: DateTime<Utc>) {
        let doc = json!({
            "txid": txid,
            "to": to,
            "amount": amount,
            "confirmations": confirmations,
            "timestamp": at.to_rfc3339(),
        });
        self.transfers.write().await.insert(txid.to_string(), doc);
    }

    /// A transfer whose explorer record has no block time.
    pub async fn add_undated_transfer(&self, txid: &str, to: &str, amount: &str, confirmations: u32) {
        let doc = json!({
            "txid": txid,
            "to": to,
            "amount": amount,
            "confirmations": confirmations,
        });
        self.transfers.write().await.insert(txid.to_string(), doc);
    }
}

#[async_trait]
impl ChainExplorer for StaticExplorer {
    fn name(&self) -> &'static str {
        "static explorer"
    }

    async fn pending_txids(&self, _address: &str) -> Result<Vec<String>, RailError> {
        Ok(Vec::new())
    }

    async fn history_txids(&self, _address: &str) -> Result<Vec<String>, RailError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut ids = self.transfers.read().await.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }

    async fn transaction(&self, txid: &str) -> Result<Value, RailError> {
        self.transfers
            .read()
            .await
            .get(txid)
            .cloned()
            .ok_or_else(|| RailError::UpstreamUnavailable(format!("{txid} not found")))
    }

    fn normalize(&self, detail: &Value) -> Result<ChainTransfer, RailError> {
        let field = |name: &str| detail.get(name).and_then(Value::as_str).map(str::to_string);
        let amount = field("amount")
            .and_then(|a| Amount::from_str(&a).ok())
            .ok_or_else(|| RailError::MalformedSignal("no amount".into()))?;
        Ok(ChainTransfer {
            txid: field("txid").ok_or_else(|| RailError::MalformedSignal("no txid".into()))?,
            sender: None,
            receiver: field("to").ok_or_else(|| RailError::MalformedSignal("no receiver".into()))?,
            amount,
            confirmations: detail.get("confirmations").and_then(Value::as_u64).unwrap_or(0) as u32,
            timestamp: field("timestamp").and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
        })
    }
}

pub fn registry(explorer: StaticExplorer) -> RailRegistry {
    let mut rails = RailRegistry::new();
    rails.register(QrRail::new(QR_PAYLOAD, Duration::minutes(5)).expect("valid regexes"));
    rails.register(CoinRail::new(Rail::CoinA, explorer, COIN_A_ADDRESS, Duration::minutes(30)).with_min_confirmations(1));
    rails
}

pub async fn setup_with(explorer: StaticExplorer, producers: EventProducers) -> QueueApi<SqliteDatabase> {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    QueueApi::new(db, registry(explorer), producers)
}

pub async fn setup() -> QueueApi<SqliteDatabase> {
    setup_with(StaticExplorer::default(), EventProducers::default()).await
}

pub async fn tear_down(mut api: QueueApi<SqliteDatabase>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to drop database {url}: {e}");
    }
}

pub fn amount(s: &str) -> Amount {
    Amount::from_str(s).expect("valid amount")
}

pub fn request(rail: Rail, value: &str) -> OrderRequest {
    OrderRequest::new(rail, amount(value), Issuer::new("Budi", "+628123456789"))
}
