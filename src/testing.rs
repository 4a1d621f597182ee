//! In-memory stand-ins for the explorer, object store, secret store and
//! warehouse, plus record and row builders shared by the unit tests.

use crate::explorer::{ExplorerApi, FetchError, PageRequest};
use crate::schemas::{ExplorerResponse, NativeRow, NormalizedRow, TokenRow, TransferRecord};
use crate::secrets::{SecretError, SecretStore};
use crate::staging::{ObjectStore, StagingError};
use crate::warehouse::{Warehouse, WarehouseCredentials, WarehouseError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub const CREDENTIALS_JSON: &str = r#"{
    "host": "warehouse.example.internal",
    "username": "loader",
    "password": "hunter2",
    "service_role": "arn:aws:iam::123456789012:role/redshift-copy"
}"#;

pub fn native_record(hash: &str, value: &str) -> TransferRecord {
    TransferRecord {
        hash: Some(hash.to_string()),
        time_stamp: Some("1700000000".to_string()),
        from: Some("0x1111111111111111111111111111111111111111".to_string()),
        to: Some("0x2222222222222222222222222222222222222222".to_string()),
        value: Some(value.to_string()),
        gas_used: Some("21000".to_string()),
        gas_price: Some("30000000000".to_string()),
        ..TransferRecord::default()
    }
}

pub fn token_record(hash: &str, value: &str, decimals: &str) -> TransferRecord {
    TransferRecord {
        hash: Some(hash.to_string()),
        time_stamp: Some("1700000000".to_string()),
        from: Some("0x1111111111111111111111111111111111111111".to_string()),
        to: Some("0x2222222222222222222222222222222222222222".to_string()),
        value: Some(value.to_string()),
        contract_address: Some("0xcontract".to_string()),
        token_name: Some("Test Token".to_string()),
        token_symbol: Some("TKN".to_string()),
        token_decimal: Some(decimals.to_string()),
        ..TransferRecord::default()
    }
}

/// `n` well-formed native records with distinct hashes
pub fn ok_page(n: usize) -> Vec<TransferRecord> {
    (0..n)
        .map(|i| native_record(&format!("0x{:064x}", i + 1), "1000000000000000000"))
        .collect()
}

pub fn native_row(wallet: &str, hash: &str) -> NormalizedRow {
    NormalizedRow::Native(NativeRow {
        wallet_address: wallet.to_string(),
        tx_hash: hash.to_string(),
        tx_time: "2023-11-14 22:13:20".to_string(),
        from_address: wallet.to_string(),
        to_address: "0xb".to_string(),
        currency: "Kasta".to_string(),
        quantity: "1.0".to_string(),
        tx_fee_quantity: "0.00063".to_string(),
        fee_currency: "MATIC".to_string(),
    })
}

pub fn token_row(wallet: &str, hash: &str) -> NormalizedRow {
    NormalizedRow::Token(TokenRow {
        wallet_address: wallet.to_string(),
        tx_hash: hash.to_string(),
        tx_time: "2023-11-14 22:13:20".to_string(),
        from_address: wallet.to_string(),
        to_address: "0xb".to_string(),
        contract_address: "0xcontract".to_string(),
        token_name: "Test Token".to_string(),
        token_symbol: "TKN".to_string(),
        token_decimal: 6,
        quantity: "0.5".to_string(),
    })
}

/// Explorer that replays queued responses per address. An exhausted queue
/// answers like the real explorer does for an empty list.
#[derive(Default)]
pub struct ScriptedExplorer {
    scripts: Mutex<HashMap<String, VecDeque<Result<ExplorerResponse, FetchError>>>>,
    requests: Mutex<Vec<(String, u32, Vec<(&'static str, String)>)>>,
}

impl ScriptedExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, address: &str, response: Result<ExplorerResponse, FetchError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn push_page(&self, address: &str, records: Vec<TransferRecord>) {
        self.push(
            address,
            Ok(ExplorerResponse {
                status: ExplorerResponse::STATUS_OK.to_string(),
                message: Some("OK".to_string()),
                result: serde_json::to_value(records).unwrap(),
            }),
        );
    }

    pub fn push_status(&self, address: &str, status: &str, message: &str) {
        self.push(
            address,
            Ok(ExplorerResponse {
                status: status.to_string(),
                message: Some(message.to_string()),
                result: serde_json::Value::Array(Vec::new()),
            }),
        );
    }

    pub fn push_error(&self, address: &str, message: &str) {
        self.push(address, Err(FetchError::Transport(message.to_string())));
    }

    /// Page numbers requested for `address`, in order
    pub fn requested_pages(&self, address: &str) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _, _)| a == address)
            .map(|(_, page, _)| *page)
            .collect()
    }

    /// Query parameters of every request, in order
    pub fn requests(&self) -> Vec<Vec<(&'static str, String)>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, query)| query.clone())
            .collect()
    }
}

#[async_trait]
impl ExplorerApi for ScriptedExplorer {
    async fn get_page(&self, request: &PageRequest<'_>) -> Result<ExplorerResponse, FetchError> {
        self.requests.lock().unwrap().push((
            request.address.to_string(),
            request.page,
            request.query_pairs(),
        ));

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(request.address)
            .and_then(|queue| queue.pop_front());

        next.unwrap_or_else(|| {
            Ok(ExplorerResponse {
                status: "0".to_string(),
                message: Some("No transactions found".to_string()),
                result: serde_json::Value::Array(Vec::new()),
            })
        })
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(bucket, key, body)` of every put, in order
    pub fn objects(&self) -> Vec<(String, String, Vec<u8>)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StagingError> {
        self.objects
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string(), body));
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, value: &str) -> Self {
        self.values.insert(id.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecrets {
    async fn secret_string(&self, id: &str) -> Result<String, SecretError> {
        self.values
            .get(id)
            .cloned()
            .ok_or_else(|| SecretError::Service {
                id: id.to_string(),
                message: "ResourceNotFoundException".to_string(),
            })
    }
}

/// Warehouse that records statements instead of running them
#[derive(Default)]
pub struct RecordingWarehouse {
    statements: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl RecordingWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every execute fails with `message`; nothing is recorded
    pub fn failing(message: &str) -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn execute(
        &self,
        _credentials: &WarehouseCredentials,
        sql: &str,
    ) -> Result<(), WarehouseError> {
        if let Some(message) = &self.failure {
            return Err(WarehouseError::Execution(message.clone()));
        }
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}
