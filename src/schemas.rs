//! Data schemas for the wallet loader.
//!
//! Raw explorer records on one side, warehouse row layouts on the other. The
//! row structs' field order is the CSV column order, which must match the
//! target tables.

use serde::{Deserialize, Serialize};

// ============================================================================
// PART A: Transfer kinds
// ============================================================================

/// Which explorer transfer list a run targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// Native-currency transactions (`txlist`)
    Native,
    /// ERC-20 token transfers (`tokentx`)
    Token,
}

impl TransferKind {
    pub const ALL: [TransferKind; 2] = [TransferKind::Native, TransferKind::Token];

    /// Explorer `action` query parameter
    pub fn action(&self) -> &'static str {
        match self {
            TransferKind::Native => "txlist",
            TransferKind::Token => "tokentx",
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferKind::Native => write!(f, "native"),
            TransferKind::Token => write!(f, "token"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

// ============================================================================
// PART B: Explorer payloads
// ============================================================================

/// Envelope returned by the explorer `account` module.
///
/// `result` is an array of transfers on success and an error string otherwise,
/// so it stays untyped until the status has been checked.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerResponse {
    pub status: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub result: serde_json::Value,
}

impl ExplorerResponse {
    pub const STATUS_OK: &'static str = "1";

    pub fn is_success(&self) -> bool {
        self.status == Self::STATUS_OK
    }

    /// Decode the `result` array into transfer records.
    pub fn into_records(self) -> Result<Vec<TransferRecord>, serde_json::Error> {
        serde_json::from_value(self.result)
    }
}

/// One transfer as supplied by the explorer.
///
/// Every field is optional so a single incomplete record fails on its own in
/// the normalizer instead of failing the page decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub hash: Option<String>,
    pub time_stamp: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub gas_used: Option<String>,
    pub gas_price: Option<String>,

    // Token transfers only
    pub contract_address: Option<String>,
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub token_decimal: Option<String>,
}

// ============================================================================
// PART C: Warehouse rows
// ============================================================================

/// Row layout of the native transfer table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NativeRow {
    pub wallet_address: String,
    pub tx_hash: String,
    /// `YYYY-MM-DD HH:MM:SS`, UTC
    pub tx_time: String,
    pub from_address: String,
    pub to_address: String,
    pub currency: String,
    /// Exact decimal, value / 10^18
    pub quantity: String,
    /// Exact decimal, gasUsed * gasPrice / 10^18
    pub tx_fee_quantity: String,
    pub fee_currency: String,
}

/// Row layout of the token transfer table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenRow {
    pub wallet_address: String,
    pub tx_hash: String,
    pub tx_time: String,
    pub from_address: String,
    pub to_address: String,
    pub contract_address: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: u32,
    /// Exact decimal, value / 10^tokenDecimal
    pub quantity: String,
}

/// A normalized row of either kind. Serializes as the inner struct so the CSV
/// header is the row's own field list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NormalizedRow {
    Native(NativeRow),
    Token(TokenRow),
}

impl NormalizedRow {
    pub fn kind(&self) -> TransferKind {
        match self {
            NormalizedRow::Native(_) => TransferKind::Native,
            NormalizedRow::Token(_) => TransferKind::Token,
        }
    }

    pub fn wallet_address(&self) -> &str {
        match self {
            NormalizedRow::Native(row) => &row.wallet_address,
            NormalizedRow::Token(row) => &row.wallet_address,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            NormalizedRow::Native(row) => &row.tx_hash,
            NormalizedRow::Token(row) => &row.tx_hash,
        }
    }

    pub fn quantity(&self) -> &str {
        match self {
            NormalizedRow::Native(row) => &row.quantity,
            NormalizedRow::Token(row) => &row.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_kind_action() {
        assert_eq!(TransferKind::Native.action(), "txlist");
        assert_eq!(TransferKind::Token.action(), "tokentx");
        assert_eq!(TransferKind::Token.to_string(), "token");
    }

    #[test]
    fn test_success_envelope_decodes_records() {
        let body = r#"{
            "status": "1",
            "message": "OK",
            "result": [{
                "blockNumber": "1",
                "timeStamp": "1600000000",
                "hash": "0xabc",
                "from": "0x1",
                "to": "0x2",
                "value": "5",
                "gasUsed": "21000",
                "gasPrice": "1",
                "isError": "0"
            }]
        }"#;

        let response: ExplorerResponse = serde_json::from_str(body).unwrap();
        assert!(response.is_success());

        let records = response.into_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time_stamp.as_deref(), Some("1600000000"));
        assert_eq!(records[0].gas_used.as_deref(), Some("21000"));
        assert_eq!(records[0].token_decimal, None);
    }

    #[test]
    fn test_error_envelope_keeps_message() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#;
        let response: ExplorerResponse = serde_json::from_str(body).unwrap();
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("NOTOK"));
        assert!(response.into_records().is_err());
    }
}
