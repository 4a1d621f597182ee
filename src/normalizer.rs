//! Raw explorer records to warehouse rows.
//!
//! Pure transformation: unit conversion from the smallest denomination, UTC
//! timestamp formatting and field renaming. The wallet address is always the
//! one the records were fetched for, never taken from the record itself.

use crate::config::{MalformedRecordPolicy, NormalizeConfig};
use crate::schemas::{NativeRow, NormalizedRow, TokenRow, TransferKind, TransferRecord};
use alloy_primitives::U256;
use chrono::DateTime;
use thiserror::Error;
use tracing::warn;

/// Decimals of the native currency
pub const NATIVE_DECIMALS: u32 = 18;

/// ERC-20 `decimals` is a `uint8`
pub const MAX_TOKEN_DECIMALS: u32 = u8::MAX as u32;

const TX_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Record {hash} is missing field {field}")]
    MissingField { field: &'static str, hash: String },

    #[error("Record {hash} has invalid {field}: {value:?}")]
    InvalidField {
        field: &'static str,
        value: String,
        hash: String,
    },
}

pub struct RecordNormalizer {
    currency: String,
    fee_currency: String,
    policy: MalformedRecordPolicy,
}

impl RecordNormalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            currency: config.currency.clone(),
            fee_currency: config.fee_currency.clone(),
            policy: config.on_malformed_record,
        }
    }

    /// Normalize every record fetched for `address`.
    ///
    /// Malformed records are dropped with a warning under
    /// [`MalformedRecordPolicy::Skip`] and fail the call under
    /// [`MalformedRecordPolicy::Abort`].
    pub fn normalize(
        &self,
        records: &[TransferRecord],
        address: &str,
        kind: TransferKind,
    ) -> Result<Vec<NormalizedRow>, NormalizeError> {
        let mut rows = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in records {
            match self.normalize_record(record, address, kind) {
                Ok(row) => rows.push(row),
                Err(e) => match self.policy {
                    MalformedRecordPolicy::Abort => return Err(e),
                    MalformedRecordPolicy::Skip => {
                        warn!("Skipping {} record for wallet {}: {}", kind, address, e);
                        skipped += 1;
                    }
                },
            }
        }

        if skipped > 0 {
            warn!(
                "normalize: wallet {} {} records -> {} rows, {} skipped",
                address,
                records.len(),
                rows.len(),
                skipped
            );
        }

        Ok(rows)
    }

    pub fn normalize_record(
        &self,
        record: &TransferRecord,
        address: &str,
        kind: TransferKind,
    ) -> Result<NormalizedRow, NormalizeError> {
        let hash = required(record, "hash", &record.hash)?;
        let time_stamp = required(record, "timeStamp", &record.time_stamp)?;
        let from = required(record, "from", &record.from)?;
        let to = required(record, "to", &record.to)?;
        let value = parse_amount(record, "value", required(record, "value", &record.value)?)?;
        let tx_time = format_timestamp(record, time_stamp)?;

        let row = match kind {
            TransferKind::Native => {
                let gas_used =
                    parse_amount(record, "gasUsed", required(record, "gasUsed", &record.gas_used)?)?;
                let gas_price = parse_amount(
                    record,
                    "gasPrice",
                    required(record, "gasPrice", &record.gas_price)?,
                )?;
                let fee = gas_used
                    .checked_mul(gas_price)
                    .ok_or_else(|| invalid(record, "gasPrice", "gasUsed * gasPrice overflows"))?;

                NormalizedRow::Native(NativeRow {
                    wallet_address: address.to_string(),
                    tx_hash: hash.to_string(),
                    tx_time,
                    from_address: from.to_string(),
                    to_address: to.to_string(),
                    currency: self.currency.clone(),
                    quantity: format_units(value, NATIVE_DECIMALS),
                    tx_fee_quantity: format_units(fee, NATIVE_DECIMALS),
                    fee_currency: self.fee_currency.clone(),
                })
            }
            TransferKind::Token => {
                let contract = required(record, "contractAddress", &record.contract_address)?;
                let name = required(record, "tokenName", &record.token_name)?;
                let symbol = required(record, "tokenSymbol", &record.token_symbol)?;
                let decimals_raw = required(record, "tokenDecimal", &record.token_decimal)?;
                let decimals: u32 = decimals_raw
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|d| *d <= MAX_TOKEN_DECIMALS)
                    .ok_or_else(|| invalid(record, "tokenDecimal", decimals_raw))?;

                NormalizedRow::Token(TokenRow {
                    wallet_address: address.to_string(),
                    tx_hash: hash.to_string(),
                    tx_time,
                    from_address: from.to_string(),
                    to_address: to.to_string(),
                    contract_address: contract.to_string(),
                    token_name: name.to_string(),
                    token_symbol: symbol.to_string(),
                    token_decimal: decimals,
                    quantity: format_units(value, decimals),
                })
            }
        };

        Ok(row)
    }
}

fn record_hash(record: &TransferRecord) -> String {
    record
        .hash
        .clone()
        .unwrap_or_else(|| "<unknown>".to_string())
}

fn required<'a>(
    record: &TransferRecord,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, NormalizeError> {
    value.as_deref().ok_or_else(|| NormalizeError::MissingField {
        field,
        hash: record_hash(record),
    })
}

fn invalid(record: &TransferRecord, field: &'static str, value: &str) -> NormalizeError {
    NormalizeError::InvalidField {
        field,
        value: value.to_string(),
        hash: record_hash(record),
    }
}

fn parse_amount(
    record: &TransferRecord,
    field: &'static str,
    raw: &str,
) -> Result<U256, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(record, field, raw));
    }
    U256::from_str_radix(trimmed, 10).map_err(|_| invalid(record, field, raw))
}

fn format_timestamp(record: &TransferRecord, raw: &str) -> Result<String, NormalizeError> {
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(record, "timeStamp", raw))?;
    let dt = DateTime::from_timestamp(secs, 0).ok_or_else(|| invalid(record, "timeStamp", raw))?;
    Ok(dt.format(TX_TIME_FORMAT).to_string())
}

/// Render `value / 10^decimals` as an exact decimal string.
///
/// Trailing fractional zeros are trimmed, keeping at least one digit after
/// the point: `1.0`, `0.5`, `0.00000105`.
pub fn format_units(value: U256, decimals: u32) -> String {
    let digits = value.to_string();
    let scale = decimals as usize;

    if scale == 0 {
        return format!("{}.0", digits);
    }

    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits
    };

    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let frac = frac_part.trim_end_matches('0');

    if frac.is_empty() {
        format!("{}.0", int_part)
    } else {
        format!("{}.{}", int_part, frac)
    }
}
