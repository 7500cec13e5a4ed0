use std::cmp::Ordering;
use std::fs::{ self, File };
use std::io::Write;
use std::path::PathBuf;

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::models::{ format_decimal, TokenBalance, TransferRecord };

pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const BALANCES_FILE: &str = "token_balances.csv";

const TRANSACTION_HEADERS: [&str; 9] = [
    "chain",
    "tx_hash",
    "timestamp",
    "token_symbol",
    "token_id",
    "direction",
    "amount",
    "counterparty",
    "warning",
];

const BALANCE_HEADERS: [&str; 6] = ["chain", "token_id", "token_symbol", "net_amount", "unit_price", "value"];

#[derive(Serialize)]
struct TransactionRow<'a> {
    chain: &'a str,
    tx_hash: &'a str,
    timestamp: String,
    token_symbol: &'a str,
    token_id: &'a str,
    direction: &'a str,
    amount: String,
    counterparty: Option<&'a str>,
    warning: Option<&'a str>,
}

#[derive(Serialize)]
struct BalanceRow<'a> {
    chain: &'a str,
    token_id: &'a str,
    token_symbol: &'a str,
    net_amount: String,
    unit_price: Option<String>,
    value: Option<String>,
}

/// Paths of the files written by one export.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub transactions: PathBuf,
    pub balances: PathBuf,
}

/// Writes the ledger and the valued balances as CSV.
pub struct ReportExporter {
    output_dir: PathBuf,
    min_report_value: Option<BigDecimal>,
}

impl ReportExporter {
    pub fn new(output_dir: impl Into<PathBuf>, min_report_value: Option<BigDecimal>) -> Self {
        Self {
            output_dir: output_dir.into(),
            min_report_value,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.output_dir.clone(), config.min_report_value.clone())
    }

    /// Write both files into the output directory, creating it if needed.
    pub fn export(&self, records: &[TransferRecord], balances: &[TokenBalance]) -> Result<ReportPaths> {
        fs::create_dir_all(&self.output_dir)?;

        let paths = ReportPaths {
            transactions: self.output_dir.join(TRANSACTIONS_FILE),
            balances: self.output_dir.join(BALANCES_FILE),
        };

        self.write_transactions(File::create(&paths.transactions)?, records)?;
        let rows = self.write_balances(File::create(&paths.balances)?, balances)?;

        tracing::info!(
            "Wrote {} transfers to {} and {} balances to {}",
            records.len(),
            paths.transactions.display(),
            rows,
            paths.balances.display()
        );

        Ok(paths)
    }

    /// One row per record, in the order given.
    pub fn write_transactions<W: Write>(&self, writer: W, records: &[TransferRecord]) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(TRANSACTION_HEADERS)?;

        for record in records {
            wtr.serialize(TransactionRow {
                chain: record.chain.as_str(),
                tx_hash: &record.tx_hash,
                timestamp: record.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                token_symbol: &record.token_symbol,
                token_id: &record.token_id,
                direction: record.direction.as_str(),
                amount: format_decimal(&record.amount),
                counterparty: record.counterparty.as_deref(),
                warning: record.warning.map(|w| w.as_str()),
            })?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Balances sorted by value, filtered by the minimum report value.
    /// Returns the number of rows written.
    pub fn write_balances<W: Write>(&self, writer: W, balances: &[TokenBalance]) -> Result<usize> {
        let rows = self.balance_rows(balances);

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(BALANCE_HEADERS)?;

        for balance in &rows {
            wtr.serialize(BalanceRow {
                chain: balance.chain.as_str(),
                token_id: &balance.token_id,
                token_symbol: &balance.token_symbol,
                net_amount: format_decimal(&balance.net_amount),
                unit_price: balance.unit_price.as_ref().map(format_decimal),
                value: balance.value().as_ref().map(format_decimal),
            })?;
        }

        wtr.flush()?;
        Ok(rows.len())
    }

    /// Rows for `token_balances.csv`: highest value first, unresolved last.
    /// Only rows with a known value can fall under the minimum.
    pub fn balance_rows<'a>(&self, balances: &'a [TokenBalance]) -> Vec<&'a TokenBalance> {
        let mut rows: Vec<(&TokenBalance, Option<BigDecimal>)> = balances
            .iter()
            .map(|b| (b, b.value()))
            .filter(|(_, value)| {
                match (value, &self.min_report_value) {
                    (Some(value), Some(min)) => value >= min,
                    _ => true,
                }
            })
            .collect();

        rows.sort_by(|(a, a_value), (b, b_value)| {
            let by_value = match (a_value, b_value) {
                (Some(x), Some(y)) => y.cmp(x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_value.then_with(|| a.key().cmp(&b.key()))
        });

        rows.into_iter()
            .map(|(b, _)| b)
            .collect()
    }
}
