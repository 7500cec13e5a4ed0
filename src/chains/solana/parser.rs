//! Extraction of token movements from `getTransaction` payloads fetched with
//! `encoding=jsonParsed`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ AppError, Result };
use crate::providers::SolanaTransfer;

// ── getTransaction response types ───────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalanceEntry>,
    #[serde(default)]
    pub inner_instructions: Vec<InnerInstructions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceEntry {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
pub struct UiTokenAmount {
    pub decimals: u8,
}

#[derive(Debug, Deserialize)]
pub struct InnerInstructions {
    pub index: usize,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionBody {
    pub signatures: Vec<String>,
    pub message: Message,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub account_keys: Vec<AccountKey>,
    pub instructions: Vec<Instruction>,
}

/// `jsonParsed` gives objects; plain `json` encoding gives bare strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Parsed {
        pubkey: String,
    },
    Plain(String),
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            AccountKey::Parsed { pubkey } => pubkey,
            AccountKey::Plain(pubkey) => pubkey,
        }
    }
}

/// Instructions the RPC node could not decode carry no `parsed` field.
#[derive(Debug, Deserialize)]
pub struct Instruction {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub parsed: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ParsedInstruction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    info: Value,
}

/// Owner, mint and decimals of each token account touched by the transaction.
struct TokenAccount<'a> {
    owner: Option<&'a str>,
    mint: &'a str,
    decimals: u8,
}

struct Context<'a> {
    signature: &'a str,
    slot: u64,
    block_time: Option<i64>,
    token_accounts: HashMap<&'a str, TokenAccount<'a>>,
}

impl Context<'_> {
    /// Lamports sent to a token account (wrapping SOL) belong to its owner.
    fn owner_of<'s>(&'s self, account: &'s str) -> &'s str {
        self.token_accounts
            .get(account)
            .and_then(|a| a.owner)
            .unwrap_or(account)
    }
}

impl ParsedTransaction {
    pub fn signature(&self) -> Option<&str> {
        self.transaction.signatures.first().map(String::as_str)
    }

    pub fn failed(&self) -> bool {
        self.meta
            .as_ref()
            .and_then(|m| m.err.as_ref())
            .map(|e| !e.is_null())
            .unwrap_or(false)
    }
}

/// Decode a raw `getTransaction` result.
pub fn decode_transaction(payload: Value) -> Result<ParsedTransaction> {
    serde_json
        ::from_value(payload)
        .map_err(|e| AppError::MalformedPayload(format!("Unexpected transaction shape: {}", e)))
}

/// All transfers in `tx` that move value in or out of `address`.
pub fn parse_transaction(address: &str, tx: &ParsedTransaction) -> Result<Vec<SolanaTransfer>> {
    if tx.failed() {
        return Ok(Vec::new());
    }

    let signature = tx
        .signature()
        .ok_or_else(|| AppError::MalformedPayload(format!("Transaction at slot {} has no signature", tx.slot)))?;

    let empty = TransactionMeta::default();
    let meta = tx.meta.as_ref().unwrap_or(&empty);
    let keys = &tx.transaction.message.account_keys;

    let mut token_accounts = HashMap::new();
    // Post balances win: an account closed in this transaction only has a pre entry.
    for entry in meta.pre_token_balances.iter().chain(meta.post_token_balances.iter()) {
        if let Some(key) = keys.get(entry.account_index) {
            token_accounts.insert(key.pubkey(), TokenAccount {
                owner: entry.owner.as_deref(),
                mint: &entry.mint,
                decimals: entry.ui_token_amount.decimals,
            });
        }
    }

    let ctx = Context {
        signature,
        slot: tx.slot,
        block_time: tx.block_time,
        token_accounts,
    };

    // Top-level instruction i is followed by the inner instructions it invoked.
    let mut inner: HashMap<usize, &Vec<Instruction>> = HashMap::new();
    for group in &meta.inner_instructions {
        inner.insert(group.index, &group.instructions);
    }

    let mut transfers = Vec::new();
    for (index, instruction) in tx.transaction.message.instructions.iter().enumerate() {
        let nested = inner.get(&index).map(|v| v.iter()).into_iter().flatten();
        for ix in std::iter::once(instruction).chain(nested) {
            if let Some(transfer) = parse_instruction(&ctx, ix)? {
                if touches(address, &transfer) {
                    transfers.push(transfer);
                }
            }
        }
    }

    Ok(transfers)
}

/// Keep transfers that cross the boundary of the tracked wallet.
fn touches(address: &str, transfer: &SolanaTransfer) -> bool {
    let from_self = transfer.source_owner.as_deref() == Some(address);
    let to_self = transfer.destination_owner.as_deref() == Some(address);
    from_self != to_self
}

fn parse_instruction(ctx: &Context<'_>, ix: &Instruction) -> Result<Option<SolanaTransfer>> {
    let (program, parsed) = match (ix.program.as_deref(), ix.parsed.as_ref()) {
        (Some(program), Some(parsed)) if parsed.is_object() => (program, parsed),
        _ => {
            return Ok(None);
        }
    };

    let parsed: ParsedInstruction = match serde_json::from_value(parsed.clone()) {
        Ok(p) => p,
        Err(_) => {
            return Ok(None);
        }
    };

    match (program, parsed.kind.as_str()) {
        ("spl-token" | "spl-token-2022", "transfer" | "transferChecked") =>
            token_transfer(ctx, &parsed.info).map(Some),
        ("system", "transfer" | "transferWithSeed") => native_transfer(ctx, &parsed.info).map(Some),
        _ => Ok(None),
    }
}

fn token_transfer(ctx: &Context<'_>, info: &Value) -> Result<SolanaTransfer> {
    let source = required_str(ctx, info, "source")?;
    let destination = required_str(ctx, info, "destination")?;
    let source_account = ctx.token_accounts.get(source);
    let destination_account = ctx.token_accounts.get(destination);

    // transferChecked carries amount and decimals under tokenAmount.
    let (raw_amount, declared_decimals) = match info.get("tokenAmount") {
        Some(token_amount) =>
            (
                amount_text(ctx, token_amount.get("amount"))?,
                token_amount
                    .get("decimals")
                    .and_then(Value::as_u64)
                    .and_then(|d| u8::try_from(d).ok()),
            ),
        None => (amount_text(ctx, info.get("amount"))?, None),
    };

    let mint = info
        .get("mint")
        .and_then(Value::as_str)
        .or_else(|| source_account.map(|a| a.mint))
        .or_else(|| destination_account.map(|a| a.mint))
        .ok_or_else(||
            AppError::MalformedPayload(format!("{}: token transfer without a resolvable mint", ctx.signature))
        )?;

    let decimals = declared_decimals
        .or_else(|| source_account.map(|a| a.decimals))
        .or_else(|| destination_account.map(|a| a.decimals));

    // The signing authority of a transfer is the source account's owner or delegate.
    let source_owner = source_account
        .and_then(|a| a.owner)
        .or_else(|| info.get("authority").and_then(Value::as_str))
        .or_else(|| info.get("multisigAuthority").and_then(Value::as_str));

    Ok(SolanaTransfer {
        signature: ctx.signature.to_string(),
        slot: ctx.slot,
        block_time: ctx.block_time,
        mint: Some(mint.to_string()),
        native: false,
        source_owner: source_owner.map(str::to_string),
        destination_owner: destination_account.and_then(|a| a.owner).map(str::to_string),
        raw_amount,
        decimals,
    })
}

fn native_transfer(ctx: &Context<'_>, info: &Value) -> Result<SolanaTransfer> {
    let source = required_str(ctx, info, "source")?;
    let destination = required_str(ctx, info, "destination")?;

    Ok(SolanaTransfer {
        signature: ctx.signature.to_string(),
        slot: ctx.slot,
        block_time: ctx.block_time,
        mint: None,
        native: true,
        source_owner: Some(ctx.owner_of(source).to_string()),
        destination_owner: Some(ctx.owner_of(destination).to_string()),
        raw_amount: amount_text(ctx, info.get("lamports"))?,
        decimals: None,
    })
}

fn required_str<'v>(ctx: &Context<'_>, info: &'v Value, field: &str) -> Result<&'v str> {
    info.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::MalformedPayload(format!("{}: transfer without {}", ctx.signature, field)))
}

/// Amounts arrive as strings for tokens and as numbers for lamports.
fn amount_text(ctx: &Context<'_>, value: Option<&Value>) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) if n.is_u64() => Ok(n.to_string()),
        other =>
            Err(
                AppError::MalformedPayload(
                    format!("{}: transfer amount is not an integer: {:?}", ctx.signature, other)
                )
            ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const OTHER: &str = "7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV";
    const WALLET_ATA: &str = "3Zc4JWxrMWtP9n5Hv6pYmYbnhx7aUJm1RqMVuQK2tsjT";
    const OTHER_ATA: &str = "Dd7Hg6tqvxBpXbjzd6Vkz6FHB1U3Cwj8ScGkRq7cDpJF";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn tx(instructions: Value, inner: Value, err: Value) -> ParsedTransaction {
        decode_transaction(
            json!({
            "slot": 250000000,
            "blockTime": 1704067200,
            "meta": {
                "err": err,
                "fee": 5000,
                "preTokenBalances": [
                    {"accountIndex": 2, "mint": USDC, "owner": WALLET,
                     "uiTokenAmount": {"amount": "5000000", "decimals": 6, "uiAmountString": "5"}},
                    {"accountIndex": 3, "mint": USDC, "owner": OTHER,
                     "uiTokenAmount": {"amount": "0", "decimals": 6, "uiAmountString": "0"}}
                ],
                "postTokenBalances": [
                    {"accountIndex": 2, "mint": USDC, "owner": WALLET,
                     "uiTokenAmount": {"amount": "0", "decimals": 6, "uiAmountString": "0"}},
                    {"accountIndex": 3, "mint": USDC, "owner": OTHER,
                     "uiTokenAmount": {"amount": "5000000", "decimals": 6, "uiAmountString": "5"}}
                ],
                "innerInstructions": inner
            },
            "transaction": {
                "signatures": ["5sig"],
                "message": {
                    "accountKeys": [
                        {"pubkey": WALLET, "signer": true, "writable": true, "source": "transaction"},
                        {"pubkey": OTHER, "signer": false, "writable": true, "source": "transaction"},
                        {"pubkey": WALLET_ATA, "signer": false, "writable": true, "source": "transaction"},
                        {"pubkey": OTHER_ATA, "signer": false, "writable": true, "source": "transaction"}
                    ],
                    "instructions": instructions
                }
            }
        })
        ).unwrap()
    }

    #[test]
    fn test_spl_transfer_resolves_owners_through_token_balances() {
        let tx = tx(
            json!([{
                "program": "spl-token",
                "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                "parsed": {"type": "transfer", "info": {
                    "source": WALLET_ATA, "destination": OTHER_ATA,
                    "authority": WALLET, "amount": "5000000"
                }}
            }]),
            json!([]),
            Value::Null
        );

        let transfers = parse_transaction(WALLET, &tx).unwrap();
        assert_eq!(transfers.len(), 1);
        let t = &transfers[0];
        assert_eq!(t.signature, "5sig");
        assert_eq!(t.mint.as_deref(), Some(USDC));
        assert_eq!(t.decimals, Some(6));
        assert_eq!(t.source_owner.as_deref(), Some(WALLET));
        assert_eq!(t.destination_owner.as_deref(), Some(OTHER));
        assert_eq!(t.raw_amount, "5000000");
        assert_eq!(t.block_time, Some(1704067200));
        assert!(!t.native);
    }

    #[test]
    fn test_transfer_checked_and_inner_instructions() {
        let tx = tx(
            json!([{"programId": "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4", "accounts": [], "data": "abc"}]),
            json!([{
                "index": 0,
                "instructions": [{
                    "program": "spl-token",
                    "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                    "parsed": {"type": "transferChecked", "info": {
                        "source": OTHER_ATA, "destination": WALLET_ATA, "mint": USDC,
                        "authority": OTHER,
                        "tokenAmount": {"amount": "1250000", "decimals": 6, "uiAmount": 1.25}
                    }}
                }]
            }]),
            Value::Null
        );

        let transfers = parse_transaction(WALLET, &tx).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].raw_amount, "1250000");
        assert_eq!(transfers[0].destination_owner.as_deref(), Some(WALLET));
        assert_eq!(transfers[0].source_owner.as_deref(), Some(OTHER));
    }

    #[test]
    fn test_system_transfer_is_native() {
        let tx = tx(
            json!([{
                "program": "system",
                "programId": "11111111111111111111111111111111",
                "parsed": {"type": "transfer", "info": {
                    "source": OTHER, "destination": WALLET, "lamports": 5000000000u64
                }}
            }]),
            json!([]),
            Value::Null
        );

        let transfers = parse_transaction(WALLET, &tx).unwrap();
        assert_eq!(transfers.len(), 1);
        assert!(transfers[0].native);
        assert_eq!(transfers[0].mint, None);
        assert_eq!(transfers[0].raw_amount, "5000000000");
    }

    #[test]
    fn test_unrelated_and_self_moves_are_skipped() {
        let tx = tx(
            json!([
                {"program": "system", "programId": "11111111111111111111111111111111",
                 "parsed": {"type": "transfer", "info": {"source": WALLET, "destination": WALLET, "lamports": 10}}},
                {"program": "system", "programId": "11111111111111111111111111111111",
                 "parsed": {"type": "transfer", "info": {"source": OTHER, "destination": OTHER_ATA, "lamports": 10}}},
                {"program": "system", "programId": "11111111111111111111111111111111",
                 "parsed": {"type": "createAccount", "info": {"source": WALLET, "newAccount": WALLET_ATA, "lamports": 2039280}}}
            ]),
            json!([]),
            Value::Null
        );

        assert!(parse_transaction(WALLET, &tx).unwrap().is_empty());
    }

    #[test]
    fn test_wrapping_sol_into_own_token_account_is_not_a_transfer() {
        let tx = tx(
            json!([
                {"program": "system", "programId": "11111111111111111111111111111111",
                 "parsed": {"type": "transfer", "info": {"source": WALLET, "destination": WALLET_ATA, "lamports": 1000000}}},
                {"program": "spl-token", "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                 "parsed": {"type": "syncNative", "info": {"account": WALLET_ATA}}}
            ]),
            json!([]),
            Value::Null
        );

        assert!(parse_transaction(WALLET, &tx).unwrap().is_empty());
    }

    #[test]
    fn test_sol_sent_to_another_token_account_names_its_owner() {
        let tx = tx(
            json!([{
                "program": "system", "programId": "11111111111111111111111111111111",
                "parsed": {"type": "transfer", "info": {"source": WALLET, "destination": OTHER_ATA, "lamports": 7}}
            }]),
            json!([]),
            Value::Null
        );

        let transfers = parse_transaction(WALLET, &tx).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].source_owner.as_deref(), Some(WALLET));
        assert_eq!(transfers[0].destination_owner.as_deref(), Some(OTHER));
    }

    #[test]
    fn test_failed_transaction_yields_nothing() {
        let tx = tx(
            json!([{
                "program": "system", "programId": "11111111111111111111111111111111",
                "parsed": {"type": "transfer", "info": {"source": OTHER, "destination": WALLET, "lamports": 1}}
            }]),
            json!([]),
            json!({"InstructionError": [0, "Custom"]})
        );

        assert!(tx.failed());
        assert!(parse_transaction(WALLET, &tx).unwrap().is_empty());
    }

    #[test]
    fn test_missing_amount_is_malformed() {
        let tx = tx(
            json!([{
                "program": "system", "programId": "11111111111111111111111111111111",
                "parsed": {"type": "transfer", "info": {"source": OTHER, "destination": WALLET}}
            }]),
            json!([]),
            Value::Null
        );

        assert!(matches!(parse_transaction(WALLET, &tx), Err(AppError::MalformedPayload(_))));
    }
}
