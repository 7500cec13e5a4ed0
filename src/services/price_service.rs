use std::collections::{ BTreeMap, BTreeSet, HashMap, HashSet };
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::config::PriceConfig;
use crate::enums::Chain;
use crate::error::{ AppError, Result };
use crate::models::TokenKey;
use crate::rpc::{ status_error, RetryPolicy };

/// Prices resolved during one run, keyed by token and fiat currency.
///
/// A `None` entry is a definitive "no price known"; failed lookups are never
/// stored so a later run can try again.
#[derive(Debug, Default)]
pub struct PriceCache {
    entries: HashMap<(TokenKey, String), Option<BigDecimal>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, key: &TokenKey, fiat: &str) -> Option<Option<BigDecimal>> {
        self.entries.get(&(key.clone(), fiat.to_string())).cloned()
    }

    pub fn insert(&mut self, key: TokenKey, fiat: &str, price: Option<BigDecimal>) {
        self.entries.insert((key, fiat.to_string()), price);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Upstream price API. Missing ids in a returned map mean "not found".
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Prices of token contracts (EVM) or mints (Solana) on one chain,
    /// keyed by lowercased token id.
    async fn token_prices(&self, chain: Chain, token_ids: &[String], fiat: &str) -> Result<HashMap<String, BigDecimal>>;

    /// Prices of native coins keyed by coin id.
    async fn native_prices(&self, coin_ids: &[String], fiat: &str) -> Result<HashMap<String, BigDecimal>>;
}

// ── CoinGecko ───────────────────────────────────────────────────────

pub struct CoinGeckoSource {
    client: reqwest::Client,
    config: PriceConfig,
}

impl CoinGeckoSource {
    pub fn new(client: reqwest::Client, config: PriceConfig) -> Self {
        Self { client, config }
    }

    async fn get(&self, url: &str) -> Result<Value> {
        let response = self.client
            .get(url)
            .header(self.config.tier.key_header(), &self.config.api_key)
            .send().await
            .map_err(|e| AppError::from_reqwest("CoinGecko request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        response.json().await.map_err(|e| AppError::from_reqwest("Failed to parse CoinGecko response", e))
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn token_prices(&self, chain: Chain, token_ids: &[String], fiat: &str) -> Result<HashMap<String, BigDecimal>> {
        let url = format!(
            "{}/simple/token_price/{}?contract_addresses={}&vs_currencies={}",
            self.config.api_url.trim_end_matches('/'),
            chain.coingecko_platform(),
            urlencoding::encode(&token_ids.join(",")),
            urlencoding::encode(fiat)
        );
        parse_price_map(&self.get(&url).await?, fiat)
    }

    async fn native_prices(&self, coin_ids: &[String], fiat: &str) -> Result<HashMap<String, BigDecimal>> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.config.api_url.trim_end_matches('/'),
            urlencoding::encode(&coin_ids.join(",")),
            urlencoding::encode(fiat)
        );
        parse_price_map(&self.get(&url).await?, fiat)
    }
}

/// Read `{"<id>": {"<fiat>": <number>}}`. Ids without a usable number are
/// left out.
fn parse_price_map(body: &Value, fiat: &str) -> Result<HashMap<String, BigDecimal>> {
    let object = body
        .as_object()
        .ok_or_else(|| AppError::MalformedPayload(format!("CoinGecko returned a non-object: {}", body)))?;

    let mut prices = HashMap::new();
    for (id, quotes) in object {
        if let Some(Value::Number(n)) = quotes.get(fiat) {
            let price = BigDecimal::from_str(&n.to_string()).map_err(|e|
                AppError::MalformedPayload(format!("CoinGecko price for {} is not a decimal: {}", id, e))
            )?;
            prices.insert(id.to_lowercase(), price);
        }
    }
    Ok(prices)
}

// ── Resolver ────────────────────────────────────────────────────────

/// Resolves fiat unit prices for token keys, batching per chain and going
/// through a `PriceCache`.
pub struct PriceResolver {
    source: Arc<dyn PriceSource>,
    retry: RetryPolicy,
    fiat: String,
    batch_size: usize,
}

impl PriceResolver {
    pub fn new(source: Arc<dyn PriceSource>, retry: RetryPolicy, fiat: &str, batch_size: usize) -> Self {
        Self {
            source,
            retry,
            fiat: fiat.to_lowercase(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn fiat(&self) -> &str {
        &self.fiat
    }

    /// Unit price per key; `None` when no price could be established.
    pub async fn resolve(&self, cache: &mut PriceCache, keys: &[TokenKey]) -> BTreeMap<TokenKey, Option<BigDecimal>> {
        let mut resolved = BTreeMap::new();
        let mut natives: Vec<TokenKey> = Vec::new();
        let mut tokens: BTreeMap<Chain, Vec<TokenKey>> = BTreeMap::new();

        for key in keys.iter().cloned().collect::<BTreeSet<_>>() {
            if let Some(price) = cache.get(&key, &self.fiat) {
                resolved.insert(key, price);
            } else if key.is_native() {
                natives.push(key);
            } else {
                tokens.entry(key.chain).or_default().push(key);
            }
        }

        if !natives.is_empty() {
            let coin_ids: Vec<String> = natives
                .iter()
                .map(|k| k.chain.coingecko_native_id().to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let mut prices = HashMap::new();
            let mut failed: HashSet<&str> = HashSet::new();
            for chunk in coin_ids.chunks(self.batch_size) {
                let label = format!("native prices [{}]", chunk.join(","));
                match self.retry.run(&label, || self.source.native_prices(chunk, &self.fiat)).await {
                    Ok(found) => prices.extend(found),
                    Err(e) => {
                        tracing::warn!("Price lookup for {} failed: {}", chunk.join(", "), e);
                        failed.extend(chunk.iter().map(String::as_str));
                    }
                }
            }

            for key in natives {
                let coin_id = key.chain.coingecko_native_id();
                let price = prices.get(coin_id).cloned();
                self.record(cache, &mut resolved, key, price, failed.contains(coin_id));
            }
        }

        for (chain, keys) in tokens {
            for chunk in keys.chunks(self.batch_size) {
                let ids: Vec<String> = chunk
                    .iter()
                    .map(|k| k.token_id.clone())
                    .collect();
                let label = format!("{} token prices ({} ids)", chain, ids.len());

                match self.retry.run(&label, || self.source.token_prices(chain, &ids, &self.fiat)).await {
                    Ok(prices) => {
                        for key in chunk {
                            let price = prices.get(&key.token_id.to_lowercase()).cloned();
                            self.record(cache, &mut resolved, key.clone(), price, false);
                        }
                    }
                    Err(e) => {
                        let names: Vec<String> = chunk
                            .iter()
                            .map(|k| k.to_string())
                            .collect();
                        tracing::warn!("Price lookup failed, leaving unresolved: {} ({})", names.join(", "), e);
                        for key in chunk {
                            resolved.insert(key.clone(), None);
                        }
                    }
                }
            }
        }

        resolved
    }

    fn record(
        &self,
        cache: &mut PriceCache,
        resolved: &mut BTreeMap<TokenKey, Option<BigDecimal>>,
        key: TokenKey,
        price: Option<BigDecimal>,
        lookup_failed: bool
    ) {
        match (&price, lookup_failed) {
            // A miss after a failed batch is not a definitive answer.
            (None, true) => {}
            (None, false) => {
                tracing::warn!("No {} price for {}", self.fiat, key);
                cache.insert(key.clone(), &self.fiat, None);
            }
            (Some(_), _) => cache.insert(key.clone(), &self.fiat, price.clone()),
        }
        resolved.insert(key, price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{ AtomicU32, Ordering };
    use std::sync::Mutex;
    use std::time::Duration;

    const USDC_ETH: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    /// In-memory price API that can be told to rate-limit its first calls.
    #[derive(Default)]
    struct FakeSource {
        prices: HashMap<String, BigDecimal>,
        rate_limit_first: AtomicU32,
        calls: AtomicU32,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl FakeSource {
        fn with(prices: &[(&str, &str)]) -> Self {
            Self {
                prices: prices
                    .iter()
                    .map(|(id, p)| (id.to_string(), dec(p)))
                    .collect(),
                ..Default::default()
            }
        }

        fn lookup(&self, ids: &[String]) -> Result<HashMap<String, BigDecimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(ids.to_vec());
            let remaining = self.rate_limit_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.rate_limit_first.store(remaining - 1, Ordering::SeqCst);
                return Err(AppError::RateLimited("HTTP 429".into()));
            }
            Ok(
                ids
                    .iter()
                    .filter_map(|id| self.prices.get(id).map(|p| (id.clone(), p.clone())))
                    .collect()
            )
        }
    }

    #[async_trait]
    impl PriceSource for FakeSource {
        async fn token_prices(&self, _chain: Chain, token_ids: &[String], _fiat: &str) -> Result<HashMap<String, BigDecimal>> {
            self.lookup(token_ids)
        }

        async fn native_prices(&self, coin_ids: &[String], _fiat: &str) -> Result<HashMap<String, BigDecimal>> {
            self.lookup(coin_ids)
        }
    }

    fn resolver(source: Arc<FakeSource>, attempts: u32, batch_size: usize) -> PriceResolver {
        PriceResolver::new(source, fast_retry(attempts), "usd", batch_size)
    }

    #[tokio::test]
    async fn test_retried_lookup_matches_unthrottled_price() {
        let keys = vec![TokenKey::new(Chain::Ethereum, USDC_ETH)];

        let calm = Arc::new(FakeSource::with(&[(USDC_ETH, "0.9998")]));
        let unthrottled = resolver(calm, 4, 50).resolve(&mut PriceCache::new(), &keys).await;

        let busy = Arc::new(FakeSource::with(&[(USDC_ETH, "0.9998")]));
        busy.rate_limit_first.store(2, Ordering::SeqCst);
        let throttled = resolver(busy.clone(), 4, 50).resolve(&mut PriceCache::new(), &keys).await;

        assert_eq!(busy.calls.load(Ordering::SeqCst), 3);
        assert_eq!(throttled, unthrottled);
        assert_eq!(throttled[&keys[0]], Some(dec("0.9998")));
    }

    #[tokio::test]
    async fn test_not_found_is_none_and_cached() {
        let source = Arc::new(FakeSource::with(&[]));
        let resolver = resolver(source.clone(), 4, 50);
        let mut cache = PriceCache::new();
        let keys = vec![TokenKey::new(Chain::Base, "0x1111111111111111111111111111111111111111")];

        assert_eq!(resolver.resolve(&mut cache, &keys).await[&keys[0]], None);
        assert_eq!(resolver.resolve(&mut cache, &keys).await[&keys[0]], None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&keys[0], "usd"), Some(None));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let source = Arc::new(FakeSource::with(&[("solana", "98.5")]));
        let resolver = resolver(source.clone(), 4, 50);
        let mut cache = PriceCache::new();
        let key = TokenKey::native(Chain::Solana);
        cache.insert(key.clone(), "usd", Some(dec("100")));

        let prices = resolver.resolve(&mut cache, &[key.clone()]).await;
        assert_eq!(prices[&key], Some(dec("100")));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        cache.clear();
        let prices = resolver.resolve(&mut cache, &[key.clone()]).await;
        assert_eq!(prices[&key], Some(dec("98.5")));
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_price_unresolved() {
        let source = Arc::new(FakeSource::with(&[(USDC_ETH, "1")]));
        source.rate_limit_first.store(10, Ordering::SeqCst);
        let resolver = resolver(source.clone(), 3, 50);
        let mut cache = PriceCache::new();
        let key = TokenKey::new(Chain::Ethereum, USDC_ETH);

        let prices = resolver.resolve(&mut cache, &[key.clone()]).await;
        assert_eq!(prices[&key], None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        // Failures are not remembered.
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_batches_per_chain_and_shares_native_ids() {
        let source = Arc::new(FakeSource::with(&[("ethereum", "3000"), ("0x01", "1"), ("0x02", "2")]));
        let resolver = resolver(source.clone(), 1, 2);
        let keys = vec![
            TokenKey::native(Chain::Ethereum),
            TokenKey::native(Chain::Arbitrum),
            TokenKey::new(Chain::Ethereum, "0x01"),
            TokenKey::new(Chain::Ethereum, "0x02"),
            TokenKey::new(Chain::Ethereum, "0x03"),
            TokenKey::new(Chain::Polygon, "0x01")
        ];

        let prices = resolver.resolve(&mut PriceCache::new(), &keys).await;

        assert_eq!(prices[&TokenKey::native(Chain::Ethereum)], Some(dec("3000")));
        assert_eq!(prices[&TokenKey::native(Chain::Arbitrum)], Some(dec("3000")));
        assert_eq!(prices[&TokenKey::new(Chain::Ethereum, "0x03")], None);
        // One native call, two Ethereum batches, one Polygon batch.
        let batches = source.batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[0], vec!["ethereum".to_string()]);
        assert!(batches.iter().all(|b| b.len() <= 2));
    }

    #[tokio::test]
    async fn test_failed_native_chunk_does_not_block_other_misses() {
        // Coin ids sort as avalanche-2, binancecoin, solana; the first call fails.
        let source = Arc::new(FakeSource::with(&[("solana", "150")]));
        source.rate_limit_first.store(1, Ordering::SeqCst);
        let resolver = resolver(source.clone(), 1, 1);
        let mut cache = PriceCache::new();
        let keys = vec![
            TokenKey::native(Chain::Avalanche),
            TokenKey::native(Chain::Bsc),
            TokenKey::native(Chain::Solana)
        ];

        let prices = resolver.resolve(&mut cache, &keys).await;

        assert_eq!(prices[&keys[0]], None);
        assert_eq!(prices[&keys[1]], None);
        assert_eq!(prices[&keys[2]], Some(dec("150")));
        // Only the failed chunk stays open for another attempt.
        assert_eq!(cache.get(&keys[0], "usd"), None);
        assert_eq!(cache.get(&keys[1], "usd"), Some(None));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_parse_coingecko_price_map() {
        let body =
            json!({
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48": {"usd": 0.999812},
            "0xdac17f958d2ee523a2206206994597c13d831ec7": {"usd": 1.001},
            "0x0000000000000000000000000000000000000bad": {},
            "shib": {"usd": 1.2e-5}
        });

        let prices = parse_price_map(&body, "usd").unwrap();
        assert_eq!(prices.len(), 3);
        assert_eq!(prices[USDC_ETH], dec("0.999812"));
        assert_eq!(prices["shib"], dec("0.000012"));
        assert!(parse_price_map(&json!([]), "usd").is_err());
    }

    #[test]
    fn test_price_digits_survive_decoding() {
        let body: Value = serde_json
            ::from_str(r#"{"pepe": {"usd": 0.0000123456789012345678901}, "ethereum": {"usd": 3456.789012345678901}}"#)
            .unwrap();

        let prices = parse_price_map(&body, "usd").unwrap();
        assert_eq!(prices["pepe"], dec("0.0000123456789012345678901"));
        assert_eq!(prices["ethereum"], dec("3456.789012345678901"));
    }
}
