use std::sync::Arc;

use anyhow::Context;
use tax_ledger::report::ReportExporter;
use tax_ledger::rpc::{ build_http_client, AdapterRegistry };
use tax_ledger::services::{
    aggregate,
    apply_prices,
    CoinGeckoSource,
    LedgerService,
    PriceCache,
    PriceResolver,
};
use tax_ledger::Config;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "tax_ledger=info".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!(
        "Building ledger for {} chain(s): {}",
        config.chain_configs.len(),
        config
            .configured_chains()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let client = build_http_client(config.http_timeout)?;

    // Fetch and normalize every chain
    let registry = AdapterRegistry::from_config(&config, client.clone());
    let ledger_service = LedgerService::new(registry);
    let targets = LedgerService::targets_from_config(&config);
    let run = ledger_service.collect(&targets).await.context("Failed to build the ledger")?;

    for skipped in &run.skipped {
        tracing::warn!("Chain {} is missing from the reports: {}", skipped.chain, skipped.reason);
    }

    // Aggregate balances
    let aggregation = aggregate(&run.records);
    if !aggregation.excluded.is_empty() {
        tracing::warn!(
            "{} transfer(s) with unknown decimals are listed in the ledger but left out of balances",
            aggregation.excluded.len()
        );
    }

    // Price the balances
    let keys: Vec<_> = aggregation.balances.keys().cloned().collect();
    let source = Arc::new(CoinGeckoSource::new(client, config.price.clone()));
    let resolver = PriceResolver::new(source, config.retry, &config.price.fiat_currency, config.price.batch_size);
    let mut cache = PriceCache::new();
    let prices = resolver.resolve(&mut cache, &keys).await;

    let unresolved = prices
        .values()
        .filter(|p| p.is_none())
        .count();
    if unresolved > 0 {
        tracing::warn!("{} token(s) have no {} price; their value is left blank", unresolved, resolver.fiat());
    }

    let mut balances = aggregation.balances;
    apply_prices(&mut balances, &prices);
    let balances: Vec<_> = balances.into_values().collect();

    // Write reports
    let exporter = ReportExporter::from_config(&config);
    let paths = exporter.export(&run.records, &balances).context("Failed to write reports")?;

    tracing::info!(
        "Done: {} and {}",
        paths.transactions.display(),
        paths.balances.display()
    );

    Ok(())
}
