use anyhow::Result;
use evm_tx_runner::chains::ChainRegistry;
use evm_tx_runner::config::EngineConfig;
use evm_tx_runner::Wallet;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let private_key = match args.get(1) {
        Some(key) => key.clone(),
        None => std::env::var("PRIVATE_KEY").map_err(|_| {
            anyhow::anyhow!("Usage: {} <PRIVATE_KEY> [CHAIN] (or set PRIVATE_KEY)", args[0])
        })?,
    };
    let chain = args.get(2).map(String::as_str).unwrap_or("ethereum");

    let registry = ChainRegistry::from_config(&EngineConfig::default());
    let profile = registry.get(chain)?;
    let wallet = Wallet::from_private_key(&private_key, profile.clone(), "")?;

    println!("✅ Address: 0x{}", hex::encode(wallet.address().as_slice()));
    println!(
        "🔍 Explorer: {}/address/{}",
        profile.explorer_url.trim_end_matches('/'),
        wallet.address()
    );

    Ok(())
}
