use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use gas_saver::{
    client::submitter::{RecommendedFees, TransactionSubmitter},
    models::{AnalysisResult, ApiResponse, CandidateTransaction},
};
use reqwest::Client;
use serde_json::json;
use std::str::FromStr;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let base_url = std::env::var("GAS_SAVER_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let network = std::env::var("SUBMIT_NETWORK").unwrap_or_else(|_| "ethereum".to_string());
    let rpc_url = std::env::var("SUBMIT_RPC_URL").context("SUBMIT_RPC_URL is required")?;
    let private_key = std::env::var("SUBMIT_PRIVATE_KEY").context("SUBMIT_PRIVATE_KEY is required")?;
    let chain_id: u64 = std::env::var("SUBMIT_CHAIN_ID")
        .unwrap_or_else(|_| "1".to_string())
        .parse()
        .context("Invalid SUBMIT_CHAIN_ID")?;
    let recipient = Address::from_str(
        &std::env::var("RECIPIENT_ADDRESS").context("RECIPIENT_ADDRESS is required")?,
    )?;
    let amount = std::env::var("AMOUNT").context("AMOUNT is required")?;
    let token = std::env::var("TOKEN_ADDRESS")
        .ok()
        .map(|raw| Address::from_str(&raw))
        .transpose()
        .context("Invalid TOKEN_ADDRESS")?;

    println!("gas-saver submit");
    println!("================");
    println!("Server:    {}", base_url);
    println!("Network:   {}", network);
    println!("Recipient: {:?}", recipient);
    println!();

    let submitter = TransactionSubmitter::new(&rpc_url, &private_key, chain_id)?;

    // Native transfers carry their value; token transfers are analyzed as calls to the token.
    let value = match token {
        Some(_) => U256::zero(),
        None => parse_ether(amount.trim()).context("Invalid AMOUNT")?,
    };
    let mut candidate = CandidateTransaction::transfer(token.unwrap_or(recipient), value, &network);
    candidate.from = Some(submitter.address());

    println!("Step 1: Analyzing gas conditions...");
    let analysis = analyze(&base_url, &network, &candidate).await?;
    for suggestion in &analysis.suggestions {
        println!("   - {}", suggestion.message());
    }
    if analysis.defaults.any() {
        println!("   (some inputs were defaulted: {:?})", analysis.defaults);
    }

    let fees = RecommendedFees::from_analysis(&analysis);
    println!("   [OK] Using {:?}", fees);
    println!();

    println!("Step 2: Submitting transaction...");
    let receipt = match token {
        Some(token) => {
            submitter
                .submit_stablecoin(token, recipient, &amount, &fees)
                .await?
        }
        None => submitter.submit_native(recipient, value, &fees).await?,
    };

    println!("   [OK] Confirmed: {:?}", receipt.transaction_hash);
    if let Some(gas_used) = receipt.gas_used {
        println!("   Gas used: {}", gas_used);
    }

    Ok(())
}

async fn analyze(
    base_url: &str,
    network: &str,
    transaction: &CandidateTransaction,
) -> Result<AnalysisResult> {
    let response = Client::new()
        .post(format!("{}/api/gas/analyze", base_url))
        .json(&json!({ "network": network, "transaction": transaction }))
        .send()
        .await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        anyhow::bail!("Analysis failed: {}", error_text);
    }

    let body: ApiResponse<AnalysisResult> = response.json().await?;
    Ok(body.data)
}
