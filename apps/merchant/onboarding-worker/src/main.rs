//! Onboarding worker entry point.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    merchant_onboarding_worker::run().await
}
