#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storage_service::server::run().await
}
