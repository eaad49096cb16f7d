#[tokio::main]
async fn main() -> std::io::Result<()> {
    blueprint_server::run_with_config().await
}
