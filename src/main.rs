#[tokio::main]
async fn main() {
    gitdrop::cli::main().await;
}
