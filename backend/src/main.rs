#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stack::start_server().await
}
