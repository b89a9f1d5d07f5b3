#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scylla_sql_metadata::mcp::run_stdio_server().await
}
