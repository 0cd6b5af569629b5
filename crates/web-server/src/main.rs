// Entry point for `cargo run -p web-server`: serves against PostgreSQL using
// `config.toml` and the environment.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = configuration::load_config()?;
    let _guard = configuration::init_tracing(&settings.logging)?;
    web_server::serve_postgres(&settings).await
}
