use mock_server::{MockConfig, MockState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = MockConfig::default();
    if let Ok(key) = std::env::var("MOOV_PUBLIC_KEY") {
        config.public_key = key;
    }
    if let Ok(key) = std::env::var("MOOV_SECRET_KEY") {
        config.secret_key = key;
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, public_key = %config.public_key, "mock moov api listening");
    mock_server::run(listener, MockState::new(config)).await
}
