use mock_testrail::{Db, MockConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let mut config = MockConfig::default();
    if let Ok(username) = std::env::var("TESTRAIL_USERNAME") {
        config.username = username;
    }
    if let Ok(password) = std::env::var("TESTRAIL_PASSWORD") {
        config.password = password;
    }

    let listener = TcpListener::bind(&addr).await?;
    info!("mock TestRail listening on http://{addr} as {}", config.username);
    mock_testrail::run(listener, config, Db::default()).await
}
