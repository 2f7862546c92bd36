mod handlers;
mod models;
mod server;
mod services;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenv::dotenv;

use handlers::{AnalysisHandler, SweeperService};
use services::validation::MAX_IMAGE_BYTES_DEFAULT;
use services::vision::OpenAiVisionClient;
use services::{RateLimiter, VisionEstimator};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Load environment variables
    dotenv().ok();

    log::info!("🚀 Starting Food Calorie Scanner API...");

    // Load configuration
    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        log::warn!("⚠️ OPENAI_API_KEY is not set, analyze requests will be refused");
        String::new()
    });

    let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

    let base_url =
        env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect();
    if allowed_origins.is_empty() {
        log::warn!("⚠️ ALLOWED_ORIGINS not set, accepting requests from any origin (INSECURE!)");
    }

    let max_requests: u32 = parse_env("RATE_LIMIT_MAX_REQUESTS", 10);
    let window_secs: u64 = parse_env("RATE_LIMIT_WINDOW_SECS", 60);
    let max_image_bytes: usize = parse_env("MAX_IMAGE_BYTES", MAX_IMAGE_BYTES_DEFAULT);

    // Initialize rate limiter
    let limiter = Arc::new(RateLimiter::with_window(
        max_requests,
        Duration::from_secs(window_secs),
    ));
    log::info!(
        "✅ Rate limiter initialized ({} requests per {}s window)",
        max_requests,
        window_secs
    );

    let estimator =
        Arc::new(OpenAiVisionClient::new(api_key, model, base_url)) as Arc<dyn VisionEstimator>;
    log::info!(
        "✅ Vision estimator initialized with model: {}",
        estimator.model_name()
    );

    // Initialize analysis handler
    let analysis = Arc::new(AnalysisHandler::new(
        limiter.clone(),
        estimator,
        allowed_origins.clone(),
        max_image_bytes,
    ));
    log::info!("✅ Analysis handler initialized");

    // Initialize and start rate-limit sweeper
    let mut sweeper = SweeperService::new(limiter).await?;
    sweeper.start().await?;

    // Start HTTP server
    let port: u16 = parse_env("PORT", 8080);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let app = server::create_router(analysis, &allowed_origins, max_image_bytes);

    log::info!("🌐 HTTP server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("❌ HTTP server stopped: {}", e);
        }
    });

    log::info!("🎉 Calorie scanner is ready!");

    println!("\n📸 Kalori tarayıcı API çalışıyor!");
    println!("🌐 Sunucu: http://localhost:{}", port);
    println!("\n💬 Analiz isteği gönderin:");
    println!("   POST /api/analyze  {{\"image\": \"data:image/jpeg;base64,...\"}}");
    println!("\n🛑 Durdurmak için Ctrl+C basın\n");

    // Keep running
    tokio::signal::ctrl_c().await?;

    log::info!("🛑 Shutting down...");
    sweeper.stop().await?;

    Ok(())
}

/// Reads a numeric setting from the environment, falling back to the default
/// when the variable is missing or unparseable.
fn parse_env<T: FromStr + Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!(
                    "⚠️ {} has an unparseable value '{}', using {}",
                    name,
                    raw,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}
