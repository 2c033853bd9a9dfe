use std::time::Duration;

use crpt_api::ApiClient;
use crpt_api::ApiError;
use crpt_api::ClientConfig;
use crpt_api::Description;
use crpt_api::LpIntroduceGoods;
use crpt_api::Product;
use quota_window::TimeUnit;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 1. Configure: 5 requests per second against the API
    let token = std::env::var("CRPT_TOKEN").unwrap_or_default();
    let mut config = ClientConfig::new(TimeUnit::Seconds, 5, token)
        .with_timeout(Duration::from_secs(10));
    if let Ok(endpoint) = std::env::var("CRPT_ENDPOINT") {
        config = config.with_endpoint(endpoint);
    }
    let client = ApiClient::new(config)?;

    // 2. Build a document
    let doc = LpIntroduceGoods {
        description: Some(Description::new("7700000000")),
        doc_id: Some("example-doc".to_string()),
        doc_type: Some("LP_INTRODUCE_GOODS".to_string()),
        import_request: Some(false),
        owner_inn: Some("7700000000".to_string()),
        participant_inn: Some("7700000000".to_string()),
        producer_inn: Some("7700000000".to_string()),
        production_date: Some("2024-01-01".to_string()),
        production_type: Some("OWN_PRODUCTION".to_string()),
        products: Some(vec![Product {
            tnved_code: Some("6401100000".to_string()),
            uit_code: Some("010463003407001221SxMGorvNuq6Wk91fgr92sdfsdfsdf".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    // 3. Fire 10 submissions; the second half waits for the window to slide
    let mut tasks = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        let doc = doc.clone();
        tasks.push(tokio::spawn(async move {
            match client.create_document(&doc, "signature").await {
                Ok(resp) => println!("[{i:02}] ✅ {} {}", resp.status, resp.body),
                Err(err @ ApiError::RequestFailed { .. }) => {
                    println!("[{i:02}] ❌ {err} (body: {:?})", err.raw_body())
                }
                Err(err) => println!("[{i:02}] 💥 {err}"),
            }
        }));
    }

    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}
