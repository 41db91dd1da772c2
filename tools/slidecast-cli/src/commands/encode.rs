//! Encode a request end to end.

use slidecast_common::config::AppConfig;
use slidecast_render_engine::{CancelSignal, Pipeline, ProgressReporter};
use slidecast_timeline_model::result::EncodeResponse;

pub async fn run(config: &AppConfig, source: &str, pretty: bool) -> anyhow::Result<()> {
    let outcome = match super::read_request(source) {
        Ok(request) => {
            let pipeline = Pipeline::from_config(config)?;
            let (progress, mut events) = ProgressReporter::channel(64);
            let (cancel, signal) = CancelSignal::new();

            let watcher = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    eprint!("\r  {:?}: {:.1}%   ", event.phase, event.percent);
                }
                eprintln!();
            });
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let result = pipeline.run_with(&request, progress, signal).await;
            ctrl_c.abort();
            let _ = watcher.await;
            result
        }
        Err(e) => Err(slidecast_common::error::SlidecastError::validation(e.to_string())),
    };

    let response = EncodeResponse::from_result(&outcome);
    let body = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{body}");

    if response.is_ok() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "encode failed with status {}",
            response.http_status()
        ))
    }
}
