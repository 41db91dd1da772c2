//! Render one frame of a request to PNG.

use std::path::PathBuf;
use std::sync::Arc;

use slidecast_assets::{AssetResolver, HttpFetcher};
use slidecast_common::config::AppConfig;
use slidecast_frame_synth::FrameSynthesizer;
use slidecast_timeline_model::timeline::TimelineBuilder;

pub async fn run(config: &AppConfig, source: &str, at: f64, output: PathBuf) -> anyhow::Result<()> {
    let request = super::read_request(source)?;
    request.validate()?;

    let resolver = AssetResolver::new(Arc::new(HttpFetcher::new(&config.assets)));
    let images = resolver.resolve(&request.images).await?;
    let audio = match &request.audio {
        Some(url) => Some(resolver.resolve_one(url).await?),
        None => None,
    };
    let timeline = TimelineBuilder::new().build(&request, &images, audio.as_ref())?;

    let synth = FrameSynthesizer::from_config(&config.text)?;
    let frame = synth.synthesize(&timeline, at);
    frame
        .save(&output)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", output.display()))?;

    let (clip, progress) = timeline.active_clip(at);
    println!(
        "Frame at {at:.3}s (clip {}, progress {:.2}) written to {}",
        clip.index,
        progress,
        output.display()
    );
    Ok(())
}
