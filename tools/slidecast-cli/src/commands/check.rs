//! Check the configured backend.

use slidecast_common::config::{config_file_path, AppConfig, StorageConfig};
use slidecast_render_engine::process::command_exists;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Slidecast Check");
    println!("{}", "=".repeat(50));

    println!("  Config file: {}", config_file_path().display());
    println!("  Backend: {}", config.backend.as_str());

    let ffmpeg_ok = command_exists(&config.encoder.ffmpeg_bin);
    if ffmpeg_ok {
        println!("[OK] Encoder binary: {}", config.encoder.ffmpeg_bin);
    } else {
        println!("[WARN] Encoder binary not found: {}", config.encoder.ffmpeg_bin);
    }

    match &config.text.font_path {
        Some(path) if path.is_file() => println!("[OK] Overlay font: {}", path.display()),
        Some(path) => println!("[WARN] Overlay font missing: {}", path.display()),
        None => println!("[OK] Overlay font: built-in block glyphs"),
    }

    if config.remote.api_key.is_some() {
        println!("[OK] Render API key configured");
    } else {
        println!("[WARN] No render API key (SLIDECAST_RENDER_API_KEY)");
    }

    match &config.storage {
        StorageConfig::Local { root, .. } => {
            println!("[OK] Storage: local directory {}", root.display())
        }
        StorageConfig::Http { endpoint, .. } => println!("[OK] Storage: {endpoint}"),
    }

    let ready = match config.backend {
        slidecast_common::config::BackendKind::Remote => config.remote.api_key.is_some(),
        _ => ffmpeg_ok,
    };

    println!();
    if ready {
        println!("The {} backend is ready.", config.backend.as_str());
    } else {
        println!(
            "The {} backend cannot run yet. See above for fixes.",
            config.backend.as_str()
        );
    }
    Ok(())
}
