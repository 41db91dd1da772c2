//! Validate an encode request.

use slidecast_common::clock::FrameClock;

pub fn run(source: &str) -> anyhow::Result<()> {
    let request = super::read_request(source)?;
    request.validate()?;

    let total = request.total_duration();
    println!("Request is valid.");
    println!("  Images: {}", request.images.len());
    println!("  Resolution: {}x{}", request.width, request.height);
    println!(
        "  Duration: {total:.2}s ({} x {:.2}s)",
        request.images.len(),
        request.duration_per_image
    );
    println!(
        "  Frames: {} @ {} fps",
        FrameClock::new(request.fps).frame_count(total),
        request.fps
    );
    println!("  Audio: {}", request.audio.as_deref().unwrap_or("none"));
    if let Some(title) = &request.title {
        println!("  Title: {title}");
    }
    Ok(())
}
