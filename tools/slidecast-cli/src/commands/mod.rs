pub mod check;
pub mod encode;
pub mod frame;
pub mod validate;

use std::io::Read;

use slidecast_timeline_model::request::EncodingRequest;

/// Read and parse a request from a file, or stdin for `-`.
pub fn read_request(source: &str) -> anyhow::Result<EncodingRequest> {
    let body = if source == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        body
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| anyhow::anyhow!("Failed to read request {source}: {e}"))?
    };
    Ok(EncodingRequest::from_json(&body)?)
}
