//! Resolving `file://` assets end to end into a request workspace.

use std::sync::Arc;

use slidecast_assets::{AssetResolver, HttpFetcher, RequestWorkspace};
use slidecast_common::config::AssetConfig;

#[tokio::test]
async fn resolves_local_files_and_materializes_them() {
    let source = tempfile::tempdir().unwrap();
    let mut urls = Vec::new();
    for i in 0..3 {
        let path = source.path().join(format!("slide-{i}.png"));
        std::fs::write(&path, vec![i as u8; 10 + i]).unwrap();
        urls.push(url::Url::from_file_path(&path).unwrap().to_string());
    }

    let resolver = AssetResolver::new(Arc::new(HttpFetcher::new(&AssetConfig::default())));
    let mut buffers = resolver.resolve(&urls).await.unwrap();
    assert_eq!(buffers.len(), 3);

    let workspace = RequestWorkspace::new().unwrap();
    let paths = workspace.materialize_all(&mut buffers, "image").unwrap();
    for (i, path) in paths.iter().enumerate() {
        assert!(path.starts_with(workspace.path()));
        assert_eq!(std::fs::read(path).unwrap().len(), 10 + i);
    }

    let root = workspace.path().to_path_buf();
    drop(workspace);
    assert!(!root.exists());
}

#[tokio::test]
async fn missing_local_file_fails_the_batch() {
    let source = tempfile::tempdir().unwrap();
    let present = source.path().join("present.png");
    std::fs::write(&present, b"ok").unwrap();
    let urls = vec![
        url::Url::from_file_path(&present).unwrap().to_string(),
        url::Url::from_file_path(source.path().join("absent.png"))
            .unwrap()
            .to_string(),
    ];

    let resolver = AssetResolver::new(Arc::new(HttpFetcher::new(&AssetConfig::default())));
    let err = resolver.resolve(&urls).await.unwrap_err();
    assert_eq!(err.kind(), "asset_fetch");
}
