//! One sync pass: chunk, compare against the baseline, upload, persist.

use std::sync::Arc;

use chunksync_baseline::BaselineStore;
use chunksync_chunker::{Chunk, chunk_file_cancellable, chunk_file_parallel};
use chunksync_http::HttpTransport;
use chunksync_sync::{SyncEngine, SyncEvent};
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Runs a single pass for `config.source`.
///
/// The baseline is written back even when the upload phase fails, so
/// chunks that made it through are not uploaded again next time. A sync
/// failure takes precedence over a failure to save the baseline.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let baseline_path = config.baseline_path();
    let baseline = Arc::new(chunksync_baseline::load_or_default(&baseline_path)?);
    tracing::info!(
        path = %baseline_path.display(),
        records = baseline.len(),
        "baseline ready"
    );

    let transport = Arc::new(HttpTransport::new(&config.endpoint)?);
    let mut engine = SyncEngine::new(transport, config.sync());
    let cancel = engine.cancel_token();

    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, cancelling sync");
            signal.cancel();
        }
    });

    if let Some(mut events) = engine.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&event);
            }
        });
    }

    let chunks = chunk_source(&config, cancel.child_token()).await?;
    tracing::info!(chunks = chunks.len(), "source chunked");

    let store: Arc<dyn BaselineStore> = baseline.clone();
    let result = engine.synchronize(chunks, store).await;

    let saved = chunksync_baseline::save(&baseline_path, baseline.as_ref());
    let report = match (result, saved) {
        (Ok(report), saved) => {
            saved?;
            report
        }
        (Err(e), Ok(())) => return Err(e.into()),
        (Err(e), Err(save_err)) => {
            tracing::error!(error = %save_err, "could not save baseline after failed sync");
            return Err(e.into());
        }
    };
    for id in &report.stale {
        tracing::warn!(id = %id, "baseline entry has no matching chunk");
    }
    tracing::info!(
        uploaded = report.uploaded.len(),
        skipped = report.skipped,
        stale = report.stale.len(),
        "sync complete"
    );
    Ok(())
}

async fn chunk_source(config: &Config, cancel: CancellationToken) -> anyhow::Result<Vec<Chunk>> {
    if config.parallel {
        return Ok(chunk_file_parallel(&config.source, &config.chunker(), cancel).await?);
    }

    let source = config.source.clone();
    let chunk_size = config.chunk_size;
    let chunks =
        tokio::task::spawn_blocking(move || chunk_file_cancellable(&source, chunk_size, &cancel))
            .await??;
    Ok(chunks)
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::Uploaded { id, index } => tracing::debug!(%id, index, "uploaded"),
        SyncEvent::Skipped { id, index } => tracing::trace!(%id, index, "unchanged"),
        SyncEvent::Failed { id, error } => tracing::error!(%id, %error, "upload failed"),
        SyncEvent::Completed { uploaded, skipped } => {
            tracing::debug!(uploaded, skipped, "all chunks processed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chunksync_chunker::ChunkError;
    use chunksync_sync::{SyncError, TransportError};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts requests forever, answering `200 OK` and counting them.
    async fn counting_server() -> (String, Arc<AtomicUsize>) {
        upload_server(None).await
    }

    /// Like [`counting_server`], but answers `500` for the chunk at `reject`.
    /// Only accepted uploads are counted.
    async fn upload_server(reject: Option<usize>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut tmp = [0u8; 4096];
                    let index = loop {
                        let n = stream.read(&mut tmp).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&tmp[..n]);
                        if let Some(index) = complete_request(&buf) {
                            break index;
                        }
                    };

                    let reply: &[u8] = if reject.is_some() && index == reject {
                        b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    } else {
                        counter.fetch_add(1, Ordering::SeqCst);
                        b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    };
                    let _ = stream.write_all(reply).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("http://{addr}/upload"), hits)
    }

    /// Returns the request's chunk index header once head and body are in.
    fn complete_request(buf: &[u8]) -> Option<Option<usize>> {
        let pos = buf.windows(4).position(|w| w == b"\r\n\r\n")?;
        let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
        let header = |name: &str| {
            head.lines()
                .find_map(|l| l.strip_prefix(name))
                .and_then(|v| v.trim().parse::<usize>().ok())
        };
        let len = header("content-length:").unwrap_or(0);
        (buf.len() >= pos + 4 + len).then(|| header("x-chunk-index:"))
    }

    fn config(dir: &Path, endpoint: String, parallel: bool) -> Config {
        Config {
            source: dir.join("data.bin"),
            endpoint,
            baseline: None,
            chunk_size: 4,
            workers: 3,
            parallel,
        }
    }

    fn closed_endpoint() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/upload")
    }

    #[tokio::test]
    async fn second_run_uploads_only_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let (url, hits) = counting_server().await;
        let cfg = config(tmp.path(), url, true);
        std::fs::write(&cfg.source, b"0123456789").unwrap();

        run(cfg.clone()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(cfg.baseline_path().exists());

        run(cfg.clone()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        std::fs::write(&cfg.source, b"01234567XY").unwrap();
        run(cfg.clone()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 4);

        let saved = chunksync_baseline::load(&cfg.baseline_path()).unwrap();
        assert_eq!(saved.len(), 3);
    }

    #[tokio::test]
    async fn sequential_chunking_gives_same_result() {
        let tmp = tempfile::tempdir().unwrap();
        let (url, hits) = counting_server().await;
        let cfg = config(tmp.path(), url, false);
        std::fs::write(&cfg.source, b"abcdefgh").unwrap();

        run(cfg.clone()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let parallel = Config {
            parallel: true,
            ..cfg
        };
        run(parallel).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_upload_keeps_partial_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let (url, accepted) = upload_server(Some(1)).await;
        // One worker: chunk 0 lands, chunk 1 is rejected, chunk 2 is never tried.
        let cfg = Config {
            workers: 1,
            ..config(tmp.path(), url, true)
        };
        std::fs::write(&cfg.source, b"0123456789").unwrap();

        let err = run(cfg.clone()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Transport(TransportError::Rejected(_)))
        ));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        let saved = chunksync_baseline::load(&cfg.baseline_path()).unwrap();
        let ids: Vec<String> = saved.entries().into_keys().collect();
        assert_eq!(ids, vec![chunksync_chunker::chunk_id(&cfg.source, 0)]);

        // A healthy re-run uploads only what is left.
        let (url, accepted) = counting_server().await;
        let retry = Config {
            endpoint: url,
            ..cfg.clone()
        };
        run(retry).await.unwrap();
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(chunksync_baseline::load(&cfg.baseline_path()).unwrap().len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sync_error_wins_over_save_error() {
        let tmp = tempfile::tempdir().unwrap();
        // Loads as missing, but its parent directory cannot be created.
        let dangling = tmp.path().join("dangling");
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), &dangling).unwrap();

        let cfg = Config {
            baseline: Some(dangling.join("baseline.json")),
            ..config(tmp.path(), closed_endpoint(), true)
        };
        std::fs::write(&cfg.source, b"0123456789").unwrap();

        let err = run(cfg).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Transport(TransportError::Unavailable(_)))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn save_error_surfaces_after_successful_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let dangling = tmp.path().join("dangling");
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), &dangling).unwrap();

        let (url, _) = counting_server().await;
        let cfg = Config {
            baseline: Some(dangling.join("baseline.json")),
            ..config(tmp.path(), url, true)
        };
        std::fs::write(&cfg.source, b"0123456789").unwrap();

        let err = run(cfg).await.unwrap_err();
        assert!(err.downcast_ref::<chunksync_baseline::BaselineError>().is_some());
    }

    #[tokio::test]
    async fn cancelled_sequential_chunking_stops() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), closed_endpoint(), false);
        std::fs::write(&cfg.source, b"0123456789").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = chunk_source(&cfg, cancel).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChunkError>(),
            Some(ChunkError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn missing_source_fails_without_touching_baseline() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), "http://127.0.0.1:9/upload".into(), true);

        assert!(run(cfg.clone()).await.is_err());
        assert!(!cfg.baseline_path().exists());
    }
}
