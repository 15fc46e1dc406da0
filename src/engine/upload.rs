use crate::model::ScanEvent;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use tokio::sync::mpsc;

/// Chunk size for the streamed request body (64 KB)
pub(crate) const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Integer upload percentage, `round(sent * 100 / total)` clamped to [0, 100].
/// An empty body counts as fully sent.
pub fn upload_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = ((sent as f64) * 100.0 / (total as f64)).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Split `data` into a body stream that reports progress as chunks are handed
/// to the HTTP client.
///
/// Bytes are counted as they are *produced* for reqwest, which closely tracks
/// bytes put on the wire. A progress event is sent only when the integer
/// percentage changes, so the emitted sequence is strictly increasing.
pub(crate) fn progress_body_stream(
    data: Bytes,
    generation: u64,
    event_tx: mpsc::UnboundedSender<ScanEvent>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = data.len() as u64;
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
        .collect();

    let mut sent = 0u64;
    let mut last_percent: Option<u8> = None;
    stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        let percent = upload_percent(sent, total);
        if last_percent.map_or(true, |last| percent > last) {
            last_percent = Some(percent);
            let _ = event_tx.send(ScanEvent::Progress {
                generation,
                percent,
            });
        }
        Ok(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(upload_percent(0, 200), 0);
        assert_eq!(upload_percent(1, 200), 1); // 0.5 rounds up
        assert_eq!(upload_percent(199, 200), 100);
        assert_eq!(upload_percent(50, 200), 25);
        assert_eq!(upload_percent(500, 200), 100);
        assert_eq!(upload_percent(0, 0), 100);
    }

    #[tokio::test]
    async fn stream_reports_non_decreasing_progress_ending_at_100() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let data = Bytes::from(vec![7u8; UPLOAD_CHUNK_SIZE * 3 + 123]);
        let chunks: Vec<_> = progress_body_stream(data.clone(), 4, tx).collect().await;

        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(body.len(), data.len());

        let mut seen = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            match ev {
                ScanEvent::Progress {
                    generation,
                    percent,
                } => {
                    assert_eq!(generation, 4);
                    seen.push(percent);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        // The third chunk already rounds to 100; the trailing 123 bytes add nothing.
        assert_eq!(seen, vec![33, 67, 100]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_body_produces_no_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let chunks: Vec<_> = progress_body_stream(Bytes::new(), 1, tx).collect().await;
        assert!(chunks.is_empty());
        assert!(rx.try_recv().is_err());
    }
}
