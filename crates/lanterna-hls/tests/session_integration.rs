mod fixture;

use std::sync::Arc;
use std::time::Duration;

use fixture::TestCdn;
use lanterna_hls::{DownloadSession, SegmentReady, SessionOptions, parser};
use lanterna_net::{BandwidthMeter, HttpClient, Net};
use lanterna_storage::BlobStore;
use tokio::sync::mpsc::UnboundedReceiver;

const INIT: &[u8] = b"INIT-SECTION-BYTES";

fn seg_payload(i: usize) -> Vec<u8> {
    format!("segment-{i}-payload-data").into_bytes()
}

fn whole_file_playlist() -> &'static str {
    "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-MAP:URI=\"init.mp4\"
#EXTINF:4.0,
seg_0.m4s
#EXTINF:4.0,
seg_1.m4s
#EXTINF:4.0,
seg_2.m4s
#EXTINF:2.0,
seg_3.m4s
#EXT-X-ENDLIST
"
}

async fn whole_file_cdn() -> TestCdn {
    TestCdn::start(vec![
        ("init.mp4", INIT.to_vec()),
        ("seg_0.m4s", seg_payload(0)),
        ("seg_1.m4s", seg_payload(1)),
        ("seg_2.m4s", seg_payload(2)),
        ("seg_3.m4s", seg_payload(3)),
    ])
    .await
}

fn session(
    cdn: &TestCdn,
    body: &str,
    seek: f64,
    store: &BlobStore,
    options: SessionOptions,
) -> DownloadSession {
    let playlist = parser::parse_media(body.as_bytes()).unwrap();
    let net: Arc<dyn Net> = Arc::new(HttpClient::default());
    DownloadSession::new(
        &playlist,
        &cdn.url("media.m3u8"),
        seek,
        net,
        Arc::new(BandwidthMeter::new()),
        store.clone(),
        options,
    )
    .unwrap()
}

async fn collect(mut rx: UnboundedReceiver<SegmentReady>, n: usize) -> Vec<SegmentReady> {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while out.len() < n {
            match rx.recv().await {
                Some(ready) => out.push(ready),
                None => break,
            }
        }
    })
    .await
    .expect("segments did not complete in time");
    out
}

#[tokio::test]
async fn whole_file_session_assembles_segments_with_init_prefix() {
    let cdn = whole_file_cdn().await;
    let dir = tempfile::tempdir().unwrap();
    let store = BlobStore::with_root(dir.path());

    let session = session(&cdn, whole_file_playlist(), 0.0, &store, SessionOptions::default());
    let rx = session.take_completions().unwrap();
    session.start();

    let mut ready = collect(rx, 4).await;
    ready.sort_by_key(|r| r.index);

    for (i, r) in ready.iter().enumerate() {
        assert_eq!(r.index, i);
        let data = tokio::fs::read(&r.file_url).await.unwrap();
        // Every assembled blob begins with the shared init section.
        assert_eq!(&data[..INIT.len()], INIT);
        assert_eq!(&data[INIT.len()..], seg_payload(i).as_slice());
    }

    // One shared init section, fetched exactly once.
    assert_eq!(cdn.hits("init.mp4"), 1);
    assert_eq!(cdn.hits("seg_0.m4s"), 1);
}

#[tokio::test]
async fn seek_skips_leading_segments_and_keeps_offsets() {
    let cdn = whole_file_cdn().await;
    let dir = tempfile::tempdir().unwrap();
    let store = BlobStore::with_root(dir.path());

    let session = session(&cdn, whole_file_playlist(), 5.0, &store, SessionOptions::default());
    assert_eq!(session.skip_count(), 1);
    assert_eq!(session.presentation_offset(1), 4.0);

    let rx = session.take_completions().unwrap();
    session.start();

    let mut ready = collect(rx, 3).await;
    ready.sort_by_key(|r| r.index);

    assert_eq!(
        ready.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(ready[0].presentation_offset, 4.0);
    assert_eq!(ready[1].presentation_offset, 8.0);
    assert_eq!(ready[2].presentation_offset, 12.0);
    assert_eq!(ready[2].duration, 2.0);

    // The skipped segment was never requested.
    assert_eq!(cdn.hits("seg_0.m4s"), 0);
}

#[tokio::test]
async fn completions_fire_at_most_once_per_chunk() {
    let cdn = whole_file_cdn().await;
    let dir = tempfile::tempdir().unwrap();
    let store = BlobStore::with_root(dir.path());

    let session = session(&cdn, whole_file_playlist(), 0.0, &store, SessionOptions::default());
    let mut rx = session.take_completions().unwrap();
    session.start();

    let ready = collect_all(&mut rx, Duration::from_secs(3)).await;
    let mut indexes: Vec<usize> = ready.iter().map(|r| r.index).collect();
    indexes.sort_unstable();
    indexes.dedup();
    assert_eq!(indexes.len(), ready.len(), "duplicate completion detected");
    assert_eq!(ready.len(), 4);
}

async fn collect_all(rx: &mut UnboundedReceiver<SegmentReady>, window: Duration) -> Vec<SegmentReady> {
    let mut out = Vec::new();
    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(ready)) => out.push(ready),
            _ => break,
        }
    }
    out
}

#[tokio::test]
async fn ranged_streaming_shares_one_fetcher_per_url() {
    let mut media_file = Vec::new();
    media_file.extend_from_slice(INIT); // bytes [0, 18)
    media_file.extend_from_slice(&seg_payload(0)); // 22 bytes
    media_file.extend_from_slice(&seg_payload(1)); // 22 bytes

    let init_len = INIT.len();
    let seg_len = seg_payload(0).len();
    let body = format!(
        "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-MAP:URI=\"all.bin\",BYTERANGE=\"{init_len}@0\"
#EXTINF:4.0,
#EXT-X-BYTERANGE:{seg_len}@{init_len}
all.bin
#EXTINF:4.0,
#EXT-X-BYTERANGE:{seg_len}
all.bin
#EXT-X-ENDLIST
"
    );

    let cdn = TestCdn::start(vec![("all.bin", media_file)]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = BlobStore::with_root(dir.path());

    let options = SessionOptions {
        use_ranged_streaming: true,
        ..Default::default()
    };
    let session = session(&cdn, &body, 0.0, &store, options);
    let rx = session.take_completions().unwrap();
    session.start();

    let mut ready = collect(rx, 2).await;
    ready.sort_by_key(|r| r.index);

    let blob0 = tokio::fs::read(&ready[0].file_url).await.unwrap();
    let blob1 = tokio::fs::read(&ready[1].file_url).await.unwrap();
    assert_eq!(&blob0[..init_len], INIT);
    assert_eq!(&blob0[init_len..], seg_payload(0).as_slice());
    assert_eq!(&blob1[..init_len], INIT);
    assert_eq!(&blob1[init_len..], seg_payload(1).as_slice());

    // Init section + both segments travelled over a single connection.
    assert_eq!(cdn.hits("all.bin"), 1);
}

#[tokio::test]
async fn purge_forces_full_refetch() {
    let cdn = whole_file_cdn().await;
    let dir = tempfile::tempdir().unwrap();
    let store = BlobStore::with_root(dir.path());

    let first = session(&cdn, whole_file_playlist(), 0.0, &store, SessionOptions::default());
    let rx = first.take_completions().unwrap();
    first.start();
    collect(rx, 4).await;
    assert_eq!(cdn.hits("seg_0.m4s"), 1);

    // Same playlist again: everything is served from the blob store.
    let second = session(&cdn, whole_file_playlist(), 0.0, &store, SessionOptions::default());
    let rx = second.take_completions().unwrap();
    second.start();
    let cached = collect(rx, 4).await;
    assert_eq!(cached.len(), 4);
    assert_eq!(cdn.hits("seg_0.m4s"), 1, "cached run must not refetch");

    // After purge the same request hits the network again.
    store.purge().await;
    let third = session(&cdn, whole_file_playlist(), 0.0, &store, SessionOptions::default());
    let rx = third.take_completions().unwrap();
    third.start();
    collect(rx, 4).await;
    assert_eq!(cdn.hits("seg_0.m4s"), 2);
    assert_eq!(cdn.hits("init.mp4"), 2);
}
