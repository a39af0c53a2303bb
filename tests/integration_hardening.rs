//! Concurrency and failure-path tests.

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use sfup_core::TransferError;
use sfup_crypto::TicketKey;
use sfup_integration_tests::{BASE_URL, Harness, alice_config, key_from_url};

#[tokio::test]
async fn test_concurrent_downloads_single_winner() {
    let h = Harness::sqlite(alice_config()).await;
    let id = h.reserve().await;
    let receipt = h.upload(id, "race.bin", &[42u8; 64 * 1024]).await.unwrap();
    let key = key_from_url(&receipt.download_url);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            let mut sink = Vec::new();
            engine.download(id, &key, &mut sink).await.map(|_| sink)
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(body) => {
                winners += 1;
                assert_eq!(body.len(), 64 * 1024);
            }
            Err(TransferError::InvalidOrConsumed) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(winners, 1);
    assert!(!h.blob_path(id).exists());
}

#[tokio::test]
async fn test_concurrent_uploads_single_winner() {
    let h = Harness::sqlite(alice_config()).await;
    let id = h.reserve().await;

    let mut tasks = Vec::new();
    for n in 0..6u8 {
        let engine = h.engine.clone();
        tasks.push(tokio::spawn(async move {
            let body = stream::iter(vec![Ok::<_, std::convert::Infallible>(Bytes::from(
                vec![n; 1024],
            ))]);
            engine
                .upload(id, &format!("upload-{n}.bin"), body, BASE_URL)
                .await
        }));
    }

    let mut receipts = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => receipts.push(receipt),
            Err(TransferError::InvalidOrConsumed) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(receipts.len(), 1);

    let (report, body) = h
        .download(id, &key_from_url(&receipts[0].download_url))
        .await
        .unwrap();
    let n = body[0];
    assert!(body.iter().all(|&b| b == n));
    assert_eq!(report.filename, format!("upload-{n}.bin"));
}

#[tokio::test]
async fn test_concurrent_reservations_distinct() {
    let h = Harness::sqlite(alice_config()).await;

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let engine = h.engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.reserve("alice@example.com", BASE_URL).await
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        assert!(ids.insert(task.await.unwrap().unwrap()));
    }
    assert_eq!(h.notifier.sent().len(), 32);
}

#[tokio::test]
async fn test_key_guessing_does_not_consume() {
    let h = Harness::sqlite(alice_config()).await;
    let id = h.reserve().await;
    let receipt = h.upload(id, "vault.txt", b"guarded").await.unwrap();

    for _ in 0..20 {
        let guess = TicketKey::generate().unwrap();
        assert!(matches!(
            h.download(id, &guess).await,
            Err(TransferError::AuthenticationFailed)
        ));
    }

    let (_, body) = h
        .download(id, &key_from_url(&receipt.download_url))
        .await
        .unwrap();
    assert_eq!(body, b"guarded");
}

#[tokio::test]
async fn test_aborted_body_rolls_back() {
    let h = Harness::sqlite(alice_config()).await;
    let id = h.reserve().await;

    let body = stream::iter(vec![
        Ok(Bytes::from_static(b"first part of the body")),
        Err("connection reset by peer".to_string()),
    ]);
    let result = h.engine.upload(id, "partial.bin", body, BASE_URL).await;

    assert!(matches!(result, Err(TransferError::BodyAborted(_))));
    assert!(!h.blob_path(id).exists());
    assert!(matches!(
        h.upload(id, "retry.bin", b"again").await,
        Err(TransferError::InvalidOrConsumed)
    ));
}

#[tokio::test]
async fn test_abandoned_download_still_consumes() {
    let h = Harness::sqlite(alice_config()).await;
    let id = h.reserve().await;
    let receipt = h.upload(id, "abandon.bin", &[1u8; 2048]).await.unwrap();
    let key = key_from_url(&receipt.download_url);

    let pending = h.engine.open_download(id, &key).await.unwrap();
    assert_eq!(pending.filename(), "abandon.bin");
    drop(pending);

    let path = h.blob_path(id);
    for _ in 0..100 {
        if !path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!path.exists());
    assert!(matches!(
        h.download(id, &key).await,
        Err(TransferError::InvalidOrConsumed)
    ));
}

#[tokio::test]
async fn test_memory_store_lifecycle() {
    let h = Harness::memory(alice_config()).await;
    let id = h.reserve().await;
    let receipt = h.upload(id, "mem.txt", b"in memory").await.unwrap();

    let (report, body) = h
        .download(id, &key_from_url(&receipt.download_url))
        .await
        .unwrap();
    assert_eq!(report.filename, "mem.txt");
    assert_eq!(body, b"in memory");
}
