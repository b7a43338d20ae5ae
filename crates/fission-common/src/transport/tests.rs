use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::frame::*;
use crate::protocol::{CallContext, Direction, FissionError, Packet};

fn sample_packet(id: &str) -> Packet {
    Packet::new(
        id,
        Direction::Request,
        "pkg.Svc.M",
        CallContext::default(),
        serde_json::to_vec(&serde_json::json!({"n": 7})).unwrap(),
        None,
    )
}

#[tokio::test]
async fn test_frame_round_trip() {
    let (mut a, mut b) = tokio::io::duplex(4096);
    let packet = sample_packet("id-1");

    write_frame(&mut a, &packet).await.unwrap();
    let decoded = read_frame(&mut b).await.unwrap().unwrap();
    assert_eq!(decoded, packet);
}

#[tokio::test]
async fn test_frames_preserve_send_order() {
    let (mut a, mut b) = tokio::io::duplex(4096);
    for i in 0..10 {
        write_frame(&mut a, &sample_packet(&format!("id-{i}"))).await.unwrap();
    }
    drop(a);

    for i in 0..10 {
        let packet = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(packet.id, format!("id-{i}"));
    }
    assert!(read_frame(&mut b).await.unwrap().is_none());
}

#[tokio::test]
async fn test_clean_eof_is_none() {
    let (a, mut b) = tokio::io::duplex(64);
    drop(a);
    assert!(read_frame(&mut b).await.unwrap().is_none());
}

#[tokio::test]
async fn test_truncated_header_is_error() {
    let (mut a, mut b) = tokio::io::duplex(64);
    a.write_all(&[0, 0]).await.unwrap();
    drop(a);

    match read_frame(&mut b).await {
        Err(FissionError::Transport(msg)) => assert!(msg.contains("header")),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_truncated_body_is_error() {
    let (mut a, mut b) = tokio::io::duplex(4096);
    let frame = encode_packet(&sample_packet("id-1")).unwrap();
    a.write_all(&frame[..frame.len() - 3]).await.unwrap();
    drop(a);

    match read_frame(&mut b).await {
        Err(FissionError::Transport(msg)) => assert!(msg.contains("truncated")),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_oversized_length_rejected() {
    let (mut a, mut b) = tokio::io::duplex(64);
    let len = (MAX_FRAME_SIZE as u32) + 1;
    a.write_all(&len.to_be_bytes()).await.unwrap();

    match read_frame(&mut b).await {
        Err(FissionError::FrameTooLarge { .. }) => {}
        other => panic!("expected frame-too-large, got {other:?}"),
    }
}

/// Concurrent writers through one lock must decode as whole frames.
#[tokio::test]
async fn test_concurrent_writers_do_not_tear_frames() {
    const WRITERS: usize = 8;
    const FRAMES_PER_WRITER: usize = 25;

    let (a, mut b) = tokio::io::duplex(64 * 1024);
    let writer = Arc::new(Mutex::new(a));

    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let writer = writer.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..FRAMES_PER_WRITER {
                let packet = sample_packet(&format!("w{w}-f{i}"));
                write_frame_locked(&writer, &packet).await.unwrap();
            }
        }));
    }

    let reader = tokio::spawn(async move {
        let mut ids = Vec::new();
        for _ in 0..WRITERS * FRAMES_PER_WRITER {
            let packet = read_frame(&mut b).await.unwrap().unwrap();
            ids.push(packet.id);
        }
        ids
    });

    for handle in handles {
        handle.await.unwrap();
    }
    drop(writer);

    let mut ids = reader.await.unwrap();
    assert_eq!(ids.len(), WRITERS * FRAMES_PER_WRITER);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), WRITERS * FRAMES_PER_WRITER, "duplicate or torn frame ids");
}
