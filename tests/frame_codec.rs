//! Framing over real byte streams

#![allow(clippy::expect_used, clippy::unwrap_used)]

use boson_rpc::core::codec::FrameCodec;
use boson_rpc::core::frame::{self, Frame};
use boson_rpc::error::{BosonError, FrameError};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};

#[tokio::test]
async fn test_frames_survive_a_duplex_pipe() {
    let (client, server) = tokio::io::duplex(64);
    let mut writer = FramedWrite::new(client, FrameCodec::default());
    let mut reader = FramedRead::new(server, FrameCodec::default());

    let payloads: Vec<Bytes> = (0..20u8)
        .map(|i| Bytes::from(vec![i; i as usize * 13]))
        .collect();

    let send = payloads.clone();
    let writer_task = tokio::spawn(async move {
        for p in send {
            writer.send(p).await.unwrap();
        }
    });

    for expected in &payloads {
        let frame = reader.next().await.unwrap().unwrap();
        assert_eq!(&frame.payload, expected);
    }
    writer_task.await.unwrap();
}

#[tokio::test]
async fn test_oversized_prefix_ends_the_stream() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = FramedRead::new(server, FrameCodec::new(128));

    client.write_all(&4096u32.to_be_bytes()).await.unwrap();

    let err = reader.next().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        BosonError::Frame(FrameError::TooLarge { len: 4096, max: 128 })
    ));
}

#[test]
fn test_zero_length_frame() {
    let bytes = Frame::new(Bytes::new()).to_bytes(16).unwrap();
    assert_eq!(&bytes[..], &[0, 0, 0, 0]);

    let mut codec = FrameCodec::new(16);
    let mut buf = BytesMut::from(&bytes[..]);
    let frame = codec.decode(&mut buf).unwrap().unwrap();
    assert!(frame.is_empty());
}

#[test]
fn test_check_header_reports_exact_shortfall() {
    let bytes = Frame::new(vec![7u8; 100]).to_bytes(1024).unwrap();
    for cut in 4..bytes.len() {
        assert_eq!(
            frame::check_header(&bytes[..cut], 1024),
            Err(FrameError::Incomplete {
                needed: bytes.len() - cut
            })
        );
    }
    assert_eq!(frame::check_header(&bytes, 1024), Ok(100));
}

#[test]
fn test_limit_is_inclusive() {
    let bytes = Frame::new(vec![1u8; 32]).to_bytes(32).unwrap();
    assert!(Frame::parse(&bytes, 32).is_ok());
    assert!(matches!(
        Frame::parse(&bytes, 31),
        Err(FrameError::TooLarge { len: 32, max: 31 })
    ));
}
