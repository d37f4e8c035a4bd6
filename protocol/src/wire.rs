//! Length-prefixed framing.
//!
//! Every message is a 4-byte big-endian length followed by a bincode payload
//! (serde, standard configuration).

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),

    #[error("failed to encode message: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode message: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("connection closed before a complete frame arrived")]
    UnexpectedEof,

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::UnexpectedEof
        } else {
            ProtocolError::Io(err)
        }
    }
}

/// Serialize `message` and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serde::encode_to_vec(message, bincode::config::standard())?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge(payload.len()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it as `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    // Grow with the bytes that actually arrive rather than trusting the prefix.
    let mut payload = Vec::new();
    reader.take(len as u64).read_to_end(&mut payload).await?;
    if payload.len() < len {
        return Err(ProtocolError::UnexpectedEof);
    }
    let (message, _) = bincode::serde::decode_from_slice(&payload, bincode::config::standard())?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::OutputKind;
    use crate::messages::CompileResponse;
    use crate::messages::FailureReason;
    use serde_bytes::ByteBuf;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_response_survives_framing() {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            3,
            BTreeMap::from([(OutputKind::Object, ByteBuf::from(vec![0x7f, b'E', b'L', b'F']))]),
        );
        let response = CompileResponse::Completed { artifacts };

        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &response).await.unwrap();
        let decoded: CompileResponse = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = (MAX_FRAME_LEN as u32) + 1;
        client.write_all(&len.to_be_bytes()).await.unwrap();

        let result: Result<CompileResponse, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_reports_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&16u32.to_be_bytes()).await.unwrap();
        client.write_all(b"short").await.unwrap();
        drop(client);

        let result: Result<CompileResponse, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(ProtocolError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_large_prefix_without_payload_reports_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&(MAX_FRAME_LEN as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(&[0u8; 8]).await.unwrap();
        drop(client);

        let result: Result<CompileResponse, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(ProtocolError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_failure_message_is_kept_verbatim() {
        let response = CompileResponse::failed(
            FailureReason::CompilationFailed,
            "a.swift:1:1: error: expected expression\n",
        );
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &response).await.unwrap();
        let decoded: CompileResponse = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, response);
    }
}
