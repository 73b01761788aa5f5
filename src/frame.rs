//! 배치 프레임 정의와 송수신
//!
//! 배치 하나는 채널 스트림 위에서 정확히 세 번의 순차 쓰기/읽기로 오간다.
//!
//! ```text
//! [metadata]  u64 LE x 3 = block_size, batch_start, batch_end (24 bytes)
//! [payload]   (batch_end - batch_start) * block_size bytes
//! [checksum]  u64 LE, 페이로드 바이트 합 (wrapping, 8 bytes)
//! ```
//!
//! 체크섬은 순서를 보지 않는 단순 합이다. 바이트 위치 교환이나 서로 상쇄되는
//! 변경은 검출하지 못한다. 바이트 하나만 바뀐 경우는 항상 검출된다.

use std::time::{Duration, Instant};

use bytes::{Buf, BufMut};
use rayon::prelude::*;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result, CHECKSUM_LEN, METADATA_LEN};

/// 이 크기 이상의 페이로드는 병렬로 합산
pub const PARALLEL_CHECKSUM_THRESHOLD: usize = 4 * 1024 * 1024;

const CHECKSUM_SPLIT: usize = 1024 * 1024;

/// 메타데이터 프레임
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchMetadata {
    pub block_size: u64,
    pub batch_start: u64,
    pub batch_end: u64,
}

impl BatchMetadata {
    /// 바이트로 직렬화 (little-endian)
    pub fn to_bytes(&self) -> [u8; METADATA_LEN] {
        let mut buf = [0u8; METADATA_LEN];
        let mut dst = &mut buf[..];
        dst.put_u64_le(self.block_size);
        dst.put_u64_le(self.batch_start);
        dst.put_u64_le(self.batch_end);
        buf
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(mut src: &[u8]) -> Option<Self> {
        if src.len() < METADATA_LEN {
            return None;
        }

        Some(Self {
            block_size: src.get_u64_le(),
            batch_start: src.get_u64_le(),
            batch_end: src.get_u64_le(),
        })
    }

    /// 메타데이터가 말하는 페이로드 길이
    pub fn payload_len(&self) -> Option<u64> {
        self.batch_end
            .checked_sub(self.batch_start)?
            .checked_mul(self.block_size)
    }
}

/// 페이로드 체크섬 (바이트 합, 64비트 wrapping)
pub fn checksum(payload: &[u8]) -> u64 {
    if payload.len() >= PARALLEL_CHECKSUM_THRESHOLD {
        payload
            .par_chunks(CHECKSUM_SPLIT)
            .map(sum_bytes)
            .reduce(|| 0, u64::wrapping_add)
    } else {
        sum_bytes(payload)
    }
}

fn sum_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| acc.wrapping_add(u64::from(b)))
}

/// 송신 완료된 프레임 정보
#[derive(Debug, Clone, Copy)]
pub struct FrameSent {
    /// 페이로드 쓰기에 걸린 시간 (컨트롤러 입력)
    pub payload_elapsed: Duration,
    pub checksum: u64,
}

pub async fn write_metadata<W>(writer: &mut W, channel_id: usize, meta: &BatchMetadata) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&meta.to_bytes())
        .await
        .map_err(|e| Error::from_transport(channel_id, e))
}

/// 페이로드 쓰기, 걸린 시간을 반환
pub async fn write_payload<W>(writer: &mut W, channel_id: usize, payload: &[u8]) -> Result<Duration>
where
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    writer
        .write_all(payload)
        .await
        .map_err(|e| Error::from_transport(channel_id, e))?;
    Ok(start.elapsed())
}

pub async fn write_checksum<W>(writer: &mut W, channel_id: usize, sum: u64) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&sum.to_le_bytes())
        .await
        .map_err(|e| Error::from_transport(channel_id, e))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::from_transport(channel_id, e))
}

/// 프레임 전체 송신 (metadata → payload → checksum)
pub async fn write_frame<W>(
    writer: &mut W,
    channel_id: usize,
    meta: &BatchMetadata,
    payload: &[u8],
) -> Result<FrameSent>
where
    W: AsyncWrite + Unpin,
{
    write_metadata(writer, channel_id, meta).await?;
    let payload_elapsed = write_payload(writer, channel_id, payload).await?;
    let sum = checksum(payload);
    write_checksum(writer, channel_id, sum).await?;

    Ok(FrameSent {
        payload_elapsed,
        checksum: sum,
    })
}

pub async fn read_metadata<R>(reader: &mut R, channel_id: usize) -> Result<BatchMetadata>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; METADATA_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| Error::from_transport(channel_id, e))?;

    BatchMetadata::from_bytes(&buf)
        .ok_or_else(|| Error::desync(channel_id, "메타데이터 파싱 실패"))
}

/// 페이로드를 주어진 버퍼 뷰에 정확히 채운다
pub async fn read_payload<R>(reader: &mut R, channel_id: usize, dst: &mut [u8]) -> Result<Duration>
where
    R: AsyncRead + Unpin,
{
    let start = Instant::now();
    reader
        .read_exact(dst)
        .await
        .map_err(|e| Error::from_transport(channel_id, e))?;
    Ok(start.elapsed())
}

pub async fn read_checksum<R>(reader: &mut R, channel_id: usize) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; CHECKSUM_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| Error::from_transport(channel_id, e))?;
    Ok(u64::from_le_bytes(buf))
}
