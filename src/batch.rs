//! 배치 정의와 채널 내 배치 분할
//!
//! - Batch: 채널 범위 안의 연속된 블록 묶음, 프레임 하나로 전송
//! - BatchCursor: 채널 범위를 앞에서부터 배치로 잘라낸다

use serde::Serialize;

use crate::frame::BatchMetadata;
use crate::partition::ChannelRange;
use crate::{Error, Result};

/// 배치 (프레임 하나의 전송 단위)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub channel_id: usize,

    /// 시작 블록 (포함)
    pub start: u64,

    /// 끝 블록 (미포함)
    pub end: u64,

    /// 이번 시험의 블록 크기 (바이트)
    pub block_size: usize,
}

impl Batch {
    /// 블록 수
    pub fn block_count(&self) -> u64 {
        self.end - self.start
    }

    /// 페이로드 길이 (바이트)
    pub fn byte_len(&self) -> Option<u64> {
        self.block_count().checked_mul(self.block_size as u64)
    }

    /// 버퍼 내 시작 오프셋, stride는 항상 최대 블록 크기
    pub fn buffer_offset(&self, stride: usize) -> Option<u64> {
        self.start.checked_mul(stride as u64)
    }

    pub fn metadata(&self) -> BatchMetadata {
        BatchMetadata {
            block_size: self.block_size as u64,
            batch_start: self.start,
            batch_end: self.end,
        }
    }
}

/// 채널 범위 위의 배치 커서
#[derive(Debug, Clone)]
pub struct BatchCursor {
    range: ChannelRange,
    block_size: usize,
    position: u64,
}

impl BatchCursor {
    pub fn new(range: ChannelRange, block_size: usize) -> Self {
        Self {
            position: range.start,
            range,
            block_size,
        }
    }

    /// 다음 배치가 시작할 블록
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn range(&self) -> &ChannelRange {
        &self.range
    }

    pub fn is_done(&self) -> bool {
        self.position >= self.range.end
    }

    /// 송신측: 현재 배치 크기로 다음 배치를 잘라낸다
    ///
    /// 범위 끝에서는 남은 블록만큼만 잘린다. 배치 크기 0은 1로 취급.
    pub fn next_batch(&mut self, batch_size: usize) -> Option<Batch> {
        if self.is_done() {
            return None;
        }

        let start = self.position;
        let end = start
            .saturating_add(batch_size.max(1) as u64)
            .min(self.range.end);
        self.position = end;

        Some(Batch {
            channel_id: self.range.id,
            start,
            end,
            block_size: self.block_size,
        })
    }

    /// 수신측: 수신한 메타데이터를 검증하고 커서를 진행한다
    ///
    /// 채널 범위 밖 배치, 커서와 어긋난 배치, 블록 크기 불일치는 모두 비동기화 에러.
    pub fn accept(&mut self, meta: &BatchMetadata) -> Result<Batch> {
        let channel_id = self.range.id;

        if !self.range.contains(meta.batch_start) {
            return Err(Error::desync(
                channel_id,
                format!(
                    "배치 시작 {}이 채널 범위 {}~{} 밖",
                    meta.batch_start, self.range.start, self.range.end
                ),
            ));
        }
        if meta.batch_start != self.position {
            return Err(Error::desync(
                channel_id,
                format!(
                    "배치 시작 {} != 예상 위치 {}",
                    meta.batch_start, self.position
                ),
            ));
        }
        if meta.batch_end <= meta.batch_start || meta.batch_end > self.range.end {
            return Err(Error::desync(
                channel_id,
                format!(
                    "잘못된 배치 끝 {} (start={}, channel_end={})",
                    meta.batch_end, meta.batch_start, self.range.end
                ),
            ));
        }
        if meta.block_size != self.block_size as u64 {
            return Err(Error::desync(
                channel_id,
                format!(
                    "블록 크기 {} != 시험 블록 크기 {}",
                    meta.block_size, self.block_size
                ),
            ));
        }

        self.position = meta.batch_end;

        Ok(Batch {
            channel_id,
            start: meta.batch_start,
            end: meta.batch_end,
            block_size: self.block_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::partition;

    #[test]
    fn test_single_batch_when_batch_exceeds_range() {
        let ranges = partition(10_000, 8).unwrap();
        let mut cursor = BatchCursor::new(ranges[0], 128);

        let batch = cursor.next_batch(9000).unwrap();
        assert_eq!((batch.start, batch.end), (0, 1250));
        assert_eq!(batch.byte_len(), Some(1250 * 128));
        assert!(cursor.next_batch(9000).is_none());
    }

    #[test]
    fn test_batch_size_can_change_mid_range() {
        let range = ChannelRange { id: 2, start: 100, end: 130 };
        let mut cursor = BatchCursor::new(range, 256);

        let sizes = [8, 4, 16, 16];
        let batches: Vec<Batch> = sizes
            .iter()
            .filter_map(|&size| cursor.next_batch(size))
            .collect();

        let bounds: Vec<(u64, u64)> = batches.iter().map(|b| (b.start, b.end)).collect();
        assert_eq!(bounds, vec![(100, 108), (108, 112), (112, 128), (128, 130)]);
        assert!(batches.iter().all(|b| b.channel_id == 2 && b.block_size == 256));
        assert!(cursor.is_done());
    }

    #[test]
    fn test_addressing_stays_within_capacity() {
        let num_blocks = 1000u64;
        let stride = 128usize << 5;
        let capacity = num_blocks * stride as u64;

        for exp in 0..=5 {
            let block_size = 128usize << exp;
            for range in partition(num_blocks, 7).unwrap() {
                let mut cursor = BatchCursor::new(range, block_size);
                let mut size = 1;
                while let Some(batch) = cursor.next_batch(size) {
                    let end = batch.buffer_offset(stride).unwrap() + batch.byte_len().unwrap();
                    assert!(end <= capacity);
                    size = size * 3 + 1;
                }
            }
        }
    }

    #[test]
    fn test_accept_in_order() {
        let range = ChannelRange { id: 0, start: 0, end: 10 };
        let mut cursor = BatchCursor::new(range, 128);

        let meta = BatchMetadata { block_size: 128, batch_start: 0, batch_end: 6 };
        assert_eq!(cursor.accept(&meta).unwrap().end, 6);

        let meta = BatchMetadata { block_size: 128, batch_start: 6, batch_end: 10 };
        cursor.accept(&meta).unwrap();
        assert!(cursor.is_done());
    }

    #[test]
    fn test_accept_rejects_foreign_batch() {
        let range = ChannelRange { id: 1, start: 10, end: 20 };
        let mut cursor = BatchCursor::new(range, 128);

        let foreign = BatchMetadata { block_size: 128, batch_start: 0, batch_end: 5 };
        assert!(matches!(
            cursor.accept(&foreign),
            Err(Error::ProtocolDesync { channel_id: 1, .. })
        ));
        assert_eq!(cursor.position(), 10);
    }

    #[test]
    fn test_accept_rejects_gaps_and_bad_sizes() {
        let range = ChannelRange { id: 0, start: 0, end: 10 };

        let skip = BatchMetadata { block_size: 128, batch_start: 2, batch_end: 4 };
        assert!(BatchCursor::new(range, 128).accept(&skip).is_err());

        let empty = BatchMetadata { block_size: 128, batch_start: 0, batch_end: 0 };
        assert!(BatchCursor::new(range, 128).accept(&empty).is_err());

        let overrun = BatchMetadata { block_size: 128, batch_start: 0, batch_end: 11 };
        assert!(BatchCursor::new(range, 128).accept(&overrun).is_err());

        let wrong_size = BatchMetadata { block_size: 256, batch_start: 0, batch_end: 4 };
        assert!(BatchCursor::new(range, 128).accept(&wrong_size).is_err());
    }
}
