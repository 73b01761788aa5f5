//! 채널 분할
//!
//! 전체 블록 인덱스 범위 `[0, total_blocks)`를 채널 수만큼 겹침/빈틈 없이 나눈다.
//! 마지막 채널이 나눗셈 나머지를 모두 가져간다.

use std::ops::Range;

use serde::Serialize;

use crate::{Error, Result};

/// 채널 하나가 맡는 블록 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelRange {
    /// 채널 ID
    pub id: usize,

    /// 시작 블록 (포함)
    pub start: u64,

    /// 끝 블록 (미포함)
    pub end: u64,
}

impl ChannelRange {
    /// 블록 수
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, block_index: u64) -> bool {
        (self.start..self.end).contains(&block_index)
    }

    pub fn as_range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// 채널 범위 계산
///
/// 채널 i: `start = i * (total / n)`, 마지막 채널을 제외하면 `end = start + total / n`.
pub fn partition(total_blocks: u64, num_channels: usize) -> Result<Vec<ChannelRange>> {
    if num_channels == 0 {
        return Err(Error::config("채널 수는 1 이상이어야 함"));
    }
    if num_channels as u64 > total_blocks {
        return Err(Error::config(format!(
            "채널 수({}) > 블록 수({})",
            num_channels, total_blocks
        )));
    }

    let per_channel = total_blocks / num_channels as u64;

    Ok((0..num_channels)
        .map(|id| {
            let start = id as u64 * per_channel;
            let end = if id + 1 == num_channels {
                total_blocks
            } else {
                start + per_channel
            };
            ChannelRange { id, start, end }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let ranges = partition(10_000, 8).unwrap();
        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges[0].as_range(), 0..1250);
        assert_eq!(ranges[7].as_range(), 8750..10_000);
    }

    #[test]
    fn test_last_channel_takes_remainder() {
        let ranges = partition(10_000, 6).unwrap();
        assert_eq!(ranges[0].as_range(), 0..1666);
        assert_eq!(ranges[4].as_range(), 6664..8330);
        assert_eq!(ranges[5].as_range(), 8330..10_000);
        assert_eq!(ranges[5].len(), 1670);
    }

    #[test]
    fn test_concatenation_covers_everything() {
        for total in 1..=97u64 {
            for channels in 1..=total.min(13) as usize {
                let ranges = partition(total, channels).unwrap();
                let mut cursor = 0;
                for (i, range) in ranges.iter().enumerate() {
                    assert_eq!(range.id, i);
                    assert_eq!(range.start, cursor, "gap or overlap at {}/{}", total, channels);
                    assert!(!range.is_empty());
                    cursor = range.end;
                }
                assert_eq!(cursor, total);
            }
        }
    }

    #[test]
    fn test_invalid_channel_counts() {
        assert!(partition(10, 0).is_err());
        assert!(partition(3, 4).is_err());
        assert!(partition(4, 4).is_ok());
    }
}
