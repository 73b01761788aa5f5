//! 사전 할당 버퍼
//!
//! 실행 시작 시 `num_blocks * stride` 바이트를 한 번만 할당하고 모든 시험에서 재사용한다.
//! 블록 i는 시험 블록 크기와 관계없이 항상 `i * stride` 위치에 놓인다
//! (stride = 최대 블록 크기). 작은 블록에서는 공간이 남지만 재할당이 없다.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;

use crate::batch::Batch;
use crate::config::Config;
use crate::partition::ChannelRange;
use crate::{Error, Result};

/// 랜덤 채우기 작업 단위
const FILL_CHUNK: usize = 4 * 1024 * 1024;

/// `offset..offset+len`이 capacity 안인지 확인
fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(end),
        _ => Err(Error::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// 배치의 (버퍼 오프셋, 길이)를 usize로 계산
fn batch_span(batch: &Batch, stride: usize, capacity: usize) -> Result<(usize, usize)> {
    if batch.block_size > stride {
        return Err(Error::OutOfBounds {
            offset: 0,
            len: batch.block_size,
            capacity: stride,
        });
    }

    let overflow = || Error::OutOfBounds {
        offset: usize::MAX,
        len: usize::MAX,
        capacity,
    };
    let offset = batch
        .buffer_offset(stride)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(overflow)?;
    let len = batch
        .byte_len()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(overflow)?;

    Ok((offset, len))
}

/// 사전 할당 버퍼 풀
#[derive(Debug)]
pub struct BufferPool {
    data: Vec<u8>,
    stride: usize,
    num_blocks: usize,
}

impl BufferPool {
    /// 버퍼 할당 (`num_blocks * stride` 바이트, 0으로 초기화)
    pub fn allocate(num_blocks: usize, stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(Error::config("stride는 1 이상이어야 함"));
        }
        let capacity = num_blocks
            .checked_mul(stride)
            .filter(|&capacity| capacity <= isize::MAX as usize)
            .ok_or_else(|| {
                Error::config(format!(
                    "버퍼 용량 초과: {} blocks * {} bytes",
                    num_blocks, stride
                ))
            })?;

        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|e| {
            Error::config(format!("버퍼 할당 실패 ({} bytes): {}", capacity, e))
        })?;
        data.resize(capacity, 0u8);

        Ok(Self {
            data,
            stride,
            num_blocks,
        })
    }

    /// 설정 검증 후 최대 크기 버퍼 할당
    pub fn for_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::allocate(config.num_blocks, config.max_block_size())
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// 블록 간격 (최대 블록 크기)
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// 버퍼 시작 주소, 재할당 여부 확인용
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// 범위 검사된 읽기 뷰
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = check_bounds(offset, len, self.capacity())?;
        Ok(&self.data[offset..end])
    }

    /// 범위 검사된 쓰기 뷰
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let end = check_bounds(offset, len, self.capacity())?;
        Ok(&mut self.data[offset..end])
    }

    /// 배치 페이로드 뷰 (`start * stride`부터 `block_count * block_size` 바이트)
    pub fn batch_view(&self, batch: &Batch) -> Result<&[u8]> {
        let (offset, len) = batch_span(batch, self.stride, self.capacity())?;
        self.slice(offset, len)
    }

    /// 채널별로 겹치지 않는 쓰기 영역으로 분할
    ///
    /// 채널 범위는 블록 순서대로 정렬되어 있고 서로 겹치지 않아야 한다.
    /// 각 영역은 `[start * stride, end * stride)`를 덮는다.
    pub fn channel_regions_mut(&mut self, ranges: &[ChannelRange]) -> Result<Vec<ChannelRegion<'_>>> {
        let stride = self.stride;
        let capacity = self.data.len();

        let mut rest: &mut [u8] = self.data.as_mut_slice();
        let mut consumed = 0usize;
        let mut regions = Vec::with_capacity(ranges.len());

        for range in ranges {
            let start = usize::try_from(range.start)
                .ok()
                .and_then(|b| b.checked_mul(stride));
            let end = usize::try_from(range.end)
                .ok()
                .and_then(|b| b.checked_mul(stride));

            let (start, end) = match (start, end) {
                (Some(s), Some(e)) if s >= consumed && s <= e && e <= capacity => (s, e),
                _ => {
                    return Err(Error::OutOfBounds {
                        offset: consumed,
                        len: range.len() as usize,
                        capacity,
                    })
                }
            };

            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(start - consumed);
            let (region, tail) = tail.split_at_mut(end - start);
            rest = tail;
            consumed = end;

            regions.push(ChannelRegion {
                range: *range,
                stride,
                base_offset: start,
                data: region,
            });
        }

        Ok(regions)
    }

    /// 버퍼 전체를 시드 기반 랜덤 데이터로 채운다
    pub fn fill_random(&mut self, seed: u64) {
        self.data
            .par_chunks_mut(FILL_CHUNK)
            .enumerate()
            .for_each(|(idx, chunk)| {
                StdRng::seed_from_u64(seed.wrapping_add(idx as u64)).fill_bytes(chunk);
            });
    }

    /// 시험 전 각 블록 슬롯의 앞 `block_size` 바이트만 다시 채운다
    pub fn refill_block_slots(&mut self, block_size: usize, seed: u64) -> Result<()> {
        if block_size > self.stride {
            return Err(Error::OutOfBounds {
                offset: 0,
                len: block_size,
                capacity: self.stride,
            });
        }

        self.data
            .par_chunks_mut(self.stride)
            .enumerate()
            .for_each(|(idx, slot)| {
                let mut rng = StdRng::seed_from_u64(seed ^ (idx as u64).rotate_left(32));
                rng.fill_bytes(&mut slot[..block_size]);
            });

        Ok(())
    }
}

/// 채널 하나가 단독으로 쓰는 버퍼 영역
///
/// 다른 채널 영역과 겹치지 않으므로 채널 태스크 간 동기화가 필요 없다.
#[derive(Debug)]
pub struct ChannelRegion<'a> {
    range: ChannelRange,
    stride: usize,
    /// 전체 버퍼 기준 시작 오프셋
    base_offset: usize,
    data: &'a mut [u8],
}

impl<'a> ChannelRegion<'a> {
    pub fn range(&self) -> &ChannelRange {
        &self.range
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 전체 버퍼 오프셋을 영역 내부 오프셋으로 변환
    fn local_span(&self, batch: &Batch) -> Result<(usize, usize)> {
        let global_capacity = self.base_offset + self.data.len();
        let (offset, len) = batch_span(batch, self.stride, global_capacity)?;

        let local = offset.checked_sub(self.base_offset).ok_or(Error::OutOfBounds {
            offset,
            len,
            capacity: global_capacity,
        })?;
        check_bounds(local, len, self.data.len())?;

        Ok((local, len))
    }

    /// 배치 수신용 쓰기 뷰
    pub fn batch_view_mut(&mut self, batch: &Batch) -> Result<&mut [u8]> {
        let (local, len) = self.local_span(batch)?;
        Ok(&mut self.data[local..local + len])
    }

    /// 수신된 배치 읽기 뷰
    pub fn batch_view(&self, batch: &Batch) -> Result<&[u8]> {
        let (local, len) = self.local_span(batch)?;
        Ok(&self.data[local..local + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::partition;

    fn batch(start: u64, end: u64, block_size: usize) -> Batch {
        Batch {
            channel_id: 0,
            start,
            end,
            block_size,
        }
    }

    #[test]
    fn test_allocate_capacity() {
        let pool = BufferPool::allocate(100, 1024).unwrap();
        assert_eq!(pool.capacity(), 100 * 1024);
        assert_eq!(pool.stride(), 1024);
        assert!(BufferPool::allocate(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_allocate_beyond_isize_max_is_config_error() {
        // usize에는 들어가지만 isize::MAX를 넘는 용량
        assert!(matches!(
            BufferPool::allocate(1usize << 62, 2),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            BufferPool::allocate(1, isize::MAX as usize + 1),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_for_config_validates_first() {
        let config = Config {
            max_block_size_exp: 64,
            ..Config::smoke_test()
        };
        assert!(matches!(BufferPool::for_config(&config), Err(Error::Config { .. })));
    }

    #[test]
    fn test_slice_bounds() {
        let pool = BufferPool::allocate(4, 16).unwrap();
        assert_eq!(pool.slice(0, 64).unwrap().len(), 64);
        assert_eq!(pool.slice(60, 4).unwrap().len(), 4);
        assert!(matches!(
            pool.slice(60, 5),
            Err(Error::OutOfBounds { offset: 60, len: 5, capacity: 64 })
        ));
        assert!(pool.slice(usize::MAX, 1).is_err());
    }

    #[test]
    fn test_batch_view_uses_max_stride() {
        let mut pool = BufferPool::allocate(8, 64).unwrap();
        pool.slice_mut(3 * 64, 4).unwrap().copy_from_slice(&[9, 8, 7, 6]);

        let view = pool.batch_view(&batch(3, 5, 16)).unwrap();
        assert_eq!(view.len(), 32);
        assert_eq!(&view[..4], &[9, 8, 7, 6]);

        // 마지막 블록, 최대 블록 크기
        assert_eq!(pool.batch_view(&batch(7, 8, 64)).unwrap().len(), 64);
        // 블록 크기가 stride보다 크면 거부
        assert!(pool.batch_view(&batch(0, 1, 128)).is_err());
    }

    #[test]
    fn test_channel_regions_are_disjoint() {
        let mut pool = BufferPool::allocate(10, 32).unwrap();
        let ranges = partition(10, 3).unwrap();

        {
            let mut regions = pool.channel_regions_mut(&ranges).unwrap();
            assert_eq!(regions.len(), 3);
            assert_eq!(regions[0].len(), 3 * 32);
            assert_eq!(regions[2].len(), 4 * 32);

            for region in regions.iter_mut() {
                let range = *region.range();
                let b = Batch {
                    channel_id: range.id,
                    start: range.start,
                    end: range.start + 1,
                    block_size: 8,
                };
                region.batch_view_mut(&b).unwrap().fill(range.id as u8 + 1);
            }

            // 다른 채널의 블록은 접근 불가
            assert!(regions[0].batch_view(&batch(3, 4, 8)).is_err());
            assert!(regions[1].batch_view(&batch(0, 1, 8)).is_err());
        }

        assert_eq!(pool.slice(0, 8).unwrap(), &[1u8; 8]);
        assert_eq!(pool.slice(3 * 32, 8).unwrap(), &[2u8; 8]);
        assert_eq!(pool.slice(6 * 32, 8).unwrap(), &[3u8; 8]);
    }

    #[test]
    fn test_refill_keeps_identity() {
        let mut pool = BufferPool::allocate(16, 256).unwrap();
        let ptr = pool.as_ptr();

        pool.fill_random(42);
        let before = pool.slice(0, pool.capacity()).unwrap().to_vec();

        pool.refill_block_slots(128, 99).unwrap();
        assert_eq!(pool.as_ptr(), ptr);

        let after = pool.slice(0, pool.capacity()).unwrap();
        for block in 0..16 {
            let slot = block * 256;
            // 슬롯 뒷부분은 그대로
            assert_eq!(&after[slot + 128..slot + 256], &before[slot + 128..slot + 256]);
        }
        assert_ne!(&after[..128], &before[..128]);
        assert!(pool.refill_block_slots(512, 1).is_err());
    }

    #[test]
    fn test_fill_random_is_deterministic() {
        let mut a = BufferPool::allocate(4, 128).unwrap();
        let mut b = BufferPool::allocate(4, 128).unwrap();
        a.fill_random(7);
        b.fill_random(7);
        assert_eq!(a.slice(0, 512).unwrap(), b.slice(0, 512).unwrap());
    }
}
