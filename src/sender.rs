//! 채널 송신 워커
//!
//! - 채널 범위를 컨트롤러의 현재 배치 크기로 잘라 순서대로 전송
//! - 배치마다 페이로드 송신 시간을 컨트롤러에 피드백
//! - 배치 크기는 매 배치 시작 시 새로 읽는다 (시험 도중에도 바뀜)

use std::time::Instant;

use tokio::io::AsyncWrite;
use tracing::debug;

use crate::batch::BatchCursor;
use crate::buffer::BufferPool;
use crate::controller::{Adjustment, SharedController};
use crate::frame;
use crate::partition::ChannelRange;
use crate::stats::ChannelReport;
use crate::Result;

/// 채널 하나의 송신자
#[derive(Debug, Clone)]
pub struct ChannelSender {
    /// 담당 블록 범위 (실행 내내 고정)
    range: ChannelRange,

    /// 배치 컨트롤러 (공유 모드면 다른 채널과 같은 인스턴스)
    controller: SharedController,
}

impl ChannelSender {
    pub fn new(range: ChannelRange, controller: SharedController) -> Self {
        Self { range, controller }
    }

    pub fn range(&self) -> &ChannelRange {
        &self.range
    }

    pub fn controller(&self) -> &SharedController {
        &self.controller
    }

    /// 블록 크기 시험 한 번 전송
    pub async fn run_trial<W>(
        &self,
        stream: &mut W,
        buffer: &BufferPool,
        block_size: usize,
    ) -> Result<ChannelReport>
    where
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let channel_id = self.range.id;
        let mut report = ChannelReport::new(channel_id, block_size);
        let mut cursor = BatchCursor::new(self.range, block_size);

        debug!(
            "[송신 채널{}] 시작: {}~{} ({}B 블록) | 현재 배치: {}",
            channel_id,
            self.range.start,
            self.range.end,
            block_size,
            self.controller.lock().current_batch_size()
        );

        loop {
            let batch_size = self.controller.lock().current_batch_size();
            let Some(batch) = cursor.next_batch(batch_size) else {
                break;
            };

            let payload = buffer.batch_view(&batch)?;
            let sent = frame::write_frame(stream, channel_id, &batch.metadata(), payload).await?;

            report.record_batch(&batch, sent.payload_elapsed);
            let adjustment = self.controller.lock().on_batch_complete(sent.payload_elapsed);

            debug!(
                "[송신 채널{}] 배치 {}~{}: 소요 {:.4}s | 체크섬: {}",
                channel_id,
                batch.start,
                batch.end,
                sent.payload_elapsed.as_secs_f64(),
                sent.checksum
            );

            match adjustment {
                Adjustment::Decreased { from, to } => {
                    debug!("[송신 채널{}] 고부하! 배치 {} -> {}", channel_id, from, to);
                }
                Adjustment::Increased { from, to } => {
                    debug!("[송신 채널{}] 부하 정상, 배치 {} -> {}", channel_id, from, to);
                }
                Adjustment::Unchanged { .. } => {}
            }
        }

        report.final_batch_size = Some(self.controller.lock().current_batch_size());
        report.elapsed = started.elapsed();

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::controller::{BatchController, ControllerParams};
    use crate::frame::{read_checksum, read_metadata, read_payload};

    fn controller(initial: usize) -> SharedController {
        Arc::new(Mutex::new(BatchController::new(ControllerParams {
            initial_batch_size: initial,
            min_batch_size: 1,
            max_batch_size: 64,
            load_threshold: 1.2,
            adjust_step: 2,
        })))
    }

    #[tokio::test]
    async fn test_sends_whole_range_in_order() {
        let mut buffer = BufferPool::allocate(32, 64).unwrap();
        buffer.fill_random(1);

        let range = ChannelRange { id: 1, start: 8, end: 20 };
        let sender = ChannelSender::new(range, controller(4));
        let (mut tx, mut rx) = tokio::io::duplex(1 << 20);

        let report = sender.run_trial(&mut tx, &buffer, 32).await.unwrap();
        drop(tx);

        let mut cursor = 8;
        let mut payload = vec![0u8; 12 * 32];
        while cursor < 20 {
            let meta = read_metadata(&mut rx, 1).await.unwrap();
            assert_eq!(meta.block_size, 32);
            assert_eq!(meta.batch_start, cursor);
            assert!(meta.batch_end > meta.batch_start && meta.batch_end <= 20);

            let len = meta.payload_len().unwrap() as usize;
            read_payload(&mut rx, 1, &mut payload[..len]).await.unwrap();
            let sum = read_checksum(&mut rx, 1).await.unwrap();

            let offset = meta.batch_start as usize * 64;
            let expected = buffer.slice(offset, len).unwrap();
            assert_eq!(&payload[..len], expected);
            assert_eq!(sum, frame::checksum(expected));
            cursor = meta.batch_end;
        }

        assert_eq!(report.blocks, 12);
        assert_eq!(report.bytes, 12 * 32);
        assert!(report.final_batch_size.is_some());
    }

    #[tokio::test]
    async fn test_single_batch_when_batch_exceeds_range() {
        let buffer = BufferPool::allocate(10_000, 128).unwrap();
        let range = ChannelRange { id: 0, start: 0, end: 1250 };
        let sender = ChannelSender::new(
            range,
            Arc::new(Mutex::new(BatchController::new(ControllerParams {
                initial_batch_size: 9000,
                min_batch_size: 500,
                max_batch_size: 20_000,
                load_threshold: 1.2,
                adjust_step: 1000,
            }))),
        );
        let (mut tx, mut rx) = tokio::io::duplex(4 << 20);

        let report = sender.run_trial(&mut tx, &buffer, 128).await.unwrap();
        assert_eq!(report.batches, 1);

        let meta = read_metadata(&mut rx, 0).await.unwrap();
        assert_eq!((meta.batch_start, meta.batch_end), (0, 1250));
    }

    #[tokio::test]
    async fn test_closed_transport_is_an_error() {
        let buffer = BufferPool::allocate(8, 128).unwrap();
        let sender = ChannelSender::new(ChannelRange { id: 0, start: 0, end: 8 }, controller(2));
        let (mut tx, rx) = tokio::io::duplex(16);
        drop(rx);

        assert!(sender.run_trial(&mut tx, &buffer, 128).await.is_err());
    }
}
