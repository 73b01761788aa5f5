//! 채널 수신 워커
//!
//! - 메타데이터 → 페이로드 → 체크섬 순서로 배치 수신
//! - 페이로드는 채널 전용 버퍼 영역의 `batch_start * stride` 위치에 직접 기록
//! - 체크섬 불일치는 보고만 하고 다음 배치로 진행 (재전송 없음)
//! - 채널 범위 밖이거나 순서가 어긋난 배치는 비동기화 에러로 중단

use std::time::Instant;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::batch::BatchCursor;
use crate::buffer::ChannelRegion;
use crate::frame;
use crate::partition::ChannelRange;
use crate::stats::ChannelReport;
use crate::{Error, Result};

/// 채널 하나의 수신자
#[derive(Debug, Clone)]
pub struct ChannelReceiver {
    range: ChannelRange,
}

impl ChannelReceiver {
    pub fn new(range: ChannelRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> &ChannelRange {
        &self.range
    }

    /// 블록 크기 시험 한 번 수신
    pub async fn run_trial<R>(
        &self,
        stream: &mut R,
        region: &mut ChannelRegion<'_>,
        block_size: usize,
    ) -> Result<ChannelReport>
    where
        R: AsyncRead + Unpin,
    {
        let channel_id = self.range.id;
        if region.range() != &self.range {
            return Err(Error::config(format!(
                "채널 {} 버퍼 영역 불일치: {:?}",
                channel_id,
                region.range()
            )));
        }

        let started = Instant::now();
        let mut report = ChannelReport::new(channel_id, block_size);
        let mut cursor = BatchCursor::new(self.range, block_size);

        debug!(
            "[수신 채널{}] 준비: {}~{} ({}B 블록)",
            channel_id, self.range.start, self.range.end, block_size
        );

        while !cursor.is_done() {
            let meta = frame::read_metadata(stream, channel_id).await?;
            let batch = cursor.accept(&meta)?;

            let view = region.batch_view_mut(&batch)?;
            let elapsed = frame::read_payload(stream, channel_id, view).await?;
            let expected = frame::read_checksum(stream, channel_id).await?;
            let got = frame::checksum(view);

            let matched = expected == got;
            report.record_batch(&batch, elapsed);
            report.record_checksum(matched);

            if matched {
                debug!(
                    "[수신 채널{}] 배치 {}~{}: 검증 통과 | 소요 {:.4}s",
                    channel_id,
                    batch.start,
                    batch.end,
                    elapsed.as_secs_f64()
                );
            } else {
                let mismatch = Error::ChecksumMismatch {
                    channel_id,
                    batch_start: batch.start,
                    batch_end: batch.end,
                    expected,
                    got,
                };
                warn!("{}", mismatch);
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }
}
