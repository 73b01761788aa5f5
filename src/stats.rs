//! 전송 통계

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::batch::Batch;
use crate::config::ControllerMode;
use crate::Result;

/// 실행 주체
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

/// 채널 하나의 시험 한 번 통계
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    /// 채널 ID
    pub channel_id: usize,

    /// 시험 블록 크기
    pub block_size: usize,

    /// 처리한 배치 수
    pub batches: u64,

    /// 처리한 블록 수
    pub blocks: u64,

    /// 페이로드 바이트
    pub bytes: u64,

    /// 페이로드 송수신 시간 합계
    pub payload_time: Duration,

    /// 채널 작업 전체 시간
    pub elapsed: Duration,

    /// 가장 작은/큰 배치 (블록 수)
    pub min_batch_blocks: u64,
    pub max_batch_blocks: u64,

    /// 체크섬 검증 통과/실패 (수신측)
    pub checksum_passed: u64,
    pub checksum_failed: u64,

    /// 시험 종료 시점 컨트롤러 배치 크기 (송신측)
    pub final_batch_size: Option<usize>,
}

impl ChannelReport {
    pub fn new(channel_id: usize, block_size: usize) -> Self {
        Self {
            channel_id,
            block_size,
            batches: 0,
            blocks: 0,
            bytes: 0,
            payload_time: Duration::ZERO,
            elapsed: Duration::ZERO,
            min_batch_blocks: 0,
            max_batch_blocks: 0,
            checksum_passed: 0,
            checksum_failed: 0,
            final_batch_size: None,
        }
    }

    /// 배치 완료 기록
    pub fn record_batch(&mut self, batch: &Batch, payload_elapsed: Duration) {
        let blocks = batch.block_count();

        if self.batches == 0 || blocks < self.min_batch_blocks {
            self.min_batch_blocks = blocks;
        }
        self.max_batch_blocks = self.max_batch_blocks.max(blocks);

        self.batches += 1;
        self.blocks += blocks;
        self.bytes += batch.byte_len().unwrap_or(0);
        self.payload_time += payload_elapsed;
    }

    /// 체크섬 검증 결과 기록
    pub fn record_checksum(&mut self, matched: bool) {
        if matched {
            self.checksum_passed += 1;
        } else {
            self.checksum_failed += 1;
        }
    }

    /// 페이로드 처리율 (bytes/sec)
    pub fn payload_throughput(&self) -> f64 {
        let secs = self.payload_time.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}

/// 블록 크기 시험 한 번의 통계
#[derive(Debug, Clone, Serialize)]
pub struct TrialReport {
    pub block_size: usize,
    pub elapsed: Duration,
    pub channels: Vec<ChannelReport>,
}

impl TrialReport {
    pub fn total_bytes(&self) -> u64 {
        self.channels.iter().map(|c| c.bytes).sum()
    }

    pub fn total_blocks(&self) -> u64 {
        self.channels.iter().map(|c| c.blocks).sum()
    }

    pub fn total_batches(&self) -> u64 {
        self.channels.iter().map(|c| c.batches).sum()
    }

    pub fn checksum_failures(&self) -> u64 {
        self.channels.iter().map(|c| c.checksum_failed).sum()
    }

    /// 시험 전체 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_bytes() as f64 / secs
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Block: {}B | Blocks: {} | Batches: {} | Bytes: {} | Elapsed: {:.4}s | Throughput: {:.2} MB/s | Checksum failures: {}",
            self.block_size,
            self.total_blocks(),
            self.total_batches(),
            self.total_bytes(),
            self.elapsed.as_secs_f64(),
            self.throughput() / 1_000_000.0,
            self.checksum_failures(),
        )
    }
}

/// 실행 전체 통계
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub role: Role,
    pub controller_mode: Option<ControllerMode>,
    pub trials: Vec<TrialReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(role: Role, controller_mode: Option<ControllerMode>) -> Self {
        Self {
            role,
            controller_mode,
            trials: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.trials.iter().map(|t| t.total_bytes()).sum()
    }

    pub fn checksum_failures(&self) -> u64 {
        self.trials.iter().map(|t| t.checksum_failures()).sum()
    }

    pub fn checksum_passed(&self) -> u64 {
        self.trials
            .iter()
            .flat_map(|t| t.channels.iter())
            .map(|c| c.checksum_passed)
            .sum()
    }

    /// 처리율이 가장 높았던 시험
    pub fn best_trial(&self) -> Option<&TrialReport> {
        self.trials
            .iter()
            .max_by(|a, b| a.throughput().total_cmp(&b.throughput()))
    }

    pub fn summary(&self) -> String {
        format!(
            "Role: {:?} | Trials: {} | Bytes: {} | Elapsed: {:.2}s | Checksum passed/failed: {}/{}",
            self.role,
            self.trials.len(),
            self.total_bytes(),
            self.elapsed.as_secs_f64(),
            self.checksum_passed(),
            self.checksum_failures(),
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON 리포트 파일 저장
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(start: u64, end: u64) -> Batch {
        Batch {
            channel_id: 0,
            start,
            end,
            block_size: 128,
        }
    }

    #[test]
    fn test_channel_report_accumulates() {
        let mut report = ChannelReport::new(0, 128);
        report.record_batch(&batch(0, 10), Duration::from_millis(10));
        report.record_batch(&batch(10, 13), Duration::from_millis(5));
        report.record_checksum(true);
        report.record_checksum(false);

        assert_eq!(report.batches, 2);
        assert_eq!(report.blocks, 13);
        assert_eq!(report.bytes, 13 * 128);
        assert_eq!(report.min_batch_blocks, 3);
        assert_eq!(report.max_batch_blocks, 10);
        assert_eq!(report.payload_time, Duration::from_millis(15));
        assert_eq!((report.checksum_passed, report.checksum_failed), (1, 1));
    }

    #[test]
    fn test_run_report_json() {
        let mut channel = ChannelReport::new(0, 128);
        channel.record_batch(&batch(0, 4), Duration::from_millis(1));
        channel.record_checksum(true);

        let mut run = RunReport::new(Role::Receiver, None);
        run.trials.push(TrialReport {
            block_size: 128,
            elapsed: Duration::from_millis(2),
            channels: vec![channel],
        });

        assert_eq!(run.total_bytes(), 512);
        assert_eq!(run.checksum_passed(), 1);
        assert_eq!(run.best_trial().map(|t| t.block_size), Some(128));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        run.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["role"], "receiver");
        assert_eq!(value["trials"][0]["channels"][0]["bytes"], 512);
    }
}
