//! 단일 프로세스 루프백 실행
//!
//! 송신/수신 오케스트레이터를 메모리 duplex 채널로 직접 잇는다.
//! 네트워크 없이 전체 경로(분할, 배치 조정, 프레임, 검증)를 돌려볼 때 쓴다.

use serde::Serialize;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tracing::info;

use crate::buffer::BufferPool;
use crate::config::Config;
use crate::orchestrator::{ReceiveOrchestrator, SendOrchestrator};
use crate::stats::RunReport;
use crate::Result;

/// duplex 채널 하나의 내부 버퍼 크기
pub const DUPLEX_CAPACITY: usize = 4 * 1024 * 1024;

/// 양쪽 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct LoopbackReport {
    pub sender: RunReport,
    pub receiver: RunReport,
}

/// 채널 수만큼 duplex 쌍 생성 (송신측 끝, 수신측 끝)
pub fn duplex_channels(num_channels: usize, capacity: usize) -> (Vec<DuplexStream>, Vec<DuplexStream>) {
    (0..num_channels).map(|_| tokio::io::duplex(capacity)).unzip()
}

/// 루프백 전송 실행
///
/// 두 오케스트레이터를 같은 태스크에서 함께 폴링하고, 한쪽이 실패하면 바로 반환한다.
pub async fn run(config: Config) -> Result<LoopbackReport> {
    config.validate()?;

    let send_buffer = BufferPool::for_config(&config)?;
    let recv_buffer = BufferPool::for_config(&config)?;

    let mut sender = SendOrchestrator::new(config.clone(), send_buffer)?;
    let mut receiver = ReceiveOrchestrator::new(config.clone(), recv_buffer)?;

    let (mut tx, mut rx) = duplex_channels(config.num_channels, DUPLEX_CAPACITY);

    info!(
        "루프백 시작: {} 채널 | {} 블록 | 시험 {}회 | 컨트롤러: {}",
        config.num_channels,
        config.num_blocks,
        config.num_trials(),
        config.controller_mode
    );

    let send = async {
        let report = sender.run(&mut tx).await?;
        for stream in tx.iter_mut() {
            stream.shutdown().await?;
        }
        Ok::<_, crate::Error>(report)
    };

    let (sender_report, receiver_report) = tokio::try_join!(send, receiver.run(&mut rx))?;

    Ok(LoopbackReport {
        sender: sender_report,
        receiver: receiver_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_invalid_exponent_is_config_error() {
        let config = Config {
            max_block_size_exp: 64,
            ..Config::smoke_test()
        };
        assert!(matches!(run(config).await, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_unallocatable_buffer_is_config_error() {
        let config = Config {
            num_blocks: 1 << 42,
            ..Config::default()
        };
        assert!(matches!(run(config).await, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_smoke_run() {
        let report = run(Config::smoke_test()).await.unwrap();
        assert_eq!(report.sender.total_bytes(), report.receiver.total_bytes());
        assert_eq!(report.receiver.checksum_failures(), 0);
    }
}
