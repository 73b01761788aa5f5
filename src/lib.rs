//! # MCBT (Multi-Channel Batch Transfer)
//!
//! 병렬 TCP 채널 위의 적응형 배치 블록 전송 엔진
//!
//! ## 핵심 특징
//! - **채널 분할**: 블록 인덱스 공간을 채널마다 연속 구간으로 나눔
//! - **배치 프레임**: 메타데이터(3 x u64) + 페이로드 + 바이트 합 체크섬
//! - **적응형 배치 크기**: 최고 기록 대비 1.2배 이상 느려지면 줄이고, 5% 이상 빨라지면 키움
//! - **고정 stride 버퍼**: 블록 i는 항상 `i * 최대 블록 크기` 위치, 버퍼 재할당 없음
//! - **블록 크기 시험**: 128B부터 두 배씩 키우며 같은 블록 수를 반복 전송
//! - **전송 계층 분리**: TCP, 메모리 duplex 등 `AsyncRead`/`AsyncWrite`면 무엇이든

pub mod batch;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod loopback;
pub mod orchestrator;
pub mod partition;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

pub use batch::{Batch, BatchCursor};
pub use buffer::{BufferPool, ChannelRegion};
pub use config::{Config, ControllerMode};
pub use controller::{Adjustment, BatchController, ControllerParams, ControllerSet, SharedController};
pub use error::{Error, Result};
pub use frame::BatchMetadata;
pub use orchestrator::{ReceiveOrchestrator, SendOrchestrator};
pub use partition::{partition, ChannelRange};
pub use receiver::ChannelReceiver;
pub use sender::ChannelSender;
pub use stats::{ChannelReport, Role, RunReport, TrialReport};

/// 가장 작은 시험 블록 크기 (바이트)
pub const BASE_BLOCK_SIZE: usize = 128;

/// 블록 크기 지수 상한 (128 << 14 = 2MB)
pub const MAX_BLOCK_SIZE_EXP: u32 = 14;

/// 메타데이터 프레임 길이: block_size, batch_start, batch_end
pub const METADATA_LEN: usize = 24;

/// 체크섬 프레임 길이
pub const CHECKSUM_LEN: usize = 8;
