//! 에러 타입 정의

use thiserror::Error;

/// MCBT 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    /// 전송 계층 에러 (연결 실패, 부분 송수신 등)
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("설정 에러: {reason}")]
    Config { reason: String },

    #[error("버퍼 범위 초과: offset={offset}, len={len}, capacity={capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("프로토콜 비동기화: channel={channel_id}, {reason}")]
    ProtocolDesync { channel_id: usize, reason: String },

    #[error(
        "체크섬 불일치: channel={channel_id}, batch={batch_start}~{batch_end}, expected {expected}, got {got}"
    )]
    ChecksumMismatch {
        channel_id: usize,
        batch_start: u64,
        batch_end: u64,
        expected: u64,
        got: u64,
    },

    #[error("연결 종료: channel={channel_id}")]
    ConnectionClosed { channel_id: usize },

    #[error("채널 수 불일치: expected {expected}, got {got}")]
    ChannelCount { expected: usize, got: usize },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn desync(channel_id: usize, reason: impl Into<String>) -> Self {
        Error::ProtocolDesync {
            channel_id,
            reason: reason.into(),
        }
    }

    /// 프레임 도중 EOF는 `ConnectionClosed`로, 나머지는 그대로 `Io`로 변환
    pub(crate) fn from_transport(channel_id: usize, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed { channel_id }
        } else {
            Error::Io(err)
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
