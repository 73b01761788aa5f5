//! 전송 설정
//!
//! 실행 시작 시 한 번 만들어서 모든 구성 요소에 그대로 넘겨준다.
//! 실행 도중에는 바뀌지 않는다.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::controller::ControllerParams;
use crate::{Error, Result, BASE_BLOCK_SIZE, MAX_BLOCK_SIZE_EXP};

/// 배치 컨트롤러 수명 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerMode {
    /// 모든 채널이 하나의 컨트롤러를 공유
    Shared,

    /// 채널마다 독립된 컨트롤러
    PerChannel,
}

impl std::fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerMode::Shared => write!(f, "shared"),
            ControllerMode::PerChannel => write!(f, "per-channel"),
        }
    }
}

/// MCBT 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 전송할 총 블록 수
    pub num_blocks: usize,

    /// 첫 시험 블록 크기 지수 (128 * 2^exp 바이트)
    pub min_block_size_exp: u32,

    /// 마지막 시험 블록 크기 지수, 버퍼 stride를 결정한다
    pub max_block_size_exp: u32,

    /// 병렬 채널(연결) 수
    pub num_channels: usize,

    /// 초기 배치 크기 (블록 수)
    pub initial_batch_size: usize,

    /// 최소 배치 크기
    pub min_batch_size: usize,

    /// 최대 배치 크기
    pub max_batch_size: usize,

    /// 고부하 판정 배율 (best_duration 대비)
    pub load_threshold: f64,

    /// 배치 조정 단위 (블록 수)
    pub adjust_step: usize,

    /// 채널 i는 base_port + i 포트를 사용
    pub base_port: u16,

    /// 수신측 주소 (송신측 설정)
    pub receiver_address: IpAddr,

    /// 컨트롤러 공유 여부
    pub controller_mode: ControllerMode,

    /// 페이로드 생성 시드
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_blocks: 10_000,
            min_block_size_exp: 0,             // 128B
            max_block_size_exp: 14,            // 2MB
            num_channels: 6,
            initial_batch_size: 500,
            min_batch_size: 100,
            max_batch_size: 2000,
            load_threshold: 1.2,
            adjust_step: 200,
            base_port: 13337,
            receiver_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            controller_mode: ControllerMode::PerChannel,
            seed: 42,
        }
    }
}

impl Config {
    /// 두 호스트 간 TCP 전송용 설정
    pub fn networked(receiver_address: IpAddr) -> Self {
        Self {
            receiver_address,
            ..Self::default()
        }
    }

    /// 단일 프로세스 시뮬레이션용 설정
    ///
    /// 큰 배치로 시작하고 컨트롤러 하나를 모든 채널이 공유한다.
    pub fn simulated() -> Self {
        Self {
            num_blocks: 10_000,
            min_block_size_exp: 0,
            max_block_size_exp: 11,            // 256KB
            num_channels: 8,
            initial_batch_size: 9000,
            min_batch_size: 500,
            max_batch_size: 20_000,
            load_threshold: 1.2,
            adjust_step: 1000,
            base_port: 13337,
            receiver_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            controller_mode: ControllerMode::Shared,
            seed: 42,
        }
    }

    /// 빠른 확인용 소형 설정
    pub fn smoke_test() -> Self {
        Self {
            num_blocks: 64,
            min_block_size_exp: 0,
            max_block_size_exp: 3,             // 1KB
            num_channels: 4,
            initial_batch_size: 8,
            min_batch_size: 2,
            max_batch_size: 32,
            load_threshold: 1.2,
            adjust_step: 4,
            base_port: 13337,
            receiver_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            controller_mode: ControllerMode::PerChannel,
            seed: 7,
        }
    }

    /// 모든 시험 중 가장 큰 블록 크기 (버퍼 stride)
    ///
    /// 지수는 `MAX_BLOCK_SIZE_EXP`에서 잘린다. 범위 밖 지수는 `validate()`가 거부한다.
    pub fn max_block_size(&self) -> usize {
        BASE_BLOCK_SIZE << self.max_block_size_exp.min(MAX_BLOCK_SIZE_EXP)
    }

    /// 필요한 버퍼 용량 (num_blocks * max_block_size)
    ///
    /// 한 번에 할당 가능한 크기(`isize::MAX`)를 넘으면 설정 에러.
    pub fn buffer_capacity(&self) -> Result<usize> {
        self.num_blocks
            .checked_mul(self.max_block_size())
            .filter(|&capacity| capacity <= isize::MAX as usize)
            .ok_or_else(|| {
                Error::config(format!(
                    "버퍼 용량 초과: {} blocks * {} bytes",
                    self.num_blocks,
                    self.max_block_size()
                ))
            })
    }

    /// 시험 블록 크기 순서 (128B부터 두 배씩)
    pub fn block_sizes(&self) -> impl Iterator<Item = usize> + Clone {
        (self.min_block_size_exp..=self.max_block_size_exp).map(|exp| BASE_BLOCK_SIZE << exp)
    }

    /// 시험 횟수
    pub fn num_trials(&self) -> usize {
        self.max_block_size_exp.saturating_sub(self.min_block_size_exp) as usize + 1
    }

    /// 채널별 포트
    pub fn channel_port(&self, channel_id: usize) -> Result<u16> {
        u16::try_from(channel_id)
            .ok()
            .and_then(|id| self.base_port.checked_add(id))
            .ok_or_else(|| Error::config(format!("채널 {} 포트가 u16 범위 초과", channel_id)))
    }

    /// 채널별 수신측 주소
    pub fn channel_addr(&self, channel_id: usize) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.receiver_address, self.channel_port(channel_id)?))
    }

    /// 컨트롤러 파라미터 추출
    pub fn controller_params(&self) -> ControllerParams {
        ControllerParams {
            initial_batch_size: self.initial_batch_size,
            min_batch_size: self.min_batch_size,
            max_batch_size: self.max_batch_size,
            load_threshold: self.load_threshold,
            adjust_step: self.adjust_step,
        }
    }

    /// 전송 시작 전 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.num_blocks == 0 {
            return Err(Error::config("num_blocks는 1 이상이어야 함"));
        }
        if self.num_channels == 0 {
            return Err(Error::config("num_channels는 1 이상이어야 함"));
        }
        if self.num_channels > self.num_blocks {
            return Err(Error::config(format!(
                "num_channels({}) > num_blocks({})",
                self.num_channels, self.num_blocks
            )));
        }
        if self.min_block_size_exp > self.max_block_size_exp {
            return Err(Error::config(format!(
                "min_block_size_exp({}) > max_block_size_exp({})",
                self.min_block_size_exp, self.max_block_size_exp
            )));
        }
        if self.max_block_size_exp > MAX_BLOCK_SIZE_EXP {
            return Err(Error::config(format!(
                "max_block_size_exp({}) 최대값 {} 초과",
                self.max_block_size_exp, MAX_BLOCK_SIZE_EXP
            )));
        }
        self.buffer_capacity()?;
        self.channel_port(self.num_channels - 1)?;

        self.controller_params().validate()
    }
}
