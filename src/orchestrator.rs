//! 시험 오케스트레이터
//!
//! 블록 크기 시험(128B부터 두 배씩)을 순서대로 돌리고, 시험마다 채널 워커를
//! 하나씩 동시에 실행한 뒤 모두 끝날 때까지 기다린다.
//!
//! 채널 워커들은 하나의 태스크 안에서 `try_join_all`로 폴링된다. 각 워커는
//! 송수신 지점에서만 양보하며, 첫 에러가 나오면 나머지 워커는 드롭되고 에러가
//! 그대로 올라온다.

use std::time::Instant;

use futures::future::try_join_all;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info};

use crate::buffer::BufferPool;
use crate::config::Config;
use crate::controller::ControllerSet;
use crate::partition::{partition, ChannelRange};
use crate::receiver::ChannelReceiver;
use crate::sender::ChannelSender;
use crate::stats::{Role, RunReport, TrialReport};
use crate::{Error, Result};

/// 버퍼가 설정의 최대 블록 크기와 블록 수를 감당하는지 확인
fn check_buffer(config: &Config, buffer: &BufferPool) -> Result<()> {
    let required = config.buffer_capacity()?;
    if buffer.stride() != config.max_block_size() {
        return Err(Error::config(format!(
            "버퍼 stride({}) != 최대 블록 크기({})",
            buffer.stride(),
            config.max_block_size()
        )));
    }
    if buffer.capacity() < required {
        return Err(Error::config(format!(
            "버퍼 용량 부족: {} < {} ({} blocks * {} bytes)",
            buffer.capacity(),
            required,
            config.num_blocks,
            config.max_block_size()
        )));
    }
    Ok(())
}

fn check_streams(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::ChannelCount { expected, got });
    }
    Ok(())
}

/// 송신측 오케스트레이터
pub struct SendOrchestrator {
    config: Config,
    ranges: Vec<ChannelRange>,
    controllers: ControllerSet,
    senders: Vec<ChannelSender>,
    buffer: BufferPool,
}

impl SendOrchestrator {
    /// 설정 검증, 채널 분할, 컨트롤러 생성 후 버퍼를 초기 데이터로 채운다
    pub fn new(config: Config, mut buffer: BufferPool) -> Result<Self> {
        config.validate()?;
        check_buffer(&config, &buffer)?;

        let ranges = partition(config.num_blocks as u64, config.num_channels)?;
        let controllers = ControllerSet::new(
            config.controller_mode,
            config.num_channels,
            config.controller_params(),
        );
        let senders = ranges
            .iter()
            .map(|range| {
                controllers
                    .for_channel(range.id)
                    .map(|controller| ChannelSender::new(*range, controller))
                    .ok_or(Error::ChannelCount {
                        expected: ranges.len(),
                        got: controllers.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        buffer.fill_random(config.seed);

        Ok(Self {
            config,
            ranges,
            controllers,
            senders,
            buffer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ranges(&self) -> &[ChannelRange] {
        &self.ranges
    }

    pub fn controllers(&self) -> &ControllerSet {
        &self.controllers
    }

    pub fn buffer(&self) -> &BufferPool {
        &self.buffer
    }

    /// 모든 블록 크기 시험 실행
    ///
    /// `streams[i]`는 채널 i의 연결이어야 한다.
    pub async fn run<S>(&mut self, streams: &mut [S]) -> Result<RunReport>
    where
        S: AsyncWrite + Unpin,
    {
        check_streams(self.senders.len(), streams.len())?;

        let started = Instant::now();
        let mut report = RunReport::new(Role::Sender, Some(self.controllers.mode()));
        let block_sizes: Vec<usize> = self.config.block_sizes().collect();

        for (trial, block_size) in block_sizes.into_iter().enumerate() {
            let seed = self.config.seed.wrapping_add(trial as u64 + 1);
            self.buffer.refill_block_slots(block_size, seed)?;

            info!(
                "송신 시험 시작: {} x {}B | {} 채널 | 배치: {:?}",
                self.config.num_blocks,
                block_size,
                self.senders.len(),
                self.controllers.batch_sizes()
            );

            let trial_report = self.run_trial(streams, block_size).await?;
            info!("{}", trial_report.summary());
            report.trials.push(trial_report);
        }

        report.elapsed = started.elapsed();
        info!("송신 완료: {}", report.summary());
        Ok(report)
    }

    /// 시험 한 번: 채널마다 워커를 동시에 돌리고 모두 합류
    pub async fn run_trial<S>(&self, streams: &mut [S], block_size: usize) -> Result<TrialReport>
    where
        S: AsyncWrite + Unpin,
    {
        check_streams(self.senders.len(), streams.len())?;

        let started = Instant::now();
        let buffer = &self.buffer;

        let workers = self
            .senders
            .iter()
            .zip(streams.iter_mut())
            .map(|(sender, stream)| async move {
                sender
                    .run_trial(stream, buffer, block_size)
                    .await
                    .map_err(|e| {
                        error!("[송신 채널{}] 실패: {}", sender.range().id, e);
                        e
                    })
            });

        let channels = try_join_all(workers).await?;

        Ok(TrialReport {
            block_size,
            elapsed: started.elapsed(),
            channels,
        })
    }
}

/// 수신측 오케스트레이터
pub struct ReceiveOrchestrator {
    config: Config,
    ranges: Vec<ChannelRange>,
    receivers: Vec<ChannelReceiver>,
    buffer: BufferPool,
}

impl ReceiveOrchestrator {
    pub fn new(config: Config, buffer: BufferPool) -> Result<Self> {
        config.validate()?;
        check_buffer(&config, &buffer)?;

        let ranges = partition(config.num_blocks as u64, config.num_channels)?;
        let receivers = ranges.iter().copied().map(ChannelReceiver::new).collect();

        Ok(Self {
            config,
            ranges,
            receivers,
            buffer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ranges(&self) -> &[ChannelRange] {
        &self.ranges
    }

    /// 수신 버퍼 (마지막 시험 데이터가 남아 있음)
    pub fn buffer(&self) -> &BufferPool {
        &self.buffer
    }

    /// 모든 블록 크기 시험 수신
    pub async fn run<S>(&mut self, streams: &mut [S]) -> Result<RunReport>
    where
        S: AsyncRead + Unpin,
    {
        check_streams(self.receivers.len(), streams.len())?;

        let started = Instant::now();
        let mut report = RunReport::new(Role::Receiver, None);
        let block_sizes: Vec<usize> = self.config.block_sizes().collect();

        for block_size in block_sizes {
            info!(
                "수신 시험 시작: {} x {}B | {} 채널",
                self.config.num_blocks,
                block_size,
                self.receivers.len()
            );

            let trial_report = self.run_trial(streams, block_size).await?;
            info!("{}", trial_report.summary());
            report.trials.push(trial_report);
        }

        report.elapsed = started.elapsed();
        info!("수신 완료: {}", report.summary());
        Ok(report)
    }

    /// 시험 한 번: 버퍼를 채널 영역으로 나눠 각 워커에 넘긴다
    pub async fn run_trial<S>(&mut self, streams: &mut [S], block_size: usize) -> Result<TrialReport>
    where
        S: AsyncRead + Unpin,
    {
        check_streams(self.receivers.len(), streams.len())?;

        let started = Instant::now();
        let regions = self.buffer.channel_regions_mut(&self.ranges)?;

        let workers = self
            .receivers
            .iter()
            .zip(regions)
            .zip(streams.iter_mut())
            .map(|((receiver, mut region), stream)| async move {
                receiver
                    .run_trial(stream, &mut region, block_size)
                    .await
                    .map_err(|e| {
                        error!("[수신 채널{}] 실패: {}", receiver.range().id, e);
                        e
                    })
            });

        let channels = try_join_all(workers).await?;

        Ok(TrialReport {
            block_size,
            elapsed: started.elapsed(),
            channels,
        })
    }
}
