//! 실행 파일 공통 CLI 옵션
//!
//! 프리셋 설정 위에 지정된 플래그만 덮어쓴다.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ControllerMode};
use crate::stats::RunReport;
use crate::Result;

/// 전송 설정 플래그
#[derive(Args, Debug, Clone, Default)]
pub struct TransferArgs {
    /// 전송할 총 블록 수
    #[arg(long)]
    pub num_blocks: Option<usize>,

    /// 병렬 채널 수
    #[arg(short = 'c', long)]
    pub channels: Option<usize>,

    /// 첫 시험 블록 크기 지수 (128 * 2^exp)
    #[arg(long)]
    pub min_block_exp: Option<u32>,

    /// 마지막 시험 블록 크기 지수 (최대 14)
    #[arg(long)]
    pub max_block_exp: Option<u32>,

    /// 초기 배치 크기 (블록 수)
    #[arg(long)]
    pub initial_batch: Option<usize>,

    #[arg(long)]
    pub min_batch: Option<usize>,

    #[arg(long)]
    pub max_batch: Option<usize>,

    /// 배치 조정 단위
    #[arg(long)]
    pub adjust_step: Option<usize>,

    /// 고부하 판정 배율
    #[arg(long)]
    pub load_threshold: Option<f64>,

    /// 채널 0 포트 (채널 i는 base_port + i)
    #[arg(short = 'p', long)]
    pub base_port: Option<u16>,

    /// 컨트롤러 공유 모드
    #[arg(long, value_parser = parse_controller_mode)]
    pub controller: Option<ControllerMode>,

    /// 페이로드 시드
    #[arg(long)]
    pub seed: Option<u64>,

    /// 실행 리포트를 JSON으로 저장
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}

fn parse_controller_mode(s: &str) -> std::result::Result<ControllerMode, String> {
    match s {
        "shared" => Ok(ControllerMode::Shared),
        "per-channel" => Ok(ControllerMode::PerChannel),
        other => Err(format!("알 수 없는 컨트롤러 모드: {} (shared | per-channel)", other)),
    }
}

impl TransferArgs {
    /// 프리셋에 플래그 적용 후 검증
    pub fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(v) = self.num_blocks {
            config.num_blocks = v;
        }
        if let Some(v) = self.channels {
            config.num_channels = v;
        }
        if let Some(v) = self.min_block_exp {
            config.min_block_size_exp = v;
        }
        if let Some(v) = self.max_block_exp {
            config.max_block_size_exp = v;
        }
        if let Some(v) = self.initial_batch {
            config.initial_batch_size = v;
        }
        if let Some(v) = self.min_batch {
            config.min_batch_size = v;
        }
        if let Some(v) = self.max_batch {
            config.max_batch_size = v;
        }
        if let Some(v) = self.adjust_step {
            config.adjust_step = v;
        }
        if let Some(v) = self.load_threshold {
            config.load_threshold = v;
        }
        if let Some(v) = self.base_port {
            config.base_port = v;
        }
        if let Some(v) = self.controller {
            config.controller_mode = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// `--json`이 지정됐으면 리포트 저장
    pub fn write_report<T: ReportSink>(&self, report: &T) -> Result<()> {
        if let Some(path) = &self.json {
            report.write_to(path)?;
            info!("리포트 저장: {}", path.display());
        }
        Ok(())
    }
}

/// JSON으로 저장 가능한 리포트
pub trait ReportSink {
    fn write_to(&self, path: &Path) -> Result<()>;
}

impl ReportSink for RunReport {
    fn write_to(&self, path: &Path) -> Result<()> {
        self.write_json(path)
    }
}

impl ReportSink for crate::loopback::LoopbackReport {
    fn write_to(&self, path: &Path) -> Result<()> {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// 로깅 초기화 (`RUST_LOG` 없으면 info)
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}
