//! MCBT 수신자
//!
//! 채널별 포트에서 송신자 연결을 받고, 모든 블록 크기 시험을 수신/검증한다.
//!
//! 사용법:
//!   cargo run --release --bin mcbt-receiver -- [OPTIONS]
//!
//! 송신자와 같은 채널 수, 블록 수, 블록 크기 지수 범위를 줘야 한다.

use std::net::{IpAddr, Ipv4Addr};

use clap::Parser;
use tracing::{info, warn};

use mcbt::cli::{init_tracing, TransferArgs};
use mcbt::{transport, BufferPool, Config, ReceiveOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "mcbt-receiver")]
#[command(about = "Multi-channel adaptive batch transfer: receiver")]
struct Args {
    /// 리스너 바인드 주소
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    #[command(flatten)]
    transfer: TransferArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = Args::parse();
    let config = args.transfer.apply(Config::default())?;

    info!("MCBT Receiver starting...");
    info!("Bind: {}:{}~", args.bind, config.base_port);
    info!("Blocks: {} | Channels: {}", config.num_blocks, config.num_channels);

    let buffer = BufferPool::for_config(&config)?;
    info!("Buffer: {} bytes (stride {})", buffer.capacity(), buffer.stride());
    let mut orchestrator = ReceiveOrchestrator::new(config.clone(), buffer)?;

    let mut streams = transport::accept_channels(&config, args.bind).await?;

    let report = orchestrator.run(&mut streams).await?;

    let failures = report.checksum_failures();
    if failures > 0 {
        warn!("체크섬 불일치 배치: {}", failures);
    }
    args.transfer.write_report(&report)?;

    Ok(())
}
