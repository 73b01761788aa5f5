//! MCBT 송신자
//!
//! 수신자에게 채널 수만큼 TCP로 접속한 뒤 블록 크기 시험을 모두 전송한다.
//!
//! 사용법:
//!   cargo run --release --bin mcbt-sender -- --receiver 192.168.1.100 [OPTIONS]
//!
//! 예시:
//!   # 8채널, 공유 컨트롤러
//!   cargo run --release --bin mcbt-sender -- -r 10.0.0.2 -c 8 --controller shared

use std::net::{IpAddr, Ipv4Addr};

use clap::Parser;
use tracing::info;

use mcbt::cli::{init_tracing, TransferArgs};
use mcbt::{transport, BufferPool, Config, SendOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "mcbt-sender")]
#[command(about = "Multi-channel adaptive batch transfer: sender")]
struct Args {
    /// 수신자 주소
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    receiver: IpAddr,

    #[command(flatten)]
    transfer: TransferArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = Args::parse();
    let config = args.transfer.apply(Config::networked(args.receiver))?;

    info!("MCBT Sender starting...");
    info!("Receiver: {}:{}~", config.receiver_address, config.base_port);
    info!(
        "Blocks: {} | Channels: {} | Controller: {}",
        config.num_blocks, config.num_channels, config.controller_mode
    );
    info!(
        "Batch: initial {} / min {} / max {} / step {}",
        config.initial_batch_size, config.min_batch_size, config.max_batch_size, config.adjust_step
    );

    let buffer = BufferPool::for_config(&config)?;
    info!("Buffer: {} bytes (stride {})", buffer.capacity(), buffer.stride());
    let mut orchestrator = SendOrchestrator::new(config.clone(), buffer)?;

    let mut streams = transport::connect_channels(&config).await?;

    let report = orchestrator.run(&mut streams).await?;
    transport::shutdown_all(&mut streams).await?;

    if let Some(best) = report.best_trial() {
        info!("Best trial: {}", best.summary());
    }
    args.transfer.write_report(&report)?;

    Ok(())
}
