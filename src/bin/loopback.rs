//! MCBT 루프백
//!
//! 송신자와 수신자를 한 프로세스에서 메모리 채널로 연결해 실행한다.
//! 기본값은 시뮬레이션 프리셋 (8채널, 공유 컨트롤러, 큰 초기 배치).
//!
//! 사용법:
//!   cargo run --release --bin mcbt-loopback -- [OPTIONS]

use clap::Parser;
use tracing::info;

use mcbt::cli::{init_tracing, TransferArgs};
use mcbt::{loopback, Config};

#[derive(Parser, Debug)]
#[command(name = "mcbt-loopback")]
#[command(about = "Multi-channel adaptive batch transfer: in-process loopback")]
struct Args {
    /// 소형 설정으로 빠르게 확인
    #[arg(long)]
    smoke: bool,

    #[command(flatten)]
    transfer: TransferArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = Args::parse();
    let preset = if args.smoke {
        Config::smoke_test()
    } else {
        Config::simulated()
    };
    let config = args.transfer.apply(preset)?;

    let report = loopback::run(config).await?;

    info!("Sender: {}", report.sender.summary());
    info!("Receiver: {}", report.receiver.summary());
    for trial in &report.receiver.trials {
        info!("  {}", trial.summary());
    }
    args.transfer.write_report(&report)?;

    Ok(())
}
