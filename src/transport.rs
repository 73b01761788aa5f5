//! TCP 채널 연결
//!
//! 채널 i는 `base_port + i` 포트의 TCP 연결 하나를 쓴다.
//! 수신측이 포트마다 리스너를 열고 연결 하나씩 받으며, 송신측이 접속한다.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::future::try_join_all;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::config::Config;
use crate::{Error, Result};

/// 접속 재시도 횟수 (수신측 리스너가 아직 안 열렸을 때)
pub const CONNECT_ATTEMPTS: u32 = 50;

/// 접속 재시도 간격
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

async fn connect_one(addr: SocketAddr, channel_id: usize) -> Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!("[채널{}] 연결됨: {}", channel_id, addr);
                return Ok(stream);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                debug!("[채널{}] 연결 재시도 {}/{}: {}", channel_id, attempt, CONNECT_ATTEMPTS, e);
                attempt += 1;
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// 송신측: 채널 수만큼 `receiver_address`에 접속
///
/// 반환 순서가 채널 ID 순서다.
pub async fn connect_channels(config: &Config) -> Result<Vec<TcpStream>> {
    let addrs = (0..config.num_channels)
        .map(|id| config.channel_addr(id))
        .collect::<Result<Vec<_>>>()?;

    let streams = try_join_all(
        addrs
            .into_iter()
            .enumerate()
            .map(|(id, addr)| connect_one(addr, id)),
    )
    .await?;

    info!(
        "{} 채널 연결 완료: {}:{}~",
        config.num_channels, config.receiver_address, config.base_port
    );
    Ok(streams)
}

/// 수신측: 채널별 리스너 생성
///
/// 포트 계산이 하나라도 실패하면 아무것도 바인드하지 않는다.
pub async fn bind_listeners(config: &Config, bind_ip: IpAddr) -> Result<Vec<TcpListener>> {
    let addrs = (0..config.num_channels)
        .map(|id| Ok(SocketAddr::new(bind_ip, config.channel_port(id)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut listeners = Vec::with_capacity(addrs.len());
    for (id, addr) in addrs.into_iter().enumerate() {
        listeners.push(TcpListener::bind(addr).await?);
        debug!("[채널{}] 대기: {}", id, addr);
    }
    Ok(listeners)
}

/// 리스너마다 연결 하나씩 수락 (동시에)
pub async fn accept_all(listeners: &[TcpListener]) -> Result<Vec<TcpStream>> {
    let streams = try_join_all(listeners.iter().enumerate().map(|(id, listener)| async move {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!("[채널{}] 수락: {}", id, peer);
        Ok::<_, Error>(stream)
    }))
    .await?;

    info!("{} 채널 수락 완료", streams.len());
    Ok(streams)
}

/// 수신측: 리스너 생성 후 채널 연결 수락
pub async fn accept_channels(config: &Config, bind_ip: IpAddr) -> Result<Vec<TcpStream>> {
    info!("{} 채널 대기: {}:{}~", config.num_channels, bind_ip, config.base_port);
    let listeners = bind_listeners(config, bind_ip).await?;
    accept_all(&listeners).await
}

/// 모든 채널 쓰기 방향 종료
pub async fn shutdown_all(streams: &mut [TcpStream]) -> Result<()> {
    for stream in streams.iter_mut() {
        stream.shutdown().await?;
    }
    Ok(())
}
