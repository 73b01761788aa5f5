//! 적응형 배치 크기 컨트롤러
//!
//! 배치 전송 시간을 관측해서 배치 크기(블록 수)를 가감한다.
//! - best_duration보다 5% 이상 빨라야 기준값 갱신 (측정 노이즈 흡수)
//! - best_duration * load_threshold 초과 시 고부하로 보고 감소
//! - 그 외에는 항상 증가 (max_batch_size를 넘으면 유지)

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::ControllerMode;
use crate::{Error, Result};

/// best_duration 갱신에 필요한 개선 비율
pub const IMPROVEMENT_RATIO: f64 = 0.95;

/// 컨트롤러 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerParams {
    pub initial_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub load_threshold: f64,
    pub adjust_step: usize,
}

impl ControllerParams {
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_size == 0 {
            return Err(Error::config("min_batch_size는 1 이상이어야 함"));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(Error::config(format!(
                "min_batch_size({}) > max_batch_size({})",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if !(self.min_batch_size..=self.max_batch_size).contains(&self.initial_batch_size) {
            return Err(Error::config(format!(
                "initial_batch_size({})가 [{}, {}] 범위 밖",
                self.initial_batch_size, self.min_batch_size, self.max_batch_size
            )));
        }
        if self.adjust_step == 0 {
            return Err(Error::config("adjust_step은 1 이상이어야 함"));
        }
        if !self.load_threshold.is_finite() || self.load_threshold <= 0.0 {
            return Err(Error::config(format!(
                "load_threshold({})는 양의 유한값이어야 함",
                self.load_threshold
            )));
        }
        Ok(())
    }
}

/// 한 번의 관측으로 일어난 변화
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// 고부하, 배치 감소
    Decreased { from: usize, to: usize },
    /// 정상 부하, 배치 증가
    Increased { from: usize, to: usize },
    /// 변화 없음 (상한/하한 도달)
    Unchanged { size: usize, high_load: bool },
}

impl Adjustment {
    pub fn new_size(&self) -> usize {
        match *self {
            Adjustment::Decreased { to, .. } | Adjustment::Increased { to, .. } => to,
            Adjustment::Unchanged { size, .. } => size,
        }
    }
}

/// AIAD 배치 컨트롤러
#[derive(Debug, Clone)]
pub struct BatchController {
    params: ControllerParams,
    current_batch_size: usize,
    /// 지금까지 관측된 최선 배치 시간 (초), 단조 감소
    best_duration: f64,
}

impl BatchController {
    pub fn new(params: ControllerParams) -> Self {
        Self {
            current_batch_size: params.initial_batch_size,
            best_duration: f64::INFINITY,
            params,
        }
    }

    /// 현재 배치 크기 (블록 수)
    pub fn current_batch_size(&self) -> usize {
        self.current_batch_size
    }

    /// 최선 배치 시간 (초), 관측 전에는 무한대
    pub fn best_duration(&self) -> f64 {
        self.best_duration
    }

    /// 호출 위치: 배치 송신 완료 시
    pub fn on_batch_complete(&mut self, elapsed: Duration) -> Adjustment {
        self.observe(elapsed.as_secs_f64())
    }

    /// 관측된 배치 시간(초)으로 상태 전이
    pub fn observe(&mut self, duration: f64) -> Adjustment {
        if duration < self.best_duration * IMPROVEMENT_RATIO {
            self.best_duration = duration;
        }

        let high_load = duration > self.best_duration * self.params.load_threshold;
        let from = self.current_batch_size;

        if high_load {
            let to = from
                .saturating_sub(self.params.adjust_step)
                .max(self.params.min_batch_size);
            if to == from {
                return Adjustment::Unchanged {
                    size: from,
                    high_load,
                };
            }
            self.current_batch_size = to;
            Adjustment::Decreased { from, to }
        } else {
            match from.checked_add(self.params.adjust_step) {
                Some(to) if to <= self.params.max_batch_size => {
                    self.current_batch_size = to;
                    Adjustment::Increased { from, to }
                }
                _ => Adjustment::Unchanged {
                    size: from,
                    high_load,
                },
            }
        }
    }
}

/// 채널 간 공유 가능한 컨트롤러 핸들
///
/// 락은 배치 사이에만 짧게 잡히고 await 구간에서는 잡히지 않는다.
pub type SharedController = Arc<Mutex<BatchController>>;

/// 채널별 컨트롤러 묶음
///
/// `Shared` 모드면 모든 채널이 같은 인스턴스를, `PerChannel`이면 각자 인스턴스를 가진다.
/// 어느 쪽이든 실행 전체 동안 유지된다.
#[derive(Debug, Clone)]
pub struct ControllerSet {
    mode: ControllerMode,
    controllers: Vec<SharedController>,
}

impl ControllerSet {
    pub fn new(mode: ControllerMode, num_channels: usize, params: ControllerParams) -> Self {
        let controllers = match mode {
            ControllerMode::Shared => {
                let shared = Arc::new(Mutex::new(BatchController::new(params)));
                vec![shared; num_channels]
            }
            ControllerMode::PerChannel => (0..num_channels)
                .map(|_| Arc::new(Mutex::new(BatchController::new(params))))
                .collect(),
        };

        Self { mode, controllers }
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// 채널 컨트롤러 핸들
    pub fn for_channel(&self, channel_id: usize) -> Option<SharedController> {
        self.controllers.get(channel_id).cloned()
    }

    /// 채널별 현재 배치 크기
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.controllers
            .iter()
            .map(|c| c.lock().current_batch_size())
            .collect()
    }
}
