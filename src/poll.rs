// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POLLING: BACKOFF, MÁQUINA DE ESTADOS, RELÓGIO E CANCELAMENTO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Tudo aqui é puro ou injetável: o loop de espera em `interaction` usa um
// `Clock` e um `CancellationSignal`, então testes rodam sem tempo real.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::types::InteractionStatus;

// ─────────────────────────────────────────────────
// Backoff
// ─────────────────────────────────────────────────

/// Agenda exponencial com teto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    /// Espera antes da segunda consulta
    pub initial: Duration,
    /// Fator de crescimento por tentativa
    pub multiplier: u32,
    /// Teto de cada espera
    pub max: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            multiplier: 2,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffSchedule {
    /// Espera depois da consulta número `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt.min(30));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

// ─────────────────────────────────────────────────
// Máquina de estados
// ─────────────────────────────────────────────────

/// Observação de uma rodada de polling.
#[derive(Debug, Clone, PartialEq)]
pub enum PollObservation {
    /// `get_status` respondeu
    Status {
        /// Status normalizado
        status: InteractionStatus,
        /// Mensagem de erro do upstream
        error: Option<String>,
    },
    /// `get_status` falhou de forma transitória
    TransientFailure,
}

/// Estado do loop de espera.
///
/// Transições:
/// - `Submitted`/`Polling` + status não terminal → `Polling`
/// - `Completed` → `Completed`; `Failed`/`Cancelled` → `Failed`
/// - qualquer observação com `elapsed >= ceiling` → `TimedOutLocally`
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// Submetida, ainda sem observação
    Submitted,
    /// Aguardando
    Polling {
        /// Rodadas já feitas
        attempt: u32,
        /// Último status conhecido
        last_status: InteractionStatus,
    },
    /// Concluída no upstream
    Completed,
    /// Terminou sem resultado
    Failed {
        /// Status terminal
        status: InteractionStatus,
        /// Mensagem do upstream
        error: Option<String>,
    },
    /// Teto local atingido
    TimedOutLocally {
        /// Último status conhecido
        last_status: InteractionStatus,
    },
}

impl PollState {
    /// Estado terminal do loop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed { .. } | Self::TimedOutLocally { .. }
        )
    }

    /// Último status conhecido do upstream
    pub fn last_status(&self) -> InteractionStatus {
        match self {
            Self::Submitted => InteractionStatus::Pending,
            Self::Polling { last_status, .. } | Self::TimedOutLocally { last_status } => {
                *last_status
            }
            Self::Completed => InteractionStatus::Completed,
            Self::Failed { status, .. } => *status,
        }
    }

    /// Rodadas de polling já feitas
    pub fn attempt(&self) -> u32 {
        match self {
            Self::Polling { attempt, .. } => *attempt,
            _ => 0,
        }
    }

    /// Aplica uma observação. Estados terminais não mudam mais.
    pub fn next(&self, observation: PollObservation, elapsed: Duration, ceiling: Duration) -> Self {
        if self.is_terminal() {
            return self.clone();
        }

        let attempt = self.attempt() + 1;
        let last_status = match &observation {
            PollObservation::Status { status, .. } => *status,
            PollObservation::TransientFailure => self.last_status(),
        };

        match observation {
            PollObservation::Status {
                status: InteractionStatus::Completed,
                ..
            } => Self::Completed,
            PollObservation::Status { status, error } if status.is_terminal() => {
                Self::Failed { status, error }
            }
            _ if elapsed >= ceiling => Self::TimedOutLocally { last_status },
            _ => Self::Polling {
                attempt,
                last_status,
            },
        }
    }
}

// ─────────────────────────────────────────────────
// Relógio
// ─────────────────────────────────────────────────

/// Fonte de tempo injetável.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Instante atual
    fn now(&self) -> Instant;

    /// Dorme pela duração indicada
    async fn sleep(&self, duration: Duration);
}

/// Relógio real (tokio).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Relógio manual para testes: `sleep` avança o tempo na hora e fica
/// registrado.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Cria um relógio parado no instante atual.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Avança o tempo sem registrar sleep.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }

    /// Sleeps pedidos até agora, em ordem
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Tempo decorrido desde a criação
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|o| *o).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ─────────────────────────────────────────────────
// Cancelamento
// ─────────────────────────────────────────────────

/// Sinal de cancelamento da espera local.
///
/// Cancelar só para de esperar; a tarefa continua no upstream e pode ser
/// retomada pelo id.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationSignal {
    /// Cria um sinal não disparado.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispara o sinal e acorda quem estiver esperando.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Já foi disparado?
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve quando o sinal for disparado.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_for(0), Duration::from_secs(5));
        assert_eq!(schedule.delay_for(1), Duration::from_secs(10));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(20));
        assert_eq!(schedule.delay_for(3), Duration::from_secs(30));
        assert_eq!(schedule.delay_for(50), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_multiplier_zero_is_constant() {
        let schedule = BackoffSchedule {
            initial: Duration::from_secs(2),
            multiplier: 0,
            max: Duration::from_secs(60),
        };
        assert_eq!(schedule.delay_for(4), Duration::from_secs(2));
    }

    #[test]
    fn test_poll_state_transitions() {
        let ceiling = Duration::from_secs(100);
        let state = PollState::Submitted;

        let state = state.next(
            PollObservation::Status {
                status: InteractionStatus::Pending,
                error: None,
            },
            Duration::from_secs(1),
            ceiling,
        );
        assert_eq!(
            state,
            PollState::Polling {
                attempt: 1,
                last_status: InteractionStatus::Pending
            }
        );

        let state = state.next(PollObservation::TransientFailure, Duration::from_secs(10), ceiling);
        assert_eq!(state.attempt(), 2);
        assert_eq!(state.last_status(), InteractionStatus::Pending);

        let state = state.next(
            PollObservation::Status {
                status: InteractionStatus::Completed,
                error: None,
            },
            Duration::from_secs(20),
            ceiling,
        );
        assert_eq!(state, PollState::Completed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_poll_state_failure_and_timeout() {
        let ceiling = Duration::from_secs(60);
        let failed = PollState::Submitted.next(
            PollObservation::Status {
                status: InteractionStatus::Cancelled,
                error: Some("stopped".into()),
            },
            Duration::ZERO,
            ceiling,
        );
        assert_eq!(
            failed,
            PollState::Failed {
                status: InteractionStatus::Cancelled,
                error: Some("stopped".into())
            }
        );

        let timed_out = PollState::Submitted.next(
            PollObservation::Status {
                status: InteractionStatus::Running,
                error: None,
            },
            Duration::from_secs(60),
            ceiling,
        );
        assert_eq!(
            timed_out,
            PollState::TimedOutLocally {
                last_status: InteractionStatus::Running
            }
        );
    }

    #[test]
    fn test_completion_wins_over_ceiling() {
        let state = PollState::Submitted.next(
            PollObservation::Status {
                status: InteractionStatus::Completed,
                error: None,
            },
            Duration::from_secs(7200),
            Duration::from_secs(60),
        );
        assert_eq!(state, PollState::Completed);
    }

    #[tokio::test]
    async fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(5)).await;
        clock.sleep(Duration::from_secs(10)).await;
        assert_eq!(clock.now() - start, Duration::from_secs(15));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[tokio::test]
    async fn test_cancellation_signal_wakes_waiter() {
        let signal = CancellationSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        signal.cancel();
        handle.await.unwrap();
        assert!(signal.is_cancelled());
    }
}
