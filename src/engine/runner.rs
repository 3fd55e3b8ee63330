use super::events::EngineEvent;
use super::gate::SharedGate;
use super::launcher::{SharedLauncher, log_step};
use crate::config::SchedulerConfig;
use crate::scenario::{ControlDirective, Step};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Step 시퀀스를 순서대로 실행하는 엔진의 추상 계층이다.
#[async_trait]
pub trait Executor: Send + Sync {
    /// 시퀀스 전체가 끝날 때까지 블록한다.
    async fn run_seq(&self, config: &SchedulerConfig, steps: Vec<Step>) -> anyhow::Result<()>;
}

/// Executor를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedExecutor = Arc<dyn Executor>;

type RunningHandle = JoinHandle<(String, anyhow::Result<()>)>;

/// 워크로드를 비동기로 제출하고 제어 지시자에서 대기하는 기본 엔진이다.
pub struct SequenceRunner {
    launcher: SharedLauncher,
    gate: SharedGate,
    sender: UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
}

impl SequenceRunner {
    pub fn new(
        launcher: SharedLauncher,
        gate: SharedGate,
        sender: UnboundedSender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            launcher,
            gate,
            sender,
            cancel,
        }
    }

    async fn run_steps(&self, config: &SchedulerConfig, steps: Vec<Step>) -> anyhow::Result<()> {
        if steps.is_empty() {
            anyhow::bail!("실행할 Step이 없습니다.");
        }
        let config = Arc::new(config.clone());
        let mut running: FuturesUnordered<RunningHandle> = FuturesUnordered::new();
        let result = self.submit_all(&config, steps, &mut running).await;
        let result = match result {
            Ok(()) => self.drain(&mut running).await,
            Err(err) => Err(err),
        };
        if result.is_err() {
            for handle in running.iter() {
                handle.abort();
            }
        }
        result
    }

    async fn submit_all(
        &self,
        config: &Arc<SchedulerConfig>,
        steps: Vec<Step>,
        running: &mut FuturesUnordered<RunningHandle>,
    ) -> anyhow::Result<()> {
        for (index, step) in steps.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                anyhow::bail!("사용자에 의해 실행이 중단되었습니다.");
            }
            match step {
                Step::Workload(workload) => {
                    let step_id = format!("{index}:{}", workload.canonical_name());
                    let _ = self.sender.send(EngineEvent::StepStarted {
                        step_id: step_id.clone(),
                    });
                    let launcher = self.launcher.clone();
                    let tx = self.sender.clone();
                    let cfg = config.clone();
                    running.push(tokio::spawn(async move {
                        let outcome = launcher.launch(&cfg, &workload, &step_id, &tx).await;
                        (step_id, outcome)
                    }));
                }
                Step::Pause(directive) => {
                    let step_id = format!("{index}:{directive}");
                    let _ = self.sender.send(EngineEvent::StepStarted {
                        step_id: step_id.clone(),
                    });
                    match directive {
                        ControlDirective::Wait => {
                            log_step(
                                &self.sender,
                                &step_id,
                                &format!("실행 중인 워크로드 {}건 종료 대기", running.len()),
                            );
                            self.drain(running).await?;
                        }
                        ControlDirective::Manual => {
                            let prompt = format!("Step {index}: 운영자 확인 대기");
                            tokio::select! {
                                biased;
                                _ = self.cancel.cancelled() => {
                                    anyhow::bail!("사용자에 의해 실행이 중단되었습니다.");
                                }
                                outcome = self.gate.wait_for_operator(&prompt) => outcome?,
                            }
                        }
                    }
                    let _ = self.sender.send(EngineEvent::StepFinished {
                        step_id,
                        success: true,
                    });
                }
            }
        }
        Ok(())
    }

    /// 실행 중인 워크로드가 모두 끝날 때까지 기다린다. 첫 실패에서 중단한다.
    async fn drain(&self, running: &mut FuturesUnordered<RunningHandle>) -> anyhow::Result<()> {
        loop {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    anyhow::bail!("사용자에 의해 실행이 중단되었습니다.");
                }
                next = running.next() => next,
            };
            let Some(join_result) = joined else {
                return Ok(());
            };
            let (step_id, outcome) = join_result
                .map_err(|err| anyhow::anyhow!("워크로드 태스크 비정상 종료: {err}"))?;
            let success = outcome.is_ok();
            let _ = self.sender.send(EngineEvent::StepFinished {
                step_id: step_id.clone(),
                success,
            });
            if let Err(err) = outcome {
                return Err(err.context(format!("Step {step_id} 실패")));
            }
        }
    }
}

#[async_trait]
impl Executor for SequenceRunner {
    async fn run_seq(&self, config: &SchedulerConfig, steps: Vec<Step>) -> anyhow::Result<()> {
        let result = self.run_steps(config, steps).await;
        let _ = self.sender.send(EngineEvent::SequenceFinished {
            success: result.is_ok(),
        });
        result
    }
}
