use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// 엔진에서 바깥으로 전달되는 진행 이벤트 모델이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Step 시작 알림.
    StepStarted { step_id: String },
    /// Step별 로그 라인.
    StepLog { step_id: String, line: String },
    /// Step 종료 알림.
    StepFinished { step_id: String, success: bool },
    /// 전체 시퀀스 종료.
    SequenceFinished { success: bool },
}

/// 이벤트를 받아 tracing 로그로 출력하는 태스크를 띄운다.
///
/// 송신 측이 모두 drop되면 태스크도 종료된다.
pub fn spawn_event_logger(mut rx: UnboundedReceiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::StepStarted { step_id } => {
                    tracing::info!(step = %step_id, "Step 시작");
                }
                EngineEvent::StepLog { step_id, line } => {
                    tracing::debug!(step = %step_id, "{line}");
                }
                EngineEvent::StepFinished { step_id, success: true } => {
                    tracing::info!(step = %step_id, "Step 완료");
                }
                EngineEvent::StepFinished { step_id, success: false } => {
                    tracing::warn!(step = %step_id, "Step 실패");
                }
                EngineEvent::SequenceFinished { success } => {
                    tracing::info!(success, "시퀀스 종료");
                }
            }
        }
    })
}
