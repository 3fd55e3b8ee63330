use super::context::TemplateContext;
use super::events::EngineEvent;
use crate::config::SchedulerConfig;
use crate::workload::WorkloadSpec;
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::codec::{FramedRead, LinesCodec};

/// 워크로드 한 건을 실제로 실행하는 추상 계층이다.
#[async_trait]
pub trait WorkloadLauncher: Send + Sync {
    /// 워크로드를 실행하고 종료될 때까지 대기한다.
    async fn launch(
        &self,
        config: &SchedulerConfig,
        workload: &WorkloadSpec,
        step_id: &str,
        sender: &UnboundedSender<EngineEvent>,
    ) -> anyhow::Result<()>;
}

/// WorkloadLauncher를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedLauncher = Arc<dyn WorkloadLauncher>;

/// 설정에 실행 명령이 있으면 프로세스 실행기를, 없으면 dry-run 실행기를 고른다.
pub fn launcher_for(config: &SchedulerConfig) -> SharedLauncher {
    match &config.launch_command {
        Some(template) => Arc::new(ProcessLauncher::new(template.clone())),
        None => Arc::new(DryRunLauncher),
    }
}

/// 실제 프로세스 없이 로그만 남기는 기본 구현이다.
#[derive(Debug, Default, Clone)]
pub struct DryRunLauncher;

#[async_trait]
impl WorkloadLauncher for DryRunLauncher {
    async fn launch(
        &self,
        config: &SchedulerConfig,
        workload: &WorkloadSpec,
        step_id: &str,
        sender: &UnboundedSender<EngineEvent>,
    ) -> anyhow::Result<()> {
        log_step(
            sender,
            step_id,
            &format!(
                "[dry-run] {workload} 제출 (preset={}, scheduler={}, wc={}, log={}, output={})",
                config.preset,
                config.scheduler,
                config.work_conservation,
                config.log_level,
                config.output_dir.display()
            ),
        );
        tokio::task::yield_now().await;
        Ok(())
    }
}

/// 명령 템플릿을 셸로 실행하는 구현이다.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    /// `${MODEL}` 등의 플레이스홀더를 포함한 명령 템플릿.
    template: String,
}

impl ProcessLauncher {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl WorkloadLauncher for ProcessLauncher {
    /// 템플릿을 치환한 명령을 실행하고 표준 출력/에러를 로그 이벤트로 전달한다.
    async fn launch(
        &self,
        config: &SchedulerConfig,
        workload: &WorkloadSpec,
        step_id: &str,
        sender: &UnboundedSender<EngineEvent>,
    ) -> anyhow::Result<()> {
        let script = TemplateContext::for_workload(config, workload)
            .expand_required(&self.template, "launch_command")?;
        let mut command = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&script);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&script);
            cmd
        };
        if !config.env.is_empty() {
            command.envs(&config.env);
        }
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());
        command.kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        log_step(sender, step_id, &format!("실행: {script}"));
        let mut child = command
            .spawn()
            .with_context(|| format!("워크로드 실행 실패: {script}"))?;
        let _group = ProcessGroupGuard { pgid: child.id() };
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_forwarder(
                stdout,
                sender.clone(),
                step_id.to_string(),
                "STDOUT",
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_forwarder(
                stderr,
                sender.clone(),
                step_id.to_string(),
                "STDERR",
            ));
        }
        let status = child
            .wait()
            .await
            .with_context(|| format!("워크로드 대기 실패: {}", workload.canonical_name()))?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "워크로드 {} 종료 코드: {status}",
                workload.canonical_name()
            ))
        }
    }
}

/// 워크로드가 끝나거나 태스크가 중단되면 셸이 만든 프로세스 그룹 전체를 종료한다.
#[cfg_attr(not(unix), allow(dead_code))]
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;
            if let Some(pgid) = self.pgid.and_then(|id| i32::try_from(id).ok()) {
                // 이미 모두 종료된 그룹이면 ESRCH가 난다.
                let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
            }
        }
    }
}

/// Step 로그를 전송한다.
pub(super) fn log_step(sender: &UnboundedSender<EngineEvent>, step_id: &str, line: &str) {
    let _ = sender.send(EngineEvent::StepLog {
        step_id: step_id.to_string(),
        line: line.to_string(),
    });
}

/// 프로세스 파이프를 읽어 로그 이벤트로 중계한다.
async fn pipe_forwarder<R>(
    reader: R,
    sender: UnboundedSender<EngineEvent>,
    step_id: String,
    tag: &'static str,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new());
    while let Some(line_result) = lines.next().await {
        match line_result {
            Ok(line) => {
                let _ = sender.send(EngineEvent::StepLog {
                    step_id: step_id.clone(),
                    line: format!("{tag}: {line}"),
                });
            }
            Err(err) => {
                let _ = sender.send(EngineEvent::StepLog {
                    step_id: step_id.clone(),
                    line: format!("{tag} 읽기 오류: {err}"),
                });
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::workload::WorkloadFactory;

    #[tokio::test]
    async fn process_launcher_forwards_output_and_succeeds() {
        let config = Preset::Debugging.config();
        let workload = WorkloadFactory
            .create("resnet50", 50, 798)
            .expect("워크로드 생성 실패");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ProcessLauncher::new("echo ${NAME} ${STEPS}")
            .launch(&config, &workload, "0:resnet50_50", &tx)
            .await
            .expect("프로세스 실행 실패");
        drop(tx);
        let mut lines = Vec::new();
        while let Some(event) = rx.recv().await {
            if let EngineEvent::StepLog { line, .. } = event {
                lines.push(line);
            }
        }
        assert!(lines.iter().any(|l| l == "STDOUT: resnet50_50 798"), "{lines:?}");
    }

    #[tokio::test]
    async fn process_launcher_reports_non_zero_exit() {
        let config = Preset::Debugging.config();
        let workload = WorkloadFactory
            .create("vgg11", 25, 10)
            .expect("워크로드 생성 실패");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = ProcessLauncher::new("exit 3")
            .launch(&config, &workload, "0:vgg11_25", &tx)
            .await
            .expect_err("비정상 종료는 실패해야 한다");
        assert!(err.to_string().contains("vgg11_25"));
    }

    #[tokio::test]
    async fn background_children_die_with_the_workload() {
        let config = Preset::Debugging.config();
        let workload = WorkloadFactory
            .create("resnet101", 16, 5)
            .expect("워크로드 생성 실패");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ProcessLauncher::new("sleep 30 & echo ${NAME}")
            .launch(&config, &workload, "0:resnet101_16", &tx)
            .await
            .expect("프로세스 실행 실패");
        drop(tx);
        let closed = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "백그라운드 자식이 파이프를 붙잡고 있다");
    }

    #[tokio::test]
    async fn unresolved_template_fails_before_spawning() {
        let config = Preset::Debugging.config();
        let workload = WorkloadFactory
            .create("alexnet", 25, 10)
            .expect("워크로드 생성 실패");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = ProcessLauncher::new("run ${MODEL_NAME}")
            .launch(&config, &workload, "0:alexnet_25", &tx)
            .await;
        assert!(result.is_err());
        drop(tx);
        assert!(rx.recv().await.is_none(), "실행 로그가 없어야 한다");
    }
}
