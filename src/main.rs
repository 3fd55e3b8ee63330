mod config;
mod dispatch;
mod engine;
mod scenario;
mod workload;

use clap::Parser;
use config::{ConfigOverrides, Preset, PresetResolver, load_overrides_from_file};
use dispatch::Dispatcher;
use engine::{AutoGate, SequenceRunner, SharedGate, StdinGate, launcher_for, spawn_event_logger};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// fair 스케줄러(work conservation 활성)의 메모리 고갈 현상을 재현하는 워크로드 시퀀스를 제출한다.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// 실행할 시나리오 이름 (case1, case2, test)
    scenario: Option<String>,

    /// 실행 결과를 저장할 디렉터리
    #[arg(long, env = "REPRO_SAVE_DIR", default_value = "templogs")]
    save_dir: PathBuf,

    /// 기본 프리셋(Debugging) 대신 사용할 프리셋
    #[arg(long, env = "REPRO_FORCE_PRESET")]
    force_preset: Option<String>,

    /// 프리셋 위에 덮어쓸 YAML 설정 파일
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// 워크로드 실행 명령 템플릿 (예: "train.sh ${MODEL} ${BATCH_SIZE} ${STEPS}")
    #[arg(long)]
    launch_cmd: Option<String>,

    /// Manual 대기 지점에서 입력을 기다리지 않고 진행한다
    #[arg(long)]
    auto_continue: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

/// 치명적 오류를 원인 체인과 함께 한 번만 기록하고 실패 종료 코드를 돌려준다.
fn report_failure(err: &anyhow::Error) -> ExitCode {
    tracing::error!("{err:#}");
    ExitCode::FAILURE
}

/// 설정을 해석하고 엔진을 구성한 뒤 시나리오 하나를 끝까지 실행한다.
async fn run(args: Args) -> anyhow::Result<()> {
    let mut base = PresetResolver::new(args.force_preset).resolve(Preset::Debugging)?;
    if let Some(path) = &args.config {
        base = base.apply_overrides(&load_overrides_from_file(path)?);
    }
    if let Some(command) = args.launch_cmd {
        base = base.apply_overrides(&ConfigOverrides {
            launch_command: Some(command),
            ..ConfigOverrides::default()
        });
    }
    tracing::debug!(?base, "기준 설정");

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let logger = spawn_event_logger(rx);
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if cancel.is_cancelled() {
                    tracing::warn!("중단 신호 재수신, 즉시 종료합니다.");
                    std::process::exit(130);
                }
                tracing::warn!("중단 신호 수신, 시퀀스를 취소합니다.");
                cancel.cancel();
            }
        }
    });

    let gate: SharedGate = if args.auto_continue {
        Arc::new(AutoGate)
    } else {
        Arc::new(StdinGate::new())
    };
    let runner = SequenceRunner::new(launcher_for(&base), gate, tx, cancel);
    let dispatcher = Dispatcher::new(base, args.save_dir, Arc::new(runner));
    let result = dispatcher.dispatch(args.scenario.as_deref()).await;

    drop(dispatcher);
    // 중단된 워크로드의 파이프가 늦게 닫히더라도 종료를 막지 않는다.
    if tokio::time::timeout(Duration::from_secs(2), logger).await.is_err() {
        tracing::warn!("이벤트 로그 정리가 지연되어 기다리지 않고 종료합니다.");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;
    use std::sync::Mutex;

    /// 로그 출력을 메모리에 모으는 writer이다.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| std::io::Error::other("lock poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn failure_is_reported_once_with_its_cause() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer({
                let captured = captured.clone();
                move || captured.clone()
            })
            .finish();
        let err = anyhow::anyhow!("입력이 닫혔습니다").context("Step 2:Manual 실패");
        tracing::subscriber::with_default(subscriber, || report_failure(&err));
        let output = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        assert_eq!(output.matches("Step 2:Manual 실패").count(), 1, "{output}");
        assert!(output.contains("입력이 닫혔습니다"), "{output}");
        assert_eq!(output.lines().count(), 1, "{output}");
    }
}
