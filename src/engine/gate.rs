use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Manual 대기 지점에서 운영자의 진행 신호를 기다리는 추상 계층이다.
#[async_trait]
pub trait ManualGate: Send + Sync {
    /// 운영자가 진행을 허락할 때까지 대기한다.
    async fn wait_for_operator(&self, prompt: &str) -> anyhow::Result<()>;
}

/// ManualGate를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedGate = Arc<dyn ManualGate>;

type LineReceiver = Mutex<UnboundedReceiver<std::io::Result<String>>>;

/// 입력 스트림에서 엔터 입력을 기다리는 기본 구현이다.
///
/// 블로킹 읽기는 런타임 밖의 전용 스레드가 맡는다. 대기 중 취소되어도
/// 런타임 종료가 읽기 완료를 기다리지 않는다.
pub struct StdinGate {
    /// 첫 대기 전까지 보관하는 입력 스트림.
    source: std::sync::Mutex<Option<Box<dyn BufRead + Send>>>,
    /// 읽기 스레드가 보내는 라인 채널.
    lines: OnceCell<LineReceiver>,
}

impl StdinGate {
    /// 표준 입력을 감싸는 게이트를 생성한다.
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(std::io::stdin()))
    }

    /// 임의의 입력 스트림을 감싸는 게이트를 생성한다. 첫 대기 시점에 읽기를 시작한다.
    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            source: std::sync::Mutex::new(Some(Box::new(reader))),
            lines: OnceCell::new(),
        }
    }

    fn start_reader(&self) -> anyhow::Result<LineReceiver> {
        let reader = self
            .source
            .lock()
            .map_err(|_| anyhow::anyhow!("입력 스트림 잠금이 오염되었습니다."))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("입력 스트림이 이미 사용되었습니다."))?;
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("manual-gate-input".into())
            .spawn(move || {
                for line in reader.lines() {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .context("입력 읽기 스레드 생성 실패")?;
        Ok(Mutex::new(rx))
    }
}

impl Default for StdinGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManualGate for StdinGate {
    async fn wait_for_operator(&self, prompt: &str) -> anyhow::Result<()> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(format!("{prompt} [Enter로 계속]\n").as_bytes())
            .await?;
        stderr.flush().await?;
        let lines = self.lines.get_or_try_init(|| self.start_reader())?;
        match lines.lock().await.recv().await {
            Some(Ok(_)) => Ok(()),
            Some(Err(err)) => Err(anyhow::anyhow!("입력 읽기 오류: {err}")),
            None => anyhow::bail!("입력이 닫혀 Manual 대기를 계속할 수 없습니다."),
        }
    }
}

/// 대기 없이 바로 진행하는 구현이다. 무인 실행에서 사용한다.
#[derive(Debug, Default, Clone)]
pub struct AutoGate;

#[async_trait]
impl ManualGate for AutoGate {
    async fn wait_for_operator(&self, prompt: &str) -> anyhow::Result<()> {
        tracing::info!("{prompt} (자동 진행)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// 데이터를 영영 보내지 않는 입력 스트림이다.
    struct StalledReader(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for StalledReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn each_line_releases_one_wait() {
        let gate = StdinGate::from_reader(Cursor::new("\ngo\n"));
        gate.wait_for_operator("first").await.expect("첫 대기 실패");
        gate.wait_for_operator("second").await.expect("둘째 대기 실패");
        let err = gate
            .wait_for_operator("third")
            .await
            .expect_err("입력이 끝나면 실패해야 한다");
        assert!(err.to_string().contains("입력이 닫혀"));
    }

    #[tokio::test]
    async fn dropped_wait_does_not_hold_runtime() {
        let (_keep, stall) = std::sync::mpsc::channel();
        let gate = StdinGate::from_reader(BufReader::new(StalledReader(stall)));
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            gate.wait_for_operator("stalled"),
        )
        .await;
        assert!(waited.is_err(), "입력 없이 진행되면 안 된다");
    }
}
