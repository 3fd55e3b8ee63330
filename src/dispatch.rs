use crate::config::SchedulerConfig;
use crate::engine::SharedExecutor;
use crate::scenario::ScenarioName;
use crate::workload::WorkloadFactory;
use std::path::PathBuf;

/// 시나리오 이름을 Step 시퀀스로 바꿔 엔진에 넘기는 디스패처이다.
pub struct Dispatcher {
    /// 모든 시나리오가 공유하는 기준 설정. 읽기 전용으로만 사용한다.
    base: SchedulerConfig,
    /// 실행 결과를 저장할 디렉터리.
    save_dir: PathBuf,
    executor: SharedExecutor,
    wtl: WorkloadFactory,
}

impl Dispatcher {
    pub fn new(base: SchedulerConfig, save_dir: impl Into<PathBuf>, executor: SharedExecutor) -> Self {
        Self {
            base,
            save_dir: save_dir.into(),
            executor,
            wtl: WorkloadFactory,
        }
    }

    /// 명령행 토큰을 해석해 시나리오를 실행한다. 토큰이 없으면 `test`를 실행한다.
    ///
    /// 알 수 없는 토큰이면 엔진을 호출하지 않고 [`crate::scenario::UnknownScenario`]로 실패한다.
    pub async fn dispatch(&self, token: Option<&str>) -> anyhow::Result<()> {
        let name = match token {
            Some(token) => token.parse::<ScenarioName>()?,
            None => ScenarioName::default(),
        };
        self.run(name).await
    }

    /// 지정한 시나리오를 한 번 실행한다.
    pub async fn run(&self, name: ScenarioName) -> anyhow::Result<()> {
        let config = self.base.copy_with_output_dir(&self.save_dir);
        let steps = name.build_steps(&self.wtl)?;
        debug_assert!(!steps.is_empty(), "시나리오 {name}의 Step이 비어 있습니다.");
        tracing::info!(
            scenario = %name,
            steps = steps.len(),
            output_dir = %config.output_dir.display(),
            "시나리오 실행"
        );
        self.executor.run_seq(&config, steps).await
    }
}
