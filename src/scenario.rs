use crate::workload::{WorkloadError, WorkloadFactory, WorkloadSpec};
use std::fmt;
use std::str::FromStr;

/// 워크로드 제출 대신 동기화 지점을 나타내는 제어 지시자이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlDirective {
    /// 앞서 제출한 워크로드가 모두 끝날 때까지 대기한다.
    Wait,
    /// 운영자가 계속 진행을 알릴 때까지 대기한다.
    Manual,
}

impl fmt::Display for ControlDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlDirective::Wait => f.write_str("Wait"),
            ControlDirective::Manual => f.write_str("Manual"),
        }
    }
}

/// Step은 시나리오를 구성하는 최소 실행 단위이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// 워크로드 한 건을 제출한다.
    Workload(WorkloadSpec),
    /// 제어 지시자에 따라 대기한다.
    Pause(ControlDirective),
}

impl From<WorkloadSpec> for Step {
    fn from(spec: WorkloadSpec) -> Self {
        Step::Workload(spec)
    }
}

impl From<ControlDirective> for Step {
    fn from(directive: ControlDirective) -> Self {
        Step::Pause(directive)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Workload(spec) => write!(f, "{spec}"),
            Step::Pause(directive) => write!(f, "Pause::{directive}"),
        }
    }
}

/// 알 수 없는 시나리오 이름이 주어졌을 때의 오류이다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("알 수 없는 시나리오입니다: '{token}' (사용 가능: {valid})")]
pub struct UnknownScenario {
    /// 입력된 토큰.
    pub token: String,
    /// 사용 가능한 시나리오 이름 목록.
    pub valid: String,
}

/// 등록된 재현 시나리오 목록이다.
///
/// 새 시나리오는 변형을 추가하고 [`ScenarioName::build_steps`]에 순서를 정의한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScenarioName {
    Case1,
    Case2,
    #[default]
    Test,
}

impl ScenarioName {
    /// 등록된 모든 시나리오.
    pub const ALL: [ScenarioName; 3] = [ScenarioName::Case1, ScenarioName::Case2, ScenarioName::Test];

    /// 명령행 토큰으로 사용하는 이름이다.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioName::Case1 => "case1",
            ScenarioName::Case2 => "case2",
            ScenarioName::Test => "test",
        }
    }

    /// 시나리오의 Step 순서를 구성한다.
    pub fn build_steps(&self, wtl: &WorkloadFactory) -> Result<Vec<Step>, WorkloadError> {
        match self {
            ScenarioName::Case1 => case1(wtl),
            ScenarioName::Case2 => case2(wtl),
            ScenarioName::Test => test(wtl),
        }
    }
}

impl fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioName {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownScenario {
                token: s.to_string(),
                valid: ScenarioName::ALL
                    .iter()
                    .map(ScenarioName::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

fn case1(wtl: &WorkloadFactory) -> Result<Vec<Step>, WorkloadError> {
    Ok(vec![
        wtl.create("inception3", 100, 165)?.into(),
        wtl.create("resnet50", 50, 798)?.into(),
        wtl.create("resnet152", 75, 19)?.into(),
        ControlDirective::Wait.into(),
        ControlDirective::Manual.into(),
        wtl.create("inception3", 100, 165)?.into(),
        wtl.create("resnet50", 50, 798)?.into(),
        wtl.create("resnet152", 75, 19)?.into(),
    ])
}

fn case2(wtl: &WorkloadFactory) -> Result<Vec<Step>, WorkloadError> {
    Ok(vec![
        wtl.create("resnet50", 50, 798)?.into(),
        ControlDirective::Wait.into(),
        ControlDirective::Manual.into(),
        wtl.create("resnet50", 50, 798)?.into(),
    ])
}

// case1과 같은 구성이지만 Manual 대기가 없다.
fn test(wtl: &WorkloadFactory) -> Result<Vec<Step>, WorkloadError> {
    Ok(vec![
        wtl.create("inception3", 100, 165)?.into(),
        wtl.create("resnet50", 50, 798)?.into(),
        wtl.create("resnet152", 75, 19)?.into(),
        ControlDirective::Wait.into(),
        wtl.create("inception3", 100, 165)?.into(),
        wtl.create("resnet50", 50, 798)?.into(),
        wtl.create("resnet152", 75, 19)?.into(),
    ])
}
