use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

/// 워크로드 생성 시 발생 가능한 오류를 표현한다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkloadError {
    /// 등록되지 않은 모델 ID이다.
    #[error("등록되지 않은 모델입니다: {0}")]
    UnknownModel(String),
    /// 배치 크기 또는 반복 횟수가 0인 경우이다.
    #[error("{field} 값은 양수여야 합니다 (모델: {model})")]
    NonPositive { model: String, field: &'static str },
}

/// 벤치마크 하네스가 실행할 수 있는 모델 목록이다.
static MODEL_CATALOG: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    BTreeSet::from([
        "alexnet",
        "googlenet",
        "inception3",
        "inception4",
        "overfeat",
        "resnet50",
        "resnet101",
        "resnet152",
        "vgg11",
        "vgg16",
        "vgg19",
        "speech",
        "seq2seq",
        "mnistsf",
        "mnistcv",
        "mnistlg",
        "superres",
    ])
});

/// 제출할 학습 워크로드 한 건을 표현한다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    model: String,
    batch_size: NonZeroU32,
    steps: NonZeroU32,
}

impl WorkloadSpec {
    /// 모델 ID.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// 배치 크기.
    pub fn batch_size(&self) -> u32 {
        self.batch_size.get()
    }

    /// 반복 횟수.
    pub fn steps(&self) -> u32 {
        self.steps.get()
    }

    /// 로그와 출력 파일에 사용하는 `모델_배치` 형식의 이름이다.
    pub fn canonical_name(&self) -> String {
        format!("{}_{}", self.model, self.batch_size)
    }
}

impl fmt::Display for WorkloadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} iter)", self.canonical_name(), self.steps)
    }
}

/// 모델 ID로 워크로드를 생성하는 레지스트리이다.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkloadFactory;

impl WorkloadFactory {
    /// 등록된 모델인지 확인한 뒤 워크로드를 생성한다.
    pub fn create(
        &self,
        model: &str,
        batch_size: u32,
        steps: u32,
    ) -> Result<WorkloadSpec, WorkloadError> {
        if !MODEL_CATALOG.contains(model) {
            return Err(WorkloadError::UnknownModel(model.to_string()));
        }
        let batch_size = NonZeroU32::new(batch_size).ok_or(WorkloadError::NonPositive {
            model: model.to_string(),
            field: "batch_size",
        })?;
        let steps = NonZeroU32::new(steps).ok_or(WorkloadError::NonPositive {
            model: model.to_string(),
            field: "steps",
        })?;
        Ok(WorkloadSpec {
            model: model.to_string(),
            batch_size,
            steps,
        })
    }
}
