use crate::config::SchedulerConfig;
use crate::workload::WorkloadSpec;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// 워크로드 실행 명령 템플릿을 치환하기 위한 변수 저장소이다.
#[derive(Debug, Default, Clone)]
pub struct TemplateContext {
    /// 문자열 기반 변수 저장소이다.
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// 비어 있는 컨텍스트를 생성한다.
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    /// 설정과 워크로드 정보로 표준 변수를 채운 컨텍스트를 생성한다.
    ///
    /// # 매개변수
    /// - `config`: 출력 디렉터리와 접속 주소를 제공하는 스케줄러 설정.
    /// - `workload`: 모델, 배치 크기, 반복 횟수를 제공하는 워크로드.
    pub fn for_workload(config: &SchedulerConfig, workload: &WorkloadSpec) -> Self {
        let mut ctx = Self::new();
        ctx.set_var("MODEL", workload.model());
        ctx.set_var("BATCH_SIZE", workload.batch_size().to_string());
        ctx.set_var("STEPS", workload.steps().to_string());
        ctx.set_var("NAME", workload.canonical_name());
        ctx.set_var("OUTPUT_DIR", config.output_dir.to_string_lossy());
        ctx.set_var("ENDPOINT", config.endpoint.as_str());
        ctx.set_var("SCHEDULER", config.scheduler.as_str());
        ctx.set_var("PRESET", config.preset.as_str());
        ctx.set_var("LOG_LEVEL", config.log_level.as_str());
        ctx.set_var("WORK_CONSERVATION", config.work_conservation.to_string());
        ctx
    }

    /// 컨텍스트 변수 값을 설정한다.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// 변수 값을 조회한다.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// `${VAR}` 패턴을 컨텍스트 변수 값으로 치환한다.
    ///
    /// 등록되지 않은 변수가 하나라도 있으면 그 이름을 모두 담아 오류를 반환한다.
    /// 환경 변수로 대체하지 않는다.
    pub fn expand_placeholders(&self, template: &str) -> anyhow::Result<String> {
        static PLACEHOLDER: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("정규식 컴파일 실패"));
        let mut missing: Vec<&str> = PLACEHOLDER
            .captures_iter(template)
            .filter_map(|caps| caps.get(1))
            .map(|key| key.as_str())
            .filter(|key| !self.vars.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            missing.dedup();
            anyhow::bail!("알 수 없는 플레이스홀더: {}", missing.join(", "));
        }
        let expanded = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
            self.get_var(&caps[1]).unwrap_or_default().to_string()
        });
        Ok(expanded.into_owned())
    }

    /// `template` 문자열을 치환하되 값이 없을 경우 명시적인 오류를 발생시킨다.
    pub fn expand_required(&self, template: &str, field: &str) -> anyhow::Result<String> {
        self.expand_placeholders(template)
            .with_context(|| format!("{field} 필드의 플레이스홀더를 치환할 수 없습니다."))
    }
}
