use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 설정 해석 중 발생 가능한 오류를 표현한다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 등록되지 않은 프리셋 이름이 지정된 경우이다.
    #[error("알 수 없는 프리셋입니다: {name} (사용 가능: {valid})")]
    UnknownPreset { name: String, valid: String },
    /// 오버라이드 파일을 읽지 못한 경우이다.
    #[error("설정 파일을 읽을 수 없습니다: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 오버라이드 파일 형식이 잘못된 경우이다.
    #[error("설정 파일 파싱 실패: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// 미리 정의된 스케줄러 설정 묶음이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// 기본 동작 설정.
    Default,
    /// 디버깅용 상세 로그 설정.
    Debugging,
    /// 프로파일링용 설정.
    Profiling,
}

impl Preset {
    /// 등록된 모든 프리셋 목록이다.
    pub const ALL: [Preset; 3] = [Preset::Default, Preset::Debugging, Preset::Profiling];

    /// 프리셋 이름을 반환한다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Default => "Default",
            Preset::Debugging => "Debugging",
            Preset::Profiling => "Profiling",
        }
    }

    /// 프리셋에 해당하는 기본 설정 값을 생성한다.
    pub fn config(&self) -> SchedulerConfig {
        let base = SchedulerConfig {
            preset: self.as_str().to_string(),
            scheduler: "fair".to_string(),
            work_conservation: true,
            log_level: "info".to_string(),
            endpoint: "tcp://127.0.0.1:5501".to_string(),
            output_dir: PathBuf::from("templogs"),
            launch_command: None,
            env: HashMap::new(),
        };
        match self {
            Preset::Default => base,
            Preset::Debugging => SchedulerConfig {
                log_level: "debug".to_string(),
                ..base
            },
            Preset::Profiling => SchedulerConfig {
                log_level: "trace".to_string(),
                env: HashMap::from([("SCHED_PROFILE".to_string(), "1".to_string())]),
                ..base
            },
        }
    }

    fn valid_names() -> String {
        Preset::ALL
            .iter()
            .map(Preset::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    /// 대소문자를 구분하지 않고 프리셋 이름을 해석한다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownPreset {
                name: s.to_string(),
                valid: Preset::valid_names(),
            })
    }
}

/// 테스트 대상 스케줄러의 접속 및 동작 설정이다.
///
/// 한 번 만들어진 값은 변경하지 않으며, 수정이 필요하면 복사본을 만든다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 기반이 된 프리셋 이름.
    pub preset: String,
    /// 스케줄링 정책 이름.
    pub scheduler: String,
    /// work conservation 활성화 여부.
    pub work_conservation: bool,
    /// 스케줄러 로그 레벨.
    pub log_level: String,
    /// 스케줄러 접속 주소.
    pub endpoint: String,
    /// 실행 결과를 저장할 디렉터리.
    pub output_dir: PathBuf,
    /// 워크로드 실행 명령 템플릿. 없으면 dry-run으로 동작한다.
    pub launch_command: Option<String>,
    /// 워크로드 프로세스에 전달할 환경 변수.
    pub env: HashMap<String, String>,
}

impl SchedulerConfig {
    /// 출력 디렉터리만 바꾼 복사본을 반환한다.
    pub fn copy_with_output_dir(&self, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..self.clone()
        }
    }

    /// 오버라이드 값을 적용한 새 설정을 반환한다.
    pub fn apply_overrides(&self, overrides: &ConfigOverrides) -> Self {
        let mut next = self.clone();
        if let Some(scheduler) = &overrides.scheduler {
            next.scheduler = scheduler.clone();
        }
        if let Some(wc) = overrides.work_conservation {
            next.work_conservation = wc;
        }
        if let Some(level) = &overrides.log_level {
            next.log_level = level.clone();
        }
        if let Some(endpoint) = &overrides.endpoint {
            next.endpoint = endpoint.clone();
        }
        if let Some(command) = &overrides.launch_command {
            next.launch_command = Some(command.clone());
        }
        next.env
            .extend(overrides.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        next
    }
}

/// YAML 파일로 지정하는 선택적 설정 오버라이드이다.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub scheduler: Option<String>,
    pub work_conservation: Option<bool>,
    pub log_level: Option<String>,
    pub endpoint: Option<String>,
    pub launch_command: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// YAML 파일을 읽어 오버라이드로 역직렬화한다.
pub fn load_overrides_from_file(path: &Path) -> Result<ConfigOverrides, ConfigError> {
    let mut file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    load_overrides_from_str(&buf)
}

/// YAML 문자열을 오버라이드 구조체로 파싱한다.
pub fn load_overrides_from_str(yaml: &str) -> Result<ConfigOverrides, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(ConfigOverrides::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}

/// 기본 프리셋과 강제 프리셋 설정을 조합해 기준 설정을 만든다.
#[derive(Debug, Clone, Default)]
pub struct PresetResolver {
    /// 외부에서 강제한 프리셋 이름.
    forced: Option<String>,
}

impl PresetResolver {
    /// 강제 프리셋 이름을 받아 리졸버를 생성한다.
    pub fn new(forced: Option<String>) -> Self {
        let forced = forced.filter(|name| !name.trim().is_empty());
        Self { forced }
    }

    /// 강제 프리셋이 있으면 그것을, 없으면 `default`를 사용해 설정을 만든다.
    pub fn resolve(&self, default: Preset) -> Result<SchedulerConfig, ConfigError> {
        let preset = match &self.forced {
            Some(name) => {
                let preset: Preset = name.parse()?;
                tracing::info!(forced = %preset, "강제 프리셋 적용");
                preset
            }
            None => default,
        };
        Ok(preset.config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_uses_default_when_not_forced() {
        let cfg = PresetResolver::new(None)
            .resolve(Preset::Debugging)
            .expect("프리셋 해석 실패");
        assert_eq!(cfg.preset, "Debugging");
        assert_eq!(cfg.scheduler, "fair");
        assert!(cfg.work_conservation);
    }

    #[test]
    fn forced_preset_wins_and_is_case_insensitive() {
        let cfg = PresetResolver::new(Some("profiling".into()))
            .resolve(Preset::Debugging)
            .expect("프리셋 해석 실패");
        assert_eq!(cfg.preset, "Profiling");
    }

    #[test]
    fn blank_forced_preset_is_ignored() {
        let cfg = PresetResolver::new(Some("  ".into()))
            .resolve(Preset::Debugging)
            .expect("프리셋 해석 실패");
        assert_eq!(cfg.preset, "Debugging");
    }

    #[test]
    fn unknown_forced_preset_is_config_error() {
        let err = PresetResolver::new(Some("Turbo".into()))
            .resolve(Preset::Debugging)
            .expect_err("알 수 없는 프리셋은 실패해야 한다");
        assert!(matches!(err, ConfigError::UnknownPreset { ref name, .. } if name == "Turbo"));
        assert!(err.to_string().contains("Debugging"));
    }

    #[test]
    fn copy_with_output_dir_leaves_base_untouched() {
        let base = Preset::Debugging.config();
        let snapshot = base.clone();
        let first = base.copy_with_output_dir("runs/a");
        let second = base.copy_with_output_dir("runs/b");
        assert_eq!(base, snapshot);
        assert_eq!(first.output_dir, PathBuf::from("runs/a"));
        assert_eq!(second.output_dir, PathBuf::from("runs/b"));
        assert_eq!(first.scheduler, base.scheduler);
    }

    #[test]
    fn overrides_apply_on_a_copy() {
        let yaml = r#"
work_conservation: false
launch_command: "run ${MODEL}"
env:
  CUDA_VISIBLE_DEVICES: "0"
"#;
        let overrides = load_overrides_from_str(yaml).expect("YAML 파싱 실패");
        let base = Preset::Debugging.config();
        let next = base.apply_overrides(&overrides);
        assert!(base.work_conservation);
        assert!(!next.work_conservation);
        assert_eq!(next.launch_command.as_deref(), Some("run ${MODEL}"));
        assert_eq!(next.env.get("CUDA_VISIBLE_DEVICES").map(String::as_str), Some("0"));
        assert_eq!(next.scheduler, "fair");
    }

    #[test]
    fn unknown_override_field_is_parse_error() {
        let err = load_overrides_from_str("sheduler: fifo").expect_err("오타 필드는 거부");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_override_file_is_io_error() {
        let err = load_overrides_from_file(Path::new("/nonexistent/repro.yaml"))
            .expect_err("없는 파일은 실패해야 한다");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
