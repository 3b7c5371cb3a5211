use std::env;
use std::fs;
use std::time::Duration;

use serde::Deserialize;

use crate::error::InterceptorError;

const DEFAULT_LISTEN_PORT: u16 = 8001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Standalone,
    Kubernetes,
}

/// Fully resolved configuration for one interceptor process.
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    pub checkpointing_interval: Duration,
    pub container_url: String,
    pub container_pid: i32,
    pub container_name: String,
    pub state_manager_url: String,
    pub listen_port: u16,
    pub mode: DeploymentMode,
    pub kubernetes_node_ip: Option<String>,
    pub kubernetes_pod_name: Option<String>,
}

/// Mirrors the YAML config shape, field-for-field, before duration/URL
/// parsing.
#[derive(Debug, Deserialize)]
struct ConfigYaml {
    #[serde(rename = "checkpointingInterval")]
    checkpointing_interval: String,
    #[serde(rename = "containerURL")]
    container_url: String,
    #[serde(rename = "containerPID")]
    container_pid: i32,
    #[serde(rename = "containerName")]
    container_name: String,
    #[serde(rename = "stateManagerURL")]
    state_manager_url: String,
}

impl InterceptorConfig {
    /// Loads from a YAML file if `yaml_path` is given, otherwise from
    /// environment variables.
    pub fn load(yaml_path: Option<&str>) -> Result<Self, InterceptorError> {
        match yaml_path {
            Some(path) => Self::from_yaml_file(path),
            None => Self::from_env(),
        }
    }

    pub fn from_yaml_file(path: &str) -> Result<Self, InterceptorError> {
        let content = fs::read_to_string(path)
            .map_err(|e| InterceptorError::ConfigInvalid(format!("reading {path}: {e}")))?;
        let parsed: ConfigYaml = serde_yaml::from_str(&content)
            .map_err(|e| InterceptorError::ConfigInvalid(format!("parsing {path}: {e}")))?;

        let checkpointing_interval = humantime::parse_duration(&parsed.checkpointing_interval)
            .map_err(|e| InterceptorError::ConfigInvalid(format!("checkpointingInterval: {e}")))?;

        Ok(Self {
            checkpointing_interval,
            container_url: parsed.container_url,
            container_pid: parsed.container_pid,
            container_name: parsed.container_name,
            state_manager_url: parsed.state_manager_url,
            listen_port: Self::env_listen_port(),
            mode: Self::env_mode(),
            kubernetes_node_ip: env::var("KUBERNETES_NODE_IP").ok(),
            kubernetes_pod_name: env::var("KUBERNETES_POD_NAME").ok(),
        })
    }

    pub fn from_env() -> Result<Self, InterceptorError> {
        let checkpointing_interval = env::var("CHECKPOINT_INTERVAL")
            .map_err(|_| InterceptorError::ConfigInvalid("CHECKPOINT_INTERVAL not set".into()))
            .and_then(|raw| {
                humantime::parse_duration(&raw)
                    .map_err(|e| InterceptorError::ConfigInvalid(format!("CHECKPOINT_INTERVAL: {e}")))
            })?;

        let container_url = env::var("CONTAINER_URL")
            .map_err(|_| InterceptorError::ConfigInvalid("CONTAINER_URL not set".into()))?;

        let container_name = env::var("CONTAINER_NAME")
            .map_err(|_| InterceptorError::ConfigInvalid("CONTAINER_NAME not set".into()))?;

        let container_pid = env::var("CONTAINER_PID")
            .map_err(|_| InterceptorError::ConfigInvalid("CONTAINER_PID not set".into()))?
            .parse::<i32>()
            .map_err(|e| InterceptorError::ConfigInvalid(format!("CONTAINER_PID: {e}")))?;

        let state_manager_url = env::var("STATE_MANAGER_URL")
            .map_err(|_| InterceptorError::ConfigInvalid("STATE_MANAGER_URL not set".into()))?;

        Ok(Self {
            checkpointing_interval,
            container_url,
            container_pid,
            container_name,
            state_manager_url,
            listen_port: Self::env_listen_port(),
            mode: Self::env_mode(),
            kubernetes_node_ip: env::var("KUBERNETES_NODE_IP").ok(),
            kubernetes_pod_name: env::var("KUBERNETES_POD_NAME").ok(),
        })
    }

    fn env_listen_port() -> u16 {
        env::var("LISTEN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LISTEN_PORT)
    }

    fn env_mode() -> DeploymentMode {
        match env::var("ENV").as_deref() {
            Ok("kubernetes") => DeploymentMode::Kubernetes,
            _ => DeploymentMode::Standalone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazy_static::lazy_static;
    use std::sync::Mutex;

    lazy_static! {
        static ref ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());
    }

    struct EnvVarGuard {
        vars: Vec<String>,
    }

    impl EnvVarGuard {
        fn set(pairs: &[(&str, &str)]) -> Self {
            let mut vars = Vec::new();
            for (key, value) in pairs {
                env::set_var(key, value);
                vars.push(key.to_string());
            }
            Self { vars }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            for key in &self.vars {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn from_env_requires_all_fields() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let _env = EnvVarGuard::set(&[]);
        env::remove_var("CHECKPOINT_INTERVAL");
        let err = InterceptorConfig::from_env().unwrap_err();
        assert!(matches!(err, InterceptorError::ConfigInvalid(_)));
    }

    #[test]
    fn from_env_parses_full_config() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let _env = EnvVarGuard::set(&[
            ("CHECKPOINT_INTERVAL", "10m"),
            ("CONTAINER_URL", "http://127.0.0.1:9000"),
            ("CONTAINER_NAME", "app"),
            ("CONTAINER_PID", "42"),
            ("STATE_MANAGER_URL", "http://127.0.0.1:9100"),
        ]);
        env::remove_var("LISTEN_PORT");
        env::remove_var("ENV");

        let config = InterceptorConfig::from_env().unwrap();
        assert_eq!(config.checkpointing_interval, Duration::from_secs(600));
        assert_eq!(config.container_pid, 42);
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(config.mode, DeploymentMode::Standalone);
    }

    #[test]
    fn env_mode_recognizes_kubernetes() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let _env = EnvVarGuard::set(&[("ENV", "kubernetes")]);
        assert_eq!(InterceptorConfig::env_mode(), DeploymentMode::Kubernetes);
    }
}
