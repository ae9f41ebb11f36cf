use std::net::Ipv4Addr;

use core_config::{ConfigError, Environment, FromEnv, env_or_default, env_parse_or};
use database::mongodb::ConnectionConfig;

/// Address of the `serve` liveness/readiness listener
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthListener {
    pub host: String,
    pub port: u16,
}

impl HealthListener {
    pub const DEFAULT_PORT: u16 = 8080;

    /// "host:port", ready for `TcpListener::bind`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HealthListener {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

impl FromEnv for HealthListener {
    /// `HEALTH_HOST` (all interfaces by default) and `HEALTH_PORT` (8080)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("HEALTH_HOST", &Ipv4Addr::UNSPECIFIED.to_string()),
            port: env_parse_or("HEALTH_PORT", Self::DEFAULT_PORT)?,
        })
    }
}

/// Everything `dbctl` reads from the environment
#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb: ConnectionConfig,
    pub health: HealthListener,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let mongodb = ConnectionConfig::from_env()?;
        let health = HealthListener::from_env()?;

        Ok(Self {
            mongodb,
            health,
            environment,
        })
    }

    /// Extra log directives: driver command logging needs `database` at debug
    pub fn log_directives(&self) -> Vec<&'static str> {
        if self.mongodb.debug {
            vec!["database=debug"]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("MONGODB_URI", None),
                ("MONGODB_URL", None),
                ("MONGODB_HOST", Some("db.local")),
                ("MONGODB_DATABASE", Some("planner")),
                ("MONGODB_DEBUG", Some("true")),
                ("HEALTH_HOST", None),
                ("HEALTH_PORT", Some("9090")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.mongodb.database(), "planner");
                assert_eq!(config.health.address(), "0.0.0.0:9090");
                assert_eq!(config.log_directives(), vec!["database=debug"]);
            },
        );
    }

    #[test]
    fn test_config_requires_database() {
        temp_env::with_vars(
            [
                ("MONGODB_URI", None::<&str>),
                ("MONGODB_URL", None),
                ("MONGODB_DATABASE", None),
            ],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_health_listener_defaults() {
        temp_env::with_vars_unset(["HEALTH_HOST", "HEALTH_PORT"], || {
            assert_eq!(HealthListener::from_env().unwrap(), HealthListener::default());
        });
    }

    #[test]
    fn test_health_listener_ignores_generic_port() {
        temp_env::with_vars(
            [
                ("HEALTH_HOST", Some("127.0.0.1")),
                ("HEALTH_PORT", None),
                ("PORT", Some("3000")),
            ],
            || {
                let listener = HealthListener::from_env().unwrap();
                assert_eq!(listener.address(), "127.0.0.1:8080");
            },
        );
    }

    #[test]
    fn test_health_listener_rejects_bad_port() {
        temp_env::with_var("HEALTH_PORT", Some("99999"), || {
            let err = HealthListener::from_env().unwrap_err();
            assert!(err.to_string().contains("HEALTH_PORT"));
        });
    }

    #[test]
    fn test_debug_output_hides_credentials() {
        temp_env::with_vars(
            [
                ("MONGODB_URI", None),
                ("MONGODB_URL", None),
                ("MONGODB_HOST", Some("db.local")),
                ("MONGODB_DATABASE", Some("planner")),
                ("MONGODB_USERNAME", Some("svc")),
                ("MONGODB_PASSWORD", Some("hunter2")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert!(!format!("{config:?}").contains("hunter2"));
            },
        );
    }
}
