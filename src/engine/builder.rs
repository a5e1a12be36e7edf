//! Backend selection
//!
//! [`BackendSelector`] picks the backend implementation once and hands out
//! the shared handle afterwards. Selection is guarded by a single async
//! mutex, so concurrent first callers cannot initialize twice.
//!
//! For the store-backed variant a failed initial ping is logged and the
//! handle is still returned; later queries surface the real error. The
//! selector stays unconfigured in that case, so the next `configure` call
//! retries with a fresh pool.

use super::stubs::StubBackend;
use super::traits::TelemetryBackend;
use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::postgres::{PgConnection, PostgresBackend};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Requested backend implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataImplementation {
    /// The in-memory stub
    Stub,
    /// The relational telemetry store
    Postgres,
    /// Whatever `DATA_IMPLEMENTATION` (or the configuration) names
    FromEnvironment,
}

impl FromStr for DataImplementation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "env" | "unknown" => Ok(DataImplementation::FromEnvironment),
            other => other.parse::<BackendKind>().map(Into::into),
        }
    }
}

impl From<BackendKind> for DataImplementation {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Stub => DataImplementation::Stub,
            BackendKind::Postgres => DataImplementation::Postgres,
        }
    }
}

#[derive(Default)]
struct SelectorState {
    configured: bool,
    backend: Option<Arc<dyn TelemetryBackend>>,
}

/// Configures the telemetry backend at most once
pub struct BackendSelector {
    config: Config,
    state: Mutex<SelectorState>,
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelector")
            .field("implementation", &self.config.backend.implementation)
            .field("database", &self.config.database.display_target())
            .finish()
    }
}

impl BackendSelector {
    /// Create a selector using `config` for defaults and connection settings
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(SelectorState::default()),
        }
    }

    fn resolve(&self, choice: DataImplementation) -> BackendKind {
        match choice {
            DataImplementation::Stub => BackendKind::Stub,
            DataImplementation::Postgres => BackendKind::Postgres,
            DataImplementation::FromEnvironment => std::env::var("DATA_IMPLEMENTATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.config.backend.implementation),
        }
    }

    /// Select the backend, or return the one already selected
    pub async fn configure(&self, choice: DataImplementation) -> Result<Arc<dyn TelemetryBackend>> {
        let mut state = self.state.lock().await;
        if state.configured {
            if let Some(backend) = &state.backend {
                return Ok(backend.clone());
            }
        }

        let kind = self.resolve(choice);
        info!(?choice, implementation = %kind, "Configuring telemetry backend");

        let backend: Arc<dyn TelemetryBackend> = match kind {
            BackendKind::Stub => {
                state.configured = true;
                info!("Using in-memory stub backend");
                Arc::new(StubBackend::new())
            },
            BackendKind::Postgres => {
                let conn = PgConnection::connect_lazy(&self.config.database)?;
                let backend = PostgresBackend::new(conn);
                match backend.ping().await {
                    Ok(()) => {
                        state.configured = true;
                        info!("Connected to telemetry store");
                    },
                    Err(e) => {
                        state.configured = false;
                        error!(error = %e, "Telemetry store unreachable, will retry on next configure");
                    },
                }
                Arc::new(backend)
            },
        };

        state.backend = Some(backend.clone());
        Ok(backend)
    }

    /// True once a backend has been selected and, for the store, reached
    pub async fn is_configured(&self) -> bool {
        self.state.lock().await.configured
    }

    /// The most recently selected backend, if any
    pub async fn current(&self) -> Option<Arc<dyn TelemetryBackend>> {
        self.state.lock().await.backend.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_implementation() {
        assert_eq!(
            "DUMMY".parse::<DataImplementation>().unwrap(),
            DataImplementation::Stub
        );
        assert_eq!(
            "postgres".parse::<DataImplementation>().unwrap(),
            DataImplementation::Postgres
        );
        assert_eq!(
            "".parse::<DataImplementation>().unwrap(),
            DataImplementation::FromEnvironment
        );
        assert!("oracle".parse::<DataImplementation>().is_err());
    }

    #[tokio::test]
    async fn test_stub_selection_is_sticky() {
        let selector = BackendSelector::new(Config::default());
        assert!(!selector.is_configured().await);

        let first = selector.configure(DataImplementation::Stub).await.unwrap();
        assert_eq!(first.implementation_name(), "DUMMY");
        assert!(selector.is_configured().await);

        // A later request for a different backend is a no-op
        let second = selector.configure(DataImplementation::Postgres).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_initializes_once() {
        let selector = Arc::new(BackendSelector::new(Config::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let selector = selector.clone();
                tokio::spawn(async move { selector.configure(DataImplementation::Stub).await })
            })
            .collect();

        let mut backends = Vec::new();
        for handle in handles {
            backends.push(handle.await.unwrap().unwrap());
        }
        assert!(backends.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
