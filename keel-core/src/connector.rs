use crate::{
    Connection, ConnectionParams, DbSpec, Driver, DriverConnection, IsolationLevel, KeelError,
    ResolvedSpec, Result, Settings, TransactionStrategy, log_error,
};
use std::{collections::HashMap, sync::Arc};

/// Well known subprotocols and the name of the driver serving them.
const WELL_KNOWN_SUBPROTOCOLS: &[(&str, &str)] = &[
    ("postgresql", "postgresql"),
    ("postgres", "postgresql"),
    ("mysql", "mysql"),
    ("sqlite", "sqlite"),
    ("h2", "h2"),
    ("sqlserver", "sqlserver"),
    ("oracle", "oracle"),
];

/// Drivers by name, and the subprotocol table used to find them.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
    subprotocols: HashMap<String, String>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self {
            drivers: Default::default(),
            subprotocols: WELL_KNOWN_SUBPROTOCOLS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `driver` under its own name.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let name = driver.name().to_string();
        log::debug!("Registering driver `{}`", name);
        self.drivers.insert(name, driver);
    }

    /// Route `subprotocol` to the driver registered as `driver_name`.
    pub fn alias(&mut self, subprotocol: impl Into<String>, driver_name: impl Into<String>) {
        self.subprotocols
            .insert(subprotocol.into(), driver_name.into());
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Driver>> {
        self.drivers.get(name)
    }

    /// Driver for the parameters: explicit `classname` first, then the
    /// subprotocol table, then a driver named like the subprotocol.
    pub fn resolve(&self, params: &ConnectionParams) -> Result<Arc<dyn Driver>> {
        let name = match &params.classname {
            Some(classname) => classname.as_str(),
            None => self
                .subprotocols
                .get(&params.subprotocol)
                .map(String::as_str)
                .unwrap_or(params.subprotocol.as_str()),
        };
        self.drivers.get(name).cloned().ok_or_else(|| {
            log_error!(KeelError::configuration(format!(
                "no driver registered as `{}` for subprotocol `{}`",
                name, params.subprotocol
            )))
        })
    }
}

/// Opens connections from a dbspec, threading the configured defaults into
/// each of them.
///
/// ```ignore
/// let connector = Connector::new()
///     .with_driver(Arc::new(SqliteDriver::new()))
///     .with_default_isolation(IsolationLevel::Serializable);
/// let connection = connector.open("sqlite::memory:")?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Connector {
    registry: DriverRegistry,
    settings: Arc<Settings>,
}

impl Connector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: DriverRegistry) -> Self {
        Self {
            registry,
            settings: Default::default(),
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.registry.register(driver);
        self
    }

    /// Isolation level applied when the dbspec does not name one.
    pub fn with_default_isolation(mut self, level: IsolationLevel) -> Self {
        Arc::make_mut(&mut self.settings).default_isolation = level;
        self
    }

    /// Strategy used by connections that do not carry their own.
    pub fn with_default_strategy(mut self, strategy: Arc<dyn TransactionStrategy>) -> Self {
        Arc::make_mut(&mut self.settings).default_strategy = strategy;
        self
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DriverRegistry {
        &mut self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Open a connection, the isolation level, read only flag and schema of
    /// the dbspec are applied before it is returned.
    pub fn open(&self, spec: impl Into<DbSpec>) -> Result<Connection> {
        match spec.into().resolve()? {
            ResolvedSpec::Driver(params) => {
                let driver = self.registry.resolve(&params)?;
                log::debug!(
                    "Opening `{}` through driver `{}`",
                    params.target(),
                    driver.name()
                );
                let raw = driver.connect(&params.subname, &params.properties)?;
                self.wrap(
                    raw,
                    params.isolation,
                    params.read_only,
                    params.schema.as_deref(),
                )
            }
            ResolvedSpec::DataSource(spec) => {
                let credentials = spec
                    .user
                    .as_deref()
                    .map(|user| (user, spec.password.as_deref().unwrap_or_default()));
                let raw = spec.source.connection(credentials)?;
                self.wrap(raw, spec.isolation, spec.read_only, spec.schema.as_deref())
            }
        }
    }

    /// Same as [`Connector::open`], with `strategy` attached to the connection.
    pub fn open_with_strategy(
        &self,
        spec: impl Into<DbSpec>,
        strategy: Arc<dyn TransactionStrategy>,
    ) -> Result<Connection> {
        Ok(self.open(spec)?.with_strategy(strategy))
    }

    fn wrap(
        &self,
        raw: Box<dyn DriverConnection>,
        isolation: Option<IsolationLevel>,
        read_only: Option<bool>,
        schema: Option<&str>,
    ) -> Result<Connection> {
        Connection::with_settings(raw, self.settings.clone()).configure(isolation, read_only, schema)
    }
}

/// Open a connection with default settings.
pub fn open(registry: &DriverRegistry, spec: impl Into<DbSpec>) -> Result<Connection> {
    Connector::with_registry(registry.clone()).open(spec)
}
