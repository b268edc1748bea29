//! The network controller: named drivers and network dispatch.
//!
//! The controller is the single surface the API layer talks to. It holds
//! the driver registry, generates network ids, and dispatches lifecycle
//! calls to the owning driver. Defaults come from an injected
//! [`ControllerConfig`], never from ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use weft_common::{ResourceId, WeftError, WeftResult};

use crate::config::NetworkConfig;
use crate::driverapi::Driver;
use crate::endpoint::NetworkSummary;

/// Controller defaults, injected at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Driver used when a network names none.
    pub default_driver: String,
    /// Name of the protected default network.
    pub default_network: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_driver: "bridge".to_string(),
            default_network: "weft".to_string(),
        }
    }
}

struct NetworkEntry {
    id: ResourceId,
    driver: String,
}

/// Registry of named drivers and the networks they serve.
pub struct Controller {
    config: ControllerConfig,
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
    networks: RwLock<HashMap<String, NetworkEntry>>,
}

impl Controller {
    /// Create a controller with the given defaults.
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            drivers: RwLock::new(HashMap::new()),
            networks: RwLock::new(HashMap::new()),
        }
    }

    /// The injected defaults.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Register a driver under its type name.
    ///
    /// # Errors
    ///
    /// `Conflict` if the name is already taken.
    pub fn register_driver(&self, name: &str, driver: Arc<dyn Driver>) -> WeftResult<()> {
        let mut drivers = self.drivers.write();
        if drivers.contains_key(name) {
            return Err(WeftError::Conflict {
                message: format!("driver {name} is already registered"),
            });
        }
        drivers.insert(name.to_string(), driver);
        tracing::info!(driver = name, "Driver registered");
        Ok(())
    }

    /// Look up a registered driver.
    ///
    /// # Errors
    ///
    /// `NotFound` when no driver is registered under `name`.
    pub fn driver(&self, name: &str) -> WeftResult<Arc<dyn Driver>> {
        self.drivers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| WeftError::DriverNotFound {
                name: name.to_string(),
            })
    }

    /// Create a network, dispatching to `driver` (or the default driver).
    ///
    /// # Errors
    ///
    /// `Conflict` for a duplicate network name, plus whatever the driver
    /// returns.
    pub async fn create_network(
        &self,
        name: &str,
        driver: Option<&str>,
        mut config: NetworkConfig,
    ) -> WeftResult<ResourceId> {
        let driver_name = driver.unwrap_or(&self.config.default_driver).to_string();
        if self.networks.read().contains_key(name) {
            return Err(WeftError::Conflict {
                message: format!("network name {name} is already in use"),
            });
        }
        let driver = self.driver(&driver_name)?;
        let id = ResourceId::generate();
        config.name = name.to_string();
        driver.create_network(id.as_str(), config).await?;

        let mut networks = self.networks.write();
        if networks.contains_key(name) {
            // Lost a creation race; undo the driver-side network.
            drop(networks);
            let _ = driver.delete_network(id.as_str()).await;
            return Err(WeftError::Conflict {
                message: format!("network name {name} is already in use"),
            });
        }
        networks.insert(
            name.to_string(),
            NetworkEntry {
                id: id.clone(),
                driver: driver_name,
            },
        );
        tracing::info!(network = name, id = %id, "Network registered");
        Ok(id)
    }

    /// Delete a network by name.
    ///
    /// # Errors
    ///
    /// `Forbidden` for the default network, `NotFound` for unknown names,
    /// plus whatever the driver returns.
    pub async fn delete_network(&self, name: &str) -> WeftResult<()> {
        if name == self.config.default_network {
            return Err(WeftError::Forbidden {
                operation: format!("delete the default network {name}"),
            });
        }
        let (id, driver) = {
            let networks = self.networks.read();
            let entry = networks.get(name).ok_or_else(|| WeftError::NetworkNotFound {
                id: name.to_string(),
            })?;
            (entry.id.clone(), self.driver(&entry.driver)?)
        };
        driver.delete_network(id.as_str()).await?;
        self.networks.write().remove(name);
        tracing::info!(network = name, "Network removed");
        Ok(())
    }

    /// Summaries of every registered network.
    ///
    /// # Errors
    ///
    /// Propagates the first driver failure.
    pub async fn list_networks(&self) -> WeftResult<Vec<NetworkSummary>> {
        let entries: Vec<(ResourceId, Arc<dyn Driver>)> = {
            let networks = self.networks.read();
            networks
                .values()
                .map(|entry| Ok((entry.id.clone(), self.driver(&entry.driver)?)))
                .collect::<WeftResult<_>>()?
        };
        let mut summaries = Vec::with_capacity(entries.len());
        for (id, driver) in entries {
            summaries.push(driver.network_summary(id.as_str()).await?);
        }
        Ok(summaries)
    }

    /// Summary of one network by name.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown names, plus whatever the driver returns.
    pub async fn network_summary(&self, name: &str) -> WeftResult<NetworkSummary> {
        let (id, driver) = {
            let networks = self.networks.read();
            let entry = networks.get(name).ok_or_else(|| WeftError::NetworkNotFound {
                id: name.to_string(),
            })?;
            (entry.id.clone(), self.driver(&entry.driver)?)
        };
        driver.network_summary(id.as_str()).await
    }
}
