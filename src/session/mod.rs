//! Process-wide session: credentials, default scopes, and the shared API
//! client.
//!
//! One session is created per plugin load and lives until teardown. The
//! credential and default-scope chain is resolved exactly once, in
//! precedence order: engine-provided provider configuration, environment
//! (both merged by `ortho-config`), then the on-disk CLI profile.
//! Per-resource scope attributes override the session defaults at the
//! controller level.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::api::{ApiClient, Credentials};
use crate::locality::{LocalityError, Region, Zone};
use crate::transport::RetryPolicy;

/// Provider-level configuration layered from files and the environment.
#[derive(Clone, Debug, Default, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ProviderConfig {
    /// Access key, captured for audit purposes.
    pub access_key: Option<String>,
    /// Secret key used for authentication.
    pub secret_key: Option<String>,
    /// Project used when a resource does not name one.
    pub default_project_id: Option<String>,
    /// Organisation identifier required by a few endpoints.
    pub default_organization_id: Option<String>,
    /// Zone used when a resource does not name one.
    pub default_zone: Option<String>,
    /// Region used when a resource does not name one.
    pub default_region: Option<String>,
}

impl ProviderConfig {
    /// Loads configuration by merging defaults, configuration files, and
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when the loader fails to merge
    /// sources.
    pub fn load_from_sources() -> Result<Self, SessionError> {
        Self::load_from_iter([std::ffi::OsString::from("obriy")])
            .map_err(|err| SessionError::Config(err.to_string()))
    }
}

/// One profile from the Scaleway CLI configuration file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Profile {
    /// Access key, when set.
    pub access_key: Option<String>,
    /// Secret key, when set.
    pub secret_key: Option<String>,
    /// Default project, when set.
    pub default_project_id: Option<String>,
    /// Default organisation, when set.
    pub default_organization_id: Option<String>,
    /// Default zone, when set.
    pub default_zone: Option<String>,
    /// Default region, when set.
    pub default_region: Option<String>,
}

impl Profile {
    /// Reads a profile from a CLI `config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Profile`] when the file cannot be read or
    /// parsed.
    pub fn load(path: &Utf8Path) -> Result<Self, SessionError> {
        let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().ok_or_else(|| SessionError::Profile {
            path: path.to_path_buf(),
            message: String::from("profile path is missing a filename"),
        })?;
        let dir =
            Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
                SessionError::Profile {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                }
            })?;
        let contents = dir
            .read_to_string(file_name)
            .map_err(|err| SessionError::Profile {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        serde_yaml::from_str(&contents).map_err(|err| SessionError::Profile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

/// Errors raised while establishing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Raised when no source in the chain provides a required value.
    #[error("missing credential: set {field} in the provider block, SCW_{env}, or the CLI profile")]
    MissingCredential {
        /// Configuration key that is missing.
        field: &'static str,
        /// Environment variable suffix that would satisfy it.
        env: &'static str,
    },
    /// Surfaces errors from the configuration loader.
    #[error("configuration parsing failed: {0}")]
    Config(String),
    /// Raised when the on-disk profile cannot be read.
    #[error("failed to load profile {path}: {message}")]
    Profile {
        /// Path of the profile file.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a configured zone or region is unknown.
    #[error(transparent)]
    Locality(#[from] LocalityError),
    /// Raised when the API client cannot be built.
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
}

/// Process-wide handle shared by every controller.
#[derive(Debug)]
pub struct Session {
    api: Arc<ApiClient>,
    default_zone: Zone,
    default_region: Region,
    scoped: Mutex<HashMap<Region, Arc<ApiClient>>>,
    compute_action_lock: AsyncMutex<()>,
}

impl Session {
    /// Resolves the credential chain and builds the shared client.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingCredential`] when no source provides a
    /// secret key or project, [`SessionError::Locality`] for unknown scopes,
    /// and [`SessionError::Api`] when the client cannot be built.
    pub fn connect(config: &ProviderConfig, profile: Option<&Profile>) -> Result<Self, SessionError> {
        let pick = |from_config: &Option<String>, from_profile: fn(&Profile) -> &Option<String>| {
            from_config
                .clone()
                .or_else(|| profile.and_then(|profile| from_profile(profile).clone()))
        };

        let secret_key = pick(&config.secret_key, |profile| &profile.secret_key).ok_or(
            SessionError::MissingCredential {
                field: "secret_key",
                env: "SECRET_KEY",
            },
        )?;
        let default_project_id = pick(&config.default_project_id, |profile| {
            &profile.default_project_id
        })
        .ok_or(SessionError::MissingCredential {
            field: "default_project_id",
            env: "DEFAULT_PROJECT_ID",
        })?;
        let access_key = pick(&config.access_key, |profile| &profile.access_key);
        let default_organization_id = pick(&config.default_organization_id, |profile| {
            &profile.default_organization_id
        });

        let default_zone = pick(&config.default_zone, |profile| &profile.default_zone)
            .map_or(Ok(Zone::FrPar1), |zone| zone.parse())?;
        let default_region = pick(&config.default_region, |profile| &profile.default_region)
            .map_or_else(|| Ok(default_zone.region()), |region| region.parse())?;

        let credentials = Credentials {
            access_key,
            secret_key,
            default_project_id,
            default_organization_id,
        };
        let api = Arc::new(ApiClient::new(credentials, RetryPolicy::default())?);
        Ok(Self {
            api,
            default_zone,
            default_region,
            scoped: Mutex::new(HashMap::new()),
            compute_action_lock: AsyncMutex::new(()),
        })
    }

    /// Builds a session around an existing client, used by tests.
    #[must_use]
    pub fn from_client(api: Arc<ApiClient>, default_zone: Zone) -> Self {
        Self {
            api,
            default_zone,
            default_region: default_zone.region(),
            scoped: Mutex::new(HashMap::new()),
            compute_action_lock: AsyncMutex::new(()),
        }
    }

    /// Returns the shared client for the default scope.
    #[must_use]
    pub fn api(&self) -> Arc<ApiClient> {
        Arc::clone(&self.api)
    }

    /// Returns the default project identifier.
    #[must_use]
    pub fn default_project(&self) -> String {
        self.api.credentials().default_project_id.clone()
    }

    /// Resolves a per-resource zone attribute against the session default.
    #[must_use]
    pub const fn zone_or_default(&self, zone: Option<Zone>) -> Zone {
        match zone {
            Some(zone) => zone,
            None => self.default_zone,
        }
    }

    /// Resolves a per-resource region attribute against the session default.
    #[must_use]
    pub const fn region_or_default(&self, region: Option<Region>) -> Region {
        match region {
            Some(region) => region,
            None => self.default_region,
        }
    }

    /// Returns a client scoped to a region whose endpoint differs from the
    /// session default (object storage). Clients are built lazily and
    /// cached for the life of the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Api`] when the scoped client cannot be built.
    pub fn api_for_region(&self, region: Region) -> Result<Arc<ApiClient>, SessionError> {
        if region == self.default_region {
            return Ok(self.api());
        }
        let mut scoped = self.scoped.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(client) = scoped.get(&region) {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(self.api.rebased(format!("https://api.{region}.scw.cloud"))?);
        scoped.insert(region, Arc::clone(&client));
        Ok(client)
    }

    /// Serializes the compute power-off and terminate calls the API does
    /// not serialize server-side. Held for the call only, never across a
    /// wait.
    pub async fn compute_action_guard(&self) -> MutexGuard<'_, ()> {
        self.compute_action_lock.lock().await
    }
}

#[cfg(test)]
mod tests;
