//! Managed Database (RDB) API: instances, databases, and users.
//!
//! Databases and users are nested under an instance and carry no UUID of
//! their own; their identifiers are `{region}/{instance-uuid}/{name}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Region;
use crate::wait::HasStatus;

/// Client for the region-scoped RDB API.
#[derive(Clone, Debug)]
pub struct RdbApi {
    client: Arc<ApiClient>,
    region: Region,
}

/// A managed database instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RdbInstance {
    /// Instance identifier.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Lifecycle status (`ready`, `provisioning`, `configuring`, `error`).
    pub status: String,
    /// Database engine and version (for example `PostgreSQL-15`).
    #[serde(default)]
    pub engine: String,
    /// Node type.
    #[serde(default)]
    pub node_type: String,
    /// Whether a standby node is provisioned.
    #[serde(default)]
    pub is_ha_cluster: bool,
    /// Tags attached to the instance.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for RdbInstance {
    fn status(&self) -> &str {
        &self.status
    }
}

/// A logical database inside an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Database {
    /// Database name; unique within the instance.
    pub name: String,
    /// Owning user.
    #[serde(default)]
    pub owner: String,
    /// Whether the platform manages this database.
    #[serde(default)]
    pub managed: bool,
}

/// A database user.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RdbUser {
    /// User name; unique within the instance.
    pub name: String,
    /// Whether the user holds admin rights.
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Deserialize)]
struct InstanceEnvelope {
    instance: RdbInstance,
}

#[derive(Deserialize)]
struct DatabasesEnvelope {
    databases: Vec<Database>,
}

#[derive(Deserialize)]
struct DatabaseEnvelope {
    database: Database,
}

#[derive(Deserialize)]
struct UsersEnvelope {
    users: Vec<RdbUser>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: RdbUser,
}

impl RdbApi {
    /// Builds a client for the given region.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, region: Region) -> Self {
        Self { client, region }
    }

    fn base(&self) -> String {
        format!("/rdb/v1/regions/{}", self.region)
    }

    /// Creates a database instance.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_instance(&self, body: &serde_json::Value) -> Result<RdbInstance, ApiError> {
        let envelope: InstanceEnvelope = self
            .client
            .post(&format!("{}/instances", self.base()), body)
            .await?;
        Ok(envelope.instance)
    }

    /// Fetches one instance.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the instance is gone.
    pub async fn get_instance(&self, id: &str) -> Result<RdbInstance, ApiError> {
        let envelope: InstanceEnvelope = self
            .client
            .get(&format!("{}/instances/{id}", self.base()), &[])
            .await?;
        Ok(envelope.instance)
    }

    /// Patches an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_instance(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<RdbInstance, ApiError> {
        let envelope: InstanceEnvelope = self
            .client
            .patch(&format!("{}/instances/{id}", self.base()), body)
            .await?;
        Ok(envelope.instance)
    }

    /// Deletes an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_instance(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/instances/{id}", self.base()))
            .await
    }

    /// Creates a database. Conflicts (409) while the instance is busy are
    /// the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_database(
        &self,
        instance_id: &str,
        name: &str,
    ) -> Result<Database, ApiError> {
        let body = serde_json::json!({ "name": name });
        let envelope: DatabaseEnvelope = self
            .client
            .post(&format!("{}/instances/{instance_id}/databases", self.base()), &body)
            .await?;
        Ok(envelope.database)
    }

    /// Lists databases, optionally filtered by name.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_databases(
        &self,
        instance_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<Database>, ApiError> {
        let query: Vec<(&str, String)> = name
            .map(|name| vec![("name", name.to_owned())])
            .unwrap_or_default();
        let envelope: DatabasesEnvelope = self
            .client
            .get(
                &format!("{}/instances/{instance_id}/databases", self.base()),
                &query,
            )
            .await?;
        Ok(envelope.databases)
    }

    /// Deletes a database.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_database(&self, instance_id: &str, name: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!(
                "{}/instances/{instance_id}/databases/{name}",
                self.base()
            ))
            .await
    }

    /// Creates a user. The password is sent but never logged.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_user(
        &self,
        instance_id: &str,
        name: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<RdbUser, ApiError> {
        let body = serde_json::json!({
            "name": name,
            "password": password,
            "is_admin": is_admin,
        });
        let envelope: UserEnvelope = self
            .client
            .post(&format!("{}/instances/{instance_id}/users", self.base()), &body)
            .await?;
        Ok(envelope.user)
    }

    /// Lists users, optionally filtered by name.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_users(
        &self,
        instance_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RdbUser>, ApiError> {
        let query: Vec<(&str, String)> = name
            .map(|name| vec![("name", name.to_owned())])
            .unwrap_or_default();
        let envelope: UsersEnvelope = self
            .client
            .get(&format!("{}/instances/{instance_id}/users", self.base()), &query)
            .await?;
        Ok(envelope.users)
    }

    /// Patches a user (password or admin flag).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_user(
        &self,
        instance_id: &str,
        name: &str,
        password: Option<&str>,
        is_admin: Option<bool>,
    ) -> Result<RdbUser, ApiError> {
        let mut body = serde_json::Map::new();
        if let Some(password) = password {
            body.insert(String::from("password"), serde_json::json!(password));
        }
        if let Some(is_admin) = is_admin {
            body.insert(String::from("is_admin"), serde_json::json!(is_admin));
        }
        let envelope: UserEnvelope = self
            .client
            .patch(
                &format!("{}/instances/{instance_id}/users/{name}", self.base()),
                &body,
            )
            .await?;
        Ok(envelope.user)
    }

    /// Deletes a user.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_user(&self, instance_id: &str, name: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/instances/{instance_id}/users/{name}", self.base()))
            .await
    }
}
