//! etcd image reconciliation in the kubeadm `ClusterConfiguration`.
//!
//! kubeadm stores its `ClusterConfiguration` as a YAML document in the
//! `kube-system/kubeadm-config` ConfigMap. Only `etcd.local.imageRepository`
//! and `etcd.local.imageTag` are touched; every other field keeps its value
//! and position.

use serde_yaml::{Mapping, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::controller::error::{Error, Result};
use crate::controller::workload::{Workload, cancellable};

const IMAGE_REPOSITORY: &str = "imageRepository";
const IMAGE_TAG: &str = "imageTag";

/// Get `key` from `parent` as a mapping, creating it when absent or null.
fn child_mapping<'a>(parent: &'a mut Mapping, key: &str, path: &str) -> Result<&'a mut Mapping> {
    let missing = match parent.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::Mapping(_)) => false,
        Some(_) => {
            return Err(Error::InvalidConfig(format!(
                "ClusterConfiguration field {} is not a mapping",
                path
            )));
        }
    };
    if missing {
        parent.insert(Value::from(key), Value::Mapping(Mapping::new()));
    }
    parent
        .get_mut(key)
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| Error::MissingField(format!("ClusterConfiguration {}", path)))
}

/// Set the etcd image in a `ClusterConfiguration` document.
///
/// Returns `Ok(None)` when both fields already hold the requested values,
/// otherwise the re-serialized document.
pub fn update_etcd_image(
    document: &str,
    image_repository: &str,
    image_tag: &str,
) -> Result<Option<String>> {
    let mut config: Value = serde_yaml::from_str(document)?;
    let root = config.as_mapping_mut().ok_or_else(|| {
        Error::InvalidConfig("ClusterConfiguration is not a mapping".to_string())
    })?;
    let etcd = child_mapping(root, "etcd", "etcd")?;
    let local = child_mapping(etcd, "local", "etcd.local")?;

    let unchanged = local.get(IMAGE_REPOSITORY).and_then(Value::as_str) == Some(image_repository)
        && local.get(IMAGE_TAG).and_then(Value::as_str) == Some(image_tag);
    if unchanged {
        return Ok(None);
    }

    local.insert(Value::from(IMAGE_REPOSITORY), Value::from(image_repository));
    local.insert(Value::from(IMAGE_TAG), Value::from(image_tag));
    Ok(Some(serde_yaml::to_string(&config)?))
}

impl Workload {
    /// Point the kubeadm configuration at a new etcd image.
    ///
    /// No write happens when the configuration already names this image. A
    /// concurrent modification surfaces as `Error::Conflict`.
    #[instrument(skip(self, cancel))]
    pub async fn update_etcd_version_in_config(
        &self,
        image_repository: &str,
        image_tag: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancellable(cancel, self.reconcile_etcd_image(image_repository, image_tag)).await
    }

    async fn reconcile_etcd_image(&self, image_repository: &str, image_tag: &str) -> Result<()> {
        let namespace = &self.config.system_namespace;
        let name = &self.config.kubeadm_config_map;
        let key = &self.config.cluster_configuration_key;

        let mut config_map = self
            .cluster
            .get_config_map(namespace, name)
            .await?
            .ok_or_else(|| Error::ConfigNotFound {
                namespace: namespace.clone(),
                name: name.clone(),
            })?;

        let document = config_map
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .ok_or_else(|| Error::MissingField(format!("{}/{} data.{}", namespace, name, key)))?;

        let Some(updated) = update_etcd_image(document, image_repository, image_tag)? else {
            debug!(namespace = %namespace, name = %name, "etcd image already up to date");
            return Ok(());
        };

        config_map
            .data
            .get_or_insert_with(Default::default)
            .insert(key.clone(), updated);
        self.cluster.update_config_map(&config_map).await?;
        info!(
            namespace = %namespace,
            name = %name,
            image_repository = %image_repository,
            image_tag = %image_tag,
            "Updated etcd image in kubeadm configuration"
        );
        Ok(())
    }
}
