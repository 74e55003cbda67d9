use std::sync::Arc;

use async_trait::async_trait;
use dfm_core::{DfmError, ResponseBody};
use dfm_core::response::ValueResponse;
use futures_util::stream::unfold;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::{AdapterBody, Item};
use crate::filesystem::{join_paths, FileSystem};
use crate::stream::Stream;

/// Provider-side configuration for `ListTextureFiles`: the subfolder under
/// the provider's filesystem root to search, the optional sidecar metadata
/// filename, and the optional URL prefix used to turn local paths into
/// client-facing URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTextureFilesConfig {
    pub subfolder: String,
    #[serde(default)]
    pub metadata_filename: Option<String>,
    #[serde(default)]
    pub server_url: Option<String>,
}

/// The bundle `ListTextureFiles` yields: a list of file URLs plus an
/// optional metadata blob read from a sidecar file in the same directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureFilesBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub urls: Vec<String>,
}

fn to_url(config: &ListTextureFilesConfig, path: &str) -> String {
    match &config.server_url {
        Some(prefix) => join_paths(&[prefix, path]),
        None => path.to_string(),
    }
}

/// `ListTextureFiles(path, format, return_meta_data)`: nullary; enumerates
/// `{subfolder}/{path}/*.{format}` through its provider's filesystem,
/// optionally reading a sidecar metadata file, and yields one
/// [`TextureFilesBundle`].
pub struct ListTextureFiles {
    node_id: Uuid,
    config: ListTextureFilesConfig,
    path: Option<String>,
    format: String,
    return_meta_data: bool,
    filesystem: Arc<dyn FileSystem>,
}

impl ListTextureFiles {
    pub fn new(
        node_id: Uuid,
        config: ListTextureFilesConfig,
        path: Option<String>,
        format: String,
        return_meta_data: bool,
        filesystem: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            node_id,
            config,
            path,
            format,
            return_meta_data,
            filesystem,
        }
    }

    async fn load(&self) -> Result<TextureFilesBundle, DfmError> {
        let path = self.path.as_ref().ok_or_else(|| {
            DfmError::data("ListTextureFiles requires a 'path'; none was supplied and discovery did not resolve one")
        })?;
        let dir = join_paths(&[&self.config.subfolder, path]);

        let mut metadata_url = None;
        let mut metadata = None;
        if let Some(metadata_filename) = &self.config.metadata_filename {
            if self.return_meta_data {
                let metadata_path = join_paths(&[&dir, metadata_filename]);
                if self.filesystem.exists(&metadata_path).await? {
                    let content = self.filesystem.read_to_string(&metadata_path).await?;
                    metadata = Some(
                        serde_json::from_str(&content)
                            .map_err(|e| DfmError::data(format!("invalid metadata JSON: {e}")))?,
                    );
                    metadata_url = Some(to_url(&self.config, &metadata_path));
                }
            }
        }

        let files = self.filesystem.list_files(&dir, &self.format).await?;
        let urls = files.iter().map(|f| to_url(&self.config, f)).collect();

        Ok(TextureFilesBundle {
            metadata_url,
            metadata,
            urls,
        })
    }
}

#[async_trait]
impl AdapterBody for ListTextureFiles {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn start(&self, stream: &Stream<Item>) {
        let bundle = self.load().await;
        let source = unfold(Some(bundle), |state| async move {
            match state? {
                Ok(bundle) => {
                    let value = serde_json::to_value(bundle).expect("TextureFilesBundle always serializes");
                    Some((Ok(value), None))
                }
                Err(e) => Some((Err(e), None)),
            }
        });
        stream.start_from_async_iterator(source);
    }

    fn prepare_to_send(&self, item: &Item) -> Option<ResponseBody> {
        Some(ResponseBody::Value(ValueResponse { value: item.clone() }))
    }
}
