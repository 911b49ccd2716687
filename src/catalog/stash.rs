use super::error::CatalogError;
use super::types::{Fingerprint, PHASH_FINGERPRINT, PageRequest, Unit, UnitFile, UnitFilter, UnitPage};
use super::Catalog;
use crate::config::CatalogSettings;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, trace};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const FIND_SCENES_QUERY: &str = r"
query FindScenes($filter: FindFilterType, $scene_filter: SceneFilterType) {
  findScenes(filter: $filter, scene_filter: $scene_filter) {
    count
    scenes {
      id
      files { id path fingerprints { type value } }
      paths { screenshot }
      tags { id }
    }
  }
}";

const FIND_SCENE_QUERY: &str = r"
query FindScene($id: ID!) {
  findScene(id: $id) {
    id
    files { id path fingerprints { type value } }
    paths { screenshot }
    tags { id }
  }
}";

const BULK_SCENE_UPDATE: &str = r"
mutation BulkSceneUpdate($input: BulkSceneUpdateInput!) {
  bulkSceneUpdate(input: $input) { id }
}";

const FILE_SET_FINGERPRINTS: &str = r"
mutation FileSetFingerprints($input: FileSetFingerprintsInput!) {
  fileSetFingerprints(input: $input)
}";

const SCENE_UPDATE: &str = r"
mutation SceneUpdate($input: SceneUpdateInput!) {
  sceneUpdate(input: $input) { id }
}";

const API_KEY_HEADER: &str = "ApiKey";

/// Stash 風格的 GraphQL 目錄客戶端
#[derive(Clone)]
pub struct StashClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlErrorMessage>>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Deserialize)]
struct FindScenesData {
    #[serde(rename = "findScenes")]
    find_scenes: FindScenesResult,
}

#[derive(Deserialize)]
struct FindSceneData {
    #[serde(rename = "findScene")]
    find_scene: Option<RawScene>,
}

#[derive(Deserialize)]
struct FindScenesResult {
    count: usize,
    scenes: Vec<RawScene>,
}

#[derive(Deserialize)]
struct RawScene {
    id: String,
    #[serde(default)]
    files: Vec<RawFile>,
    paths: Option<RawPaths>,
    #[serde(default)]
    tags: Vec<RawTag>,
}

#[derive(Deserialize)]
struct RawFile {
    id: String,
    path: String,
    #[serde(default)]
    fingerprints: Vec<Fingerprint>,
}

#[derive(Deserialize)]
struct RawPaths {
    screenshot: Option<String>,
}

#[derive(Deserialize)]
struct RawTag {
    id: String,
}

impl From<RawScene> for Unit {
    fn from(scene: RawScene) -> Self {
        Self {
            id: scene.id,
            files: scene
                .files
                .into_iter()
                .map(|f| UnitFile {
                    id: f.id,
                    path: f.path,
                    fingerprints: f.fingerprints,
                })
                .collect(),
            tags: scene.tags.into_iter().map(|t| t.id).collect(),
            cover_url: scene.paths.and_then(|p| p.screenshot),
        }
    }
}

impl StashClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| CatalogError::Http(format!("無法建立 HTTP 客戶端: {e}")))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, CatalogError> {
        trace!("GraphQL 請求: {variables}");

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send()?.error_for_status()?;
        let body: GraphQlResponse<T> = response.json()?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(CatalogError::GraphQl(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| CatalogError::Decode("回應缺少 data 欄位".to_string()))
    }

    fn update_tags(&self, unit_id: &str, tag: &str, mode: &str) -> Result<(), CatalogError> {
        debug!("標籤 {mode}: unit={unit_id} tag={tag}");
        let variables = json!({
            "input": {
                "ids": [unit_id],
                "tag_ids": { "ids": [tag], "mode": mode },
            }
        });
        self.execute::<Value>(BULK_SCENE_UPDATE, variables)?;
        Ok(())
    }
}

/// 將查詢條件轉為 `SceneFilterType`
///
/// 同一欄位無法同時 INCLUDES 與 EXCLUDES，排除條件放進巢狀 `AND`。
fn build_scene_filter(filter: &UnitFilter) -> Value {
    let mut scene_filter = serde_json::Map::new();

    if filter.fingerprint_missing {
        scene_filter.insert(
            "phash".to_string(),
            json!({ "value": "", "modifier": "IS_NULL" }),
        );
    }

    let exclude = (!filter.exclude_tags.is_empty())
        .then(|| json!({ "value": filter.exclude_tags, "modifier": "EXCLUDES" }));

    if filter.include_any_tags.is_empty() {
        if let Some(exclude) = exclude {
            scene_filter.insert("tags".to_string(), exclude);
        }
    } else {
        scene_filter.insert(
            "tags".to_string(),
            json!({ "value": filter.include_any_tags, "modifier": "INCLUDES" }),
        );
        if let Some(exclude) = exclude {
            scene_filter.insert("AND".to_string(), json!({ "tags": exclude }));
        }
    }

    Value::Object(scene_filter)
}

impl Catalog for StashClient {
    fn query_units(&self, filter: &UnitFilter, page: PageRequest) -> Result<UnitPage, CatalogError> {
        let variables = json!({
            "filter": {
                "page": page.number,
                "per_page": page.size,
                "sort": "created_at",
                "direction": "DESC",
            },
            "scene_filter": build_scene_filter(filter),
        });

        let data: FindScenesData = self.execute(FIND_SCENES_QUERY, variables)?;
        Ok(UnitPage {
            total: data.find_scenes.count,
            units: data.find_scenes.scenes.into_iter().map(Unit::from).collect(),
        })
    }

    fn find_unit(&self, unit_id: &str) -> Result<Option<Unit>, CatalogError> {
        let data: FindSceneData = self.execute(FIND_SCENE_QUERY, json!({ "id": unit_id }))?;
        Ok(data.find_scene.map(Unit::from))
    }

    fn add_tag(&self, unit_id: &str, tag: &str) -> Result<(), CatalogError> {
        self.update_tags(unit_id, tag, "ADD")
    }

    fn remove_tag(&self, unit_id: &str, tag: &str) -> Result<(), CatalogError> {
        self.update_tags(unit_id, tag, "REMOVE")
    }

    fn set_fingerprint(&self, file_id: &str, value: &str) -> Result<(), CatalogError> {
        let variables = json!({
            "input": {
                "id": file_id,
                "fingerprints": [{ "type": PHASH_FINGERPRINT, "value": value }],
            }
        });
        self.execute::<Value>(FILE_SET_FINGERPRINTS, variables)?;
        Ok(())
    }

    fn set_cover_image(&self, unit_id: &str, jpeg: &[u8]) -> Result<(), CatalogError> {
        let data_url = format!("data:image/jpg;base64,{}", STANDARD.encode(jpeg));
        let variables = json!({ "input": { "id": unit_id, "cover_image": data_url } });
        self.execute::<Value>(SCENE_UPDATE, variables)?;
        Ok(())
    }

    fn needs_cover(&self, unit: &Unit) -> Result<bool, CatalogError> {
        let Some(url) = unit.cover_url.as_deref() else {
            return Ok(false);
        };

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let bytes = request.send()?.error_for_status()?.bytes()?;
        Ok(is_placeholder_cover(&bytes))
    }
}

/// 目錄在沒有封面時回傳 SVG 佔位圖
fn is_placeholder_cover(bytes: &[u8]) -> bool {
    let text: String = bytes.iter().map(|&b| char::from(b)).collect();
    text.to_lowercase().contains("<svg")
}
