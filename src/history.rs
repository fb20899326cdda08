// Past scans: user-scoped listing, edits, deletion and account cleanup.
// See DESIGN.md: History

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adapter::{self, RouteDocument};
use crate::error::ScanError;
use crate::services::{sort_newest_first, ObjectStorage, RouteStore};

const ROUTES_FOLDER: &str = "routes";

/// User edits to a saved route, as sent by the detail screen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEdits {
    #[serde(default)]
    pub route_name: Option<String>,
    #[serde(default)]
    pub manual_grade: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RouteEdits {
    /// Trimmed, non-blank values keyed by their stored field names.
    pub fn to_fields(&self) -> Map<String, Value> {
        [
            ("routeName", &self.route_name),
            ("manualGrade", &self.manual_grade),
            ("notes", &self.notes),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            let value = value.as_deref()?.trim();
            (!value.is_empty()).then(|| (key.to_string(), Value::String(value.to_string())))
        })
        .collect()
    }
}

/// Storage key for a route image uploaded by `user_id`.
pub fn route_image_key(user_id: &str, timestamp_ms: u64) -> String {
    format!("{}/{}/route_{}.jpg", ROUTES_FOLDER, user_id, timestamp_ms)
}

fn image_reference(route: &RouteDocument) -> Option<&str> {
    let image = if route.image_path.is_empty() {
        route.image_url.as_str()
    } else {
        route.image_path.as_str()
    };
    (!image.is_empty()).then_some(image)
}

/// Routes of the signed-in user, newest first.
pub async fn load_routes<S: RouteStore>(
    store: &S,
    user_id: Option<&str>,
) -> Result<Vec<RouteDocument>, ScanError> {
    let user_id = user_id.ok_or(ScanError::AuthRequired)?;
    let mut routes = store.list_by_user(user_id).await?;
    sort_newest_first(&mut routes);
    Ok(routes)
}

/// Delete a route and its image. A failed image delete does not block the document delete.
pub async fn delete_route<S: RouteStore, O: ObjectStorage>(
    store: &S,
    storage: &O,
    route_id: &str,
) -> Result<(), ScanError> {
    if route_id.is_empty() {
        return Err(ScanError::MissingField("route id"));
    }

    if let Some(route) = store.get(route_id).await? {
        if let Some(image) = image_reference(&route) {
            if let Err(err) = storage.delete(image).await {
                warn!("failed to delete route image {}: {}", image, err);
            }
        }
    }

    store.delete(route_id).await?;
    info!("deleted route {}", route_id);
    Ok(())
}

/// Apply user edits to a route. Returns false when every field was blank
/// and nothing was written.
pub async fn update_route<S: RouteStore>(
    store: &S,
    route_id: &str,
    edits: &RouteEdits,
) -> Result<bool, ScanError> {
    if route_id.is_empty() {
        return Err(ScanError::MissingField("route id"));
    }

    let fields = edits.to_fields();
    if fields.is_empty() {
        debug!("no edits for route {}", route_id);
        return Ok(false);
    }

    store.update(route_id, &fields).await?;
    info!("updated route {}", route_id);
    Ok(true)
}

/// Upload an image into the user's route folder and return its public URL.
pub async fn upload_route_image<O: ObjectStorage>(
    storage: &O,
    user_id: Option<&str>,
    source_uri: &str,
) -> Result<String, ScanError> {
    let user_id = user_id.ok_or(ScanError::AuthRequired)?;
    if source_uri.is_empty() {
        return Err(ScanError::MissingField("image URI"));
    }

    let key = route_image_key(user_id, adapter::now_millis());
    let url = storage.upload(source_uri, &key).await?;
    debug!("uploaded {} to {}", source_uri, key);
    Ok(url)
}

/// Account cleanup: remove every route image of the user, then their route
/// documents. Returns how many routes were removed.
pub async fn delete_user_data<S: RouteStore, O: ObjectStorage>(
    store: &S,
    storage: &O,
    user_id: Option<&str>,
) -> Result<usize, ScanError> {
    let user_id = user_id.ok_or(ScanError::AuthRequired)?;
    let routes = store.list_by_user(user_id).await?;

    for image in routes.iter().filter_map(image_reference) {
        if let Err(err) = storage.delete(image).await {
            warn!("failed to delete route image {}: {}", image, err);
        }
    }

    store.delete_user_routes(user_id).await?;
    info!("deleted {} routes of user {}", routes.len(), user_id);
    Ok(routes.len())
}
