//! Player element registration
//!
//! Before a player can be instantiated on an element, the element needs an `id` and
//! its `src` URL must carry the query parameters that enable the JavaScript API.
//! Registration does this exactly once per element and records progress in the
//! element's setup status.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Query parameter enabling the player's JavaScript API
pub const ENABLE_JSAPI_PARAMETER: &str = "enablejsapi";
pub const ENABLE_JSAPI_VALUE: &str = "1";

/// Query parameter carrying the embedding page's origin
pub const ORIGIN_PARAMETER: &str = "origin";

/// Substring every player `src` contains
pub const PLAYER_SRC_PATTERN: &str = "youtube";

/// Setup progress stored on the element (`data-launchext-setup`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupStatus {
    /// Registration is in progress
    Started,
    /// `id` and `src` have been normalized; the element awaits a player
    Modified,
    /// A player exists for the element and has reported ready
    Completed,
}

/// Host-side handle to a page element
///
/// Setters take `&self`: the element lives in the host's document, not in the tracker.
pub trait ElementHandle: Send + Sync {
    /// Upper-case tag name, e.g. `IFRAME`
    fn node_name(&self) -> String;

    fn id(&self) -> Option<String>;

    fn set_id(&self, id: &str);

    fn src(&self) -> Option<String>;

    fn set_src(&self, src: &str);

    fn setup_status(&self) -> Option<SetupStatus>;

    fn set_setup_status(&self, status: SetupStatus);

    /// Whether the element matches a CSS selector
    fn matches(&self, selector: &str) -> bool;
}

pub type ElementRef = Arc<dyn ElementHandle>;

/// Register a candidate player element
///
/// Returns the element when it was newly registered or had already been registered
/// without a player yet, and `None` when it is not a player element or its setup is
/// in progress or complete.
pub fn register_player_element(
    element: &ElementRef,
    index: usize,
    id_prefix: &str,
    src_pattern: &str,
    parameters_to_add: &[(String, String)],
) -> Option<ElementRef> {
    if !element.node_name().eq_ignore_ascii_case("IFRAME") {
        debug!("Skipping {} element, not an IFRAME", element.node_name());
        return None;
    }
    let src = element.src().filter(|src| src.contains(src_pattern))?;

    match element.setup_status() {
        Some(SetupStatus::Modified) => return Some(element.clone()),
        Some(_) => return None,
        None => {}
    }

    element.set_setup_status(SetupStatus::Started);

    if element.id().map_or(true, |id| id.is_empty()) {
        let id = generated_element_id(id_prefix, index);
        debug!(player_id = %id, "Assigned element id");
        element.set_id(&id);
    }

    let normalized = add_query_parameters(&src, parameters_to_add);
    if normalized != src {
        element.set_src(&normalized);
    }

    element.set_setup_status(SetupStatus::Modified);
    Some(element.clone())
}

/// `<prefix>_<epoch milliseconds>_<index>`
pub fn generated_element_id(id_prefix: &str, index: usize) -> String {
    format!(
        "{}_{}_{}",
        id_prefix,
        chrono::Utc::now().timestamp_millis(),
        index
    )
}

/// Parameters every player `src` needs, given the embedding page's origin
pub fn required_parameters(page_origin: &str) -> Vec<(String, String)> {
    vec![
        (
            ENABLE_JSAPI_PARAMETER.to_string(),
            ENABLE_JSAPI_VALUE.to_string(),
        ),
        (ORIGIN_PARAMETER.to_string(), page_origin.to_string()),
    ]
}

/// Append each parameter whose name is absent from `src`'s query string
///
/// Scheme-relative sources (`//www.youtube.com/embed/...`) stay scheme-relative.
/// A `src` that does not parse as a URL is returned unchanged.
pub fn add_query_parameters(src: &str, parameters: &[(String, String)]) -> String {
    let scheme_relative = src.starts_with("//");
    let parsed = if scheme_relative {
        Url::parse(&format!("https:{}", src))
    } else {
        Url::parse(src)
    };
    let mut url = match parsed {
        Ok(url) => url,
        Err(e) => {
            debug!("Leaving src {:?} as is: {}", src, e);
            return src.to_string();
        }
    };

    let missing: Vec<&(String, String)> = parameters
        .iter()
        .filter(|(name, _)| !url.query_pairs().any(|(existing, _)| existing == name.as_str()))
        .collect();
    if missing.is_empty() {
        return src.to_string();
    }

    {
        let mut query = url.query_pairs_mut();
        for (name, value) in missing {
            query.append_pair(name, value);
        }
    }

    let normalized: String = url.into();
    match normalized.strip_prefix("https:") {
        Some(rest) if scheme_relative => rest.to_string(),
        _ => normalized,
    }
}
