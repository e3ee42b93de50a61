use serde::Deserialize;

/// One page of a paginated list endpoint.
#[derive(Deserialize, Debug)]
pub struct Page<T> {
    #[serde(default)]
    /// Total across all pages, when the endpoint reports it.
    pub count: Option<i64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteMedia {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "media_origin_type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteScreen {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub state: ScreenState,
    /// Media currently scheduled on this screen.
    #[serde(default)]
    pub media_ids: Vec<i64>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ScreenState {
    #[serde(default)]
    pub online: bool,
}
