use std::collections::BTreeMap;

use clap::ValueEnum;
use log::debug;
use serde::{
    de::DeserializeOwned, ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Map, Value};

use crate::client::{PocketClient, GET_PATH};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Unread,
    Archive,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Article,
    Video,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    Newest,
    Oldest,
    Title,
    Site,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetailType {
    Simple,
    Complete,
}

/// Filters for a retrieval call
///
/// Every field is optional and independent. An absent field is left out of
/// the request body entirely so the service applies its own default.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,

    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_flag"
    )]
    pub favorite: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_type: Option<DetailType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Unix timestamp; only items modified after it are returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Only meaningful together with `count`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

// The service takes its boolean filters as 0/1.
fn serialize_flag<S>(value: &Option<bool>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(flag) => serializer.serialize_u8(u8::from(*flag)),
        None => serializer.serialize_none(),
    }
}

#[derive(Serialize)]
struct GetBody<'a> {
    consumer_key: &'a str,
    access_token: &'a str,
    #[serde(flatten)]
    query: &'a ItemQuery,
}

/// The decoded answer of a retrieval call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSet {
    pub status: i64,

    /// Items keyed by item id; written back as `[]` when empty, like the service
    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        serialize_with = "empty_map_as_list"
    )]
    pub list: BTreeMap<String, Item>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<i64>,

    /// Always present in answers, usually `null`
    #[serde(default)]
    pub error: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_meta: Option<Value>,

    /// Server time of this answer, for the caller's next incremental sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,

    /// Top-level members without a named field above, e.g. `maxActions`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A saved item, decoded structurally and otherwise passed through untouched
///
/// Flags and timestamps keep the service's encoding: enumerated string codes
/// (`"0"`, `"1"`, `"2"`) and numeric-string unix times. Items deleted since
/// the `since` of the query carry only `item_id` and `status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_article: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_video: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_favorited: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_metadata: Option<DomainMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,

    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub images: BTreeMap<String, Image>,

    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub videos: BTreeMap<String, Video>,

    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub authors: BTreeMap<String, Author>,

    #[serde(
        default,
        deserialize_with = "map_or_empty_list",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub tags: BTreeMap<String, Tag>,

    /// Attributes without a named field above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greyscale_logo: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decodes a keyed collection that the service sends as `[]` when empty
fn map_or_empty_list<'de, D, V>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Array(values) if values.is_empty() => Ok(BTreeMap::new()),
        value => serde_json::from_value(value).map_err(serde::de::Error::custom),
    }
}

fn empty_map_as_list<S, V>(
    map: &BTreeMap<String, V>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    if map.is_empty() {
        serializer.serialize_seq(Some(0))?.end()
    } else {
        map.serialize(serializer)
    }
}

impl PocketClient {
    /// Retrieves the saved items matching `query`
    ///
    /// The answer is returned as decoded; nothing is filtered or paged locally.
    pub async fn get_items(
        &self,
        consumer_key: &str,
        access_token: &str,
        query: &ItemQuery,
    ) -> Result<ItemSet> {
        let body = GetBody {
            consumer_key,
            access_token,
            query,
        };

        let items: ItemSet = self.post(GET_PATH, &body).await?;
        debug!("retrieved {} items", items.list.len());

        Ok(items)
    }
}
