//! Wire messages of the config sync protocol

use crate::Result;
use crate::bus::Message;
use serde::{Deserialize, Serialize};
use system_modeler_lib::EntityModel;
use uuid::Uuid;

/// Type name of an edge device asking for its configuration
pub const CONFIG_REQUEST_TYPE: &str = "EntityModelConfigRequest";
/// Type name of a configuration pushed to one edge device
pub const CONFIG_RESPONSE_TYPE: &str = "EntityModelJsonConfigResponse";

/// Topic the edge device of `intersection` listens on
pub fn response_topic(base: &str, intersection: Uuid) -> String {
    format!("{base}.{intersection}")
}

/// Request marker; the asking intersection travels in the routing key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {}

impl ConfigRequest {
    pub fn into_message(self, intersection: Uuid) -> Result<Message> {
        Message::new(intersection, CONFIG_REQUEST_TYPE, &self)
    }
}

/// Full entity set of one intersection, serialized as an opaque JSON string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub json: String,
}

impl ConfigResponse {
    pub fn from_models(models: &[EntityModel]) -> Result<Self> {
        Ok(Self {
            json: serde_json::to_string(models)?,
        })
    }

    pub fn models(&self) -> Result<Vec<EntityModel>> {
        Ok(serde_json::from_str(&self.json)?)
    }

    pub fn into_message(self, intersection: Uuid) -> Result<Message> {
        Message::new(intersection, CONFIG_RESPONSE_TYPE, &self)
    }
}
