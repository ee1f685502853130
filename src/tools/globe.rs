//! Globe tools: client-intent signals rendered by the chat UI.
//!
//! "Executing" these only builds a confirmation payload. The UI sees the
//! call on the stream and performs the action; the model sees the
//! confirmation and carries on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::ToolError;
use super::registry::Tool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerColor {
    #[default]
    Red,
    Blue,
    Green,
    Orange,
    Purple,
}

impl MarkerColor {
    fn as_str(self) -> &'static str {
        match self {
            MarkerColor::Red => "red",
            MarkerColor::Blue => "blue",
            MarkerColor::Green => "green",
            MarkerColor::Orange => "orange",
            MarkerColor::Purple => "purple",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShowLocationArgs {
    pub location: String,
    #[serde(rename = "markerColor", default)]
    pub marker_color: MarkerColor,
}

pub struct ShowLocationOnGlobe;

#[async_trait]
impl Tool for ShowLocationOnGlobe {
    type Args = ShowLocationArgs;

    fn name(&self) -> &'static str {
        "show_location_on_globe"
    }

    fn description(&self) -> &'static str {
        "Shows a location on the interactive 3D globe with a marker and zooms to it. \
         Opens the globe if not already open. Use this when the user asks to find, show, \
         locate, or view a place on the map. Examples: 'find Istanbul', 'show me Paris', \
         'locate Mount Everest'. IMPORTANT: This clears all previous markers, so each call \
         shows only the new location."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The name of the location to show (e.g., 'Istanbul', 'Paris', 'Mount Everest', 'Golden Gate Bridge')",
                },
                "markerColor": {
                    "type": "string",
                    "description": "The color of the marker pin",
                    "enum": ["red", "blue", "green", "orange", "purple"],
                    "default": "red",
                },
            },
            "required": ["location"],
        })
    }

    async fn call(&self, args: ShowLocationArgs) -> Result<Value, ToolError> {
        let location = args.location.trim();
        if location.is_empty() {
            return Err(ToolError::ArgsInvalid {
                tool: self.name().to_string(),
                reason: "location is empty".to_string(),
            });
        }
        let color = args.marker_color.as_str();
        Ok(json!({
            "status": "success",
            "action": "displayed_location",
            "location": location,
            "marker_color": color,
            "message": format!("Opened interactive globe and displayed {location} with {color} marker"),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseGlobeArgs {}

pub struct CloseGlobe;

#[async_trait]
impl Tool for CloseGlobe {
    type Args = CloseGlobeArgs;

    fn name(&self) -> &'static str {
        "close_globe"
    }

    fn description(&self) -> &'static str {
        "Closes the globe view, clears all markers, and returns to full-screen chat. \
         ALWAYS use this when: (1) User asks a new question unrelated to geography/locations, \
         (2) Conversation topic changes from locations to something else, (3) User explicitly \
         asks to close the map. DO NOT use if the user is asking follow-up questions about the \
         same location or related geographic queries."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
        })
    }

    async fn call(&self, _args: CloseGlobeArgs) -> Result<Value, ToolError> {
        Ok(json!({
            "status": "success",
            "action": "closed_globe",
            "message": "Closed the globe view",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_show_location_default_color() {
        let args: ShowLocationArgs = serde_json::from_value(json!({"location": "Istanbul"})).unwrap();
        let result = ShowLocationOnGlobe.call(args).await.unwrap();
        assert_eq!(result["marker_color"], "red");
        assert_eq!(result["location"], "Istanbul");
        assert_eq!(
            result["message"],
            "Opened interactive globe and displayed Istanbul with red marker"
        );
    }

    #[tokio::test]
    async fn test_show_location_custom_color() {
        let args: ShowLocationArgs =
            serde_json::from_value(json!({"location": "Paris", "markerColor": "purple"})).unwrap();
        let result = ShowLocationOnGlobe.call(args).await.unwrap();
        assert_eq!(result["marker_color"], "purple");
        assert_eq!(result["action"], "displayed_location");
    }

    #[test]
    fn test_show_location_rejects_unknown_color() {
        let parsed: Result<ShowLocationArgs, _> =
            serde_json::from_value(json!({"location": "Paris", "markerColor": "teal"}));
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_show_location_rejects_blank() {
        let args: ShowLocationArgs = serde_json::from_value(json!({"location": "  "})).unwrap();
        let err = ShowLocationOnGlobe.call(args).await.unwrap_err();
        assert!(matches!(err, ToolError::ArgsInvalid { .. }));
    }

    #[tokio::test]
    async fn test_close_globe() {
        let args: CloseGlobeArgs = serde_json::from_value(json!({})).unwrap();
        let result = CloseGlobe.call(args).await.unwrap();
        assert_eq!(result["action"], "closed_globe");
    }

    #[test]
    fn test_close_globe_rejects_arguments() {
        let parsed: Result<CloseGlobeArgs, _> = serde_json::from_value(json!({"force": true}));
        assert!(parsed.is_err());
    }
}
