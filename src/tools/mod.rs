//! Tools: the fixed table of functions the model may call.
//!
//! Submodules:
//! - `registry`: `Tool` trait, type-erased dispatch, timeout and panic containment
//! - `weather`: `get_current_weather` (Open-Meteo forecast lookup)
//! - `globe`: `show_location_on_globe` / `close_globe` (client-intent signals)
//! - `errors`: Tool-level error types and their result payloads

pub mod errors;
pub mod globe;
pub mod registry;
pub mod weather;

pub use errors::ToolError;
pub use registry::{Tool, ToolCallResult, ToolRegistry};

use crate::config::{OrchestratorConfig, ToolsConfig};

/// Build the registry of built-in tools.
///
/// Registration order is the order tools are advertised to the model.
pub fn default_registry(
    tools: &ToolsConfig,
    orchestrator: &OrchestratorConfig,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.set_call_timeout(orchestrator.tool_timeout_ms);
    registry.register(weather::CurrentWeather::new(tools.weather_base_url.clone())?)?;
    registry.register(globe::ShowLocationOnGlobe)?;
    registry.register(globe::CloseGlobe)?;

    tracing::info!(
        tools = ?registry.tool_names(),
        call_timeout_ms = orchestrator.tool_timeout_ms,
        "tool registry built"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_contents() {
        let registry =
            default_registry(&ToolsConfig::default(), &OrchestratorConfig::default()).unwrap();
        assert_eq!(
            registry.tool_names(),
            vec!["get_current_weather", "show_location_on_globe", "close_globe"]
        );
        assert_eq!(registry.call_timeout().as_millis(), 30_000);
    }
}
