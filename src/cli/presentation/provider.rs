//! Provider list formatter. API keys are never printed.

use super::shared::{or_dash, table, to_json, OutputFormat};
use crate::error::ApiError;
use crate::provider::ProviderConfig;
use serde_json::json;

pub fn format_provider_list(
    providers: &[(&str, &ProviderConfig)],
    default_provider: Option<&str>,
    format: OutputFormat,
) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        let list: Vec<_> = providers
            .iter()
            .map(|(name, config)| {
                json!({
                    "name": name,
                    "type": config.provider_type.as_str(),
                    "model": config.model,
                    "endpoint": config.endpoint,
                    "default": Some(*name) == default_provider,
                    "api_key_set": config.api_key.is_some(),
                })
            })
            .collect();
        return to_json(&list);
    }
    if providers.is_empty() {
        return Ok("No providers configured. Add one under [providers.<name>] in config/config.toml.".to_string());
    }
    let mut table = table(vec!["Name", "Type", "Model", "Endpoint", "Default"]);
    for (name, config) in providers {
        table.add_row(vec![
            name.to_string(),
            config.provider_type.as_str().to_string(),
            config.model.clone(),
            or_dash(config.endpoint.as_deref()),
            if Some(*name) == default_provider { "yes" } else { "" }.to_string(),
        ]);
    }
    Ok(table.to_string())
}
