//! Integration tests for coachgen generation jobs

mod cli_workspace;
mod config_loading;
mod generation_pipeline;
mod provider_http;
mod test_utils;
