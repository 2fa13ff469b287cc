// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod mock;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;

use sven_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] for a named model configuration.
///
/// The concrete HTTP-backed LLM clients this once dispatched to are an
/// external collaborator from the runtime's point of view — this crate
/// only owns the [`ModelProvider`] boundary and the deterministic test
/// doubles used to exercise the step loop without a network call.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "mock" => Ok(Box::new(MockProvider)),
        other => anyhow::bail!(
            "no in-process model provider for {other:?}; the LLM client is an \
             external collaborator — construct one of your own and pass it to \
             the step loop instead of routing through from_config"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_mock_succeeds() {
        let cfg = ModelConfig {
            provider: "mock".into(),
            name: "mock-model".into(),
            ..ModelConfig::default()
        };
        assert!(from_config(&cfg).is_ok());
    }

    #[test]
    fn from_config_unknown_provider_errors() {
        let cfg = ModelConfig {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            ..ModelConfig::default()
        };
        assert!(from_config(&cfg).is_err());
    }
}
