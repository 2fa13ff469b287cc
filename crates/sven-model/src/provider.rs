// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The streaming LLM collaborator the step loop drives through the
/// [`crate::ResponseStream`] adapter. Concrete HTTP-backed implementations
/// live outside this crate; only the boundary trait and test doubles
/// ([`crate::MockProvider`], [`crate::ScriptedMockProvider`]) live here.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Returns `true` if this model accepts image content parts.
    ///
    /// Default is conservative: no image support unless a provider
    /// overrides it.
    fn supports_images(&self) -> bool {
        false
    }
}
