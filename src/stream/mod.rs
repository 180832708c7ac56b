//! 流聚合模块 — 将后端流式分片聚合为统一响应块序列
//!
//! # Stream Aggregation Module
//!
//! Each submodule turns one backend's decoded stream into a lazy sequence of
//! unified [`GenerateResponse`](crate::types::GenerateResponse) chunks.
//! Nothing is pulled from the network until the consumer polls, and any
//! sequence that delivered content ends with exactly one terminal chunk
//! carrying a finish reason.
//!
//! The two backends stream very differently and get different machinery:
//!
//! | Module | Wire shape | Aggregation concern |
//! |--------|-----------|---------------------|
//! | [`ollama`] | NDJSON, atomic text fragments | recover tool calls the model serialized into its text |
//! | [`anthropic`] | SSE, segmented content blocks | assemble `input_json_delta` fragments into one complete call |
//!
//! Usage counters follow the same policy everywhere: the first reported
//! prompt count wins, the output count tracks the latest report, and the
//! derived totals never decrease across a sequence.

pub mod anthropic;
pub mod ollama;

use crate::types::UsageMetadata;

/// Running usage counters for one streamed response.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageTracker {
    prompt: u64,
    prompt_seen: bool,
    output: u64,
}

impl UsageTracker {
    /// Record a prompt token count; only the first report is kept.
    pub fn record_prompt(&mut self, count: u64) {
        if !self.prompt_seen {
            self.prompt = count;
            self.prompt_seen = true;
        }
    }

    /// Record an output token count; the running value never decreases.
    pub fn record_output(&mut self, count: u64) {
        self.output = self.output.max(count);
    }

    /// Counters as known right now.
    pub fn snapshot(&self) -> UsageMetadata {
        UsageMetadata::totaled(self.prompt, self.output)
    }
}
