//! Single-agent execution with timeout and retry.

use conductor_agents::{AgentDefinition, AgentInput};
use conductor_context::{AttentionItem, ConsciousnessContext, TemporalEvent, TemporalScale};
use conductor_core::{AgentError, AgentOutput, DurationMs, RetryConfig};
use serde_json::json;
use tokio::time::Instant;

/// Significance of the temporal event recorded for a failed output.
const FAILURE_SIGNIFICANCE: f64 = 0.9;

/// Significance of the temporal event recorded for a successful output.
const SUCCESS_SIGNIFICANCE: f64 = 0.7;

/// Run `definition`'s agent until it returns an output or its retries run out.
///
/// Each attempt races the agent against the effective timeout; a timed-out
/// attempt is dropped, which cancels it at its next suspension point. Failed
/// attempts wait `backoff_base * 2^attempt` before the next one. The returned
/// output carries the execution time of the successful attempt and the number
/// of retries it took.
pub async fn execute_agent(
    definition: &AgentDefinition,
    input: &AgentInput,
    consciousness: &mut ConsciousnessContext,
    retry: &RetryConfig,
) -> Result<AgentOutput, AgentError> {
    let agent_id = definition.id.as_str();
    let max_retries = definition.effective_max_retries(retry);
    let timeout = definition.effective_timeout(retry);

    consciousness.attend(AttentionItem::new(
        format!("Executing {agent_id}"),
        "pipeline",
        0.9,
        0.8,
    ));
    consciousness.set_phase(format!("executing:{agent_id}"));

    let mut last_error = String::new();

    for attempt in 0..=max_retries {
        let attempt_start = Instant::now();
        let result =
            tokio::time::timeout(timeout, definition.agent.execute(input, consciousness)).await;
        let elapsed_ms = attempt_start.elapsed().as_millis() as DurationMs;

        match result {
            Ok(Ok(mut output)) => {
                output.metrics.execution_time_ms = elapsed_ms;
                output.metrics.retry_count = attempt;

                let significance = if output.success {
                    SUCCESS_SIGNIFICANCE
                } else {
                    FAILURE_SIGNIFICANCE
                };
                consciousness.record_event(
                    TemporalEvent::new(
                        "agent_execution",
                        format!(
                            "{agent_id} finished (success: {}, confidence: {:.2})",
                            output.success, output.confidence
                        ),
                        significance,
                    )
                    .with_scale(TemporalScale::ShortTerm)
                    .with_data(json!({
                        "agent_id": agent_id,
                        "success": output.success,
                        "confidence": output.confidence,
                    })),
                );

                tracing::debug!(
                    agent_id,
                    attempt,
                    elapsed_ms,
                    success = output.success,
                    "Agent attempt completed"
                );
                return Ok(output);
            }
            Ok(Err(error)) => {
                tracing::warn!(agent_id, attempt, error = %error, "Agent attempt failed");
                last_error = error.to_string();
            }
            Err(_elapsed) => {
                let error = AgentError::Timeout {
                    agent_id: agent_id.to_string(),
                    timeout,
                };
                tracing::warn!(agent_id, attempt, timeout_ms = timeout.as_millis() as u64, "Agent attempt timed out");
                last_error = error.to_string();
            }
        }

        if attempt < max_retries {
            let backoff = retry.backoff_for(attempt);
            tracing::debug!(agent_id, attempt, backoff_ms = backoff.as_millis() as u64, "Backing off before retry");
            tokio::time::sleep(backoff).await;
        }
    }

    Err(AgentError::RetriesExhausted {
        agent_id: agent_id.to_string(),
        attempts: max_retries + 1,
        last_error,
    })
}
