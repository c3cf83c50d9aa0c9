//! Tool Dispatch
//!
//! Resolves the current turn of a step to registered tools and folds the
//! results back into the step:
//!
//! 1. A final answer with no calls may be claimed by a tool as a
//!    pseudo-function; it then moves into a new tool-use round.
//! 2. An unclaimed final answer ends the run.
//! 3. The open round is executed: prose by its pseudo-function handler, or
//!    every structured call, in order, by the first tool that accepts it.
//!
//! Calls run sequentially so responses keep the order the model emitted and
//! side effects on the same file stay ordered.

use std::collections::BTreeMap;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::{ContentItem, FunctionCall, FunctionResponse, TaggedMessage};
use stepwise_tools::{PseudoFunctionOutput, ToolRegistry};

use crate::models::step::{Step, ToolUseResponse, ToolUseStep, PSEUDO_FUNCTION_LOG_KEY};
use crate::models::thread::Thread;
use crate::services::thread_store::{RunHandle, ThreadStore};
use crate::utils::error::{AgentError, AgentResult};

/// Log key of a call: its id, or its name and position when it has none.
pub fn call_log_key(call: &FunctionCall, index: usize) -> String {
    call.id
        .clone()
        .unwrap_or_else(|| format!("{}#{}", call.name, index))
}

pub(crate) fn step_mut<'a>(thread: &'a mut Thread, step_id: &str) -> AgentResult<&'a mut Step> {
    thread
        .step_mut(step_id)
        .ok_or_else(|| AgentError::internal(format!("Step {} not found", step_id)))
}

pub(crate) fn step_ref<'a>(thread: &'a Thread, step_id: &str) -> AgentResult<&'a Step> {
    thread
        .step(step_id)
        .ok_or_else(|| AgentError::internal(format!("Step {} not found", step_id)))
}

fn check_cancelled(ctx: &ToolContext) -> AgentResult<()> {
    if ctx.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    Ok(())
}

/// Dispatches one turn of one step to the registry's tools
pub struct ToolDispatcher<'a> {
    store: &'a ThreadStore,
    run: &'a RunHandle,
    registry: &'a ToolRegistry,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(store: &'a ThreadStore, run: &'a RunHandle, registry: &'a ToolRegistry) -> Self {
        Self {
            store,
            run,
            registry,
        }
    }

    /// Execute the current turn of `step_id`.
    ///
    /// Returns `false` when the model produced a genuine final answer and the
    /// run should stop, `true` when tool results were recorded and the model
    /// should continue.
    pub async fn dispatch(&self, step_id: &str, ctx: &ToolContext) -> AgentResult<bool> {
        check_cancelled(ctx)?;
        let thread = self.store.snapshot().await;
        let step = step_ref(&thread, step_id)?;

        let has_open_round = step
            .last_tool_use_step()
            .map(|round| !round.is_complete())
            .unwrap_or(false);

        if !has_open_round {
            let Some(final_message) = &step.assistant_message_for_user else {
                return Ok(false);
            };
            if self
                .registry
                .pseudo_function_handler(&final_message.text())
                .is_none()
            {
                tracing::debug!(step_id = %step_id, "[ToolDispatch] final answer, nothing to dispatch");
                return Ok(false);
            }
            self.claim_final_message(step_id).await?;
        }

        let thread = self.store.snapshot().await;
        let round = step_ref(&thread, step_id)?
            .last_tool_use_step()
            .cloned()
            .ok_or_else(|| AgentError::internal("No open tool-use round"))?;

        if round.initial_response.has_function_calls() {
            self.execute_calls(step_id, &round.initial_response.function_calls, ctx)
                .await?;
        } else {
            self.execute_pseudo_function(step_id, &round.initial_response, ctx)
                .await?;
        }

        check_cancelled(ctx)?;
        Ok(true)
    }

    /// Move the final assistant message into a new tool-use round.
    async fn claim_final_message(&self, step_id: &str) -> AgentResult<()> {
        self.store
            .modify_run(self.run, |thread| -> AgentResult<()> {
                let step = step_mut(thread, step_id)?;
                let message = step
                    .assistant_message_for_user
                    .take()
                    .ok_or_else(|| AgentError::internal("Final message disappeared"))?;
                step.tool_use_loop.push(ToolUseStep::new(message));
                Ok(())
            })
            .await??;
        tracing::info!(step_id = %step_id, "[ToolDispatch] assistant message claimed as pseudo-function");
        Ok(())
    }

    async fn execute_pseudo_function(
        &self,
        step_id: &str,
        message: &TaggedMessage,
        ctx: &ToolContext,
    ) -> AgentResult<()> {
        let text = message.text();
        let output = match self.registry.pseudo_function_handler(&text) {
            Some(tool) => {
                check_cancelled(ctx)?;
                tracing::info!(
                    thread_id = ctx.thread_id(),
                    run_id = ctx.run_id(),
                    tool = tool.name(),
                    "[ToolDispatch] running pseudo-function"
                );
                let output = tool.handle_pseudo_function(&text, ctx).await;
                check_cancelled(ctx)?;
                output.unwrap_or_else(|| {
                    PseudoFunctionOutput::text(format!("{} did not act on this message.", tool.name()))
                })
            }
            None => PseudoFunctionOutput::text("No tool handles this message."),
        };

        let PseudoFunctionOutput { items, logs } = output;
        self.complete_round(
            step_id,
            ToolUseResponse::PseudoFunction(non_empty(items)),
            BTreeMap::from([(PSEUDO_FUNCTION_LOG_KEY.to_string(), logs)]),
        )
        .await
    }

    async fn execute_calls(
        &self,
        step_id: &str,
        calls: &[FunctionCall],
        ctx: &ToolContext,
    ) -> AgentResult<()> {
        let mut responses: Vec<FunctionResponse> = Vec::with_capacity(calls.len());
        let mut logs: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (index, call) in calls.iter().enumerate() {
            check_cancelled(ctx)?;

            let mut handled = None;
            for tool in self.registry.iter() {
                if let Some(result) = tool.handle_call(call, ctx).await {
                    handled = Some((tool.name().to_string(), result));
                    break;
                }
            }
            let Some((tool_name, result)) = handled else {
                tracing::warn!(function = %call.name, "[ToolDispatch] no tool handles function");
                return Err(AgentError::UnknownToolName(call.name.clone()));
            };

            tracing::info!(
                run_id = ctx.run_id(),
                tool = %tool_name,
                function = %call.name,
                call_id = ?call.id,
                success = result.success,
                "[ToolDispatch] call finished"
            );
            responses.push(result.to_response(call));
            if !result.logs.is_empty() {
                logs.insert(call_log_key(call, index), result.logs);
            }
            check_cancelled(ctx)?;
        }

        self.complete_round(step_id, ToolUseResponse::Computer(responses), logs)
            .await
    }

    async fn complete_round(
        &self,
        step_id: &str,
        response: ToolUseResponse,
        logs: BTreeMap<String, Vec<String>>,
    ) -> AgentResult<()> {
        self.store
            .modify_run(self.run, |thread| -> AgentResult<()> {
                let round = step_mut(thread, step_id)?
                    .last_tool_use_step_mut()
                    .ok_or_else(|| AgentError::internal("No open tool-use round"))?;
                round.response = Some(response);
                for (key, lines) in logs {
                    round.add_logs(key, lines);
                }
                Ok(())
            })
            .await?
    }
}

fn non_empty(items: Vec<ContentItem>) -> Vec<ContentItem> {
    if items.is_empty() {
        vec![ContentItem::text("Done.")]
    } else {
        items
    }
}
