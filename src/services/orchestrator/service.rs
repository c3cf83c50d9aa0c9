//! Agent Run Controller
//!
//! Drives one run of the agent loop on a thread:
//!
//! 1. Claim the thread (single-flight) and open a step for the user message
//! 2. Gather tool context concurrently and assemble the system prompt
//! 3. Per iteration: build the prompt, stream the completion into the step,
//!    stop on the finish function, otherwise dispatch to tools
//! 4. On budget exhaustion close the step with a timeout message
//!
//! Status cleanup is gated by run id so a stale run never overwrites the
//! status of a newer one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::StreamExt;
use serde_json::Value;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::{FunctionResponse, FunctionSchema, ParameterSchema, Role, TaggedMessage};
use stepwise_llm::CompletionClient;
use stepwise_tools::{build_function_manifest, from_fake_function_message, ToolRegistry};

use crate::models::settings::{AgentSettings, CompactionSettings, FunctionCallingMode};
use crate::models::step::{Step, ToolUseResponse};
use crate::models::thread::Thread;
use crate::services::thread_store::{RunHandle, ThreadStore};
use crate::services::tools::dispatch::{step_mut, step_ref};
use crate::services::tools::ToolDispatcher;
use crate::utils::error::{AgentError, AgentResult};

use super::prompt::{assemble_system_prompt, build_prompt};

/// Final message written when the iteration budget runs out
pub const TIMED_OUT_TEXT: &str = "[Agent timed out]";

/// Response to the finish call itself
pub const FINISHED_TEXT: &str = "Finished";

/// Response to calls emitted alongside the finish call
pub const SKIPPED_TEXT: &str = "Skipped: the run finished";

/// Schema of a generic finish function taking a free-form `result`.
pub fn finish_function_schema(name: impl Into<String>) -> FunctionSchema {
    let mut properties = HashMap::new();
    properties.insert(
        "result".to_string(),
        ParameterSchema::string(Some("The final result of the task")),
    );
    FunctionSchema {
        name: name.into(),
        description: "Call this exactly once when the task is complete, passing the final result."
            .to_string(),
        parameters: ParameterSchema::object(
            Some("Finish parameters"),
            properties,
            vec!["result".to_string()],
        ),
    }
}

/// Per-call options of `send`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub system_prompt_template: String,
    pub max_iterations: usize,
    /// Calling this function ends the run with its arguments as the result
    pub finish_function: Option<FunctionSchema>,
    pub working_directory: Option<PathBuf>,
    pub compaction: CompactionSettings,
    pub function_calling: FunctionCallingMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_settings(&AgentSettings::default())
    }
}

impl RunOptions {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            system_prompt_template: settings.template().to_string(),
            max_iterations: settings.max_iterations,
            finish_function: settings.finish_function.clone().map(finish_function_schema),
            working_directory: settings.working_directory.clone(),
            compaction: settings.compaction,
            function_calling: settings.function_calling,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_finish_function(mut self, schema: FunctionSchema) -> Self {
        self.finish_function = Some(schema);
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_system_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.system_prompt_template = template.into();
        self
    }

    pub fn with_function_calling(mut self, mode: FunctionCallingMode) -> Self {
        self.function_calling = mode;
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionSettings) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::validation("max_iterations must be at least 1"));
        }
        if self.system_prompt_template.trim().is_empty() {
            return Err(AgentError::validation("System prompt template is empty"));
        }
        Ok(())
    }
}

/// Run controller bound to one thread store
#[derive(Clone)]
pub struct AgentRunController {
    store: Arc<ThreadStore>,
}

impl AgentRunController {
    pub fn new(store: Arc<ThreadStore>) -> Self {
        Self { store }
    }

    pub fn for_thread(thread: Thread) -> Self {
        Self::new(Arc::new(ThreadStore::new(thread)))
    }

    pub fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }

    /// Snapshot of the thread
    pub async fn thread(&self) -> Thread {
        self.store.snapshot().await
    }

    pub async fn pause(&self) -> bool {
        self.store.pause().await
    }

    pub async fn unpause(&self) -> bool {
        self.store.unpause().await
    }

    pub async fn cancel(&self) -> bool {
        self.store.cancel().await
    }

    /// Run the agent loop for one user message.
    ///
    /// Returns the finish function's arguments when the model called it,
    /// `None` when the run ended with a plain answer or ran out of
    /// iterations. Fails with `AlreadyRunning` without touching the thread
    /// when another run owns it, and with `Cancelled` when cancelled.
    pub async fn send(
        &self,
        message: TaggedMessage,
        client: &dyn CompletionClient,
        tools: &ToolRegistry,
        options: &RunOptions,
    ) -> AgentResult<Option<Value>> {
        if message.role != Role::User {
            return Err(AgentError::validation("Runs must start with a user message"));
        }
        options.validate()?;

        let run = self.store.try_begin_run().await?;
        tracing::info!(
            run_id = %run.run_id,
            model = client.model(),
            max_iterations = options.max_iterations,
            "[AgentRun] run started"
        );

        let result = self.run_loop(&run, message, client, tools, options).await;
        match &result {
            Ok(_) => {
                self.store.finish_run(&run.run_id).await;
                tracing::info!(run_id = %run.run_id, "[AgentRun] run finished");
            }
            Err(e) if e.is_cancellation() => {
                self.store.finish_run(&run.run_id).await;
                tracing::info!(run_id = %run.run_id, "[AgentRun] run cancelled");
            }
            Err(e) => {
                self.store.fail_run(&run.run_id, e.to_string()).await;
                tracing::warn!(run_id = %run.run_id, error = %e, "[AgentRun] run failed");
            }
        }
        result
    }

    async fn run_loop(
        &self,
        run: &RunHandle,
        message: TaggedMessage,
        client: &dyn CompletionClient,
        tools: &ToolRegistry,
        options: &RunOptions,
    ) -> AgentResult<Option<Value>> {
        let step = Step::new(message);
        let step_id = step.id.clone();
        let thread_id = self
            .store
            .modify_run(run, |thread| {
                thread.append_or_update(step);
                thread.id.clone()
            })
            .await?;

        let mut ctx = ToolContext::new(thread_id, run.run_id.clone())
            .with_cancellation_token(run.token.clone());
        if let Some(dir) = &options.working_directory {
            ctx = ctx.with_working_directory(dir.clone());
        }

        // Concurrent, collected in registration order
        let contexts: Vec<String> = join_all(
            tools
                .iter()
                .map(|tool| tool.context_to_insert_at_beginning_of_thread(&ctx)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();
        let base_prompt = assemble_system_prompt(
            &options.system_prompt_template,
            &contexts,
            options.working_directory.as_deref(),
        );

        let fake_functions = options
            .function_calling
            .use_fake_functions(client.supports_function_calling());
        let mut all_functions = tools.functions();
        if let Some(finish) = &options.finish_function {
            all_functions.push(finish.clone());
        }

        for iteration in 0..options.max_iterations {
            self.store.wait_while_paused(run).await?;

            let is_last = iteration + 1 == options.max_iterations;
            let allowed = match (&options.finish_function, is_last) {
                (Some(finish), true) => vec![finish.clone()],
                _ => all_functions.clone(),
            };
            tracing::debug!(
                run_id = %run.run_id,
                iteration,
                functions = allowed.len(),
                "[AgentRun] iteration"
            );

            let system_prompt = if fake_functions && !allowed.is_empty() {
                format!("{}\n\n{}", build_function_manifest(&allowed), base_prompt)
            } else {
                base_prompt.clone()
            };
            let thread = self.store.snapshot().await;
            let messages = build_prompt(
                &system_prompt,
                &thread.steps,
                &options.compaction,
                fake_functions,
            );
            let functions = if fake_functions { Vec::new() } else { allowed };

            self.stream_turn(run, &step_id, client, messages, functions, fake_functions)
                .await?;

            if let Some(finish) = &options.finish_function {
                if let Some(value) = self.take_finish_result(run, &step_id, &finish.name).await? {
                    tracing::info!(run_id = %run.run_id, iteration, "[AgentRun] finish function called");
                    return Ok(Some(value));
                }
            }

            let dispatcher = ToolDispatcher::new(&self.store, run, tools);
            if !dispatcher.dispatch(&step_id, &ctx).await? {
                return Ok(None);
            }
        }

        tracing::info!(run_id = %run.run_id, "[AgentRun] iteration budget exhausted");
        self.store
            .modify_run(run, |thread| -> AgentResult<()> {
                let step = step_mut(thread, &step_id)?;
                if step.assistant_message_for_user.is_none() {
                    step.assistant_message_for_user = Some(TaggedMessage::assistant(TIMED_OUT_TEXT));
                }
                Ok(())
            })
            .await??;
        Ok(None)
    }

    /// Stream one completion into the step, one write per chunk.
    async fn stream_turn(
        &self,
        run: &RunHandle,
        step_id: &str,
        client: &dyn CompletionClient,
        messages: Vec<TaggedMessage>,
        functions: Vec<FunctionSchema>,
        fake_functions: bool,
    ) -> AgentResult<()> {
        let mut stream = client.stream_completion(messages, functions).await?;
        let mut received = false;

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = run.token.cancelled() => return Err(AgentError::Cancelled),
            };
            let Some(chunk) = chunk else {
                break;
            };
            let mut message = chunk?;
            if fake_functions {
                message = from_fake_function_message(message);
            }
            tracing::trace!(run_id = %run.run_id, calls = message.function_calls.len(), "[AgentRun] chunk");
            received = true;
            self.fold_partial(run, step_id, message).await?;
        }

        if !received {
            tracing::warn!(run_id = %run.run_id, "[AgentRun] empty completion stream");
            self.fold_partial(run, step_id, TaggedMessage::assistant(""))
                .await?;
        }
        Ok(())
    }

    async fn fold_partial(
        &self,
        run: &RunHandle,
        step_id: &str,
        message: TaggedMessage,
    ) -> AgentResult<()> {
        self.store
            .modify_run(run, |thread| -> AgentResult<()> {
                step_mut(thread, step_id)?.append_or_update_partial_response(message);
                Ok(())
            })
            .await?
    }

    /// Close the open round if it called the finish function.
    ///
    /// The finish call is answered with `FINISHED_TEXT`, any other call in
    /// the same round is skipped, and the arguments become the final
    /// assistant message.
    async fn take_finish_result(
        &self,
        run: &RunHandle,
        step_id: &str,
        finish_name: &str,
    ) -> AgentResult<Option<Value>> {
        let thread = self.store.snapshot().await;
        let calls = step_ref(&thread, step_id)?.pending_function_calls_to_execute();
        let Some(finish_call) = calls.iter().find(|call| call.name == finish_name) else {
            return Ok(None);
        };

        let value = finish_call
            .parsed_arguments()
            .unwrap_or_else(|_| Value::String(finish_call.arguments.clone()));
        let responses: Vec<FunctionResponse> = calls
            .iter()
            .map(|call| {
                let text = if call.name == finish_name {
                    FINISHED_TEXT
                } else {
                    SKIPPED_TEXT
                };
                FunctionResponse::for_call(call, text)
            })
            .collect();
        let final_text = value.to_string();

        self.store
            .modify_run(run, |thread| -> AgentResult<()> {
                let step = step_mut(thread, step_id)?;
                let round = step
                    .last_tool_use_step_mut()
                    .ok_or_else(|| AgentError::internal("No open tool-use round"))?;
                round.response = Some(ToolUseResponse::Computer(responses));
                step.assistant_message_for_user = Some(TaggedMessage::assistant(final_text));
                Ok(())
            })
            .await??;
        Ok(Some(value))
    }
}

impl Default for AgentRunController {
    fn default() -> Self {
        Self::new(Arc::new(ThreadStore::default()))
    }
}
