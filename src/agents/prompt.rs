//! Prompt templates keyed by agent name.
//!
//! Templates use minijinja syntax (`{{ topic }}`) and are rendered in strict
//! mode: a template that references a placeholder the caller did not supply
//! fails with [`AppError::Configuration`] instead of rendering an empty string.

use crate::agents::identity::stage_agents;
use crate::agents::WorkerIdentity;
use crate::types::{AppError, Result};
use crate::utils::toml_config::CrewConfig;
use crate::workflows::state::WorkflowState;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::collections::HashMap;

/// Values available to a template. `None` fields are left undefined.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

impl PromptContext {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Context for one worker loop. Workers see the topic and plan only.
    pub fn for_worker(identity: WorkerIdentity, topic: &str, plan: &str) -> Self {
        Self {
            worker: Some(identity.to_string()),
            topic: topic.to_string(),
            plan: Some(plan.to_string()),
            ..Default::default()
        }
    }

    /// Context for a pipeline stage: every stage output written so far.
    pub fn from_state(state: &WorkflowState) -> Self {
        let mut context = Self::new(state.topic());
        if let Some(plan) = state.plan() {
            context = context.with_plan(plan);
        }
        if let Some(research_context) = state.research_context() {
            context = context.with_research_context(research_context);
        }
        if let Some(draft) = state.draft() {
            context = context.with_draft(draft);
        }
        if let Some(review) = state.review() {
            context = context.with_review(review);
        }
        context
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_research_context(mut self, context: impl Into<String>) -> Self {
        self.research_context = Some(context.into());
        self
    }

    pub fn with_draft(mut self, draft: impl Into<String>) -> Self {
        self.draft = Some(draft.into());
        self
    }

    pub fn with_review(mut self, review: impl Into<String>) -> Self {
        self.review = Some(review.into());
        self
    }
}

const DEFAULT_PLANNER: &str = "Create a research plan for the topic: {{ topic }}.\n\
List the questions to answer for who, what, when, where, how and why.";

const DEFAULT_WORKER: &str = "You are the '{{ worker }}' research worker.\n\
Topic: {{ topic }}\nPlan:\n{{ plan }}\n\n\
Use the available tools to gather evidence for your aspect, then answer with your findings.";

const DEFAULT_WRITER: &str = "Write a research report on: {{ topic }}\n\nPlan:\n{{ plan }}\n\n\
Research findings:\n{{ research_context }}";

const DEFAULT_REVIEWER: &str = "Review and revise this report on {{ topic }}.\n\n\
Draft:\n{{ draft }}\n\nReturn the final report.";

/// Built-in template for an agent, if there is one.
pub fn default_template(agent: &str) -> Option<&'static str> {
    match agent {
        stage_agents::PLANNER => Some(DEFAULT_PLANNER),
        stage_agents::WRITER => Some(DEFAULT_WRITER),
        stage_agents::REVIEWER => Some(DEFAULT_REVIEWER),
        other if other.parse::<WorkerIdentity>().is_ok() => Some(DEFAULT_WORKER),
        _ => None,
    }
}

/// Compiled-once prompt templates, shared by every run.
pub struct PromptLibrary {
    env: Environment<'static>,
    templates: HashMap<String, String>,
}

impl std::fmt::Debug for PromptLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptLibrary")
            .field("agents", &self.agent_names())
            .finish()
    }
}

impl PromptLibrary {
    /// Build a library from explicit templates, checking their syntax.
    pub fn new(templates: HashMap<String, String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        for (agent, source) in &templates {
            env.template_from_str(source).map_err(|e| {
                AppError::Configuration(format!(
                    "Prompt template for agent '{}' is invalid: {}",
                    agent, e
                ))
            })?;
        }

        Ok(Self { env, templates })
    }

    /// Library containing the built-in templates for every known agent.
    pub fn with_defaults() -> Self {
        let mut templates = HashMap::new();
        for agent in [
            stage_agents::PLANNER,
            stage_agents::WRITER,
            stage_agents::REVIEWER,
        ] {
            if let Some(t) = default_template(agent) {
                templates.insert(agent.to_string(), t.to_string());
            }
        }
        for identity in WorkerIdentity::ALL {
            templates.insert(identity.agent_name().to_string(), DEFAULT_WORKER.to_string());
        }
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env, templates }
    }

    /// Built-in templates overridden by any `[agents.<name>].prompt`.
    pub fn from_config(config: &CrewConfig) -> Result<Self> {
        let mut templates = Self::with_defaults().templates;
        for (agent, agent_config) in &config.agents {
            if let Some(ref prompt) = agent_config.prompt {
                templates.insert(agent.clone(), prompt.clone());
            }
        }
        Self::new(templates)
    }

    pub fn has_template(&self, agent: &str) -> bool {
        self.templates.contains_key(agent)
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Render the template for `agent` against `context`.
    pub fn render(&self, agent: &str, context: &PromptContext) -> Result<String> {
        let source = self.templates.get(agent).ok_or_else(|| {
            AppError::Configuration(format!("No prompt template configured for agent '{}'", agent))
        })?;

        self.env.render_str(source, context).map_err(|e| {
            AppError::Configuration(format!(
                "Prompt template for agent '{}' could not be rendered (missing placeholder?): {}",
                agent, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library(agent: &str, source: &str) -> PromptLibrary {
        let mut templates = HashMap::new();
        templates.insert(agent.to_string(), source.to_string());
        PromptLibrary::new(templates).unwrap()
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let lib = library("writer", "{{ topic }} | {{ plan }} | {{ research_context }}");
        let ctx = PromptContext::new("QML")
            .with_plan("step 1")
            .with_research_context("--- who ---\nfindings");
        let rendered = lib.render("writer", &ctx).unwrap();
        assert_eq!(rendered, "QML | step 1 | --- who ---\nfindings");
    }

    #[test]
    fn test_context_from_state_exposes_written_stages() {
        let lib = library("reviewer", "{{ topic }}: {{ draft }} / {{ review }}");
        let mut state = WorkflowState::new("QML", Some("plan".to_string()));
        state.set_draft("first draft").unwrap();

        let err = lib
            .render("reviewer", &PromptContext::from_state(&state))
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));

        state.set_review("revised").unwrap();
        let ctx = PromptContext::from_state(&state);
        assert_eq!(ctx.plan.as_deref(), Some("plan"));
        assert!(ctx.research_context.is_none());
        assert_eq!(
            lib.render("reviewer", &ctx).unwrap(),
            "QML: first draft / revised"
        );
    }

    #[test]
    fn test_missing_placeholder_is_configuration_error() {
        let lib = library("reviewer", "Review {{ draft }}");
        let err = lib.render("reviewer", &PromptContext::new("QML")).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("reviewer"));
    }

    #[test]
    fn test_unknown_agent_is_configuration_error() {
        let lib = library("writer", "{{ topic }}");
        let err = lib.render("planner", &PromptContext::new("x")).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_invalid_syntax_rejected_at_build() {
        let mut templates = HashMap::new();
        templates.insert("planner".to_string(), "{{ topic ".to_string());
        assert!(matches!(
            PromptLibrary::new(templates),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_worker_context_exposes_identity() {
        let lib = PromptLibrary::with_defaults();
        let ctx = PromptContext::for_worker(WorkerIdentity::How, "QML", "the plan");
        let rendered = lib.render("how", &ctx).unwrap();
        assert!(rendered.contains("'how'"));
        assert!(rendered.contains("the plan"));
    }

    #[test]
    fn test_config_prompt_overrides_default() {
        let config: CrewConfig = r#"
[agents.writer]
prompt = "Custom report on {{ topic }}"
"#
        .parse()
        .unwrap();
        let lib = PromptLibrary::from_config(&config).unwrap();
        let rendered = lib.render("writer", &PromptContext::new("QML")).unwrap();
        assert_eq!(rendered, "Custom report on QML");
        assert!(lib.has_template("planner"));
    }

    #[test]
    fn test_defaults_cover_every_agent() {
        let lib = PromptLibrary::with_defaults();
        for agent in ["planner", "writer", "reviewer", "who", "why", "researcher"] {
            assert!(lib.has_template(agent), "missing default for {}", agent);
        }
    }
}
