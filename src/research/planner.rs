//! Plan creation and revision.

use super::expansion::{expand_queries, generate_expansions};
use super::prompts;
use super::types::{ResearchError, ResearchPlan};
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::util::{clean_json_response, truncate_label};

/// Ask the model for a plan.
///
/// Exhaustive plans also carry seed queries, which are widened through
/// query expansion. An expansion transport failure keeps the seeds.
pub async fn create_plan(
    llm: &dyn LlmClient,
    options: &ChatOptions,
    topic: &str,
    additional_context: &str,
    exhaustive: bool,
    result_links: bool,
) -> Result<ResearchPlan, ResearchError> {
    let messages = if exhaustive {
        [
            ChatMessage::system(prompts::PLAN_EXHAUSTIVE_SYSTEM),
            ChatMessage::user(prompts::plan_exhaustive(topic, additional_context)),
        ]
    } else {
        [
            ChatMessage::system(prompts::PLAN_SYSTEM),
            ChatMessage::user(prompts::plan(topic, additional_context, result_links)),
        ]
    };

    let response = llm
        .complete(&messages, options)
        .await
        .map_err(|e| ResearchError::Plan(e.to_string()))?;
    let cleaned = clean_json_response(&response);
    let mut plan: ResearchPlan = serde_json::from_str(&cleaned).map_err(|e| {
        ResearchError::Plan(format!(
            "failed to parse research plan: {}. Response: {}",
            e,
            truncate_label(&cleaned, 500)
        ))
    })?;

    if !exhaustive {
        plan.search_queries.clear();
    } else if !plan.search_queries.is_empty() {
        tracing::info!("Generating query expansions for {} seed queries", plan.search_queries.len());
        match generate_expansions(llm, options, topic, &plan.search_queries).await {
            Ok(expansion) => {
                tracing::info!(
                    "Expansion data: {} platforms, synonyms for {} terms",
                    expansion.platforms.len(),
                    expansion.synonyms.len()
                );
                plan.search_queries = expand_queries(&plan.search_queries, &expansion);
            }
            Err(e) => tracing::warn!("Could not generate expansions: {}", e),
        }
        tracing::info!("Expanded to {} search queries", plan.search_queries.len());
    }

    Ok(plan)
}

/// Produce a new plan that takes `feedback` into account.
pub async fn revise_plan(
    llm: &dyn LlmClient,
    options: &ChatOptions,
    topic: &str,
    feedback: &str,
    exhaustive: bool,
    result_links: bool,
) -> Result<ResearchPlan, ResearchError> {
    tracing::info!("Revising plan with feedback: {}", truncate_label(feedback, 80));
    create_plan(llm, options, topic, feedback, exhaustive, result_links).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::testing::ScriptedLlm;

    const EXHAUSTIVE_PLAN: &str = r#"```json
{"clarifying_questions":["area?"],"understanding_summary":"rentals","research_steps":["search"],
 "expected_outcome":"list","search_queries":["a flat for rent","studio cluj"]}
```"#;

    #[tokio::test]
    async fn exhaustive_plan_is_expanded() {
        let llm = ScriptedLlm::from_fn(|messages| {
            if messages[0].content == prompts::EXPANSION_SYSTEM {
                Ok(r#"{"synonyms":{"flat":["apartment"]},"platforms":["site:olx.ro"]}"#.to_string())
            } else {
                Ok(EXHAUSTIVE_PLAN.to_string())
            }
        });
        let plan = create_plan(&llm, &ChatOptions::default(), "rent", "", true, false)
            .await
            .unwrap();
        assert_eq!(
            plan.search_queries,
            vec![
                "a flat for rent",
                "studio cluj",
                "site:olx.ro a flat for rent",
                "site:olx.ro studio cluj",
                "a apartment for rent",
            ]
        );
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn expansion_failure_keeps_seeds() {
        let llm = ScriptedLlm::from_fn(|messages| {
            if messages[0].content == prompts::EXPANSION_SYSTEM {
                Err(LlmError::network_error("refused".to_string()))
            } else {
                Ok(EXHAUSTIVE_PLAN.to_string())
            }
        });
        let plan = create_plan(&llm, &ChatOptions::default(), "rent", "", true, false)
            .await
            .unwrap();
        assert_eq!(plan.search_queries, vec!["a flat for rent", "studio cluj"]);
    }

    #[tokio::test]
    async fn malformed_plan_is_an_error() {
        let llm = ScriptedLlm::from_fn(|_| Ok("I think you want flats".to_string()));
        let err = create_plan(&llm, &ChatOptions::default(), "rent", "", false, false).await;
        assert!(matches!(err, Err(ResearchError::Plan(_))));
    }

    #[tokio::test]
    async fn revision_passes_feedback_along() {
        let llm = ScriptedLlm::from_fn(|messages| {
            assert!(messages[1].content.contains("only two-room flats"));
            Ok(r#"{"understanding_summary":"two rooms"}"#.to_string())
        });
        let plan = revise_plan(
            &llm,
            &ChatOptions::default(),
            "rent",
            "only two-room flats",
            false,
            false,
        )
        .await
        .unwrap();
        assert_eq!(plan.understanding_summary, "two rooms");
        assert!(plan.search_queries.is_empty());
    }
}
