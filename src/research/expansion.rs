//! Query expansion: widening seed queries with synonyms and site scopes.

use std::collections::HashSet;

use super::prompts;
use super::types::QueryExpansion;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError};
use crate::util::clean_json_response;

/// Upper bound on the expanded query set.
pub const MAX_EXPANDED_QUERIES: usize = 150;

/// Longest query that is ever issued.
pub const MAX_QUERY_LEN: usize = 60;

/// Seeds longer than this get no platform prefix.
pub const MAX_PLATFORM_SEED_LEN: usize = 40;

/// Seeds longer than this get no synonym variants.
pub const MAX_SYNONYM_SEED_LEN: usize = 50;

/// Ask the model for synonyms and platforms relevant to `topic`.
///
/// A response that does not parse yields an empty expansion; only transport
/// failures are errors.
pub async fn generate_expansions(
    llm: &dyn LlmClient,
    options: &ChatOptions,
    topic: &str,
    seeds: &[String],
) -> Result<QueryExpansion, LlmError> {
    let messages = [
        ChatMessage::system(prompts::EXPANSION_SYSTEM),
        ChatMessage::user(prompts::expansion(topic, seeds)),
    ];
    let response = llm.complete(&messages, options).await?;

    match serde_json::from_str::<QueryExpansion>(&clean_json_response(&response)) {
        Ok(expansion) => Ok(expansion),
        Err(e) => {
            tracing::warn!("Could not parse query expansions, using seed queries only: {}", e);
            Ok(QueryExpansion::default())
        }
    }
}

/// Union of seeds, platform-scoped seeds and synonym variants.
///
/// Contributions are never combined with each other. Seeds come first,
/// then platform variants, then synonym variants; the set is deduplicated
/// and capped at [`MAX_EXPANDED_QUERIES`], and no entry exceeds
/// [`MAX_QUERY_LEN`].
pub fn expand_queries(seeds: &[String], expansion: &QueryExpansion) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |query: String| {
        if out.len() < MAX_EXPANDED_QUERIES
            && query.len() <= MAX_QUERY_LEN
            && seen.insert(query.clone())
        {
            out.push(query);
        }
    };

    for seed in seeds {
        push(seed.clone());
    }

    for seed in seeds.iter().filter(|s| s.len() <= MAX_PLATFORM_SEED_LEN) {
        for platform in expansion.platforms.iter().filter(|p| !p.trim().is_empty()) {
            push(format!("{} {}", platform.trim(), seed));
        }
    }

    for seed in seeds.iter().filter(|s| s.len() <= MAX_SYNONYM_SEED_LEN) {
        let lower = seed.to_lowercase();
        for (term, alternatives) in &expansion.synonyms {
            let term = term.to_lowercase();
            if term.is_empty() || !lower.contains(&term) {
                continue;
            }
            for alt in alternatives {
                let alt = alt.to_lowercase();
                if alt != term {
                    push(lower.replace(&term, &alt));
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn seeds(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn synonym_variant_replaces_term() {
        let expansion = QueryExpansion {
            synonyms: BTreeMap::from([("flat".to_string(), vec!["apartment".to_string()])]),
            platforms: vec![],
        };
        let out = expand_queries(&seeds(&["a flat for rent"]), &expansion);
        assert_eq!(out, seeds(&["a flat for rent", "a apartment for rent"]));
    }

    #[test]
    fn platforms_only_prefix_short_seeds() {
        let long_seed = "a".repeat(41);
        let expansion = QueryExpansion {
            synonyms: BTreeMap::new(),
            platforms: vec!["site:olx.ro".to_string(), "  ".to_string()],
        };
        let out = expand_queries(&seeds(&["flat cluj", &long_seed]), &expansion);
        assert_eq!(
            out,
            vec![
                "flat cluj".to_string(),
                long_seed.clone(),
                "site:olx.ro flat cluj".to_string()
            ]
        );
    }

    #[test]
    fn synonym_variants_get_no_platform_prefix() {
        let expansion = QueryExpansion {
            synonyms: BTreeMap::from([("Flat".to_string(), vec!["flat".to_string(), "studio".to_string()])]),
            platforms: vec!["site:x.com".to_string()],
        };
        let out = expand_queries(&seeds(&["Flat Cluj"]), &expansion);
        assert!(out.contains(&"studio cluj".to_string()));
        assert!(!out.iter().any(|q| q == "site:x.com studio cluj"));
        // an alternative equal to the term is skipped
        assert!(!out.contains(&"flat cluj".to_string()));
    }

    #[test]
    fn long_inputs_are_dropped() {
        let long = "word ".repeat(13); // 65 chars
        let out = expand_queries(&seeds(&[&long, "ok"]), &QueryExpansion::default());
        assert_eq!(out, seeds(&["ok"]));
    }

    #[test]
    fn expansion_is_capped_and_bounded() {
        let seed_list: Vec<String> = (0..40).map(|i| format!("query {i}")).collect();
        let expansion = QueryExpansion {
            synonyms: BTreeMap::from([(
                "query".to_string(),
                (0..10).map(|i| format!("alt{i}")).collect(),
            )]),
            platforms: (0..10).map(|i| format!("site:s{i}.com")).collect(),
        };
        let out = expand_queries(&seed_list, &expansion);
        assert_eq!(out.len(), MAX_EXPANDED_QUERIES);
        assert!(out.iter().all(|q| q.len() <= MAX_QUERY_LEN));
        // every seed is kept
        assert!(seed_list.iter().all(|s| out.contains(s)));
        let unique: HashSet<_> = out.iter().collect();
        assert_eq!(unique.len(), out.len());
    }

    #[tokio::test]
    async fn unparseable_expansion_degrades_to_empty() {
        let llm = crate::testing::ScriptedLlm::from_fn(|_| Ok("no json here".to_string()));
        let out = generate_expansions(&llm, &ChatOptions::default(), "t", &seeds(&["q"]))
            .await
            .unwrap();
        assert_eq!(out, QueryExpansion::default());
    }

    #[tokio::test]
    async fn fenced_expansion_parses() {
        let llm = crate::testing::ScriptedLlm::from_fn(|_| {
            Ok("<think>hm</think>```json\n{\"synonyms\":{\"flat\":[\"apartment\"]},\"platforms\":[\"site:a.ro\"]}\n```".to_string())
        });
        let out = generate_expansions(&llm, &ChatOptions::default(), "t", &seeds(&["q"]))
            .await
            .unwrap();
        assert_eq!(out.platforms, vec!["site:a.ro".to_string()]);
        assert_eq!(out.synonyms["flat"], vec!["apartment".to_string()]);
    }
}
